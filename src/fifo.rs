//! FIFO Position Closer (C12): closes open positions in ascending-
//! timestamp order across fractional sells, sweeping dust in place and
//! proportionally rebalancing TP/SL rules.

use crate::repository::{TpSlRepository, TpSlRule, TradeRepository, TradeRow};

#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub user_id: String,
    pub wallet_id: String,
    pub mint: String,
    pub strategy: String,
    pub target: SellTarget,
    pub exit_price: f64,
    pub exit_price_usd: f64,
    pub tx_hash: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum SellTarget {
    RemovedAmount(u128),
    AmountSold(u128),
    /// Fraction in `[0, 1]`; values `> 1` are treated as a percentage
    /// (e.g. `60.0` means 60%) per the loose "percent or fraction" input
    /// contract.
    Percent(f64),
}

#[derive(Debug, Clone)]
pub struct ClosedSlice {
    pub trade_id: String,
    pub tokens_sold: u128,
    pub tx_hash: String,
    pub dust_swept: bool,
}

#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub closed_slices: Vec<ClosedSlice>,
    pub total_tokens_sold: u128,
}

fn is_dust(residual: u128, original: u128, decimals: u32) -> bool {
    if residual == 0 {
        return true;
    }
    let one_percent_of_original = original / 100;
    let decimals_bound = 10u128.saturating_pow(decimals.saturating_sub(2));
    residual <= one_percent_of_original || residual <= decimals_bound
}

/// Close `request.target` tokens worth of the open FIFO rows for
/// `(user_id, wallet_id, mint, strategy)`, then rebalance TP/SL rules to
/// preserve their relative proportions.
pub async fn close_fifo(
    request: &CloseRequest,
    trades: &dyn TradeRepository,
    tp_sl: &dyn TpSlRepository,
    now: i64,
) -> Result<CloseOutcome, String> {
    let open_rows = trades
        .find_open(&request.user_id, &request.wallet_id, &request.mint, &request.strategy)
        .await
        .map_err(|e| e.to_string())?;

    let total_out_amount: u128 = open_rows.iter().map(|r| r.out_amount).sum();
    if total_out_amount == 0 {
        return Ok(CloseOutcome {
            closed_slices: vec![],
            total_tokens_sold: 0,
        });
    }

    let target_tokens = match request.target {
        SellTarget::RemovedAmount(amt) => amt,
        SellTarget::AmountSold(amt) => amt,
        SellTarget::Percent(p) => {
            let fraction = if p > 1.0 { p / 100.0 } else { p };
            ((total_out_amount as f64) * fraction).round() as u128
        }
    };

    let mut still_to_sell = target_tokens.min(total_out_amount);
    let mut closed_slices = Vec::new();
    let mut total_sold: u128 = 0;

    let mut rows = open_rows;
    rows.sort_by_key(|r| r.timestamp);

    for (slice_idx, row) in rows.iter_mut().enumerate() {
        if still_to_sell == 0 {
            break;
        }
        let slice = still_to_sell.min(row.out_amount);
        if slice == 0 {
            continue;
        }

        let original_out_amount = row.out_amount;
        let proportion = slice as f64 / original_out_amount as f64;
        let in_amount_delta = ((row.in_amount as f64) * proportion).round() as u128;
        let usd_value_delta = row.usd_value * proportion;

        row.out_amount -= slice;
        row.in_amount = row.in_amount.saturating_sub(in_amount_delta);
        row.usd_value -= usd_value_delta;
        row.closed_out_amount += slice;
        still_to_sell -= slice;
        total_sold += slice;

        let dust = is_dust(row.out_amount, original_out_amount, request.decimals);
        if dust {
            row.closed_out_amount += row.out_amount;
            row.in_amount = 0;
            row.out_amount = 0;
            row.exited_at = Some(now);
            row.reason_code = Some("dust_swept".to_string());
        }
        row.exit_price = Some(request.exit_price);
        row.exit_price_usd = Some(request.exit_price_usd);

        trades.update(&row.id, row.clone()).await.map_err(|e| e.to_string())?;

        closed_slices.push(ClosedSlice {
            trade_id: format!("{}-close-{}", row.id, slice_idx),
            tokens_sold: slice,
            tx_hash: format!("{}-{}", request.tx_hash, slice_idx),
            dust_swept: dust,
        });
    }

    rebalance_tp_sl(request, tp_sl, total_sold, total_out_amount, trades).await?;

    Ok(CloseOutcome {
        closed_slices,
        total_tokens_sold: total_sold,
    })
}

async fn rebalance_tp_sl(
    request: &CloseRequest,
    tp_sl: &dyn TpSlRepository,
    total_sold: u128,
    total_out_amount: u128,
    trades: &dyn TradeRepository,
) -> Result<(), String> {
    if total_out_amount == 0 {
        return Ok(());
    }
    let fraction_sold = total_sold as f64 / total_out_amount as f64;

    let remaining_open = trades
        .find_open(&request.user_id, &request.wallet_id, &request.mint, &request.strategy)
        .await
        .map_err(|e| e.to_string())?;
    if remaining_open.is_empty() {
        tp_sl
            .delete_many(&request.user_id, &request.wallet_id, &request.mint, &request.strategy)
            .await
            .map_err(|e| e.to_string())?;
        return Ok(());
    }

    let rules = tp_sl
        .find(&request.user_id, &request.wallet_id, &request.mint, &request.strategy)
        .await
        .map_err(|e| e.to_string())?;
    if rules.is_empty() {
        return Ok(());
    }

    let original_sum: f64 = rules.iter().map(|r| r.sell_pct).sum();
    let new_sum = original_sum * (1.0 - fraction_sold);
    if new_sum <= 0.0 {
        return Ok(());
    }

    for rule in rules {
        let proportion = if original_sum > 0.0 {
            rule.sell_pct / original_sum
        } else {
            0.0
        };
        let rescaled = TpSlRule {
            sell_pct: proportion * new_sum,
            ..rule
        };
        tp_sl.update(rescaled).await.map_err(|e| e.to_string())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryTpSlRepository, InMemoryTradeRepository, TradeSide};

    fn row(id: &str, out_amount: u128, in_amount: u128, ts: i64) -> TradeRow {
        TradeRow {
            id: id.to_string(),
            mint: "Mint".into(),
            wallet_id: "w1".into(),
            user_id: "u1".into(),
            strategy: "s1".into(),
            side: TradeSide::Buy,
            in_amount,
            out_amount,
            closed_out_amount: 0,
            entry_price: 1.0,
            entry_price_usd: 1.0,
            exit_price: None,
            exit_price_usd: None,
            decimals: 6,
            usd_value: out_amount as f64,
            timestamp: ts,
            exited_at: None,
            reason_code: None,
        }
    }

    fn req(target: SellTarget) -> CloseRequest {
        CloseRequest {
            user_id: "u1".into(),
            wallet_id: "w1".into(),
            mint: "Mint".into(),
            strategy: "s1".into(),
            target,
            exit_price: 2.0,
            exit_price_usd: 2.0,
            tx_hash: "txhash".into(),
            decimals: 6,
        }
    }

    #[tokio::test]
    async fn fifo_order_consumes_earliest_row_first() {
        let trades = InMemoryTradeRepository::new();
        trades.create(row("t2", 1000, 1000, 200)).await.unwrap();
        trades.create(row("t1", 1000, 1000, 100)).await.unwrap();
        let tp_sl = InMemoryTpSlRepository::new();

        let outcome = close_fifo(&req(SellTarget::AmountSold(1000)), &trades, &tp_sl, 1000)
            .await
            .unwrap();
        assert_eq!(outcome.total_tokens_sold, 1000);

        let open = trades.find_open("u1", "w1", "Mint", "s1").await.unwrap();
        // t1 was consumed (fully, as dust-or-zero), t2 untouched.
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "t2");
    }

    #[tokio::test]
    async fn percent_target_reduces_total_by_fraction() {
        let trades = InMemoryTradeRepository::new();
        trades.create(row("t1", 1000, 1000, 100)).await.unwrap();
        let tp_sl = InMemoryTpSlRepository::new();

        let outcome = close_fifo(&req(SellTarget::Percent(0.5)), &trades, &tp_sl, 1000)
            .await
            .unwrap();
        assert_eq!(outcome.total_tokens_sold, 500);
    }

    #[tokio::test]
    async fn dust_row_is_closed_in_place() {
        let trades = InMemoryTradeRepository::new();
        trades.create(row("t1", 1000, 1000, 100)).await.unwrap();
        let tp_sl = InMemoryTpSlRepository::new();

        // Selling 991/1000 leaves residual 9, which is ≤ 1% of 1000.
        close_fifo(&req(SellTarget::AmountSold(991)), &trades, &tp_sl, 1000)
            .await
            .unwrap();

        let open = trades.find_open("u1", "w1", "Mint", "s1").await.unwrap();
        assert!(open.is_empty(), "dust row should no longer be open");
    }

    #[tokio::test]
    async fn tp_sl_rules_rescaled_preserving_ratio() {
        let trades = InMemoryTradeRepository::new();
        trades.create(row("t1", 1000, 1000, 100)).await.unwrap();
        let tp_sl = InMemoryTpSlRepository::new();
        tp_sl
            .update(TpSlRule {
                id: "r1".into(),
                user_id: "u1".into(),
                wallet_id: "w1".into(),
                mint: "Mint".into(),
                strategy: "s1".into(),
                sell_pct: 60.0,
                tp_percent: 50.0,
                sl_percent: 10.0,
            })
            .await
            .unwrap();
        tp_sl
            .update(TpSlRule {
                id: "r2".into(),
                user_id: "u1".into(),
                wallet_id: "w1".into(),
                mint: "Mint".into(),
                strategy: "s1".into(),
                sell_pct: 40.0,
                tp_percent: 100.0,
                sl_percent: 20.0,
            })
            .await
            .unwrap();

        close_fifo(&req(SellTarget::Percent(0.5)), &trades, &tp_sl, 1000)
            .await
            .unwrap();

        let rules = tp_sl.find("u1", "w1", "Mint", "s1").await.unwrap();
        let r1 = rules.iter().find(|r| r.id == "r1").unwrap();
        let r2 = rules.iter().find(|r| r.id == "r2").unwrap();
        // original ratio was 60/40 = 1.5; must be preserved after rescale.
        assert!((r1.sell_pct / r2.sell_pct - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rules_deleted_when_no_open_rows_remain() {
        let trades = InMemoryTradeRepository::new();
        trades.create(row("t1", 1000, 1000, 100)).await.unwrap();
        let tp_sl = InMemoryTpSlRepository::new();
        tp_sl
            .update(TpSlRule {
                id: "r1".into(),
                user_id: "u1".into(),
                wallet_id: "w1".into(),
                mint: "Mint".into(),
                strategy: "s1".into(),
                sell_pct: 100.0,
                tp_percent: 50.0,
                sl_percent: 10.0,
            })
            .await
            .unwrap();

        close_fifo(&req(SellTarget::AmountSold(1000)), &trades, &tp_sl, 1000)
            .await
            .unwrap();

        let rules = tp_sl.find("u1", "w1", "Mint", "s1").await.unwrap();
        assert!(rules.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn tp_sl_ratio_preserved_for_arbitrary_rule_split(
            a in 1.0f64..1000.0,
            b in 1.0f64..1000.0,
            sell_fraction in 0.01f64..0.99,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let trades = InMemoryTradeRepository::new();
                trades.create(row("t1", 1_000_000, 1_000_000, 100)).await.unwrap();
                let tp_sl = InMemoryTpSlRepository::new();
                tp_sl.update(TpSlRule {
                    id: "r1".into(), user_id: "u1".into(), wallet_id: "w1".into(),
                    mint: "Mint".into(), strategy: "s1".into(),
                    sell_pct: a, tp_percent: 50.0, sl_percent: 10.0,
                }).await.unwrap();
                tp_sl.update(TpSlRule {
                    id: "r2".into(), user_id: "u1".into(), wallet_id: "w1".into(),
                    mint: "Mint".into(), strategy: "s1".into(),
                    sell_pct: b, tp_percent: 100.0, sl_percent: 20.0,
                }).await.unwrap();

                close_fifo(&req(SellTarget::Percent(sell_fraction)), &trades, &tp_sl, 1000)
                    .await
                    .unwrap();

                let rules = tp_sl.find("u1", "w1", "Mint", "s1").await.unwrap();
                if rules.len() == 2 {
                    let r1 = rules.iter().find(|r| r.id == "r1").unwrap();
                    let r2 = rules.iter().find(|r| r.id == "r2").unwrap();
                    let original_ratio = a / b;
                    let new_ratio = r1.sell_pct / r2.sell_pct;
                    proptest::prop_assert!((original_ratio - new_ratio).abs() < 1e-6);
                }
                Ok(())
            })?;
        }
    }
}
