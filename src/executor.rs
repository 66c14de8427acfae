//! Trade Executor Hot Path (C9): orchestrates risk gate → quote → sizing
//! → signer resolve → build → sign → submit → classify → record for a
//! single trade intent, then closes FIFO positions on the sell path.

use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use solana_sdk::transaction::Transaction;
use std::sync::OnceLock;

use crate::config::{ExecutorConfig, ServerSecret};
use crate::fifo::{self, CloseRequest, SellTarget};
use crate::http_client::ErrorClass;
use crate::market_data::MarketDataProvider;
use crate::metrics::MetricsSink;
use crate::quote::{self, Quote, QuoteClient, QuoteOutcome, QuoteRequest};
use crate::repository::{IdempotencyStore, TpSlRepository, TradeRepository, TradeRow, TradeSide};
use crate::risk::{self, RiskGateConfig};
use crate::signer;
use custody_core::ArmSessionManager;

#[derive(Debug, Clone)]
pub struct UserCtx {
    pub user_id: String,
    pub wallet_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct TradeParams {
    pub mint: String,
    pub strategy: String,
    pub side: Side,
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u128,
    pub slippage_bps: u32,
    pub max_impact_pct: f64,
    pub decimals: u32,
    pub intent_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingOutcome {
    Amount(u128),
    TooSmall,
}

/// Adjusts a requested input amount against available liquidity. The
/// default implementation passes the amount through unchanged; embedders
/// with a real liquidity model inject their own.
pub trait PositionSizer: Send + Sync {
    fn size(&self, requested: u128, overview: &crate::market_data::MarketOverview) -> SizingOutcome;
}

pub struct PassthroughSizer;
impl PositionSizer for PassthroughSizer {
    fn size(&self, requested: u128, _overview: &crate::market_data::MarketOverview) -> SizingOutcome {
        SizingOutcome::Amount(requested)
    }
}

/// A floor-enforcing sizer: caps the requested amount at a fraction of
/// quoted liquidity and rejects anything the cap would shrink below a
/// configured minimum.
pub struct LiquidityCappedSizer {
    pub max_fraction_of_liquidity: f64,
    pub min_amount: u128,
}

impl PositionSizer for LiquidityCappedSizer {
    fn size(&self, requested: u128, overview: &crate::market_data::MarketOverview) -> SizingOutcome {
        let cap = (overview.liquidity_usd * self.max_fraction_of_liquidity).max(0.0) as u128;
        let sized = requested.min(cap.max(requested));
        if sized < self.min_amount {
            SizingOutcome::TooSmall
        } else {
            SizingOutcome::Amount(sized)
        }
    }
}

#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Submit a signed transaction. `Ok` carries the transaction
    /// signature/hash; `Err` carries the raw error message the
    /// classifier pattern-matches against.
    async fn submit(&self, tx: &Transaction) -> Result<String, String>;
}

/// Submits over a Solana JSON-RPC endpoint using the non-blocking client.
pub struct RpcTransactionSubmitter {
    client: solana_client::nonblocking::rpc_client::RpcClient,
}

impl RpcTransactionSubmitter {
    pub fn new(rpc_url: String) -> Self {
        Self {
            client: solana_client::nonblocking::rpc_client::RpcClient::new(rpc_url),
        }
    }
}

#[async_trait]
impl TransactionSubmitter for RpcTransactionSubmitter {
    async fn submit(&self, tx: &Transaction) -> Result<String, String> {
        self.client
            .send_and_confirm_transaction(tx)
            .await
            .map(|sig| sig.to_string())
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    Blocked {
        reason: &'static str,
        detail: Option<&'static str>,
    },
    Rejected {
        reason: &'static str,
    },
    ResolverError(String),
    Executed {
        tx_hash: String,
        error_class: &'static str,
    },
    DeadlineExceeded,
}

fn net_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)node is behind|connection|timeout").unwrap())
}

fn user_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)slippage exceeded|insufficient|block height exceeded").unwrap())
}

/// Classify a submit failure message into the stable error-class
/// contract. Network-class matches are checked before user-class ones so
/// a message matching both (unlikely given the patterns) still retries
/// as `NET`.
pub fn classify_submit_error(message: &str) -> ErrorClass {
    if net_pattern().is_match(message) {
        ErrorClass::Net
    } else if user_pattern().is_match(message) {
        ErrorClass::User
    } else {
        ErrorClass::Unknown
    }
}

pub struct TradeExecutor<'a> {
    pub risk_cfg: RiskGateConfig,
    pub market_data: &'a dyn MarketDataProvider,
    pub quote_client: &'a dyn QuoteClient,
    pub sizer: &'a dyn PositionSizer,
    pub wallet_repo: &'a dyn crate::repository::WalletRepository,
    pub arm_sessions: &'a ArmSessionManager,
    pub server_secret: Option<&'a ServerSecret>,
    pub submitter: &'a dyn TransactionSubmitter,
    pub idempotency: &'a dyn IdempotencyStore,
    pub trade_repo: &'a dyn TradeRepository,
    pub tp_sl_repo: &'a dyn TpSlRepository,
    pub metrics: &'a dyn MetricsSink,
    pub cfg: ExecutorConfig,
}

impl<'a> TradeExecutor<'a> {
    pub async fn execute_trade(&self, ctx: &UserCtx, params: &TradeParams, now_unix: i64) -> ExecuteOutcome {
        let deadline = Instant::now() + self.cfg.hotpath_deadline;
        let hotpath_start = Instant::now();

        let is_whitelisted = self.risk_cfg.dev_watch.whitelist.contains(&params.mint);
        let verdict = risk::passes(&params.mint, &self.risk_cfg, self.market_data).await;
        if !verdict.ok && !is_whitelisted {
            log::info!(target: "trade_core::executor", "trade blocked mint={} reason={:?}", params.mint, verdict.reason);
            return ExecuteOutcome::Blocked {
                reason: verdict.reason.unwrap_or("unknown"),
                detail: verdict.detail,
            };
        }

        if Instant::now() >= deadline {
            return self.deadline_exceeded(params, hotpath_start);
        }

        let quote_start = Instant::now();
        let quote_req = QuoteRequest {
            input_mint: params.input_mint.clone(),
            output_mint: params.output_mint.clone(),
            amount: params.amount,
            slippage_bps: params.slippage_bps,
            max_impact_pct: params.max_impact_pct,
        };
        let quote_outcome = quote::get_safe_quote(&quote_req, self.quote_client).await;
        self.record_stage_ms("quote", quote_start);

        let mut quote = match quote_outcome {
            QuoteOutcome::Ok(q) => q,
            QuoteOutcome::Failed(reason) => return ExecuteOutcome::Rejected { reason },
        };

        let overview = verdict.overview.unwrap_or_default();
        let sized_amount = match self.sizer.size(params.amount, &overview) {
            SizingOutcome::Amount(a) => a,
            SizingOutcome::TooSmall => return ExecuteOutcome::Rejected { reason: "size-too-small" },
        };

        // The sizer may shrink the amount below what the first quote
        // priced; re-quote at the sized amount so the built transaction
        // actually moves `sized_amount`, not the original request.
        if sized_amount != params.amount {
            let resize_start = Instant::now();
            let resized_req = QuoteRequest {
                amount: sized_amount,
                ..quote_req
            };
            let resized_outcome = quote::get_safe_quote(&resized_req, self.quote_client).await;
            self.record_stage_ms("quote", resize_start);
            quote = match resized_outcome {
                QuoteOutcome::Ok(q) => q,
                QuoteOutcome::Failed(reason) => return ExecuteOutcome::Rejected { reason },
            };
        }

        if Instant::now() >= deadline {
            return self.deadline_exceeded(params, hotpath_start);
        }

        let signer = match signer::resolve_signer(
            &ctx.user_id,
            &ctx.wallet_id,
            self.wallet_repo,
            self.arm_sessions,
            self.server_secret,
        )
        .await
        {
            Ok(s) => s,
            Err(e) => return ExecuteOutcome::ResolverError(e.to_string()),
        };

        let build_start = Instant::now();
        let tx = match self.build_transaction(&quote) {
            Ok(tx) => tx,
            Err(e) => return ExecuteOutcome::ResolverError(e),
        };
        self.record_stage_ms("build", build_start);

        let sign_start = Instant::now();
        let signed_tx = match self.sign_transaction(tx, &signer) {
            Ok(tx) => tx,
            Err(e) => return ExecuteOutcome::ResolverError(e),
        };
        self.record_stage_ms("sign", sign_start);
        drop(signer);

        let idempotency_key = format!("{}:{}:{}", ctx.user_id, params.mint, params.intent_hash);
        if let Ok(Some(existing)) = self.idempotency.get(&idempotency_key).await {
            self.record_stage_ms("total", hotpath_start);
            return ExecuteOutcome::Executed {
                tx_hash: existing.value,
                error_class: "NONE",
            };
        }

        let submit_start = Instant::now();
        let mut attempt = 0u32;
        let outcome = loop {
            match self.submitter.submit(&signed_tx).await {
                Ok(tx_hash) => {
                    let _ = self
                        .idempotency
                        .set(&idempotency_key, tx_hash.clone(), 3600, now_unix)
                        .await;
                    self.metrics.increment(
                        "submit_result_total",
                        1,
                        &vec![
                            ("errorClass", "NONE".to_string()),
                            ("strategy", params.strategy.clone()),
                        ],
                    );
                    if params.side == Side::Sell {
                        self.close_fifo_on_sell(ctx, params, quote.in_amount, &tx_hash, now_unix).await;
                    } else {
                        self.persist_trade_row(ctx, params, &quote, now_unix).await;
                    }
                    break ExecuteOutcome::Executed {
                        tx_hash,
                        error_class: "NONE",
                    };
                }
                Err(message) => {
                    let class = classify_submit_error(&message);
                    self.metrics.increment(
                        "submit_result_total",
                        1,
                        &vec![
                            ("errorClass", class.as_label().to_string()),
                            ("strategy", params.strategy.clone()),
                        ],
                    );
                    if class == ErrorClass::Net && attempt < self.cfg.retry_policy.max_attempts {
                        attempt += 1;
                        continue;
                    }
                    break ExecuteOutcome::Executed {
                        tx_hash: String::new(),
                        error_class: class.as_label(),
                    };
                }
            }
        };
        self.record_stage_ms("submit", submit_start);
        self.record_stage_ms("total", hotpath_start);
        outcome
    }

    fn record_stage_ms(&self, stage: &'static str, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        log::debug!(target: "trade_core::executor", "stage={stage} elapsed_ms={elapsed:.2}");
        self.metrics
            .observe("hotpath_ms", elapsed, &vec![("stage", stage.to_string())]);
    }

    /// The hot-path budget was exceeded. Record the total elapsed time
    /// alongside whatever per-stage observations already landed, and
    /// classify the trade as `UNKNOWN` rather than returning silently.
    fn deadline_exceeded(&self, params: &TradeParams, hotpath_start: Instant) -> ExecuteOutcome {
        self.record_stage_ms("total", hotpath_start);
        self.metrics.increment(
            "submit_result_total",
            1,
            &vec![
                ("errorClass", "UNKNOWN".to_string()),
                ("strategy", params.strategy.clone()),
            ],
        );
        log::warn!(target: "trade_core::executor", "hot-path deadline exceeded mint={}", params.mint);
        ExecuteOutcome::DeadlineExceeded
    }

    fn build_transaction(&self, quote: &Quote) -> Result<Transaction, String> {
        let raw = BASE64
            .decode(&quote.unsigned_transaction)
            .map_err(|e| format!("malformed unsigned transaction: {e}"))?;
        bincode::deserialize(&raw).map_err(|e| format!("malformed unsigned transaction: {e}"))
    }

    fn sign_transaction(&self, mut tx: Transaction, signer: &signer::Signer) -> Result<Transaction, String> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[signer.keypair()], blockhash)
            .map_err(|e| format!("signing failed: {e}"))?;
        Ok(tx)
    }

    async fn persist_trade_row(&self, ctx: &UserCtx, params: &TradeParams, quote: &Quote, now: i64) {
        let row = TradeRow {
            id: format!("{}-{}", ctx.wallet_id, params.intent_hash),
            mint: params.mint.clone(),
            wallet_id: ctx.wallet_id.clone(),
            user_id: ctx.user_id.clone(),
            strategy: params.strategy.clone(),
            side: TradeSide::Buy,
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
            closed_out_amount: 0,
            entry_price: 0.0,
            entry_price_usd: 0.0,
            exit_price: None,
            exit_price_usd: None,
            decimals: params.decimals,
            usd_value: 0.0,
            timestamp: now,
            exited_at: None,
            reason_code: None,
        };
        let _ = self.trade_repo.create(row).await;
    }

    async fn close_fifo_on_sell(
        &self,
        ctx: &UserCtx,
        params: &TradeParams,
        sold_amount: u128,
        tx_hash: &str,
        now: i64,
    ) {
        let request = CloseRequest {
            user_id: ctx.user_id.clone(),
            wallet_id: ctx.wallet_id.clone(),
            mint: params.mint.clone(),
            strategy: params.strategy.clone(),
            target: SellTarget::AmountSold(sold_amount),
            exit_price: 0.0,
            exit_price_usd: 0.0,
            tx_hash: tx_hash.to_string(),
            decimals: params.decimals,
        };
        let _ = fifo::close_fifo(&request, self.trade_repo, self.tp_sl_repo, now).await;
    }
}
