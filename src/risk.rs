//! Risk Gate (C6): pure policy evaluating whether a mint is safe to
//! trade. Provider errors on the holder-concentration, LP-burn, and
//! insider heuristics soft-fail — a flaky provider never blocks a trade
//! on its own. An overview fetch failure hard-fails, since without an
//! overview none of the entry/volume/dip thresholds can be evaluated.

use std::collections::HashSet;

use crate::market_data::{MarketDataProvider, MarketOverview};

#[derive(Debug, Clone, Default)]
pub struct DevWatchConfig {
    pub blacklist: HashSet<String>,
    pub whitelist: HashSet<String>,
    pub max_holder_percent: Option<f64>,
    pub min_lp_burn_percent: Option<f64>,
    pub enable_insider_heuristics: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RiskGateConfig {
    pub dev_watch: DevWatchConfig,
    pub min_price_change_pct: Option<f64>,
    pub min_volume_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskVerdict {
    pub ok: bool,
    pub reason: Option<&'static str>,
    pub detail: Option<&'static str>,
    pub overview: Option<MarketOverview>,
}

impl RiskVerdict {
    fn blocked(reason: &'static str, detail: Option<&'static str>) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            detail,
            overview: None,
        }
    }

    fn passed(overview: MarketOverview) -> Self {
        Self {
            ok: true,
            reason: None,
            detail: None,
            overview: Some(overview),
        }
    }
}

/// Evaluate `mint` against `cfg` using `provider` for the heuristic
/// lookups. Implements the eight-step algorithm: overview hard-fail,
/// entry/volume thresholds, explicit blacklist, whitelist short-circuit,
/// holder concentration, LP burn, insider detection.
pub async fn passes(mint: &str, cfg: &RiskGateConfig, provider: &dyn MarketDataProvider) -> RiskVerdict {
    let overview = match provider.overview(mint).await {
        Ok(Some(o)) => o,
        Ok(None) | Err(_) => return RiskVerdict::blocked("overview-fail", None),
    };

    if let Some(min_change) = cfg.min_price_change_pct {
        if overview.price_change_pct < min_change {
            return RiskVerdict::blocked("pump-too-low", None);
        }
    }
    if let Some(min_volume) = cfg.min_volume_usd {
        if overview.volume_usd < min_volume {
            return RiskVerdict::blocked("volume-too-low", None);
        }
    }

    if cfg.dev_watch.blacklist.contains(mint) {
        return RiskVerdict::blocked("dev-fail", Some("blacklist"));
    }

    if cfg.dev_watch.whitelist.contains(mint) {
        return RiskVerdict::passed(overview);
    }

    if let Some(max_holder) = cfg.dev_watch.max_holder_percent {
        if let Ok(holder_pct) = provider.holder_concentration_percent(mint).await {
            if holder_pct > max_holder {
                return RiskVerdict::blocked("dev-fail", Some("holder-concentration"));
            }
        }
    }

    if let Some(min_burn) = cfg.dev_watch.min_lp_burn_percent {
        if let Ok(burn_pct) = provider.lp_burn_percent(mint).await {
            if burn_pct < min_burn {
                return RiskVerdict::blocked("dev-fail", Some("lp-burn-low"));
            }
        }
    }

    if cfg.dev_watch.enable_insider_heuristics {
        if let Ok(true) = provider.insider_detected(mint).await {
            return RiskVerdict::blocked("dev-fail", Some("insider"));
        }
    }

    RiskVerdict::passed(overview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::ProviderError;
    use async_trait::async_trait;

    struct FixedProvider {
        overview: Option<MarketOverview>,
        holder_pct: Result<f64, ()>,
        burn_pct: Result<f64, ()>,
        insider: Result<bool, ()>,
    }

    impl FixedProvider {
        fn new() -> Self {
            Self {
                overview: Some(MarketOverview {
                    price_change_pct: 100.0,
                    volume_usd: 100_000.0,
                    liquidity_usd: 50_000.0,
                }),
                holder_pct: Ok(0.0),
                burn_pct: Ok(100.0),
                insider: Ok(false),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for FixedProvider {
        async fn overview(&self, _mint: &str) -> Result<Option<MarketOverview>, ProviderError> {
            Ok(self.overview)
        }
        async fn holder_concentration_percent(&self, _mint: &str) -> Result<f64, ProviderError> {
            self.holder_pct.map_err(|_| ProviderError("boom".into()))
        }
        async fn lp_burn_percent(&self, _mint: &str) -> Result<f64, ProviderError> {
            self.burn_pct.map_err(|_| ProviderError("boom".into()))
        }
        async fn insider_detected(&self, _mint: &str) -> Result<bool, ProviderError> {
            self.insider.map_err(|_| ProviderError("boom".into()))
        }
    }

    // S1: holder-concentration block
    #[tokio::test]
    async fn s1_holder_concentration_block() {
        let mut provider = FixedProvider::new();
        provider.holder_pct = Ok(90.0);
        let cfg = RiskGateConfig {
            dev_watch: DevWatchConfig {
                max_holder_percent: Some(50.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let verdict = passes("Mint", &cfg, &provider).await;
        assert!(!verdict.ok);
        assert_eq!(verdict.reason, Some("dev-fail"));
        assert_eq!(verdict.detail, Some("holder-concentration"));
    }

    // S2: LP-burn block
    #[tokio::test]
    async fn s2_lp_burn_block() {
        let mut provider = FixedProvider::new();
        provider.burn_pct = Ok(5.0);
        let cfg = RiskGateConfig {
            dev_watch: DevWatchConfig {
                min_lp_burn_percent: Some(10.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let verdict = passes("Mint", &cfg, &provider).await;
        assert!(!verdict.ok);
        assert_eq!(verdict.reason, Some("dev-fail"));
        assert_eq!(verdict.detail, Some("lp-burn-low"));
    }

    // S3: whitelist bypass
    #[tokio::test]
    async fn s3_whitelist_bypass() {
        let mut provider = FixedProvider::new();
        provider.holder_pct = Ok(99.0);
        provider.burn_pct = Ok(0.0);
        provider.insider = Ok(true);
        let mut whitelist = HashSet::new();
        whitelist.insert("Mint".to_string());
        let cfg = RiskGateConfig {
            dev_watch: DevWatchConfig {
                whitelist,
                max_holder_percent: Some(50.0),
                min_lp_burn_percent: Some(10.0),
                enable_insider_heuristics: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let verdict = passes("Mint", &cfg, &provider).await;
        assert!(verdict.ok);
    }

    // S4: provider soft-fail
    #[tokio::test]
    async fn s4_provider_soft_fail() {
        let mut provider = FixedProvider::new();
        provider.holder_pct = Err(());
        provider.burn_pct = Err(());
        provider.insider = Err(());
        let cfg = RiskGateConfig {
            dev_watch: DevWatchConfig {
                max_holder_percent: Some(50.0),
                min_lp_burn_percent: Some(20.0),
                enable_insider_heuristics: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let verdict = passes("Mint", &cfg, &provider).await;
        assert!(verdict.ok, "provider errors on heuristics must soft-fail");
    }

    #[tokio::test]
    async fn overview_fail_hard_blocks() {
        let mut provider = FixedProvider::new();
        provider.overview = None;
        let cfg = RiskGateConfig::default();
        let verdict = passes("Mint", &cfg, &provider).await;
        assert!(!verdict.ok);
        assert_eq!(verdict.reason, Some("overview-fail"));
    }

    #[tokio::test]
    async fn explicit_blacklist_blocks_before_whitelist_checked() {
        let provider = FixedProvider::new();
        let mut blacklist = HashSet::new();
        blacklist.insert("Mint".to_string());
        let cfg = RiskGateConfig {
            dev_watch: DevWatchConfig {
                blacklist,
                ..Default::default()
            },
            ..Default::default()
        };
        let verdict = passes("Mint", &cfg, &provider).await;
        assert!(!verdict.ok);
        assert_eq!(verdict.detail, Some("blacklist"));
    }
}
