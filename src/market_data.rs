//! Market-data oracle interface. The core never scrapes or fetches price
//! data itself (non-goal); it consumes whatever provider an embedder
//! wires in through this trait.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct MarketOverview {
    pub price_change_pct: f64,
    pub volume_usd: f64,
    pub liquidity_usd: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("market data provider error: {0}")]
pub struct ProviderError(pub String);

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Overview fetch failure hard-fails the risk gate (§4.6 step 1) —
    /// returns `Ok(None)` rather than an error to make that semantics
    /// explicit at the call site.
    async fn overview(&self, mint: &str) -> Result<Option<MarketOverview>, ProviderError>;

    /// Holder concentration as a percentage (0-100). Errors soft-fail.
    async fn holder_concentration_percent(&self, mint: &str) -> Result<f64, ProviderError>;

    /// LP-burn percentage (0-100). Errors soft-fail.
    async fn lp_burn_percent(&self, mint: &str) -> Result<f64, ProviderError>;

    /// Insider heuristic: `Ok(true)` means insider activity was
    /// detected. Errors soft-fail.
    async fn insider_detected(&self, mint: &str) -> Result<bool, ProviderError>;
}
