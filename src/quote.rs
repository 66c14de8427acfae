//! Quote Service Client (C7): requests a quote from an external routing
//! service and validates its shape before the executor trusts it.
//! Mirrors the Jupiter-aggregator convention of returning a pre-built
//! unsigned transaction alongside the priced amounts, so the executor's
//! "build" stage is a thin deserialization rather than full on-chain
//! instruction assembly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u128,
    pub slippage_bps: u32,
    pub max_impact_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    #[serde(rename = "inAmount")]
    pub in_amount: u128,
    #[serde(rename = "outAmount")]
    pub out_amount: u128,
    #[serde(rename = "priceImpactPct")]
    pub price_impact_pct: f64,
    /// Base64-encoded, unsigned, pre-built transaction ready to sign.
    #[serde(rename = "unsignedTransaction")]
    pub unsigned_transaction: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOutcome {
    Ok(Quote),
    Failed(&'static str),
}

#[derive(Debug, thiserror::Error)]
#[error("quote transport error: {0}")]
pub struct QuoteTransportError(pub String);

#[async_trait]
pub trait QuoteClient: Send + Sync {
    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Option<Quote>, QuoteTransportError>;
}

/// Request and validate a quote. Transport failures and an absent route
/// both surface as `no-route`; a retrieved quote that fails shape or
/// impact validation surfaces its own stable reason.
pub async fn get_safe_quote(req: &QuoteRequest, client: &dyn QuoteClient) -> QuoteOutcome {
    let quote = match client.fetch_quote(req).await {
        Ok(Some(q)) => q,
        Ok(None) | Err(_) => return QuoteOutcome::Failed("no-route"),
    };

    if quote.input_mint != req.input_mint || quote.output_mint != req.output_mint {
        return QuoteOutcome::Failed("quote-shape");
    }
    if quote.out_amount == 0 {
        return QuoteOutcome::Failed("quote-shape");
    }
    if !quote.price_impact_pct.is_finite() {
        return QuoteOutcome::Failed("quote-shape");
    }
    if quote.price_impact_pct > req.max_impact_pct {
        return QuoteOutcome::Failed("impact-too-high");
    }

    QuoteOutcome::Ok(quote)
}
