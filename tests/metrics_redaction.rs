//! End-to-end coverage of §8 property 4: every metric label emitted by a
//! full trade execution is free of userId, walletId, base58 public keys,
//! and 64-hex transaction hashes.

use async_trait::async_trait;
use base64::Engine;
use solana_sdk::message::Message;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer as SolanaSignerTrait;
use solana_sdk::transaction::Transaction;

use custody_core::envelope;
use custody_core::ArmSessionManager;
use trade_core::config::{ExecutorConfig, ServerSecret};
use trade_core::executor::{ExecuteOutcome, PassthroughSizer, Side, TradeExecutor, TradeParams, TransactionSubmitter, UserCtx};
use trade_core::market_data::{MarketDataProvider, MarketOverview, ProviderError};
use trade_core::metrics::{violates_redaction, RecordingMetricsSink};
use trade_core::quote::{Quote, QuoteClient, QuoteRequest, QuoteTransportError};
use trade_core::repository::{
    InMemoryIdempotencyStore, InMemoryTpSlRepository, InMemoryTradeRepository, InMemoryWalletRepository,
};
use trade_core::risk::RiskGateConfig;
use trade_core::wallet::WalletRow;

struct AlwaysOkProvider;

#[async_trait]
impl MarketDataProvider for AlwaysOkProvider {
    async fn overview(&self, _mint: &str) -> Result<Option<MarketOverview>, ProviderError> {
        Ok(Some(MarketOverview {
            price_change_pct: 200.0,
            volume_usd: 1_000_000.0,
            liquidity_usd: 5_000_000.0,
        }))
    }
    async fn holder_concentration_percent(&self, _mint: &str) -> Result<f64, ProviderError> {
        Ok(0.0)
    }
    async fn lp_burn_percent(&self, _mint: &str) -> Result<f64, ProviderError> {
        Ok(100.0)
    }
    async fn insider_detected(&self, _mint: &str) -> Result<bool, ProviderError> {
        Ok(false)
    }
}

struct FixedQuoteClient(Quote);

#[async_trait]
impl QuoteClient for FixedQuoteClient {
    async fn fetch_quote(&self, _req: &QuoteRequest) -> Result<Option<Quote>, QuoteTransportError> {
        Ok(Some(self.0.clone()))
    }
}

struct AlwaysOkSubmitter;

#[async_trait]
impl TransactionSubmitter for AlwaysOkSubmitter {
    async fn submit(&self, _tx: &Transaction) -> Result<String, String> {
        // A 64-hex signature, to prove the redaction check would catch one
        // if it ever leaked into a label — it must never appear below.
        Ok("b".repeat(64))
    }
}

fn unsigned_tx_base64(payer: &solana_sdk::pubkey::Pubkey) -> String {
    let message = Message::new(&[], Some(payer));
    let tx = Transaction::new_unsigned(message);
    let bytes = bincode::serialize(&tx).unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn executed_trade_emits_no_identifier_bearing_labels() {
    std::env::set_var("SERVER_ENCRYPTION_SECRET", "redaction-test-server-secret");
    let server_secret = ServerSecret::from_env().unwrap();

    let keypair = Keypair::new();
    let user_id = "user-redact-1";
    let wallet_id = "wallet-redact-1";

    let secret = keypair.to_bytes().to_vec();
    let env = envelope::encrypt_unprotected(&secret, server_secret.as_str(), user_id).unwrap();
    let wallet_repo = InMemoryWalletRepository::new();
    wallet_repo
        .insert(WalletRow {
            id: wallet_id.to_string(),
            user_id: user_id.to_string(),
            label: "primary".into(),
            public_key: keypair.pubkey().to_string(),
            is_protected: false,
            encrypted: Some(env),
            private_key: None,
            passphrase_hash: None,
            encryption_version: 1,
        })
        .await;

    let quote = Quote {
        input_mint: "So11111111111111111111111111111111111111112".into(),
        output_mint: "Mint1111111111111111111111111111111111111".into(),
        in_amount: 1_000_000,
        out_amount: 500_000,
        price_impact_pct: 1.0,
        unsigned_transaction: unsigned_tx_base64(&keypair.pubkey()),
    };
    let params = TradeParams {
        mint: "Mint1111111111111111111111111111111111111".into(),
        strategy: "default".into(),
        side: Side::Buy,
        input_mint: quote.input_mint.clone(),
        output_mint: quote.output_mint.clone(),
        amount: quote.in_amount,
        slippage_bps: 50,
        max_impact_pct: 5.0,
        decimals: 6,
        intent_hash: "intent-redaction".into(),
    };

    let market_data = AlwaysOkProvider;
    let quote_client = FixedQuoteClient(quote.clone());
    let sizer = PassthroughSizer;
    let arm_sessions = ArmSessionManager::new();
    let idempotency = InMemoryIdempotencyStore::new();
    let trade_repo = InMemoryTradeRepository::new();
    let tp_sl_repo = InMemoryTpSlRepository::new();
    let submitter = AlwaysOkSubmitter;
    let metrics = RecordingMetricsSink::new();

    let executor = TradeExecutor {
        risk_cfg: RiskGateConfig::default(),
        market_data: &market_data,
        quote_client: &quote_client,
        sizer: &sizer,
        wallet_repo: &wallet_repo,
        arm_sessions: &arm_sessions,
        server_secret: Some(&server_secret),
        submitter: &submitter,
        idempotency: &idempotency,
        trade_repo: &trade_repo,
        tp_sl_repo: &tp_sl_repo,
        metrics: &metrics,
        cfg: ExecutorConfig::default(),
    };

    let ctx = UserCtx {
        user_id: user_id.to_string(),
        wallet_id: wallet_id.to_string(),
    };

    let outcome = executor.execute_trade(&ctx, &params, 1_700_000_000).await;
    assert!(matches!(outcome, ExecuteOutcome::Executed { error_class: "NONE", .. }));

    let pubkey_string = keypair.pubkey().to_string();
    let known = [user_id, wallet_id, pubkey_string.as_str()];
    for (name, _value, labels) in metrics.observations() {
        for (k, v) in &labels {
            assert!(
                !violates_redaction(v, &known),
                "observation {name} label {k}={v} violates redaction"
            );
        }
    }
    for (name, value_count, labels) in metrics.increments() {
        let _ = value_count;
        for (k, v) in &labels {
            assert!(
                !violates_redaction(v, &known),
                "increment {name} label {k}={v} violates redaction"
            );
        }
    }
}
