//! Repository Interface (C11): the operations the core needs from
//! persistent storage, expressed as traits with no ORM or database
//! specifics. A concrete persistence engine is explicitly out of scope —
//! these traits are the seam an embedder implements against. In-memory
//! reference implementations are provided for tests and for embedding
//! without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::wallet::WalletRow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    pub id: String,
    pub mint: String,
    #[serde(rename = "walletId")]
    pub wallet_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub strategy: String,
    pub side: TradeSide,
    #[serde(rename = "inAmount")]
    pub in_amount: u128,
    #[serde(rename = "outAmount")]
    pub out_amount: u128,
    #[serde(rename = "closedOutAmount")]
    pub closed_out_amount: u128,
    #[serde(rename = "entryPrice")]
    pub entry_price: f64,
    #[serde(rename = "entryPriceUSD")]
    pub entry_price_usd: f64,
    #[serde(rename = "exitPrice")]
    pub exit_price: Option<f64>,
    #[serde(rename = "exitPriceUSD")]
    pub exit_price_usd: Option<f64>,
    pub decimals: u32,
    #[serde(rename = "usdValue")]
    pub usd_value: f64,
    pub timestamp: i64,
    #[serde(rename = "exitedAt")]
    pub exited_at: Option<i64>,
    #[serde(rename = "reasonCode")]
    pub reason_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpSlRule {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "walletId")]
    pub wallet_id: String,
    pub mint: String,
    pub strategy: String,
    #[serde(rename = "sellPct")]
    pub sell_pct: f64,
    #[serde(rename = "tpPercent")]
    pub tp_percent: f64,
    #[serde(rename = "slPercent")]
    pub sl_percent: f64,
}

#[derive(Debug, Clone)]
pub struct IdempotencyToken {
    pub value: String,
    pub expires_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository backend error: {0}")]
    Backend(String),
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find_one(&self, id: &str, user_id: &str) -> RepoResult<Option<WalletRow>>;
    async fn find_active_for_user(&self, user_id: &str) -> RepoResult<Option<WalletRow>>;
    async fn update(&self, id: &str, row: WalletRow) -> RepoResult<()>;
    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<WalletRow>>;
}

#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn create(&self, row: TradeRow) -> RepoResult<()>;
    async fn find_open(&self, user_id: &str, wallet_id: &str, mint: &str, strategy: &str) -> RepoResult<Vec<TradeRow>>;
    async fn update(&self, id: &str, row: TradeRow) -> RepoResult<()>;
}

#[async_trait]
pub trait TpSlRepository: Send + Sync {
    async fn find(&self, user_id: &str, wallet_id: &str, mint: &str, strategy: &str) -> RepoResult<Vec<TpSlRule>>;
    async fn update(&self, rule: TpSlRule) -> RepoResult<()>;
    async fn delete_many(&self, user_id: &str, wallet_id: &str, mint: &str, strategy: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> RepoResult<Option<IdempotencyToken>>;
    async fn set(&self, key: &str, value: String, ttl_secs: i64, now: i64) -> RepoResult<()>;
}

/// In-memory `WalletRepository`, for tests and for embedding without a
/// database — not a persistence engine, analogous to a no-op store used
/// to exercise orchestration logic in isolation.
#[derive(Default)]
pub struct InMemoryWalletRepository {
    rows: Arc<Mutex<HashMap<String, WalletRow>>>,
}

impl InMemoryWalletRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, row: WalletRow) {
        self.rows.lock().await.insert(row.id.clone(), row);
    }
}

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn find_one(&self, id: &str, user_id: &str) -> RepoResult<Option<WalletRow>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn find_active_for_user(&self, user_id: &str) -> RepoResult<Option<WalletRow>> {
        let rows = self.rows.lock().await;
        Ok(rows.values().find(|r| r.user_id == user_id).cloned())
    }

    async fn update(&self, id: &str, row: WalletRow) -> RepoResult<()> {
        self.rows.lock().await.insert(id.to_string(), row);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<WalletRow>> {
        let rows = self.rows.lock().await;
        Ok(rows.values().filter(|r| r.user_id == user_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryTradeRepository {
    rows: Arc<Mutex<HashMap<String, TradeRow>>>,
}

impl InMemoryTradeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn create(&self, row: TradeRow) -> RepoResult<()> {
        self.rows.lock().await.insert(row.id.clone(), row);
        Ok(())
    }

    async fn find_open(&self, user_id: &str, wallet_id: &str, mint: &str, strategy: &str) -> RepoResult<Vec<TradeRow>> {
        let rows = self.rows.lock().await;
        let mut open: Vec<TradeRow> = rows
            .values()
            .filter(|r| {
                r.user_id == user_id
                    && r.wallet_id == wallet_id
                    && r.mint == mint
                    && r.strategy == strategy
                    && r.out_amount > 0
            })
            .cloned()
            .collect();
        open.sort_by_key(|r| r.timestamp);
        Ok(open)
    }

    async fn update(&self, id: &str, row: TradeRow) -> RepoResult<()> {
        self.rows.lock().await.insert(id.to_string(), row);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTpSlRepository {
    rules: Arc<Mutex<HashMap<String, TpSlRule>>>,
}

impl InMemoryTpSlRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TpSlRepository for InMemoryTpSlRepository {
    async fn find(&self, user_id: &str, wallet_id: &str, mint: &str, strategy: &str) -> RepoResult<Vec<TpSlRule>> {
        let rules = self.rules.lock().await;
        Ok(rules
            .values()
            .filter(|r| r.user_id == user_id && r.wallet_id == wallet_id && r.mint == mint && r.strategy == strategy)
            .cloned()
            .collect())
    }

    async fn update(&self, rule: TpSlRule) -> RepoResult<()> {
        self.rules.lock().await.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn delete_many(&self, user_id: &str, wallet_id: &str, mint: &str, strategy: &str) -> RepoResult<()> {
        let mut rules = self.rules.lock().await;
        rules.retain(|_, r| {
            !(r.user_id == user_id && r.wallet_id == wallet_id && r.mint == mint && r.strategy == strategy)
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<Mutex<HashMap<String, IdempotencyToken>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> RepoResult<Option<IdempotencyToken>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String, ttl_secs: i64, now: i64) -> RepoResult<()> {
        self.entries.lock().await.insert(
            key.to_string(),
            IdempotencyToken {
                value,
                expires_at: now + ttl_secs,
            },
        );
        Ok(())
    }
}
