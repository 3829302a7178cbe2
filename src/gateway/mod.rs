//! Market-data gateway contract.
//!
//! The Token Engine and Wallet Intelligence consume external market data
//! exclusively through [`MarketGateway`], so the HTTP client and test
//! doubles are interchangeable. Every method returns a strongly-typed
//! response or a typed [`OracleError`]; gateway failures surface to the
//! caller instead of degrading silently.

pub mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::types::TradeAction;

/// Token identity and social metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub total_supply: i64,
    pub holder_count: i64,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub twitter: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub telegram: String,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
}

/// Rolling market statistics for a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenStats {
    pub holder_count: i64,
    pub volume_1h: f64,
    pub volume_24h: f64,
    pub price: f64,
    pub market_cap: f64,
    pub price_change_1h: f64,
    pub buy_count_1h: i64,
    pub sell_count_1h: i64,
}

/// Spot price view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenPriceInfo {
    pub price: f64,
    pub change_1h: f64,
    pub change_24h: f64,
}

/// One raw trade from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tx_hash: String,
    pub block_number: u64,
    pub wallet_address: String,
    pub trade_type: TradeAction,
    pub amount: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn total_value(&self) -> f64 {
        self.amount * self.price
    }
}

/// Aggregated activity of one trader on one token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraderActivity {
    pub address: String,
    pub buy_volume: f64,
    pub sell_volume: f64,
    /// True per-side counts when the gateway provides them, else zero.
    #[serde(default)]
    pub buy_count: i64,
    #[serde(default)]
    pub sell_count: i64,
    pub trade_count: i64,
    #[serde(default)]
    pub first_trade: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_trade: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Holder concentration summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenHolderStat {
    pub holder_count: i64,
    pub top10_ratio: f64,
    pub avg_hold_time_hours: f64,
}

/// Wallet-tag histogram over a token's population.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenWalletTagsStat {
    pub distributions: Vec<TagDistribution>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagDistribution {
    pub tag: String,
    pub count: usize,
}

/// Wallet identity plus gateway-assigned tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletInfo {
    pub address: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One token held by a wallet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletHoldingInfo {
    pub token_address: String,
    pub token_symbol: String,
    pub amount: f64,
    pub usd_value: f64,
    pub price: f64,
}

/// Aggregate trading statistics for a wallet over a period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletStat {
    pub total_trades: i64,
    pub winning_trades: i64,
    pub total_profit: f64,
    /// Share of trades landing within seconds of a token launch.
    #[serde(default)]
    pub fast_tx_ratio: f64,
}

/// Trending discovery entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendingToken {
    pub address: String,
    pub symbol: String,
    pub volume_24h: f64,
    pub price_change_24h: f64,
}

/// Outbound market-data interface.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    async fn token_info(&self, token: &str) -> Result<TokenInfo, OracleError>;
    async fn token_stats(&self, token: &str) -> Result<TokenStats, OracleError>;
    async fn token_trades(&self, token: &str, limit: usize)
        -> Result<Vec<TradeRecord>, OracleError>;
    async fn token_price(&self, token: &str) -> Result<TokenPriceInfo, OracleError>;
    async fn wallet_token_trades(
        &self,
        wallet: &str,
        token: &str,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, OracleError>;
    async fn all_token_traders(&self, token: &str) -> Result<Vec<TraderActivity>, OracleError>;
    async fn token_holder_stat(&self, token: &str) -> Result<TokenHolderStat, OracleError>;
    async fn token_wallet_tags_stat(
        &self,
        token: &str,
    ) -> Result<TokenWalletTagsStat, OracleError>;
    async fn wallet_info(&self, wallet: &str) -> Result<WalletInfo, OracleError>;
    async fn all_wallet_holdings(
        &self,
        wallet: &str,
    ) -> Result<Vec<WalletHoldingInfo>, OracleError>;
    async fn wallet_stat(&self, wallet: &str, period: &str) -> Result<WalletStat, OracleError>;
    async fn trending(&self, timeframe: &str) -> Result<Vec<TrendingToken>, OracleError>;
    async fn completed_coins(&self, limit: usize) -> Result<Vec<TokenInfo>, OracleError>;
}
