//! Shared test fixtures: a configurable in-memory market gateway.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use memoracle::error::OracleError;
use memoracle::gateway::{
    MarketGateway, TokenHolderStat, TokenInfo, TokenPriceInfo, TokenStats, TokenWalletTagsStat,
    TradeRecord, TraderActivity, TrendingToken, WalletHoldingInfo, WalletInfo, WalletStat,
};

/// Scriptable gateway double. Unset lookups return the same shapes the
/// HTTP client produces for missing upstream data: typed NotFound for
/// identity lookups, empty collections for feeds.
#[derive(Default)]
pub struct MockGateway {
    pub token_infos: RwLock<HashMap<String, TokenInfo>>,
    pub token_stats: RwLock<HashMap<String, TokenStats>>,
    pub token_trades: RwLock<HashMap<String, Vec<TradeRecord>>>,
    pub wallet_token_trades: RwLock<HashMap<(String, String), Vec<TradeRecord>>>,
    pub traders: RwLock<HashMap<String, Vec<TraderActivity>>>,
    pub wallet_infos: RwLock<HashMap<String, WalletInfo>>,
    pub wallet_stats: RwLock<HashMap<String, WalletStat>>,
    pub tag_stats: RwLock<HashMap<String, TokenWalletTagsStat>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_token_info(&self, token: &str, info: TokenInfo) {
        self.token_infos.write().await.insert(token.to_string(), info);
    }

    pub async fn set_token_stats(&self, token: &str, stats: TokenStats) {
        self.token_stats.write().await.insert(token.to_string(), stats);
    }

    pub async fn set_token_trades(&self, token: &str, trades: Vec<TradeRecord>) {
        self.token_trades.write().await.insert(token.to_string(), trades);
    }

    pub async fn set_wallet_token_trades(&self, wallet: &str, token: &str, trades: Vec<TradeRecord>) {
        self.wallet_token_trades
            .write()
            .await
            .insert((wallet.to_string(), token.to_string()), trades);
    }

    pub async fn set_traders(&self, token: &str, traders: Vec<TraderActivity>) {
        self.traders.write().await.insert(token.to_string(), traders);
    }

    pub async fn set_wallet_info(&self, wallet: &str, info: WalletInfo) {
        self.wallet_infos.write().await.insert(wallet.to_string(), info);
    }

    pub async fn set_wallet_stat(&self, wallet: &str, stat: WalletStat) {
        self.wallet_stats.write().await.insert(wallet.to_string(), stat);
    }

    pub async fn set_tag_stats(&self, token: &str, stats: TokenWalletTagsStat) {
        self.tag_stats.write().await.insert(token.to_string(), stats);
    }
}

#[async_trait]
impl MarketGateway for MockGateway {
    async fn token_info(&self, token: &str) -> Result<TokenInfo, OracleError> {
        self.token_infos
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| OracleError::not_found(format!("token {token}")))
    }

    async fn token_stats(&self, token: &str) -> Result<TokenStats, OracleError> {
        self.token_stats
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| OracleError::not_found(format!("stats for {token}")))
    }

    async fn token_trades(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, OracleError> {
        let mut trades = self
            .token_trades
            .read()
            .await
            .get(token)
            .cloned()
            .unwrap_or_default();
        trades.truncate(limit);
        Ok(trades)
    }

    async fn token_price(&self, token: &str) -> Result<TokenPriceInfo, OracleError> {
        let stats = self.token_stats(token).await?;
        Ok(TokenPriceInfo {
            price: stats.price,
            change_1h: stats.price_change_1h,
            change_24h: 0.0,
        })
    }

    async fn wallet_token_trades(
        &self,
        wallet: &str,
        token: &str,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, OracleError> {
        let mut trades = self
            .wallet_token_trades
            .read()
            .await
            .get(&(wallet.to_string(), token.to_string()))
            .cloned()
            .unwrap_or_default();
        trades.truncate(limit);
        Ok(trades)
    }

    async fn all_token_traders(&self, token: &str) -> Result<Vec<TraderActivity>, OracleError> {
        Ok(self.traders.read().await.get(token).cloned().unwrap_or_default())
    }

    async fn token_holder_stat(&self, _token: &str) -> Result<TokenHolderStat, OracleError> {
        Ok(TokenHolderStat::default())
    }

    async fn token_wallet_tags_stat(
        &self,
        token: &str,
    ) -> Result<TokenWalletTagsStat, OracleError> {
        Ok(self
            .tag_stats
            .read()
            .await
            .get(token)
            .cloned()
            .unwrap_or_default())
    }

    async fn wallet_info(&self, wallet: &str) -> Result<WalletInfo, OracleError> {
        Ok(self
            .wallet_infos
            .read()
            .await
            .get(wallet)
            .cloned()
            .unwrap_or_else(|| WalletInfo {
                address: wallet.to_string(),
                tags: Vec::new(),
            }))
    }

    async fn all_wallet_holdings(
        &self,
        _wallet: &str,
    ) -> Result<Vec<WalletHoldingInfo>, OracleError> {
        Ok(Vec::new())
    }

    async fn wallet_stat(&self, wallet: &str, _period: &str) -> Result<WalletStat, OracleError> {
        Ok(self
            .wallet_stats
            .read()
            .await
            .get(wallet)
            .cloned()
            .unwrap_or_default())
    }

    async fn trending(&self, _timeframe: &str) -> Result<Vec<TrendingToken>, OracleError> {
        Ok(Vec::new())
    }

    async fn completed_coins(&self, _limit: usize) -> Result<Vec<TokenInfo>, OracleError> {
        Ok(Vec::new())
    }
}
