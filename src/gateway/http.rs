//! HTTP implementation of the market gateway.
//!
//! One reqwest client with a per-call deadline; a direct rate limiter
//! enforces the minimum spacing between calls so bursts never overrun the
//! upstream quota. Transient upstream failures are retried with jittered
//! backoff; everything else surfaces to the caller typed.

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{
    MarketGateway, TagDistribution, TokenHolderStat, TokenInfo, TokenPriceInfo, TokenStats,
    TokenWalletTagsStat, TradeRecord, TraderActivity, TrendingToken, WalletHoldingInfo,
    WalletInfo, WalletStat,
};
use crate::config::GatewayConfig;
use crate::error::OracleError;
use crate::types::TradeAction;
use crate::utils::retry::call_gateway_with_retry;
use async_trait::async_trait;

/// Market gateway over HTTP.
pub struct HttpGateway {
    config: GatewayConfig,
    client: reqwest::Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, OracleError> {
        if config.base_url.is_empty() {
            return Err(OracleError::invalid_argument("gateway base_url is required"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OracleError::Permanent(format!("failed to build http client: {e}")))?;

        // One permit per rate_limit_delay keeps the minimum inter-call spacing.
        let period = Duration::from_millis(config.rate_limit_delay_ms.max(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(3).unwrap()));
        let limiter = RateLimiter::direct(quota);

        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    #[instrument(skip(self), fields(base = %self.config.base_url))]
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, OracleError> {
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("device_id", self.config.device_id.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("from_app", self.config.from_app.as_str()),
                ("app_ver", self.config.app_ver.as_str()),
                ("tz_name", self.config.tz_name.as_str()),
                ("tz_offset", self.config.tz_offset.as_str()),
                ("app_lang", self.config.app_lang.as_str()),
            ]);
        for (key, value) in query {
            request = request.query(&[(*key, value.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::transient(format!("gateway timeout: {e}"))
            } else {
                OracleError::transient(format!("gateway request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(self.config.rate_limit_delay_ms);
            return Err(OracleError::RateLimited { retry_after_ms });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(OracleError::not_found(format!("gateway 404 for {path}")));
        }
        if status.is_server_error() {
            return Err(OracleError::transient(format!("gateway {status} for {path}")));
        }
        if !status.is_success() {
            return Err(OracleError::Permanent(format!("gateway {status} for {path}")));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| OracleError::Permanent(format!("malformed gateway response: {e}")))?;
        if envelope.code != 0 {
            warn!(code = envelope.code, msg = %envelope.msg, path, "gateway error envelope");
            return Err(OracleError::transient(format!(
                "gateway error {}: {}",
                envelope.code, envelope.msg
            )));
        }
        envelope
            .data
            .ok_or_else(|| OracleError::not_found(format!("empty gateway payload for {path}")))
    }

    fn require_address(value: &str, what: &str) -> Result<(), OracleError> {
        if value.is_empty() {
            return Err(OracleError::invalid_argument(format!("{what} address is empty")));
        }
        Ok(())
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

fn trade_action(event: &str) -> TradeAction {
    match event {
        "buy" => TradeAction::Buy,
        "sell" => TradeAction::Sell,
        _ => TradeAction::Transfer,
    }
}

// Wire formats, mapped to the normalised gateway types below.

#[derive(Debug, Deserialize)]
struct RawTokenInfo {
    #[serde(default)]
    address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    total_supply: i64,
    #[serde(default)]
    holder_count: i64,
    #[serde(default)]
    logo: String,
    #[serde(default)]
    twitter_username: String,
    #[serde(default)]
    website: String,
    #[serde(default)]
    telegram: String,
    #[serde(default)]
    creation_timestamp: Option<i64>,
}

impl RawTokenInfo {
    fn normalise(self, fallback_address: &str) -> TokenInfo {
        TokenInfo {
            address: if self.address.is_empty() {
                fallback_address.to_string()
            } else {
                self.address
            },
            symbol: self.symbol,
            name: self.name,
            total_supply: self.total_supply,
            holder_count: self.holder_count,
            logo: self.logo,
            twitter: self.twitter_username,
            website: self.website,
            telegram: self.telegram,
            created_timestamp: self.creation_timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(default)]
    tx_hash: String,
    #[serde(default)]
    block_number: u64,
    #[serde(default)]
    maker: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    price_usd: f64,
    #[serde(default)]
    timestamp: i64,
}

impl RawTrade {
    fn normalise(self) -> TradeRecord {
        TradeRecord {
            tx_hash: self.tx_hash,
            block_number: self.block_number,
            wallet_address: self.maker,
            trade_type: trade_action(&self.event),
            amount: self.amount,
            price: self.price_usd,
            timestamp: timestamp(self.timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTrades {
    #[serde(default)]
    history: Vec<RawTrade>,
}

#[derive(Debug, Deserialize)]
struct RawTrader {
    #[serde(default)]
    address: String,
    #[serde(default)]
    buy_volume_cur: f64,
    #[serde(default)]
    sell_volume_cur: f64,
    #[serde(default)]
    buy_tx_count_cur: i64,
    #[serde(default)]
    sell_tx_count_cur: i64,
    #[serde(default)]
    first_trade_timestamp: Option<i64>,
    #[serde(default)]
    last_trade_timestamp: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
}

impl RawTrader {
    fn normalise(self) -> TraderActivity {
        TraderActivity {
            address: self.address,
            buy_volume: self.buy_volume_cur,
            sell_volume: self.sell_volume_cur,
            buy_count: self.buy_tx_count_cur,
            sell_count: self.sell_tx_count_cur,
            trade_count: self.buy_tx_count_cur + self.sell_tx_count_cur,
            first_trade: self.first_trade_timestamp.map(timestamp),
            last_trade: self.last_trade_timestamp.map(timestamp),
            tags: self.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawWalletStat {
    #[serde(default)]
    total_trades: i64,
    #[serde(default)]
    winning_trades: i64,
    #[serde(default)]
    total_profit: f64,
    #[serde(default)]
    fast_tx_ratio: f64,
}

#[derive(Debug, Deserialize)]
struct RawHolding {
    #[serde(default)]
    token_address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    usd_value: f64,
    #[serde(default)]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct RawWalletInfo {
    #[serde(default)]
    address: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawTagStat {
    #[serde(default)]
    tag: String,
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct RawHolderStat {
    #[serde(default)]
    holder_count: i64,
    #[serde(default)]
    top10_ratio: f64,
    #[serde(default)]
    avg_hold_time_hours: f64,
}

#[derive(Debug, Deserialize)]
struct RawTrending {
    #[serde(default)]
    address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    volume_24h: f64,
    #[serde(default)]
    price_change_24h: f64,
}

#[async_trait]
impl MarketGateway for HttpGateway {
    async fn token_info(&self, token: &str) -> Result<TokenInfo, OracleError> {
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/token_info/sol/{token}");
        let raw: RawTokenInfo = call_gateway_with_retry(|| self.get_json(&path, &[])).await?;
        debug!(token, "fetched token info");
        Ok(raw.normalise(token))
    }

    async fn token_stats(&self, token: &str) -> Result<TokenStats, OracleError> {
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/token_stat/sol/{token}");
        call_gateway_with_retry(|| self.get_json(&path, &[])).await
    }

    async fn token_trades(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, OracleError> {
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/token_trades/sol/{token}");
        let query = [("limit", limit.to_string())];
        let raw: RawTrades = call_gateway_with_retry(|| self.get_json(&path, &query)).await?;
        Ok(raw.history.into_iter().map(RawTrade::normalise).collect())
    }

    async fn token_price(&self, token: &str) -> Result<TokenPriceInfo, OracleError> {
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/token_price/sol/{token}");
        call_gateway_with_retry(|| self.get_json(&path, &[])).await
    }

    async fn wallet_token_trades(
        &self,
        wallet: &str,
        token: &str,
        limit: usize,
    ) -> Result<Vec<TradeRecord>, OracleError> {
        Self::require_address(wallet, "wallet")?;
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/wallet_token_trades/sol/{wallet}/{token}");
        let query = [("limit", limit.to_string())];
        let raw: RawTrades = call_gateway_with_retry(|| self.get_json(&path, &query)).await?;
        Ok(raw.history.into_iter().map(RawTrade::normalise).collect())
    }

    async fn all_token_traders(&self, token: &str) -> Result<Vec<TraderActivity>, OracleError> {
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/token_traders/sol/{token}");
        let raw: Vec<RawTrader> = call_gateway_with_retry(|| self.get_json(&path, &[])).await?;
        Ok(raw.into_iter().map(RawTrader::normalise).collect())
    }

    async fn token_holder_stat(&self, token: &str) -> Result<TokenHolderStat, OracleError> {
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/token_holder_stat/sol/{token}");
        let raw: RawHolderStat = call_gateway_with_retry(|| self.get_json(&path, &[])).await?;
        Ok(TokenHolderStat {
            holder_count: raw.holder_count,
            top10_ratio: raw.top10_ratio,
            avg_hold_time_hours: raw.avg_hold_time_hours,
        })
    }

    async fn token_wallet_tags_stat(
        &self,
        token: &str,
    ) -> Result<TokenWalletTagsStat, OracleError> {
        Self::require_address(token, "token")?;
        let path = format!("/api/v1/token_wallet_tags_stat/sol/{token}");
        let raw: Vec<RawTagStat> = call_gateway_with_retry(|| self.get_json(&path, &[])).await?;
        Ok(TokenWalletTagsStat {
            distributions: raw
                .into_iter()
                .map(|d| TagDistribution {
                    tag: d.tag,
                    count: d.count,
                })
                .collect(),
        })
    }

    async fn wallet_info(&self, wallet: &str) -> Result<WalletInfo, OracleError> {
        Self::require_address(wallet, "wallet")?;
        let path = format!("/api/v1/wallet_info/sol/{wallet}");
        let raw: RawWalletInfo = call_gateway_with_retry(|| self.get_json(&path, &[])).await?;
        Ok(WalletInfo {
            address: if raw.address.is_empty() {
                wallet.to_string()
            } else {
                raw.address
            },
            tags: raw.tags,
        })
    }

    async fn all_wallet_holdings(
        &self,
        wallet: &str,
    ) -> Result<Vec<WalletHoldingInfo>, OracleError> {
        Self::require_address(wallet, "wallet")?;
        let path = format!("/api/v1/wallet_holdings/sol/{wallet}");
        let raw: Vec<RawHolding> = call_gateway_with_retry(|| self.get_json(&path, &[])).await?;
        Ok(raw
            .into_iter()
            .map(|h| WalletHoldingInfo {
                token_address: h.token_address,
                token_symbol: h.symbol,
                amount: h.amount,
                usd_value: h.usd_value,
                price: h.price,
            })
            .collect())
    }

    async fn wallet_stat(&self, wallet: &str, period: &str) -> Result<WalletStat, OracleError> {
        Self::require_address(wallet, "wallet")?;
        let path = format!("/api/v1/wallet_stat/sol/{wallet}");
        let query = [("period", period.to_string())];
        let raw: RawWalletStat = call_gateway_with_retry(|| self.get_json(&path, &query)).await?;
        Ok(WalletStat {
            total_trades: raw.total_trades,
            winning_trades: raw.winning_trades,
            total_profit: raw.total_profit,
            fast_tx_ratio: raw.fast_tx_ratio,
        })
    }

    async fn trending(&self, timeframe: &str) -> Result<Vec<TrendingToken>, OracleError> {
        let query = [("timeframe", timeframe.to_string())];
        let raw: Vec<RawTrending> =
            call_gateway_with_retry(|| self.get_json("/api/v1/rank/sol/swaps", &query)).await?;
        Ok(raw
            .into_iter()
            .map(|t| TrendingToken {
                address: t.address,
                symbol: t.symbol,
                volume_24h: t.volume_24h,
                price_change_24h: t.price_change_24h,
            })
            .collect())
    }

    async fn completed_coins(&self, limit: usize) -> Result<Vec<TokenInfo>, OracleError> {
        let query = [("limit", limit.to_string())];
        let raw: Vec<RawTokenInfo> =
            call_gateway_with_retry(|| self.get_json("/api/v1/rank/sol/completed", &query)).await?;
        Ok(raw.into_iter().map(|t| t.normalise("")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_action_mapping() {
        assert_eq!(trade_action("buy"), TradeAction::Buy);
        assert_eq!(trade_action("sell"), TradeAction::Sell);
        assert_eq!(trade_action("mint"), TradeAction::Transfer);
    }

    #[test]
    fn test_empty_address_rejected() {
        let gateway = HttpGateway::new(GatewayConfig::default()).unwrap();
        let err = futures_block_on(gateway.token_info("")).unwrap_err();
        assert!(matches!(err, OracleError::InvalidArgument(_)));
    }

    // Minimal single-future executor so the validation test avoids a runtime.
    fn futures_block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }
}
