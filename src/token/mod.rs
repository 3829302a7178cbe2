//! Token Engine.
//!
//! Token metadata cache, trust-enriched metrics, lifecycle state with
//! event emission, X-Score composition and the price/volume movement
//! monitor. Gateway failures surface typed to callers; cached data is
//! never silently substituted when a refresh was requested.

pub mod anti_dump;
pub mod monitor;
pub mod xscore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use moka::future::Cache as MokaCache;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{StreamNames, TokenEngineConfig, Tunings};
use crate::error::OracleError;
use crate::gateway::MarketGateway;
use crate::pipeline::{events, Event, Pipeline, TokenStateSink};
use crate::storage::Store;
use crate::trust::TrustNetwork;
use crate::types::{
    LifecycleState, ReactivationCandidate, Token, TokenMetrics, TokenTrade, WalletAnalysis,
    XScoreResult,
};

/// Trades fetched per recent-trade query.
const TRADE_FETCH_LIMIT: usize = 100;

/// The token engine.
pub struct TokenEngine {
    gateway: Arc<dyn MarketGateway>,
    trust: Arc<TrustNetwork>,
    store: Arc<dyn Store>,
    pipeline: Arc<Pipeline>,
    streams: StreamNames,
    config: TokenEngineConfig,
    tunings: Tunings,
    /// TTL'd metadata cache; identity data changes rarely.
    tokens: MokaCache<String, Token>,
    /// Previous metrics snapshot per token, single-writer from the
    /// monitor loop. HTTP reads share this lock.
    snapshots: RwLock<HashMap<String, TokenMetrics>>,
    watched: RwLock<HashSet<String>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TokenEngine {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        trust: Arc<TrustNetwork>,
        store: Arc<dyn Store>,
        pipeline: Arc<Pipeline>,
        streams: StreamNames,
        config: TokenEngineConfig,
        tunings: Tunings,
    ) -> Self {
        let tokens = MokaCache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs.max(1)))
            .build();
        Self {
            gateway,
            trust,
            store,
            pipeline,
            streams,
            config,
            tunings,
            tokens,
            snapshots: RwLock::new(HashMap::new()),
            watched: RwLock::new(HashSet::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start background work (the price monitor, when enabled).
    pub async fn start(self: Arc<Self>) -> Result<()> {
        info!("starting token engine");
        if self.config.enable_price_monitoring {
            let interval = Duration::from_secs(self.config.price_monitoring_interval_secs.max(1));
            let this = Arc::clone(&self);
            let handle = tokio::spawn(async move {
                this.price_monitor_loop(interval).await;
            });
            self.tasks.lock().await.push(handle);
            info!(
                interval_secs = self.config.price_monitoring_interval_secs,
                "price monitoring started"
            );
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("shutting down token engine");
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
    }

    /// Register a token with the movement monitor.
    pub async fn watch_token(&self, token: &str) {
        self.watched.write().await.insert(token.to_string());
    }

    pub async fn unwatch_token(&self, token: &str) {
        self.watched.write().await.remove(token);
    }

    /// Cache first, gateway on miss; the normalised token is persisted
    /// and cached.
    pub async fn get_token(&self, token_address: &str) -> Result<Token, OracleError> {
        if let Some(token) = self.tokens.get(token_address).await {
            return Ok(token);
        }

        let info = self.gateway.token_info(token_address).await?;
        let state = self
            .store
            .token_state(token_address)
            .await
            .unwrap_or_default();
        let token = Token {
            address: token_address.to_string(),
            symbol: info.symbol,
            name: info.name,
            total_supply: info.total_supply,
            holder_count: info.holder_count,
            lifecycle_state: state,
            created_timestamp: info.created_timestamp,
            last_trade_timestamp: None,
            logo: info.logo,
            twitter: info.twitter,
            website: info.website,
            telegram: info.telegram,
            cached_at: Some(Utc::now()),
        };

        if let Err(e) = self.store.save_token(&token).await {
            warn!(token = token_address, error = %e, "failed to persist token");
        }
        self.tokens
            .insert(token_address.to_string(), token.clone())
            .await;
        Ok(token)
    }

    /// Fresh gateway stats enriched with trust metrics. Always a live
    /// fetch; `updated_at` is now.
    pub async fn get_token_metrics(&self, token_address: &str) -> Result<TokenMetrics, OracleError> {
        let stats = self.gateway.token_stats(token_address).await?;

        let mut metrics = TokenMetrics {
            token_address: token_address.to_string(),
            price: stats.price,
            market_cap: stats.market_cap,
            volume_1h: stats.volume_1h,
            volume_24h: stats.volume_24h,
            price_change_1h: stats.price_change_1h,
            buy_count_1h: stats.buy_count_1h,
            sell_count_1h: stats.sell_count_1h,
            holder_count: stats.holder_count,
            intelligent_holders: 0,
            average_trust_score: 0.0,
            smart_money_holders: 0,
            updated_at: Utc::now(),
        };

        let trust = self.trust.get_token_trust_metrics(token_address).await;
        metrics.intelligent_holders = trust.trusted_wallets as i64;
        metrics.average_trust_score = trust.avg_trust_score;
        metrics.smart_money_holders = trust.smart_money_count as i64;

        Ok(metrics)
    }

    /// Most recent stored snapshot: the monitor's in-memory copy first,
    /// the metrics time series otherwise.
    pub async fn get_token_last_snapshot(
        &self,
        token_address: &str,
    ) -> Result<Option<TokenMetrics>> {
        if let Some(snapshot) = self.snapshots.read().await.get(token_address) {
            return Ok(Some(snapshot.clone()));
        }
        self.store.token_last_snapshot(token_address).await
    }

    /// Persist a lifecycle transition and publish `state_change`.
    /// Idempotent: re-applying the current state is a no-op and emits
    /// nothing. The state is durable once persisted; the event itself is
    /// best-effort.
    pub async fn update_token_state(
        &self,
        token_address: &str,
        new_state: LifecycleState,
    ) -> Result<()> {
        let old_state = self.store.token_state(token_address).await.unwrap_or(None);
        if old_state == Some(new_state) {
            return Ok(());
        }

        self.store.update_token_state(token_address, new_state).await?;
        self.tokens.invalidate(token_address).await;
        info!(token = token_address, state = %new_state, "token state updated");

        let event = Event::new(events::STATE_CHANGE)
            .with("token_address", json!(token_address))
            .with(
                "old_state",
                json!(old_state.map(|s| s.as_str()).unwrap_or_default()),
            )
            .with("new_state", json!(new_state.as_str()));
        self.pipeline
            .publish_best_effort(&self.streams.token_events, event)
            .await;
        Ok(())
    }

    /// Persist a reactivation candidate and publish `reactivation`.
    pub async fn save_reactivation_metrics(
        &self,
        candidate: &ReactivationCandidate,
    ) -> Result<()> {
        self.store.save_reactivation(candidate).await?;
        info!(
            token = %candidate.token_address,
            score = candidate.reactivation_score,
            "reactivation metrics saved"
        );

        let event = Event::new(events::REACTIVATION)
            .with("token_address", json!(candidate.token_address))
            .with("token_symbol", json!(candidate.token_symbol))
            .with("reactivation_score", json!(candidate.reactivation_score))
            .with("changes", json!(candidate.changes));
        self.pipeline
            .publish_best_effort(&self.streams.token_events, event)
            .await;
        Ok(())
    }

    pub async fn get_tokens_by_states(&self, states: &[LifecycleState]) -> Result<Vec<Token>> {
        self.store.tokens_by_states(states).await
    }

    /// Gateway trades within the last `hours`, normalised.
    pub async fn get_token_recent_trades(
        &self,
        token_address: &str,
        hours: i64,
    ) -> Result<Vec<TokenTrade>, OracleError> {
        let trades = self
            .gateway
            .token_trades(token_address, TRADE_FETCH_LIMIT)
            .await?;
        let cutoff = Utc::now() - ChronoDuration::hours(hours);
        Ok(trades
            .into_iter()
            .filter(|t| t.timestamp > cutoff)
            .map(|t| TokenTrade {
                id: format!("{}-{}", t.tx_hash, t.block_number),
                token_address: token_address.to_string(),
                wallet_address: t.wallet_address,
                action: t.trade_type,
                amount: t.amount,
                price: t.price,
                total_value: t.amount * t.price,
                timestamp: t.timestamp,
                tx_hash: t.tx_hash,
                block_number: t.block_number,
            })
            .collect())
    }

    /// One wallet's trade history on one token, via the gateway.
    pub async fn get_wallet_token_history(
        &self,
        wallet_address: &str,
        token_address: &str,
    ) -> Result<Vec<TokenTrade>, OracleError> {
        let trades = self
            .gateway
            .wallet_token_trades(wallet_address, token_address, TRADE_FETCH_LIMIT)
            .await?;
        Ok(trades
            .into_iter()
            .map(|t| TokenTrade {
                id: format!("{}-{}", t.tx_hash, t.block_number),
                token_address: token_address.to_string(),
                wallet_address: wallet_address.to_string(),
                action: t.trade_type,
                amount: t.amount,
                price: t.price,
                total_value: t.amount * t.price,
                timestamp: t.timestamp,
                tx_hash: t.tx_hash,
                block_number: t.block_number,
            })
            .collect())
    }

    /// Composite X-Score. Without a wallet analysis, a minimal population
    /// view derived from holder count is used.
    pub async fn calculate_x_score(
        &self,
        token_address: &str,
        wallet_analysis: Option<&WalletAnalysis>,
    ) -> Result<XScoreResult, OracleError> {
        let metrics = self.get_token_metrics(token_address).await?;
        let token = self.get_token(token_address).await?;

        let fallback;
        let analysis = match wallet_analysis {
            Some(analysis) => analysis,
            None => {
                fallback = WalletAnalysis::empty(token_address, metrics.holder_count as usize);
                &fallback
            }
        };

        // Dump analysis is best-effort: an unreachable trade feed must not
        // fail the score.
        let trades = self
            .get_token_recent_trades(token_address, self.tunings.anti_dump.window_hours)
            .await
            .unwrap_or_default();
        let smart_wallets = analysis.smart_wallets();
        let anti_dump =
            anti_dump::detect_dump_pattern(&self.tunings.anti_dump, &trades, &smart_wallets);

        Ok(xscore::compose_x_score(
            &self.tunings.xscore,
            &token,
            &metrics,
            analysis,
            anti_dump,
        ))
    }

    fn volume_spike_event(&self, token: &str, current: &TokenMetrics, change: f64) -> Event {
        Event::new(events::VOLUME_SPIKE)
            .with("token_address", json!(token))
            .with("volume", json!(current.volume_24h))
            .with("volume_change", json!(change))
    }

    fn price_change_event(
        &self,
        token: &str,
        previous: &TokenMetrics,
        current: &TokenMetrics,
        change: f64,
    ) -> Event {
        Event::new(events::PRICE_CHANGE)
            .with("token_address", json!(token))
            .with("old_price", json!(previous.price))
            .with("new_price", json!(current.price))
            .with("price_change", json!(change))
    }

}

#[async_trait]
impl TokenStateSink for TokenEngine {
    async fn apply_state(&self, token: &str, state: LifecycleState) -> Result<()> {
        self.update_token_state(token, state).await
    }
}
