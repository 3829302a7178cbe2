//! Memory of Trust - the wallet/token reputation engine.
//!
//! Owns the in-memory [`TrustGraph`] exclusively; every other component
//! reads it through the query API here and mutates it only through
//! [`TrustNetwork::record_wallet_interaction`]. Persistence is
//! write-back: scores flush on significant change, on the maintenance
//! tick and on shutdown. Read paths degrade to neutral defaults when the
//! store is unavailable.

pub mod graph;
pub mod influence;
pub mod risk;
pub mod scoring;
pub mod similarity;

pub use graph::{TokenNode, TrustGraph, WalletNode, DEFAULT_TRUST_SCORE};

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::CacheHandle;
use crate::config::{MemoryConfig, Tunings};
use crate::error::OracleError;
use crate::storage::Store;
use crate::types::{
    ActiveWallet, TokenTrustMetrics, WalletInfluence, WalletInteraction, WalletRiskFactors,
    WalletSimilarity, WalletToken, WalletTrustScore,
};

/// Interactions pulled on startup to rebuild graph edges.
const GRAPH_LOAD_INTERACTIONS: i64 = 10_000;
/// Interaction window fetched per wallet/token history query.
const TOKEN_HISTORY_LIMIT: i64 = 100;

const TOKEN_METRICS_TTL: Duration = Duration::from_secs(30 * 60);
const SIMILARITY_TTL: Duration = Duration::from_secs(2 * 3600);
const RISK_TTL: Duration = Duration::from_secs(4 * 3600);
const INFLUENCERS_TTL: Duration = Duration::from_secs(4 * 3600);
const MOST_TRUSTED_TTL: Duration = Duration::from_secs(3600);
const HISTORY_TTL: Duration = Duration::from_secs(30 * 60);
const ACTIVE_WALLETS_TTL: Duration = Duration::from_secs(30 * 60);
const ACTIVE_COUNT_TTL: Duration = Duration::from_secs(3600);
/// Per-wallet cache entries older than this are purged by maintenance.
const STALE_CACHE_AGE: ChronoDuration = ChronoDuration::hours(24);

// System-report buckets.
const REPORT_SMART_THRESHOLD: f64 = 80.0;
const REPORT_TRUSTED_THRESHOLD: f64 = 70.0;
const REPORT_LOW_THRESHOLD: f64 = 30.0;

mod keys {
    pub fn wallet_trust(wallet: &str) -> String {
        format!("wallet:trust:{wallet}")
    }
    pub fn token_trust(token: &str) -> String {
        format!("token:trust:{token}")
    }
    pub fn similar(wallet: &str, min: f64, limit: usize) -> String {
        format!("wallet:similar:{wallet}:{min:.2}:{limit}")
    }
    pub fn risk(wallet: &str) -> String {
        format!("wallet:risk:{wallet}")
    }
    pub fn influencers(token: &str, limit: usize) -> String {
        format!("token:influencers:{token}:{limit}")
    }
    pub fn most_trusted(limit: usize) -> String {
        format!("wallets:most_trusted:{limit}")
    }
    pub fn history(wallet: &str, token: &str) -> String {
        format!("wallet:token:history:{wallet}:{token}")
    }
    pub fn active_wallets(token: &str, min_score: f64) -> String {
        format!("token:{token}:active_wallets:trust_score:{min_score:.1}")
    }
    pub fn active_count(token: &str) -> String {
        format!("token:{token}:active_wallets:count")
    }
}

/// Snapshot of the whole reputation system, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct TrustSystemReport {
    pub total_wallets: usize,
    pub total_tokens: usize,
    pub avg_trust_score: f64,
    pub smart_wallets_count: usize,
    pub trusted_wallets_count: usize,
    pub low_trust_count: usize,
    pub score_distribution: HashMap<String, usize>,
    pub top_active_tokens: Vec<TokenActivitySummary>,
    pub graph_age_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenActivitySummary {
    pub address: String,
    pub interactions: usize,
    pub wallets_count: usize,
}

/// The Memory of Trust engine.
pub struct TrustNetwork {
    store: Arc<dyn Store>,
    cache: CacheHandle,
    graph: RwLock<TrustGraph>,
    memory: MemoryConfig,
    tunings: Tunings,
    /// Wallets queued for async score recomputation.
    recompute_tx: mpsc::UnboundedSender<String>,
    recompute_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TrustNetwork {
    pub fn new(
        store: Arc<dyn Store>,
        cache: CacheHandle,
        memory: MemoryConfig,
        tunings: Tunings,
    ) -> Self {
        let (recompute_tx, recompute_rx) = mpsc::unbounded_channel();
        Self {
            store,
            cache,
            graph: RwLock::new(TrustGraph::new()),
            memory,
            tunings,
            recompute_tx,
            recompute_rx: Mutex::new(Some(recompute_rx)),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn trust_ttl(&self) -> Duration {
        Duration::from_secs(self.memory.cache_ttl_secs)
    }

    /// Load the graph from persistence, then start the maintenance loop
    /// and the score-recompute worker.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        info!("starting memory of trust");
        if let Err(e) = self.load_graph().await {
            // An empty graph beats refusing to start.
            error!(error = %e, "trust graph load failed, continuing with empty graph");
        }

        let mut tasks = self.tasks.lock().await;

        let this = Arc::clone(&self);
        tasks.push(tokio::spawn(async move {
            this.maintenance_loop().await;
        }));

        if let Some(rx) = self.recompute_rx.lock().await.take() {
            let this = Arc::clone(&self);
            tasks.push(tokio::spawn(async move {
                this.recompute_worker(rx).await;
            }));
        }
        drop(tasks);

        info!("memory of trust started");
        Ok(())
    }

    /// Drain queued wallet addresses and refresh their scores.
    async fn recompute_worker(&self, mut rx: mpsc::UnboundedReceiver<String>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                wallet = rx.recv() => {
                    match wallet {
                        Some(wallet) => self.refresh_wallet_trust_score(&wallet).await,
                        None => return,
                    }
                }
            }
        }
    }

    /// Cancel background work, join it, then flush dirty scores.
    pub async fn stop(&self) {
        info!("stopping memory of trust");
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
        drop(tasks);
        self.flush_graph().await;
        info!("memory of trust stopped");
    }

    async fn load_graph(&self) -> Result<()> {
        let scores = self
            .store
            .all_wallet_trust_scores()
            .await
            .context("failed to load persisted trust scores")?;

        let interactions = self
            .store
            .recent_interactions(GRAPH_LOAD_INTERACTIONS)
            .await
            .context("failed to load recent interactions")?;

        let mut fresh = TrustGraph::new();
        for score in &scores {
            let node = fresh.ensure_wallet(&score.address, score.trust_score);
            node.last_updated = score.last_updated;
        }
        for interaction in &interactions {
            let initial = match fresh.wallet(&interaction.wallet_address) {
                Some(node) => node.trust_score,
                None => self
                    .store
                    .wallet_trust_score(&interaction.wallet_address)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(DEFAULT_TRUST_SCORE),
            };
            fresh.record_edge(
                &interaction.id,
                &interaction.wallet_address,
                &interaction.token_address,
                initial,
            );
        }

        let wallets = fresh.wallet_count();
        let tokens = fresh.token_count();
        *self.graph.write().await = fresh;
        info!(wallets, tokens, "trust graph loaded");
        Ok(())
    }

    /// Persist every wallet score. Per-wallet failures are logged and do
    /// not stop the flush.
    async fn flush_graph(&self) {
        let snapshot: Vec<(String, f64, chrono::DateTime<Utc>)> = {
            let graph = self.graph.read().await;
            graph
                .wallets
                .values()
                .map(|n| (n.address.clone(), n.trust_score, n.last_updated))
                .collect()
        };
        let total = snapshot.len();
        for (address, score, updated) in snapshot {
            if let Err(e) = self
                .store
                .save_wallet_trust_score(&address, score, updated)
                .await
            {
                error!(wallet = %address, error = %e, "failed to flush trust score");
            }
        }
        debug!(wallets = total, "trust graph flushed");
    }

    /// Persist an interaction, update graph edges and schedule an async
    /// score recomputation for the wallet.
    pub async fn record_wallet_interaction(
        &self,
        interaction: &WalletInteraction,
    ) -> Result<(), OracleError> {
        if interaction.wallet_address.is_empty() || interaction.token_address.is_empty() {
            return Err(OracleError::invalid_argument(
                "wallet or token address is empty",
            ));
        }

        let mut canonical = interaction.clone();
        canonical.id = WalletInteraction::interaction_id(
            &interaction.tx_hash,
            &interaction.wallet_address,
            &interaction.token_address,
        );

        self.store
            .save_wallet_interaction(&canonical)
            .await
            .map_err(|e| OracleError::transient(format!("failed to persist interaction: {e}")))?;

        // Fetch before taking the write lock.
        let known = {
            let graph = self.graph.read().await;
            graph.wallet(&canonical.wallet_address).is_some()
        };
        let initial = if known {
            DEFAULT_TRUST_SCORE
        } else {
            self.store
                .wallet_trust_score(&canonical.wallet_address)
                .await
                .ok()
                .flatten()
                .unwrap_or(DEFAULT_TRUST_SCORE)
        };

        {
            let mut graph = self.graph.write().await;
            graph.record_edge(
                &canonical.id,
                &canonical.wallet_address,
                &canonical.token_address,
                initial,
            );
        }

        // Queued for the recompute worker; the send never blocks.
        let _ = self.recompute_tx.send(canonical.wallet_address.clone());

        Ok(())
    }

    /// Read order: cache, graph, store, computed default.
    pub async fn get_wallet_trust_score(&self, wallet: &str) -> f64 {
        let key = keys::wallet_trust(wallet);
        if let Some(score) = self.cache.get_f64(&key).await {
            return score;
        }

        {
            let graph = self.graph.read().await;
            if let Some(node) = graph.wallet(wallet) {
                let score = node.trust_score;
                drop(graph);
                let _ = self.cache.set_f64(&key, score, Some(self.trust_ttl())).await;
                return score;
            }
        }

        match self.store.wallet_trust_score(wallet).await {
            Ok(Some(score)) => {
                self.graph.write().await.set_wallet_score(wallet, score);
                let _ = self.cache.set_f64(&key, score, Some(self.trust_ttl())).await;
                score
            }
            Ok(None) => {
                let score = self.compute_wallet_trust_score(wallet).await;
                self.graph.write().await.set_wallet_score(wallet, score);
                if let Err(e) = self
                    .store
                    .save_wallet_trust_score(wallet, score, Utc::now())
                    .await
                {
                    warn!(wallet, error = %e, "failed to persist computed trust score");
                }
                let _ = self.cache.set_f64(&key, score, Some(self.trust_ttl())).await;
                score
            }
            Err(e) => {
                warn!(wallet, error = %e, "trust score read failed, using default");
                DEFAULT_TRUST_SCORE
            }
        }
    }

    async fn compute_wallet_trust_score(&self, wallet: &str) -> f64 {
        let tunings = &self.tunings.trust;
        let interactions = match self
            .store
            .wallet_interactions(wallet, tunings.history_limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(wallet, error = %e, "interaction history read failed");
                return DEFAULT_TRUST_SCORE;
            }
        };

        let similar = self
            .get_similar_wallets(wallet, tunings.network_min_similarity, tunings.network_sample)
            .await
            .unwrap_or_default();
        let network = scoring::network_performance(tunings, &similar);

        scoring::compute_trust_score(tunings, &interactions, network)
    }

    /// Recompute and apply write-back when the move is significant.
    async fn refresh_wallet_trust_score(&self, wallet: &str) {
        let new_score = self.compute_wallet_trust_score(wallet).await;

        let persist = {
            let mut graph = self.graph.write().await;
            match graph.wallets.get_mut(wallet) {
                Some(node) => {
                    if (node.trust_score - new_score).abs() > self.memory.trust_score_threshold {
                        node.trust_score = new_score;
                        node.last_updated = Utc::now();
                        true
                    } else {
                        false
                    }
                }
                None => {
                    graph.set_wallet_score(wallet, new_score);
                    true
                }
            }
        };

        if persist {
            if let Err(e) = self
                .store
                .save_wallet_trust_score(wallet, new_score, Utc::now())
                .await
            {
                warn!(wallet, error = %e, "trust score write-back failed");
            }
            let _ = self
                .cache
                .set_f64(&keys::wallet_trust(wallet), new_score, Some(self.trust_ttl()))
                .await;
            debug!(wallet, score = new_score, "trust score updated");
        }
    }

    /// Aggregate trust view over a token's wallet population.
    pub async fn get_token_trust_metrics(&self, token: &str) -> TokenTrustMetrics {
        let key = keys::token_trust(token);
        if let Some(metrics) = self.cache.get_json::<TokenTrustMetrics>(&key).await {
            return metrics;
        }

        let tunings = self.tunings.trust.clone();
        let wallets: Vec<String> = {
            let graph = self.graph.read().await;
            graph
                .token(token)
                .map(|n| n.wallets.clone())
                .unwrap_or_default()
        };

        let mut metrics = TokenTrustMetrics {
            token_address: token.to_string(),
            active_wallets: wallets.len(),
            ..Default::default()
        };
        if wallets.is_empty() {
            return metrics;
        }

        let mut scores: HashMap<String, f64> = HashMap::with_capacity(wallets.len());
        let mut total = 0.0;
        for wallet in &wallets {
            let score = self.get_wallet_trust_score(wallet).await;
            scores.insert(wallet.clone(), score);
            total += score;

            let bands = &tunings.score_bands;
            let band = if score >= bands.excellent {
                "excellent"
            } else if score >= bands.high {
                "high"
            } else if score >= bands.good {
                "good"
            } else if score >= bands.average {
                "average"
            } else if score >= bands.low {
                "low"
            } else {
                "poor"
            };
            *metrics
                .trust_score_distribution
                .entry(band.to_string())
                .or_insert(0) += 1;

            if score >= tunings.trusted_threshold {
                metrics.trusted_wallets += 1;
            }
            if score >= tunings.smart_threshold {
                metrics.smart_money_count += 1;
            }
        }
        metrics.avg_trust_score = total / wallets.len() as f64;
        metrics.smart_money_ratio = metrics.smart_money_count as f64 / wallets.len() as f64;

        // Early-trust ratio over the first entrants.
        if let Ok(early) = self
            .store
            .early_token_interactions(token, tunings.early_wallet_sample)
            .await
        {
            let mut early_wallets = Vec::new();
            for interaction in &early {
                if !early_wallets.contains(&interaction.wallet_address) {
                    early_wallets.push(interaction.wallet_address.clone());
                }
            }
            if !early_wallets.is_empty() {
                let mut trusted_early = 0usize;
                for wallet in &early_wallets {
                    let score = match scores.get(wallet) {
                        Some(score) => *score,
                        None => self.get_wallet_trust_score(wallet).await,
                    };
                    if score >= tunings.trusted_threshold {
                        trusted_early += 1;
                    }
                }
                metrics.early_trust_ratio = trusted_early as f64 / early_wallets.len() as f64;
            }
        }

        // Smart-money share of recent buy volume.
        let since = Utc::now() - ChronoDuration::hours(tunings.activity_window_hours);
        if let Ok(recent) = self.store.token_interactions_since(token, since).await {
            let mut total_buy = 0.0;
            let mut smart_buy = 0.0;
            for interaction in recent
                .iter()
                .filter(|i| i.action == crate::types::TradeAction::Buy)
            {
                total_buy += interaction.value;
                let score = match scores.get(&interaction.wallet_address) {
                    Some(score) => *score,
                    None => self.get_wallet_trust_score(&interaction.wallet_address).await,
                };
                if score >= tunings.smart_threshold {
                    smart_buy += interaction.value;
                }
            }
            if total_buy > 0.0 {
                metrics.smart_money_activity = smart_buy / total_buy * 100.0;
            }
        }

        let _ = self
            .cache
            .set_json(&key, &metrics, Some(TOKEN_METRICS_TTL))
            .await;
        metrics
    }

    /// Persisted similarities first, computed on demand otherwise. A
    /// brand-new wallet yields an empty list, not an error.
    pub async fn get_similar_wallets(
        &self,
        wallet: &str,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<WalletSimilarity>> {
        let key = keys::similar(wallet, min_similarity, limit);
        if let Some(rows) = self.cache.get_json::<Vec<WalletSimilarity>>(&key).await {
            return Ok(rows);
        }

        let mut rows = self
            .store
            .wallet_similarities(wallet, min_similarity, limit as i64)
            .await
            .unwrap_or_default();
        if rows.is_empty() {
            rows = similarity::compute_for_wallet(
                self.store.as_ref(),
                &self.tunings.similarity,
                wallet,
                min_similarity,
                limit,
            )
            .await?;
        }

        let _ = self.cache.set_json(&key, &rows, Some(SIMILARITY_TTL)).await;
        Ok(rows)
    }

    pub async fn get_most_trusted_wallets(&self, limit: usize) -> Result<Vec<WalletTrustScore>> {
        let key = keys::most_trusted(limit);
        if let Some(rows) = self.cache.get_json::<Vec<WalletTrustScore>>(&key).await {
            return Ok(rows);
        }
        let rows = self.store.most_trusted_wallets(limit as i64).await?;
        let _ = self
            .cache
            .set_json(&key, &rows, Some(MOST_TRUSTED_TTL))
            .await;
        Ok(rows)
    }

    /// Store passthrough, deliberately uncached.
    pub async fn get_wallet_tokens(&self, wallet: &str, limit: usize) -> Result<Vec<WalletToken>> {
        self.store.wallet_tokens(wallet, limit as i64).await
    }

    pub async fn get_wallet_token_history(
        &self,
        wallet: &str,
        token: &str,
    ) -> Result<Vec<WalletInteraction>> {
        let key = keys::history(wallet, token);
        if let Some(rows) = self.cache.get_json::<Vec<WalletInteraction>>(&key).await {
            return Ok(rows);
        }
        let rows = self
            .store
            .wallet_token_interactions(wallet, token, TOKEN_HISTORY_LIMIT)
            .await?;
        let _ = self.cache.set_json(&key, &rows, Some(HISTORY_TTL)).await;
        Ok(rows)
    }

    /// Lookup, compute-on-miss, persist.
    pub async fn get_token_influencers(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<WalletInfluence>> {
        let key = keys::influencers(token, limit);
        if let Some(rows) = self.cache.get_json::<Vec<WalletInfluence>>(&key).await {
            return Ok(rows);
        }

        let mut rows = self
            .store
            .token_influencers(token, limit as i64)
            .await
            .unwrap_or_default();
        if rows.is_empty() {
            rows = self.calculate_token_influencers(token, limit).await?;
        }

        let _ = self.cache.set_json(&key, &rows, Some(INFLUENCERS_TTL)).await;
        Ok(rows)
    }

    async fn calculate_token_influencers(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<WalletInfluence>> {
        let tunings = &self.tunings.influence;
        let traders = self
            .store
            .token_active_wallets(token, 0.0, tunings.trader_limit)
            .await?;

        let mut influencers = Vec::new();
        for trader in traders {
            let trust = self.get_wallet_trust_score(&trader.address).await;
            let history = match self
                .store
                .wallet_token_interactions(&trader.address, token, TOKEN_HISTORY_LIMIT)
                .await
            {
                Ok(rows) => rows,
                Err(_) => continue,
            };
            let summary = influence::summarize_history(&history, Utc::now());
            let breakdown =
                influence::compute_influence(tunings, trust, trader.entry_rank, &summary);
            if breakdown.score >= tunings.min_influence_score {
                influencers.push(WalletInfluence {
                    wallet_address: trader.address,
                    token_address: token.to_string(),
                    influence_score: breakdown.score,
                    volume_impact: summary.total_buy_volume,
                    timing_impact: breakdown.entry_rank_inverse,
                    price_impact: breakdown.hold_factor,
                    transaction_count: trader.transaction_count,
                });
            }
        }

        influencers.sort_by(|a, b| {
            b.influence_score
                .partial_cmp(&a.influence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        influencers.truncate(limit);

        if !influencers.is_empty() {
            if let Err(e) = self.store.save_token_influencers(token, &influencers).await {
                warn!(token, error = %e, "failed to persist influencers");
            }
        }
        Ok(influencers)
    }

    /// Lookup, compute-on-miss, persist. Empty history yields the neutral
    /// profile.
    pub async fn get_wallet_risk_factors(&self, wallet: &str) -> Result<WalletRiskFactors> {
        let key = keys::risk(wallet);
        if let Some(risk) = self.cache.get_json::<WalletRiskFactors>(&key).await {
            return Ok(risk);
        }

        let risk = match self.store.wallet_risk_factors(wallet).await {
            Ok(Some(risk)) => risk,
            _ => {
                let interactions = self
                    .store
                    .wallet_interactions(wallet, self.tunings.risk.history_limit)
                    .await
                    .unwrap_or_default();
                let risk = risk::compute_risk_factors(&self.tunings.risk, wallet, &interactions);
                if let Err(e) = self.store.save_wallet_risk_factors(&risk).await {
                    warn!(wallet, error = %e, "failed to persist risk factors");
                }
                risk
            }
        };

        let _ = self.cache.set_json(&key, &risk, Some(RISK_TTL)).await;
        Ok(risk)
    }

    pub async fn get_token_active_wallets(
        &self,
        token: &str,
        min_trust_score: f64,
        limit: usize,
    ) -> Result<Vec<ActiveWallet>> {
        let key = keys::active_wallets(token, min_trust_score);
        if let Some(rows) = self.cache.get_json::<Vec<ActiveWallet>>(&key).await {
            if !rows.is_empty() {
                return Ok(truncated(rows, limit));
            }
        }

        let rows = self
            .store
            .token_active_wallets(token, min_trust_score, limit as i64)
            .await
            .context("failed to load active wallets")?;
        let _ = self
            .cache
            .set_json(&key, &rows, Some(ACTIVE_WALLETS_TTL))
            .await;
        Ok(truncated(rows, limit))
    }

    pub async fn get_active_wallets_count(&self, token: &str) -> Result<i64> {
        let key = keys::active_count(token);
        if let Some(count) = self.cache.get_i64(&key).await {
            return Ok(count);
        }
        let count = self
            .store
            .active_wallets_count(token)
            .await
            .context("failed to count active wallets")?;
        let _ = self.cache.set_i64(&key, count, Some(ACTIVE_COUNT_TTL)).await;
        Ok(count)
    }

    /// Full batch similarity recompute over the top-trusted wallet pool.
    pub async fn update_wallet_similarities(&self) -> Result<()> {
        let batch_limit = self.tunings.similarity.batch_wallet_limit;
        let mut wallets: Vec<(String, f64)> = {
            let graph = self.graph.read().await;
            graph
                .wallets
                .values()
                .map(|n| (n.address.clone(), n.trust_score))
                .collect()
        };
        if wallets.len() > batch_limit {
            wallets.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            wallets.truncate(batch_limit);
        }
        let pool: Vec<String> = wallets.into_iter().map(|(addr, _)| addr).collect();

        let pairs = similarity::rebuild_similarities(
            self.store.as_ref(),
            &self.tunings.similarity,
            &pool,
        )
        .await?;
        info!(wallets = pool.len(), pairs, "wallet similarities updated");
        Ok(())
    }

    /// Remove a wallet from the graph and its caches. Historical
    /// interactions stay on disk for analysis.
    pub async fn purge_wallet(&self, wallet: &str) {
        info!(wallet, "purging wallet from trust network");
        self.graph.write().await.remove_wallet(wallet);
        let _ = self.cache.delete(&keys::wallet_trust(wallet)).await;
    }

    /// Save the current graph then rebuild it from persistence.
    pub async fn rebuild_trust_graph(&self) -> Result<()> {
        info!("rebuilding trust graph");
        self.flush_graph().await;
        self.load_graph().await
    }

    /// Read-lock snapshot of system-wide reputation state.
    pub async fn generate_system_metrics(&self) -> TrustSystemReport {
        let graph = self.graph.read().await;

        let mut distribution: HashMap<String, usize> = HashMap::new();
        let mut total_score = 0.0;
        let mut smart = 0usize;
        let mut trusted = 0usize;
        let mut low = 0usize;
        for node in graph.wallets.values() {
            total_score += node.trust_score;
            if node.trust_score >= REPORT_SMART_THRESHOLD {
                smart += 1;
            }
            if node.trust_score >= REPORT_TRUSTED_THRESHOLD {
                trusted += 1;
            }
            if node.trust_score < REPORT_LOW_THRESHOLD {
                low += 1;
            }
            let decade = ((node.trust_score / 10.0).floor() as usize).min(9);
            let label = if decade == 0 {
                "0-10".to_string()
            } else {
                format!("{}-{}", decade * 10 + 1, (decade + 1) * 10)
            };
            *distribution.entry(label).or_insert(0) += 1;
        }

        let mut activity: Vec<TokenActivitySummary> = graph
            .tokens
            .values()
            .map(|node| TokenActivitySummary {
                address: node.address.clone(),
                interactions: node.interaction_ids.len(),
                wallets_count: node.wallets.len(),
            })
            .collect();
        activity.sort_by(|a, b| b.interactions.cmp(&a.interactions));
        activity.truncate(10);

        TrustSystemReport {
            total_wallets: graph.wallet_count(),
            total_tokens: graph.token_count(),
            avg_trust_score: if graph.wallet_count() > 0 {
                total_score / graph.wallet_count() as f64
            } else {
                0.0
            },
            smart_wallets_count: smart,
            trusted_wallets_count: trusted,
            low_trust_count: low,
            score_distribution: distribution,
            top_active_tokens: activity,
            graph_age_hours: (Utc::now() - graph.last_updated).num_seconds() as f64 / 3600.0,
        }
    }

    async fn maintenance_loop(&self) {
        let interval = Duration::from_secs(self.memory.update_interval_secs.max(1));
        info!(interval_secs = interval.as_secs(), "trust maintenance loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("trust maintenance loop stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.run_maintenance().await;
                }
            }
        }
    }

    async fn run_maintenance(&self) {
        info!("running memory of trust maintenance");
        self.flush_graph().await;
        if let Err(e) = self.update_wallet_similarities().await {
            error!(error = %e, "similarity update failed");
        }
        self.clean_stale_cache().await;
        if let Err(e) = self.store.analyze_indexes().await {
            error!(error = %e, "index analysis failed");
        }
        info!("memory of trust maintenance finished");
    }

    async fn clean_stale_cache(&self) {
        if let Err(e) = self.cache.purge_pattern("trust:*:temp:*").await {
            warn!(error = %e, "failed to purge temporary cache keys");
        }

        let keys = match self.cache.keys("wallet:trust:*").await {
            Ok(keys) => keys,
            Err(_) => return,
        };
        for key in keys {
            let Some(wallet) = key.split(':').nth(2) else {
                continue;
            };
            let stale = {
                let graph = self.graph.read().await;
                graph
                    .wallet(wallet)
                    .map(|node| Utc::now() - node.last_updated > STALE_CACHE_AGE)
                    .unwrap_or(false)
            };
            if stale {
                let _ = self.cache.delete(&key).await;
            }
        }
    }
}

fn truncated<T>(mut rows: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 && rows.len() > limit {
        rows.truncate(limit);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheHandle, MemoryCache};
    use crate::storage::MemStore;
    use crate::types::TradeAction;

    fn network() -> Arc<TrustNetwork> {
        Arc::new(TrustNetwork::new(
            Arc::new(MemStore::new()),
            CacheHandle::new(Arc::new(MemoryCache::new())),
            MemoryConfig::default(),
            Tunings::default(),
        ))
    }

    fn interaction(wallet: &str, token: &str) -> WalletInteraction {
        WalletInteraction {
            id: String::new(),
            wallet_address: wallet.to_string(),
            token_address: token.to_string(),
            token_symbol: "TST".to_string(),
            tx_hash: "0xhash".to_string(),
            block_number: 1,
            timestamp: Utc::now(),
            action: TradeAction::Buy,
            amount: 10.0,
            value: 5.0,
            price: 0.5,
            success: true,
            related_buy_timestamp: None,
            token_risk_factor: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_wallet_defaults_to_50() {
        let network = network();
        assert_eq!(network.get_wallet_trust_score("nobody").await, 50.0);
    }

    #[tokio::test]
    async fn test_record_rejects_empty_addresses() {
        let network = network();
        let mut bad = interaction("", "t1");
        let err = network.record_wallet_interaction(&bad).await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidArgument(_)));

        bad = interaction("w1", "");
        assert!(network.record_wallet_interaction(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_record_twice_is_idempotent() {
        let network = network();
        let i = interaction("w1", "t1");
        network.record_wallet_interaction(&i).await.unwrap();
        network.record_wallet_interaction(&i).await.unwrap();

        let graph = network.graph.read().await;
        let wallet = graph.wallet("w1").unwrap();
        let token = graph.token("t1").unwrap();
        assert_eq!(wallet.interaction_ids.len(), 1);
        assert_eq!(token.wallets, vec!["w1".to_string()]);
        assert_eq!(token.interaction_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_system_metrics_snapshot() {
        let network = network();
        network
            .record_wallet_interaction(&interaction("w1", "t1"))
            .await
            .unwrap();
        network
            .record_wallet_interaction(&interaction("w2", "t1"))
            .await
            .unwrap();

        let report = network.generate_system_metrics().await;
        assert_eq!(report.total_wallets, 2);
        assert_eq!(report.total_tokens, 1);
        assert_eq!(report.top_active_tokens[0].wallets_count, 2);
    }

    #[tokio::test]
    async fn test_purge_wallet() {
        let network = network();
        network
            .record_wallet_interaction(&interaction("w1", "t1"))
            .await
            .unwrap();
        network.purge_wallet("w1").await;

        let graph = network.graph.read().await;
        assert!(graph.wallet("w1").is_none());
        assert!(graph.token("t1").unwrap().wallets.is_empty());
    }
}
