//! Persistence abstraction.
//!
//! Components consume storage through the narrow [`Store`] trait so the
//! Postgres pool and the in-memory implementation are interchangeable;
//! tests and local runs use [`MemStore`], deployments use [`PgStore`].
//!
//! All writes are idempotent: conflicts on the primary key update the
//! mutable secondary fields and leave identity columns untouched.

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    ActiveWallet, LifecycleState, ReactivationCandidate, Token, TokenAlert, TokenMetrics,
    WalletInfluence, WalletInteraction, WalletRiskFactors, WalletSimilarity, WalletToken,
    WalletTrustScore,
};

/// Narrow persistence interface consumed by the oracle components.
#[async_trait]
pub trait Store: Send + Sync {
    // Wallet interaction ledger (append-only, conflict updates secondary fields)
    async fn save_wallet_interaction(&self, interaction: &WalletInteraction) -> Result<()>;
    async fn recent_interactions(&self, limit: i64) -> Result<Vec<WalletInteraction>>;
    async fn wallet_interactions(&self, wallet: &str, limit: i64)
        -> Result<Vec<WalletInteraction>>;
    async fn wallet_token_interactions(
        &self,
        wallet: &str,
        token: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>>;
    /// Earliest interactions on a token, ordered by timestamp ascending.
    async fn early_token_interactions(
        &self,
        token: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>>;
    async fn token_interactions_since(
        &self,
        token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<WalletInteraction>>;

    // Trust scores
    async fn all_wallet_trust_scores(&self) -> Result<Vec<WalletTrustScore>>;
    async fn wallet_trust_score(&self, wallet: &str) -> Result<Option<f64>>;
    async fn save_wallet_trust_score(
        &self,
        wallet: &str,
        score: f64,
        updated: DateTime<Utc>,
    ) -> Result<()>;
    async fn most_trusted_wallets(&self, limit: i64) -> Result<Vec<WalletTrustScore>>;

    // Similarities (stored in both directions)
    async fn save_wallet_similarity(
        &self,
        wallet_a: &str,
        wallet_b: &str,
        score: f64,
        common_tokens: usize,
    ) -> Result<()>;
    async fn wallet_similarities(
        &self,
        wallet: &str,
        min_similarity: f64,
        limit: i64,
    ) -> Result<Vec<WalletSimilarity>>;

    // Derived wallet/token rollups
    async fn wallet_tokens(&self, wallet: &str, limit: i64) -> Result<Vec<WalletToken>>;
    async fn token_active_wallets(
        &self,
        token: &str,
        min_trust_score: f64,
        limit: i64,
    ) -> Result<Vec<ActiveWallet>>;
    async fn active_wallets_count(&self, token: &str) -> Result<i64>;

    // Influence
    async fn token_influencers(&self, token: &str, limit: i64) -> Result<Vec<WalletInfluence>>;
    async fn save_token_influencers(
        &self,
        token: &str,
        influencers: &[WalletInfluence],
    ) -> Result<()>;

    // Risk factors
    async fn wallet_risk_factors(&self, wallet: &str) -> Result<Option<WalletRiskFactors>>;
    async fn save_wallet_risk_factors(&self, risk: &WalletRiskFactors) -> Result<()>;

    // Tokens and lifecycle
    async fn save_token(&self, token: &Token) -> Result<()>;
    async fn update_token_state(&self, token: &str, state: LifecycleState) -> Result<()>;
    async fn token_state(&self, token: &str) -> Result<Option<LifecycleState>>;
    async fn tokens_by_states(&self, states: &[LifecycleState]) -> Result<Vec<Token>>;

    // Metric snapshots (time series, latest row is the comparison snapshot)
    async fn save_token_metrics(&self, metrics: &TokenMetrics) -> Result<()>;
    async fn token_last_snapshot(&self, token: &str) -> Result<Option<TokenMetrics>>;

    // Reactivation and alerting
    async fn save_reactivation(&self, candidate: &ReactivationCandidate) -> Result<()>;
    async fn save_token_alert(&self, alert: &TokenAlert) -> Result<()>;

    /// Index statistics refresh, triggered by the maintenance loop.
    async fn analyze_indexes(&self) -> Result<()>;
}
