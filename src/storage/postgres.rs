//! Postgres-backed [`Store`] implementation on a shared sqlx pool.
//!
//! The schema is created on startup with `CREATE TABLE IF NOT EXISTS` and
//! every insert is an `ON CONFLICT` upsert so replays and redeliveries are
//! harmless. The pool is shared process-wide; sizing comes from the
//! database configuration section.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

use super::Store;
use crate::config::DatabaseConfig;
use crate::types::{
    ActiveWallet, LifecycleState, ReactivationCandidate, Token, TokenAlert, TokenMetrics,
    TradeAction, WalletInfluence, WalletInteraction, WalletRiskFactors, WalletSimilarity,
    WalletToken, WalletTrustScore,
};

/// Postgres store over a shared connection pool.
pub struct PgStore {
    pool: PgPool,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tokens (
        address TEXT PRIMARY KEY,
        symbol TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL DEFAULT '',
        total_supply BIGINT NOT NULL DEFAULT 0,
        holder_count BIGINT NOT NULL DEFAULT 0,
        lifecycle_state TEXT,
        created_timestamp BIGINT,
        last_trade_timestamp BIGINT,
        logo TEXT NOT NULL DEFAULT '',
        twitter TEXT NOT NULL DEFAULT '',
        website TEXT NOT NULL DEFAULT '',
        telegram TEXT NOT NULL DEFAULT '',
        cached_at TIMESTAMPTZ
    )",
    "CREATE TABLE IF NOT EXISTS token_prices (
        token_address TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        change_1h DOUBLE PRECISION NOT NULL DEFAULT 0,
        change_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
        volume_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
        market_cap DOUBLE PRECISION NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (token_address, updated_at)
    )",
    "CREATE TABLE IF NOT EXISTS token_metrics (
        token_address TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL DEFAULT 0,
        market_cap DOUBLE PRECISION NOT NULL DEFAULT 0,
        volume_1h DOUBLE PRECISION NOT NULL DEFAULT 0,
        volume_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
        price_change_1h DOUBLE PRECISION NOT NULL DEFAULT 0,
        buy_count_1h BIGINT NOT NULL DEFAULT 0,
        sell_count_1h BIGINT NOT NULL DEFAULT 0,
        holder_count BIGINT NOT NULL DEFAULT 0,
        intelligent_holders BIGINT NOT NULL DEFAULT 0,
        average_trust_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        smart_money_holders BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (token_address, updated_at)
    )",
    "CREATE TABLE IF NOT EXISTS token_trades (
        id TEXT PRIMARY KEY,
        token_address TEXT NOT NULL,
        wallet_address TEXT NOT NULL,
        action_type TEXT NOT NULL,
        amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        price DOUBLE PRECISION NOT NULL DEFAULT 0,
        total_value DOUBLE PRECISION NOT NULL DEFAULT 0,
        timestamp TIMESTAMPTZ NOT NULL,
        tx_hash TEXT NOT NULL DEFAULT '',
        block_number BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS token_alerts (
        id TEXT PRIMARY KEY,
        token_address TEXT NOT NULL,
        token_symbol TEXT NOT NULL DEFAULT '',
        alert_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        detected_at TIMESTAMPTZ NOT NULL,
        confirmation_count BIGINT NOT NULL DEFAULT 0,
        is_confirmed BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS token_historical_metrics (
        token_address TEXT NOT NULL,
        date TIMESTAMPTZ NOT NULL,
        price DOUBLE PRECISION NOT NULL DEFAULT 0,
        volume DOUBLE PRECISION NOT NULL DEFAULT 0,
        market_cap DOUBLE PRECISION NOT NULL DEFAULT 0,
        holder_count BIGINT NOT NULL DEFAULT 0,
        intelligent_ratio DOUBLE PRECISION NOT NULL DEFAULT 0,
        trust_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        social_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        PRIMARY KEY (token_address, date)
    )",
    "CREATE TABLE IF NOT EXISTS token_price_points (
        token_address TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        open DOUBLE PRECISION NOT NULL DEFAULT 0,
        high DOUBLE PRECISION NOT NULL DEFAULT 0,
        low DOUBLE PRECISION NOT NULL DEFAULT 0,
        close DOUBLE PRECISION NOT NULL DEFAULT 0,
        volume DOUBLE PRECISION NOT NULL DEFAULT 0,
        PRIMARY KEY (token_address, timestamp)
    )",
    "CREATE TABLE IF NOT EXISTS wallets (
        address TEXT PRIMARY KEY,
        first_seen TIMESTAMPTZ,
        last_active TIMESTAMPTZ,
        total_transactions BIGINT NOT NULL DEFAULT 0,
        tags TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS wallet_trust_scores (
        wallet_address TEXT PRIMARY KEY,
        trust_score DOUBLE PRECISION NOT NULL,
        last_updated TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wallet_risk_factors (
        wallet_address TEXT PRIMARY KEY,
        risk_score DOUBLE PRECISION NOT NULL,
        false_flagged_tokens BIGINT NOT NULL DEFAULT 0,
        rugpull_exit_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
        fast_sell_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
        long_hold_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wallet_interactions (
        id TEXT PRIMARY KEY,
        wallet_address TEXT NOT NULL,
        token_address TEXT NOT NULL,
        token_symbol TEXT NOT NULL DEFAULT '',
        tx_hash TEXT NOT NULL,
        block_number BIGINT NOT NULL DEFAULT 0,
        timestamp TIMESTAMPTZ NOT NULL,
        action_type TEXT NOT NULL,
        amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        value DOUBLE PRECISION NOT NULL DEFAULT 0,
        price DOUBLE PRECISION NOT NULL DEFAULT 0,
        success BOOLEAN NOT NULL DEFAULT TRUE,
        related_buy_timestamp TIMESTAMPTZ,
        token_risk_factor DOUBLE PRECISION
    )",
    "CREATE TABLE IF NOT EXISTS wallet_similarities (
        wallet_a TEXT NOT NULL,
        wallet_b TEXT NOT NULL,
        score DOUBLE PRECISION NOT NULL,
        common_tokens BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (wallet_a, wallet_b)
    )",
    "CREATE TABLE IF NOT EXISTS wallet_holdings (
        wallet_address TEXT NOT NULL,
        token_address TEXT NOT NULL,
        balance DOUBLE PRECISION NOT NULL DEFAULT 0,
        usd_value DOUBLE PRECISION NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (wallet_address, token_address)
    )",
    "CREATE TABLE IF NOT EXISTS token_traders (
        token_address TEXT NOT NULL,
        wallet_address TEXT NOT NULL,
        relative_volume DOUBLE PRECISION NOT NULL DEFAULT 0,
        early_investor DOUBLE PRECISION NOT NULL DEFAULT 0,
        transaction_count BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (token_address, wallet_address)
    )",
    "CREATE TABLE IF NOT EXISTS token_influencers (
        token_address TEXT NOT NULL,
        wallet_address TEXT NOT NULL,
        influence_score DOUBLE PRECISION NOT NULL,
        volume_impact DOUBLE PRECISION NOT NULL DEFAULT 0,
        timing_impact DOUBLE PRECISION NOT NULL DEFAULT 0,
        price_impact DOUBLE PRECISION NOT NULL DEFAULT 0,
        transaction_count BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (token_address, wallet_address)
    )",
    "CREATE TABLE IF NOT EXISTS token_reactivations (
        token_address TEXT NOT NULL,
        token_symbol TEXT NOT NULL DEFAULT '',
        reactivation_score DOUBLE PRECISION NOT NULL,
        changes TEXT NOT NULL DEFAULT '{}',
        smart_returns TEXT,
        detected_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (token_address, detected_at)
    )",
    "CREATE INDEX IF NOT EXISTS idx_interactions_wallet ON wallet_interactions (wallet_address)",
    "CREATE INDEX IF NOT EXISTS idx_interactions_token ON wallet_interactions (token_address)",
    "CREATE INDEX IF NOT EXISTS idx_interactions_timestamp ON wallet_interactions (timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_interactions_action ON wallet_interactions (action_type)",
    "CREATE INDEX IF NOT EXISTS idx_trust_scores_desc ON wallet_trust_scores (trust_score DESC)",
    "CREATE INDEX IF NOT EXISTS idx_token_trades_token ON token_trades (token_address)",
    "CREATE INDEX IF NOT EXISTS idx_token_metrics_updated ON token_metrics (token_address, updated_at DESC)",
];

impl PgStore {
    /// Connect the pool and ensure the schema exists.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(Duration::from_secs(config.max_conn_lifetime_secs))
            .idle_timeout(Duration::from_secs(config.max_conn_idle_time_secs))
            .connect(&config.url())
            .await
            .context("failed to connect to postgres")?;

        let store = Self { pool };
        store.migrate().await?;
        info!(
            host = %config.host,
            database = %config.name,
            "connected to postgres"
        );
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| {
                    format!("schema statement failed: {}", &statement[..statement.len().min(40)])
                })?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn interaction_from_row(row: &PgRow) -> Result<WalletInteraction> {
    let action: String = row.try_get("action_type")?;
    Ok(WalletInteraction {
        id: row.try_get("id")?,
        wallet_address: row.try_get("wallet_address")?,
        token_address: row.try_get("token_address")?,
        token_symbol: row.try_get("token_symbol")?,
        tx_hash: row.try_get("tx_hash")?,
        block_number: row.try_get::<i64, _>("block_number")? as u64,
        timestamp: row.try_get("timestamp")?,
        action: TradeAction::parse(&action).unwrap_or(TradeAction::Transfer),
        amount: row.try_get("amount")?,
        value: row.try_get("value")?,
        price: row.try_get("price")?,
        success: row.try_get("success")?,
        related_buy_timestamp: row.try_get("related_buy_timestamp")?,
        token_risk_factor: row.try_get("token_risk_factor")?,
    })
}

fn token_from_row(row: &PgRow) -> Result<Token> {
    let state: Option<String> = row.try_get("lifecycle_state")?;
    Ok(Token {
        address: row.try_get("address")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        total_supply: row.try_get("total_supply")?,
        holder_count: row.try_get("holder_count")?,
        lifecycle_state: state.as_deref().and_then(LifecycleState::parse),
        created_timestamp: row.try_get("created_timestamp")?,
        last_trade_timestamp: row.try_get("last_trade_timestamp")?,
        logo: row.try_get("logo")?,
        twitter: row.try_get("twitter")?,
        website: row.try_get("website")?,
        telegram: row.try_get("telegram")?,
        cached_at: row.try_get("cached_at")?,
    })
}

fn metrics_from_row(row: &PgRow) -> Result<TokenMetrics> {
    Ok(TokenMetrics {
        token_address: row.try_get("token_address")?,
        price: row.try_get("price")?,
        market_cap: row.try_get("market_cap")?,
        volume_1h: row.try_get("volume_1h")?,
        volume_24h: row.try_get("volume_24h")?,
        price_change_1h: row.try_get("price_change_1h")?,
        buy_count_1h: row.try_get("buy_count_1h")?,
        sell_count_1h: row.try_get("sell_count_1h")?,
        holder_count: row.try_get("holder_count")?,
        intelligent_holders: row.try_get("intelligent_holders")?,
        average_trust_score: row.try_get("average_trust_score")?,
        smart_money_holders: row.try_get("smart_money_holders")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const INTERACTION_COLUMNS: &str = "id, wallet_address, token_address, token_symbol, tx_hash, \
     block_number, timestamp, action_type, amount, value, price, success, \
     related_buy_timestamp, token_risk_factor";

#[async_trait]
impl Store for PgStore {
    async fn save_wallet_interaction(&self, interaction: &WalletInteraction) -> Result<()> {
        sqlx::query(
            "INSERT INTO wallet_interactions (id, wallet_address, token_address, token_symbol, \
             tx_hash, block_number, timestamp, action_type, amount, value, price, success, \
             related_buy_timestamp, token_risk_factor) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET \
             token_symbol = EXCLUDED.token_symbol, \
             value = EXCLUDED.value, \
             token_risk_factor = EXCLUDED.token_risk_factor",
        )
        .bind(&interaction.id)
        .bind(&interaction.wallet_address)
        .bind(&interaction.token_address)
        .bind(&interaction.token_symbol)
        .bind(&interaction.tx_hash)
        .bind(interaction.block_number as i64)
        .bind(interaction.timestamp)
        .bind(interaction.action.as_str())
        .bind(interaction.amount)
        .bind(interaction.value)
        .bind(interaction.price)
        .bind(interaction.success)
        .bind(interaction.related_buy_timestamp)
        .bind(interaction.token_risk_factor)
        .execute(&self.pool)
        .await
        .context("failed to upsert wallet interaction")?;
        Ok(())
    }

    async fn recent_interactions(&self, limit: i64) -> Result<Vec<WalletInteraction>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM wallet_interactions \
             ORDER BY timestamp DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn wallet_interactions(
        &self,
        wallet: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM wallet_interactions \
             WHERE wallet_address = $1 ORDER BY timestamp DESC LIMIT $2"
        ))
        .bind(wallet)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn wallet_token_interactions(
        &self,
        wallet: &str,
        token: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM wallet_interactions \
             WHERE wallet_address = $1 AND token_address = $2 \
             ORDER BY timestamp DESC LIMIT $3"
        ))
        .bind(wallet)
        .bind(token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn early_token_interactions(
        &self,
        token: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM wallet_interactions \
             WHERE token_address = $1 ORDER BY timestamp ASC LIMIT $2"
        ))
        .bind(token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn token_interactions_since(
        &self,
        token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<WalletInteraction>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM wallet_interactions \
             WHERE token_address = $1 AND timestamp >= $2 ORDER BY timestamp ASC"
        ))
        .bind(token)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn all_wallet_trust_scores(&self) -> Result<Vec<WalletTrustScore>> {
        let rows = sqlx::query(
            "SELECT wallet_address, trust_score, last_updated FROM wallet_trust_scores",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(WalletTrustScore {
                    address: row.try_get("wallet_address")?,
                    trust_score: row.try_get("trust_score")?,
                    last_updated: row.try_get("last_updated")?,
                })
            })
            .collect()
    }

    async fn wallet_trust_score(&self, wallet: &str) -> Result<Option<f64>> {
        let row = sqlx::query(
            "SELECT trust_score FROM wallet_trust_scores WHERE wallet_address = $1",
        )
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("trust_score")?),
            None => None,
        })
    }

    async fn save_wallet_trust_score(
        &self,
        wallet: &str,
        score: f64,
        updated: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO wallet_trust_scores (wallet_address, trust_score, last_updated) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (wallet_address) DO UPDATE SET \
             trust_score = EXCLUDED.trust_score, last_updated = EXCLUDED.last_updated",
        )
        .bind(wallet)
        .bind(score)
        .bind(updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn most_trusted_wallets(&self, limit: i64) -> Result<Vec<WalletTrustScore>> {
        let rows = sqlx::query(
            "SELECT wallet_address, trust_score, last_updated FROM wallet_trust_scores \
             ORDER BY trust_score DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(WalletTrustScore {
                    address: row.try_get("wallet_address")?,
                    trust_score: row.try_get("trust_score")?,
                    last_updated: row.try_get("last_updated")?,
                })
            })
            .collect()
    }

    async fn save_wallet_similarity(
        &self,
        wallet_a: &str,
        wallet_b: &str,
        score: f64,
        common_tokens: usize,
    ) -> Result<()> {
        // Stored in both directions so lookups never need canonicalisation.
        for (from, to) in [(wallet_a, wallet_b), (wallet_b, wallet_a)] {
            sqlx::query(
                "INSERT INTO wallet_similarities (wallet_a, wallet_b, score, common_tokens, updated_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (wallet_a, wallet_b) DO UPDATE SET \
                 score = EXCLUDED.score, common_tokens = EXCLUDED.common_tokens, \
                 updated_at = EXCLUDED.updated_at",
            )
            .bind(from)
            .bind(to)
            .bind(score)
            .bind(common_tokens as i64)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn wallet_similarities(
        &self,
        wallet: &str,
        min_similarity: f64,
        limit: i64,
    ) -> Result<Vec<WalletSimilarity>> {
        let rows = sqlx::query(
            "SELECT s.wallet_b, s.score, s.common_tokens, COALESCE(t.trust_score, 0) AS trust_score \
             FROM wallet_similarities s \
             LEFT JOIN wallet_trust_scores t ON t.wallet_address = s.wallet_b \
             WHERE s.wallet_a = $1 AND s.score >= $2 \
             ORDER BY s.score DESC LIMIT $3",
        )
        .bind(wallet)
        .bind(min_similarity)
        .bind(if limit > 0 { limit } else { 100 })
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(WalletSimilarity {
                    wallet_address: row.try_get("wallet_b")?,
                    score: row.try_get("score")?,
                    common_tokens: row.try_get::<i64, _>("common_tokens")? as usize,
                    trust_score: row.try_get("trust_score")?,
                    ..Default::default()
                })
            })
            .collect()
    }

    async fn wallet_tokens(&self, wallet: &str, limit: i64) -> Result<Vec<WalletToken>> {
        let rows = sqlx::query(
            "SELECT token_address, MAX(token_symbol) AS token_symbol, COUNT(*) AS tx_count, \
             COALESCE(SUM(value), 0) AS total_volume, \
             MIN(timestamp) AS first_ts, MAX(timestamp) AS last_ts \
             FROM wallet_interactions WHERE wallet_address = $1 \
             GROUP BY token_address ORDER BY last_ts DESC LIMIT $2",
        )
        .bind(wallet)
        .bind(if limit > 0 { limit } else { 1000 })
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(WalletToken {
                    wallet_address: wallet.to_string(),
                    token_address: row.try_get("token_address")?,
                    token_symbol: row.try_get("token_symbol")?,
                    transaction_count: row.try_get("tx_count")?,
                    total_volume: row.try_get("total_volume")?,
                    first_interaction_time: row.try_get("first_ts")?,
                    last_interaction_time: row.try_get("last_ts")?,
                })
            })
            .collect()
    }

    async fn token_active_wallets(
        &self,
        token: &str,
        min_trust_score: f64,
        limit: i64,
    ) -> Result<Vec<ActiveWallet>> {
        let rows = sqlx::query(
            "SELECT i.wallet_address, MIN(i.timestamp) AS first_ts, MAX(i.timestamp) AS last_ts, \
             COUNT(*) AS tx_count, \
             COALESCE(SUM(i.value) FILTER (WHERE i.action_type = 'buy'), 0) AS buy_volume, \
             COALESCE(SUM(i.value) FILTER (WHERE i.action_type = 'sell'), 0) AS sell_volume, \
             COALESCE(SUM(CASE WHEN i.action_type = 'buy' THEN i.amount \
                                WHEN i.action_type = 'sell' THEN -i.amount ELSE 0 END), 0) AS net_position, \
             COALESCE(t.trust_score, 0) AS trust_score \
             FROM wallet_interactions i \
             LEFT JOIN wallet_trust_scores t ON t.wallet_address = i.wallet_address \
             WHERE i.token_address = $1 \
             GROUP BY i.wallet_address, t.trust_score \
             HAVING COALESCE(t.trust_score, 0) >= $2 \
             ORDER BY first_ts ASC LIMIT $3",
        )
        .bind(token)
        .bind(min_trust_score)
        .bind(if limit > 0 { limit } else { 1000 })
        .fetch_all(&self.pool)
        .await?;
        let mut wallets = Vec::with_capacity(rows.len());
        for (rank, row) in rows.iter().enumerate() {
            wallets.push(ActiveWallet {
                address: row.try_get("wallet_address")?,
                first_transaction_timestamp: row.try_get("first_ts")?,
                entry_rank: rank + 1,
                transaction_count: row.try_get("tx_count")?,
                last_active: row.try_get("last_ts")?,
                trust_score: row.try_get("trust_score")?,
                net_position: row.try_get("net_position")?,
                buy_volume: row.try_get("buy_volume")?,
                sell_volume: row.try_get("sell_volume")?,
            });
        }
        Ok(wallets)
    }

    async fn active_wallets_count(&self, token: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT wallet_address) AS count FROM wallet_interactions \
             WHERE token_address = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }

    async fn token_influencers(&self, token: &str, limit: i64) -> Result<Vec<WalletInfluence>> {
        let rows = sqlx::query(
            "SELECT wallet_address, influence_score, volume_impact, timing_impact, price_impact, \
             transaction_count FROM token_influencers \
             WHERE token_address = $1 ORDER BY influence_score DESC LIMIT $2",
        )
        .bind(token)
        .bind(if limit > 0 { limit } else { 100 })
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(WalletInfluence {
                    wallet_address: row.try_get("wallet_address")?,
                    token_address: token.to_string(),
                    influence_score: row.try_get("influence_score")?,
                    volume_impact: row.try_get("volume_impact")?,
                    timing_impact: row.try_get("timing_impact")?,
                    price_impact: row.try_get("price_impact")?,
                    transaction_count: row.try_get("transaction_count")?,
                })
            })
            .collect()
    }

    async fn save_token_influencers(
        &self,
        token: &str,
        influencers: &[WalletInfluence],
    ) -> Result<()> {
        for influence in influencers {
            sqlx::query(
                "INSERT INTO token_influencers (token_address, wallet_address, influence_score, \
                 volume_impact, timing_impact, price_impact, transaction_count, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (token_address, wallet_address) DO UPDATE SET \
                 influence_score = EXCLUDED.influence_score, \
                 volume_impact = EXCLUDED.volume_impact, \
                 timing_impact = EXCLUDED.timing_impact, \
                 price_impact = EXCLUDED.price_impact, \
                 transaction_count = EXCLUDED.transaction_count, \
                 updated_at = EXCLUDED.updated_at",
            )
            .bind(token)
            .bind(&influence.wallet_address)
            .bind(influence.influence_score)
            .bind(influence.volume_impact)
            .bind(influence.timing_impact)
            .bind(influence.price_impact)
            .bind(influence.transaction_count)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn wallet_risk_factors(&self, wallet: &str) -> Result<Option<WalletRiskFactors>> {
        let row = sqlx::query(
            "SELECT wallet_address, risk_score, false_flagged_tokens, rugpull_exit_rate, \
             fast_sell_rate, long_hold_rate, updated_at FROM wallet_risk_factors \
             WHERE wallet_address = $1",
        )
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => Some(WalletRiskFactors {
                wallet_address: row.try_get("wallet_address")?,
                risk_score: row.try_get("risk_score")?,
                false_flagged_tokens: row.try_get::<i64, _>("false_flagged_tokens")? as usize,
                rugpull_exit_rate: row.try_get("rugpull_exit_rate")?,
                fast_sell_rate: row.try_get("fast_sell_rate")?,
                long_hold_rate: row.try_get("long_hold_rate")?,
                updated_at: row.try_get("updated_at")?,
            }),
            None => None,
        })
    }

    async fn save_wallet_risk_factors(&self, risk: &WalletRiskFactors) -> Result<()> {
        sqlx::query(
            "INSERT INTO wallet_risk_factors (wallet_address, risk_score, false_flagged_tokens, \
             rugpull_exit_rate, fast_sell_rate, long_hold_rate, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (wallet_address) DO UPDATE SET \
             risk_score = EXCLUDED.risk_score, \
             false_flagged_tokens = EXCLUDED.false_flagged_tokens, \
             rugpull_exit_rate = EXCLUDED.rugpull_exit_rate, \
             fast_sell_rate = EXCLUDED.fast_sell_rate, \
             long_hold_rate = EXCLUDED.long_hold_rate, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&risk.wallet_address)
        .bind(risk.risk_score)
        .bind(risk.false_flagged_tokens as i64)
        .bind(risk.rugpull_exit_rate)
        .bind(risk.fast_sell_rate)
        .bind(risk.long_hold_rate)
        .bind(risk.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_token(&self, token: &Token) -> Result<()> {
        sqlx::query(
            "INSERT INTO tokens (address, symbol, name, total_supply, holder_count, \
             lifecycle_state, created_timestamp, last_trade_timestamp, logo, twitter, website, \
             telegram, cached_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (address) DO UPDATE SET \
             symbol = EXCLUDED.symbol, name = EXCLUDED.name, \
             total_supply = EXCLUDED.total_supply, holder_count = EXCLUDED.holder_count, \
             last_trade_timestamp = EXCLUDED.last_trade_timestamp, \
             logo = EXCLUDED.logo, twitter = EXCLUDED.twitter, website = EXCLUDED.website, \
             telegram = EXCLUDED.telegram, cached_at = EXCLUDED.cached_at",
        )
        .bind(&token.address)
        .bind(&token.symbol)
        .bind(&token.name)
        .bind(token.total_supply)
        .bind(token.holder_count)
        .bind(token.lifecycle_state.map(|s| s.as_str()))
        .bind(token.created_timestamp)
        .bind(token.last_trade_timestamp)
        .bind(&token.logo)
        .bind(&token.twitter)
        .bind(&token.website)
        .bind(&token.telegram)
        .bind(token.cached_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_token_state(&self, token: &str, state: LifecycleState) -> Result<()> {
        sqlx::query(
            "INSERT INTO tokens (address, lifecycle_state) VALUES ($1, $2) \
             ON CONFLICT (address) DO UPDATE SET lifecycle_state = EXCLUDED.lifecycle_state",
        )
        .bind(token)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn token_state(&self, token: &str) -> Result<Option<LifecycleState>> {
        let row = sqlx::query("SELECT lifecycle_state FROM tokens WHERE address = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .and_then(|r| r.try_get::<Option<String>, _>("lifecycle_state").ok().flatten())
            .as_deref()
            .and_then(LifecycleState::parse))
    }

    async fn tokens_by_states(&self, states: &[LifecycleState]) -> Result<Vec<Token>> {
        let state_names: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query(
            "SELECT address, symbol, name, total_supply, holder_count, lifecycle_state, \
             created_timestamp, last_trade_timestamp, logo, twitter, website, telegram, cached_at \
             FROM tokens WHERE lifecycle_state = ANY($1)",
        )
        .bind(&state_names)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(token_from_row).collect()
    }

    async fn save_token_metrics(&self, metrics: &TokenMetrics) -> Result<()> {
        sqlx::query(
            "INSERT INTO token_metrics (token_address, price, market_cap, volume_1h, volume_24h, \
             price_change_1h, buy_count_1h, sell_count_1h, holder_count, intelligent_holders, \
             average_trust_score, smart_money_holders, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (token_address, updated_at) DO UPDATE SET \
             price = EXCLUDED.price, market_cap = EXCLUDED.market_cap, \
             volume_1h = EXCLUDED.volume_1h, volume_24h = EXCLUDED.volume_24h",
        )
        .bind(&metrics.token_address)
        .bind(metrics.price)
        .bind(metrics.market_cap)
        .bind(metrics.volume_1h)
        .bind(metrics.volume_24h)
        .bind(metrics.price_change_1h)
        .bind(metrics.buy_count_1h)
        .bind(metrics.sell_count_1h)
        .bind(metrics.holder_count)
        .bind(metrics.intelligent_holders)
        .bind(metrics.average_trust_score)
        .bind(metrics.smart_money_holders)
        .bind(metrics.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn token_last_snapshot(&self, token: &str) -> Result<Option<TokenMetrics>> {
        let row = sqlx::query(
            "SELECT token_address, price, market_cap, volume_1h, volume_24h, price_change_1h, \
             buy_count_1h, sell_count_1h, holder_count, intelligent_holders, average_trust_score, \
             smart_money_holders, updated_at FROM token_metrics \
             WHERE token_address = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(metrics_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_reactivation(&self, candidate: &ReactivationCandidate) -> Result<()> {
        let changes = serde_json::to_string(&candidate.changes)?;
        let smart_returns = candidate
            .smart_returns
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT INTO token_reactivations (token_address, token_symbol, reactivation_score, \
             changes, smart_returns, detected_at) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (token_address, detected_at) DO UPDATE SET \
             reactivation_score = EXCLUDED.reactivation_score, changes = EXCLUDED.changes, \
             smart_returns = EXCLUDED.smart_returns",
        )
        .bind(&candidate.token_address)
        .bind(&candidate.token_symbol)
        .bind(candidate.reactivation_score)
        .bind(changes)
        .bind(smart_returns)
        .bind(candidate.detected_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_token_alert(&self, alert: &TokenAlert) -> Result<()> {
        sqlx::query(
            "INSERT INTO token_alerts (id, token_address, token_symbol, alert_type, severity, \
             message, detected_at, confirmation_count, is_confirmed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
             confirmation_count = EXCLUDED.confirmation_count, \
             is_confirmed = EXCLUDED.is_confirmed",
        )
        .bind(&alert.id)
        .bind(&alert.token_address)
        .bind(&alert.token_symbol)
        .bind(&alert.alert_type)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(alert.detected_at)
        .bind(alert.confirmation_count as i64)
        .bind(alert.is_confirmed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn analyze_indexes(&self) -> Result<()> {
        for table in ["wallet_interactions", "wallet_trust_scores", "token_metrics"] {
            sqlx::query(&format!("ANALYZE {}", table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
