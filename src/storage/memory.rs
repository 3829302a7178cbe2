//! In-memory [`Store`] implementation.
//!
//! Backs the integration tests and local development runs. Derived views
//! (active wallets, wallet/token rollups) are computed from the
//! interaction ledger on demand, the same shape the SQL queries produce.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::Store;
use crate::types::{
    ActiveWallet, LifecycleState, ReactivationCandidate, Token, TokenAlert, TokenMetrics,
    TradeAction, WalletInfluence, WalletInteraction, WalletRiskFactors, WalletSimilarity,
    WalletToken, WalletTrustScore,
};

#[derive(Default)]
struct Inner {
    interactions: HashMap<String, WalletInteraction>,
    trust_scores: HashMap<String, WalletTrustScore>,
    /// wallet -> similarity rows keyed by the other wallet
    similarities: HashMap<String, HashMap<String, WalletSimilarity>>,
    influencers: HashMap<String, Vec<WalletInfluence>>,
    risk_factors: HashMap<String, WalletRiskFactors>,
    tokens: HashMap<String, Token>,
    token_states: HashMap<String, LifecycleState>,
    metrics: HashMap<String, Vec<TokenMetrics>>,
    reactivations: Vec<ReactivationCandidate>,
    alerts: Vec<TokenAlert>,
}

/// In-memory store; cheap to instantiate per test.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted interactions, for test assertions.
    pub async fn interaction_count(&self) -> usize {
        self.inner.read().await.interactions.len()
    }

    /// Persisted reactivation candidates, for test assertions.
    pub async fn reactivations(&self) -> Vec<ReactivationCandidate> {
        self.inner.read().await.reactivations.clone()
    }

    /// Persisted alerts, for test assertions.
    pub async fn alerts(&self) -> Vec<TokenAlert> {
        self.inner.read().await.alerts.clone()
    }
}

fn truncate<T>(mut items: Vec<T>, limit: i64) -> Vec<T> {
    if limit > 0 && items.len() > limit as usize {
        items.truncate(limit as usize);
    }
    items
}

#[async_trait]
impl Store for MemStore {
    async fn save_wallet_interaction(&self, interaction: &WalletInteraction) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.interactions.get_mut(&interaction.id) {
            Some(existing) => {
                // Conflict: only the mutable secondary fields move.
                existing.token_symbol = interaction.token_symbol.clone();
                existing.value = interaction.value;
                existing.token_risk_factor = interaction.token_risk_factor;
            }
            None => {
                inner
                    .interactions
                    .insert(interaction.id.clone(), interaction.clone());
            }
        }
        Ok(())
    }

    async fn recent_interactions(&self, limit: i64) -> Result<Vec<WalletInteraction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner.interactions.values().cloned().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(truncate(rows, limit))
    }

    async fn wallet_interactions(
        &self,
        wallet: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .interactions
            .values()
            .filter(|i| i.wallet_address == wallet)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(truncate(rows, limit))
    }

    async fn wallet_token_interactions(
        &self,
        wallet: &str,
        token: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .interactions
            .values()
            .filter(|i| i.wallet_address == wallet && i.token_address == token)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(truncate(rows, limit))
    }

    async fn early_token_interactions(
        &self,
        token: &str,
        limit: i64,
    ) -> Result<Vec<WalletInteraction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .interactions
            .values()
            .filter(|i| i.token_address == token)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(truncate(rows, limit))
    }

    async fn token_interactions_since(
        &self,
        token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<WalletInteraction>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .interactions
            .values()
            .filter(|i| i.token_address == token && i.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(rows)
    }

    async fn all_wallet_trust_scores(&self) -> Result<Vec<WalletTrustScore>> {
        let inner = self.inner.read().await;
        Ok(inner.trust_scores.values().cloned().collect())
    }

    async fn wallet_trust_score(&self, wallet: &str) -> Result<Option<f64>> {
        let inner = self.inner.read().await;
        Ok(inner.trust_scores.get(wallet).map(|s| s.trust_score))
    }

    async fn save_wallet_trust_score(
        &self,
        wallet: &str,
        score: f64,
        updated: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.trust_scores.insert(
            wallet.to_string(),
            WalletTrustScore {
                address: wallet.to_string(),
                trust_score: score,
                last_updated: updated,
            },
        );
        Ok(())
    }

    async fn most_trusted_wallets(&self, limit: i64) -> Result<Vec<WalletTrustScore>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner.trust_scores.values().cloned().collect();
        rows.sort_by(|a, b| {
            b.trust_score
                .partial_cmp(&a.trust_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(truncate(rows, limit))
    }

    async fn save_wallet_similarity(
        &self,
        wallet_a: &str,
        wallet_b: &str,
        score: f64,
        common_tokens: usize,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        for (from, to) in [(wallet_a, wallet_b), (wallet_b, wallet_a)] {
            let row = WalletSimilarity {
                wallet_address: to.to_string(),
                score,
                common_tokens,
                ..Default::default()
            };
            inner
                .similarities
                .entry(from.to_string())
                .or_default()
                .insert(to.to_string(), row);
        }
        Ok(())
    }

    async fn wallet_similarities(
        &self,
        wallet: &str,
        min_similarity: f64,
        limit: i64,
    ) -> Result<Vec<WalletSimilarity>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .similarities
            .get(wallet)
            .map(|m| {
                m.values()
                    .filter(|s| s.score >= min_similarity)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Enrich with the freshest trust score of the similar wallet.
        for row in rows.iter_mut() {
            if let Some(score) = inner.trust_scores.get(&row.wallet_address) {
                row.trust_score = score.trust_score;
            }
        }
        rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(truncate(rows, limit))
    }

    async fn wallet_tokens(&self, wallet: &str, limit: i64) -> Result<Vec<WalletToken>> {
        let inner = self.inner.read().await;
        let mut by_token: HashMap<&str, WalletToken> = HashMap::new();
        for i in inner.interactions.values() {
            if i.wallet_address != wallet {
                continue;
            }
            let entry = by_token
                .entry(i.token_address.as_str())
                .or_insert_with(|| WalletToken {
                    wallet_address: wallet.to_string(),
                    token_address: i.token_address.clone(),
                    token_symbol: i.token_symbol.clone(),
                    ..Default::default()
                });
            entry.transaction_count += 1;
            entry.total_volume += i.value;
            if entry.first_interaction_time.map_or(true, |t| i.timestamp < t) {
                entry.first_interaction_time = Some(i.timestamp);
            }
            if entry.last_interaction_time.map_or(true, |t| i.timestamp > t) {
                entry.last_interaction_time = Some(i.timestamp);
            }
        }
        let mut rows: Vec<_> = by_token.into_values().collect();
        rows.sort_by(|a, b| b.last_interaction_time.cmp(&a.last_interaction_time));
        Ok(truncate(rows, limit))
    }

    async fn token_active_wallets(
        &self,
        token: &str,
        min_trust_score: f64,
        limit: i64,
    ) -> Result<Vec<ActiveWallet>> {
        let inner = self.inner.read().await;
        let mut by_wallet: HashMap<&str, ActiveWallet> = HashMap::new();
        for i in inner.interactions.values() {
            if i.token_address != token {
                continue;
            }
            let entry = by_wallet
                .entry(i.wallet_address.as_str())
                .or_insert_with(|| ActiveWallet {
                    address: i.wallet_address.clone(),
                    ..Default::default()
                });
            entry.transaction_count += 1;
            match i.action {
                TradeAction::Buy => {
                    entry.buy_volume += i.value;
                    entry.net_position += i.amount;
                }
                TradeAction::Sell => {
                    entry.sell_volume += i.value;
                    entry.net_position -= i.amount;
                }
                TradeAction::Transfer => {}
            }
            if entry
                .first_transaction_timestamp
                .map_or(true, |t| i.timestamp < t)
            {
                entry.first_transaction_timestamp = Some(i.timestamp);
            }
            if entry.last_active.map_or(true, |t| i.timestamp > t) {
                entry.last_active = Some(i.timestamp);
            }
        }
        let mut rows: Vec<_> = by_wallet.into_values().collect();
        for row in rows.iter_mut() {
            if let Some(score) = inner.trust_scores.get(&row.address) {
                row.trust_score = score.trust_score;
            }
        }
        if min_trust_score > 0.0 {
            rows.retain(|w| w.trust_score >= min_trust_score);
        }
        rows.sort_by(|a, b| a.first_transaction_timestamp.cmp(&b.first_transaction_timestamp));
        for (rank, row) in rows.iter_mut().enumerate() {
            row.entry_rank = rank + 1;
        }
        Ok(truncate(rows, limit))
    }

    async fn active_wallets_count(&self, token: &str) -> Result<i64> {
        let inner = self.inner.read().await;
        let wallets: std::collections::HashSet<_> = inner
            .interactions
            .values()
            .filter(|i| i.token_address == token)
            .map(|i| i.wallet_address.as_str())
            .collect();
        Ok(wallets.len() as i64)
    }

    async fn token_influencers(&self, token: &str, limit: i64) -> Result<Vec<WalletInfluence>> {
        let inner = self.inner.read().await;
        let rows = inner.influencers.get(token).cloned().unwrap_or_default();
        Ok(truncate(rows, limit))
    }

    async fn save_token_influencers(
        &self,
        token: &str,
        influencers: &[WalletInfluence],
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .influencers
            .insert(token.to_string(), influencers.to_vec());
        Ok(())
    }

    async fn wallet_risk_factors(&self, wallet: &str) -> Result<Option<WalletRiskFactors>> {
        let inner = self.inner.read().await;
        Ok(inner.risk_factors.get(wallet).cloned())
    }

    async fn save_wallet_risk_factors(&self, risk: &WalletRiskFactors) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .risk_factors
            .insert(risk.wallet_address.clone(), risk.clone());
        Ok(())
    }

    async fn save_token(&self, token: &Token) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(state) = token.lifecycle_state {
            inner.token_states.insert(token.address.clone(), state);
        }
        inner.tokens.insert(token.address.clone(), token.clone());
        Ok(())
    }

    async fn update_token_state(&self, token: &str, state: LifecycleState) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.token_states.insert(token.to_string(), state);
        if let Some(existing) = inner.tokens.get_mut(token) {
            existing.lifecycle_state = Some(state);
        }
        Ok(())
    }

    async fn token_state(&self, token: &str) -> Result<Option<LifecycleState>> {
        let inner = self.inner.read().await;
        Ok(inner.token_states.get(token).copied())
    }

    async fn tokens_by_states(&self, states: &[LifecycleState]) -> Result<Vec<Token>> {
        let inner = self.inner.read().await;
        let mut rows = Vec::new();
        for (address, state) in inner.token_states.iter() {
            if states.contains(state) {
                if let Some(token) = inner.tokens.get(address) {
                    rows.push(token.clone());
                } else {
                    rows.push(Token {
                        address: address.clone(),
                        lifecycle_state: Some(*state),
                        ..Default::default()
                    });
                }
            }
        }
        rows.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(rows)
    }

    async fn save_token_metrics(&self, metrics: &TokenMetrics) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .metrics
            .entry(metrics.token_address.clone())
            .or_default()
            .push(metrics.clone());
        Ok(())
    }

    async fn token_last_snapshot(&self, token: &str) -> Result<Option<TokenMetrics>> {
        let inner = self.inner.read().await;
        Ok(inner
            .metrics
            .get(token)
            .and_then(|series| series.last().cloned()))
    }

    async fn save_reactivation(&self, candidate: &ReactivationCandidate) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.reactivations.push(candidate.clone());
        Ok(())
    }

    async fn save_token_alert(&self, alert: &TokenAlert) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.alerts.push(alert.clone());
        Ok(())
    }

    async fn analyze_indexes(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn interaction(id: &str, wallet: &str, token: &str, action: TradeAction) -> WalletInteraction {
        WalletInteraction {
            id: id.to_string(),
            wallet_address: wallet.to_string(),
            token_address: token.to_string(),
            token_symbol: "TST".to_string(),
            tx_hash: id.to_string(),
            block_number: 1,
            timestamp: Utc::now(),
            action,
            amount: 100.0,
            value: 50.0,
            price: 0.5,
            success: true,
            related_buy_timestamp: None,
            token_risk_factor: None,
        }
    }

    #[tokio::test]
    async fn test_interaction_upsert_is_idempotent() {
        let store = MemStore::new();
        let mut first = interaction("tx1:w1:t1", "w1", "t1", TradeAction::Buy);
        store.save_wallet_interaction(&first).await.unwrap();

        first.value = 75.0;
        first.token_symbol = "TST2".to_string();
        store.save_wallet_interaction(&first).await.unwrap();

        assert_eq!(store.interaction_count().await, 1);
        let rows = store.wallet_interactions("w1", 10).await.unwrap();
        assert_eq!(rows[0].value, 75.0);
        assert_eq!(rows[0].token_symbol, "TST2");
    }

    #[tokio::test]
    async fn test_active_wallets_filter_and_ranks() {
        let store = MemStore::new();
        let base = Utc::now();
        for (n, wallet) in ["w1", "w2", "w3"].iter().enumerate() {
            let mut i = interaction(
                &format!("tx{}:{}:t1", n, wallet),
                wallet,
                "t1",
                TradeAction::Buy,
            );
            i.timestamp = base + Duration::seconds(n as i64);
            store.save_wallet_interaction(&i).await.unwrap();
        }
        for (wallet, score) in [("w1", 80.0), ("w2", 65.0), ("w3", 40.0)] {
            store
                .save_wallet_trust_score(wallet, score, Utc::now())
                .await
                .unwrap();
        }

        let all = store.token_active_wallets("t1", 0.0, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].address, "w1");
        assert_eq!(all[0].entry_rank, 1);

        let trusted = store.token_active_wallets("t1", 70.0, 0).await.unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].address, "w1");

        assert_eq!(store.active_wallets_count("t1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_similarity_symmetry() {
        let store = MemStore::new();
        store
            .save_wallet_similarity("a", "b", 0.42, 3)
            .await
            .unwrap();

        let from_a = store.wallet_similarities("a", 0.0, 10).await.unwrap();
        let from_b = store.wallet_similarities("b", 0.0, 10).await.unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].wallet_address, "b");
        assert_eq!(from_a[0].score, 0.42);
        assert_eq!(from_b[0].wallet_address, "a");
        assert_eq!(from_b[0].score, 0.42);
    }

    #[tokio::test]
    async fn test_snapshot_series_keeps_latest() {
        let store = MemStore::new();
        let mut m = TokenMetrics {
            token_address: "t1".to_string(),
            price: 0.1,
            updated_at: Utc::now(),
            ..Default::default()
        };
        store.save_token_metrics(&m).await.unwrap();
        m.price = 0.2;
        m.updated_at = Utc::now();
        store.save_token_metrics(&m).await.unwrap();

        let last = store.token_last_snapshot("t1").await.unwrap().unwrap();
        assert_eq!(last.price, 0.2);
    }
}
