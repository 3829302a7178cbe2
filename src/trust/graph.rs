//! Bipartite wallet/token arena.
//!
//! Wallet and token nodes live in two address-keyed maps; edges are
//! opaque interaction ids mirrored onto both endpoints, so neither
//! collection owns the other. Invariants maintained here:
//! every interaction id on a wallet node also appears on the token node,
//! a wallet appears at most once in a token's wallet list, scores stay in
//! [0, 100] and `last_updated` only advances.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Neutral reputation for wallets with no history.
pub const DEFAULT_TRUST_SCORE: f64 = 50.0;

/// A wallet in the trust graph.
#[derive(Debug, Clone)]
pub struct WalletNode {
    pub address: String,
    pub trust_score: f64,
    pub interaction_ids: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// A token in the trust graph.
#[derive(Debug, Clone)]
pub struct TokenNode {
    pub address: String,
    pub wallets: Vec<String>,
    pub interaction_ids: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Process-wide in-memory reputation graph.
#[derive(Debug)]
pub struct TrustGraph {
    pub wallets: HashMap<String, WalletNode>,
    pub tokens: HashMap<String, TokenNode>,
    pub last_updated: DateTime<Utc>,
}

impl Default for TrustGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustGraph {
    pub fn new() -> Self {
        Self {
            wallets: HashMap::new(),
            tokens: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Get or insert a wallet node with the given initial score.
    pub fn ensure_wallet(&mut self, address: &str, initial_score: f64) -> &mut WalletNode {
        self.wallets
            .entry(address.to_string())
            .or_insert_with(|| WalletNode {
                address: address.to_string(),
                trust_score: initial_score.clamp(0.0, 100.0),
                interaction_ids: Vec::new(),
                last_updated: Utc::now(),
            })
    }

    pub fn ensure_token(&mut self, address: &str) -> &mut TokenNode {
        self.tokens
            .entry(address.to_string())
            .or_insert_with(|| TokenNode {
                address: address.to_string(),
                wallets: Vec::new(),
                interaction_ids: Vec::new(),
                last_updated: Utc::now(),
            })
    }

    /// Record one wallet↔token edge. Re-recording the same interaction id
    /// leaves the graph unchanged.
    pub fn record_edge(
        &mut self,
        interaction_id: &str,
        wallet: &str,
        token: &str,
        initial_score: f64,
    ) {
        let now = Utc::now();

        let wallet_node = self.ensure_wallet(wallet, initial_score);
        if !wallet_node.interaction_ids.iter().any(|id| id == interaction_id) {
            wallet_node.interaction_ids.push(interaction_id.to_string());
        }
        wallet_node.last_updated = now;

        let token_node = self.ensure_token(token);
        if !token_node.wallets.iter().any(|w| w == wallet) {
            token_node.wallets.push(wallet.to_string());
        }
        if !token_node.interaction_ids.iter().any(|id| id == interaction_id) {
            token_node.interaction_ids.push(interaction_id.to_string());
        }
        token_node.last_updated = now;

        self.last_updated = now;
    }

    /// Update a wallet's score, clamped to [0, 100].
    pub fn set_wallet_score(&mut self, address: &str, score: f64) {
        let node = self.ensure_wallet(address, score);
        node.trust_score = score.clamp(0.0, 100.0);
        node.last_updated = Utc::now();
    }

    pub fn wallet(&self, address: &str) -> Option<&WalletNode> {
        self.wallets.get(address)
    }

    pub fn token(&self, address: &str) -> Option<&TokenNode> {
        self.tokens.get(address)
    }

    /// Drop a wallet node and its membership in every token wallet list.
    /// Historical interaction ids on token nodes are kept for analysis.
    pub fn remove_wallet(&mut self, address: &str) {
        self.wallets.remove(address);
        for token in self.tokens.values_mut() {
            token.wallets.retain(|w| w != address);
        }
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_edge_is_idempotent() {
        let mut graph = TrustGraph::new();
        graph.record_edge("tx:w1:t1", "w1", "t1", DEFAULT_TRUST_SCORE);
        graph.record_edge("tx:w1:t1", "w1", "t1", DEFAULT_TRUST_SCORE);

        let wallet = graph.wallet("w1").unwrap();
        let token = graph.token("t1").unwrap();
        assert_eq!(wallet.interaction_ids.len(), 1);
        assert_eq!(token.interaction_ids.len(), 1);
        assert_eq!(token.wallets, vec!["w1".to_string()]);
    }

    #[test]
    fn test_edge_mirrored_on_both_nodes() {
        let mut graph = TrustGraph::new();
        graph.record_edge("a:w1:t1", "w1", "t1", DEFAULT_TRUST_SCORE);
        graph.record_edge("b:w2:t1", "w2", "t1", DEFAULT_TRUST_SCORE);

        let token = graph.token("t1").unwrap();
        for id in &graph.wallet("w1").unwrap().interaction_ids {
            assert!(token.interaction_ids.contains(id));
        }
        assert_eq!(token.wallets.len(), 2);
    }

    #[test]
    fn test_score_clamped() {
        let mut graph = TrustGraph::new();
        graph.set_wallet_score("w1", 130.0);
        assert_eq!(graph.wallet("w1").unwrap().trust_score, 100.0);
        graph.set_wallet_score("w1", -10.0);
        assert_eq!(graph.wallet("w1").unwrap().trust_score, 0.0);
    }

    #[test]
    fn test_remove_wallet_clears_memberships() {
        let mut graph = TrustGraph::new();
        graph.record_edge("a:w1:t1", "w1", "t1", DEFAULT_TRUST_SCORE);
        graph.record_edge("b:w2:t1", "w2", "t1", DEFAULT_TRUST_SCORE);
        graph.remove_wallet("w1");

        assert!(graph.wallet("w1").is_none());
        assert_eq!(graph.token("t1").unwrap().wallets, vec!["w2".to_string()]);
    }
}
