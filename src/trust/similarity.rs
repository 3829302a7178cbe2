//! Wallet similarity via Jaccard overlap on traded-token sets.
//!
//! Two paths: the batch rebuild run by the maintenance loop over the
//! top-trusted wallet pool, and the on-demand computation used when no
//! persisted rows exist yet for a wallet.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::config::SimilarityTunings;
use crate::storage::Store;
use crate::types::WalletSimilarity;

/// Jaccard similarity |A ∩ B| / |A ∪ B|.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

async fn token_set(
    store: &dyn Store,
    wallet: &str,
    limit: i64,
) -> Result<HashSet<String>> {
    let tokens = store.wallet_tokens(wallet, limit).await?;
    Ok(tokens.into_iter().map(|t| t.token_address).collect())
}

/// Batch rebuild over the given wallet pool. Persists every pair at or
/// above the cut-off, in both directions. Returns the pair count.
pub async fn rebuild_similarities(
    store: &dyn Store,
    tunings: &SimilarityTunings,
    wallets: &[String],
) -> Result<usize> {
    let mut token_sets: HashMap<&str, HashSet<String>> = HashMap::new();
    for wallet in wallets {
        match token_set(store, wallet, tunings.wallet_token_limit).await {
            Ok(set) => {
                token_sets.insert(wallet.as_str(), set);
            }
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "failed to load wallet tokens");
            }
        }
    }

    let mut persisted = 0usize;
    for (i, wallet_a) in wallets.iter().enumerate() {
        let Some(set_a) = token_sets.get(wallet_a.as_str()) else {
            continue;
        };
        for wallet_b in wallets.iter().skip(i + 1) {
            let Some(set_b) = token_sets.get(wallet_b.as_str()) else {
                continue;
            };
            let score = jaccard(set_a, set_b);
            if score >= tunings.min_persisted_score {
                let common = set_a.intersection(set_b).count();
                if let Err(e) = store
                    .save_wallet_similarity(wallet_a, wallet_b, score, common)
                    .await
                {
                    warn!(
                        wallet_a = %wallet_a,
                        wallet_b = %wallet_b,
                        error = %e,
                        "failed to persist wallet similarity"
                    );
                    continue;
                }
                persisted += 1;
            }
        }
    }

    debug!(wallets = wallets.len(), pairs = persisted, "similarity rebuild finished");
    Ok(persisted)
}

/// On-demand similarity for one wallet against everyone sharing a token
/// with it. Returns rows sorted by score descending, truncated to `limit`.
pub async fn compute_for_wallet(
    store: &dyn Store,
    tunings: &SimilarityTunings,
    wallet: &str,
    min_similarity: f64,
    limit: usize,
) -> Result<Vec<WalletSimilarity>> {
    let target_tokens = token_set(store, wallet, tunings.wallet_token_limit).await?;
    if target_tokens.is_empty() {
        return Ok(Vec::new());
    }

    // Candidate wallets: anyone active on a shared token.
    let mut common_counts: HashMap<String, usize> = HashMap::new();
    for token in &target_tokens {
        let active = match store.token_active_wallets(token, 0.0, 500).await {
            Ok(active) => active,
            Err(e) => {
                warn!(token = %token, error = %e, "failed to load active wallets");
                continue;
            }
        };
        for other in active {
            if other.address != wallet {
                *common_counts.entry(other.address).or_insert(0) += 1;
            }
        }
    }

    let mut similarities = Vec::new();
    for (candidate, common) in common_counts {
        let candidate_tokens =
            match token_set(store, &candidate, tunings.wallet_token_limit).await {
                Ok(set) => set,
                Err(_) => continue,
            };
        let union = (target_tokens.len() + candidate_tokens.len()).saturating_sub(common);
        let score = common as f64 / union.max(1) as f64;
        if score >= min_similarity {
            let trust_score = store
                .wallet_trust_score(&candidate)
                .await
                .ok()
                .flatten()
                .unwrap_or(crate::trust::graph::DEFAULT_TRUST_SCORE);
            similarities.push(WalletSimilarity {
                wallet_address: candidate,
                score,
                common_tokens: common,
                trust_score,
                ..Default::default()
            });
        }
    }

    similarities.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    similarities.truncate(limit);
    Ok(similarities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["a", "b"])), 1.0);
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["c", "d"])), 0.0);
        let score = jaccard(&set(&["a", "b", "c"]), &set(&["b", "c", "d"]));
        assert!((score - 0.5).abs() < 1e-9);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
    }
}
