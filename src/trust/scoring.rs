//! Wallet trust-score mixture.
//!
//! Score = 40% profit + 25% timing + 15% volume + 20% network, clamped to
//! [0, 100]. Profit and volume are neutral baselines until concrete
//! formulas land; timing rewards interaction-count experience tiers;
//! network is the mean trust of the wallet's closest peers.

use crate::config::TrustTunings;
use crate::types::{WalletInteraction, WalletSimilarity};

/// Mix the sub-scores into the final wallet trust score.
pub fn compute_trust_score(
    tunings: &TrustTunings,
    interactions: &[WalletInteraction],
    network_score: f64,
) -> f64 {
    if interactions.is_empty() {
        return crate::trust::graph::DEFAULT_TRUST_SCORE;
    }

    let profit = profit_performance(tunings, interactions);
    let timing = timing_performance(tunings, interactions.len());
    let volume = volume_performance(tunings, interactions);
    let network = network_score;

    let score = profit * tunings.profit_weight
        + timing * tunings.timing_weight
        + volume * tunings.volume_weight
        + network * tunings.network_weight;

    score.clamp(0.0, 100.0)
}

/// Placeholder until win/loss magnitudes are wired in.
fn profit_performance(tunings: &TrustTunings, _interactions: &[WalletInteraction]) -> f64 {
    tunings.profit_baseline
}

/// Baseline plus an experience bonus from interaction-count tiers.
pub fn timing_performance(tunings: &TrustTunings, interaction_count: usize) -> f64 {
    let mut score = tunings.timing_baseline;
    for (threshold, bonus) in &tunings.experience_tiers {
        if interaction_count > *threshold {
            score += bonus;
            break;
        }
    }
    score.min(100.0)
}

/// Placeholder until a richer volume signal is available.
fn volume_performance(tunings: &TrustTunings, _interactions: &[WalletInteraction]) -> f64 {
    tunings.volume_baseline
}

/// Mean trust of the closest peers, or the baseline when there are none.
pub fn network_performance(tunings: &TrustTunings, similar: &[WalletSimilarity]) -> f64 {
    if similar.is_empty() {
        return tunings.network_baseline;
    }
    let total: f64 = similar.iter().map(|s| s.trust_score).sum();
    total / similar.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeAction;
    use chrono::Utc;

    fn interactions(count: usize) -> Vec<WalletInteraction> {
        (0..count)
            .map(|n| WalletInteraction {
                id: format!("tx{}:w:t", n),
                wallet_address: "w".to_string(),
                token_address: "t".to_string(),
                token_symbol: "T".to_string(),
                tx_hash: format!("tx{}", n),
                block_number: n as u64,
                timestamp: Utc::now(),
                action: TradeAction::Buy,
                amount: 1.0,
                value: 1.0,
                price: 1.0,
                success: true,
                related_buy_timestamp: None,
                token_risk_factor: None,
            })
            .collect()
    }

    #[test]
    fn test_no_history_yields_default() {
        let tunings = TrustTunings::default();
        assert_eq!(compute_trust_score(&tunings, &[], 50.0), 50.0);
    }

    #[test]
    fn test_single_interaction_yields_neutral_score() {
        // All sub-factors sit at their baselines and no experience tier
        // applies below 50 interactions.
        let tunings = TrustTunings::default();
        let score = compute_trust_score(&tunings, &interactions(1), 50.0);
        assert_eq!(score, 50.0);
    }

    #[test]
    fn test_experience_tiers() {
        let tunings = TrustTunings::default();
        assert_eq!(timing_performance(&tunings, 10), 50.0);
        assert_eq!(timing_performance(&tunings, 51), 55.0);
        assert_eq!(timing_performance(&tunings, 101), 60.0);
        assert_eq!(timing_performance(&tunings, 201), 65.0);
        assert_eq!(timing_performance(&tunings, 501), 70.0);
    }

    #[test]
    fn test_network_performance_mean() {
        let tunings = TrustTunings::default();
        let similar = vec![
            WalletSimilarity {
                wallet_address: "a".to_string(),
                trust_score: 80.0,
                ..Default::default()
            },
            WalletSimilarity {
                wallet_address: "b".to_string(),
                trust_score: 60.0,
                ..Default::default()
            },
        ];
        assert_eq!(network_performance(&tunings, &similar), 70.0);
        assert_eq!(network_performance(&tunings, &[]), 50.0);
    }

    #[test]
    fn test_score_stays_in_range() {
        let tunings = TrustTunings::default();
        let score = compute_trust_score(&tunings, &interactions(600), 100.0);
        assert!((0.0..=100.0).contains(&score));
    }
}
