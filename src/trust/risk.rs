//! Wallet behavioural risk factors.
//!
//! Counts false-flagged tokens, rugpull exits, fast sells and long holds
//! over recent history; composite = 30·falseRate + 30·rugpullRate +
//! 20·fastSellRate − 20·longHoldRate, clamped to [0, 100]. Long holding
//! reduces risk.

use chrono::{Duration, Utc};

use crate::config::RiskTunings;
use crate::types::{TradeAction, WalletInteraction, WalletRiskFactors};

/// Compute risk factors from interaction history. Empty history yields
/// the neutral profile.
pub fn compute_risk_factors(
    tunings: &RiskTunings,
    wallet: &str,
    interactions: &[WalletInteraction],
) -> WalletRiskFactors {
    if interactions.is_empty() {
        return WalletRiskFactors::neutral(wallet);
    }

    let mut total_sells = 0usize;
    let mut false_flagged = 0usize;
    let mut rugpull_exits = 0usize;
    let mut fast_sells = 0usize;
    let mut long_holds = 0usize;

    for interaction in interactions {
        let risk_factor = interaction.token_risk_factor.unwrap_or(0.0);

        if risk_factor > tunings.false_flag_threshold {
            false_flagged += 1;
        }

        if interaction.action == TradeAction::Sell {
            total_sells += 1;

            if let Some(bought_at) = interaction.related_buy_timestamp {
                let held = interaction.timestamp - bought_at;
                if held < Duration::seconds(tunings.fast_sell_max_secs) {
                    fast_sells += 1;
                } else if held > Duration::seconds(tunings.long_hold_min_secs) {
                    long_holds += 1;
                }
            }

            if risk_factor > tunings.rugpull_threshold {
                rugpull_exits += 1;
            }
        }
    }

    let false_rate = false_flagged as f64 / interactions.len() as f64;
    let (rugpull_rate, fast_rate, long_rate) = if total_sells > 0 {
        (
            rugpull_exits as f64 / total_sells as f64,
            fast_sells as f64 / total_sells as f64,
            long_holds as f64 / total_sells as f64,
        )
    } else {
        (0.0, 0.0, 0.0)
    };

    let risk_score = (false_rate * tunings.false_flag_weight
        + rugpull_rate * tunings.rugpull_weight
        + fast_rate * tunings.fast_sell_weight
        - long_rate * tunings.long_hold_weight)
        .clamp(0.0, 100.0);

    WalletRiskFactors {
        wallet_address: wallet.to_string(),
        risk_score,
        false_flagged_tokens: false_flagged,
        rugpull_exit_rate: rugpull_rate,
        fast_sell_rate: fast_rate,
        long_hold_rate: long_rate,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(
        action: TradeAction,
        risk_factor: Option<f64>,
        held_secs: Option<i64>,
    ) -> WalletInteraction {
        let now = Utc::now();
        WalletInteraction {
            id: format!("{}:{}", action.as_str(), now.timestamp_nanos_opt().unwrap_or(0)),
            wallet_address: "w".to_string(),
            token_address: "t".to_string(),
            token_symbol: "T".to_string(),
            tx_hash: "tx".to_string(),
            block_number: 0,
            timestamp: now,
            action,
            amount: 1.0,
            value: 1.0,
            price: 1.0,
            success: true,
            related_buy_timestamp: held_secs.map(|secs| now - Duration::seconds(secs)),
            token_risk_factor: risk_factor,
        }
    }

    #[test]
    fn test_empty_history_is_neutral() {
        let risk = compute_risk_factors(&RiskTunings::default(), "w1", &[]);
        assert_eq!(risk.risk_score, 50.0);
        assert_eq!(risk.false_flagged_tokens, 0);
    }

    #[test]
    fn test_false_flagged_counted() {
        let interactions = vec![interaction(TradeAction::Buy, Some(95.0), None)];
        let risk = compute_risk_factors(&RiskTunings::default(), "w1", &interactions);
        assert_eq!(risk.false_flagged_tokens, 1);
        // One flagged interaction out of one: 30 · 1.0
        assert_eq!(risk.risk_score, 30.0);
    }

    #[test]
    fn test_fast_sell_and_rugpull_rates() {
        let interactions = vec![
            interaction(TradeAction::Sell, Some(85.0), Some(60)),
            interaction(TradeAction::Sell, None, Some(40 * 24 * 3600)),
        ];
        let risk = compute_risk_factors(&RiskTunings::default(), "w1", &interactions);
        assert_eq!(risk.rugpull_exit_rate, 0.5);
        assert_eq!(risk.fast_sell_rate, 0.5);
        assert_eq!(risk.long_hold_rate, 0.5);
        // 30·0 + 30·0.5 + 20·0.5 − 20·0.5 = 15
        assert!((risk.risk_score - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        // Only long holds: negative contribution clamps to 0.
        let interactions = vec![interaction(TradeAction::Sell, None, Some(60 * 24 * 3600))];
        let risk = compute_risk_factors(&RiskTunings::default(), "w1", &interactions);
        assert_eq!(risk.risk_score, 0.0);
    }
}
