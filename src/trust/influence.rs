//! Per-token wallet influence scoring.
//!
//! influence = trust · 0.01 · (entryRankInverse + volumeWeight + holdFactor)
//! capped at 100; influencers below the floor are discarded.

use chrono::{DateTime, Utc};

use crate::config::InfluenceTunings;
use crate::types::{TradeAction, WalletInteraction};

/// Trade facts extracted from one wallet's history on a token.
#[derive(Debug, Default, Clone, Copy)]
pub struct HistorySummary {
    pub entry_time: Option<DateTime<Utc>>,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,
    pub hold_days: f64,
}

/// Walk the wallet/token history and derive entry, volumes and hold span.
pub fn summarize_history(history: &[WalletInteraction], now: DateTime<Utc>) -> HistorySummary {
    let mut summary = HistorySummary::default();
    let mut last_sell: Option<DateTime<Utc>> = None;

    for tx in history {
        match tx.action {
            TradeAction::Buy => {
                summary.total_buy_volume += tx.amount;
                if summary.entry_time.map_or(true, |t| tx.timestamp < t) {
                    summary.entry_time = Some(tx.timestamp);
                }
            }
            TradeAction::Sell => {
                summary.total_sell_volume += tx.amount;
                if last_sell.map_or(true, |t| tx.timestamp > t) {
                    last_sell = Some(tx.timestamp);
                }
            }
            TradeAction::Transfer => {}
        }
    }

    if let Some(entry) = summary.entry_time {
        // Exit closes the hold span; otherwise still holding.
        let end = last_sell.unwrap_or(now);
        summary.hold_days = (end - entry).num_seconds().max(0) as f64 / 86_400.0;
    }

    summary
}

/// Influence score with its contributing parts, persisted as the
/// volume/timing/price impact columns.
#[derive(Debug, Clone, Copy)]
pub struct InfluenceBreakdown {
    pub score: f64,
    pub entry_rank_inverse: f64,
    pub volume_weight: f64,
    pub hold_factor: f64,
}

/// Influence score for one trader.
pub fn compute_influence(
    tunings: &InfluenceTunings,
    trust_score: f64,
    entry_rank: usize,
    summary: &HistorySummary,
) -> InfluenceBreakdown {
    let entry_rank_inverse = tunings.entry_rank_numerator / (entry_rank.max(1) as f64);
    let volume_weight = (tunings.volume_log_scale * (summary.total_buy_volume + 1.0).log10())
        .min(tunings.volume_weight_cap);
    let hold_factor =
        (summary.hold_days / tunings.hold_duration_divisor).min(tunings.hold_duration_cap);

    let influence = trust_score * 0.01 * (entry_rank_inverse + volume_weight + hold_factor);
    InfluenceBreakdown {
        score: influence.min(100.0),
        entry_rank_inverse,
        volume_weight,
        hold_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tx(action: TradeAction, amount: f64, at: DateTime<Utc>) -> WalletInteraction {
        WalletInteraction {
            id: format!("{}:{}", action.as_str(), at.timestamp()),
            wallet_address: "w".to_string(),
            token_address: "t".to_string(),
            token_symbol: "T".to_string(),
            tx_hash: "tx".to_string(),
            block_number: 0,
            timestamp: at,
            action,
            amount,
            value: amount,
            price: 1.0,
            success: true,
            related_buy_timestamp: None,
            token_risk_factor: None,
        }
    }

    #[test]
    fn test_summary_hold_span() {
        let now = Utc::now();
        let history = vec![
            tx(TradeAction::Buy, 100.0, now - Duration::days(20)),
            tx(TradeAction::Sell, 40.0, now - Duration::days(10)),
        ];
        let summary = summarize_history(&history, now);
        assert_eq!(summary.total_buy_volume, 100.0);
        assert_eq!(summary.total_sell_volume, 40.0);
        assert!((summary.hold_days - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_open_position_holds_until_now() {
        let now = Utc::now();
        let history = vec![tx(TradeAction::Buy, 10.0, now - Duration::days(5))];
        let summary = summarize_history(&history, now);
        assert!((summary.hold_days - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_influence_early_entry_dominates() {
        let tunings = InfluenceTunings::default();
        let summary = HistorySummary {
            total_buy_volume: 1000.0,
            hold_days: 5.0,
            ..Default::default()
        };
        let first = compute_influence(&tunings, 80.0, 1, &summary);
        let late = compute_influence(&tunings, 80.0, 100, &summary);
        assert!(first.score > late.score);
        assert!(first.score <= 100.0);
    }

    #[test]
    fn test_influence_capped_at_100() {
        let tunings = InfluenceTunings::default();
        let summary = HistorySummary {
            total_buy_volume: 1e12,
            hold_days: 10_000.0,
            ..Default::default()
        };
        let breakdown = compute_influence(&tunings, 100.0, 1, &summary);
        assert_eq!(breakdown.score, 100.0);
    }
}
