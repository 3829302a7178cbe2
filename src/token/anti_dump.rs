//! Coordinated-dump detection.
//!
//! Sells from the lookback window are sorted by time and grouped into
//! clusters of consecutive sells no more than the gap apart; a cluster
//! needs the minimum size to count. Severity scales with smart-seller
//! involvement and dollar volume, and detection fires at the threshold.

use std::collections::HashSet;

use crate::config::AntiDumpTunings;
use crate::types::{AntiDumpResult, DumpCluster, TokenTrade, TradeAction};

/// Analyse recent trades for coordinated sell clusters.
///
/// `smart_wallets` is the set of addresses classified as smart money on
/// this token; their presence in a cluster raises its severity.
pub fn detect_dump_pattern(
    tunings: &AntiDumpTunings,
    trades: &[TokenTrade],
    smart_wallets: &HashSet<&str>,
) -> AntiDumpResult {
    let mut sells: Vec<&TokenTrade> = trades
        .iter()
        .filter(|t| t.action == TradeAction::Sell)
        .collect();
    if sells.is_empty() {
        return AntiDumpResult::default();
    }
    sells.sort_by_key(|t| t.timestamp);

    // Group consecutive sells whose inter-sell gap stays inside the window.
    let mut clusters: Vec<Vec<&TokenTrade>> = Vec::new();
    let mut current: Vec<&TokenTrade> = Vec::new();
    for sell in sells {
        match current.last() {
            Some(last)
                if (sell.timestamp - last.timestamp).num_seconds()
                    <= tunings.cluster_gap_secs =>
            {
                current.push(sell);
            }
            Some(_) => {
                if current.len() >= tunings.min_cluster_size {
                    clusters.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                current.push(sell);
            }
            None => current.push(sell),
        }
    }
    if current.len() >= tunings.min_cluster_size {
        clusters.push(current);
    }

    if clusters.is_empty() {
        return AntiDumpResult::default();
    }

    let mut analyzed = Vec::with_capacity(clusters.len());
    let mut highest = 0.0f64;
    for cluster in clusters {
        let wallets: HashSet<&str> = cluster.iter().map(|t| t.wallet_address.as_str()).collect();
        let smart_sellers = wallets.iter().filter(|w| smart_wallets.contains(*w)).count();
        let total_volume: f64 = cluster.iter().map(|t| t.total_value).sum();

        let severity = if smart_sellers > 0 {
            (tunings.smart_seller_weight * smart_sellers as f64
                + total_volume / tunings.smart_volume_divisor)
                .min(100.0)
        } else {
            (tunings.plain_wallet_weight * wallets.len() as f64
                + total_volume / tunings.plain_volume_divisor)
                .min(tunings.plain_severity_cap)
        };
        highest = highest.max(severity);

        let start = cluster.first().expect("cluster is non-empty").timestamp;
        let end = cluster.last().expect("cluster is non-empty").timestamp;
        analyzed.push(DumpCluster {
            timestamp_start: start,
            timestamp_end: end,
            duration_seconds: (end - start).num_seconds() as f64,
            transaction_count: cluster.len(),
            unique_wallets: wallets.len(),
            smart_wallets: smart_sellers,
            total_volume,
            severity,
        });
    }

    AntiDumpResult {
        detected: highest >= tunings.detection_threshold,
        severity: highest,
        clusters: analyzed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn sell(wallet: &str, value: f64, offset_secs: i64) -> TokenTrade {
        let at = Utc::now() + Duration::seconds(offset_secs);
        TokenTrade {
            id: format!("{}-{}", wallet, offset_secs),
            token_address: "T".to_string(),
            wallet_address: wallet.to_string(),
            action: TradeAction::Sell,
            amount: value,
            price: 1.0,
            total_value: value,
            timestamp: at,
            tx_hash: format!("tx-{offset_secs}"),
            block_number: 0,
        }
    }

    #[test]
    fn test_no_sells_no_detection() {
        let result = detect_dump_pattern(&AntiDumpTunings::default(), &[], &HashSet::new());
        assert!(!result.detected);
        assert_eq!(result.severity, 0.0);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_smart_cluster_severity() {
        // Six sells from four wallets inside four minutes, 5000 USD total,
        // two smart sellers: severity = min(100, 20*2 + 5000/100) = 90.
        let trades = vec![
            sell("w1", 1000.0, 0),
            sell("w2", 1000.0, 40),
            sell("w3", 1000.0, 80),
            sell("w4", 1000.0, 120),
            sell("w1", 500.0, 180),
            sell("w2", 500.0, 240),
        ];
        let smart: HashSet<&str> = ["w1", "w2"].into_iter().collect();
        let result = detect_dump_pattern(&AntiDumpTunings::default(), &trades, &smart);

        assert!(result.detected);
        assert!((result.severity - 90.0).abs() < 1e-9);
        assert_eq!(result.clusters.len(), 1);
        let cluster = &result.clusters[0];
        assert_eq!(cluster.transaction_count, 6);
        assert_eq!(cluster.unique_wallets, 4);
        assert_eq!(cluster.smart_wallets, 2);
        assert!((cluster.total_volume - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn test_plain_cluster_capped_at_60() {
        let trades = vec![
            sell("w1", 10_000.0, 0),
            sell("w2", 10_000.0, 30),
            sell("w3", 10_000.0, 60),
            sell("w4", 10_000.0, 90),
            sell("w5", 10_000.0, 120),
            sell("w6", 10_000.0, 150),
            sell("w7", 10_000.0, 180),
        ];
        let result = detect_dump_pattern(&AntiDumpTunings::default(), &trades, &HashSet::new());
        assert!(result.detected);
        assert_eq!(result.severity, 60.0);
    }

    #[test]
    fn test_gap_splits_clusters() {
        // Two sells, a half-hour gap, then three more: only the second
        // group reaches the minimum size.
        let trades = vec![
            sell("w1", 100.0, 0),
            sell("w2", 100.0, 60),
            sell("w3", 100.0, 2000),
            sell("w4", 100.0, 2060),
            sell("w5", 100.0, 2120),
        ];
        let result = detect_dump_pattern(&AntiDumpTunings::default(), &trades, &HashSet::new());
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].transaction_count, 3);
    }

    #[test]
    fn test_small_cluster_ignored() {
        let trades = vec![sell("w1", 100.0, 0), sell("w2", 100.0, 60)];
        let result = detect_dump_pattern(&AntiDumpTunings::default(), &trades, &HashSet::new());
        assert!(!result.detected);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_detected_implies_threshold() {
        let trades = vec![
            sell("w1", 1.0, 0),
            sell("w2", 1.0, 30),
            sell("w3", 1.0, 60),
        ];
        let result = detect_dump_pattern(&AntiDumpTunings::default(), &trades, &HashSet::new());
        // 10*3 + tiny volume: right at the 30 threshold.
        assert!(result.detected == (result.severity >= 30.0));
    }
}
