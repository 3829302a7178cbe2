//! Integration tests for wallet intelligence: token population analysis,
//! entry ranking, and holder-quality evaluation.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;

use common::MockGateway;
use memoracle::cache::{CacheHandle, MemoryCache};
use memoracle::config::{MemoryConfig, Tunings, WalletIntelligenceConfig};
use memoracle::gateway::{TagDistribution, TokenWalletTagsStat, TraderActivity, WalletInfo};
use memoracle::storage::{MemStore, Store};
use memoracle::{TrustNetwork, WalletIntelligence};

async fn intelligence() -> (Arc<MockGateway>, Arc<MemStore>, WalletIntelligence) {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemStore::new());
    let trust = Arc::new(TrustNetwork::new(
        store.clone(),
        CacheHandle::new(Arc::new(MemoryCache::new())),
        MemoryConfig::default(),
        Tunings::default(),
    ));
    let intel = WalletIntelligence::new(
        gateway.clone(),
        trust,
        WalletIntelligenceConfig::default(),
    );
    (gateway, store, intel)
}

fn trader(address: &str, buys: i64, sells: i64, entered_hours_ago: i64) -> TraderActivity {
    TraderActivity {
        address: address.to_string(),
        buy_volume: 100.0 * buys as f64,
        sell_volume: 50.0 * sells as f64,
        buy_count: buys,
        sell_count: sells,
        trade_count: buys + sells,
        first_trade: Some(Utc::now() - Duration::hours(entered_hours_ago)),
        last_trade: Some(Utc::now() - Duration::hours(1)),
        tags: Vec::new(),
    }
}

#[tokio::test]
async fn test_analyze_token_wallets_ranks_and_rollups() {
    let (gateway, store, intel) = intelligence().await;

    for (wallet, score) in [("W1", 80.0), ("W2", 65.0), ("W3", 40.0)] {
        store
            .save_wallet_trust_score(wallet, score, Utc::now())
            .await
            .unwrap();
    }
    gateway
        .set_traders(
            "T1",
            vec![
                trader("W2", 4, 2, 10),
                trader("W1", 6, 2, 20),
                trader("W3", 2, 2, 5),
            ],
        )
        .await;

    let analysis = intel.analyze_token_wallets("T1").await.unwrap();

    assert_eq!(analysis.total_wallets, 3);
    // Earliest entrant first: W1 entered 20h ago.
    assert_eq!(analysis.wallet_details[0].address, "W1");
    assert_eq!(analysis.wallet_details[0].entry_rank, 1);
    assert_eq!(analysis.wallet_details[2].address, "W3");

    // One wallet at or above the smart threshold.
    assert_eq!(analysis.trust_metrics.smart_money_count, 1);
    assert!((analysis.trust_metrics.smart_money_ratio - 1.0 / 3.0).abs() < 1e-9);
    // W1 and W2 clear the trusted floor among the early entrants.
    assert!((analysis.trust_metrics.early_trusted_ratio - 2.0 / 3.0).abs() < 1e-9);

    // True per-side counts: 12 buys vs 6 sells.
    assert_eq!(analysis.trade_patterns.buy_orders, 12);
    assert_eq!(analysis.trade_patterns.sell_orders, 6);
    assert!((analysis.trade_patterns.buy_sell_ratio - 2.0).abs() < 1e-9);

    // W1 carries the smart category and the trusted one.
    let w1 = analysis
        .wallet_details
        .iter()
        .find(|d| d.address == "W1")
        .unwrap();
    assert!(w1.has_category("smart"));
    assert!(w1.has_category("trusted"));
}

#[tokio::test]
async fn test_sniper_counts_from_tag_stats() {
    let (gateway, _store, intel) = intelligence().await;
    gateway
        .set_traders("T2", vec![trader("W1", 1, 0, 1), trader("W2", 1, 0, 2)])
        .await;
    gateway
        .set_tag_stats(
            "T2",
            TokenWalletTagsStat {
                distributions: vec![
                    TagDistribution {
                        tag: "sniper".to_string(),
                        count: 1,
                    },
                    TagDistribution {
                        tag: "bot".to_string(),
                        count: 1,
                    },
                ],
            },
        )
        .await;

    let analysis = intel.analyze_token_wallets("T2").await.unwrap();
    assert_eq!(analysis.sniper_count, 1);
    assert_eq!(analysis.wallet_categories.bot, 1);
    assert!((analysis.sniper_ratio - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_holder_quality_report_with_sniper_penalty() {
    let (gateway, store, intel) = intelligence().await;

    // Four wallets, two smart; half the population tagged sniper.
    for (wallet, score) in [("W1", 90.0), ("W2", 85.0), ("W3", 30.0), ("W4", 30.0)] {
        store
            .save_wallet_trust_score(wallet, score, Utc::now())
            .await
            .unwrap();
    }
    gateway
        .set_traders(
            "T3",
            vec![
                trader("W1", 2, 0, 10),
                trader("W2", 2, 0, 9),
                trader("W3", 2, 0, 8),
                trader("W4", 2, 0, 7),
            ],
        )
        .await;
    gateway
        .set_tag_stats(
            "T3",
            TokenWalletTagsStat {
                distributions: vec![TagDistribution {
                    tag: "sniper".to_string(),
                    count: 2,
                }],
            },
        )
        .await;

    let report = intel.evaluate_token_holders("T3").await.unwrap();
    assert_eq!(report.total_holders, 4);
    assert_eq!(report.smart_money_count, 2);
    assert!((report.sniper_ratio - 0.5).abs() < 1e-9);

    // (0.5·0.5 + 0.3·0.5)·100 − 200·(0.5−0.1) = 40 − 80, clamped to 0.
    assert_eq!(report.quality_score, 0.0);
    assert!((0.0..=100.0).contains(&report.quality_score));
}

#[tokio::test]
async fn test_analyze_wallet_adds_classification_tags() {
    let (gateway, store, intel) = intelligence().await;

    store
        .save_wallet_trust_score("W1", 80.0, Utc::now())
        .await
        .unwrap();
    gateway
        .set_wallet_info(
            "W1",
            WalletInfo {
                address: "W1".to_string(),
                tags: vec!["smart_money".to_string()],
            },
        )
        .await;
    gateway
        .set_wallet_stat(
            "W1",
            memoracle::gateway::WalletStat {
                total_trades: 50,
                winning_trades: 40,
                total_profit: 1000.0,
                fast_tx_ratio: 0.0,
            },
        )
        .await;

    let profile = intel.analyze_wallet("W1").await.unwrap();
    // 100·0.3 + 0.5·20 + 30 = 70: smart money.
    assert!(profile.tags.iter().any(|t| t == "smart_money"));
    assert_eq!(profile.trust_score, 80.0);
    assert!((profile.win_rate - 0.8).abs() < 1e-9);
}
