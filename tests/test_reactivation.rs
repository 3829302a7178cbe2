//! End-to-end reactivation scenario: a dormant token with an 8x volume
//! jump, +35% price, +12% holders and two returning smart wallets gets
//! promoted to REACTIVATED with a persisted candidate, a stream event and
//! an alert.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;

use common::MockGateway;
use memoracle::cache::{CacheHandle, MemoryBroker, MemoryCache};
use memoracle::config::{MemoryConfig, StreamNames, TokenEngineConfig, Tunings};
use memoracle::gateway::{TokenStats, TradeRecord, WalletInfo, WalletStat};
use memoracle::storage::{MemStore, Store};
use memoracle::types::{LifecycleState, Token, TokenMetrics, TradeAction};
use memoracle::{
    AlertManager, Pipeline, ReactivationDetector, TokenEngine, TrustNetwork, WalletIntelligence,
};

struct Harness {
    gateway: Arc<MockGateway>,
    store: Arc<MemStore>,
    broker: Arc<MemoryBroker>,
    alerts: Arc<AlertManager>,
    detector: ReactivationDetector,
}

fn harness() -> Harness {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let tunings = Tunings::default();

    let trust = Arc::new(TrustNetwork::new(
        store.clone(),
        CacheHandle::new(Arc::new(MemoryCache::new())),
        MemoryConfig::default(),
        tunings.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(broker.clone()));
    let engine = Arc::new(TokenEngine::new(
        gateway.clone(),
        trust.clone(),
        store.clone(),
        pipeline,
        StreamNames::default(),
        TokenEngineConfig::default(),
        tunings.clone(),
    ));
    let wallets = Arc::new(WalletIntelligence::new(
        gateway.clone(),
        trust,
        Default::default(),
    ));
    let alerts = Arc::new(AlertManager::new(tunings.alerts.clone()));
    let detector = ReactivationDetector::new(
        engine,
        wallets,
        alerts.clone(),
        TokenEngineConfig::default().reactivation,
        tunings.reactivation,
    );

    Harness {
        gateway,
        store,
        broker,
        alerts,
        detector,
    }
}

fn buy(wallet: &str, amount: f64, hours_ago: i64) -> TradeRecord {
    TradeRecord {
        tx_hash: format!("buy-{wallet}-{hours_ago}"),
        block_number: 1,
        wallet_address: wallet.to_string(),
        trade_type: TradeAction::Buy,
        amount,
        price: 1.0,
        timestamp: Utc::now() - Duration::hours(hours_ago),
    }
}

fn sell(wallet: &str, amount: f64, hours_ago: i64) -> TradeRecord {
    TradeRecord {
        tx_hash: format!("sell-{wallet}-{hours_ago}"),
        block_number: 1,
        wallet_address: wallet.to_string(),
        trade_type: TradeAction::Sell,
        amount,
        price: 1.0,
        timestamp: Utc::now() - Duration::hours(hours_ago),
    }
}

async fn seed_dormant_token(h: &Harness) {
    // Token asleep, with yesterday's modest snapshot on disk.
    h.store
        .save_token(&Token {
            address: "T1".to_string(),
            symbol: "SLPY".to_string(),
            name: "Sleepy Token".to_string(),
            lifecycle_state: Some(LifecycleState::SleepMode),
            ..Default::default()
        })
        .await
        .unwrap();
    h.store
        .save_token_metrics(&TokenMetrics {
            token_address: "T1".to_string(),
            price: 0.1,
            volume_1h: 1000.0,
            holder_count: 100,
            updated_at: Utc::now() - Duration::hours(24),
            ..Default::default()
        })
        .await
        .unwrap();

    // Current picture: everything up.
    h.gateway
        .set_token_stats(
            "T1",
            TokenStats {
                price: 0.135,
                volume_1h: 8000.0,
                holder_count: 112,
                ..Default::default()
            },
        )
        .await;

    // Two smart wallets bought back in the last two days.
    h.gateway
        .set_token_trades("T1", vec![buy("W1", 300.0, 10), buy("W2", 300.0, 8)])
        .await;
    for wallet in ["W1", "W2"] {
        h.gateway
            .set_wallet_info(
                wallet,
                WalletInfo {
                    address: wallet.to_string(),
                    tags: vec!["smart_money".to_string()],
                },
            )
            .await;
        h.gateway
            .set_wallet_stat(
                wallet,
                WalletStat {
                    total_trades: 100,
                    winning_trades: 90,
                    total_profit: 5000.0,
                    fast_tx_ratio: 0.0,
                },
            )
            .await;
        // Exited long ago, returned inside the window.
        h.gateway
            .set_wallet_token_trades(
                wallet,
                "T1",
                vec![sell(wallet, 500.0, 80), buy(wallet, 300.0, 10)],
            )
            .await;
    }
}

#[tokio::test]
async fn test_smart_wallet_returns_detected() {
    let h = harness();
    seed_dormant_token(&h).await;

    let returns = h.detector.detect_smart_wallet_returns("T1").await.unwrap();
    assert!(returns.detected);
    assert_eq!(returns.wallets.len(), 2);
    assert!((returns.returning_total_volume - 600.0).abs() < 1e-9);
    assert!(returns.severity > 0.0);
}

#[tokio::test]
async fn test_dormant_scan_promotes_candidate() {
    let h = harness();
    seed_dormant_token(&h).await;

    let candidates = h.detector.scan_dormant_tokens().await.unwrap();
    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert_eq!(candidate.token_address, "T1");
    assert_eq!(candidate.reactivation_score, 100.0);
    assert!((candidate.changes["volume_1h_change"] - 8.0).abs() < 1e-9);
    assert!((candidate.changes["price_change"] - 0.35).abs() < 1e-9);
    assert!((candidate.changes["holder_growth"] - 0.12).abs() < 1e-9);
    assert!(candidate.smart_returns.as_ref().unwrap().detected);

    h.detector.process_candidate(candidate).await.unwrap();

    // State transitioned and the candidate persisted.
    assert_eq!(
        h.store.token_state("T1").await.unwrap(),
        Some(LifecycleState::Reactivated)
    );
    assert_eq!(h.store.reactivations().await.len(), 1);

    // One state_change plus one reactivation event on the stream.
    assert_eq!(h.broker.stream_len("token_events").await, 2);

    // And a REACTIVATION alert.
    let alerts = h.alerts.get_alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, "REACTIVATION");
}

#[tokio::test]
async fn test_no_previous_snapshot_scores_low() {
    let h = harness();
    h.store
        .save_token(&Token {
            address: "T2".to_string(),
            symbol: "NEW".to_string(),
            lifecycle_state: Some(LifecycleState::MonitoringLight),
            ..Default::default()
        })
        .await
        .unwrap();
    h.gateway
        .set_token_stats(
            "T2",
            TokenStats {
                price: 0.5,
                volume_1h: 9000.0,
                holder_count: 50,
                ..Default::default()
            },
        )
        .await;

    // Zero changes without a baseline, no smart returns: no candidate.
    let candidates = h.detector.scan_dormant_tokens().await.unwrap();
    assert!(candidates.is_empty());
}
