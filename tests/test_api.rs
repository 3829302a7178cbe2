//! HTTP surface tests: health probe and the active-wallet queries,
//! served over a real listener and queried with a plain HTTP client.

use chrono::Utc;
use std::sync::Arc;

use memoracle::api::ApiServer;
use memoracle::cache::{CacheHandle, MemoryCache};
use memoracle::config::{ApiConfig, MemoryConfig, Tunings};
use memoracle::storage::{MemStore, Store};
use memoracle::types::{TradeAction, WalletInteraction};
use memoracle::TrustNetwork;

async fn start_server(port: u16) -> (ApiServer, Arc<MemStore>) {
    let store = Arc::new(MemStore::new());
    let trust = Arc::new(TrustNetwork::new(
        store.clone(),
        CacheHandle::new(Arc::new(MemoryCache::new())),
        MemoryConfig::default(),
        Tunings::default(),
    ));
    let server = ApiServer::new(
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        },
        trust,
    );
    server.start().await.expect("server should bind");
    (server, store)
}

fn interaction(tx: &str, wallet: &str, token: &str) -> WalletInteraction {
    WalletInteraction {
        id: WalletInteraction::interaction_id(tx, wallet, token),
        wallet_address: wallet.to_string(),
        token_address: token.to_string(),
        token_symbol: "TST".to_string(),
        tx_hash: tx.to_string(),
        block_number: 1,
        timestamp: Utc::now(),
        action: TradeAction::Buy,
        amount: 10.0,
        value: 5.0,
        price: 0.5,
        success: true,
        related_buy_timestamp: None,
        token_risk_factor: None,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _store) = start_server(18431).await;

    let body: serde_json::Value = reqwest::get("http://127.0.0.1:18431/api/health")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");

    server.shutdown().await;
}

#[tokio::test]
async fn test_trusted_wallets_filter() {
    let (server, store) = start_server(18432).await;

    // Three wallets with scores {80, 65, 40} on token T.
    for (n, (wallet, score)) in [("W1", 80.0), ("W2", 65.0), ("W3", 40.0)]
        .into_iter()
        .enumerate()
    {
        store
            .save_wallet_interaction(&interaction(&format!("0x{n}"), wallet, "T"))
            .await
            .unwrap();
        store
            .save_wallet_trust_score(wallet, score, Utc::now())
            .await
            .unwrap();
    }

    let body: serde_json::Value = reqwest::get(
        "http://127.0.0.1:18432/api/tokens/T/active-wallets/trusted?min_score=70",
    )
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    assert_eq!(body["count"], 1);
    assert_eq!(body["min_trust_score"], 70.0);
    let wallets = body["trusted_wallets"].as_array().unwrap();
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0]["address"], "W1");
    assert_eq!(wallets[0]["trust_score"], 80.0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_active_wallets_listing_and_count() {
    let (server, store) = start_server(18433).await;

    for (n, wallet) in ["W1", "W2"].iter().enumerate() {
        store
            .save_wallet_interaction(&interaction(&format!("0x{n}"), wallet, "T"))
            .await
            .unwrap();
    }

    let list: serde_json::Value =
        reqwest::get("http://127.0.0.1:18433/api/tokens/T/active-wallets")
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(list["count"], 2);
    assert_eq!(list["token_address"], "T");

    let count: serde_json::Value =
        reqwest::get("http://127.0.0.1:18433/api/tokens/T/active-wallets/count")
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(count["count"], 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_search_filters_and_echo() {
    let (server, store) = start_server(18434).await;

    for (n, (wallet, score)) in [("alpha1", 80.0), ("beta2", 30.0)].into_iter().enumerate() {
        store
            .save_wallet_interaction(&interaction(&format!("0x{n}"), wallet, "T"))
            .await
            .unwrap();
        store
            .save_wallet_trust_score(wallet, score, Utc::now())
            .await
            .unwrap();
    }

    let body: serde_json::Value = reqwest::get(
        "http://127.0.0.1:18434/api/tokens/T/active-wallets/search?query=alpha&min_trust_score=50",
    )
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    assert_eq!(body["count"], 1);
    assert_eq!(body["wallets"][0]["address"], "alpha1");
    assert_eq!(body["filters"]["query"], "alpha");
    assert_eq!(body["filters"]["min_trust_score"], 50.0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_recent_wallets_window() {
    let (server, store) = start_server(18435).await;

    let mut fresh = interaction("0xfresh", "W1", "T");
    fresh.timestamp = Utc::now();
    store.save_wallet_interaction(&fresh).await.unwrap();

    let mut stale = interaction("0xstale", "W2", "T");
    stale.timestamp = Utc::now() - chrono::Duration::hours(48);
    store.save_wallet_interaction(&stale).await.unwrap();

    let body: serde_json::Value = reqwest::get(
        "http://127.0.0.1:18435/api/tokens/T/active-wallets/recent?hours=24",
    )
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    assert_eq!(body["count"], 1);
    assert_eq!(body["active_wallets"][0]["address"], "W1");

    server.shutdown().await;
}
