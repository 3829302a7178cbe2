//! Main entry point for the memoracle oracle system.
//! Slim orchestrator that wires and coordinates all components.

use anyhow::Result;
use std::sync::Arc;

use memoracle::api::ApiServer;
use memoracle::cache::{CacheHandle, RedisCache};
use memoracle::pipeline::TokenEventProcessor;
use memoracle::storage::PgStore;
use memoracle::{
    AlertManager, Config, Pipeline, ReactivationDetector, TokenEngine, TrustNetwork,
    WalletIntelligence,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::from_toml_file("config.toml") {
        Ok(config) => config,
        Err(_) => Config::from_env(),
    };
    config.init_logging();

    tracing::info!("starting memoracle oracle system");

    // Storage backbone: postgres for durable state, redis for hot state
    // and the event streams.
    let store = Arc::new(PgStore::connect(&config.database).await?);
    let redis = Arc::new(RedisCache::connect(&config.redis).await?);
    let cache = CacheHandle::new(redis.clone());

    let gateway = Arc::new(memoracle::gateway::HttpGateway::new(config.gmgn.clone())?);

    let trust = Arc::new(TrustNetwork::new(
        store.clone() as Arc<dyn memoracle::storage::Store>,
        cache,
        config.memory.clone(),
        config.tunings.clone(),
    ));
    trust.clone().start().await?;

    let pipeline = Arc::new(Pipeline::new(redis.clone()));

    let token_engine = Arc::new(TokenEngine::new(
        gateway.clone(),
        trust.clone(),
        store.clone(),
        pipeline.clone(),
        config.pipeline.streams.clone(),
        config.token_engine.clone(),
        config.tunings.clone(),
    ));

    // Register-then-start: consumers exist only for processors known here.
    pipeline
        .register_processor(Arc::new(TokenEventProcessor::new(
            token_engine.clone(),
            &config.pipeline.streams.token_events,
        )))
        .await;
    pipeline.start().await?;

    token_engine.clone().start().await?;

    let wallet_intel = Arc::new(WalletIntelligence::new(
        gateway.clone(),
        trust.clone(),
        config.wallet_intelligence.clone(),
    ));
    wallet_intel.start().await?;

    let alerts = Arc::new(
        AlertManager::new(config.tunings.alerts.clone())
            .with_store(store.clone() as Arc<dyn memoracle::storage::Store>),
    );
    alerts.start().await?;

    let reactivation = Arc::new(ReactivationDetector::new(
        token_engine.clone(),
        wallet_intel.clone(),
        alerts.clone(),
        config.token_engine.reactivation.clone(),
        config.tunings.reactivation.clone(),
    ));
    reactivation.clone().start().await?;

    let api = ApiServer::new(config.api.clone(), trust.clone());
    api.start().await?;

    tracing::info!("all components started - awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    // Reverse dependency order.
    api.shutdown().await;
    alerts.shutdown().await;
    pipeline.shutdown().await;
    reactivation.shutdown().await;
    wallet_intel.shutdown().await;
    token_engine.shutdown().await;
    trust.stop().await;

    tracing::info!("application shutdown complete");
    Ok(())
}
