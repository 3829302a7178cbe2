//! Read-only HTTP API over the trust network.
//!
//! JSON endpoints for active-wallet queries plus a health probe. All
//! handlers are reads against the TrustGraph query API; unexpected
//! failures map to a 500 with a JSON error payload.

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ApiConfig;
use crate::trust::TrustNetwork;

/// Handler state shared across routes.
pub struct ApiState {
    pub trust: Arc<TrustNetwork>,
}

/// HTTP server wrapper with graceful shutdown.
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<ApiState>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": self.0.to_string()})),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl ApiServer {
    pub fn new(config: ApiConfig, trust: Arc<TrustNetwork>) -> Self {
        Self {
            config,
            state: Arc::new(ApiState { trust }),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health))
            .route("/api/tokens/:token/active-wallets", get(active_wallets))
            .route(
                "/api/tokens/:token/active-wallets/count",
                get(active_wallets_count),
            )
            .route(
                "/api/tokens/:token/active-wallets/trusted",
                get(trusted_wallets),
            )
            .route(
                "/api/tokens/:token/active-wallets/search",
                get(search_wallets),
            )
            .route(
                "/api/tokens/:token/active-wallets/recent",
                get(recent_wallets),
            )
            .layer(tower_http::cors::CorsLayer::permissive())
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind and serve until shutdown.
    pub async fn start(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(address = %addr, "api server listening");

        let router = self.router();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "api server error");
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("shutting down api server");
        self.shutdown.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn active_wallets(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(100);
    let wallets = state.trust.get_token_active_wallets(&token, 0.0, limit).await?;
    let count = wallets.len();
    Ok(Json(json!({
        "token_address": token,
        "active_wallets": wallets,
        "count": count,
    })))
}

async fn active_wallets_count(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let count = state.trust.get_active_wallets_count(&token).await?;
    Ok(Json(json!({
        "token_address": token,
        "count": count,
    })))
}

#[derive(Debug, Deserialize)]
struct TrustedParams {
    limit: Option<usize>,
    min_score: Option<f64>,
}

async fn trusted_wallets(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
    Query(params): Query<TrustedParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(50);
    let min_score = params.min_score.unwrap_or(70.0);
    let wallets = state
        .trust
        .get_token_active_wallets(&token, min_score, limit)
        .await?;
    let count = wallets.len();
    Ok(Json(json!({
        "token_address": token,
        "min_trust_score": min_score,
        "trusted_wallets": wallets,
        "count": count,
    })))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    min_trust_score: Option<f64>,
    max_trust_score: Option<f64>,
    min_transactions: Option<i64>,
    limit: Option<usize>,
}

async fn search_wallets(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(50);
    let min_trust = params.min_trust_score.unwrap_or(0.0);
    let max_trust = params.max_trust_score.unwrap_or(100.0);
    let min_transactions = params.min_transactions.unwrap_or(0);
    let query = params.query.clone().unwrap_or_default();
    let needle = query.to_lowercase();

    let all = state.trust.get_token_active_wallets(&token, 0.0, 0).await?;
    let mut matches = Vec::new();
    for wallet in all {
        if wallet.trust_score < min_trust || wallet.trust_score > max_trust {
            continue;
        }
        if wallet.transaction_count < min_transactions {
            continue;
        }
        if !needle.is_empty() && !wallet.address.to_lowercase().contains(&needle) {
            continue;
        }
        let days_active = wallet
            .first_transaction_timestamp
            .map(|t| (Utc::now() - t).num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0);
        matches.push(json!({
            "address": wallet.address,
            "first_transaction_timestamp": wallet.first_transaction_timestamp,
            "entry_rank": wallet.entry_rank,
            "transaction_count": wallet.transaction_count,
            "last_active": wallet.last_active,
            "trust_score": wallet.trust_score,
            "days_active": days_active,
        }));
        if matches.len() >= limit {
            break;
        }
    }

    let count = matches.len();
    Ok(Json(json!({
        "token_address": token,
        "wallets": matches,
        "count": count,
        "filters": {
            "query": query,
            "min_trust_score": min_trust,
            "max_trust_score": max_trust,
            "min_transactions": min_transactions,
        },
    })))
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    hours: Option<i64>,
    limit: Option<usize>,
}

async fn recent_wallets(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Value>, ApiError> {
    let hours = params.hours.unwrap_or(24);
    let limit = params.limit.unwrap_or(50);

    let all = state.trust.get_token_active_wallets(&token, 0.0, 0).await?;
    let cutoff = Utc::now() - ChronoDuration::hours(hours);
    let mut recent: Vec<_> = all
        .into_iter()
        .filter(|w| w.last_active.map_or(false, |t| t > cutoff))
        .collect();
    recent.sort_by(|a, b| b.last_active.cmp(&a.last_active));
    recent.truncate(limit);

    let count = recent.len();
    Ok(Json(json!({
        "token_address": token,
        "hours": hours,
        "active_wallets": recent,
        "count": count,
    })))
}
