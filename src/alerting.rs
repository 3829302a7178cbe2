//! Alert manager.
//!
//! In-memory append-only alert list with severity mapping; persistence is
//! best-effort and never fails the primary flow.

use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::AlertTunings;
use crate::storage::Store;
use crate::types::{AlertSeverity, Token, TokenAlert, WalletAnalysis};

/// In-memory alert registry.
pub struct AlertManager {
    tunings: AlertTunings,
    store: Option<Arc<dyn Store>>,
    alerts: Mutex<Vec<TokenAlert>>,
}

impl AlertManager {
    pub fn new(tunings: AlertTunings) -> Self {
        Self {
            tunings,
            store: None,
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// Also mirror alerts into the store, best-effort.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn start(&self) -> Result<()> {
        info!("starting alert manager");
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("shutting down alert manager");
    }

    /// Append a new alert and return it.
    pub async fn create_alert(
        &self,
        token_address: &str,
        token_symbol: &str,
        alert_type: &str,
        severity: AlertSeverity,
        message: String,
    ) -> TokenAlert {
        let alert = TokenAlert {
            id: format!("alert_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
            token_address: token_address.to_string(),
            token_symbol: token_symbol.to_string(),
            alert_type: alert_type.to_string(),
            severity,
            message,
            detected_at: Utc::now(),
            confirmation_count: 0,
            is_confirmed: false,
        };

        info!(
            token = token_address,
            symbol = token_symbol,
            alert_type,
            severity = severity.as_str(),
            "alert created"
        );

        self.alerts.lock().await.push(alert.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.save_token_alert(&alert).await {
                warn!(alert_id = %alert.id, error = %e, "alert persistence failed");
            }
        }
        alert
    }

    pub async fn get_alerts(&self) -> Vec<TokenAlert> {
        self.alerts.lock().await.clone()
    }

    /// Bump the confirmation count and mark the alert confirmed.
    pub async fn confirm_alert(&self, alert_id: &str) -> Result<()> {
        let mut alerts = self.alerts.lock().await;
        let Some(alert) = alerts.iter_mut().find(|a| a.id == alert_id) else {
            bail!("alert not found: {alert_id}");
        };
        alert.confirmation_count += 1;
        alert.is_confirmed = true;

        if let Some(store) = &self.store {
            let updated = alert.clone();
            drop(alerts);
            if let Err(e) = store.save_token_alert(&updated).await {
                warn!(alert_id, error = %e, "alert confirmation persistence failed");
            }
        }
        Ok(())
    }

    /// Score-driven alerts: HIGH_SCORE wins over SMART_MONEY.
    pub async fn create_token_alert(
        &self,
        token: &Token,
        x_score: f64,
        analysis: Option<&WalletAnalysis>,
    ) -> Option<TokenAlert> {
        if x_score > self.tunings.high_score_threshold {
            return Some(
                self.create_alert(
                    &token.address,
                    &token.symbol,
                    "HIGH_SCORE",
                    AlertSeverity::Urgent,
                    format!("Token {} has a high X-Score of {:.2}", token.symbol, x_score),
                )
                .await,
            );
        }

        if let Some(analysis) = analysis {
            let ratio = analysis.trust_metrics.smart_money_ratio;
            if ratio > self.tunings.smart_money_ratio_threshold {
                return Some(
                    self.create_alert(
                        &token.address,
                        &token.symbol,
                        "SMART_MONEY",
                        AlertSeverity::Alert,
                        format!(
                            "Token {} has high smart money presence ({:.1}%)",
                            token.symbol,
                            ratio * 100.0
                        ),
                    )
                    .await,
                );
            }
        }

        None
    }

    /// Dump severity maps onto the alert ladder.
    pub async fn create_dump_alert(
        &self,
        token_address: &str,
        token_symbol: &str,
        severity: f64,
    ) -> TokenAlert {
        let level = if severity > self.tunings.dump_critical_severity {
            AlertSeverity::Critical
        } else if severity > self.tunings.dump_high_severity {
            AlertSeverity::High
        } else if severity > self.tunings.dump_medium_severity {
            AlertSeverity::Medium
        } else {
            AlertSeverity::Low
        };

        self.create_alert(
            token_address,
            token_symbol,
            "DUMP_DETECTED",
            level,
            format!(
                "Potential dump detected for {} (severity: {:.1})",
                token_symbol, severity
            ),
        )
        .await
    }

    pub async fn create_reactivation_alert(
        &self,
        token_address: &str,
        token_symbol: &str,
        reactivation_score: f64,
    ) -> TokenAlert {
        self.create_alert(
            token_address,
            token_symbol,
            "REACTIVATION",
            AlertSeverity::Alert,
            format!(
                "Token {} is reactivating with score {:.1}",
                token_symbol, reactivation_score
            ),
        )
        .await
    }
}
