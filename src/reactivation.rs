//! Reactivation detector.
//!
//! A periodic scan over dormant tokens (SLEEP_MODE, MONITORING_LIGHT):
//! current metrics are compared to the last snapshot, smart-wallet
//! returns are detected, and candidates scoring past the floor are
//! promoted to REACTIVATED with their metrics saved and an alert raised.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alerting::AlertManager;
use crate::config::{ReactivationConfig, ReactivationTunings};
use crate::token::TokenEngine;
use crate::types::{
    LifecycleState, ReactivationCandidate, SmartWalletReturns, TokenMetrics, TradeAction,
};
use crate::wallet::WalletIntelligence;

/// States the scan treats as dormant.
const DORMANT_STATES: [LifecycleState; 2] =
    [LifecycleState::SleepMode, LifecycleState::MonitoringLight];

/// Dormant-token revival detector.
pub struct ReactivationDetector {
    engine: Arc<TokenEngine>,
    wallets: Arc<WalletIntelligence>,
    alerts: Arc<AlertManager>,
    config: ReactivationConfig,
    tunings: ReactivationTunings,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ReactivationDetector {
    pub fn new(
        engine: Arc<TokenEngine>,
        wallets: Arc<WalletIntelligence>,
        alerts: Arc<AlertManager>,
        config: ReactivationConfig,
        tunings: ReactivationTunings,
    ) -> Self {
        Self {
            engine,
            wallets,
            alerts,
            config,
            tunings,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(self: Arc<Self>) -> Result<()> {
        info!(
            interval_secs = self.config.scan_interval_secs,
            "starting reactivation detector"
        );
        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            this.scan_loop().await;
        });
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("shutting down reactivation detector");
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
    }

    async fn scan_loop(&self) {
        let interval = Duration::from_secs(self.config.scan_interval_secs.max(1));
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("reactivation scan loop stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    match self.scan_dormant_tokens().await {
                        Ok(candidates) => {
                            info!(count = candidates.len(), "reactivation candidates found");
                            for candidate in candidates {
                                if let Err(e) = self.process_candidate(&candidate).await {
                                    error!(
                                        token = %candidate.token_address,
                                        error = %e,
                                        "failed to process reactivation candidate"
                                    );
                                }
                            }
                        }
                        Err(e) => error!(error = %e, "dormant token scan failed"),
                    }
                }
            }
        }
    }

    /// One pass over every dormant token.
    pub async fn scan_dormant_tokens(&self) -> Result<Vec<ReactivationCandidate>> {
        let dormant = self.engine.get_tokens_by_states(&DORMANT_STATES).await?;

        let mut candidates = Vec::new();
        for token in dormant {
            let metrics = match self.engine.get_token_metrics(&token.address).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!(token = %token.address, error = %e, "metrics fetch failed");
                    continue;
                }
            };

            let previous = self
                .engine
                .get_token_last_snapshot(&token.address)
                .await
                .unwrap_or(None);

            let changes = calculate_metric_changes(&self.tunings, &metrics, previous.as_ref());

            let smart_returns = match self.detect_smart_wallet_returns(&token.address).await {
                Ok(returns) => Some(returns),
                Err(e) => {
                    warn!(token = %token.address, error = %e, "smart return detection failed");
                    None
                }
            };

            let score =
                calculate_reactivation_score(&self.tunings, &changes, smart_returns.as_ref());

            if score >= self.config.min_score {
                info!(
                    token = %token.address,
                    symbol = %token.symbol,
                    score,
                    "reactivation candidate detected"
                );
                candidates.push(ReactivationCandidate {
                    token_address: token.address.clone(),
                    token_symbol: token.symbol.clone(),
                    reactivation_score: score,
                    changes,
                    smart_returns,
                    current_metrics: Some(metrics),
                    detected_at: Utc::now(),
                });
            }
        }

        Ok(candidates)
    }

    /// Smart wallets that exited long ago and bought back recently.
    pub async fn detect_smart_wallet_returns(
        &self,
        token_address: &str,
    ) -> Result<SmartWalletReturns> {
        let tunings = &self.tunings;
        let trades = self
            .engine
            .get_token_recent_trades(token_address, tunings.return_max_age_hours)
            .await?;

        let mut result = SmartWalletReturns::default();
        if trades.is_empty() {
            return Ok(result);
        }

        let mut buyers: Vec<String> = Vec::new();
        for trade in trades.iter().filter(|t| t.action == TradeAction::Buy) {
            if !buyers.contains(&trade.wallet_address) {
                buyers.push(trade.wallet_address.clone());
            }
        }

        let exit_cutoff = Utc::now() - ChronoDuration::hours(tunings.exit_min_age_hours);
        let return_cutoff = Utc::now() - ChronoDuration::hours(tunings.return_max_age_hours);

        let mut returning = Vec::new();
        let mut returning_volume = 0.0;
        for buyer in buyers {
            let (is_smart, _) = match self.wallets.is_smart_money_wallet(&buyer).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(wallet = %buyer, error = %e, "smart money check failed");
                    continue;
                }
            };
            if !is_smart {
                continue;
            }

            let history = match self.engine.get_wallet_token_history(&buyer, token_address).await {
                Ok(history) if !history.is_empty() => history,
                _ => continue,
            };

            let past_exit = history
                .iter()
                .any(|t| t.action == TradeAction::Sell && t.timestamp < exit_cutoff);
            let recent_buys: f64 = history
                .iter()
                .filter(|t| t.action == TradeAction::Buy && t.timestamp > return_cutoff)
                .map(|t| t.total_value)
                .sum();

            if past_exit && recent_buys > 0.0 {
                returning.push(buyer);
                returning_volume += recent_buys;
            }
        }

        result.detected = returning.len() >= tunings.min_returning_wallets;
        result.wallets = returning;
        result.returning_total_volume = returning_volume;

        if result.detected {
            result.return_timestamp = Some(Utc::now() - ChronoDuration::hours(24));
            result.initial_exit_timestamp = Some(Utc::now() - ChronoDuration::days(7));
            let wallet_factor =
                (result.wallets.len() as f64 / tunings.return_count_saturation).min(1.0);
            let volume_factor =
                (returning_volume / tunings.return_volume_saturation).min(1.0);
            result.severity = (wallet_factor * tunings.return_count_weight
                + volume_factor * tunings.return_volume_weight)
                * 100.0;
        }

        Ok(result)
    }

    /// Promote a candidate: state transition, metrics save, alert.
    pub async fn process_candidate(&self, candidate: &ReactivationCandidate) -> Result<()> {
        self.engine
            .update_token_state(&candidate.token_address, LifecycleState::Reactivated)
            .await?;

        if let Err(e) = self.engine.save_reactivation_metrics(candidate).await {
            // The state change is already durable; keep going.
            error!(
                token = %candidate.token_address,
                error = %e,
                "failed to save reactivation metrics"
            );
        }

        self.alerts
            .create_reactivation_alert(
                &candidate.token_address,
                &candidate.token_symbol,
                candidate.reactivation_score,
            )
            .await;

        info!(
            token = %candidate.token_address,
            symbol = %candidate.token_symbol,
            score = candidate.reactivation_score,
            smart_wallets = candidate
                .smart_returns
                .as_ref()
                .map(|r| r.wallets.len())
                .unwrap_or(0),
            "token reactivation processed"
        );
        Ok(())
    }
}

/// Relative metric changes against the previous snapshot. No snapshot
/// means zero changes.
pub fn calculate_metric_changes(
    tunings: &ReactivationTunings,
    current: &TokenMetrics,
    previous: Option<&TokenMetrics>,
) -> HashMap<String, f64> {
    let mut changes = HashMap::from([
        ("volume_1h_change".to_string(), 0.0),
        ("price_change".to_string(), 0.0),
        ("holder_growth".to_string(), 0.0),
    ]);
    let Some(previous) = previous else {
        return changes;
    };

    let volume_change = if current.volume_1h > 0.0 && previous.volume_1h > 0.0 {
        current.volume_1h / previous.volume_1h
    } else if current.volume_1h > 0.0 {
        tunings.zero_volume_ratio
    } else {
        0.0
    };
    changes.insert("volume_1h_change".to_string(), volume_change);

    if current.price > 0.0 && previous.price > 0.0 {
        changes.insert(
            "price_change".to_string(),
            (current.price - previous.price) / previous.price,
        );
    }

    if current.holder_count > 0 && previous.holder_count > 0 {
        changes.insert(
            "holder_growth".to_string(),
            (current.holder_count - previous.holder_count) as f64 / previous.holder_count as f64,
        );
    }

    changes
}

/// Weighted saturation of the metric changes plus the smart-return bonus,
/// clamped to [0, 100].
pub fn calculate_reactivation_score(
    tunings: &ReactivationTunings,
    changes: &HashMap<String, f64>,
    smart_returns: Option<&SmartWalletReturns>,
) -> f64 {
    let volume_factor = (changes.get("volume_1h_change").copied().unwrap_or(0.0)
        / tunings.volume_change_saturation)
        .min(1.0);
    let price_factor = (changes.get("price_change").copied().unwrap_or(0.0)
        / tunings.price_change_saturation)
        .min(1.0);
    let holders_factor = (changes.get("holder_growth").copied().unwrap_or(0.0)
        / tunings.holder_growth_saturation)
        .min(1.0);

    let base = (volume_factor * tunings.volume_factor_weight
        + price_factor * tunings.price_factor_weight
        + holders_factor * tunings.holders_factor_weight)
        * 100.0;

    let mut bonus = 0.0;
    if let Some(returns) = smart_returns {
        if returns.detected {
            let count_factor =
                (returns.wallets.len() as f64 / tunings.return_count_saturation).min(1.0);
            let volume_factor =
                (returns.returning_total_volume / tunings.return_volume_saturation).min(1.0);
            bonus = (count_factor * tunings.return_count_weight
                + volume_factor * tunings.return_volume_weight)
                * tunings.smart_return_bonus_max;
        }
    }

    (base + bonus).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(price: f64, volume_1h: f64, holders: i64) -> TokenMetrics {
        TokenMetrics {
            token_address: "t1".to_string(),
            price,
            volume_1h,
            holder_count: holders,
            updated_at: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn test_changes_without_snapshot_are_zero() {
        let tunings = ReactivationTunings::default();
        let changes = calculate_metric_changes(&tunings, &metrics(0.135, 8000.0, 112), None);
        assert_eq!(changes["volume_1h_change"], 0.0);
        assert_eq!(changes["price_change"], 0.0);
        assert_eq!(changes["holder_growth"], 0.0);
    }

    #[test]
    fn test_zero_previous_volume_uses_sentinel_ratio() {
        let tunings = ReactivationTunings::default();
        let changes = calculate_metric_changes(
            &tunings,
            &metrics(0.1, 500.0, 100),
            Some(&metrics(0.1, 0.0, 100)),
        );
        assert_eq!(changes["volume_1h_change"], 10.0);
    }

    #[test]
    fn test_full_reactivation_scenario_score() {
        // 8x volume, +35% price, +12% holders, two smart wallets back
        // with 600 volume: base saturates at 100, bonus 17.4, clamped.
        let tunings = ReactivationTunings::default();
        let changes = calculate_metric_changes(
            &tunings,
            &metrics(0.135, 8000.0, 112),
            Some(&metrics(0.1, 1000.0, 100)),
        );
        assert!((changes["volume_1h_change"] - 8.0).abs() < 1e-9);
        assert!((changes["price_change"] - 0.35).abs() < 1e-9);
        assert!((changes["holder_growth"] - 0.12).abs() < 1e-9);

        let returns = SmartWalletReturns {
            detected: true,
            wallets: vec!["w1".to_string(), "w2".to_string()],
            returning_total_volume: 600.0,
            ..Default::default()
        };
        let score = calculate_reactivation_score(&tunings, &changes, Some(&returns));
        assert_eq!(score, 100.0);

        // Without the clamp interplay: base alone is already 100.
        let base_only = calculate_reactivation_score(&tunings, &changes, None);
        assert_eq!(base_only, 100.0);
    }

    #[test]
    fn test_bonus_magnitude() {
        let tunings = ReactivationTunings::default();
        let changes = HashMap::from([
            ("volume_1h_change".to_string(), 0.0),
            ("price_change".to_string(), 0.0),
            ("holder_growth".to_string(), 0.0),
        ]);
        let returns = SmartWalletReturns {
            detected: true,
            wallets: vec!["w1".to_string(), "w2".to_string()],
            returning_total_volume: 600.0,
            ..Default::default()
        };
        // 30·(0.7·min(1,2/5) + 0.3·min(1,600/500)) = 30·(0.28+0.30) = 17.4
        let score = calculate_reactivation_score(&tunings, &changes, Some(&returns));
        assert!((score - 17.4).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped() {
        let tunings = ReactivationTunings::default();
        let changes = HashMap::from([
            ("volume_1h_change".to_string(), 100.0),
            ("price_change".to_string(), 10.0),
            ("holder_growth".to_string(), 10.0),
        ]);
        let returns = SmartWalletReturns {
            detected: true,
            wallets: (0..20).map(|i| format!("w{i}")).collect(),
            returning_total_volume: 1e9,
            ..Default::default()
        };
        let score = calculate_reactivation_score(&tunings, &changes, Some(&returns));
        assert_eq!(score, 100.0);
    }
}
