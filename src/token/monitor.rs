//! Price and volume movement monitor.
//!
//! A cooperative loop: every interval, each watched token's fresh metrics
//! are compared against the previous stored snapshot; relative moves past
//! the thresholds publish `price_change` / `volume_spike` events. The
//! snapshot is replaced after comparison. Metrics are fetched before any
//! lock is taken; the snapshot map sees only this loop as a writer.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::TokenEngine;

impl TokenEngine {
    /// Run the movement monitor until shutdown.
    pub(crate) async fn price_monitor_loop(&self, interval: Duration) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("price monitor stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.check_price_movements().await;
                }
            }
        }
    }

    /// One monitoring pass over the watched set. The loop calls this on
    /// every tick; it is also directly invocable for on-demand checks.
    pub async fn check_price_movements(&self) {
        let watched: Vec<String> = self.watched.read().await.iter().cloned().collect();
        if watched.is_empty() {
            return;
        }
        debug!(tokens = watched.len(), "checking price movements");

        for token in watched {
            let current = match self.get_token_metrics(&token).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!(token = %token, error = %e, "metrics fetch failed");
                    continue;
                }
            };

            let previous = {
                let snapshots = self.snapshots.read().await;
                snapshots.get(&token).cloned()
            };
            let previous = match previous {
                Some(snapshot) => Some(snapshot),
                None => self.store.token_last_snapshot(&token).await.ok().flatten(),
            };

            // No baseline: zero changes, no events, just seed the snapshot.
            if let Some(previous) = previous {
                if previous.price > 0.0 {
                    let change = (current.price - previous.price) / previous.price;
                    if change.abs() >= self.config.price_change_threshold {
                        info!(token = %token, change, "price movement detected");
                        let event = self.price_change_event(&token, &previous, &current, change);
                        self.pipeline
                            .publish_best_effort(&self.streams.token_events, event)
                            .await;
                    }
                }

                if previous.volume_24h > 0.0 {
                    let change =
                        (current.volume_24h - previous.volume_24h) / previous.volume_24h;
                    if change >= self.config.volume_change_threshold {
                        info!(token = %token, change, "volume spike detected");
                        let event = self.volume_spike_event(&token, &current, change);
                        self.pipeline
                            .publish_best_effort(&self.streams.token_events, event)
                            .await;
                    }
                }
            }

            self.snapshots
                .write()
                .await
                .insert(token.clone(), current.clone());
            if let Err(e) = self.store.save_token_metrics(&current).await {
                warn!(token = %token, error = %e, "snapshot persistence failed");
            }
        }
    }
}
