//! Wallet behaviour analysis.
//!
//! Builds the per-token wallet population view (categories, entry ranks,
//! trust rollups, order-flow patterns) and the per-wallet smart-money and
//! sniper heuristics.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::WalletIntelligenceConfig;
use crate::error::OracleError;
use crate::gateway::{MarketGateway, TraderActivity};
use crate::trust::TrustNetwork;
use crate::types::{
    AnalysisTrustMetrics, ProfileHolding, TradePatterns, WalletAnalysis, WalletCategories,
    WalletDetail, WalletProfile,
};

/// First entrants examined for the early-trusted ratio.
const EARLY_ENTRANT_SAMPLE: usize = 10;
/// Lookback for smart-money buy activity, in hours.
const ACTIVITY_WINDOW_HOURS: i64 = 24;
/// Gateway-tagged snipers start at this heuristic score.
const SNIPER_TAG_BONUS: f64 = 60.0;
/// Weight of the fast-transaction ratio in the sniper heuristic.
const SNIPER_FAST_TX_WEIGHT: f64 = 40.0;
/// Gateway-tagged smart money adds this to the heuristic score.
const SMART_TAG_BONUS: f64 = 30.0;

/// Analyses wallets against the gateway and the trust network.
pub struct WalletAnalyzer {
    gateway: Arc<dyn MarketGateway>,
    trust: Arc<TrustNetwork>,
    config: WalletIntelligenceConfig,
}

impl WalletAnalyzer {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        trust: Arc<TrustNetwork>,
        config: WalletIntelligenceConfig,
    ) -> Self {
        Self {
            gateway,
            trust,
            config,
        }
    }

    /// Full wallet-population analysis for a token.
    pub async fn analyze_token_wallets(
        &self,
        token_address: &str,
    ) -> Result<WalletAnalysis, OracleError> {
        debug!(token = token_address, "analyzing token wallets");

        let traders = self.gateway.all_token_traders(token_address).await?;

        let mut analysis = WalletAnalysis {
            token_address: token_address.to_string(),
            timestamp: Some(Utc::now()),
            total_wallets: traders.len(),
            ..Default::default()
        };

        match self.gateway.token_wallet_tags_stat(token_address).await {
            Ok(tags) => {
                for dist in &tags.distributions {
                    match dist.tag.as_str() {
                        "smart_money" => analysis.wallet_categories.smart = dist.count,
                        "fresh_wallet" => analysis.wallet_categories.fresh = dist.count,
                        "sniper" => {
                            analysis.wallet_categories.sniper = dist.count;
                            analysis.sniper_count = dist.count;
                        }
                        "bluechip" => analysis.wallet_categories.bluechip = dist.count,
                        "bundler" => analysis.wallet_categories.bundler = dist.count,
                        "bot" => analysis.wallet_categories.bot = dist.count,
                        _ => {}
                    }
                }
            }
            Err(e) => {
                warn!(token = token_address, error = %e, "wallet tag stats unavailable");
            }
        }

        // Per-wallet details with trust scores and categories.
        let mut details = Vec::with_capacity(traders.len());
        for trader in &traders {
            let trust_score = self.trust.get_wallet_trust_score(&trader.address).await;
            let categories = self.categorize_wallet(trader, trust_score);
            let (buys, sells) = trade_split(trader);
            details.push(WalletDetail {
                address: trader.address.clone(),
                trust_score,
                categories,
                entry_rank: 0,
                entry_time: trader.first_trade.or(trader.last_trade),
                volume: trader.buy_volume + trader.sell_volume,
                buys,
                sells,
            });
        }

        // Earliest entrants first; ranks follow the sort.
        details.sort_by(|a, b| match (a.entry_time, b.entry_time) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        for (rank, detail) in details.iter_mut().enumerate() {
            detail.entry_rank = rank + 1;
        }

        analysis.trust_metrics = self.trust_rollups(&traders, &details);
        analysis.trade_patterns = trade_patterns(&traders);
        if analysis.sniper_count == 0 {
            analysis.sniper_count = details
                .iter()
                .filter(|d| d.has_category("sniper"))
                .count();
        }
        if analysis.total_wallets > 0 {
            analysis.sniper_ratio = analysis.sniper_count as f64 / analysis.total_wallets as f64;
        }
        analysis.wallet_details = details;

        info!(
            token = token_address,
            total_wallets = analysis.total_wallets,
            smart_money_ratio = analysis.trust_metrics.smart_money_ratio,
            sniper_count = analysis.sniper_count,
            buy_sell_ratio = analysis.trade_patterns.buy_sell_ratio,
            "wallet analysis completed"
        );
        Ok(analysis)
    }

    fn trust_rollups(
        &self,
        traders: &[TraderActivity],
        details: &[WalletDetail],
    ) -> AnalysisTrustMetrics {
        let mut metrics = AnalysisTrustMetrics {
            total_wallets: details.len(),
            ..Default::default()
        };
        if details.is_empty() {
            return metrics;
        }

        let total: f64 = details.iter().map(|d| d.trust_score).sum();
        metrics.avg_trust_score = total / details.len() as f64;

        let smart_count = details
            .iter()
            .filter(|d| d.trust_score >= self.config.smart_threshold)
            .count();
        metrics.smart_money_count = smart_count;
        metrics.smart_money_ratio = smart_count as f64 / details.len() as f64;

        let early = &details[..details.len().min(EARLY_ENTRANT_SAMPLE)];
        let trusted_early = early
            .iter()
            .filter(|d| d.trust_score >= self.config.trust_threshold)
            .count();
        if !early.is_empty() {
            metrics.early_trusted_ratio = trusted_early as f64 / early.len() as f64;
        }

        // Share of recent buy volume carried by smart wallets.
        let cutoff = Utc::now() - ChronoDuration::hours(ACTIVITY_WINDOW_HOURS);
        let mut total_buy = 0.0;
        let mut smart_buy = 0.0;
        for trader in traders {
            if trader.last_trade.map_or(false, |t| t > cutoff) {
                total_buy += trader.buy_volume;
                let is_smart = details
                    .iter()
                    .any(|d| d.address == trader.address && d.trust_score >= self.config.smart_threshold);
                if is_smart {
                    smart_buy += trader.buy_volume;
                }
            }
        }
        if total_buy > 0.0 {
            metrics.smart_money_activity = smart_buy / total_buy * 100.0;
        }

        metrics
    }

    fn categorize_wallet(&self, trader: &TraderActivity, trust_score: f64) -> Vec<String> {
        let mut categories = Vec::new();
        if trust_score >= self.config.smart_threshold {
            categories.push("smart".to_string());
        }
        if trust_score >= self.config.trust_threshold {
            categories.push("trusted".to_string());
        }
        for tag in &trader.tags {
            let category = match tag.as_str() {
                "fresh_wallet" | "new" => "fresh",
                "sniper" => "sniper",
                "bundler" => "bundler",
                "bluechip" | "whale" => "bluechip",
                "bot" | "dex_bot" => "bot",
                _ => continue,
            };
            if !categories.iter().any(|c| c == category) {
                categories.push(category.to_string());
            }
        }
        categories
    }

    /// Full profile for one wallet, combining gateway data with the
    /// trust network.
    pub async fn wallet_profile(&self, wallet_address: &str) -> Result<WalletProfile, OracleError> {
        let info = self.gateway.wallet_info(wallet_address).await?;

        let mut profile = WalletProfile {
            address: wallet_address.to_string(),
            trust_score: self.trust.get_wallet_trust_score(wallet_address).await,
            tags: info.tags,
            ..Default::default()
        };

        match self.gateway.wallet_stat(wallet_address, "all").await {
            Ok(stat) => {
                profile.total_transactions = stat.total_trades;
                if stat.total_trades > 0 {
                    profile.win_rate = stat.winning_trades as f64 / stat.total_trades as f64;
                    profile.avg_profit_per_trade = stat.total_profit / stat.total_trades as f64;
                }
                profile.fast_tx_ratio = stat.fast_tx_ratio;
            }
            Err(e) => {
                warn!(wallet = wallet_address, error = %e, "wallet stats unavailable");
            }
        }

        match self.gateway.all_wallet_holdings(wallet_address).await {
            Ok(holdings) => {
                profile.holdings = holdings
                    .into_iter()
                    .map(|h| ProfileHolding {
                        token_address: h.token_address,
                        token_symbol: h.token_symbol,
                        balance: h.amount,
                        usd_value: h.usd_value,
                        unrealized_profit: 0.0,
                    })
                    .collect();
            }
            Err(e) => {
                warn!(wallet = wallet_address, error = %e, "wallet holdings unavailable");
            }
        }

        Ok(profile)
    }

    /// Sniper heuristic: gateway tag plus fast-entry behaviour.
    pub async fn is_sniper_wallet(
        &self,
        wallet_address: &str,
    ) -> Result<(bool, f64), OracleError> {
        let profile = self.wallet_profile(wallet_address).await?;
        Ok(self.sniper_score(&profile))
    }

    pub(crate) fn sniper_score(&self, profile: &WalletProfile) -> (bool, f64) {
        let mut score = 0.0;
        if profile.tags.iter().any(|t| t == "sniper") {
            score += SNIPER_TAG_BONUS;
        }
        score += profile.fast_tx_ratio * SNIPER_FAST_TX_WEIGHT;
        let score = score.min(100.0);
        (score >= self.config.sniper_threshold, score)
    }

    /// Smart-money heuristic: win rate above coin-flip, trust above the
    /// trusted floor, and the gateway's own smart-money tag.
    pub async fn is_smart_money_wallet(
        &self,
        wallet_address: &str,
    ) -> Result<(bool, f64), OracleError> {
        let profile = self.wallet_profile(wallet_address).await?;
        Ok(self.smart_money_score(&profile))
    }

    pub(crate) fn smart_money_score(&self, profile: &WalletProfile) -> (bool, f64) {
        let mut score = 100.0 * (profile.win_rate - 0.5).max(0.0);
        score += 0.5 * (profile.trust_score - self.config.trust_threshold).max(0.0);
        if profile
            .tags
            .iter()
            .any(|t| t == "smart" || t == "smart_money")
        {
            score += SMART_TAG_BONUS;
        }
        let score = score.min(100.0);
        (score >= self.config.smart_threshold, score)
    }
}

fn trade_split(trader: &TraderActivity) -> (i64, i64) {
    if trader.buy_count > 0 || trader.sell_count > 0 {
        (trader.buy_count, trader.sell_count)
    } else {
        // Gateway gave no per-side counts: split evenly.
        (trader.trade_count / 2, trader.trade_count / 2)
    }
}

fn trade_patterns(traders: &[TraderActivity]) -> TradePatterns {
    let mut patterns = TradePatterns::default();
    for trader in traders {
        let (buys, sells) = trade_split(trader);
        patterns.buy_orders += buys;
        patterns.sell_orders += sells;
    }
    if patterns.sell_orders > 0 {
        patterns.buy_sell_ratio = patterns.buy_orders as f64 / patterns.sell_orders as f64;
    }
    patterns
}

/// Category share view used by holder-quality reports.
pub(crate) fn category_distribution(
    categories: &WalletCategories,
    total: usize,
) -> std::collections::HashMap<String, f64> {
    let mut distribution = std::collections::HashMap::new();
    if total == 0 {
        return distribution;
    }
    let total = total as f64;
    distribution.insert("smart".to_string(), categories.smart as f64 / total);
    distribution.insert("trusted".to_string(), categories.trusted as f64 / total);
    distribution.insert("fresh".to_string(), categories.fresh as f64 / total);
    distribution.insert("bot".to_string(), categories.bot as f64 / total);
    distribution.insert("sniper".to_string(), categories.sniper as f64 / total);
    distribution.insert("bluechip".to_string(), categories.bluechip as f64 / total);
    distribution
}
