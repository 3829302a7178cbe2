//! Core domain models shared across the oracle components.
//!
//! Everything here serializes with serde: the same structs travel through
//! the cache (JSON values), the event pipeline (flattened payloads) and
//! the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Observational regime of a token. Identity is immutable; the lifecycle
/// state mutates only through the Token Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    #[serde(rename = "DISCOVERED")]
    Discovered,
    #[serde(rename = "VALIDATED")]
    Validated,
    #[serde(rename = "HYPED")]
    Hyped,
    #[serde(rename = "SLEEP_MODE")]
    SleepMode,
    #[serde(rename = "MONITORING_LIGHT")]
    MonitoringLight,
    #[serde(rename = "REACTIVATED")]
    Reactivated,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Discovered => "DISCOVERED",
            LifecycleState::Validated => "VALIDATED",
            LifecycleState::Hyped => "HYPED",
            LifecycleState::SleepMode => "SLEEP_MODE",
            LifecycleState::MonitoringLight => "MONITORING_LIGHT",
            LifecycleState::Reactivated => "REACTIVATED",
            LifecycleState::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DISCOVERED" => Some(LifecycleState::Discovered),
            "VALIDATED" => Some(LifecycleState::Validated),
            "HYPED" => Some(LifecycleState::Hyped),
            "SLEEP_MODE" => Some(LifecycleState::SleepMode),
            "MONITORING_LIGHT" => Some(LifecycleState::MonitoringLight),
            "REACTIVATED" => Some(LifecycleState::Reactivated),
            "COMPLETED" => Some(LifecycleState::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token metadata as normalised from the market gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub total_supply: i64,
    pub holder_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_state: Option<LifecycleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub twitter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub website: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub telegram: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

/// Time-stamped metrics snapshot attached to a token. `updated_at` is
/// monotonically increasing per token; the previous snapshot is kept for
/// movement comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub token_address: String,
    pub price: f64,
    pub market_cap: f64,
    pub volume_1h: f64,
    pub volume_24h: f64,
    pub price_change_1h: f64,
    pub buy_count_1h: i64,
    pub sell_count_1h: i64,
    pub holder_count: i64,
    pub intelligent_holders: i64,
    pub average_trust_score: f64,
    pub smart_money_holders: i64,
    pub updated_at: DateTime<Utc>,
}

/// Trade direction on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Transfer,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(TradeAction::Buy),
            "sell" => Some(TradeAction::Sell),
            "transfer" => Some(TradeAction::Transfer),
            _ => None,
        }
    }
}

/// Append-only ledger entry for one wallet/token interaction.
///
/// Identity is `id` = `{tx_hash}:{wallet}:{token}`; re-inserting the same
/// id overwrites the mutable secondary fields only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInteraction {
    pub id: String,
    pub wallet_address: String,
    pub token_address: String,
    pub token_symbol: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    pub amount: f64,
    pub value: f64,
    pub price: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_buy_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_risk_factor: Option<f64>,
}

impl WalletInteraction {
    /// Canonical interaction id.
    pub fn interaction_id(tx_hash: &str, wallet: &str, token: &str) -> String {
        format!("{}:{}:{}", tx_hash, wallet, token)
    }
}

/// Persisted per-wallet reputation, one row per wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTrustScore {
    pub address: String,
    pub trust_score: f64,
    pub last_updated: DateTime<Utc>,
}

/// Aggregated trust view over a token's wallet population.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenTrustMetrics {
    pub token_address: String,
    pub active_wallets: usize,
    pub trusted_wallets: usize,
    pub avg_trust_score: f64,
    pub trust_score_distribution: HashMap<String, usize>,
    pub early_trust_ratio: f64,
    pub smart_money_count: usize,
    pub smart_money_ratio: f64,
    pub smart_money_activity: f64,
}

/// Similarity between two wallets, Jaccard over their token sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletSimilarity {
    pub wallet_address: String,
    pub score: f64,
    pub common_tokens: usize,
    pub timing_score: f64,
    pub position_score: f64,
    #[serde(default)]
    pub trust_score: f64,
    pub trade_frequency: f64,
}

/// Per-token influence of a single wallet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletInfluence {
    pub wallet_address: String,
    pub token_address: String,
    pub influence_score: f64,
    pub volume_impact: f64,
    pub timing_impact: f64,
    pub price_impact: f64,
    pub transaction_count: i64,
}

/// Behavioural risk profile of a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRiskFactors {
    pub wallet_address: String,
    pub risk_score: f64,
    pub false_flagged_tokens: usize,
    pub rugpull_exit_rate: f64,
    pub fast_sell_rate: f64,
    pub long_hold_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl WalletRiskFactors {
    /// Neutral profile used when a wallet has no interaction history.
    pub fn neutral(wallet: &str) -> Self {
        Self {
            wallet_address: wallet.to_string(),
            risk_score: 50.0,
            false_flagged_tokens: 0,
            rugpull_exit_rate: 0.0,
            fast_sell_rate: 0.0,
            long_hold_rate: 0.0,
            updated_at: Utc::now(),
        }
    }
}

/// A wallet's aggregated footprint on one token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletToken {
    pub wallet_address: String,
    pub token_address: String,
    pub token_symbol: String,
    pub transaction_count: i64,
    pub total_volume: f64,
    pub first_interaction_time: Option<DateTime<Utc>>,
    pub last_interaction_time: Option<DateTime<Utc>>,
}

/// A wallet active on a token, with derived entry ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveWallet {
    pub address: String,
    pub first_transaction_timestamp: Option<DateTime<Utc>>,
    pub entry_rank: usize,
    pub transaction_count: i64,
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trust_score: f64,
    pub net_position: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

/// One trade on a token, normalised from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTrade {
    pub id: String,
    pub token_address: String,
    pub wallet_address: String,
    pub action: TradeAction,
    pub amount: f64,
    pub price: f64,
    pub total_value: f64,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
    pub block_number: u64,
}

/// Composite X-Score output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XScoreResult {
    pub token_address: String,
    pub x_score: f64,
    pub base_score: f64,
    pub components: HashMap<String, f64>,
    pub anti_dump: AntiDumpResult,
    pub calculated_at: DateTime<Utc>,
}

/// Result of the coordinated-sell detector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntiDumpResult {
    pub detected: bool,
    pub severity: f64,
    pub clusters: Vec<DumpCluster>,
}

/// A group of rapid consecutive sells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpCluster {
    pub timestamp_start: DateTime<Utc>,
    pub timestamp_end: DateTime<Utc>,
    pub duration_seconds: f64,
    pub transaction_count: usize,
    pub unique_wallets: usize,
    pub smart_wallets: usize,
    pub total_volume: f64,
    pub severity: f64,
}

/// Smart wallets coming back to a dormant token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartWalletReturns {
    pub detected: bool,
    pub wallets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_exit_timestamp: Option<DateTime<Utc>>,
    pub returning_total_volume: f64,
    pub severity: f64,
}

/// A dormant token showing revival signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactivationCandidate {
    pub token_address: String,
    pub token_symbol: String,
    pub reactivation_score: f64,
    pub changes: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_returns: Option<SmartWalletReturns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_metrics: Option<TokenMetrics>,
    pub detected_at: DateTime<Utc>,
}

/// Alert severity buckets, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    #[serde(rename = "URGENT")]
    Urgent,
    #[serde(rename = "ALERT")]
    Alert,
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Urgent => "URGENT",
            AlertSeverity::Alert => "ALERT",
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::Low => "LOW",
        }
    }
}

/// An alert raised on a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAlert {
    pub id: String,
    pub token_address: String,
    pub token_symbol: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub confirmation_count: u32,
    pub is_confirmed: bool,
}

/// Wallet category counters derived from gateway tags and trust scores.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WalletCategories {
    pub smart: usize,
    pub trusted: usize,
    pub fresh: usize,
    pub bot: usize,
    pub sniper: usize,
    pub bluechip: usize,
    pub bundler: usize,
}

/// Trust rollups inside a wallet analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisTrustMetrics {
    pub avg_trust_score: f64,
    pub smart_money_ratio: f64,
    pub smart_money_count: usize,
    pub total_wallets: usize,
    pub early_trusted_ratio: f64,
    pub smart_money_activity: f64,
}

/// Order-flow rollups inside a wallet analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradePatterns {
    pub buy_orders: i64,
    pub sell_orders: i64,
    pub buy_sell_ratio: f64,
}

/// One analysed wallet inside a token analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletDetail {
    pub address: String,
    pub trust_score: f64,
    pub categories: Vec<String>,
    pub entry_rank: usize,
    pub entry_time: Option<DateTime<Utc>>,
    pub volume: f64,
    pub buys: i64,
    pub sells: i64,
}

impl WalletDetail {
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

/// Full wallet-population analysis for a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletAnalysis {
    pub token_address: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub total_wallets: usize,
    pub wallet_categories: WalletCategories,
    pub trust_metrics: AnalysisTrustMetrics,
    pub trade_patterns: TradePatterns,
    pub sniper_count: usize,
    pub sniper_ratio: f64,
    pub wallet_details: Vec<WalletDetail>,
}

impl WalletAnalysis {
    /// Minimal analysis when no wallet data is available.
    pub fn empty(token_address: &str, total_wallets: usize) -> Self {
        Self {
            token_address: token_address.to_string(),
            total_wallets,
            ..Default::default()
        }
    }

    /// Addresses of wallets carrying the `smart` category.
    pub fn smart_wallets(&self) -> std::collections::HashSet<&str> {
        self.wallet_details
            .iter()
            .filter(|d| d.has_category("smart"))
            .map(|d| d.address.as_str())
            .collect()
    }
}

/// Full profile of a single wallet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletProfile {
    pub address: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    pub trust_score: f64,
    pub tags: Vec<String>,
    pub total_transactions: i64,
    pub win_rate: f64,
    pub avg_profit_per_trade: f64,
    pub fast_tx_ratio: f64,
    pub holdings: Vec<ProfileHolding>,
}

/// One holding inside a wallet profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileHolding {
    pub token_address: String,
    pub token_symbol: String,
    pub balance: f64,
    pub usd_value: f64,
    pub unrealized_profit: f64,
}

/// Quality report over a token's holder base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderQualityReport {
    pub token_address: String,
    pub total_holders: usize,
    pub quality_score: f64,
    pub smart_money_ratio: f64,
    pub smart_money_count: usize,
    pub early_trusted_ratio: f64,
    pub sniper_ratio: f64,
    pub sniper_count: usize,
    pub category_distribution: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_state_round_trip() {
        for state in [
            LifecycleState::Discovered,
            LifecycleState::Validated,
            LifecycleState::Hyped,
            LifecycleState::SleepMode,
            LifecycleState::MonitoringLight,
            LifecycleState::Reactivated,
            LifecycleState::Completed,
        ] {
            assert_eq!(LifecycleState::parse(state.as_str()), Some(state));
        }
        assert_eq!(LifecycleState::parse("TRENDING"), None);
    }

    #[test]
    fn test_interaction_id_format() {
        let id = WalletInteraction::interaction_id("0xabc", "W1", "T1");
        assert_eq!(id, "0xabc:W1:T1");
    }

    #[test]
    fn test_smart_wallets_extraction() {
        let analysis = WalletAnalysis {
            wallet_details: vec![
                WalletDetail {
                    address: "a".into(),
                    categories: vec!["smart".into(), "trusted".into()],
                    ..Default::default()
                },
                WalletDetail {
                    address: "b".into(),
                    categories: vec!["fresh".into()],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let smart = analysis.smart_wallets();
        assert!(smart.contains("a"));
        assert!(!smart.contains("b"));
    }
}
