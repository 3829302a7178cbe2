//! Wallet Intelligence service.
//!
//! Front door for wallet profiling and holder-quality evaluation; the
//! heavy lifting lives in [`analyzer`]. Profiles are cached in-process.

pub mod analyzer;

pub use analyzer::WalletAnalyzer;

use anyhow::Result;
use chrono::Utc;
use moka::future::Cache as MokaCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::WalletIntelligenceConfig;
use crate::error::OracleError;
use crate::gateway::MarketGateway;
use crate::trust::TrustNetwork;
use crate::types::{HolderQualityReport, WalletAnalysis, WalletProfile};

/// Wallet profiling and classification service.
pub struct WalletIntelligence {
    analyzer: WalletAnalyzer,
    config: WalletIntelligenceConfig,
    profiles: MokaCache<String, WalletProfile>,
}

impl WalletIntelligence {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        trust: Arc<TrustNetwork>,
        config: WalletIntelligenceConfig,
    ) -> Self {
        let profiles = MokaCache::builder()
            .max_capacity(50_000)
            .time_to_live(Duration::from_secs(config.profile_cache_ttl_secs.max(1)))
            .build();
        Self {
            analyzer: WalletAnalyzer::new(gateway, trust, config.clone()),
            config,
            profiles,
        }
    }

    pub async fn start(&self) -> Result<()> {
        info!("starting wallet intelligence");
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("shutting down wallet intelligence");
    }

    /// Build (or reuse) a wallet profile, enriched with the sniper and
    /// smart-money classification tags.
    pub async fn analyze_wallet(&self, wallet_address: &str) -> Result<WalletProfile, OracleError> {
        if let Some(profile) = self.profiles.get(wallet_address).await {
            return Ok(profile);
        }

        let mut profile = self.analyzer.wallet_profile(wallet_address).await?;

        let (is_sniper, sniper_score) = self.analyzer.sniper_score(&profile);
        if is_sniper && !profile.tags.iter().any(|t| t == "sniper") {
            profile.tags.push("sniper".to_string());
        }
        let (is_smart, smart_score) = self.analyzer.smart_money_score(&profile);
        if is_smart && !profile.tags.iter().any(|t| t == "smart_money") {
            profile.tags.push("smart_money".to_string());
        }

        info!(
            wallet = wallet_address,
            is_sniper,
            sniper_score,
            is_smart,
            smart_score,
            trust_score = profile.trust_score,
            "wallet analysis completed"
        );

        self.profiles
            .insert(wallet_address.to_string(), profile.clone())
            .await;
        Ok(profile)
    }

    /// Population analysis for one token.
    pub async fn analyze_token_wallets(
        &self,
        token_address: &str,
    ) -> Result<WalletAnalysis, OracleError> {
        self.analyzer.analyze_token_wallets(token_address).await
    }

    pub async fn is_smart_money_wallet(
        &self,
        wallet_address: &str,
    ) -> Result<(bool, f64), OracleError> {
        if let Some(profile) = self.profiles.get(wallet_address).await {
            return Ok(self.analyzer.smart_money_score(&profile));
        }
        self.analyzer.is_smart_money_wallet(wallet_address).await
    }

    pub async fn is_sniper_wallet(
        &self,
        wallet_address: &str,
    ) -> Result<(bool, f64), OracleError> {
        if let Some(profile) = self.profiles.get(wallet_address).await {
            return Ok(self.analyzer.sniper_score(&profile));
        }
        self.analyzer.is_sniper_wallet(wallet_address).await
    }

    /// Quality score over a token's holder base:
    /// (0.5·smart + 0.3·earlyTrusted)·100, penalised when snipers exceed
    /// a tenth of the population.
    pub async fn evaluate_token_holders(
        &self,
        token_address: &str,
    ) -> Result<HolderQualityReport, OracleError> {
        let analysis = self.analyzer.analyze_token_wallets(token_address).await?;

        let smart_ratio = analysis.trust_metrics.smart_money_ratio;
        let early_ratio = analysis.trust_metrics.early_trusted_ratio;
        let sniper_ratio = analysis.sniper_ratio;

        let mut quality = (smart_ratio * 0.5 + early_ratio * 0.3) * 100.0;
        if sniper_ratio > 0.1 {
            quality -= (sniper_ratio - 0.1) * 200.0;
        }
        let quality = quality.clamp(0.0, 100.0);

        let report = HolderQualityReport {
            token_address: token_address.to_string(),
            total_holders: analysis.total_wallets,
            quality_score: quality,
            smart_money_ratio: smart_ratio,
            smart_money_count: analysis.trust_metrics.smart_money_count,
            early_trusted_ratio: early_ratio,
            sniper_ratio,
            sniper_count: analysis.sniper_count,
            category_distribution: analyzer::category_distribution(
                &analysis.wallet_categories,
                analysis.total_wallets,
            ),
            timestamp: Utc::now(),
        };

        info!(
            token = token_address,
            quality_score = report.quality_score,
            total_holders = report.total_holders,
            smart_money_count = report.smart_money_count,
            "holder quality evaluated"
        );
        Ok(report)
    }

    /// Threshold above which this service considers a wallet smart.
    pub fn smart_threshold(&self) -> f64 {
        self.config.smart_threshold
    }
}
