//! X-Score composition.
//!
//! Six weighted components (token quality, wallet quality, trust, market
//! dynamics, temporal, reactivation) plus two additive bonuses, then an
//! anti-dump penalty proportional to dump severity. Raw component scores
//! live in [0, 100] before weighting, so each contribution is bounded by
//! its weight.

use chrono::Utc;
use std::collections::HashMap;

use crate::config::XScoreTunings;
use crate::types::{
    AntiDumpResult, LifecycleState, Token, TokenMetrics, WalletAnalysis, XScoreResult,
};

/// Compose the full X-Score for a token.
pub fn compose_x_score(
    tunings: &XScoreTunings,
    token: &Token,
    metrics: &TokenMetrics,
    analysis: &WalletAnalysis,
    anti_dump: AntiDumpResult,
) -> XScoreResult {
    let mut components = HashMap::new();

    components.insert(
        "token_quality".to_string(),
        token_quality(token, metrics) * tunings.token_quality_weight,
    );
    components.insert(
        "wallet_quality".to_string(),
        wallet_quality(analysis) * tunings.wallet_quality_weight,
    );
    components.insert(
        "trust_factor".to_string(),
        trust_factor(analysis) * tunings.trust_factor_weight,
    );
    components.insert(
        "market_factor".to_string(),
        market_dynamics(metrics) * tunings.market_factor_weight,
    );
    components.insert(
        "temporal_factor".to_string(),
        temporal_patterns(tunings) * tunings.temporal_factor_weight,
    );
    components.insert(
        "reactivation_factor".to_string(),
        reactivation_factor(tunings, token.lifecycle_state) * tunings.reactivation_factor_weight,
    );

    let sniper_bonus = tunings.sniper_bonus_scale
        * (analysis.sniper_count as f64 / tunings.sniper_bonus_saturation).min(1.0);
    components.insert("sniper_bonus".to_string(), sniper_bonus);

    // Rising price carried by smart money is the strongest single signal.
    let price_smart_boost = metrics.price_change_1h
        * analysis.trust_metrics.smart_money_ratio
        * tunings.price_smart_boost_scale;
    components.insert("price_smart_boost".to_string(), price_smart_boost);

    let base_score: f64 = components.values().sum();

    let mut final_score = base_score;
    if anti_dump.detected {
        let penalty = (anti_dump.severity / 100.0).min(tunings.max_dump_penalty);
        final_score = base_score * (1.0 - penalty);
        components.insert("anti_dump_penalty".to_string(), -base_score * penalty);
    }

    XScoreResult {
        token_address: token.address.clone(),
        x_score: final_score.clamp(0.0, 100.0),
        base_score: base_score.clamp(0.0, 100.0),
        components,
        anti_dump,
        calculated_at: Utc::now(),
    }
}

/// Holder base, market cap and social presence, penalised for
/// volume/market-cap ratios that smell like wash trading.
fn token_quality(token: &Token, metrics: &TokenMetrics) -> f64 {
    let mut quality: f64 = 50.0;

    if token.holder_count > 1000 {
        quality += 10.0;
    } else if token.holder_count > 500 {
        quality += 5.0;
    }

    if metrics.market_cap > 1_000_000.0 {
        quality += 10.0;
    } else if metrics.market_cap > 500_000.0 {
        quality += 5.0;
    }

    if !token.website.is_empty() {
        quality += 5.0;
    }
    if !token.twitter.is_empty() {
        quality += 5.0;
    }
    if !token.telegram.is_empty() {
        quality += 5.0;
    }

    let volume_mcap_ratio = if metrics.market_cap > 0.0 {
        metrics.volume_1h / metrics.market_cap
    } else {
        0.0
    };
    if volume_mcap_ratio > 0.5 {
        quality -= 20.0;
    } else if volume_mcap_ratio > 0.3 {
        quality -= 10.0;
    }

    quality.clamp(0.0, 100.0)
}

/// Penalises fresh/bot-heavy populations, rewards blue chips and strong
/// buy consensus.
fn wallet_quality(analysis: &WalletAnalysis) -> f64 {
    let mut quality: f64 = 50.0;

    if analysis.total_wallets > 0 {
        let total = analysis.total_wallets as f64;
        let fresh_ratio = analysis.wallet_categories.fresh as f64 / total;
        let bot_ratio = analysis.wallet_categories.bot as f64 / total;
        let bluechip_ratio = analysis.wallet_categories.bluechip as f64 / total;

        if fresh_ratio > 0.7 {
            quality -= 30.0;
        } else if fresh_ratio > 0.5 {
            quality -= 15.0;
        }

        if bot_ratio > 0.4 {
            quality -= 20.0;
        } else if bot_ratio > 0.2 {
            quality -= 10.0;
        }

        if bluechip_ratio > 0.1 {
            quality += 20.0;
        } else if bluechip_ratio > 0.05 {
            quality += 10.0;
        }
    }

    let buy_sell_ratio = analysis.trade_patterns.buy_sell_ratio;
    if buy_sell_ratio > 3.0 {
        quality += 15.0;
    } else if buy_sell_ratio > 2.0 {
        quality += 10.0;
    } else if buy_sell_ratio > 0.0 && buy_sell_ratio < 0.5 {
        quality -= 20.0;
    } else if buy_sell_ratio > 0.0 && buy_sell_ratio < 0.8 {
        quality -= 10.0;
    }

    quality.clamp(0.0, 100.0)
}

/// Smart-money presence, early-trusted entrants, recent smart activity.
fn trust_factor(analysis: &WalletAnalysis) -> f64 {
    let mut trust: f64 = 50.0;

    if analysis.total_wallets > 0 {
        let smart_ratio = analysis.trust_metrics.smart_money_ratio;
        if smart_ratio > 0.2 {
            trust += 30.0;
        } else if smart_ratio > 0.1 {
            trust += 20.0;
        } else if smart_ratio > 0.05 {
            trust += 10.0;
        }

        let early_ratio = analysis.trust_metrics.early_trusted_ratio;
        if early_ratio > 0.5 {
            trust += 20.0;
        } else if early_ratio > 0.3 {
            trust += 10.0;
        }
    }

    let activity = analysis.trust_metrics.smart_money_activity;
    if activity > 50.0 {
        trust += 15.0;
    } else if activity > 30.0 {
        trust += 10.0;
    }

    trust.clamp(0.0, 100.0)
}

/// Volume tiers, 1h price move and the buy/sell count ratio.
fn market_dynamics(metrics: &TokenMetrics) -> f64 {
    let mut dynamics: f64 = 50.0;

    if metrics.volume_1h > 100_000.0 {
        dynamics += 20.0;
    } else if metrics.volume_1h > 50_000.0 {
        dynamics += 15.0;
    } else if metrics.volume_1h > 10_000.0 {
        dynamics += 10.0;
    }

    if metrics.price_change_1h > 0.2 {
        dynamics += 15.0;
    } else if metrics.price_change_1h > 0.1 {
        dynamics += 10.0;
    } else if metrics.price_change_1h < -0.2 {
        dynamics -= 15.0;
    } else if metrics.price_change_1h < -0.1 {
        dynamics -= 10.0;
    }

    let buy_sell_ratio = if metrics.sell_count_1h > 0 {
        metrics.buy_count_1h as f64 / metrics.sell_count_1h as f64
    } else {
        1.0
    };
    if buy_sell_ratio > 2.0 {
        dynamics += 15.0;
    } else if buy_sell_ratio > 1.5 {
        dynamics += 10.0;
    } else if buy_sell_ratio < 0.5 {
        dynamics -= 15.0;
    } else if buy_sell_ratio < 0.8 {
        dynamics -= 10.0;
    }

    dynamics.clamp(0.0, 100.0)
}

/// Neutral baseline until time-of-day analytics land.
fn temporal_patterns(tunings: &XScoreTunings) -> f64 {
    tunings.temporal_baseline.clamp(0.0, 100.0)
}

/// Lifecycle-state driven: recently reactivated or hyped tokens carry the
/// bonus, dormant and fresh ones do not.
fn reactivation_factor(tunings: &XScoreTunings, state: Option<LifecycleState>) -> f64 {
    match state {
        Some(LifecycleState::Reactivated) => tunings.reactivated_state_score,
        Some(LifecycleState::Hyped) => tunings.hyped_state_score,
        _ => 0.0,
    }
    .clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisTrustMetrics;

    fn pump_inputs() -> (Token, TokenMetrics, WalletAnalysis) {
        let token = Token {
            address: "T".to_string(),
            holder_count: 1200,
            ..Default::default()
        };
        let metrics = TokenMetrics {
            token_address: "T".to_string(),
            market_cap: 1_500_000.0,
            price_change_1h: 0.15,
            ..Default::default()
        };
        let analysis = WalletAnalysis {
            token_address: "T".to_string(),
            total_wallets: 100,
            sniper_count: 4,
            trust_metrics: AnalysisTrustMetrics {
                smart_money_ratio: 0.25,
                ..Default::default()
            },
            trade_patterns: crate::types::TradePatterns {
                buy_orders: 210,
                sell_orders: 100,
                buy_sell_ratio: 2.1,
            },
            ..Default::default()
        };
        (token, metrics, analysis)
    }

    #[test]
    fn test_smart_money_pump_scores_high() {
        let tunings = XScoreTunings::default();
        let (token, metrics, analysis) = pump_inputs();
        let result = compose_x_score(
            &tunings,
            &token,
            &metrics,
            &analysis,
            AntiDumpResult::default(),
        );

        let boost = result.components["price_smart_boost"];
        assert!((boost - 0.375).abs() < 1e-9);
        assert_eq!(result.components["sniper_bonus"], 5.0);
        assert!(result.base_score >= 55.0, "base was {}", result.base_score);
        // No dump detected: final equals base.
        assert!((result.x_score - result.base_score).abs() < 1e-9);
        assert!(result.x_score <= 100.0);
    }

    #[test]
    fn test_components_bounded_by_weights() {
        let tunings = XScoreTunings::default();
        let (token, metrics, analysis) = pump_inputs();
        let result = compose_x_score(
            &tunings,
            &token,
            &metrics,
            &analysis,
            AntiDumpResult::default(),
        );
        for (name, weight) in [
            ("token_quality", tunings.token_quality_weight),
            ("wallet_quality", tunings.wallet_quality_weight),
            ("trust_factor", tunings.trust_factor_weight),
            ("market_factor", tunings.market_factor_weight),
            ("temporal_factor", tunings.temporal_factor_weight),
            ("reactivation_factor", tunings.reactivation_factor_weight),
        ] {
            assert!(
                result.components[name] <= weight * 100.0 + 1e-9,
                "{name} exceeded its weight bound"
            );
        }
    }

    #[test]
    fn test_dump_penalty_applied() {
        let tunings = XScoreTunings::default();
        let (token, metrics, analysis) = pump_inputs();
        let dump = AntiDumpResult {
            detected: true,
            severity: 90.0,
            clusters: Vec::new(),
        };
        let result = compose_x_score(&tunings, &token, &metrics, &analysis, dump);
        // 90 severity: exactly the 0.9 cap.
        assert!((result.x_score - result.base_score * 0.1).abs() < 1e-6);
        assert!(result.components["anti_dump_penalty"] < 0.0);
    }

    #[test]
    fn test_wash_trading_penalty() {
        let token = Token::default();
        let mut metrics = TokenMetrics {
            market_cap: 100_000.0,
            volume_1h: 60_000.0,
            ..Default::default()
        };
        // 0.6 volume/mcap: -20, but volume tier +15 partially offsets.
        let analysis = WalletAnalysis::default();
        let tunings = XScoreTunings::default();
        let with_wash = compose_x_score(
            &tunings,
            &token,
            &metrics,
            &analysis,
            AntiDumpResult::default(),
        );
        metrics.volume_1h = 1_000.0;
        let without = compose_x_score(
            &tunings,
            &token,
            &metrics,
            &analysis,
            AntiDumpResult::default(),
        );
        assert!(with_wash.components["token_quality"] < without.components["token_quality"]);
    }
}
