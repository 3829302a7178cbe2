//! Memoracle - memecoin trust oracle for Solana launches
//!
//! This crate ingests market and on-chain data about newly launched
//! tokens, maintains a wallet/token reputation graph (Memory of Trust),
//! computes composite X-Scores, detects coordinated dumps and dormant
//! token reactivations, and emits events over a log-backed pipeline.

pub mod alerting;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod reactivation;
pub mod storage;
pub mod token;
pub mod trust;
pub mod types;
pub mod utils;
pub mod wallet;

// Re-export main types for convenience
pub use alerting::AlertManager;
pub use config::Config;
pub use error::OracleError;
pub use pipeline::{Event, Pipeline, Processor};
pub use reactivation::ReactivationDetector;
pub use token::TokenEngine;
pub use trust::TrustNetwork;
pub use wallet::WalletIntelligence;
