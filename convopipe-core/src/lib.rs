//! # convopipe-core
//!
//! Core library for convopipe - a daily batch pipeline that turns raw
//! assistant conversation logs into per-team task metrics.
//!
//! This library provides:
//! - Domain types for events, conversations, metrics and run reports
//! - A storage abstraction with local and S3 backends
//! - Redaction, assembly, classification and aggregation stages
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! One run processes one date:
//! - **Input:** `landing/date=D/*` JSONL files (never modified)
//! - **Processing:** parse, redact, group into conversations, classify, aggregate
//! - **Output:** `curated/metrics_daily/date=D/metrics.json`, `reports/date=D/run_latest.json`
//!   and optionally `sanitized/date=D/messages.jsonl`
//!
//! ## Example
//!
//! ```rust,no_run
//! use convopipe_core::{run_pipeline, Config};
//!
//! let mut config = Config::load().expect("failed to load config");
//! config.apply_env().expect("invalid environment override");
//!
//! let outcome = run_pipeline(&config).expect("invalid configuration");
//! std::process::exit(outcome.status.exit_code());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{run_pipeline, Pipeline, RunOutcome, RunStatus};
pub use storage::{ObjectRef, Storage};
pub use types::*;

// Public modules
pub mod analytics;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod storage;
pub mod types;
