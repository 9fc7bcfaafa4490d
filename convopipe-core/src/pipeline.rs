//! One pipeline run for one date
//!
//! ```text
//! list landing/date=D/ ─► parse + sanitize ─► [write sanitized] ─► assemble
//!        │                      │                                     │
//!   no input: FAILURE    no valid events: FAILURE                 classify
//!                                                                     │
//!                               write report ◄─ write metrics ◄─ aggregate
//! ```
//!
//! ## Failure contract
//!
//! - No input objects, or no valid events: the report is written with an
//!   error and the run fails.
//! - Bad lines are counted as invalid and skipped.
//! - A read error on one object is recorded and the remaining objects are
//!   still read.
//! - Classification never fails the run.
//! - Any other error (typically a storage write) fails the run. The error is
//!   appended to the report and a best-effort write of the partial report is
//!   attempted.

use crate::analytics::aggregate;
use crate::classify::SyncClassifier;
use crate::config::Config;
use crate::error::Result;
use crate::ingest::{assemble, parse_event, sanitize_event};
use crate::output::{self, landing_prefix};
use crate::storage::{self, ObjectRef, Storage};
use crate::types::{DailyMetrics, MessageEvent, RedactionStats, RunReport};
use chrono::Utc;
use std::time::Instant;

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    /// Process exit code: 0 on success, 1 on failure
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failure => 1,
        }
    }
}

/// Result of [`Pipeline::run`]
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Final state of the report, whether or not it was persisted
    pub report: RunReport,
    /// Present when the run got as far as aggregation
    pub metrics: Option<DailyMetrics>,
}

/// Sequences the stages of one run against injected collaborators.
pub struct Pipeline<'a> {
    config: &'a Config,
    storage: &'a dyn Storage,
    classifier: &'a SyncClassifier,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, storage: &'a dyn Storage, classifier: &'a SyncClassifier) -> Self {
        Self {
            config,
            storage,
            classifier,
        }
    }

    /// Run every stage for the configured date.
    pub fn run(&self) -> RunOutcome {
        let started = Instant::now();
        let date = self.config.run_date();
        let mut report = RunReport::new(date, Utc::now(), self.storage.kind());

        tracing::info!(
            date = %date,
            storage = %self.storage.kind(),
            bypass = self.classifier.is_bypass(),
            "Pipeline run starting"
        );

        match self.execute(&mut report, started) {
            Ok(Some(metrics)) => {
                tracing::info!(
                    duration_seconds = report.duration_seconds,
                    conversations = metrics.total_conversations,
                    "Pipeline completed successfully"
                );
                RunOutcome {
                    status: RunStatus::Success,
                    report,
                    metrics: Some(metrics),
                }
            }
            Ok(None) => RunOutcome {
                status: RunStatus::Failure,
                report,
                metrics: None,
            },
            Err(e) => {
                tracing::error!(error = %e, "Pipeline failed");
                report.errors.push(format!("Pipeline failed: {}", e));
                report.duration_seconds = started.elapsed().as_secs_f64();
                if let Err(write_err) = output::write_run_report(self.storage, &report) {
                    tracing::error!(error = %write_err, "Failed to write partial run report");
                }
                RunOutcome {
                    status: RunStatus::Failure,
                    report,
                    metrics: None,
                }
            }
        }
    }

    /// Stages after report creation. `Ok(None)` is a graceful abort whose
    /// report has already been written.
    fn execute(&self, report: &mut RunReport, started: Instant) -> Result<Option<DailyMetrics>> {
        let date = report.date;
        let prefix = landing_prefix(date);

        tracing::info!(prefix = %prefix, "Discovering input files");
        let objects = self.storage.list(&prefix)?;
        if objects.is_empty() {
            tracing::warn!(date = %date, "No input files found");
            report.errors.push(format!("No input files found at {}", prefix));
            return self.abort(report, started);
        }
        tracing::info!(count = objects.len(), "Found input files");
        report.input_files_count = objects.len() as u64;

        let events = self.read_events(&objects, report);
        let stats = report.redaction_stats;
        tracing::info!(
            valid = report.events_valid,
            invalid = report.events_invalid,
            redactions = stats.total(),
            emails = stats.emails_redacted,
            phones = stats.phones_redacted,
            urls = stats.urls_redacted,
            "Parsed events"
        );

        if events.is_empty() {
            tracing::warn!("No valid events to process");
            report.errors.push("No valid events found".to_string());
            return self.abort(report, started);
        }

        if self.config.write_sanitized {
            output::write_sanitized_events(self.storage, &events, date)?;
            report.sanitized_written = true;
        }

        let mut conversations = assemble(events);
        report.conversations_assembled = conversations.len() as u64;
        tracing::info!(count = conversations.len(), "Assembled conversations");

        let classified = self.classifier.classify_many(&mut conversations);
        report.conversations_classified = classified as u64;
        tracing::info!(count = classified, "Classified conversations");

        let metrics = aggregate(&conversations, date);
        tracing::info!(groups = metrics.metrics.len(), "Aggregated metrics");

        output::write_metrics(self.storage, &metrics)?;
        report.metrics_written = true;

        report.duration_seconds = started.elapsed().as_secs_f64();
        output::write_run_report(self.storage, report)?;

        Ok(Some(metrics))
    }

    /// Read, validate and sanitize every line of every object.
    ///
    /// Counters and redaction stats land in `report`. A read failure stops
    /// the current object only.
    fn read_events(&self, objects: &[ObjectRef], report: &mut RunReport) -> Vec<MessageEvent> {
        let mut events = Vec::new();
        let mut stats = RedactionStats::default();

        for object in objects {
            tracing::info!(key = %object.key, size = object.size, "Processing file");

            let lines = match self.storage.open_text(&object.key) {
                Ok(lines) => lines,
                Err(e) => {
                    record_read_error(report, &object.key, &e);
                    continue;
                }
            };

            for (index, line) in lines.enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        record_read_error(report, &object.key, &e);
                        break;
                    }
                };

                report.events_read += 1;
                match parse_event(&line) {
                    Ok(event) => {
                        report.events_valid += 1;
                        events.push(sanitize_event(&event, &mut stats));
                    }
                    Err(reason) => {
                        report.events_invalid += 1;
                        tracing::warn!(
                            key = %object.key,
                            line = index + 1,
                            reason = %reason,
                            "Failed to parse event"
                        );
                    }
                }
            }
        }

        report.redaction_stats.merge(&stats);
        events
    }

    fn abort(&self, report: &mut RunReport, started: Instant) -> Result<Option<DailyMetrics>> {
        report.duration_seconds = started.elapsed().as_secs_f64();
        output::write_run_report(self.storage, report)?;
        Ok(None)
    }
}

fn record_read_error(report: &mut RunReport, key: &str, error: &crate::error::Error) {
    let message = format!("Error processing file {}: {}", key, error);
    tracing::error!("{}", message);
    report.errors.push(message);
}

/// Validate `config`, build storage and classifier, and run once.
///
/// Configuration errors are returned before any I/O happens.
pub fn run_pipeline(config: &Config) -> Result<RunOutcome> {
    config.validate()?;

    let storage = storage::open(&config.storage)?;
    let classifier = SyncClassifier::new(&config.classifier)?;

    Ok(Pipeline::new(config, storage.as_ref(), &classifier).run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalStore, Config) {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path()).unwrap();
        let config = Config {
            date: NaiveDate::from_ymd_opt(2026, 1, 3),
            ..Default::default()
        };
        (temp, store, config)
    }

    fn bypass() -> SyncClassifier {
        SyncClassifier::from_classifier(crate::classify::Classifier::bypass()).unwrap()
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::Failure.exit_code(), 1);
    }

    #[test]
    fn test_no_valid_events_fails_with_report() {
        let (_temp, store, config) = setup();
        store
            .write_lines(
                "landing/date=2026-01-03/bad.jsonl",
                &["nope".to_string(), "".to_string()],
            )
            .unwrap();
        let classifier = bypass();

        let outcome = Pipeline::new(&config, &store, &classifier).run();
        assert_eq!(outcome.status, RunStatus::Failure);
        assert!(outcome.metrics.is_none());
        assert_eq!(outcome.report.events_read, 2);
        assert_eq!(outcome.report.events_invalid, 2);
        assert_eq!(outcome.report.errors, vec!["No valid events found"]);
        assert!(store.exists("reports/date=2026-01-03/run_latest.json").unwrap());
        assert!(!store
            .exists("curated/metrics_daily/date=2026-01-03/metrics.json")
            .unwrap());
    }

    #[test]
    fn test_run_pipeline_rejects_invalid_config() {
        let config = Config {
            storage: crate::config::StorageConfig {
                backend: crate::types::StorageKind::S3,
                bucket: None,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            run_pipeline(&config),
            Err(crate::error::Error::Config(_))
        ));
    }
}
