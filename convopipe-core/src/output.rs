//! Published artifacts and their storage keys
//!
//! | Artifact | Key |
//! |----------|-----|
//! | Landing input | `landing/date=YYYY-MM-DD/*` |
//! | Sanitized events | `sanitized/date=YYYY-MM-DD/messages.jsonl` |
//! | Daily metrics | `curated/metrics_daily/date=YYYY-MM-DD/metrics.json` |
//! | Run report | `reports/date=YYYY-MM-DD/run_latest.json` |
//!
//! Every write overwrites the previous artifact for the same date.

use crate::error::Result;
use crate::storage::{write_serialized, Storage};
use crate::types::{DailyMetrics, MessageEvent, RunReport};
use chrono::NaiveDate;

/// Prefix holding a date's input files
pub fn landing_prefix(date: NaiveDate) -> String {
    format!("landing/date={}/", date.format("%Y-%m-%d"))
}

pub fn sanitized_key(date: NaiveDate) -> String {
    format!("sanitized/date={}/messages.jsonl", date.format("%Y-%m-%d"))
}

pub fn metrics_key(date: NaiveDate) -> String {
    format!(
        "curated/metrics_daily/date={}/metrics.json",
        date.format("%Y-%m-%d")
    )
}

pub fn report_key(date: NaiveDate) -> String {
    format!("reports/date={}/run_latest.json", date.format("%Y-%m-%d"))
}

pub fn write_metrics(storage: &dyn Storage, metrics: &DailyMetrics) -> Result<()> {
    let key = metrics_key(metrics.date);
    write_serialized(storage, &key, metrics)?;
    tracing::info!(key = %key, groups = metrics.metrics.len(), "Metrics written");
    Ok(())
}

pub fn write_run_report(storage: &dyn Storage, report: &RunReport) -> Result<()> {
    let key = report_key(report.date);
    write_serialized(storage, &key, report)?;
    tracing::info!(key = %key, errors = report.errors.len(), "Run report written");
    Ok(())
}

/// Write events as JSON Lines, one compact object per line.
pub fn write_sanitized_events(
    storage: &dyn Storage,
    events: &[MessageEvent],
    date: NaiveDate,
) -> Result<()> {
    let key = sanitized_key(date);
    let lines = events
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    storage.write_lines(&key, &lines)?;
    tracing::info!(key = %key, events = lines.len(), "Sanitized events written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use crate::types::{Role, StorageKind};
    use chrono::Utc;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 3).unwrap()
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(landing_prefix(date()), "landing/date=2026-01-03/");
        assert_eq!(
            sanitized_key(date()),
            "sanitized/date=2026-01-03/messages.jsonl"
        );
        assert_eq!(
            metrics_key(date()),
            "curated/metrics_daily/date=2026-01-03/metrics.json"
        );
        assert_eq!(report_key(date()), "reports/date=2026-01-03/run_latest.json");
    }

    #[test]
    fn test_write_report_and_metrics() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path()).unwrap();

        let mut report = RunReport::new(date(), Utc::now(), StorageKind::Local);
        report.errors.push("something".to_string());
        write_run_report(&store, &report).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&store.read_to_string(&report_key(date())).unwrap()).unwrap();
        assert_eq!(json["date"], "2026-01-03");
        assert_eq!(json["storage_type"], "local");
        assert_eq!(json["errors"][0], "something");
        assert_eq!(json["redaction_stats"]["emails_redacted"], 0);

        let metrics = DailyMetrics {
            date: date(),
            metrics: vec![],
            total_conversations: 0,
            total_events_processed: 0,
        };
        write_metrics(&store, &metrics).unwrap();
        assert!(store.exists(&metrics_key(date())).unwrap());
    }

    #[test]
    fn test_write_sanitized_events_one_per_line() {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::new(temp.path()).unwrap();

        let events: Vec<MessageEvent> = (0..3)
            .map(|i| MessageEvent {
                event_time: "2026-01-03T10:00:00Z".parse().unwrap(),
                conversation_id: "c1".to_string(),
                message_id: format!("m{}", i),
                role: Role::User,
                content: "line\nbreak".to_string(),
                team: "Sales".to_string(),
                user_id: "u1".to_string(),
            })
            .collect();
        write_sanitized_events(&store, &events, date()).unwrap();

        let text = store.read_to_string(&sanitized_key(date())).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: MessageEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, events[0]);
        assert!(lines[0].contains("\"event_time\":\"2026-01-03T10:00:00Z\""));
    }
}
