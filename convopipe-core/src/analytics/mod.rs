//! Daily metrics aggregation
//!
//! Reduces classified conversations into one [`CategoryMetrics`] per
//! (team, task category) pair. Output order is by team, then by category
//! label, so identical input always produces byte-identical `metrics.json`.

use crate::types::{CategoryMetrics, Conversation, DailyMetrics};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Aggregate conversations for `date`.
///
/// Conversations without a category are skipped in the per-group metrics but
/// still count toward `total_conversations` and `total_events_processed`.
pub fn aggregate(conversations: &[Conversation], date: NaiveDate) -> DailyMetrics {
    let mut groups: BTreeMap<(&str, &str), CategoryMetrics> = BTreeMap::new();

    for conversation in conversations {
        let Some(category) = conversation.task_category else {
            tracing::warn!(
                conversation_id = %conversation.conversation_id,
                "Skipping unclassified conversation in aggregation"
            );
            continue;
        };

        groups
            .entry((conversation.team.as_str(), category.as_str()))
            .or_insert_with(|| CategoryMetrics::new(conversation.team.clone(), category))
            .add(conversation);
    }

    DailyMetrics {
        date,
        metrics: groups.into_values().collect(),
        total_conversations: conversations.len() as u64,
        total_events_processed: conversations.iter().map(Conversation::turn_count).sum(),
    }
}
