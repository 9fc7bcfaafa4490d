//! Conversation assembly
//!
//! Groups events by conversation id. Messages are ordered by
//! `(event_time, message_id)`; events equal on both keep their input order.
//! Conversations are returned sorted by id so output does not depend on the
//! order events were read in.

use crate::types::{Conversation, MessageEvent};
use std::collections::BTreeMap;

/// Group events into conversations.
///
/// Every event lands in exactly one conversation. The team is taken from the
/// chronologically first message.
pub fn assemble(events: Vec<MessageEvent>) -> Vec<Conversation> {
    let mut groups: BTreeMap<String, Vec<MessageEvent>> = BTreeMap::new();
    for event in events {
        groups
            .entry(event.conversation_id.clone())
            .or_default()
            .push(event);
    }

    groups
        .into_iter()
        .filter_map(|(conversation_id, mut messages)| {
            // sort_by is stable
            messages.sort_by(|a, b| {
                a.event_time
                    .cmp(&b.event_time)
                    .then_with(|| a.message_id.cmp(&b.message_id))
            });
            let team = messages.first()?.team.clone();
            Some(Conversation {
                conversation_id,
                team,
                messages,
                task_category: None,
            })
        })
        .collect()
}
