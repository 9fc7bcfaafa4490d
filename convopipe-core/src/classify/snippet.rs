//! Bounded text rendering of a conversation for the labeling call

use crate::types::Conversation;

/// Messages included before the rest are summarized
pub const MAX_MESSAGES: usize = 8;
/// Characters kept per message
pub const MAX_MESSAGE_CHARS: usize = 200;
/// Characters kept for the whole snippet
pub const MAX_SNIPPET_CHARS: usize = 2000;

const ELLIPSIS: &str = "...";

/// Keep the first `max` characters, appending `...` if anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Render `role: content` lines for the first messages of a conversation.
pub fn build_snippet(conversation: &Conversation) -> String {
    let mut lines: Vec<String> = conversation
        .messages
        .iter()
        .take(MAX_MESSAGES)
        .map(|m| format!("{}: {}", m.role, truncate_chars(&m.content, MAX_MESSAGE_CHARS)))
        .collect();

    let omitted = conversation.messages.len().saturating_sub(MAX_MESSAGES);
    if omitted > 0 {
        lines.push(format!("... ({} more messages)", omitted));
    }

    truncate_chars(&lines.join("\n"), MAX_SNIPPET_CHARS)
}
