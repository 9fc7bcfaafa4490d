//! Pattern-based redaction of emails, phone numbers and URLs
//!
//! Patterns run in a fixed order (email, phone, URL). Each pass counts its
//! matches in the text left by the previous pass, then substitutes a
//! placeholder, so a later pattern never re-matches a placeholder.
//!
//! Redaction is best effort: false negatives are accepted, and digit runs that
//! look like phone numbers are redacted even when they are not.

use crate::types::{MessageEvent, RedactionStats};
use regex::Regex;
use std::sync::OnceLock;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL_REDACTED]";
pub const PHONE_PLACEHOLDER: &str = "[PHONE_REDACTED]";
pub const URL_PLACEHOLDER: &str = "[URL_REDACTED]";

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
            .expect("valid email regex")
    })
}

/// 10-digit numbers with parens, hyphens, dots or spaces and an optional
/// leading country code.
fn phone_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")
            .expect("valid phone regex")
    })
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"https?://(?:www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_\+.~#?&/=]*)",
        )
        .expect("valid url regex")
    })
}

fn redact(pattern: &Regex, text: String, placeholder: &str, counter: &mut u64) -> String {
    let found = pattern.find_iter(&text).count() as u64;
    if found == 0 {
        return text;
    }
    *counter += found;
    pattern.replace_all(&text, placeholder).into_owned()
}

/// Redact `text`, adding the number of substitutions to `stats`.
pub fn sanitize(text: &str, stats: &mut RedactionStats) -> String {
    let text = redact(
        email_pattern(),
        text.to_string(),
        EMAIL_PLACEHOLDER,
        &mut stats.emails_redacted,
    );
    let text = redact(
        phone_pattern(),
        text,
        PHONE_PLACEHOLDER,
        &mut stats.phones_redacted,
    );
    redact(url_pattern(), text, URL_PLACEHOLDER, &mut stats.urls_redacted)
}

/// Copy of `event` with redacted content.
pub fn sanitize_event(event: &MessageEvent, stats: &mut RedactionStats) -> MessageEvent {
    event.with_content(sanitize(&event.content, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use chrono::Utc;

    #[test]
    fn test_redacts_emails() {
        let mut stats = RedactionStats::default();
        let out = sanitize("Mail a.b@example.com or sales@corp.io please", &mut stats);

        assert_eq!(stats.emails_redacted, 2);
        assert_eq!(stats.total(), 2);
        assert!(!out.contains("a.b@example.com"));
        assert!(!out.contains("sales@corp.io"));
        assert_eq!(out.matches(EMAIL_PLACEHOLDER).count(), 2);
    }

    #[test]
    fn test_redacts_phone_styles() {
        let cases = [
            "(123) 456-7890",
            "123-456-7890",
            "123.456.7890",
            "+1-123-456-7890",
            "+44 123 456 7890",
        ];
        for phone in cases {
            let mut stats = RedactionStats::default();
            let out = sanitize(&format!("call {} now", phone), &mut stats);
            assert_eq!(stats.phones_redacted, 1, "{}", phone);
            assert!(out.contains(PHONE_PLACEHOLDER), "{}", out);
            assert!(!out.contains("7890"), "{}", out);
        }
    }

    #[test]
    fn test_redacts_urls() {
        let mut stats = RedactionStats::default();
        let out = sanitize(
            "see https://www.example.com/docs?page=2 and http://foo.org",
            &mut stats,
        );
        assert_eq!(stats.urls_redacted, 2);
        assert_eq!(
            out,
            format!("see {} and {}", URL_PLACEHOLDER, URL_PLACEHOLDER)
        );
    }

    #[test]
    fn test_email_not_counted_as_url() {
        let mut stats = RedactionStats::default();
        let out = sanitize("write to bob@example.com", &mut stats);
        assert_eq!(stats.emails_redacted, 1);
        assert_eq!(stats.urls_redacted, 0);
        assert_eq!(out, format!("write to {}", EMAIL_PLACEHOLDER));
    }

    #[test]
    fn test_placeholders_are_stable() {
        let mut stats = RedactionStats::default();
        let text = format!(
            "{} {} {}",
            EMAIL_PLACEHOLDER, PHONE_PLACEHOLDER, URL_PLACEHOLDER
        );
        let out = sanitize(&text, &mut stats);
        assert_eq!(out, text);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_plain_text_untouched() {
        let mut stats = RedactionStats::default();
        let text = "Need help with the Q3 pricing sheet, rows 12 to 40";
        assert_eq!(sanitize(text, &mut stats), text);
        assert_eq!(stats, RedactionStats::default());
    }

    #[test]
    fn test_sanitize_event_keeps_identity() {
        let event = MessageEvent {
            event_time: Utc::now(),
            conversation_id: "c1".to_string(),
            message_id: "m1".to_string(),
            role: Role::User,
            content: "reach me at x@y.com".to_string(),
            team: "Sales".to_string(),
            user_id: "u1".to_string(),
        };
        let mut stats = RedactionStats::default();
        let clean = sanitize_event(&event, &mut stats);

        assert_eq!(clean.content, format!("reach me at {}", EMAIL_PLACEHOLDER));
        assert_eq!(clean.message_id, event.message_id);
        assert_eq!(clean.event_time, event.event_time);
        assert_eq!(stats.emails_redacted, 1);
    }
}
