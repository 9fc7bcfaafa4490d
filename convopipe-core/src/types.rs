//! Core domain types for convopipe
//!
//! These types represent every entity that flows through one pipeline run.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Event** | One raw message record from a landing file ([`MessageEvent`]) |
//! | **Conversation** | Events sharing a conversation id, in chronological order |
//! | **Task category** | The label a conversation is classified into ([`TaskCategory`]) |
//! | **Redaction** | Replacement of a sensitive substring with a placeholder token |
//! | **Run report** | Counts, flags and errors of one pipeline execution ([`RunReport`]) |
//!
//! All entities are plain values. The only containment is
//! [`Conversation`] owning its [`MessageEvent`]s.

use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ============================================
// Storage backend identifier
// ============================================

/// Which storage backend a run reads from and writes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Directory tree on the local filesystem
    #[default]
    Local,
    /// Amazon S3 bucket
    #[serde(alias = "remote")]
    S3,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::S3 => "s3",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "s3" | "remote" => Ok(StorageKind::S3),
            _ => Err(format!("unknown storage backend: {}", s)),
        }
    }
}

// ============================================
// Message events
// ============================================

/// Author role of a message. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// One message from a landing file.
///
/// Built by [`crate::ingest::parse_event`] and never mutated afterwards.
/// Sanitization produces a copy with new `content` via [`MessageEvent::with_content`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// When the message was sent (normalized to UTC)
    pub event_time: DateTime<Utc>,
    pub conversation_id: String,
    pub message_id: String,
    pub role: Role,
    /// Message text
    pub content: String,
    pub team: String,
    pub user_id: String,
}

impl MessageEvent {
    /// Copy of this event with `content` replaced. Identity fields are kept.
    pub fn with_content(&self, content: String) -> Self {
        Self {
            content,
            ..self.clone()
        }
    }

    /// Length of the content in characters.
    pub fn content_chars(&self) -> u64 {
        self.content.chars().count() as u64
    }
}

// ============================================
// Redaction
// ============================================

/// Counters accumulated by the sanitizer over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionStats {
    pub emails_redacted: u64,
    pub phones_redacted: u64,
    pub urls_redacted: u64,
}

impl RedactionStats {
    /// Sum of all three counters.
    pub fn total(&self) -> u64 {
        self.emails_redacted + self.phones_redacted + self.urls_redacted
    }

    /// Add another accumulator into this one.
    pub fn merge(&mut self, other: &RedactionStats) {
        self.emails_redacted += other.emails_redacted;
        self.phones_redacted += other.phones_redacted;
        self.urls_redacted += other.urls_redacted;
    }
}

// ============================================
// Task categories
// ============================================

/// Classification outcome for a conversation.
///
/// Ten labels form the closed set the classifier may return
/// ([`TaskCategory::CLASSIFIER_LABELS`]). [`TaskCategory::Unclassified`] is only
/// produced when classification is bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskCategory {
    #[serde(rename = "Summarization")]
    Summarization,
    #[serde(rename = "Drafting/Rewriting")]
    DraftingRewriting,
    #[serde(rename = "Research/Synthesis")]
    ResearchSynthesis,
    #[serde(rename = "Ideation/Planning")]
    IdeationPlanning,
    #[serde(rename = "Data/Analysis (general)")]
    DataAnalysis,
    #[serde(rename = "Translation/Tone")]
    TranslationTone,
    #[serde(rename = "Internal Q&A (policy/process)")]
    InternalQa,
    #[serde(rename = "Customer Comms (support/sales)")]
    CustomerComms,
    #[serde(rename = "Technical Help")]
    TechnicalHelp,
    #[serde(rename = "Other/Unknown")]
    OtherUnknown,
    #[serde(rename = "Unclassified")]
    Unclassified,
}

impl TaskCategory {
    /// Labels the external classifier is allowed to return.
    pub const CLASSIFIER_LABELS: [TaskCategory; 10] = [
        TaskCategory::Summarization,
        TaskCategory::DraftingRewriting,
        TaskCategory::ResearchSynthesis,
        TaskCategory::IdeationPlanning,
        TaskCategory::DataAnalysis,
        TaskCategory::TranslationTone,
        TaskCategory::InternalQa,
        TaskCategory::CustomerComms,
        TaskCategory::TechnicalHelp,
        TaskCategory::OtherUnknown,
    ];

    /// Exact label string as written to outputs
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Summarization => "Summarization",
            TaskCategory::DraftingRewriting => "Drafting/Rewriting",
            TaskCategory::ResearchSynthesis => "Research/Synthesis",
            TaskCategory::IdeationPlanning => "Ideation/Planning",
            TaskCategory::DataAnalysis => "Data/Analysis (general)",
            TaskCategory::TranslationTone => "Translation/Tone",
            TaskCategory::InternalQa => "Internal Q&A (policy/process)",
            TaskCategory::CustomerComms => "Customer Comms (support/sales)",
            TaskCategory::TechnicalHelp => "Technical Help",
            TaskCategory::OtherUnknown => "Other/Unknown",
            TaskCategory::Unclassified => "Unclassified",
        }
    }

    /// Look up a label from the classifier's closed set.
    ///
    /// Returns `None` for anything else, including `"Unclassified"`.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::CLASSIFIER_LABELS
            .iter()
            .copied()
            .find(|category| category.as_str() == label)
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Conversations
// ============================================

/// Messages sharing one conversation id, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    /// Team of the chronologically first message
    pub team: String,
    pub messages: Vec<MessageEvent>,
    /// Set by the classifier
    pub task_category: Option<TaskCategory>,
}

impl Conversation {
    /// Number of messages
    pub fn turn_count(&self) -> u64 {
        self.messages.len() as u64
    }

    /// Characters across user messages
    pub fn total_chars_user(&self) -> u64 {
        self.chars_for(Role::User)
    }

    /// Characters across assistant messages
    pub fn total_chars_assistant(&self) -> u64 {
        self.chars_for(Role::Assistant)
    }

    fn chars_for(&self, role: Role) -> u64 {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(MessageEvent::content_chars)
            .sum()
    }
}

// ============================================
// Metrics
// ============================================

/// Counters for one (team, task category) pair.
///
/// The averages are derived on demand and also written to JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryMetrics {
    pub team: String,
    pub task_category: TaskCategory,
    pub conversation_count: u64,
    pub total_turns: u64,
    pub total_chars_user: u64,
    pub total_chars_assistant: u64,
}

impl CategoryMetrics {
    /// Empty group for a (team, category) key
    pub fn new(team: impl Into<String>, task_category: TaskCategory) -> Self {
        Self {
            team: team.into(),
            task_category,
            conversation_count: 0,
            total_turns: 0,
            total_chars_user: 0,
            total_chars_assistant: 0,
        }
    }

    /// Fold one conversation into the counters.
    pub fn add(&mut self, conversation: &Conversation) {
        self.conversation_count += 1;
        self.total_turns += conversation.turn_count();
        self.total_chars_user += conversation.total_chars_user();
        self.total_chars_assistant += conversation.total_chars_assistant();
    }

    pub fn avg_turns(&self) -> f64 {
        per_conversation(self.total_turns, self.conversation_count)
    }

    pub fn avg_chars_user(&self) -> f64 {
        per_conversation(self.total_chars_user, self.conversation_count)
    }

    pub fn avg_chars_assistant(&self) -> f64 {
        per_conversation(self.total_chars_assistant, self.conversation_count)
    }
}

fn per_conversation(total: u64, conversations: u64) -> f64 {
    if conversations == 0 {
        0.0
    } else {
        total as f64 / conversations as f64
    }
}

impl Serialize for CategoryMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CategoryMetrics", 9)?;
        s.serialize_field("team", &self.team)?;
        s.serialize_field("task_category", &self.task_category)?;
        s.serialize_field("conversation_count", &self.conversation_count)?;
        s.serialize_field("total_turns", &self.total_turns)?;
        s.serialize_field("total_chars_user", &self.total_chars_user)?;
        s.serialize_field("total_chars_assistant", &self.total_chars_assistant)?;
        s.serialize_field("avg_turns", &self.avg_turns())?;
        s.serialize_field("avg_chars_user", &self.avg_chars_user())?;
        s.serialize_field("avg_chars_assistant", &self.avg_chars_assistant())?;
        s.end()
    }
}

/// Output of one date's run, published as `metrics.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    /// Sorted by (team, task category label)
    pub metrics: Vec<CategoryMetrics>,
    pub total_conversations: u64,
    /// Messages across all assembled conversations, classified or not
    pub total_events_processed: u64,
}

// ============================================
// Run report
// ============================================

/// Execution summary of one run, published as `run_latest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub run_timestamp: DateTime<Utc>,
    pub storage_type: StorageKind,

    // Input
    pub input_files_count: u64,
    pub events_read: u64,
    pub events_valid: u64,
    pub events_invalid: u64,

    // Processing
    pub conversations_assembled: u64,
    pub conversations_classified: u64,
    pub redaction_stats: RedactionStats,

    // Outputs
    pub metrics_written: bool,
    pub sanitized_written: bool,

    pub duration_seconds: f64,
    pub errors: Vec<String>,
}

impl RunReport {
    /// Fresh report with every counter at zero
    pub fn new(date: NaiveDate, run_timestamp: DateTime<Utc>, storage_type: StorageKind) -> Self {
        Self {
            date,
            run_timestamp,
            storage_type,
            input_files_count: 0,
            events_read: 0,
            events_valid: 0,
            events_invalid: 0,
            conversations_assembled: 0,
            conversations_classified: 0,
            redaction_stats: RedactionStats::default(),
            metrics_written: false,
            sanitized_written: false,
            duration_seconds: 0.0,
            errors: Vec::new(),
        }
    }
}
