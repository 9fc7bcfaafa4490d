//! Conversation classification
//!
//! Assigns each conversation a [`TaskCategory`] by sending a bounded snippet to
//! a [`LabelingBackend`]. Failures never propagate: a missing tool call,
//! transport error or bad response degrades to
//! [`TaskCategory::OtherUnknown`] with confidence 0.
//!
//! ## Modes
//!
//! | Mode | Behavior |
//! |------|----------|
//! | Bypass | Every conversation becomes `Unclassified`, no calls made |
//! | Active | Snippets are labeled concurrently, at most `concurrency` in flight |
//!
//! The mode is chosen once from [`ClassifierConfig::enabled`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use convopipe_core::classify::SyncClassifier;
//!
//! let classifier = SyncClassifier::new(&config.classifier)?;
//! let classified = classifier.classify_many(&mut conversations);
//! ```

mod client;
pub mod snippet;

pub use client::{extract_tool_input, request_body, ConverseBackend, LabelingBackend};
pub use snippet::build_snippet;

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::types::{Conversation, TaskCategory};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Longest reason kept from the backend, in characters
pub const MAX_REASON_CHARS: usize = 100;
/// Characters of the error message kept in an error reason
const ERROR_REASON_CHARS: usize = 50;

/// Validated outcome of one labeling call
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: TaskCategory,
    /// Always within [0, 1]
    pub confidence: f64,
    pub reason: String,
}

impl Classification {
    fn unclassified() -> Self {
        Self {
            label: TaskCategory::Unclassified,
            confidence: 0.0,
            reason: "LLM classification disabled".to_string(),
        }
    }

    fn fallback(reason: impl Into<String>) -> Self {
        Self {
            label: TaskCategory::OtherUnknown,
            confidence: 0.0,
            reason: reason.into(),
        }
    }
}

enum Mode {
    Bypass,
    Active(Arc<dyn LabelingBackend>),
}

/// Async classifier
pub struct Classifier {
    mode: Mode,
    concurrency: usize,
}

impl Classifier {
    /// Classifier that never calls out
    pub fn bypass() -> Self {
        Self {
            mode: Mode::Bypass,
            concurrency: 1,
        }
    }

    /// Classifier labeling through `backend` with at most `concurrency` calls in flight
    pub fn active(backend: Arc<dyn LabelingBackend>, concurrency: usize) -> Self {
        Self {
            mode: Mode::Active(backend),
            concurrency: concurrency.max(1),
        }
    }

    /// Build from configuration: bypass when disabled, Converse otherwise.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        if !config.enabled {
            tracing::info!("LLM classification disabled, conversations will be Unclassified");
            return Ok(Self::bypass());
        }

        let backend = ConverseBackend::new(config.clone())?;
        tracing::info!(
            model_id = %config.model_id,
            region = %config.region,
            concurrency = config.concurrency,
            "LLM classification enabled"
        );
        Ok(Self::active(Arc::new(backend), config.concurrency))
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self.mode, Mode::Bypass)
    }

    /// Classify one conversation.
    pub async fn classify(&self, conversation: &Conversation) -> Classification {
        match &self.mode {
            Mode::Bypass => Classification::unclassified(),
            Mode::Active(backend) => {
                label_snippet(backend.as_ref(), &build_snippet(conversation)).await
            }
        }
    }

    /// Classify every conversation in place, setting `task_category`.
    ///
    /// Returns the number of conversations that received a category.
    pub async fn classify_many(&self, conversations: &mut [Conversation]) -> usize {
        let backend = match &self.mode {
            Mode::Bypass => {
                for conversation in conversations.iter_mut() {
                    conversation.task_category = Some(TaskCategory::Unclassified);
                }
                return conversations.len();
            }
            Mode::Active(backend) => backend,
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, conversation) in conversations.iter().enumerate() {
            let backend = Arc::clone(backend);
            let semaphore = Arc::clone(&semaphore);
            let snippet = build_snippet(conversation);

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let result = label_snippet(backend.as_ref(), &snippet).await;
                (index, result)
            });
        }

        // One slot per input conversation, filled by task index
        let mut results: Vec<Option<Classification>> = vec![None; conversations.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Classification task failed"),
            }
        }

        for (conversation, result) in conversations.iter_mut().zip(results) {
            let result = result.unwrap_or_else(|| Classification::fallback("error: task failed"));
            tracing::info!(
                conversation_id = %conversation.conversation_id,
                label = %result.label,
                confidence = result.confidence,
                "Classified conversation"
            );
            conversation.task_category = Some(result.label);
        }

        conversations.len()
    }
}

/// Call the backend and turn any outcome into a valid [`Classification`].
async fn label_snippet(backend: &dyn LabelingBackend, snippet: &str) -> Classification {
    match backend.label(snippet).await {
        Ok(Some(input)) => validate_tool_input(&input),
        Ok(None) => {
            tracing::error!("No toolUse block in response");
            Classification::fallback("tool_use_missing")
        }
        Err(e) => {
            tracing::error!(error = %e, "Classifier call failed");
            Classification::fallback(error_reason(&e))
        }
    }
}

fn error_reason(error: &Error) -> String {
    let message = match error {
        Error::Classifier(msg) => msg.clone(),
        other => other.to_string(),
    };
    let message: String = message.chars().take(ERROR_REASON_CHARS).collect();
    format!("error: {}", message)
}

/// Validate a structured tool input.
///
/// Unknown labels become Other/Unknown, confidence is clamped to [0, 1] and
/// long reasons are cut to 97 characters plus `...`.
pub fn validate_tool_input(input: &Value) -> Classification {
    let raw_label = input.get("label").and_then(Value::as_str).unwrap_or_default();
    let label = TaskCategory::from_label(raw_label).unwrap_or_else(|| {
        tracing::warn!(label = %raw_label, "Invalid label, defaulting to Other/Unknown");
        TaskCategory::OtherUnknown
    });

    let confidence = input
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| !c.is_nan())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let reason = input.get("reason").and_then(Value::as_str).unwrap_or_default();
    let reason = if reason.chars().count() > MAX_REASON_CHARS {
        snippet::truncate_chars(reason, MAX_REASON_CHARS - 3)
    } else {
        reason.to_string()
    };

    Classification {
        label,
        confidence,
        reason,
    }
}

/// Synchronous wrapper for [`Classifier`]
///
/// Owns a runtime and provides blocking methods for the pipeline.
pub struct SyncClassifier {
    inner: Classifier,
    runtime: tokio::runtime::Runtime,
}

impl SyncClassifier {
    /// Create a new sync classifier from configuration
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Self::from_classifier(Classifier::from_config(config)?)
    }

    /// Wrap an existing classifier
    pub fn from_classifier(inner: Classifier) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Classifier(format!("failed to create runtime: {}", e)))?;

        Ok(Self { inner, runtime })
    }

    pub fn is_bypass(&self) -> bool {
        self.inner.is_bypass()
    }

    /// Classify one conversation (blocking)
    pub fn classify(&self, conversation: &Conversation) -> Classification {
        self.runtime.block_on(self.inner.classify(conversation))
    }

    /// Classify conversations in place (blocking)
    pub fn classify_many(&self, conversations: &mut [Conversation]) -> usize {
        self.runtime.block_on(self.inner.classify_many(conversations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageEvent, Role};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend answering from a fixed response per snippet content
    struct StubBackend {
        responses: Mutex<HashMap<String, Result<Option<Value>>>>,
        default: Option<Value>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn answering(default: Value) -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                default: Some(default),
                calls: AtomicUsize::new(0),
            }
        }

        fn with(self, needle: &str, response: Result<Option<Value>>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(needle.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl LabelingBackend for StubBackend {
        async fn label(&self, snippet: &str) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let key = responses.keys().find(|k| snippet.contains(k.as_str())).cloned();
            match key.and_then(|k| responses.remove(&k)) {
                Some(response) => response,
                None => Ok(self.default.clone()),
            }
        }
    }

    fn conversation(id: &str, content: &str) -> Conversation {
        Conversation {
            conversation_id: id.to_string(),
            team: "Sales".to_string(),
            messages: vec![MessageEvent {
                event_time: Utc::now(),
                conversation_id: id.to_string(),
                message_id: format!("{}_m1", id),
                role: Role::User,
                content: content.to_string(),
                team: "Sales".to_string(),
                user_id: "u1".to_string(),
            }],
            task_category: None,
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_validate_clamps_confidence() {
        let high = validate_tool_input(&json!({"label": "Summarization", "confidence": 1.5, "reason": "r"}));
        assert_eq!(high.label, TaskCategory::Summarization);
        assert_eq!(high.confidence, 1.0);

        let low = validate_tool_input(&json!({"label": "Summarization", "confidence": -0.5, "reason": "r"}));
        assert_eq!(low.confidence, 0.0);

        let missing = validate_tool_input(&json!({"label": "Summarization"}));
        assert_eq!(missing.confidence, 0.0);
        assert_eq!(missing.reason, "");
    }

    #[test]
    fn test_validate_coerces_unknown_label() {
        for label in [json!("Poetry"), json!("Unclassified"), json!(3), Value::Null] {
            let result = validate_tool_input(&json!({"label": label, "confidence": 0.8, "reason": "r"}));
            assert_eq!(result.label, TaskCategory::OtherUnknown);
            assert_eq!(result.confidence, 0.8);
        }
    }

    #[test]
    fn test_validate_truncates_reason() {
        let result = validate_tool_input(&json!({
            "label": "Technical Help",
            "confidence": 0.5,
            "reason": "r".repeat(150),
        }));
        assert_eq!(result.reason.chars().count(), 100);
        assert_eq!(result.reason, format!("{}...", "r".repeat(97)));

        let exact = validate_tool_input(&json!({"label": "Technical Help", "reason": "r".repeat(100)}));
        assert_eq!(exact.reason, "r".repeat(100));
    }

    #[test]
    fn test_error_reason_prefix_and_length() {
        let reason = error_reason(&Error::Classifier("x".repeat(200)));
        assert!(reason.starts_with("error: "));
        assert_eq!(reason.chars().count(), "error: ".len() + 50);

        let reason = error_reason(&Error::Classifier("API error (503): unavailable".to_string()));
        assert_eq!(reason, "error: API error (503): unavailable");
    }

    #[test]
    fn test_bypass_is_deterministic() {
        let classifier = SyncClassifier::from_classifier(Classifier::bypass()).unwrap();
        assert!(classifier.is_bypass());

        let mut empty = conversation("c0", "");
        empty.messages.clear();
        for c in [conversation("c1", "anything"), empty] {
            let result = classifier.classify(&c);
            assert_eq!(result.label, TaskCategory::Unclassified);
            assert_eq!(result.confidence, 0.0);
        }

        let mut conversations = vec![conversation("c1", "a"), conversation("c2", "b")];
        assert_eq!(classifier.classify_many(&mut conversations), 2);
        assert!(conversations
            .iter()
            .all(|c| c.task_category == Some(TaskCategory::Unclassified)));
    }

    #[test]
    fn test_active_failures_degrade() {
        let backend = StubBackend::answering(json!({"label": "Technical Help", "confidence": 0.9, "reason": "debugging"}))
            .with("no tool", Ok(None))
            .with("boom", Err(Error::Classifier("API error (500): internal".to_string())));
        let classifier = Classifier::active(Arc::new(backend), 2);
        let rt = runtime();

        let ok = rt.block_on(classifier.classify(&conversation("c1", "stack trace help")));
        assert_eq!(ok.label, TaskCategory::TechnicalHelp);
        assert_eq!(ok.reason, "debugging");

        let missing = rt.block_on(classifier.classify(&conversation("c2", "no tool please")));
        assert_eq!(missing.label, TaskCategory::OtherUnknown);
        assert_eq!(missing.reason, "tool_use_missing");

        let failed = rt.block_on(classifier.classify(&conversation("c3", "boom")));
        assert_eq!(failed.label, TaskCategory::OtherUnknown);
        assert_eq!(failed.confidence, 0.0);
        assert!(failed.reason.starts_with("error: "));
    }

    #[test]
    fn test_classify_many_writes_back_by_id() {
        let backend = StubBackend::answering(json!({"label": "Other/Unknown", "confidence": 0.1, "reason": "?"}))
            .with("summarize", Ok(Some(json!({"label": "Summarization", "confidence": 0.9, "reason": "s"}))))
            .with("translate", Ok(Some(json!({"label": "Translation/Tone", "confidence": 0.9, "reason": "t"}))));
        let backend = Arc::new(backend);
        let classifier = SyncClassifier::from_classifier(Classifier::active(backend.clone(), 3)).unwrap();
        assert!(!classifier.is_bypass());

        let mut conversations = vec![
            conversation("c1", "please summarize this"),
            conversation("c2", "hello"),
            conversation("c3", "translate to French"),
        ];
        assert_eq!(classifier.classify_many(&mut conversations), 3);

        assert_eq!(conversations[0].task_category, Some(TaskCategory::Summarization));
        assert_eq!(conversations[1].task_category, Some(TaskCategory::OtherUnknown));
        assert_eq!(conversations[2].task_category, Some(TaskCategory::TranslationTone));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }
    /// Backend whose call latency depends on the snippet, tracking calls in flight
    struct SlowBackend {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl LabelingBackend for SlowBackend {
        async fn label(&self, snippet: &str) -> Result<Option<Value>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let slow = snippet.contains("slow");
            let delay = if slow { 60 } else { 5 };
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let label = if slow { "Summarization" } else { "Technical Help" };
            Ok(Some(json!({"label": label, "confidence": 0.9, "reason": "r"})))
        }
    }

    #[test]
    fn test_classify_many_bounded_and_out_of_order() {
        let backend = Arc::new(SlowBackend {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let classifier = SyncClassifier::from_classifier(Classifier::active(backend.clone(), 3)).unwrap();

        let mut conversations: Vec<Conversation> = (0..12)
            .map(|i| {
                let content = if i % 2 == 0 { "slow request" } else { "quick request" };
                conversation(&format!("c{:02}", i), content)
            })
            .collect();
        assert_eq!(classifier.classify_many(&mut conversations), 12);

        let max = backend.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {}", max);
        assert!(max >= 2, "calls never overlapped");
        for (i, c) in conversations.iter().enumerate() {
            let expected = if i % 2 == 0 {
                TaskCategory::Summarization
            } else {
                TaskCategory::TechnicalHelp
            };
            assert_eq!(c.task_category, Some(expected), "{}", c.conversation_id);
        }
    }

    #[test]
    fn test_classify_many_duplicate_ids_each_labeled() {
        let backend = StubBackend::answering(json!({"label": "Other/Unknown", "confidence": 0.1, "reason": "?"}))
            .with("summarize", Ok(Some(json!({"label": "Summarization", "confidence": 0.9, "reason": "s"}))));
        let classifier = SyncClassifier::from_classifier(Classifier::active(Arc::new(backend), 2)).unwrap();

        let mut conversations = vec![
            conversation("dup", "please summarize this"),
            conversation("dup", "hello"),
        ];
        classifier.classify_many(&mut conversations);

        assert_eq!(conversations[0].task_category, Some(TaskCategory::Summarization));
        assert_eq!(conversations[1].task_category, Some(TaskCategory::OtherUnknown));
    }
}
