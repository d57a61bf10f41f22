//! Transient user-facing notifications
//!
//! The notifier keeps an ordered list of toasts. Insertion order is display
//! order. Each non-persistent toast schedules one fire-and-forget removal
//! task on the tokio runtime; removal is idempotent, so a timer that fires
//! after an explicit removal or `clear_all` does nothing.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::envelope::{Contexts, ErrorReportEnvelope, Extra, Level, ReportUser, Tags};
use crate::fault::Fault;
use crate::metadata::ComponentContext;
use crate::reporter::{ErrorReporter, ReportOptions};

/// Toast identifier, unique and increasing within one notifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToastId(u64);

impl fmt::Display for ToastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "toast-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    #[default]
    Error,
    Success,
    Warning,
    Info,
}

impl ToastKind {
    /// Report level used when a toast carries a fault
    pub fn level(&self) -> Level {
        match self {
            ToastKind::Error => Level::Error,
            ToastKind::Warning => Level::Warning,
            ToastKind::Success | ToastKind::Info => Level::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToastDuration {
    Millis(u64),
    Persistent,
}

/// A visible notification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastNotification {
    pub id: ToastId,
    pub message: String,
    pub kind: ToastKind,
    pub duration: ToastDuration,
    pub created_at: DateTime<Utc>,
    pub error_stack: Option<String>,
    pub level: Option<Level>,
    pub tags: Tags,
    pub fingerprint: Vec<String>,
    pub contexts: Contexts,
    pub extra: Extra,
    pub user: Option<ReportUser>,
}

/// Display options for a toast
#[derive(Debug, Clone, Default)]
pub struct ToastMetadata {
    /// Lifetime in milliseconds; `<= 0` keeps the toast until removed
    pub duration_ms: Option<i64>,
    pub persistent: bool,
    pub level: Option<Level>,
    pub tags: Tags,
    pub fingerprint: Vec<String>,
    pub contexts: Contexts,
    pub extra: Extra,
    pub user: Option<ReportUser>,
    /// A fault to report before the toast is shown
    pub log_error: Option<(Fault, ErrorReportEnvelope)>,
}

impl ToastMetadata {
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            ..Default::default()
        }
    }

    pub fn with_duration_ms(duration_ms: i64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            ..Default::default()
        }
    }
}

/// What accompanies a toast message
#[derive(Debug, Clone)]
pub enum ToastSource {
    Metadata(ToastMetadata),
    /// A fault that is reported before display
    Fault(Fault),
}

impl Default for ToastSource {
    fn default() -> Self {
        ToastSource::Metadata(ToastMetadata::default())
    }
}

impl From<ToastMetadata> for ToastSource {
    fn from(meta: ToastMetadata) -> Self {
        ToastSource::Metadata(meta)
    }
}

impl From<Fault> for ToastSource {
    fn from(fault: Fault) -> Self {
        ToastSource::Fault(fault)
    }
}

#[derive(Debug, Default)]
struct ToastState {
    next_id: u64,
    toasts: Vec<ToastNotification>,
}

impl ToastState {
    fn remove(&mut self, id: ToastId) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        self.toasts.len() != before
    }
}

/// In-memory toast queue with timed expiry
#[derive(Clone)]
pub struct ToastNotifier {
    state: Arc<Mutex<ToastState>>,
    reporter: Arc<ErrorReporter>,
    default_duration: Duration,
}

impl ToastNotifier {
    pub fn new(reporter: Arc<ErrorReporter>) -> Self {
        let default_duration = reporter.builder().config().toast_duration();
        Self {
            state: Arc::new(Mutex::new(ToastState::default())),
            reporter,
            default_duration,
        }
    }

    /// Show a toast and return its id
    ///
    /// A `Fault` source is reported first, tagged as a toast-display
    /// context; a metadata source may carry its own fault to report.
    pub fn show_toast(
        &self,
        message: impl Into<String>,
        kind: ToastKind,
        source: impl Into<ToastSource>,
    ) -> ToastId {
        let message = message.into();
        let mut error_stack = None;

        let metadata = match source.into() {
            ToastSource::Fault(fault) => {
                error_stack = fault.stack().map(str::to_string);
                let ctx = ComponentContext::new("ErrorToast", "toast-display", "showToast");
                let envelope = self
                    .reporter
                    .builder()
                    .build_component_context(&ctx, kind.level(), None);
                self.reporter
                    .report(&fault, envelope, &ReportOptions::default());
                ToastMetadata::default()
            }
            ToastSource::Metadata(mut meta) => {
                if let Some((fault, envelope)) = meta.log_error.take() {
                    self.reporter
                        .report(&fault, envelope, &ReportOptions::default());
                }
                meta
            }
        };

        let duration = match metadata.duration_ms {
            _ if metadata.persistent => ToastDuration::Persistent,
            Some(ms) if ms <= 0 => ToastDuration::Persistent,
            Some(ms) => ToastDuration::Millis(ms as u64),
            None => ToastDuration::Millis(self.default_duration.as_millis() as u64),
        };

        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = ToastId(state.next_id);
            state.toasts.push(ToastNotification {
                id,
                message,
                kind,
                duration,
                created_at: Utc::now(),
                error_stack,
                level: metadata.level,
                tags: metadata.tags,
                fingerprint: metadata.fingerprint,
                contexts: metadata.contexts,
                extra: metadata.extra,
                user: metadata.user,
            });
            id
        };

        if let ToastDuration::Millis(ms) = duration {
            self.schedule_removal(id, Duration::from_millis(ms));
        }
        log::debug!("Toast {} shown ({:?}, {:?})", id, kind, duration);
        id
    }

    /// Show an error toast with default options
    pub fn error(&self, message: impl Into<String>) -> ToastId {
        self.show_toast(message, ToastKind::Error, ToastSource::default())
    }

    /// Remove a toast; unknown ids are ignored
    pub fn remove_toast(&self, id: ToastId) {
        if self.state.lock().remove(id) {
            log::debug!("Toast {} removed", id);
        }
    }

    /// Remove every toast
    ///
    /// Pending timers stay scheduled and become no-ops.
    pub fn clear_all(&self) {
        self.state.lock().toasts.clear();
    }

    /// Visible toasts in display order
    pub fn toasts(&self) -> Vec<ToastNotification> {
        self.state.lock().toasts.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().toasts.is_empty()
    }

    fn schedule_removal(&self, id: ToastId, after: Duration) {
        let state: Weak<Mutex<ToastState>> = Arc::downgrade(&self.state);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(after).await;
                    if let Some(state) = state.upgrade() {
                        if state.lock().remove(id) {
                            log::debug!("Toast {} expired", id);
                        }
                    }
                });
            }
            Err(_) => {
                log::warn!("No async runtime available; toast {} stays until removed", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::tests::recording_reporter;

    fn messages(notifier: &ToastNotifier) -> Vec<String> {
        notifier.toasts().into_iter().map(|t| t.message).collect()
    }

    #[test]
    fn test_insertion_order_and_removal() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);

        let first = notifier.show_toast("one", ToastKind::Info, ToastMetadata::persistent());
        notifier.show_toast("two", ToastKind::Info, ToastMetadata::persistent());
        notifier.show_toast("three", ToastKind::Info, ToastMetadata::persistent());
        assert_eq!(messages(&notifier), vec!["one", "two", "three"]);

        notifier.remove_toast(first);
        assert_eq!(messages(&notifier), vec!["two", "three"]);
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        let id = notifier.show_toast("kept", ToastKind::Success, ToastMetadata::persistent());
        notifier.remove_toast(id);
        notifier.remove_toast(id);
        notifier.remove_toast(ToastId(999));
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_ids_increase() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        let a = notifier.show_toast("a", ToastKind::Info, ToastMetadata::persistent());
        let b = notifier.show_toast("b", ToastKind::Info, ToastMetadata::persistent());
        assert!(b > a);
        assert_eq!(a.to_string(), "toast-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_toast_expires_after_default_duration() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        notifier.show_toast("bye", ToastKind::Info, ToastSource::default());

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(notifier.len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(notifier.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_and_zero_duration_stay() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        notifier.show_toast("pinned", ToastKind::Warning, ToastMetadata::persistent());
        notifier.show_toast("zero", ToastKind::Warning, ToastMetadata::with_duration_ms(0));
        notifier.show_toast("short", ToastKind::Warning, ToastMetadata::with_duration_ms(100));

        tokio::time::sleep(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(messages(&notifier), vec!["pinned", "zero"]);
        assert_eq!(notifier.toasts()[0].duration, ToastDuration::Persistent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timers_after_clear_are_noops() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        notifier.show_toast("old", ToastKind::Info, ToastMetadata::with_duration_ms(1000));
        notifier.clear_all();

        let fresh = notifier.show_toast("fresh", ToastKind::Info, ToastMetadata::with_duration_ms(5000));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert_eq!(notifier.toasts()[0].id, fresh);
    }

    #[tokio::test]
    async fn test_fault_source_is_reported_before_display() {
        let (reporter, client) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        let fault = Fault::new("save failed").with_stack("Error: save failed\n    at save");

        notifier.show_toast("Could not save", ToastKind::Error, fault.clone());

        let sent = client.exceptions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope.tag("component"), Some("ErrorToast"));
        assert_eq!(sent[0].envelope.tag("feature"), Some("toast-display"));
        let toast = &notifier.toasts()[0];
        assert_eq!(toast.message, "Could not save");
        assert_eq!(toast.error_stack.as_deref(), fault.stack());
    }

    #[test]
    fn test_metadata_log_error_is_reported() {
        let (reporter, client) = recording_reporter();
        let notifier = ToastNotifier::new(reporter.clone());
        let envelope = reporter.builder().build_component_context(
            &ComponentContext::new("Settings", "profile", "save"),
            Level::Error,
            None,
        );
        let meta = ToastMetadata {
            persistent: true,
            log_error: Some((Fault::new("disk full"), envelope)),
            ..Default::default()
        };
        notifier.show_toast("Save failed", ToastKind::Error, meta);
        assert_eq!(client.exceptions().len(), 1);
        assert_eq!(notifier.len(), 1);
    }

    #[test]
    fn test_metadata_fields_carried_to_toast() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        let mut contexts = Contexts::new();
        contexts.insert(
            "form".into(),
            serde_json::json!({"step": 2}).as_object().cloned().unwrap_or_default(),
        );
        let mut extra = Extra::new();
        extra.insert("draftId".into(), serde_json::json!("d-17"));
        let meta = ToastMetadata {
            persistent: true,
            level: Some(Level::Warning),
            tags: Tags::from([("feature".to_string(), "profile".to_string())]),
            fingerprint: vec!["profile-save".to_string()],
            contexts,
            extra,
            user: Some(ReportUser {
                id: Some("u-1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        notifier.show_toast("Draft kept", ToastKind::Warning, meta);

        let toast = &notifier.toasts()[0];
        assert_eq!(toast.level, Some(Level::Warning));
        assert_eq!(toast.tags["feature"], "profile");
        assert_eq!(toast.fingerprint, vec!["profile-save"]);
        assert_eq!(toast.contexts["form"]["step"], 2);
        assert_eq!(toast.extra["draftId"], "d-17");
        assert_eq!(toast.user.as_ref().and_then(|u| u.id.as_deref()), Some("u-1"));
    }

    #[test]
    fn test_without_runtime_toast_stays() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        notifier.error("no timer here");
        assert_eq!(notifier.len(), 1);
    }
}
