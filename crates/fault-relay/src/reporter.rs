//! Deduplicated forwarding to the crash-reporting client
//!
//! The [`ErrorReporter`] is the only component that talks to the external
//! client. It never fails outward: a duplicate is skipped, an unconfigured
//! client is replaced by local diagnostics, and a client error is logged
//! locally.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::action::fault_from_panic;
use crate::envelope::{Contexts, ErrorReportEnvelope, Tags};
use crate::error::ReportError;
use crate::fault::Fault;
use crate::metadata::MetadataBuilder;
use crate::session::ReportingSession;

/// The external crash-reporting client
///
/// This abstracts over the concrete SaaS SDK so the pipeline can be used
/// (and tested) without one.
pub trait CrashReporter: Send + Sync {
    /// Initialize the client; called once at composition time
    fn init(&self) -> Result<(), ReportError>;

    /// Exception channel (`error` and `fatal` levels)
    fn capture_exception(
        &self,
        fault: &Fault,
        envelope: &ErrorReportEnvelope,
    ) -> Result<(), ReportError>;

    /// Message channel (`warning`, `info` and `debug` levels)
    fn capture_message(&self, text: &str, envelope: &ErrorReportEnvelope)
        -> Result<(), ReportError>;
}

/// Title formatting for a report
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Use `[<component>/<feature>] <action>: ` when those tags exist
    pub use_structured_title: bool,
    pub title_prefix: Option<String>,
    /// Dedup context; defaults to `<component>.<action>` from the tags
    pub context: Option<String>,
}

impl ReportOptions {
    pub fn structured(prefix: impl Into<String>) -> Self {
        Self {
            use_structured_title: true,
            title_prefix: Some(prefix.into()),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the final title for a message
    pub fn title(&self, envelope: &ErrorReportEnvelope, message: &str) -> String {
        let prefix = self.title_prefix.as_deref().unwrap_or("");
        if self.use_structured_title {
            if let (Some(component), Some(feature), Some(action)) = (
                envelope.tag("component"),
                envelope.tag("feature"),
                envelope.tag("action"),
            ) {
                return format!("{}[{}/{}] {}: {}", prefix, component, feature, action, message);
            }
        }
        format!("{}{}", prefix, message)
    }
}

/// What happened to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the crash-reporting client
    Sent,
    /// Suppressed by the dedup ledger
    Duplicate,
    /// No client configured; written to local diagnostics
    LocalOnly,
    /// The client failed; written to local diagnostics
    Failed,
}

/// Routes faults and messages to the crash-reporting client
pub struct ErrorReporter {
    builder: MetadataBuilder,
    client: Option<Arc<dyn CrashReporter>>,
    initialized: AtomicBool,
}

impl ErrorReporter {
    /// Create a reporter; the client is used only if a DSN is configured
    pub fn new(builder: MetadataBuilder, client: Option<Arc<dyn CrashReporter>>) -> Self {
        let client = if builder.config().has_reporter() {
            if client.is_none() {
                log::warn!("Reporter DSN configured but no client supplied; using local diagnostics");
            }
            client
        } else {
            if client.is_some() {
                log::debug!("No reporter DSN configured; crash-reporting client disabled");
            }
            None
        };
        Self {
            builder,
            client,
            initialized: AtomicBool::new(false),
        }
    }

    /// Reporter that only writes local diagnostics
    pub fn local(builder: MetadataBuilder) -> Self {
        Self::new(builder, None)
    }

    pub fn builder(&self) -> &MetadataBuilder {
        &self.builder
    }

    pub fn session(&self) -> &Arc<ReportingSession> {
        self.builder.session()
    }

    /// Whether a crash-reporting client is in use
    pub fn is_remote(&self) -> bool {
        self.client.is_some()
    }

    /// Initialize the client once; later calls are no-ops
    pub fn init(&self) {
        let Some(client) = &self.client else {
            log::debug!("Crash reporter not configured; skipping init");
            return;
        };
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        match guarded(|| client.init()) {
            Ok(()) => log::info!("Crash reporter initialized"),
            Err(e) => log::error!("Crash reporter init failed: {}", e),
        }
    }

    /// Report a fault
    ///
    /// `error` and `fatal` go to the exception channel with the original
    /// stack kept; other levels go to the message channel.
    pub fn report(
        &self,
        fault: &Fault,
        envelope: ErrorReportEnvelope,
        options: &ReportOptions,
    ) -> Delivery {
        let context = options.context.clone().unwrap_or_else(|| {
            format!(
                "{}.{}",
                envelope.tag("component").unwrap_or(""),
                envelope.tag("action").unwrap_or("")
            )
        });
        if !self.session().admit(fault, &context) {
            return Delivery::Duplicate;
        }

        let level = envelope.level;
        let title = options.title(&envelope, fault.message());
        let mut envelope = self.finalize(envelope);
        envelope
            .tags
            .insert("originalErrorMessage".into(), fault.message().to_string());
        envelope.extra.insert("errorMessage".into(), json!(fault.message()));
        envelope.extra.insert("errorStack".into(), json!(fault.stack()));
        envelope
            .extra
            .insert("originalErrorMessage".into(), json!(fault.message()));
        envelope
            .extra
            .insert("structuredTitle".into(), json!(options.use_structured_title));

        let Some(client) = &self.client else {
            emit_local(&title, Some(fault), &envelope);
            return Delivery::LocalOnly;
        };

        let result = if level.is_exception() {
            let outgoing = if options.use_structured_title {
                fault.retitled(title.clone())
            } else {
                fault.clone()
            };
            guarded(|| client.capture_exception(&outgoing, &envelope))
        } else {
            guarded(|| client.capture_message(&title, &envelope))
        };
        self.settle(result, &title, Some(fault), &envelope)
    }

    /// Report a message; messages are never deduplicated
    pub fn report_message(
        &self,
        message: &str,
        envelope: ErrorReportEnvelope,
        options: &ReportOptions,
    ) -> Delivery {
        let title = options.title(&envelope, message);
        let mut envelope = self.finalize(envelope);
        envelope
            .tags
            .insert("originalMessage".into(), message.to_string());
        envelope.extra.insert("originalMessage".into(), json!(message));
        envelope
            .extra
            .insert("structuredTitle".into(), json!(options.use_structured_title));

        let Some(client) = &self.client else {
            emit_local(&title, None, &envelope);
            return Delivery::LocalOnly;
        };
        let result = guarded(|| client.capture_message(&title, &envelope));
        self.settle(result, &title, None, &envelope)
    }

    fn finalize(&self, envelope: ErrorReportEnvelope) -> ErrorReportEnvelope {
        let base =
            self.builder
                .build_base_envelope(envelope.level, Tags::new(), Contexts::new(), None);
        envelope.overlay_on(base)
    }

    fn settle(
        &self,
        result: Result<(), ReportError>,
        title: &str,
        fault: Option<&Fault>,
        envelope: &ErrorReportEnvelope,
    ) -> Delivery {
        match result {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                log::error!("Crash reporter failed: {}", e);
                emit_local(title, fault, envelope);
                Delivery::Failed
            }
        }
    }
}

/// Run a client call, turning a panic into a delivery error
fn guarded(call: impl FnOnce() -> Result<(), ReportError>) -> Result<(), ReportError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let fault = fault_from_panic(payload, "crash reporter panicked");
        Err(ReportError::delivery(fault.message()))
    })
}

fn emit_local(title: &str, fault: Option<&Fault>, envelope: &ErrorReportEnvelope) {
    let body = serde_json::to_string(envelope)
        .unwrap_or_else(|e| format!("<envelope not serializable: {}>", e));
    match fault.and_then(Fault::stack) {
        Some(stack) => log::log!(
            envelope.level.log_level(),
            "[{}] {}\n{}\nenvelope: {}",
            envelope.level,
            title,
            stack,
            body
        ),
        None => log::log!(
            envelope.level.log_level(),
            "[{}] {}\nenvelope: {}",
            envelope.level,
            title,
            body
        ),
    }
}

/// Which channel a recorded report went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Exception,
    Message,
}

/// A report captured by [`RecordingReporter`]
#[derive(Debug, Clone)]
pub struct Captured {
    pub channel: Channel,
    pub title: String,
    pub fault: Option<Fault>,
    pub envelope: ErrorReportEnvelope,
}

/// A client that records every call
///
/// Useful for testing to verify what would have been sent.
#[derive(Default)]
pub struct RecordingReporter {
    captured: Mutex<Vec<Captured>>,
    init_calls: AtomicU32,
    failing: AtomicBool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every call fails after recording it
    pub fn failing() -> Self {
        let reporter = Self::default();
        reporter.failing.store(true, Ordering::SeqCst);
        reporter
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().clone()
    }

    pub fn exceptions(&self) -> Vec<Captured> {
        self.by_channel(Channel::Exception)
    }

    pub fn messages(&self) -> Vec<Captured> {
        self.by_channel(Channel::Message)
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.captured.lock().clear();
    }

    fn by_channel(&self, channel: Channel) -> Vec<Captured> {
        self.captured
            .lock()
            .iter()
            .filter(|c| c.channel == channel)
            .cloned()
            .collect()
    }

    fn record(&self, captured: Captured) -> Result<(), ReportError> {
        self.captured.lock().push(captured);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReportError::delivery("recording client set to fail"));
        }
        Ok(())
    }
}

impl CrashReporter for RecordingReporter {
    fn init(&self) -> Result<(), ReportError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture_exception(
        &self,
        fault: &Fault,
        envelope: &ErrorReportEnvelope,
    ) -> Result<(), ReportError> {
        self.record(Captured {
            channel: Channel::Exception,
            title: fault.message().to_string(),
            fault: Some(fault.clone()),
            envelope: envelope.clone(),
        })
    }

    fn capture_message(
        &self,
        text: &str,
        envelope: &ErrorReportEnvelope,
    ) -> Result<(), ReportError> {
        self.record(Captured {
            channel: Channel::Message,
            title: text.to_string(),
            fault: None,
            envelope: envelope.clone(),
        })
    }
}
