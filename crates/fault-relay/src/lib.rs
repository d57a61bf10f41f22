//! Fault Relay - error reporting and toast notifications for view-driven apps
//!
//! This crate sits between UI event handlers and a crash-reporting service.
//! It provides:
//!
//! - Safe summaries of arbitrary (possibly cyclic) state for logging
//! - Structured report envelopes built from component, business-rule and API
//!   contexts, with sensitive values redacted
//! - At-most-once forwarding of each fault within a session
//! - A toast queue with timed expiry
//! - Guarded action runners and a retrying error boundary
//!
//! # Architecture
//!
//! - `ReportingSession`: session identity, dedup ledger and request counter
//! - `MetadataBuilder`: envelope construction from contexts
//! - `ErrorReporter`: dedup, title formatting and severity routing to a
//!   `CrashReporter` client (or local `log` output when none is configured)
//! - `ToastNotifier`: ordered notifications removed by tokio timers
//! - `compose`: right-to-left wrapper composition around a `View`
//!
//! # Example
//!
//! ```ignore
//! use fault_relay::{ComponentAction, ComponentContext, Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::local(PipelineConfig::from_env());
//! let action = ComponentAction::new(
//!     pipeline.reporter.clone(),
//!     ComponentContext::new("Home", "counter", "incrementCount"),
//!     None,
//! );
//! ```

pub mod action;
pub mod boundary;
pub mod compose;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod environment;
pub mod error;
pub mod fault;
pub mod metadata;
pub mod reporter;
pub mod session;
pub mod summary;
pub mod toast;

use std::sync::Arc;

// Re-export key types
pub use action::{ActionOptions, BusinessRules, BusinessValidation, ComponentAction};
pub use boundary::{BoundaryState, ErrorBoundary, ErrorInfo, FallbackProps};
pub use compose::{
    compose, with_error_boundary, with_monitoring, with_toast, BoxedView, View, Wrapper,
};
pub use config::PipelineConfig;
pub use envelope::{ErrorReportEnvelope, Level, ReportUser};
pub use environment::{AmbientEnvironment, EnvironmentSource, StaticEnvironment};
pub use error::{ConfigError, ReportError};
pub use fault::Fault;
pub use metadata::{
    ApiContext, BusinessContext, ComponentContext, MetadataBuilder, RequestDetails,
};
pub use reporter::{CrashReporter, Delivery, ErrorReporter, RecordingReporter, ReportOptions};
pub use session::ReportingSession;
pub use summary::{summarize, Value};
pub use toast::{
    ToastId, ToastKind, ToastMetadata, ToastNotification, ToastNotifier, ToastSource,
};

/// The shared pieces an application wires up at startup
#[derive(Clone)]
pub struct Pipeline {
    pub reporter: Arc<ErrorReporter>,
    pub notifier: ToastNotifier,
}

impl Pipeline {
    /// Build a pipeline with a fresh session
    ///
    /// `client` is used only when `config.reporter_dsn` is set.
    pub fn new(
        config: PipelineConfig,
        environment: Arc<dyn EnvironmentSource>,
        client: Option<Arc<dyn CrashReporter>>,
    ) -> Self {
        let session = Arc::new(ReportingSession::start(config.dedup_window()));
        let builder = MetadataBuilder::new(Arc::new(config), environment, session);
        let reporter = Arc::new(ErrorReporter::new(builder, client));
        let notifier = ToastNotifier::new(reporter.clone());
        Self { reporter, notifier }
    }

    /// Pipeline that writes reports to local diagnostics only
    pub fn local(config: PipelineConfig) -> Self {
        Self::new(
            config,
            Arc::new(StaticEnvironment(AmbientEnvironment::default())),
            None,
        )
    }

    pub fn session(&self) -> &Arc<ReportingSession> {
        self.reporter.session()
    }
}
