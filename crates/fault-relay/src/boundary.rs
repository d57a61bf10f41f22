//! Render-time failure boundary with bounded retries
//!
//! The boundary is either healthy (children render normally) or failed
//! (a fallback is shown). The hosting view layer drives it through
//! [`ErrorBoundary::on_catch`], [`ErrorBoundary::reset`] and
//! [`ErrorBoundary::on_recovered`], or lets [`ErrorBoundary::render`] do it.
//!
//! `retry_count` increments on every reset but stops at `max_retries + 1`.
//! Once past `max_retries`, resets keep the boundary failed and only log.
//! A reload clears everything.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::json;

use crate::action::fault_from_panic;
use crate::compose::View;
use crate::constants::boundary as defaults;
use crate::envelope::{Level, ReportUser};
use crate::fault::Fault;
use crate::metadata::ComponentContext;
use crate::reporter::{ErrorReporter, ReportOptions};
use crate::summary::Value;

/// Where in the view tree a fault was caught
#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    pub component_stack: String,
}

/// Custom handler run after a fault is caught
pub type ErrorHandler = Box<dyn Fn(&Fault, &ErrorInfo) -> Result<(), Fault> + Send + Sync>;

/// Retry state of a boundary
#[derive(Debug, Clone, Default)]
pub struct BoundaryState {
    pub has_error: bool,
    pub error: Option<Fault>,
    pub error_info: Option<ErrorInfo>,
    pub error_id: Option<String>,
    pub retry_count: u32,
}

/// What a fallback view is given
#[derive(Debug, Clone)]
pub struct FallbackProps {
    pub error: Fault,
    pub error_id: String,
    pub retry_count: u32,
    pub can_retry: bool,
    pub remaining_retries: u32,
}

pub struct ErrorBoundary {
    reporter: Arc<ErrorReporter>,
    component_name: String,
    feature: String,
    max_retries: u32,
    user: Option<ReportUser>,
    on_error: Option<ErrorHandler>,
    state: BoundaryState,
    awaiting_recovery: bool,
}

impl ErrorBoundary {
    /// A healthy boundary; `max_retries` comes from the pipeline config
    pub fn new(reporter: Arc<ErrorReporter>) -> Self {
        let max_retries = reporter.builder().config().max_retries;
        Self {
            reporter,
            component_name: defaults::UNKNOWN_COMPONENT.to_string(),
            feature: defaults::DEFAULT_FEATURE.to_string(),
            max_retries,
            user: None,
            on_error: None,
            state: BoundaryState::default(),
            awaiting_recovery: false,
        }
    }

    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.component_name = name.into();
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = feature.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_user(mut self, user: ReportUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_on_error(
        mut self,
        handler: impl Fn(&Fault, &ErrorInfo) -> Result<(), Fault> + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub fn state(&self) -> &BoundaryState {
        &self.state
    }

    pub fn has_error(&self) -> bool {
        self.state.has_error
    }

    pub fn retry_count(&self) -> u32 {
        self.state.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn can_retry(&self) -> bool {
        self.state.retry_count < self.max_retries
    }

    pub fn remaining_retries(&self) -> u32 {
        self.max_retries.saturating_sub(self.state.retry_count)
    }

    /// Props for the fallback view, if the boundary is failed
    pub fn fallback_props(&self) -> Option<FallbackProps> {
        if !self.state.has_error {
            return None;
        }
        Some(FallbackProps {
            error: self
                .state
                .error
                .clone()
                .unwrap_or_else(|| Fault::new("Unknown render error")),
            error_id: self.state.error_id.clone().unwrap_or_default(),
            retry_count: self.state.retry_count,
            can_retry: self.can_retry(),
            remaining_retries: self.remaining_retries(),
        })
    }

    /// Enter the failed state for a fault caught during render
    ///
    /// Returns the new error id.
    pub fn on_catch(&mut self, fault: Fault, info: ErrorInfo) -> String {
        let error_id = format!("boundary-{}", uuid::Uuid::new_v4());
        self.state.has_error = true;
        self.state.error = Some(fault.clone());
        self.state.error_info = Some(info.clone());
        self.state.error_id = Some(error_id.clone());
        self.awaiting_recovery = false;

        self.log_error(&fault, &info);

        if let Some(handler) = &self.on_error {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&fault, &info)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(fault_from_panic(payload, "Custom error handler failed")),
            };
            if let Some(handler_fault) = failure {
                self.log_handler_failure(&handler_fault);
            }
        }

        error_id
    }

    /// Ask for a retry
    ///
    /// Returns `true` if the boundary went back to healthy. A healthy
    /// boundary is left untouched and returns `false`.
    pub fn reset(&mut self) -> bool {
        if !self.state.has_error {
            return false;
        }
        self.state.retry_count = (self.state.retry_count + 1).min(self.max_retries + 1);

        if self.state.retry_count > self.max_retries {
            self.log_max_retries_exceeded();
            return false;
        }

        self.log_retry();
        self.state.has_error = false;
        self.state.error = None;
        self.state.error_info = None;
        self.state.error_id = None;
        self.awaiting_recovery = true;
        true
    }

    /// Note that a render after a reset succeeded
    ///
    /// Logs a recovery event once per Failed → Healthy transition.
    pub fn on_recovered(&mut self) -> bool {
        if !self.awaiting_recovery || self.state.has_error {
            return false;
        }
        self.awaiting_recovery = false;
        let ctx = self.context("recovered");
        self.log_info("ErrorBoundary successfully recovered", &ctx, "ErrorBoundary Recovery: ");
        true
    }

    /// Render `child`, or the fallback while failed
    ///
    /// A child `Err` or panic moves the boundary to failed.
    pub fn render(&mut self, child: &dyn View, fallback: &dyn Fn(&FallbackProps) -> String) -> String {
        if let Some(props) = self.fallback_props() {
            return fallback(&props);
        }
        let outcome = render_guarded(child);
        self.settle_render(outcome, child.name(), fallback)
    }

    /// Apply the outcome of a child render made outside the boundary
    pub fn settle_render(
        &mut self,
        outcome: Result<String, Fault>,
        child_name: &str,
        fallback: &dyn Fn(&FallbackProps) -> String,
    ) -> String {
        let fault = match outcome {
            Ok(markup) => {
                self.on_recovered();
                return markup;
            }
            Err(fault) => fault,
        };

        let info = ErrorInfo {
            component_stack: child_name.to_string(),
        };
        self.on_catch(fault, info);
        match self.fallback_props() {
            Some(props) => fallback(&props),
            None => String::new(),
        }
    }

    /// Full reload: forget the failure and the retry count
    pub fn reload(&mut self) {
        log::info!("ErrorBoundary {} reloaded", self.component_name);
        self.state = BoundaryState::default();
        self.awaiting_recovery = false;
    }

    fn context(&self, action: &str) -> ComponentContext {
        ComponentContext::new(&self.component_name, &self.feature, action)
    }

    fn log_error(&self, fault: &Fault, info: &ErrorInfo) {
        let ctx = self
            .context("componentDidCatch")
            .with_props(Value::from(json!({
                "retryCount": self.state.retry_count,
                "maxRetries": self.max_retries,
                "componentStack": info.component_stack,
                "isDuplicateHandling": false,
            })))
            .with_state(Value::from(json!({
                "hasError": self.state.has_error,
                "errorId": self.state.error_id,
            })));
        let envelope = self
            .reporter
            .builder()
            .build_component_context(&ctx, Level::Fatal, self.user.clone());
        let options = ReportOptions::structured("ErrorBoundary: ")
            .with_context(format!("ErrorBoundary.{}", self.component_name));
        self.reporter.report(fault, envelope, &options);
    }

    fn log_handler_failure(&self, fault: &Fault) {
        let ctx = ComponentContext::new(
            &self.component_name,
            defaults::DEFAULT_FEATURE,
            "onError-handler-failed",
        );
        let envelope = self
            .reporter
            .builder()
            .build_component_context(&ctx, Level::Error, self.user.clone());
        self.reporter.report(
            fault,
            envelope,
            &ReportOptions::structured("ErrorBoundary Handler: "),
        );
    }

    fn log_retry(&self) {
        let ctx = self.context("resetErrorBoundary").with_props(Value::from(json!({
            "retryCount": self.state.retry_count,
            "maxRetries": self.max_retries,
        })));
        let message = format!("ErrorBoundary retry attempt #{}", self.state.retry_count);
        self.log_info(&message, &ctx, "ErrorBoundary Retry: ");
    }

    fn log_max_retries_exceeded(&self) {
        let ctx = self
            .context("maxRetriesExceeded")
            .with_props(Value::from(json!({ "maxRetries": self.max_retries })));
        let fault = Fault::new(format!(
            "ErrorBoundary max retries ({}) exceeded",
            self.max_retries
        ));
        let envelope = self
            .reporter
            .builder()
            .build_component_context(&ctx, Level::Fatal, self.user.clone());
        self.reporter.report(
            &fault,
            envelope,
            &ReportOptions::structured("ErrorBoundary Fatal: "),
        );
    }

    fn log_info(&self, message: &str, ctx: &ComponentContext, prefix: &str) {
        let envelope = self
            .reporter
            .builder()
            .build_component_info(ctx, Level::Info, self.user.clone());
        self.reporter
            .report_message(message, envelope, &ReportOptions::structured(prefix));
    }
}

/// Render a view, turning a panic into a fault
pub fn render_guarded(child: &dyn View) -> Result<String, Fault> {
    panic::catch_unwind(AssertUnwindSafe(|| child.render()))
        .unwrap_or_else(|payload| Err(fault_from_panic(payload, "Render failed")))
}
