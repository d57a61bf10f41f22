//! Guarded execution of UI actions
//!
//! [`ComponentAction`] runs a unit of view logic, catching both `Err` returns
//! and panics. Failures are reported with the component context and the
//! caller's state snapshot, then handed to the caller's toast callback.
//! [`BusinessRules`] logs rule violations and soft warnings.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::envelope::{ErrorReportEnvelope, Level, ReportUser};
use crate::fault::Fault;
use crate::metadata::{BusinessContext, ComponentContext};
use crate::reporter::{Delivery, ErrorReporter, ReportOptions};
use crate::summary::Value;

type ErrorCallback<'a> = Box<dyn FnOnce(&str) + 'a>;

/// Options for [`ComponentAction::execute`]
pub struct ActionOptions<'a> {
    /// Fault message used when a panic carries no text
    pub error_message: String,
    /// Text passed to `on_error`
    pub error_toast_message: String,
    pub state: Option<Value>,
    pub level: Level,
    pub skip_duplicate_logging: bool,
    on_error: Option<ErrorCallback<'a>>,
}

impl<'a> ActionOptions<'a> {
    pub fn new(error_message: impl Into<String>, error_toast_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            error_toast_message: error_toast_message.into(),
            state: None,
            level: Level::Error,
            skip_duplicate_logging: false,
            on_error: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<Value>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn skip_duplicates(mut self) -> Self {
        self.skip_duplicate_logging = true;
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(&str) + 'a) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

/// A component-scoped action runner
pub struct ComponentAction {
    reporter: Arc<ErrorReporter>,
    context: ComponentContext,
    user: Option<ReportUser>,
}

impl ComponentAction {
    pub fn new(
        reporter: Arc<ErrorReporter>,
        context: ComponentContext,
        user: Option<ReportUser>,
    ) -> Self {
        Self {
            reporter,
            context,
            user,
        }
    }

    pub fn context(&self) -> &ComponentContext {
        &self.context
    }

    /// Run `action`, returning its value or `None` on failure
    ///
    /// An `Err` or a panic is reported (unless it is a known duplicate and
    /// `skip_duplicate_logging` is set) and `on_error` receives the toast
    /// text. Nothing is re-raised.
    pub fn execute<T, E, F>(&self, action: F, mut options: ActionOptions<'_>) -> Option<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<Fault>,
    {
        let fault = match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => err.into(),
            Err(payload) => fault_from_panic(payload, &options.error_message),
        };

        let log_context = self.context.log_context();
        let on_error = options.on_error.take();

        if options.skip_duplicate_logging
            && self.reporter.session().is_duplicate(&fault, &log_context)
        {
            log::debug!("Skipping duplicate error log for {}: {}", log_context, fault);
        } else {
            let mut ctx = self.context.clone();
            if let Some(state) = options.state.take() {
                ctx.state = Some(state);
            }
            let envelope = self
                .reporter
                .builder()
                .build_component_context(&ctx, options.level, self.user.clone());
            let report_options = ReportOptions {
                use_structured_title: true,
                title_prefix: None,
                context: Some(log_context),
            };
            self.reporter.report(&fault, envelope, &report_options);
        }

        if let Some(callback) = on_error {
            callback(&options.error_toast_message);
        }
        None
    }

    /// Log an informational component message
    pub fn message(&self, text: &str, level: Level) -> Delivery {
        let envelope = self
            .reporter
            .builder()
            .build_component_info(&self.context, level, self.user.clone());
        self.reporter
            .report_message(text, envelope, &ReportOptions::structured(""))
    }
}

pub(crate) fn fault_from_panic(payload: Box<dyn Any + Send>, fallback: &str) -> Fault {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        Fault::new(*msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        Fault::new(msg.clone())
    } else {
        Fault::new(fallback)
    }
}

/// Outcome of a business-rule check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessValidation {
    pub is_valid: bool,
    pub should_continue: bool,
    pub logged_level: Option<Level>,
}

/// Logging for business-rule checks
///
/// `validate_and_warn` is a hard stop; `warn` lets the caller continue.
pub struct BusinessRules {
    reporter: Arc<ErrorReporter>,
    context: BusinessContext,
    component: Option<ComponentContext>,
    user: Option<ReportUser>,
}

impl BusinessRules {
    pub fn new(
        reporter: Arc<ErrorReporter>,
        context: BusinessContext,
        user: Option<ReportUser>,
    ) -> Self {
        Self {
            reporter,
            context,
            component: None,
            user,
        }
    }

    /// Attach the component that owns the rule; its tags join each report
    pub fn for_component(mut self, component: ComponentContext) -> Self {
        self.component = Some(component);
        self
    }

    fn log_context(&self) -> String {
        match &self.component {
            Some(c) => c.log_context(),
            None => ".".to_string(),
        }
    }

    fn with_component_tags(&self, mut envelope: ErrorReportEnvelope) -> ErrorReportEnvelope {
        if let Some(c) = &self.component {
            envelope
                .tags
                .insert("component".into(), c.component_name.clone());
            envelope.tags.insert("feature".into(), c.feature.clone());
            envelope.tags.insert("action".into(), c.action.clone());
        }
        envelope
    }

    fn info_envelope(&self, ctx: &BusinessContext, level: Level) -> ErrorReportEnvelope {
        let envelope = self
            .reporter
            .builder()
            .build_business_info(ctx, level, self.user.clone());
        self.with_component_tags(envelope)
    }

    /// Log a violated rule at warning level; the caller must stop
    pub fn validate_and_warn(
        &self,
        message: &str,
        input: impl Into<Value>,
        on_warn: Option<impl FnOnce()>,
    ) -> BusinessValidation {
        let mut ctx = self.context.clone();
        ctx.input_values = input.into();
        let envelope = self.info_envelope(&ctx, Level::Warning);
        self.reporter
            .report_message(message, envelope, &ReportOptions::structured(""));

        if let Some(callback) = on_warn {
            callback();
        }
        BusinessValidation {
            is_valid: false,
            should_continue: false,
            logged_level: Some(Level::Warning),
        }
    }

    /// Log a soft warning; the caller may continue
    ///
    /// Repeats of the same warning within the dedup window are not logged
    /// again, but the callback still runs.
    pub fn warn(
        &self,
        message: &str,
        input: impl Into<Value>,
        on_warning: Option<impl FnOnce()>,
    ) -> BusinessValidation {
        let fault = Fault::new(format!("Business warning: {}", message));
        let log_context = self.log_context();

        if self.reporter.session().is_duplicate(&fault, &log_context) {
            log::debug!("Skipping duplicate business warning for {}", log_context);
        } else {
            let mut ctx = self.context.clone();
            ctx.input_values = input.into();
            ctx.actual_behavior = format!("Warning: {}", message);
            let envelope = self.reporter.builder().build_business_context(
                &ctx,
                Level::Warning,
                self.user.clone(),
            );
            let envelope = self.with_component_tags(envelope);
            let options = ReportOptions::structured("").with_context(log_context);
            self.reporter.report(&fault, envelope, &options);
        }

        if let Some(callback) = on_warning {
            callback();
        }
        BusinessValidation {
            is_valid: true,
            should_continue: true,
            logged_level: Some(Level::Warning),
        }
    }

    /// Log an informational rule message
    pub fn info(
        &self,
        message: &str,
        input: impl Into<Value>,
        expected: Option<&str>,
        actual: Option<&str>,
    ) -> Delivery {
        let mut ctx = self.context.clone();
        ctx.input_values = input.into();
        if let Some(expected) = expected {
            ctx.expected_behavior = expected.to_string();
        }
        if let Some(actual) = actual {
            ctx.actual_behavior = actual.to_string();
        }
        let envelope = self.info_envelope(&ctx, Level::Info);
        self.reporter
            .report_message(message, envelope, &ReportOptions::structured(""))
    }

    /// Log that a rule-governed operation succeeded
    pub fn success(&self, message: &str, input: impl Into<Value>, actual: Option<&str>) -> Delivery {
        let mut ctx = self.context.clone();
        ctx.input_values = input.into();
        ctx.actual_behavior = match actual {
            Some(actual) => actual.to_string(),
            None => format!("Success: {}", message),
        };
        let envelope = self.info_envelope(&ctx, Level::Info);
        self.reporter
            .report_message(message, envelope, &ReportOptions::structured(""))
    }
}
