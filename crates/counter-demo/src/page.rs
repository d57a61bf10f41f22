//! The counter page
//!
//! Each handler runs inside a [`ComponentAction`], so an unexpected failure
//! leaves the state unchanged and shows an error toast. Hitting a bound is a
//! business warning, not an error.

use std::sync::Arc;

use fault_relay::{
    ActionOptions, BusinessContext, BusinessRules, ComponentAction, ComponentContext,
    ErrorReporter, Fault, Pipeline, ReportUser, ToastKind, ToastNotifier, ToastSource, Value,
    View,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::messages::{bounds, errors, success, warnings};

const COMPONENT: &str = "Home";

/// Business state of the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterState {
    pub count: i64,
    pub dark_mode: bool,
}

impl CounterState {
    /// Snapshot attached to error reports
    pub fn to_value(self) -> Value {
        Value::object([
            ("count", Value::from(self.count)),
            ("darkMode", Value::from(self.dark_mode)),
        ])
    }
}

/// Counter view with increment, decrement, reset and theme toggle
#[derive(Clone)]
pub struct CounterPage {
    state: Arc<Mutex<CounterState>>,
    reporter: Arc<ErrorReporter>,
    notifier: ToastNotifier,
    user: Option<ReportUser>,
}

impl CounterPage {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self::with_state(pipeline, CounterState::default())
    }

    pub fn with_state(pipeline: &Pipeline, state: CounterState) -> Self {
        pipeline.session().record_page_view();
        Self {
            state: Arc::new(Mutex::new(state)),
            reporter: pipeline.reporter.clone(),
            notifier: pipeline.notifier.clone(),
            user: None,
        }
    }

    pub fn with_user(mut self, user: ReportUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn state(&self) -> CounterState {
        *self.state.lock()
    }

    pub fn increment(&self) -> Option<CounterState> {
        let rules = self.counter_rules("incrementCount");
        let snapshot = self.state();

        self.action("counter", "incrementCount")
            .execute(
                || {
                    let mut state = self.state.lock();
                    if state.count >= bounds::MAX_COUNT {
                        let input = Value::object([
                            ("currentCount", Value::from(state.count)),
                            ("attemptedAction", Value::from("increment")),
                        ]);
                        rules.validate_and_warn(
                            warnings::COUNTER_MAX,
                            input,
                            Some(|| self.toast(warnings::COUNTER_MAX, ToastKind::Warning)),
                        );
                        return Ok::<_, Fault>(None);
                    }
                    state.count += 1;
                    if state.count == bounds::MAX_COUNT {
                        self.toast(warnings::COUNTER_MAX, ToastKind::Warning);
                    }
                    Ok(Some(*state))
                },
                self.options(errors::COUNTER_INCREMENT, snapshot),
            )
            .flatten()
    }

    pub fn decrement(&self) -> Option<CounterState> {
        let snapshot = self.state();

        self.action("counter", "decrementCount")
            .execute(
                || {
                    let mut state = self.state.lock();
                    if state.count <= bounds::MIN_COUNT {
                        self.toast(warnings::COUNTER_MIN, ToastKind::Warning);
                        return Ok::<_, Fault>(None);
                    }
                    state.count -= 1;
                    Ok(Some(*state))
                },
                self.options(errors::COUNTER_DECREMENT, snapshot),
            )
            .flatten()
    }

    pub fn reset(&self) -> Option<CounterState> {
        let snapshot = self.state();
        let rules = self.counter_rules("resetCount");

        self.action("counter", "resetCount").execute(
            || {
                let previous = {
                    let mut state = self.state.lock();
                    std::mem::replace(&mut state.count, 0)
                };
                self.toast(success::COUNTER_RESET, ToastKind::Success);
                rules.success(
                    success::COUNTER_RESET,
                    Value::object([("previousCount", Value::from(previous))]),
                    None,
                );
                Ok::<_, Fault>(self.state())
            },
            self.options(errors::COUNTER_RESET, snapshot),
        )
    }

    pub fn toggle_dark_mode(&self) -> Option<CounterState> {
        let snapshot = self.state();

        self.action("theme", "toggleDarkMode").execute(
            || {
                let updated = {
                    let mut state = self.state.lock();
                    state.dark_mode = !state.dark_mode;
                    *state
                };
                let text = if updated.dark_mode {
                    success::DARK_MODE_ON
                } else {
                    success::DARK_MODE_OFF
                };
                self.toast(text, ToastKind::Success);
                Ok::<_, Fault>(updated)
            },
            self.options(errors::DARK_MODE_TOGGLE, snapshot),
        )
    }

    fn action(&self, feature: &str, action: &str) -> ComponentAction {
        ComponentAction::new(
            self.reporter.clone(),
            ComponentContext::new(COMPONENT, feature, action),
            self.user.clone(),
        )
    }

    fn counter_rules(&self, action: &str) -> BusinessRules {
        let mut ctx = BusinessContext::new("counter-limits");
        ctx.expected_behavior = format!(
            "Counter stays between {} and {}",
            bounds::MIN_COUNT,
            bounds::MAX_COUNT
        );
        ctx.actual_behavior = "Handled by the counter business rules".to_string();
        BusinessRules::new(self.reporter.clone(), ctx, self.user.clone())
            .for_component(ComponentContext::new(COMPONENT, "counter", action))
    }

    fn options(&self, error_text: &'static str, snapshot: CounterState) -> ActionOptions<'_> {
        ActionOptions::new(error_text, error_text)
            .with_state(snapshot.to_value())
            .on_error(move |message| self.toast(message, ToastKind::Error))
    }

    fn toast(&self, message: &str, kind: ToastKind) {
        self.notifier
            .show_toast(message, kind, ToastSource::default());
    }
}

impl View for CounterPage {
    fn name(&self) -> &str {
        COMPONENT
    }

    fn render(&self) -> Result<String, Fault> {
        let state = self.state();
        let theme = if state.dark_mode { "dark" } else { "light" };
        Ok(format!(
            "<main theme=\"{}\">\n<h2>Interactive counter</h2>\n<count>{}</count>\n</main>",
            theme, state.count
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fault_relay::{
        compose, with_error_boundary, with_monitoring, with_toast, AmbientEnvironment,
        CrashReporter, ErrorBoundary, PipelineConfig, RecordingReporter, StaticEnvironment,
    };

    fn remote_pipeline() -> (Pipeline, Arc<RecordingReporter>) {
        let client = Arc::new(RecordingReporter::new());
        let config = PipelineConfig {
            reporter_dsn: Some("https://key@reports.example.invalid/7".to_string()),
            ..Default::default()
        };
        let pipeline = Pipeline::new(
            config,
            Arc::new(StaticEnvironment(AmbientEnvironment::default())),
            Some(client.clone() as Arc<dyn CrashReporter>),
        );
        (pipeline, client)
    }

    #[tokio::test]
    async fn test_increment_at_bound_warns_once() {
        let (pipeline, client) = remote_pipeline();
        let page = CounterPage::with_state(
            &pipeline,
            CounterState {
                count: 10,
                dark_mode: false,
            },
        );

        assert_eq!(page.increment(), None);

        assert_eq!(page.state().count, 10);
        let toasts = pipeline.notifier.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Warning);
        assert_eq!(toasts[0].message, warnings::COUNTER_MAX);
        assert!(client.exceptions().is_empty());
        assert_eq!(client.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_reaching_bound_shows_warning() {
        let (pipeline, client) = remote_pipeline();
        let page = CounterPage::with_state(
            &pipeline,
            CounterState {
                count: 9,
                dark_mode: false,
            },
        );

        let state = page.increment().unwrap();
        assert_eq!(state.count, 10);
        assert_eq!(pipeline.notifier.toasts()[0].kind, ToastKind::Warning);
        assert!(client.captured().is_empty());
    }

    #[tokio::test]
    async fn test_decrement_at_zero_only_toasts() {
        let (pipeline, client) = remote_pipeline();
        let page = CounterPage::new(&pipeline);

        assert_eq!(page.decrement(), None);
        assert_eq!(page.state().count, 0);
        assert_eq!(pipeline.notifier.toasts()[0].message, warnings::COUNTER_MIN);
        assert!(client.captured().is_empty());
    }

    #[tokio::test]
    async fn test_reset_and_toggle() {
        let (pipeline, client) = remote_pipeline();
        let page = CounterPage::with_state(
            &pipeline,
            CounterState {
                count: 4,
                dark_mode: false,
            },
        );

        assert_eq!(page.reset().unwrap().count, 0);
        assert!(page.toggle_dark_mode().unwrap().dark_mode);

        let messages: Vec<String> = pipeline
            .notifier
            .toasts()
            .into_iter()
            .map(|t| t.message)
            .collect();
        assert_eq!(messages, vec![success::COUNTER_RESET, success::DARK_MODE_ON]);
        // The reset success is logged as a business info message
        assert_eq!(client.messages().len(), 1);
        assert!(client.exceptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toasts_expire() {
        let (pipeline, _) = remote_pipeline();
        let page = CounterPage::new(&pipeline);
        page.toggle_dark_mode();
        assert_eq!(pipeline.notifier.len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(5001)).await;
        tokio::task::yield_now().await;
        assert!(pipeline.notifier.is_empty());
    }

    #[tokio::test]
    async fn test_composed_app_renders_page_and_toasts() {
        let (pipeline, client) = remote_pipeline();
        let page = CounterPage::new(&pipeline);
        let boundary = Arc::new(Mutex::new(
            ErrorBoundary::new(pipeline.reporter.clone()).with_component(COMPONENT),
        ));

        let app = compose(vec![
            with_monitoring(pipeline.reporter.clone()),
            with_toast(pipeline.notifier.clone()),
            with_error_boundary(boundary.clone(), None),
        ])(Box::new(page.clone()));

        page.increment();
        let markup = app.render().unwrap();
        assert!(markup.contains("<count>1</count>"));
        assert!(!boundary.lock().has_error());
        assert_eq!(client.init_calls(), 1);

        page.toggle_dark_mode();
        let markup = app.render().unwrap();
        assert!(markup.contains("theme=\"dark\""));
        assert!(markup.ends_with(&format!("<toast Success> {}", success::DARK_MODE_ON)));
    }
}
