//! Middleware-style composition of view wrappers
//!
//! A wrapper is a `FnOnce(next) -> next` transformer. [`compose`] applies a
//! list of them right-to-left, so the first listed wrapper ends up
//! outermost. Wrapper side effects happen while composing, never per render.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::boundary::{render_guarded, ErrorBoundary, FallbackProps};
use crate::fault::Fault;
use crate::reporter::ErrorReporter;
use crate::toast::ToastNotifier;

/// Something that renders to markup
pub trait View {
    fn name(&self) -> &str;

    fn render(&self) -> Result<String, Fault>;
}

pub type BoxedView = Box<dyn View>;

/// A transformer from one handler to a wrapped handler
pub type Wrapper<H> = Box<dyn FnOnce(H) -> H>;

/// Compose wrappers right-to-left
///
/// `compose(vec![a, b, c])(root)` is `a(b(c(root)))`.
pub fn compose<H: 'static>(wrappers: Vec<Wrapper<H>>) -> impl FnOnce(H) -> H {
    move |root| {
        wrappers
            .into_iter()
            .rev()
            .fold(root, |inner, wrap| wrap(inner))
    }
}

/// Initialize the crash-reporting client once, then pass the view through
pub fn with_monitoring(reporter: Arc<ErrorReporter>) -> Wrapper<BoxedView> {
    Box::new(move |inner| {
        reporter.init();
        inner
    })
}

/// Render the notifier's toasts after the wrapped view
pub fn with_toast(notifier: ToastNotifier) -> Wrapper<BoxedView> {
    Box::new(move |inner| Box::new(ToastLayer { inner, notifier }))
}

/// Render the wrapped view inside an error boundary
pub fn with_error_boundary(
    boundary: Arc<Mutex<ErrorBoundary>>,
    fallback: Option<FallbackRenderer>,
) -> Wrapper<BoxedView> {
    Box::new(move |inner| {
        let fallback: FallbackRenderer = match fallback {
            Some(fallback) => fallback,
            None => Arc::new(default_fallback),
        };
        Box::new(BoundaryLayer {
            inner,
            boundary,
            fallback,
        })
    })
}

pub type FallbackRenderer = Arc<dyn Fn(&FallbackProps) -> String + Send + Sync>;

/// Plain-text fallback shown while a boundary is failed
pub fn default_fallback(props: &FallbackProps) -> String {
    let mut out = String::from("Something went wrong.");
    out.push_str(&format!("\nError ID: {}", props.error_id));
    if props.can_retry {
        out.push_str(&format!(
            "\n[Try again ({} left)]",
            props.remaining_retries
        ));
    }
    out.push_str("\n[Reload page]");
    out
}

struct ToastLayer {
    inner: BoxedView,
    notifier: ToastNotifier,
}

impl View for ToastLayer {
    fn name(&self) -> &str {
        "WithToast"
    }

    fn render(&self) -> Result<String, Fault> {
        let mut out = self.inner.render()?;
        for toast in self.notifier.toasts() {
            out.push_str(&format!("\n<toast {:?}> {}", toast.kind, toast.message));
        }
        Ok(out)
    }
}

struct BoundaryLayer {
    inner: BoxedView,
    boundary: Arc<Mutex<ErrorBoundary>>,
    fallback: FallbackRenderer,
}

impl View for BoundaryLayer {
    fn name(&self) -> &str {
        "WithErrorBoundary"
    }

    // Lock released while the child renders; the child may use the boundary
    fn render(&self) -> Result<String, Fault> {
        let props = self.boundary.lock().fallback_props();
        if let Some(props) = props {
            return Ok((self.fallback)(&props));
        }
        let outcome = render_guarded(self.inner.as_ref());
        let markup = self.boundary.lock().settle_render(
            outcome,
            self.inner.name(),
            self.fallback.as_ref(),
        );
        Ok(markup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::tests::recording_reporter;
    use crate::toast::{ToastKind, ToastMetadata};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Root;

    impl View for Root {
        fn name(&self) -> &str {
            "Root"
        }

        fn render(&self) -> Result<String, Fault> {
            Ok("Root".to_string())
        }
    }

    struct Tagged {
        tag: &'static str,
        inner: BoxedView,
    }

    impl View for Tagged {
        fn name(&self) -> &str {
            self.tag
        }

        fn render(&self) -> Result<String, Fault> {
            Ok(format!("<{}>{}</{}>", self.tag, self.inner.render()?, self.tag))
        }
    }

    fn tagged(tag: &'static str) -> Wrapper<BoxedView> {
        Box::new(move |inner| Box::new(Tagged { tag, inner }))
    }

    #[test]
    fn test_first_listed_wrapper_is_outermost() {
        let app = compose(vec![tagged("A"), tagged("B"), tagged("C")])(Box::new(Root));
        assert_eq!(app.render().unwrap(), "<A><B><C>Root</C></B></A>");
        assert_eq!(app.name(), "A");
    }

    #[test]
    fn test_compose_works_for_plain_functions() {
        let add: Wrapper<i32> = Box::new(|n| n + 1);
        let double: Wrapper<i32> = Box::new(|n| n * 2);
        // add(double(5))
        assert_eq!(compose(vec![add, double])(5), 11);
        assert_eq!(compose(Vec::<Wrapper<i32>>::new())(5), 5);
    }

    #[test]
    fn test_wrapper_side_effects_run_at_composition() {
        let applied = Rc::new(Cell::new(0));
        let counter = applied.clone();
        let counting: Wrapper<BoxedView> = Box::new(move |inner| {
            counter.set(counter.get() + 1);
            inner
        });

        let app = compose(vec![counting])(Box::new(Root));
        app.render().unwrap();
        app.render().unwrap();
        assert_eq!(applied.get(), 1);
    }

    #[test]
    fn test_monitoring_initializes_client_once() {
        let (reporter, client) = recording_reporter();
        let app = compose(vec![with_monitoring(reporter.clone())])(Box::new(Root));
        assert_eq!(app.render().unwrap(), "Root");
        reporter.init();
        assert_eq!(client.init_calls(), 1);
    }

    #[test]
    fn test_toast_layer_renders_visible_toasts() {
        let (reporter, _) = recording_reporter();
        let notifier = ToastNotifier::new(reporter);
        let app = compose(vec![with_toast(notifier.clone())])(Box::new(Root));

        notifier.show_toast("Saved", ToastKind::Success, ToastMetadata::persistent());
        assert_eq!(app.render().unwrap(), "Root\n<toast Success> Saved");
    }

    struct BoundaryAware {
        boundary: Arc<Mutex<ErrorBoundary>>,
    }

    impl View for BoundaryAware {
        fn name(&self) -> &str {
            "BoundaryAware"
        }

        fn render(&self) -> Result<String, Fault> {
            let retries = self.boundary.lock().remaining_retries();
            if retries == 3 {
                Err(Fault::new("first render fails"))
            } else {
                Ok(format!("retries left {}", retries))
            }
        }
    }

    #[test]
    fn test_child_can_use_its_boundary_while_rendering() {
        let (reporter, client) = recording_reporter();
        let boundary = Arc::new(Mutex::new(ErrorBoundary::new(reporter)));
        let app = compose(vec![with_error_boundary(boundary.clone(), None)])(Box::new(
            BoundaryAware {
                boundary: boundary.clone(),
            },
        ));

        let markup = app.render().unwrap();
        assert!(markup.starts_with("Something went wrong."));
        assert!(boundary.lock().has_error());
        assert_eq!(client.exceptions().len(), 1);

        assert!(boundary.lock().reset());
        assert_eq!(app.render().unwrap(), "retries left 2");
        assert!(!boundary.lock().has_error());
    }
}
