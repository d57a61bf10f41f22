//! The error value carried through the reporting pipeline
//!
//! A `Fault` has an identity that survives cloning. Deduplication keys on
//! that identity, so the same failure observed by several call sites is
//! reported once, while two failures with equal text are still distinct
//! instances.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FAULT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a fault instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaultId(u64);

impl FaultId {
    fn next() -> Self {
        Self(NEXT_FAULT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A reportable failure
#[derive(Debug, Clone)]
pub struct Fault {
    id: FaultId,
    name: String,
    message: String,
    stack: Option<String>,
}

impl Fault {
    /// Create a new fault named `Error`
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// Create a new fault with an explicit name
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: FaultId::next(),
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Build a fault from any error, folding its source chain into the stack text
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let name = short_type_name(std::any::type_name::<E>());
        let mut fault = Self::named(name, err.to_string());

        let mut lines = vec![format!("{}: {}", fault.name, fault.message)];
        let mut source = err.source();
        while let Some(cause) = source {
            lines.push(format!("    caused by: {}", cause));
            source = cause.source();
        }
        fault.stack = Some(lines.join("\n"));
        fault
    }

    /// Attach stack text
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Same instance and stack, different message
    ///
    /// Used for structured report titles.
    pub fn retitled(&self, title: impl Into<String>) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            message: title.into(),
            stack: self.stack.clone(),
        }
    }

    pub fn id(&self) -> FaultId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// First line of the stack text, if any
    pub fn first_stack_line(&self) -> Option<&str> {
        self.stack.as_deref().and_then(|s| s.lines().next())
    }

    /// Whether two handles refer to the same instance
    pub fn same_instance(&self, other: &Fault) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for Fault {}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Self::from_error(&err)
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(&err)
    }
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn test_clone_preserves_identity() {
        let fault = Fault::new("boom");
        let copy = fault.clone();
        assert!(fault.same_instance(&copy));
        assert!(!fault.same_instance(&Fault::new("boom")));
    }

    #[test]
    fn test_retitled_keeps_identity_and_stack() {
        let fault = Fault::new("boom").with_stack("Error: boom\n    at increment");
        let titled = fault.retitled("[Home/counter] increment: boom");
        assert_eq!(titled.id(), fault.id());
        assert_eq!(titled.stack(), fault.stack());
        assert_eq!(titled.message(), "[Home/counter] increment: boom");
    }

    #[test]
    fn test_from_error_walks_source_chain() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
        };
        let fault = Fault::from_error(&err);
        assert_eq!(fault.name(), "Outer");
        assert_eq!(fault.message(), "outer failure");
        assert_eq!(fault.first_stack_line(), Some("Outer: outer failure"));
        assert!(fault.stack().unwrap().contains("caused by: missing file"));
    }
}
