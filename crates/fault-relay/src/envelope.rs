//! Structured report envelope
//!
//! Every report sent to the crash-reporting client carries one envelope:
//! severity, flat tags, nested contexts, free-form extra data, an optional
//! user and a grouping fingerprint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Report severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// Whether reports at this level go to the exception channel
    pub fn is_exception(&self) -> bool {
        matches!(self, Level::Error | Level::Fatal)
    }

    /// Matching `log` level for local diagnostics
    pub fn log_level(&self) -> log::Level {
        match self {
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warning => log::Level::Warn,
            Level::Error | Level::Fatal => log::Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User attached to a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

pub type Tags = BTreeMap<String, String>;
pub type Contexts = BTreeMap<String, Map<String, serde_json::Value>>;
pub type Extra = Map<String, serde_json::Value>;

/// Everything the crash-reporting client receives besides the error itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReportEnvelope {
    pub level: Level,
    pub tags: Tags,
    pub contexts: Contexts,
    pub extra: Extra,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ReportUser>,
    pub fingerprint: Vec<String>,
}

impl ErrorReportEnvelope {
    /// An empty envelope at the given level
    pub fn new(level: Level) -> Self {
        Self {
            level,
            tags: Tags::new(),
            contexts: Contexts::new(),
            extra: Extra::new(),
            user: None,
            fingerprint: Vec::new(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn context(&self, name: &str) -> Option<&Map<String, serde_json::Value>> {
        self.contexts.get(name)
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Lay `self` over `base`; `self` wins on every key collision
    ///
    /// Contexts are replaced whole per name. The fingerprint and user of
    /// `base` survive only when `self` has none.
    pub fn overlay_on(self, mut base: ErrorReportEnvelope) -> ErrorReportEnvelope {
        base.level = self.level;
        base.tags.extend(self.tags);
        base.contexts.extend(self.contexts);
        base.extra.extend(self.extra);
        if self.user.is_some() {
            base.user = self.user;
        }
        if !self.fingerprint.is_empty() {
            base.fingerprint = self.fingerprint;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overlay_wins_on_collision() {
        let base = ErrorReportEnvelope::new(Level::Error)
            .with_tag("environment", "development")
            .with_tag("component", "base")
            .with_extra("url", json!("http://localhost/"));
        let overlay = ErrorReportEnvelope::new(Level::Warning).with_tag("component", "Home");

        let merged = overlay.overlay_on(base);
        assert_eq!(merged.level, Level::Warning);
        assert_eq!(merged.tag("component"), Some("Home"));
        assert_eq!(merged.tag("environment"), Some("development"));
        assert_eq!(merged.extra["url"], "http://localhost/");
    }

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Level::Warning).unwrap(), json!("warning"));
        assert!(Level::Fatal.is_exception());
        assert!(!Level::Warning.is_exception());
    }
}
