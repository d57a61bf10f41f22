//! Pipeline-wide constants
//!
//! Single source of truth for timings, limits and marker strings used by
//! the reporter, the metadata builders and the toast notifier.

/// Timing configuration
pub mod timing {
    /// Default toast lifetime in milliseconds
    pub const TOAST_DURATION_MS: u64 = 5000;
    /// Window in which an equivalent error is reported only once
    pub const DEDUP_WINDOW_SECS: u64 = 5 * 60;
    /// Response time above which an API call counts as a timeout
    pub const API_TIMEOUT_MS: u64 = 30_000;
}

/// Size limits for summaries and envelopes
pub mod limits {
    /// Array elements sampled by the summarizer
    pub const ARRAY_SAMPLE: usize = 3;
    /// Object keys kept by the summarizer
    pub const OBJECT_KEYS: usize = 5;
    /// Characters of a response body kept in an API envelope
    pub const RESPONSE_BODY_CHARS: usize = 1000;
}

/// Error boundary defaults
pub mod boundary {
    /// Retries allowed before the boundary stops logging recoverable resets
    pub const MAX_RETRIES: u32 = 3;
    /// Component name used when the host does not supply one
    pub const UNKNOWN_COMPONENT: &str = "UnknownComponent";
    /// Feature tag used when the host does not supply one
    pub const DEFAULT_FEATURE: &str = "error-boundary";
}

/// Marker strings written into reports
pub mod markers {
    /// Replaces the value of a sensitive header or query parameter
    pub const REDACTED: &str = "[FILTERED]";
    /// Appended to a truncated response body
    pub const TRUNCATED: &str = "...[TRUNCATED]";
    /// Rendered in place of a value already on the summary path
    pub const CIRCULAR: &str = "[Circular]";
    /// Rendered in place of a UI framework element
    pub const FRAMEWORK_ELEMENT: &str = "[React Component]";
    /// Fallback for unknown tag values
    pub const UNKNOWN: &str = "unknown";
}

/// Application metadata defaults
pub mod defaults {
    /// Runtime mode when none is configured
    pub const ENVIRONMENT: &str = "development";
    /// Application version when none is configured
    pub const APP_VERSION: &str = "1.0.0";
    /// Origin used to resolve relative API endpoints
    pub const PAGE_ORIGIN: &str = "http://localhost";
    /// File name used by `PipelineConfig::load` and `save`
    pub const CONFIG_FILE: &str = "fault-relay.json";
}
