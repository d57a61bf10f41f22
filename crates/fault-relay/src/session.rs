//! Per-session reporting state
//!
//! One `ReportingSession` is created at application startup and shared by
//! the reporter and the metadata builders. It owns the session identity,
//! the dedup ledger and the API request sequence counter.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::constants::timing;
use crate::fault::{Fault, FaultId};

/// Identity of one browsing session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub page_views: u32,
}

impl SessionInfo {
    pub fn generate() -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4().simple()),
            start_time: Utc::now(),
            page_views: 1,
        }
    }
}

/// At-most-once bookkeeping for reported faults
///
/// Two checks apply: the fault instance itself, and the `(message, context)`
/// pair within a time window. Window entries expire lazily on lookup.
#[derive(Debug)]
pub struct DedupLedger {
    window: Duration,
    seen_instances: HashSet<FaultId>,
    recent: HashMap<(String, String), Instant>,
}

impl DedupLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen_instances: HashSet::new(),
            recent: HashMap::new(),
        }
    }

    /// Whether this fault would be suppressed, without recording it
    pub fn is_duplicate(&mut self, fault: &Fault, context: &str) -> bool {
        self.prune(Instant::now());
        self.seen_instances.contains(&fault.id())
            || self.recent.contains_key(&Self::key(fault, context))
    }

    /// Record the fault; returns `false` if it is a duplicate
    pub fn admit(&mut self, fault: &Fault, context: &str) -> bool {
        if self.is_duplicate(fault, context) {
            log::debug!(
                "Skipping duplicate error for {}: {}",
                context,
                fault.message()
            );
            return false;
        }
        self.seen_instances.insert(fault.id());
        self.recent
            .insert(Self::key(fault, context), Instant::now() + self.window);
        true
    }

    /// Number of live window entries
    pub fn window_len(&self) -> usize {
        self.recent.len()
    }

    fn prune(&mut self, now: Instant) {
        self.recent.retain(|_, expires| *expires > now);
    }

    fn key(fault: &Fault, context: &str) -> (String, String) {
        (fault.message().to_string(), context.to_string())
    }
}

/// Owned mutable state for one reporting session
#[derive(Debug)]
pub struct ReportingSession {
    info: Mutex<SessionInfo>,
    dedup: Mutex<DedupLedger>,
    request_sequence: AtomicU64,
}

impl ReportingSession {
    /// Start a session with the given dedup window
    pub fn start(dedup_window: Duration) -> Self {
        let info = SessionInfo::generate();
        log::info!("Reporting session {} started", info.id);
        Self {
            info: Mutex::new(info),
            dedup: Mutex::new(DedupLedger::new(dedup_window)),
            request_sequence: AtomicU64::new(0),
        }
    }

    pub fn info(&self) -> SessionInfo {
        self.info.lock().clone()
    }

    /// Count another page view in this session
    pub fn record_page_view(&self) -> u32 {
        let mut info = self.info.lock();
        info.page_views += 1;
        info.page_views
    }

    /// Next API request sequence number, starting at 1
    pub fn next_request_sequence(&self) -> u64 {
        self.request_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a fault for reporting; `false` means suppress it
    pub fn admit(&self, fault: &Fault, context: &str) -> bool {
        self.dedup.lock().admit(fault, context)
    }

    /// Peek at the dedup ledger without recording
    pub fn is_duplicate(&self, fault: &Fault, context: &str) -> bool {
        self.dedup.lock().is_duplicate(fault, context)
    }

    /// Log the end of the session
    pub fn end(self) {
        let info = self.info.into_inner();
        log::info!(
            "Reporting session {} ended after {} page view(s)",
            info.id,
            info.page_views
        );
    }
}

impl Default for ReportingSession {
    fn default() -> Self {
        Self::start(Duration::from_secs(timing::DEDUP_WINDOW_SECS))
    }
}
