//! Ambient environment read by the metadata builders
//!
//! The host supplies an [`EnvironmentSource`]; builders take one snapshot
//! per envelope. User-agent parsing lives here too, so every envelope
//! describes the browser, OS and device the same way.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Page location at the time of the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLocation {
    pub href: String,
    pub pathname: String,
    pub search: String,
    pub hash: String,
    pub referrer: String,
    pub title: String,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Default for PageLocation {
    fn default() -> Self {
        Self {
            href: "http://localhost/".to_string(),
            pathname: "/".to_string(),
            search: String::new(),
            hash: String::new(),
            referrer: String::new(),
            title: String::new(),
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// Read-only snapshot of the runtime the app is displayed in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbientEnvironment {
    pub user_agent: String,
    pub language: String,
    pub timezone: String,
    /// Screen size in pixels (width, height)
    pub screen: (u32, u32),
    /// Viewport size in pixels (width, height)
    pub viewport: (u32, u32),
    /// Device memory hint in GiB
    pub device_memory: Option<f64>,
    /// Effective connection type hint (e.g. "4g")
    pub connection_type: Option<String>,
    pub cookie_enabled: bool,
    pub online: bool,
    pub location: PageLocation,
    /// When the app started
    pub time_origin: DateTime<Utc>,
}

impl Default for AmbientEnvironment {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            language: "en-US".to_string(),
            timezone: "UTC".to_string(),
            screen: (0, 0),
            viewport: (0, 0),
            device_memory: None,
            connection_type: None,
            cookie_enabled: true,
            online: true,
            location: PageLocation::default(),
            time_origin: Utc::now(),
        }
    }
}

impl AmbientEnvironment {
    /// Milliseconds elapsed since `time_origin`
    pub fn uptime_ms(&self) -> i64 {
        (Utc::now() - self.time_origin).num_milliseconds()
    }

    pub fn browser(&self) -> BrowserInfo {
        BrowserInfo::parse(&self.user_agent)
    }
}

/// Source of environment snapshots
pub trait EnvironmentSource: Send + Sync {
    fn snapshot(&self) -> AmbientEnvironment;
}

/// Environment source that always returns the same snapshot
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment(pub AmbientEnvironment);

impl EnvironmentSource for StaticEnvironment {
    fn snapshot(&self) -> AmbientEnvironment {
        self.0.clone()
    }
}

/// Coarse device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }
}

/// Browser, OS and device parsed from a user-agent string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub browser_name: String,
    pub browser_version: String,
    pub os_name: String,
    pub os_version: String,
    pub device_type: DeviceType,
}

static BROWSER_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Chrome|Firefox|Safari|Edge)/(\d+)").expect("valid browser version regex")
});
static MAC_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Mac OS X (\d+_\d+)").expect("valid macOS version regex"));
static MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Mobile|Android|iPhone").expect("valid mobile regex"));
static TABLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"iPad|Tablet").expect("valid tablet regex"));

const UNKNOWN: &str = "Unknown";

impl BrowserInfo {
    pub fn parse(ua: &str) -> Self {
        Self {
            browser_name: browser_name(ua).to_string(),
            browser_version: BROWSER_VERSION
                .captures(ua)
                .and_then(|c| c.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            os_name: os_name(ua).to_string(),
            os_version: os_version(ua),
            device_type: device_type(ua),
        }
    }
}

// Chrome's UA also mentions Safari, and Edge's mentions Chrome; order matters.
fn browser_name(ua: &str) -> &'static str {
    if ua.contains("Chrome") {
        "Chrome"
    } else if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("Safari") {
        "Safari"
    } else if ua.contains("Edge") {
        "Edge"
    } else {
        UNKNOWN
    }
}

fn os_name(ua: &str) -> &'static str {
    if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Mac OS") {
        "macOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("Linux") {
        "Linux"
    } else if ua.contains("iOS") || ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else {
        UNKNOWN
    }
}

fn os_version(ua: &str) -> String {
    if ua.contains("Windows NT 10.0") {
        "10+".to_string()
    } else if ua.contains("Windows NT 6.3") {
        "8.1".to_string()
    } else if ua.contains("Windows NT 6.2") {
        "8".to_string()
    } else if ua.contains("Mac OS X") {
        MAC_VERSION
            .captures(ua)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replacen('_', ".", 1))
            .unwrap_or_else(|| UNKNOWN.to_string())
    } else {
        UNKNOWN.to_string()
    }
}

fn device_type(ua: &str) -> DeviceType {
    if MOBILE.is_match(ua) {
        DeviceType::Mobile
    } else if TABLET.is_match(ua) {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    }
}
