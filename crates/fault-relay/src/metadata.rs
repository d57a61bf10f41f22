//! Envelope construction
//!
//! `MetadataBuilder` turns a component, business-rule or API context into an
//! [`ErrorReportEnvelope`]. Each builder starts from a base envelope that
//! describes the environment and session, then lays its own tags, contexts
//! and fingerprint over it.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde_json::{json, Map};
use url::Url;

use crate::config::PipelineConfig;
use crate::constants::{markers, timing};
use crate::envelope::{Contexts, ErrorReportEnvelope, Level, ReportUser, Tags};
use crate::environment::EnvironmentSource;
use crate::session::ReportingSession;
use crate::summary::{summarize, Value};

/// Where a component-level report comes from
#[derive(Debug, Clone, Default)]
pub struct ComponentContext {
    pub component_name: String,
    pub feature: String,
    pub action: String,
    pub props: Option<Value>,
    pub state: Option<Value>,
}

impl ComponentContext {
    pub fn new(
        component_name: impl Into<String>,
        feature: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            feature: feature.into(),
            action: action.into(),
            props: None,
            state: None,
        }
    }

    pub fn with_props(mut self, props: impl Into<Value>) -> Self {
        self.props = Some(props.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<Value>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// `<component>.<action>`, used as the dedup context
    pub fn log_context(&self) -> String {
        format!("{}.{}", self.component_name, self.action)
    }
}

/// A business rule being checked
#[derive(Debug, Clone)]
pub struct BusinessContext {
    pub business_rule: String,
    pub input_values: Value,
    pub expected_behavior: String,
    pub actual_behavior: String,
}

impl BusinessContext {
    pub fn new(business_rule: impl Into<String>) -> Self {
        Self {
            business_rule: business_rule.into(),
            input_values: Value::Null,
            expected_behavior: String::new(),
            actual_behavior: String::new(),
        }
    }
}

/// A failed API call
#[derive(Debug, Clone, Default)]
pub struct ApiContext {
    pub endpoint: String,
    pub method: String,
    /// Absent for network failures
    pub status_code: Option<u16>,
    pub request_id: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Optional request/response details for an API envelope
#[derive(Debug, Clone, Default)]
pub struct RequestDetails {
    pub request_body: Option<Value>,
    pub request_headers: Option<BTreeMap<String, String>>,
    pub query_params: Option<BTreeMap<String, String>>,
    pub path_params: Option<BTreeMap<String, String>>,
    pub response_body: Option<serde_json::Value>,
    pub response_headers: Option<BTreeMap<String, String>>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    pub correlation_id: Option<String>,
}

/// Builds report envelopes from contexts plus the ambient environment
#[derive(Clone)]
pub struct MetadataBuilder {
    config: Arc<PipelineConfig>,
    environment: Arc<dyn EnvironmentSource>,
    session: Arc<ReportingSession>,
}

impl MetadataBuilder {
    pub fn new(
        config: Arc<PipelineConfig>,
        environment: Arc<dyn EnvironmentSource>,
        session: Arc<ReportingSession>,
    ) -> Self {
        Self {
            config,
            environment,
            session,
        }
    }

    pub fn session(&self) -> &Arc<ReportingSession> {
        &self.session
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Environment tags and contexts with the caller's overlays on top
    pub fn build_base_envelope(
        &self,
        level: Level,
        tags: Tags,
        contexts: Contexts,
        user: Option<ReportUser>,
    ) -> ErrorReportEnvelope {
        let env = self.environment.snapshot();
        let browser = env.browser();
        let session = self.session.info();
        let config = &self.config;
        let now = Utc::now();

        let mut envelope = ErrorReportEnvelope::new(level);
        let base_tags = [
            ("environment", config.environment.clone()),
            ("timestamp", now.to_rfc3339()),
            ("app.version", config.app_version.clone()),
            ("app.buildHash", config.build_hash.clone()),
            ("browser.name", browser.browser_name),
            ("browser.version", browser.browser_version),
            ("os.name", browser.os_name),
            ("os.version", browser.os_version),
            ("device.type", browser.device_type.as_str().to_string()),
            (
                "device.memory",
                env.device_memory
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| markers::UNKNOWN.to_string()),
            ),
            (
                "connection.type",
                env.connection_type
                    .clone()
                    .unwrap_or_else(|| markers::UNKNOWN.to_string()),
            ),
            ("screen.resolution", format!("{}x{}", env.screen.0, env.screen.1)),
            ("viewport.size", format!("{}x{}", env.viewport.0, env.viewport.1)),
        ];
        envelope
            .tags
            .extend(base_tags.into_iter().map(|(k, v)| (k.to_string(), v)));
        envelope.tags.extend(tags);

        let loc = &env.location;
        envelope.contexts.insert(
            "runtime".into(),
            object(json!({ "name": "browser", "version": env.user_agent })),
        );
        envelope.contexts.insert(
            "app".into(),
            object(json!({
                "app_start_time": env.time_origin.to_rfc3339(),
                "build_type": config.environment,
                "version": config.app_version,
                "buildTime": config.build_time,
                "buildHash": config.build_hash,
            })),
        );
        envelope.contexts.insert(
            "page_context".into(),
            object(json!({
                "pathname": loc.pathname,
                "search": loc.search,
                "hash": loc.hash,
                "referrer": loc.referrer,
                "title": loc.title,
                "scrollPosition": format!("{},{}", loc.scroll_x, loc.scroll_y),
                "loadTime": env.uptime_ms(),
            })),
        );
        envelope.contexts.insert(
            "session_context".into(),
            object(json!({
                "id": session.id,
                "startTime": session.start_time.to_rfc3339(),
                "pageViews": session.page_views,
            })),
        );
        envelope.contexts.extend(contexts);

        envelope.extra = object(json!({
            "url": loc.href,
            "referrer": loc.referrer,
            "timestamp": now.timestamp_millis(),
            "userAgent": env.user_agent,
            "language": env.language,
            "timezone": env.timezone,
            "cookieEnabled": env.cookie_enabled,
            "onLine": env.online,
        }));
        envelope.user = user;
        envelope
    }

    /// Envelope for a failure inside a component action
    pub fn build_component_context(
        &self,
        ctx: &ComponentContext,
        level: Level,
        user: Option<ReportUser>,
    ) -> ErrorReportEnvelope {
        let mut tags = component_tags(ctx);
        tags.insert("errorType".into(), "component".into());

        let mut contexts = Contexts::new();
        contexts.insert("component".into(), component_snapshot(ctx));

        let mut envelope = self.build_base_envelope(level, tags, contexts, user);
        envelope.fingerprint = vec![
            "component-error".to_string(),
            ctx.component_name.clone(),
            ctx.feature.clone(),
            ctx.action.clone(),
        ];
        envelope
    }

    /// Envelope for an informational component message
    pub fn build_component_info(
        &self,
        ctx: &ComponentContext,
        level: Level,
        user: Option<ReportUser>,
    ) -> ErrorReportEnvelope {
        let mut tags = component_tags(ctx);
        tags.insert("logType".into(), "component-info".into());
        tags.insert("category".into(), "user-action".into());

        let mut contexts = Contexts::new();
        contexts.insert("componentInfo".into(), component_snapshot(ctx));

        let mut envelope = self.build_base_envelope(level, tags, contexts, user);
        envelope.fingerprint = vec![
            "component-info".to_string(),
            ctx.component_name.clone(),
            ctx.feature.clone(),
            ctx.action.clone(),
        ];
        envelope
    }

    /// Envelope for a violated business rule
    pub fn build_business_context(
        &self,
        ctx: &BusinessContext,
        level: Level,
        user: Option<ReportUser>,
    ) -> ErrorReportEnvelope {
        self.business_envelope(ctx, level, user, BusinessFlavor::Error)
    }

    /// Envelope for an informational business-rule message
    pub fn build_business_info(
        &self,
        ctx: &BusinessContext,
        level: Level,
        user: Option<ReportUser>,
    ) -> ErrorReportEnvelope {
        self.business_envelope(ctx, level, user, BusinessFlavor::Info)
    }

    fn business_envelope(
        &self,
        ctx: &BusinessContext,
        level: Level,
        user: Option<ReportUser>,
        flavor: BusinessFlavor,
    ) -> ErrorReportEnvelope {
        let (context_name, fingerprint_head) = match flavor {
            BusinessFlavor::Error => ("businessLogic", "business-logic-error"),
            BusinessFlavor::Info => ("businessLogicInfo", "business-logic-info"),
        };

        let mut tags = Tags::new();
        tags.insert("businessRule".into(), ctx.business_rule.clone());
        match flavor {
            BusinessFlavor::Error => {
                tags.insert("errorType".into(), "business-logic".into());
            }
            BusinessFlavor::Info => {
                tags.insert("logType".into(), "business-logic-info".into());
                tags.insert("category".into(), "business-validation".into());
            }
        }

        let inputs = summarize(&ctx.input_values);
        let mut contexts = Contexts::new();
        contexts.insert(
            context_name.into(),
            object(json!({
                "rule": ctx.business_rule,
                "inputValues": inputs,
                "expectedBehavior": ctx.expected_behavior,
                "actualBehavior": ctx.actual_behavior,
            })),
        );

        let mut envelope = self.build_base_envelope(level, tags, contexts, user);
        envelope.fingerprint = vec![fingerprint_head.to_string(), ctx.business_rule.clone()];
        envelope.extra.insert("inputValues".into(), inputs);
        envelope
            .extra
            .insert("expectedBehavior".into(), json!(ctx.expected_behavior));
        envelope
            .extra
            .insert("actualBehavior".into(), json!(ctx.actual_behavior));
        envelope
    }

    /// Envelope for a failed API call, with sensitive values redacted
    pub fn build_api_context(
        &self,
        ctx: &ApiContext,
        level: Level,
        user: Option<ReportUser>,
        details: Option<&RequestDetails>,
    ) -> ErrorReportEnvelope {
        let url_info = parse_endpoint(&self.config.page_origin, &ctx.endpoint);
        let category = api_category(&ctx.endpoint);
        let status = ctx
            .status_code
            .map(|s| s.to_string())
            .unwrap_or_else(|| markers::UNKNOWN.to_string());
        let default_details = RequestDetails::default();
        let details = details.unwrap_or(&default_details);
        let query_summary = summarize(&string_map_value(&url_info.params));

        let mut tags = Tags::new();
        tags.insert("endpoint".into(), url_info.redacted.clone());
        tags.insert("httpMethod".into(), ctx.method.clone());
        tags.insert("statusCode".into(), status.clone());
        tags.insert("errorType".into(), "api".into());
        tags.insert("apiCategory".into(), category.to_string());
        tags.insert("errorSeverity".into(), error_severity(ctx.status_code).to_string());
        tags.insert(
            "retryable".into(),
            if is_retryable(ctx.status_code) { "yes" } else { "no" }.to_string(),
        );

        let now = Utc::now().to_rfc3339();
        let mut contexts = Contexts::new();
        contexts.insert(
            "api".into(),
            object(json!({
                "endpoint": url_info.redacted,
                "method": ctx.method,
                "statusCode": ctx.status_code,
                "requestId": ctx.request_id,
                "responseTime": ctx.response_time_ms,
                "urlPath": url_info.pathname,
                "queryString": url_info.search,
                "queryParams": query_summary,
            })),
        );
        contexts.insert(
            "request".into(),
            object(json!({
                "headers": details.request_headers.as_ref().map(|h| summarize(&string_map_value(&sanitize_headers(h)))),
                "body": details.request_body.as_ref().map(summarize),
                "queryParams": details.query_params.as_ref().map(|q| summarize(&string_map_value(&sanitize_params(q)))),
                "pathParams": details.path_params.as_ref().map(|p| summarize(&string_map_value(p))),
                "userAgent": details.user_agent.clone().unwrap_or_else(|| self.environment.snapshot().user_agent),
                "timestamp": now,
            })),
        );
        contexts.insert(
            "response".into(),
            object(json!({
                "headers": details.response_headers.as_ref().map(|h| summarize(&string_map_value(&sanitize_headers(h)))),
                "body": details.response_body.as_ref().map(|b| {
                    summarize(&Value::from(truncate_body(b, self.config.response_body_limit)))
                }),
                "timestamp": now,
            })),
        );
        contexts.insert(
            "tracing".into(),
            object(json!({
                "traceId": details.trace_id,
                "correlationId": details.correlation_id,
                "sessionId": details.session_id.clone().unwrap_or_else(|| self.session.info().id),
                "requestSequence": self.session.next_request_sequence(),
            })),
        );

        let mut envelope = self.build_base_envelope(level, tags, contexts, user);
        envelope.fingerprint = vec![
            "api-error".to_string(),
            category.to_string(),
            ctx.method.clone(),
            url_info.pathname.clone(),
            status,
        ];

        let status_code = ctx.status_code;
        let api_extra = json!({
            "apiEndpoint": url_info.redacted,
            "httpMethod": ctx.method,
            "statusCode": status_code,
            "requestId": ctx.request_id,
            "responseTime": ctx.response_time_ms,
            "queryParams": query_summary,
            "isTimeout": ctx.response_time_ms.is_some_and(|t| t > timing::API_TIMEOUT_MS),
            "isNetworkError": status_code.is_none(),
            "isServerError": status_code.is_some_and(|s| s >= 500),
            "isClientError": status_code.is_some_and(|s| (400..500).contains(&s)),
            "suggestedAction": suggested_action(status_code),
            "affectedFeatures": affected_features(&ctx.endpoint),
        });
        envelope.extra.extend(object(api_extra));
        envelope
    }
}

enum BusinessFlavor {
    Error,
    Info,
}

fn component_tags(ctx: &ComponentContext) -> Tags {
    let mut tags = Tags::new();
    tags.insert("component".into(), ctx.component_name.clone());
    tags.insert("feature".into(), ctx.feature.clone());
    tags.insert("action".into(), ctx.action.clone());
    tags
}

fn component_snapshot(ctx: &ComponentContext) -> Map<String, serde_json::Value> {
    object(json!({
        "name": ctx.component_name,
        "feature": ctx.feature,
        "action": ctx.action,
        "props": ctx.props.as_ref().map(summarize),
        "state": ctx.state.as_ref().map(summarize),
    }))
}

fn object(value: serde_json::Value) -> Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn string_map_value(map: &BTreeMap<String, String>) -> Value {
    Value::object(map.iter().map(|(k, v)| (k.clone(), v.clone())))
}

/// Endpoint split into path, query string and redacted query parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointInfo {
    /// The endpoint with sensitive query values replaced
    pub redacted: String,
    pub pathname: String,
    /// Redacted query string including the leading `?`, or empty
    pub search: String,
    pub params: BTreeMap<String, String>,
}

static SENSITIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)password|token|key|secret|authorization").expect("valid sensitive-name regex")
});

/// Whether a header or parameter name carries a secret
pub fn is_sensitive_name(name: &str) -> bool {
    SENSITIVE_NAME.is_match(name)
}

/// Resolve an endpoint against the page origin and redact its query
///
/// Unparseable endpoints keep their raw path; the query is still split out
/// and redacted so no secret value survives.
pub fn parse_endpoint(origin: &str, endpoint: &str) -> EndpointInfo {
    let base = endpoint.split(['?', '#']).next().unwrap_or(endpoint);
    let parsed = Url::parse(endpoint)
        .or_else(|_| Url::parse(origin).and_then(|url| url.join(endpoint)));
    let (pathname, pairs) = match parsed {
        Ok(url) => (url.path().to_string(), redact_pairs(url.query_pairs())),
        Err(e) => {
            log::debug!("Could not parse endpoint path {:?}: {}", base, e);
            let query = endpoint
                .split_once('?')
                .map(|(_, rest)| rest.split('#').next().unwrap_or(rest))
                .unwrap_or("");
            (
                base.to_string(),
                redact_pairs(url::form_urlencoded::parse(query.as_bytes())),
            )
        }
    };
    let search = if pairs.is_empty() {
        String::new()
    } else {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        format!("?{}", query)
    };
    EndpointInfo {
        redacted: format!("{}{}", base, search),
        pathname,
        search,
        params: pairs.into_iter().collect(),
    }
}

fn redact_pairs<'a>(
    pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
) -> Vec<(String, String)> {
    pairs
        .map(|(k, v)| {
            let value = if is_sensitive_name(&k) {
                markers::REDACTED.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect()
}

/// Replace the values of sensitive query parameters
pub fn sanitize_params(params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            let value = if is_sensitive_name(k) {
                markers::REDACTED.to_string()
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

/// Replace the values of sensitive headers, cookies included
pub fn sanitize_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            let value = if is_sensitive_name(k) || k.eq_ignore_ascii_case("cookie") {
                markers::REDACTED.to_string()
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

/// Cap a response body at `limit` characters
pub fn truncate_body(body: &serde_json::Value, limit: usize) -> serde_json::Value {
    let text = match body {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let length = text.chars().count();
    if length <= limit {
        return body.clone();
    }
    let kept: String = text.chars().take(limit).collect();
    json!({
        "truncated": true,
        "originalLength": length,
        "data": format!("{}{}", kept, markers::TRUNCATED),
    })
}

pub fn api_category(endpoint: &str) -> &'static str {
    if endpoint.contains("/auth/") {
        "authentication"
    } else if endpoint.contains("/user/") {
        "user-management"
    } else if endpoint.contains("/payment/") {
        "payment"
    } else if endpoint.contains("/order/") {
        "order"
    } else if endpoint.contains("/product/") {
        "product"
    } else {
        "general"
    }
}

pub fn error_severity(status: Option<u16>) -> &'static str {
    match status {
        None => "critical",
        Some(s) if s >= 500 => "critical",
        Some(401) | Some(403) => "high",
        Some(404) => "medium",
        Some(s) if s >= 400 => "low",
        Some(_) => "info",
    }
}

pub fn is_retryable(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(s) => matches!(s, 408 | 429 | 500 | 502 | 503 | 504),
    }
}

fn suggested_action(status: Option<u16>) -> &'static str {
    match status {
        None => "Check network connection",
        Some(401) => "Re-authenticate user",
        Some(403) => "Check user permissions",
        Some(404) => "Verify API endpoint",
        Some(429) => "Implement rate limiting",
        Some(s) if s >= 500 => "Check server status",
        Some(_) => "Review request parameters",
    }
}

fn affected_features(endpoint: &str) -> Vec<&'static str> {
    let mut features = Vec::new();
    if endpoint.contains("/auth/") {
        features.extend(["login", "logout", "registration"]);
    }
    if endpoint.contains("/user/") {
        features.extend(["profile", "settings"]);
    }
    if endpoint.contains("/payment/") {
        features.extend(["checkout", "billing"]);
    }
    if endpoint.contains("/order/") {
        features.extend(["shopping-cart", "order-history"]);
    }
    features
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::environment::{AmbientEnvironment, StaticEnvironment};

    pub(crate) fn test_builder() -> MetadataBuilder {
        test_builder_with(PipelineConfig::default())
    }

    pub(crate) fn test_builder_with(config: PipelineConfig) -> MetadataBuilder {
        let env = AmbientEnvironment {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Chrome/126.0.0.0 Safari/537.36"
                .to_string(),
            screen: (1920, 1080),
            viewport: (1280, 720),
            ..Default::default()
        };
        let session = ReportingSession::start(config.dedup_window());
        MetadataBuilder::new(
            Arc::new(config),
            Arc::new(StaticEnvironment(env)),
            Arc::new(session),
        )
    }

    #[test]
    fn test_base_envelope_tags() {
        let builder = test_builder();
        let envelope = builder.build_base_envelope(Level::Error, Tags::new(), Contexts::new(), None);
        assert_eq!(envelope.tag("environment"), Some("development"));
        assert_eq!(envelope.tag("browser.name"), Some("Chrome"));
        assert_eq!(envelope.tag("os.name"), Some("Linux"));
        assert_eq!(envelope.tag("screen.resolution"), Some("1920x1080"));
        assert_eq!(envelope.tag("viewport.size"), Some("1280x720"));
        assert_eq!(envelope.tag("device.memory"), Some("unknown"));
        assert!(envelope.context("session_context").unwrap()["id"]
            .as_str()
            .unwrap()
            .starts_with("session_"));
    }

    #[test]
    fn test_caller_overlay_wins() {
        let builder = test_builder();
        let mut tags = Tags::new();
        tags.insert("environment".into(), "staging".into());
        let envelope = builder.build_base_envelope(Level::Info, tags, Contexts::new(), None);
        assert_eq!(envelope.tag("environment"), Some("staging"));
    }

    #[test]
    fn test_component_envelope() {
        let builder = test_builder();
        let ctx = ComponentContext::new("Home", "counter", "incrementCount")
            .with_state(serde_json::json!({"count": 3, "darkMode": false}));
        let envelope = builder.build_component_context(&ctx, Level::Error, None);

        assert_eq!(envelope.tag("component"), Some("Home"));
        assert_eq!(envelope.tag("errorType"), Some("component"));
        assert_eq!(
            envelope.fingerprint,
            vec!["component-error", "Home", "counter", "incrementCount"]
        );
        let component = envelope.context("component").unwrap();
        assert_eq!(component["state"]["count"], 3);
        assert!(component["props"].is_null());
    }

    #[test]
    fn test_business_envelope() {
        let builder = test_builder();
        let ctx = BusinessContext {
            input_values: Value::object([("currentCount", 10)]),
            expected_behavior: "count stays within bounds".into(),
            ..BusinessContext::new("counter-limits")
        };
        let envelope = builder.build_business_context(&ctx, Level::Warning, None);
        assert_eq!(envelope.fingerprint, vec!["business-logic-error", "counter-limits"]);
        assert_eq!(envelope.tag("businessRule"), Some("counter-limits"));
        assert_eq!(envelope.context("businessLogic").unwrap()["inputValues"]["currentCount"], 10);
        assert_eq!(envelope.extra["expectedBehavior"], "count stays within bounds");

        let info = builder.build_business_info(&ctx, Level::Info, None);
        assert_eq!(info.fingerprint[0], "business-logic-info");
        assert_eq!(info.tag("category"), Some("business-validation"));
        assert!(info.context("businessLogicInfo").is_some());
    }

    #[test]
    fn test_api_envelope_redacts_secrets() {
        let builder = test_builder();
        let ctx = ApiContext {
            endpoint: "/api/auth/login?token=tok-4711&page=2".into(),
            method: "POST".into(),
            status_code: Some(401),
            ..Default::default()
        };
        let details = RequestDetails {
            request_headers: Some(BTreeMap::from([
                ("Authorization".to_string(), "Bearer x".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ])),
            ..Default::default()
        };
        let envelope = builder.build_api_context(&ctx, Level::Error, None, Some(&details));

        let api = envelope.context("api").unwrap();
        assert_eq!(api["queryParams"]["token"], "[FILTERED]");
        assert_eq!(api["queryParams"]["page"], "2");
        assert_eq!(api["urlPath"], "/api/auth/login");
        let request = envelope.context("request").unwrap();
        assert_eq!(request["headers"]["Authorization"], "[FILTERED]");
        assert_eq!(request["headers"]["Accept"], "application/json");

        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains("Bearer x"));
        assert!(!text.contains("tok-4711"));
        assert_eq!(
            envelope.tag("endpoint"),
            Some("/api/auth/login?token=%5BFILTERED%5D&page=2")
        );

        assert_eq!(envelope.tag("apiCategory"), Some("authentication"));
        assert_eq!(envelope.tag("errorSeverity"), Some("high"));
        assert_eq!(envelope.tag("retryable"), Some("no"));
        assert_eq!(
            envelope.fingerprint,
            vec!["api-error", "authentication", "POST", "/api/auth/login", "401"]
        );
    }

    #[test]
    fn test_unparseable_endpoint_still_redacted() {
        let builder = test_builder();
        let ctx = ApiContext {
            endpoint: "http://exa mple.com/api/login?token=SECRET-4711&page=2#top".into(),
            method: "POST".into(),
            status_code: Some(500),
            ..Default::default()
        };
        let envelope = builder.build_api_context(&ctx, Level::Error, None, None);

        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains("SECRET-4711"));
        assert_eq!(
            envelope.tag("endpoint"),
            Some("http://exa mple.com/api/login?token=%5BFILTERED%5D&page=2")
        );
        let api = envelope.context("api").unwrap();
        assert_eq!(api["queryParams"]["token"], "[FILTERED]");
        assert_eq!(api["queryParams"]["page"], "2");
        assert_eq!(api["urlPath"], "http://exa mple.com/api/login");
        assert_eq!(envelope.extra["apiEndpoint"], api["endpoint"]);
    }

    #[test]
    fn test_relative_endpoint_with_bad_origin() {
        let info = parse_endpoint("localhost:3000", "/api/user/42?api_key=k-1");
        assert_eq!(info.pathname, "/api/user/42");
        assert_eq!(info.search, "?api_key=%5BFILTERED%5D");
        assert_eq!(info.params["api_key"], "[FILTERED]");
        assert!(!info.redacted.contains("k-1"));
    }

    #[test]
    fn test_explicit_query_params_redacted() {
        let builder = test_builder();
        let ctx = ApiContext {
            endpoint: "/api/items".into(),
            method: "GET".into(),
            status_code: Some(400),
            ..Default::default()
        };
        let details = RequestDetails {
            query_params: Some(BTreeMap::from([
                ("token".to_string(), "abc".to_string()),
                ("page".to_string(), "3".to_string()),
            ])),
            ..Default::default()
        };
        let envelope = builder.build_api_context(&ctx, Level::Error, None, Some(&details));

        let request = envelope.context("request").unwrap();
        assert_eq!(request["queryParams"]["token"], "[FILTERED]");
        assert_eq!(request["queryParams"]["page"], "3");
        assert!(!serde_json::to_string(&envelope).unwrap().contains("\"abc\""));
    }

    #[test]
    fn test_api_sequence_increases() {
        let builder = test_builder();
        let ctx = ApiContext {
            endpoint: "/api/items".into(),
            method: "GET".into(),
            ..Default::default()
        };
        let first = builder.build_api_context(&ctx, Level::Error, None, None);
        let second = builder.build_api_context(&ctx, Level::Error, None, None);
        let seq = |e: &ErrorReportEnvelope| e.context("tracing").unwrap()["requestSequence"].as_u64().unwrap();
        assert!(seq(&second) > seq(&first));
        assert_eq!(first.tag("statusCode"), Some("unknown"));
        assert_eq!(first.extra["isNetworkError"], true);
        assert_eq!(first.fingerprint[4], "unknown");
    }

    #[test]
    fn test_severity_and_retry_classification() {
        assert_eq!(error_severity(None), "critical");
        assert_eq!(error_severity(Some(503)), "critical");
        assert_eq!(error_severity(Some(403)), "high");
        assert_eq!(error_severity(Some(404)), "medium");
        assert_eq!(error_severity(Some(422)), "low");
        assert!(is_retryable(None));
        assert!(is_retryable(Some(429)));
        assert!(!is_retryable(Some(404)));
    }

    #[test]
    fn test_truncate_body() {
        let long = serde_json::Value::String("x".repeat(1500));
        let truncated = truncate_body(&long, 1000);
        assert_eq!(truncated["truncated"], true);
        assert_eq!(truncated["originalLength"], 1500);
        assert!(truncated["data"].as_str().unwrap().ends_with("...[TRUNCATED]"));

        let short = serde_json::json!({"ok": true});
        assert_eq!(truncate_body(&short, 1000), short);
    }

    #[test]
    fn test_sensitive_names() {
        assert!(is_sensitive_name("X-API-Key"));
        assert!(is_sensitive_name("access_token"));
        assert!(is_sensitive_name("PASSWORD"));
        assert!(!is_sensitive_name("page"));
        let headers = BTreeMap::from([("Cookie".to_string(), "sid=1".to_string())]);
        assert_eq!(sanitize_headers(&headers)["Cookie"], "[FILTERED]");
    }
}
