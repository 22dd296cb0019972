//! The evaluation-context builder (§3, §4.4).
//!
//! Flattens the Subject, Resource record, Action, Environment, and custom
//! request bag into a single attribute map keyed `<scope>:<name>`, with a
//! nested mirror addressable as `<scope>.<path>` for dot-notation lookups.
//! Grounded on `octofhir-auth`'s `PolicyContextBuilder` builder pattern in
//! `policy/context.rs`, generalized away from FHIR/SMART scopes toward the
//! derived environment attributes this specification requires.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use time::OffsetDateTime;

use crate::error::{PdpError, PdpResult};
use crate::policy::subject::Subject;
use crate::policy::value::Value;

/// Raw environment inputs supplied by the caller (§6: the `environment?`
/// field of the decision request).
#[derive(Debug, Clone, Default)]
pub struct EnvironmentInput {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

/// A resource record as fetched from storage (§3).
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub path: Option<String>,
    pub parent_id: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

/// The flat map the condition evaluator reads, plus its nested mirror.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    flat: BTreeMap<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        EvaluationContext {
            flat: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.flat.insert(key.into(), value);
    }

    /// Merges `attrs` under `scope:<name>` and mirrors them under a nested
    /// `scope` map addressable via `scope.<name>` (§4.4).
    pub fn merge_scope(&mut self, scope: &str, attrs: &BTreeMap<String, Value>) {
        let mut nested = BTreeMap::new();
        for (name, value) in attrs {
            self.flat.insert(format!("{scope}:{name}"), value.clone());
            nested.insert(name.clone(), value.clone());
        }
        self.flat.insert(scope.to_string(), Value::Map(nested));
    }

    /// Looks up a key in either `scope:name` or `scope.name` form.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.flat.get(key) {
            return Some(value);
        }
        if let Some(dot_pos) = key.find('.') {
            let colon_form = format!("{}:{}", &key[..dot_pos], &key[dot_pos + 1..]);
            return self.flat.get(&colon_form);
        }
        if let Some(colon_pos) = key.find(':') {
            let dot_form = format!("{}.{}", &key[..colon_pos], &key[colon_pos + 1..]);
            return self.flat.get(&dot_form);
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replaces every `${scope:key}`/`${scope.key}` occurrence in `text`
    /// with the stringified context value; missing keys expand to empty
    /// string (§3, §4.3, §4.5).
    pub fn substitute(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let key = &after[..end];
                    let replacement = self.get(key).map(Value::coerce_to_string).unwrap_or_default();
                    result.push_str(&replacement);
                    rest = &after[end + 1..];
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                    break;
                }
            }
        }
        result.push_str(rest);
        result
    }
}

/// Builds an [`EvaluationContext`] per request (§4.4).
pub struct ContextBuilder<'a> {
    subject: &'a dyn Subject,
    action: &'a str,
    resource_id: &'a str,
    resource: Option<&'a ResourceRecord>,
    environment: Option<&'a EnvironmentInput>,
    timestamp: Option<OffsetDateTime>,
    custom_context: BTreeMap<String, Value>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(subject: &'a dyn Subject, action: &'a str, resource_id: &'a str) -> Self {
        ContextBuilder {
            subject,
            action,
            resource_id,
            resource: None,
            environment: None,
            timestamp: None,
            custom_context: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, resource: &'a ResourceRecord) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_environment(mut self, environment: &'a EnvironmentInput) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_custom_context(mut self, context: BTreeMap<String, Value>) -> Self {
        self.custom_context = context;
        self
    }

    pub fn build(self) -> PdpResult<EvaluationContext> {
        let mut ctx = EvaluationContext::new();
        let now = self.timestamp.unwrap_or_else(|| {
            OffsetDateTime::now_utc()
        });

        ctx.merge_scope("user", &self.subject.attributes());

        ctx.insert("action", Value::String(self.action.to_string()));
        let mut action_scope = BTreeMap::new();
        action_scope.insert("name".to_string(), Value::String(self.action.to_string()));
        ctx.merge_scope("action", &action_scope);

        if let Some(resource) = self.resource {
            let mut attrs = resource.attributes.clone();
            attrs.insert("id".to_string(), Value::String(resource.id.clone()));
            attrs.insert("resource_type".to_string(), Value::String(resource.resource_type.clone()));
            attrs.insert("resource_id".to_string(), Value::String(resource.resource_id.clone()));
            if let Some(path) = &resource.path {
                attrs.insert("path".to_string(), Value::String(path.clone()));
            }
            if let Some(parent_id) = &resource.parent_id {
                attrs.insert("parent_id".to_string(), Value::String(parent_id.clone()));
            }
            ctx.merge_scope("resource", &attrs);
        }

        let environment_attrs = build_environment_attributes(self.environment, now);
        ctx.merge_scope("environment", &environment_attrs);

        // Only inserted when non-empty, so the required-keys check below is
        // a real validation rather than one the preceding lines can never
        // fail: a caller driving `ContextBuilder` directly (outside
        // `PolicyDecisionPoint::evaluate`, which validates these same three
        // fields before it ever constructs a builder) can still hand us an
        // empty action, resource id, or subject id.
        if !self.action.is_empty() {
            ctx.insert("request:Action", Value::String(self.action.to_string()));
        }
        if !self.resource_id.is_empty() {
            ctx.insert("request:ResourceId", Value::String(self.resource_id.to_string()));
        }
        if !self.subject.id().is_empty() {
            ctx.insert("request:UserId", Value::String(self.subject.id().to_string()));
        }
        ctx.insert(
            "request:Time",
            Value::String(now.format(&time::format_description::well_known::Rfc3339).unwrap_or_default()),
        );
        for (key, value) in &self.custom_context {
            ctx.insert(format!("request:{key}"), value.clone());
        }

        if !ctx.contains_key("request:Action")
            || !ctx.contains_key("request:ResourceId")
            || !ctx.contains_key("request:UserId")
        {
            return Err(PdpError::invalid_request("invalid context: missing required request keys"));
        }

        Ok(ctx)
    }
}

const INTERNAL_RANGES: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "127.0.0.0/8"];
const MOBILE_UA_MARKERS: &[&str] = &["Mobi", "Android", "iPhone", "iPad", "iPod"];

fn build_environment_attributes(
    environment: Option<&EnvironmentInput>,
    now: OffsetDateTime,
) -> BTreeMap<String, Value> {
    let mut attrs = BTreeMap::new();

    attrs.insert(
        "time_of_day".to_string(),
        Value::String(format!("{:02}:{:02}", now.hour(), now.minute())),
    );
    attrs.insert("hour".to_string(), Value::Number(now.hour() as f64));
    attrs.insert("minute".to_string(), Value::Number(now.minute() as f64));

    let weekday = now.weekday();
    let day_name = weekday_name(weekday);
    attrs.insert("day_of_week".to_string(), Value::String(day_name.to_string()));

    let is_weekend = matches!(weekday, time::Weekday::Saturday | time::Weekday::Sunday);
    attrs.insert("is_weekend".to_string(), Value::Bool(is_weekend));

    let is_business_hours = !is_weekend && now.hour() >= 9 && now.hour() < 17;
    attrs.insert("is_business_hours".to_string(), Value::Bool(is_business_hours));

    if let Some(environment) = environment {
        for (key, value) in &environment.attributes {
            attrs.insert(key.clone(), value.clone());
        }

        if let Some(client_ip) = &environment.client_ip {
            attrs.insert("client_ip".to_string(), Value::String(client_ip.clone()));
            let parsed: Option<IpAddr> = client_ip.parse().ok();
            let is_internal = parsed
                .map(|ip| {
                    INTERNAL_RANGES
                        .iter()
                        .filter_map(|cidr| cidr.parse::<IpNetwork>().ok())
                        .any(|network| network.contains(ip))
                })
                .unwrap_or(false);
            attrs.insert("is_internal_ip".to_string(), Value::Bool(is_internal));
            let ip_class = match parsed {
                Some(IpAddr::V4(_)) => "ipv4",
                Some(IpAddr::V6(_)) => "ipv6",
                None => "",
            };
            attrs.insert("ip_class".to_string(), Value::String(ip_class.to_string()));
        }

        if let Some(user_agent) = &environment.user_agent {
            let is_mobile = MOBILE_UA_MARKERS.iter().any(|marker| user_agent.contains(marker));
            attrs.insert("is_mobile".to_string(), Value::Bool(is_mobile));
            attrs.insert("browser".to_string(), Value::String(detect_browser(user_agent)));
        }

        if let Some(country) = &environment.country {
            attrs.insert("country".to_string(), Value::String(country.clone()));
        }
        if let Some(region) = &environment.region {
            attrs.insert("region".to_string(), Value::String(region.clone()));
        }
    }

    attrs
}

fn weekday_name(weekday: time::Weekday) -> &'static str {
    match weekday {
        time::Weekday::Monday => "Monday",
        time::Weekday::Tuesday => "Tuesday",
        time::Weekday::Wednesday => "Wednesday",
        time::Weekday::Thursday => "Thursday",
        time::Weekday::Friday => "Friday",
        time::Weekday::Saturday => "Saturday",
        time::Weekday::Sunday => "Sunday",
    }
}

fn detect_browser(user_agent: &str) -> String {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("edg") {
        "edge"
    } else if ua.contains("opr") || ua.contains("opera") {
        "opera"
    } else if ua.contains("chrome") {
        "chrome"
    } else if ua.contains("firefox") {
        "firefox"
    } else if ua.contains("safari") {
        "safari"
    } else {
        "unknown"
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::subject::UserSubject;

    #[test]
    fn test_substitute_replaces_known_key() {
        let mut ctx = EvaluationContext::new();
        ctx.insert("request:UserId", Value::String("user-123".to_string()));
        assert_eq!(ctx.substitute("api:doc:owner:${request:UserId}/*"), "api:doc:owner:user-123/*");
    }

    #[test]
    fn test_substitute_missing_key_expands_empty() {
        let ctx = EvaluationContext::new();
        assert_eq!(ctx.substitute("prefix-${missing:key}-suffix"), "prefix--suffix");
    }

    #[test]
    fn test_dot_and_colon_addressing_are_equivalent() {
        let mut ctx = EvaluationContext::new();
        let mut attrs = BTreeMap::new();
        attrs.insert("department".to_string(), Value::String("finance".to_string()));
        ctx.merge_scope("user", &attrs);
        assert_eq!(ctx.get("user:department"), ctx.get("user.department"));
    }

    #[test]
    fn test_build_populates_required_request_keys() {
        let subject = UserSubject::new("user-123", "Alice");
        let ctx = ContextBuilder::new(&subject, "doc:file:read", "api:doc:42")
            .build()
            .unwrap();
        assert_eq!(ctx.get("request:UserId"), Some(&Value::String("user-123".to_string())));
        assert_eq!(ctx.get("request:Action"), Some(&Value::String("doc:file:read".to_string())));
        assert_eq!(ctx.get("request:ResourceId"), Some(&Value::String("api:doc:42".to_string())));
    }

    #[test]
    fn test_internal_ip_flag() {
        let subject = UserSubject::new("u1", "Alice");
        let env = EnvironmentInput {
            client_ip: Some("10.1.2.3".to_string()),
            ..Default::default()
        };
        let ctx = ContextBuilder::new(&subject, "a:b:c", "r:s:t")
            .with_environment(&env)
            .build()
            .unwrap();
        assert_eq!(ctx.get("environment:is_internal_ip"), Some(&Value::Bool(true)));

        let env = EnvironmentInput {
            client_ip: Some("8.8.8.8".to_string()),
            ..Default::default()
        };
        let ctx = ContextBuilder::new(&subject, "a:b:c", "r:s:t")
            .with_environment(&env)
            .build()
            .unwrap();
        assert_eq!(ctx.get("environment:is_internal_ip"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_business_hours_monday_afternoon() {
        let subject = UserSubject::new("u1", "Alice");
        let timestamp = time::macros::datetime!(2024-01-15 14:00:00 UTC);
        let ctx = ContextBuilder::new(&subject, "a:b:c", "r:s:t")
            .with_timestamp(timestamp)
            .build()
            .unwrap();
        assert_eq!(ctx.get("environment:is_business_hours"), Some(&Value::Bool(true)));
        assert_eq!(ctx.get("environment:day_of_week"), Some(&Value::String("Monday".to_string())));

        let saturday = time::macros::datetime!(2024-01-20 14:00:00 UTC);
        let ctx = ContextBuilder::new(&subject, "a:b:c", "r:s:t")
            .with_timestamp(saturday)
            .build()
            .unwrap();
        assert_eq!(ctx.get("environment:is_business_hours"), Some(&Value::Bool(false)));
        assert_eq!(ctx.get("environment:is_weekend"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_mobile_and_browser_detection() {
        let subject = UserSubject::new("u1", "Alice");
        let env = EnvironmentInput {
            user_agent: Some("Mozilla/5.0 (iPhone; CPU iPhone OS) AppleWebKit Safari".to_string()),
            ..Default::default()
        };
        let ctx = ContextBuilder::new(&subject, "a:b:c", "r:s:t")
            .with_environment(&env)
            .build()
            .unwrap();
        assert_eq!(ctx.get("environment:is_mobile"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_build_rejects_empty_required_fields() {
        let subject = UserSubject::new("u1", "Alice");
        assert!(ContextBuilder::new(&subject, "", "r:s:t").build().is_err());
        assert!(ContextBuilder::new(&subject, "a:b:c", "").build().is_err());

        let anonymous = UserSubject::new("", "Anonymous");
        assert!(ContextBuilder::new(&anonymous, "a:b:c", "r:s:t").build().is_err());

        assert!(ContextBuilder::new(&subject, "a:b:c", "r:s:t").build().is_ok());
    }
}
