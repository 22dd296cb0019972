//! The condition evaluator (§4.5).
//!
//! A Condition is parsed once, at policy-load time, into a recursive tree —
//! `Cond = Prim(op, argMap) | All(list) | Any(list) | Neg(cond)` per §9 — and
//! evaluated without re-parsing on every request. Decoding is infallible: an
//! operator whose argument shape doesn't fit its family is kept as
//! [`ConditionBody::Malformed`] and degrades to `false` with a logged warning
//! at evaluation time, rather than rejecting the whole policy at load time
//! (§7: `MalformedPolicy` is a per-statement error, not a decode failure).
//!
//! The recursive tree shape is grounded on `gate0::condition::Condition`
//! (examples/Qarait-gate0), the closest available boolean-condition-tree
//! evaluator in the retrieval pack; this module does not reuse gate0's
//! per-operator missing-attribute semantics (`Equals`→false, `NotEquals`→true
//! on a missing key), which would contradict §4.5's rule that a missing key
//! is `nil`, coerced like any other value, for every operator uniformly.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};

use crate::config::ConditionLimitsConfig;
use crate::policy::cache::{glob_to_anchored_regex, RegexCache};
use crate::policy::context::EvaluationContext;
use crate::policy::value::Value;

/// One operator entry inside a Condition map (§4.5: "a map from operator
/// name → operator-args").
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionEntry {
    pub operator: String,
    pub body: ConditionBody,
}

/// The argument shape bound to an operator entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionBody {
    /// `map<contextKey, expected>` — the primitive-operator shape.
    Args(BTreeMap<String, Value>),
    /// `And`/`Or`: a list of nested condition maps.
    List(Vec<Condition>),
    /// `Not`: a single nested condition map.
    Single(Box<Condition>),
    /// The JSON shape didn't fit the operator's family; evaluates false.
    Malformed,
}

/// A recursive condition tree: the entries of one Condition map, implicitly
/// ANDed together (§4.5: "the Condition map is an implicit conjunction").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    pub entries: Vec<ConditionEntry>,
}

impl Condition {
    /// Evaluates the tree, enforcing the configured depth/key-count limits
    /// first (§4.5: "violations short-circuit to false and log a warning").
    pub fn evaluate(
        &self,
        ctx: &EvaluationContext,
        cache: &RegexCache,
        limits: &ConditionLimitsConfig,
        sid: Option<&str>,
    ) -> bool {
        let depth = self.depth();
        if depth > limits.max_depth {
            tracing::warn!(sid = ?sid, depth, limit = limits.max_depth, "condition nesting exceeds configured depth limit");
            return false;
        }
        let keys = self.key_count();
        if keys > limits.max_keys {
            tracing::warn!(sid = ?sid, keys, limit = limits.max_keys, "condition key count exceeds configured limit");
            return false;
        }
        self.conjunction(ctx, cache, sid)
    }

    fn conjunction(&self, ctx: &EvaluationContext, cache: &RegexCache, sid: Option<&str>) -> bool {
        self.entries.iter().all(|entry| entry.evaluate(ctx, cache, sid))
    }

    /// Non-recursive depth computation (gate0's dual-stack pattern), since a
    /// misbehaving client-supplied policy document must not be able to blow
    /// the native call stack before the depth limit itself is even checked.
    fn depth(&self) -> usize {
        let mut max_depth = 1usize;
        let mut stack: Vec<(&Condition, usize)> = vec![(self, 1)];
        while let Some((cond, d)) = stack.pop() {
            max_depth = max_depth.max(d);
            for entry in &cond.entries {
                match &entry.body {
                    ConditionBody::List(list) => {
                        for nested in list {
                            stack.push((nested, d + 1));
                        }
                    }
                    ConditionBody::Single(nested) => stack.push((nested, d + 1)),
                    ConditionBody::Args(_) | ConditionBody::Malformed => {}
                }
            }
        }
        max_depth
    }

    fn key_count(&self) -> usize {
        let mut count = 0usize;
        let mut stack: Vec<&Condition> = vec![self];
        while let Some(cond) = stack.pop() {
            for entry in &cond.entries {
                match &entry.body {
                    ConditionBody::Args(args) => count += args.len(),
                    ConditionBody::List(list) => stack.extend(list.iter()),
                    ConditionBody::Single(nested) => stack.push(nested),
                    ConditionBody::Malformed => {}
                }
            }
        }
        count
    }

    fn from_json_value(val: &serde_json::Value) -> Condition {
        let mut entries = Vec::new();
        if let serde_json::Value::Object(map) = val {
            for (op, body_val) in map {
                let body = match op.to_ascii_lowercase().as_str() {
                    "and" | "or" => match body_val {
                        serde_json::Value::Array(items) => {
                            ConditionBody::List(items.iter().map(Condition::from_json_value).collect())
                        }
                        serde_json::Value::Object(_) => ConditionBody::List(vec![Condition::from_json_value(body_val)]),
                        _ => ConditionBody::Malformed,
                    },
                    "not" => match body_val {
                        serde_json::Value::Object(_) => {
                            ConditionBody::Single(Box::new(Condition::from_json_value(body_val)))
                        }
                        serde_json::Value::Array(items) if items.len() == 1 => {
                            ConditionBody::Single(Box::new(Condition::from_json_value(&items[0])))
                        }
                        _ => ConditionBody::Malformed,
                    },
                    _ => match body_val {
                        serde_json::Value::Object(args_map) => ConditionBody::Args(
                            args_map
                                .iter()
                                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                                .collect(),
                        ),
                        _ => ConditionBody::Malformed,
                    },
                };
                entries.push(ConditionEntry {
                    operator: op.clone(),
                    body,
                });
            }
        }
        Condition { entries }
    }

    fn to_json_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for entry in &self.entries {
            let encoded = match &entry.body {
                ConditionBody::Args(args) => {
                    let mut m = serde_json::Map::new();
                    for (k, v) in args {
                        m.insert(k.clone(), value_to_json(v));
                    }
                    serde_json::Value::Object(m)
                }
                ConditionBody::List(list) => serde_json::Value::Array(list.iter().map(Condition::to_json_value).collect()),
                ConditionBody::Single(inner) => inner.to_json_value(),
                ConditionBody::Malformed => serde_json::Value::Null,
            };
            map.insert(entry.operator.clone(), encoded);
        }
        serde_json::Value::Object(map)
    }
}

impl ConditionEntry {
    fn evaluate(&self, ctx: &EvaluationContext, cache: &RegexCache, sid: Option<&str>) -> bool {
        let op_lower = self.operator.to_ascii_lowercase();
        match &self.body {
            ConditionBody::List(list) => match op_lower.as_str() {
                "and" => list.iter().all(|c| c.conjunction(ctx, cache, sid)),
                "or" => list.iter().any(|c| c.conjunction(ctx, cache, sid)),
                other => {
                    tracing::warn!(sid = ?sid, operator = other, "logical-shaped condition entry has unknown operator");
                    false
                }
            },
            ConditionBody::Single(inner) => match op_lower.as_str() {
                "not" => !inner.conjunction(ctx, cache, sid),
                other => {
                    tracing::warn!(sid = ?sid, operator = other, "single-nested condition entry has unknown operator");
                    false
                }
            },
            ConditionBody::Args(args) => match op_lower.as_str() {
                "numericbetween" => eval_numeric_between(args, ctx, sid, &self.operator),
                "arraysize" => eval_array_size(args, ctx, sid, &self.operator),
                "datebetween" => eval_moment_between(args, ctx, sid, &self.operator, coerce_to_moment),
                "timebetween" => eval_moment_between(args, ctx, sid, &self.operator, coerce_to_time_of_day_moment),
                other => generic_apply(other, args, ctx, cache),
            },
            ConditionBody::Malformed => {
                tracing::warn!(sid = ?sid, operator = %self.operator, "condition operator received arguments it cannot interpret");
                false
            }
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Condition::from_json_value(&raw))
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(m) => serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect()),
    }
}

/// Applies `${scope:key}` substitution to every string leaf of `value`
/// (§4.5: "substitution is textual over each element").
fn substitute_value(ctx: &EvaluationContext, value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(ctx.substitute(s)),
        Value::List(items) => Value::List(items.iter().map(|v| substitute_value(ctx, v)).collect()),
        Value::Map(m) => Value::Map(m.iter().map(|(k, v)| (k.clone(), substitute_value(ctx, v))).collect()),
        other => other.clone(),
    }
}

/// The generic primitive-operator shape (§4.5 family 1): conjunction over
/// `(contextKey, expected)` pairs, with disjunction across a list-valued
/// expected.
fn generic_apply(op_lower: &str, args: &BTreeMap<String, Value>, ctx: &EvaluationContext, cache: &RegexCache) -> bool {
    args.iter().all(|(key, raw_expected)| {
        let actual = ctx.get(key).cloned().unwrap_or(Value::Null);
        let expected = substitute_value(ctx, raw_expected);
        match &expected {
            Value::List(items) => items.iter().any(|item| compare_scalar(op_lower, &actual, item, cache)),
            other => compare_scalar(op_lower, &actual, other, cache),
        }
    })
}

fn compare_scalar(op: &str, actual: &Value, expected: &Value, cache: &RegexCache) -> bool {
    match op {
        "stringequals" => actual.coerce_to_string() == expected.coerce_to_string(),
        "stringnotequals" => actual.coerce_to_string() != expected.coerce_to_string(),
        "stringlike" => {
            let pattern = glob_to_anchored_regex(&expected.coerce_to_string());
            cache
                .get_or_compile(&pattern)
                .map(|re| re.is_match(&actual.coerce_to_string()))
                .unwrap_or(false)
        }
        "stringcontains" => actual.coerce_to_string().contains(&expected.coerce_to_string()),
        "stringstartswith" => actual.coerce_to_string().starts_with(&expected.coerce_to_string()),
        "stringendswith" => actual.coerce_to_string().ends_with(&expected.coerce_to_string()),
        "stringregex" => {
            let anchored = format!("^(?:{})$", expected.coerce_to_string());
            cache
                .get_or_compile(&anchored)
                .map(|re| re.is_match(&actual.coerce_to_string()))
                .unwrap_or(false)
        }
        "numericequals" => numeric_cmp(actual, expected, |a, b| a == b),
        "numericnotequals" => numeric_cmp(actual, expected, |a, b| a != b),
        "numericlessthan" => numeric_cmp(actual, expected, |a, b| a < b),
        "numericlessthanequals" => numeric_cmp(actual, expected, |a, b| a <= b),
        "numericgreaterthan" => numeric_cmp(actual, expected, |a, b| a > b),
        "numericgreaterthanequals" => numeric_cmp(actual, expected, |a, b| a >= b),
        "bool" | "boolean" => actual.coerce_to_bool() == expected.coerce_to_bool(),
        "datelessthan" => moment_cmp(actual, expected, |a, b| a < b),
        "dategreaterthan" => moment_cmp(actual, expected, |a, b| a > b),
        "datelessthanequals" => moment_cmp(actual, expected, |a, b| a <= b),
        "dategreaterthanequals" => moment_cmp(actual, expected, |a, b| a >= b),
        "timelessthan" => time_of_day_cmp(actual, expected, |a, b| a < b),
        "timegreaterthan" => time_of_day_cmp(actual, expected, |a, b| a > b),
        "timeofday" => time_of_day_match(actual, expected),
        "dayofweek" => actual.coerce_to_string() == expected.coerce_to_string(),
        "isbusinesshours" | "isinternalip" | "ismobile" => actual.coerce_to_bool() == expected.coerce_to_bool(),
        "ipaddress" | "ipinrange" => ip_in_cidr(actual, expected),
        "ipnotinrange" => !ip_in_cidr(actual, expected),
        "arraycontains" => array_contains(actual, expected),
        "arraynotcontains" => !array_contains(actual, expected),
        _ => {
            tracing::warn!(operator = op, "unknown condition operator");
            false
        }
    }
}

fn numeric_cmp(actual: &Value, expected: &Value, f: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.coerce_to_number(), expected.coerce_to_number()) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

fn moment_cmp(actual: &Value, expected: &Value, f: impl Fn(OffsetDateTime, OffsetDateTime) -> bool) -> bool {
    match (coerce_to_moment(actual), coerce_to_moment(expected)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

fn time_of_day_cmp(actual: &Value, expected: &Value, f: impl Fn(Time, Time) -> bool) -> bool {
    match (coerce_to_time_of_day(actual), coerce_to_time_of_day(expected)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

/// `TimeOfDay`: exact `HH:MM` match, or an intra-day `HH:MM-HH:MM` range
/// (§9 open question: ranges that would wrap midnight evaluate false, never
/// wrap).
fn time_of_day_match(actual: &Value, expected: &Value) -> bool {
    let Some(actual_t) = coerce_to_time_of_day(actual) else {
        return false;
    };
    let expected_str = expected.coerce_to_string();
    if let Some((start_s, end_s)) = expected_str.split_once('-') {
        let (Some(start), Some(end)) = (parse_time_of_day(start_s.trim()), parse_time_of_day(end_s.trim())) else {
            return false;
        };
        if start > end {
            return false;
        }
        actual_t >= start && actual_t <= end
    } else {
        match parse_time_of_day(expected_str.trim()) {
            Some(expected_t) => actual_t == expected_t,
            None => false,
        }
    }
}

fn ip_in_cidr(actual: &Value, expected: &Value) -> bool {
    let Ok(ip) = actual.coerce_to_string().parse::<IpAddr>() else {
        return false;
    };
    let cidr_text = expected.coerce_to_string();
    let cidr_text = if cidr_text.contains('/') {
        cidr_text
    } else {
        match ip {
            IpAddr::V4(_) => format!("{cidr_text}/32"),
            IpAddr::V6(_) => format!("{cidr_text}/128"),
        }
    };
    cidr_text.parse::<IpNetwork>().map(|net| net.contains(ip)).unwrap_or(false)
}

fn array_contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::List(items) => items.iter().any(|item| values_loosely_equal(item, expected)),
        _ => false,
    }
}

fn values_loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || a.coerce_to_string() == b.coerce_to_string()
}

/// Extracts a `[min, max]` / `{"min":…, "max":…}` bound pair (§4.5 family 3).
fn extract_numeric_bounds(expected: &Value) -> Option<(f64, f64)> {
    match expected {
        Value::List(items) if items.len() == 2 => {
            Some((items[0].coerce_to_number()?, items[1].coerce_to_number()?))
        }
        Value::Map(m) => Some((m.get("min")?.coerce_to_number()?, m.get("max")?.coerce_to_number()?)),
        _ => None,
    }
}

fn eval_numeric_between(args: &BTreeMap<String, Value>, ctx: &EvaluationContext, sid: Option<&str>, op: &str) -> bool {
    args.iter().all(|(key, raw_expected)| {
        let expected = substitute_value(ctx, raw_expected);
        match extract_numeric_bounds(&expected) {
            Some((lo, hi)) => ctx
                .get(key)
                .and_then(Value::coerce_to_number)
                .map(|actual| actual >= lo && actual <= hi)
                .unwrap_or(false),
            None => {
                tracing::warn!(sid = ?sid, operator = op, key, "NumericBetween expects a [min, max] pair or {{min, max}}");
                false
            }
        }
    })
}

fn eval_moment_between(
    args: &BTreeMap<String, Value>,
    ctx: &EvaluationContext,
    sid: Option<&str>,
    op: &str,
    coerce: impl Fn(&Value) -> Option<OffsetDateTime>,
) -> bool {
    args.iter().all(|(key, raw_expected)| {
        let expected = substitute_value(ctx, raw_expected);
        let bounds = match &expected {
            Value::List(items) if items.len() == 2 => Some((coerce(&items[0]), coerce(&items[1]))),
            Value::Map(m) => Some((m.get("min").and_then(&coerce), m.get("max").and_then(&coerce))),
            _ => None,
        };
        match bounds {
            Some((Some(lo), Some(hi))) => match ctx.get(key).and_then(&coerce) {
                Some(actual) => actual >= lo && actual <= hi,
                None => false,
            },
            Some(_) => {
                tracing::warn!(sid = ?sid, operator = op, key, "could not parse between bounds");
                false
            }
            None => {
                tracing::warn!(sid = ?sid, operator = op, key, "expects a [min, max] pair or {{min, max}}");
                false
            }
        }
    })
}

fn eval_array_size(args: &BTreeMap<String, Value>, ctx: &EvaluationContext, sid: Option<&str>, op: &str) -> bool {
    args.iter().all(|(key, raw_expected)| {
        let expected = substitute_value(ctx, raw_expected);
        let actual_len = match ctx.get(key) {
            Some(Value::List(items)) => items.len() as f64,
            _ => return false,
        };
        match &expected {
            Value::Number(n) => actual_len == *n,
            Value::Map(comparators) => comparators.iter().all(|(cmp_op, cmp_val)| {
                let Some(n) = cmp_val.coerce_to_number() else {
                    return false;
                };
                match cmp_op.to_ascii_lowercase().as_str() {
                    "eq" => actual_len == n,
                    "gt" => actual_len > n,
                    "gte" => actual_len >= n,
                    "lt" => actual_len < n,
                    "lte" => actual_len <= n,
                    _ => false,
                }
            }),
            _ => {
                tracing::warn!(sid = ?sid, operator = op, key, "expects an integer or a comparator map");
                false
            }
        }
    })
}

/// Parses an `HH:MM` or `HH:MM:SS` string into a `time::Time`.
fn parse_time_of_day(s: &str) -> Option<Time> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [h, m] => Some(Time::from_hms(h.parse().ok()?, m.parse().ok()?, 0).ok()?),
        [h, m, sec] => Some(Time::from_hms(h.parse().ok()?, m.parse().ok()?, sec.parse().ok()?).ok()?),
        _ => None,
    }
}

/// Extracts the time-of-day portion from any value accepted by §4.5's "to
/// time" coercion: a bare `HH:MM[:SS]` string, or the time component of a
/// fuller moment string.
fn coerce_to_time_of_day(value: &Value) -> Option<Time> {
    let s = value.as_str()?;
    if let Some(t) = parse_time_of_day(s) {
        return Some(t);
    }
    coerce_to_moment(value).map(|m| m.time())
}

fn coerce_to_time_of_day_moment(value: &Value) -> Option<OffsetDateTime> {
    let t = coerce_to_time_of_day(value)?;
    Some(OffsetDateTime::UNIX_EPOCH.replace_time(t))
}

/// Parses `RFC3339`, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `HH:MM`, or
/// `HH:MM:SS` into a comparable instant (§4.5 "to time" coercion). A bare
/// time-of-day string is combined with today's UTC date since there's no
/// request-scoped date to anchor it to otherwise.
fn coerce_to_moment(value: &Value) -> Option<OffsetDateTime> {
    let s = value.as_str()?;
    if let Ok(dt) = OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339) {
        return Some(dt);
    }
    let date_only = time::macros::format_description!("[year]-[month]-[day]");
    if let Ok(date) = time::Date::parse(s, &date_only) {
        return date.with_hms(0, 0, 0).ok().map(|dt| dt.assume_utc());
    }
    let date_time = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(dt) = time::PrimitiveDateTime::parse(s, &date_time) {
        return Some(dt.assume_utc());
    }
    if let Some(t) = parse_time_of_day(s) {
        let today = OffsetDateTime::now_utc().date();
        return Some(today.with_time(t).assume_utc());
    }
    None
}
