//! The policy model and its JSON codec (§3, §4.1, §6).
//!
//! `Policy` and `Statement` are the typed, load-time representation of the
//! IAM-style policy language. Action/Resource/NotResource are a
//! discriminated union over "single string" and "list of strings" that
//! preserves the form it was decoded from, so re-encoding round-trips
//! exactly (§8 round-trip laws).

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::condition::Condition;

/// The effect of a matching statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    fn parse(s: &str) -> Option<Effect> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Some(Effect::Allow),
            "deny" => Some(Effect::Deny),
            _ => None,
        }
    }
}

impl Serialize for Effect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Effect::Allow => serializer.serialize_str("Allow"),
            Effect::Deny => serializer.serialize_str("Deny"),
        }
    }
}

impl<'de> Deserialize<'de> for Effect {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Effect::parse(&s).ok_or_else(|| de::Error::custom(format!("invalid Effect: {s}")))
    }
}

/// A string-or-array of strings that remembers which form it was decoded
/// from, so encoding is faithful (§4.1, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct StringOrList {
    values: Vec<String>,
    is_array: bool,
}

impl StringOrList {
    pub fn single(value: impl Into<String>) -> Self {
        StringOrList {
            values: vec![value.into()],
            is_array: false,
        }
    }

    pub fn list(values: Vec<String>) -> Self {
        StringOrList {
            values,
            is_array: true,
        }
    }

    /// Consumers always call this to obtain a flat list, regardless of the
    /// wire form.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() || self.values.iter().all(|v| v.is_empty())
    }
}

impl Serialize for StringOrList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_array {
            self.values.serialize(serializer)
        } else {
            self.values
                .first()
                .map(String::as_str)
                .unwrap_or("")
                .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for StringOrList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Single(String),
            Many(Vec<String>),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Single(s) => Ok(StringOrList::single(s)),
            Repr::Many(values) => Ok(StringOrList::list(values)),
        }
    }
}

/// One Effect/Action/Resource/[NotResource]/[Condition] rule inside a Policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Statement {
    #[serde(default, rename = "Sid", skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Action")]
    pub action: StringOrList,
    #[serde(rename = "Resource")]
    pub resource: StringOrList,
    #[serde(
        default,
        rename = "NotResource",
        skip_serializing_if = "Option::is_none"
    )]
    pub not_resource: Option<StringOrList>,
    #[serde(default, rename = "Condition", skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Statement {
    pub fn validate(&self) -> Result<(), PolicyModelError> {
        if self.action.is_empty() {
            return Err(PolicyModelError::EmptyField("Action"));
        }
        if self.resource.is_empty() {
            return Err(PolicyModelError::EmptyField("Resource"));
        }
        Ok(())
    }
}

/// Identity, enablement flag, and the ordered list of Statements that make
/// up one policy document (§3, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Policy {
    pub id: String,
    pub policy_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub statement: Vec<Statement>,
}

fn default_enabled() -> bool {
    true
}

impl Policy {
    pub fn validate(&self) -> Result<(), PolicyModelError> {
        if self.id.is_empty() {
            return Err(PolicyModelError::EmptyField("id"));
        }
        if self.statement.is_empty() {
            return Err(PolicyModelError::EmptyField("statement"));
        }
        for statement in &self.statement {
            statement.validate()?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, PolicyModelError> {
        let policy: Policy =
            serde_json::from_str(json).map_err(|e| PolicyModelError::Decode(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn to_json(&self) -> Result<String, PolicyModelError> {
        serde_json::to_string(self).map_err(|e| PolicyModelError::Decode(e.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyModelError {
    #[error("field must not be empty: {0}")]
    EmptyField(&'static str),
    #[error("failed to decode policy: {0}")]
    Decode(String),
}
