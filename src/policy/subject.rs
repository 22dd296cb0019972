//! The polymorphic Subject capability (§3, §9).
//!
//! The source evolved from flat subject maps to a Subject interface; we
//! keep the interface and provide two concrete variants, `UserSubject` and
//! `ServiceSubject`, mirroring `octofhir-auth`'s `UserIdentity`/`ClientIdentity`
//! split in `policy/context.rs` but generalized away from FHIR/OAuth.

use std::collections::BTreeMap;

use crate::policy::value::Value;

/// The kind of principal a [`Subject`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectType {
    User,
    Service,
    ApiKey,
    Legacy,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Service => "service",
            SubjectType::ApiKey => "api-key",
            SubjectType::Legacy => "legacy",
        }
    }
}

/// A capability exposing the attributes a condition tree may reference
/// under the `user:*` scope, regardless of concrete principal kind.
pub trait Subject: Send + Sync {
    fn id(&self) -> &str;
    fn subject_type(&self) -> SubjectType;
    fn is_active(&self) -> bool;
    fn display_name(&self) -> &str;
    fn attributes(&self) -> BTreeMap<String, Value>;
}

/// A human user, carrying flattened relational profile/department/position/
/// company/role data (§3: "The user variant flattens relational user/profile
/// /department/position/company/role data into the attribute map").
#[derive(Debug, Clone)]
pub struct UserSubject {
    pub id: String,
    pub display_name: String,
    pub active: bool,
    pub department: Option<String>,
    pub position: Option<String>,
    pub company: Option<String>,
    pub roles: Vec<String>,
    pub extra_attributes: BTreeMap<String, Value>,
}

impl UserSubject {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        UserSubject {
            id: id.into(),
            display_name: display_name.into(),
            active: true,
            department: None,
            position: None,
            company: None,
            roles: Vec::new(),
            extra_attributes: BTreeMap::new(),
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_attributes.insert(key.into(), value.into());
        self
    }
}

impl Subject for UserSubject {
    fn id(&self) -> &str {
        &self.id
    }

    fn subject_type(&self) -> SubjectType {
        SubjectType::User
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        let mut attrs = self.extra_attributes.clone();
        attrs.insert("id".to_string(), Value::String(self.id.clone()));
        attrs.insert("display_name".to_string(), Value::String(self.display_name.clone()));
        attrs.insert("active".to_string(), Value::Bool(self.active));
        attrs.insert(
            "roles".to_string(),
            Value::List(self.roles.iter().map(|r| Value::String(r.clone())).collect()),
        );
        if let Some(department) = &self.department {
            attrs.insert("department".to_string(), Value::String(department.clone()));
        }
        if let Some(position) = &self.position {
            attrs.insert("position".to_string(), Value::String(position.clone()));
        }
        if let Some(company) = &self.company {
            attrs.insert("company".to_string(), Value::String(company.clone()));
        }
        attrs
    }
}

/// A service/machine principal (§3: "The service variant exposes
/// service-name, namespace, scopes").
#[derive(Debug, Clone)]
pub struct ServiceSubject {
    pub id: String,
    pub service_name: String,
    pub namespace: String,
    pub scopes: Vec<String>,
    pub active: bool,
}

impl ServiceSubject {
    pub fn new(id: impl Into<String>, service_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        ServiceSubject {
            id: id.into(),
            service_name: service_name.into(),
            namespace: namespace.into(),
            scopes: Vec::new(),
            active: true,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

impl Subject for ServiceSubject {
    fn id(&self) -> &str {
        &self.id
    }

    fn subject_type(&self) -> SubjectType {
        SubjectType::Service
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn display_name(&self) -> &str {
        &self.service_name
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        let mut attrs = BTreeMap::new();
        attrs.insert("id".to_string(), Value::String(self.id.clone()));
        attrs.insert("service_name".to_string(), Value::String(self.service_name.clone()));
        attrs.insert("namespace".to_string(), Value::String(self.namespace.clone()));
        attrs.insert("active".to_string(), Value::Bool(self.active));
        attrs.insert(
            "scopes".to_string(),
            Value::List(self.scopes.iter().map(|s| Value::String(s.clone())).collect()),
        );
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_subject_attributes() {
        let user = UserSubject::new("u1", "Alice")
            .with_department("finance")
            .with_roles(vec!["admin".to_string()]);
        let attrs = user.attributes();
        assert_eq!(attrs.get("department"), Some(&Value::String("finance".to_string())));
        assert_eq!(user.subject_type(), SubjectType::User);
        assert_eq!(user.subject_type().as_str(), "user");
    }

    #[test]
    fn test_service_subject_attributes() {
        let service = ServiceSubject::new("svc1", "billing", "prod").with_scopes(vec!["read".to_string()]);
        let attrs = service.attributes();
        assert_eq!(attrs.get("namespace"), Some(&Value::String("prod".to_string())));
        assert_eq!(service.subject_type(), SubjectType::Service);
    }
}
