//! # abac-pdp
//!
//! An attribute-based access control (ABAC) policy decision point: given a
//! Subject, Resource, Action, and Environment, evaluates an IAM-style policy
//! set and returns permit or deny.
//!
//! ## Modules
//!
//! - [`config`] - PDP configuration (evaluation deadline, condition limits, cache, audit)
//! - [`error`] - Terminal vs. per-statement error types
//! - [`policy`] - The policy model, pattern matchers, context builder, and condition evaluator
//! - [`storage`] - The persistence capability the PDP depends on
//! - [`audit`] - The best-effort decision audit sink
//! - [`pdp`] - The orchestrator that ties the above together

pub mod audit;
pub mod config;
pub mod error;
pub mod pdp;
pub mod policy;
pub mod storage;

pub use config::{AuditConfig, CacheConfig, ConditionLimitsConfig, ConfigError, EvaluationConfig, PdpConfig};
pub use error::{ComplexityLimitKind, PdpError, PdpErrorCategory, PdpResult};
pub use pdp::{Decision, DecisionRequest, DecisionResult, PolicyDecisionPoint};
pub use policy::{
    Condition, ContextBuilder, Effect, EnvironmentInput, EvaluationContext, Policy, PolicyModelError,
    RegexCache, ResourceRecord, ServiceSubject, Statement, StringOrList, Subject, SubjectType, UserSubject,
    Value,
};
pub use storage::{InMemoryStorage, Storage};
pub use audit::{AuditRecord, AuditSink, ChannelAuditSink, InMemoryAuditSink, NoopAuditSink};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use abac_pdp::prelude::*;
/// ```
pub mod prelude {
    pub use crate::audit::{AuditRecord, AuditSink, ChannelAuditSink, InMemoryAuditSink, NoopAuditSink};
    pub use crate::config::PdpConfig;
    pub use crate::error::{PdpError, PdpResult};
    pub use crate::pdp::{Decision, DecisionRequest, DecisionResult, PolicyDecisionPoint};
    pub use crate::policy::{
        Condition, EnvironmentInput, Effect, Policy, ServiceSubject, Statement, StringOrList, Subject,
        UserSubject, Value,
    };
    pub use crate::storage::{InMemoryStorage, Storage};
}
