//! The policy model, matchers, and condition evaluator (§3, §4.1-§4.5).
//!
//! Leaf-first layout mirroring `octofhir_auth::policy`: a typed model and
//! codec, two independent pattern matchers, a context builder, and the
//! condition tree, composed by [`crate::pdp::PolicyDecisionPoint`].

pub mod action_matcher;
pub mod cache;
pub mod condition;
pub mod context;
pub mod model;
pub mod resource_matcher;
pub mod subject;
pub mod value;

pub use cache::RegexCache;
pub use condition::Condition;
pub use context::{ContextBuilder, EnvironmentInput, EvaluationContext, ResourceRecord};
pub use model::{Effect, Policy, PolicyModelError, Statement, StringOrList};
pub use subject::{ServiceSubject, Subject, SubjectType, UserSubject};
pub use value::Value;
