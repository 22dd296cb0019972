//! The Policy Decision Point orchestrator (§4.6).
//!
//! Grounded on `octofhir_auth::policy::engine::PolicyEvaluator` (`teacher_ref/
//! policy/engine.rs`): a struct holding its dependencies (cache/matcher in
//! the teacher, storage/audit/regex-cache here), an `evaluate` entry point
//! that loops candidates with first-deny-wins short-circuiting, and an
//! `Instant`-timed variant that also emits an audit record. Unlike the
//! teacher, whose `PolicyCache` applies a priority order, this orchestrator
//! treats policy/statement order as whatever storage returns (§9: priority
//! is explicitly retired).

use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink, NoopAuditSink};
use crate::config::PdpConfig;
use crate::error::{PdpError, PdpResult};
use crate::policy::{
    action_matcher, condition::Condition, context::ContextBuilder, resource_matcher, EnvironmentInput,
    EvaluationContext, Policy, RegexCache, ResourceRecord, Statement, Subject, Value,
};
use crate::storage::Storage;

/// The result half of a [`Decision`] (§3: "Result ∈ {permit, deny}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionResult {
    Permit,
    Deny,
}

impl DecisionResult {
    pub fn is_permit(&self) -> bool {
        matches!(self, DecisionResult::Permit)
    }
}

/// The outcome of one `evaluate` call (§3, §6).
#[derive(Debug, Clone)]
pub struct Decision {
    pub result: DecisionResult,
    pub reason: String,
    pub matched_policies: Vec<String>,
    pub evaluation_time_ms: u64,
    pub request_id: String,
}

/// A decision request (§6).
pub struct DecisionRequest {
    pub request_id: Option<String>,
    pub subject: Box<dyn Subject>,
    pub resource_id: String,
    pub action: String,
    pub timestamp: Option<OffsetDateTime>,
    pub environment: Option<EnvironmentInput>,
    pub context: std::collections::BTreeMap<String, Value>,
}

impl DecisionRequest {
    pub fn new(subject: Box<dyn Subject>, resource_id: impl Into<String>, action: impl Into<String>) -> Self {
        DecisionRequest {
            request_id: None,
            subject,
            resource_id: resource_id.into(),
            action: action.into(),
            timestamp: None,
            environment: None,
            context: std::collections::BTreeMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentInput) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_context(mut self, context: std::collections::BTreeMap<String, Value>) -> Self {
        self.context = context;
        self
    }
}

/// The policy decision point: holds its dependencies (storage, audit sink,
/// configuration, the shared regex cache) as explicit, injected state (§9:
/// "a first-class object with explicit dependencies").
pub struct PolicyDecisionPoint {
    storage: Arc<dyn Storage>,
    audit: Arc<dyn AuditSink>,
    config: PdpConfig,
    regex_cache: RegexCache,
}

impl PolicyDecisionPoint {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        PolicyDecisionPoint {
            storage,
            audit: Arc::new(NoopAuditSink),
            config: PdpConfig::default(),
            regex_cache: RegexCache::new(None),
        }
    }

    pub fn with_config(mut self, config: PdpConfig) -> Self {
        self.regex_cache = RegexCache::new(config.cache.regex_cache_limit);
        self.config = config;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Evaluates one decision request end to end (§4.6).
    pub async fn evaluate(&self, request: DecisionRequest) -> PdpResult<Decision> {
        if request.resource_id.is_empty() || request.action.is_empty() || request.subject.id().is_empty() {
            return Err(PdpError::invalid_request(
                "resource_id, action, and subject id must all be non-empty",
            ));
        }

        let request_id = request.request_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let deadline = self.config.evaluation.deadline;

        let outcome = tokio::time::timeout(deadline, self.evaluate_inner(&request, &request_id)).await;
        let decision = match outcome {
            Ok(result) => result?,
            Err(_) => return Err(PdpError::evaluation_timeout(deadline.as_millis() as u64)),
        };

        if self.config.audit.enabled {
            let record = AuditRecord {
                request_id: decision.request_id.clone(),
                subject_id: request.subject.id().to_string(),
                resource_id: request.resource_id.clone(),
                action: request.action.clone(),
                decision: if decision.result.is_permit() { "permit" } else { "deny" }.to_string(),
                evaluation_ms: decision.evaluation_time_ms,
                matched_policies: decision.matched_policies.clone(),
                context: request.context.clone(),
            };
            self.audit.log_decision(record).await;
        }

        Ok(decision)
    }

    async fn evaluate_inner(&self, request: &DecisionRequest, request_id: &str) -> PdpResult<Decision> {
        let start = Instant::now();

        let policies: Vec<Policy> = self
            .storage
            .get_policies()
            .await?
            .into_iter()
            .filter(|p| p.enabled)
            .collect();

        let resource: Option<ResourceRecord> = match self.storage.get_resource(&request.resource_id).await {
            Ok(resource) => resource,
            Err(error) => {
                tracing::warn!(error = %error, resource_id = %request.resource_id, "resource lookup failed, proceeding without resource attributes");
                None
            }
        };

        let mut builder = ContextBuilder::new(request.subject.as_ref(), &request.action, &request.resource_id)
            .with_custom_context(request.context.clone());
        if let Some(resource) = &resource {
            builder = builder.with_resource(resource);
        }
        if let Some(environment) = &request.environment {
            builder = builder.with_environment(environment);
        }
        if let Some(timestamp) = request.timestamp {
            builder = builder.with_timestamp(timestamp);
        }
        let ctx = builder.build()?;

        let candidates: Vec<&Policy> = if self.config.evaluation.prefilter_enabled {
            policies
                .iter()
                .filter(|policy| {
                    policy
                        .statement
                        .iter()
                        .any(|stmt| statement_could_match(stmt, &request.action, &request.resource_id, &ctx, &self.regex_cache))
                })
                .collect()
        } else {
            policies.iter().collect()
        };

        let mut matched_allow: Vec<String> = Vec::new();

        for policy in candidates {
            for statement in &policy.statement {
                if !statement_matches(
                    statement,
                    &request.action,
                    &request.resource_id,
                    &ctx,
                    &self.regex_cache,
                    &self.config.condition_limits,
                ) {
                    continue;
                }

                let sid = statement.sid.clone().unwrap_or_default();
                match statement.effect {
                    crate::policy::Effect::Deny => {
                        return Ok(Decision {
                            result: DecisionResult::Deny,
                            reason: format!("Denied by statement: {sid}"),
                            matched_policies: vec![sid],
                            evaluation_time_ms: elapsed_ms(start),
                            request_id: request_id.to_string(),
                        });
                    }
                    crate::policy::Effect::Allow => matched_allow.push(sid),
                }
            }
        }

        if !matched_allow.is_empty() {
            Ok(Decision {
                result: DecisionResult::Permit,
                reason: format!("Allowed by statements: {}", matched_allow.join(",")),
                matched_policies: matched_allow,
                evaluation_time_ms: elapsed_ms(start),
                request_id: request_id.to_string(),
            })
        } else {
            Ok(Decision {
                result: DecisionResult::Deny,
                reason: "No matching policies found (implicit deny)".to_string(),
                matched_policies: Vec::new(),
                evaluation_time_ms: elapsed_ms(start),
                request_id: request_id.to_string(),
            })
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// The §4.6 step-3 pre-filter: action+resource match without evaluating the
/// condition tree, used only to skip policies that cannot possibly match.
fn statement_could_match(stmt: &Statement, action: &str, resource_id: &str, ctx: &EvaluationContext, cache: &RegexCache) -> bool {
    action_matcher::matches_any(stmt.action.values(), action, cache)
        && resource_matcher::matches_any(stmt.resource.values(), resource_id, ctx, cache)
}

/// Full statement match: action, resource (with NotResource exclusion), and
/// condition tree (§3, §4.6 step 5).
fn statement_matches(
    stmt: &Statement,
    action: &str,
    resource_id: &str,
    ctx: &EvaluationContext,
    cache: &RegexCache,
    limits: &crate::config::ConditionLimitsConfig,
) -> bool {
    if !action_matcher::matches_any(stmt.action.values(), action, cache) {
        return false;
    }
    if !resource_matcher::matches_any(stmt.resource.values(), resource_id, ctx, cache) {
        return false;
    }
    if let Some(not_resource) = &stmt.not_resource {
        if resource_matcher::is_excluded(not_resource.values(), resource_id, ctx, cache) {
            return false;
        }
    }
    match &stmt.condition {
        Some(condition) => evaluate_condition(condition, ctx, cache, limits, stmt.sid.as_deref()),
        None => true,
    }
}

fn evaluate_condition(
    condition: &Condition,
    ctx: &EvaluationContext,
    cache: &RegexCache,
    limits: &crate::config::ConditionLimitsConfig,
    sid: Option<&str>,
) -> bool {
    condition.evaluate(ctx, cache, limits, sid)
}
