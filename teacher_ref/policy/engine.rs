//! Policy evaluation engine for access control decisions.
//!
//! This module provides the core policy evaluation engine that orchestrates
//! policy lookup, matching, and decision-making.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_auth::policy::engine::{PolicyEvaluator, PolicyEvaluatorConfig, DefaultDecision};
//! use std::sync::Arc;
//!
//! let evaluator = PolicyEvaluator::new(policy_cache, PolicyEvaluatorConfig {
//!     quickjs_enabled: false,
//!     default_decision: DefaultDecision::Deny,
//!     evaluate_scopes_first: true,
//!     ..Default::default()
//! });
//!
//! let decision = evaluator.evaluate(&context).await;
//! if decision.is_allowed() {
//!     // Proceed with request
//! }
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::AuthResult;
use crate::config::QuickJsConfig;
use crate::policy::cache::PolicyCache;
use crate::policy::context::PolicyContext;
use crate::policy::matcher::PatternMatcher;
use crate::policy::quickjs::QuickJsRuntime;
use crate::policy::resources::{InternalPolicy, PolicyEngine as PolicyEngineType};
use crate::smart::scopes::{FhirOperation, SmartScopes};

// =============================================================================
// Access Decision
// =============================================================================

/// Result of policy evaluation.
#[derive(Debug, Clone)]
pub enum AccessDecision {
    /// Access is granted.
    Allow,
    /// Access is denied with a reason.
    Deny(DenyReason),
    /// Cannot make a decision, continue to next policy.
    Abstain,
}

impl AccessDecision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns `true` if access was denied.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    /// Returns `true` if the policy abstained from making a decision.
    #[must_use]
    pub fn is_abstain(&self) -> bool {
        matches!(self, Self::Abstain)
    }

    /// Get the deny reason if access was denied.
    #[must_use]
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Deny(reason) => Some(reason),
            _ => None,
        }
    }
}

// =============================================================================
// Deny Reason
// =============================================================================

/// Reason for access denial.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenyReason {
    /// Error code for programmatic handling.
    pub code: String,

    /// Human-readable error message.
    pub message: String,

    /// Additional details about the denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// ID of the policy that denied access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
}

impl DenyReason {
    /// Create a denial reason for no matching policy.
    #[must_use]
    pub fn no_matching_policy() -> Self {
        Self {
            code: "no-matching-policy".to_string(),
            message: "No policy granted access to this resource".to_string(),
            details: None,
            policy_id: None,
        }
    }

    /// Create a denial reason from a policy decision.
    #[must_use]
    pub fn policy_denied(policy_id: &str, message: Option<String>) -> Self {
        Self {
            code: "policy-denied".to_string(),
            message: message.unwrap_or_else(|| "Access denied by policy".to_string()),
            details: None,
            policy_id: Some(policy_id.to_string()),
        }
    }

    /// Create a denial reason for insufficient scope.
    #[must_use]
    pub fn scope_insufficient(required: &str) -> Self {
        Self {
            code: "insufficient-scope".to_string(),
            message: format!(
                "Token scope does not include required permission: {}",
                required
            ),
            details: Some(serde_json::json!({ "required_scope": required })),
            policy_id: None,
        }
    }

    /// Create a denial reason for a policy error.
    #[must_use]
    pub fn policy_error(message: impl Into<String>) -> Self {
        Self {
            code: "policy-error".to_string(),
            message: message.into(),
            details: None,
            policy_id: None,
        }
    }

    /// Create a denial reason for script execution failure.
    #[must_use]
    pub fn script_error(policy_id: &str, error: impl Into<String>) -> Self {
        Self {
            code: "script-error".to_string(),
            message: format!("Policy script failed: {}", error.into()),
            details: None,
            policy_id: Some(policy_id.to_string()),
        }
    }
}

// =============================================================================
// Policy Engine Configuration
// =============================================================================

/// Configuration for the policy evaluator.
#[derive(Debug, Clone)]
pub struct PolicyEvaluatorConfig {
    /// Enable QuickJS script engine for policies.
    pub quickjs_enabled: bool,

    /// QuickJS engine configuration.
    pub quickjs_config: QuickJsConfig,

    /// Default decision when no policy matches.
    pub default_decision: DefaultDecision,

    /// Evaluate SMART scopes before policies.
    ///
    /// If enabled, requests are first checked against SMART scopes.
    /// Scope denial short-circuits policy evaluation.
    pub evaluate_scopes_first: bool,
}

impl Default for PolicyEvaluatorConfig {
    fn default() -> Self {
        Self {
            quickjs_enabled: false,
            quickjs_config: QuickJsConfig::default(),
            default_decision: DefaultDecision::Deny,
            evaluate_scopes_first: true,
        }
    }
}

/// Default decision when no policy matches the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultDecision {
    /// Allow access if no policy denies it.
    Allow,
    /// Deny access unless a policy explicitly allows it.
    Deny,
}

// =============================================================================
// Evaluation Result
// =============================================================================

/// Complete result of policy evaluation with audit information.
#[derive(Debug)]
pub struct EvaluationResult {
    /// The final access decision.
    pub decision: AccessDecision,

    /// Policies that were evaluated.
    pub evaluated_policies: Vec<EvaluatedPolicy>,

    /// Time taken to evaluate policies (milliseconds).
    pub evaluation_time_ms: f64,

    /// Whether scopes were checked.
    pub scopes_checked: bool,

    /// Scope check result (if checked).
    pub scope_decision: Option<AccessDecision>,
}

/// Information about a policy that was evaluated.
#[derive(Debug, Clone)]
pub struct EvaluatedPolicy {
    /// Policy ID.
    pub policy_id: String,

    /// Policy name.
    pub policy_name: String,

    /// Whether the policy's matchers matched the context.
    pub matched: bool,

    /// The decision from this policy (if it was evaluated).
    pub decision: Option<AccessDecision>,
}

// =============================================================================
// Policy Evaluator
// =============================================================================

/// Policy evaluation engine.
///
/// Orchestrates policy lookup, matching, and decision-making.
///
/// QuickJS runtime is created once and shared across all evaluations.
/// Scripts are compiled to AST once and cached.
pub struct PolicyEvaluator {
    /// Pattern matcher for policy matching.
    pattern_matcher: PatternMatcher,

    /// Policy cache for efficient policy lookup.
    policy_cache: Arc<PolicyCache>,

    /// QuickJS scripting runtime (shared pool, created once).
    quickjs_runtime: Option<Arc<QuickJsRuntime>>,

    /// Engine configuration.
    config: PolicyEvaluatorConfig,
}

impl PolicyEvaluator {
    /// Create a new policy evaluator.
    ///
    /// If `quickjs_enabled` is true, a shared QuickJS runtime pool is created.
    /// The runtime is reused for all script evaluations.
    #[must_use]
    pub fn new(policy_cache: Arc<PolicyCache>, config: PolicyEvaluatorConfig) -> Self {
        let quickjs_runtime = if config.quickjs_enabled {
            match QuickJsRuntime::new(config.quickjs_config.clone()) {
                Ok(runtime) => Some(Arc::new(runtime)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to initialize QuickJS runtime");
                    None
                }
            }
        } else {
            None
        };

        Self {
            pattern_matcher: PatternMatcher::new(),
            policy_cache,
            quickjs_runtime,
            config,
        }
    }

    /// Evaluate access for a request context.
    ///
    /// # Evaluation Order
    ///
    /// 1. Check SMART scopes (if `evaluate_scopes_first` is enabled)
    /// 2. Get applicable policies from cache
    /// 3. Evaluate policies in priority order
    /// 4. Return first deny or allow; use default if no match
    pub async fn evaluate(&self, context: &PolicyContext) -> AccessDecision {
        // Step 1: Check SMART scopes first (if enabled)
        if self.config.evaluate_scopes_first
            && let Some(decision) = self.check_smart_scopes(context)
            && decision.is_denied()
        {
            return decision;
        }

        // Step 2: Get applicable policies
        let policies = match self
            .policy_cache
            .get_applicable_policies(&context.request.resource_type)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Failed to get policies from cache");
                return AccessDecision::Deny(DenyReason::policy_error(
                    "Failed to evaluate access policies",
                ));
            }
        };

        // Step 3: Evaluate policies in priority order
        let mut has_allow = false;

        for policy in &policies {
            // Check if policy matches this context
            if !self.pattern_matcher.matches(&policy.matchers, context) {
                continue;
            }

            // Evaluate policy engine
            let decision = self.evaluate_policy_engine(policy, context);

            match decision {
                AccessDecision::Deny(reason) => {
                    // First deny wins
                    tracing::debug!(
                        policy_id = %policy.id,
                        policy_name = %policy.name,
                        reason = %reason.message,
                        "Policy denied access"
                    );
                    return AccessDecision::Deny(reason);
                }
                AccessDecision::Allow => {
                    tracing::debug!(
                        policy_id = %policy.id,
                        policy_name = %policy.name,
                        "Policy allowed access"
                    );
                    has_allow = true;
                }
                AccessDecision::Abstain => {
                    tracing::trace!(
                        policy_id = %policy.id,
                        policy_name = %policy.name,
                        "Policy abstained"
                    );
                }
            }
        }

        // Step 4: Return result
        if has_allow {
            AccessDecision::Allow
        } else {
            match self.config.default_decision {
                DefaultDecision::Allow => AccessDecision::Allow,
                DefaultDecision::Deny => AccessDecision::Deny(DenyReason::no_matching_policy()),
            }
        }
    }

    /// Evaluate access with detailed audit information.
    pub async fn evaluate_with_audit(&self, context: &PolicyContext) -> EvaluationResult {
        let start = std::time::Instant::now();
        let mut evaluated_policies = Vec::new();
        let mut scope_decision = None;
        let scopes_checked = self.config.evaluate_scopes_first;

        // Step 1: Check SMART scopes first (if enabled)
        if self.config.evaluate_scopes_first
            && let Some(decision) = self.check_smart_scopes(context)
        {
            scope_decision = Some(decision.clone());
            if decision.is_denied() {
                return EvaluationResult {
                    decision,
                    evaluated_policies,
                    evaluation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                    scopes_checked,
                    scope_decision,
                };
            }
        }

        // Step 2: Get applicable policies
        let policies = match self
            .policy_cache
            .get_applicable_policies(&context.request.resource_type)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Failed to get policies from cache");
                return EvaluationResult {
                    decision: AccessDecision::Deny(DenyReason::policy_error(
                        "Failed to evaluate access policies",
                    )),
                    evaluated_policies,
                    evaluation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                    scopes_checked,
                    scope_decision,
                };
            }
        };

        // Step 3: Evaluate policies in priority order
        let mut has_allow = false;
        let mut final_decision = None;

        for policy in &policies {
            // Check if policy matches this context
            let matched = self.pattern_matcher.matches(&policy.matchers, context);

            if !matched {
                evaluated_policies.push(EvaluatedPolicy {
                    policy_id: policy.id.clone(),
                    policy_name: policy.name.clone(),
                    matched: false,
                    decision: None,
                });
                continue;
            }

            // Evaluate policy engine
            let decision = self.evaluate_policy_engine(policy, context);

            evaluated_policies.push(EvaluatedPolicy {
                policy_id: policy.id.clone(),
                policy_name: policy.name.clone(),
                matched: true,
                decision: Some(decision.clone()),
            });

            match decision {
                AccessDecision::Deny(_) => {
                    final_decision = Some(decision);
                    break;
                }
                AccessDecision::Allow => {
                    has_allow = true;
                }
                AccessDecision::Abstain => {}
            }
        }

        // Step 4: Determine final decision
        let decision = final_decision.unwrap_or_else(|| {
            if has_allow {
                AccessDecision::Allow
            } else {
                match self.config.default_decision {
                    DefaultDecision::Allow => AccessDecision::Allow,
                    DefaultDecision::Deny => AccessDecision::Deny(DenyReason::no_matching_policy()),
                }
            }
        });

        EvaluationResult {
            decision,
            evaluated_policies,
            evaluation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            scopes_checked,
            scope_decision,
        }
    }

    /// Check SMART scopes against the operation.
    fn check_smart_scopes(&self, context: &PolicyContext) -> Option<AccessDecision> {
        let resource_type = &context.request.resource_type;
        let operation = context.request.operation;

        // Parse the raw scope string to check permissions
        let scopes = SmartScopes::parse(&context.scopes.raw).unwrap_or_default();

        // Operations that don't require scope checking
        if operation.always_allowed() {
            return None;
        }

        // Determine required permission based on operation
        let required_permission = match operation {
            FhirOperation::Read
            | FhirOperation::VRead
            | FhirOperation::Search
            | FhirOperation::SearchType
            | FhirOperation::SearchSystem
            | FhirOperation::HistoryInstance
            | FhirOperation::HistoryType
            | FhirOperation::HistorySystem => "r",
            FhirOperation::Create => "c",
            FhirOperation::Update | FhirOperation::Patch => "u",
            FhirOperation::Delete => "d",
            // System operations don't require scope checking
            FhirOperation::Capabilities
            | FhirOperation::Batch
            | FhirOperation::Transaction
            | FhirOperation::Operation => return None,
        };

        // Check if any scope permits this operation
        let patient_context = context.environment.patient_context.as_deref();

        if scopes.permits(resource_type, operation, patient_context) {
            Some(AccessDecision::Allow)
        } else {
            let required_scope = format!(
                "patient/{}.{} or user/{}.{}",
                resource_type, required_permission, resource_type, required_permission
            );
            Some(AccessDecision::Deny(DenyReason::scope_insufficient(
                &required_scope,
            )))
        }
    }

    /// Evaluate a single policy's engine.
    fn evaluate_policy_engine(
        &self,
        policy: &InternalPolicy,
        context: &PolicyContext,
    ) -> AccessDecision {
        match &policy.engine {
            PolicyEngineType::Allow => AccessDecision::Allow,

            PolicyEngineType::Deny => AccessDecision::Deny(DenyReason::policy_denied(
                &policy.id,
                policy.deny_message.clone(),
            )),

            PolicyEngineType::QuickJs { script } => {
                if let Some(ref runtime) = self.quickjs_runtime {
                    tracing::debug!(
                        policy_id = %policy.id,
                        "Evaluating QuickJS policy script"
                    );
                    let decision = runtime.evaluate(script, context);
                    // If the script returns a deny, attach the policy ID
                    if let AccessDecision::Deny(mut reason) = decision {
                        reason.policy_id = Some(policy.id.clone());
                        AccessDecision::Deny(reason)
                    } else {
                        decision
                    }
                } else {
                    tracing::warn!(
                        policy_id = %policy.id,
                        "QuickJS policy but QuickJS is disabled"
                    );
                    AccessDecision::Abstain
                }
            }
        }
    }

    /// Get a reference to the policy cache.
    #[must_use]
    pub fn cache(&self) -> &PolicyCache {
        &self.policy_cache
    }

    /// Get a reference to the QuickJS runtime (if enabled).
    #[must_use]
    pub fn quickjs_runtime(&self) -> Option<&Arc<QuickJsRuntime>> {
        self.quickjs_runtime.as_ref()
    }

    /// Invalidate the policy cache.
    pub async fn invalidate_cache(&self) {
        self.policy_cache.invalidate().await;
    }

    /// Force refresh the policy cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache refresh fails.
    pub async fn refresh_cache(&self) -> AuthResult<()> {
        self.policy_cache.refresh().await
    }
}

// =============================================================================
// Tests
// =============================================================================
