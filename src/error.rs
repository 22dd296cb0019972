//! Error types for the policy decision point.
//!
//! Mirrors the distinction the specification draws between terminal errors
//! (returned to the caller, who must fail closed) and per-statement errors
//! (logged and folded into a `false` match, never propagated out of
//! [`crate::pdp::PolicyDecisionPoint::evaluate`]).

use thiserror::Error;

/// The kind of complexity limit that was exceeded while evaluating a condition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityLimitKind {
    /// Nesting depth of `And`/`Or`/`Not` exceeded the configured maximum.
    Depth,
    /// Total number of condition keys in a statement exceeded the configured maximum.
    KeyCount,
}

impl std::fmt::Display for ComplexityLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplexityLimitKind::Depth => write!(f, "depth"),
            ComplexityLimitKind::KeyCount => write!(f, "key_count"),
        }
    }
}

/// Unified error type for the PDP and its supporting evaluators.
#[derive(Debug, Error)]
pub enum PdpError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("evaluation timed out after {deadline_ms}ms")]
    EvaluationTimeout { deadline_ms: u64 },

    #[error("malformed policy (sid={sid:?}, operator={operator}): {message}")]
    MalformedPolicy {
        sid: Option<String>,
        operator: String,
        message: String,
    },

    #[error("missing attribute: {key}")]
    MissingAttribute { key: String },

    #[error("excessive complexity: {limit_kind} limit {limit} exceeded (actual {actual})")]
    ExcessiveComplexity {
        limit_kind: ComplexityLimitKind,
        limit: usize,
        actual: usize,
    },
}

impl PdpError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        PdpError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        PdpError::StorageUnavailable {
            message: message.into(),
        }
    }

    pub fn evaluation_timeout(deadline_ms: u64) -> Self {
        PdpError::EvaluationTimeout { deadline_ms }
    }

    pub fn malformed_policy(
        sid: Option<String>,
        operator: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PdpError::MalformedPolicy {
            sid,
            operator: operator.into(),
            message: message.into(),
        }
    }

    pub fn missing_attribute(key: impl Into<String>) -> Self {
        PdpError::MissingAttribute { key: key.into() }
    }

    pub fn excessive_complexity(limit_kind: ComplexityLimitKind, limit: usize, actual: usize) -> Self {
        PdpError::ExcessiveComplexity {
            limit_kind,
            limit,
            actual,
        }
    }

    /// Terminal errors are returned to the caller; the middleware must fail closed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PdpError::InvalidRequest { .. }
                | PdpError::StorageUnavailable { .. }
                | PdpError::EvaluationTimeout { .. }
        )
    }

    /// Per-statement errors degrade the statement to a false match and never
    /// unwind the orchestrator.
    pub fn is_per_statement(&self) -> bool {
        !self.is_terminal()
    }

    pub fn category(&self) -> PdpErrorCategory {
        match self {
            PdpError::InvalidRequest { .. } => PdpErrorCategory::Request,
            PdpError::StorageUnavailable { .. } => PdpErrorCategory::Infrastructure,
            PdpError::EvaluationTimeout { .. } => PdpErrorCategory::Timeout,
            PdpError::MalformedPolicy { .. } => PdpErrorCategory::Policy,
            PdpError::MissingAttribute { .. } => PdpErrorCategory::Context,
            PdpError::ExcessiveComplexity { .. } => PdpErrorCategory::Complexity,
        }
    }
}

/// Broad classification of [`PdpError`] variants, useful for metrics/logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdpErrorCategory {
    Request,
    Infrastructure,
    Timeout,
    Policy,
    Context,
    Complexity,
}

impl std::fmt::Display for PdpErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PdpErrorCategory::Request => "request",
            PdpErrorCategory::Infrastructure => "infrastructure",
            PdpErrorCategory::Timeout => "timeout",
            PdpErrorCategory::Policy => "policy",
            PdpErrorCategory::Context => "context",
            PdpErrorCategory::Complexity => "complexity",
        };
        write!(f, "{s}")
    }
}

pub type PdpResult<T> = Result<T, PdpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PdpError::invalid_request("missing subject");
        assert_eq!(err.to_string(), "invalid request: missing subject");

        let err = PdpError::excessive_complexity(ComplexityLimitKind::Depth, 10, 12);
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_terminal_predicate() {
        assert!(PdpError::invalid_request("x").is_terminal());
        assert!(PdpError::storage_unavailable("x").is_terminal());
        assert!(PdpError::evaluation_timeout(5000).is_terminal());

        assert!(!PdpError::malformed_policy(None, "StringEquals", "bad args").is_terminal());
        assert!(!PdpError::missing_attribute("user:department").is_terminal());
        assert!(
            !PdpError::excessive_complexity(ComplexityLimitKind::KeyCount, 100, 101).is_terminal()
        );
    }

    #[test]
    fn test_per_statement_predicate() {
        let err = PdpError::missing_attribute("k");
        assert!(err.is_per_statement());
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            PdpError::invalid_request("x").category(),
            PdpErrorCategory::Request
        );
        assert_eq!(
            PdpError::storage_unavailable("x").category(),
            PdpErrorCategory::Infrastructure
        );
        assert_eq!(
            PdpError::evaluation_timeout(1).category(),
            PdpErrorCategory::Timeout
        );
        assert_eq!(
            PdpError::malformed_policy(None, "op", "m").category(),
            PdpErrorCategory::Policy
        );
        assert_eq!(
            PdpError::missing_attribute("k").category(),
            PdpErrorCategory::Context
        );
        assert_eq!(
            PdpError::excessive_complexity(ComplexityLimitKind::Depth, 1, 2).category(),
            PdpErrorCategory::Complexity
        );
    }

    #[test]
    fn test_category_display() {
        assert_eq!(PdpErrorCategory::Request.to_string(), "request");
        assert_eq!(PdpErrorCategory::Complexity.to_string(), "complexity");
    }
}
