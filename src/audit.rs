//! The audit sink (§4.8, §5): a best-effort `logDecision` capability.
//!
//! The teacher crate declares an audit module (`octofhir_auth::audit`) but
//! leaves it essentially unimplemented in-crate; the richer FHIR
//! `AuditEvent` trail lives in a sibling crate (`octofhir-server::audit`) and
//! is tied to a domain (FHIR resource CRUD) this specification doesn't
//! share. This module instead implements exactly the fields §4.8 names,
//! using the teacher's bounded-channel-plus-background-worker shape
//! (`tokio::sync::mpsc`) for the queued variant, per §5's "queue overflow
//! must drop audit records, never the decision."

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::policy::Value;

/// One audit entry (§4.8 field list, verbatim).
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub request_id: String,
    pub subject_id: String,
    pub resource_id: String,
    pub action: String,
    pub decision: String,
    pub evaluation_ms: u64,
    pub matched_policies: Vec<String>,
    pub context: std::collections::BTreeMap<String, Value>,
}

/// The audit capability the PDP consumes. Implementations must not alter the
/// Decision they're handed (§4.8: "Best-effort; the sink must not alter the
/// Decision").
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_decision(&self, record: AuditRecord);
}

/// Discards every record; used when `AuditConfig::enabled` is false.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn log_decision(&self, _record: AuditRecord) {}
}

/// Captures records in memory, for tests and examples.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        InMemoryAuditSink::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn log_decision(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Forwards records to a bounded channel drained by a background worker;
/// queue overflow drops the record and logs a warning, never the decision
/// (§5).
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditRecord>,
}

impl ChannelAuditSink {
    /// Spawns a background task that drains the channel via `handler`, and
    /// returns the sink side. `capacity` should come from
    /// `AuditConfig::queue_capacity`.
    pub fn spawn(capacity: usize, handler: impl Fn(AuditRecord) + Send + 'static) -> Self {
        let (sender, mut receiver) = mpsc::channel(capacity);
        tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                handler(record);
            }
        });
        ChannelAuditSink { sender }
    }
}

#[async_trait]
impl AuditSink for ChannelAuditSink {
    async fn log_decision(&self, record: AuditRecord) {
        if self.sender.try_send(record).is_err() {
            tracing::warn!("audit queue full, dropping decision record");
        }
    }
}
