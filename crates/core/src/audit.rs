use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::capability::{CapabilityId, RawParameters};
use crate::errors::ErrorKind;

pub const REDACTED: &str = "<redacted>";

const SENSITIVE_KEY_MARKERS: [&str; 5] =
    ["secret", "password", "token", "credential", "access_key"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failure { kind: ErrorKind, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub record_id: String,
    pub sequence: u64,
    pub capability: CapabilityId,
    pub service: String,
    pub parameters: Map<String, Value>,
    pub outcome: ActionOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Success)
    }

    pub fn summary(&self) -> String {
        match &self.outcome {
            ActionOutcome::Success => format!("Successfully executed {}", self.capability),
            ActionOutcome::Failure { kind, reason } => {
                format!("Failed to execute {} ({kind}): {reason}", self.capability)
            }
        }
    }
}

/// Replaces the value of any key that looks like it carries secret material.
pub fn redact_parameters(parameters: &RawParameters) -> Map<String, Value> {
    parameters
        .iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else {
                redact_value(value)
            };
            (key.clone(), value)
        })
        .collect()
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_parameters(map)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEY_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Append-only, session-scoped list of everything the engine attempted.
#[derive(Clone, Debug, Default)]
pub struct AuditTrail {
    records: Vec<ActionRecord>,
}

impl AuditTrail {
    pub fn append(
        &mut self,
        capability: CapabilityId,
        parameters: &RawParameters,
        outcome: ActionOutcome,
    ) -> &ActionRecord {
        let record = ActionRecord {
            record_id: Uuid::new_v4().to_string(),
            sequence: self.records.len() as u64 + 1,
            capability,
            service: capability.service().to_string(),
            parameters: redact_parameters(parameters),
            outcome,
            recorded_at: Utc::now(),
        };
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Receives a copy of every record appended to any session's trail.
pub trait AuditSink: Send + Sync {
    fn emit(&self, session_id: &str, record: &ActionRecord);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<(String, ActionRecord)>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<(String, ActionRecord)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, session_id: &str, record: &ActionRecord) {
        let entry = (session_id.to_string(), record.clone());
        match self.events.lock() {
            Ok(mut events) => events.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
