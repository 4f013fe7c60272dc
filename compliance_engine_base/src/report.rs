// src/report.rs
//! # Audit Report
//!
//! Envelope around one audit or remediation run, serialized to JSON for
//! callers that collect results from many hosts.

use crate::error::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Unique identifier for this run
    pub report_id: String,

    /// Rule or procedure that was evaluated
    pub rule: String,

    /// "audit" or "remediate"
    pub action: String,

    pub host: HostContext,

    pub timestamp: TimestampInfo,

    pub outcome: Outcome,
}

/// Host execution context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostContext {
    pub hostname: String,
    pub os: String,
}

impl HostContext {
    pub fn current() -> Self {
        Self {
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            os: std::env::consts::OS.to_string(),
        }
    }
}

/// Timestamp information for the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampInfo {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Result of the run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    /// The rule evaluated to a status
    Completed { status: Status, payload: String },

    /// The rule could not be evaluated
    Error { message: String, code: i32 },
}

impl AuditReport {
    pub fn new(
        rule: impl Into<String>,
        action: impl Into<String>,
        started: DateTime<Utc>,
        outcome: Outcome,
    ) -> Self {
        let finished = Utc::now();
        let duration_ms = (finished - started).num_milliseconds().max(0) as u64;
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            rule: rule.into(),
            action: action.into(),
            host: HostContext::current(),
            timestamp: TimestampInfo {
                started,
                finished,
                duration_ms,
            },
            outcome,
        }
    }

    pub fn status(&self) -> Option<Status> {
        match &self.outcome {
            Outcome::Completed { status, .. } => Some(*status),
            Outcome::Error { .. } => None,
        }
    }
}
