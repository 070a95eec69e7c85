// SPDX-License-Identifier: Apache-2.0

//! Audit record model.
//!
//! Records carry a digest of the statement rather than its text so the
//! log stays bounded and literals are not kept at rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::category::OperationCategory;
use crate::decision::{PolicyDecision, PolicyVerdict};

/// What kind of event an audit record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Regular rule-table decision for a statement
    Decision,
    /// Statement admitted because enforcement is switched off
    EnforcementDisabled,
    /// Input denied before segmentation (empty, undecodable)
    Rejected,
}

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Identifier shared by every record of one admission request
    pub request_id: String,
    #[serde(default)]
    pub statement_index: Option<usize>,
    pub statement_digest: String,
    #[serde(default)]
    pub category: Option<OperationCategory>,
    pub verdict: PolicyVerdict,
    pub matched_rule: String,
    pub reason: String,
    /// Caller-supplied label (tool name, handler, ...)
    pub execution_context: String,
    pub kind: AuditKind,
}

impl AuditRecord {
    /// Record for a classified statement
    pub fn for_decision(
        request_id: &str,
        statement_index: usize,
        statement_digest: String,
        decision: &PolicyDecision,
        execution_context: &str,
        kind: AuditKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            statement_index: Some(statement_index),
            statement_digest,
            category: Some(decision.category),
            verdict: decision.verdict,
            matched_rule: decision.matched_rule.clone(),
            reason: decision.reason.clone(),
            execution_context: execution_context.to_string(),
            kind,
        }
    }

    /// Record for input that never reached classification
    pub fn rejected(
        request_id: &str,
        statement_digest: String,
        rule_id: &str,
        reason: &str,
        execution_context: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            statement_index: None,
            statement_digest,
            category: None,
            verdict: PolicyVerdict::Deny,
            matched_rule: rule_id.to_string(),
            reason: reason.to_string(),
            execution_context: execution_context.to_string(),
            kind: AuditKind::Rejected,
        }
    }
}

/// Hex-encoded SHA-256 of `bytes`
pub fn statement_digest(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}
