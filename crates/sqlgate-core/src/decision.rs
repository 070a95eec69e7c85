// SPDX-License-Identifier: Apache-2.0

//! Policy decisions and admission outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::category::OperationCategory;

/// Per-statement verdict produced by the policy engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyVerdict {
    Allow,
    Deny,
}

impl PolicyVerdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Outcome of evaluating one statement against the rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub verdict: PolicyVerdict,
    pub category: OperationCategory,
    /// Human-readable explanation
    pub reason: String,
    /// Identifier of the rule that produced the verdict
    pub matched_rule: String,
}

impl PolicyDecision {
    pub fn allow(
        category: OperationCategory,
        rule_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            verdict: PolicyVerdict::Allow,
            category,
            reason: reason.into(),
            matched_rule: rule_id.into(),
        }
    }

    pub fn deny(
        category: OperationCategory,
        rule_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            verdict: PolicyVerdict::Deny,
            category,
            reason: reason.into(),
            matched_rule: rule_id.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allow()
    }
}

/// Why a whole admission request was denied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    /// Input held no statement once comments and whitespace were removed
    EmptyQuery,
    /// Input bytes were not valid UTF-8
    InvalidEncoding { message: String },
    /// A statement was denied by the rule table
    PolicyViolation {
        statement_index: usize,
        category: OperationCategory,
        rule: String,
        message: String,
    },
    /// The audit record could not be written; the request fails closed
    AuditUnavailable { message: String },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuery => f.write_str("empty query"),
            Self::InvalidEncoding { message } => write!(f, "invalid encoding: {}", message),
            Self::PolicyViolation {
                statement_index,
                rule,
                message,
                ..
            } => write!(f, "statement {}: {} (rule '{}')", statement_index, message, rule),
            Self::AuditUnavailable { message } => write!(f, "audit unavailable: {}", message),
        }
    }
}

/// Verdict for the whole request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason),
        }
    }
}

/// Classification and decision for one segmented statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementReport {
    /// Zero-based position of the statement in the submitted batch
    pub index: usize,
    /// Byte range of the statement in the submitted text
    pub start: usize,
    pub end: usize,
    /// SHA-256 of the statement text (hex)
    pub digest: String,
    pub category: OperationCategory,
    /// Categories of nested fragments, in source order
    #[serde(default)]
    pub fragments: Vec<OperationCategory>,
    /// Whether the statement contained an unterminated literal or comment
    #[serde(default)]
    pub malformed: bool,
    #[serde(default)]
    pub unbounded_scan: bool,
    pub decision: PolicyDecision,
    /// Advisory rule hits that did not change the verdict
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Result of one admission request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionOutcome {
    pub request_id: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub statements: Vec<StatementReport>,
}

impl AdmissionOutcome {
    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allow()
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        self.verdict.deny_reason()
    }

    /// All advisory warnings across statements
    pub fn warnings(&self) -> Vec<&str> {
        self.statements
            .iter()
            .flat_map(|s| s.warnings.iter().map(String::as_str))
            .collect()
    }
}
