// SPDX-License-Identifier: Apache-2.0

//! Admission Gate Module
//!
//! Decides whether submitted SQL may run:
//! - Rule table evaluation over classified statements
//! - Audit records written before every verdict
//! - Hot reload of the rule table

pub mod audit;
pub mod memory;
pub mod pipeline;
pub mod policy;
pub mod types;
pub mod watcher;

pub use audit::{AuditSink, JsonlAuditSink, TracingAuditSink, AUDIT_TARGET};
pub use memory::{AuditQuery, AuditStats, MemoryAuditSink};
pub use pipeline::{AdmissionGate, EMPTY_QUERY_RULE, INVALID_ENCODING_RULE};
pub use policy::{
    builtin_rules, evaluate, Evaluation, PolicyEngine, ENFORCEMENT_DISABLED_RULE,
    NO_MATCHING_RULE,
};
pub use types::{
    GateConfig, PolicyRule, RuleAction, RuleCondition, RuleSet, DISABLE_VALIDATION_ENV,
};
pub use watcher::{reload, ConfigWatcher};
