// SPDX-License-Identifier: Apache-2.0

// sqlgate - SQL admission control for read-only data access
// Core library

pub mod gate;
pub mod observability;

pub use sqlgate_core::{
    statement_digest, AdmissionOutcome, AuditError, AuditKind, AuditRecord, ConfigError,
    DenyReason, GateError, GateResult, OperationCategory, PolicyDecision, PolicyVerdict,
    StatementReport, Verdict,
};
pub use sqlgate_sql::{classify, segment, tokenize, Classification, Statement, Token, TokenKind};

pub use gate::{AdmissionGate, GateConfig, PolicyEngine};
