// SPDX-License-Identifier: Apache-2.0

//! sqlgate core
//!
//! Shared data model for the SQL admission gate: operation categories,
//! policy decisions, admission outcomes, audit records and the error
//! taxonomy. Everything here is plain data; the analysis lives in
//! `sqlgate-sql` and the enforcement in the `sqlgate` package.

pub mod audit;
pub mod category;
pub mod decision;
pub mod error;

pub use audit::{statement_digest, AuditKind, AuditRecord};
pub use category::OperationCategory;
pub use decision::{
    AdmissionOutcome, DenyReason, PolicyDecision, PolicyVerdict, StatementReport, Verdict,
};
pub use error::{AuditError, ConfigError, GateError, GateResult};
