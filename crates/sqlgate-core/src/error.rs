// SPDX-License-Identifier: Apache-2.0

//! Error types for the admission gate
//!
//! Policy violations and malformed SQL are not errors: they are ordinary
//! `Deny` verdicts. Only infrastructure and configuration faults live here.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to persist an audit record. Always surfaces as a denial.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {message}")]
    Unavailable { message: String },

    #[error("Audit write timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable { message: msg.into() }
    }
}

/// Malformed rule table or configuration file. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid rule table: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid { message: msg.into() }
    }
}

/// Top-level error for gate setup
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("Config watcher error: {message}")]
    Watch { message: String },
}

pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_wraps_into_gate_error() {
        let err: GateError = ConfigError::invalid("rule table is empty").into();
        assert_eq!(err.to_string(), "Invalid rule table: rule table is empty");
    }

    #[test]
    fn timeout_message_names_budget() {
        let err = AuditError::Timeout { timeout_ms: 250 };
        assert_eq!(err.to_string(), "Audit write timed out after 250ms");
    }
}
