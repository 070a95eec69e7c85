// SPDX-License-Identifier: Apache-2.0

//! Operation categories assigned by the classifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of operation categories a statement can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Read,
    Write,
    SchemaChange,
    PrivilegeChange,
    ProcedureCall,
    /// Conservative default when no anchor keyword could be recognized.
    Unknown,
}

impl Default for OperationCategory {
    fn default() -> Self {
        Self::Unknown
    }
}

impl OperationCategory {
    pub const ALL: [OperationCategory; 6] = [
        Self::Read,
        Self::Write,
        Self::SchemaChange,
        Self::PrivilegeChange,
        Self::ProcedureCall,
        Self::Unknown,
    ];

    /// Returns true for every category other than `Read`.
    pub fn is_risky(&self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Escalation rank. Unknown sits above Read so that doubt never
    /// downgrades a statement, and below every anchored risky category
    /// so that a recognized mutation is reported as such.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Read => 0,
            Self::Unknown => 1,
            Self::Write => 2,
            Self::SchemaChange => 3,
            Self::PrivilegeChange => 4,
            Self::ProcedureCall => 5,
        }
    }

    /// The more severe of two categories; ties keep `self`.
    pub fn max_severity(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::SchemaChange => "schema_change",
            Self::PrivilegeChange => "privilege_change",
            Self::ProcedureCall => "procedure_call",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable label used in denial reasons.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::SchemaChange => "schema change",
            Self::PrivilegeChange => "privilege change",
            Self::ProcedureCall => "procedure call",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
