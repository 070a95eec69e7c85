// SPDX-License-Identifier: Apache-2.0

//! Gate Types
//!
//! Rule table and configuration types for the admission gate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlgate_core::{ConfigError, OperationCategory};

/// Environment variable that switches enforcement off at load time
pub const DISABLE_VALIDATION_ENV: &str = "SQLGATE_DISABLE_SQL_VALIDATION";

/// Condition a rule matches on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Statement category is one of `categories`
    Category { categories: Vec<OperationCategory> },
    /// Read statement scanning a non-exempt source with `*` and no bound
    UnboundedScan,
    /// Read statement likely to return a large result set
    LargeResult,
    /// Every statement
    Any,
}

/// Action to take when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
    /// Record an advisory warning and keep evaluating
    Warn,
}

/// One row of the ordered rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Unique identifier, reported as `matched_rule`
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

fn default_true() -> bool {
    true
}

/// Immutable snapshot consumed by the policy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<PolicyRule>,
    /// Source-name prefixes exempt from the unbounded-scan rule
    pub exempt_prefixes: Vec<String>,
    /// Escape hatch; when false every statement is admitted and audited as such
    pub enforcement_enabled: bool,
}

impl RuleSet {
    /// Reject tables that could start the gate in an ambiguous state.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.iter().all(|r| !r.enabled) {
            return Err(ConfigError::invalid("rule table has no enabled rule"));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(ConfigError::invalid("rule id must not be empty"));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate rule id '{}'",
                    rule.id
                )));
            }
            if let RuleCondition::Category { categories } = &rule.condition {
                if categories.is_empty() {
                    return Err(ConfigError::invalid(format!(
                        "rule '{}' has an empty category list",
                        rule.id
                    )));
                }
            }
            // Allow is only ever reachable for reads
            if rule.action == RuleAction::Allow
                && rule.condition
                    != (RuleCondition::Category {
                        categories: vec![OperationCategory::Read],
                    })
            {
                return Err(ConfigError::invalid(format!(
                    "rule '{}' allows more than read statements",
                    rule.id
                )));
            }
        }

        if self.exempt_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid("exempt prefixes must not be empty"));
        }

        Ok(())
    }
}

/// Gate configuration, loaded from a JSON file at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Whether rules are enforced
    #[serde(default = "default_true")]
    pub enforcement_enabled: bool,
    /// Ordered rule table
    #[serde(default = "super::policy::builtin_rules")]
    pub rules: Vec<PolicyRule>,
    /// Source prefixes exempt from the unbounded-scan rule
    #[serde(default = "default_exempt_prefixes")]
    pub exempt_prefixes: Vec<String>,
    /// Upper bound on the audit write for one request (milliseconds)
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,
    /// JSON-lines audit log; records go to the tracing stream when unset
    #[serde(default)]
    pub audit_path: Option<PathBuf>,
    /// Log statement previews instead of redacting them
    #[serde(default)]
    pub log_sql_preview: bool,
}

fn default_exempt_prefixes() -> Vec<String> {
    vec!["dbc.".to_string(), "information_schema.".to_string()]
}

fn default_audit_timeout_ms() -> u64 {
    2000
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enforcement_enabled: true,
            rules: super::policy::builtin_rules(),
            exempt_prefixes: default_exempt_prefixes(),
            audit_timeout_ms: default_audit_timeout_ms(),
            audit_path: None,
            log_sql_preview: false,
        }
    }
}

impl GateConfig {
    /// Read, parse, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without environment overrides or validation
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `SQLGATE_DISABLE_SQL_VALIDATION=true`
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if var(DISABLE_VALIDATION_ENV).map_or(false, |v| v.trim().eq_ignore_ascii_case("true")) {
            self.enforcement_enabled = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit_timeout_ms == 0 {
            return Err(ConfigError::invalid("audit_timeout_ms must be positive"));
        }
        self.rule_set().validate()
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            rules: self.rules.clone(),
            exempt_prefixes: self.exempt_prefixes.clone(),
            enforcement_enabled: self.enforcement_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = GateConfig::from_json("{}").unwrap();
        assert!(config.enforcement_enabled);
        assert_eq!(config.rules, crate::gate::policy::builtin_rules());
        assert_eq!(config.exempt_prefixes, vec!["dbc.", "information_schema."]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_rule_table() {
        let config = GateConfig::from_json(
            r#"{
                "exempt_prefixes": ["dbc.", "sys_calendar."],
                "rules": [
                    {"id": "deny-risky", "condition": {"type": "category", "categories": ["write", "unknown"]}, "action": "deny"},
                    {"id": "deny-scan", "condition": {"type": "unbounded_scan"}, "action": "deny"},
                    {"id": "allow-read", "condition": {"type": "category", "categories": ["read"]}, "action": "allow"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.rules.len(), 3);
        assert_eq!(config.rules[1].condition, RuleCondition::UnboundedScan);
        assert!(config.rules[0].enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_allow_beyond_read() {
        let mut rules = crate::gate::policy::builtin_rules();
        rules.push(PolicyRule {
            id: "allow-all".to_string(),
            description: String::new(),
            enabled: true,
            condition: RuleCondition::Any,
            action: RuleAction::Allow,
        });
        let config = GateConfig {
            rules,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("allow-all"));

        let config = GateConfig {
            rules: vec![PolicyRule {
                id: "allow-writes".to_string(),
                description: String::new(),
                enabled: true,
                condition: RuleCondition::Category {
                    categories: vec![OperationCategory::Read, OperationCategory::Write],
                },
                action: RuleAction::Allow,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_and_empty_tables() {
        let mut rules = crate::gate::policy::builtin_rules();
        rules.push(rules[0].clone());
        let config = GateConfig {
            rules,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("duplicate"));

        let config = GateConfig {
            rules: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            GateConfig::from_json("{\"rules\": 3}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_override_disables_enforcement() {
        let mut config = GateConfig::default();
        config.apply_env_overrides(|_| Some("TRUE".to_string()));
        assert!(!config.enforcement_enabled);

        let mut config = GateConfig::default();
        config.apply_env_overrides(|_| Some("no".to_string()));
        assert!(config.enforcement_enabled);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = GateConfig::load(Path::new("/nonexistent/sqlgate.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
