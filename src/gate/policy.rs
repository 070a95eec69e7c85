// SPDX-License-Identifier: Apache-2.0

//! Policy Engine
//!
//! Evaluates classified statements against an ordered rule table. The
//! first matching allow or deny rule decides; warn rules only add
//! advisories. A statement no rule decides is denied.

use std::sync::Arc;

use parking_lot::RwLock;
use sqlgate_core::{ConfigError, OperationCategory, PolicyDecision};
use sqlgate_sql::Classification;
use tracing::{debug, info, warn};

use super::types::{GateConfig, PolicyRule, RuleAction, RuleCondition, RuleSet};

/// Rule id reported for statements admitted while enforcement is off
pub const ENFORCEMENT_DISABLED_RULE: &str = "enforcement-disabled";

/// Rule id reported when no rule decided a statement
pub const NO_MATCHING_RULE: &str = "no-matching-rule";

/// Built-in rule table
pub fn builtin_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            id: "deny-non-read".to_string(),
            description: "Only read statements may run".to_string(),
            enabled: true,
            condition: RuleCondition::Category {
                categories: OperationCategory::ALL
                    .iter()
                    .copied()
                    .filter(|c| *c != OperationCategory::Read)
                    .collect(),
            },
            action: RuleAction::Deny,
        },
        PolicyRule {
            id: "deny-unbounded-scan".to_string(),
            description: "Unbounded scan: SELECT * without a filtering or limiting clause".to_string(),
            enabled: true,
            condition: RuleCondition::UnboundedScan,
            action: RuleAction::Deny,
        },
        PolicyRule {
            id: "warn-large-result".to_string(),
            description: "Query may return a large result set".to_string(),
            enabled: true,
            condition: RuleCondition::LargeResult,
            action: RuleAction::Warn,
        },
        PolicyRule {
            id: "allow-read".to_string(),
            description: "Read statement".to_string(),
            enabled: true,
            condition: RuleCondition::Category {
                categories: vec![OperationCategory::Read],
            },
            action: RuleAction::Allow,
        },
    ]
}

impl Default for RuleSet {
    fn default() -> Self {
        GateConfig::default().rule_set()
    }
}

/// Decision for one statement plus the advisories raised on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: PolicyDecision,
    /// Messages from matching warn rules
    pub warnings: Vec<String>,
    /// False when the decision came from the enforcement escape hatch
    pub enforced: bool,
}

/// Evaluate one classification against a rule snapshot.
pub fn evaluate(rules: &RuleSet, classification: &Classification) -> Evaluation {
    let category = classification.category;

    if !rules.enforcement_enabled {
        return Evaluation {
            decision: PolicyDecision::allow(
                category,
                ENFORCEMENT_DISABLED_RULE,
                "SQL validation is disabled",
            ),
            warnings: Vec::new(),
            enforced: false,
        };
    }

    let mut warnings = Vec::new();
    for rule in rules.rules.iter().filter(|r| r.enabled) {
        if !matches_rule(rule, classification, &rules.exempt_prefixes) {
            continue;
        }

        let message = rule_message(rule, classification);
        match rule.action {
            RuleAction::Warn => {
                debug!(rule = %rule.id, "Advisory rule matched");
                warnings.push(message);
            }
            RuleAction::Allow => {
                return Evaluation {
                    decision: PolicyDecision::allow(category, rule.id.clone(), message),
                    warnings,
                    enforced: true,
                };
            }
            RuleAction::Deny => {
                return Evaluation {
                    decision: PolicyDecision::deny(category, rule.id.clone(), message),
                    warnings,
                    enforced: true,
                };
            }
        }
    }

    Evaluation {
        decision: PolicyDecision::deny(category, NO_MATCHING_RULE, "No rule admits this statement"),
        warnings,
        enforced: true,
    }
}

fn matches_rule(rule: &PolicyRule, classification: &Classification, exempt: &[String]) -> bool {
    let category = classification.category;
    match &rule.condition {
        RuleCondition::Category { categories } => categories.contains(&category),
        RuleCondition::UnboundedScan => {
            category == OperationCategory::Read
                && classification.predicates.unbounded_scan(exempt)
        }
        RuleCondition::LargeResult => {
            category == OperationCategory::Read && classification.predicates.large_result
        }
        RuleCondition::Any => true,
    }
}

fn rule_message(rule: &PolicyRule, classification: &Classification) -> String {
    let mut message = if rule.description.is_empty() {
        format!("Matched rule '{}'", rule.id)
    } else {
        rule.description.clone()
    };

    match &rule.condition {
        RuleCondition::Category { .. } if classification.category.is_risky() => {
            message.push_str(&format!(" ({} statement", classification.category.label()));
            if let Some(anchor) = &classification.escalated_by {
                message.push_str(&format!(", found {}", anchor));
            }
            message.push(')');
        }
        RuleCondition::UnboundedScan | RuleCondition::LargeResult => {
            if !classification.predicates.sources.is_empty() {
                message.push_str(&format!(
                    " on {}",
                    classification.predicates.sources.join(", ")
                ));
            }
        }
        _ => {}
    }
    message
}

/// Holds the current rule snapshot. Requests take one snapshot and use it
/// for every statement; a reload swaps the whole table at once.
pub struct PolicyEngine {
    rules: RwLock<Arc<RuleSet>>,
}

impl PolicyEngine {
    /// Create an engine after validating `rules`
    pub fn new(rules: RuleSet) -> Result<Self, ConfigError> {
        rules.validate()?;
        if !rules.enforcement_enabled {
            warn!("SQL validation is disabled; every statement will be admitted");
        }
        Ok(Self {
            rules: RwLock::new(Arc::new(rules)),
        })
    }

    /// Current rule table
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules.read())
    }

    /// Validate and swap in a new rule table. On error the current table
    /// stays in place.
    pub fn replace(&self, rules: RuleSet) -> Result<(), ConfigError> {
        rules.validate()?;
        let count = rules.rules.len();
        let enforcement = rules.enforcement_enabled;
        *self.rules.write() = Arc::new(rules);
        info!(rules = count, enforcement, "Rule table replaced");
        Ok(())
    }

    /// Evaluate against the current snapshot
    pub fn check(&self, classification: &Classification) -> Evaluation {
        evaluate(&self.snapshot(), classification)
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self {
            rules: RwLock::new(Arc::new(RuleSet::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_sql::{classify, segment, tokenize};

    fn check(engine: &PolicyEngine, sql: &str) -> Evaluation {
        let tokens = tokenize(sql);
        let statements = segment(&tokens);
        assert_eq!(statements.len(), 1, "{:?}", sql);
        engine.check(&classify(&statements[0]))
    }

    #[test]
    fn builtin_rules_are_valid() {
        assert!(RuleSet::default().validate().is_ok());
    }

    #[test]
    fn bounded_read_is_allowed() {
        let engine = PolicyEngine::default();
        let eval = check(&engine, "SELECT id FROM t WHERE id = 1");
        assert!(eval.decision.is_allowed());
        assert_eq!(eval.decision.matched_rule, "allow-read");
        assert!(eval.warnings.is_empty());
        assert!(eval.enforced);
    }

    #[test]
    fn write_is_denied_with_category() {
        let engine = PolicyEngine::default();
        let eval = check(&engine, "DELETE FROM t");
        assert!(!eval.decision.is_allowed());
        assert_eq!(eval.decision.category, OperationCategory::Write);
        assert_eq!(eval.decision.matched_rule, "deny-non-read");
        assert!(eval.decision.reason.contains("write"));
    }

    #[test]
    fn escalated_anchor_is_named() {
        let engine = PolicyEngine::default();
        let eval = check(&engine, "SELECT * FROM (DROP TABLE t) x");
        assert_eq!(eval.decision.matched_rule, "deny-non-read");
        assert_eq!(eval.decision.category, OperationCategory::SchemaChange);
    }

    #[test]
    fn unknown_statement_is_denied() {
        let engine = PolicyEngine::default();
        let eval = check(&engine, "VACUUM t");
        assert_eq!(eval.decision.category, OperationCategory::Unknown);
        assert!(!eval.decision.is_allowed());
    }

    #[test]
    fn unbounded_scan_is_denied_unless_exempt() {
        let engine = PolicyEngine::default();
        let eval = check(&engine, "SELECT * FROM sales.orders");
        assert_eq!(eval.decision.matched_rule, "deny-unbounded-scan");
        assert!(eval.decision.reason.contains("sales.orders"));

        let eval = check(&engine, "SELECT * FROM DBC.TablesV");
        assert!(eval.decision.is_allowed());
        // exempt scans still carry the advisory
        assert_eq!(eval.warnings.len(), 1);
    }

    #[test]
    fn count_star_warns_but_is_allowed() {
        let engine = PolicyEngine::default();
        let eval = check(&engine, "SELECT COUNT(*) FROM t");
        assert!(eval.decision.is_allowed());
        assert_eq!(eval.warnings.len(), 1);
        assert!(eval.warnings[0].contains("large result"));
    }

    #[test]
    fn no_matching_rule_denies() {
        let rules = RuleSet {
            rules: vec![PolicyRule {
                id: "deny-writes".to_string(),
                description: String::new(),
                enabled: true,
                condition: RuleCondition::Category {
                    categories: vec![OperationCategory::Write],
                },
                action: RuleAction::Deny,
            }],
            ..Default::default()
        };
        let engine = PolicyEngine::new(rules).unwrap();
        let eval = check(&engine, "SELECT a FROM t WHERE a = 1");
        assert!(!eval.decision.is_allowed());
        assert_eq!(eval.decision.matched_rule, NO_MATCHING_RULE);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let mut rules = RuleSet::default();
        rules.rules[1].enabled = false;
        let engine = PolicyEngine::new(rules).unwrap();
        let eval = check(&engine, "SELECT * FROM sales.orders");
        assert!(eval.decision.is_allowed());
    }

    #[test]
    fn escape_hatch_admits_everything() {
        let rules = RuleSet {
            enforcement_enabled: false,
            ..Default::default()
        };
        let engine = PolicyEngine::new(rules).unwrap();
        let eval = check(&engine, "DROP TABLE t");
        assert!(eval.decision.is_allowed());
        assert_eq!(eval.decision.matched_rule, ENFORCEMENT_DISABLED_RULE);
        assert_eq!(eval.decision.category, OperationCategory::SchemaChange);
        assert!(!eval.enforced);
    }

    #[test]
    fn invalid_replacement_keeps_current_table() {
        let engine = PolicyEngine::default();
        let before = engine.snapshot();
        let err = engine.replace(RuleSet {
            rules: Vec::new(),
            ..Default::default()
        });
        assert!(err.is_err());
        assert_eq!(*engine.snapshot(), *before);

        let mut rules = RuleSet::default();
        rules.exempt_prefixes.push("sys_calendar.".to_string());
        engine.replace(rules).unwrap();
        assert_eq!(engine.snapshot().exempt_prefixes.len(), 3);
        // the old snapshot is untouched
        assert_eq!(before.exempt_prefixes.len(), 2);
    }
}
