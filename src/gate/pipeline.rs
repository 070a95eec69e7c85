// SPDX-License-Identifier: Apache-2.0

//! Admission Pipeline
//!
//! Runs one request through the gate:
//! 1. Tokenize and segment the submitted text
//! 2. Classify every statement and evaluate it against one rule snapshot
//! 3. Write one audit record per statement
//! 4. Resolve the request verdict
//!
//! The verdict is returned only after the audit records are written. An
//! audit failure denies the request, whatever the rules said.

use std::sync::Arc;
use std::time::Duration;

use sqlgate_core::{
    statement_digest, AdmissionOutcome, AuditError, AuditKind, AuditRecord, DenyReason,
    GateResult, OperationCategory, StatementReport, Verdict,
};
use sqlgate_sql::{classify, segment, tokenize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::audit::{AuditSink, JsonlAuditSink, TracingAuditSink};
use super::policy::{evaluate, PolicyEngine};
use super::types::GateConfig;
use crate::observability::SqlPreview;

/// Rule id recorded for input with no statement
pub const EMPTY_QUERY_RULE: &str = "empty-query";

/// Rule id recorded for input that is not UTF-8
pub const INVALID_ENCODING_RULE: &str = "invalid-encoding";

/// The admission gate. Cheap to share behind an `Arc`; every request is
/// independent.
pub struct AdmissionGate {
    policy: Arc<PolicyEngine>,
    audit: Arc<dyn AuditSink>,
    audit_timeout: Duration,
    log_sql_preview: bool,
}

impl AdmissionGate {
    pub fn new(policy: Arc<PolicyEngine>, audit: Arc<dyn AuditSink>) -> Self {
        let defaults = GateConfig::default();
        Self {
            policy,
            audit,
            audit_timeout: Duration::from_millis(defaults.audit_timeout_ms),
            log_sql_preview: defaults.log_sql_preview,
        }
    }

    /// Build the gate described by `config`: a validated rule table and a
    /// JSONL sink at `audit_path`, or the tracing sink when none is set.
    pub async fn from_config(config: &GateConfig) -> GateResult<Self> {
        config.validate()?;
        let policy = Arc::new(PolicyEngine::new(config.rule_set())?);

        let audit: Arc<dyn AuditSink> = match &config.audit_path {
            Some(path) => Arc::new(JsonlAuditSink::open(path).await?),
            None => Arc::new(TracingAuditSink),
        };

        info!(
            sink = audit.name(),
            rules = config.rules.len(),
            enforcement = config.enforcement_enabled,
            "Admission gate initialized"
        );

        Ok(Self::new(policy, audit)
            .with_audit_timeout(Duration::from_millis(config.audit_timeout_ms))
            .with_sql_preview(config.log_sql_preview))
    }

    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    pub fn with_sql_preview(mut self, enabled: bool) -> Self {
        self.log_sql_preview = enabled;
        self
    }

    /// Rule engine, for reloads
    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    /// Decide whether `sql` may be executed. `context` labels the caller in
    /// audit records.
    pub async fn admit(&self, sql: &str, context: &str) -> AdmissionOutcome {
        let request_id = Uuid::new_v4().to_string();
        let tokens = tokenize(sql);
        let statements = segment(&tokens);

        if statements.is_empty() {
            let record = AuditRecord::rejected(
                &request_id,
                statement_digest(sql),
                EMPTY_QUERY_RULE,
                "empty query",
                context,
            );
            return self
                .finish_rejected(request_id, record, DenyReason::EmptyQuery, context)
                .await;
        }

        let rules = self.policy.snapshot();
        let mut reports = Vec::with_capacity(statements.len());
        let mut records = Vec::with_capacity(statements.len());

        for (index, statement) in statements.iter().enumerate() {
            let classification = classify(statement);
            let evaluation = evaluate(&rules, &classification);
            let digest = statement_digest(statement.text(sql));

            let kind = if evaluation.enforced {
                AuditKind::Decision
            } else {
                warn!(
                    request_id = %request_id,
                    statement = index,
                    category = %classification.category,
                    context,
                    "Statement admitted with SQL validation disabled"
                );
                AuditKind::EnforcementDisabled
            };

            for warning in &evaluation.warnings {
                warn!(request_id = %request_id, statement = index, "Advisory: {}", warning);
            }

            records.push(AuditRecord::for_decision(
                &request_id,
                index,
                digest.clone(),
                &evaluation.decision,
                context,
                kind,
            ));

            reports.push(StatementReport {
                index,
                start: statement.range.start,
                end: statement.range.end,
                digest,
                category: classification.category,
                fragments: classification.fragments.iter().map(|f| f.category).collect(),
                malformed: statement.is_malformed(),
                unbounded_scan: classification.category == OperationCategory::Read
                    && classification.predicates.unbounded_scan(&rules.exempt_prefixes),
                decision: evaluation.decision,
                warnings: evaluation.warnings,
            });
        }

        let verdict = match self.write_audit(records).await {
            Err(e) => {
                error!(request_id = %request_id, "Audit write failed, denying: {}", e);
                Verdict::Deny(DenyReason::AuditUnavailable {
                    message: e.to_string(),
                })
            }
            Ok(()) => match reports.iter().find(|r| !r.decision.is_allowed()) {
                Some(denied) => Verdict::Deny(DenyReason::PolicyViolation {
                    statement_index: denied.index,
                    category: denied.category,
                    rule: denied.decision.matched_rule.clone(),
                    message: denied.decision.reason.clone(),
                }),
                None => Verdict::Allow,
            },
        };

        match verdict.deny_reason() {
            None => info!(
                request_id = %request_id,
                statements = reports.len(),
                context,
                "Request admitted"
            ),
            Some(reason) => warn!(
                request_id = %request_id,
                statements = reports.len(),
                context,
                sql = %SqlPreview::new(sql, self.log_sql_preview),
                "Request denied: {}",
                reason
            ),
        }

        AdmissionOutcome {
            request_id,
            verdict,
            statements: reports,
        }
    }

    /// Like [`admit`](Self::admit) for raw bytes. Input that is not UTF-8 is
    /// denied without classification.
    pub async fn admit_bytes(&self, bytes: &[u8], context: &str) -> AdmissionOutcome {
        match std::str::from_utf8(bytes) {
            Ok(sql) => self.admit(sql, context).await,
            Err(e) => {
                let request_id = Uuid::new_v4().to_string();
                let message = e.to_string();
                let record = AuditRecord::rejected(
                    &request_id,
                    statement_digest(bytes),
                    INVALID_ENCODING_RULE,
                    &message,
                    context,
                );
                self.finish_rejected(
                    request_id,
                    record,
                    DenyReason::InvalidEncoding { message },
                    context,
                )
                .await
            }
        }
    }

    async fn finish_rejected(
        &self,
        request_id: String,
        record: AuditRecord,
        reason: DenyReason,
        context: &str,
    ) -> AdmissionOutcome {
        let reason = match self.write_audit(vec![record]).await {
            Ok(()) => reason,
            Err(e) => DenyReason::AuditUnavailable {
                message: e.to_string(),
            },
        };
        warn!(request_id = %request_id, context, "Request rejected: {}", reason);

        AdmissionOutcome {
            request_id,
            verdict: Verdict::Deny(reason),
            statements: Vec::new(),
        }
    }

    /// Write records in order, bounded by the audit timeout
    async fn write_audit(&self, records: Vec<AuditRecord>) -> Result<(), AuditError> {
        let count = records.len();
        let write = async {
            for record in records {
                self.audit.record(record).await?;
            }
            Ok::<(), AuditError>(())
        };

        match tokio::time::timeout(self.audit_timeout, write).await {
            Ok(result) => {
                if result.is_ok() {
                    debug!(records = count, sink = self.audit.name(), "Audit records written");
                }
                result
            }
            Err(_) => Err(AuditError::Timeout {
                timeout_ms: self.audit_timeout.as_millis() as u64,
            }),
        }
    }
}
