// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use sqlgate_lib::gate::{
    AdmissionGate, AuditQuery, GateConfig, JsonlAuditSink, MemoryAuditSink, PolicyEngine,
    ENFORCEMENT_DISABLED_RULE,
};
use sqlgate_lib::{AuditKind, DenyReason, OperationCategory, PolicyVerdict};

fn memory_gate() -> (AdmissionGate, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::new());
    let gate = AdmissionGate::new(Arc::new(PolicyEngine::default()), sink.clone());
    (gate, sink)
}

fn violation(reason: Option<&DenyReason>) -> (OperationCategory, String) {
    match reason {
        Some(DenyReason::PolicyViolation { category, rule, .. }) => (*category, rule.clone()),
        other => panic!("expected a policy violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unbounded_scan_is_denied() {
    let (gate, _) = memory_gate();
    let outcome = gate.admit("SELECT * FROM table1", "test").await;

    let (category, rule) = violation(outcome.deny_reason());
    assert_eq!(category, OperationCategory::Read);
    assert_eq!(rule, "deny-unbounded-scan");
    assert!(outcome.statements[0].unbounded_scan);
    assert!(outcome.statements[0]
        .decision
        .reason
        .to_lowercase()
        .contains("unbounded scan"));
}

#[tokio::test]
async fn test_exempt_catalog_scan_is_allowed() {
    let (gate, _) = memory_gate();
    let outcome = gate.admit("SELECT * FROM dbc.Tables", "test").await;
    assert!(outcome.is_allowed());
    assert_eq!(outcome.statements[0].category, OperationCategory::Read);
    assert!(!outcome.statements[0].unbounded_scan);
}

#[tokio::test]
async fn test_comment_prefixed_delete_is_denied() {
    let (gate, _) = memory_gate();
    let outcome = gate.admit("/* note */ DELETE FROM t", "test").await;
    let (category, rule) = violation(outcome.deny_reason());
    assert_eq!(category, OperationCategory::Write);
    assert_eq!(rule, "deny-non-read");
}

#[tokio::test]
async fn test_cte_wrapped_delete_is_denied() {
    let (gate, _) = memory_gate();
    let outcome = gate.admit("WITH cte AS (SELECT 1) DELETE FROM t", "test").await;
    let (category, _) = violation(outcome.deny_reason());
    assert_eq!(category, OperationCategory::Write);
}

#[tokio::test]
async fn test_filtered_read_is_allowed() {
    let (gate, sink) = memory_gate();
    let outcome = gate.admit("SELECT id FROM t WHERE id = 1", "test").await;
    assert!(outcome.is_allowed());
    assert_eq!(outcome.statements[0].category, OperationCategory::Read);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_audit_unavailable_denies() {
    let (gate, sink) = memory_gate();
    sink.set_available(false);
    let outcome = gate.admit("SELECT id FROM t WHERE id = 1", "test").await;
    assert!(matches!(
        outcome.deny_reason(),
        Some(DenyReason::AuditUnavailable { .. })
    ));
    assert!(outcome
        .deny_reason()
        .map_or(false, |r| r.to_string().starts_with("audit unavailable")));
}

#[tokio::test]
async fn test_dangerous_corpus_is_denied() {
    let corpus = [
        "DELETE FROM table1",
        "delete from table1 where id=1",
        "  DELETE FROM database.table WHERE condition = 'value'  ",
        "DELETE FROM DB.table1",
        "/* comment */ DELETE FROM table1",
        "SELECT * FROM table1; DELETE FROM table2",
        "WITH cte AS (SELECT * FROM table1) DELETE FROM table2",
        "(DELETE FROM table1)",
        "delete\nfrom\ntable1",
        "DELETE   FROM   table1",
        "UPSERT INTO table1 VALUES (1,2,3)",
        "MERGE INTO table1 USING table2 ON (condition)",
        "UPDATE table1 SET col1 = 'value'",
        "INSERT INTO table1 VALUES (1,2,3)",
        "DROP TABLE table1",
        "CREATE TABLE table1 (id INT)",
        "ALTER TABLE table1 ADD COLUMN col2 VARCHAR(50)",
        "TRUNCATE TABLE table1",
        "GRANT SELECT ON table1 TO user1",
        "REVOKE SELECT ON table1 FROM user1",
        "CALL procedure1()",
        "EXECUTE statement1",
        "EXEC sp_who",
        "LOCKING ROW FOR ACCESS DELETE FROM t",
        "SELECT 1; /*! DROP TABLE t */",
    ];

    let (gate, _) = memory_gate();
    for sql in corpus {
        let outcome = gate.admit(sql, "corpus").await;
        assert!(!outcome.is_allowed(), "{:?} was admitted", sql);
        assert!(
            outcome.statements.iter().any(|s| s.category.is_risky()),
            "{:?} has no risky statement",
            sql
        );
    }
}

#[tokio::test]
async fn test_safe_corpus_is_allowed() {
    let corpus = [
        "select id, name from table1 where id > 10",
        "SELECT COUNT(*) FROM database.table1",
        "SELECT t1.*, t2.name FROM table1 t1 JOIN table2 t2 ON t1.id = t2.id WHERE t1.id = 5",
        "SELECT * FROM table1 SAMPLE 100",
        "SELECT TOP 10 * FROM table1",
        "SELECT * FROM DBC.ColumnsV WHERE DatabaseName = 'x'",
        "SHOW TABLE db.t",
        "HELP DATABASE db",
        "SELECT 'DELETE FROM t' AS txt FROM t WHERE 1 = 1",
        "LOCKING ROW FOR ACCESS SELECT a FROM t WHERE b = 1",
    ];

    let (gate, _) = memory_gate();
    for sql in corpus {
        let outcome = gate.admit(sql, "corpus").await;
        assert!(outcome.is_allowed(), "{:?} was denied: {:?}", sql, outcome.deny_reason());
    }
}

#[tokio::test]
async fn test_reads_hiding_a_second_statement_are_denied() {
    let (gate, _) = memory_gate();
    for sql in [
        "SELECT ARRAY['a]', 'b']; DELETE FROM t; -- '",
        "SELECT E'\\'', 1; DELETE FROM t; -- '",
        "SELECT a FROM t WHERE b = 1 --x\rDELETE FROM t",
    ] {
        let outcome = gate.admit(sql, "test").await;
        assert!(!outcome.is_allowed(), "{:?} was admitted", sql);
        assert!(
            outcome
                .statements
                .iter()
                .any(|s| s.category == OperationCategory::Write),
            "{:?} has no write statement",
            sql
        );
    }
}

#[tokio::test]
async fn test_bound_elsewhere_does_not_admit_unbounded_scan() {
    let (gate, _) = memory_gate();
    for sql in [
        "WITH c AS (SELECT a FROM x WHERE a = 1) SELECT * FROM big_table",
        "SELECT * FROM big_table UNION ALL SELECT a FROM x WHERE a = 1",
        "SELECT * FROM \"dbc.big\"",
    ] {
        let outcome = gate.admit(sql, "test").await;
        let (category, rule) = violation(outcome.deny_reason());
        assert_eq!(category, OperationCategory::Read, "{}", sql);
        assert_eq!(rule, "deny-unbounded-scan", "{}", sql);
    }
}

#[tokio::test]
async fn test_full_memory_sink_denies_instead_of_dropping() {
    let sink = Arc::new(MemoryAuditSink::with_capacity(2));
    let gate = AdmissionGate::new(Arc::new(PolicyEngine::default()), sink.clone());

    for _ in 0..2 {
        let outcome = gate.admit("SELECT id FROM t WHERE id = 1", "test").await;
        assert!(outcome.is_allowed());
    }
    let outcome = gate.admit("SELECT id FROM t WHERE id = 1", "test").await;
    assert!(matches!(
        outcome.deny_reason(),
        Some(DenyReason::AuditUnavailable { .. })
    ));
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn test_count_star_carries_advisory() {
    let (gate, _) = memory_gate();
    let outcome = gate.admit("SELECT COUNT(*) FROM database.table1", "test").await;
    assert!(outcome.is_allowed());
    assert_eq!(outcome.warnings().len(), 1);
}

#[tokio::test]
async fn test_empty_and_comment_only_input() {
    let (gate, sink) = memory_gate();
    for sql in ["", "   \n\t", "/* nothing */", "-- just a comment", ";;;", "/*! DELETE FROM t */"] {
        let outcome = gate.admit(sql, "test").await;
        assert_eq!(outcome.deny_reason(), Some(&DenyReason::EmptyQuery), "{:?}", sql);
    }
    let rejected = sink.get_entries(
        100,
        0,
        &AuditQuery {
            kind: Some(AuditKind::Rejected),
            ..Default::default()
        },
    );
    assert_eq!(rejected.len(), 6);
}

#[tokio::test]
async fn test_unterminated_input_is_not_allowed() {
    let (gate, _) = memory_gate();
    for sql in [
        "SELECT 'unterminated FROM t WHERE a = 1",
        "SELECT a FROM t WHERE a = 1 /* DELETE FROM t",
        "SELECT \"open FROM t WHERE a = 1",
    ] {
        let outcome = gate.admit(sql, "test").await;
        assert!(!outcome.is_allowed(), "{:?} was admitted", sql);
        assert!(outcome.statements.iter().any(|s| s.malformed));
    }
}

#[tokio::test]
async fn test_escape_hatch_writes_distinguished_record() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");

    let mut config = GateConfig::from_json("{}").unwrap();
    config.apply_env_overrides(|key| {
        (key == "SQLGATE_DISABLE_SQL_VALIDATION").then(|| "true".to_string())
    });
    config.audit_path = Some(audit_path.clone());

    let gate = AdmissionGate::from_config(&config).await.unwrap();
    let outcome = gate.admit("DROP TABLE t; SELECT * FROM u", "ops").await;
    assert!(outcome.is_allowed());

    let records = JsonlAuditSink::read_records(&audit_path).unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.kind, AuditKind::EnforcementDisabled);
        assert_eq!(record.matched_rule, ENFORCEMENT_DISABLED_RULE);
        assert_eq!(record.verdict, PolicyVerdict::Allow);
        assert_eq!(record.request_id, outcome.request_id);
        assert_eq!(record.execution_context, "ops");
    }
    assert_eq!(records[0].category, Some(OperationCategory::SchemaChange));
}

#[tokio::test]
async fn test_jsonl_audit_never_stores_sql_text() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let config = GateConfig {
        audit_path: Some(audit_path.clone()),
        ..Default::default()
    };
    let gate = AdmissionGate::from_config(&config).await.unwrap();
    gate.admit("SELECT secret_column FROM t WHERE ssn = '123-45-6789'", "test")
        .await;

    let content = std::fs::read_to_string(&audit_path).unwrap();
    assert!(!content.contains("secret_column"));
    assert!(!content.contains("123-45-6789"));
    assert_eq!(content.lines().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_independent() {
    let sink = Arc::new(MemoryAuditSink::with_capacity(10_000));
    let gate = Arc::new(AdmissionGate::new(
        Arc::new(PolicyEngine::default()),
        sink.clone(),
    ));

    let mut handles = Vec::new();
    for i in 0..64 {
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            let sql = if i % 2 == 0 {
                format!("SELECT a FROM t WHERE id = {}", i)
            } else {
                format!("DELETE FROM t WHERE id = {}", i)
            };
            (i, gate.admit(&sql, "load").await)
        }));
    }

    for handle in handles {
        let (i, outcome) = handle.await.unwrap();
        assert_eq!(outcome.is_allowed(), i % 2 == 0, "request {}", i);
        let records = sink.get_entries(
            10,
            0,
            &AuditQuery {
                request_id: Some(&outcome.request_id),
                ..Default::default()
            },
        );
        assert_eq!(records.len(), 1);
    }
    assert_eq!(sink.len(), 64);
    assert_eq!(sink.get_stats().denied, 32);
}

#[tokio::test]
async fn test_outcome_serializes_for_callers() {
    let (gate, _) = memory_gate();
    let outcome = gate.admit("DELETE FROM t", "test").await;
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["verdict"], "deny");
    assert_eq!(json["reason"]["kind"], "policy_violation");
    assert_eq!(json["statements"][0]["category"], "write");
}
