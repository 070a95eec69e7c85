// SPDX-License-Identifier: Apache-2.0

//! Keyword tables.
//!
//! Every anchor keyword is also reserved so the lexer tags it as a
//! `Keyword` token. Lookups expect upper-cased ASCII input.

use sqlgate_core::OperationCategory;

/// Reserved words, sorted for binary search.
const RESERVED: &[&str] = &[
    "ACCESS", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CALL", "CASE",
    "CAST", "COPY", "CREATE", "CROSS", "DATABASE", "DEL", "DELETE", "DESC", "DESCRIBE",
    "DISTINCT", "DROP", "ELSE", "END", "EXCEPT", "EXEC", "EXECUTE", "EXISTS", "EXPLAIN",
    "FETCH", "FIRST", "FOR", "FROM", "FULL", "GIVE", "GRANT", "GROUP", "HAVING", "HELP", "IN",
    "INNER", "INS", "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "LATERAL", "LEFT", "LIKE",
    "LIMIT", "LOCK", "LOCKING", "MERGE", "MINUS", "NATURAL", "NEXT", "NOT", "NULL", "OFFSET",
    "ON", "ONLY", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "QUALIFY", "RECURSIVE",
    "RENAME", "REPLACE", "REVOKE", "RIGHT", "ROW", "ROWS", "SAMPLE", "SEL", "SELECT", "SET",
    "SHOW", "TABLE", "THEN", "TO", "TOP", "TRUNCATE", "UNION", "UPD", "UPDATE", "UPSERT",
    "USING", "VALUES", "VIEW", "WHEN", "WHERE", "WINDOW", "WITH",
];

pub fn is_reserved(upper: &str) -> bool {
    RESERVED.binary_search(&upper).is_ok()
}

/// Category anchored by a keyword, if any.
pub fn anchor_category(upper: &str) -> Option<OperationCategory> {
    let category = match upper {
        "SELECT" | "SEL" | "WITH" | "SHOW" | "HELP" | "EXPLAIN" | "DESCRIBE" | "VALUES" => {
            OperationCategory::Read
        }
        "INSERT" | "INS" | "UPDATE" | "UPD" | "DELETE" | "DEL" | "MERGE" | "UPSERT"
        | "REPLACE" | "COPY" => OperationCategory::Write,
        "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "RENAME" => OperationCategory::SchemaChange,
        "GRANT" | "REVOKE" | "GIVE" => OperationCategory::PrivilegeChange,
        "CALL" | "EXEC" | "EXECUTE" => OperationCategory::ProcedureCall,
        _ => return None,
    };
    Some(category)
}

/// Words that start the query body of a read statement.
pub fn is_select(upper: &str) -> bool {
    matches!(upper, "SELECT" | "SEL")
}

/// Filtering, bounding and sampling clauses.
pub fn is_bounding(upper: &str) -> bool {
    matches!(
        upper,
        "WHERE" | "TOP" | "SAMPLE" | "LIMIT" | "FETCH" | "QUALIFY"
    )
}

/// Request modifiers that may precede the statement's real leading keyword
/// (`LOCKING ROW FOR ACCESS SELECT ...`).
pub fn is_request_modifier(upper: &str) -> bool {
    matches!(upper, "LOCKING" | "LOCK")
}

/// Keywords that end a `FROM` list at the top level of a query.
pub fn ends_from_clause(upper: &str) -> bool {
    matches!(
        upper,
        "WHERE"
            | "GROUP"
            | "ORDER"
            | "HAVING"
            | "QUALIFY"
            | "UNION"
            | "INTERSECT"
            | "EXCEPT"
            | "MINUS"
            | "SAMPLE"
            | "TOP"
            | "LIMIT"
            | "FETCH"
            | "OFFSET"
            | "WINDOW"
    )
}

/// Stored and extended procedure prefixes (`sp_who`, `xp_cmdshell`).
pub fn is_procedure_name(word: &str) -> bool {
    let bytes = word.as_bytes();
    bytes.len() > 3
        && (bytes[..3].eq_ignore_ascii_case(b"sp_") || bytes[..3].eq_ignore_ascii_case(b"xp_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_table_is_sorted() {
        let mut sorted = RESERVED.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED);
    }

    #[test]
    fn every_anchor_is_reserved() {
        let anchors = [
            "SELECT", "SEL", "WITH", "SHOW", "HELP", "EXPLAIN", "DESCRIBE", "VALUES", "INSERT",
            "INS", "UPDATE", "UPD", "DELETE", "DEL", "MERGE", "UPSERT", "REPLACE", "COPY",
            "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME", "GRANT", "REVOKE", "GIVE", "CALL",
            "EXEC", "EXECUTE",
        ];
        for anchor in anchors {
            assert!(is_reserved(anchor), "{} must be reserved", anchor);
            assert!(anchor_category(anchor).is_some());
        }
    }

    #[test]
    fn procedure_prefixes() {
        assert!(is_procedure_name("xp_cmdshell"));
        assert!(is_procedure_name("SP_WHO"));
        assert!(!is_procedure_name("sp_"));
        assert!(!is_procedure_name("spx_total"));
    }
}
