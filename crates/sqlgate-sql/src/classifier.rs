// SPDX-License-Identifier: Apache-2.0

//! Operation classifier
//!
//! Assigns an [`OperationCategory`] to a segmented statement. The leading
//! word gives the base category; the whole statement is then scanned for
//! risky anchors, so a read-looking statement carrying a mutating clause is
//! escalated to the most severe category found. Comment bodies that an
//! engine could execute are scanned too.

use serde::Serialize;
use sqlgate_core::OperationCategory;
use tracing::debug;

use crate::keywords;
use crate::lexer::{backslash_tail, tokenize, Token, TokenKind};
use crate::segmenter::{hidden_code, Statement};

/// One top-level `SELECT` branch of a read (a CTE body is not one; each
/// side of a `UNION` is)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BranchScan {
    /// A bare `*` appears in the branch projection
    pub unrestricted_projection: bool,
    /// A filtering, bounding or sampling clause appears inside the branch
    pub bounded: bool,
    /// Sources named in the branch `FROM` clause
    pub sources: Vec<String>,
}

impl BranchScan {
    fn unbounded_scan(&self, exempt_prefixes: &[String]) -> bool {
        self.unrestricted_projection
            && !self.bounded
            && !self.sources.is_empty()
            && !self
                .sources
                .iter()
                .all(|source| is_exempt_source(source, exempt_prefixes))
    }
}

/// Shape facts about a read statement, consumed by the policy rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatementPredicates {
    /// Some top-level branch projects a bare `*`
    pub unrestricted_projection: bool,
    /// Every top-level branch carries its own bound
    pub bounded: bool,
    /// Top-level sources read by the query (`db.table`, `(subquery)`)
    pub sources: Vec<String>,
    pub branches: Vec<BranchScan>,
    /// Advisory: a branch with `*` or `COUNT(*)` and no bound
    pub large_result: bool,
    /// An unterminated literal or comment was found
    pub malformed: bool,
}

impl StatementPredicates {
    /// Some branch scans a full table that is not an exempt source
    pub fn unbounded_scan(&self, exempt_prefixes: &[String]) -> bool {
        self.branches
            .iter()
            .any(|branch| branch.unbounded_scan(exempt_prefixes))
    }
}

/// Case-insensitive prefix match against the exempt list
pub fn is_exempt_source(source: &str, exempt_prefixes: &[String]) -> bool {
    let source = source.to_ascii_lowercase();
    exempt_prefixes
        .iter()
        .any(|prefix| source.starts_with(&prefix.to_ascii_lowercase()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: OperationCategory,
    /// Normalized leading word, after request modifiers
    pub leading: Option<String>,
    /// Anchor keyword that raised the category above the leading word's
    pub escalated_by: Option<String>,
    pub predicates: StatementPredicates,
    /// Independent classifications of nested fragments
    pub fragments: Vec<Classification>,
}

impl Classification {
    pub fn is_risky(&self) -> bool {
        self.category.is_risky() || self.fragments.iter().any(Classification::is_risky)
    }
}

/// Classify one statement. Pure: the same statement always yields the
/// same classification.
pub fn classify(statement: &Statement<'_>) -> Classification {
    let leading = leading_word(&statement.tokens);
    let base = leading
        .as_deref()
        .and_then(keywords::anchor_category)
        .unwrap_or(OperationCategory::Unknown);

    let mut strongest = None;
    scan_risky_anchors(&statement.tokens, &mut strongest);
    scan_risky_anchors(&statement.comments, &mut strongest);

    let mut category = base;
    let mut escalated_by = None;
    if let Some((risky, word)) = strongest {
        if risky.severity() > category.severity() {
            category = risky;
            escalated_by = Some(word);
        }
    }

    let malformed = statement.is_malformed();
    if malformed {
        category = category.max_severity(OperationCategory::Unknown);
    }

    let fragments: Vec<Classification> = statement.fragments.iter().map(classify).collect();
    for fragment in &fragments {
        category = category.max_severity(fragment.category);
    }

    let predicates = if category == OperationCategory::Read {
        read_predicates(&statement.tokens)
    } else {
        StatementPredicates {
            malformed,
            ..Default::default()
        }
    };

    debug!(
        category = %category,
        leading = ?leading,
        escalated_by = ?escalated_by,
        malformed,
        "Classified statement"
    );

    Classification {
        category,
        leading,
        escalated_by,
        predicates,
        fragments,
    }
}

/// First word of the statement, skipping opening parentheses. For a
/// request modifier (`LOCKING ... FOR ACCESS`) the first anchor after it
/// stands in.
fn leading_word(tokens: &[Token<'_>]) -> Option<String> {
    let mut rest = tokens.iter().skip_while(|t| t.is_separator('('));
    let first = rest.next().filter(|t| t.is_word())?;
    let word = first.normalized();

    if keywords::is_request_modifier(&word) {
        return rest
            .filter(|t| t.is_word())
            .map(|t| t.normalized())
            .find(|w| keywords::anchor_category(w).is_some())
            .map(|w| w.into_owned());
    }
    Some(word.into_owned())
}

fn risky_anchor(token: &Token<'_>) -> Option<OperationCategory> {
    match token.kind {
        TokenKind::Keyword => {
            keywords::anchor_category(&token.normalized()).filter(OperationCategory::is_risky)
        }
        TokenKind::Identifier if token.is_word() && keywords::is_procedure_name(token.text) => {
            Some(OperationCategory::ProcedureCall)
        }
        _ => None,
    }
}

/// Record the most severe risky anchor in `tokens`, descending into
/// comment bodies that may be executed.
fn scan_risky_anchors(tokens: &[Token<'_>], strongest: &mut Option<(OperationCategory, String)>) {
    for token in tokens {
        if token.kind == TokenKind::Comment {
            if let Some(code) = hidden_code(token) {
                scan_risky_anchors(&tokenize(code), strongest);
            }
            continue;
        }
        if let Some(tail) = backslash_tail(token) {
            scan_risky_anchors(&tokenize(tail), strongest);
        }

        let Some(category) = risky_anchor(token) else {
            continue;
        };
        let stronger = strongest
            .as_ref()
            .map_or(true, |(current, _)| category.severity() > current.severity());
        if stronger {
            *strongest = Some((category, token.normalized().into_owned()));
        }
    }
}

/// Paren depth of every token; parentheses sit at their outer depth.
fn depths(tokens: &[Token<'_>]) -> Vec<usize> {
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|t| {
            if t.is_separator('(') {
                depth += 1;
                depth - 1
            } else if t.is_separator(')') {
                depth = depth.saturating_sub(1);
                depth
            } else {
                depth
            }
        })
        .collect()
}

fn read_predicates(tokens: &[Token<'_>]) -> StatementPredicates {
    let depths = depths(tokens);
    let top = tokens
        .iter()
        .position(|t| !t.is_separator('('))
        .map_or(0, |i| depths[i]);

    let starts: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|&(i, t)| {
            depths[i] == top && t.kind == TokenKind::Keyword && keywords::is_select(&t.normalized())
        })
        .map(|(i, _)| i)
        .collect();

    let mut branches = Vec::with_capacity(starts.len());
    let mut large_result = false;
    for (n, &select) in starts.iter().enumerate() {
        let branch_end = starts.get(n + 1).copied().unwrap_or(tokens.len());
        let body = &tokens[select..branch_end];
        let from = (select + 1..branch_end)
            .find(|&i| depths[i] == top && tokens[i].is_keyword("FROM"));

        let projection_end = from.unwrap_or(branch_end);
        let unrestricted_projection = (select + 1..projection_end)
            .any(|i| depths[i] == top && is_wildcard(tokens, i));
        let bounded = body
            .iter()
            .any(|t| t.kind == TokenKind::Keyword && keywords::is_bounding(&t.normalized()));

        let mut sources = Vec::new();
        if let Some(from) = from {
            collect_sources(tokens, &depths, top, from + 1, branch_end, &mut sources);
        }

        large_result |= (unrestricted_projection || counts_all(body)) && !bounded;
        branches.push(BranchScan {
            unrestricted_projection,
            bounded,
            sources,
        });
    }

    StatementPredicates {
        unrestricted_projection: branches.iter().any(|b| b.unrestricted_projection),
        bounded: !branches.is_empty() && branches.iter().all(|b| b.bounded),
        sources: branches.iter().flat_map(|b| b.sources.iter().cloned()).collect(),
        branches,
        large_result,
        malformed: false,
    }
}

fn counts_all(tokens: &[Token<'_>]) -> bool {
    tokens.windows(4).any(|w| {
        w[0].is_word()
            && w[0].text.eq_ignore_ascii_case("COUNT")
            && w[1].is_separator('(')
            && w[2].is_operator("*")
            && w[3].is_separator(')')
    })
}

/// `*` used as a projection wildcard rather than multiplication or `t.*`
fn is_wildcard(tokens: &[Token<'_>], i: usize) -> bool {
    if !tokens[i].is_operator("*") || i == 0 {
        return false;
    }
    let prev = &tokens[i - 1];
    match prev.kind {
        TokenKind::Keyword => matches!(
            prev.normalized().as_ref(),
            "SELECT" | "SEL" | "DISTINCT" | "ALL"
        ),
        TokenKind::Separator => prev.is_separator(','),
        TokenKind::NumericLiteral => i >= 2 && tokens[i - 2].is_keyword("TOP"),
        _ => false,
    }
}

fn collect_sources(
    tokens: &[Token<'_>],
    depths: &[usize],
    top: usize,
    start: usize,
    end: usize,
    sources: &mut Vec<String>,
) {
    let mut expecting = true;
    let mut i = start;

    while i < end {
        let token = &tokens[i];
        if depths[i] != top {
            i += 1;
            continue;
        }
        if token.kind == TokenKind::Keyword && keywords::ends_from_clause(&token.normalized()) {
            break;
        }

        if expecting {
            if token.is_separator('(') {
                sources.push("(subquery)".to_string());
                expecting = false;
            } else if token.kind == TokenKind::Identifier
                || (token.kind == TokenKind::Keyword
                    && tokens.get(i + 1).map_or(false, |t| t.is_operator(".")))
            {
                let (name, next) = dotted_name(tokens, i);
                sources.push(name);
                expecting = false;
                i = next;
                continue;
            }
        } else if token.is_separator(',') || token.is_keyword("JOIN") {
            expecting = true;
        }
        i += 1;
    }
}

/// `a.b.c` starting at `start`; returns the joined name and the index after it.
fn dotted_name(tokens: &[Token<'_>], start: usize) -> (String, usize) {
    let mut name = name_part(&tokens[start]).to_string();
    let mut i = start + 1;
    while i + 1 < tokens.len()
        && tokens[i].is_operator(".")
        && matches!(tokens[i + 1].kind, TokenKind::Identifier | TokenKind::Keyword)
    {
        name.push('.');
        name.push_str(name_part(&tokens[i + 1]));
        i += 2;
    }
    (name, i)
}

/// Unquoted part text. A quoted part holding a dot keeps its quotes so it
/// never reads as `schema.table`.
fn name_part<'a>(token: &Token<'a>) -> &'a str {
    let inner = token.unquoted();
    if inner.contains('.') {
        token.text
    } else {
        inner
    }
}
