// SPDX-License-Identifier: Apache-2.0

//! Statement segmentation
//!
//! Splits a token stream on top-level `;` separators. Literal and comment
//! context comes from the token kinds, so a `;` inside a string or a
//! comment is never a boundary.

use std::ops::Range;

use crate::keywords;
use crate::lexer::{Token, TokenKind};

/// One top-level SQL unit, or a nested fragment of one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement<'a> {
    /// Significant tokens in source order (no whitespace, no comments)
    pub tokens: Vec<Token<'a>>,
    /// Comments that appeared inside the statement
    pub comments: Vec<Token<'a>>,
    /// Byte range in the original input, trimmed of surrounding whitespace
    pub range: Range<usize>,
    /// Parenthesized sub-statements led by an anchor keyword
    pub fragments: Vec<Statement<'a>>,
}

impl<'a> Statement<'a> {
    fn from_parts(tokens: Vec<Token<'a>>, comments: Vec<Token<'a>>) -> Self {
        let range = span(tokens.iter().chain(comments.iter()));
        let fragments = extract_fragments(&tokens, &comments);
        Self {
            tokens,
            comments,
            range,
            fragments,
        }
    }

    /// Statement text as a slice of the input it was lexed from
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.range.clone()).unwrap_or("")
    }

    /// Whether any token or comment ran to end of input unterminated
    pub fn is_malformed(&self) -> bool {
        self.tokens
            .iter()
            .chain(self.comments.iter())
            .any(|t| !t.terminated)
    }
}

/// Split `tokens` into statements.
///
/// Segments without significant tokens are dropped, unless one of their
/// comments may carry executable code (see [`comment_hides_code`]) and the
/// input holds at least one real statement. Input made only of whitespace
/// and comments therefore yields no statement.
pub fn segment<'a>(tokens: &[Token<'a>]) -> Vec<Statement<'a>> {
    let mut statements = Vec::new();
    let mut current = Vec::new();
    let mut comments = Vec::new();

    for token in tokens {
        match token.kind {
            TokenKind::Whitespace => {}
            TokenKind::Comment => comments.push(*token),
            TokenKind::Separator if token.is_separator(';') => {
                flush(&mut statements, &mut current, &mut comments);
            }
            _ => current.push(*token),
        }
    }
    flush(&mut statements, &mut current, &mut comments);

    if statements.iter().all(|s| s.tokens.is_empty()) {
        statements.clear();
    }
    statements
}

fn flush<'a>(
    statements: &mut Vec<Statement<'a>>,
    current: &mut Vec<Token<'a>>,
    comments: &mut Vec<Token<'a>>,
) {
    let tokens = std::mem::take(current);
    let segment_comments = std::mem::take(comments);

    if tokens.is_empty() && !segment_comments.iter().any(comment_hides_code) {
        return;
    }
    statements.push(Statement::from_parts(tokens, segment_comments));
}

/// Comments some engines execute or close early: MySQL `/*! ... */`
/// bodies, and block comments with a nested opener, which a non-nesting
/// engine ends at the first `*/`. An unterminated block comment is
/// included as well.
pub fn comment_hides_code(token: &Token<'_>) -> bool {
    hidden_code(token).is_some()
}

/// Body of a comment that may be executed as code, see [`comment_hides_code`].
pub fn hidden_code<'a>(token: &Token<'a>) -> Option<&'a str> {
    if token.kind != TokenKind::Comment || !token.text.starts_with("/*") {
        return None;
    }
    let body = if token.terminated {
        &token.text[2..token.text.len() - 2]
    } else {
        &token.text[2..]
    };

    if let Some(executable) = body.strip_prefix('!') {
        return Some(executable);
    }
    if !token.terminated || body.contains("/*") {
        return Some(body);
    }
    None
}

fn span<'t, 'a: 't>(tokens: impl Iterator<Item = &'t Token<'a>>) -> Range<usize> {
    let mut start = usize::MAX;
    let mut end = 0;
    for token in tokens {
        start = start.min(token.start);
        end = end.max(token.end());
    }
    if start == usize::MAX {
        0..0
    } else {
        start..end
    }
}

/// Find `( <anchor> ... )` groups. Each fragment is built recursively, so a
/// fragment's own nested groups end up in its `fragments`, not the parent's.
fn extract_fragments<'a>(tokens: &[Token<'a>], comments: &[Token<'a>]) -> Vec<Statement<'a>> {
    let mut fragments = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let opens_fragment = tokens[i].is_separator('(')
            && tokens
                .get(i + 1)
                .filter(|t| t.is_word())
                .map_or(false, |t| keywords::anchor_category(&t.normalized()).is_some());

        if !opens_fragment {
            i += 1;
            continue;
        }

        let close = matching_close(tokens, i);
        let inner = tokens[i + 1..close].to_vec();
        let range = span(inner.iter());
        let inner_comments = comments
            .iter()
            .filter(|c| c.start >= range.start && c.end() <= range.end)
            .copied()
            .collect();
        fragments.push(Statement::from_parts(inner, inner_comments));
        i = close + 1;
    }

    fragments
}

/// Index of the `)` closing the `(` at `open`, or `tokens.len()` when the
/// group never closes.
fn matching_close(tokens: &[Token<'_>], open: usize) -> usize {
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        if token.is_separator('(') {
            depth += 1;
        } else if token.is_separator(')') {
            depth -= 1;
            if depth == 0 {
                return open + offset;
            }
        }
    }
    tokens.len()
}
