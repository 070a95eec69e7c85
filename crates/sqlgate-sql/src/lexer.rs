// SPDX-License-Identifier: Apache-2.0

//! SQL lexer
//!
//! Converts raw SQL into a flat, lossless token sequence. The lexer is
//! total: malformed input never fails, and an unterminated string, quoted
//! identifier or comment becomes a single trailing token that runs to the
//! end of input with `terminated == false`. Concatenating the `text` of
//! every token reproduces the input byte for byte.

use std::borrow::Cow;

use serde::Serialize;

use crate::keywords;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Keyword,
    Identifier,
    StringLiteral,
    NumericLiteral,
    Comment,
    /// `;` `,` `(` `)`
    Separator,
    Operator,
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Raw slice of the input, original casing preserved
    pub text: &'a str,
    /// Byte offset of `text` in the input
    pub start: usize,
    /// False when a literal, quoted identifier or comment reached end of input
    pub terminated: bool,
}

impl<'a> Token<'a> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// Whitespace and comments
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    /// Upper-cased text for keyword comparison. Only keywords and bare
    /// words are normalized; everything else is returned as written.
    pub fn normalized(&self) -> Cow<'a, str> {
        if self.is_word() && self.text.bytes().any(|b| b.is_ascii_lowercase()) {
            Cow::Owned(self.text.to_ascii_uppercase())
        } else {
            Cow::Borrowed(self.text)
        }
    }

    /// Keyword token matching `upper` (case-insensitive)
    pub fn is_keyword(&self, upper: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(upper)
    }

    /// Unquoted keyword or identifier
    pub fn is_word(&self) -> bool {
        match self.kind {
            TokenKind::Keyword => true,
            TokenKind::Identifier => !is_quote_start(self.text.as_bytes().first().copied()),
            _ => false,
        }
    }

    pub fn is_separator(&self, sep: char) -> bool {
        self.kind == TokenKind::Separator && self.text.len() == 1 && self.text.starts_with(sep)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    /// Identifier text without its quoting delimiters
    pub fn unquoted(&self) -> &'a str {
        let bytes = self.text.as_bytes();
        if self.kind != TokenKind::Identifier || !is_quote_start(bytes.first().copied()) {
            return self.text;
        }
        let inner = &self.text[1..];
        if self.terminated && !inner.is_empty() {
            &inner[..inner.len() - 1]
        } else {
            inner
        }
    }
}

fn is_quote_start(byte: Option<u8>) -> bool {
    matches!(byte, Some(b'"' | b'`'))
}

/// Text that follows a quoted token when the engine reads backslash as an
/// escape. Under doubled-quote escaping `'\''` is still open, while such an
/// engine closes it after `\'` and executes the rest of the token.
pub fn backslash_tail<'a>(token: &Token<'a>) -> Option<&'a str> {
    if !matches!(token.kind, TokenKind::StringLiteral | TokenKind::Identifier) {
        return None;
    }
    let bytes = token.text.as_bytes();
    let quote = match bytes.first() {
        Some(&q @ (b'\'' | b'"')) => q,
        _ => return None,
    };
    if !bytes.contains(&b'\\') {
        return None;
    }
    let (len, terminated) = backslash_delimited_len(bytes, quote);
    (terminated && len < bytes.len()).then(|| &token.text[len..])
}

/// Tokenize `text`. Never fails.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    Lexer::new(text).collect()
}

/// Streaming lexer over a borrowed input
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn scan_token(&self, rest: &str) -> (TokenKind, usize, bool) {
        let bytes = rest.as_bytes();
        // Callers guarantee a non-empty remainder
        let first = rest.chars().next().unwrap_or('\0');

        match first {
            c if c.is_whitespace() => (TokenKind::Whitespace, prefix_len(rest, char::is_whitespace), true),
            '-' if bytes.get(1) == Some(&b'-') => (TokenKind::Comment, line_comment_len(rest), true),
            '/' if bytes.get(1) == Some(&b'*') => {
                let (len, terminated) = block_comment_len(bytes);
                (TokenKind::Comment, len, terminated)
            }
            '\'' => {
                let (len, terminated) = delimited_len(bytes, b'\'');
                (TokenKind::StringLiteral, len, terminated)
            }
            '"' => {
                let (len, terminated) = delimited_len(bytes, b'"');
                (TokenKind::Identifier, len, terminated)
            }
            '`' => {
                let (len, terminated) = delimited_len(bytes, b'`');
                (TokenKind::Identifier, len, terminated)
            }
            c if c.is_ascii_digit() => (TokenKind::NumericLiteral, number_len(bytes), true),
            '.' if bytes.get(1).map_or(false, u8::is_ascii_digit) => {
                (TokenKind::NumericLiteral, number_len(bytes), true)
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = prefix_len(rest, is_word_char);
                let kind = if keywords::is_reserved(&rest[..len].to_ascii_uppercase()) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                };
                (kind, len, true)
            }
            ';' | ',' | '(' | ')' => (TokenKind::Separator, 1, true),
            c => (TokenKind::Operator, operator_len(rest, c), true),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.src[self.pos..];
        if rest.is_empty() {
            return None;
        }

        let (kind, len, terminated) = self.scan_token(rest);
        let token = Token {
            kind,
            text: &rest[..len],
            start: self.pos,
            terminated,
        };
        self.pos += len;
        Some(token)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '#')
}

fn prefix_len(rest: &str, pred: impl Fn(char) -> bool) -> usize {
    rest.char_indices()
        .find(|&(_, c)| !pred(c))
        .map_or(rest.len(), |(i, _)| i)
}

/// `--` up to, not including, the line break. A lone `\r` ends the line.
fn line_comment_len(rest: &str) -> usize {
    rest.find(|c| c == '\n' || c == '\r').unwrap_or(rest.len())
}

/// `/* ... */` with nesting. Returns `(len, terminated)`.
fn block_comment_len(bytes: &[u8]) -> (usize, bool) {
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return (i, true);
                }
            }
            _ => i += 1,
        }
    }
    (bytes.len(), false)
}

/// Quoted run starting at `bytes[0]` and closed by `close`; a doubled
/// closing delimiter is an escape.
fn delimited_len(bytes: &[u8], close: u8) -> (usize, bool) {
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == close {
            if bytes.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return (i + 1, true);
        }
        i += 1;
    }
    (bytes.len(), false)
}

/// Same run read with backslash escapes: `\x` never closes the quote.
fn backslash_delimited_len(bytes: &[u8], close: u8) -> (usize, bool) {
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == close => {
                if bytes.get(i + 1) == Some(&close) {
                    i += 2;
                    continue;
                }
                return (i + 1, true);
            }
            _ => i += 1,
        }
    }
    (bytes.len(), false)
}

fn number_len(bytes: &[u8]) -> usize {
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |p| from + p)
    };

    let mut i = digits(0);
    if bytes.get(i) == Some(&b'.') {
        i = digits(i + 1);
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        if bytes.get(j).map_or(false, u8::is_ascii_digit) {
            i = digits(j);
        }
    }
    i
}

const TWO_CHAR_OPERATORS: &[&str] = &["<=", ">=", "<>", "!=", "||", "::", "**", "=>"];

fn operator_len(rest: &str, first: char) -> usize {
    if rest.len() >= 2 && rest.is_char_boundary(2) && TWO_CHAR_OPERATORS.contains(&&rest[..2]) {
        2
    } else {
        first.len_utf8()
    }
}
