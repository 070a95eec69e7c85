// SPDX-License-Identifier: Apache-2.0

//! Redaction for SQL text in logs. Statements may carry literals from
//! callers, so they are hidden unless previews are switched on.

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Serialize, Serializer};

/// Longest preview written to logs, in characters
const PREVIEW_CHARS: usize = 120;

/// A value that prints as `[REDACTED]`. Use `.expose()` to read it.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> Display for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Serialize> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// SQL text as it should appear in a log line
pub struct SqlPreview<'a> {
    text: Sensitive<&'a str>,
    reveal: bool,
}

impl<'a> SqlPreview<'a> {
    pub fn new(text: &'a str, reveal: bool) -> Self {
        Self {
            text: Sensitive::new(text),
            reveal,
        }
    }
}

impl Display for SqlPreview<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = *self.text.expose();
        if !self.reveal {
            return write!(f, "{} ({} bytes)", self.text, text.len());
        }

        // one line, bounded
        let mut shown = 0;
        let mut last_space = true;
        for c in text.chars() {
            if shown == PREVIEW_CHARS {
                return f.write_str("...");
            }
            if c.is_whitespace() {
                if !last_space {
                    f.write_str(" ")?;
                    shown += 1;
                }
                last_space = true;
            } else {
                write!(f, "{}", c)?;
                shown += 1;
                last_space = false;
            }
        }
        Ok(())
    }
}

impl Debug for SqlPreview<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}
