// SPDX-License-Identifier: Apache-2.0

//! SQL analysis for admission control
//!
//! A token-based pipeline that never builds an AST:
//! - [`lexer`] turns raw text into classified tokens (total, lossless)
//! - [`segmenter`] splits tokens into top-level statements and nested fragments
//! - [`classifier`] assigns an operation category and scan predicates

pub mod classifier;
pub mod keywords;
pub mod lexer;
pub mod segmenter;

pub use classifier::{classify, BranchScan, Classification, StatementPredicates};
pub use lexer::{tokenize, Token, TokenKind};
pub use segmenter::{segment, Statement};
