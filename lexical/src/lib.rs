//! Inverted full-text index over chunk content.
//!
//! Tokenization is language-agnostic: identifier and word splitting with
//! camelCase and snake_case sub-tokens, case-folded. Ranking is BM25 with
//! the usual parameters (k1 = 1.2, b = 0.75). One index per
//! `(dir, branch)`, persisted as a binary snapshot.

mod error;
mod index;
mod tokenize;

pub use error::{LexicalError, Result};
pub use index::{DocId, LexicalIndex, ScoredDoc};
pub use tokenize::tokenize;
