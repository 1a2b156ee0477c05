//! newsdb-text
//!
//! Tantivy keyword index over newsletter chunks: English stemming, phrase and
//! boolean queries, BM25 ranking, and pre-query restriction to visible artifacts.
pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::KeywordIndex;
pub use search::{translate_operators, Matching};
