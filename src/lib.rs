//! planlens - Explains why a query optimizer chose its physical operators
//!
//! Features:
//! - Plan tree model built from PostgreSQL `EXPLAIN (FORMAT JSON)` records
//! - Cost-ratio justification against plans with operators disabled
//! - Step-by-step narration and structural plan diffs

pub mod config;
pub mod explain;
pub mod plan;
pub mod source;

#[cfg(test)]
mod test_utils;
