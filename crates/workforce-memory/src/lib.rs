//! Workspace memory for the Workforce orchestrator.
//!
//! Resolved goals and tasks leave behind [`MemoryPattern`](workforce_core::MemoryPattern)
//! records keyed by the *shape* of the work. The planner reads them to
//! calibrate confidence and the recovery supervisor reads them to spot
//! failures that keep repeating.
//!
//! # Main types
//!
//! - [`ShapeSignature`] — Normalized tokens plus a stable digest for a goal or task.
//! - [`SignatureIndex`] — BM25 inverted index over signature tokens.
//! - [`WorkspaceMemory`] — Store-backed pattern log with similarity queries.

/// BM25 index over shape tokens.
pub mod index;
/// Shape signatures and tokenization.
pub mod signature;
/// Store-backed pattern log.
pub mod workspace;

pub use index::SignatureIndex;
pub use signature::{jaccard, ShapeKind, ShapeSignature};
pub use workspace::{PatternMatch, WorkspaceMemory};
