//! reviewmark-core: Review mark aggregation and normalization engine.
//!
//! Defines the rubric and mark data model, the store trait, the pure
//! normalization, correlation and lateness computations, and the orchestrator
//! that writes results for a student or a whole project group.

pub mod correlate;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod lateness;
pub mod locks;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod outcome;
pub mod parser;
pub mod propagate;
pub mod report;
pub mod roster;
pub mod traits;
