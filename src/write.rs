//! Write path: update reconciliation and batch execution.

/// Bounded-concurrency batch operations with per-record outcomes.
pub mod batch;

/// Mutation plans and the update reconciler.
pub mod update;
