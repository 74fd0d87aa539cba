#![deny(missing_docs)]

//! # DynamoDB Connector
//!
//! Translates ORM-style filter documents and partial updates into DynamoDB
//! queries, scans and update plans, and executes them through a pluggable
//! transport.
//!
//! ## Overview
//!
//! - Equality lookups on the primary key become indexed `Query` requests;
//!   everything else becomes a `Scan` with a synthesized filter expression
//! - Continuation tokens are followed until the requested window is filled
//! - Partial updates are diffed against a baseline record into `SET` and
//!   `REMOVE` clauses, so only changed attributes are written
//! - Bulk updates and deletes run with bounded concurrency and report
//!   per-record outcomes
//!
//! ## Quick Example
//!
//! ```rust
//! use dynamodb_connector::{read::{filter, plan}, schema};
//! use serde_json::json;
//!
//! let registry = schema::SchemaRegistry::from_settings(json!({"Post": {}})).unwrap();
//! let catalog = schema::IndexCatalog::new(registry);
//!
//! let filter = filter::Filter::try_from(json!({"where": {"age": {"gt": 30}}})).unwrap();
//! let plan = plan::compile(&catalog, "Post", &filter).unwrap();
//! assert_eq!(plan.mode, plan::Mode::Scan);
//! assert_eq!(plan.filter_expression.as_deref(), Some("(#age > :30)"));
//! ```
//!
//! ## Modules
//!
//! - [`mod@common`] - Values, keys, where-clause conditions and selections
//! - [`mod@schema`] - Entity metadata and index coverage
//! - [`mod@read`] - Filter compilation and paginated execution
//! - [`mod@write`] - Update reconciliation and batch execution
//! - [`mod@store`] - The transport seam and its DynamoDB implementation
//! - [`mod@connector`] - Entity-level operations tying it all together
//!
//! ## Features
//!
//! - `tracing` - spans around every store request and connector operation

/// Common utilities for values, keys, conditions and attribute selection.
pub mod common;

/// Entity-level operations: find, count, update and delete.
pub mod connector;

/// Error types.
pub mod error;

/// Read path: filter documents, plan compilation and paginated execution.
pub mod read;

/// Entity metadata and index coverage.
pub mod schema;

/// Storage transport seam and the DynamoDB transport.
pub mod store;

/// Write path: update reconciliation and batch execution.
pub mod write;

pub use error::{Error, Result};
