//! Read path: filter documents, plan compilation and paginated execution.
//!
//! A [`filter::Filter`] is compiled against the schema into a
//! [`plan::QueryPlan`], which [`paginate::execute`] drives through the store
//! page by page.

/// Filter documents: where clause, projection, order and window.
pub mod filter;

/// Pagination aggregation over continuation tokens.
pub mod paginate;

/// Query plans and the filter compiler.
pub mod plan;
