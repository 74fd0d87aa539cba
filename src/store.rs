//! Storage transport seam.
//!
//! The connector never talks to the SDK directly; it drives a
//! [`StoreTransport`]. [`dynamodb::DynamoDbTransport`] is the production
//! implementation.

/// DynamoDB-backed transport.
pub mod dynamodb;

#[cfg(test)]
pub(crate) mod stub;

use crate::{common, error::Result, read::plan, write::update};

use async_trait::async_trait;

/// Opaque resume position returned by the store after a partial page.
pub type ContinuationToken = common::Item;

/// One page of read results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultPage {
    /// Items of this page, in store order.
    pub items: Vec<common::Item>,
    /// Where to resume; `None` once the result set is exhausted.
    pub continuation_token: Option<ContinuationToken>,
}

/// Requests the connector issues against a key-value store.
#[async_trait]
pub trait StoreTransport: Send + Sync {
    /// Run an indexed query for `plan`, resuming after `start` when given.
    async fn indexed_query(
        &self,
        plan: &plan::QueryPlan,
        start: Option<ContinuationToken>,
    ) -> Result<ResultPage>;

    /// Run a full scan for `plan`, resuming after `start` when given.
    async fn full_scan(
        &self,
        plan: &plan::QueryPlan,
        start: Option<ContinuationToken>,
    ) -> Result<ResultPage>;

    /// Apply `mutations` to the record addressed by its keys.
    async fn point_update(
        &self,
        table_name: &str,
        mutations: &update::MutationPlan,
    ) -> Result<()>;

    /// Delete the records addressed by `keys` in a single batch request.
    ///
    /// Returns the keys the store left unprocessed.
    async fn batch_delete(
        &self,
        table_name: &str,
        keys: Vec<common::Item>,
    ) -> Result<Vec<common::Item>>;
}
