use crate::{
    common::{self, key},
    error::{Error, Result},
    store::StoreTransport,
    write::update,
};

use futures::stream::{self, StreamExt};
use std::sync;

/// Maximum number of requests in one batch write.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Result of the operation on one record.
#[derive(Clone, Debug)]
pub struct KeyOutcome {
    /// Primary-key values of the record.
    pub keys: key::Keys,
    /// `Ok` if the store applied the operation.
    pub result: std::result::Result<(), sync::Arc<Error>>,
}

impl KeyOutcome {
    fn new(keys: key::Keys, result: Result<()>) -> Self {
        Self {
            keys,
            result: result.map_err(sync::Arc::new),
        }
    }

    /// Whether the store applied the operation.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-record outcomes of a batch operation, in input order.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// One outcome per record.
    pub outcomes: Vec<KeyOutcome>,
}

impl BatchReport {
    fn in_input_order(mut outcomes: Vec<(usize, KeyOutcome)>) -> Self {
        outcomes.sort_by_key(|(index, _)| *index);
        Self {
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    /// Number of records the batch covered.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch covered no record.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whether every record succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(KeyOutcome::is_ok)
    }

    /// Keys of the records the store applied the operation to.
    pub fn succeeded(&self) -> impl Iterator<Item = &key::Keys> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_ok())
            .map(|outcome| &outcome.keys)
    }

    /// Keys and errors of the records that failed.
    pub fn failed(&self) -> impl Iterator<Item = (&key::Keys, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match &outcome.result {
                Ok(()) => None,
                Err(err) => Some((&outcome.keys, err.as_ref())),
            })
    }
}

/// Apply each plan with at most `concurrency` updates in flight.
///
/// Empty plans succeed without a store call.
pub async fn update_records<T: StoreTransport + ?Sized>(
    transport: &T,
    table_name: &str,
    plans: Vec<update::MutationPlan>,
    concurrency: usize,
) -> BatchReport {
    let outcomes: Vec<(usize, KeyOutcome)> = stream::iter(plans.into_iter().enumerate())
        .map(|(index, plan)| async move {
            let result = if plan.is_empty() {
                Ok(())
            } else {
                transport.point_update(table_name, &plan).await
            };
            (index, KeyOutcome::new(plan.keys, result))
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    BatchReport::in_input_order(outcomes)
}

async fn delete_chunk<T: StoreTransport + ?Sized>(
    transport: &T,
    table_name: &str,
    chunk: Vec<(usize, key::Keys, common::Item)>,
) -> Vec<(usize, KeyOutcome)> {
    let items = chunk.iter().map(|(_, _, item)| item.clone()).collect();
    match transport.batch_delete(table_name, items).await {
        Ok(unprocessed) => chunk
            .into_iter()
            .map(|(index, keys, item)| {
                let result = if unprocessed.contains(&item) {
                    Err(Error::Throttling(
                        "delete left unprocessed by the store".to_string(),
                    ))
                } else {
                    Ok(())
                };
                (index, KeyOutcome::new(keys, result))
            })
            .collect(),
        Err(err) => {
            let err = sync::Arc::new(err);
            chunk
                .into_iter()
                .map(|(index, keys, _)| {
                    let outcome = KeyOutcome {
                        keys,
                        result: Err(err.clone()),
                    };
                    (index, outcome)
                })
                .collect()
        }
    }
}

/// Delete the records addressed by `keys` in chunks of [`BATCH_WRITE_LIMIT`],
/// with at most `concurrency` chunks in flight.
pub async fn delete_records<T: StoreTransport + ?Sized>(
    transport: &T,
    table_name: &str,
    keys: Vec<key::Keys>,
    concurrency: usize,
) -> BatchReport {
    let mut outcomes = Vec::with_capacity(keys.len());
    let mut addressed = Vec::with_capacity(keys.len());
    for (index, keys) in keys.into_iter().enumerate() {
        match common::Item::try_from(&keys) {
            Ok(item) => addressed.push((index, keys, item)),
            Err(err) => outcomes.push((index, KeyOutcome::new(keys, Err(err.into())))),
        }
    }
    let mut chunks = Vec::with_capacity(addressed.len().div_ceil(BATCH_WRITE_LIMIT));
    let mut addressed = addressed.into_iter().peekable();
    while addressed.peek().is_some() {
        chunks.push(addressed.by_ref().take(BATCH_WRITE_LIMIT).collect::<Vec<_>>());
    }
    let chunk_outcomes: Vec<Vec<(usize, KeyOutcome)>> = stream::iter(chunks)
        .map(|chunk| delete_chunk(transport, table_name, chunk))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    outcomes.extend(chunk_outcomes.into_iter().flatten());
    BatchReport::in_input_order(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{common::value, store::stub};
    use serde_json::json;

    fn keys(id: usize) -> key::Keys {
        key::Keys {
            values: vec![("id".to_string(), value::Value::from(id.to_string()))],
        }
    }

    fn put_plan(id: usize) -> update::MutationPlan {
        update::MutationPlan {
            keys: keys(id),
            mutations: [(
                "title".to_string(),
                update::Mutation::Put(value::Value::from("T")),
            )]
            .into_iter()
            .collect(),
        }
    }

    #[tokio::test]
    async fn test_delete_chunks_by_limit() {
        let transport = stub::StubTransport::new(Vec::new(), 10);
        let report = delete_records(&transport, "Post", (0..60).map(keys).collect(), 4).await;
        assert_eq!(report.len(), 60);
        assert!(report.is_complete());
        let mut sizes: Vec<usize> = transport
            .deletes
            .lock()
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![10, 25, 25]);
        let order: Vec<key::Keys> = report.succeeded().cloned().collect();
        assert_eq!(order, (0..60).map(keys).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_delete_reports_unprocessed_keys() {
        let transport = stub::StubTransport::new(Vec::new(), 10)
            .failing(vec![stub::item(json!({"id": "3"}))]);
        let report = delete_records(&transport, "Post", (0..5).map(keys).collect(), 2).await;
        let failed: Vec<&key::Keys> = report.failed().map(|(keys, _)| keys).collect();
        assert_eq!(failed, vec![&keys(3)]);
        assert_eq!(report.succeeded().count(), 4);
        assert!(
            report
                .failed()
                .all(|(_, err)| matches!(err, Error::Throttling(_)))
        );
    }

    #[tokio::test]
    async fn test_delete_store_failure_fails_whole_chunk() {
        let transport = stub::StubTransport::new(Vec::new(), 10).unavailable();
        let report = delete_records(&transport, "Post", (0..30).map(keys).collect(), 1).await;
        assert_eq!(report.failed().count(), 30);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_update_records_outcomes() {
        let transport = stub::StubTransport::new(Vec::new(), 10)
            .failing(vec![stub::item(json!({"id": "1"}))]);
        let mut plans: Vec<update::MutationPlan> = (0..4).map(put_plan).collect();
        plans[2].mutations.clear();
        let report = update_records(&transport, "Post", plans, 2).await;
        assert_eq!(report.len(), 4);
        assert!(!report.is_complete());
        let failed: Vec<&key::Keys> = report.failed().map(|(keys, _)| keys).collect();
        assert_eq!(failed, vec![&keys(1)]);
        // the empty plan never reaches the store
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn test_report_restores_input_order() {
        let outcome = |id: usize, result: Result<()>| (id, KeyOutcome::new(keys(id), result));
        let report = BatchReport::in_input_order(vec![
            outcome(2, Ok(())),
            outcome(0, Ok(())),
            outcome(3, Err(Error::Store("rejected".to_string()))),
            outcome(1, Ok(())),
        ]);
        let order: Vec<&key::Keys> = report.outcomes.iter().map(|outcome| &outcome.keys).collect();
        assert_eq!(order, vec![&keys(0), &keys(1), &keys(2), &keys(3)]);
        assert_eq!(report.failed().map(|(keys, _)| keys).collect::<Vec<_>>(), vec![&keys(3)]);
    }

    #[tokio::test]
    async fn test_delete_outcomes_follow_input_order() {
        let transport = stub::StubTransport::new(Vec::new(), 10)
            .failing(vec![stub::item(json!({"id": "27"}))]);
        let input: Vec<key::Keys> = (0..30).rev().map(keys).collect();
        let report = delete_records(&transport, "Post", input.clone(), 2).await;
        let order: Vec<key::Keys> = report
            .outcomes
            .iter()
            .map(|outcome| outcome.keys.clone())
            .collect();
        assert_eq!(order, input);
        assert!(report.outcomes[2].result.is_err());
    }

    #[tokio::test]
    async fn test_empty_batches() {
        let transport = stub::StubTransport::new(Vec::new(), 10);
        assert!(delete_records(&transport, "Post", Vec::new(), 8).await.is_empty());
        assert!(update_records(&transport, "Post", Vec::new(), 8).await.is_empty());
        assert_eq!(transport.calls(), 0);
    }
}
