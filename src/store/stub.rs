//! Scripted in-memory transport that records every call.

use crate::{
    common::{self, condition, value},
    error::{Error, Result},
    read::plan,
    store::{ContinuationToken, ResultPage, StoreTransport},
    write::update,
};

use async_trait::async_trait;
use aws_sdk_dynamodb::types;
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

const PAGE_ATTRIBUTE: &str = "__page";

pub(crate) fn item(record: serde_json::Value) -> common::Item {
    value::to_item(&value::record_from_json(record)).unwrap()
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ReadCall {
    pub(crate) mode: plan::Mode,
    pub(crate) start: Option<ContinuationToken>,
}

#[derive(Debug, Default)]
pub(crate) struct StubTransport {
    items: Vec<common::Item>,
    page_size: usize,
    unavailable: bool,
    failing_keys: Vec<common::Item>,
    calls: AtomicUsize,
    pub(crate) reads: Mutex<Vec<ReadCall>>,
    pub(crate) updates: Mutex<Vec<(String, update::MutationPlan)>>,
    pub(crate) deletes: Mutex<Vec<Vec<common::Item>>>,
}

impl StubTransport {
    /// Serve `items` in pages of `page_size`.
    pub(crate) fn new(items: Vec<common::Item>, page_size: usize) -> Self {
        Self {
            items,
            page_size: page_size.max(1),
            ..Default::default()
        }
    }

    /// Fail every call with `StoreUnavailable`.
    pub(crate) fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Reject updates to `keys` and leave them unprocessed in batch deletes.
    pub(crate) fn failing(mut self, keys: Vec<common::Item>) -> Self {
        self.failing_keys = keys;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reads(&self) -> Vec<ReadCall> {
        self.reads.lock().unwrap().clone()
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(Error::StoreUnavailable("stub is offline".to_string()));
        }
        Ok(())
    }

    fn page(&self, items: Vec<common::Item>, start: Option<ContinuationToken>) -> ResultPage {
        let index = start
            .and_then(|token| token.get(PAGE_ATTRIBUTE).cloned())
            .and_then(|page| page.as_n().ok().and_then(|page| page.parse::<usize>().ok()))
            .unwrap_or_default();
        let begin = (index * self.page_size).min(items.len());
        let end = (begin + self.page_size).min(items.len());
        let continuation_token = (end < items.len()).then(|| {
            common::Item::from([(
                PAGE_ATTRIBUTE.to_string(),
                types::AttributeValue::N((index + 1).to_string()),
            )])
        });
        ResultPage {
            items: items[begin..end].to_vec(),
            continuation_token,
        }
    }

    fn read(&self, plan: &plan::QueryPlan, start: Option<ContinuationToken>) -> Result<ResultPage> {
        self.enter()?;
        self.reads.lock().unwrap().push(ReadCall {
            mode: plan.mode,
            start: start.clone(),
        });
        let items = self
            .items
            .iter()
            .filter(|item| matches_keys(item, &plan.key_conditions))
            .cloned()
            .collect();
        Ok(self.page(items, start))
    }
}

fn matches_keys(item: &common::Item, key_conditions: &[condition::KeyCondition]) -> bool {
    key_conditions.iter().all(|key_condition| {
        let condition::Condition::Equals(expected) = &key_condition.condition else {
            return false;
        };
        let expected = value::to_attribute(&expected.clone().normalize()).ok();
        item.get(&key_condition.name) == expected.as_ref()
    })
}

#[async_trait]
impl StoreTransport for StubTransport {
    async fn indexed_query(
        &self,
        plan: &plan::QueryPlan,
        start: Option<ContinuationToken>,
    ) -> Result<ResultPage> {
        self.read(plan, start)
    }

    async fn full_scan(
        &self,
        plan: &plan::QueryPlan,
        start: Option<ContinuationToken>,
    ) -> Result<ResultPage> {
        self.read(plan, start)
    }

    async fn point_update(
        &self,
        table_name: &str,
        mutations: &update::MutationPlan,
    ) -> Result<()> {
        self.enter()?;
        self.updates
            .lock()
            .unwrap()
            .push((table_name.to_string(), mutations.clone()));
        let key: common::Item = (&mutations.keys).try_into()?;
        if self.failing_keys.contains(&key) {
            return Err(Error::Throttling("stub rejected update".to_string()));
        }
        Ok(())
    }

    async fn batch_delete(
        &self,
        _table_name: &str,
        keys: Vec<common::Item>,
    ) -> Result<Vec<common::Item>> {
        self.enter()?;
        let unprocessed = keys
            .iter()
            .filter(|key| self.failing_keys.contains(key))
            .cloned()
            .collect();
        self.deletes.lock().unwrap().push(keys);
        Ok(unprocessed)
    }
}
