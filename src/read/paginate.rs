use crate::{
    common,
    error::Result,
    read::plan,
    store::{ContinuationToken, StoreTransport},
};

/// Fetch every page `plan` yields, then apply the window.
///
/// Stops requesting pages once `limit + offset` items have been gathered.
/// Without a limit every page is fetched and returned whole.
pub async fn execute<T: StoreTransport + ?Sized>(
    transport: &T,
    plan: &plan::QueryPlan,
    limit: Option<usize>,
    offset: usize,
) -> Result<Vec<common::Item>> {
    let threshold = limit.map(|limit| limit.saturating_add(offset));
    let mut items: Vec<common::Item> = Vec::new();
    let mut start: Option<ContinuationToken> = None;
    loop {
        if threshold.is_some_and(|threshold| items.len() >= threshold) {
            #[cfg(feature = "tracing")]
            tracing::debug!(table = %plan.table_name, items = items.len(), "window filled");
            break;
        }
        let page = match plan.mode {
            plan::Mode::Query => transport.indexed_query(plan, start.take()).await?,
            plan::Mode::Scan => transport.full_scan(plan, start.take()).await?,
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(
            table = %plan.table_name,
            items = page.items.len(),
            more = page.continuation_token.is_some(),
            "fetched page"
        );
        items.extend(page.items);
        match page.continuation_token {
            Some(token) => start = Some(token),
            None => break,
        }
    }
    Ok(trim(items, limit, offset))
}

/// Slice `[offset, offset + limit)` out of `items`, clamped to its length.
///
/// Without a limit the items are returned untouched.
pub fn trim<T>(items: Vec<T>, limit: Option<usize>, offset: usize) -> Vec<T> {
    match limit {
        Some(limit) => items.into_iter().skip(offset).take(limit).collect(),
        None => items,
    }
}
