//! Bounded concurrent fan-out.
//!
//! Runs one async job per item with at most `limit` jobs outstanding.
//! Items are admitted in input order; as each job finishes the next queued
//! item starts. A failing job never cancels the others: every item ends up
//! in the returned map with its own `Ok` or `Err`.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use tracing::debug;

/// Run `work` over `items`, keeping at most `limit` invocations in flight.
///
/// `limit` below 1 is treated as 1. Items must be distinct; a repeated item
/// keeps only one outcome in the map.
pub async fn run_bounded<T, O, E, F, Fut>(
    items: &[T],
    limit: usize,
    work: F,
) -> HashMap<T, Result<O, E>>
where
    T: Eq + Hash + Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    if items.is_empty() {
        return HashMap::new();
    }

    let window = limit.clamp(1, items.len());
    debug!("Fan-out over {} items, window {}", items.len(), window);

    stream::iter(items.iter().cloned())
        .map(|item| {
            let job = work(item.clone());
            async move { (item, job.await) }
        })
        .buffer_unordered(window)
        .collect::<HashMap<_, _>>()
        .await
}
