//! # Batch Executor
//!
//! Runs one async operation per item in fixed windows of `concurrency`
//! items. All operations of a window are polled together on the current
//! task; the next window starts once every operation of the previous one
//! has finished. A failing item never cancels its siblings.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;

/// Outcomes of a batch, each list in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome<T, E> {
    pub successes: Vec<T>,
    pub errors: Vec<E>,
}

impl<T, E> BatchOutcome<T, E> {
    pub fn total(&self) -> usize {
        self.successes.len() + self.errors.len()
    }
}

/// Run `op` over `items`, at most `concurrency` at a time
///
/// `progress` is called once per finished item with `(completed, total)`.
/// A concurrency of 0 is treated as 1.
pub async fn run_batch<I, T, E, F, Fut, P>(
    items: Vec<I>,
    concurrency: usize,
    op: F,
    mut progress: P,
) -> BatchOutcome<T, E>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(usize, usize),
{
    let total = items.len();
    let window = concurrency.max(1);
    let mut slots: Vec<Option<Result<T, E>>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    let mut completed = 0;
    let mut pending = items.into_iter().enumerate().peekable();

    while pending.peek().is_some() {
        let mut in_flight: FuturesUnordered<_> = pending
            .by_ref()
            .take(window)
            .map(|(index, item)| {
                let fut = op(item);
                async move { (index, fut.await) }
            })
            .collect();

        while let Some((index, result)) = in_flight.next().await {
            completed += 1;
            progress(completed, total);
            slots[index] = Some(result);
        }
    }

    let mut outcome = BatchOutcome {
        successes: Vec::new(),
        errors: Vec::new(),
    };
    for result in slots.into_iter().flatten() {
        match result {
            Ok(value) => outcome.successes.push(value),
            Err(error) => outcome.errors.push(error),
        }
    }
    outcome
}
