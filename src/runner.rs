//! Concurrency-bounded task execution.
//!
//! [`run_bounded`] keeps at most `limit` tasks in flight and starts the next
//! queued task as soon as any running one finishes. Results come back in
//! submission order.
//!
//! The first failure is returned immediately. Tasks that are already running
//! are detached, not aborted: their requests complete in the background and
//! their results are dropped. Tasks still queued at that point never start.

use std::future::Future;
use tokio::task::JoinSet;
use tracing::trace;

use crate::error::{Error, Result};

/// Runs `tasks` with at most `limit` of them in flight at once.
///
/// Each task is a closure producing the future to run, so nothing starts
/// before the runner schedules it.
///
/// # Example
///
/// ```
/// use supply_chain_guard::runner::run_bounded;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> supply_chain_guard::Result<()> {
/// let tasks: Vec<_> = (1..=5u64)
///     .map(|n| move || async move { Ok::<_, supply_chain_guard::Error>(n * n) })
///     .collect();
///
/// let squares = run_bounded(2, tasks).await?;
/// assert_eq!(squares, vec![1, 4, 9, 16, 25]);
/// # Ok(())
/// # }
/// ```
pub async fn run_bounded<I, F, Fut, T>(limit: usize, tasks: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let limit = limit.max(1);
    let mut queued = tasks.into_iter().enumerate();
    let mut results: Vec<Option<T>> = Vec::new();
    let mut in_flight = JoinSet::new();

    loop {
        while in_flight.len() < limit {
            let Some((index, task)) = queued.next() else {
                break;
            };
            let future = task();
            in_flight.spawn(async move { (index, future.await) });
            trace!(index, in_flight = in_flight.len(), "Started task");
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };

        let (index, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                in_flight.detach_all();
                return Err(Error::Join(e.to_string()));
            }
        };

        match outcome {
            Ok(value) => {
                if results.len() <= index {
                    results.resize_with(index + 1, || None);
                }
                results[index] = Some(value);
            }
            Err(e) => {
                let detached = in_flight.len();
                in_flight.detach_all();
                trace!(detached, skipped = queued.count(), "Task failed, abandoning batch");
                return Err(e);
            }
        }
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            value.ok_or_else(|| Error::Join(format!("Task {} produced no result", index)))
        })
        .collect()
}
