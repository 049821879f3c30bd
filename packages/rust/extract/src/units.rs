//! Bounded, order-preserving concurrent runner.
//!
//! Used at both levels of the pipeline: one task per input in the
//! orchestrator, one task per page/image inside a document. Results land in
//! a slot indexed by the item's position, so output order never depends on
//! completion order.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Run `f` over `items` with at most `workers` in flight.
///
/// Entry `i` of the returned vector belongs to `items[i]`. A task that
/// panics yields `Err(message)` in its own slot and nowhere else.
pub async fn run_ordered<T, R, F, Fut>(
    items: Vec<T>,
    workers: usize,
    f: F,
) -> Vec<Result<R, String>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let f = Arc::new(f);

    let mut set = JoinSet::new();
    let mut positions = HashMap::with_capacity(total);

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let f = f.clone();
        let handle = set.spawn(async move {
            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await;
            (index, f(index, item).await)
        });
        positions.insert(handle.id(), index);
    }

    let mut slots: Vec<Option<Result<R, String>>> = (0..total).map(|_| None).collect();

    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((_, (index, value))) => slots[index] = Some(Ok(value)),
            Err(e) => {
                let Some(&index) = positions.get(&e.id()) else {
                    continue;
                };
                let message = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    "task cancelled".to_string()
                };
                warn!(index, %message, "task failed");
                slots[index] = Some(Err(message));
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err("task produced no result".to_string())))
        .collect()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn order_survives_random_completion() {
        let delays: Vec<u64> = {
            let mut rng = rand::thread_rng();
            (0..32).map(|_| rng.gen_range(0..25)).collect()
        };

        let results = run_ordered(delays, 8, |index, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            index * 10
        })
        .await;

        let values: Vec<usize> = results.into_iter().map(Result::unwrap).collect();
        let expected: Vec<usize> = (0..32).map(|i| i * 10).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<_> = (0..12).map(|_| (active.clone(), peak.clone())).collect();
        run_ordered(items, 3, |_, (active, peak)| async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn panic_stays_in_its_slot() {
        let results = run_ordered(vec![1, 2, 3], 2, |_, n| async move {
            if n == 2 {
                panic!("unit two exploded");
            }
            n
        })
        .await;

        assert_eq!(results[0], Ok(1));
        assert_eq!(results[1], Err("unit two exploded".to_string()));
        assert_eq!(results[2], Ok(3));
    }

    #[tokio::test]
    async fn empty_input() {
        let results = run_ordered(Vec::<u8>::new(), 4, |_, n| async move { n }).await;
        assert!(results.is_empty());
    }
}
