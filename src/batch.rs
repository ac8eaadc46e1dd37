//! Bounded fan-out over many devices.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Runs `task` over `items` with at most `pool_size` futures in flight.
///
/// `on_progress(completed, total, &result)` fires once per finished item,
/// in completion order. The returned results are in input order.
/// A `pool_size` of zero is treated as one.
pub async fn run_bounded<I, F, Fut, R, P>(
    items: I,
    pool_size: usize,
    mut task: F,
    mut on_progress: P,
) -> Vec<R>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = R>,
    P: FnMut(usize, usize, &R),
{
    let items = items.into_iter().collect::<Vec<_>>();
    let total = items.len();
    let mut slots = (0..total).map(|_| None).collect::<Vec<Option<R>>>();

    let mut pending = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = task(item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(pool_size.max(1));

    let mut completed = 0;
    while let Some((index, result)) = pending.next().await {
        completed += 1;
        on_progress(completed, total, &result);
        slots[index] = Some(result);
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn results_keep_input_order_and_pool_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut progress = Vec::new();

        let results = run_bounded(
            vec![40u64, 5, 25, 10, 1],
            2,
            |delay| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    delay * 2
                }
            },
            |done, total, result| progress.push((done, total, *result)),
        )
        .await;

        assert_eq!(results, vec![80, 10, 50, 20, 2]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(progress.len(), 5);
        assert_eq!(
            progress.iter().map(|(done, _, _)| *done).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(progress.iter().all(|(_, total, _)| *total == 5));
        // The 40ms item started first but cannot finish first.
        assert_ne!(progress[0].2, 80);
    }

    #[tokio::test]
    async fn zero_pool_size_still_runs_everything() {
        let mut calls = 0;
        let results = run_bounded(1..=3, 0, |n| async move { n }, |_, _, _| calls += 1).await;
        assert_eq!(results, vec![1, 2, 3]);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn empty_input_yields_no_progress() {
        let mut calls = 0;
        let results: Vec<u8> =
            run_bounded(Vec::<u8>::new(), 4, |n| async move { n }, |_, _, _| calls += 1).await;
        assert!(results.is_empty());
        assert_eq!(calls, 0);
    }
}
