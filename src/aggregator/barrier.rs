use std::collections::HashMap;
use tokio::sync::Mutex;

/// Counting join over a data-dependent number of sub-tasks.
///
/// Each notification registers under its own generation key, so sub-tasks of
/// overlapping notifications never share a count or a result set.
#[derive(Debug)]
pub struct CompletionBarrier<T> {
    pending: Mutex<HashMap<u64, Pending<T>>>,
}

#[derive(Debug)]
struct Pending<T> {
    remaining: usize,
    results: Vec<T>,
}

impl<T> Default for CompletionBarrier<T> {
    fn default() -> Self {
        CompletionBarrier { pending: Mutex::new(HashMap::new()) }
    }
}

impl<T> CompletionBarrier<T> {
    pub fn new() -> Self {
        CompletionBarrier::default()
    }

    /// Opens a join for `key` expecting `expected` arrivals. Returns false if
    /// `expected` is zero or the key is already open.
    pub async fn register(&self, key: u64, expected: usize) -> bool {
        if expected == 0 {
            return false;
        }
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&key) {
            return false;
        }
        pending.insert(key, Pending { remaining: expected, results: Vec::with_capacity(expected) });
        true
    }

    /// Records one finished sub-task. `None` marks a sub-task that completed
    /// without a result. The last arrival receives every result, in arrival order.
    pub async fn arrive(&self, key: u64, result: Option<T>) -> Option<Vec<T>> {
        let mut pending = self.pending.lock().await;
        let entry = pending.get_mut(&key)?;
        if let Some(result) = result {
            entry.results.push(result);
        }
        entry.remaining = entry.remaining.saturating_sub(1);
        if entry.remaining > 0 {
            return None;
        }
        pending.remove(&key).map(|done| done.results)
    }

    /// Number of joins still waiting on sub-tasks
    pub async fn open_joins(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_arrival_collects_results() {
        let barrier = CompletionBarrier::new();
        assert!(barrier.register(1, 3).await);
        assert_eq!(barrier.arrive(1, Some("a")).await, None);
        assert_eq!(barrier.arrive(1, None).await, None);
        assert_eq!(barrier.arrive(1, Some("c")).await, Some(vec!["a", "c"]));
        assert_eq!(barrier.open_joins().await, 0);
    }

    #[tokio::test]
    async fn test_interleaved_keys_stay_separate() {
        let barrier = CompletionBarrier::new();
        barrier.register(1, 2).await;
        barrier.register(2, 1).await;

        assert_eq!(barrier.arrive(1, Some(10)).await, None);
        assert_eq!(barrier.arrive(2, Some(20)).await, Some(vec![20]));
        assert_eq!(barrier.arrive(1, Some(11)).await, Some(vec![10, 11]));
    }

    #[tokio::test]
    async fn test_zero_expected_and_duplicate_keys() {
        let barrier: CompletionBarrier<u8> = CompletionBarrier::new();
        assert!(!barrier.register(7, 0).await);
        assert!(barrier.register(7, 1).await);
        assert!(!barrier.register(7, 1).await);
        assert_eq!(barrier.arrive(8, Some(1)).await, None);
    }
}
