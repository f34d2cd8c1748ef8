//! Deduplicating work queue fed by hook events.
//!
//! At most one outstanding item per pool. Popping an item clears its marker,
//! so an event that arrives while the pool is being processed queues it
//! again for the next drain. Every successful enqueue wakes one waiter on
//! `notified()`.

use crate::types::{PoolId, WorkItem, WorkReason};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    queued: HashSet<PoolId>,
}

/// Cloneable handle; all clones share one queue.
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Nothing panics while holding the lock; recover the data if it ever does.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `pool_id` unless it is already waiting. Returns whether an
    /// item was added.
    pub fn enqueue(&self, pool_id: PoolId, reason: WorkReason, now_millis: i64) -> bool {
        let added = {
            let mut state = self.lock();
            if state.queued.insert(pool_id) {
                state.items.push_back(WorkItem {
                    pool_id,
                    reason,
                    enqueued_at_millis: now_millis,
                });
                true
            } else {
                false
            }
        };
        if added {
            self.notify.notify_one();
        }
        added
    }

    /// Oldest item, clearing its dedup marker.
    pub fn pop(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        let item = state.items.pop_front()?;
        state.queued.remove(&item.pool_id);
        Some(item)
    }

    /// Pops lazily until the queue is empty, including items added while
    /// iterating.
    pub fn drain(&self) -> Drain<'_> {
        Drain { queue: self }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pool_id: &PoolId) -> bool {
        self.lock().queued.contains(pool_id)
    }

    /// Resolves after the next successful enqueue (or immediately if one
    /// happened since the last wake-up).
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Iterator returned by [`WorkQueue::drain`].
pub struct Drain<'a> {
    queue: &'a WorkQueue,
}

impl Iterator for Drain<'_> {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        self.queue.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    fn pool(byte: u8) -> PoolId {
        PoolId(B256::repeat_byte(byte))
    }

    #[test]
    fn test_duplicate_events_produce_one_item() {
        let queue = WorkQueue::new();
        assert!(queue.enqueue(pool(1), WorkReason::TickCrossed, 10));
        assert!(!queue.enqueue(pool(1), WorkReason::TickCrossed, 11));
        assert_eq!(queue.len(), 1);

        let items: Vec<WorkItem> = queue.drain().collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].enqueued_at_millis, 10);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_across_pools() {
        let queue = WorkQueue::new();
        queue.enqueue(pool(2), WorkReason::TickCrossed, 1);
        queue.enqueue(pool(1), WorkReason::PoolInitialized, 2);
        queue.enqueue(pool(3), WorkReason::TickCrossed, 3);

        let order: Vec<PoolId> = queue.drain().map(|item| item.pool_id).collect();
        assert_eq!(order, vec![pool(2), pool(1), pool(3)]);
    }

    #[test]
    fn test_pop_clears_marker_for_requeue() {
        let queue = WorkQueue::new();
        queue.enqueue(pool(1), WorkReason::TickCrossed, 1);
        let item = queue.pop().unwrap();
        assert_eq!(item.reason, WorkReason::TickCrossed);
        assert!(!queue.contains(&pool(1)));

        // An event during processing re-queues the pool for the next drain
        assert!(queue.enqueue(pool(1), WorkReason::TickCrossed, 2));
        assert!(queue.contains(&pool(1)));
    }

    #[test]
    fn test_clones_share_state() {
        let queue = WorkQueue::new();
        let producer = queue.clone();
        producer.enqueue(pool(7), WorkReason::PoolInitialized, 0);
        assert_eq!(queue.pop().map(|i| i.pool_id), Some(pool(7)));
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let queue = WorkQueue::new();
        let producer = queue.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.enqueue(pool(5), WorkReason::TickCrossed, 0);
        });

        tokio::time::timeout(Duration::from_secs(2), queue.notified())
            .await
            .expect("enqueue should wake the waiter");
        handle.await.unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_duplicate_does_not_notify() {
        let queue = WorkQueue::new();
        queue.enqueue(pool(1), WorkReason::TickCrossed, 0);
        // consume the stored permit
        assert_ready!(task::spawn(queue.notified()).poll());

        let mut waiter = task::spawn(queue.notified());
        assert_pending!(waiter.poll());
        queue.enqueue(pool(1), WorkReason::TickCrossed, 1);
        assert!(!waiter.is_woken());
        assert_pending!(waiter.poll());

        queue.enqueue(pool(2), WorkReason::TickCrossed, 2);
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }
}
