//! Bounded FIFO work queue shared by the producer and consumer.
//!
//! `push` suspends while the queue is full and `pop` suspends while it is
//! empty. Wakeups are event-driven through two [`Notify`]s; nothing polls.
//! Both futures are cancel-safe: dropping a pending `push` never inserts the
//! item, dropping a pending `pop` never removes one.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::QueueError;

struct State<T> {
    items: VecDeque<T>,
    sealed: bool,
}

pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                sealed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Append `item` at the tail, waiting for space if the queue is full.
    pub async fn push(&self, item: T) -> Result<(), QueueError> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            // Register before checking so a pop between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.sealed {
                    return Err(QueueError::Sealed);
                }
                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Remove the head item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is sealed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.sealed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark the producing side finished. Pending and future pushes fail;
    /// pops drain what is left and then return `None`.
    pub fn seal(&self) {
        self.lock().sealed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let q = BoundedQueue::new(4);
        for i in 0..4 {
            q.push(i).await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(q.pop().await, Some(i));
        }
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        let q: BoundedQueue<u8> = BoundedQueue::new(0);
        assert_eq!(q.capacity(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn push_waits_while_full() {
        let q = Arc::new(BoundedQueue::new(2));
        q.push(1).await.unwrap();
        q.push(2).await.unwrap();

        let pusher = {
            let q = q.clone();
            tokio::spawn(async move { q.push(3).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pusher.is_finished());
        assert_eq!(q.len(), 2);

        assert_eq!(q.pop().await, Some(1));
        pusher.await.unwrap().unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().await, Some(2));
        assert_eq!(q.pop().await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn pop_waits_while_empty() {
        let q = Arc::new(BoundedQueue::new(2));
        let popper = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!popper.is_finished());

        q.push("x").await.unwrap();
        assert_eq!(popper.await.unwrap(), Some("x"));
    }

    #[tokio::test]
    async fn seal_drains_then_ends() {
        let q = BoundedQueue::new(3);
        q.push('a').await.unwrap();
        q.push('b').await.unwrap();
        q.seal();

        assert_eq!(q.push('c').await, Err(QueueError::Sealed));
        assert_eq!(q.pop().await, Some('a'));
        assert_eq!(q.pop().await, Some('b'));
        assert_eq!(q.pop().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn seal_wakes_blocked_pop() {
        let q: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(1));
        let popper = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.seal();
        assert_eq!(popper.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn seal_fails_blocked_push() {
        let q = Arc::new(BoundedQueue::new(1));
        q.push(1).await.unwrap();
        let pusher = {
            let q = q.clone();
            tokio::spawn(async move { q.push(2).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.seal();
        assert_eq!(pusher.await.unwrap(), Err(QueueError::Sealed));
        assert_eq!(q.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pop_loses_nothing() {
        let q = Arc::new(BoundedQueue::new(2));
        let timed_out = tokio::time::timeout(Duration::from_millis(10), q.pop()).await;
        assert!(timed_out.is_err());

        q.push(7).await.unwrap();
        assert_eq!(q.pop().await, Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_handoff_keeps_order_and_bound() {
        const N: u32 = 2_000;
        let q = Arc::new(BoundedQueue::new(3));

        let producer = {
            let q = q.clone();
            tokio::spawn(async move {
                for i in 0..N {
                    q.push(i).await.unwrap();
                    assert!(q.len() <= q.capacity());
                }
                q.seal();
            })
        };

        let mut received = Vec::with_capacity(N as usize);
        while let Some(i) = q.pop().await {
            assert!(q.len() <= q.capacity());
            received.push(i);
        }
        producer.await.unwrap();

        assert_eq!(received, (0..N).collect::<Vec<_>>());
    }
}
