use parking_lot::RwLock;
use std::collections::VecDeque;

/// The lock-based comparison queue.
///
/// Included only to give the benchmark a blocking baseline; reads take the
/// shared lock, mutations the exclusive lock.
#[derive(Debug, Default)]
pub struct QueueMutex<T> {
    inner: RwLock<VecDeque<T>>,
}

impl<T: Clone> QueueMutex<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(VecDeque::new()),
        }
    }

    pub fn push(&self, elem: T) {
        self.inner.write().push_back(elem);
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.write().pop_front()
    }

    pub fn front_elem(&self) -> Option<T> {
        self.inner.read().front().cloned()
    }

    pub fn back_elem(&self) -> Option<T> {
        self.inner.read().back().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// The lock upholds the queue invariants by construction; provided for
    /// symmetry with the lock-free variants' post-condition checks.
    pub fn is_valid(&self) -> bool {
        true
    }
}

#[cfg(all(test, not(loom), not(feature = "shuttle")))]
mod tests {
    use super::*;
    use std::thread;
    use test_log::test;

    #[test]
    fn test_push_pop_is_fifo() {
        let queue: QueueMutex<u64> = QueueMutex::new();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);

        for i in 0..100u64 {
            queue.push(i);
        }
        assert_eq!(queue.front_elem(), Some(0));
        assert_eq!(queue.back_elem(), Some(99));
        for i in 0..100u64 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
        assert!(queue.is_valid());
    }

    #[test]
    fn test_concurrent_producers() {
        let queue: QueueMutex<u64> = QueueMutex::new();
        let queue_ref: &QueueMutex<u64> = &queue;

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(move || {
                    for _ in 0..1000u64 {
                        queue_ref.push(1);
                    }
                });
            }
        });

        let mut sum: u64 = 0;
        while let Some(elem) = queue.pop() {
            sum += elem;
        }
        assert_eq!(sum, 4000);
    }
}
