use crate::epoch::Guard;
use crate::queue::{drain_chain, Node, NULL_WORD};
use crate::sync::{AtomicUsize, Ordering};
use core::marker::PhantomData;

/// A thread-safe FIFO queue linked with single-word CAS operations.
///
/// This is a Michael-Scott queue: `push` first links the new node behind the
/// current tail and then swings `back` forwards, so a thread which observes a
/// tail with a non-null successor helps by advancing `back` before retrying.
/// Popped sentinel nodes are retired through the caller's epoch guard.
#[derive(Debug)]
pub struct QueueCas<T> {
    front: AtomicUsize,
    back: AtomicUsize,
    _marker: PhantomData<Box<Node<T>>>,
}

unsafe impl<T: Send> Send for QueueCas<T> {}
unsafe impl<T: Send> Sync for QueueCas<T> {}

impl<T: Clone + Send + Default + 'static> QueueCas<T> {
    pub fn new() -> Self {
        let sentinel: usize = Node::alloc(T::default());
        Self {
            front: AtomicUsize::new(sentinel),
            back: AtomicUsize::new(sentinel),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + Send + 'static> QueueCas<T> {
    /// Append `elem` to the back of the queue.
    ///
    /// The guard keeps the tail node alive while it is dereferenced.
    pub fn push<const POOL_SIZE: usize>(&self, elem: T, _guard: &Guard<'_, POOL_SIZE>) {
        let new_node: usize = Node::alloc(elem);

        loop {
            let tail: usize = self.back.load(Ordering::Acquire);
            let tail_node: &Node<T> = unsafe { Node::deref(tail) };
            let next: usize = tail_node.next.load(Ordering::Acquire);

            if next != NULL_WORD {
                // the tail already has a successor; help swing `back` forward
                let _ = self
                    .back
                    .compare_exchange_weak(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            if tail_node
                .next
                .compare_exchange_weak(NULL_WORD, new_node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // failure is benign: another thread already helped
                let _ = self.back.compare_exchange(
                    tail,
                    new_node,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                return;
            }
        }
    }

    /// Remove and return the oldest element, or `None` if the queue is empty.
    pub fn pop<const POOL_SIZE: usize>(&self, guard: &Guard<'_, POOL_SIZE>) -> Option<T> {
        loop {
            let front: usize = self.front.load(Ordering::Acquire);
            let front_node: &Node<T> = unsafe { Node::deref(front) };
            let head: usize = front_node.next.load(Ordering::Acquire);

            if head == NULL_WORD {
                return None;
            }

            let back: usize = self.back.load(Ordering::Acquire);
            if back == front {
                // `back` lags behind the node about to become garbage; fix it
                // up before the front pointer moves past it
                let _ = self
                    .back
                    .compare_exchange_weak(back, head, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            // read the element before advancing `front`: afterwards the old
            // sentinel may be reclaimed
            let elem: T = unsafe { Node::<T>::deref(head) }.elem.clone();

            if self
                .front
                .compare_exchange_weak(front, head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                guard.defer(move || unsafe { Node::<T>::dealloc(front) });
                return Some(elem);
            }
        }
    }

    /// The oldest element without removing it, or `None` if the queue is
    /// empty.
    pub fn front_elem<const POOL_SIZE: usize>(&self, _guard: &Guard<'_, POOL_SIZE>) -> Option<T> {
        let front: usize = self.front.load(Ordering::Acquire);
        let head: usize = unsafe { Node::<T>::deref(front) }.next.load(Ordering::Acquire);
        if head == NULL_WORD {
            return None;
        }
        Some(unsafe { Node::<T>::deref(head) }.elem.clone())
    }

    /// The newest element without removing it, or `None` if the queue is
    /// empty.
    pub fn back_elem<const POOL_SIZE: usize>(&self, _guard: &Guard<'_, POOL_SIZE>) -> Option<T> {
        let back: usize = self.back.load(Ordering::Acquire);
        if back == self.front.load(Ordering::Acquire) {
            return None;
        }
        Some(unsafe { Node::<T>::deref(back) }.elem.clone())
    }

    pub fn is_empty<const POOL_SIZE: usize>(&self, _guard: &Guard<'_, POOL_SIZE>) -> bool {
        let front: usize = self.front.load(Ordering::Acquire);
        unsafe { Node::<T>::deref(front) }.next.load(Ordering::Acquire) == NULL_WORD
    }

    /// Whether following `next` links from `front` reaches `back` and `back`
    /// has no successor.
    ///
    /// Only meaningful while no operation is in flight; the scan is not
    /// thread-safe and is intended for quiescent post-condition checks.
    pub fn is_valid(&self) -> bool {
        let mut node: usize = self.front.load(Ordering::Acquire);
        loop {
            let next: usize = unsafe { Node::<T>::deref(node) }.next.load(Ordering::Acquire);
            if next == NULL_WORD {
                break;
            }
            node = next;
        }
        node == self.back.load(Ordering::Acquire)
    }
}

impl<T: Clone + Send + Default + 'static> Default for QueueCas<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for QueueCas<T> {
    fn drop(&mut self) {
        drain_chain::<T>(self.front.load(Ordering::Relaxed));
    }
}

#[cfg(all(test, not(loom), not(feature = "shuttle")))]
mod tests {
    use super::*;
    use crate::epoch::{Collector, LocalHandle};
    use crate::sync::Arc;
    use std::thread;
    use test_log::test;

    #[test]
    fn test_new_queue_is_empty_and_valid() {
        let collector: Arc<Collector<1>> = Arc::new(Collector::new());
        let handle: LocalHandle<1> = LocalHandle::register(collector).unwrap();
        let queue: QueueCas<u64> = QueueCas::new();

        let guard = handle.pin();
        assert!(queue.is_empty(&guard));
        assert_eq!(queue.pop(&guard), None);
        assert_eq!(queue.front_elem(&guard), None);
        assert_eq!(queue.back_elem(&guard), None);
        drop(guard);
        assert!(queue.is_valid());
    }

    #[test]
    fn test_push_pop_is_fifo() {
        let collector: Arc<Collector<1>> = Arc::new(Collector::new());
        let handle: LocalHandle<1> = LocalHandle::register(collector).unwrap();
        let queue: QueueCas<u64> = QueueCas::new();

        let guard = handle.pin();
        for i in 0..100u64 {
            queue.push(i, &guard);
        }
        assert_eq!(queue.front_elem(&guard), Some(0));
        assert_eq!(queue.back_elem(&guard), Some(99));
        for i in 0..100u64 {
            assert_eq!(queue.pop(&guard), Some(i));
        }
        assert_eq!(queue.pop(&guard), None);
        drop(guard);
        assert!(queue.is_valid());
    }

    #[test]
    fn test_concurrent_producers() {
        let collector: Arc<Collector<4>> = Arc::new(Collector::new());
        let queue: QueueCas<u64> = QueueCas::new();
        let queue_ref: &QueueCas<u64> = &queue;

        thread::scope(|scope| {
            for _ in 0..4 {
                let handle: LocalHandle<4> = LocalHandle::register(collector.clone()).unwrap();
                scope.spawn(move || {
                    for _ in 0..1000u64 {
                        let guard = handle.pin();
                        queue_ref.push(1, &guard);
                    }
                });
            }
        });

        let handle: LocalHandle<4> = LocalHandle::register(collector).unwrap();
        let guard = handle.pin();
        let mut sum: u64 = 0;
        while let Some(elem) = queue.pop(&guard) {
            sum += elem;
        }
        assert_eq!(sum, 4000);
        drop(guard);
        assert!(queue.is_valid());
    }
}
