use crate::epoch::Guard;
use crate::mwcas::{MwCasHandle, MwCasTarget};
use crate::queue::{drain_chain, Node, NULL_WORD};
use crate::sync::{AtomicUsize, Ordering};
use core::marker::PhantomData;

/// A thread-safe FIFO queue whose `push` links the new node and swings the
/// back pointer in one multi-word CAS.
///
/// Where the Michael-Scott queue needs a helper CAS because the tail link and
/// the back pointer change in two steps, the MwCAS makes both words change
/// atomically, so `back` never lags and the push loop has a single failure
/// mode: plain contention. The pop side only mutates `front`, so a
/// single-word CAS suffices there; it still reads the head link through the
/// protected-read path because an in-flight push may have a descriptor
/// installed in it.
#[derive(Debug)]
pub struct QueueMwCas<T> {
    front: AtomicUsize,
    back: AtomicUsize,
    _marker: PhantomData<Box<Node<T>>>,
}

unsafe impl<T: Send> Send for QueueMwCas<T> {}
unsafe impl<T: Send> Sync for QueueMwCas<T> {}

impl<T: Clone + Send + Default + 'static> QueueMwCas<T> {
    pub fn new() -> Self {
        let sentinel: usize = Node::alloc(T::default());
        Self {
            front: AtomicUsize::new(sentinel),
            back: AtomicUsize::new(sentinel),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + Send + 'static> QueueMwCas<T> {
    /// Append `elem` to the back of the queue.
    pub fn push<const POOL_SIZE: usize>(
        &self,
        elem: T,
        mwcas: &mut MwCasHandle<POOL_SIZE>,
        _guard: &Guard<'_, POOL_SIZE>,
    ) {
        let new_node: usize = Node::alloc(elem);

        loop {
            let tail: usize = mwcas.read(&self.back);
            let tail_node: &Node<T> = unsafe { Node::deref(tail) };

            let mut targets: [MwCasTarget<'_>; 2] = [
                MwCasTarget::new(&self.back, tail, new_node),
                MwCasTarget::new(&tail_node.next, NULL_WORD, new_node),
            ];
            targets.sort_unstable_by_key(MwCasTarget::address);

            if mwcas.mwcas(&targets) {
                return;
            }
        }
    }

    /// Remove and return the oldest element, or `None` if the queue is empty.
    pub fn pop<const POOL_SIZE: usize>(
        &self,
        mwcas: &MwCasHandle<POOL_SIZE>,
        guard: &Guard<'_, POOL_SIZE>,
    ) -> Option<T> {
        loop {
            let front: usize = self.front.load(Ordering::Acquire);
            let front_node: &Node<T> = unsafe { Node::deref(front) };
            let head: usize = mwcas.read(&front_node.next);

            if head == NULL_WORD {
                return None;
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
    pub fn front_elem<const POOL_SIZE: usize>(
        &self,
        mwcas: &MwCasHandle<POOL_SIZE>,
        _guard: &Guard<'_, POOL_SIZE>,
    ) -> Option<T> {
        let front: usize = self.front.load(Ordering::Acquire);
        let head: usize = mwcas.read(&unsafe { Node::<T>::deref(front) }.next);
        if head == NULL_WORD {
            return None;
        }
        Some(unsafe { Node::<T>::deref(head) }.elem.clone())
    }

    /// The newest element without removing it, or `None` if the queue is
    /// empty.
    pub fn back_elem<const POOL_SIZE: usize>(
        &self,
        mwcas: &MwCasHandle<POOL_SIZE>,
        _guard: &Guard<'_, POOL_SIZE>,
    ) -> Option<T> {
        let back: usize = mwcas.read(&self.back);
        if back == self.front.load(Ordering::Acquire) {
            return None;
        }
        Some(unsafe { Node::<T>::deref(back) }.elem.clone())
    }

    pub fn is_empty<const POOL_SIZE: usize>(
        &self,
        mwcas: &MwCasHandle<POOL_SIZE>,
        _guard: &Guard<'_, POOL_SIZE>,
    ) -> bool {
        let front: usize = self.front.load(Ordering::Acquire);
        mwcas.read(&unsafe { Node::<T>::deref(front) }.next) == NULL_WORD
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

impl<T: Clone + Send + Default + 'static> Default for QueueMwCas<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for QueueMwCas<T> {
    fn drop(&mut self) {
        drain_chain::<T>(self.front.load(Ordering::Relaxed));
    }
}
