//! # mwcas-bench
//!
//! A benchmarking harness for a lock-free multi-word compare-and-swap
//! primitive, together with the lock-free FIFO queues built on top of it.
//! Because the primitive only requires single-width hardware CAS, it is
//! lock-free on most platforms, including RISC-V, AArch64, and x86-64.
//!
//! # Usage
//! ## Example
//! ```edition2021
//! use mwcas_bench::{DescriptorPool, MwCasHandle, MwCasTarget};
//! use std::sync::atomic::AtomicUsize;
//! use std::sync::Arc;
//!
//! // Reserve descriptor slots for 2 threads.
//! let pool: Arc<DescriptorPool<2>> = Arc::new(DescriptorPool::new());
//!
//! // Each thread claims its own handle.
//! let mut handle: MwCasHandle<2> = MwCasHandle::register(pool.clone()).unwrap();
//!
//! // Array storage guarantees ascending target addresses.
//! let fields: [AtomicUsize; 2] = [AtomicUsize::new(1), AtomicUsize::new(2)];
//!
//! let succeeded: bool = handle.mwcas(&[
//!     MwCasTarget::new(&fields[0], 1, 10),
//!     MwCasTarget::new(&fields[1], 2, 20),
//! ]);
//!
//! assert!(succeeded);
//! assert_eq!(handle.read(&fields[0]), 10);
//! assert_eq!(handle.read(&fields[1]), 20);
//! ```
//!
//! ## Details
//! Begin by instantiating a [DescriptorPool], which is shared between threads
//! so they can help each other's operations to completion. The pool reserves
//! all the memory it needs during initialization; its `POOL_SIZE` const
//! argument is the maximum number of threads which can operate on it at any
//! given time.
//!
//! Next, each thread claims a [MwCasHandle] and calls its
//! [mwcas](MwCasHandle::mwcas) method with a sorted, pairwise-distinct list
//! of [MwCasTarget]s. A target word which currently carries another
//! operation's descriptor marker is never waited on: the encountering thread
//! drives that operation through its remaining phases first, so some thread
//! always makes progress. Values read back through
//! [read](MwCasHandle::read) are always plain values, never markers.
//!
//! The queue containers ([QueueMwCas], [QueueCas], [QueueMutex]) and the
//! measurement driver ([Bench]) sit on top of the primitive. The lock-free
//! queues retire their popped nodes through the epoch-based [Collector], so
//! a thread holding a [Guard](crate::Guard) can finish traversing nodes that
//! were already unlinked.
//!
//! # Limitations
//! ## Target addresses must be used across threads in the same order
//! When two overlapping target sets are passed into operations in two
//! threads in opposite orders, helping could cycle. [MwCasHandle::mwcas]
//! therefore requires targets sorted by address, which makes the total order
//! uniform across all threads.
//!
//! ## The most significant bit of values is reserved
//! As an intermediate step, the engine swaps tagged markers into the target
//! words, distinguished from plain values by the most significant bit. Plain
//! values must leave that bit clear; canonical user-space pointers and
//! 63-bit counters all qualify. See [is_plain_value].

#![warn(missing_debug_implementations)]

mod bench;
mod epoch;
mod err;
mod mwcas;
mod queue;
mod status;
mod sync;
mod types;
mod workload;

pub use bench::{
    Bench, BenchConfig, BenchResult, BenchTarget, ConfigError, LatencyPercentiles, OutputFormat,
};
pub use epoch::{Collector, Guard, LocalHandle, GC_INTERVAL};
pub use err::{NoThreadSlotAvailableError, RegisterError};
pub use mwcas::{DescriptorPool, MwCasHandle, MwCasTarget};
pub use queue::{QueueCas, QueueMutex, QueueMwCas};
pub use types::{
    get_bit_length_of_pool_size, is_descriptor_marker, is_plain_value, MAX_TARGET_NUM,
    MAX_THREAD_NUM,
};
pub use workload::ZipfGenerator;
