#![cfg(all(not(loom), not(feature = "shuttle")))]

use mwcas_bench::{Collector, LocalHandle, GC_INTERVAL};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use test_log::test;

/// Retire enough no-op garbage to force several advance attempts.
fn churn(handle: &LocalHandle<2>) {
    for _ in 0..(3 * GC_INTERVAL) {
        let guard = handle.pin();
        guard.defer(|| {});
    }
}

#[test]
fn test_deferred_free_waits_for_concurrent_guard() {
    let collector: Arc<Collector<2>> = Arc::new(Collector::new());
    let freed: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    let (to_reader, reader_commands) = mpsc::channel::<()>();
    let (to_writer, writer_acks) = mpsc::channel::<()>();

    let reader_collector: Arc<Collector<2>> = collector.clone();
    let reader: thread::JoinHandle<()> = thread::spawn(move || {
        let handle: LocalHandle<2> = LocalHandle::register(reader_collector).unwrap();
        let guard = handle.pin();
        to_writer.send(()).unwrap();

        // hold the guard until the writer has verified nothing was freed
        reader_commands.recv().unwrap();
        drop(guard);
        to_writer.send(()).unwrap();
    });

    let writer: LocalHandle<2> = LocalHandle::register(collector).unwrap();

    // the reader is pinned before the retire happens
    writer_acks.recv().unwrap();
    {
        let guard = writer.pin();
        let freed: Arc<AtomicUsize> = freed.clone();
        guard.defer(move || {
            freed.fetch_add(1, Ordering::AcqRel);
        });
    }

    // however often the writer churns, the pinned reader caps the epoch one
    // advance past its pin, which is short of the two-epoch quiescence gap
    churn(&writer);
    assert_eq!(freed.load(Ordering::Acquire), 0);

    to_reader.send(()).unwrap();
    writer_acks.recv().unwrap();
    reader.join().expect("the reader panicked");

    // with the guard gone the epoch can move the rest of the way
    churn(&writer);
    assert_eq!(freed.load(Ordering::Acquire), 1);
}
