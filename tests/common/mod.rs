use mwcas_bench::{DescriptorPool, MwCasHandle, MwCasTarget};

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::AtomicUsize;
        pub(crate) use loom::sync::Arc;
        pub(crate) use loom::thread;
    } else if #[cfg(feature = "shuttle")] {
        pub(crate) use shuttle::sync::atomic::AtomicUsize;
        pub(crate) use shuttle::sync::Arc;
        pub(crate) use shuttle::thread;
    } else {
        pub(crate) use std::sync::atomic::AtomicUsize;
        pub(crate) use std::sync::Arc;
        pub(crate) use std::thread;
    }
}

/// The deterministic target window of one operation: `arity` consecutive
/// fields starting here, which keeps every operation's targets sorted and
/// pairwise distinct without a random source.
pub(crate) fn window_start(
    thread_num: usize,
    op_num: usize,
    num_fields: usize,
    arity: usize,
) -> usize {
    (thread_num + op_num) % (num_fields - arity + 1)
}

/// Spawn `NUM_THREADS` threads which each perform `ops_per_thread` MwCAS
/// increments of `arity` fields, retrying each operation until it wins, then
/// check every field against the exact number of operations whose window
/// covered it.
pub(crate) fn increment_fields_test<const NUM_THREADS: usize, const NUM_FIELDS: usize>(
    ops_per_thread: usize,
    arity: usize,
) {
    let pool: Arc<DescriptorPool<NUM_THREADS>> = Arc::new(DescriptorPool::new());
    let fields: Arc<[AtomicUsize; NUM_FIELDS]> =
        Arc::new(core::array::from_fn(|_| AtomicUsize::new(0)));

    let join_handles: Vec<thread::JoinHandle<()>> = (0..NUM_THREADS)
        .map(|thread_num| {
            let mut handle: MwCasHandle<NUM_THREADS> =
                MwCasHandle::register(pool.clone()).unwrap();
            let fields: Arc<[AtomicUsize; NUM_FIELDS]> = fields.clone();
            thread::spawn(move || {
                for op_num in 0..ops_per_thread {
                    let start: usize = window_start(thread_num, op_num, NUM_FIELDS, arity);
                    loop {
                        let mut targets: Vec<MwCasTarget<'_>> = Vec::with_capacity(arity);
                        for word_num in 0..arity {
                            let field: &AtomicUsize = &fields[start + word_num];
                            let current: usize = handle.read(field);
                            targets.push(MwCasTarget::new(field, current, current + 1));
                        }
                        if handle.mwcas(&targets) {
                            break;
                        }
                    }
                }
            })
        })
        .collect();

    for join_handle in join_handles {
        join_handle.join().expect("a thread panicked");
    }

    // every operation retried until it succeeded, so each field must hold
    // exactly the number of operations whose window covered it
    let mut expected: Vec<usize> = vec![0; NUM_FIELDS];
    for thread_num in 0..NUM_THREADS {
        for op_num in 0..ops_per_thread {
            let start: usize = window_start(thread_num, op_num, NUM_FIELDS, arity);
            for word_num in 0..arity {
                expected[start + word_num] += 1;
            }
        }
    }

    let reader: MwCasHandle<NUM_THREADS> = MwCasHandle::register(pool).unwrap();
    for (field, &count) in fields.iter().zip(expected.iter()) {
        assert_eq!(reader.read(field), count);
    }
}
