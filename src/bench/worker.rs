use crate::bench::BenchTarget;
use crate::epoch::{Collector, Guard, LocalHandle};
use crate::mwcas::{DescriptorPool, MwCasHandle, MwCasTarget};
use crate::queue::{QueueCas, QueueMutex, QueueMwCas};
use crate::sync::{Arc, AtomicUsize, Ordering};
use crate::types::{MAX_TARGET_NUM, MAX_THREAD_NUM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// The shared structure a benchmark run operates on.
#[derive(Debug)]
pub(crate) enum SharedTarget {
    Fields(Box<[AtomicUsize]>),
    QueueMwCas(QueueMwCas<u64>),
    QueueCas(QueueCas<u64>),
    QueueMutex(QueueMutex<u64>),
}

impl SharedTarget {
    pub(crate) fn new(target: BenchTarget, num_field: usize) -> Self {
        match target {
            BenchTarget::MwCas | BenchTarget::SingleCas => {
                Self::Fields((0..num_field).map(|_| AtomicUsize::new(0)).collect())
            }
            BenchTarget::QueueMwCas => Self::QueueMwCas(QueueMwCas::new()),
            BenchTarget::QueueCas => Self::QueueCas(QueueCas::new()),
            BenchTarget::QueueMutex => Self::QueueMutex(QueueMutex::new()),
        }
    }
}

/// One pre-generated benchmark operation.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Operation {
    /// Increment `target_count` distinct fields, identified by the sorted
    /// leading entries of `targets`.
    FieldUpdate {
        targets: [usize; MAX_TARGET_NUM],
        target_count: usize,
    },
    QueuePush(u64),
    QueuePop,
}

/// The timings one worker hands back to the driver.
#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub(crate) total_time_nanos: u64,
    pub(crate) sorted_latencies_nanos: Vec<u64>,
}

/// A benchmark worker bound to one thread.
///
/// The operation list is generated up front so the measured loop contains no
/// random drawing or allocation beyond what the operations themselves do.
pub(crate) struct Worker<'bench> {
    target_kind: BenchTarget,
    shared: &'bench SharedTarget,
    mwcas: MwCasHandle<MAX_THREAD_NUM>,
    ebr: LocalHandle<MAX_THREAD_NUM>,
    operations: Vec<Operation>,
    execution_times_nanos: Vec<u64>,
    total_time_nanos: u64,
}

impl<'bench> Worker<'bench> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new<F: FnMut(&mut StdRng) -> usize>(
        target_kind: BenchTarget,
        shared: &'bench SharedTarget,
        pool: Arc<DescriptorPool<MAX_THREAD_NUM>>,
        collector: Arc<Collector<MAX_THREAD_NUM>>,
        operation_count: usize,
        target_count: usize,
        seed: u64,
        mut select_field: F,
    ) -> Self {
        // slot exhaustion here is a sizing mistake; the run aborts
        let mwcas: MwCasHandle<MAX_THREAD_NUM> =
            MwCasHandle::register(pool).expect("descriptor pool exhausted");
        let ebr: LocalHandle<MAX_THREAD_NUM> =
            LocalHandle::register(collector).expect("epoch collector exhausted");

        let mut rng: StdRng = StdRng::seed_from_u64(seed);
        let mut operations: Vec<Operation> = Vec::with_capacity(operation_count);
        match target_kind {
            BenchTarget::MwCas | BenchTarget::SingleCas => {
                for _ in 0..operation_count {
                    let mut targets: [usize; MAX_TARGET_NUM] = [0; MAX_TARGET_NUM];
                    for word_num in 0..target_count {
                        // redraw until this operation's targets are distinct
                        let field_index: usize = loop {
                            let candidate: usize = select_field(&mut rng);
                            if !targets[..word_num].contains(&candidate) {
                                break candidate;
                            }
                        };
                        targets[word_num] = field_index;
                    }
                    // sorted targets keep helping cycles impossible
                    targets[..target_count].sort_unstable();
                    operations.push(Operation::FieldUpdate {
                        targets,
                        target_count,
                    });
                }
            }
            BenchTarget::QueueMwCas | BenchTarget::QueueCas | BenchTarget::QueueMutex => {
                for op_num in 0..operation_count {
                    if op_num % 2 == 0 {
                        operations.push(Operation::QueuePush(rng.gen()));
                    } else {
                        operations.push(Operation::QueuePop);
                    }
                }
            }
        }

        Self {
            target_kind,
            shared,
            mwcas,
            ebr,
            operations,
            execution_times_nanos: Vec::with_capacity(operation_count),
            total_time_nanos: 0,
        }
    }

    /// Run every operation back to back and record the total wall-clock time.
    pub(crate) fn measure_throughput(&mut self) {
        let start: Instant = Instant::now();
        for op_num in 0..self.operations.len() {
            let operation: Operation = self.operations[op_num];
            self.perform(operation);
        }
        self.total_time_nanos = start.elapsed().as_nanos() as u64;
    }

    /// Run every operation and record its individual execution time.
    pub(crate) fn measure_latency(&mut self) {
        for op_num in 0..self.operations.len() {
            let operation: Operation = self.operations[op_num];
            let start: Instant = Instant::now();
            self.perform(operation);
            self.execution_times_nanos
                .push(start.elapsed().as_nanos() as u64);
        }
    }

    /// Sort the recorded per-operation times so the driver can merge
    /// percentiles across workers.
    pub(crate) fn sort_execution_times(&mut self) {
        self.execution_times_nanos.sort_unstable();
    }

    pub(crate) fn into_report(self) -> WorkerReport {
        WorkerReport {
            total_time_nanos: self.total_time_nanos,
            sorted_latencies_nanos: self.execution_times_nanos,
        }
    }

    fn perform(&mut self, operation: Operation) {
        let shared: &SharedTarget = self.shared;
        let guard: Guard<'_, MAX_THREAD_NUM> = self.ebr.pin();

        match (shared, operation) {
            (
                SharedTarget::Fields(fields),
                Operation::FieldUpdate {
                    targets,
                    target_count,
                },
            ) => match self.target_kind {
                BenchTarget::MwCas => {
                    increment_fields_mwcas(&mut self.mwcas, fields, &targets[..target_count]);
                }
                BenchTarget::SingleCas => {
                    increment_fields_single_cas(fields, &targets[..target_count]);
                }
                _ => unreachable!("field updates only run on the field targets"),
            },
            (SharedTarget::QueueMwCas(queue), Operation::QueuePush(elem)) => {
                queue.push(elem, &mut self.mwcas, &guard);
            }
            (SharedTarget::QueueMwCas(queue), Operation::QueuePop) => {
                queue.pop(&self.mwcas, &guard);
            }
            (SharedTarget::QueueCas(queue), Operation::QueuePush(elem)) => {
                queue.push(elem, &guard);
            }
            (SharedTarget::QueueCas(queue), Operation::QueuePop) => {
                queue.pop(&guard);
            }
            (SharedTarget::QueueMutex(queue), Operation::QueuePush(elem)) => {
                queue.push(elem);
            }
            (SharedTarget::QueueMutex(queue), Operation::QueuePop) => {
                queue.pop();
            }
            _ => unreachable!("operation does not match the shared target"),
        }
    }
}

/// Increment every targeted field by one in a single atomic step, retrying
/// until the operation wins.
fn increment_fields_mwcas(
    mwcas: &mut MwCasHandle<MAX_THREAD_NUM>,
    fields: &[AtomicUsize],
    target_indexes: &[usize],
) {
    let mut targets: Vec<MwCasTarget<'_>> = Vec::with_capacity(target_indexes.len());
    loop {
        targets.clear();
        for &field_index in target_indexes {
            let field: &AtomicUsize = &fields[field_index];
            let current: usize = mwcas.read(field);
            targets.push(MwCasTarget::new(field, current, current + 1));
        }
        if mwcas.mwcas(&targets) {
            return;
        }
    }
}

/// Increment every targeted field by one with independent single-word CAS
/// loops. The increments are not atomic as a group; this is the baseline the
/// MwCAS implementation is compared against.
fn increment_fields_single_cas(fields: &[AtomicUsize], target_indexes: &[usize]) {
    for &field_index in target_indexes {
        let field: &AtomicUsize = &fields[field_index];
        let mut current: usize = field.load(Ordering::Relaxed);
        loop {
            match field.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual_value) => current = actual_value,
            }
        }
    }
}
