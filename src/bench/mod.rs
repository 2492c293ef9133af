//! The measurement driver: thread spawning, start/finish gates, and
//! throughput/latency aggregation.
//!
//! A run spawns `num_thread` workers which pre-generate their operation lists
//! before any clock starts. Two gates keep the measurement honest: the start
//! gate releases the workers only once every worker has finished
//! constructing its private state, and the finish gate holds them together
//! again once measurement ends, so no worker sorts or reports while another
//! is still timing.

use crate::epoch::Collector;
use crate::mwcas::DescriptorPool;
use crate::sync::Arc;
use crate::types::{MAX_TARGET_NUM, MAX_THREAD_NUM};
use crate::workload::ZipfGenerator;
use displaydoc::Display;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Barrier;
use std::thread;
use std::thread::ScopedJoinHandle;
use tracing::{info, warn};
use worker::{SharedTarget, Worker, WorkerReport};

mod worker;

/// The implementations a run can measure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchTarget {
    /// Field increments through the multi-word CAS engine.
    MwCas,
    /// Field increments through independent single-word CAS loops.
    SingleCas,
    /// Alternating push/pop on the MwCAS-based queue.
    QueueMwCas,
    /// Alternating push/pop on the single-word-CAS queue.
    QueueCas,
    /// Alternating push/pop on the lock-based queue.
    QueueMutex,
}

impl fmt::Display for BenchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            Self::MwCas => "mwcas",
            Self::SingleCas => "single",
            Self::QueueMwCas => "queue_mwcas",
            Self::QueueCas => "queue_cas",
            Self::QueueMutex => "queue_mutex",
        };
        f.write_str(name)
    }
}

/// How results are rendered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// One comma-separated row per measured implementation.
    Csv,
}

/// The full configuration of a benchmark run, threaded through the driver as
/// one value.
#[derive(Clone, Debug)]
pub struct BenchConfig {
    /// The total number of operations per run, split across the workers.
    pub num_exec: usize,
    /// The number of worker threads.
    pub num_thread: usize,
    /// The number of shared target fields.
    pub num_field: usize,
    /// The number of MwCAS targets per operation.
    pub num_target: usize,
    /// The skew of the Zipf distribution selecting target fields.
    pub skew_parameter: f64,
    /// The base random seed; worker seeds are drawn from it.
    pub seed: u64,
    /// Measure throughput when true, percentile latency when false.
    pub measure_throughput: bool,
    /// How results are rendered.
    pub format: OutputFormat,
}

/// Rejected configurations.
#[derive(Debug, Display, PartialEq)]
pub enum ConfigError {
    /// num_exec must be positive.
    ZeroExecutions,
    /** num_exec must be at least num_thread so every worker runs at least one
       operation.
    */
    FewerExecutionsThanThreads,
    /// num_thread must be between 1 and the pool size, but was {0}.
    BadThreadCount(usize),
    /// num_field must be positive.
    ZeroFields,
    /// num_target must be between 1 and the per-operation maximum, but was {0}.
    BadTargetCount(usize),
    /// num_target ({0}) cannot exceed num_field ({1}).
    TooFewFields(usize, usize),
    /// skew_parameter must be non-negative, but was {0}.
    NegativeSkew(f64),
}

impl BenchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_exec == 0 {
            return Err(ConfigError::ZeroExecutions);
        }
        if self.num_thread == 0 || self.num_thread > MAX_THREAD_NUM {
            return Err(ConfigError::BadThreadCount(self.num_thread));
        }
        if self.num_exec < self.num_thread {
            return Err(ConfigError::FewerExecutionsThanThreads);
        }
        if self.num_field == 0 {
            return Err(ConfigError::ZeroFields);
        }
        if !(1..=MAX_TARGET_NUM).contains(&self.num_target) {
            return Err(ConfigError::BadTargetCount(self.num_target));
        }
        if self.num_target > self.num_field {
            return Err(ConfigError::TooFewFields(self.num_target, self.num_field));
        }
        if self.skew_parameter < 0.0 {
            return Err(ConfigError::NegativeSkew(self.skew_parameter));
        }
        Ok(())
    }
}

/// Percentile latencies in nanoseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LatencyPercentiles {
    pub min: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
}

/// The aggregated outcome of one run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BenchResult {
    /// Operations per second.
    Throughput(f64),
    /// Percentile latencies in nanoseconds.
    Latency(LatencyPercentiles),
}

/// A validated benchmark ready to run.
#[derive(Debug)]
pub struct Bench {
    config: BenchConfig,
}

impl Bench {
    pub fn new(config: BenchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Measure `target` once and return the aggregated result.
    pub fn run(&self, target: BenchTarget) -> BenchResult {
        let config: &BenchConfig = &self.config;
        info!(
            "running {target} with {} threads and {} operations",
            config.num_thread, config.num_exec
        );

        let shared: SharedTarget = SharedTarget::new(target, config.num_field);
        let pool: Arc<DescriptorPool<MAX_THREAD_NUM>> = Arc::new(DescriptorPool::new());
        let collector: Arc<Collector<MAX_THREAD_NUM>> = Arc::new(Collector::new());
        let zipf: ZipfGenerator = ZipfGenerator::new(config.num_field, config.skew_parameter);

        let start_gate: Barrier = Barrier::new(config.num_thread + 1);
        let finish_gate: Barrier = Barrier::new(config.num_thread + 1);

        let mut seeder: StdRng = StdRng::seed_from_u64(config.seed);

        let reports: Vec<WorkerReport> = thread::scope(|scope| {
            let mut join_handles: Vec<ScopedJoinHandle<'_, WorkerReport>> =
                Vec::with_capacity(config.num_thread);
            let mut assigned: usize = 0;
            for worker_num in 0..config.num_thread {
                let operation_count: usize = if worker_num < config.num_thread - 1 {
                    config.num_exec / config.num_thread
                } else {
                    config.num_exec - assigned
                };
                assigned += operation_count;

                let worker_seed: u64 = seeder.gen();
                let shared: &SharedTarget = &shared;
                let zipf: &ZipfGenerator = &zipf;
                let start_gate: &Barrier = &start_gate;
                let finish_gate: &Barrier = &finish_gate;
                let pool: Arc<DescriptorPool<MAX_THREAD_NUM>> = pool.clone();
                let collector: Arc<Collector<MAX_THREAD_NUM>> = collector.clone();
                let target_count: usize = config.num_target;
                let measure_throughput: bool = config.measure_throughput;

                join_handles.push(scope.spawn(move || {
                    let mut worker: Worker<'_> = Worker::new(
                        target,
                        shared,
                        pool,
                        collector,
                        operation_count,
                        target_count,
                        worker_seed,
                        |rng| zipf.sample(rng),
                    );

                    start_gate.wait();
                    if measure_throughput {
                        worker.measure_throughput();
                    } else {
                        worker.measure_latency();
                    }
                    finish_gate.wait();

                    worker.sort_execution_times();
                    worker.into_report()
                }));
            }

            // every worker has finished constructing its private state
            start_gate.wait();
            // every worker has finished measuring
            finish_gate.wait();

            join_handles
                .into_iter()
                // a worker panic means the measurement is unusable; abort
                .map(|handle| handle.join().expect("a worker thread panicked"))
                .collect()
        });
        info!("finished running {target}");

        if config.measure_throughput {
            BenchResult::Throughput(compute_throughput(config.num_exec, &reports))
        } else {
            BenchResult::Latency(compute_latency_percentiles(config.num_exec, &reports))
        }
    }
}

fn compute_throughput(num_exec: usize, reports: &[WorkerReport]) -> f64 {
    let mut total_nanos: u128 = 0;
    for report in reports {
        let mut nanos: u64 = report.total_time_nanos;
        if nanos == 0 {
            warn!("a worker reported zero execution time; clamping to 1ns");
            nanos = 1;
        }
        total_nanos += u128::from(nanos);
    }
    let average_nanos: f64 = total_nanos as f64 / reports.len() as f64;
    num_exec as f64 / (average_nanos / 1e9)
}

/// Merge the workers' sorted latency arrays from the largest value down.
///
/// Walking the top decile of a k-way max-merge touches only the entries the
/// percentiles need, but yields the same values as sorting all latencies into
/// one array and indexing it.
fn compute_latency_percentiles(num_exec: usize, reports: &[WorkerReport]) -> LatencyPercentiles {
    let mut min: u64 = u64::MAX;
    let mut indexes: Vec<Option<usize>> = Vec::with_capacity(reports.len());
    for report in reports {
        indexes.push(report.sorted_latencies_nanos.len().checked_sub(1));
        if let Some(&first) = report.sorted_latencies_nanos.first() {
            min = min.min(first);
        }
    }

    let mut percentiles: LatencyPercentiles = LatencyPercentiles {
        min,
        p90: 0,
        p95: 0,
        p99: 0,
        max: 0,
    };

    let floor: usize = (num_exec as f64 * 0.90) as usize;
    for count in (floor..=num_exec).rev() {
        let mut largest: Option<(usize, usize, u64)> = None;
        for (worker_num, report) in reports.iter().enumerate() {
            if let Some(index) = indexes[worker_num] {
                let time: u64 = report.sorted_latencies_nanos[index];
                if largest.is_none() || largest.is_some_and(|(_, _, max_time)| time > max_time) {
                    largest = Some((worker_num, index, time));
                }
            }
        }
        let Some((worker_num, index, max_time)) = largest else {
            break;
        };

        if count == num_exec {
            percentiles.max = max_time;
        } else if count == (num_exec as f64 * 0.99) as usize {
            percentiles.p99 = max_time;
        } else if count == (num_exec as f64 * 0.95) as usize {
            percentiles.p95 = max_time;
        }
        if count == floor {
            percentiles.p90 = max_time;
        }

        indexes[worker_num] = index.checked_sub(1);
    }
    percentiles
}

#[cfg(all(test, not(loom), not(feature = "shuttle")))]
mod tests {
    use super::*;
    use test_log::test;
    use tracing::debug;

    fn report_with_latencies(mut latencies: Vec<u64>) -> WorkerReport {
        latencies.sort_unstable();
        WorkerReport {
            total_time_nanos: 0,
            sorted_latencies_nanos: latencies,
        }
    }

    fn small_config() -> BenchConfig {
        BenchConfig {
            num_exec: 4_000,
            num_thread: 4,
            num_field: 16,
            num_target: 2,
            skew_parameter: 0.0,
            seed: 1,
            measure_throughput: true,
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn test_config_validation() {
        let valid: BenchConfig = small_config();
        assert!(valid.validate().is_ok());

        let mut config: BenchConfig = small_config();
        config.num_exec = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroExecutions));

        let mut config: BenchConfig = small_config();
        config.num_thread = MAX_THREAD_NUM + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::BadThreadCount(MAX_THREAD_NUM + 1))
        );

        let mut config: BenchConfig = small_config();
        config.num_exec = 3;
        assert_eq!(
            config.validate(),
            Err(ConfigError::FewerExecutionsThanThreads)
        );

        let mut config: BenchConfig = small_config();
        config.num_target = MAX_TARGET_NUM + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::BadTargetCount(MAX_TARGET_NUM + 1))
        );

        let mut config: BenchConfig = small_config();
        config.num_field = 1;
        assert_eq!(config.validate(), Err(ConfigError::TooFewFields(2, 1)));

        let mut config: BenchConfig = small_config();
        config.skew_parameter = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::NegativeSkew(-1.0)));
    }

    #[test]
    fn test_throughput_math() {
        let reports: Vec<WorkerReport> = vec![
            WorkerReport {
                total_time_nanos: 1_000_000_000,
                sorted_latencies_nanos: Vec::new(),
            },
            WorkerReport {
                total_time_nanos: 1_000_000_000,
                sorted_latencies_nanos: Vec::new(),
            },
        ];
        let throughput: f64 = compute_throughput(1_000, &reports);
        assert!((throughput - 1_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_time_worker_is_not_fatal() {
        let reports: Vec<WorkerReport> = vec![WorkerReport {
            total_time_nanos: 0,
            sorted_latencies_nanos: Vec::new(),
        }];
        let throughput: f64 = compute_throughput(100, &reports);
        assert!(throughput.is_finite());
        assert!(throughput > 0.0);
    }

    #[test]
    fn test_latency_merge_matches_a_full_sort() {
        // three workers with interleaved values, 100 latencies in total
        let mut all: Vec<u64> = Vec::new();
        let mut per_worker: Vec<Vec<u64>> = vec![Vec::new(), Vec::new(), Vec::new()];
        for i in 0..100u64 {
            let value: u64 = (i * 7919) % 1000;
            all.push(value);
            per_worker[(i as usize) % 3].push(value);
        }
        all.sort_unstable();

        let reports: Vec<WorkerReport> =
            per_worker.into_iter().map(report_with_latencies).collect();
        let percentiles: LatencyPercentiles = compute_latency_percentiles(100, &reports);
        debug!("percentiles: {percentiles:?}");

        // the value recorded at `count` is the count-th smallest overall
        assert_eq!(percentiles.min, all[0]);
        assert_eq!(percentiles.p90, all[89]);
        assert_eq!(percentiles.p95, all[94]);
        assert_eq!(percentiles.p99, all[98]);
        assert_eq!(percentiles.max, all[99]);
    }

    #[test]
    fn test_throughput_run_reports_positive_ops() {
        let bench: Bench = Bench::new(small_config()).unwrap();
        for target in [
            BenchTarget::MwCas,
            BenchTarget::SingleCas,
            BenchTarget::QueueMwCas,
            BenchTarget::QueueCas,
            BenchTarget::QueueMutex,
        ] {
            let result: BenchResult = bench.run(target);
            let BenchResult::Throughput(ops_per_second) = result else {
                panic!("expected a throughput result");
            };
            debug!("{target}: {ops_per_second} ops/s");
            assert!(ops_per_second > 0.0);
        }
    }

    #[test]
    fn test_latency_run_reports_ordered_percentiles() {
        let mut config: BenchConfig = small_config();
        config.measure_throughput = false;
        let bench: Bench = Bench::new(config).unwrap();

        let result: BenchResult = bench.run(BenchTarget::MwCas);
        let BenchResult::Latency(percentiles) = result else {
            panic!("expected a latency result");
        };
        debug!("percentiles: {percentiles:?}");
        assert!(percentiles.min <= percentiles.p90);
        assert!(percentiles.p90 <= percentiles.p95);
        assert!(percentiles.p95 <= percentiles.p99);
        assert!(percentiles.p99 <= percentiles.max);
    }
}
