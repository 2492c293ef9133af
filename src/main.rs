use clap::{ArgAction, Parser};
use mwcas_bench::{
    Bench, BenchConfig, BenchResult, BenchTarget, LatencyPercentiles, OutputFormat,
};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Measure multi-word CAS implementations and the queues built on them.
#[derive(Debug, Parser)]
#[command(name = "mwcas-bench", version)]
struct Args {
    /// The total number of operations per run.
    #[arg(long, default_value_t = 100_000)]
    num_exec: usize,

    /// The number of worker threads.
    #[arg(long, default_value_t = 8)]
    num_thread: usize,

    /// The number of shared target fields.
    #[arg(long, default_value_t = 1_000)]
    num_field: usize,

    /// The number of MwCAS targets per operation.
    #[arg(long, default_value_t = 2)]
    num_target: usize,

    /// The skew of the Zipf distribution selecting target fields.
    #[arg(long, default_value_t = 0.0)]
    skew_parameter: f64,

    /// The base random seed; drawn from entropy when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Measure the MwCAS implementation.
    #[arg(long)]
    ours: bool,

    /// Measure independent single-word CAS updates.
    #[arg(long)]
    single: bool,

    /// Measure the MwCAS-based queue.
    #[arg(long)]
    queue_mwcas: bool,

    /// Measure the single-word-CAS queue.
    #[arg(long)]
    queue_cas: bool,

    /// Measure the lock-based queue.
    #[arg(long)]
    queue_mutex: bool,

    /// Emit results as one CSV row per implementation.
    #[arg(long)]
    csv: bool,

    /// Measure throughput when true, percentile latency when false.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    throughput: bool,
}

impl Args {
    fn selected_targets(&self) -> Vec<BenchTarget> {
        let mut targets: Vec<BenchTarget> = Vec::new();
        if self.ours {
            targets.push(BenchTarget::MwCas);
        }
        if self.single {
            targets.push(BenchTarget::SingleCas);
        }
        if self.queue_mwcas {
            targets.push(BenchTarget::QueueMwCas);
        }
        if self.queue_cas {
            targets.push(BenchTarget::QueueCas);
        }
        if self.queue_mutex {
            targets.push(BenchTarget::QueueMutex);
        }
        if targets.is_empty() {
            info!("no implementation selected; defaulting to the MwCAS implementation");
            targets.push(BenchTarget::MwCas);
        }
        targets
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Args = Args::parse();
    let targets: Vec<BenchTarget> = args.selected_targets();

    let format: OutputFormat = if args.csv {
        OutputFormat::Csv
    } else {
        OutputFormat::Text
    };
    let config: BenchConfig = BenchConfig {
        num_exec: args.num_exec,
        num_thread: args.num_thread,
        num_field: args.num_field,
        num_target: args.num_target,
        skew_parameter: args.skew_parameter,
        seed: args.seed.unwrap_or_else(rand::random),
        measure_throughput: args.throughput,
        format,
    };

    let bench: Bench = match Bench::new(config) {
        Ok(bench) => bench,
        Err(error) => {
            eprintln!("invalid configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    for target in targets {
        let result: BenchResult = bench.run(target);
        report(format, result);
    }
    ExitCode::SUCCESS
}

fn report(format: OutputFormat, result: BenchResult) {
    match (format, result) {
        (OutputFormat::Text, BenchResult::Throughput(ops_per_second)) => {
            println!("Throughput [Ops/s]: {ops_per_second}");
        }
        (OutputFormat::Csv, BenchResult::Throughput(ops_per_second)) => {
            println!("{ops_per_second}");
        }
        (OutputFormat::Text, BenchResult::Latency(percentiles)) => {
            let LatencyPercentiles {
                min,
                p90,
                p95,
                p99,
                max,
            } = percentiles;
            println!("Percentiled Latencies [ns]:");
            println!("  MIN: {min}");
            println!("  90%: {p90}");
            println!("  95%: {p95}");
            println!("  99%: {p99}");
            println!("  MAX: {max}");
        }
        (OutputFormat::Csv, BenchResult::Latency(percentiles)) => {
            let LatencyPercentiles {
                min,
                p90,
                p95,
                p99,
                max,
            } = percentiles;
            println!("{min},{p90},{p95},{p99},{max}");
        }
    }
}
