//! Distributed evaluation on an in-process ring.
//!
//! Every rank evaluates its shard of a synthetic labelled stream, then the
//! ranks all-reduce `(correct, total)` and print the global accuracy next to
//! the (wrong) mean of the local accuracies.
//!
//! ```bash
//! cargo run -p fleet-demos --bin dist_eval -- --world-size 4 --samples 1001
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use fleet_rs::data::{GeneratorLoader, LoaderConfig, Phase, ShardedGenerator, TailPolicy};
use fleet_rs::distributed::{CpuBackend, MetricPair, accuracy};
use fleet_rs::logging::init_logging;
use fleet_rs::{CollectiveBackend, WorkerInfo};
use std::thread;
use tracing::info;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Tail {
    Keep,
    DropUneven,
}

impl From<Tail> for TailPolicy {
    fn from(tail: Tail) -> Self {
        match tail {
            Tail::Keep => TailPolicy::Keep,
            Tail::DropUneven => TailPolicy::DropUneven,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "dist_eval", about = "Sharded evaluation with a reduced accuracy metric")]
struct Args {
    /// Number of ranks (threads) in the ring
    #[arg(short, long, default_value_t = 4)]
    world_size: usize,

    /// Length of the synthetic evaluation stream
    #[arg(short, long, default_value_t = 1000)]
    samples: usize,

    /// Samples per batch
    #[arg(short, long, default_value_t = 32)]
    batch_size: usize,

    /// What to do with the samples that do not fill a whole round of ranks
    #[arg(long, value_enum, default_value_t = Tail::Keep)]
    tail: Tail,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// `(prediction, label)` for sample `i`. The model misses every multiple of 3.
fn synthetic_sample(i: usize) -> (u8, u8) {
    let label = (i % 5) as u8;
    let prediction = if i % 3 == 0 { label.wrapping_add(1) } else { label };
    (prediction, label)
}

struct RankReport {
    worker: WorkerInfo,
    local: MetricPair<f64>,
    global: MetricPair<f64>,
}

fn evaluate(backend: CpuBackend, args: &Args) -> Result<RankReport> {
    let worker = backend.worker();
    let samples = args.samples;
    let shard = ShardedGenerator::new(move || (0..samples).map(synthetic_sample), worker)
        .with_tail_policy(args.tail.into());
    let config = LoaderConfig::new(args.batch_size).phase(Phase::Eval);
    let loader = GeneratorLoader::from_config(shard, config)?;

    let mut local = MetricPair::zeros(1);
    for batch in loader.iter() {
        let (predictions, labels): (Vec<u8>, Vec<u8>) = batch.into_iter().unzip();
        local.accumulate(&accuracy(&predictions, &labels)?)?;
    }

    // Every rank reaches this call exactly once.
    let global = local.all_reduce(&backend)?;
    info!(
        rank = backend.rank(),
        correct = local.numerator()[0],
        total = local.denominator()[0],
        "local evaluation done"
    );
    Ok(RankReport {
        worker,
        local,
        global,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.world_size == 0 {
        bail!("--world-size must be at least 1");
    }
    let backends = CpuBackend::ring(args.world_size)?;

    let reports = thread::scope(|s| -> Result<Vec<RankReport>> {
        let handles: Vec<_> = backends
            .into_iter()
            .map(|backend| {
                let args = &args;
                thread::Builder::new()
                    .name(format!("rank-{}", backend.rank()))
                    .spawn_scoped(s, move || evaluate(backend, args))
            })
            .collect::<std::io::Result<_>>()?;

        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| anyhow::anyhow!("rank thread panicked"))
                    .and_then(|report| report)
            })
            .collect()
    })?;

    let mut mean_of_local = 0.0;
    for report in &reports {
        let local = report.local.scalar_ratio().context("scalar metric")?;
        mean_of_local += local / reports.len() as f64;
        println!(
            "{}: {} / {} correct, local accuracy {:.4}",
            report.worker,
            report.local.numerator()[0],
            report.local.denominator()[0],
            local
        );
    }

    let global = reports[0].global.scalar_ratio().context("scalar metric")?;
    if reports
        .iter()
        .any(|r| r.global.scalar_ratio() != Some(global))
    {
        bail!("ranks disagree on the global metric");
    }
    info!(global, mean_of_local, "reduced accuracy");
    println!("global accuracy  {global:.4}");
    println!("mean of local    {mean_of_local:.4}");
    Ok(())
}
