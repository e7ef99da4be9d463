//! Averages a fake model's gradients with one fused all-reduce per step.

use anyhow::{Result, ensure};
use clap::Parser;
use fleet_rs::CollectiveBackend;
use fleet_rs::distributed::{CoalesceBuilder, CpuBackend, FusedBuffer};
use fleet_rs::logging::init_logging;
use std::thread;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "coalesce_grads", about = "Fused gradient all-reduce on an in-process ring")]
struct Args {
    /// Number of ranks (threads) in the ring
    #[arg(short, long, default_value_t = 4)]
    world_size: usize,

    /// Number of linear layers in the fake model
    #[arg(short, long, default_value_t = 3)]
    layers: usize,

    /// Width of every layer
    #[arg(long, default_value_t = 64)]
    hidden: usize,

    /// Slot alignment in elements
    #[arg(long, default_value_t = 16)]
    alignment: usize,

    /// Training steps to simulate
    #[arg(long, default_value_t = 5)]
    steps: usize,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn local_gradients(args: &Args, rank: usize, step: usize) -> Result<FusedBuffer<f32>> {
    let mut builder = CoalesceBuilder::new().with_alignment(args.alignment);
    let value = (rank + step) as f32;
    for layer in 0..args.layers {
        let w = vec![value; args.hidden * args.hidden];
        builder.add(&format!("fc{layer}.w@GRAD"), &[args.hidden, args.hidden], &w)?;
        builder.add(&format!("fc{layer}.b@GRAD"), &[args.hidden], &vec![value; args.hidden])?;
    }
    Ok(builder.build())
}

fn run_rank(backend: CpuBackend, args: &Args) -> Result<()> {
    let rank = backend.rank();
    let world_size = backend.world_size();
    // Mean over ranks of (rank + step).
    let rank_mean = (world_size - 1) as f32 / 2.0;

    for step in 0..args.steps {
        let mut grads = local_gradients(args, rank, step)?;
        grads.all_reduce_mean(&backend)?;

        for (name, _, values) in grads.split() {
            let expected = rank_mean + step as f32;
            ensure!(
                values.iter().all(|&v| (v - expected).abs() < 1e-4),
                "{name} was not averaged on rank {rank}"
            );
        }
        debug!(rank, step, "step reduced");

        if rank == 0 && step == 0 {
            for (original, fused) in grads.renames() {
                info!(original, fused, "fused gradient");
            }
            info!(elements = grads.len(), "one collective per step");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let backends = CpuBackend::ring(args.world_size)?;
    thread::scope(|s| {
        let handles: Vec<_> = backends
            .into_iter()
            .map(|backend| {
                let args = &args;
                s.spawn(move || run_rank(backend, args))
            })
            .collect();
        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("rank thread panicked"))??;
        }
        Ok::<_, anyhow::Error>(())
    })?;

    println!(
        "{} steps reduced across {} ranks",
        args.steps, args.world_size
    );
    Ok(())
}
