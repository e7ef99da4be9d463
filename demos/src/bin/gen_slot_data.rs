//! Writes the demo inference input: one line per slot, `name\tv0 v1 ...`.

use anyhow::{Context, Result};
use clap::Parser;
use fleet_rs::data::save_slot_file;
use fleet_rs::data::slot_file::{DEFAULT_EMB_SIZE, DEFAULT_NUM_SLOTS, demo_slots};
use fleet_rs::logging::init_logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gen_slot_data", about = "Generate a slot-formatted demo input file")]
struct Args {
    /// Output file
    #[arg(short, long, default_value = "fake_input.txt")]
    output: PathBuf,

    /// Number of slots
    #[arg(long, default_value_t = DEFAULT_NUM_SLOTS)]
    num_slots: usize,

    /// Values per slot
    #[arg(long, default_value_t = DEFAULT_EMB_SIZE)]
    emb_size: usize,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let records = demo_slots(args.num_slots, args.emb_size);
    save_slot_file(&args.output, &records)
        .with_context(|| format!("writing {}", args.output.display()))?;

    info!(
        path = %args.output.display(),
        slots = args.num_slots,
        emb_size = args.emb_size,
        "wrote slot file"
    );
    Ok(())
}
