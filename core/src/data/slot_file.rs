//! Slot-formatted sample files.
//!
//! Each line holds one named input slot followed by its dense values:
//!
//! ```text
//! 0\t0 1 2 3 4 5 6 7 8 9 10
//! 1\t0 1 2 3 4 5 6 7 8 9 10
//! ```
//!
//! The slot name and the values are separated by a single tab; values are
//! separated by single spaces.

use crate::error::{FleetError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Number of slots in the demo inference model.
pub const DEFAULT_NUM_SLOTS: usize = 20;
/// Width of every demo slot.
pub const DEFAULT_EMB_SIZE: usize = 11;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotRecord {
    pub slot: String,
    pub values: Vec<f32>,
}

impl SlotRecord {
    pub fn new(slot: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            slot: slot.into(),
            values,
        }
    }
}

/// Demo input: slot `i` (named `"i"`) holds `0, 1, ..., emb_size - 1`.
pub fn demo_slots(num_slots: usize, emb_size: usize) -> Vec<SlotRecord> {
    (0..num_slots)
        .map(|i| SlotRecord::new(i.to_string(), (0..emb_size).map(|v| v as f32).collect()))
        .collect()
}

pub fn write_slots<W: Write>(mut writer: W, records: &[SlotRecord]) -> Result<()> {
    for record in records {
        if record.slot.is_empty() || record.slot.contains(['\t', '\n']) {
            return Err(FleetError::Config(format!(
                "invalid slot name {:?}",
                record.slot
            )));
        }
        write!(writer, "{}\t", record.slot)?;
        for (i, value) in record.values.iter().enumerate() {
            if i > 0 {
                writer.write_all(b" ")?;
            }
            write!(writer, "{value}")?;
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Parses slot records. Blank lines are skipped.
pub fn read_slots<R: BufRead>(reader: R) -> Result<Vec<SlotRecord>> {
    let mut records = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }

        let (slot, values) = line.split_once('\t').ok_or_else(|| FleetError::Parse {
            line: line_no,
            message: "missing tab between slot name and values".to_string(),
        })?;
        if slot.is_empty() {
            return Err(FleetError::Parse {
                line: line_no,
                message: "empty slot name".to_string(),
            });
        }

        let values = values
            .split_whitespace()
            .map(|v| {
                v.parse::<f32>().map_err(|e| FleetError::Parse {
                    line: line_no,
                    message: format!("bad value {v:?}: {e}"),
                })
            })
            .collect::<Result<Vec<f32>>>()?;

        records.push(SlotRecord::new(slot, values));
    }

    Ok(records)
}

pub fn save_slot_file<P: AsRef<Path>>(path: P, records: &[SlotRecord]) -> Result<()> {
    let file = File::create(path)?;
    write_slots(BufWriter::new(file), records)
}

pub fn load_slot_file<P: AsRef<Path>>(path: P) -> Result<Vec<SlotRecord>> {
    let file = File::open(path)?;
    read_slots(BufReader::new(file))
}
