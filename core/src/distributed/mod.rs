//! # Distributed Training Utilities
//!
//! In data-parallel training every rank holds a full copy of the model and
//! works on its own shard of the data (see [`crate::data::shard`]). Whenever
//! ranks need to agree on something (gradients, evaluation metrics) they meet
//! in a **collective**: an operation every rank must call, that returns the
//! same combined result to all of them.
//!
//! ## Module Contents
//!
//! *   [`CollectiveBackend`](backend::CollectiveBackend): the interface for
//!     communication. Passed explicitly to whatever needs it.
//!     *   [`CpuBackend`](cpu_backend::CpuBackend): a pure Rust **Ring All-Reduce**
//!         between threads, useful for tests and single-host runs.
//! *   [`MetricPair`](metric::MetricPair): reduces `(numerator, denominator)`
//!     pairs so the global ratio is weighted by shard size.
//! *   [`FusedBuffer`](coalesce::FusedBuffer): packs many gradients into one
//!     contiguous buffer so a single collective reduces all of them.
//!
//! ## Lockstep
//!
//! Collectives block until every rank in the group has issued the matching
//! call. There is no timeout: if one rank never arrives (it crashed, or took a
//! different branch) the others wait forever. Callers must make sure every
//! rank performs the same sequence of collectives, e.g. by giving every rank
//! the same number of batches.

pub mod backend;
pub mod coalesce;
pub mod cpu_backend;
pub mod metric;

pub use backend::CollectiveBackend;
pub use coalesce::{CoalesceBuilder, FusedBuffer, FusedSlot};
pub use cpu_backend::CpuBackend;
pub use metric::{MetricPair, accuracy};
