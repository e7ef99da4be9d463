//! # fleet-rs
//!
//! `fleet-rs` contains the data-side plumbing of a data-parallel training
//! job: how each rank picks its share of the samples, how ranks agree on a
//! global metric, and how gradients are packed so one collective reduces
//! them all.
//!
//! Rank and world size are always passed in explicitly as a [`WorkerInfo`],
//! and every collective takes an explicit [`CollectiveBackend`] handle.
//!
//! ## Modules
//!
//! - [`data`]: Sharding iterators, samplers, batching loaders and slot files.
//! - [`distributed`]: Collective backends, metric reduction and gradient coalescing.
//! - [`worker`]: Worker identity.
//! - [`logging`]: Subscriber setup for binaries.
//!
//! ## Example
//!
//! ```rust
//! use fleet_rs::data::{GeneratorLoader, Phase, ShardedGenerator};
//! use fleet_rs::distributed::{CpuBackend, MetricPair};
//! use std::thread;
//!
//! let handles: Vec<_> = CpuBackend::ring(2)
//!     .unwrap()
//!     .into_iter()
//!     .map(|backend| {
//!         thread::spawn(move || {
//!             let shard = ShardedGenerator::new(|| 0..10u32, backend.worker());
//!             let loader = GeneratorLoader::new(shard, 4).unwrap().phase(Phase::Eval);
//!
//!             let mut local = MetricPair::<f64>::zeros(1);
//!             for batch in loader.iter() {
//!                 let even = batch.iter().filter(|&&x| x % 2 == 0).count();
//!                 local
//!                     .accumulate(&MetricPair::scalar(even as f64, batch.len() as f64))
//!                     .unwrap();
//!             }
//!             local.all_reduce(&backend).unwrap().scalar_ratio().unwrap()
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     assert_eq!(handle.join().unwrap(), 0.5);
//! }
//! ```

pub mod data;
pub mod distributed;
pub mod element;
pub mod error;
pub mod logging;
pub mod worker;

pub use distributed::CollectiveBackend;
pub use element::Element;
pub use error::{FleetError, Result};
pub use worker::WorkerInfo;
