//! Data loading and processing utilities.
//!
//! This module provides primitives for sharding, sampling, and batching data for
//! data-parallel training.
//!
//! # Components
//!
//! - **Dataset**: A trait for accessing individual data items.
//! - **SampleGenerator**: A restartable source of samples (closures work too).
//! - **Shard**: Lazy rank partitioning of a sample stream ([`ShardExt`], [`ShardedGenerator`]).
//! - **Sampler**: A trait for determining the order of data access, including
//!   [`DistributedSampler`] for index-based datasets.
//! - **Loaders**: [`DataLoader`] and [`GeneratorLoader`] batch samples, with a
//!   `drop_last` policy that defaults by [`Phase`].
//! - **Slot files**: the text format used for demo inference inputs.

pub mod loader;
pub mod sampler;
pub mod shard;
pub mod slot_file;

pub use loader::{
    BatchIter, Collate, DataLoader, DefaultCollate, GeneratorLoader, LoaderConfig, Phase,
    num_batches,
};
pub use sampler::{DistributedSampler, RandomSampler, Sampler, SequentialSampler, ShardStrategy};
pub use shard::{SampleGenerator, ShardExt, ShardIter, ShardedGenerator, TailPolicy, TryShardIter};
pub use slot_file::{SlotRecord, load_slot_file, read_slots, save_slot_file, write_slots};

/// A trait for accessing data items.
///
/// A `Dataset` represents a collection of data items (e.g., images, text samples)
/// that can be accessed by index.
///
/// # Type Parameters
///
/// * `T`: The type of the data item returned by `get`.
pub trait Dataset<T>: Send + Sync {
    /// Returns the total number of items in the dataset.
    fn len(&self) -> usize;

    /// Returns `true` if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the item at the given index.
    ///
    /// # Panics
    ///
    /// May panic if `index` is out of bounds.
    fn get(&self, index: usize) -> T;
}

// Implement Dataset for Vec<T>
impl<T: Clone + Send + Sync> Dataset<T> for Vec<T> {
    fn len(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}
