//! Batching loaders.
//!
//! [`DataLoader`] walks an indexable [`Dataset`] in the order chosen by a
//! [`Sampler`]. [`GeneratorLoader`] groups the output of a restartable
//! [`SampleGenerator`] (typically a [`ShardedGenerator`](super::ShardedGenerator))
//! into batches. Both honour a `drop_last` flag for the trailing incomplete
//! batch.

use super::{Dataset, RandomSampler, SampleGenerator, Sampler, SequentialSampler};
use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Trait for collating a list of items into a batch.
pub trait Collate<T> {
    /// The type of the batched output (e.g., `Vec<T>`, a column-major struct).
    type Output;

    /// Collates a vector of items into a single batch.
    fn collate(batch: Vec<T>) -> Self::Output;
}

/// A default collator that just returns the `Vec<T>`.
/// Useful for simple cases or when manual collation is desired later.
pub struct DefaultCollate;

impl<T> Collate<T> for DefaultCollate {
    type Output = Vec<T>;

    fn collate(batch: Vec<T>) -> Self::Output {
        batch
    }
}

/// Whether a pass is used to update weights or to measure them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Train,
    Eval,
}

impl Phase {
    /// Training drops the trailing partial batch; evaluation keeps it so no
    /// sample is left out of the metric.
    pub fn default_drop_last(self) -> bool {
        matches!(self, Phase::Train)
    }
}

/// Deserializable loader settings.
///
/// ```rust
/// use fleet_rs::data::{LoaderConfig, Phase};
///
/// let cfg = LoaderConfig::new(16).phase(Phase::Eval);
/// assert!(!cfg.effective_drop_last());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub batch_size: usize,
    #[serde(default)]
    pub phase: Phase,
    /// Overrides the phase default when set.
    #[serde(default)]
    pub drop_last: Option<bool>,
}

impl LoaderConfig {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            phase: Phase::Train,
            drop_last: None,
        }
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = Some(drop_last);
        self
    }

    pub fn effective_drop_last(&self) -> bool {
        self.drop_last.unwrap_or(self.phase.default_drop_last())
    }

    pub fn validate(&self) -> Result<()> {
        check_batch_size(self.batch_size)
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(FleetError::InvalidBatchSize(batch_size));
    }
    Ok(())
}

/// Number of batches produced from `samples` items.
///
/// A `batch_size` of zero yields zero batches. Loaders never get here with
/// one: their constructors reject it with [`FleetError::InvalidBatchSize`].
pub fn num_batches(samples: usize, batch_size: usize, drop_last: bool) -> usize {
    if batch_size == 0 {
        return 0;
    }
    if drop_last {
        samples / batch_size
    } else {
        samples.div_ceil(batch_size)
    }
}

/// Data loader.
///
/// Combines a dataset and a sampler, and provides an iterable over the given dataset.
///
/// # Type Parameters
///
/// * `D`: The dataset type.
/// * `T`: The item type returned by the dataset.
/// * `C`: The collator type (defaults to `DefaultCollate`).
pub struct DataLoader<D, T, C = DefaultCollate>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    batch_size: usize,
    sampler: Box<dyn Sampler>,
    drop_last: bool,
    _marker: std::marker::PhantomData<(T, C)>,
}

impl<D, T> DataLoader<D, T, DefaultCollate>
where
    D: Dataset<T> + 'static,
{
    /// Creates a new DataLoader with default collation.
    ///
    /// Fails if `batch_size` is zero.
    pub fn new(dataset: D, batch_size: usize) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            dataset: Arc::new(dataset),
            batch_size,
            sampler: Box::new(SequentialSampler),
            drop_last: false,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<D, T, C> DataLoader<D, T, C>
where
    D: Dataset<T> + 'static,
    C: Collate<T>,
{
    /// Switches to a different collator.
    pub fn collate_with<C2: Collate<T>>(self) -> DataLoader<D, T, C2> {
        DataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            sampler: self.sampler,
            drop_last: self.drop_last,
            _marker: std::marker::PhantomData,
        }
    }

    /// Sets the sampler to use.
    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Sets whether to shuffle the data (uses `RandomSampler`).
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        if shuffle {
            self.sampler = Box::new(RandomSampler);
        } else {
            self.sampler = Box::new(SequentialSampler);
        }
        self
    }

    /// Sets whether to drop the last incomplete batch.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Applies the phase default for `drop_last`.
    pub fn phase(self, phase: Phase) -> Self {
        self.drop_last(phase.default_drop_last())
    }

    /// Forwards the epoch to the sampler.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.sampler.set_epoch(epoch);
    }

    /// Number of batches one pass will produce.
    pub fn len(&self) -> usize {
        let samples = self.sampler.num_samples(self.dataset.len());
        num_batches(samples, self.batch_size, self.drop_last)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the dataset.
    pub fn iter(&self) -> DataLoaderIter<D, T, C> {
        let indices = self.sampler.sample(self.dataset.len());
        DataLoaderIter {
            dataset: self.dataset.clone(),
            indices,
            batch_size: self.batch_size,
            current_idx: 0,
            drop_last: self.drop_last,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<D, T, C> IntoIterator for DataLoader<D, T, C>
where
    D: Dataset<T> + 'static,
    C: Collate<T>,
{
    type Item = C::Output;
    type IntoIter = DataLoaderIter<D, T, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator for DataLoader.
pub struct DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    indices: Vec<usize>,
    batch_size: usize,
    current_idx: usize,
    drop_last: bool,
    _marker: std::marker::PhantomData<(T, C)>,
}

impl<D, T, C> Iterator for DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    type Item = C::Output;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.indices.len() {
            return None;
        }

        let remaining = self.indices.len() - self.current_idx;
        if self.drop_last && remaining < self.batch_size {
            return None;
        }

        let take = remaining.min(self.batch_size);
        let batch_indices = &self.indices[self.current_idx..self.current_idx + take];
        self.current_idx += take;

        let batch: Vec<T> = batch_indices
            .iter()
            .map(|&idx| self.dataset.get(idx))
            .collect();

        Some(C::collate(batch))
    }
}

/// Batches the samples of a restartable generator.
///
/// Every call to [`iter`](GeneratorLoader::iter) starts a new pass by
/// re-invoking the generator.
pub struct GeneratorLoader<G, C = DefaultCollate>
where
    G: SampleGenerator,
    C: Collate<G::Sample>,
{
    generator: G,
    batch_size: usize,
    drop_last: bool,
    _marker: std::marker::PhantomData<C>,
}

impl<G> GeneratorLoader<G, DefaultCollate>
where
    G: SampleGenerator,
{
    /// Creates a training loader (`drop_last = true`).
    pub fn new(generator: G, batch_size: usize) -> Result<Self> {
        Self::from_config(generator, LoaderConfig::new(batch_size))
    }

    pub fn from_config(generator: G, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        let drop_last = config.effective_drop_last();
        debug!(
            batch_size = config.batch_size,
            phase = ?config.phase,
            drop_last,
            "creating generator loader"
        );
        Ok(Self {
            generator,
            batch_size: config.batch_size,
            drop_last,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<G, C> GeneratorLoader<G, C>
where
    G: SampleGenerator,
    C: Collate<G::Sample>,
{
    /// Switches to a different collator.
    pub fn collate_with<C2: Collate<G::Sample>>(self) -> GeneratorLoader<G, C2> {
        GeneratorLoader {
            generator: self.generator,
            batch_size: self.batch_size,
            drop_last: self.drop_last,
            _marker: std::marker::PhantomData,
        }
    }

    /// Applies the phase default for `drop_last`.
    pub fn phase(self, phase: Phase) -> Self {
        self.drop_last(phase.default_drop_last())
    }

    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn drops_last(&self) -> bool {
        self.drop_last
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Starts a new pass.
    pub fn iter(&self) -> BatchIter<G::Iter, C> {
        BatchIter {
            inner: self.generator.generate(),
            batch_size: self.batch_size,
            drop_last: self.drop_last,
            done: false,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Iterator over the batches of one pass of a [`GeneratorLoader`].
pub struct BatchIter<I, C> {
    inner: I,
    batch_size: usize,
    drop_last: bool,
    done: bool,
    _marker: std::marker::PhantomData<C>,
}

impl<I, C> Iterator for BatchIter<I, C>
where
    I: Iterator,
    C: Collate<I::Item>,
{
    type Item = C::Output;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.inner.next() {
                Some(sample) => batch.push(sample),
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() || (self.drop_last && batch.len() < self.batch_size) {
            return None;
        }
        Some(C::collate(batch))
    }
}
