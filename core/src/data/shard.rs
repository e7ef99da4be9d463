//! Rank sharding of sample streams.
//!
//! A job with `N` workers splits one sequential stream of samples so that the
//! worker with rank `r` keeps exactly the samples whose zero-based emission
//! index `i` satisfies `i % N == r`. No coordination between ranks is needed:
//! each one runs the same source and the same filter and ends up with a
//! disjoint, order-preserving slice of the data.
//!
//! ```rust
//! use fleet_rs::data::ShardExt;
//! use fleet_rs::WorkerInfo;
//!
//! let worker = WorkerInfo::new(1, 3).unwrap();
//! let shard: Vec<u32> = (0..10).shard(worker).collect();
//! assert_eq!(shard, vec![1, 4, 7]);
//! ```

use crate::error::Result;
use crate::worker::WorkerInfo;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use tracing::debug;

/// What happens to the samples at the end of a stream whose length is not a
/// multiple of the world size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    /// Emit every owned sample. Shard sizes may differ by one.
    #[default]
    Keep,
    /// Consume the stream in groups of `world_size` and discard a trailing
    /// incomplete group, so every rank gets `floor(len / world_size)` samples.
    DropUneven,
}

/// A source of samples that can be replayed from the start.
///
/// Every call to [`generate`](SampleGenerator::generate) begins a fresh pass.
/// Closures returning an `IntoIterator` implement this trait, so
/// `|| (0..100)` or `|| dataset.iter().cloned()` can be used directly.
pub trait SampleGenerator {
    type Sample;
    type Iter: Iterator<Item = Self::Sample>;

    /// Starts a new pass over the samples.
    fn generate(&self) -> Self::Iter;
}

impl<F, S> SampleGenerator for F
where
    F: Fn() -> S,
    S: IntoIterator,
{
    type Sample = S::Item;
    type Iter = S::IntoIter;

    fn generate(&self) -> Self::Iter {
        self().into_iter()
    }
}

/// Emission counter shared by the plain and fallible iterators.
#[derive(Debug, Clone)]
struct ShardCursor<T> {
    worker: WorkerInfo,
    tail: TailPolicy,
    index: usize,
    pending: Option<T>,
}

impl<T> ShardCursor<T> {
    fn new(worker: WorkerInfo, tail: TailPolicy) -> Self {
        Self {
            worker,
            tail,
            index: 0,
            pending: None,
        }
    }

    /// Records the next emitted sample and returns what should be yielded now.
    fn advance(&mut self, item: T) -> Option<T> {
        let owned = self.worker.owns(self.index);
        self.index += 1;

        match self.tail {
            TailPolicy::Keep => owned.then_some(item),
            TailPolicy::DropUneven => {
                if owned {
                    self.pending = Some(item);
                }
                // Only release the owned sample once its group is complete.
                if self.index % self.worker.world_size() == 0 {
                    self.pending.take()
                } else {
                    None
                }
            }
        }
    }

    /// How many items will be yielded if the source emits `upcoming` more.
    fn yield_count(&self, upcoming: usize) -> usize {
        let end = self.index.saturating_add(upcoming);
        match self.tail {
            TailPolicy::Keep => self.worker.shard_len(end) - self.worker.shard_len(self.index),
            TailPolicy::DropUneven => {
                let world_size = self.worker.world_size();
                end / world_size - self.index / world_size
            }
        }
    }

    fn size_hint(&self, inner: (usize, Option<usize>)) -> (usize, Option<usize>) {
        let (lower, upper) = inner;
        (self.yield_count(lower), upper.map(|u| self.yield_count(u)))
    }
}

/// Lazy iterator over one rank's shard of a sample stream.
///
/// Finite iff the source is finite. Errors cannot occur after construction:
/// the worker identity is validated before the iterator exists.
pub struct ShardIter<I: Iterator> {
    inner: I,
    cursor: ShardCursor<I::Item>,
}

impl<I: Iterator> ShardIter<I> {
    pub fn new<S>(source: S, worker: WorkerInfo, tail: TailPolicy) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Self {
            inner: source.into_iter(),
            cursor: ShardCursor::new(worker, tail),
        }
    }

    /// Like [`ShardIter::new`], validating a raw rank and world size first.
    pub fn try_new<S>(source: S, rank: usize, world_size: usize) -> Result<Self>
    where
        S: IntoIterator<IntoIter = I>,
    {
        let worker = WorkerInfo::new(rank, world_size)?;
        Ok(Self::new(source, worker, TailPolicy::Keep))
    }

    pub fn worker(&self) -> WorkerInfo {
        self.cursor.worker
    }

    /// Number of samples pulled from the source so far.
    pub fn consumed(&self) -> usize {
        self.cursor.index
    }
}

impl<I: Iterator> Iterator for ShardIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.inner.next()?;
            if let Some(out) = self.cursor.advance(item) {
                return Some(out);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cursor.size_hint(self.inner.size_hint())
    }
}

impl<I: FusedIterator> FusedIterator for ShardIter<I> {}

/// Sharding for streams of `Result`s.
///
/// Every `Err` is forwarded to the caller as soon as it is produced, no matter
/// which rank the failing position would have belonged to, and it does not
/// consume an emission index.
pub struct TryShardIter<I, T> {
    inner: I,
    cursor: ShardCursor<T>,
}

impl<I, T, E> Iterator for TryShardIter<I, T>
where
    I: Iterator<Item = std::result::Result<T, E>>,
{
    type Item = std::result::Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(item) => {
                    if let Some(out) = self.cursor.advance(item) {
                        return Some(Ok(out));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Adds `.shard(worker)` to every iterator.
pub trait ShardExt: Iterator + Sized {
    /// Keeps the items whose index is owned by `worker`.
    fn shard(self, worker: WorkerInfo) -> ShardIter<Self> {
        ShardIter::new(self, worker, TailPolicy::Keep)
    }

    fn shard_with(self, worker: WorkerInfo, tail: TailPolicy) -> ShardIter<Self> {
        ShardIter::new(self, worker, tail)
    }

    /// Shards the `Ok` items and passes every `Err` straight through.
    fn try_shard<T, E>(self, worker: WorkerInfo) -> TryShardIter<Self, T>
    where
        Self: Iterator<Item = std::result::Result<T, E>>,
    {
        TryShardIter {
            inner: self,
            cursor: ShardCursor::new(worker, TailPolicy::Keep),
        }
    }
}

impl<I: Iterator> ShardExt for I {}

/// A restartable generator restricted to one rank's shard.
///
/// Each call to [`iter`](ShardedGenerator::iter) re-invokes the wrapped
/// generator and re-applies the same filter, so a deterministic source
/// replays the identical shard.
#[derive(Debug, Clone)]
pub struct ShardedGenerator<G> {
    source: G,
    worker: WorkerInfo,
    tail: TailPolicy,
}

impl<G: SampleGenerator> ShardedGenerator<G> {
    pub fn new(source: G, worker: WorkerInfo) -> Self {
        debug!(
            rank = worker.rank(),
            world_size = worker.world_size(),
            "sharding sample generator"
        );
        Self {
            source,
            worker,
            tail: TailPolicy::Keep,
        }
    }

    /// Fails with [`FleetError::InvalidRank`](crate::FleetError::InvalidRank)
    /// or [`FleetError::InvalidWorldSize`](crate::FleetError::InvalidWorldSize)
    /// before any sample is produced.
    pub fn try_new(source: G, rank: usize, world_size: usize) -> Result<Self> {
        Ok(Self::new(source, WorkerInfo::new(rank, world_size)?))
    }

    pub fn with_tail_policy(mut self, tail: TailPolicy) -> Self {
        self.tail = tail;
        self
    }

    pub fn worker(&self) -> WorkerInfo {
        self.worker
    }

    pub fn tail_policy(&self) -> TailPolicy {
        self.tail
    }

    /// Starts a new pass over this rank's shard.
    pub fn iter(&self) -> ShardIter<G::Iter> {
        ShardIter::new(self.source.generate(), self.worker, self.tail)
    }
}

impl<G: SampleGenerator> SampleGenerator for ShardedGenerator<G> {
    type Sample = G::Sample;
    type Iter = ShardIter<G::Iter>;

    fn generate(&self) -> Self::Iter {
        self.iter()
    }
}
