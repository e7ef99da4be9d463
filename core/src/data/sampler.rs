//! Strategies for sampling indices from a dataset.

use crate::worker::WorkerInfo;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// A trait for determining the order of data access.
pub trait Sampler: Send + Sync {
    /// Returns the indices to visit, in order.
    ///
    /// # Arguments
    ///
    /// * `len`: The length of the dataset.
    fn sample(&self, len: usize) -> Vec<usize>;

    /// How many indices [`sample`](Sampler::sample) returns for `len`.
    ///
    /// The default draws the indices and counts them; override it when the
    /// count is known without sampling.
    fn num_samples(&self, len: usize) -> usize {
        self.sample(len).len()
    }

    /// Informs the sampler that a new pass over the data is starting.
    ///
    /// Seeded samplers mix the epoch into their seed so every pass gets a
    /// different, but reproducible, order.
    fn set_epoch(&mut self, _epoch: u64) {}
}

/// Samples elements sequentially, always in the same order.
pub struct SequentialSampler;

impl Sampler for SequentialSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        (0..len).collect()
    }

    fn num_samples(&self, len: usize) -> usize {
        len
    }
}

/// Samples elements randomly (without replacement).
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = rand::rng();
        indices.shuffle(&mut rng);
        indices
    }

    fn num_samples(&self, len: usize) -> usize {
        len
    }
}

/// How a dataset is spread over the ranks of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStrategy {
    /// Each index is visited by exactly one rank per epoch (`i % N == rank`).
    #[default]
    WithoutReplacement,
    /// Every rank visits the whole dataset in its own shuffled order.
    ///
    /// One epoch then covers the data `N` times over; in exchange all ranks
    /// always see the same number of samples.
    WithReplacement,
}

/// Index sampler for one rank of a distributed job.
///
/// All ranks must be built with the same `seed`, `shuffle` and
/// `drop_uneven` settings: the partition is only disjoint when every rank
/// derives its indices from the same shared permutation.
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    worker: WorkerInfo,
    strategy: ShardStrategy,
    shuffle: bool,
    drop_uneven: bool,
    seed: u64,
    epoch: u64,
}

impl DistributedSampler {
    pub fn new(worker: WorkerInfo) -> Self {
        Self {
            worker,
            strategy: ShardStrategy::WithoutReplacement,
            shuffle: false,
            drop_uneven: false,
            seed: 0,
            epoch: 0,
        }
    }

    pub fn strategy(mut self, strategy: ShardStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Shuffle before partitioning. The permutation is shared by all ranks.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Truncate the index list to a multiple of the world size before
    /// partitioning, so every rank gets the same number of samples.
    pub fn drop_uneven(mut self, drop_uneven: bool) -> Self {
        self.drop_uneven = drop_uneven;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn worker(&self) -> WorkerInfo {
        self.worker
    }

    fn shared_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch))
    }

    fn rank_rng(&self) -> StdRng {
        let salt = (self.worker.rank() as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64((self.seed ^ salt).wrapping_add(self.epoch))
    }
}

impl Sampler for DistributedSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();

        match self.strategy {
            ShardStrategy::WithoutReplacement => {
                if self.shuffle {
                    indices.shuffle(&mut self.shared_rng());
                }
                if self.drop_uneven {
                    let world_size = self.worker.world_size();
                    indices.truncate(len - len % world_size);
                }
                indices
                    .into_iter()
                    .enumerate()
                    .filter(|(pos, _)| self.worker.owns(*pos))
                    .map(|(_, idx)| idx)
                    .collect()
            }
            ShardStrategy::WithReplacement => {
                indices.shuffle(&mut self.rank_rng());
                indices
            }
        }
    }

    fn num_samples(&self, len: usize) -> usize {
        match self.strategy {
            ShardStrategy::WithoutReplacement => {
                let kept = if self.drop_uneven {
                    len - len % self.worker.world_size()
                } else {
                    len
                };
                self.worker.shard_len(kept)
            }
            ShardStrategy::WithReplacement => len,
        }
    }

    fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }
}
