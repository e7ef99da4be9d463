//! Worker identity.
//!
//! Every rank in a job is described by a [`WorkerInfo`]: its own zero-based
//! rank and the fixed world size. The value is passed explicitly to whatever
//! needs it (shard iterators, samplers, backends) instead of being looked up
//! from process-global state, which keeps each component testable on its own.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};

/// Environment variable holding the rank of the current process.
pub const RANK_ENV: &str = "FLEET_RANK";
/// Environment variable holding the number of ranks in the job.
pub const WORLD_SIZE_ENV: &str = "FLEET_WORLD_SIZE";

/// The `(rank, world_size)` pair of one worker.
///
/// Always valid: `world_size >= 1` and `rank < world_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWorkerInfo")]
pub struct WorkerInfo {
    rank: usize,
    world_size: usize,
}

#[derive(Deserialize)]
struct RawWorkerInfo {
    rank: usize,
    world_size: usize,
}

impl TryFrom<RawWorkerInfo> for WorkerInfo {
    type Error = FleetError;

    fn try_from(raw: RawWorkerInfo) -> Result<Self> {
        WorkerInfo::new(raw.rank, raw.world_size)
    }
}

impl WorkerInfo {
    /// Creates a worker identity, rejecting `world_size == 0` and
    /// `rank >= world_size`.
    pub fn new(rank: usize, world_size: usize) -> Result<Self> {
        if world_size == 0 {
            return Err(FleetError::InvalidWorldSize(world_size));
        }
        if rank >= world_size {
            return Err(FleetError::InvalidRank { rank, world_size });
        }
        Ok(Self { rank, world_size })
    }

    /// The identity of the only worker in a non-distributed run.
    pub const fn single() -> Self {
        Self {
            rank: 0,
            world_size: 1,
        }
    }

    /// Every worker of a group, in rank order.
    pub fn group(world_size: usize) -> Result<Vec<Self>> {
        if world_size == 0 {
            return Err(FleetError::InvalidWorldSize(world_size));
        }
        (0..world_size)
            .map(|rank| Self::new(rank, world_size))
            .collect()
    }

    /// Reads [`RANK_ENV`] and [`WORLD_SIZE_ENV`] from the process environment.
    ///
    /// See [`WorkerInfo::from_lookup`] for the rules.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the identity from a key/value lookup.
    ///
    /// If neither variable is present the run is treated as single-worker.
    /// If only one is present, or either fails to parse, this is a
    /// configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str, value: String| {
            value.trim().parse::<usize>().map_err(|e| {
                FleetError::Config(format!("{key}={value:?} is not a valid integer: {e}"))
            })
        };

        match (lookup(RANK_ENV), lookup(WORLD_SIZE_ENV)) {
            (None, None) => Ok(Self::single()),
            (Some(rank), Some(world_size)) => {
                let rank = parse(RANK_ENV, rank)?;
                let world_size = parse(WORLD_SIZE_ENV, world_size)?;
                Self::new(rank, world_size)
            }
            (Some(_), None) => Err(FleetError::Config(format!(
                "{RANK_ENV} is set but {WORLD_SIZE_ENV} is not"
            ))),
            (None, Some(_)) => Err(FleetError::Config(format!(
                "{WORLD_SIZE_ENV} is set but {RANK_ENV} is not"
            ))),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Returns `true` for rank 0.
    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }

    /// Whether the sample emitted at `index` belongs to this worker.
    pub fn owns(&self, index: usize) -> bool {
        index % self.world_size == self.rank
    }

    /// Number of indices in `[0, total)` owned by this worker.
    ///
    /// Shard lengths across a group differ by at most one.
    pub fn shard_len(&self, total: usize) -> usize {
        total / self.world_size + usize::from(self.rank < total % self.world_size)
    }
}

impl Default for WorkerInfo {
    fn default() -> Self {
        Self::single()
    }
}

impl std::fmt::Display for WorkerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rank {}/{}", self.rank, self.world_size)
    }
}
