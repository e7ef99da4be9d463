use crate::element::Element;
use crate::error::Result;

/// Abstraction for a distributed communication backend.
///
/// This trait allows swapping between different communication implementations,
/// e.g. the in-process [`CpuBackend`](super::CpuBackend) in tests and a
/// network transport in production.
///
/// # Blocking
///
/// Every collective blocks the calling thread until all `world_size()` ranks
/// have made the matching call. A rank that never calls leaves its peers
/// blocked indefinitely; implementations do not time out.
pub trait CollectiveBackend: Send + Sync {
    /// Returns the rank of the current process/thread.
    fn rank(&self) -> usize;

    /// Returns the total number of processes/threads.
    fn world_size(&self) -> usize;

    /// Element-wise sum of `data` across all ranks.
    ///
    /// Every rank must pass a buffer of the same length; every rank receives
    /// the same summed buffer.
    fn all_reduce_sum<T: Element>(&self, data: &[T]) -> Result<Vec<T>>;

    /// Element-wise mean of `data` across all ranks.
    fn all_reduce_mean<T: Element>(&self, data: &[T]) -> Result<Vec<T>> {
        let world_size = T::from_usize(self.world_size()).ok_or_else(|| {
            crate::FleetError::Conversion(format!(
                "world size {} does not fit the element type",
                self.world_size()
            ))
        })?;
        let mut summed = self.all_reduce_sum(data)?;
        for value in &mut summed {
            *value /= world_size;
        }
        Ok(summed)
    }
}
