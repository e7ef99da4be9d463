use super::backend::CollectiveBackend;
use crate::element::Element;
use crate::error::{FleetError, Result};
use crate::worker::WorkerInfo;
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::any::Any;
use tracing::{debug, trace};

/// One message on a ring link. Buffers travel as `Vec<T>` of the caller's
/// element type, so sums are exact for every [`Element`].
type Packet = Box<dyn Any + Send>;

/// A CPU-based collective backend connecting threads in a ring.
///
/// Implements the **Ring All-Reduce** algorithm using `crossbeam` channels.
/// This simulates the data movement that happens on GPUs via NCCL: every rank
/// only ever talks to its left and right neighbour, and each element crosses
/// `2 * (world_size - 1)` links regardless of the group size.
///
/// Every rank of a collective must pass a buffer of the same element type.
pub struct CpuBackend {
    worker: WorkerInfo,
    left_rx: Receiver<Packet>, // Receive from rank - 1
    right_tx: Sender<Packet>,  // Send to rank + 1
}

impl CpuBackend {
    pub fn new(worker: WorkerInfo, left_rx: Receiver<Packet>, right_tx: Sender<Packet>) -> Self {
        Self {
            worker,
            left_rx,
            right_tx,
        }
    }

    /// Builds the backends of a complete ring `0 -> 1 -> ... -> N-1 -> 0`,
    /// indexed by rank. Move each one onto its own thread.
    pub fn ring(world_size: usize) -> Result<Vec<CpuBackend>> {
        let workers = WorkerInfo::group(world_size)?;

        // Channel i carries messages from rank i to rank i + 1.
        let (txs, rxs): (Vec<_>, Vec<_>) = (0..world_size).map(|_| unbounded()).unzip();

        Ok(workers
            .into_iter()
            .map(|worker| {
                let rank = worker.rank();
                let left = (rank + world_size - 1) % world_size;
                CpuBackend::new(worker, rxs[left].clone(), txs[rank].clone())
            })
            .collect())
    }

    pub fn worker(&self) -> WorkerInfo {
        self.worker
    }

    fn exchange<M: Send + 'static>(&self, send: M) -> Result<M> {
        self.right_tx.send(Box::new(send)).map_err(|_| {
            FleetError::Communication(format!("{}: right neighbour disconnected", self.worker))
        })?;
        let packet = self.left_rx.recv().map_err(|_| {
            FleetError::Communication(format!("{}: left neighbour disconnected", self.worker))
        })?;
        packet.downcast::<M>().map(|m| *m).map_err(|_| {
            FleetError::Communication(format!(
                "{}: left neighbour sent a different element type",
                self.worker
            ))
        })
    }

    /// Passes every rank's buffer length once around the ring.
    ///
    /// Each rank ends up having seen all lengths, so on a mismatch every rank
    /// fails together and the ring stays in step for the next collective.
    fn agree_on_len(&self, len: usize) -> Result<()> {
        let mut carry = len;
        let mut mismatch = None;
        for _ in 1..self.worker.world_size() {
            carry = self.exchange(carry)?;
            if carry != len && mismatch.is_none() {
                mismatch = Some(carry);
            }
        }
        match mismatch {
            Some(other) => Err(FleetError::ShapeMismatch {
                expected: vec![len],
                got: vec![other],
            }),
            None => Ok(()),
        }
    }
}

impl CollectiveBackend for CpuBackend {
    fn rank(&self) -> usize {
        self.worker.rank()
    }

    fn world_size(&self) -> usize {
        self.worker.world_size()
    }

    fn all_reduce_sum<T: Element>(&self, data: &[T]) -> Result<Vec<T>> {
        let world_size = self.worker.world_size();
        let rank = self.worker.rank() as isize;
        let total_elements = data.len();

        self.agree_on_len(total_elements)?;

        let mut buf = data.to_vec();
        let chunk_size = total_elements.div_ceil(world_size);

        debug!(rank, world_size, total_elements, "ring all-reduce");

        let chunk = |idx: isize| -> usize { idx.rem_euclid(world_size as isize) as usize };
        let bounds = |chunk_idx: usize| -> (usize, usize) {
            let start = (chunk_idx * chunk_size).min(total_elements);
            (start, (start + chunk_size).min(total_elements))
        };

        // --- Phase 1: Scatter-Reduce ---
        // In step s, rank r sends chunk (r - s) and accumulates chunk (r - s - 1).
        // Afterwards rank r holds the complete sum of chunk (r + 1).
        for step in 0..world_size as isize - 1 {
            let (start, end) = bounds(chunk(rank - step));
            let recv: Vec<T> = self.exchange(buf[start..end].to_vec())?;

            let (recv_start, recv_end) = bounds(chunk(rank - step - 1));
            for (dst, val) in buf[recv_start..recv_end].iter_mut().zip(recv) {
                *dst += val;
            }
            trace!(rank, step, "scatter-reduce step done");
        }

        // --- Phase 2: All-Gather ---
        // Circulate the completed chunks so every rank ends up with all of them.
        for step in 0..world_size as isize - 1 {
            let (start, end) = bounds(chunk(rank - step + 1));
            let recv: Vec<T> = self.exchange(buf[start..end].to_vec())?;

            let (recv_start, recv_end) = bounds(chunk(rank - step));
            buf[recv_start..recv_end].copy_from_slice(&recv);
            trace!(rank, step, "all-gather step done");
        }

        Ok(buf)
    }
}
