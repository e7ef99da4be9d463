//! Distributed metric reduction.
//!
//! A rank that evaluated its own shard knows a *partial* metric, e.g.
//! "17 correct out of 20". Averaging the per-rank ratios is wrong as soon as
//! shards differ in size, so ranks reduce the numerator and the denominator
//! separately and only then divide:
//!
//! ```text
//! rank 0: (2, 2)   -> 1.000
//! rank 1: (1, 8)   -> 0.125
//! mean of ratios   -> 0.5625   (wrong)
//! (2 + 1)/(2 + 8)  -> 0.3      (right)
//! ```

use super::backend::CollectiveBackend;
use crate::element::Element;
use crate::error::{FleetError, Result};
use rayon::prelude::*;
use tracing::debug;

/// A `(numerator, denominator)` partial aggregate.
///
/// Both sides have the same length; a scalar metric has length one.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPair<T: Element> {
    numerator: Vec<T>,
    denominator: Vec<T>,
}

impl<T: Element> MetricPair<T> {
    /// Fails with [`FleetError::ShapeMismatch`] if the lengths differ.
    pub fn new(numerator: Vec<T>, denominator: Vec<T>) -> Result<Self> {
        if numerator.len() != denominator.len() {
            return Err(FleetError::ShapeMismatch {
                expected: vec![numerator.len()],
                got: vec![denominator.len()],
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn scalar(numerator: T, denominator: T) -> Self {
        Self {
            numerator: vec![numerator],
            denominator: vec![denominator],
        }
    }

    /// A pair of `len` zeros, the identity for [`accumulate`](Self::accumulate).
    pub fn zeros(len: usize) -> Self {
        Self {
            numerator: vec![T::zero(); len],
            denominator: vec![T::zero(); len],
        }
    }

    pub fn numerator(&self) -> &[T] {
        &self.numerator
    }

    pub fn denominator(&self) -> &[T] {
        &self.denominator
    }

    pub fn len(&self) -> usize {
        self.numerator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numerator.is_empty()
    }

    /// Adds `other` element-wise, e.g. to fold the results of several batches.
    pub fn accumulate(&mut self, other: &MetricPair<T>) -> Result<()> {
        if self.len() != other.len() {
            return Err(FleetError::ShapeMismatch {
                expected: vec![self.len()],
                got: vec![other.len()],
            });
        }
        for (acc, v) in self.numerator.iter_mut().zip(&other.numerator) {
            *acc += *v;
        }
        for (acc, v) in self.denominator.iter_mut().zip(&other.denominator) {
            *acc += *v;
        }
        Ok(())
    }

    /// `numerator / denominator`, element-wise, in `f64`.
    ///
    /// A zero denominator gives `NaN` (0/0) or an infinity, never a panic.
    pub fn ratio(&self) -> Vec<f64> {
        self.numerator
            .iter()
            .zip(&self.denominator)
            .map(|(n, d)| {
                let n = n.to_f64().unwrap_or(f64::NAN);
                let d = d.to_f64().unwrap_or(f64::NAN);
                n / d
            })
            .collect()
    }

    /// The ratio of a length-one pair, `None` otherwise.
    pub fn scalar_ratio(&self) -> Option<f64> {
        match self.ratio().as_slice() {
            [r] => Some(*r),
            _ => None,
        }
    }

    /// Sums numerators and denominators across every rank of `backend`.
    ///
    /// Both sides are packed into one buffer, so this is a single collective.
    ///
    /// # Blocking
    ///
    /// Every rank of the group must call this with a pair of the same length.
    /// If any rank never makes the call (e.g. it failed earlier), all others
    /// block forever; there is no timeout.
    pub fn all_reduce<B: CollectiveBackend>(&self, backend: &B) -> Result<MetricPair<T>> {
        let len = self.len();
        let mut packed = Vec::with_capacity(2 * len);
        packed.extend_from_slice(&self.numerator);
        packed.extend_from_slice(&self.denominator);

        let mut summed = backend.all_reduce_sum(&packed)?;
        let denominator = summed.split_off(len);
        debug!(
            rank = backend.rank(),
            world_size = backend.world_size(),
            len,
            "reduced metric pair"
        );
        MetricPair::new(summed, denominator)
    }

    /// Reduces across ranks and divides: the globally weighted metric.
    pub fn global_ratio<B: CollectiveBackend>(&self, backend: &B) -> Result<Vec<f64>> {
        Ok(self.all_reduce(backend)?.ratio())
    }
}

/// `(correct, total)` for a batch of predictions.
pub fn accuracy<L>(predictions: &[L], labels: &[L]) -> Result<MetricPair<f64>>
where
    L: PartialEq + Sync,
{
    if predictions.len() != labels.len() {
        return Err(FleetError::ShapeMismatch {
            expected: vec![labels.len()],
            got: vec![predictions.len()],
        });
    }
    let correct = predictions
        .par_iter()
        .zip(labels.par_iter())
        .filter(|(p, l)| p == l)
        .count();
    Ok(MetricPair::scalar(correct as f64, labels.len() as f64))
}
