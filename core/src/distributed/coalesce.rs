//! Gradient coalescing.
//!
//! Reducing a model's gradients one tensor at a time pays the latency of a
//! collective per parameter. Coalescing lays all gradients out back to back in
//! one [`FusedBuffer`], so a single all-reduce covers them, and hands out
//! per-name views into that buffer for the optimizer to read.
//!
//! Each original gradient `g` is known inside the fused buffer as
//! `output_g`; [`FusedBuffer::renames`] lists that mapping for whoever has to
//! rewire references to the old names.
//!
//! ```rust
//! use fleet_rs::distributed::CoalesceBuilder;
//!
//! let mut builder = CoalesceBuilder::<f32>::new();
//! builder.add("fc.w@GRAD", &[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
//! builder.add_zeroed("fc.b@GRAD", &[2]).unwrap();
//! let fused = builder.build();
//!
//! assert_eq!(fused.len(), 6);
//! assert_eq!(fused.get("fc.b@GRAD").unwrap(), &[0.0, 0.0]);
//! assert_eq!(fused.fused_name("fc.w@GRAD"), Some("output_fc.w@GRAD"));
//! ```

use super::backend::CollectiveBackend;
use crate::element::Element;
use crate::error::{FleetError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Prefix of the name a gradient takes once it lives in a fused buffer.
pub const FUSED_PREFIX: &str = "output_";

/// Where one tensor lives inside a [`FusedBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedSlot {
    pub name: String,
    pub fused_name: String,
    pub offset: usize,
    pub shape: Vec<usize>,
}

impl FusedSlot {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// Collects tensors for a [`FusedBuffer`].
#[derive(Debug, Clone)]
pub struct CoalesceBuilder<T: Element> {
    alignment: usize,
    data: Vec<T>,
    slots: Vec<FusedSlot>,
    index: HashMap<String, usize>,
}

impl<T: Element> Default for CoalesceBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> CoalesceBuilder<T> {
    pub fn new() -> Self {
        Self {
            alignment: 1,
            data: Vec::new(),
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Starts every slot at a multiple of `alignment` elements. The gaps are
    /// zero-filled. Applies to slots added after this call; `0` is treated as `1`.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment.max(1);
        self
    }

    /// Reserves a zero-initialised slot without copying any data.
    pub fn add_zeroed(&mut self, name: &str, shape: &[usize]) -> Result<&mut Self> {
        let len: usize = shape.iter().product();
        self.push_slot(name, shape)?;
        self.data.resize(self.data.len() + len, T::zero());
        Ok(self)
    }

    /// Copies `values` into a new slot. `values.len()` must match `shape`.
    pub fn add(&mut self, name: &str, shape: &[usize], values: &[T]) -> Result<&mut Self> {
        let len: usize = shape.iter().product();
        if values.len() != len {
            return Err(FleetError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![values.len()],
            });
        }
        self.push_slot(name, shape)?;
        self.data.extend_from_slice(values);
        Ok(self)
    }

    fn push_slot(&mut self, name: &str, shape: &[usize]) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(FleetError::DuplicateName(name.to_string()));
        }
        let offset = self.data.len().next_multiple_of(self.alignment);
        self.data.resize(offset, T::zero());

        self.index.insert(name.to_string(), self.slots.len());
        self.slots.push(FusedSlot {
            name: name.to_string(),
            fused_name: format!("{FUSED_PREFIX}{name}"),
            offset,
            shape: shape.to_vec(),
        });
        Ok(())
    }

    pub fn build(self) -> FusedBuffer<T> {
        debug!(
            tensors = self.slots.len(),
            elements = self.data.len(),
            alignment = self.alignment,
            "coalesced tensors"
        );
        FusedBuffer {
            data: self.data,
            slots: self.slots,
            index: self.index,
        }
    }
}

/// Several tensors stored back to back in one allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedBuffer<T: Element> {
    data: Vec<T>,
    slots: Vec<FusedSlot>,
    index: HashMap<String, usize>,
}

impl<T: Element> FusedBuffer<T> {
    /// Total number of elements, padding included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Slots in insertion order.
    pub fn slots(&self) -> &[FusedSlot] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&FusedSlot> {
        self.index.get(name).map(|&i| &self.slots[i])
    }

    pub fn get(&self, name: &str) -> Option<&[T]> {
        let range = self.slot(name)?.range();
        Some(&self.data[range])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut [T]> {
        let range = self.slot(name)?.range();
        Some(&mut self.data[range])
    }

    /// Overwrites the slot `name` with `values`.
    pub fn write(&mut self, name: &str, values: &[T]) -> Result<()> {
        let slot = self
            .slot(name)
            .ok_or_else(|| FleetError::UnknownName(name.to_string()))?;
        if slot.len() != values.len() {
            return Err(FleetError::ShapeMismatch {
                expected: slot.shape.clone(),
                got: vec![values.len()],
            });
        }
        let range = slot.range();
        self.data[range].copy_from_slice(values);
        Ok(())
    }

    pub fn fused_name(&self, name: &str) -> Option<&str> {
        self.slot(name).map(|s| s.fused_name.as_str())
    }

    /// `(original name, fused name)` for every slot, in insertion order.
    pub fn renames(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slots
            .iter()
            .map(|s| (s.name.as_str(), s.fused_name.as_str()))
    }

    /// Copies every slot out as `(name, shape, values)`.
    pub fn split(&self) -> Vec<(String, Vec<usize>, Vec<T>)> {
        self.slots
            .iter()
            .map(|s| (s.name.clone(), s.shape.clone(), self.data[s.range()].to_vec()))
            .collect()
    }

    /// Sums the whole buffer across ranks with one collective.
    ///
    /// Every rank must hold a buffer with the same layout. Blocks until all
    /// ranks have called it.
    pub fn all_reduce_sum<B: CollectiveBackend>(&mut self, backend: &B) -> Result<()> {
        self.data = backend.all_reduce_sum(&self.data)?;
        Ok(())
    }

    /// Averages the whole buffer across ranks with one collective.
    pub fn all_reduce_mean<B: CollectiveBackend>(&mut self, backend: &B) -> Result<()> {
        self.data = backend.all_reduce_mean(&self.data)?;
        Ok(())
    }
}
