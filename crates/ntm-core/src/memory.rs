//! Memory parameters and the per-run memory bank.
//!
//! `Memory` holds the `(slots, slot_width)` initial value. Every run tiles it
//! into a fresh `MemoryBank` of shape `(batch, slots, slot_width)` that the
//! engine owns exclusively. A write step is two pure transforms: erase
//! allocates a new buffer from the old one, add consumes that buffer.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::constants::DEFAULT_MEMORY_INIT;
use crate::error::{NtmError, Result};
use crate::params::{Param, ParamTags};

#[derive(Clone, Debug)]
pub struct Memory {
    memory_init: Array2<f64>,
    learn_init: bool,
}

impl Memory {
    /// Wrap an explicit initial value. Both axes must be non-empty.
    pub fn new(memory_init: Array2<f64>, learn_init: bool) -> Result<Self> {
        let (slots, width) = memory_init.dim();
        if slots == 0 || width == 0 {
            return Err(NtmError::Configuration(format!(
                "memory must have at least one slot of non-zero width, got ({slots}, {width})"
            )));
        }
        Ok(Self {
            memory_init,
            learn_init,
        })
    }

    /// Memory filled with `value`.
    pub fn constant(slots: usize, slot_width: usize, value: f64) -> Result<Self> {
        Self::new(Array2::from_elem((slots, slot_width), value), false)
    }

    /// Memory filled with the default small constant.
    pub fn with_shape(slots: usize, slot_width: usize) -> Result<Self> {
        Self::constant(slots, slot_width, DEFAULT_MEMORY_INIT)
    }

    /// `(slots, slot_width)`
    pub fn shape(&self) -> (usize, usize) {
        self.memory_init.dim()
    }

    pub fn memory_init(&self) -> ArrayView2<'_, f64> {
        self.memory_init.view()
    }

    /// Fresh bank with `memory_init` repeated for every batch row.
    pub fn tile(&self, batch: usize) -> MemoryBank {
        let (slots, width) = self.shape();
        let init = &self.memory_init;
        MemoryBank(Array3::from_shape_fn((batch, slots, width), |(_, i, j)| {
            init[[i, j]]
        }))
    }

    pub fn params(&self) -> Vec<Param<'_>> {
        vec![Param::new(
            "memory_init",
            self.memory_init.view().into_dyn(),
            ParamTags::init(self.learn_init),
        )]
    }
}

/// `(batch, slots, slot_width)` memory state for one sequence pass.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryBank(Array3<f64>);

impl MemoryBank {
    pub fn from_array(data: Array3<f64>) -> Self {
        Self(data)
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.0.dim()
    }

    pub fn batch_size(&self) -> usize {
        self.0.len_of(Axis(0))
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array3<f64> {
        self.0
    }

    /// Multiply every cell by `1 - w[i] * e[j]` for each `(w, e)` pair in
    /// order. Erasures compound when several heads address the same slot.
    ///
    /// `weightings[k]` is `(batch, slots)`, `erases[k]` is `(batch, slot_width)`.
    pub fn apply_erase(&self, weightings: &[Array2<f64>], erases: &[Array2<f64>]) -> MemoryBank {
        debug_assert_eq!(weightings.len(), erases.len());
        let mut next = self.0.clone();
        for (w, e) in weightings.iter().zip(erases) {
            for ((mut bank, w_row), e_row) in next
                .outer_iter_mut()
                .zip(w.outer_iter())
                .zip(e.outer_iter())
            {
                for (mut slot, &wi) in bank.outer_iter_mut().zip(w_row.iter()) {
                    slot.zip_mut_with(&e_row, |m, &ej| *m *= 1.0 - wi * ej);
                }
            }
        }
        MemoryBank(next)
    }

    /// Add `w[i] * a[j]` for each `(w, a)` pair. `adds` are already
    /// sign-gated.
    pub fn apply_add(mut self, weightings: &[Array2<f64>], adds: &[Array2<f64>]) -> MemoryBank {
        debug_assert_eq!(weightings.len(), adds.len());
        for (w, a) in weightings.iter().zip(adds) {
            for ((mut bank, w_row), a_row) in self
                .0
                .outer_iter_mut()
                .zip(w.outer_iter())
                .zip(a.outer_iter())
            {
                for (mut slot, &wi) in bank.outer_iter_mut().zip(w_row.iter()) {
                    slot.scaled_add(wi, &a_row);
                }
            }
        }
        self
    }

    /// Batched `w · M`: `(batch, slots)` in, `(batch, slot_width)` out.
    pub fn read(&self, weighting: ArrayView2<f64>) -> Array2<f64> {
        let (batch, _, width) = self.dim();
        let mut out = Array2::zeros((batch, width));
        for ((mut r, w_row), bank) in out
            .outer_iter_mut()
            .zip(weighting.outer_iter())
            .zip(self.0.outer_iter())
        {
            r.assign(&w_row.dot(&bank));
        }
        out
    }

    /// True if no cell is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}
