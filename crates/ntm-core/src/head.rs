//! Head contract consumed by the engine.
//!
//! All arrays are batched along axis 0. A head may fail by returning a
//! `BoxError`; the engine attaches the step index and passes it on.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3};

use crate::error::BoxError;
use crate::params::Param;

/// Produces a weighting over memory slots.
pub trait Addressing {
    fn slots(&self) -> usize;

    fn slot_width(&self) -> usize;

    /// Weighting seeded before the first step, length `slots`.
    fn weights_init(&self) -> ArrayView1<'_, f64>;

    /// `hidden` is `(batch, hidden_width)`, `previous` is `(batch, slots)`,
    /// `memory` is `(batch, slots, slot_width)`. Returns `(batch, slots)`.
    fn next_weighting(
        &self,
        hidden: ArrayView2<f64>,
        previous: ArrayView2<f64>,
        memory: ArrayView3<f64>,
    ) -> Result<Array2<f64>, BoxError>;

    fn params(&self) -> Vec<Param<'_>> {
        Vec::new()
    }
}

/// A head that also writes: erase and add vectors, both `(batch, slot_width)`.
pub trait WriteContent: Addressing {
    fn erase(&self, hidden: ArrayView2<f64>) -> Result<Array2<f64>, BoxError>;

    fn add(&self, hidden: ArrayView2<f64>) -> Result<Array2<f64>, BoxError>;

    /// Optional multiplier on the add vector, `(batch, 1)` or
    /// `(batch, slot_width)`. `None` means 1.
    fn sign_add(&self, _hidden: ArrayView2<f64>) -> Result<Option<Array2<f64>>, BoxError> {
        Ok(None)
    }
}

/// A head tagged with its kind.
pub enum Head {
    Read(Box<dyn Addressing>),
    Write(Box<dyn WriteContent>),
}

impl Head {
    pub fn read(head: impl Addressing + 'static) -> Self {
        Head::Read(Box::new(head))
    }

    pub fn write(head: impl WriteContent + 'static) -> Self {
        Head::Write(Box::new(head))
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Head::Write(_))
    }

    /// `(slots, slot_width)` the head addresses.
    pub fn dims(&self) -> (usize, usize) {
        match self {
            Head::Read(h) => (h.slots(), h.slot_width()),
            Head::Write(h) => (h.slots(), h.slot_width()),
        }
    }
}

impl std::fmt::Debug for Head {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (slots, slot_width) = self.dims();
        let kind = if self.is_write() { "Write" } else { "Read" };
        f.debug_struct(kind)
            .field("slots", &slots)
            .field("slot_width", &slot_width)
            .finish()
    }
}

/// One-hot weighting on slot 0.
pub fn one_hot_init(slots: usize) -> Array1<f64> {
    let mut w = Array1::zeros(slots);
    if slots > 0 {
        w[0] = 1.0;
    }
    w
}
