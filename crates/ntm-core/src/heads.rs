//! Reference NTM heads built from dense projections of the controller's
//! hidden state.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3};
use rand::Rng;

use crate::addressing::{circular_shift, content_weighting, cosine_similarity, interpolate, sharpen};
use crate::error::BoxError;
use crate::head::{Addressing, WriteContent, one_hot_init};
use crate::layers::{Activation, Dense};
use crate::params::{Param, ParamTags};

/// Read head: key, key strength, gate, shift and sharpening projections.
#[derive(Clone, Debug)]
pub struct NtmHead {
    slots: usize,
    slot_width: usize,
    key: Dense,
    beta: Dense,
    gate: Dense,
    shift: Dense,
    gamma: Dense,
    weights_init: Array1<f64>,
    learn_init: bool,
}

impl NtmHead {
    pub fn new(
        hidden_width: usize,
        slots: usize,
        slot_width: usize,
        shift_radius: usize,
        rng: &mut impl Rng,
    ) -> Self {
        Self {
            slots,
            slot_width,
            key: Dense::glorot(hidden_width, slot_width, Activation::Tanh, rng),
            beta: Dense::glorot(hidden_width, 1, Activation::Softplus, rng),
            gate: Dense::glorot(hidden_width, 1, Activation::Sigmoid, rng),
            shift: Dense::glorot(hidden_width, 2 * shift_radius + 1, Activation::Softmax, rng),
            gamma: Dense::glorot(hidden_width, 1, Activation::Softplus, rng),
            weights_init: one_hot_init(slots),
            learn_init: false,
        }
    }

    /// Replace the seeded weighting. Length must equal `slots`.
    pub fn with_weights_init(mut self, weights_init: Array1<f64>, learn_init: bool) -> Self {
        debug_assert_eq!(weights_init.len(), self.slots);
        self.weights_init = weights_init;
        self.learn_init = learn_init;
        self
    }

    pub fn hidden_width(&self) -> usize {
        self.key.inputs()
    }

    pub fn shift_radius(&self) -> usize {
        self.shift.outputs() / 2
    }
}

impl Addressing for NtmHead {
    fn slots(&self) -> usize {
        self.slots
    }

    fn slot_width(&self) -> usize {
        self.slot_width
    }

    fn weights_init(&self) -> ArrayView1<'_, f64> {
        self.weights_init.view()
    }

    fn next_weighting(
        &self,
        hidden: ArrayView2<f64>,
        previous: ArrayView2<f64>,
        memory: ArrayView3<f64>,
    ) -> Result<Array2<f64>, BoxError> {
        if hidden.ncols() != self.hidden_width() {
            return Err(format!(
                "head expects hidden width {}, got {}",
                self.hidden_width(),
                hidden.ncols()
            )
            .into());
        }
        let key = self.key.forward(hidden);
        let beta = self.beta.forward(hidden);
        let gate = self.gate.forward(hidden);
        let shift = self.shift.forward(hidden);
        let gamma = self.gamma.forward(hidden) + 1.0;

        let similarity = cosine_similarity(key.view(), memory);
        let content = content_weighting(similarity.view(), beta.view());
        let gated = interpolate(content.view(), previous, gate.view());
        let shifted = circular_shift(gated.view(), shift.view());
        Ok(sharpen(shifted.view(), gamma.view()))
    }

    fn params(&self) -> Vec<Param<'_>> {
        let mut params = Vec::new();
        for (prefix, layer) in [
            ("key", &self.key),
            ("beta", &self.beta),
            ("gate", &self.gate),
            ("shift", &self.shift),
            ("gamma", &self.gamma),
        ] {
            params.extend(layer.params().into_iter().map(|p| p.prefixed(prefix)));
        }
        params.push(Param::new(
            "weights_init",
            self.weights_init.view().into_dyn(),
            ParamTags::init(self.learn_init),
        ));
        params
    }
}

/// Write head: addressing plus erase, add and an optional sign gate.
#[derive(Clone, Debug)]
pub struct NtmWriteHead {
    head: NtmHead,
    erase: Dense,
    add: Dense,
    sign_add: Option<Dense>,
}

impl NtmWriteHead {
    pub fn new(
        hidden_width: usize,
        slots: usize,
        slot_width: usize,
        shift_radius: usize,
        signed_add: bool,
        rng: &mut impl Rng,
    ) -> Self {
        let head = NtmHead::new(hidden_width, slots, slot_width, shift_radius, rng);
        let erase = Dense::glorot(hidden_width, slot_width, Activation::Sigmoid, rng);
        let add = Dense::glorot(hidden_width, slot_width, Activation::Tanh, rng);
        let sign_add = signed_add.then(|| Dense::glorot(hidden_width, 1, Activation::Tanh, rng));
        Self {
            head,
            erase,
            add,
            sign_add,
        }
    }

    pub fn with_weights_init(mut self, weights_init: Array1<f64>, learn_init: bool) -> Self {
        self.head = self.head.with_weights_init(weights_init, learn_init);
        self
    }
}

impl Addressing for NtmWriteHead {
    fn slots(&self) -> usize {
        self.head.slots()
    }

    fn slot_width(&self) -> usize {
        self.head.slot_width()
    }

    fn weights_init(&self) -> ArrayView1<'_, f64> {
        self.head.weights_init()
    }

    fn next_weighting(
        &self,
        hidden: ArrayView2<f64>,
        previous: ArrayView2<f64>,
        memory: ArrayView3<f64>,
    ) -> Result<Array2<f64>, BoxError> {
        self.head.next_weighting(hidden, previous, memory)
    }

    fn params(&self) -> Vec<Param<'_>> {
        let mut params = self.head.params();
        params.extend(self.erase.params().into_iter().map(|p| p.prefixed("erase")));
        params.extend(self.add.params().into_iter().map(|p| p.prefixed("add")));
        if let Some(sign) = &self.sign_add {
            params.extend(sign.params().into_iter().map(|p| p.prefixed("sign_add")));
        }
        params
    }
}

impl WriteContent for NtmWriteHead {
    fn erase(&self, hidden: ArrayView2<f64>) -> Result<Array2<f64>, BoxError> {
        Ok(self.erase.forward(hidden))
    }

    fn add(&self, hidden: ArrayView2<f64>) -> Result<Array2<f64>, BoxError> {
        Ok(self.add.forward(hidden))
    }

    fn sign_add(&self, hidden: ArrayView2<f64>) -> Result<Option<Array2<f64>>, BoxError> {
        Ok(self.sign_add.as_ref().map(|sign| sign.forward(hidden)))
    }
}
