//! Controller contract and the two reference controllers.
//!
//! A controller advances a `(batch, state_width)` state from the raw input
//! and the concatenated read vectors. The engine never looks inside the
//! state; it only tiles the initial value and threads it from step to step.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate, s};
use rand::Rng;

use crate::error::BoxError;
use crate::layers::{Activation, Dense, sigmoid};
use crate::params::{Param, ParamTags};

pub trait Controller {
    /// Width of one raw input row.
    fn input_width(&self) -> usize;

    /// Width of the concatenated read vectors.
    fn read_width(&self) -> usize;

    fn hidden_width(&self) -> usize;

    fn state_width(&self) -> usize;

    /// Hidden state before the first step, length `hidden_width`.
    fn initial_hidden(&self) -> ArrayView1<'_, f64>;

    /// Controller state before the first step, length `state_width`.
    fn initial_state(&self) -> ArrayView1<'_, f64>;

    /// `input` is `(batch, input_width)`, `reads` is `(batch, read_width)`,
    /// `previous_state` is `(batch, state_width)`.
    /// Returns `(hidden, state)`.
    fn step(
        &self,
        input: ArrayView2<f64>,
        reads: ArrayView2<f64>,
        previous_state: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>), BoxError>;

    fn params(&self) -> Vec<Param<'_>> {
        Vec::new()
    }
}

fn check_width(what: &str, expected: usize, actual: ArrayView2<f64>) -> Result<(), BoxError> {
    if actual.ncols() != expected {
        return Err(format!(
            "controller expects {what} width {expected}, got {}",
            actual.ncols()
        )
        .into());
    }
    Ok(())
}

/// Feed-forward controller. The state is a copy of the hidden output.
#[derive(Clone, Debug)]
pub struct DenseController {
    input_width: usize,
    read_width: usize,
    dense: Dense,
    hid_init: Array1<f64>,
    learn_init: bool,
}

impl DenseController {
    pub fn new(
        input_width: usize,
        read_width: usize,
        hidden_width: usize,
        activation: Activation,
        rng: &mut impl Rng,
    ) -> Self {
        Self {
            input_width,
            read_width,
            dense: Dense::glorot(input_width + read_width, hidden_width, activation, rng),
            hid_init: Array1::zeros(hidden_width),
            learn_init: false,
        }
    }

    pub fn with_hid_init(mut self, hid_init: Array1<f64>, learn_init: bool) -> Self {
        debug_assert_eq!(hid_init.len(), self.dense.outputs());
        self.hid_init = hid_init;
        self.learn_init = learn_init;
        self
    }
}

impl Controller for DenseController {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn read_width(&self) -> usize {
        self.read_width
    }

    fn hidden_width(&self) -> usize {
        self.dense.outputs()
    }

    fn state_width(&self) -> usize {
        self.dense.outputs()
    }

    fn initial_hidden(&self) -> ArrayView1<'_, f64> {
        self.hid_init.view()
    }

    fn initial_state(&self) -> ArrayView1<'_, f64> {
        self.hid_init.view()
    }

    fn step(
        &self,
        input: ArrayView2<f64>,
        reads: ArrayView2<f64>,
        _previous_state: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>), BoxError> {
        check_width("input", self.input_width, input)?;
        check_width("read", self.read_width, reads)?;
        let x = concatenate(Axis(1), &[input.view(), reads.view()])?;
        let hidden = self.dense.forward(x.view());
        Ok((hidden.clone(), hidden))
    }

    fn params(&self) -> Vec<Param<'_>> {
        let mut params: Vec<Param<'_>> = self
            .dense
            .params()
            .into_iter()
            .map(|p| p.prefixed("dense"))
            .collect();
        params.push(Param::new(
            "hid_init",
            self.hid_init.view().into_dyn(),
            ParamTags::init(self.learn_init),
        ));
        params
    }
}

/// LSTM controller. The state is `[h, c]`, so `state_width = 2 * hidden_width`.
#[derive(Clone, Debug)]
pub struct LstmController {
    input_width: usize,
    read_width: usize,
    hidden_width: usize,
    /// `(input + read + hidden, 4 * hidden)`, gate order: input, forget, cell, output.
    gates: Dense,
    hid_init: Array1<f64>,
    state_init: Array1<f64>,
}

impl LstmController {
    pub fn new(
        input_width: usize,
        read_width: usize,
        hidden_width: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let mut gates = Dense::glorot(
            input_width + read_width + hidden_width,
            4 * hidden_width,
            Activation::Identity,
            rng,
        );
        // Forget gate starts open.
        gates
            .bias
            .slice_mut(s![hidden_width..2 * hidden_width])
            .fill(1.0);
        Self {
            input_width,
            read_width,
            hidden_width,
            gates,
            hid_init: Array1::zeros(hidden_width),
            state_init: Array1::zeros(2 * hidden_width),
        }
    }
}

impl Controller for LstmController {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn read_width(&self) -> usize {
        self.read_width
    }

    fn hidden_width(&self) -> usize {
        self.hidden_width
    }

    fn state_width(&self) -> usize {
        2 * self.hidden_width
    }

    fn initial_hidden(&self) -> ArrayView1<'_, f64> {
        self.hid_init.view()
    }

    fn initial_state(&self) -> ArrayView1<'_, f64> {
        self.state_init.view()
    }

    fn step(
        &self,
        input: ArrayView2<f64>,
        reads: ArrayView2<f64>,
        previous_state: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>), BoxError> {
        check_width("input", self.input_width, input)?;
        check_width("read", self.read_width, reads)?;
        check_width("state", self.state_width(), previous_state)?;
        let h = self.hidden_width;
        let h_prev = previous_state.slice(s![.., ..h]);
        let c_prev = previous_state.slice(s![.., h..]);

        let x = concatenate(Axis(1), &[input.view(), reads.view(), h_prev.view()])?;
        let z = self.gates.forward(x.view());
        let i = z.slice(s![.., ..h]).mapv(sigmoid);
        let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
        let g = z.slice(s![.., 2 * h..3 * h]).mapv(f64::tanh);
        let o = z.slice(s![.., 3 * h..]).mapv(sigmoid);

        let c = &f * &c_prev + &i * &g;
        let hidden = &o * &c.mapv(f64::tanh);
        let state = concatenate(Axis(1), &[hidden.view(), c.view()])?;
        Ok((hidden, state))
    }

    fn params(&self) -> Vec<Param<'_>> {
        let mut params: Vec<Param<'_>> = self
            .gates
            .params()
            .into_iter()
            .map(|p| p.prefixed("gates"))
            .collect();
        params.push(Param::new(
            "hid_init",
            self.hid_init.view().into_dyn(),
            ParamTags::FIXED,
        ));
        params.push(Param::new(
            "state_init",
            self.state_init.view().into_dyn(),
            ParamTags::FIXED,
        ));
        params
    }
}

/// The reference controllers behind one type, as built from `NtmConfig`.
#[derive(Clone, Debug)]
pub enum ReferenceController {
    Dense(DenseController),
    Lstm(LstmController),
}

impl Controller for ReferenceController {
    fn input_width(&self) -> usize {
        match self {
            Self::Dense(c) => c.input_width(),
            Self::Lstm(c) => c.input_width(),
        }
    }

    fn read_width(&self) -> usize {
        match self {
            Self::Dense(c) => c.read_width(),
            Self::Lstm(c) => c.read_width(),
        }
    }

    fn hidden_width(&self) -> usize {
        match self {
            Self::Dense(c) => c.hidden_width(),
            Self::Lstm(c) => c.hidden_width(),
        }
    }

    fn state_width(&self) -> usize {
        match self {
            Self::Dense(c) => c.state_width(),
            Self::Lstm(c) => c.state_width(),
        }
    }

    fn initial_hidden(&self) -> ArrayView1<'_, f64> {
        match self {
            Self::Dense(c) => c.initial_hidden(),
            Self::Lstm(c) => c.initial_hidden(),
        }
    }

    fn initial_state(&self) -> ArrayView1<'_, f64> {
        match self {
            Self::Dense(c) => c.initial_state(),
            Self::Lstm(c) => c.initial_state(),
        }
    }

    fn step(
        &self,
        input: ArrayView2<f64>,
        reads: ArrayView2<f64>,
        previous_state: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>), BoxError> {
        match self {
            Self::Dense(c) => c.step(input, reads, previous_state),
            Self::Lstm(c) => c.step(input, reads, previous_state),
        }
    }

    fn params(&self) -> Vec<Param<'_>> {
        match self {
            Self::Dense(c) => c.params(),
            Self::Lstm(c) => c.params(),
        }
    }
}
