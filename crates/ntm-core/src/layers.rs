//! Dense projections used by the reference heads and controllers.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::params::{Param, ParamTags};

/// Element-wise (or row-wise, for softmax) nonlinearity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Tanh,
    Sigmoid,
    Softplus,
    Relu,
    /// Normalised across each row.
    Softmax,
}

impl Activation {
    pub fn apply(self, mut x: Array2<f64>) -> Array2<f64> {
        match self {
            Self::Identity => {}
            Self::Tanh => x.mapv_inplace(f64::tanh),
            Self::Sigmoid => x.mapv_inplace(sigmoid),
            Self::Softplus => x.mapv_inplace(softplus),
            Self::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Self::Softmax => softmax_rows_inplace(&mut x),
        }
        x
    }
}

pub fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// ln(1 + e^v), stable for large |v|.
pub fn softplus(v: f64) -> f64 {
    if v > 30.0 { v } else { v.exp().ln_1p() }
}

/// Row-wise softmax with max subtraction.
pub fn softmax_rows_inplace(x: &mut Array2<f64>) {
    for mut row in x.axis_iter_mut(Axis(0)) {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
}

/// Fully connected layer: `activation(x · W + b)`.
#[derive(Clone, Debug)]
pub struct Dense {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: Activation,
}

impl Dense {
    pub fn new(weights: Array2<f64>, bias: Array1<f64>, activation: Activation) -> Self {
        debug_assert_eq!(weights.ncols(), bias.len());
        Self {
            weights,
            bias,
            activation,
        }
    }

    /// Glorot-uniform weights, zero bias.
    pub fn glorot(
        inputs: usize,
        outputs: usize,
        activation: Activation,
        rng: &mut impl Rng,
    ) -> Self {
        let limit = (6.0 / (inputs + outputs).max(1) as f64).sqrt();
        let weights =
            Array2::from_shape_fn((inputs, outputs), |_| rng.random_range(-limit..=limit));
        Self::new(weights, Array1::zeros(outputs), activation)
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    /// `x` is `(batch, inputs)`; returns `(batch, outputs)`.
    pub fn forward(&self, x: ArrayView2<f64>) -> Array2<f64> {
        self.activation.apply(x.dot(&self.weights) + &self.bias)
    }

    pub fn params(&self) -> Vec<Param<'_>> {
        vec![
            Param::new("W", self.weights.view().into_dyn(), ParamTags::WEIGHT),
            Param::new("b", self.bias.view().into_dyn(), ParamTags::BIAS),
        ]
    }
}
