//! Serializable construction parameters for engines over the reference
//! heads and controllers.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HIDDEN_WIDTH, DEFAULT_MEMORY_INIT, DEFAULT_SHIFT_RADIUS, DEFAULT_SLOT_WIDTH,
    DEFAULT_SLOTS,
};
use crate::controller::{DenseController, LstmController, ReferenceController};
use crate::engine::NtmEngine;
use crate::error::{NtmError, Result};
use crate::head::Head;
use crate::heads::{NtmHead, NtmWriteHead};
use crate::layers::Activation;
use crate::memory::Memory;

/// Which reference controller to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    #[default]
    Dense,
    Lstm,
}

/// Construction parameters for an engine over the reference heads and
/// controllers. Missing fields take their defaults when deserialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NtmConfig {
    pub input_width: usize,
    pub hidden_width: usize,
    pub controller: ControllerKind,
    /// Nonlinearity of the dense controller; the LSTM ignores it.
    pub controller_activation: Activation,
    pub slots: usize,
    pub slot_width: usize,
    pub write_heads: usize,
    pub read_heads: usize,
    pub shift_radius: usize,
    /// Give write heads a learned sign gate on their add vector.
    pub signed_add: bool,
    /// Constant filling the initial memory.
    pub memory_init: f64,
    pub learn_memory_init: bool,
    /// Stored on the engine, never applied.
    pub grad_clipping: Option<f64>,
}

impl Default for NtmConfig {
    fn default() -> Self {
        Self {
            input_width: 10,
            hidden_width: DEFAULT_HIDDEN_WIDTH,
            controller: ControllerKind::default(),
            controller_activation: Activation::Tanh,
            slots: DEFAULT_SLOTS,
            slot_width: DEFAULT_SLOT_WIDTH,
            write_heads: 1,
            read_heads: 1,
            shift_radius: DEFAULT_SHIFT_RADIUS,
            signed_add: false,
            memory_init: DEFAULT_MEMORY_INIT,
            learn_memory_init: false,
            grad_clipping: None,
        }
    }
}

impl NtmConfig {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.input_width == 0, "input_width must be positive"),
            (self.hidden_width == 0, "hidden_width must be positive"),
            (self.slots == 0, "slots must be positive"),
            (self.slot_width == 0, "slot_width must be positive"),
            (self.write_heads == 0, "at least one write head is required"),
            (self.read_heads == 0, "at least one read head is required"),
            (!self.memory_init.is_finite(), "memory_init must be finite"),
        ];
        if let Some((_, msg)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(NtmError::Configuration((*msg).to_string()));
        }
        Ok(())
    }

    /// Build an engine with freshly initialised reference heads and
    /// controller. Write heads are listed before read heads.
    pub fn build(&self, rng: &mut impl Rng) -> Result<NtmEngine<ReferenceController>> {
        self.validate()?;
        let read_width = self.read_heads * self.slot_width;
        let controller = match self.controller {
            ControllerKind::Dense => ReferenceController::Dense(DenseController::new(
                self.input_width,
                read_width,
                self.hidden_width,
                self.controller_activation,
                rng,
            )),
            ControllerKind::Lstm => ReferenceController::Lstm(LstmController::new(
                self.input_width,
                read_width,
                self.hidden_width,
                rng,
            )),
        };

        let mut heads = Vec::with_capacity(self.write_heads + self.read_heads);
        for _ in 0..self.write_heads {
            heads.push(Head::write(NtmWriteHead::new(
                self.hidden_width,
                self.slots,
                self.slot_width,
                self.shift_radius,
                self.signed_add,
                rng,
            )));
        }
        for _ in 0..self.read_heads {
            heads.push(Head::read(NtmHead::new(
                self.hidden_width,
                self.slots,
                self.slot_width,
                self.shift_radius,
                rng,
            )));
        }

        let memory = Memory::new(
            ndarray::Array2::from_elem((self.slots, self.slot_width), self.memory_init),
            self.learn_memory_init,
        )?;
        NtmEngine::new(memory, controller, heads, self.grad_clipping)
    }
}
