//! Memory-augmented recurrence engine (Neural Turing Machine forward pass).
//!
//! A controller reads from and writes to an external memory bank through
//! attention heads. Per time step, write heads erase then add, read heads
//! read the written memory, the controller advances, and every head
//! recomputes its weighting.
//!
//! Zero I/O. Heads and controllers are consumed through the `Addressing`,
//! `WriteContent` and `Controller` traits; reference implementations are
//! included.

pub mod addressing;
pub mod config;
pub mod constants;
pub mod controller;
pub mod engine;
pub mod error;
pub mod head;
pub mod heads;
pub mod layers;
pub mod memory;
pub mod params;

pub use config::{ControllerKind, NtmConfig};
pub use constants::{EPSILON, WEIGHTING_TOLERANCE};
pub use controller::{Controller, DenseController, LstmController, ReferenceController};
pub use engine::{FullTrace, NtmEngine, NtmOutput, RecurrentState};
pub use error::{BoxError, NtmError, Result};
pub use head::{Addressing, Head, WriteContent};
pub use heads::{NtmHead, NtmWriteHead};
pub use layers::{Activation, Dense};
pub use memory::{Memory, MemoryBank};
pub use params::{Param, ParamFilter, ParamTags};
