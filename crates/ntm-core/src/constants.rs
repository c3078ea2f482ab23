/// Numerical epsilon guarding norms and normalisers.
pub const EPSILON: f64 = 1e-6;

/// Allowed drift of a weighting's row sum away from 1.
pub const WEIGHTING_TOLERANCE: f64 = 1e-6;

/// Default constant filling a fresh memory bank.
pub const DEFAULT_MEMORY_INIT: f64 = 1e-6;

/// Default shift radius: offsets -1, 0, +1.
pub const DEFAULT_SHIFT_RADIUS: usize = 1;

/// Default memory geometry (slots x slot width).
pub const DEFAULT_SLOTS: usize = 128;
pub const DEFAULT_SLOT_WIDTH: usize = 20;

/// Default controller hidden width.
pub const DEFAULT_HIDDEN_WIDTH: usize = 100;
