//! Parameter surface handed to an external optimizer.
//!
//! Every component lists its own arrays with a tag set. The engine only
//! aggregates and filters; nothing in the recurrence reads these views.

use ndarray::ArrayViewD;

/// Tags carried by a parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParamTags {
    pub trainable: bool,
    pub regularizable: bool,
}

impl ParamTags {
    /// Weight matrices: trainable and regularizable.
    pub const WEIGHT: Self = Self {
        trainable: true,
        regularizable: true,
    };
    /// Biases: trainable, not regularized.
    pub const BIAS: Self = Self {
        trainable: true,
        regularizable: false,
    };
    /// Initial values that are kept fixed.
    pub const FIXED: Self = Self {
        trainable: false,
        regularizable: false,
    };

    /// Initial values, trainable when `learn` is set.
    pub fn init(learn: bool) -> Self {
        Self {
            trainable: learn,
            regularizable: false,
        }
    }
}

/// A named, tagged view into one parameter array.
#[derive(Clone, Debug)]
pub struct Param<'a> {
    pub name: String,
    pub value: ArrayViewD<'a, f64>,
    pub tags: ParamTags,
}

impl<'a> Param<'a> {
    pub fn new(name: impl Into<String>, value: ArrayViewD<'a, f64>, tags: ParamTags) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
        }
    }

    /// Prepend `prefix.` to the name.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.name = format!("{prefix}.{}", self.name);
        self
    }
}

/// Tag filter. `Some(true)` keeps only tagged params, `Some(false)` only
/// untagged ones, `None` ignores the tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParamFilter {
    pub trainable: Option<bool>,
    pub regularizable: Option<bool>,
}

impl ParamFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn trainable() -> Self {
        Self {
            trainable: Some(true),
            regularizable: None,
        }
    }

    pub fn matches(&self, tags: ParamTags) -> bool {
        let trainable = self.trainable.is_none_or(|t| t == tags.trainable);
        let regularizable = self.regularizable.is_none_or(|r| r == tags.regularizable);
        trainable && regularizable
    }
}
