use std::fmt;

/// Error type returned by head and controller implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug)]
pub enum NtmError {
    /// Missing head variant, empty memory, or an invalid construction parameter.
    Configuration(String),
    /// Incompatible dimensions among input, memory, heads and controller.
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A head or controller method failed during step `step`.
    Collaborator {
        step: usize,
        component: String,
        source: BoxError,
    },
}

impl NtmError {
    pub(crate) fn shape(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        NtmError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn collaborator(
        step: usize,
        component: impl Into<String>,
        source: BoxError,
    ) -> Self {
        NtmError::Collaborator {
            step,
            component: component.into(),
            source,
        }
    }

    /// Time index of the failing step, for collaborator failures.
    pub fn step(&self) -> Option<usize> {
        match self {
            NtmError::Collaborator { step, .. } => Some(*step),
            _ => None,
        }
    }
}

impl fmt::Display for NtmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtmError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            NtmError::ShapeMismatch {
                context,
                expected,
                actual,
            } => write!(
                f,
                "shape mismatch in {context}: expected {expected:?}, got {actual:?}"
            ),
            NtmError::Collaborator {
                step,
                component,
                source,
            } => write!(f, "{component} failed at step {step}: {source}"),
        }
    }
}

impl std::error::Error for NtmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NtmError::Collaborator { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NtmError>;
