//! Error taxonomy for the generation pipeline.
//!
//! Every stage reports the most specific kind it can detect; no stage
//! recovers from another stage's invalid input.

use thiserror::Error;

/// Result type for the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("malformed equation `{equation}`: {message}")]
    MalformedEquation { equation: String, message: String },

    #[error("index imbalance in `{equation}`: {message}")]
    IndexImbalance { equation: String, message: String },

    #[error("cyclic substitution among definitions: {}", .cycle.join(" -> "))]
    CyclicSubstitution { cycle: Vec<String> },

    #[error("unresolved symbols after {iterations} inlining passes: {}", .symbols.join(", "))]
    UnresolvedSymbol {
        symbols: Vec<String>,
        iterations: usize,
    },

    #[error("no central difference table for order {order} (supported: {supported:?})")]
    UnsupportedOrder { order: usize, supported: Vec<usize> },

    #[error("no Runge-Kutta table with {stages} stages (supported: {supported:?})")]
    UnsupportedStageCount {
        stages: usize,
        supported: Vec<usize>,
    },

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("backend `{program}` failed with {}: {stderr}", status_text(.status))]
    BackendGenerationFailure {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

impl Error {
    pub fn malformed(equation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedEquation {
            equation: equation.into(),
            message: message.into(),
        }
    }

    pub fn imbalance(equation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::IndexImbalance {
            equation: equation.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}
