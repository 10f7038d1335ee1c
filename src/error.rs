use thiserror::Error;

/// Errors reported while building or running a generator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TdrError {
    #[error("distribution does not provide {0}")]
    MissingFunction(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The log-density violated concavity somewhere: tangent slopes in the
    /// wrong order, a squeeze steeper than a tangent, a squeeze area above the
    /// hat area or a density that is not unimodal.
    #[error("density is not log-concave: {0}")]
    NotLogConcave(String),

    #[error("log-density overflow at x = {x}: got {value}")]
    DataOverflow { x: f64, value: f64 },

    #[error("hat is unbounded and cannot be fixed with at most {max_intervals} intervals")]
    CapacityExceeded { max_intervals: usize },

    #[error("area below hat is zero or not finite")]
    DegenerateHat,

    #[error("generator disabled after a failed refinement")]
    GenerationDisabled,
}

pub type Result<T, E = TdrError> = std::result::Result<T, E>;
