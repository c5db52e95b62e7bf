//! Error types for projection, neighbor index and metric operations

use thiserror::Error;

/// Result type for lmds operations
pub type Result<T> = std::result::Result<T, LmdsError>;

/// Coarse classification of an [`LmdsError`].
///
/// None of these are retried automatically. `ExternalProcess` failures can be
/// retried by the caller by rebuilding the computed index from scratch, and
/// `Numerical` failures are recoverable by choosing fewer output dimensions or
/// more landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown heuristic, metric or model name, or a count the data cannot satisfy
    Configuration,
    /// Operation invoked out of the required sequence
    State,
    /// Not enough positive eigenvalues for the requested output dimension
    Numerical,
    /// The bulk neighbor computation exited nonzero or crashed
    ExternalProcess,
    /// Corrupt or mismatched binary data or dataset shape
    DataFormat,
    /// Shared memory, file mapping or filesystem failure
    Resource,
}

/// Errors that can occur during lmds operations
#[derive(Debug, Error)]
pub enum LmdsError {
    /// Landmark heuristic name not recognized
    #[error("unknown landmark heuristic '{0}', expected one of: balanced, random, first")]
    InvalidHeuristic(String),

    /// Distance metric name or store code not recognized
    #[error("unknown distance metric '{0}', expected one of: euclidean, cosine")]
    UnknownDistanceMetric(String),

    /// Inverse-DR algorithm or serialized model kind not recognized
    #[error("unsupported model kind '{0}'")]
    UnsupportedModelKind(String),

    /// Landmark count of zero
    #[error("invalid landmark count {0}, need at least one landmark")]
    InvalidLandmarkCount(usize),

    /// Neighborhood size outside the range the metrics are defined for
    #[error("invalid neighborhood size k={k} for {points} points")]
    InvalidNeighborCount { k: usize, points: usize },

    /// More landmarks requested than the dataset holds
    #[error("requested {requested} landmarks but dataset only has {available} points")]
    InsufficientData { requested: usize, available: usize },

    /// Landmarks must be selected first
    #[error("landmarks not selected")]
    NotSelected,

    /// Landmarks must be reduced first
    #[error("landmarks not reduced")]
    NotReduced,

    /// All points must be positioned first
    #[error("points not calculated")]
    NotExtended,

    /// Too few positive eigenvalues of the double-centered matrix
    #[error("only {positive} positive eigenvalues, need {required} for the requested dimension")]
    InsufficientRank { positive: usize, required: usize },

    /// The external neighbor computation exited nonzero
    #[error("neighbor computation failed ({status}):\n{stderr}")]
    ComputationFailed { status: String, stderr: String },

    /// Binary neighbor store is malformed or truncated
    #[error("corrupt neighbor store: {0}")]
    CorruptNeighborStore(String),

    /// Dimensionality not supported by the binary neighbor store, or mismatched
    #[error("unsupported dimensionality {found}, expected {expected}")]
    UnsupportedDimensionality { found: usize, expected: String },

    /// Dataset or position list does not have the expected shape
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// Point index outside the index's range
    #[error("index {index} out of range (0, {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Serialized predictor or its parameter file is missing or malformed
    #[error("failed to load model: {0}")]
    ModelLoadError(String),

    /// Shared memory segment could not be created, attached or released
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    /// IO error (file operations, mapping, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LmdsError {
    /// Classify the error into the coarse failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LmdsError::InvalidHeuristic(_)
            | LmdsError::UnknownDistanceMetric(_)
            | LmdsError::UnsupportedModelKind(_)
            | LmdsError::InvalidLandmarkCount(_)
            | LmdsError::InvalidNeighborCount { .. }
            | LmdsError::InsufficientData { .. } => ErrorKind::Configuration,
            LmdsError::NotSelected | LmdsError::NotReduced | LmdsError::NotExtended => {
                ErrorKind::State
            }
            LmdsError::InsufficientRank { .. } => ErrorKind::Numerical,
            LmdsError::ComputationFailed { .. } => ErrorKind::ExternalProcess,
            LmdsError::CorruptNeighborStore(_)
            | LmdsError::UnsupportedDimensionality { .. }
            | LmdsError::InvalidDataset(_)
            | LmdsError::IndexOutOfRange { .. }
            | LmdsError::ModelLoadError(_)
            | LmdsError::Json(_) => ErrorKind::DataFormat,
            LmdsError::SharedMemory(_) | LmdsError::Io(_) => ErrorKind::Resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_are_classified() {
        assert_eq!(LmdsError::NotReduced.kind(), ErrorKind::State);
        assert_eq!(LmdsError::NotSelected.kind(), ErrorKind::State);
        assert_eq!(LmdsError::NotExtended.kind(), ErrorKind::State);
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert_eq!(
            LmdsError::InvalidHeuristic("nearest".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            LmdsError::UnsupportedModelKind("nn_unknown".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn computation_failure_message_carries_stderr() {
        let err = LmdsError::ComputationFailed {
            status: "exit status: 1".into(),
            stderr: "Failed to attach shared memory".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ExternalProcess);
        assert!(err.to_string().contains("Failed to attach shared memory"));
    }

    #[test]
    fn io_errors_convert() {
        let err: LmdsError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }
}
