use camcal_aruco::DictionaryError;
use camcal_charuco::CharucoBoardError;
use camcal_core::{ImageSize, TargetConfigError};
use camcal_solver::SolverError;

/// Fatal failures of a calibration run.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("not enough valid views: found {found}, need at least {required}")]
    InsufficientViews { found: usize, required: usize },
    #[error("no calibration target detected in any of the {attempted} images")]
    NoTargetDetected { attempted: usize },
    #[error("calibration failed to converge: {reason}")]
    SolverDivergence { reason: String },
    #[error("unsupported target type '{0}'")]
    UnsupportedTargetType(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<TargetConfigError> for CalibrationError {
    fn from(err: TargetConfigError) -> Self {
        match err {
            TargetConfigError::UnsupportedKind(kind) => Self::UnsupportedTargetType(kind),
            other => Self::InvalidConfiguration(other.to_string()),
        }
    }
}

impl From<DictionaryError> for CalibrationError {
    fn from(err: DictionaryError) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}

impl From<CharucoBoardError> for CalibrationError {
    fn from(err: CharucoBoardError) -> Self {
        match err {
            CharucoBoardError::Target(inner) => inner.into(),
            other => Self::InvalidConfiguration(other.to_string()),
        }
    }
}

impl From<SolverError> for CalibrationError {
    fn from(err: SolverError) -> Self {
        match err {
            SolverError::NotEnoughViews { found, required } => {
                Self::InsufficientViews { found, required }
            }
            SolverError::UnsupportedDistortion(_) => Self::InvalidConfiguration(err.to_string()),
            SolverError::Divergence(reason) => Self::SolverDivergence { reason },
            SolverError::Seed => Self::SolverDivergence {
                reason: "views are degenerate: closed-form intrinsics have no solution \
                         (all views nearly fronto-parallel or identical)"
                    .into(),
            },
            other => Self::SolverDivergence {
                reason: other.to_string(),
            },
        }
    }
}

/// Why one image contributed no view. Never fatal on its own.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("image could not be decoded: {0}")]
    ImageDecodeFailure(String),
    #[error("calibration target not found")]
    TargetNotFound,
    #[error("image is {actual}, session images are {expected}")]
    ImageSizeInconsistent {
        expected: ImageSize,
        actual: ImageSize,
    },
}
