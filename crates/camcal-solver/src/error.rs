/// Failures of the calibration solver.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("image size is zero")]
    EmptyImage,
    #[error("need at least {required} usable views, found {found}")]
    NotEnoughViews { found: usize, required: usize },
    #[error("closed-form intrinsics estimate failed (views too similar or fronto-parallel)")]
    Seed,
    #[error("solver diverged: {0}")]
    Divergence(String),
    #[error("unsupported distortion model with {0} coefficients (use 4, 5 or 8)")]
    UnsupportedDistortion(usize),
}
