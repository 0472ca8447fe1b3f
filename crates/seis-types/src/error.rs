use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeisError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Sequencing error: {0}")]
    Sequencing(String),

    #[error("Solver diverged at iteration {iteration}: {message}")]
    SolverDiverged { iteration: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SeisResult<T> = Result<T, SeisError>;
