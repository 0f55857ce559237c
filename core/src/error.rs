use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Data shape mismatch: expected {expected} features, got {actual}")]
    DataShape { expected: usize, actual: usize },

    #[error("Non-finite feature value at row {row}, column {column}")]
    NonFiniteFeature { row: usize, column: usize },

    #[error("Degenerate input: {rows} rows, at least {minimum} required")]
    DegenerateInput { rows: usize, minimum: usize },

    #[error("Unknown category '{value}' for encoded column '{column}'")]
    UnknownCategory { column: &'static str, value: String },

    #[error("Model used before fit()")]
    NotFitted,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DetectError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }
}

pub type DetectResult<T> = Result<T, DetectError>;
