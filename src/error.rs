use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse Error (line {line}): {message}")]
    Parse { line: usize, message: String },

    #[error("Instance Error: {0}")]
    Instance(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Allocation Error: {0}")]
    Allocation(String),

    #[error("Solver Error: {0}")]
    Solver(String),
}

impl CalError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        CalError::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type CalResult<T> = Result<T, CalError>;
