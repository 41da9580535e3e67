use thiserror::Error;

#[derive(Error, Debug)]
pub enum TxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, TxError>;
