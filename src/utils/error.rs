use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Boundary dataset error: {message}")]
    GeometryError { message: String },

    #[error("Persistence error: {message}")]
    PersistenceError { message: String },

    #[error("Too many imports in progress (limit {capacity})")]
    TooManyImports { capacity: usize },

    #[error("File is too large to be processed ({size} bytes, limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Unsupported file format: {path}")]
    UnsupportedFileFormat { path: String },

    #[error("Order {id} not found")]
    OrderNotFound { id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::OrderNotFound { .. } => ErrorSeverity::Low,
            EtlError::TooManyImports { .. } => ErrorSeverity::Medium,
            EtlError::ValidationError { .. }
            | EtlError::FileTooLarge { .. }
            | EtlError::UnsupportedFileFormat { .. }
            | EtlError::CsvError(_) => ErrorSeverity::High,
            EtlError::PersistenceError { .. } | EtlError::IoError(_) => ErrorSeverity::High,
            EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::GeometryError { .. }
            | EtlError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::OrderNotFound { .. } => "List stored orders to find a valid id",
            EtlError::TooManyImports { .. } => "Wait for a running import to finish and retry",
            EtlError::FileTooLarge { .. } => "Split the file or raise import.max_file_size_bytes",
            EtlError::UnsupportedFileFormat { .. } => "Provide a .csv file",
            EtlError::ValidationError { .. } => "Check coordinates, subtotal and timestamp",
            EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => "Fix the configuration file and rerun",
            EtlError::GeometryError { .. } | EtlError::SerializationError(_) => {
                "Check the boundary and jurisdiction data files"
            }
            EtlError::PersistenceError { .. } => "Check the output location is writable",
            EtlError::CsvError(_) | EtlError::IoError(_) => "Check the input file is readable",
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

/// Why a CSV row was skipped. Counted by the import, never propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("invalid column count: expected at least {expected}, got {actual}")]
    ColumnCount { expected: usize, actual: usize },

    #[error("invalid {column}: '{value}'")]
    InvalidNumber { column: &'static str, value: String },

    #[error("invalid timestamp: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("unreadable row: {message}")]
    Malformed { message: String },
}
