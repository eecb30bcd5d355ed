use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing credentials: {variables}")]
    MissingCredentials { variables: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("API returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Invalid dataset reference '{value}': expected owner/dataset")]
    InvalidDatasetRef { value: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Io,
    Config,
    Data,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl HarvestError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::HttpError(_) | Self::RateLimited { .. } | Self::Timeout { .. } | Self::ApiError { .. } => {
                ErrorCategory::Network
            }
            Self::IoError(_) => ErrorCategory::Io,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingCredentials { .. } => ErrorCategory::Config,
            Self::ZipError(_)
            | Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::InvalidDatasetRef { .. }
            | Self::ProcessingError { .. } => ErrorCategory::Data,
            Self::CommandFailed { .. } => ErrorCategory::External,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } => ErrorSeverity::Medium,
            Self::InvalidDatasetRef { .. } => ErrorSeverity::Low,
            Self::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 只有限流與逾時值得重試
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::HttpError(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::MissingCredentials { .. } => {
                "Set KAGGLE_USERNAME/KAGGLE_KEY (or ~/.kaggle/kaggle.json) and METRON_USERNAME/METRON_PASSWORD"
            }
            Self::RateLimited { .. } => "Wait a few minutes and run again; progress is kept in the manifest",
            Self::Timeout { .. } | Self::HttpError(_) => "Check network connectivity and run again to resume",
            Self::ApiError { status, .. } if *status == 401 || *status == 403 => {
                "Check that the API credentials are valid"
            }
            Self::ApiError { .. } => "The remote API rejected the request; check the dataset reference",
            Self::CommandFailed { .. } => "Make sure the `kaggle` CLI is installed and on PATH",
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => "Fix the configuration file or command line flags",
            Self::IoError(_) => "Check file permissions and free disk space",
            Self::ZipError(_) => "The downloaded archive is corrupt; delete it and retry",
            _ => "Inspect the error log for details",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Network problem: {}", self),
            ErrorCategory::Io => format!("File system problem: {}", self),
            ErrorCategory::Config => format!("Configuration problem: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
            ErrorCategory::External => format!("External tool problem: {}", self),
        }
    }

    /// 任何錯誤都不會回傳 0
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low | ErrorSeverity::High => 1,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

/// 截斷錯誤訊息（以字元計）
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}
