use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Parse error in module {module}: {message}")]
    Parse { module: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed snapshot: {0}")]
    MalformedInput(String),
}

impl AnalyseError {
    pub fn parse(module: impl Into<String>, message: impl Into<String>) -> Self {
        AnalyseError::Parse {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that only affect a single module.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AnalyseError::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, AnalyseError>;
