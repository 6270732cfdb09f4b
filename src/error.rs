//! Custom error types for scholarcv.
//!
//! All library functions return `Result<T, CvError>`. Validation and content
//! mismatches are not errors; they are recorded as exclusions by the validator.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scholarcv operations.
#[derive(Debug, Error)]
pub enum CvError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// Rate limited by external API after all retries
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Source parsing error (HTML, XML, BibTeX, CSV rows)
    #[error("Parse error: {0}")]
    Parse(String),

    /// An expected snapshot or input file is absent
    #[error("Missing input: {0}")]
    MissingInput(PathBuf),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Lattes XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// A single record could not be rendered
    #[error("Render error: {0}")]
    Render(String),

    /// Invalid operator input (e.g. a reclassification to an unsupported type)
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `CvError`
pub type Result<T> = std::result::Result<T, CvError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| CvError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u32> = None;
        let err = missing.ok_or_parse("no year").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: no year");
        assert_eq!(Some(3).ok_or_parse("x").ok(), Some(3));
    }

    #[test]
    fn test_missing_input_display() {
        let err = CvError::MissingInput(PathBuf::from("data/merged.json"));
        assert!(err.to_string().contains("data/merged.json"));
    }
}
