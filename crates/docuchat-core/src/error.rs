use thiserror::Error;

/// Top-level error type shared by the docuchat crates.
///
/// Subsystem crates define their own error types for the conditions they
/// detect; this type covers configuration, I/O and serialization failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocuchatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for DocuchatError {
    fn from(err: toml::de::Error) -> Self {
        DocuchatError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DocuchatError {
    fn from(err: toml::ser::Error) -> Self {
        DocuchatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DocuchatError {
    fn from(err: serde_json::Error) -> Self {
        DocuchatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for docuchat operations.
pub type Result<T> = std::result::Result<T, DocuchatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DocuchatError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = DocuchatError::Serialization("invalid json".to_string());
        assert_eq!(err.to_string(), "Serialization error: invalid json");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DocuchatError = io_err.into();
        assert!(matches!(err, DocuchatError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: DocuchatError = toml_err.into();
        assert!(matches!(err, DocuchatError::Config(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err: DocuchatError = json_err.into();
        assert!(matches!(err, DocuchatError::Serialization(_)));
    }
}
