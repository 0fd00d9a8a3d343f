use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Failed to decode multipart body: {message}")]
    Decode { message: String },

    #[error("Object not found: {name}")]
    NotFound { name: String },

    #[error("Storage backend error{}: {source}", object_suffix(.name))]
    Backend {
        name: Option<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

fn object_suffix(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" for '{}'", name),
        None => String::new(),
    }
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            name: None,
            source: Box::new(error),
        }
    }

    /// Create a backend error tied to a specific object
    pub fn backend_for<S, E>(name: S, error: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            name: Some(name.into()),
            source: Box::new(error),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Attach an object name to a backend error that does not carry one yet.
    pub fn with_object(self, object: &str) -> Self {
        match self {
            Self::Backend { name: None, source } => Self::Backend {
                name: Some(object.to_string()),
                source,
            },
            Self::Io { source } => Self::Backend {
                name: Some(object.to_string()),
                source: Box::new(source),
            },
            other => other,
        }
    }

    /// True for bad input (`Decode`)
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// True for construction-time failures
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// True for every failure that originated in the storage backend
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Backend { .. })
    }

    /// Name of the object involved in the failure, when known
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Self::NotFound { name } => Some(name),
            Self::Backend { name, .. } => name.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_report_the_object_name() {
        let err = BlobError::backend(std::io::Error::new(std::io::ErrorKind::Other, "quota"))
            .with_object("batch-0.png");

        assert!(err.is_backend());
        assert_eq!(err.object_name(), Some("batch-0.png"));
        assert_eq!(
            err.to_string(),
            "Storage backend error for 'batch-0.png': quota"
        );
    }

    #[test]
    fn not_found_counts_as_backend_failure() {
        let err = BlobError::not_found("missing.txt");
        assert!(err.is_backend());
        assert!(!err.is_decode());
        assert_eq!(err.object_name(), Some("missing.txt"));
    }

    #[test]
    fn with_object_keeps_existing_name() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "x");
        let err = BlobError::backend_for("a.txt", io).with_object("b.txt");
        assert_eq!(err.object_name(), Some("a.txt"));
    }
}
