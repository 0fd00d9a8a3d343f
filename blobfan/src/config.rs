use serde::{Deserialize, Serialize};
use std::env;

use crate::{AccessPolicy, BlobError, BlobResult};

/// How downloaded content is handed to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Collect every object fully in memory before returning
    #[default]
    Buffered,
    /// Hand back the backend stream; the caller drains it
    Streamed,
}

impl std::str::FromStr for DownloadMode {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffered" => Ok(Self::Buffered),
            "streamed" | "stream" => Ok(Self::Streamed),
            other => Err(BlobError::configuration(format!(
                "Unknown download mode '{}'",
                other
            ))),
        }
    }
}

/// Configuration for a [`crate::BlobStore`].
///
/// Deserializes from any serde format; missing keys take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Container that holds every object of the store
    pub container: String,

    /// Anonymous access applied when the container is opened
    pub access_policy: AccessPolicy,

    /// Buffered or streamed downloads
    pub download_mode: DownloadMode,

    /// Limits for multipart decoding
    pub multipart: MultipartConfig,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            container: "files".to_string(),
            access_policy: AccessPolicy::default(),
            download_mode: DownloadMode::default(),
            multipart: MultipartConfig::default(),
        }
    }
}

/// Size limits for multipart/form-data bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
    /// Maximum size of a single file part in bytes (None = unlimited)
    pub max_file_bytes: Option<u64>,

    /// Maximum size of the whole body in bytes (None = unlimited)
    pub max_body_bytes: Option<u64>,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: Some(100 * 1024 * 1024), // 100MB
            max_body_bytes: Some(500 * 1024 * 1024), // 500MB
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = Some(bytes);
        self
    }

    pub fn max_body_bytes(mut self, bytes: u64) -> Self {
        self.max_body_bytes = Some(bytes);
        self
    }

    /// Remove both limits
    pub fn unlimited(mut self) -> Self {
        self.max_file_bytes = None;
        self.max_body_bytes = None;
        self
    }
}

impl BlobConfig {
    /// Create a config for the given container with defaults
    pub fn new<S: Into<String>>(container: S) -> Self {
        Self {
            container: container.into(),
            ..Self::default()
        }
    }

    /// Load from `BLOBFAN_*` environment variables.
    ///
    /// `BLOBFAN_CONTAINER` is required; `BLOBFAN_ACCESS_POLICY` and
    /// `BLOBFAN_DOWNLOAD_MODE` fall back to their defaults.
    pub fn from_env() -> BlobResult<Self> {
        let container = env::var("BLOBFAN_CONTAINER").map_err(|_| {
            BlobError::configuration("BLOBFAN_CONTAINER environment variable required")
        })?;

        let mut config = Self::new(container);
        if let Ok(policy) = env::var("BLOBFAN_ACCESS_POLICY") {
            config.access_policy = policy.parse()?;
        }
        if let Ok(mode) = env::var("BLOBFAN_DOWNLOAD_MODE") {
            config.download_mode = mode.parse()?;
        }
        Ok(config)
    }

    pub fn with_access_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = policy;
        self
    }

    pub fn with_download_mode(mut self, mode: DownloadMode) -> Self {
        self.download_mode = mode;
        self
    }

    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    /// Lower-cased container name, checked against the naming rules shared by
    /// Azure containers and S3 buckets.
    pub fn container_name(&self) -> BlobResult<String> {
        let name = self.container.trim().to_lowercase();

        if name.len() < 3 || name.len() > 63 {
            return Err(BlobError::configuration(format!(
                "Container name '{}' must be 3-63 characters long",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(BlobError::configuration(format!(
                "Container name '{}' may only contain letters, digits and '-'",
                name
            )));
        }
        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(BlobError::configuration(format!(
                "Container name '{}' must start and end with a letter or digit \
                 and not contain '--'",
                name
            )));
        }
        Ok(name)
    }

    pub(crate) fn validate(&self) -> BlobResult<String> {
        let name = self.container_name()?;
        if self.multipart.max_file_bytes == Some(0) || self.multipart.max_body_bytes == Some(0) {
            return Err(BlobError::configuration("Multipart limits must be greater than zero"));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_is_lower_cased() {
        let config = BlobConfig::new("Invoices-2024");
        assert_eq!(config.container_name().unwrap(), "invoices-2024");
    }

    #[test]
    fn invalid_container_names_are_rejected() {
        for bad in ["ab", "has space", "under_score", "-lead", "trail-", "dou--ble"] {
            let err = BlobConfig::new(bad).container_name().unwrap_err();
            assert!(err.is_configuration(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn zero_limits_fail_validation() {
        let config =
            BlobConfig::new("files").with_multipart(MultipartConfig::new().max_file_bytes(0));
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: BlobConfig = serde_json::from_str(
            r#"{
                "container": "uploads",
                "access_policy": "public_container",
                "multipart": { "max_file_bytes": 1024 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.container, "uploads");
        assert_eq!(config.access_policy, AccessPolicy::PublicContainer);
        assert_eq!(config.download_mode, DownloadMode::Buffered);
        assert_eq!(config.multipart.max_file_bytes, Some(1024));
        assert_eq!(config.multipart.max_body_bytes, Some(500 * 1024 * 1024));

        let round: BlobConfig =
            serde_json::from_value(serde_json::to_value(&config).unwrap()).unwrap();
        assert_eq!(round.download_mode, config.download_mode);
        assert_eq!(round.multipart.max_file_bytes, Some(1024));
    }

    #[test]
    fn defaults() {
        let config = BlobConfig::default();
        assert_eq!(config.access_policy, AccessPolicy::PublicBlob);
        assert_eq!(config.download_mode, DownloadMode::Buffered);
        assert_eq!(config.multipart.max_file_bytes, Some(100 * 1024 * 1024));
    }
}
