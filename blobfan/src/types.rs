use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{BlobError, BlobResult};

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(futures_util::stream::once(async move { Ok(data) }))
}

/// Drain a [`ByteStream`] into one contiguous buffer.
pub async fn collect_stream(mut stream: ByteStream) -> BlobResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Address of `name` under a container base address.
///
/// The name is percent-encoded as a single path segment, so `?`, `#`, `/`
/// and spaces stay part of the object name.
pub fn object_address(base_address: &str, name: &str) -> String {
    format!("{}{}", base_address, urlencoding::encode(name))
}

/// Per-call context: request correlation and cancellation
#[derive(Debug, Clone)]
pub struct BlobCtx {
    pub request_id: String,
    pub cancellation: CancellationToken,
}

impl BlobCtx {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_request_id<S: Into<String>>(mut self, request_id: S) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Fail with [`BlobError::Cancelled`] once the token has fired.
    pub fn ensure_active(&self) -> BlobResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(BlobError::Cancelled);
        }
        Ok(())
    }
}

impl Default for BlobCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// A provisioned container inside a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    name: String,
}

impl ContainerHandle {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Anonymous access level applied to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// No anonymous access
    Private,
    /// Objects are publicly readable, the container listing is not
    #[default]
    PublicBlob,
    /// Objects and the container listing are publicly readable
    PublicContainer,
}

impl std::str::FromStr for AccessPolicy {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" | "off" => Ok(Self::Private),
            "blob" | "public_blob" | "public-blob" => Ok(Self::PublicBlob),
            "container" | "public_container" | "public-container" => Ok(Self::PublicContainer),
            other => Err(BlobError::configuration(format!(
                "Unknown access policy '{}'",
                other
            ))),
        }
    }
}

/// One entry of a container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: String,
    pub address: String,
}

/// Content carried by a [`FileRecord`]
pub enum FileData {
    /// Whole object held in memory
    Buffered(Bytes),
    /// Object content still flowing from the backend
    Streamed(ByteStream),
}

impl FileData {
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    /// Buffered content, if already in memory
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Buffered(bytes) => Some(bytes),
            Self::Streamed(_) => None,
        }
    }

    pub async fn into_bytes(self) -> BlobResult<Bytes> {
        match self {
            Self::Buffered(bytes) => Ok(bytes),
            Self::Streamed(stream) => collect_stream(stream).await,
        }
    }

    pub fn into_stream(self) -> ByteStream {
        match self {
            Self::Buffered(bytes) => bytes_stream(bytes),
            Self::Streamed(stream) => stream,
        }
    }
}

impl std::fmt::Debug for FileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

/// A stored file: its absolute address plus its content.
///
/// The address is always the container base address followed by the
/// percent-encoded object name. Ownership of the content moves to whoever
/// consumes the record.
#[derive(Debug)]
pub struct FileRecord {
    address: String,
    name: String,
    data: FileData,
}

impl FileRecord {
    pub(crate) fn new(base_address: &str, name: &str, data: FileData) -> Self {
        Self {
            address: object_address(base_address, name),
            name: name.to_string(),
            data,
        }
    }

    /// Absolute, dereferenceable location of the object
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Object name inside the container
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &FileData {
        &self.data
    }

    pub fn into_data(self) -> FileData {
        self.data
    }

    pub async fn into_bytes(self) -> BlobResult<Bytes> {
        self.data.into_bytes().await
    }

    pub fn into_stream(self) -> ByteStream {
        self.data.into_stream()
    }

    pub fn into_parts(self) -> (String, FileData) {
        (self.address, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_record_address_is_fully_qualified() {
        let record = FileRecord::new(
            "https://store.example/photos/",
            "batch-0.png",
            FileData::Buffered(Bytes::from_static(b"png")),
        );

        assert_eq!(record.address(), "https://store.example/photos/batch-0.png");
        assert_eq!(record.name(), "batch-0.png");
        assert!(record.data().is_buffered());
    }

    #[test]
    fn file_record_address_escapes_the_name() {
        let record = FileRecord::new(
            "https://store.example/photos/",
            "my report #1.txt",
            FileData::Buffered(Bytes::new()),
        );

        assert_eq!(
            record.address(),
            "https://store.example/photos/my%20report%20%231.txt"
        );
        assert_eq!(record.name(), "my report #1.txt");
        assert_eq!(
            object_address("memory://blobfan/docs/", "q?x=1-0.txt"),
            "memory://blobfan/docs/q%3Fx%3D1-0.txt"
        );
    }

    #[tokio::test]
    async fn streamed_data_collects_all_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let data = FileData::Streamed(Box::pin(futures_util::stream::iter(chunks)));

        assert_eq!(data.into_bytes().await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn access_policy_parses_common_spellings() {
        assert_eq!("blob".parse::<AccessPolicy>().unwrap(), AccessPolicy::PublicBlob);
        assert_eq!("Private".parse::<AccessPolicy>().unwrap(), AccessPolicy::Private);
        assert_eq!(
            "public-container".parse::<AccessPolicy>().unwrap(),
            AccessPolicy::PublicContainer
        );
        assert!("world".parse::<AccessPolicy>().unwrap_err().is_configuration());
    }

    #[test]
    fn cancelled_ctx_is_rejected() {
        let token = CancellationToken::new();
        let ctx = BlobCtx::new().with_cancellation(token.clone());
        assert!(ctx.ensure_active().is_ok());

        token.cancel();
        assert!(matches!(ctx.ensure_active(), Err(BlobError::Cancelled)));
    }
}
