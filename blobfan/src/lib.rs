//! # blobfan: multipart uploads fanned out into named blobs
//!
//! `blobfan` sits in front of a blob-storage service. It provisions one
//! container, lists it, and moves files in and out of it. Uploads arrive as
//! multipart/form-data bodies; every file part becomes its own object, named
//! from an optional batch id plus the file's position in the body.
//!
//! ## Quick Start
//!
//! ```rust
//! use blobfan::prelude::*;
//! use bytes::Bytes;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! // 1. Open a container (created on first use)
//! let store = BlobStore::open(MemoryBackend::new(), BlobConfig::new("photos")).await?;
//!
//! // 2. Upload a multipart body; files become "holiday-0.jpg", "holiday-1.jpg", ...
//! let body = "--b\r\n\
//! Content-Disposition: form-data; name=\"file\"; filename=\"beach.jpg\"\r\n\r\n\
//! JPEG\r\n\
//! --b--\r\n";
//! let stream = blobfan::bytes_stream(Bytes::from_static(body.as_bytes()));
//! let records = store.upload(BlobCtx::new(), stream, Some("holiday")).await?;
//! assert_eq!(records[0].name(), "holiday-0.jpg");
//!
//! // 3. Read it back by name or by address
//! let file = store.download(BlobCtx::new(), records[0].address()).await?;
//! assert_eq!(file.into_bytes().await?, Bytes::from_static(b"JPEG"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Your Service   │  ← HTTP / CLI layer
//! ├──────────────────┤
//! │    BlobStore     │  ← naming + orchestration
//! ├──────────────────┤
//! │ MultipartDecoder │  ← multipart/form-data → files
//! ├──────────────────┤
//! │  StorageBackend  │  ← container primitives (memory, S3)
//! └──────────────────┘
//! ```
//!
//! Names are deterministic and writes overwrite: uploading to a name that
//! already exists replaces the object (last write wins). Pass a distinct id
//! per batch, or plug in a [`NamingStrategy`], to keep uploads apart.

pub mod backend;
mod config;
mod error;
mod memory_store;
pub mod multipart;
pub mod naming;
mod s3_store;
mod store;
mod types;

pub use backend::StorageBackend;
pub use config::{BlobConfig, DownloadMode, MultipartConfig};
pub use error::{BlobError, BlobResult};
pub use memory_store::MemoryBackend;
pub use multipart::{DecodedForm, FilePart, MultipartDecoder};
pub use naming::{extension, DefaultNaming, NameRequest, NamingStrategy};
pub use s3_store::{S3Backend, S3Config};
pub use store::BlobStore;
pub use types::{
    bytes_stream, collect_stream, object_address, AccessPolicy, BlobCtx, ByteStream,
    ContainerHandle, FileData, FileRecord, ObjectEntry,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobConfig, BlobCtx, BlobError, BlobResult, BlobStore, ByteStream, FileRecord,
        MemoryBackend, StorageBackend,
    };
}
