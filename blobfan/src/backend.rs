use async_trait::async_trait;

use crate::{AccessPolicy, BlobResult, ByteStream, ContainerHandle, ObjectEntry};

/// Container-scoped object storage primitives - implemented by every backend.
///
/// Objects are addressed by name inside a container. `put_object_stream`
/// replaces any existing object of the same name without checking for it.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create the container unless it already exists
    async fn create_container_if_absent(&self, name: &str) -> BlobResult<ContainerHandle>;

    /// Apply an anonymous access policy to the container
    async fn set_permissions(
        &self,
        container: &ContainerHandle,
        policy: AccessPolicy,
    ) -> BlobResult<()>;

    /// Every object in the container, flat, in backend listing order
    async fn list_objects(&self, container: &ContainerHandle) -> BlobResult<Vec<ObjectEntry>>;

    /// Open an object for reading; a missing object is `BlobError::NotFound`
    async fn get_object_stream(
        &self,
        container: &ContainerHandle,
        name: &str,
    ) -> BlobResult<ByteStream>;

    /// Write an object, overwriting any previous content
    async fn put_object_stream(
        &self,
        container: &ContainerHandle,
        name: &str,
        stream: ByteStream,
    ) -> BlobResult<()>;

    /// Prefix that turns an object name into its absolute address
    fn base_address(&self, container: &ContainerHandle) -> String;
}
