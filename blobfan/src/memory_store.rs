use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::types::{bytes_stream, collect_stream, object_address};
use crate::{
    AccessPolicy, BlobError, BlobResult, ByteStream, ContainerHandle, ObjectEntry, StorageBackend,
};

#[derive(Debug, Default)]
struct MemoryContainer {
    policy: AccessPolicy,
    objects: BTreeMap<String, Bytes>,
}

/// In-process storage backend.
///
/// Containers are kept per backend instance, objects are listed in
/// lexicographic order like S3 and Azure listings. Clones share the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    base_url: String,
    containers: Arc<RwLock<HashMap<String, MemoryContainer>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_base_url("memory://blobfan")
    }

    /// Use `base_url` as the account address objects are resolved against
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            containers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Names of the containers created so far
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Policy last applied to a container
    pub fn policy(&self, container: &str) -> Option<AccessPolicy> {
        self.containers.read().get(container).map(|c| c.policy)
    }

    /// Number of objects in a container
    pub fn object_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .get(container)
            .map_or(0, |c| c.objects.len())
    }

    fn with_container<F, R>(&self, container: &ContainerHandle, f: F) -> BlobResult<R>
    where
        F: FnOnce(&mut MemoryContainer) -> R,
    {
        let mut containers = self.containers.write();
        let entry = containers
            .get_mut(container.name())
            .ok_or_else(|| BlobError::not_found(container.name()))?;
        Ok(f(entry))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_container_if_absent(&self, name: &str) -> BlobResult<ContainerHandle> {
        self.containers
            .write()
            .entry(name.to_string())
            .or_default();
        Ok(ContainerHandle::new(name))
    }

    async fn set_permissions(
        &self,
        container: &ContainerHandle,
        policy: AccessPolicy,
    ) -> BlobResult<()> {
        self.with_container(container, |c| c.policy = policy)
    }

    async fn list_objects(&self, container: &ContainerHandle) -> BlobResult<Vec<ObjectEntry>> {
        let base = self.base_address(container);
        self.with_container(container, |c| {
            c.objects
                .keys()
                .map(|name| ObjectEntry {
                    name: name.clone(),
                    address: object_address(&base, name),
                })
                .collect()
        })
    }

    async fn get_object_stream(
        &self,
        container: &ContainerHandle,
        name: &str,
    ) -> BlobResult<ByteStream> {
        let data = self
            .with_container(container, |c| c.objects.get(name).cloned())?
            .ok_or_else(|| BlobError::not_found(name))?;
        Ok(bytes_stream(data))
    }

    async fn put_object_stream(
        &self,
        container: &ContainerHandle,
        name: &str,
        stream: ByteStream,
    ) -> BlobResult<()> {
        let data = collect_stream(stream).await?;
        self.with_container(container, |c| {
            c.objects.insert(name.to_string(), data);
        })
    }

    fn base_address(&self, container: &ContainerHandle) -> String {
        format!("{}/{}/", self.base_url, container.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_same_bytes() {
        let backend = MemoryBackend::new();
        let container = backend.create_container_if_absent("docs").await.unwrap();

        backend
            .put_object_stream(&container, "a.txt", bytes_stream(Bytes::from_static(b"alpha")))
            .await
            .unwrap();

        let stream = backend.get_object_stream(&container, "a.txt").await.unwrap();
        assert_eq!(collect_stream(stream).await.unwrap(), Bytes::from_static(b"alpha"));
    }

    #[tokio::test]
    async fn listing_is_lexicographic_with_addresses() {
        let backend = MemoryBackend::with_base_url("https://acct.example/");
        let container = backend.create_container_if_absent("docs").await.unwrap();
        for name in ["b.txt", "a.txt", "c.txt"] {
            backend
                .put_object_stream(&container, name, bytes_stream(Bytes::from_static(b"x")))
                .await
                .unwrap();
        }

        let entries = backend.list_objects(&container).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
        assert_eq!(entries[0].address, "https://acct.example/docs/a.txt");
    }

    #[tokio::test]
    async fn create_is_idempotent_and_keeps_objects() {
        let backend = MemoryBackend::new();
        let container = backend.create_container_if_absent("docs").await.unwrap();
        backend
            .put_object_stream(&container, "keep.bin", bytes_stream(Bytes::from_static(b"1")))
            .await
            .unwrap();

        backend.create_container_if_absent("docs").await.unwrap();
        assert_eq!(backend.object_count("docs"), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let backend = MemoryBackend::new();
        let container = backend.create_container_if_absent("docs").await.unwrap();

        let err = backend.get_object_stream(&container, "nope").await.err().unwrap();
        assert!(matches!(err, BlobError::NotFound { ref name } if name == "nope"));
    }

    #[tokio::test]
    async fn permissions_are_recorded() {
        let backend = MemoryBackend::new();
        let container = backend.create_container_if_absent("docs").await.unwrap();
        assert_eq!(backend.policy("docs"), Some(AccessPolicy::PublicBlob));

        backend
            .set_permissions(&container, AccessPolicy::Private)
            .await
            .unwrap();
        assert_eq!(backend.policy("docs"), Some(AccessPolicy::Private));
    }
}
