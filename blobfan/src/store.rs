use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::multipart::{DecodedForm, FilePart};
use crate::types::{bytes_stream, collect_stream, object_address};
use crate::{
    BlobConfig, BlobCtx, BlobResult, ByteStream, ContainerHandle, DefaultNaming, DownloadMode,
    FileData, FileRecord, MultipartDecoder, NameRequest, NamingStrategy, StorageBackend,
};

/// Upload/download orchestration over one container of a storage backend.
///
/// Each store owns its container handle; two stores opened on different
/// containers never see each other's objects. The store keeps no state
/// between calls and can be shared freely across tasks.
pub struct BlobStore {
    backend: Arc<dyn StorageBackend>,
    container: ContainerHandle,
    base_address: String,
    naming: Arc<dyn NamingStrategy>,
    decoder: MultipartDecoder,
    config: BlobConfig,
}

impl BlobStore {
    /// Validate `config`, provision the container and apply its access policy
    pub async fn open<B>(backend: B, config: BlobConfig) -> BlobResult<Self>
    where
        B: StorageBackend + 'static,
    {
        Self::open_shared(Arc::new(backend), config).await
    }

    /// Same as [`BlobStore::open`] for a backend shared with other stores
    pub async fn open_shared(
        backend: Arc<dyn StorageBackend>,
        config: BlobConfig,
    ) -> BlobResult<Self> {
        let name = config.validate()?;
        let container = backend.create_container_if_absent(&name).await?;
        backend
            .set_permissions(&container, config.access_policy)
            .await?;
        let base_address = backend.base_address(&container);

        info!(
            container = %container,
            policy = ?config.access_policy,
            "Opened blob container at {}",
            base_address
        );

        Ok(Self {
            backend,
            container,
            base_address,
            naming: Arc::new(DefaultNaming),
            decoder: MultipartDecoder::new(config.multipart.clone()),
            config,
        })
    }

    /// Replace the naming policy used for uploads
    pub fn with_naming<N: NamingStrategy + 'static>(mut self, naming: N) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Absolute address of an object name in this container
    pub fn address_of(&self, name: &str) -> String {
        object_address(&self.base_address, name)
    }

    /// Object name for either a full address or a bare name.
    ///
    /// Addresses are percent-decoded after the base address is stripped;
    /// bare names are taken as they are.
    pub fn object_name<'a>(&self, address: &'a str) -> Cow<'a, str> {
        match address.strip_prefix(self.base_address.as_str()) {
            Some(encoded) => urlencoding::decode(encoded).unwrap_or(Cow::Borrowed(encoded)),
            None => Cow::Borrowed(address),
        }
    }

    /// Absolute address of every object in the container, in listing order
    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    pub async fn list_addresses(&self, ctx: BlobCtx) -> BlobResult<Vec<String>> {
        ctx.ensure_active()?;
        let entries = self.backend.list_objects(&self.container).await?;
        debug!("Listed {} objects", entries.len());
        Ok(entries.into_iter().map(|entry| entry.address).collect())
    }

    /// Decode a multipart/form-data body and store each of its files.
    ///
    /// The boundary is read from the body's first delimiter line. `id` takes
    /// precedence over an `id` form field. Existing objects with the same
    /// name are overwritten.
    #[instrument(skip_all, fields(request_id = %ctx.request_id, id = ?id))]
    pub async fn upload(
        &self,
        ctx: BlobCtx,
        body: ByteStream,
        id: Option<&str>,
    ) -> BlobResult<Vec<FileRecord>> {
        ctx.ensure_active()?;
        let form = self.decoder.decode(body).await?;
        self.store_form(&ctx, form, id).await
    }

    /// Like [`BlobStore::upload`], with the boundary taken from a
    /// `multipart/form-data; boundary=...` content type
    #[instrument(skip_all, fields(request_id = %ctx.request_id, id = ?id))]
    pub async fn upload_with_content_type(
        &self,
        ctx: BlobCtx,
        content_type: &str,
        body: ByteStream,
        id: Option<&str>,
    ) -> BlobResult<Vec<FileRecord>> {
        ctx.ensure_active()?;
        let form = self
            .decoder
            .decode_with_content_type(content_type, body)
            .await?;
        self.store_form(&ctx, form, id).await
    }

    /// Fetch one object by name or full address
    #[instrument(skip_all, fields(request_id = %ctx.request_id, address = %address))]
    pub async fn download(&self, ctx: BlobCtx, address: &str) -> BlobResult<FileRecord> {
        ctx.ensure_active()?;
        self.fetch(&self.object_name(address)).await
    }

    /// Fetch several objects in the given order; the first failure aborts
    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    pub async fn download_many<I, S>(
        &self,
        ctx: BlobCtx,
        addresses: I,
    ) -> BlobResult<Vec<FileRecord>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = addresses.into_iter();
        let mut records = Vec::with_capacity(addresses.size_hint().0);
        for address in addresses {
            ctx.ensure_active()?;
            records.push(self.fetch(&self.object_name(address.as_ref())).await?);
        }
        Ok(records)
    }

    /// Fetch every object of the container in listing order.
    ///
    /// Not a snapshot: objects written while this runs may or may not appear.
    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    pub async fn download_all(&self, ctx: BlobCtx) -> BlobResult<Vec<FileRecord>> {
        ctx.ensure_active()?;
        let entries = self.backend.list_objects(&self.container).await?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            ctx.ensure_active()?;
            records.push(self.fetch(&entry.name).await?);
        }
        info!("Downloaded {} objects", records.len());
        Ok(records)
    }

    async fn store_form(
        &self,
        ctx: &BlobCtx,
        form: DecodedForm,
        id: Option<&str>,
    ) -> BlobResult<Vec<FileRecord>> {
        let DecodedForm { fields, files } = form;
        let id = id.or_else(|| fields.get("id").map(String::as_str));

        let planned: Vec<(String, FilePart)> = files
            .into_iter()
            .enumerate()
            .map(|(sequence, part)| {
                let name = self.naming.object_name(&NameRequest {
                    id,
                    sequence,
                    field_name: &part.field_name,
                    file_name: &part.file_name,
                });
                (name, part)
            })
            .collect();
        warn_on_collisions(&planned);

        let mut records = Vec::with_capacity(planned.len());
        for (name, part) in planned {
            ctx.ensure_active()?;
            self.backend
                .put_object_stream(&self.container, &name, bytes_stream(part.data.clone()))
                .await
                .map_err(|e| e.with_object(&name))?;
            debug!("Stored '{}' as {} ({} bytes)", part.file_name, name, part.data.len());
            records.push(FileRecord::new(
                &self.base_address,
                &name,
                FileData::Buffered(part.data),
            ));
        }

        info!("Uploaded {} files", records.len());
        Ok(records)
    }

    async fn fetch(&self, name: &str) -> BlobResult<FileRecord> {
        let stream = self
            .backend
            .get_object_stream(&self.container, name)
            .await
            .map_err(|e| e.with_object(name))?;

        let data = match self.config.download_mode {
            DownloadMode::Buffered => FileData::Buffered(
                collect_stream(stream)
                    .await
                    .map_err(|e| e.with_object(name))?,
            ),
            DownloadMode::Streamed => FileData::Streamed(stream),
        };
        Ok(FileRecord::new(&self.base_address, name, data))
    }
}

/// Same-name files in one batch overwrite each other; say so.
fn warn_on_collisions(planned: &[(String, FilePart)]) {
    let mut seen = HashSet::with_capacity(planned.len());
    for (name, part) in planned {
        if !seen.insert(name.as_str()) {
            warn!(
                object = %name,
                file = %part.file_name,
                "Multiple files in one upload share an object name; the last one wins"
            );
        }
    }
}
