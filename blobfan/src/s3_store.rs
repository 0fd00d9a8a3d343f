use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};
use serde_json::{json, Value};
use std::env;
use tracing::{debug, info};

use crate::types::{collect_stream, object_address};
use crate::{
    AccessPolicy, BlobError, BlobResult, ByteStream, ContainerHandle, ObjectEntry, StorageBackend,
};

/// S3 connection settings
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible services; AWS when `None`
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl S3Config {
    /// Read `BLOBFAN_S3_REGION`, `BLOBFAN_S3_ACCESS_KEY_ID`,
    /// `BLOBFAN_S3_SECRET_ACCESS_KEY` and the optional `BLOBFAN_S3_ENDPOINT_URL`.
    pub fn from_env() -> BlobResult<Self> {
        fn get_env(key: &str) -> BlobResult<String> {
            env::var(key).map_err(|_| {
                BlobError::configuration(format!("{} environment variable required", key))
            })
        }

        Ok(Self {
            region: get_env("BLOBFAN_S3_REGION")?,
            access_key_id: get_env("BLOBFAN_S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("BLOBFAN_S3_SECRET_ACCESS_KEY")?,
            endpoint_url: env::var("BLOBFAN_S3_ENDPOINT_URL").ok(),
            force_path_style: true,
        })
    }

    fn validate(&self) -> BlobResult<()> {
        if self.region.trim().is_empty() {
            return Err(BlobError::configuration("S3 region must not be empty"));
        }
        if self.access_key_id.trim().is_empty() || self.secret_access_key.trim().is_empty() {
            return Err(BlobError::configuration("S3 credentials must not be empty"));
        }
        if let Some(endpoint) = &self.endpoint_url {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(BlobError::configuration(format!(
                    "S3 endpoint '{}' must be an http(s) URL",
                    endpoint
                )));
            }
        }
        Ok(())
    }

    /// Account address that bucket names are appended to
    fn account_address(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// Storage backend for AWS S3 and S3-compatible services.
///
/// A container maps to a bucket, addresses are path-style
/// (`{endpoint}/{bucket}/{name}`).
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    account_address: String,
}

impl S3Backend {
    pub async fn new(config: S3Config) -> BlobResult<Self> {
        config.validate()?;
        let account_address = config.account_address();
        let client = Self::create_client(config).await;
        Ok(Self {
            client,
            account_address,
        })
    }

    pub async fn from_env() -> BlobResult<Self> {
        Self::new(S3Config::from_env()?).await
    }

    async fn create_client(config: S3Config) -> Client {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "blobfan",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.force_path_style)
                .build(),
        )
    }

    /// Bucket policy granting anonymous access; `None` for private buckets
    fn bucket_policy(bucket: &str, policy: AccessPolicy) -> Option<Value> {
        let read_objects = json!({
            "Sid": "PublicReadObjects",
            "Effect": "Allow",
            "Principal": "*",
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{}/*", bucket)],
        });
        let list_bucket = json!({
            "Sid": "PublicListBucket",
            "Effect": "Allow",
            "Principal": "*",
            "Action": ["s3:ListBucket"],
            "Resource": [format!("arn:aws:s3:::{}", bucket)],
        });

        let statements = match policy {
            AccessPolicy::Private => return None,
            AccessPolicy::PublicBlob => vec![read_objects],
            AccessPolicy::PublicContainer => vec![read_objects, list_bucket],
        };
        Some(json!({
            "Version": "2012-10-17",
            "Statement": statements,
        }))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn create_container_if_absent(&self, name: &str) -> BlobResult<ContainerHandle> {
        let head = self.client.head_bucket().bucket(name).send().await;
        match head {
            Ok(_) => {
                debug!("Bucket {} already exists", name);
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                let created = self.client.create_bucket().bucket(name).send().await;
                if let Err(err) = created {
                    let owned = err.as_service_error().is_some_and(|e| {
                        e.is_bucket_already_owned_by_you()
                    });
                    if !owned {
                        return Err(BlobError::backend_for(name, err));
                    }
                }
                info!("Created bucket {}", name);
            }
            Err(err) => return Err(BlobError::backend_for(name, err)),
        }
        Ok(ContainerHandle::new(name))
    }

    async fn set_permissions(
        &self,
        container: &ContainerHandle,
        policy: AccessPolicy,
    ) -> BlobResult<()> {
        let bucket = container.name();
        match Self::bucket_policy(bucket, policy) {
            Some(document) => {
                self.client
                    .put_bucket_policy()
                    .bucket(bucket)
                    .policy(document.to_string())
                    .send()
                    .await
                    .map_err(|e| BlobError::backend_for(bucket, e))?;
                debug!("Applied {:?} policy to bucket {}", policy, bucket);
            }
            None => {
                let deleted = self
                    .client
                    .delete_bucket_policy()
                    .bucket(bucket)
                    .send()
                    .await;
                if let Err(err) = deleted {
                    let absent = err
                        .as_service_error()
                        .and_then(|e| e.code())
                        .is_some_and(|code| code == "NoSuchBucketPolicy");
                    if !absent {
                        return Err(BlobError::backend_for(bucket, err));
                    }
                }
                debug!("Removed public policy from bucket {}", bucket);
            }
        }
        Ok(())
    }

    async fn list_objects(&self, container: &ContainerHandle) -> BlobResult<Vec<ObjectEntry>> {
        let base = self.base_address(container);
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let result = self
                .client
                .list_objects_v2()
                .bucket(container.name())
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| BlobError::backend_for(container.name(), e))?;

            for object in result.contents() {
                if let Some(key) = object.key() {
                    entries.push(ObjectEntry {
                        name: key.to_string(),
                        address: object_address(&base, key),
                    });
                }
            }

            match result.next_continuation_token() {
                Some(token) if result.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn get_object_stream(
        &self,
        container: &ContainerHandle,
        name: &str,
    ) -> BlobResult<ByteStream> {
        let result = self
            .client
            .get_object()
            .bucket(container.name())
            .key(name)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    BlobError::not_found(name)
                } else {
                    BlobError::backend_for(name, err)
                }
            })?;

        let mut body = result.body;
        let stream = async_stream::stream! {
            loop {
                match body.try_next().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn put_object_stream(
        &self,
        container: &ContainerHandle,
        name: &str,
        stream: ByteStream,
    ) -> BlobResult<()> {
        let data = collect_stream(stream)
            .await
            .map_err(|e| e.with_object(name))?;

        self.client
            .put_object()
            .bucket(container.name())
            .key(name)
            .body(AwsByteStream::from(data))
            .send()
            .await
            .map_err(|e| BlobError::backend_for(name, e))?;
        Ok(())
    }

    fn base_address(&self, container: &ContainerHandle) -> String {
        format!("{}/{}/", self.account_address, container.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> S3Config {
        S3Config {
            region: "eu-west-1".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint_url: endpoint.map(str::to_string),
            force_path_style: true,
        }
    }

    #[test]
    fn account_address_defaults_to_aws() {
        assert_eq!(config(None).account_address(), "https://s3.eu-west-1.amazonaws.com");
        assert_eq!(
            config(Some("http://localhost:9000/")).account_address(),
            "http://localhost:9000"
        );
    }

    #[test]
    fn invalid_settings_are_configuration_errors() {
        assert!(config(Some("localhost:9000")).validate().unwrap_err().is_configuration());

        let mut blank = config(None);
        blank.secret_access_key = " ".to_string();
        assert!(blank.validate().unwrap_err().is_configuration());
    }

    fn actions(document: &Value) -> Vec<(String, String)> {
        document["Statement"]
            .as_array()
            .unwrap()
            .iter()
            .map(|statement| {
                (
                    statement["Action"][0].as_str().unwrap().to_string(),
                    statement["Resource"][0].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn private_buckets_carry_no_policy() {
        assert!(S3Backend::bucket_policy("photos", AccessPolicy::Private).is_none());
    }

    #[test]
    fn public_blob_reads_objects_without_listing() {
        let document = S3Backend::bucket_policy("photos", AccessPolicy::PublicBlob).unwrap();

        assert_eq!(document["Version"], "2012-10-17");
        assert_eq!(document["Statement"][0]["Principal"], "*");
        assert_eq!(
            actions(&document),
            vec![("s3:GetObject".to_string(), "arn:aws:s3:::photos/*".to_string())]
        );
    }

    #[test]
    fn public_container_adds_listing() {
        let document = S3Backend::bucket_policy("photos", AccessPolicy::PublicContainer).unwrap();

        assert_eq!(
            actions(&document),
            vec![
                ("s3:GetObject".to_string(), "arn:aws:s3:::photos/*".to_string()),
                ("s3:ListBucket".to_string(), "arn:aws:s3:::photos".to_string()),
            ]
        );
    }
}
