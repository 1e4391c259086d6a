use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

pub use memory::MemoryStore;

/// Object storage as seen by the migration pipeline.
///
/// Source files are read from it and error reports, audit logs and table
/// backups are written to it. Every call names its bucket explicitly.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadResult>;

    /// Create `key` only if nothing is stored under it yet. Returns `None`
    /// when the key is taken; the existing object is left untouched.
    async fn put_new(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<Option<UploadResult>>;

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Keys under `prefix`, in lexical order
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// S3 (or MinIO) backed object store
#[derive(Clone)]
pub struct Storage {
    client: Client,
    default_bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let client = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "hrmigrate-storage");

                let mut builder = aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
                    .force_path_style(config.path_style);

                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint_url(endpoint);
                }

                Client::from_conf(builder.build())
            },
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;

                let mut builder =
                    aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint_url(endpoint);
                }

                Client::from_conf(builder.build())
            },
        };

        info!("Storage client initialized, default bucket: {}", config.bucket);

        Ok(Self {
            client,
            default_bucket: config.bucket,
        })
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// PUT an object. With `if_absent`, the request carries `If-None-Match: *`
    /// and a precondition failure comes back as `Ok(None)`.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
        if_absent: bool,
    ) -> Result<Option<UploadResult>> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, key);

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }
        if if_absent {
            request = request.if_none_match("*");
        }

        if let Err(e) = request.send().await {
            let status = e.raw_response().map(|r| r.status().as_u16());
            // 412 when the key exists, 409 when a concurrent conditional write won
            if if_absent && matches!(status, Some(409) | Some(412)) {
                debug!("Key already taken: s3://{}/{}", bucket, key);
                return Ok(None);
            }
            return Err(anyhow!("Failed to upload to S3: {}: {}", key, e));
        }

        info!("Successfully uploaded to s3://{}/{}", bucket, key);

        Ok(Some(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        }))
    }
}

#[async_trait]
impl ObjectStore for Storage {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download from S3: {}", key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self, data))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadResult> {
        self.upload(bucket, key, data, content_type, false)
            .await?
            .ok_or_else(|| anyhow!("Unconditional upload to s3://{}/{} was refused", bucket, key))
    }

    #[instrument(skip(self, data))]
    async fn put_new(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<Option<UploadResult>> {
        self.upload(bucket, key, data, content_type, true).await
    }

    #[instrument(skip(self))]
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(anyhow!("Failed to check S3 object existence: {}", e))
                }
            },
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        debug!("Listing objects in s3://{}/{}", bucket, prefix);

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context("Failed to list S3 objects")?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

pub(crate) fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
