use serde::{Deserialize, Serialize};

use hrmigrate_common::env;

/// Connection settings for the S3-compatible object store.
///
/// When both keys are absent the default AWS credential chain is used
/// instead of static credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    /// Bucket used when a caller does not name one
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("static_credentials", &self.has_static_credentials())
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var_opt("S3_ENDPOINT"),
            region: env::var_or("S3_REGION", "us-east-1"),
            bucket: env::var_or("S3_BUCKET", "hrmigrate-data"),
            access_key: env::var_opt("S3_ACCESS_KEY").or_else(|| env::var_opt("AWS_ACCESS_KEY_ID")),
            secret_key: env::var_opt("S3_SECRET_KEY")
                .or_else(|| env::var_opt("AWS_SECRET_ACCESS_KEY")),
            path_style: env::parse_or("S3_PATH_STYLE", false)?,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}
