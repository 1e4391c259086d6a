//! In-process object store
//!
//! Backs tests and embedded use of the pipeline. Contents live only as long
//! as the value does.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::{Arc, RwLock};

use super::{calculate_sha256, ObjectStore, UploadResult};

#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<(String, String), Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through the async interface.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert((bucket.to_string(), key.to_string()), data.into());
        }
    }

    /// Every key in `bucket`, in lexical order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, k)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.read().map_err(|_| anyhow!("memory store poisoned"))?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("No such object: {}/{}", bucket, key))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<UploadResult> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;
        let mut objects = self.objects.write().map_err(|_| anyhow!("memory store poisoned"))?;
        objects.insert((bucket.to_string(), key.to_string()), data);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    async fn put_new(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<Option<UploadResult>> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;
        let mut objects = self.objects.write().map_err(|_| anyhow!("memory store poisoned"))?;

        match objects.entry((bucket.to_string(), key.to_string())) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                slot.insert(data);
                Ok(Some(UploadResult {
                    key: key.to_string(),
                    checksum,
                    size,
                }))
            },
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let objects = self.objects.read().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(objects.contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}
