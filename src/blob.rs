//! # Blob Store
//!
//! Storage for uploaded bytes. The store enforces no policy of its own: it
//! receives bytes that already passed validation and hands back a stable
//! reference plus the stored length.

use async_trait::async_trait;
use worker::{Bucket, HttpMetadata};

use crate::errors::AppResult;
use crate::utils::generate_blob_key;

/// A file received from the client, held in memory until it is staged.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub reference: String,
    pub size: u64,
}

#[async_trait(?Send)]
pub trait BlobStore {
    async fn put(&self, namespace: &str, owner: &str, file: &UploadedFile) -> AppResult<StoredBlob>;
    async fn delete(&self, reference: &str) -> AppResult<()>;
}

/// R2-backed blob store.
pub struct R2BlobStore {
    bucket: Bucket,
}

impl R2BlobStore {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }
}

#[async_trait(?Send)]
impl BlobStore for R2BlobStore {
    async fn put(&self, namespace: &str, owner: &str, file: &UploadedFile) -> AppResult<StoredBlob> {
        let key = generate_blob_key(namespace, owner, &file.file_name, &file.content_type);
        let content_type = if file.content_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            file.content_type.clone()
        };

        self.bucket
            .put(&key, file.bytes.clone())
            .http_metadata(HttpMetadata {
                content_type: Some(content_type),
                ..Default::default()
            })
            .execute()
            .await?;

        Ok(StoredBlob {
            reference: key,
            size: file.size(),
        })
    }

    async fn delete(&self, reference: &str) -> AppResult<()> {
        self.bucket.delete(reference).await?;
        Ok(())
    }
}
