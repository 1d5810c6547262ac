//! S3 (and S3-compatible) object storage.

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;

use crate::{collect_relative_files, ObjectStorage, StorageError};

/// Object storage backed by an S3 bucket.
///
/// `endpoint` supports S3-compatible services (MinIO, Ceph RGW); when
/// absent the regular AWS endpoint resolution applies. Credentials come
/// from the default provider chain (env, profile, instance metadata).
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Storage {
    /// Connect using the default credential chain.
    pub async fn connect(bucket: String, region: String, endpoint: Option<String>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
        if let Some(url) = endpoint {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;

        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
        }
    }

    /// The bucket artifacts are written to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        tracing::debug!(bucket, key, "Uploaded object");
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload_single(
        &self,
        remote_key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        self.put_file(&self.bucket, remote_key, local_path).await
    }

    async fn upload_paths(
        &self,
        base_dir: &Path,
        bucket: &str,
        prefix: &str,
        relative_paths: &[String],
    ) -> Result<(), StorageError> {
        let files = collect_relative_files(base_dir, relative_paths)?;
        tracing::info!(bucket, prefix, count = files.len(), "Uploading artifact set");

        for rel in &files {
            let key = format!("{prefix}/{rel}");
            self.put_file(bucket, &key, &base_dir.join(rel)).await?;
        }
        Ok(())
    }

    async fn download_path(
        &self,
        remote_ref: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        // Accept both bare keys and `s3://bucket/key` references.
        let (bucket, key) = match remote_ref.strip_prefix("s3://") {
            Some(rest) => rest
                .split_once('/')
                .ok_or_else(|| StorageError::Download(format!("Invalid S3 ref '{remote_ref}'")))?,
            None => (self.bucket.as_str(), remote_ref),
        };

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?
            .into_bytes();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &bytes).await?;

        tracing::debug!(bucket, key, dest = %local_path.display(), "Downloaded object");
        Ok(())
    }
}
