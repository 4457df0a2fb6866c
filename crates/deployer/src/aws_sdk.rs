// Backend built on the AWS Rust SDK, for hosts without the `aws` CLI

use crate::{CdnInvalidator, ObjectStorage};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use sitepush_core::{
    DeploymentConfig, Error, Invalidation, InvalidationRequest, Result, SyncRequest,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};
use walkdir::WalkDir;

/// S3 `DeleteObjects` accepts at most this many keys per call
const DELETE_BATCH: usize = 1000;

/// Load credentials and region the same way the `aws` CLI does
pub async fn load_sdk_config(config: &DeploymentConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = config.region() {
        loader = loader.region(Region::new(region.to_string()));
    }
    if let Some(profile) = config.profile() {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// A file under the artifact directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub key: String,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub modified: i64,
}

/// An object already in the bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteObject {
    pub size: i64,
    pub modified: Option<i64>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub uploads: Vec<LocalFile>,
    pub deletions: Vec<String>,
}

/// List every file under `root`, keyed by its `/`-separated relative path
pub fn collect_local_files(root: &Path) -> std::io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(std::io::Error::other)?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let metadata = entry.metadata().map_err(std::io::Error::other)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        files.push(LocalFile {
            path: entry.path().to_path_buf(),
            key,
            size: metadata.len(),
            modified,
        });
    }
    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

/// Decide what to upload and delete, the way `aws s3 sync` does: a file is
/// uploaded when it is new, its size differs, or it is newer locally.
pub fn plan_sync(
    local: &[LocalFile],
    remote: &HashMap<String, RemoteObject>,
    delete_stale: bool,
) -> SyncPlan {
    let uploads = local
        .iter()
        .filter(|file| match remote.get(&file.key) {
            None => true,
            Some(object) => {
                object.size != file.size as i64
                    || object.modified.is_none_or(|remote_time| file.modified > remote_time)
            }
        })
        .cloned()
        .collect();

    let mut deletions = Vec::new();
    if delete_stale {
        let local_keys: std::collections::HashSet<&str> =
            local.iter().map(|f| f.key.as_str()).collect();
        deletions = remote
            .keys()
            .filter(|key| !local_keys.contains(key.as_str()))
            .cloned()
            .collect();
        deletions.sort();
    }

    SyncPlan { uploads, deletions }
}

pub struct S3Storage {
    client: aws_sdk_s3::Client,
}

impl S3Storage {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_s3::Client::new(sdk_config))
    }

    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    async fn list_remote(&self, bucket: &str) -> Result<HashMap<String, RemoteObject>> {
        let mut objects = HashMap::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| Error::sync(bucket, DisplayErrorContext(&e).to_string()))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    objects.insert(
                        key.to_string(),
                        RemoteObject {
                            size: object.size().unwrap_or_default(),
                            modified: object.last_modified().map(|t| t.secs()),
                        },
                    );
                }
            }
        }
        Ok(objects)
    }

    async fn upload(&self, request: &SyncRequest, file: &LocalFile) -> Result<()> {
        let body = ByteStream::from_path(&file.path)
            .await
            .map_err(|e| Error::sync(&request.bucket, format!("{}: {}", file.path.display(), e)))?;
        let content_type = mime_guess::from_path(&file.path).first_or_octet_stream();

        self.client
            .put_object()
            .bucket(&request.bucket)
            .key(&file.key)
            .body(body)
            .content_type(content_type.essence_str())
            .cache_control(&request.cache_control)
            .send()
            .await
            .map_err(|e| {
                Error::sync(
                    &request.bucket,
                    format!("upload {}: {}", file.key, DisplayErrorContext(&e)),
                )
            })?;

        info!(
            path = %file.path.display(),
            content_type = content_type.essence_str(),
            "upload: s3://{}/{}",
            request.bucket,
            file.key
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, keys: &[String]) -> Result<()> {
        for chunk in keys.chunks(DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::sync(bucket, e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| Error::sync(bucket, e.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| Error::sync(bucket, DisplayErrorContext(&e).to_string()))?;

            if let Some(failed) = output.errors().first() {
                return Err(Error::sync(
                    bucket,
                    format!(
                        "delete {}: {}",
                        failed.key().unwrap_or("?"),
                        failed.message().unwrap_or("unknown error")
                    ),
                ));
            }

            for key in chunk {
                info!("delete: s3://{}/{}", bucket, key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn sync(&self, request: &SyncRequest) -> Result<()> {
        let local = collect_local_files(&request.source)
            .map_err(|e| Error::sync(&request.bucket, e.to_string()))?;
        let remote = self.list_remote(&request.bucket).await?;
        let plan = plan_sync(&local, &remote, request.delete_stale);
        debug!(
            local = local.len(),
            remote = remote.len(),
            uploads = plan.uploads.len(),
            deletions = plan.deletions.len(),
            "sync plan"
        );

        for file in &plan.uploads {
            self.upload(request, file).await?;
        }
        if !plan.deletions.is_empty() {
            self.delete(&request.bucket, &plan.deletions).await?;
        }

        info!(
            bucket = %request.bucket,
            uploaded = plan.uploads.len(),
            deleted = plan.deletions.len(),
            "sync finished"
        );
        Ok(())
    }
}

pub struct CloudFrontInvalidator {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontInvalidator {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_cloudfront::Client::new(sdk_config))
    }

    pub fn from_client(client: aws_sdk_cloudfront::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CdnInvalidator for CloudFrontInvalidator {
    async fn invalidate(&self, request: &InvalidationRequest) -> Result<Invalidation> {
        let distribution_id = request.distribution_id.as_str();
        let paths = Paths::builder()
            .quantity(request.paths.len() as i32)
            .set_items(Some(request.paths.clone()))
            .build()
            .map_err(|e| Error::invalidation(distribution_id, e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(&request.caller_reference)
            .build()
            .map_err(|e| Error::invalidation(distribution_id, e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| {
                Error::invalidation(
                    distribution_id,
                    aws_sdk_cloudfront::error::DisplayErrorContext(&e).to_string(),
                )
            })?;

        let invalidation = output.invalidation().ok_or_else(|| {
            Error::invalidation(distribution_id, "response has no Invalidation object")
        })?;
        let id = invalidation.id().trim();
        if id.is_empty() {
            return Err(Error::invalidation(
                distribution_id,
                "response has no invalidation Id",
            ));
        }

        let create_time = invalidation.create_time();
        Ok(Invalidation {
            id: id.to_string(),
            status: Some(invalidation.status().to_string()),
            create_time: chrono::DateTime::from_timestamp(
                create_time.secs(),
                create_time.subsec_nanos(),
            ),
        })
    }
}
