// Deployment of a built static site: S3 sync, then CloudFront invalidation

pub mod aws_cli;
pub mod aws_sdk;
pub mod pipeline;
pub mod report;

use async_trait::async_trait;
use sitepush_core::{Invalidation, InvalidationRequest, Result, SyncRequest};

pub use pipeline::{DeployState, Orchestrator};
pub use report::Reporter;

/// Mirrors a local directory into object storage.
///
/// Any `Err` is fatal for the run.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn sync(&self, request: &SyncRequest) -> Result<()>;
}

/// Asks a CDN to drop cached copies of paths.
#[async_trait]
pub trait CdnInvalidator: Send + Sync {
    async fn invalidate(&self, request: &InvalidationRequest) -> Result<Invalidation>;
}
