use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;

/// Conventional build output directory
pub const DEFAULT_ARTIFACT_DIR: &str = "dist";

/// Uploaded assets are content-hashed by the site build, so they never change in place
pub const DEFAULT_CACHE_CONTROL: &str = "public,max-age=31536000,immutable";

/// Path pattern that invalidates every cached object
pub const INVALIDATE_ALL: &str = "/*";

/// Parameters for one mirror of a local directory into a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub source: PathBuf,
    pub bucket: String,
    /// Remove remote objects that no longer exist locally
    pub delete_stale: bool,
    pub cache_control: String,
}

/// Parameters for one CDN cache invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub paths: Vec<String>,
    /// Unique per request; CloudFront uses it to deduplicate retries
    pub caller_reference: String,
}

/// An invalidation accepted by the CDN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub id: String,
    pub status: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
}

/// Shape of `aws cloudfront create-invalidation` output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInvalidationOutput {
    invalidation: Option<RawInvalidation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInvalidation {
    id: Option<String>,
    status: Option<String>,
    create_time: Option<String>,
}

impl Invalidation {
    /// Parse the JSON printed by `aws cloudfront create-invalidation`.
    ///
    /// A response without a non-empty `Invalidation.Id` is an error; an id is
    /// never made up.
    pub fn from_cli_output(raw: &str, distribution_id: &str) -> Result<Self> {
        let output: RawInvalidationOutput = serde_json::from_str(raw).map_err(|e| {
            Error::invalidation(distribution_id, format!("unparsable response: {}", e))
        })?;

        let invalidation = output.invalidation.ok_or_else(|| {
            Error::invalidation(distribution_id, "response has no Invalidation object")
        })?;

        let id = invalidation
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::invalidation(distribution_id, "response has no invalidation Id")
            })?;

        let create_time = invalidation
            .create_time
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(Invalidation {
            id,
            status: invalidation.status,
            create_time,
        })
    }
}

/// Outcome of one deployment run.
///
/// Either the invalidation id is present and there is no error, or the
/// reverse. There is no partial success.
#[derive(Debug)]
pub enum DeploymentResult {
    Succeeded {
        invalidation: Invalidation,
    },
    Failed {
        error: Error,
        /// Set when files were already uploaded before the failure
        remote_mutated: bool,
    },
}

impl DeploymentResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentResult::Succeeded { .. })
    }

    pub fn invalidation_id(&self) -> Option<&str> {
        match self {
            DeploymentResult::Succeeded { invalidation } => Some(&invalidation.id),
            DeploymentResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            DeploymentResult::Succeeded { .. } => None,
            DeploymentResult::Failed { error, .. } => Some(error),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            DeploymentResult::Succeeded { .. } => 0,
            DeploymentResult::Failed { error, .. } => error.exit_code(),
        }
    }
}
