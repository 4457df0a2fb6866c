use crate::error::{Error, Result};
use crate::types::{
    DEFAULT_ARTIFACT_DIR, DEFAULT_CACHE_CONTROL, INVALIDATE_ALL, InvalidationRequest, SyncRequest,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const BUCKET_ENV: &str = "AWS_BUCKET_NAME";
pub const DISTRIBUTION_ENV: &str = "AWS_DISTRIBUTION_ID";

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "sitepush.toml";

/// Optional `sitepush.toml` file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub aws: AwsSection,
    #[serde(default)]
    pub deploy: DeploySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsSection {
    pub bucket: Option<String>,
    pub distribution_id: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploySection {
    pub dir: Option<PathBuf>,
    pub cache_control: Option<String>,
}

/// Values given explicitly on the command line. These win over everything.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub bucket: Option<String>,
    pub distribution_id: Option<String>,
    pub dir: Option<PathBuf>,
    pub cache_control: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
}

/// Load a config file. A missing file is `Ok(None)` unless `required`.
///
/// A relative `deploy.dir` is taken relative to the directory holding the
/// file, not the working directory.
pub fn load_config_file<P: AsRef<Path>>(path: P, required: bool) -> Result<Option<ConfigFile>> {
    let path = path.as_ref();
    if !path.exists() {
        if required {
            return Err(Error::ConfigParse(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let mut file = parse_config_str(&content)?;
    if let (Some(dir), Some(base)) = (file.deploy.dir.as_mut(), path.parent()) {
        if dir.is_relative() {
            *dir = base.join(&*dir);
        }
    }
    Ok(Some(file))
}

/// Parse a config file from a string (useful for testing)
pub fn parse_config_str(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Everything one deployment run needs. Built once, then passed by value.
///
/// Bucket and distribution id are guaranteed non-empty; the only ways to
/// build one go through [`DeploymentConfig::new`] or
/// [`DeploymentConfig::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    bucket: String,
    distribution_id: String,
    artifact_dir: PathBuf,
    cache_control: String,
    invalidation_paths: Vec<String>,
    region: Option<String>,
    profile: Option<String>,
}

impl DeploymentConfig {
    pub fn new(bucket: impl Into<String>, distribution_id: impl Into<String>) -> Result<Self> {
        let bucket = non_empty(Some(bucket.into()));
        let distribution_id = non_empty(Some(distribution_id.into()));
        Self::from_parts(bucket, distribution_id)
    }

    /// Resolve configuration with precedence flag > environment > file > default.
    ///
    /// `env` is consulted for `AWS_BUCKET_NAME` and `AWS_DISTRIBUTION_ID` only.
    pub fn resolve<F>(overrides: Overrides, env: F, file: Option<ConfigFile>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();

        let bucket = non_empty(overrides.bucket)
            .or_else(|| non_empty(env(BUCKET_ENV)))
            .or_else(|| non_empty(file.aws.bucket));
        let distribution_id = non_empty(overrides.distribution_id)
            .or_else(|| non_empty(env(DISTRIBUTION_ENV)))
            .or_else(|| non_empty(file.aws.distribution_id));

        let mut config = Self::from_parts(bucket, distribution_id)?;

        if let Some(dir) = overrides.dir.or(file.deploy.dir) {
            config.artifact_dir = dir;
        }
        if let Some(cache_control) =
            non_empty(overrides.cache_control).or_else(|| non_empty(file.deploy.cache_control))
        {
            config.cache_control = cache_control;
        }
        config.region = non_empty(overrides.region).or_else(|| non_empty(file.aws.region));
        config.profile = non_empty(overrides.profile).or_else(|| non_empty(file.aws.profile));

        Ok(config)
    }

    fn from_parts(bucket: Option<String>, distribution_id: Option<String>) -> Result<Self> {
        match (bucket, distribution_id) {
            (Some(bucket), Some(distribution_id)) => Ok(Self {
                bucket,
                distribution_id,
                artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
                cache_control: DEFAULT_CACHE_CONTROL.to_string(),
                invalidation_paths: vec![INVALIDATE_ALL.to_string()],
                region: None,
                profile: None,
            }),
            (bucket, distribution_id) => {
                let mut missing = Vec::new();
                if bucket.is_none() {
                    missing.push(BUCKET_ENV.to_string());
                }
                if distribution_id.is_none() {
                    missing.push(DISTRIBUTION_ENV.to_string());
                }
                Err(Error::Configuration(missing))
            }
        }
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = cache_control.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn distribution_id(&self) -> &str {
        &self.distribution_id
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn cache_control(&self) -> &str {
        &self.cache_control
    }

    pub fn invalidation_paths(&self) -> &[String] {
        &self.invalidation_paths
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn sync_request(&self) -> SyncRequest {
        SyncRequest {
            source: self.artifact_dir.clone(),
            bucket: self.bucket.clone(),
            delete_stale: true,
            cache_control: self.cache_control.clone(),
        }
    }

    pub fn invalidation_request(&self, caller_reference: impl Into<String>) -> InvalidationRequest {
        InvalidationRequest {
            distribution_id: self.distribution_id.clone(),
            paths: self.invalidation_paths.clone(),
            caller_reference: caller_reference.into(),
        }
    }
}

/// Trim, and treat blank as absent
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
