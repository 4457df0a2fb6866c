// Backend that shells out to the `aws` command line tool

use crate::{CdnInvalidator, ObjectStorage};
use async_trait::async_trait;
use sitepush_core::{
    DeploymentConfig, Error, Invalidation, InvalidationRequest, Result, SyncRequest,
};
use std::ffi::OsString;
use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// The `aws` CLI, optionally behind a wrapper such as `aws-vault exec prod --`
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: OsString,
    prefix: Vec<OsString>,
    region: Option<String>,
    profile: Option<String>,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self {
            program: OsString::from("aws"),
            prefix: Vec::new(),
            region: None,
            profile: None,
        }
    }
}

impl AwsCli {
    /// Parse a whitespace separated command line, e.g. `"aws"` or
    /// `"aws-vault exec prod -- aws"`.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut words = command_line.split_whitespace().map(OsString::from);
        let program = words
            .next()
            .ok_or_else(|| Error::ConfigParse("empty aws command".to_string()))?;
        Ok(Self {
            program,
            prefix: words.collect(),
            ..Default::default()
        })
    }

    /// Forward the region and profile of `config` to every call
    pub fn for_config(mut self, config: &DeploymentConfig) -> Self {
        self.region = config.region().map(str::to_string);
        self.profile = config.profile().map(str::to_string);
        self
    }

    fn command(&self, args: Vec<OsString>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix).args(args).args(self.global_args());
        debug!(command = ?cmd.as_std(), "spawning aws");
        cmd
    }

    fn global_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(region) = &self.region {
            args.push("--region".into());
            args.push(region.into());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".into());
            args.push(profile.into());
        }
        args
    }
}

/// `s3 sync <dir>/ s3://<bucket> [--delete] --cache-control <cc>`
pub fn sync_args(request: &SyncRequest) -> Vec<OsString> {
    let mut source = request.source.clone().into_os_string();
    if !source.to_string_lossy().ends_with('/') {
        source.push("/");
    }

    let mut args: Vec<OsString> = vec!["s3".into(), "sync".into(), source];
    args.push(format!("s3://{}", request.bucket).into());
    if request.delete_stale {
        args.push("--delete".into());
    }
    args.push("--cache-control".into());
    args.push(request.cache_control.clone().into());
    args
}

/// `cloudfront create-invalidation --distribution-id <id> --paths <p>...`
pub fn invalidation_args(request: &InvalidationRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "cloudfront".into(),
        "create-invalidation".into(),
        "--distribution-id".into(),
        request.distribution_id.clone().into(),
        "--paths".into(),
    ];
    args.extend(request.paths.iter().map(OsString::from));
    args.push("--output".into());
    args.push("json".into());
    args
}

fn spawn_error(program: &OsString, err: io::Error) -> String {
    if err.kind() == io::ErrorKind::NotFound {
        format!(
            "{} not found. Install the AWS CLI: https://aws.amazon.com/cli/",
            program.to_string_lossy()
        )
    } else {
        format!("could not run {}: {}", program.to_string_lossy(), err)
    }
}

#[async_trait]
impl ObjectStorage for AwsCli {
    async fn sync(&self, request: &SyncRequest) -> Result<()> {
        // aws prints its own per-file progress, so stdout/stderr are inherited
        let status = self
            .command(sync_args(request))
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::sync(&request.bucket, spawn_error(&self.program, e)))?;

        if !status.success() {
            return Err(Error::sync(
                &request.bucket,
                format!("aws s3 sync exited with {}", status),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CdnInvalidator for AwsCli {
    async fn invalidate(&self, request: &InvalidationRequest) -> Result<Invalidation> {
        let output = self
            .command(invalidation_args(request))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::invalidation(&request.distribution_id, spawn_error(&self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::invalidation(
                &request.distribution_id,
                format!(
                    "aws cloudfront create-invalidation exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Invalidation::from_cli_output(&stdout, &request.distribution_id)
    }
}
