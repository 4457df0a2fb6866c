use anyhow::Result;
use clap::{Args, ValueEnum};
use sitepush_core::config::{BUCKET_ENV, DEFAULT_CONFIG_FILE, DISTRIBUTION_ENV};
use sitepush_core::{DeploymentConfig, DeploymentResult, Error, Overrides, load_config_file};
use sitepush_deployer::aws_cli::AwsCli;
use sitepush_deployer::aws_sdk::{CloudFrontInvalidator, S3Storage, load_sdk_config};
use sitepush_deployer::{Orchestrator, Reporter};
use std::path::PathBuf;
use tracing::debug;

use crate::report::TerminalReporter;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Backend {
    /// Shell out to the `aws` CLI
    Cli,
    /// Call S3 and CloudFront through the AWS SDK
    Sdk,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// S3 bucket to upload into [env: AWS_BUCKET_NAME]
    #[arg(long)]
    bucket: Option<String>,

    /// CloudFront distribution to invalidate [env: AWS_DISTRIBUTION_ID]
    #[arg(long)]
    distribution_id: Option<String>,

    /// Build output directory [default: dist]
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Cache-Control header for uploaded objects
    #[arg(long)]
    cache_control: Option<String>,

    /// AWS region
    #[arg(long)]
    region: Option<String>,

    /// AWS named profile
    #[arg(long)]
    profile: Option<String>,

    /// How to talk to AWS
    #[arg(long, value_enum, default_value_t = Backend::Cli)]
    backend: Backend,

    /// Command used to run the AWS CLI, e.g. "aws-vault exec prod -- aws"
    #[arg(long, default_value = "aws")]
    aws_command: String,

    /// Config file [default: sitepush.toml when present]. A relative `dir`
    /// in it is taken relative to the file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Build the deployment configuration at the process boundary
fn resolve_config(args: &DeployArgs) -> sitepush_core::Result<DeploymentConfig> {
    let file = match &args.config {
        Some(path) => load_config_file(path, true)?,
        None => load_config_file(DEFAULT_CONFIG_FILE, false)?,
    };

    let overrides = Overrides {
        bucket: args.bucket.clone(),
        distribution_id: args.distribution_id.clone(),
        dir: args.dir.clone(),
        cache_control: args.cache_control.clone(),
        region: args.region.clone(),
        profile: args.profile.clone(),
    };

    DeploymentConfig::resolve(overrides, |key| std::env::var(key).ok(), file)
}

/// Deploy the build directory
pub async fn run(args: DeployArgs) -> Result<()> {
    let reporter = TerminalReporter::stdout();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(error) => return Err(fail(&reporter, error)),
    };
    debug!(
        bucket = config.bucket(),
        distribution_id = config.distribution_id(),
        dir = %config.artifact_dir().display(),
        backend = ?args.backend,
        "resolved configuration"
    );

    let result = match args.backend {
        Backend::Cli => {
            let aws = match AwsCli::from_command_line(&args.aws_command) {
                Ok(aws) => aws.for_config(&config),
                Err(error) => return Err(fail(&reporter, error)),
            };
            Orchestrator::new(&aws, &aws).deploy(config, &reporter).await
        }
        Backend::Sdk => {
            let sdk_config = load_sdk_config(&config).await;
            let storage = S3Storage::new(&sdk_config);
            let cdn = CloudFrontInvalidator::new(&sdk_config);
            Orchestrator::new(&storage, &cdn).deploy(config, &reporter).await
        }
    };

    match result {
        DeploymentResult::Succeeded { .. } => {
            println!();
            println!("{}", "=".repeat(50));
            reporter.success("Deployment complete!");
            println!("{}", "=".repeat(50));
            reporter.info("Your website will be live in 1-2 minutes.");
            Ok(())
        }
        DeploymentResult::Failed { error, .. } => Err(fail(&reporter, error)),
    }
}

/// Print the single failure line (plus hints) and hand the error back for
/// exit code mapping
fn fail(reporter: &dyn Reporter, error: Error) -> anyhow::Error {
    reporter.error(&format!("Deployment failed: {}", error));
    if let Error::Configuration(_) = &error {
        println!();
        println!("Please set:");
        println!("  export {}=\"your-bucket-name\"", BUCKET_ENV);
        println!("  export {}=\"your-cloudfront-id\"", DISTRIBUTION_ENV);
        println!();
        println!(
            "Or pass --bucket / --distribution-id, or add them to {}.",
            DEFAULT_CONFIG_FILE
        );
    }
    error.into()
}
