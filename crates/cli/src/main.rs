mod commands;
mod logging;
mod report;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use std::io;
use std::process::ExitCode;

use commands::deploy::DeployArgs;

#[derive(Parser)]
#[command(name = "sitepush")]
#[command(version, about = "Deploy a built static site to S3 and CloudFront", long_about = None)]
struct Cli {
    /// Show debug logs on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Upload the build directory to S3, then invalidate the CloudFront cache
    ///
    /// Bucket and distribution come from --bucket / --distribution-id, then
    /// AWS_BUCKET_NAME / AWS_DISTRIBUTION_ID, then sitepush.toml.
    Deploy(DeployArgs),

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let result = match cli.command {
        Command::Deploy(args) => commands::deploy::run(args).await,
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sitepush", &mut io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(exit_code_for(&err)),
    }
}

/// Deployment failures are already reported by the command; anything else
/// is printed here.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(deploy_err) = err.downcast_ref::<sitepush_core::Error>() {
        return deploy_err.exit_code();
    }
    eprintln!("error: {:#}", err);
    1
}
