use anyhow::Result;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use supply_chain_guard::{
    config::Config,
    error::Error,
    find_breaches,
    output::{print_report, OutputFormat},
    GitRepository, RegistrySet, VersionControl, WorkingTree,
};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const BREACHES_FOUND: u8 = 1;
    pub const ERROR: u8 = 2;
    pub const USAGE: u8 = 3;
}

#[derive(Parser)]
#[command(name = "supply-chain-guard")]
#[command(
    author,
    version,
    about = "Flag dependencies in lock files that were published too recently to be trusted"
)]
struct Cli {
    /// Maximum number of concurrent requests per registry
    #[arg(long)]
    concurrency: Option<usize>,

    /// Releases younger than this many days are breaches (fractions allowed)
    #[arg(long)]
    max_release_days_ago: Option<f64>,

    /// Only check manifest files that differ from this branch
    #[arg(long, value_name = "BRANCH")]
    diff: Option<String>,

    /// Check every manifest file, regardless of diff or age
    #[arg(short, long)]
    force: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Output format (text, json)
    #[arg(long)]
    format: Option<String>,

    /// Config file to use instead of the default locations
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory to scan
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(exit_codes::USAGE)
            } else {
                // --help and --version
                ExitCode::from(exit_codes::SUCCESS)
            };
        }
    };

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let usage = e
                .downcast_ref::<Error>()
                .is_some_and(Error::is_usage_error);
            error!("{}", e);
            ExitCode::from(if usage {
                exit_codes::USAGE
            } else {
                exit_codes::ERROR
            })
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let mut config = Config::load(cli.config.as_deref(), &cli.root)?;
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(days) = cli.max_release_days_ago {
        config.max_release_days_ago = days;
    }
    if cli.diff.is_some() {
        config.diff_against_branch = cli.diff;
    }
    if cli.force {
        config.force = true;
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    config.validate()?;

    let format = OutputFormat::from_str(&config.format).map_err(Error::Config)?;

    let vcs: Arc<dyn VersionControl> = if GitRepository::is_work_tree(&cli.root).await {
        Arc::new(GitRepository::new(cli.root.clone()))
    } else {
        Arc::new(WorkingTree::new(cli.root.clone()))
    };
    debug!(vcs = vcs.name(), root = %cli.root.display(), "Scanning");

    let registries = RegistrySet::new(&config)?;
    let report = find_breaches(&config, vcs, &registries).await?;
    print_report(&report, format)?;

    Ok(if report.has_breaches() {
        exit_codes::BREACHES_FOUND
    } else {
        exit_codes::SUCCESS
    })
}
