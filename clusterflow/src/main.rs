//! Clusterflow CLI
//!
//! Provisions a cluster, runs the test suite against it and always tears it
//! down again.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use clusterflow::config::{RunnerConfig, CONFIG_FILE_NAME, ENV_BUILD_DIR, ENV_PROJECT_DIR};
use clusterflow::observability::{init_tracing, LogFormat};
use clusterflow::runner::{LifecycleRunner, RunResult};
use clusterflow::utils::format_duration_ms;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

/// Exit code for configuration and startup errors.
const EXIT_USAGE: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run setup, test and teardown (default)
    Run(RunArgs),
    /// Print the resolved configuration as TOML
    Config(ConfigArgs),
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Project root holding the Makefile
    #[arg(short = 'C', long)]
    project_dir: Option<PathBuf>,

    /// TOML config file (default: <project>/clusterflow.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the setup command
    #[arg(long)]
    setup: Option<String>,

    /// Override the test command
    #[arg(long)]
    test: Option<String>,

    /// Override the teardown command
    #[arg(long)]
    teardown: Option<String>,

    /// Kill the setup phase after this many seconds
    #[arg(long, value_name = "SECS")]
    setup_timeout: Option<f64>,

    /// Kill the test phase after this many seconds
    #[arg(long, value_name = "SECS")]
    test_timeout: Option<f64>,

    /// Kill the teardown phase after this many seconds
    #[arg(long, value_name = "SECS")]
    teardown_timeout: Option<f64>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Write the run result as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.log_format, cli.verbose) {
        eprintln!("warning: failed to initialize logging: {err}");
    }

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Run(RunArgs::default()));

    let outcome = match command {
        Commands::Run(args) => run(args).await,
        Commands::Config(args) => print_config(&args),
    };

    outcome.unwrap_or_else(|err| {
        eprintln!("error: {err:#}");
        ExitCode::from(EXIT_USAGE)
    })
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let config = resolve_config(&args.config)?;
    let runner = LifecycleRunner::new(config);
    let result = runner
        .run_configured()
        .await
        .context("failed to start the cluster lifecycle")?;

    print_summary(&result);

    if let Some(ref path) = args.report {
        // The run already happened; a lost report must not mask its verdict.
        match write_report(&result, path) {
            Ok(()) => info!(path = %path.display(), "Wrote run report"),
            Err(err) => error!("{err:#}"),
        }
    }

    Ok(exit_code(result.exit_code()))
}

fn print_config(args: &ConfigArgs) -> Result<ExitCode> {
    let config = resolve_config(args)?;
    let text = config
        .to_toml_string()
        .context("failed to render configuration")?;
    print!("{text}");
    Ok(ExitCode::SUCCESS)
}

/// Layers defaults, the config file, the environment and the command line.
fn resolve_config(args: &ConfigArgs) -> Result<RunnerConfig> {
    let project_dir = args
        .project_dir
        .clone()
        .or_else(|| env_path(ENV_PROJECT_DIR))
        .or_else(|| env_path(ENV_BUILD_DIR));

    let mut config = match args.config {
        Some(ref path) => RunnerConfig::load(path)?,
        None => {
            let base = match project_dir {
                Some(ref dir) => dir.clone(),
                None => std::env::current_dir().context("failed to read working directory")?,
            };
            RunnerConfig::load_or_default(&base.join(CONFIG_FILE_NAME))?
        }
    };

    config.apply_process_env()?;

    if let Some(ref dir) = args.project_dir {
        config.project_dir = Some(dir.clone());
    }
    if let Some(ref cmd) = args.setup {
        config.setup = Some(cmd.clone());
    }
    if let Some(ref cmd) = args.test {
        config.test = Some(cmd.clone());
    }
    if let Some(ref cmd) = args.teardown {
        config.teardown = Some(cmd.clone());
    }
    if let Some(secs) = args.setup_timeout {
        config.setup_timeout_secs = Some(secs);
    }
    if let Some(secs) = args.test_timeout {
        config.test_timeout_secs = Some(secs);
    }
    if let Some(secs) = args.teardown_timeout {
        config.teardown_timeout_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn print_summary(result: &RunResult) {
    for outcome in result.phases() {
        println!(
            "{:<9} {:<10} exit {:<4} {}",
            outcome.phase.as_str(),
            outcome.status.to_string(),
            outcome.effective_exit_code(),
            format_duration_ms(outcome.duration_ms())
        );
    }
    for warning in result.warnings() {
        println!("warning: {warning}");
    }
    println!("{result}");
}

fn write_report(result: &RunResult, path: &Path) -> Result<()> {
    let json = result.to_json().context("failed to serialize run result")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))
}

/// Maps a run exit code to a process exit code, keeping failures non-zero.
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(exit_status(code))
}

fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(if code < 0 { 1 } else { u8::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["clusterflow"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "clusterflow",
            "-vv",
            "run",
            "-C",
            "/src/distarray",
            "--test",
            "make test_ipython",
            "--setup-timeout",
            "900",
            "--test-timeout",
            "600",
            "--report",
            "report.json",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.config.project_dir, Some(PathBuf::from("/src/distarray")));
        assert_eq!(args.config.test.as_deref(), Some("make test_ipython"));
        assert_eq!(args.config.setup_timeout, Some(900.0));
        assert_eq!(args.config.test_timeout, Some(600.0));
        assert_eq!(args.report, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(124), 124);
        assert_eq!(exit_status(300), 255);
        assert_eq!(exit_status(-1), 1);
    }

    #[test]
    fn test_resolve_config_applies_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "test = \"make test_mpi\"\nteardown_timeout_secs = 60.0\n",
        )
        .unwrap();

        let args = ConfigArgs {
            project_dir: Some(dir.path().to_path_buf()),
            setup_timeout: Some(1200.0),
            teardown_timeout: Some(30.0),
            ..ConfigArgs::default()
        };
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.project_dir.as_deref(), Some(dir.path()));
        assert_eq!(config.setup_timeout_secs, Some(1200.0));
        assert_eq!(config.teardown_timeout_secs, 30.0);
        assert!(config.test.is_some());
    }
}
