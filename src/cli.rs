use crate::config::ClientConfig;
use crate::driver::{BatchOptions, SessionDriver, SessionOutcome, SessionSettings};
use crate::input::{parse_crop, parse_factor, resolve_items, ResolveOptions};
use crate::ipc::LocalChannel;
use crate::model::Size;
use crate::output::OutputSender;
use crate::service::LaunchingProbe;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "optimise-cli",
    version,
    about = "Submit images, videos and PDFs to the local optimisation service"
)]
pub struct Cli {
    /// Config file (defaults to <config dir>/optimise-cli/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the service sockets
    #[arg(long, global = true)]
    pub socket_dir: Option<PathBuf>,

    /// How long to wait for the service to accept a batch
    #[arg(long, global = true)]
    pub submit_timeout: Option<humantime::Duration>,

    /// How long to wait for every item to finish (0s waits forever)
    #[arg(long, global = true)]
    pub wait_timeout: Option<humantime::Duration>,

    /// Command that starts the service when it is not running, e.g. "optimiser-service --background"
    #[arg(long, global = true)]
    pub service_command: Option<String>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Optimise files, folders or URLs
    Optimise(OptimiseArgs),
}

#[derive(Debug, Args, Clone)]
pub struct OptimiseArgs {
    /// Show the service's floating result window
    #[arg(short, long)]
    pub gui: bool,

    /// Show live progress on stderr (default)
    #[arg(short, long, overrides_with = "no_progress")]
    pub progress: bool,

    /// Do not show progress
    #[arg(long, overrides_with = "progress")]
    pub no_progress: bool,

    /// Use more aggressive optimisation
    #[arg(short, long)]
    pub aggressive: bool,

    /// Copy the result to the clipboard
    #[arg(short, long)]
    pub copy: bool,

    /// Drop missing or unsupported items instead of failing
    #[arg(short, long)]
    pub skip_errors: bool,

    /// Descend into folders
    #[arg(short, long)]
    pub recursive: bool,

    /// Submit and exit without waiting for results
    #[arg(long = "async")]
    pub fire_and_forget: bool,

    /// Speed up videos by this factor
    #[arg(long, value_parser = parse_factor)]
    pub speed_up_factor: Option<f64>,

    /// Downscale by this factor (e.g. 0.5 halves width and height)
    #[arg(long, value_parser = parse_factor)]
    pub downscale_factor: Option<f64>,

    /// Crop to WIDTHxHEIGHT, or N for a square
    #[arg(long, value_parser = parse_crop)]
    pub crop: Option<Size>,

    /// Files, folders or URLs
    #[arg(required = true)]
    pub items: Vec<String>,
}

impl OptimiseArgs {
    pub fn show_progress(&self) -> bool {
        !self.no_progress
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            crop: self.crop,
            downscale_factor: self.downscale_factor,
            speed_up_factor: self.speed_up_factor,
            gui: self.gui,
            copy_to_clipboard: self.copy,
            aggressive: self.aggressive,
        }
    }
}

/// Apply command-line overrides on top of the loaded config.
pub fn build_config(args: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.socket_dir {
        config.socket_dir = dir.clone();
    }
    if let Some(t) = args.submit_timeout {
        config.submit_timeout = Duration::from(t);
    }
    if let Some(t) = args.wait_timeout {
        config.wait_timeout = Some(Duration::from(t)).filter(|d| !d.is_zero());
    }
    if let Some(cmd) = &args.service_command {
        let words: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
        config.service_command = Some(words).filter(|w| !w.is_empty());
    }
    Ok(config)
}

pub async fn run(args: Cli, out: OutputSender) -> Result<SessionOutcome> {
    let config = build_config(&args)?;
    match &args.command {
        Command::Optimise(opts) => {
            run_optimise(&config, opts, out, crate::cancel::shutdown_signal()).await
        }
    }
}

/// Resolve the items and run one batch. `out` is released when this returns,
/// so a writer fed only by it finishes once the run is over.
pub async fn run_optimise<F>(
    config: &ClientConfig,
    opts: &OptimiseArgs,
    out: OutputSender,
    interrupt: F,
) -> Result<SessionOutcome>
where
    F: Future<Output = ()>,
{
    let items = resolve_items(
        &opts.items,
        ResolveOptions {
            recursive: opts.recursive,
            skip_errors: opts.skip_errors,
        },
    )?;

    let requests = LocalChannel::new(&config.socket_dir, &config.request_endpoint);
    let responses = LocalChannel::new(&config.socket_dir, &config.response_endpoint);
    let probe = LaunchingProbe::new(config.service_command.clone(), config.launch_settle);
    let settings = SessionSettings {
        fire_and_forget: opts.fire_and_forget,
        show_progress: opts.show_progress(),
        submit_timeout: config.submit_timeout,
        wait_timeout: config.wait_timeout,
    };

    SessionDriver::new(requests, responses, Box::new(probe), settings, out)
        .run(items, &opts.batch_options(), interrupt)
        .await
        .context("optimisation run failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimise_flags_parse() {
        let cli = Cli::try_parse_from([
            "optimise-cli",
            "--wait-timeout",
            "0s",
            "optimise",
            "-a",
            "-c",
            "--async",
            "--crop",
            "1200x630",
            "--downscale-factor",
            "0.5",
            "--no-progress",
            "a.png",
            "b.mov",
        ])
        .unwrap();
        let Command::Optimise(opts) = &cli.command;
        assert!(opts.aggressive && opts.copy && opts.fire_and_forget);
        assert!(!opts.show_progress());
        assert_eq!(opts.crop, Some(Size::new(1200, 630)));
        assert_eq!(opts.downscale_factor, Some(0.5));
        assert_eq!(opts.items, vec!["a.png", "b.mov"]);
        assert!(!opts.batch_options().gui);
    }

    #[test]
    fn invalid_crop_is_rejected_by_the_parser() {
        let err = Cli::try_parse_from(["optimise-cli", "optimise", "--crop", "abc", "a.png"]).unwrap_err();
        assert!(err.to_string().contains("Invalid crop size"));
    }

    #[test]
    fn items_are_required() {
        assert!(Cli::try_parse_from(["optimise-cli", "optimise"]).is_err());
    }

    #[test]
    fn later_progress_flag_wins() {
        let cli = Cli::try_parse_from(["optimise-cli", "optimise", "--no-progress", "-p", "a.png"]).unwrap();
        let Command::Optimise(opts) = &cli.command;
        assert!(opts.show_progress());
    }

    #[test]
    fn zero_wait_timeout_disables_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{}").unwrap();
        let cli = Cli::try_parse_from([
            "optimise-cli",
            "--config",
            config_path.to_str().unwrap(),
            "--wait-timeout",
            "0s",
            "--submit-timeout",
            "5s",
            "--socket-dir",
            "/tmp/sockets",
            "--service-command",
            "optimiser-service --background",
            "optimise",
            "a.png",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.wait_timeout, None);
        assert_eq!(config.submit_timeout, Duration::from_secs(5));
        assert_eq!(config.socket_dir, PathBuf::from("/tmp/sockets"));
        assert_eq!(
            config.service_command,
            Some(vec!["optimiser-service".to_string(), "--background".to_string()])
        );
    }
}
