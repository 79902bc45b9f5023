//! `bluecode` command line: init script verbs plus the hotplug entry point.
//!
//! Configuration precedence is defaults < `BLUECODE_*` environment < flags.

use std::path::PathBuf;

use bluecode_core::{
    ButtonEvent, Config, HotplugToggle, LifecycleController, LifecycleError, ServiceLifecycleState,
    ToggleError, ToggleOutcome, VolatileMounter,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::engine::CommandRandomizer;
use crate::mount::TmpfsMounter;
use crate::notify::StatusNotifier;
use crate::uci::UciStore;

#[derive(Debug, Parser)]
#[command(name = "bluecode", version, about = "RAM-only client database and hotplug Wi-Fi toggle")]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Directory holding the client database
    #[arg(long, global = true)]
    pub db_dir: Option<PathBuf>,

    /// Parent directory for the temporary staging mount
    #[arg(long, global = true)]
    pub staging_root: Option<PathBuf>,

    /// Skip identifier randomization after start
    #[arg(long, global = true)]
    pub no_randomize: bool,

    /// Do not require root (testing only)
    #[arg(long, global = true)]
    pub allow_unprivileged: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move the client database onto tmpfs
    Start,
    /// Securely erase the client database and detach tmpfs
    Stop,
    /// Print whether the database directory is RAM-backed
    Status,
    /// Handle a button event from /etc/hotplug.d/button
    Hotplug(HotplugArgs),
}

#[derive(Debug, Args)]
pub struct HotplugArgs {
    /// Button name (primary, reset, ...)
    #[arg(long, env = "BUTTON")]
    pub button: String,

    /// Button action (pressed or released)
    #[arg(long, env = "ACTION")]
    pub action: String,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Toggle(#[from] ToggleError),

    #[error("invalid button event: {0}")]
    Event(String),

    #[error("failed to encode status: {0}")]
    Output(#[from] serde_json::Error),
}

/// Output of the `status` verb.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: &'static str,
    pub db_path: PathBuf,
    pub db_present: bool,
}

impl Cli {
    /// Resolve configuration from the environment and flags.
    pub fn config(&self) -> Result<Config, CliError> {
        self.config_from(Config::from_env().map_err(CliError::Config)?)
    }

    fn config_from(&self, mut config: Config) -> Result<Config, CliError> {
        if let Some(dir) = &self.db_dir {
            config.db_dir = dir.clone();
        }
        if let Some(root) = &self.staging_root {
            config.staging_root = root.clone();
        }
        if self.no_randomize {
            config.randomize_on_start = false;
        }
        if self.allow_unprivileged {
            config.require_root = false;
        }
        config.validate().map_err(CliError::Config)?;
        Ok(config)
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false);

    // A second init (tests) is harmless
    let _ = tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init();
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    let config = cli.config()?;

    match &cli.command {
        Command::Start => {
            let engine = CommandRandomizer::new(config.engine_program.clone());
            LifecycleController::new(&config, TmpfsMounter::new())
                .with_randomizer(Box::new(engine))
                .start()?;
        }
        Command::Stop => LifecycleController::new(&config, TmpfsMounter::new()).stop()?,
        Command::Status => {
            let report = status_report(&config, TmpfsMounter::new())?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Hotplug(args) => {
            let outcome = hotplug(&config, args)?;
            info!(?outcome, "hotplug event handled");
        }
    }
    Ok(())
}

pub fn status_report<M: VolatileMounter>(config: &Config, mounter: M) -> Result<StatusReport, CliError> {
    let controller = LifecycleController::new(config, mounter);
    let state = match controller.state()? {
        ServiceLifecycleState::Running => "running",
        ServiceLifecycleState::Stopped => "stopped",
    };
    let db_path = controller.db_path();
    Ok(StatusReport {
        state,
        db_present: db_path.exists(),
        db_path,
    })
}

fn hotplug(config: &Config, args: &HotplugArgs) -> Result<ToggleOutcome, CliError> {
    let event = ButtonEvent::parse(&args.button, &args.action).map_err(CliError::Event)?;
    let notifier = StatusNotifier::new(&config.status_channel, "hotplug").with_syslog(&config.syslog_tag);
    let toggle = HotplugToggle::new(UciStore::new(), notifier).require_root(config.require_root);
    Ok(toggle.handle_event(&event)?)
}
