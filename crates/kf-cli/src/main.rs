//! keyfleet CLI
//!
//! Adds, removes and lists SSH authorized_keys entries on many hosts, some
//! of them reachable only through chains of jump hosts, and runs commands,
//! scripts, uploads and interactive logins over the same topology.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyfleet::output::{format_summary, print_error, print_info, print_warning};
use keyfleet::prompt::TerminalPrompter;
use keyfleet::reporter::TerminalReporter;
use kf_core::config::load_fleet_config;
use kf_core::{HostSpec, KeyList, Topology};
use kf_orchestrator::{Action, Orchestrator, RunOptions};
use kf_ssh::SshConnector;

const AFTER_HELP: &str = "\
Actions:
  list              show the authorized keys of every host
  add               add the keys from -K / -k
  remove            remove the keys from -K / -k
  addremove         add keys, remove those listed with a leading \"-\"
  hostname          print the remote host name
  ssh               open an interactive login
  cmd <command>     run a command
  script <file>     upload and run a shell script
  scp <file>        upload a file to the login directory

Host list format:
  one [user@]host[:port] per line, `#` comments;
  `gateway <host>` ... `end` wraps hosts reached through a jump host.";

#[derive(Parser)]
#[command(name = "keyfleet")]
#[command(author, version, about = "Distribute SSH authorized_keys across hosts behind jump hosts")]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Single host to work on ([user@]host[:port])
    #[arg(short = 'H', long, conflicts_with = "hostlist")]
    host: Option<String>,

    /// File listing hosts and gateways
    #[arg(short = 'f', long, value_name = "FILE")]
    hostlist: Option<PathBuf>,

    /// Reach every host through this gateway
    #[arg(short = 'G', long)]
    gateway: Option<String>,

    /// Single public key file
    #[arg(short = 'K', long, value_name = "FILE", conflicts_with = "keylist")]
    key: Option<PathBuf>,

    /// File listing public key files, optionally marked with + or -
    #[arg(short = 'k', long, value_name = "FILE")]
    keylist: Option<PathBuf>,

    /// Ask before each host
    #[arg(short, long)]
    interactive: bool,

    /// Remote authorized_keys path (overrides config)
    #[arg(short = 'a', long, value_name = "PATH")]
    authfile: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors and requested data
    #[arg(short, long)]
    quiet: bool,

    /// Action to run on every host
    action: String,

    /// Arguments of the action
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config =
        load_fleet_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let defaults = config.host_defaults();

    let action = Action::parse(&cli.action, &cli.args)?;

    let mut topology = match (&cli.host, &cli.hostlist) {
        (Some(host), _) => Topology::single(HostSpec::parse_with(host, &defaults)?),
        (None, Some(path)) => Topology::load(path, &defaults)
            .with_context(|| format!("Failed to load host list {}", path.display()))?,
        (None, None) => bail!("No hosts given: use -H <host> or -f <hostlist>"),
    };
    if let Some(gateway) = &cli.gateway {
        topology = topology.behind(HostSpec::parse_with(gateway, &defaults)?);
    }

    let keys = if action.needs_keys() {
        match (&cli.key, &cli.keylist) {
            (Some(key), _) => KeyList::single(key.clone()),
            (None, Some(path)) => KeyList::load(path)
                .with_context(|| format!("Failed to load keyfile list {}", path.display()))?,
            (None, None) => bail!(
                "Action {} needs keys: use -K <keyfile> or -k <keylist>",
                action.name()
            ),
        }
    } else {
        KeyList::default()
    };

    if topology.is_empty() {
        print_warning("No hosts to visit");
        return Ok(0);
    }

    let connector = SshConnector::new(&config);
    if connector.identity_count() == 0 && !config.use_agent {
        print_warning("No identity files loaded, only password authentication is possible");
    }

    let options = RunOptions {
        action,
        keys,
        authorized_keys: cli.authfile.unwrap_or_else(|| config.authorized_keys.clone()),
        interactive: cli.interactive,
    };
    let orchestrator = Orchestrator::new(
        connector,
        TerminalPrompter::new(),
        TerminalReporter::new(cli.quiet),
        options,
    );

    let summary = orchestrator.run(&topology).await;
    if !cli.quiet {
        print_info(&format_summary(&summary));
    }

    Ok(summary.exit_code() as u8)
}
