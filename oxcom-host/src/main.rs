//! # oxcom-host
//!
//! A late-bound host for oxcom components.
//!
//! The host:
//! - Reads its configuration and initializes logging
//! - Registers the built-in type libraries and discovers installed ones
//! - Registers the test-server classes
//! - Calls members purely by name, converting JSON arguments with the
//!   type descriptors
//!
//! ## Configuration
//!
//! The host reads configuration from `$XDG_CONFIG_HOME/oxcom/config.toml`
//! and creates a documented default there when it is missing.
//!
//! ## Running
//!
//! ```bash
//! # Run the built-in round trips
//! cargo run --bin oxcom-host
//!
//! # Show libraries and classes
//! cargo run --bin oxcom-host -- list
//!
//! # Call a member by name
//! cargo run --bin oxcom-host -- call OxcomTestSrv.SafearrayParamTest InitArray '[1,1,1]'
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin oxcom-host
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oxcom_host::config::Config;
use oxcom_host::session::{CheckStatus, HostSession};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oxcom-host")]
#[command(about = "Late-bound host for oxcom components")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the record, array and device round trips (default)
    #[command(name = "selftest")]
    SelfTest,

    /// Show registered type libraries and classes
    List,

    /// Call a member by name
    Call {
        /// ProgID of the class to create
        progid: String,

        /// Member name, matched case-insensitively
        method: String,

        /// Arguments in declaration order, each one JSON
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn parse_json_args(args: &[String]) -> Result<Vec<Value>> {
    args.iter()
        .enumerate()
        .map(|(i, text)| {
            serde_json::from_str(text)
                .with_context(|| format!("Argument {} is not valid JSON: {}", i, text))
        })
        .collect()
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::SelfTest);

    // Configuration first, so its log level can seed the filter
    let (config, config_error) = match Config::load_default() {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting oxcom-host v{}", env!("CARGO_PKG_VERSION"));
    match config_error {
        None => info!("Loaded configuration from default path"),
        Some(e) => warn!("Failed to load config, using defaults: {:#}", e),
    }

    let session = HostSession::new(&config)?;

    match command {
        Command::List => print_json(&session.list()),
        Command::Call {
            progid,
            method,
            args,
        } => {
            let args = parse_json_args(&args)?;
            print_json(&session.call(&progid, &method, &args)?)
        }
        Command::SelfTest => {
            let checks = session.selftest();
            print_json(&checks)?;
            let failed = checks
                .iter()
                .filter(|c| c.status == CheckStatus::Failed)
                .count();
            if failed > 0 {
                anyhow::bail!("{} self-test check(s) failed", failed);
            }
            Ok(())
        }
    }
}
