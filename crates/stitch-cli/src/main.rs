//! Stitch - keep one MCP server configured across AI coding tools
//!
//! Usage:
//!   stitch detect                        # Which tools are installed, and where
//!   stitch add api --transport http --url https://example.com/mcp
//!   stitch remove api --target codex
//!   stitch list | find <id> | validate

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stitch_core::bridge::{BridgeMapper, NpmPrefixInstaller};
use stitch_core::client::{TargetContext, TargetRegistry};
use stitch_core::config::{ConfigStore, StitchConfig};
use stitch_core::mcp::{ServerSpec, Transport};
use stitch_core::orchestration::{
    ConfigureOptions, DispatchMode, Orchestrator, ServerLocation, TargetOutcome, TargetServers,
    any_failed,
};
use stitch_core::store::UnifiedStore;

#[derive(Parser)]
#[command(name = "stitch")]
#[command(about = "Configure one MCP server across many AI coding tools", long_about = None)]
struct Cli {
    /// Path to stitch.toml (default: <config dir>/stitch/stitch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Call targets one at a time
    #[arg(long, global = true)]
    sequential: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which targets are installed and where their configuration lives
    Detect(TargetArgs),

    /// Add or update a server in every selected target
    Add(Box<AddArgs>),

    /// Remove a server from every selected target
    #[command(alias = "rm")]
    Remove {
        /// Server id
        id: String,

        #[command(flatten)]
        targets: TargetArgs,

        /// Undo successful removals when any target fails
        #[arg(long)]
        rollback: bool,
    },

    /// List server ids per target
    List(TargetArgs),

    /// Show which targets contain a server
    Find {
        /// Server id
        id: String,

        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Check that every server entry in each target is well formed
    Validate(TargetArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Args, Default)]
struct TargetArgs {
    /// Target id (repeatable). Default: detected targets for add/remove, all otherwise
    #[arg(long = "target", short = 't')]
    targets: Vec<String>,

    /// Skip a target id (repeatable)
    #[arg(long = "ignore-target")]
    ignore_targets: Vec<String>,
}

impl TargetArgs {
    fn selection(&self) -> Option<&[String]> {
        (!self.targets.is_empty()).then_some(self.targets.as_slice())
    }
}

#[derive(Args)]
struct AddArgs {
    /// Server id
    id: String,

    /// Transport (stdio, http, sse)
    #[arg(long, default_value = "stdio")]
    transport: String,

    /// Command to launch (stdio)
    #[arg(long)]
    command: Option<String>,

    /// Command argument (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Endpoint URL (http, sse)
    #[arg(long)]
    url: Option<String>,

    /// Environment variable KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_key_value)]
    env: Vec<(String, String)>,

    /// HTTP header NAME=VALUE (repeatable)
    #[arg(long = "header", value_parser = parse_key_value)]
    headers: Vec<(String, String)>,

    /// Bearer credential for remote servers
    #[arg(long)]
    bearer: Option<String>,

    /// Startup timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(flatten)]
    targets: TargetArgs,

    /// Undo successful writes when any target fails
    #[arg(long)]
    rollback: bool,

    /// Skip the timestamped backup of each target file
    #[arg(long)]
    no_backup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stitch=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let failed = run(cli).await?;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Run one command. Returns whether any target failed.
async fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    let format = cli.format;

    match cli.command {
        Commands::Detect(targets) => {
            let app = App::build(&config, &targets, cli.sequential)?;
            let outcomes = app.orchestrator.detect_all(targets.selection()).await;
            print_outcomes("detect", &outcomes, format)?;
            Ok(any_failed(&outcomes))
        }
        Commands::Add(args) => {
            let spec = build_spec(&args)?;
            let app = App::build(&config, &args.targets, cli.sequential)?;
            let options = ConfigureOptions {
                rollback_on_failure: args.rollback,
                backup: !args.no_backup,
            };
            let outcomes = app
                .orchestrator
                .configure_all(&spec, args.targets.selection(), options)
                .await?;
            app.record(&spec, &outcomes);
            print_outcomes("add", &outcomes, format)?;
            app.finish().await;
            Ok(any_failed(&outcomes))
        }
        Commands::Remove {
            id,
            targets,
            rollback,
        } => {
            let spec = ServerSpec::reference(id);
            let app = App::build(&config, &targets, cli.sequential)?;
            let outcomes = app
                .orchestrator
                .remove_all(&spec, targets.selection(), rollback)
                .await?;
            app.forget(&spec.id, &outcomes);
            print_outcomes("remove", &outcomes, format)?;
            app.finish().await;
            Ok(any_failed(&outcomes))
        }
        Commands::List(targets) => {
            let app = App::build(&config, &targets, cli.sequential)?;
            let listing = app.orchestrator.list_all(targets.selection()).await;
            print_listing(&listing, format)?;
            Ok(listing.iter().any(|entry| entry.error.is_some()))
        }
        Commands::Find { id, targets } => {
            let app = App::build(&config, &targets, cli.sequential)?;
            let locations = app
                .orchestrator
                .find_server_across_targets(&id, targets.selection())
                .await;
            print_locations(&id, &locations, format)?;
            Ok(false)
        }
        Commands::Validate(targets) => {
            let app = App::build(&config, &targets, cli.sequential)?;
            let outcomes = app.orchestrator.validate_all(targets.selection()).await;
            print_outcomes("validate", &outcomes, format)?;
            Ok(any_failed(&outcomes))
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<StitchConfig> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };
    store
        .load()
        .with_context(|| format!("Failed to load {}", store.config_path().display()))
}

/// Everything a command needs, built once per invocation.
struct App {
    orchestrator: Orchestrator,
    store: Option<UnifiedStore>,
}

impl App {
    fn build(config: &StitchConfig, targets: &TargetArgs, sequential: bool) -> Result<Self> {
        let ctx = TargetContext::with_defaults()?;
        let mut excluded = config.targets.disabled.clone();
        excluded.extend(targets.ignore_targets.iter().cloned());
        let registry = TargetRegistry::with_default_targets(&ctx).filter_excluding_targets(&excluded);

        let mut bridge = BridgeMapper::new(config.bridge_options());
        if let Some(dir) = config.bridge_install_dir() {
            bridge = bridge.with_installer(Arc::new(NpmPrefixInstaller::new(dir)));
        }

        let mut options = config.orchestrator_options();
        if sequential {
            options.dispatch = DispatchMode::Sequential;
        }

        Ok(Self {
            orchestrator: Orchestrator::new(registry, bridge, options),
            store: config.unified_store(),
        })
    }

    /// Give rollbacks of timed-out calls one more call budget before exiting.
    async fn finish(&self) {
        let budget = self.orchestrator.options().call_timeout;
        self.orchestrator.finish_late_rollbacks(budget).await;
    }

    fn record(&self, spec: &ServerSpec, outcomes: &[TargetOutcome]) {
        let Some(store) = &self.store else {
            return;
        };
        let succeeded = succeeded_targets(outcomes);
        if let Err(err) = store.record(spec, &succeeded) {
            warn!(store = %store.path().display(), error = %err, "could not update server store");
        }
    }

    fn forget(&self, id: &str, outcomes: &[TargetOutcome]) {
        let Some(store) = &self.store else {
            return;
        };
        let succeeded = succeeded_targets(outcomes);
        if succeeded.is_empty() {
            return;
        }
        if let Err(err) = store.forget(id, Some(&succeeded)) {
            warn!(store = %store.path().display(), error = %err, "could not update server store");
        }
    }
}

/// Targets that hold the result of the call, i.e. succeeded and were not rolled back.
fn succeeded_targets(outcomes: &[TargetOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter(|o| o.success && !o.rolled_back)
        .map(|o| o.target.clone())
        .collect()
}

fn build_spec(args: &AddArgs) -> Result<ServerSpec> {
    let transport: Transport = args.transport.parse()?;

    let mut spec = if transport.is_remote() {
        let url = args
            .url
            .as_deref()
            .with_context(|| format!("--url is required for {} servers", transport))?;
        ServerSpec::remote(&args.id, transport, url)
    } else {
        let command = args
            .command
            .as_deref()
            .context("--command is required for stdio servers")?;
        ServerSpec::stdio(&args.id, command, args.args.clone())
    };

    for (key, value) in &args.env {
        spec = spec.with_env(key, value);
    }
    for (name, value) in &args.headers {
        spec = spec.with_header(name, value);
    }
    if let Some(token) = &args.bearer {
        spec = spec.with_bearer(token);
    }
    if let Some(ms) = args.timeout_ms {
        spec = spec.with_timeout_ms(ms);
    }

    spec.validate()?;
    Ok(spec)
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", input)),
    }
}

// =============================================================================
// Output
// =============================================================================

fn print_outcomes(operation: &str, outcomes: &[TargetOutcome], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcomes)?);
        }
        OutputFormat::Table => {
            if outcomes.is_empty() {
                println!("No targets selected for {}.", operation);
                return Ok(());
            }
            println!("{:<16} {:<8} Path", "Target", "Status");
            println!("{}", "-".repeat(70));
            for outcome in outcomes {
                let path = outcome
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<16} {:<8} {}", outcome.target, status_label(outcome), path);
                if let Some(err) = &outcome.error {
                    println!("  ✗ {}", err);
                }
                if outcome.bridged {
                    println!("  • bridged to a local stdio process");
                }
                if let Some(backup) = &outcome.backup_path {
                    println!("  • backup: {}", backup.display());
                }
                if outcome.rolled_back {
                    println!("  • rolled back");
                }
            }
        }
    }
    Ok(())
}

fn status_label(outcome: &TargetOutcome) -> &'static str {
    match (outcome.success, outcome.found) {
        (false, _) => "FAILED",
        (true, Some(false)) => "missing",
        (true, Some(true)) => "found",
        (true, None) => "OK",
    }
}

fn print_listing(listing: &[TargetServers], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(listing)?),
        OutputFormat::Table => {
            for entry in listing {
                println!("{} ({}):", entry.target, entry.servers.len());
                if let Some(err) = &entry.error {
                    println!("  ✗ {}", err);
                }
                for server in &entry.servers {
                    println!("  {}", server);
                }
            }
        }
    }
    Ok(())
}

fn print_locations(id: &str, locations: &[ServerLocation], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(locations)?),
        OutputFormat::Table => {
            if locations.is_empty() {
                println!("Server '{}' is not configured in any target.", id);
            }
            for location in locations {
                let path = location
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                let transport = location
                    .spec
                    .as_ref()
                    .map(|spec| spec.transport.as_str())
                    .unwrap_or("?");
                println!("{:<16} {:<6} {}", location.target, transport, path);
            }
        }
    }
    Ok(())
}
