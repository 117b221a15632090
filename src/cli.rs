//! # Command Line Interface
//!
//! Runs a single synthesis pass over YAML documents on disk and reports the
//! resulting snapshot.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::observability::{init_observability, log_config_info};
use crate::storage::FileSource;
use crate::xds::{
    AssemblerSettings, PassReport, SnapshotAssembler, SnapshotStore, SnapshotSummary,
};

#[derive(Parser)]
#[command(name = "routeforge")]
#[command(about = "Synthesize Envoy xDS resources for proxyless gRPC services")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one pass and print the resulting snapshot
    Render {
        #[command(flatten)]
        input: InputArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },

    /// Run one pass and exit non-zero if any routing spec failed
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Directory holding RoutingSpec documents
    #[arg(long)]
    pub specs: PathBuf,

    /// Directory holding Membership documents (defaults to --specs)
    #[arg(long)]
    pub membership: Option<PathBuf>,

    /// Only synthesize routing specs from this namespace
    #[arg(short, long)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Summary,
}

/// Snapshot and pass report printed by `render`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub snapshot: SnapshotSummary,
    pub report: PassReport,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    init_observability(&config.observability)?;
    log_config_info(&config);

    match cli.command {
        Commands::Render { input, output } => {
            let rendered = render(&input, &config).await?;
            match output {
                OutputFormat::Json => print_json(&rendered)?,
                OutputFormat::Summary => print_summary(&rendered),
            }
        }

        Commands::Check { input } => {
            let rendered = render(&input, &config).await?;
            if rendered.report.is_clean() {
                println!(
                    "All {} routing specs synthesized (version {})",
                    rendered.report.synthesized.len(),
                    rendered.report.version
                );
            } else {
                print_failures(&rendered.report);
                process::exit(1);
            }
        }
    }

    Ok(())
}

/// Run one pass over the documents named by `input`
pub async fn render(input: &InputArgs, config: &Config) -> anyhow::Result<RenderOutput> {
    let mut source = FileSource::new(&input.specs);
    if let Some(dir) = &input.membership {
        source = source.with_membership_dir(dir);
    }
    let namespace = input.namespace.as_deref().or(config.engine.namespace_scope());
    if let Some(namespace) = namespace {
        source = source.with_namespace(namespace);
    }

    let source = Arc::new(source);
    let store = Arc::new(SnapshotStore::new());
    let assembler = SnapshotAssembler::new(source.clone(), source, store.clone())
        .with_settings(AssemblerSettings::from(&config.engine));

    let report = assembler
        .run_pass(&CancellationToken::new())
        .await
        .with_context(|| format!("Synthesis pass over {} failed", input.specs.display()))?;

    Ok(RenderOutput { snapshot: store.current().summary(), report })
}

fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

fn print_summary(rendered: &RenderOutput) {
    let snapshot = &rendered.snapshot;
    println!("Snapshot version {} ({} routing specs)", snapshot.version, snapshot.specs.len());
    println!();
    println!("{:<20} {:<60}", "Type", "Name");
    println!("{}", "-".repeat(80));
    for (label, names) in &snapshot.resources {
        for name in names {
            println!("{:<20} {:<60}", label, name);
        }
    }
    println!();

    if !rendered.report.is_clean() {
        print_failures(&rendered.report);
    }
}

fn print_failures(report: &PassReport) {
    println!("{} routing spec(s) failed:", report.failures.len());
    for failure in &report.failures {
        let state = if failure.retained { "retained" } else { "not served" };
        println!("  {} [{}] {} ({})", failure.spec, failure.kind, failure.message, state);
    }
}
