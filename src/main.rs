//! Trellis CLI
//!
//! Drives the resource graph from a JSON manifest of cooked resources.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use trellis::config::{BuildConfig, CONFIG_FILE_NAME};
use trellis::manifest::Manifest;
use trellis::{Project, VERSION};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(author, version, about = "Resource graph, versioning and hot updates for web builds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Build configuration (defaults to ./trellis.json when present)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Version every resource and print its output path
    Build {
        /// Manifest of cooked resources
        manifest: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Simulate an edit and print the reload instruction
    Hot {
        /// Manifest of cooked resources
        manifest: PathBuf,

        /// The resource that changed
        id: String,

        /// Replacement content for the changed resource
        #[arg(long)]
        content: Option<String>,

        /// Print the instruction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency graph
    Graph {
        /// Manifest of cooked resources
        manifest: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    for warning in config.validate() {
        warn!("{}", warning);
    }

    match cli.command {
        Commands::Build { manifest, json } => run_build(config, &manifest, json).await,
        Commands::Hot {
            manifest,
            id,
            content,
            json,
        } => run_hot(config, &manifest, &id, content, json).await,
        Commands::Graph { manifest } => show_graph(config, &manifest),
    }
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trellis=warn")),
        1 => EnvFilter::new("trellis=info"),
        2 => EnvFilter::new("trellis=debug"),
        _ => EnvFilter::new("trellis=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BuildConfig> {
    match path {
        Some(path) => BuildConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None if Path::new(CONFIG_FILE_NAME).exists() => {
            BuildConfig::from_file(CONFIG_FILE_NAME).context("failed to load trellis.json")
        }
        None => Ok(BuildConfig::default()),
    }
}

/// Build a project from a manifest, cooking everything its entries reach
fn load_project(config: BuildConfig, manifest_path: &Path) -> anyhow::Result<Project> {
    let manifest = Manifest::from_file(manifest_path)
        .with_context(|| format!("failed to load manifest {}", manifest_path.display()))?;
    let project = Project::new(config)?;
    let cooked = project.cook_all(&manifest, &manifest.entries())?;
    info!(manifest = %manifest_path.display(), cooked, "loaded manifest");

    // Ctrl-C aborts any wait on a dependency that never arrives
    let token = project.engine().cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    Ok(project)
}

async fn run_build(config: BuildConfig, manifest: &Path, json: bool) -> anyhow::Result<()> {
    let out_dir = config.out_dir.clone();
    let project = load_project(config, manifest)?;
    let entries = project.build().await.context("build failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Trellis {} - {} output(s) in {}/", VERSION, entries.len(), out_dir);
    let width = entries.iter().map(|e| e.id.len()).max().unwrap_or(0);
    for entry in &entries {
        println!(
            "  {:width$}  {}  {}",
            entry.id.as_str(),
            entry.version.short(8),
            entry.output,
            width = width
        );
    }
    Ok(())
}

async fn run_hot(
    config: BuildConfig,
    manifest: &Path,
    id: &str,
    content: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let project = load_project(config, manifest)?;
    project.version_all().await.context("initial versioning failed")?;

    let Some(instruction) = project.on_resource_changed(id, content.map(String::into_bytes)) else {
        bail!("unknown resource {}", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&instruction)?);
    } else {
        println!("{}", instruction.describe());
    }
    Ok(())
}

fn show_graph(config: BuildConfig, manifest: &Path) -> anyhow::Result<()> {
    let project = load_project(config, manifest)?;
    let graph = project.graph().lock();

    for id in graph.ids() {
        let Some(node) = graph.get(&id) else {
            continue;
        };
        let mut flags = Vec::new();
        if node.hot_self_accept {
            flags.push("self-accept".to_string());
        }
        if node.hot_decline {
            flags.push("decline".to_string());
        }
        if !node.hot_accepted_dependencies.is_empty() {
            let accepted: Vec<&str> = node.hot_accepted_dependencies.iter().map(|d| d.as_str()).collect();
            flags.push(format!("accepts {}", accepted.join(", ")));
        }

        println!("{} ({})", node.id, node.category);
        if !flags.is_empty() {
            println!("  hot: {}", flags.join("; "));
        }
        for dep in node.dependencies() {
            println!("  -> {}", dep);
        }
        for dependent in node.dependents() {
            println!("  <- {}", dependent);
        }
    }
    Ok(())
}
