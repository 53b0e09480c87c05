use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use waypoint::app;
use waypoint::config::Config;
use waypoint::logging;
use waypoint::providers::storage::FsStore;
use waypoint::registry::Registry;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Guided workflows with ephemeral per-user sandbox sessions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator server
    Serve {
        /// Port to listen on (default: 7408)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Project registry tools
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Validate a project definition without storing it
    Validate {
        /// Path to a JSON project definition
        file: PathBuf,
    },

    /// Validate a project definition and upsert it into the registry
    Push {
        /// Path to a JSON project definition
        file: PathBuf,
    },

    /// Create an empty project registry
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let _logging = logging::init_logging(&config, cli.debug)?;

    match cli.command {
        Some(Commands::Serve { port }) => cmd_serve(config, port).await,
        Some(Commands::Project { command }) => match command {
            ProjectCommands::Validate { file } => cmd_project_validate(&file),
            ProjectCommands::Push { file } => cmd_project_push(&config, &file).await,
            ProjectCommands::Init => cmd_project_init(&config).await,
        },
        // No subcommand = run the server
        None => cmd_serve(config, None).await,
    }
}

async fn cmd_serve(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("Starting waypoint server...");
    println!("  Port:    {}", config.server.port);
    println!("  Storage: {}", config.storage_root().display());
    println!("  Endpoints:");
    println!("    GET  /api/v1/health          Health check");
    println!("    GET  /api/v1/status          Server status");
    println!("    GET  /api/v1/workflow/next   Advance a participant");
    println!("    POST /api/v1/sessions/start  Request a sandbox server");
    println!("    POST /api/v1/sessions/stop   Release a sandbox server");
    println!("    PUT  /api/v1/projects        Upsert a project definition");
    println!();

    app::run(config).await
}

fn registry_for(config: &Config) -> Registry {
    let store = Arc::new(FsStore::new(config.storage_root()));
    Registry::new(store, &config.storage.bucket)
}

fn read_definition(file: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))
}

fn cmd_project_validate(file: &Path) -> Result<()> {
    let definition = read_definition(file)?;
    let (project, warnings) = Registry::validate(&definition)?;

    println!("Project '{}' is valid", project.id);
    for warning in &warnings {
        println!("  warning: {warning}");
    }

    Ok(())
}

async fn cmd_project_push(config: &Config, file: &Path) -> Result<()> {
    let definition = read_definition(file)?;
    let (project, warnings) = registry_for(config).upsert(&definition).await?;

    println!("Stored project '{}'", project.id);
    for warning in &warnings {
        println!("  warning: {warning}");
    }

    Ok(())
}

async fn cmd_project_init(config: &Config) -> Result<()> {
    registry_for(config).init_empty().await?;
    println!(
        "Created empty project registry in bucket '{}'",
        config.storage.bucket
    );
    Ok(())
}
