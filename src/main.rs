use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loadscope::config::{Config, API_KEY_ENV};
use loadscope::pipeline::PipelineSettings;
use loadscope::reasoning::LlmReasoner;
use loadscope::service::{ProjectService, ServiceSettings};
use loadscope::store::LocalStore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "loadscope",
    about = "Find and correlate performance issues across a load-testing project",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the project store
    #[arg(long, global = true, default_value = ".loadscope")]
    store: PathBuf,

    /// Model to use (overrides the config file)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Per-request timeout for the reasoning service, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload every readable file under DIR, process it and print the report
    Analyze {
        /// Directory with the project's code, test plans and configuration
        dir: PathBuf,
    },

    /// Print the report for a stored project
    Results {
        project_id: Uuid,
    },

    /// List stored projects, newest first
    Projects,

    /// Show whether the reasoning service is configured
    Health,

    /// Save settings to the config file (global --model/--timeout included)
    Configure {
        /// API key for the reasoning service
        #[arg(long)]
        api_key: Option<String>,

        /// OpenAI-compatible chat completions URL
        #[arg(long)]
        api_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON output.
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load();
    if let Some(model) = cli.model.clone() {
        config.model = model;
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = timeout;
    }

    if let Commands::Configure { api_key, api_url } = cli.command {
        if let Some(key) = api_key {
            config.api_key = Some(key);
        }
        if let Some(url) = api_url {
            config.api_url = url;
        }
        config.validate().map_err(anyhow::Error::msg)?;
        config.save().map_err(anyhow::Error::msg)?;
        eprintln!("Saved settings to {}", Config::config_location());
        return Ok(());
    }

    config.validate().map_err(anyhow::Error::msg)?;
    let service = build_service(&cli.store, &config)?;

    match cli.command {
        Commands::Analyze { dir } => {
            if !config.has_api_key() {
                anyhow::bail!(
                    "No API key configured. Set {} or run 'loadscope configure --api-key <KEY>'",
                    API_KEY_ENV
                );
            }
            analyze_dir(&service, &dir, config.max_upload_mb).await?;
        }
        Commands::Results { project_id } => {
            print_json(&service.results(project_id)?)?;
        }
        Commands::Projects => {
            print_json(&service.list_projects()?)?;
        }
        Commands::Health => {
            print_json(&service.health())?;
        }
        Commands::Configure { .. } => {}
    }

    Ok(())
}

fn build_service(store_dir: &Path, config: &Config) -> Result<ProjectService> {
    let store = LocalStore::open(store_dir)
        .with_context(|| format!("Failed to open store at {}", store_dir.display()))?;
    let reasoner = LlmReasoner::from_config(config).context("Failed to build the API client")?;
    Ok(ProjectService::new(
        Arc::new(store),
        Arc::new(reasoner),
        ServiceSettings {
            max_upload_mb: config.max_upload_mb,
            pipeline: PipelineSettings::from_config(config),
        },
    ))
}

async fn analyze_dir(service: &ProjectService, dir: &Path, max_upload_mb: u64) -> Result<()> {
    let files = collect_files(dir, max_upload_mb)
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    if files.is_empty() {
        anyhow::bail!("No readable text files found in {}", dir.display());
    }

    let project = service.initialize(files.len())?;
    eprintln!("Project {} ({} files)", project.id, files.len());

    let mut started = false;
    for (name, content) in files {
        match service.upload_file(project.id, &name, content, None) {
            Ok(receipt) => started |= receipt.processing_started,
            Err(err) => tracing::warn!(file = %name, "upload rejected: {}", err),
        }
    }
    // Rejected uploads leave the project short of its declared count.
    if !started {
        service.start_processing(project.id)?;
    }

    service.wait_for(project.id).await;
    print_json(&service.results(project.id)?)
}

/// Readable UTF-8 files under `root`, named by their relative path.
fn collect_files(root: &Path, max_upload_mb: u64) -> Result<Vec<(String, String)>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let limit = max_upload_mb.saturating_mul(1024 * 1024);

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_path(e.path()))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() > 0 && meta.len() <= limit => {}
            _ => {
                tracing::debug!(path = %path.display(), "skipping empty or oversized file");
                continue;
            }
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(path = %path.display(), "skipping unreadable file: {}", err);
                continue;
            }
        };
        let rel = path.strip_prefix(root).unwrap_or(path);
        let name = rel.to_string_lossy().replace(['/', '\\'], "_");
        files.push((name, content));
    }
    Ok(files)
}

fn is_ignored_path(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ignored = [
        "target",
        "node_modules",
        ".git",
        ".svn",
        ".hg",
        "dist",
        "build",
        "__pycache__",
        ".pytest_cache",
        "venv",
        ".venv",
        ".idea",
        ".vscode",
        ".loadscope",
    ];

    ignored.contains(&name) || name.starts_with('.')
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
