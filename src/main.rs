pub mod catalog;
pub mod cli;
pub mod config;
pub mod http;
pub mod sync;
pub mod types;
pub mod vcs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::cli::DEFAULT_SERVER;
use crate::config::{Config, DEFAULT_MANIFEST_FILE, DEFAULT_MANIFEST_URL, DEFAULT_WORKERS};
use crate::sync::{CancelToken, RetryPolicy, SyncEngine};
use crate::vcs::{GitCli, git_available};

#[derive(Parser)]
#[command(
    name = "repomirror",
    version,
    about = "Mirror a catalog of git repositories and serve their releases over HTTP"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Address to listen on
        #[arg(long, env = "REPOMIRROR_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
    },

    /// Sync every repository in the manifest once and exit
    Sync {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Pull the manifest repository before syncing the catalog
        #[arg(long)]
        update_list: bool,
    },

    /// Show a running service's status
    Status {
        /// Base URL of the service
        #[arg(long, env = "REPOMIRROR_SERVER", default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// Check dependencies
    Doctor {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
}

/// Catalog settings shared by the commands that touch the catalog root.
#[derive(Args)]
struct CatalogArgs {
    /// Catalog root directory [default: <data dir>/repomirror/repos_data]
    #[arg(long, env = "REPOMIRROR_ROOT")]
    root: Option<PathBuf>,

    /// Manifest repository URL
    #[arg(long, env = "REPOMIRROR_MANIFEST_URL", default_value = DEFAULT_MANIFEST_URL)]
    manifest_url: String,

    /// Manifest file inside the manifest repository
    #[arg(long, env = "REPOMIRROR_MANIFEST_FILE", default_value = DEFAULT_MANIFEST_FILE)]
    manifest_file: String,

    /// Concurrent repository syncs
    #[arg(long, env = "REPOMIRROR_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Attempts per repository for transient failures
    #[arg(long, env = "REPOMIRROR_RETRIES", default_value_t = RetryPolicy::default().max_attempts)]
    retries: u32,

    /// Seconds to wait for a repository lock
    #[arg(long, env = "REPOMIRROR_LOCK_TIMEOUT", default_value_t = 300)]
    lock_timeout: u64,

    /// Only list files with these extensions as releases (comma separated)
    #[arg(long, env = "REPOMIRROR_ARTIFACT_EXTENSIONS", value_delimiter = ',')]
    artifact_extensions: Vec<String>,

    /// git executable
    #[arg(long, env = "REPOMIRROR_GIT", default_value = "git")]
    git: String,
}

impl CatalogArgs {
    fn into_engine(self) -> Result<SyncEngine, Box<dyn std::error::Error>> {
        let root = self.root.unwrap_or_else(Config::default_root);
        let defaults = RetryPolicy::default();

        let config = Config::new(root, self.manifest_url)
            .map_err(|e| format!("invalid manifest URL: {}", e))?
            .with_manifest_file(self.manifest_file)
            .with_workers(self.workers)
            .with_retry(RetryPolicy::new(
                self.retries,
                defaults.initial_backoff,
                defaults.max_backoff,
            ))
            .with_lock_timeout(Duration::from_secs(self.lock_timeout))
            .with_artifact_extensions(self.artifact_extensions);

        log::debug!("Using config: {:?}", config);
        Ok(SyncEngine::new(config, Arc::new(GitCli::with_git_path(self.git))))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { catalog, bind } => cmd_serve(catalog, &bind),
        Commands::Sync {
            catalog,
            update_list,
        } => cmd_sync(catalog, update_list),
        Commands::Status { server } => cli::print_status(&server),
        Commands::Doctor { catalog } => cmd_doctor(catalog),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Create the catalog root and clone the manifest repository if absent.
/// Failures are logged; the service starts regardless.
fn initialize_catalog(engine: &SyncEngine) {
    if let Err(e) = engine.store().ensure_root_exists() {
        log::error!("Failed to create catalog root: {}", e);
        return;
    }

    match engine.init_manifest_repo() {
        Some(result) if result.is_success() => log::info!("Manifest repository initialized"),
        Some(_) => log::warn!("Manifest repository unavailable; it will be retried on demand"),
        None => {}
    }
}

fn cmd_serve(catalog: CatalogArgs, bind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(catalog.into_engine()?);
    log::info!("Catalog root: {}", engine.config().root.display());
    initialize_catalog(&engine);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(bind).await?;
        http::serve(listener, engine).await
    })?;

    log::info!("Service stopped");
    Ok(())
}

fn cmd_sync(catalog: CatalogArgs, update_list: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = catalog.into_engine()?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("Interrupted; finishing in-flight syncs");
        handler_token.cancel();
    })?;

    if update_list {
        let result = engine.sync_manifest_repo();
        if !result.is_success() && !engine.store().manifest_repo_exists() {
            return Err("manifest repository could not be cloned".into());
        }
    }

    let batch = engine.sync_catalog(&cancel)?;
    cli::print_sync_results(&batch);

    if batch.cancelled {
        return Err("sync cancelled".into());
    }
    let failed = batch.failures();
    if failed > 0 {
        return Err(format!("{} of {} repositories failed", failed, batch.results.len()).into());
    }

    Ok(())
}

fn cmd_doctor(catalog: CatalogArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("repomirror system check\n");

    let git_ok = git_available();
    println!(
        "[{}] git: {}",
        if git_ok { "OK" } else { "FAIL" },
        if git_ok { "available" } else { "not found" }
    );

    let engine = catalog.into_engine()?;
    let store = engine.store();
    let root = store.paths().root().display().to_string();
    let probe = store.paths().root().join(".repomirror-probe");
    let root_ok = store.ensure_root_exists().is_ok()
        && std::fs::write(&probe, b"").is_ok()
        && std::fs::remove_file(&probe).is_ok();
    println!(
        "[{}] Catalog root: {}{}",
        if root_ok { "OK" } else { "FAIL" },
        root,
        if root_ok { "" } else { " (not writable)" }
    );

    let status = store.status();
    let manifest_state = match (&status.manifest_error, status.repos_json_exists) {
        (Some(error), _) => format!("unreadable ({})", error),
        (None, true) => format!("{} repositories", status.repos_count),
        (None, false) if status.main_repo_initialized => "cloned, no manifest file".to_string(),
        (None, false) => "not cloned yet".to_string(),
    };
    println!(
        "[{}] Manifest: {}",
        if status.manifest_error.is_none() { "INFO" } else { "WARN" },
        manifest_state
    );

    if !git_ok || !root_ok {
        std::process::exit(1);
    }

    Ok(())
}
