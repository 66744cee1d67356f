//! Mount Dataiku DSS projects as directories of recipe files.
//!
//! Usage:
//!   dssfs <mountpoint> [--instance NAME] [--config PATH] [--allow-writes]
//!
//! Connection details come from `~/.dataiku/config.json` unless `--config`
//! names another file. The mount blocks until unmounted (`fusermount -u`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dssfs_api::{ClientOptions, DssClient, DssConfig, InstanceParams};
use dssfs_vfs::{DssVfs, RecipeFs, VfsOptions, VfsStats};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Mount Dataiku DSS projects as a directory of recipe files
#[derive(Parser, Debug)]
#[command(name = "dssfs", version, about)]
struct Args {
    /// Existing directory to mount on
    mountpoint: PathBuf,

    /// Config file to read instead of ~/.dataiku/config.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Instance to connect to (defaults to the config's default_instance)
    #[arg(short, long)]
    instance: Option<String>,

    /// Save edits back to DSS (mounted read-only otherwise)
    #[arg(long)]
    allow_writes: bool,

    /// Seconds a project or recipe listing is reused by lookups
    #[arg(long, default_value_t = 600)]
    cache_ttl: u64,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level: &str = if verbose { "debug" } else { "info" };
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Pick the instance named on the command line, or the config default.
fn select_instance(config: &DssConfig, name: Option<&str>) -> Result<InstanceParams> {
    match name {
        Some(name) => config
            .instance(name)
            .cloned()
            .ok_or_else(|| anyhow!("instance {:?} is not defined in the config", name)),
        None => config
            .default_instance()
            .cloned()
            .ok_or_else(|| anyhow!("no default instance specified in the config")),
    }
}

fn main() -> Result<()> {
    let args: Args = Args::parse();
    init_tracing(args.verbose);

    let config: DssConfig = match &args.config {
        Some(path) => DssConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DssConfig::load_user().context("Failed to load user config")?,
    };
    let instance: InstanceParams = select_instance(&config, args.instance.as_deref())?;

    let client_options: ClientOptions =
        ClientOptions::default().with_timeout(Duration::from_secs(args.timeout));
    let client: DssClient = DssClient::connect(&instance.url, &instance.api_key, &client_options)
        .with_context(|| format!("Failed to connect to DSS at {}", instance.url))?;
    info!("Connected to DSS: {}", client.base_url());

    let options: VfsOptions = VfsOptions::default()
        .with_cache_ttl(Duration::from_secs(args.cache_ttl))
        .with_allow_writes(args.allow_writes);
    let fs: Arc<RecipeFs> = Arc::new(RecipeFs::new(Arc::new(client), options));

    let runtime: tokio::runtime::Runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start worker runtime")?;
    let _guard = runtime.enter();

    let vfs: DssVfs = DssVfs::new(fs.clone())?;
    info!(
        "Mounting at {} ({})",
        args.mountpoint.display(),
        if args.allow_writes { "read-write" } else { "read-only" }
    );
    dssfs_vfs::mount(vfs, &args.mountpoint)
        .with_context(|| format!("Failed to mount at {}", args.mountpoint.display()))?;

    let stats: VfsStats = fs.stats();
    info!(
        "Unmounted: {} projects, {} files, {} still open, up {}s",
        stats.projects, stats.files, stats.open_files, stats.uptime_secs
    );
    Ok(())
}
