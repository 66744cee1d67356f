//! Example: Mount an in-memory DSS instance as a FUSE filesystem.
//!
//! Usage:
//!   cargo run -p dssfs-vfs --features fuse --example mount_memory -- <mountpoint> [options]
//!
//! Options:
//!   --stats      Print tree statistics every 2 seconds
//!   --writable   Accept writes; saved payloads are printed at exit
//!
//! Example:
//!   cargo run -p dssfs-vfs --features fuse --example mount_memory -- /tmp/dss --writable

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dssfs_api::{MemoryRecipeSource, ModificationTag, ProjectSnapshot, RecipeSnapshot};
use dssfs_vfs::{DssVfs, RecipeFs, VfsOptions, VfsStats};

/// CLI arguments for the mount_memory example.
struct CliArgs {
    mountpoint: PathBuf,
    show_stats: bool,
    writable: bool,
}

impl CliArgs {
    fn parse() -> Option<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program: &str = args.first().map(String::as_str).unwrap_or("mount_memory");

        let mut mountpoint: Option<PathBuf> = None;
        let mut show_stats: bool = false;
        let mut writable: bool = false;

        for arg in args.iter().skip(1) {
            match arg.as_str() {
                "--stats" => show_stats = true,
                "--writable" => writable = true,
                "-h" | "--help" => {
                    print_usage(program);
                    return None;
                }
                other if other.starts_with("--") => {
                    eprintln!("Unknown option: {}", other);
                    print_usage(program);
                    return None;
                }
                other => {
                    if mountpoint.is_none() {
                        mountpoint = Some(PathBuf::from(other));
                    } else {
                        eprintln!("Unexpected argument: {}", other);
                        return None;
                    }
                }
            }
        }

        if mountpoint.is_none() {
            print_usage(program);
        }

        Some(Self {
            mountpoint: mountpoint?,
            show_stats,
            writable,
        })
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <mountpoint> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --stats      Print tree statistics every 2 seconds");
    eprintln!("  --writable   Accept writes to recipe files");
}

/// Build a small instance with two projects and a mix of recipe types.
fn sample_source() -> MemoryRecipeSource {
    let source: MemoryRecipeSource = MemoryRecipeSource::new();

    let mut sales: ProjectSnapshot = ProjectSnapshot::new("SALES", "Sales forecasting");
    sales.creation_tag = ModificationTag::new("admin", 1_700_000_000_000);
    sales.version_tag = ModificationTag::new("analyst", 1_710_000_000_000);
    source.add_project(sales);
    source.add_project(ProjectSnapshot::new("CHURN", "Customer churn"));

    source.add_recipe(
        RecipeSnapshot::new("SALES", "compute_totals", "python"),
        "import dataiku\n\ndf = dataiku.Dataset(\"orders\").get_dataframe()\n",
    );
    source.add_recipe(
        RecipeSnapshot::new("SALES", "fit_model", "r"),
        "library(dataiku)\n",
    );
    source.add_recipe(RecipeSnapshot::new("SALES", "copy_orders", "sync"), "");
    source.add_recipe(
        RecipeSnapshot::new("CHURN", "score", "scala"),
        "object Score extends App\n",
    );
    source
}

/// Spawn a background thread that prints stats periodically.
///
/// # Arguments
/// * `fs` - Filesystem to query
/// * `running` - Atomic flag to control thread lifetime
/// * `interval_secs` - Interval between stats updates
fn spawn_stats_thread(
    fs: Arc<RecipeFs>,
    running: Arc<AtomicBool>,
    interval_secs: u64,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            let stats: VfsStats = fs.stats();
            println!(
                "[{:>5}s] projects={} files={} open={} retired={} inodes={}",
                stats.uptime_secs,
                stats.projects,
                stats.files,
                stats.open_files,
                stats.retired,
                stats.inodes
            );
            thread::sleep(Duration::from_secs(interval_secs));
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: CliArgs = match CliArgs::parse() {
        Some(a) => a,
        None => std::process::exit(1),
    };

    if !args.mountpoint.exists() {
        std::fs::create_dir_all(&args.mountpoint)?;
    }

    let runtime: tokio::runtime::Runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let source: Arc<MemoryRecipeSource> = Arc::new(sample_source());
    let options: VfsOptions = VfsOptions::default().with_allow_writes(args.writable);
    let fs: Arc<RecipeFs> = Arc::new(RecipeFs::new(source.clone(), options));

    let running: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));
    let r: Arc<AtomicBool> = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived SIGINT, unmounting...");
        r.store(false, Ordering::SeqCst);
    })?;

    println!(
        "Mounting {} in-memory DSS at: {}",
        if args.writable { "writable" } else { "read-only" },
        args.mountpoint.display()
    );
    let vfs: DssVfs = DssVfs::new(fs.clone())?;
    let session = dssfs_vfs::spawn_mount(vfs, &args.mountpoint)?;

    let stats_handle: Option<thread::JoinHandle<()>> = if args.show_stats {
        Some(spawn_stats_thread(fs.clone(), running.clone(), 2))
    } else {
        println!("Press Ctrl+C to unmount and exit.");
        None
    };

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    drop(session);

    if let Some(handle) = stats_handle {
        let _ = handle.join();
    }

    for saved in source.saves() {
        println!(
            "Saved {}/{} ({} bytes)",
            saved.project_key,
            saved.recipe_name,
            saved.content.len()
        );
    }
    println!("Unmounted successfully.");

    Ok(())
}
