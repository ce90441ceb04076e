//! routix - incremental route and directory tree generator.
//!
//! Usage:
//!   routix build [DIR] --routes out/routes.js --tree out/tree.js
//!   routix inspect [DIR] --what tree
//!   routix --help

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use routix_build::{Builder, FsWriter, MemoryWriter};
use routix_codegen::{dir_tree, entry_list};
use routix_core::{BuildConfig, Hooks, PropsFormat, Snapshot};
use routix_scan::DirReader;

#[derive(Parser)]
#[command(
    name = "routix",
    version,
    about = "Generate route and directory tree modules from a pages directory",
    long_about = "routix reads a pages directory and generates JavaScript modules \
                  describing its files (routes) and directory structure (tree)."
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read the directory once and write the enabled outputs
    Build {
        #[command(flatten)]
        source: SourceArgs,

        /// Where to write the routes module
        #[arg(long)]
        routes: Option<PathBuf>,

        /// Where to write the tree module
        #[arg(long)]
        tree: Option<PathBuf>,

        /// Where to write the extras module
        #[arg(long)]
        extras: Option<PathBuf>,

        /// Inline the entry list into the tree module
        #[arg(long)]
        merged: bool,
    },

    /// Print the generated object graph as JSON
    Inspect {
        #[command(flatten)]
        source: SourceArgs,

        /// Which graph to print
        #[arg(short, long, default_value = "tree")]
        what: Graph,
    },
}

/// Options shared by every subcommand.
#[derive(Args)]
struct SourceArgs {
    /// Pages directory (defaults to the config's, or the current directory)
    dir: Option<PathBuf>,

    /// Load options from a TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recognized extensions (repeatable or comma separated)
    #[arg(short, long = "ext", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Glob patterns to skip (repeatable)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Prefix logical paths with `/`
    #[arg(long)]
    leading_slash: bool,

    /// Unwrap default exports in import thunks
    #[arg(long)]
    import_default: bool,

    /// Property name of the import thunk
    #[arg(long)]
    import_prop: Option<String>,

    /// Debounce window in milliseconds
    #[arg(long)]
    debounce: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Graph {
    Routes,
    #[default]
    Tree,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build {
            source,
            routes,
            tree,
            extras,
            merged,
        } => {
            let mut config = load_config(&source)?;
            if routes.is_some() {
                config.routes = routes;
            }
            if tree.is_some() {
                config.tree = tree;
            }
            if extras.is_some() {
                config.extras = extras;
            }
            config.merged |= merged;
            run_build(config).await?;
        }
        Command::Inspect { source, what } => {
            let config = load_config(&source)?;
            run_inspect(config, what).await?;
        }
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "warn,routix=info",
        1 => "info,routix=debug",
        _ => "info,routix=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .without_time()
                .with_target(false),
        )
        .with(filter)
        .init();
}

/// Merge the config file (if any) with command line overrides.
fn load_config(args: &SourceArgs) -> Result<BuildConfig> {
    let mut config = match &args.config {
        Some(path) => BuildConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => BuildConfig::new("."),
    };

    if let Some(dir) = &args.dir {
        config.dir = dir.clone();
    }
    if !args.extensions.is_empty() {
        config.extensions = args.extensions.clone();
    }
    config.ignore_patterns.extend(args.ignore.iter().cloned());
    config.leading_slash |= args.leading_slash;
    config.import_default |= args.import_default;
    if let Some(prop) = &args.import_prop {
        config.import_prop = prop.clone();
    }
    if let Some(ms) = args.debounce {
        config.debounce_ms = ms;
    }

    if config.import_prop.is_empty() {
        bail!("Import property cannot be empty");
    }
    Ok(config)
}

/// Read the directory and settle a builder over it.
async fn settle(builder: &Builder, config: &BuildConfig) -> Result<()> {
    let reader = DirReader::new(config).context("Invalid ignore pattern")?;
    let events = reader
        .read()
        .with_context(|| format!("Failed to read {}", config.dir.display()))?;

    debug!(count = events.len(), dir = %config.dir.display(), "Feeding directory events");
    for event in events {
        builder.add(event);
    }
    builder.start();
    builder.on_idle(None).await.context("Build failed")?;
    Ok(())
}

/// Read once and write the enabled outputs.
async fn run_build(config: BuildConfig) -> Result<()> {
    if !config.has_outputs() {
        bail!("No output enabled; pass --routes, --tree or --extras");
    }

    let start = Instant::now();
    let targets: Vec<PathBuf> = [&config.routes, &config.tree, &config.extras]
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    let builder = Builder::new(config.clone(), Hooks::default(), Arc::new(FsWriter));
    settle(&builder, &config).await?;
    let snapshot = builder.snapshot().await;

    print_summary(&config.dir, &snapshot, &targets, start);
    Ok(())
}

/// Print the entry list or tree of a directory without writing anything.
async fn run_inspect(config: BuildConfig, what: Graph) -> Result<()> {
    let builder = Builder::new(config.clone(), Hooks::default(), Arc::new(MemoryWriter::new()));
    settle(&builder, &config).await?;
    let snapshot = builder.snapshot().await;

    let json = match what {
        Graph::Routes => serde_json::to_string_pretty(&entry_list(&snapshot, &PropsFormat, true))?,
        Graph::Tree => serde_json::to_string_pretty(&dir_tree(&snapshot, &PropsFormat))?,
    };
    println!("{json}");
    Ok(())
}

fn print_summary(dir: &Path, snapshot: &Snapshot, targets: &[PathBuf], start: Instant) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", dir.display());
    println!(
        " {} files, {} directories",
        snapshot.files.len(),
        snapshot.dirs.len()
    );
    println!(" Built in {:.2}s", start.elapsed().as_secs_f64());
    println!("{}", "─".repeat(60));

    for target in targets {
        let size = std::fs::metadata(target).map(|m| m.len()).unwrap_or(0);
        println!("   {:<48} {:>10}", target.display(), format_size(size));
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
