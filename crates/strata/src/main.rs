use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata_core::config::Config;
use strata_core::discovery::{CancelToken, DiscoveryManager, RunOptions};
use strata_core::log::Phase;
use strata_core::profile::CodebaseProfile;
use strata_core::provider::ProviderRegistry;

use strata_csharp::CSharpProvider;
use strata_go::GoProvider;
use strata_python::PythonProvider;
use strata_report::{diff, json, text};
use strata_rust::RustProvider;
use strata_typescript::TypeScriptProvider;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Profile a brownfield repository: zones, patterns, conventions, violations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run discovery against a repository and write a profile document
    Discover {
        /// Path to the repository root
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Analyze a single zone by name
        #[arg(long)]
        zone: Option<String>,
        /// Detect and list zones only, no analysis
        #[arg(long)]
        list_zones: bool,
        /// Run a single analysis phase
        #[arg(long, value_name = "NAME")]
        phase: Option<String>,
        /// Curation-preserving incremental run (reuses the parse cache)
        #[arg(long)]
        update: bool,
        /// Report what changed versus the previous profile, without writing
        #[arg(long)]
        diff: bool,
        /// Emit JSON instead of the text report
        #[arg(long)]
        json: bool,
        /// Run everything but write nothing
        #[arg(long)]
        dry_run: bool,
        /// Config file path (defaults to .strata.toml in the repository root)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output directory (defaults to <root>/.strata)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Create a default .strata.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Discover {
            path,
            zone,
            list_zones,
            phase,
            update,
            diff,
            json,
            dry_run,
            config,
            output,
        } => cmd_discover(DiscoverArgs {
            path,
            zone,
            list_zones,
            phase,
            update,
            diff,
            json,
            dry_run,
            config,
            output,
        }),
        Commands::Init { force } => cmd_init(force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

struct DiscoverArgs {
    path: PathBuf,
    zone: Option<String>,
    list_zones: bool,
    phase: Option<String>,
    update: bool,
    diff: bool,
    json: bool,
    dry_run: bool,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn cmd_discover(args: DiscoverArgs) -> Result<()> {
    let config = load_config(&args.path, args.config.as_deref())?;
    let manager = DiscoveryManager::new(build_registry()?, config);
    let out_dir = args
        .output
        .clone()
        .unwrap_or_else(|| args.path.join(".strata"));

    if args.list_zones {
        let (zones, _log) = manager.list_zones(&args.path)?;
        if args.json {
            println!("{}", json::format_zones(&zones, false));
        } else {
            print!("{}", text::format_zone_list(&zones));
        }
        return Ok(());
    }

    let phase_filter = args
        .phase
        .as_deref()
        .map(|name| name.parse::<Phase>())
        .transpose()?;

    let options = RunOptions {
        zone_filter: args.zone.clone(),
        phase_filter,
        incremental: args.update,
        // --diff compares without touching the previous profile
        dry_run: args.dry_run || args.diff,
        allow_partial: false,
    };

    if args.diff {
        let prior = CodebaseProfile::load(&out_dir)?
            .context("no previous profile to diff against; run `strata discover` first")?;
        let outcome = manager.run(&args.path, &out_dir, &options, &CancelToken::new())?;
        print!("{}", diff::format_diff(&prior, &outcome.profile));
        return Ok(());
    }

    let outcome = manager.run(&args.path, &out_dir, &options, &CancelToken::new())?;
    if args.json {
        println!("{}", json::format_profile(&outcome.profile, false));
    } else {
        print!("{}", text::format_report(&outcome.profile, &outcome.log));
    }
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(".strata.toml");
    if target.exists() && !force {
        anyhow::bail!(".strata.toml already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())?;
    println!("Created .strata.toml with default configuration.");
    Ok(())
}

fn load_config(repo_path: &Path, config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(p) => Config::load(p),
        None => Config::load_or_default(repo_path),
    }
}

fn build_registry() -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(
        CSharpProvider::new().context("failed to initialize C# provider")?,
    ));
    registry.register(Box::new(
        RustProvider::new().context("failed to initialize Rust provider")?,
    ));
    registry.register(Box::new(
        GoProvider::new().context("failed to initialize Go provider")?,
    ));
    registry.register(Box::new(
        PythonProvider::new().context("failed to initialize Python provider")?,
    ));
    registry.register(Box::new(
        TypeScriptProvider::new().context("failed to initialize TypeScript provider")?,
    ));
    Ok(registry)
}
