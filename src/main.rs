// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipcook::config::PipcookConfig;
use pipcook::fetch::{BarReporter, FetchEngine, FetchError, NoProgress, ProgressReporter};
use pipcook::framework::{FrameworkError, FrameworkInstaller};
use pipcook::locator::FrameworkLocator;
use pipcook::pipeline::{resolve_scripts, PipelineError};
use pipcook::runtime::RuntimeInfo;
use pipcook::types::PipelineMeta;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Usage error - unsupported or malformed source url
    pub const USAGE: i32 = 64;
    /// Data error - invalid pipeline, descriptor or archive
    pub const DATA_ERR: i32 = 65;
    /// I/O error - network or file operation failed
    pub const IO_ERR: i32 = 74;
    /// Configuration error - invalid config file
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// Pipcook - fetch ML framework artifacts and inspect pipelines.
#[derive(Parser)]
#[command(name = "pipcook")]
#[command(version = VERSION)]
#[command(about = "Fetch pipcook framework artifacts and inspect pipelines.")]
#[command(long_about = "Pipcook framework and pipeline tooling\n\n\
    Show artifact url:   pipcook locate tfjs\n\
    Install framework:   pipcook install tfjs ./frameworks/tfjs\n\
    Fetch any source:    pipcook fetch https://example.com/data.zip ./data\n\
    Check a pipeline:    pipcook pipeline ./pipeline.json\n\
    Runtime facts:       pipcook runtime")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Quiet mode: no progress bar
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the mirror url of a framework for this runtime
    ///
    /// Examples:
    ///   pipcook locate tfjs
    ///   pipcook locate tfjs --mirror http://localhost:8080/framework/
    Locate {
        /// Framework name
        name: String,
        /// Mirror base url (defaults to the configured mirror)
        #[arg(short, long)]
        mirror: Option<String>,
    },

    /// Fetch a file:// or http(s):// source into a directory
    ///
    /// Zip sources are extracted, everything else is copied or downloaded as-is.
    ///
    /// Examples:
    ///   pipcook fetch https://example.com/mnist.zip ./data/mnist
    ///   pipcook fetch file:///opt/datasets/cifar ./data/cifar
    Fetch {
        /// Source url
        url: String,
        /// Target path
        dir: PathBuf,
    },

    /// Install a framework and print its descriptor
    ///
    /// Examples:
    ///   pipcook install tfjs ./frameworks/tfjs
    ///   pipcook install tfjs ./fw --source file:///tmp/tfjs-linux-x64-v8.zip
    Install {
        /// Framework name
        name: String,
        /// Install directory
        dir: PathBuf,
        /// Mirror base url (defaults to the configured mirror)
        #[arg(short, long)]
        mirror: Option<String>,
        /// Install from this url instead of the mirror
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Validate a pipeline file and print its resolved stages
    ///
    /// Examples:
    ///   pipcook pipeline ./pipeline.json
    ///   pipcook pipeline ./pipeline.json --scripts ./scripts
    Pipeline {
        /// Pipeline definition (JSON)
        file: PathBuf,
        /// Directory scripts are placed in (default: next to the pipeline file)
        #[arg(long)]
        scripts: Option<PathBuf>,
    },

    /// Print the detected runtime facts
    Runtime,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "pipcook=debug" } else { "pipcook=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_engine(config: &PipcookConfig, quiet: bool) -> FetchEngine {
    let progress: Arc<dyn ProgressReporter> = if quiet || !config.show_progress {
        Arc::new(NoProgress)
    } else {
        Arc::new(BarReporter::default())
    };
    FetchEngine::new(&config.scratch_dir).with_progress(progress)
}

fn build_locator(config: &PipcookConfig, mirror: Option<&str>) -> Result<FrameworkLocator> {
    let mirror = mirror.unwrap_or(config.mirror.as_str());
    FrameworkLocator::parse(mirror).with_context(|| format!("Invalid mirror url: {mirror}"))
}

async fn handle_fetch(config: &PipcookConfig, quiet: bool, url: &str, dir: &Path) -> Result<()> {
    let engine = build_engine(config, quiet);
    let source = engine.acquire(url, dir).await?;
    println!(
        "{} {} {} {}",
        "[OK]".green(),
        url,
        if source.is_archive() { "extracted to" } else { "saved to" },
        dir.display()
    );
    Ok(())
}

async fn handle_install(
    config: &PipcookConfig,
    quiet: bool,
    name: &str,
    dir: &Path,
    mirror: Option<&str>,
    source: Option<&str>,
) -> Result<()> {
    let installer = FrameworkInstaller::new(
        build_locator(config, mirror)?,
        build_engine(config, quiet),
        RuntimeInfo::detect(),
    );

    let framework = match source {
        Some(source) => installer.install_from(source, dir).await?,
        None => installer.install(name, dir).await?,
    };

    if framework.name != name {
        eprintln!(
            "{} Installed framework is named `{}`, expected `{}`",
            "[!]".yellow(),
            framework.name,
            name
        );
    }
    println!("{}", serde_json::to_string_pretty(&framework)?);
    eprintln!(
        "{} {}@{} installed to {}",
        "[OK]".green(),
        framework.name,
        framework.version,
        dir.display()
    );
    Ok(())
}

fn handle_pipeline(file: &Path, scripts: Option<PathBuf>) -> Result<()> {
    let meta = PipelineMeta::load(file)?;
    meta.validate()?;

    let scripts_root = scripts.unwrap_or_else(|| {
        file.parent()
            .map(|p| p.join("scripts"))
            .unwrap_or_else(|| PathBuf::from("scripts"))
    });
    let config = resolve_scripts(&meta, &scripts_root)?;

    println!("{} {} (spec {})", "Pipeline".bold(), file.display(), meta.spec_version);
    if config.data_source.is_none() {
        println!("  {:<11} {}", "query".dimmed(), meta.data_source);
    }
    for script in config.stages() {
        println!(
            "  {:<11} {} -> {}",
            script.script_type.to_string().cyan(),
            script.name,
            script.path.display()
        );
    }
    for artifact in &meta.artifacts {
        println!("  {:<11} {}", "artifact".cyan(), artifact.processor);
    }
    println!("{} Pipeline is valid", "[OK]".green());
    Ok(())
}

fn handle_runtime() -> Result<()> {
    let runtime = RuntimeInfo::detect();
    println!("{}", serde_json::to_string_pretty(&runtime)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = PipcookConfig::load().context("Failed to load config")?;

    match cli.command {
        Commands::Locate { name, mirror } => {
            let locator = build_locator(&config, mirror.as_deref())?;
            let url = locator.locate(&name, &RuntimeInfo::detect())?;
            println!("{url}");
        }
        Commands::Fetch { url, dir } => handle_fetch(&config, cli.quiet, &url, &dir).await?,
        Commands::Install {
            name,
            dir,
            mirror,
            source,
        } => {
            handle_install(
                &config,
                cli.quiet,
                &name,
                &dir,
                mirror.as_deref(),
                source.as_deref(),
            )
            .await?
        }
        Commands::Pipeline { file, scripts } => handle_pipeline(&file, scripts)?,
        Commands::Runtime => handle_runtime()?,
    }
    Ok(())
}

fn fetch_exit_code(err: &FetchError) -> i32 {
    match err {
        e if e.is_invalid_source() => USAGE,
        FetchError::Extract(_) => DATA_ERR,
        _ => IO_ERR,
    }
}

/// Map an error chain to a sysexits code.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<pipcook::ConfigError>() {
            return CONFIG;
        }
        if let Some(e) = cause.downcast_ref::<FetchError>() {
            return fetch_exit_code(e);
        }
        if let Some(e) = cause.downcast_ref::<FrameworkError>() {
            return match e {
                FrameworkError::Fetch(e) => fetch_exit_code(e),
                FrameworkError::Io { .. } => IO_ERR,
                FrameworkError::Parse { .. } | FrameworkError::Incompatible { .. } => DATA_ERR,
            };
        }
        if let Some(e) = cause.downcast_ref::<PipelineError>() {
            return match e {
                PipelineError::Io { .. } => IO_ERR,
                _ => DATA_ERR,
            };
        }
    }
    ERROR
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "[X]".red(), e);
        std::process::exit(exit_code(&e));
    }
    std::process::exit(SUCCESS);
}
