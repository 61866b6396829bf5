//! Shapegraph CLI
//!
//! # Usage
//!
//! ```bash
//! # Analyze a program with the balanced preset
//! cargo run --bin shapegraph --release -- analyze program.json
//!
//! # Pick a strategy and override single settings
//! cargo run --bin shapegraph -- analyze program.json --mode bottom-up-top-down --set pointer_width=4
//!
//! # Validate a program without analyzing it
//! cargo run --bin shapegraph -- check program.json
//!
//! # Print the effective configuration as YAML
//! cargo run --bin shapegraph -- config --preset thorough
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shapegraph_ir::config::{Preset, ShapeConfig, ShapeMode};
use shapegraph_ir::features::shape_analysis::ports::{ShapeAnalysisFactory, ShapeAnalysisPass};
use shapegraph_ir::Program;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shapegraph")]
#[command(about = "Unification-based shape analysis over a pointer IR", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Base preset (fast, balanced, thorough, custom)
    #[arg(short, long, default_value = "balanced")]
    preset: String,

    /// YAML configuration file (replaces the preset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interprocedural strategy
    #[arg(short, long)]
    mode: Option<String>,

    /// Single overrides, `key=value`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a program and print a JSON summary
    Analyze {
        /// Program file (JSON)
        program: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Include a snapshot of every final graph
        #[arg(long)]
        snapshots: bool,

        /// Write the summary here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a program
    Check {
        /// Program file (JSON)
        program: PathBuf,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("shapegraph_ir=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            program,
            config,
            snapshots,
            output,
        } => {
            let config = resolve_config(&config)?;
            let program = load_program(&program)?;
            let pass = ShapeAnalysisFactory::from_config(config)?;
            tracing::info!("running {}", pass.name());
            let result = pass.run(&program)?;
            let summary = serde_json::to_string_pretty(&result.summary(snapshots))?;
            match output {
                Some(path) => std::fs::write(&path, summary)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", summary),
            }
        }
        Commands::Check { program } => {
            let program = load_program(&program)?;
            let instructions: usize = program.functions.iter().map(|f| f.body.len()).sum();
            println!(
                "ok: {} functions, {} globals, {} instructions",
                program.functions.len(),
                program.globals.len(),
                instructions
            );
        }
        Commands::Config { config } => {
            print!("{}", resolve_config(&config)?.to_yaml()?);
        }
    }

    Ok(())
}

fn load_program(path: &Path) -> Result<Program> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Program::from_json(&text).with_context(|| format!("loading {}", path.display()))
}

fn resolve_config(args: &ConfigArgs) -> Result<ShapeConfig> {
    let mut config = match &args.config {
        Some(path) => ShapeConfig::from_yaml(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ShapeConfig::from_preset(Preset::parse(&args.preset)?),
    };

    if let Some(mode) = &args.mode {
        config.mode = ShapeMode::parse(mode)?;
        if config.mode == ShapeMode::ContextInsensitive {
            config.use_simulation_cloning = false;
        }
    }
    for entry in &args.overrides {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("override '{}' is not key=value", entry))?;
        config.set(key.trim(), value.trim())?;
    }

    shapegraph_ir::config::check(&config)?;
    Ok(config)
}
