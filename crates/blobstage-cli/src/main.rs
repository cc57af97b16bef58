// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod commands;
mod output;
mod progress;
mod store;

use anyhow::{Context, Result};
use blobstage_config::{Config, ConfigLoader};
use blobstage_observability::{init_tracing_with_config, LogConfig};
use clap::{Parser, Subcommand};
use commands::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blobstage")]
#[command(version, about = "Chunked parallel uploads to block object stores")]
#[command(
    long_about = "blobstage uploads files as independently staged blocks, at most --concurrency at a time,
and commits them as one object. Memory use stays bounded by block size x concurrency."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Colored output (always|auto|never)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Upload(UploadCmd),

    /// Download a committed object
    Download(DownloadCmd),

    /// Show object metadata
    Stat(StatCmd),
}

/// Settings shared by every command
pub struct CliContext {
    pub config: Config,
    pub quiet: bool,
}

async fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let loader = ConfigLoader::new();
    let config = match path {
        Some(path) => loader
            .load_with_overrides(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => loader
            .load_defaults_with_overrides()
            .context("Invalid configuration from environment")?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.color.as_str() {
        "never" => console::set_colors_enabled(false),
        "always" => console::set_colors_enabled(true),
        "auto" => {}
        _ => {
            output::error(&format!("Invalid color option: {}", cli.color));
            std::process::exit(2);
        }
    }

    let config = load_config(cli.config.as_ref()).await?;

    if !cli.quiet {
        let level = if cli.verbose {
            "debug"
        } else {
            config.observability.log_level.as_str()
        };
        if let Ok(log_config) = LogConfig::from_settings(level, &config.observability.log_format) {
            // Ignore errors if already initialized
            init_tracing_with_config(log_config).ok();
        }
    }

    let ctx = CliContext {
        config,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Upload(cmd) => cmd.execute(&ctx).await,
        Commands::Download(cmd) => cmd.execute(&ctx).await,
        Commands::Stat(cmd) => cmd.execute(&ctx).await,
    };

    if let Err(err) = result {
        output::error(&format!("{:#}", err));
        std::process::exit(1);
    }
    Ok(())
}
