//! CLI for the plget playlist fetcher.

mod commands;
mod control_socket;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plget_core::config::{self, PlgetConfig};
use plget_core::resume_db::ResumeDb;
use std::path::PathBuf;

use commands::{
    run_cleanup, run_download, run_init_config, run_retry, run_stats, run_status, run_stop,
    DownloadOptions,
};

/// Top-level CLI for plget.
#[derive(Debug, Parser)]
#[command(name = "plget")]
#[command(about = "plget: resumable playlist downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every entry of a playlist that is not already done.
    Download {
        /// Playlist URL.
        url: String,
        /// Continue the previous run: reset interrupted and failed items first.
        #[arg(long)]
        resume: bool,
        /// Number of items fetched concurrently (overrides config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Output directory (overrides config).
        #[arg(long, short = 'o', value_name = "DIR")]
        output: Option<PathBuf>,
        /// Maximum video height, e.g. 1080 (overrides config).
        #[arg(long)]
        quality: Option<String>,
        /// Container format, e.g. mp4 (overrides config).
        #[arg(long)]
        format: Option<String>,
        /// Write the session report as JSON to this path.
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Continue an interrupted playlist download (same as `download --resume`).
    Resume {
        url: String,
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Show known playlists, or the items of one playlist.
    Status {
        /// Playlist URL; omit to list all playlists.
        url: Option<String>,
    },

    /// Mark failed items of a playlist for another attempt.
    Retry {
        url: String,
        /// Only these item ids (repeatable). Default: every failed item.
        #[arg(long = "item", value_name = "ID")]
        items: Vec<String>,
    },

    /// Show download statistics across all playlists.
    Stats {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Delete finished sessions older than the retention window.
    Cleanup {
        /// Retention in days (default: config `session_retention_days`).
        #[arg(long, value_name = "N")]
        days: Option<u32>,
    },

    /// Ask a running `plget download` to stop after its in-flight items.
    Stop,

    /// Write the default config file if it does not exist.
    InitConfig,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let CliCommand::InitConfig = cli.command {
            return run_init_config();
        }
        if let CliCommand::Stop = cli.command {
            return run_stop().await;
        }

        let cfg = config::load_or_init().context("load config")?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = open_db(&cfg).await?;

        match cli.command {
            CliCommand::Download {
                url,
                resume,
                jobs,
                output,
                quality,
                format,
                report,
            } => {
                let opts = DownloadOptions {
                    resume,
                    jobs,
                    output,
                    quality,
                    format,
                    report,
                };
                run_download(db, cfg, &url, opts).await?;
            }
            CliCommand::Resume { url, jobs, report } => {
                let opts = DownloadOptions {
                    resume: true,
                    jobs,
                    report,
                    ..Default::default()
                };
                run_download(db, cfg, &url, opts).await?;
            }
            CliCommand::Status { url } => run_status(&db, url.as_deref()).await?,
            CliCommand::Retry { url, items } => run_retry(&db, &url, &items).await?,
            CliCommand::Stats { json } => run_stats(&db, json).await?,
            CliCommand::Cleanup { days } => {
                run_cleanup(&db, days.unwrap_or(cfg.session_retention_days)).await?
            }
            CliCommand::Stop | CliCommand::InitConfig => {}
        }

        Ok(())
    }
}

async fn open_db(cfg: &PlgetConfig) -> Result<ResumeDb> {
    let db = match &cfg.database_path {
        Some(path) => ResumeDb::open_at(path)
            .await
            .with_context(|| format!("open database {}", path.display()))?,
        None => ResumeDb::open_default().await.context("open database")?,
    };
    Ok(db)
}

#[cfg(test)]
mod tests;
