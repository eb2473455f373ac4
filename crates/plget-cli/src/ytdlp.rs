//! Media fetcher backed by the external `yt-dlp` program.
//!
//! Extraction runs `yt-dlp --flat-playlist -J` and reads the JSON document it
//! prints. Fetching runs one `yt-dlp` per item with a machine-readable progress
//! template on stdout; stderr is kept so the last `ERROR:` line can become the
//! failure message the classifier sees.

use anyhow::{Context, Result};
use plget_core::fetcher::{
    FetchProgress, FetchRequest, MediaFetcher, PlaylistEntry, PlaylistInfo,
};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

const PROGRESS_PREFIX: &str = "plget-progress";

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

pub struct YtDlpFetcher {
    program: String,
}

impl YtDlpFetcher {
    /// Uses `yt-dlp` from PATH, or `$PLGET_YTDLP` when set.
    pub fn new() -> Self {
        let program = std::env::var("PLGET_YTDLP").unwrap_or_else(|_| "yt-dlp".to_string());
        Self { program }
    }

    fn fetch_args(request: &FetchRequest) -> Vec<String> {
        let template = format!(
            "download:{PROGRESS_PREFIX} %(progress.downloaded_bytes)s %(progress.total_bytes)s \
             %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s"
        );
        vec![
            "--newline".into(),
            "--no-playlist".into(),
            "--progress-template".into(),
            template,
            "-f".into(),
            format_selector(&request.quality),
            "--merge-output-format".into(),
            request.format.clone(),
            "-o".into(),
            // yt-dlp treats `%` in -o as a template marker.
            request.destination.to_string_lossy().replace('%', "%%"),
            request.source_url.clone(),
        ]
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaFetcher for YtDlpFetcher {
    fn extract_playlist(&self, url: &str) -> Result<PlaylistInfo> {
        let output = Command::new(&self.program)
            .args(["--flat-playlist", "-J", "--no-warnings", url])
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("run {}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{}", failure_message(&stderr, output.status));
        }
        parse_playlist(&output.stdout)
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(&str, FetchProgress),
    ) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(Self::fetch_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("run {}", self.program))?;

        // Drain stderr on its own thread so a chatty child cannot block on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if let Some(progress) = parse_progress_line(&line) {
                    on_progress(&request.job_id, progress);
                } else if !line.trim().is_empty() {
                    tracing::trace!(job_id = %request.job_id, "yt-dlp: {}", line);
                }
            }
        }

        let status = child.wait().context("wait for yt-dlp")?;
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            anyhow::bail!("{}", failure_message(&stderr, status));
        }
        Ok(())
    }
}

/// Best single file at or below `quality` pixels high, preferring streams with audio.
pub fn format_selector(quality: &str) -> String {
    format!("best[height<={quality}][acodec!=none]/best[height<={quality}]/best")
}

fn parse_playlist(stdout: &[u8]) -> Result<PlaylistInfo> {
    let flat: FlatPlaylist =
        serde_json::from_slice(stdout).context("parse yt-dlp playlist JSON")?;
    let entries = flat
        .entries
        .into_iter()
        .flatten()
        .map(|e| PlaylistEntry {
            source_url: match e.url {
                Some(u) if u.starts_with("http") => u,
                _ => format!("https://www.youtube.com/watch?v={}", e.id),
            },
            title: e.title.unwrap_or_else(|| "Unknown Title".to_string()),
            item_id: e.id,
        })
        .collect();
    Ok(PlaylistInfo {
        title: flat.title.unwrap_or_else(|| "Untitled playlist".to_string()),
        description: flat.description.filter(|d| !d.is_empty()),
        entries,
    })
}

/// Parses a line emitted by our progress template. Fields yt-dlp does not know
/// are printed as `NA` (or `None`) and map to `None`.
fn parse_progress_line(line: &str) -> Option<FetchProgress> {
    let mut fields = line.split_whitespace();
    if fields.next()? != PROGRESS_PREFIX {
        return None;
    }
    let mut next = || fields.next().and_then(|v| v.parse::<f64>().ok());
    let downloaded = next();
    let total = next();
    let estimate = next();
    let speed = next();
    let eta = next();
    Some(FetchProgress {
        downloaded_bytes: downloaded.unwrap_or(0.0).max(0.0) as u64,
        total_bytes: total.or(estimate).map(|t| t.max(0.0) as u64),
        speed,
        eta_secs: eta.map(|e| e.max(0.0) as u64),
    })
}

/// Last `ERROR:` line from stderr, else its last non-empty line, else the exit status.
fn failure_message(stderr: &str, status: std::process::ExitStatus) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| format!("yt-dlp exited with {status}"))
}
