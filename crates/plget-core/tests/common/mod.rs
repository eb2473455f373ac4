#![allow(dead_code)]

pub mod fake_fetcher;

use std::path::Path;

use plget_core::config::PlgetConfig;

pub const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PLintegration";

/// Config writing into `output_dir` with instant, deterministic retries.
pub fn test_config(output_dir: &Path, concurrency: usize) -> PlgetConfig {
    let mut cfg = PlgetConfig::default();
    cfg.output_dir = output_dir.to_path_buf();
    cfg.concurrency = concurrency;
    cfg.retry.base_delay_secs = 0.0;
    cfg.retry.max_delay_secs = 0;
    cfg.retry.jitter = false;
    cfg
}
