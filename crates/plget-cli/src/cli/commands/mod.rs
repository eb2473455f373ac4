//! CLI command handlers, one file per command.

mod cleanup;
mod download;
mod init_config;
mod retry;
mod stats;
mod status;
mod stop;

pub use cleanup::run_cleanup;
#[cfg(test)]
pub(crate) use download::cancel_abandoned_sessions;
pub use download::{run_download, DownloadOptions};
pub use init_config::run_init_config;
pub use retry::run_retry;
pub use stats::run_stats;
pub use status::run_status;
pub use stop::run_stop;
