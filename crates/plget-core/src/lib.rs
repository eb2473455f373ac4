pub mod config;
pub mod logging;

pub mod breaker;
pub mod control;
pub mod fetcher;
pub mod identity;
pub mod naming;
pub mod progress;
pub mod resume_db;
pub mod retry;
pub mod scheduler;
