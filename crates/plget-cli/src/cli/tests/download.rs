//! Tests for download and resume.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

const URL: &str = "https://www.youtube.com/playlist?list=PL123";

#[test]
fn cli_parse_download_defaults() {
    match parse(&["plget", "download", URL]) {
        CliCommand::Download {
            url,
            resume,
            jobs,
            output,
            quality,
            format,
            report,
        } => {
            assert_eq!(url, URL);
            assert!(!resume);
            assert!(jobs.is_none());
            assert!(output.is_none());
            assert!(quality.is_none());
            assert!(format.is_none());
            assert!(report.is_none());
        }
        _ => panic!("expected Download"),
    }
}

#[test]
fn cli_parse_download_overrides() {
    match parse(&[
        "plget", "download", URL, "--resume", "--jobs", "4", "-o", "/tmp/out", "--quality",
        "720", "--format", "mkv", "--report", "r.json",
    ]) {
        CliCommand::Download {
            resume,
            jobs,
            output,
            quality,
            format,
            report,
            ..
        } => {
            assert!(resume);
            assert_eq!(jobs, Some(4));
            assert_eq!(output, Some(PathBuf::from("/tmp/out")));
            assert_eq!(quality.as_deref(), Some("720"));
            assert_eq!(format.as_deref(), Some("mkv"));
            assert_eq!(report, Some(PathBuf::from("r.json")));
        }
        _ => panic!("expected Download with overrides"),
    }
}

#[test]
fn cli_parse_download_requires_url() {
    assert!(Cli::try_parse_from(["plget", "download"]).is_err());
}

#[test]
fn cli_parse_download_rejects_non_numeric_jobs() {
    assert!(Cli::try_parse_from(["plget", "download", URL, "--jobs", "many"]).is_err());
}

#[test]
fn cli_parse_resume() {
    match parse(&["plget", "resume", URL, "--jobs", "2"]) {
        CliCommand::Resume { url, jobs, report } => {
            assert_eq!(url, URL);
            assert_eq!(jobs, Some(2));
            assert!(report.is_none());
        }
        _ => panic!("expected Resume"),
    }
}

#[tokio::test]
async fn forced_exit_cancels_the_running_session() {
    use plget_core::resume_db::{ResumeDb, SessionStatus};

    let dir = tempfile::tempdir().unwrap();
    let db = ResumeDb::open_at(dir.path().join("plget.db")).await.unwrap();
    let id = db
        .create_session(URL, 3, &serde_json::Value::Null)
        .await
        .unwrap();

    crate::cli::commands::cancel_abandoned_sessions(&db, URL).await;

    let session = db.get_session(&id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(session.completed_at.is_some());
}
