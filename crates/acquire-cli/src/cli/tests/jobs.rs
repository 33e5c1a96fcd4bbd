//! Tests for submit, start, resume, pause and cancel.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_submit_defaults() {
    match parse(&["acquire", "submit", "https://example.com/game.zip"]) {
        CliCommand::Submit {
            source,
            dest,
            sha256,
            chunk_size,
            name,
            start,
        } => {
            assert_eq!(source, "https://example.com/game.zip");
            assert!(dest.is_none());
            assert!(sha256.is_none());
            assert!(chunk_size.is_none());
            assert!(name.is_none());
            assert!(!start);
        }
        _ => panic!("expected Submit"),
    }
}

#[test]
fn cli_parse_submit_all_options() {
    let digest = "ab".repeat(32);
    match parse(&[
        "acquire",
        "submit",
        "https://drive.google.com/file/d/abc123/view",
        "-d",
        "/srv/games",
        "--sha256",
        &digest,
        "--chunk-size",
        "1048576",
        "--name",
        "sims.zip",
        "--start",
    ]) {
        CliCommand::Submit {
            dest,
            sha256,
            chunk_size,
            name,
            start,
            ..
        } => {
            assert_eq!(dest, Some(PathBuf::from("/srv/games")));
            assert_eq!(sha256.as_deref(), Some(digest.as_str()));
            assert_eq!(chunk_size, Some(1_048_576));
            assert_eq!(name.as_deref(), Some("sims.zip"));
            assert!(start);
        }
        _ => panic!("expected Submit"),
    }
}

#[test]
fn cli_parse_start_many() {
    match parse(&["acquire", "start", "1", "2", "3"]) {
        CliCommand::Start { ids } => assert_eq!(ids, vec![1, 2, 3]),
        _ => panic!("expected Start"),
    }
}

#[test]
fn cli_start_requires_an_id() {
    assert!(Cli::try_parse_from(["acquire", "start"]).is_err());
    assert!(Cli::try_parse_from(["acquire", "resume"]).is_err());
}

#[test]
fn cli_parse_resume() {
    match parse(&["acquire", "resume", "7"]) {
        CliCommand::Resume { ids } => assert_eq!(ids, vec![7]),
        _ => panic!("expected Resume"),
    }
}

#[test]
fn cli_parse_pause() {
    match parse(&["acquire", "pause", "42"]) {
        CliCommand::Pause { id } => assert_eq!(id, 42),
        _ => panic!("expected Pause"),
    }
}

#[test]
fn cli_parse_cancel() {
    match parse(&["acquire", "cancel", "5"]) {
        CliCommand::Cancel { id } => assert_eq!(id, 5),
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_rejects_non_numeric_id() {
    assert!(Cli::try_parse_from(["acquire", "pause", "abc"]).is_err());
}
