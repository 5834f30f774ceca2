//! Tests for crawl, resume, delete and status.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_crawl_defaults() {
    match parse(&["harvest", "crawl", "https://example.org/?f_search=a"]) {
        CliCommand::Crawl {
            url,
            max_pages,
            checkpoint,
            enqueue,
            archive,
            password,
        } => {
            assert_eq!(url, "https://example.org/?f_search=a");
            assert!(max_pages.is_none());
            assert!(checkpoint.is_none());
            assert!(!enqueue);
            assert!(!archive);
            assert!(password.is_none());
        }
        _ => panic!("expected Crawl"),
    }
}

#[test]
fn cli_parse_crawl_with_options() {
    match parse(&[
        "harvest",
        "crawl",
        "https://example.org/",
        "--max-pages",
        "3",
        "--checkpoint",
        "/tmp/tasks.json",
        "--enqueue",
        "--archive",
        "--password",
        "secret",
    ]) {
        CliCommand::Crawl {
            max_pages,
            checkpoint,
            enqueue,
            archive,
            password,
            ..
        } => {
            assert_eq!(max_pages, Some(3));
            assert_eq!(checkpoint, Some(PathBuf::from("/tmp/tasks.json")));
            assert!(enqueue);
            assert!(archive);
            assert_eq!(password.as_deref(), Some("secret"));
        }
        _ => panic!("expected Crawl with options"),
    }
}

#[test]
fn cli_parse_crawl_requires_url() {
    assert!(Cli::try_parse_from(["harvest", "crawl"]).is_err());
    assert!(Cli::try_parse_from(["harvest", "crawl", "u", "--max-pages", "many"]).is_err());
}

#[test]
fn cli_parse_resume() {
    match parse(&["harvest", "resume", "1717000000000"]) {
        CliCommand::Resume { id, checkpoint } => {
            assert_eq!(id, "1717000000000");
            assert!(checkpoint.is_none());
        }
        _ => panic!("expected Resume"),
    }
}

#[test]
fn cli_parse_delete_with_checkpoint() {
    match parse(&["harvest", "delete", "42", "--checkpoint", "t.json"]) {
        CliCommand::Delete { id, checkpoint } => {
            assert_eq!(id, "42");
            assert_eq!(checkpoint, Some(PathBuf::from("t.json")));
        }
        _ => panic!("expected Delete"),
    }
}

#[test]
fn cli_parse_status() {
    match parse(&["harvest", "status"]) {
        CliCommand::Status { checkpoint } => assert!(checkpoint.is_none()),
        _ => panic!("expected Status"),
    }
}
