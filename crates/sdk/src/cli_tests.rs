// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use clap::CommandFactory;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("donky").chain(args.iter().copied())).unwrap()
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn sync_defaults() {
    let cli = parse(&["sync"]);
    assert_eq!(
        cli.command,
        Command::Sync {
            channel: false,
            output: OutputFormat::Text
        }
    );
    assert_eq!(cli.verbose, 0);
    assert_eq!(cli.config, None);
}

#[test]
fn global_flags_after_subcommand() {
    let cli = parse(&["status", "--config", "/tmp/donky.toml", "-vv", "-o", "json"]);
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/donky.toml")));
    assert_eq!(cli.verbose, 2);
    assert_eq!(
        cli.command,
        Command::Status {
            output: OutputFormat::Json
        }
    );
}

#[test]
fn enqueue_payload_defaults_to_empty_object() {
    let cli = parse(&["enqueue", "MessageRead"]);
    assert_eq!(
        cli.command,
        Command::Enqueue {
            notification_type: "MessageRead".into(),
            payload: "{}".into()
        }
    );
}

#[test]
fn listen_collects_repeated_types() {
    let cli = parse(&[
        "listen", "--custom", "chat", "--custom", "score", "--donky", "SimplePush", "--count", "3",
    ]);
    assert_eq!(
        cli.command,
        Command::Listen {
            donky_types: vec!["SimplePush".into()],
            custom_types: vec!["chat".into(), "score".into()],
            ack: false,
            count: Some(3),
        }
    );
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(Cli::try_parse_from(["donky"]).is_err());
}
