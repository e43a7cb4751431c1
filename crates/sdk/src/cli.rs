// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

const QUICKSTART_HELP: &str = "\
Get started:
  donky status                          Show pending queue and last sync
  donky enqueue MessageRead '{\"messageId\":\"m1\"}'
                                        Queue a client notification
  donky sync                            Run one synchronization round
  donky listen --custom chatMessage     Print pushed notifications";

#[derive(Parser, Debug)]
#[command(name = "donky", version)]
#[command(about = "Donky notification synchronization client")]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Config file (default: $DONKY_CONFIG or ~/.config/donky/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run one synchronization round and print the result
    Sync {
        /// Connect the persistent channel first and synchronize over it
        #[arg(long)]
        channel: bool,

        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Queue a client notification for the next round
    #[command(after_help = "Examples:\n  \
        donky enqueue MessageRead '{\"messageId\":\"m1\"}'\n  \
        donky enqueue Custom '{\"customType\":\"score\",\"data\":{\"points\":3}}'")]
    Enqueue {
        /// Notification type
        #[arg(value_name = "TYPE")]
        notification_type: String,

        /// JSON object payload
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// Connect and print received notifications until interrupted
    Listen {
        /// Donky notification types to print
        #[arg(long = "donky", value_name = "TYPE")]
        donky_types: Vec<String>,

        /// Custom notification types to print
        #[arg(long = "custom", value_name = "TYPE")]
        custom_types: Vec<String>,

        /// Acknowledge printed notifications
        #[arg(long)]
        ack: bool,

        /// Exit after this many notifications
        #[arg(long)]
        count: Option<usize>,
    },

    /// Show pending queue size, last sync and channel state
    Status {
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
