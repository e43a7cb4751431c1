// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Command implementations for the `donky` binary.

use std::time::Duration;

use chrono::{DateTime, Utc};
use donky_core::{NotificationCategory, OutboundNotification, ServerNotification};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{Cli, Command, OutputFormat};
use crate::config::SdkConfig;
use crate::coordinator::SyncReport;
use crate::error::{Error, Result};
use crate::events::LocalEvent;
use crate::lifecycle::LaunchContext;
use crate::logging;
use crate::registry::ModuleDefinition;
use crate::sdk::{Sdk, SdkStatus};

const CLI_MODULE_NAME: &str = "donky-cli";

/// Entry point used by `main`.
pub fn run(cli: Cli) -> Result<()> {
    logging::setup_logging(cli.log_file.as_deref(), cli.verbose);
    let config = SdkConfig::load_or_default(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(cli.command, config))
}

async fn execute(command: Command, config: SdkConfig) -> Result<()> {
    let connect_timeout = config.request_timeout();
    let sdk = Sdk::builder(config).build()?;
    let result = match command {
        Command::Sync { channel, output } => sync(&sdk, channel, connect_timeout, output).await,
        Command::Enqueue {
            notification_type,
            payload,
        } => enqueue(&sdk, &notification_type, &payload),
        Command::Listen {
            donky_types,
            custom_types,
            ack,
            count,
        } => listen(&sdk, donky_types, custom_types, ack, count).await,
        Command::Status { output } => {
            print_status(&sdk.status(), output);
            Ok(())
        }
    };
    sdk.shutdown();
    result
}

async fn sync(
    sdk: &Sdk,
    channel: bool,
    connect_timeout: Duration,
    output: OutputFormat,
) -> Result<()> {
    if channel {
        let mut events = sdk.events();
        sdk.start_channel();
        let connected = tokio::time::timeout(connect_timeout, async {
            loop {
                match events.recv().await {
                    Ok(LocalEvent::ChannelConnected) => return true,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);
        if !connected {
            warn!("persistent channel did not connect, using REST");
        }
    }

    let report = sdk.synchronize_now().await?;
    print_report(&report, output);
    Ok(())
}

fn enqueue(sdk: &Sdk, notification_type: &str, payload: &str) -> Result<()> {
    let notification = build_notification(notification_type, payload, Utc::now())?;
    let id = notification.id.clone();
    sdk.enqueue(notification)?;
    println!("queued {} ({})", id, notification_type);
    Ok(())
}

async fn listen(
    sdk: &Sdk,
    donky_types: Vec<String>,
    custom_types: Vec<String>,
    ack: bool,
    count: Option<usize>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerNotification>();
    let module = ModuleDefinition::new(CLI_MODULE_NAME, env!("CARGO_PKG_VERSION"));
    let subscriptions = donky_types
        .iter()
        .map(|t| (NotificationCategory::Donky, t))
        .chain(custom_types.iter().map(|t| (NotificationCategory::Custom, t)));
    for (category, notification_type) in subscriptions {
        let tx = tx.clone();
        sdk.subscribe(module.clone(), category, notification_type, ack, move |n| {
            let _ = tx.send(n.clone());
        });
    }
    drop(tx);

    let mut events = sdk.events();
    sdk.on_resumed(LaunchContext::default());
    info!("listening, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut subscribed = true;
    let mut received = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            notification = rx.recv(), if subscribed => {
                let Some(notification) = notification else {
                    subscribed = false;
                    continue;
                };
                println!("{}", serde_json::to_string(&notification).unwrap_or_default());
                received += 1;
                if count.is_some_and(|limit| received >= limit) {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => info!(?event, "local event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if ack && sdk.coordinator().pending_count() > 0 {
        if let Err(e) = sdk.synchronize_now().await {
            warn!(error = %e, "failed to send acknowledgements");
        }
    }
    Ok(())
}

/// Builds an outbound notification from command-line input.
pub(crate) fn build_notification(
    notification_type: &str,
    payload: &str,
    now: DateTime<Utc>,
) -> Result<OutboundNotification> {
    if notification_type.trim().is_empty() {
        return Err(Error::InvalidPayload("notification type is empty".into()));
    }
    let value: Value =
        serde_json::from_str(payload).map_err(|e| Error::InvalidPayload(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(Error::InvalidPayload("payload must be a JSON object".into()));
    };
    Ok(OutboundNotification::new(notification_type, map, now))
}

fn print_report(report: &SyncReport, output: OutputFormat) {
    match output {
        OutputFormat::Text => {
            println!(
                "synchronized via {}: sent {}, received {}",
                report.transport, report.sent, report.received
            );
            if report.more_available {
                println!("more notifications are waiting on the server");
            }
        }
        OutputFormat::Json => {
            let value = json!({
                "sent": report.sent,
                "received": report.received,
                "transport": report.transport.to_string(),
                "completedAt": report.completed_at,
                "moreAvailable": report.more_available,
            });
            println!("{value}");
        }
    }
}

fn print_status(status: &SdkStatus, output: OutputFormat) {
    match output {
        OutputFormat::Text => {
            println!("pending:    {}", status.pending);
            match status.last_sync {
                Some(at) => println!("last sync:  {}", at.to_rfc3339()),
                None => println!("last sync:  never"),
            }
            println!("channel:    {}", status.channel);
            println!("suspended:  {}", if status.suspended { "yes" } else { "no" });
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(status).unwrap_or_default());
        }
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
