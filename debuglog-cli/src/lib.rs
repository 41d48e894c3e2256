mod form;

pub use crate::form::FormAction;
pub use crate::form::help_text;
pub use crate::form::Notification;
pub use crate::form::format_notification;
pub use crate::form::parse_line;

use anyhow::Context;
use clap::Parser;
use debuglog_core::DebugLogConfig;
use debuglog_core::FilterEvent;
use debuglog_core::FilterRegistry;
use std::path::PathBuf;
use supports_color::Stream;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Temporarily let debug logs through the log pipeline for one car at a time.
///
/// Every enable must reference an open incident and lapses after an hour.
/// Filters still active on exit are reverted.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Load pipeline and ticketing credentials from this dotenv file first.
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    if let Some(path) = cli.env_file.as_deref() {
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
    }
    let config = DebugLogConfig::from_env()?;
    let registry = FilterRegistry::from_config(&config);
    let color_enabled = supports_color::on_cached(Stream::Stdout).is_some();

    let reporter = tokio::spawn(report_events(registry.subscribe(), color_enabled));
    emit(
        &Notification::Info(help_text(registry.expiry_window())),
        color_enabled,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let action = match parse_line(&line) {
            Ok(Some(FormAction::Quit)) => break,
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(notification) => {
                emit(&notification, color_enabled);
                continue;
            }
        };
        emit(&handle_action(&registry, action).await, color_enabled);
    }

    reporter.abort();
    if let Err(err) = registry.shutdown().await {
        emit(
            &Notification::Error(format!("failed to revert active filters: {err}")),
            color_enabled,
        );
    }
    Ok(())
}

/// Runs one form action against the registry and describes the outcome.
pub async fn handle_action(registry: &FilterRegistry, action: FormAction) -> Notification {
    match action {
        FormAction::Enable { car_id, inc } => match registry.enable(&car_id, &inc).await {
            Ok(()) => Notification::Success(format!("Debug logs enabled for {car_id}")),
            Err(err) => Notification::Error(err.to_string()),
        },
        FormAction::Disable { car_id } => {
            if !registry.is_active(&car_id).await {
                return Notification::Error("No active filter for that car ID".to_string());
            }
            match registry.disable(&car_id).await {
                Ok(()) => Notification::Success(format!("Filter for {car_id} removed")),
                Err(err) => Notification::Error(err.to_string()),
            }
        }
        FormAction::Status => {
            let active = registry.active_filters().await;
            if active.is_empty() {
                return Notification::Info("No active filters".to_string());
            }
            let lines: Vec<String> = active
                .iter()
                .map(|filter| {
                    format!(
                        "  {}  {} left",
                        filter.identifier,
                        form::format_remaining(filter.remaining)
                    )
                })
                .collect();
            Notification::Info(lines.join("\n"))
        }
        FormAction::Help => Notification::Info(help_text(registry.expiry_window())),
        FormAction::Quit => Notification::Info("Reverting active filters".to_string()),
    }
}

async fn report_events(mut events: broadcast::Receiver<FilterEvent>, color_enabled: bool) {
    loop {
        let notification = match events.recv().await {
            Ok(FilterEvent::Expired { identifier }) => {
                Notification::Success(format!("Debug log window for {identifier} expired"))
            }
            Ok(FilterEvent::ExpiryFailed {
                identifier,
                message,
            }) => Notification::Error(format!(
                "Debug log window for {identifier} expired but the pipeline was not updated: \
                 {message}"
            )),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "dropped filter events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        emit(&notification, color_enabled);
    }
}

fn emit(notification: &Notification, color_enabled: bool) {
    println!("{}", format_notification(notification, color_enabled));
}
