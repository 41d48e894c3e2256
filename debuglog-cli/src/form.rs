//! Line-oriented stand-in for the enable/disable form.

use owo_colors::OwoColorize;
use std::time::Duration;

/// Command summary; `window` is how long one enable lasts.
pub fn help_text(window: Duration) -> String {
    format!(
        "\
Commands:
  enable <car id> <inc>   let debug logs through for {}
  disable <car id>        stop letting debug logs through
  status                  list active filters and time left
  help                    show this message
  quit                    revert all filters and exit",
        describe_window(window)
    )
}

fn describe_window(window: Duration) -> String {
    let minutes = window.as_secs() / 60;
    match (minutes / 60, minutes % 60) {
        (1, 0) => "one hour".to_string(),
        (hours, 0) if hours > 0 => format!("{hours} hours"),
        _ => format!("{minutes} minutes"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormAction {
    Enable { car_id: String, inc: String },
    Disable { car_id: String },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Error(String),
    Info(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<FormAction>, Notification> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let action = match command.to_ascii_lowercase().as_str() {
        "enable" => match args.as_slice() {
            [car_id, inc] => FormAction::Enable {
                car_id: (*car_id).to_string(),
                inc: (*inc).to_string(),
            },
            _ => return Err(Notification::Error("Car ID and INC are required".to_string())),
        },
        "disable" => match args.as_slice() {
            [car_id] => FormAction::Disable {
                car_id: (*car_id).to_string(),
            },
            _ => return Err(Notification::Error("Car ID is required".to_string())),
        },
        "status" => FormAction::Status,
        "help" | "?" => FormAction::Help,
        "quit" | "exit" => FormAction::Quit,
        other => {
            return Err(Notification::Error(format!(
                "Unknown command `{other}`; type `help` for usage"
            )));
        }
    };
    Ok(Some(action))
}

pub fn format_notification(notification: &Notification, color_enabled: bool) -> String {
    match notification {
        Notification::Success(message) if color_enabled => format!("{} {message}", "ok".green()),
        Notification::Success(message) => format!("ok {message}"),
        Notification::Error(message) if color_enabled => {
            format!("{} {message}", "error".red().bold())
        }
        Notification::Error(message) => format!("error {message}"),
        Notification::Info(message) => message.clone(),
    }
}

pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}m{:02}s", secs / 60, secs % 60)
}
