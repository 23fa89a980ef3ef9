//! Output formatting: table, JSON, plain, and the live chat feed.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use backchat_core::{ConnectionMode, ConnectionStatus, Message, MessageId};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single serde-serializable item in the chosen format.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => id_fn(data),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

// ── Message rows ─────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct MessageRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Message")]
    content: String,
}

pub fn message_row(m: &Message) -> MessageRow {
    MessageRow {
        id: m.id.to_string(),
        time: local_time(&m.timestamp, "%Y-%m-%d %H:%M:%S"),
        user: display_name(m),
        content: m.content.clone(),
    }
}

pub fn message_detail(m: &Message) -> String {
    [
        format!("ID:      {}", m.id),
        format!("User:    {}", display_name(m)),
        format!("Time:    {}", local_time(&m.timestamp, "%Y-%m-%d %H:%M:%S")),
        format!("Message: {}", m.content),
    ]
    .join("\n")
}

fn display_name(m: &Message) -> String {
    if m.is_admin {
        format!("{} [admin]", m.username)
    } else {
        m.username.clone()
    }
}

fn local_time(ts: &DateTime<Utc>, fmt: &str) -> String {
    ts.with_timezone(&Local).format(fmt).to_string()
}

// ── Live feed ────────────────────────────────────────────────────────

/// Line formatting for `join`.
#[derive(Debug, Clone)]
pub struct Feed {
    color: bool,
}

impl Feed {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// `[12:00:01] alice: hello`
    pub fn message_line(&self, m: &Message) -> String {
        let time = local_time(&m.timestamp, "%H:%M:%S");
        if !self.color {
            return format!("[{time}] {}: {}", display_name(m), m.content);
        }
        let name = if m.is_admin {
            format!("{} {}", m.username.magenta().bold(), "[admin]".magenta())
        } else {
            m.username.cyan().bold().to_string()
        };
        format!("{} {name}: {}", format!("[{time}]").dimmed(), m.content)
    }

    pub fn removed_line(&self, id: &MessageId) -> String {
        let line = format!("  message {id} was deleted");
        if self.color {
            line.dimmed().to_string()
        } else {
            line
        }
    }

    pub fn status_line(&self, status: &ConnectionStatus) -> String {
        let label = format!("● {}", status.label());
        if !self.color {
            return label;
        }
        match status.mode() {
            ConnectionMode::Push => label.green().to_string(),
            ConnectionMode::Poll => label.cyan().to_string(),
            ConnectionMode::Disconnected if status.retry_count > 0 => label.yellow().to_string(),
            ConnectionMode::Disconnected => label.red().to_string(),
        }
    }

    pub fn notice(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_owned()
        }
    }
}
