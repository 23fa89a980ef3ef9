//! `backchat join`: follow the chat live.
//!
//! Prints the current list, then every arrival and removal as the session
//! reconciles them. Stdin lines are posted as messages; lines starting
//! with `/` are commands. Link status changes go to stderr.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use backchat_core::{
    AdminCredentials, ConnectionStatus, InboundEvent, Message, MessageId, Session,
};

use crate::cli::{GlobalOpts, JoinArgs, OutputFormat};
use crate::config::ChatContext;
use crate::error::CliError;
use crate::output::{self, Feed};

const HELP: &str = "commands: /refresh  /status  /login  /delete <id>  /quit";

enum Flow {
    Continue,
    Quit,
}

pub async fn handle(ctx: &ChatContext, args: &JoinArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let identity = ctx.identity()?;
    let admin_creds = if args.admin {
        Some(ctx.admin_credentials()?)
    } else {
        None
    };

    let mut session_config = ctx.session.clone();
    if args.poll_on_first_failure {
        session_config.reconnect.first_failure_polls = true;
    }

    let session = Session::connect(session_config, identity).await?;
    let printer = Printer::new(global);

    let result = async {
        if let Some(ref creds) = admin_creds {
            session.admin_login(creds).await?;
        }
        follow(&session, ctx, &printer).await
    }
    .await;

    session.shutdown().await;
    result
}

async fn follow(session: &Session, ctx: &ChatContext, printer: &Printer) -> Result<(), CliError> {
    let mut messages = session.messages();
    let mut status = session.status();

    let mut shown: HashSet<MessageId> = HashSet::new();
    printer.print_diff(&mut shown, messages.current())?;
    printer.print_status(&status.borrow_and_update());
    printer.notice(HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),

            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match run_line(session, ctx, printer, line.trim()).await {
                    Ok(Flow::Quit) => return Ok(()),
                    Ok(Flow::Continue) => {}
                    // A failed action doesn't end the session
                    Err(e) => eprintln!("{:?}", miette::Report::new(e)),
                },
                None => {
                    debug!("stdin closed, following read-only");
                    stdin_open = false;
                }
            },

            snapshot = messages.changed() => match snapshot {
                Some(snapshot) => printer.print_diff(&mut shown, &snapshot)?,
                None => return Err(CliError::SessionClosed),
            },

            changed = status.changed() => {
                if changed.is_err() {
                    return Err(CliError::SessionClosed);
                }
                printer.print_status(&status.borrow_and_update());
            }
        }
    }
}

async fn run_line(
    session: &Session,
    ctx: &ChatContext,
    printer: &Printer,
    line: &str,
) -> Result<Flow, CliError> {
    if line.is_empty() {
        return Ok(Flow::Continue);
    }
    let Some(command) = line.strip_prefix('/') else {
        session.send(line).await?;
        return Ok(Flow::Continue);
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("quit" | "exit"), _) => return Ok(Flow::Quit),
        (Some("refresh"), _) => {
            let changed = session.refresh().await?;
            if !changed {
                printer.notice("(no changes)");
            }
        }
        (Some("status"), _) => {
            printer.print_status(&session.connection_status());
        }
        (Some("login"), _) => {
            let creds = prompt_credentials(ctx.clone()).await?;
            session.admin_login(&creds).await?;
            printer.notice("logged in as admin");
        }
        (Some("delete"), Some(id)) => {
            session.delete(&MessageId::new(id)).await?;
        }
        (Some("delete"), None) => {
            return Err(CliError::Validation {
                field: "/delete".into(),
                reason: "usage: /delete <id>".into(),
            });
        }
        _ => printer.notice(HELP),
    }
    Ok(Flow::Continue)
}

/// Credential lookup may prompt on the terminal, so it runs off the reactor.
async fn prompt_credentials(ctx: ChatContext) -> Result<AdminCredentials, CliError> {
    tokio::task::spawn_blocking(move || ctx.admin_credentials())
        .await
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?
}

// ── Printer ──────────────────────────────────────────────────────────

/// Writes the feed in the selected output format.
///
/// JSON formats emit one push-style event per line.
struct Printer {
    feed: Feed,
    json: bool,
    quiet: bool,
}

impl Printer {
    fn new(global: &GlobalOpts) -> Self {
        Self {
            feed: Feed::new(output::should_color(&global.color)),
            json: matches!(global.output, OutputFormat::Json | OutputFormat::JsonCompact),
            quiet: global.quiet,
        }
    }

    /// Print what changed between what's on screen and `snapshot`.
    fn print_diff(
        &self,
        shown: &mut HashSet<MessageId>,
        snapshot: &Arc<Vec<Arc<Message>>>,
    ) -> Result<(), CliError> {
        let current: HashSet<&MessageId> = snapshot.iter().map(|m| &m.id).collect();

        let mut removed: Vec<MessageId> = shown
            .iter()
            .filter(|id| !current.contains(id))
            .cloned()
            .collect();
        removed.sort_unstable();
        for id in removed {
            shown.remove(&id);
            if self.json {
                self.emit_json(&InboundEvent::MessageDeleted { message_id: id })?;
            } else {
                output::print_output(&self.feed.removed_line(&id), self.quiet);
            }
        }

        for message in snapshot.iter() {
            if !shown.insert(message.id.clone()) {
                continue;
            }
            if self.json {
                self.emit_json(&InboundEvent::NewMessage((**message).clone()))?;
            } else {
                output::print_output(&self.feed.message_line(message), self.quiet);
            }
        }
        Ok(())
    }

    fn print_status(&self, status: &ConnectionStatus) {
        if !self.quiet {
            eprintln!("{}", self.feed.status_line(status));
        }
    }

    fn notice(&self, text: &str) {
        if !self.quiet {
            eprintln!("{}", self.feed.notice(text));
        }
    }

    fn emit_json(&self, event: &InboundEvent) -> Result<(), CliError> {
        output::print_output(&serde_json::to_string(event)?, self.quiet);
        Ok(())
    }
}
