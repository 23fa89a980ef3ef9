//! Command dispatch: bridges CLI args -> session/backend calls -> output.

pub mod config_cmd;
pub mod delete;
pub mod join;
pub mod list;
pub mod send;

use crate::cli::{Command, GlobalOpts};
use crate::config::ChatContext;
use crate::error::CliError;

/// Dispatch a server-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    ctx: ChatContext,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Join(args) => join::handle(&ctx, &args, global).await,
        Command::List(args) => list::handle(&ctx, &args, global).await,
        Command::Send(args) => send::handle(&ctx, &args, global).await,
        Command::Delete(args) => delete::handle(&ctx, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
