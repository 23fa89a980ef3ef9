//! `backchat list`: one snapshot of the message list.

use backchat_core::{ChatBackend, HttpBackend};

use crate::cli::{GlobalOpts, ListArgs};
use crate::config::ChatContext;
use crate::error::CliError;
use crate::output;

pub async fn handle(
    ctx: &ChatContext,
    args: &ListArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut session = ctx.session.clone();
    if let Some(limit) = args.limit {
        session.snapshot_limit = Some(limit);
    }
    let backend = HttpBackend::new(&session)?;
    let messages = backend.fetch_snapshot().await?;

    let out = output::render_list(&global.output, &messages, output::message_row, |m| {
        m.id.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
