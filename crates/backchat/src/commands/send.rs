//! `backchat send`: post one message and print what the server stored.

use backchat_core::{ChatBackend, HttpBackend, NewMessage, validate_content};

use crate::cli::{GlobalOpts, SendArgs};
use crate::config::ChatContext;
use crate::error::CliError;
use crate::output;

pub async fn handle(ctx: &ChatContext, args: &SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let content = args.content.join(" ");
    validate_content(&content)?;
    let identity = ctx.identity()?;

    let backend = HttpBackend::new(&ctx.session)?;
    if args.admin {
        let creds = ctx.admin_credentials()?;
        backend.admin_login(&creds).await?;
    }

    let created = backend
        .post_message(NewMessage {
            username: identity.as_str().to_owned(),
            content,
            is_admin: args.admin,
        })
        .await?;

    let out = output::render_single(&global.output, &created, output::message_detail, |m| {
        m.id.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
