//! `backchat delete`: admin login, then remove a message for everyone.

use backchat_core::{ChatBackend, HttpBackend, MessageId};

use crate::cli::{DeleteArgs, GlobalOpts};
use crate::config::ChatContext;
use crate::error::CliError;
use crate::output;

pub async fn handle(ctx: &ChatContext, args: &DeleteArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = MessageId::new(args.id.trim());
    if id.as_str().is_empty() {
        return Err(CliError::Validation {
            field: "id".into(),
            reason: "message id must not be empty".into(),
        });
    }

    let creds = ctx.admin_credentials()?;
    let backend = HttpBackend::new(&ctx.session)?;
    backend.admin_login(&creds).await?;
    backend.delete_message(&id).await?;

    output::print_output(&format!("Deleted message {id}"), global.quiet);
    Ok(())
}
