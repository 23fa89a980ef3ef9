//! Config subcommand handlers.

use backchat_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            name,
            store_admin_password,
            force,
        } => {
            let server = global.server.clone().ok_or_else(|| CliError::Validation {
                field: "server".into(),
                reason: "pass --server <URL>".into(),
            })?;
            let path = backchat_config::config_path();
            let mut cfg = backchat_config::load_config_from(&path)?;

            if cfg.profiles.contains_key(&name) && !force {
                return Err(CliError::ProfileExists {
                    name,
                    path: path.display().to_string(),
                });
            }

            let profile = Profile {
                server,
                username: global.username.clone(),
                insecure: global.insecure.then_some(true),
                timeout: global.timeout,
                ..Profile::default()
            };
            // Validate before anything is written
            backchat_config::profile_to_session_config(&profile, &cfg.defaults)?;

            if store_admin_password {
                let password = rpassword::prompt_password("Admin password: ")?;
                if password.is_empty() {
                    return Err(CliError::Validation {
                        field: "admin_password".into(),
                        reason: "password cannot be empty".into(),
                    });
                }
                backchat_config::store_admin_password(&name, &password)?;
                if !global.quiet {
                    eprintln!("Admin password stored in system keyring");
                }
            }

            if cfg.profiles.is_empty() {
                cfg.default_profile = Some(name.clone());
            }
            cfg.profiles.insert(name.clone(), profile);
            let written = backchat_config::save_config(&cfg)?;

            output::print_output(
                &format!("Profile '{name}' saved to {}", written.display()),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = backchat_config::load_config()?;
            redact(&mut cfg);
            let out = match global.output {
                OutputFormat::Json => serde_json::to_string_pretty(&cfg)?,
                OutputFormat::JsonCompact => serde_json::to_string(&cfg)?,
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::Serialize(e.to_string()))?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &backchat_config::config_path().display().to_string(),
                global.quiet,
            );
            Ok(())
        }
    }
}

/// Mask plaintext secrets before display.
fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.admin_password.is_some() {
            profile.admin_password = Some(REDACTED.into());
        }
    }
}
