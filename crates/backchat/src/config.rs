//! Flag-over-profile resolution.
//!
//! `backchat-config` owns the file format; this module layers the global
//! flags on top and produces what the chat commands need: a
//! `SessionConfig`, the identity to post under, and admin credentials.

use std::io::IsTerminal;

use secrecy::SecretString;

use backchat_config::{ConfigError, Profile};
use backchat_core::{AdminCredentials, Identity, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a chat command needs from configuration.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub profile_name: String,
    pub profile: Profile,
    pub session: SessionConfig,
}

/// Resolve the active profile and apply flag overrides.
///
/// With no matching profile, `--server` alone is enough to talk to a
/// server; without either the user is pointed at `config init`.
pub fn resolve(global: &GlobalOpts) -> Result<ChatContext, CliError> {
    let cfg = backchat_config::load_config()?;

    let (profile_name, mut profile) = match cfg.profile(global.profile.as_deref()) {
        Ok((name, profile)) => (name, profile.clone()),
        // An explicitly requested profile must exist
        Err(ConfigError::UnknownProfile { name }) if global.profile.is_some() => {
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        Err(ConfigError::UnknownProfile { name }) => {
            if global.server.is_none() {
                return Err(CliError::NoConfig {
                    path: backchat_config::config_path().display().to_string(),
                });
            }
            (name, Profile::default())
        }
        Err(e) => return Err(e.into()),
    };

    apply_overrides(&mut profile, global);
    let session = backchat_config::profile_to_session_config(&profile, &cfg.defaults)?;

    Ok(ChatContext {
        profile_name,
        profile,
        session,
    })
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
}

impl ChatContext {
    /// Display name to join or post under.
    pub fn identity(&self) -> Result<Identity, CliError> {
        let raw = self.profile.username.as_deref().ok_or(CliError::NoUsername)?;
        Ok(Identity::parse(raw)?)
    }

    /// Admin credentials from env, keyring or config; prompt on a terminal
    /// when none are configured.
    pub fn admin_credentials(&self) -> Result<AdminCredentials, CliError> {
        match backchat_config::resolve_admin_credentials(&self.profile, &self.profile_name) {
            Ok(creds) => Ok(creds),
            Err(ConfigError::NoCredentials { profile }) => {
                if !std::io::stdin().is_terminal() {
                    return Err(CliError::NoCredentials { profile });
                }
                let password = rpassword::prompt_password("Admin password: ")?;
                Ok(AdminCredentials::new(
                    backchat_config::admin_username(&self.profile),
                    SecretString::from(password),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}
