//! Password resolution for the directory bind and server accounts
//!
//! Order: literal value from the config file, then the named environment
//! variable, then an interactive prompt when stderr is a terminal.

use anyhow::{Context, Result, bail};
use console::Term;
use dialoguer::Password;
use log::debug;
use reconcile::SyncPlan;
use std::env;

use crate::config::AppConfig;

/// Whether a missing secret may be asked for interactively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Allowed,
    Never,
}

impl Prompt {
    /// Prompt only when attached to a terminal
    pub fn detect() -> Self {
        if Term::stderr().is_term() {
            Self::Allowed
        } else {
            Self::Never
        }
    }
}

/// Where one secret may come from
pub struct SecretSource<'a> {
    /// Shown in the prompt and in errors, e.g. `cn=sync,o=example`
    pub label: &'a str,
    pub literal: Option<&'a str>,
    pub env: Option<&'a str>,
}

/// Resolve a secret, reading environment variables through `lookup`
pub fn resolve_with(
    source: &SecretSource<'_>,
    lookup: impl Fn(&str) -> Option<String>,
    prompt: Prompt,
) -> Result<String> {
    if let Some(value) = source.literal {
        return Ok(value.to_string());
    }

    if let Some(var) = source.env {
        if let Some(value) = lookup(var) {
            debug!("Password for {} read from ${}", source.label, var);
            return Ok(value);
        }
        if prompt == Prompt::Never {
            bail!("Environment variable {var} (password for {}) is not set", source.label);
        }
    }

    match prompt {
        Prompt::Allowed => Password::new()
            .with_prompt(format!("Password for {}", source.label))
            .allow_empty_password(false)
            .interact()
            .with_context(|| format!("Could not read password for {}", source.label)),
        Prompt::Never => bail!(
            "No password for {}: set password_env or run interactively",
            source.label
        ),
    }
}

/// Resolve a secret from the process environment
pub fn resolve(source: &SecretSource<'_>, prompt: Prompt) -> Result<String> {
    resolve_with(source, |var| env::var(var).ok(), prompt)
}

/// Fill in the directory bind password, if a bind DN is configured
pub fn resolve_directory(config: &mut AppConfig, prompt: Prompt) -> Result<()> {
    let Some(bind_dn) = config.directory.bind_dn.clone() else {
        return Ok(());
    };
    let password = resolve(
        &SecretSource {
            label: &bind_dn,
            literal: config.directory.password.as_deref(),
            env: config.directory.password_env.as_deref(),
        },
        prompt,
    )?;
    config.directory.password = Some(password);
    Ok(())
}

/// Fill in every password the run will need.
///
/// Only accounts that are configured (a bind DN, a server user) need one,
/// and only servers selected by `plan` are asked for.
pub fn resolve_all(config: &mut AppConfig, plan: &SyncPlan, prompt: Prompt) -> Result<()> {
    resolve_directory(config, prompt)?;

    for server in &mut config.servers {
        if !plan.includes_server(server.label()) {
            continue;
        }
        let Some(user) = server.user.clone() else {
            continue;
        };
        let label = format!("{user} on {}", server.label());
        let password = resolve(
            &SecretSource {
                label: &label,
                literal: server.password.as_deref(),
                env: server.password_env.as_deref(),
            },
            prompt,
        )?;
        server.password = Some(password);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(var: &str) -> Option<String> {
        (var == "RTC_PASSWORD").then(|| "from-env".to_string())
    }

    #[test]
    fn test_literal_wins() {
        let source = SecretSource {
            label: "admin",
            literal: Some("literal"),
            env: Some("RTC_PASSWORD"),
        };
        assert_eq!(resolve_with(&source, lookup, Prompt::Never).unwrap(), "literal");
    }

    #[test]
    fn test_env_variable() {
        let source = SecretSource {
            label: "admin",
            literal: None,
            env: Some("RTC_PASSWORD"),
        };
        assert_eq!(resolve_with(&source, lookup, Prompt::Never).unwrap(), "from-env");
    }

    #[test]
    fn test_unset_env_without_terminal() {
        let source = SecretSource {
            label: "admin",
            literal: None,
            env: Some("LDAP_PASSWORD"),
        };
        let err = resolve_with(&source, lookup, Prompt::Never).unwrap_err();
        assert!(err.to_string().contains("LDAP_PASSWORD"));
    }

    #[test]
    fn test_nothing_configured_without_terminal() {
        let source = SecretSource {
            label: "admin on rtc1",
            literal: None,
            env: None,
        };
        let err = resolve_with(&source, lookup, Prompt::Never).unwrap_err();
        assert!(err.to_string().contains("admin on rtc1"));
    }

    #[test]
    fn test_resolve_all_skips_anonymous_accounts() {
        let mut config = AppConfig::parse(
            r#"{
                "directory": { "url": "ldap://localhost", "base_dn": "o=example" },
                "servers": [
                    { "name": "anon", "url": "https://a.example.com" },
                    { "name": "rtc1", "url": "https://b.example.com", "user": "admin", "password": "pw" }
                ]
            }"#,
            crate::config::ConfigFormat::Json,
        )
        .unwrap();

        resolve_all(&mut config, &SyncPlan::all(), Prompt::Never).unwrap();
        assert!(config.directory.password.is_none());
        assert!(config.servers[0].password.is_none());
        assert_eq!(config.servers[1].password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_resolve_all_skips_servers_outside_target() {
        let mut config = AppConfig::parse(
            r#"{
                "directory": { "url": "ldap://localhost", "base_dn": "o=example" },
                "servers": [
                    { "name": "rtc1", "url": "https://a.example.com", "user": "admin", "password": "pw" },
                    { "name": "rtc2", "url": "https://b.example.com", "user": "admin" }
                ]
            }"#,
            crate::config::ConfigFormat::Json,
        )
        .unwrap();

        let plan = SyncPlan::from_target(Some("rtc1")).unwrap();
        resolve_all(&mut config, &plan, Prompt::Never).unwrap();
        assert_eq!(config.servers[0].password.as_deref(), Some("pw"));
        assert!(config.servers[1].password.is_none());

        let err = resolve_all(&mut config, &SyncPlan::all(), Prompt::Never).unwrap_err();
        assert!(err.to_string().contains("admin on rtc2"));
    }
}
