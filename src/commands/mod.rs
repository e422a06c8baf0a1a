pub mod lookup;
pub mod sync;
pub mod validate;

use anyhow::{Context as _, Result};
use ldapkit::LdapDirectory;
use std::path::PathBuf;

use crate::Context;
use crate::config::AppConfig;

/// Load the configuration named on the command line (or the default one)
pub fn load_config(ctx: &Context) -> Result<(AppConfig, PathBuf)> {
    AppConfig::load(ctx.config.as_deref())
}

/// Bind to the directory; the password must already be resolved
pub fn connect_directory(config: &AppConfig) -> Result<LdapDirectory> {
    let password = config.directory.password.clone();
    LdapDirectory::connect(config.directory.clone(), password.as_deref())
        .with_context(|| format!("Could not connect to directory {}", config.directory.url))
}
