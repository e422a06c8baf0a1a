//! Directory connection settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

fn default_user_filter() -> String {
    "(objectClass=person)".to_string()
}

fn default_group_filter() -> String {
    "(|(objectClass=groupOfNames)(objectClass=groupOfUniqueNames)(objectClass=posixGroup))"
        .to_string()
}

fn default_group_name_attribute() -> String {
    "cn".to_string()
}

fn default_member_attributes() -> Vec<String> {
    vec![
        "member".to_string(),
        "uniqueMember".to_string(),
        "memberUid".to_string(),
    ]
}

fn default_login_attribute() -> String {
    "uid".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// How to reach the directory and how its groups are laid out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// `ldap://host:389` or `ldaps://host:636`
    pub url: String,
    /// Bind DN; anonymous bind when absent
    #[serde(default)]
    pub bind_dn: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the bind password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Base for user searches
    pub base_dn: String,
    /// Base for group searches by name; defaults to `base_dn`
    #[serde(default)]
    pub group_base_dn: Option<String>,
    #[serde(default = "default_group_filter")]
    pub group_filter: String,
    #[serde(default = "default_group_name_attribute")]
    pub group_name_attribute: String,
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
    /// Group attributes listing members, tried in order
    #[serde(default = "default_member_attributes")]
    pub member_attributes: Vec<String>,
    /// Attribute read from a member entry to get its user id; when absent
    /// the value of the member DN's first RDN is used
    #[serde(default)]
    pub user_id_attribute: Option<String>,
    /// Attribute matched against a user id when looking up a user
    #[serde(default = "default_login_attribute")]
    pub login_attribute: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub starttls: bool,
}

impl LdapConfig {
    pub fn new(url: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bind_dn: None,
            password: None,
            password_env: None,
            base_dn: base_dn.into(),
            group_base_dn: None,
            group_filter: default_group_filter(),
            group_name_attribute: default_group_name_attribute(),
            user_filter: default_user_filter(),
            member_attributes: default_member_attributes(),
            user_id_attribute: None,
            login_attribute: default_login_attribute(),
            timeout_secs: default_timeout_secs(),
            starttls: false,
        }
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ldap://") || self.url.starts_with("ldaps://")) {
            return Err(Error::Config(format!(
                "url must start with ldap:// or ldaps://, got {:?}",
                self.url
            )));
        }
        if self.base_dn.trim().is_empty() {
            return Err(Error::Config("base_dn is required".to_string()));
        }
        if self.member_attributes.is_empty() {
            return Err(Error::Config(
                "member_attributes must name at least one attribute".to_string(),
            ));
        }
        if self.starttls && self.url.starts_with("ldaps://") {
            return Err(Error::Config(
                "starttls cannot be combined with an ldaps:// url".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn group_base(&self) -> &str {
        self.group_base_dn.as_deref().unwrap_or(&self.base_dn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: LdapConfig = serde_json::from_str(
            r#"{"url": "ldaps://racf.example.com:636", "base_dn": "o=example"}"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.member_attributes.len(), 3);
        assert_eq!(config.group_base(), "o=example");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.login_attribute, "uid");
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = LdapConfig::new("racf.example.com", "o=example");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_starttls_over_ldaps() {
        let mut config = LdapConfig::new("ldaps://racf.example.com", "o=example");
        config.starttls = true;
        assert!(config.validate().is_err());
    }
}
