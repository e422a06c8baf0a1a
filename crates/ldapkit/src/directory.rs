//! Directory lookups over a blocking LDAP connection

use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry, ldap_escape};
use log::{debug, info, warn};
use reconcile::{DirectoryLookup, Identity};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::LdapConfig;
use crate::dn;
use crate::error::{Error, Result};

/// Directory backed by one LDAP connection.
///
/// The connection is shared behind a mutex; lookups from parallel server
/// passes are serialized on it.
pub struct LdapDirectory {
    config: LdapConfig,
    conn: Mutex<LdapConn>,
}

impl LdapDirectory {
    /// Connect and bind. `password` is the resolved bind password.
    pub fn connect(config: LdapConfig, password: Option<&str>) -> Result<Self> {
        config.validate()?;

        debug!("Connecting to directory {}", config.url);
        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.timeout())
            .set_starttls(config.starttls);
        let mut conn = LdapConn::with_settings(settings, &config.url).map_err(|source| {
            Error::Connect {
                url: config.url.clone(),
                source,
            }
        })?;

        if let Some(bind_dn) = &config.bind_dn {
            conn.with_timeout(config.timeout())
                .simple_bind(bind_dn, password.unwrap_or_default())
                .and_then(|result| result.success())
                .map_err(|e| Error::bind(bind_dn, &e))?;
            info!("Bound to {} as {}", config.url, bind_dn);
        } else {
            info!("Connected to {} anonymously", config.url);
        }

        Ok(Self {
            config,
            conn: Mutex::new(conn),
        })
    }

    /// Unbind and close the connection
    pub fn close(self) -> Result<()> {
        let mut conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.unbind().map_err(|source| Error::Connect {
            url: self.config.url.clone(),
            source,
        })
    }

    fn lock(&self) -> MutexGuard<'_, LdapConn> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Members of `group`, which is either a group DN or a group name
    pub fn group_members(&self, group: &str) -> Result<Vec<Identity>> {
        let mut conn = self.lock();
        let entry = self.group_entry(&mut conn, group)?;

        let mut members = Vec::new();
        for attribute in &self.config.member_attributes {
            let Some(values) = attribute_values(&entry.attrs, attribute) else {
                continue;
            };
            for value in values {
                if attribute.eq_ignore_ascii_case("memberUid") {
                    members.push(Identity::from(value.as_str()));
                    continue;
                }
                match self.member_id(&mut conn, value) {
                    Ok(id) => members.push(Identity::from(id)),
                    // a dangling member DN is not worth failing the whole group
                    Err(Error::UserNotFound(missing)) => {
                        warn!("Group {} lists unknown member {}", group, missing);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        debug!("Group {} resolved to {} members", group, members.len());
        Ok(members)
    }

    /// Attributes of the user whose login attribute equals `id`
    pub fn user_attributes(&self, id: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let filter = format!(
            "(&{}({}={}))",
            self.config.user_filter,
            self.config.login_attribute,
            ldap_escape(id)
        );
        let mut conn = self.lock();
        let entry = self
            .search(&mut conn, &self.config.base_dn, Scope::Subtree, &filter, &["*"])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UserNotFound(id.to_string()))?;

        Ok(entry.attrs.into_iter().collect())
    }

    fn group_entry(&self, conn: &mut LdapConn, group: &str) -> Result<SearchEntry> {
        let attrs: Vec<&str> = self.config.member_attributes.iter().map(String::as_str).collect();

        if dn::is_dn(group) {
            return self
                .search(conn, group, Scope::Base, "(objectClass=*)", &attrs)
                .map_err(|e| match e {
                    Error::Search { .. } => e,
                    _ => Error::GroupNotFound(group.to_string()),
                })?
                .into_iter()
                .next()
                .ok_or_else(|| Error::GroupNotFound(group.to_string()));
        }

        let filter = format!(
            "(&{}({}={}))",
            self.config.group_filter,
            self.config.group_name_attribute,
            ldap_escape(group)
        );
        let mut entries = self.search(
            conn,
            self.config.group_base(),
            Scope::Subtree,
            &filter,
            &attrs,
        )?;
        match entries.len() {
            0 => Err(Error::GroupNotFound(group.to_string())),
            1 => Ok(entries.remove(0)),
            count => Err(Error::AmbiguousGroup {
                group: group.to_string(),
                count,
            }),
        }
    }

    /// Map a member DN to a user id
    fn member_id(&self, conn: &mut LdapConn, member_dn: &str) -> Result<String> {
        let Some(id_attribute) = &self.config.user_id_attribute else {
            return dn::first_rdn_value(member_dn)
                .ok_or_else(|| Error::InvalidDn(member_dn.to_string()));
        };

        let entry = self
            .search(conn, member_dn, Scope::Base, "(objectClass=*)", &[id_attribute.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UserNotFound(member_dn.to_string()))?;

        attribute_values(&entry.attrs, id_attribute)
            .and_then(|values| values.first())
            .cloned()
            .ok_or_else(|| Error::InvalidDn(member_dn.to_string()))
    }

    fn search(
        &self,
        conn: &mut LdapConn,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>> {
        let missing = || Error::UserNotFound(base.to_string());
        let (entries, _) = conn
            .with_timeout(self.config.timeout())
            .search(base, scope, filter, attrs.to_vec())
            .and_then(|result| result.success())
            .map_err(|e| Error::search(base, e, missing))?;
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }
}

/// Attribute lookup ignoring case, as LDAP attribute names are
/// case-insensitive and servers echo them back in their own spelling
fn attribute_values<'a>(
    attrs: &'a HashMap<String, Vec<String>>,
    name: &str,
) -> Option<&'a Vec<String>> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values)
}

impl DirectoryLookup for LdapDirectory {
    fn resolve_group_members(&self, group: &str) -> anyhow::Result<Vec<Identity>> {
        Ok(self.group_members(group)?)
    }

    fn resolve_user_attributes(
        &self,
        identity: &Identity,
    ) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        Ok(self.user_attributes(identity.as_str())?)
    }
}
