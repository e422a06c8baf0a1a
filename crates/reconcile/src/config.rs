//! Server and group-mapping configuration consumed by the engine
//!
//! These types are loaded by the application and handed to the
//! orchestrator by reference; the engine never mutates them.

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{AreaPath, Construct, Identity};

/// One target server and everything reconciled on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Short label used in logs, reports and `--target`; defaults to the URL
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL of the server
    pub url: String,
    /// Account used to administer the server
    #[serde(default)]
    pub user: Option<String>,
    /// Password for `user` (prefer `password_env`)
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Per-server override of the empty-desired-set guard
    #[serde(default)]
    pub allow_empty_desired: Option<bool>,
    /// Repository permission groups
    #[serde(default)]
    pub permissions: Vec<PermissionMapping>,
    /// Client access license pools
    #[serde(default)]
    pub licenses: Vec<LicensePool>,
    /// Project areas, each the root of a team area hierarchy
    #[serde(default)]
    pub projects: Vec<AreaNode>,
}

impl ServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
            user: None,
            password: None,
            password_env: None,
            allow_empty_desired: None,
            permissions: Vec::new(),
            licenses: Vec::new(),
            projects: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Label used in logs and reports
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Effective empty-desired-set policy for this server
    pub fn allows_empty_desired(&self, default: bool) -> bool {
        self.allow_empty_desired.unwrap_or(default)
    }

    /// Flattened view: one entry per (directory group, server construct)
    pub fn group_mappings(&self) -> Vec<GroupMapping> {
        let mut mappings = Vec::new();
        for permission in &self.permissions {
            push_mappings(
                &mut mappings,
                &permission.groups,
                &Construct::permission(&permission.permission_group),
            );
        }
        for pool in &self.licenses {
            push_mappings(&mut mappings, &pool.groups, &Construct::license(&pool.license));
        }
        for project in &self.projects {
            collect_area_mappings(&mut mappings, project, &AreaPath::root(&project.name));
        }
        mappings
    }
}

fn push_mappings(mappings: &mut Vec<GroupMapping>, groups: &[String], target: &Construct) {
    for group in groups {
        mappings.push(GroupMapping {
            directory_group: group.clone(),
            target: target.clone(),
        });
    }
}

fn collect_area_mappings(mappings: &mut Vec<GroupMapping>, node: &AreaNode, path: &AreaPath) {
    for (construct, groups) in node.constructs(path) {
        push_mappings(mappings, groups, &construct);
    }
    for child in &node.team_areas {
        collect_area_mappings(mappings, child, &path.child(&child.name));
    }
}

/// A directory group feeding one server construct
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMapping {
    pub directory_group: String,
    pub target: Construct,
}

/// Repository permission group and the directory groups that populate it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionMapping {
    pub permission_group: String,
    #[serde(
        alias = "directory_group",
        alias = "directory_groups",
        deserialize_with = "one_or_many"
    )]
    pub groups: Vec<String>,
}

/// Client access license pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensePool {
    /// License identifier on the server
    pub license: String,
    /// Maximum number of seats; `None` means unlimited
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Identities served first when seats run short
    #[serde(default)]
    pub priority: Vec<Identity>,
    #[serde(
        alias = "directory_group",
        alias = "directory_groups",
        deserialize_with = "one_or_many"
    )]
    pub groups: Vec<String>,
}

/// A project or team area and the directory groups mapped onto it.
///
/// Absent `administrators` / `members` and unlisted roles are left
/// untouched on the server; they are not treated as "should be empty".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaNode {
    pub name: String,
    #[serde(default, deserialize_with = "optional_one_or_many")]
    pub administrators: Option<Vec<String>>,
    #[serde(default, deserialize_with = "optional_one_or_many")]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub roles: Vec<RoleMapping>,
    #[serde(default)]
    pub team_areas: Vec<AreaNode>,
}

impl AreaNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Constructs configured on this node, in reconciliation order:
    /// administrators, members, then process roles as listed.
    pub fn constructs(&self, path: &AreaPath) -> Vec<(Construct, &[String])> {
        let mut constructs = Vec::new();
        if let Some(groups) = &self.administrators {
            constructs.push((
                Construct::Administrators { area: path.clone() },
                groups.as_slice(),
            ));
        }
        if let Some(groups) = &self.members {
            constructs.push((Construct::Members { area: path.clone() }, groups.as_slice()));
        }
        for role in &self.roles {
            constructs.push((
                Construct::role(path.clone(), &role.role),
                role.groups.as_slice(),
            ));
        }
        constructs
    }
}

/// Process role within an area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleMapping {
    pub role: String,
    #[serde(
        alias = "directory_group",
        alias = "directory_groups",
        deserialize_with = "one_or_many"
    )]
    pub groups: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(group) => vec![group],
            OneOrMany::Many(groups) => groups,
        }
    }
}

/// Accept either `"group"` or `["a", "b"]`
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::deserialize(deserializer).map(Into::into)
}

fn optional_one_or_many<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<OneOrMany>::deserialize(deserializer).map(|v| v.map(Into::into))
}

/// Check a server list before anything is contacted.
pub fn validate_servers(servers: &[ServerConfig]) -> Result<()> {
    if servers.is_empty() {
        return Err(Error::config("no servers configured"));
    }

    let mut labels = HashSet::new();
    for server in servers {
        if server.url.trim().is_empty() {
            return Err(Error::config("server with an empty url"));
        }
        if !labels.insert(server.label()) {
            return Err(Error::config(format!(
                "duplicate server name: {}",
                server.label()
            )));
        }
        validate_server(server)?;
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<()> {
    let label = server.label();

    let mut seen = HashSet::new();
    for permission in &server.permissions {
        if !seen.insert(permission.permission_group.as_str()) {
            return Err(Error::config(format!(
                "{label}: permission group {} is mapped twice; \
                 list every directory group in one mapping",
                permission.permission_group
            )));
        }
        check_groups(label, &permission.permission_group, &permission.groups)?;
    }

    let mut seen = HashSet::new();
    for pool in &server.licenses {
        if !seen.insert(pool.license.as_str()) {
            return Err(Error::config(format!(
                "{label}: license {} is configured twice",
                pool.license
            )));
        }
        check_groups(label, &pool.license, &pool.groups)?;
        if pool.capacity == Some(0) {
            warn!("{label}: license {} has zero seats; nobody will be assigned", pool.license);
        }
    }

    let mut seen = HashSet::new();
    for project in &server.projects {
        if !seen.insert(project.name.as_str()) {
            return Err(Error::config(format!(
                "{label}: project {} is configured twice",
                project.name
            )));
        }
        validate_area(label, project, &AreaPath::root(&project.name))?;
    }
    Ok(())
}

fn validate_area(label: &str, node: &AreaNode, path: &AreaPath) -> Result<()> {
    if node.name.trim().is_empty() || node.name.contains('/') {
        return Err(Error::config(format!(
            "{label}: invalid area name {:?} under {path}",
            node.name
        )));
    }

    let mut roles = HashSet::new();
    for role in &node.roles {
        if !roles.insert(role.role.as_str()) {
            return Err(Error::config(format!(
                "{label}: role {} is configured twice in {path}",
                role.role
            )));
        }
    }
    for (construct, groups) in node.constructs(path) {
        check_groups(label, &construct.to_string(), groups)?;
    }

    let mut children = HashSet::new();
    for child in &node.team_areas {
        if !children.insert(child.name.as_str()) {
            return Err(Error::config(format!(
                "{label}: team area {} appears twice under {path}",
                child.name
            )));
        }
        validate_area(label, child, &path.child(&child.name))?;
    }
    Ok(())
}

fn check_groups(label: &str, target: &str, groups: &[String]) -> Result<()> {
    if groups.is_empty() {
        return Err(Error::config(format!(
            "{label}: {target} has no directory group"
        )));
    }
    if groups.iter().any(|g| g.trim().is_empty()) {
        return Err(Error::config(format!(
            "{label}: {target} has an empty directory group name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_JSON: &str = r#"{
        "name": "rtc1",
        "url": "https://rtc1.example.com/ccm",
        "user": "syncadmin",
        "password_env": "RTC1_PASSWORD",
        "permissions": [
            { "permission_group": "JazzAdmins", "directory_group": "cn=G-Admins,ou=groups,o=example" },
            { "permission_group": "JazzUsers", "groups": ["cn=G-Dev,ou=groups,o=example", "cn=G-Test,ou=groups,o=example"] }
        ],
        "licenses": [
            { "license": "developer", "capacity": 2, "priority": ["dave"], "groups": "cn=G-Dev,ou=groups,o=example" }
        ],
        "projects": [
            {
                "name": "Payments",
                "administrators": "cn=G-PayAdmins,ou=groups,o=example",
                "members": ["cn=G-Pay,ou=groups,o=example"],
                "roles": [ { "role": "Tester", "groups": "cn=G-Test,ou=groups,o=example" } ],
                "team_areas": [
                    { "name": "Backend", "members": "cn=G-PayBackend,ou=groups,o=example" }
                ]
            }
        ]
    }"#;

    fn server() -> ServerConfig {
        serde_json::from_str(SERVER_JSON).unwrap()
    }

    #[test]
    fn test_parse_server_config() {
        let server = server();
        assert_eq!(server.label(), "rtc1");
        assert_eq!(server.permissions[0].groups.len(), 1);
        assert_eq!(server.permissions[1].groups.len(), 2);
        assert_eq!(server.licenses[0].capacity, Some(2));
        assert_eq!(server.licenses[0].priority, vec![Identity::from("dave")]);

        let project = &server.projects[0];
        assert_eq!(project.administrators.as_ref().map(Vec::len), Some(1));
        assert_eq!(project.team_areas[0].administrators, None);
        assert!(!server.allows_empty_desired(false));
    }

    #[test]
    fn test_group_mappings() {
        let mappings = server().group_mappings();
        assert_eq!(mappings.len(), 8);

        let backend = AreaPath::root("Payments").child("Backend");
        assert!(mappings.contains(&GroupMapping {
            directory_group: "cn=G-PayBackend,ou=groups,o=example".into(),
            target: Construct::Members { area: backend },
        }));
    }

    #[test]
    fn test_node_constructs_order() {
        let project = &server().projects[0];
        let path = AreaPath::root("Payments");
        let kinds: Vec<String> = project
            .constructs(&path)
            .into_iter()
            .map(|(c, _)| c.to_string())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "administrators of Payments",
                "members of Payments",
                "role Tester in Payments"
            ]
        );
    }

    #[test]
    fn test_validate_ok() {
        assert!(validate_servers(&[server()]).is_ok());
    }

    #[test]
    fn test_validate_no_servers() {
        let err = validate_servers(&[]).unwrap_err();
        assert_eq!(err, Error::config("no servers configured"));
    }

    #[test]
    fn test_validate_duplicates() {
        let err = validate_servers(&[server(), server()]).unwrap_err();
        assert!(err.to_string().contains("duplicate server name: rtc1"));

        let mut twice = server();
        twice.permissions.push(twice.permissions[0].clone());
        assert!(validate_servers(&[twice]).is_err());

        let mut nested = server();
        let backend = nested.projects[0].team_areas[0].clone();
        nested.projects[0].team_areas.push(backend);
        let err = validate_servers(&[nested]).unwrap_err();
        assert!(err.to_string().contains("team area Backend appears twice"));
    }

    #[test]
    fn test_validate_empty_groups() {
        let mut server = server();
        server.licenses[0].groups.clear();
        let err = validate_servers(&[server]).unwrap_err();
        assert!(err.to_string().contains("license developer has no directory group"));
    }

    #[test]
    fn test_label_defaults_to_url() {
        let server = ServerConfig::new("https://rtc2.example.com/ccm");
        assert_eq!(server.label(), "https://rtc2.example.com/ccm");
    }
}
