//! In-memory directory and server, for dry runs against fixtures and tests

use anyhow::{Result, anyhow, bail};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ServerConfig;
use crate::context::{
    DirectoryLookup, ServerConnector, ServerSession, ServerStateReader, ServerStateWriter,
};
use crate::error::Error;
use crate::types::{AreaPath, Construct, Identity, MemberSet};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Directory backed by fixed group listings
#[derive(Default)]
pub struct InMemoryDirectory {
    groups: HashMap<String, Vec<Identity>>,
    users: HashMap<Identity, BTreeMap<String, Vec<String>>>,
    failing: HashSet<String>,
    lookups: Mutex<HashMap<String, usize>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group listing its members in directory order
    pub fn with_group(mut self, group: &str, members: &[&str]) -> Self {
        self.set_group(group, members);
        self
    }

    /// Add a group whose lookup always fails
    pub fn with_failing_group(mut self, group: &str) -> Self {
        self.failing.insert(group.to_string());
        self
    }

    /// Add display attributes for a user
    pub fn with_user(mut self, identity: &str, attributes: &[(&str, &str)]) -> Self {
        let entry = self.users.entry(Identity::from(identity)).or_default();
        for (key, value) in attributes {
            entry.entry((*key).to_string()).or_default().push((*value).to_string());
        }
        self
    }

    /// Replace a group's listing
    pub fn set_group(&mut self, group: &str, members: &[&str]) {
        self.failing.remove(group);
        self.groups.insert(
            group.to_string(),
            members.iter().map(|m| Identity::from(*m)).collect(),
        );
    }

    /// How many times `group` has been looked up
    pub fn lookup_count(&self, group: &str) -> usize {
        lock(&self.lookups).get(group).copied().unwrap_or(0)
    }
}

impl DirectoryLookup for InMemoryDirectory {
    fn resolve_group_members(&self, group: &str) -> Result<Vec<Identity>> {
        *lock(&self.lookups).entry(group.to_string()).or_default() += 1;
        if self.failing.contains(group) {
            bail!("directory unavailable");
        }
        self.groups
            .get(group)
            .cloned()
            .ok_or_else(|| anyhow!("no such group: {group}"))
    }

    fn resolve_user_attributes(
        &self,
        identity: &Identity,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        self.users
            .get(identity)
            .cloned()
            .ok_or_else(|| anyhow!("no such user: {identity}"))
    }
}

/// A call received by an [`InMemoryServer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Read(Construct),
    Grant(Construct, Identity),
    Revoke(Construct, Identity),
    Disconnect,
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Grant(..) | Self::Revoke(..))
    }
}

#[derive(Default)]
struct ServerState {
    members: BTreeMap<Construct, MemberSet>,
    capacities: HashMap<String, usize>,
    missing_areas: Vec<AreaPath>,
    unknown_users: HashSet<Identity>,
    unreadable: HashSet<Construct>,
    calls: Vec<Call>,
}

impl ServerState {
    fn check_area(&self, construct: &Construct) -> Result<()> {
        if let Some(area) = construct.area()
            && self
                .missing_areas
                .iter()
                .any(|missing| missing == area || missing.is_ancestor_of(area))
        {
            return Err(Error::AreaNotFound {
                area: area.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Server whose access state lives in memory.
///
/// Clones share state, so a test can keep one handle to inspect while the
/// engine drives another as its session.
#[derive(Clone, Default)]
pub struct InMemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the current holders of a construct
    pub fn with_members(self, construct: Construct, members: &[&str]) -> Self {
        lock(&self.state)
            .members
            .insert(construct, members.iter().map(|m| Identity::from(*m)).collect());
        self
    }

    /// Limit a license to `capacity` seats
    pub fn with_license(self, license: &str, capacity: usize) -> Self {
        lock(&self.state)
            .capacities
            .insert(license.to_string(), capacity);
        self
    }

    /// Make an area (and everything below it) unknown to the server
    pub fn with_missing_area(self, area: AreaPath) -> Self {
        lock(&self.state).missing_areas.push(area);
        self
    }

    /// Reject every grant to `identity`
    pub fn with_unknown_user(self, identity: &str) -> Self {
        lock(&self.state).unknown_users.insert(Identity::from(identity));
        self
    }

    /// Fail every read of `construct`
    pub fn with_unreadable(self, construct: Construct) -> Self {
        lock(&self.state).unreadable.insert(construct);
        self
    }

    /// Current holders of a construct
    pub fn members(&self, construct: &Construct) -> MemberSet {
        lock(&self.state)
            .members
            .get(construct)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    /// Grants and revokes received so far, in order
    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    fn record(&self, call: Call) {
        lock(&self.state).calls.push(call);
    }
}

impl ServerStateReader for InMemoryServer {
    fn current_members(&mut self, construct: &Construct) -> Result<MemberSet> {
        let mut state = lock(&self.state);
        state.calls.push(Call::Read(construct.clone()));
        state.check_area(construct)?;
        if state.unreadable.contains(construct) {
            bail!("HTTP 500 Internal Server Error");
        }
        Ok(state.members.get(construct).cloned().unwrap_or_default())
    }
}

impl ServerStateWriter for InMemoryServer {
    fn grant(&mut self, construct: &Construct, identity: &Identity) -> Result<()> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(Call::Grant(construct.clone(), identity.clone()));
        state.check_area(construct)?;
        if state.unknown_users.contains(identity) {
            bail!("unknown user: {identity}");
        }

        let capacity = match construct {
            Construct::License { license } => state.capacities.get(license).copied(),
            _ => None,
        };
        let holders = state.members.entry(construct.clone()).or_default();
        if holders.contains(identity) {
            return Ok(());
        }
        if let Some(capacity) = capacity
            && holders.len() >= capacity
        {
            bail!("no seats left on {construct}");
        }
        holders.insert(identity.clone());
        Ok(())
    }

    fn revoke(&mut self, construct: &Construct, identity: &Identity) -> Result<()> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(Call::Revoke(construct.clone(), identity.clone()));
        state.check_area(construct)?;
        if let Some(holders) = state.members.get_mut(construct) {
            holders.remove(identity);
        }
        Ok(())
    }
}

impl ServerSession for InMemoryServer {
    fn disconnect(&mut self) -> Result<()> {
        self.record(Call::Disconnect);
        Ok(())
    }
}

/// Connector handing out sessions on [`InMemoryServer`]s keyed by label
#[derive(Default)]
pub struct InMemoryConnector {
    servers: HashMap<String, InMemoryServer>,
    unreachable: HashSet<String>,
    transient_failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, label: &str, server: InMemoryServer) -> Self {
        self.servers.insert(label.to_string(), server);
        self
    }

    /// Refuse every connection to `label` with a non-retryable error
    pub fn with_unreachable(mut self, label: &str) -> Self {
        self.unreachable.insert(label.to_string());
        self
    }

    /// Fail the first `count` connections to `label` with a retryable error
    pub fn with_transient_failures(self, label: &str, count: u32) -> Self {
        lock(&self.transient_failures).insert(label.to_string(), count);
        self
    }

    /// Number of connection attempts made to `label`
    pub fn attempts(&self, label: &str) -> u32 {
        lock(&self.attempts).get(label).copied().unwrap_or(0)
    }
}

impl ServerConnector for InMemoryConnector {
    fn connect(&self, server: &ServerConfig) -> Result<Box<dyn ServerSession>> {
        let label = server.label();
        *lock(&self.attempts).entry(label.to_string()).or_default() += 1;

        if self.unreachable.contains(label) {
            return Err(Error::Connection {
                server: label.to_string(),
                message: "connection refused".to_string(),
                retryable: false,
            }
            .into());
        }

        if let Some(remaining) = lock(&self.transient_failures).get_mut(label)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::Connection {
                server: label.to_string(),
                message: "503 Service Unavailable".to_string(),
                retryable: true,
            }
            .into());
        }

        let session = self
            .servers
            .get(label)
            .cloned()
            .ok_or_else(|| anyhow!("unknown server: {label}"))?;
        session.record(Call::Connect);
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_is_idempotent() {
        let mut server = InMemoryServer::new();
        let construct = Construct::permission("JazzUsers");
        let alice = Identity::from("alice");

        server.grant(&construct, &alice).unwrap();
        server.grant(&construct, &alice).unwrap();
        server.revoke(&construct, &Identity::from("nobody")).unwrap();

        assert_eq!(server.members(&construct).len(), 1);
    }

    #[test]
    fn test_license_capacity_enforced() {
        let mut server = InMemoryServer::new().with_license("developer", 1);
        let construct = Construct::license("developer");

        server.grant(&construct, &Identity::from("dave")).unwrap();
        let err = server.grant(&construct, &Identity::from("erin")).unwrap_err();
        assert!(err.to_string().contains("no seats left"));
    }

    #[test]
    fn test_missing_area_covers_descendants() {
        let project = AreaPath::root("Gone");
        let mut server = InMemoryServer::new().with_missing_area(project.clone());
        let construct = Construct::Members {
            area: project.child("Team"),
        };

        let err = server.current_members(&construct).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AreaNotFound { .. })
        ));
    }

    #[test]
    fn test_connector_transient_failures() {
        let connector = InMemoryConnector::new()
            .with_server("rtc1", InMemoryServer::new())
            .with_transient_failures("rtc1", 1);
        let config = ServerConfig::new("https://rtc1:9443/ccm").with_name("rtc1");

        assert!(connector.connect(&config).is_err());
        assert!(connector.connect(&config).is_ok());
        assert_eq!(connector.attempts("rtc1"), 2);
    }
}
