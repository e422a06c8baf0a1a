//! Desired state resolution from the directory

use log::debug;
use std::collections::HashMap;

use crate::context::DirectoryLookup;
use crate::error::{Error, Result};
use crate::types::{Identity, MemberSet};

/// Union of the members of every directory group mapped to one construct
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredMembers {
    /// Members in directory-list order, first occurrence wins
    pub ordered: Vec<Identity>,
    pub set: MemberSet,
}

impl DesiredMembers {
    fn push(&mut self, identity: &Identity) {
        if self.set.insert(identity.clone()) {
            self.ordered.push(identity.clone());
        }
    }
}

/// Directory lookups memoized for a single server pass.
///
/// A resolver is created per server, so nothing is cached across servers and
/// every server sees the directory as of its own pass.
pub struct DesiredResolver<'a> {
    directory: &'a dyn DirectoryLookup,
    cache: HashMap<String, Vec<Identity>>,
    lookups: usize,
}

impl<'a> DesiredResolver<'a> {
    pub fn new(directory: &'a dyn DirectoryLookup) -> Self {
        Self {
            directory,
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    /// Resolve the union of `groups`.
    ///
    /// Any failed group fails the whole resolution: a partial union would
    /// look like a legitimate shrink and revoke real members.
    pub fn resolve(&mut self, groups: &[String]) -> Result<DesiredMembers> {
        let mut desired = DesiredMembers::default();
        for group in groups {
            for identity in self.members(group)? {
                desired.push(identity);
            }
        }
        Ok(desired)
    }

    fn members(&mut self, group: &str) -> Result<&[Identity]> {
        if !self.cache.contains_key(group) {
            self.lookups += 1;
            let members = self
                .directory
                .resolve_group_members(group)
                .map_err(|e| Error::lookup(group, &e))?;
            debug!("Directory group {} has {} members", group, members.len());
            self.cache.insert(group.to_string(), members);
        }
        Ok(self.cache.get(group).map(Vec::as_slice).unwrap_or_default())
    }

    /// Number of directory round trips made so far
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn directory(&self) -> &'a dyn DirectoryLookup {
        self.directory
    }
}
