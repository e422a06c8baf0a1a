//! Sync planner - selects which servers and reconciler stages run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A reconciler stage; stages always run in this order within a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Repository permission groups
    Permissions,
    /// Client access licenses
    Licenses,
    /// Project and team area administrators, members and process roles
    Roles,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Permissions, Stage::Licenses, Stage::Roles];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Permissions => "permissions",
            Self::Licenses => "licenses",
            Self::Roles => "roles",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Allow common aliases
        match s.to_lowercase().as_str() {
            "permissions" | "permission" | "perms" => Ok(Self::Permissions),
            "licenses" | "license" | "licences" => Ok(Self::Licenses),
            "roles" | "role" | "areas" | "projects" => Ok(Self::Roles),
            other => Err(Error::config(format!("unknown stage: {other}"))),
        }
    }
}

/// Which servers and stages a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// Only this server (by label); `None` means every configured server
    pub server: Option<String>,
    /// Stages to run, in execution order
    pub stages: Vec<Stage>,
}

impl SyncPlan {
    /// Every server, every stage
    pub fn all() -> Self {
        Self {
            server: None,
            stages: Stage::ALL.to_vec(),
        }
    }

    /// Build a plan from a target filter.
    ///
    /// Target format: "stage", "server" or "server.stage". A bare word that
    /// is not a stage name is taken as a server label.
    pub fn from_target(target: Option<&str>) -> Result<Self, Error> {
        let Some(target) = target else {
            return Ok(Self::all());
        };

        let (server, stage) = parse_target(target);
        match (server, stage) {
            (None, Some(stage)) => Ok(Self {
                server: None,
                stages: vec![stage.parse()?],
            }),
            (Some(server), Some(stage)) => Ok(Self {
                server: Some(server),
                stages: vec![stage.parse()?],
            }),
            (Some(server), None) => Ok(Self {
                server: Some(server),
                stages: Stage::ALL.to_vec(),
            }),
            (None, None) => Err(Error::config(format!("invalid target: {target}"))),
        }
    }

    pub fn includes_stage(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn includes_server(&self, label: &str) -> bool {
        self.server.as_deref().is_none_or(|s| s == label)
    }
}

impl Default for SyncPlan {
    fn default() -> Self {
        Self::all()
    }
}

/// Parse a target string like "server.stage" into (server, stage)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let target = target.trim();
    if target.is_empty() {
        return (None, None);
    }

    // Server labels may contain dots (host names), so split on the last one
    // and only when the suffix names a stage.
    if let Some((server, stage)) = target.rsplit_once('.')
        && stage.parse::<Stage>().is_ok()
        && !server.is_empty()
    {
        return (Some(server.to_string()), Some(stage.to_string()));
    }

    if target.parse::<Stage>().is_ok() {
        (None, Some(target.to_string()))
    } else {
        (Some(target.to_string()), None)
    }
}
