use anyhow::{Context as _, Result};
use colored::Colorize;
use ldapkit::LdapDirectory;
use reconcile::{Identity, RunStatus};
use std::collections::BTreeMap;

use crate::Context;
use crate::commands::{connect_directory, load_config};
use crate::secrets::{self, Prompt};
use crate::ui;

/// Attributes shown for each member with `--describe`
const DISPLAY_ATTRIBUTES: [&str; 3] = ["cn", "displayName", "mail"];

/// First value of each display attribute that is present
fn display_line(attrs: &BTreeMap<String, Vec<String>>) -> String {
    DISPLAY_ATTRIBUTES
        .iter()
        .filter_map(|name| {
            attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .and_then(|(_, values)| values.first())
        })
        .cloned()
        .collect::<Vec<_>>()
        .join(" · ")
}

fn describe(directory: &LdapDirectory, id: &Identity) -> String {
    match directory.user_attributes(id.as_str()) {
        Ok(attrs) => display_line(&attrs),
        Err(e) => format!("({e})"),
    }
}

/// `dirsync lookup <group>`: resolve a group the way a sync would
pub fn run(ctx: &Context, group: &str, describe_members: bool) -> Result<RunStatus> {
    let (mut config, _) = load_config(ctx)?;
    config
        .directory
        .validate()
        .context("Invalid directory section")?;
    secrets::resolve_directory(&mut config, Prompt::detect())?;

    let directory = connect_directory(&config)?;
    let mut members = directory.group_members(group)?;
    members.sort();
    members.dedup();

    if ctx.quiet {
        for id in &members {
            println!("{id}");
        }
    } else {
        ui::header(&format!("Group {group}"));
        if members.is_empty() {
            ui::warn("Group has no members");
        }
        for id in &members {
            if describe_members {
                println!("  {:<16} {}", id.as_str().bold(), describe(&directory, id).dimmed());
            } else {
                println!("  {id}");
            }
        }
        println!();
        ui::info(&format!("{} member(s)", members.len()));
    }

    directory.close()?;
    Ok(RunStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_line_picks_known_attributes() {
        let attrs = BTreeMap::from([
            ("CN".to_string(), vec!["Alice Smith".to_string()]),
            ("mail".to_string(), vec!["alice@example.com".to_string()]),
            ("objectClass".to_string(), vec!["person".to_string()]),
        ]);
        assert_eq!(display_line(&attrs), "Alice Smith · alice@example.com");
    }

    #[test]
    fn test_display_line_empty() {
        assert_eq!(display_line(&BTreeMap::new()), "");
    }
}
