use anyhow::Result;
use reconcile::{AreaNode, RunStatus, ServerConfig};
use std::collections::BTreeSet;

use crate::Context;
use crate::commands::load_config;
use crate::ui;

/// Area nodes under (and including) each project
fn area_count(projects: &[AreaNode]) -> usize {
    projects
        .iter()
        .map(|p| 1 + area_count(&p.team_areas))
        .sum()
}

/// Distinct directory groups a server reads
fn directory_groups(server: &ServerConfig) -> BTreeSet<String> {
    server
        .group_mappings()
        .into_iter()
        .map(|m| m.directory_group)
        .collect()
}

/// `dirsync validate`: check the configuration without contacting anything
pub fn run(ctx: &Context) -> Result<RunStatus> {
    let (config, path) = load_config(ctx)?;
    config.validate()?;

    if ctx.quiet {
        return Ok(RunStatus::Success);
    }

    ui::header("Configuration");
    ui::kv("File", &path.display().to_string());
    ui::kv("Directory", &config.directory.url);
    ui::kv("Base DN", &config.directory.base_dn);
    ui::kv(
        "Bind",
        config.directory.bind_dn.as_deref().unwrap_or("anonymous"),
    );

    for server in &config.servers {
        ui::section(server.label());
        ui::kv("URL", &server.url);
        ui::kv("User", server.user.as_deref().unwrap_or("(none)"));
        ui::kv("Permission groups", &server.permissions.len().to_string());
        ui::kv("License pools", &server.licenses.len().to_string());
        ui::kv(
            "Areas",
            &format!(
                "{} in {} project(s)",
                area_count(&server.projects),
                server.projects.len()
            ),
        );

        let groups = directory_groups(server);
        ui::kv("Directory groups", &groups.len().to_string());
        if ctx.verbose > 0 {
            for mapping in server.group_mappings() {
                ui::dim(&format!("{} → {}", mapping.directory_group, mapping.target));
            }
        }
    }

    println!();
    ui::success("Configuration is valid");
    Ok(RunStatus::Success)
}
