//! Project / team area tree traversal

use crate::config::AreaNode;
use crate::types::AreaPath;

/// A configured area together with its full path
#[derive(Debug, Clone, Copy)]
pub struct HierarchyNode<'a> {
    pub path: &'a AreaPath,
    pub node: &'a AreaNode,
}

/// Owned paths for a project tree, grouped breadth-first by depth.
///
/// Every node of level `n` has its parent in level `n - 1`, so walking the
/// levels in order reconciles each parent before any of its children.
#[derive(Debug)]
pub struct Levels<'a> {
    levels: Vec<Vec<(AreaPath, &'a AreaNode)>>,
}

impl Levels<'_> {
    pub fn iter(&self) -> impl Iterator<Item = Vec<HierarchyNode<'_>>> {
        self.levels.iter().map(|level| {
            level
                .iter()
                .map(|(path, node)| HierarchyNode { path, node: *node })
                .collect()
        })
    }

    /// Number of levels (tree height)
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Every path in traversal order
    pub fn paths(&self) -> impl Iterator<Item = &AreaPath> {
        self.levels.iter().flatten().map(|(path, _)| path)
    }
}

/// Walk a project tree breadth-first
pub fn levels<'a>(project: &'a AreaNode) -> Levels<'a> {
    let mut levels = Vec::new();
    let mut current = vec![(AreaPath::root(&project.name), project)];

    while !current.is_empty() {
        let next: Vec<(AreaPath, &'a AreaNode)> = current
            .iter()
            .flat_map(|(path, node)| {
                let node: &'a AreaNode = node;
                node.team_areas
                    .iter()
                    .map(move |child| (path.child(&child.name), child))
            })
            .collect();
        levels.push(current);
        current = next;
    }

    Levels { levels }
}
