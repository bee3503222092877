//! Draw-cache notifications for sculpted geometry.
//!
//! The tree never touches GPU buffers. It queues what changed per node and
//! publishes the queue to a [`DrawCacheSink`] once the parallel brush pass
//! has joined; the renderer decides whether to patch or rebuild.

#[cfg(feature = "bevy")]
use bevy::asset::{Assets, Handle};
#[cfg(feature = "bevy")]
use bevy::prelude::Mesh as BevyMesh;

use std::collections::BTreeSet;

#[cfg(feature = "bevy")]
use crate::surface::MeshSurface;

/// What changed on a set of leaves since the last publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawNotification {
    Positions(Vec<usize>),
    Visibility(Vec<usize>),
    Topology(Vec<usize>),
    FaceSets(Vec<usize>),
    Masks(Vec<usize>),
    Attribute { name: String, nodes: Vec<usize> },
}

impl DrawNotification {
    pub fn nodes(&self) -> &[usize] {
        match self {
            Self::Positions(nodes)
            | Self::Visibility(nodes)
            | Self::Topology(nodes)
            | Self::FaceSets(nodes)
            | Self::Masks(nodes)
            | Self::Attribute { nodes, .. } => nodes,
        }
    }
}

/// Push-only receiver of draw-cache invalidations
pub trait DrawCacheSink {
    fn notify(&mut self, notification: DrawNotification);
}

/// Sink that accumulates the leaves needing a redraw.
#[derive(Debug, Default)]
pub struct DirtyNodes {
    /// Leaves whose vertex buffers must be refreshed
    pub modified: BTreeSet<usize>,
    /// Leaves whose index buffers must be rebuilt
    pub rebuild: BTreeSet<usize>,
    /// Attribute layers named in notifications
    pub attributes: BTreeSet<String>,
}

impl DirtyNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, node: usize) {
        self.modified.insert(node);
    }

    pub fn mark_all(&mut self, nodes: impl IntoIterator<Item = usize>) {
        self.modified.extend(nodes);
    }

    pub fn clear(&mut self) {
        self.modified.clear();
        self.rebuild.clear();
        self.attributes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.rebuild.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.union(&self.rebuild).count()
    }
}

impl DrawCacheSink for DirtyNodes {
    fn notify(&mut self, notification: DrawNotification) {
        match notification {
            DrawNotification::Topology(nodes) | DrawNotification::Visibility(nodes) => {
                self.rebuild.extend(nodes)
            }
            DrawNotification::Attribute { name, nodes } => {
                self.attributes.insert(name);
                self.modified.extend(nodes);
            }
            other => self.mark_all(other.nodes().iter().copied()),
        }
    }
}

/// Replace the render mesh of a sculpted surface if any leaf is dirty.
#[cfg(feature = "bevy")]
pub fn sync_surface_to_gpu(
    surface: &MeshSurface,
    dirty: &mut DirtyNodes,
    meshes: &mut Assets<BevyMesh>,
    handle: &Handle<BevyMesh>,
) -> bool {
    if dirty.is_empty() {
        return false;
    }
    if let Some(mesh) = meshes.get_mut(handle) {
        *mesh = surface.mesh().to_bevy_mesh();
    }
    dirty.clear();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_nodes() {
        let mut dirty = DirtyNodes::new();
        assert!(dirty.is_empty());

        dirty.mark(0);
        dirty.mark(1);
        dirty.mark(0);
        assert_eq!(dirty.len(), 2);

        dirty.clear();
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_notifications_route_by_kind() {
        let mut dirty = DirtyNodes::new();
        dirty.notify(DrawNotification::Positions(vec![1, 2]));
        dirty.notify(DrawNotification::Topology(vec![2, 3]));
        dirty.notify(DrawNotification::Attribute {
            name: "color".into(),
            nodes: vec![4],
        });
        assert_eq!(dirty.modified.iter().copied().collect::<Vec<_>>(), [1, 2, 4]);
        assert_eq!(dirty.rebuild.iter().copied().collect::<Vec<_>>(), [2, 3]);
        assert!(dirty.attributes.contains("color"));
        assert_eq!(dirty.len(), 4);
    }
}
