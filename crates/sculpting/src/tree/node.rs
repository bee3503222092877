//! Tree nodes and their per-backend leaf payloads.

use std::collections::BTreeSet;
use std::ops::Range;

use bitflags::bitflags;
use glam::Vec3;

use crate::dyntopo::{DynFaceId, DynVertId};
use crate::spatial::Bounds;

bitflags! {
    /// State bits of a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u16 {
        const LEAF = 1 << 0;
        const FULLY_HIDDEN = 1 << 1;
        const FULLY_MASKED = 1 << 2;
        const FULLY_UNMASKED = 1 << 3;
        /// Dynamic topology should refine this leaf on the next update
        const TOPOLOGY_UPDATE_NEEDED = 1 << 4;
        const NEEDS_PIXEL_REBUILD = 1 << 5;
        /// Mask flags are stale
        const UPDATE_MASK = 1 << 6;
        /// Bounds changed and parents have not been refreshed yet
        const UPDATE_BOUNDS = 1 << 7;
        /// Dynamic topology changed the leaf's faces during an update
        const TOPOLOGY_UPDATED = 1 << 8;
    }
}

/// Faces of a mesh leaf and the vertices they reference.
#[derive(Debug, Clone, Default)]
pub struct MeshLeaf {
    pub(crate) prims: Range<usize>,
    pub(crate) verts: Vec<u32>,
    pub(crate) unique_verts_num: usize,
}

impl MeshLeaf {
    /// Vertices first claimed by this leaf, followed by shared ones.
    pub fn verts(&self) -> &[u32] {
        &self.verts
    }

    pub fn unique_verts(&self) -> &[u32] {
        &self.verts[..self.unique_verts_num]
    }

    pub fn shared_verts(&self) -> &[u32] {
        &self.verts[self.unique_verts_num..]
    }
}

/// Grids of a subdivision leaf.
#[derive(Debug, Clone, Default)]
pub struct GridsLeaf {
    pub(crate) prims: Range<usize>,
}

/// Stroke-start copy of a dynamic-topology leaf for original ray casts.
#[derive(Debug, Clone, Default)]
pub struct OrigSnapshot {
    pub positions: Vec<Vec3>,
    pub verts: Vec<DynVertId>,
    pub tris: Vec<[u32; 3]>,
}

/// Triangles of a dynamic-topology leaf.
#[derive(Debug, Clone, Default)]
pub struct DynTopoLeaf {
    pub(crate) faces: BTreeSet<DynFaceId>,
    /// Vertices owned by this leaf
    pub(crate) unique_verts: BTreeSet<DynVertId>,
    /// Vertices of this leaf's faces owned by another leaf
    pub(crate) other_verts: BTreeSet<DynVertId>,
    pub(crate) orig: Option<OrigSnapshot>,
}

impl DynTopoLeaf {
    pub fn faces(&self) -> &BTreeSet<DynFaceId> {
        &self.faces
    }

    pub fn unique_verts(&self) -> &BTreeSet<DynVertId> {
        &self.unique_verts
    }

    pub fn other_verts(&self) -> &BTreeSet<DynVertId> {
        &self.other_verts
    }

    pub fn orig(&self) -> Option<&OrigSnapshot> {
        self.orig.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
pub enum NodePayload {
    #[default]
    Inner,
    Mesh(MeshLeaf),
    Grids(GridsLeaf),
    DynTopo(DynTopoLeaf),
}

/// A node of the tree. Inner nodes have two children stored next to each
/// other starting at `children_offset`.
#[derive(Debug, Clone, Default)]
pub struct SpatialNode {
    pub(crate) bounds: Bounds,
    pub(crate) bounds_orig: Bounds,
    pub(crate) parent: Option<u32>,
    pub(crate) children_offset: u32,
    pub(crate) flags: NodeFlags,
    pub(crate) payload: NodePayload,
}

impl SpatialNode {
    pub(crate) fn leaf(parent: Option<u32>, payload: NodePayload) -> Self {
        Self {
            parent,
            flags: NodeFlags::LEAF,
            payload,
            ..Default::default()
        }
    }

    #[inline]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Bounds at the last [`crate::SpatialTree::store_bounds_orig`]
    #[inline]
    pub fn bounds_orig(&self) -> &Bounds {
        &self.bounds_orig
    }

    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent.map(|p| p as usize)
    }

    pub fn children(&self) -> Option<[usize; 2]> {
        (!self.is_leaf()).then(|| {
            let first = self.children_offset as usize;
            [first, first + 1]
        })
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: NodeFlags, value: bool) {
        self.flags.set(flag, value);
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(NodeFlags::LEAF)
    }

    pub fn is_fully_hidden(&self) -> bool {
        self.flags.contains(NodeFlags::FULLY_HIDDEN)
    }

    pub fn is_fully_masked(&self) -> bool {
        self.flags.contains(NodeFlags::FULLY_MASKED)
    }

    pub fn is_fully_unmasked(&self) -> bool {
        self.flags.contains(NodeFlags::FULLY_UNMASKED)
    }

    pub fn payload(&self) -> &NodePayload {
        &self.payload
    }

    pub fn as_mesh(&self) -> Option<&MeshLeaf> {
        match &self.payload {
            NodePayload::Mesh(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_grids(&self) -> Option<&GridsLeaf> {
        match &self.payload {
            NodePayload::Grids(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_dyntopo(&self) -> Option<&DynTopoLeaf> {
        match &self.payload {
            NodePayload::DynTopo(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub(crate) fn as_dyntopo_mut(&mut self) -> Option<&mut DynTopoLeaf> {
        match &mut self.payload {
            NodePayload::DynTopo(leaf) => Some(leaf),
            _ => None,
        }
    }
}
