//! Long-edge subdivision.
//!
//! Splitting an edge adds a vertex at its midpoint and replaces each
//! adjacent triangle with two:
//! ```text
//!     Before:              After:
//!        C                    C
//!       / \                  /|\
//!      /   \                / | \
//!     /     \              /  |  \
//!    A-------B    ->      A---M---B
//!     \     /              \  |  /
//!      \   /                \ | /
//!       \ /                  \|/
//!        D                    D
//! ```
//! The new triangles stay in the leaf of the triangle they replace. The new
//! vertex is owned by the leaf of the first adjacent triangle.

use glam::Vec3;

use super::EdgeQueue;
use crate::dyntopo::{DynMesh, DynVertId};
use crate::tree::SpatialTree;

/// Rotate a triangle so the edge `v1`-`v2` comes first in winding order.
/// Returns `(first, second, opposite)`.
fn orient_to_edge(verts: [DynVertId; 3], v1: DynVertId, v2: DynVertId) -> Option<(DynVertId, DynVertId, DynVertId)> {
    (0..3).find_map(|i| {
        let (a, b, c) = (verts[i], verts[(i + 1) % 3], verts[(i + 2) % 3]);
        ((a == v1 && b == v2) || (a == v2 && b == v1)).then_some((a, b, c))
    })
}

/// Split the edge `v1`-`v2` at its midpoint.
pub(super) fn split_edge(
    tree: &mut SpatialTree,
    mesh: &mut DynMesh,
    queue: &mut EdgeQueue,
    v1: DynVertId,
    v2: DynVertId,
) {
    let Some(owner) = mesh.vert_owner(v1) else {
        return;
    };
    let node = owner as usize;

    let v_new = mesh.add_vert((mesh.co(v1) + mesh.co(v2)) * 0.5);
    let normal = (mesh.normal(v1) + mesh.normal(v2)).normalize_or(Vec3::Z);
    mesh.set_normal(v_new, normal);
    mesh.set_mask(v_new, (mesh.mask(v1) + mesh.mask(v2)) * 0.5);
    tree.dyn_vert_ownership_transfer(mesh, node, v_new);

    let faces = mesh.edge_faces(v1, v2);
    for (i, face) in faces.into_iter().enumerate() {
        let Some(face_node) = mesh.face_owner(face) else {
            continue;
        };
        let Some((first, second, opp)) = orient_to_edge(mesh.face_verts(face), v1, v2) else {
            continue;
        };
        let ni = face_node as usize;
        if ni != node && i == 0 {
            tree.dyn_vert_ownership_transfer(mesh, ni, v_new);
        }

        let hidden = mesh.is_face_hidden(face);
        for verts in [[first, v_new, opp], [v_new, second, opp]] {
            let created = tree.dyn_face_create(mesh, ni, verts);
            mesh.set_face_hidden(created, hidden);
            queue.long_face_add(mesh, created);
        }

        tree.dyn_face_remove(mesh, face);

        if mesh.vert_owner(v_new) != Some(face_node) {
            if let Some(leaf) = tree.dyn_leaf_mut(ni) {
                leaf.other_verts.insert(v_new);
            }
        }
    }
}

/// Split queued edges longest first. Returns the number of edges split.
pub(super) fn subdivide_long_edges(tree: &mut SpatialTree, mesh: &mut DynMesh, queue: &mut EdgeQueue) -> usize {
    let mut splits = 0;
    while let Some((v1, v2)) = queue.pop() {
        if !mesh.is_vert_alive(v1) || !mesh.is_vert_alive(v2) {
            continue;
        }
        if mesh.vert_owner(v1).is_none() || mesh.vert_owner(v2).is_none() {
            continue;
        }
        if !mesh.edge_exists(v1, v2) {
            continue;
        }
        // Earlier splits may have shortened it
        if mesh.co(v1).distance_squared(mesh.co(v2)) <= queue.limit_len_sq {
            continue;
        }
        split_edge(tree, mesh, queue, v1, v2);
        splits += 1;
    }
    splits
}
