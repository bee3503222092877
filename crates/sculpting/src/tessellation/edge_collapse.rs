//! Short-edge collapse.
//!
//! Collapsing an edge merges one endpoint into the other. The triangles on
//! the edge disappear and the rest of the removed vertex's fan is rebuilt
//! around the kept vertex:
//! ```text
//!     Before:              After:
//!        C                    C
//!       / \                   |
//!      /   \                  |
//!     /     \                 |
//!    A-------B    ->          M
//!     \     /                 |
//!      \   /                  |
//!       \ /                   |
//!        D                    D
//! ```
//! Boundary vertices are always kept, otherwise the vertex with the lower
//! mask is removed. Triangles that would fold onto an existing triangle are
//! deleted together with it.

use std::collections::HashMap;

use glam::Vec3;

use super::EdgeQueue;
use crate::dyntopo::{DynFaceId, DynMesh, DynVertId};
use crate::tree::SpatialTree;

/// Where each removed vertex went: the vertex it merged into, or `None`
/// when it vanished with its last triangle.
type DeletedVerts = HashMap<DynVertId, Option<DynVertId>>;

/// Follow merges from `vert` to a live vertex.
fn resolve_deleted(deleted: &DeletedVerts, mut vert: DynVertId) -> Option<DynVertId> {
    while let Some(&target) = deleted.get(&vert) {
        vert = target?;
    }
    Some(vert)
}

/// Collapse the edge `v1`-`v2`.
pub(super) fn collapse_edge(
    tree: &mut SpatialTree,
    mesh: &mut DynMesh,
    v1: DynVertId,
    v2: DynVertId,
    deleted: &mut DeletedVerts,
) {
    let (v_del, v_conn) = if mesh.vert_is_boundary(v1) {
        (v2, v1)
    } else if mesh.vert_is_boundary(v2) {
        (v1, v2)
    } else if mesh.mask(v1) < mesh.mask(v2) {
        (v1, v2)
    } else {
        (v2, v1)
    };
    let conn_boundary = mesh.vert_is_boundary(v_conn);

    tree.dyn_vert_remove(mesh, v_del);

    let fan: Vec<DynFaceId> = mesh
        .vert_faces(v_del)
        .iter()
        .copied()
        .filter(|&f| !mesh.face_verts(f).contains(&v_conn))
        .collect();

    // Triangles already spanning v_conn and the far edge of the fan
    let mut deleted_faces: Vec<DynFaceId> = fan
        .iter()
        .filter_map(|&f| {
            let [a, b] = other_verts(mesh.face_verts(f), v_del);
            mesh.face_exists([v_conn, a, b])
        })
        .collect();

    for face in mesh.edge_faces(v1, v2) {
        tree.dyn_face_remove(mesh, face);
    }

    for &face in &fan {
        deleted_faces.push(face);
        let Some(node) = mesh.face_owner(face) else {
            continue;
        };
        let node = node as usize;
        let tri = mesh.face_verts(face).map(|v| if v == v_del { v_conn } else { v });
        if mesh.face_exists(tri).is_none() {
            let hidden = mesh.is_face_hidden(face);
            let created = tree.dyn_face_create(mesh, node, tri);
            mesh.set_face_hidden(created, hidden);
            if mesh.vert_owner(v_conn) != Some(node as u32) {
                if let Some(leaf) = tree.dyn_leaf_mut(node) {
                    leaf.other_verts.insert(v_conn);
                }
            }
        }
    }

    let mut v_conn = Some(v_conn);
    for face in deleted_faces {
        if !mesh.is_face_alive(face) {
            continue;
        }
        let verts = mesh.face_verts(face);
        tree.dyn_face_remove(mesh, face);
        for vert in verts {
            if vert == v_del || !mesh.is_vert_alive(vert) || !mesh.vert_faces(vert).is_empty() {
                continue;
            }
            tree.dyn_vert_remove(mesh, vert);
            if v_conn == Some(vert) {
                v_conn = None;
            }
            deleted.insert(vert, None);
            mesh.remove_vert(vert);
        }
    }

    if let Some(v_conn) = v_conn {
        if !conn_boundary {
            mesh.set_co(v_conn, (mesh.co(v_conn) + mesh.co(v_del)) * 0.5);
        }
        let normal = (mesh.normal(v_conn) + mesh.normal(v_del)).normalize_or(Vec3::Z);
        mesh.set_normal(v_conn, normal);
        keep_owner_in_use(tree, mesh, v_conn);

        let faces: Vec<DynFaceId> = mesh.vert_faces(v_conn).to_vec();
        for face in faces {
            mesh.update_face_normal(face);
            if let Some(node) = mesh.face_owner(face) {
                tree.dyn_mark_updated(node as usize);
            }
        }
    }

    deleted.insert(v_del, v_conn);
    mesh.remove_vert(v_del);
}

fn other_verts(verts: [DynVertId; 3], vert: DynVertId) -> [DynVertId; 2] {
    let i = verts.iter().position(|&v| v == vert).unwrap_or(0);
    [verts[(i + 1) % 3], verts[(i + 2) % 3]]
}

/// Hand `vert` to a leaf that still has triangles using it.
fn keep_owner_in_use(tree: &mut SpatialTree, mesh: &mut DynMesh, vert: DynVertId) {
    let owner = mesh.vert_owner(vert);
    let owner_uses = mesh.vert_faces(vert).iter().any(|&f| mesh.face_owner(f) == owner);
    if owner_uses {
        return;
    }
    let user = mesh.vert_faces(vert).iter().find_map(|&f| mesh.face_owner(f));
    if let Some(user) = user {
        tree.dyn_vert_ownership_transfer(mesh, user as usize, vert);
    }
}

/// Collapse queued edges shortest first. Returns the number collapsed.
pub(super) fn collapse_short_edges(tree: &mut SpatialTree, mesh: &mut DynMesh, queue: &mut EdgeQueue) -> usize {
    let mut deleted = DeletedVerts::new();
    let mut collapses = 0;
    while let Some((v1, v2)) = queue.pop() {
        let (Some(v1), Some(v2)) = (resolve_deleted(&deleted, v1), resolve_deleted(&deleted, v2)) else {
            continue;
        };
        if v1 == v2 || !mesh.edge_exists(v1, v2) {
            continue;
        }
        if mesh.co(v1).distance_squared(mesh.co(v2)) >= queue.limit_len_sq {
            continue;
        }
        if mesh.vert_owner(v1).is_none() || mesh.vert_owner(v2).is_none() {
            continue;
        }
        collapse_edge(tree, mesh, v1, v2, &mut deleted);
        collapses += 1;
    }
    collapses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellation::tests::{dyn_tree, everywhere};
    use crate::tessellation::{update_topology, TopologyMode};
    use chisel_config::SculptConfig;
    use subdiv::Mesh;

    #[test]
    fn test_resolve_deleted_chain() {
        let v = |i| DynVertId(i);
        let mut deleted = DeletedVerts::new();
        deleted.insert(v(1), Some(v(2)));
        deleted.insert(v(2), Some(v(3)));
        deleted.insert(v(4), None);
        assert_eq!(resolve_deleted(&deleted, v(1)), Some(v(3)));
        assert_eq!(resolve_deleted(&deleted, v(0)), Some(v(0)));
        assert_eq!(resolve_deleted(&deleted, v(4)), None);
    }

    #[test]
    fn test_collapse_interior_edge() {
        let mut mesh = DynMesh::from_mesh(&Mesh::quad_grid(4, 4, 2.0));
        let config = SculptConfig {
            dyntopo_leaf_limit: 4,
            ..Default::default()
        };
        let mut tree = SpatialTree::from_dyntopo(&mut mesh, &config);

        // Centre vertex and its neighbour along the row
        let (v1, v2) = (DynVertId(12), DynVertId(13));
        assert!(mesh.edge_exists(v1, v2));
        let mid = (mesh.co(v1) + mesh.co(v2)) * 0.5;
        let faces_before = mesh.faces_num();
        let verts_before = mesh.verts_num();

        let mut deleted = DeletedVerts::new();
        collapse_edge(&mut tree, &mut mesh, v1, v2, &mut deleted);

        assert_eq!(mesh.faces_num(), faces_before - 2);
        assert_eq!(mesh.verts_num(), verts_before - 1);
        assert!(!mesh.is_vert_alive(v2));
        assert_eq!(deleted.get(&v2), Some(&Some(v1)));
        assert!((mesh.co(v1) - mid).length() < 1e-6);
        assert!(tree.check_dyntopo_ownership(&mesh));
    }

    #[test]
    fn test_collapse_keeps_boundary_vertex() {
        let mut mesh = DynMesh::from_mesh(&Mesh::quad_grid(4, 4, 2.0));
        let mut tree = SpatialTree::from_dyntopo(&mut mesh, &SculptConfig::default());
        // Vertex 2 sits on the bottom border, 7 just inside it
        let (border, inner) = (DynVertId(2), DynVertId(7));
        let border_co = mesh.co(border);
        let mut deleted = DeletedVerts::new();
        collapse_edge(&mut tree, &mut mesh, inner, border, &mut deleted);

        assert!(mesh.is_vert_alive(border));
        assert!(!mesh.is_vert_alive(inner));
        assert_eq!(mesh.co(border), border_co);
        assert!(tree.check_dyntopo_ownership(&mesh));
    }

    #[test]
    fn test_collapse_pass_coarsens() {
        let (mut tree, mut mesh) = dyn_tree(4, 2.0);
        let faces_before = mesh.faces_num();
        let leaves = tree.all_leaf_nodes();
        tree.mark_topology_update(&leaves);
        let stats = update_topology(&mut tree, &mut mesh, TopologyMode::COLLAPSE, &everywhere());

        assert!(stats.edges_collapsed > 0);
        assert_eq!(stats.edges_split, 0);
        assert!(mesh.faces_num() < faces_before);
        assert!(tree.check_dyntopo_ownership(&mesh));
        for face in mesh.face_ids() {
            assert!(mesh.face_verts(face).iter().all(|&v| mesh.is_vert_alive(v)));
        }
    }

    #[test]
    fn test_masked_region_untouched() {
        let (mut tree, mut mesh) = dyn_tree(4, 2.0);
        let verts: Vec<DynVertId> = mesh.vert_ids().collect();
        for vert in verts {
            mesh.set_mask(vert, 1.0);
        }
        let faces_before = mesh.faces_num();
        let leaves = tree.all_leaf_nodes();
        tree.mark_topology_update(&leaves);
        let mode = TopologyMode::COLLAPSE | TopologyMode::SUBDIVIDE;
        let stats = update_topology(&mut tree, &mut mesh, mode, &everywhere());

        assert!(!stats.modified());
        assert_eq!(mesh.faces_num(), faces_before);
    }
}
