//! Triangle mesh with stable ids for dynamic-topology sculpting.
//!
//! Elements are never moved: deleting a vertex or face leaves a tombstone so
//! ids held by tree nodes and edge queues stay valid for the whole stroke.
//! Every vertex and face records the leaf that owns it.

use glam::Vec3;
use smallvec::SmallVec;
use subdiv::{Mesh, MeshError};

use crate::spatial::Bounds;

/// Type-safe dynamic vertex identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DynVertId(pub u32);

/// Type-safe dynamic triangle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DynFaceId(pub u32);

#[derive(Debug, Clone)]
struct DynVert {
    co: Vec3,
    orig_co: Vec3,
    no: Vec3,
    mask: f32,
    hidden: bool,
    faces: SmallVec<[DynFaceId; 8]>,
    owner: Option<u32>,
    alive: bool,
}

#[derive(Debug, Clone)]
struct DynFace {
    verts: [DynVertId; 3],
    no: Vec3,
    hidden: bool,
    owner: Option<u32>,
    alive: bool,
}

/// Triangle mesh edited in place by dynamic topology.
#[derive(Debug, Clone, Default)]
pub struct DynMesh {
    verts: Vec<DynVert>,
    faces: Vec<DynFace>,
    verts_alive: usize,
    faces_alive: usize,
}

fn tri_normal(tri: [Vec3; 3]) -> Vec3 {
    (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero()
}

impl DynMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positions and triangle indices.
    pub fn from_triangles(positions: &[Vec3], tris: &[[u32; 3]]) -> Result<Self, MeshError> {
        let mut mesh = Self::new();
        for &co in positions {
            mesh.add_vert(co);
        }
        for (face, tri) in tris.iter().enumerate() {
            if let Some(&vert) = tri.iter().find(|&&v| v as usize >= positions.len()) {
                return Err(MeshError::VertexOutOfRange {
                    face,
                    vert,
                    verts_num: positions.len(),
                });
            }
            mesh.add_face(tri.map(DynVertId));
        }
        mesh.update_all_normals();
        Ok(mesh)
    }

    /// Fan-triangulate a polygon mesh, carrying hide and mask attributes.
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let mut dyn_mesh = Self::new();
        for (vert, &co) in mesh.positions().iter().enumerate() {
            let id = dyn_mesh.add_vert(co);
            dyn_mesh.set_mask(id, mesh.vert_mask(vert));
            dyn_mesh.set_vert_hidden(id, mesh.is_vert_hidden(vert));
        }
        for face in 0..mesh.faces_num() {
            let verts = mesh.face_verts(face);
            for i in 1..verts.len() - 1 {
                let id = dyn_mesh.add_face([
                    DynVertId(verts[0]),
                    DynVertId(verts[i]),
                    DynVertId(verts[i + 1]),
                ]);
                dyn_mesh.set_face_hidden(id, mesh.is_face_hidden(face));
            }
        }
        dyn_mesh.update_all_normals();
        dyn_mesh
    }

    pub fn add_vert(&mut self, co: Vec3) -> DynVertId {
        let id = DynVertId(self.verts.len() as u32);
        self.verts.push(DynVert {
            co,
            orig_co: co,
            no: Vec3::ZERO,
            mask: 0.0,
            hidden: false,
            faces: SmallVec::new(),
            owner: None,
            alive: true,
        });
        self.verts_alive += 1;
        id
    }

    /// Add a triangle; the caller checks it does not exist yet.
    pub fn add_face(&mut self, verts: [DynVertId; 3]) -> DynFaceId {
        debug_assert!(self.face_exists(verts).is_none());
        let id = DynFaceId(self.faces.len() as u32);
        let no = tri_normal(verts.map(|v| self.co(v)));
        self.faces.push(DynFace {
            verts,
            no,
            hidden: false,
            owner: None,
            alive: true,
        });
        for v in verts {
            self.verts[v.0 as usize].faces.push(id);
        }
        self.faces_alive += 1;
        id
    }

    pub fn remove_face(&mut self, face: DynFaceId) {
        let f = &mut self.faces[face.0 as usize];
        if !f.alive {
            return;
        }
        f.alive = false;
        f.owner = None;
        let verts = f.verts;
        for v in verts {
            self.verts[v.0 as usize].faces.retain(|&mut other| other != face);
        }
        self.faces_alive -= 1;
    }

    /// Remove a vertex that no face uses any more.
    pub fn remove_vert(&mut self, vert: DynVertId) {
        let v = &mut self.verts[vert.0 as usize];
        debug_assert!(v.faces.is_empty());
        if v.alive {
            v.alive = false;
            v.owner = None;
            self.verts_alive -= 1;
        }
    }

    #[inline]
    pub fn verts_num(&self) -> usize {
        self.verts_alive
    }

    #[inline]
    pub fn faces_num(&self) -> usize {
        self.faces_alive
    }

    /// Length of the vertex id space, tombstones included.
    #[inline]
    pub fn verts_len(&self) -> usize {
        self.verts.len()
    }

    #[inline]
    pub fn faces_len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_vert_alive(&self, vert: DynVertId) -> bool {
        self.verts.get(vert.0 as usize).is_some_and(|v| v.alive)
    }

    pub fn is_face_alive(&self, face: DynFaceId) -> bool {
        self.faces.get(face.0 as usize).is_some_and(|f| f.alive)
    }

    pub fn vert_ids(&self) -> impl Iterator<Item = DynVertId> + '_ {
        self.verts
            .iter()
            .enumerate()
            .filter(|(_, v)| v.alive)
            .map(|(i, _)| DynVertId(i as u32))
    }

    pub fn face_ids(&self) -> impl Iterator<Item = DynFaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, f)| f.alive)
            .map(|(i, _)| DynFaceId(i as u32))
    }

    #[inline]
    pub fn co(&self, vert: DynVertId) -> Vec3 {
        self.verts[vert.0 as usize].co
    }

    #[inline]
    pub fn set_co(&mut self, vert: DynVertId, co: Vec3) {
        self.verts[vert.0 as usize].co = co;
    }

    /// Position at the last [`DynMesh::store_original`] (or creation).
    #[inline]
    pub fn orig_co(&self, vert: DynVertId) -> Vec3 {
        self.verts[vert.0 as usize].orig_co
    }

    pub fn store_original(&mut self) {
        for v in &mut self.verts {
            v.orig_co = v.co;
        }
    }

    #[inline]
    pub fn normal(&self, vert: DynVertId) -> Vec3 {
        self.verts[vert.0 as usize].no
    }

    pub fn set_normal(&mut self, vert: DynVertId, no: Vec3) {
        self.verts[vert.0 as usize].no = no;
    }

    #[inline]
    pub fn mask(&self, vert: DynVertId) -> f32 {
        self.verts[vert.0 as usize].mask
    }

    pub fn set_mask(&mut self, vert: DynVertId, mask: f32) {
        self.verts[vert.0 as usize].mask = mask;
    }

    #[inline]
    pub fn is_vert_hidden(&self, vert: DynVertId) -> bool {
        self.verts[vert.0 as usize].hidden
    }

    pub fn set_vert_hidden(&mut self, vert: DynVertId, hidden: bool) {
        self.verts[vert.0 as usize].hidden = hidden;
    }

    #[inline]
    pub fn face_verts(&self, face: DynFaceId) -> [DynVertId; 3] {
        self.faces[face.0 as usize].verts
    }

    pub fn face_positions(&self, face: DynFaceId) -> [Vec3; 3] {
        self.face_verts(face).map(|v| self.co(v))
    }

    #[inline]
    pub fn face_normal(&self, face: DynFaceId) -> Vec3 {
        self.faces[face.0 as usize].no
    }

    #[inline]
    pub fn is_face_hidden(&self, face: DynFaceId) -> bool {
        self.faces[face.0 as usize].hidden
    }

    pub fn set_face_hidden(&mut self, face: DynFaceId, hidden: bool) {
        self.faces[face.0 as usize].hidden = hidden;
    }

    pub fn face_bounds(&self, face: DynFaceId) -> Bounds {
        Bounds::from_points(self.face_positions(face))
    }

    #[inline]
    pub fn vert_faces(&self, vert: DynVertId) -> &[DynFaceId] {
        &self.verts[vert.0 as usize].faces
    }

    #[inline]
    pub fn vert_owner(&self, vert: DynVertId) -> Option<u32> {
        self.verts[vert.0 as usize].owner
    }

    pub fn set_vert_owner(&mut self, vert: DynVertId, owner: Option<u32>) {
        self.verts[vert.0 as usize].owner = owner;
    }

    #[inline]
    pub fn face_owner(&self, face: DynFaceId) -> Option<u32> {
        self.faces[face.0 as usize].owner
    }

    pub fn set_face_owner(&mut self, face: DynFaceId, owner: Option<u32>) {
        self.faces[face.0 as usize].owner = owner;
    }

    /// Existing triangle with the same three vertices in any order.
    pub fn face_exists(&self, verts: [DynVertId; 3]) -> Option<DynFaceId> {
        self.vert_faces(verts[0]).iter().copied().find(|&f| {
            let fv = self.face_verts(f);
            verts.iter().all(|v| fv.contains(v))
        })
    }

    /// Faces using the edge `(v0, v1)`.
    pub fn edge_faces(&self, v0: DynVertId, v1: DynVertId) -> SmallVec<[DynFaceId; 2]> {
        self.vert_faces(v0)
            .iter()
            .copied()
            .filter(|&f| self.face_verts(f).contains(&v1))
            .collect()
    }

    pub fn edge_exists(&self, v0: DynVertId, v1: DynVertId) -> bool {
        v0 != v1
            && self.is_vert_alive(v0)
            && self.is_vert_alive(v1)
            && self
                .vert_faces(v0)
                .iter()
                .any(|&f| self.face_verts(f).contains(&v1))
    }

    /// Vertices sharing an edge with `vert`, each listed once.
    pub fn vert_neighbors(&self, vert: DynVertId) -> SmallVec<[DynVertId; 8]> {
        let mut neighbors = SmallVec::new();
        for &f in self.vert_faces(vert) {
            for v in self.face_verts(f) {
                if v != vert && !neighbors.contains(&v) {
                    neighbors.push(v);
                }
            }
        }
        neighbors
    }

    /// Edge used by other than exactly two faces.
    pub fn edge_is_boundary(&self, v0: DynVertId, v1: DynVertId) -> bool {
        self.edge_faces(v0, v1).len() != 2
    }

    pub fn vert_is_boundary(&self, vert: DynVertId) -> bool {
        self.vert_neighbors(vert)
            .iter()
            .any(|&other| self.edge_is_boundary(vert, other))
    }

    pub fn update_face_normal(&mut self, face: DynFaceId) {
        let no = tri_normal(self.face_positions(face));
        self.faces[face.0 as usize].no = no;
    }

    /// Angle-agnostic average of the adjacent face normals.
    pub fn update_vert_normal(&mut self, vert: DynVertId) {
        let sum: Vec3 = self
            .vert_faces(vert)
            .iter()
            .map(|&f| self.face_normal(f))
            .sum();
        self.verts[vert.0 as usize].no = sum.normalize_or_zero();
    }

    pub fn update_all_normals(&mut self) {
        let faces: Vec<DynFaceId> = self.face_ids().collect();
        for face in faces {
            self.update_face_normal(face);
        }
        let verts: Vec<DynVertId> = self.vert_ids().collect();
        for vert in verts {
            self.update_vert_normal(vert);
        }
    }
}
