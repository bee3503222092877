//! Geometry a tree is built over, one variant per backend.

use glam::{Mat3, Vec3};
use subdiv::mesh::face_normal_newell;
use subdiv::{Mesh, MeshError, SubdivCcg};

use crate::dyntopo::DynMesh;
use crate::tree::TreeKind;

/// Positions produced by deform modifiers evaluated before sculpting.
///
/// Brushes read and move the evaluated positions; each translation is
/// carried back to the original mesh through the vertex's inverse deform
/// matrix.
#[derive(Debug, Clone)]
pub struct DeformLayer {
    positions: Vec<Vec3>,
    deform_imats: Vec<Mat3>,
}

impl DeformLayer {
    pub fn new(positions: Vec<Vec3>, deform_imats: Vec<Mat3>) -> Result<Self, MeshError> {
        if deform_imats.len() != positions.len() {
            return Err(MeshError::AttributeLength {
                name: "deform_imats",
                len: deform_imats.len(),
                expected: positions.len(),
            });
        }
        Ok(Self {
            positions,
            deform_imats,
        })
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }
}

/// Polygon mesh with cached normals and an optional deform layer.
#[derive(Debug, Clone)]
pub struct MeshSurface {
    mesh: Mesh,
    face_normals: Vec<Vec3>,
    vert_normals: Vec<Vec3>,
    deform: Option<DeformLayer>,
    orig_positions: Vec<Vec3>,
}

impl MeshSurface {
    pub fn new(mesh: Mesh) -> Self {
        let orig_positions = mesh.positions().to_vec();
        let mut surface = Self {
            mesh,
            face_normals: Vec::new(),
            vert_normals: Vec::new(),
            deform: None,
            orig_positions,
        };
        surface.recalc_normals();
        surface
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Attribute access; call [`MeshSurface::recalc_normals`] after moving
    /// vertices through it.
    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    /// Positions brushes and bounds work with.
    pub fn positions(&self) -> &[Vec3] {
        match &self.deform {
            Some(deform) => &deform.positions,
            None => self.mesh.positions(),
        }
    }

    pub fn vert_normals(&self) -> &[Vec3] {
        &self.vert_normals
    }

    pub fn face_normals(&self) -> &[Vec3] {
        &self.face_normals
    }

    pub fn set_deform(&mut self, deform: Option<DeformLayer>) -> Result<(), MeshError> {
        if let Some(layer) = &deform {
            if layer.positions.len() != self.mesh.verts_num() {
                return Err(MeshError::AttributeLength {
                    name: "deform_positions",
                    len: layer.positions.len(),
                    expected: self.mesh.verts_num(),
                });
            }
        }
        self.deform = deform;
        self.recalc_normals();
        Ok(())
    }

    pub fn deform(&self) -> Option<&DeformLayer> {
        self.deform.as_ref()
    }

    /// Positions at the start of the current stroke.
    pub fn orig_positions(&self) -> &[Vec3] {
        &self.orig_positions
    }

    pub fn store_original(&mut self) {
        self.orig_positions = self.positions().to_vec();
    }

    /// Move a vertex by a translation expressed in the evaluated space.
    pub fn translate_vert(&mut self, vert: usize, translation: Vec3) {
        match &mut self.deform {
            Some(deform) => {
                deform.positions[vert] += translation;
                let original = deform.deform_imats[vert] * translation;
                self.mesh.positions_mut()[vert] += original;
            }
            None => self.mesh.positions_mut()[vert] += translation,
        }
    }

    pub fn recalc_normals(&mut self) {
        let face_normals = (0..self.mesh.faces_num())
            .map(|face| face_normal_newell(self.mesh.face_verts(face), self.positions()))
            .collect();
        self.face_normals = face_normals;
        self.vert_normals = vec![Vec3::ZERO; self.mesh.verts_num()];
        let verts: Vec<usize> = (0..self.mesh.verts_num()).collect();
        self.update_vert_normals(&verts);
    }

    pub fn update_face_normals(&mut self, faces: &[usize]) {
        for &face in faces {
            let normal = face_normal_newell(self.mesh.face_verts(face), self.positions());
            self.face_normals[face] = normal;
        }
    }

    pub fn update_vert_normals(&mut self, verts: &[usize]) {
        for &vert in verts {
            let sum: Vec3 = self
                .mesh
                .vert_faces(vert)
                .iter()
                .map(|&face| self.face_normals[face as usize])
                .sum();
            self.vert_normals[vert] = sum.normalize_or_zero();
        }
    }
}

/// Subdivision grids with the stroke-start snapshot of their positions.
#[derive(Debug, Clone)]
pub struct GridsSurface {
    ccg: SubdivCcg,
    orig_positions: Vec<Vec3>,
}

impl GridsSurface {
    pub fn new(ccg: SubdivCcg) -> Self {
        let orig_positions = ccg.positions().to_vec();
        Self {
            ccg,
            orig_positions,
        }
    }

    pub fn ccg(&self) -> &SubdivCcg {
        &self.ccg
    }

    pub fn ccg_mut(&mut self) -> &mut SubdivCcg {
        &mut self.ccg
    }

    pub fn into_ccg(self) -> SubdivCcg {
        self.ccg
    }

    pub fn orig_positions(&self) -> &[Vec3] {
        &self.orig_positions
    }

    pub fn store_original(&mut self) {
        self.orig_positions = self.ccg.positions().to_vec();
    }
}

/// Sculptable geometry in one of the three representations.
#[derive(Debug, Clone)]
pub enum Surface {
    Mesh(MeshSurface),
    Grids(GridsSurface),
    DynTopo(DynMesh),
}

impl Surface {
    pub fn kind(&self) -> TreeKind {
        match self {
            Surface::Mesh(_) => TreeKind::Mesh,
            Surface::Grids(_) => TreeKind::Grids,
            Surface::DynTopo(_) => TreeKind::DynTopo,
        }
    }

    /// Snapshot positions at stroke start for original-coordinate queries.
    pub fn store_original(&mut self) {
        match self {
            Surface::Mesh(surface) => surface.store_original(),
            Surface::Grids(surface) => surface.store_original(),
            Surface::DynTopo(mesh) => mesh.store_original(),
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshSurface> {
        match self {
            Surface::Mesh(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn as_grids(&self) -> Option<&GridsSurface> {
        match self {
            Surface::Grids(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn as_dyntopo(&self) -> Option<&DynMesh> {
        match self {
            Surface::DynTopo(mesh) => Some(mesh),
            _ => None,
        }
    }
}
