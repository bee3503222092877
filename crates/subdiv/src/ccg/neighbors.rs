//! Topological neighbours of a grid sample, across grid boundaries.

use smallvec::SmallVec;

use super::{SubdivCcg, SubdivCcgCoord};

/// Neighbours of a sample. Duplicates of the queried sample itself (its
/// copies in other grids) are stored at the end when requested.
#[derive(Debug, Clone, Default)]
pub struct SubdivCcgNeighbors {
    pub coords: SmallVec<[SubdivCcgCoord; 256]>,
    pub num_duplicates: usize,
}

impl SubdivCcgNeighbors {
    /// Neighbours without the trailing duplicates.
    pub fn unique(&self) -> &[SubdivCcgCoord] {
        &self.coords[..self.coords.len() - self.num_duplicates]
    }

    pub fn duplicates(&self) -> &[SubdivCcgCoord] {
        &self.coords[self.coords.len() - self.num_duplicates..]
    }
}

/// Identity used to count a shared sample once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleId {
    Group(usize),
    Element(usize),
}

impl SubdivCcg {
    fn sample_id(&self, coord: SubdivCcgCoord) -> SampleId {
        let index = coord.to_index(&self.key);
        match self.topology.group_of(index) {
            Some(group) => SampleId::Group(group),
            None => SampleId::Element(index),
        }
    }

    /// Neighbours of `coord`.
    ///
    /// Inner samples have their four grid-local neighbours. Rim samples
    /// collect the grid-local neighbours of every copy of the sample, each
    /// shared neighbour reported once, so a sample on a coarse edge sees both
    /// faces and a grid corner on a coarse vertex sees one sample per edge
    /// around the vertex.
    pub fn neighbor_coords_get(
        &self,
        coord: SubdivCcgCoord,
        include_duplicates: bool,
    ) -> SubdivCcgNeighbors {
        let size = self.key.grid_size as i32;
        let own_id = self.sample_id(coord);
        let copies: SmallVec<[SubdivCcgCoord; 16]> = match own_id {
            SampleId::Group(group) => self.topology.group_coords(group).iter().copied().collect(),
            SampleId::Element(_) => SmallVec::from_elem(coord, 1),
        };

        let mut neighbors = SubdivCcgNeighbors::default();
        let mut seen: SmallVec<[SampleId; 256]> = SmallVec::new();
        for copy in &copies {
            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                let x = copy.x as i32 + dx;
                let y = copy.y as i32 + dy;
                if x < 0 || y < 0 || x >= size || y >= size {
                    continue;
                }
                let neighbor = SubdivCcgCoord::new(copy.grid_index, x as usize, y as usize);
                let id = self.sample_id(neighbor);
                if id == own_id || seen.contains(&id) {
                    continue;
                }
                seen.push(id);
                neighbors.coords.push(neighbor);
            }
        }

        if include_duplicates {
            for copy in copies.iter().filter(|c| **c != coord) {
                neighbors.coords.push(*copy);
                neighbors.num_duplicates += 1;
            }
        }
        neighbors
    }
}
