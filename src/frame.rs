use std::time::Instant;

use serde::Serialize;

/// Flat mesh buffers as produced by an engine and consumed by a renderer.
/// Deliberately not `Clone`: buffers move from owner to owner.
#[derive(Debug, Default, PartialEq)]
pub struct GeometryBuffers {
    /// xyz triples.
    pub positions: Vec<f32>,
    /// Triangle list into `positions`.
    pub indices: Vec<u32>,
    /// One xyz normal per vertex.
    pub normals: Vec<f32>,
    /// One rgb triple per vertex, when the engine produces colors.
    pub colors: Option<Vec<f32>>,
}

impl GeometryBuffers {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks the engine contract: lengths are whole triples, normals and
    /// colors match positions, indices stay below the vertex count.
    pub fn is_consistent(&self) -> bool {
        let n = self.vertex_count();
        self.positions.len() % 3 == 0
            && self.indices.len() % 3 == 0
            && self.normals.len() == self.positions.len()
            && self.colors.as_ref().is_none_or(|c| c.len() == self.positions.len())
            && self.indices.iter().all(|&i| (i as usize) < n)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MeshStats {
    pub vertex_count: usize,
    pub triangle_count: usize,
}

impl MeshStats {
    pub fn of(buffers: &GeometryBuffers) -> Self {
        Self {
            vertex_count: buffers.vertex_count(),
            triangle_count: buffers.triangle_count(),
        }
    }
}

/// One complete mesh output. Stats are derived at construction from the
/// buffers the frame owns; callers check `is_consistent` first.
#[derive(Debug)]
pub struct GeometryFrame {
    buffers: GeometryBuffers,
    stats: MeshStats,
    generated_at: Instant,
}

impl GeometryFrame {
    pub fn new(buffers: GeometryBuffers, generated_at: Instant) -> Self {
        let stats = MeshStats::of(&buffers);
        Self { buffers, stats, generated_at }
    }

    #[inline]
    pub fn stats(&self) -> MeshStats {
        self.stats
    }

    #[inline]
    pub fn generated_at(&self) -> Instant {
        self.generated_at
    }

    #[inline]
    pub fn buffers(&self) -> &GeometryBuffers {
        &self.buffers
    }

    /// Give up the buffers without copying them.
    pub fn into_buffers(self) -> GeometryBuffers {
        self.buffers
    }
}
