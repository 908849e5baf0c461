use std::path::Path;
use std::sync::Arc;

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use tracing::debug;

use crate::config::Viewpoint;
use crate::consumer::Renderer;
use crate::error::PipelineError;
use crate::frame::{GeometryBuffers, MeshStats};

const BACKGROUND: [u8; 4] = [26, 26, 46, 255];
const DEFAULT_COLOR: [f32; 3] = [0.4, 0.35, 0.3];
// Normalized (-0.5, 0.8, -0.3).
const LIGHT_DIR: [f32; 3] = [-0.5070926, 0.8113482, -0.3042556];

/// Headless renderer: holds the latest geometry and can rasterize it
/// top-down into an RGBA image.
///
/// Cloning shares the held buffers instead of copying them, so a shared
/// renderer can be snapshotted under a short lock and drawn outside it.
#[derive(Clone, Debug, Default)]
pub struct PreviewRenderer {
    geometry: Option<Arc<GeometryBuffers>>,
    camera: Viewpoint,
    frames_rendered: u64,
    geometry_updates: u64,
}

impl PreviewRenderer {
    pub fn new(camera: Viewpoint) -> Self {
        Self {
            camera,
            ..Default::default()
        }
    }

    pub fn set_camera(&mut self, camera: Viewpoint) {
        self.camera = camera;
    }

    pub fn held_stats(&self) -> MeshStats {
        self.geometry.as_deref().map(MeshStats::of).unwrap_or_default()
    }

    /// Copy of the renderer state that shares the held geometry.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn geometry_updates(&self) -> u64 {
        self.geometry_updates
    }

    /// Orthographic top-down view of the held mesh, scaled to fit a
    /// `size` x `size` image. Highest surface wins; Lambert shading.
    pub fn rasterize(&self, size: usize) -> Vec<u8> {
        let mut rgba: Vec<u8> = BACKGROUND.iter().copied().cycle().take(size * size * 4).collect();
        let Some(g) = self.geometry.as_deref() else {
            return rgba;
        };
        if size < 2 || g.vertex_count() == 0 {
            return rgba;
        }

        let (mut min_x, mut max_x, mut min_z, mut max_z) =
            (f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::NEG_INFINITY);
        for p in g.positions.chunks_exact(3) {
            min_x = min_x.min(p[0]);
            max_x = max_x.max(p[0]);
            min_z = min_z.min(p[2]);
            max_z = max_z.max(p[2]);
        }
        let span = (max_x - min_x).max(max_z - min_z).max(f32::EPSILON);
        let scale = (size - 1) as f32 / span;
        let project = |i: usize| -> [f32; 2] {
            [(g.positions[i * 3] - min_x) * scale, (g.positions[i * 3 + 2] - min_z) * scale]
        };
        let color_of = |i: usize| -> [f32; 3] {
            match &g.colors {
                Some(c) => [c[i * 3], c[i * 3 + 1], c[i * 3 + 2]],
                None => DEFAULT_COLOR,
            }
        };

        let mut depth = vec![f32::NEG_INFINITY; size * size];
        for tri in g.indices.chunks_exact(3) {
            let v = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let p = v.map(project);
            let area = edge(p[0], p[1], p[2]);
            if area.abs() < 1e-12 {
                continue;
            }

            let lo_x = p.iter().map(|q| q[0]).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
            let hi_x = p.iter().map(|q| q[0]).fold(f32::NEG_INFINITY, f32::max).ceil() as usize;
            let lo_y = p.iter().map(|q| q[1]).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
            let hi_y = p.iter().map(|q| q[1]).fold(f32::NEG_INFINITY, f32::max).ceil() as usize;

            let heights = v.map(|i| g.positions[i * 3 + 1]);
            let colors = v.map(color_of);
            let normal = face_normal(g, v);
            let shade = 0.35 + 0.65 * dot(normal, LIGHT_DIR).max(0.0);

            for py in lo_y..=hi_y.min(size - 1) {
                for px in lo_x..=hi_x.min(size - 1) {
                    let q = [px as f32, py as f32];
                    let w = [
                        edge(p[1], p[2], q) / area,
                        edge(p[2], p[0], q) / area,
                        edge(p[0], p[1], q) / area,
                    ];
                    if w.iter().any(|&wi| wi < -1e-4) {
                        continue;
                    }
                    let h = w[0] * heights[0] + w[1] * heights[1] + w[2] * heights[2];
                    let di = py * size + px;
                    if h <= depth[di] {
                        continue;
                    }
                    depth[di] = h;
                    let out = &mut rgba[di * 4..di * 4 + 4];
                    for ch in 0..3 {
                        let c = w[0] * colors[0][ch] + w[1] * colors[1][ch] + w[2] * colors[2][ch];
                        out[ch] = ((c * shade).clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                    out[3] = 255;
                }
            }
        }
        rgba
    }

    pub fn encode_png(&self, size: usize) -> Result<Vec<u8>, PipelineError> {
        let rgba = self.rasterize(size);
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf).write_image(
            &rgba,
            size as u32,
            size as u32,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(buf)
    }

    pub fn save_png(&self, path: &Path, size: usize) -> Result<(), PipelineError> {
        let rgba = self.rasterize(size);
        image::save_buffer(path, &rgba, size as u32, size as u32, image::ColorType::Rgba8)?;
        Ok(())
    }
}

impl Renderer for PreviewRenderer {
    fn update_geometry(&mut self, buffers: GeometryBuffers) {
        self.geometry_updates += 1;
        if let Some(old) = self.geometry.replace(Arc::new(buffers)) {
            debug!(vertices = old.vertex_count(), "released previous geometry");
        }
    }

    fn viewpoint(&self) -> Viewpoint {
        self.camera
    }

    fn render(&mut self) {
        self.frames_rendered += 1;
    }
}

#[inline]
fn edge(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

#[inline]
fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Average of the triangle's vertex normals, renormalized.
fn face_normal(g: &GeometryBuffers, v: [usize; 3]) -> [f32; 3] {
    let mut n = [0.0f32; 3];
    for i in v {
        for ch in 0..3 {
            n[ch] += g.normals[i * 3 + ch];
        }
    }
    let len = dot(n, n).sqrt();
    if len > 0.0 { n.map(|c| c / len) } else { [0.0, 1.0, 0.0] }
}
