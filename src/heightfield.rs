//! Built-in terrain engine: a square heightfield centred on the viewpoint.
//!
//! The shape knobs drive the noise stack directly; render distance sets the
//! mesh extent in chunks. The colour palette is built on the rayon pool at
//! construction, and the engine reports ready once it has arrived.

use std::sync::mpsc::{self, Receiver, TryRecvError};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::{DEFAULT_RENDER_DISTANCE, TerrainShape, Viewpoint};
use crate::engine::TerrainEngine;
use crate::error::{EngineError, PipelineError};
use crate::frame::GeometryBuffers;
use crate::grid::Grid;
use crate::noise::{Octaves, fbm, ridged};
use crate::rng::{hash2_unit, seed_u32};

const SALT_HILLS: u64 = 0x4111_5EED_0000_0001;
const SALT_MOUNTAIN: u64 = 0x0A0B_BEEF_0000_CAFE;
const SALT_MASK: u64 = 0x3A5C_0000_DEAD_0042;
const SALT_DETAIL: u64 = 0xE1E7_DE7A_1100_FACE;
const SALT_CAVE: u64 = 0xCA7E_0000_1A1D_0007;
const SALT_BIOME: u64 = 0xB10E_E1EF_DEAD_CAFE;
const SALT_TREE: u64 = 0x7EEE_5EED_0042_0042;

// Palette anchors (sRGB bytes), low to high elevation.
const WATER: [u8; 3] = [38, 78, 120];
const BEACH_SAND: [u8; 3] = [210, 200, 160];
const LAND_LOW: [u8; 3] = [70, 130, 62];
const LAND_MID: [u8; 3] = [140, 180, 100];
const MOUNTAIN_LOW: [u8; 3] = [140, 120, 100];
const MOUNTAIN_HIGH: [u8; 3] = [220, 220, 215];
const SNOW: [u8; 3] = [245, 248, 250];
const DESERT_LOW: [u8; 3] = [222, 196, 140];
const DESERT_HIGH: [u8; 3] = [176, 120, 82];
const TREE: [u8; 3] = [34, 88, 40];
const CAVE: [u8; 3] = [52, 46, 44];

const PALETTE_STEPS: usize = 256;

#[derive(Clone, Debug)]
pub struct HeightfieldConfig {
    pub seed: u64,
    /// Grid cells along one side of a chunk.
    pub cells_per_chunk: u32,
    /// World units per grid cell.
    pub cell_size: f32,
    pub max_render_distance: u32,
    /// The viewpoint must move this fraction of the influence radius before
    /// a fresh mesh is produced.
    pub regen_fraction: f32,
}

impl Default for HeightfieldConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cells_per_chunk: 16,
            cell_size: 1.0,
            max_render_distance: 16,
            regen_fraction: 0.05,
        }
    }
}

/// Elevation ramps sampled into lookup tables.
#[derive(Clone, Debug)]
struct Palette {
    temperate: Vec<[f32; 3]>,
    desert: Vec<[f32; 3]>,
}

impl Palette {
    fn build() -> Self {
        let temperate_stops: [(f32, [u8; 3]); 6] = [
            (0.0, BEACH_SAND),
            (0.04, LAND_LOW),
            (0.35, LAND_MID),
            (0.6, MOUNTAIN_LOW),
            (0.85, MOUNTAIN_HIGH),
            (1.0, SNOW),
        ];
        let desert_stops: [(f32, [u8; 3]); 3] =
            [(0.0, DESERT_LOW), (0.7, DESERT_HIGH), (1.0, MOUNTAIN_HIGH)];
        Self {
            temperate: sample_ramp(&temperate_stops),
            desert: sample_ramp(&desert_stops),
        }
    }

    #[inline]
    fn lookup(table: &[[f32; 3]], t: f32) -> [f32; 3] {
        let i = (t.clamp(0.0, 1.0) * (PALETTE_STEPS - 1) as f32).round() as usize;
        table[i]
    }
}

#[inline]
fn to_linear(c: [u8; 3]) -> [f32; 3] {
    [c[0] as f32 / 255.0, c[1] as f32 / 255.0, c[2] as f32 / 255.0]
}

#[inline]
fn lerp_color(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn sample_ramp(stops: &[(f32, [u8; 3])]) -> Vec<[f32; 3]> {
    (0..PALETTE_STEPS)
        .map(|i| {
            let t = i as f32 / (PALETTE_STEPS - 1) as f32;
            let hi = stops.iter().position(|s| s.0 >= t).unwrap_or(stops.len() - 1);
            if hi == 0 {
                return to_linear(stops[0].1);
            }
            let (t0, c0) = stops[hi - 1];
            let (t1, c1) = stops[hi];
            lerp_color(to_linear(c0), to_linear(c1), (t - t0) / (t1 - t0))
        })
        .collect()
}

/// Per-layer noise seeds derived from the engine seed.
#[derive(Clone, Copy, Debug)]
struct Seeds {
    hills: u32,
    mountain: u32,
    mask: u32,
    detail: u32,
    cave: u32,
    biome: u32,
    tree: u32,
}

impl Seeds {
    fn new(seed: u64) -> Self {
        Self {
            hills: seed_u32(seed, SALT_HILLS),
            mountain: seed_u32(seed, SALT_MOUNTAIN),
            mask: seed_u32(seed, SALT_MASK),
            detail: seed_u32(seed, SALT_DETAIL),
            cave: seed_u32(seed, SALT_CAVE),
            biome: seed_u32(seed, SALT_BIOME),
            tree: seed_u32(seed, SALT_TREE),
        }
    }
}

/// Raw surface sample before the sea plateau is applied.
#[derive(Clone, Copy, Debug, Default)]
struct Sample {
    height: f32,
    cave: bool,
}

/// Noise stack evaluated at world coordinates for one shape.
struct Surface<'a> {
    shape: &'a TerrainShape,
    seeds: Seeds,
}

impl Surface<'_> {
    fn sample(&self, x: f32, z: f32) -> Sample {
        let s = self.shape;
        let detail_octaves = s.roughness.round().clamp(1.0, 10.0) as u32;

        let hills =
            fbm(x, z, self.seeds.hills, &Octaves::new(4, 1.0 / 96.0)) * s.hills_scale * 0.5;

        let mask = (fbm(x, z, self.seeds.mask, &Octaves::new(2, 1.0 / 512.0)) * 0.5 + 0.5)
            .clamp(0.0, 1.0);
        let ridge = ridged(x, z, self.seeds.mountain, &Octaves::new(4, 1.0 / 256.0)).max(0.0);
        let mountains = ridge * ridge * mask * s.mountain_scale;

        let detail = fbm(x, z, self.seeds.detail, &Octaves::new(detail_octaves, 1.0 / 16.0))
            * s.roughness
            * 0.15;

        let mut height = hills + mountains + detail;

        // Pits where cave noise exceeds the threshold; 100% disables them.
        let threshold = (s.cave_threshold / 100.0).clamp(0.0, 1.0);
        let cave_noise = fbm(x, z, self.seeds.cave, &Octaves::new(2, 1.0 / 24.0)) * 0.5 + 0.5;
        let cave = threshold < 1.0 && cave_noise > threshold;
        if cave {
            height -= (cave_noise - threshold) / (1.0 - threshold) * 6.0;
        }

        Sample { height, cave }
    }

    fn color(&self, palette: &Palette, x: f32, z: f32, sample: Sample) -> [f32; 3] {
        let s = self.shape;
        if sample.height < s.sea_level {
            let depth = ((s.sea_level - sample.height) / s.hills_scale.max(1.0)).clamp(0.0, 1.0);
            return lerp_color(to_linear(WATER), to_linear(WATER).map(|c| c * 0.5), depth);
        }
        if sample.cave {
            return to_linear(CAVE);
        }

        let relief = (s.mountain_scale + s.hills_scale * 0.5).max(1.0);
        let t = (sample.height - s.sea_level) / relief;

        let biome = fbm(x, z, self.seeds.biome, &Octaves::new(3, 1.0 / s.biome_scale.max(1.0)))
            * 0.5
            + 0.5;
        if biome < s.desert_threshold / 100.0 {
            return Palette::lookup(&palette.desert, t);
        }

        let tree_line = t > 0.02 && t < 0.55;
        if tree_line {
            let roll = hash2_unit(x.floor() as i32, z.floor() as i32, self.seeds.tree);
            if roll < s.tree_density / 100.0 {
                return to_linear(TREE);
            }
        }
        Palette::lookup(&palette.temperate, t)
    }
}

/// Heightfield terrain engine. Owned and driven by the generation loop.
pub struct HeightfieldEngine {
    config: HeightfieldConfig,
    seeds: Seeds,
    shape: TerrainShape,
    render_distance: u32,
    palette: Option<Palette>,
    palette_rx: Option<Receiver<Palette>>,
    last_center: Option<Viewpoint>,
    dirty: bool,
}

impl HeightfieldEngine {
    /// Validate the config and start building the palette in the background.
    pub fn new(config: HeightfieldConfig) -> Result<Self, PipelineError> {
        if config.cells_per_chunk == 0 {
            return Err(PipelineError::engine_construction("cells_per_chunk must be positive"));
        }
        if !(config.cell_size.is_finite() && config.cell_size > 0.0) {
            return Err(PipelineError::engine_construction("cell_size must be positive"));
        }
        if config.max_render_distance == 0 {
            return Err(PipelineError::engine_construction(
                "max_render_distance must be positive",
            ));
        }
        let side = config.max_render_distance as u64 * config.cells_per_chunk as u64 + 1;
        if side * side > u32::MAX as u64 {
            return Err(PipelineError::engine_construction(
                "maximum mesh size exceeds 32-bit index range",
            ));
        }
        if !(config.regen_fraction.is_finite() && config.regen_fraction >= 0.0) {
            return Err(PipelineError::engine_construction("regen_fraction must be >= 0"));
        }

        let (tx, rx) = mpsc::channel();
        rayon::spawn(move || {
            let _ = tx.send(Palette::build());
        });

        Ok(Self {
            seeds: Seeds::new(config.seed),
            render_distance: DEFAULT_RENDER_DISTANCE.min(config.max_render_distance),
            config,
            shape: TerrainShape::defaults(),
            palette: None,
            palette_rx: Some(rx),
            last_center: None,
            dirty: true,
        })
    }

    pub fn render_distance(&self) -> u32 {
        self.render_distance
    }

    pub fn shape(&self) -> &TerrainShape {
        &self.shape
    }

    /// Cells along one side of the current mesh.
    fn cells(&self) -> usize {
        (self.render_distance * self.config.cells_per_chunk) as usize
    }

    fn build(&self, palette: &Palette, center: Viewpoint) -> GeometryBuffers {
        let cell = self.config.cell_size;
        let n = self.cells();
        let m = n + 1;
        // Snap to the cell lattice so noise samples line up between frames.
        let x0 = (center.x / cell).round() * cell - n as f32 * cell * 0.5;
        let z0 = (center.z / cell).round() * cell - n as f32 * cell * 0.5;

        let surface = Surface { shape: &self.shape, seeds: self.seeds };

        let mut samples = Grid::<Sample>::new(m, m);
        samples
            .data
            .par_chunks_mut(m)
            .enumerate()
            .for_each(|(iz, row)| {
                let z = z0 + iz as f32 * cell;
                for (ix, out) in row.iter_mut().enumerate() {
                    *out = surface.sample(x0 + ix as f32 * cell, z);
                }
            });

        let sea = self.shape.sea_level;
        let mut heights = Grid::<f32>::new(m, m);
        heights
            .data
            .par_iter_mut()
            .zip(samples.data.par_iter())
            .for_each(|(h, s)| *h = s.height.max(sea));

        let mut positions = vec![0.0f32; m * m * 3];
        let mut normals = vec![0.0f32; m * m * 3];
        let mut colors = vec![0.0f32; m * m * 3];

        positions
            .par_chunks_mut(m * 3)
            .zip(normals.par_chunks_mut(m * 3))
            .zip(colors.par_chunks_mut(m * 3))
            .enumerate()
            .for_each(|(iz, ((pos_row, nrm_row), col_row))| {
                let z = z0 + iz as f32 * cell;
                for ix in 0..m {
                    let x = x0 + ix as f32 * cell;
                    let y = heights.get(ix, iz);
                    pos_row[ix * 3..ix * 3 + 3].copy_from_slice(&[x, y, z]);

                    let (xi, zi) = (ix as isize, iz as isize);
                    let dx = heights.get_clamped(xi - 1, zi) - heights.get_clamped(xi + 1, zi);
                    let dz = heights.get_clamped(xi, zi - 1) - heights.get_clamped(xi, zi + 1);
                    let ny = 2.0 * cell;
                    let len = (dx * dx + ny * ny + dz * dz).sqrt();
                    nrm_row[ix * 3..ix * 3 + 3].copy_from_slice(&[dx / len, ny / len, dz / len]);

                    let c = surface.color(palette, x, z, samples.get(ix, iz));
                    col_row[ix * 3..ix * 3 + 3].copy_from_slice(&c);
                }
            });

        let mut indices = Vec::with_capacity(n * n * 6);
        for iz in 0..n {
            for ix in 0..n {
                let top_left = (iz * m + ix) as u32;
                let top_right = top_left + 1;
                let bottom_left = ((iz + 1) * m + ix) as u32;
                let bottom_right = bottom_left + 1;
                indices.extend_from_slice(&[
                    top_left,
                    bottom_left,
                    top_right,
                    top_right,
                    bottom_left,
                    bottom_right,
                ]);
            }
        }

        GeometryBuffers {
            positions,
            indices,
            normals,
            colors: Some(colors),
        }
    }
}

impl TerrainEngine for HeightfieldEngine {
    fn poll_ready(&mut self) -> bool {
        if self.palette.is_some() {
            return true;
        }
        let Some(rx) = &self.palette_rx else {
            return false;
        };
        match rx.try_recv() {
            Ok(palette) => {
                self.palette = Some(palette);
                self.palette_rx = None;
                debug!("heightfield palette ready");
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                warn!("palette task vanished, building inline");
                self.palette = Some(Palette::build());
                self.palette_rx = None;
                true
            }
        }
    }

    fn generate(
        &mut self,
        viewpoint: Viewpoint,
        radius: f32,
    ) -> Result<Option<GeometryBuffers>, EngineError> {
        let Some(palette) = &self.palette else {
            return Err(EngineError::NotReady);
        };
        if !(viewpoint.x.is_finite() && viewpoint.z.is_finite()) {
            return Err(EngineError::failure("viewpoint is not finite"));
        }

        if !self.dirty {
            if let Some(last) = &self.last_center {
                if last.ground_distance(&viewpoint) < radius * self.config.regen_fraction {
                    return Ok(None);
                }
            }
        }

        let buffers = self.build(palette, viewpoint);
        self.last_center = Some(viewpoint);
        self.dirty = false;
        Ok(Some(buffers))
    }

    fn set_render_distance(&mut self, distance: u32) {
        let clamped = distance.clamp(1, self.config.max_render_distance);
        if clamped != self.render_distance {
            self.render_distance = clamped;
            self.dirty = true;
        }
    }

    fn set_terrain_shape(&mut self, shape: &TerrainShape) {
        let shape = shape.clamped();
        if shape != self.shape {
            self.shape = shape;
            self.dirty = true;
        }
    }
}
