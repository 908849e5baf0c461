use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RADIUS: f32 = 30.0;
pub const DEFAULT_RENDER_DISTANCE: u32 = 4;

/// The eight terrain shape knobs. Discriminants index `TERRAIN_KNOBS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Knob {
    MountainScale,
    HillsScale,
    Roughness,
    SeaLevel,
    TreeDensity,
    CaveThreshold,
    BiomeScale,
    DesertThreshold,
}

impl Knob {
    pub const ALL: [Knob; 8] = [
        Knob::MountainScale,
        Knob::HillsScale,
        Knob::Roughness,
        Knob::SeaLevel,
        Knob::TreeDensity,
        Knob::CaveThreshold,
        Knob::BiomeScale,
        Knob::DesertThreshold,
    ];

    #[inline]
    pub fn descriptor(self) -> &'static KnobDescriptor {
        &TERRAIN_KNOBS[self as usize]
    }

    /// Look a knob up by its control id (`"mountain-scale"`) or its serialized
    /// field name (`"mountainScale"`).
    pub fn from_name(name: &str) -> Option<Knob> {
        TERRAIN_KNOBS
            .iter()
            .find(|d| d.id == name || d.field == name)
            .map(|d| d.knob)
    }
}

/// One row of the control table: range, default and slider granularity.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct KnobDescriptor {
    #[serde(skip)]
    pub knob: Knob,
    pub id: &'static str,
    pub label: &'static str,
    pub field: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub step: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
}

impl KnobDescriptor {
    /// Clamp into [min, max] and round to the nearest whole step from `min`.
    /// Non-finite input falls back to the default.
    pub fn snap(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.default;
        }
        let v = value.clamp(self.min, self.max);
        let steps = ((v - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Single source of truth for every knob's name and range.
pub const TERRAIN_KNOBS: [KnobDescriptor; 8] = [
    KnobDescriptor {
        knob: Knob::MountainScale,
        id: "mountain-scale",
        label: "Mountain Scale",
        field: "mountainScale",
        min: 10.0,
        max: 50.0,
        default: 30.0,
        step: 5.0,
        unit: None,
    },
    KnobDescriptor {
        knob: Knob::HillsScale,
        id: "hills-scale",
        label: "Hills Scale",
        field: "hillsScale",
        min: 5.0,
        max: 25.0,
        default: 15.0,
        step: 2.0,
        unit: None,
    },
    KnobDescriptor {
        knob: Knob::Roughness,
        id: "roughness",
        label: "Terrain Roughness",
        field: "roughness",
        min: 1.0,
        max: 10.0,
        default: 3.0,
        step: 1.0,
        unit: None,
    },
    KnobDescriptor {
        knob: Knob::SeaLevel,
        id: "sea-level",
        label: "Sea Level",
        field: "seaLevel",
        min: -10.0,
        max: 10.0,
        default: 0.0,
        step: 2.0,
        unit: None,
    },
    KnobDescriptor {
        knob: Knob::TreeDensity,
        id: "tree-density",
        label: "Tree Density",
        field: "treeDensity",
        min: 0.0,
        max: 10.0,
        default: 3.0,
        step: 1.0,
        unit: Some("%"),
    },
    KnobDescriptor {
        knob: Knob::CaveThreshold,
        id: "cave-frequency",
        label: "Cave Frequency",
        field: "caveThreshold",
        min: 0.0,
        max: 100.0,
        default: 70.0,
        step: 10.0,
        unit: Some("%"),
    },
    KnobDescriptor {
        knob: Knob::BiomeScale,
        id: "biome-scale",
        label: "Biome Scale",
        field: "biomeScale",
        min: 50.0,
        max: 500.0,
        default: 200.0,
        step: 50.0,
        unit: None,
    },
    KnobDescriptor {
        knob: Knob::DesertThreshold,
        id: "desert-threshold",
        label: "Desert Amount",
        field: "desertThreshold",
        min: 0.0,
        max: 100.0,
        default: 30.0,
        step: 10.0,
        unit: Some("%"),
    },
];

/// Terrain shape knobs, serialized with the table's field names.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainShape {
    pub mountain_scale: f32,
    pub hills_scale: f32,
    pub roughness: f32,
    pub sea_level: f32,
    pub tree_density: f32,
    pub cave_threshold: f32,
    pub biome_scale: f32,
    pub desert_threshold: f32,
}

impl TerrainShape {
    /// Every knob at its table default.
    pub fn defaults() -> Self {
        TERRAIN_KNOBS.iter().fold(Self::zeroed(), |shape, d| {
            shape.with(d.knob, d.default)
        })
    }

    fn zeroed() -> Self {
        Self {
            mountain_scale: 0.0,
            hills_scale: 0.0,
            roughness: 0.0,
            sea_level: 0.0,
            tree_density: 0.0,
            cave_threshold: 0.0,
            biome_scale: 0.0,
            desert_threshold: 0.0,
        }
    }

    pub fn get(&self, knob: Knob) -> f32 {
        match knob {
            Knob::MountainScale => self.mountain_scale,
            Knob::HillsScale => self.hills_scale,
            Knob::Roughness => self.roughness,
            Knob::SeaLevel => self.sea_level,
            Knob::TreeDensity => self.tree_density,
            Knob::CaveThreshold => self.cave_threshold,
            Knob::BiomeScale => self.biome_scale,
            Knob::DesertThreshold => self.desert_threshold,
        }
    }

    /// Copy of `self` with one knob replaced. The value is stored as given.
    pub fn with(mut self, knob: Knob, value: f32) -> Self {
        let slot = match knob {
            Knob::MountainScale => &mut self.mountain_scale,
            Knob::HillsScale => &mut self.hills_scale,
            Knob::Roughness => &mut self.roughness,
            Knob::SeaLevel => &mut self.sea_level,
            Knob::TreeDensity => &mut self.tree_density,
            Knob::CaveThreshold => &mut self.cave_threshold,
            Knob::BiomeScale => &mut self.biome_scale,
            Knob::DesertThreshold => &mut self.desert_threshold,
        };
        *slot = value;
        self
    }

    /// Copy with every knob clamped into its declared range.
    pub fn clamped(self) -> Self {
        TERRAIN_KNOBS.iter().fold(self, |shape, d| {
            let v = shape.get(d.knob);
            let v = if v.is_finite() { v.clamp(d.min, d.max) } else { d.default };
            shape.with(d.knob, v)
        })
    }

    pub fn in_range(&self) -> bool {
        TERRAIN_KNOBS.iter().all(|d| d.contains(self.get(d.knob)))
    }
}

impl Default for TerrainShape {
    fn default() -> Self {
        Self::defaults()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Viewpoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance in the ground plane; height changes alone never move the mesh.
    #[inline]
    pub fn ground_distance(&self, other: &Viewpoint) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Snapshot of every generation input. Updates return a new value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub viewpoint: Viewpoint,
    pub radius: f32,
    pub render_distance: u32,
    pub shape: TerrainShape,
}

impl ParameterSet {
    pub fn defaults() -> Self {
        Self {
            viewpoint: Viewpoint::default(),
            radius: DEFAULT_RADIUS,
            render_distance: DEFAULT_RENDER_DISTANCE,
            shape: TerrainShape::defaults(),
        }
    }

    /// Non-positive or non-finite radii keep the previous radius.
    pub fn with_viewpoint(self, viewpoint: Viewpoint, radius: f32) -> Self {
        let radius = if radius.is_finite() && radius > 0.0 { radius } else { self.radius };
        Self { viewpoint, radius, ..self }
    }

    pub fn with_render_distance(self, render_distance: u32) -> Self {
        Self { render_distance: render_distance.max(1), ..self }
    }

    pub fn with_shape(self, shape: TerrainShape) -> Self {
        Self { shape: shape.clamped(), ..self }
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Table defaults for every generation input.
pub fn defaults() -> ParameterSet {
    ParameterSet::defaults()
}

/// Cadences of the two loops and the control-side throttle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum spacing between engine invocations (~30 regenerations/sec).
    pub tick_interval: Duration,
    /// How often the generation loop wakes to drain commands.
    pub poll_interval: Duration,
    /// Window over which rate trackers average.
    pub rate_window: Duration,
    /// Minimum spacing between viewpoint commands sent by the consumer.
    pub viewpoint_throttle: Duration,
    pub default_radius: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(33),
            poll_interval: Duration::from_millis(16),
            rate_window: Duration::from_millis(250),
            viewpoint_throttle: Duration::from_millis(100),
            default_radius: DEFAULT_RADIUS,
        }
    }
}
