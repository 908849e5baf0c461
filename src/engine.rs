use crate::config::{TerrainShape, Viewpoint};
use crate::error::EngineError;
use crate::frame::GeometryBuffers;

/// A stateful geometry generator driven exclusively by the generation loop.
///
/// Setters apply immediately; `generate` is called at most once per
/// generation tick and may decline to produce a frame (`Ok(None)`) when its
/// own state says nothing visible changed.
pub trait TerrainEngine: Send {
    /// Poll asynchronous initialization. The loop never calls `generate`
    /// until this has returned true.
    fn poll_ready(&mut self) -> bool {
        true
    }

    fn generate(
        &mut self,
        viewpoint: Viewpoint,
        radius: f32,
    ) -> Result<Option<GeometryBuffers>, EngineError>;

    fn set_render_distance(&mut self, distance: u32);

    fn set_terrain_shape(&mut self, shape: &TerrainShape);
}

impl<E: TerrainEngine + ?Sized> TerrainEngine for Box<E> {
    fn poll_ready(&mut self) -> bool {
        (**self).poll_ready()
    }

    fn generate(
        &mut self,
        viewpoint: Viewpoint,
        radius: f32,
    ) -> Result<Option<GeometryBuffers>, EngineError> {
        (**self).generate(viewpoint, radius)
    }

    fn set_render_distance(&mut self, distance: u32) {
        (**self).set_render_distance(distance)
    }

    fn set_terrain_shape(&mut self, shape: &TerrainShape) {
        (**self).set_terrain_shape(shape)
    }
}
