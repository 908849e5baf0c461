//! Error types for the streaming pipeline.
//!
//! Engine errors are recovered inside the generation loop; only pipeline
//! construction failures reach the caller.

/// Failure of a single engine call. Never fatal to the pipeline.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("terrain engine is not initialized yet")]
    NotReady,

    #[error("terrain engine failed: {0}")]
    Failure(String),

    #[error("terrain engine panicked: {0}")]
    Panicked(String),
}

impl EngineError {
    pub fn failure<T: ToString>(msg: T) -> Self {
        EngineError::Failure(msg.to_string())
    }
}

/// Startup and output errors surfaced to the application.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to construct terrain engine: {0}")]
    EngineConstruction(String),

    #[error("failed to spawn generation thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn engine_construction<T: ToString>(msg: T) -> Self {
        PipelineError::EngineConstruction(msg.to_string())
    }
}
