//! SlabViz: paint or detect a countertop region in a photograph, tile a slab
//! texture into it, and hand the composite to a hosted generation service for
//! a final lighting pass.

#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod canvas;
pub mod error;
pub mod io;
pub mod jobs;
pub mod ops;
pub mod pipeline;
pub mod project;
pub mod remote;
pub mod settings;

pub use canvas::{BrushSize, PixelGrid, SelectionMask, Stroke, StrokePoint};
pub use error::{PipelineError, Stage, VisError};
pub use ops::mask::MaskSurface;
pub use pipeline::{GenerationOrchestrator, GenerationRequest, PipelineKind};
pub use settings::Settings;
