//! Generation pipeline: (optional detection) → composite → upload →
//! generation job chain → final image reference.

pub mod orchestrator;
pub mod params;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{PixelGrid, SelectionMask};
use crate::error::PipelineError;
use crate::jobs::{Job, JobKind};

pub use orchestrator::{GenerationHandle, GenerationOrchestrator};
pub use params::{JobParams, StageInputs};

/// Pipeline variants. Each is just the ordered list of generation jobs run
/// after the composite is uploaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// Local composite, then one lighting refinement.
    #[default]
    LocalCompositeRefine,
    /// Composite, texture application, then low-strength refinement.
    CompositeApplyRefine,
    /// Tile-guided texture application, usually over a detected mask.
    DetectAndTile,
}

impl PipelineKind {
    pub fn stages(&self) -> &'static [JobKind] {
        match self {
            PipelineKind::LocalCompositeRefine => &[JobKind::LightingRefinement],
            PipelineKind::CompositeApplyRefine => {
                &[JobKind::TextureApplication, JobKind::LightingRefinement]
            }
            PipelineKind::DetectAndTile => &[JobKind::TextureApplication],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::LocalCompositeRefine => "local-composite-refine",
            PipelineKind::CompositeApplyRefine => "composite-apply-refine",
            PipelineKind::DetectAndTile => "detect-and-tile",
        }
    }

    pub fn all() -> &'static [PipelineKind] {
        &[
            PipelineKind::LocalCompositeRefine,
            PipelineKind::CompositeApplyRefine,
            PipelineKind::DetectAndTile,
        ]
    }

    pub fn from_name(name: &str) -> Option<PipelineKind> {
        let name = name.trim().to_ascii_lowercase();
        Self::all().iter().copied().find(|k| k.as_str() == name)
    }

    /// Whether the generation chain needs the mask uploaded separately.
    pub fn needs_mask_upload(&self) -> bool {
        self.stages().contains(&JobKind::TextureApplication)
    }
}

/// An image held locally or already reachable by URL.
#[derive(Clone, Debug)]
pub enum ImageSource {
    Pixels(PixelGrid),
    Url(String),
}

impl ImageSource {
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageSource::Url(url) => Some(url),
            ImageSource::Pixels(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum MaskSource {
    /// Painted by the user; must match the base image size.
    Painted(SelectionMask),
    /// Run a detection job on the base image first.
    AutoDetect,
}

/// Everything one generation run needs.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub pipeline: PipelineKind,
    pub image: ImageSource,
    pub texture: ImageSource,
    pub mask: MaskSource,
    pub project_name: String,
    pub slab_name: Option<String>,
    pub slab_type: Option<String>,
}

impl GenerationRequest {
    pub fn new(pipeline: PipelineKind, image: ImageSource, texture: ImageSource, mask: MaskSource) -> Self {
        Self {
            pipeline,
            image,
            texture,
            mask,
            project_name: String::new(),
            slab_name: None,
            slab_type: None,
        }
    }

    pub fn named(mut self, project_name: &str) -> Self {
        self.project_name = project_name.to_string();
        self
    }

    pub fn with_slab(mut self, slab_name: &str, slab_type: &str) -> Self {
        self.slab_name = Some(slab_name.to_string());
        self.slab_type = Some(slab_type.to_string());
        self
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultImageReference {
    /// Final generated image.
    pub url: String,
    pub project_id: Uuid,
    pub composite_url: String,
    pub mask_url: Option<String>,
    /// Generation jobs in the order they ran.
    pub jobs: Vec<Job>,
}

/// Progress events of a run, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Progress {
    Detecting,
    Compositing,
    Uploading,
    Generating { kind: JobKind },
    Done(ResultImageReference),
    Failed(PipelineError),
}

impl Progress {
    pub fn is_final(&self) -> bool {
        matches!(self, Progress::Done(_) | Progress::Failed(_))
    }

    pub fn label(&self) -> String {
        match self {
            Progress::Detecting => "detecting".to_string(),
            Progress::Compositing => "compositing".to_string(),
            Progress::Uploading => "uploading".to_string(),
            Progress::Generating { kind } => format!("generating ({})", kind),
            Progress::Done(_) => "done".to_string(),
            Progress::Failed(_) => "failed".to_string(),
        }
    }
}
