// ============================================================================
// ERRORS: one taxonomy shared by masking, compositing, jobs and the pipeline
// ============================================================================

use std::fmt;

/// Every failure the core can report.
///
/// Local, synchronous failures (`InvalidState`, `DimensionMismatch`,
/// `Encoding`) abort the current operation immediately. `TransientPoll` is
/// absorbed by the job client up to its attempt budget and only surfaces in
/// logs. The remaining variants end a pipeline stage and are wrapped in a
/// [`PipelineError`] naming that stage.
#[derive(Debug, Clone, PartialEq)]
pub enum VisError {
    /// Operation invoked out of sequence (e.g. a stroke before an image is loaded).
    InvalidState(String),
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    Encoding(String),
    Decoding(String),
    /// The service rejected job creation. Never retried.
    Submission(String),
    TransientPoll(String),
    /// The service reported an explicit failure for the job.
    JobFailed(String),
    JobTimedOut { attempts: u32 },
    Upload(String),
    Fetch(String),
    Config(String),
    Cancelled,
}

impl VisError {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            VisError::InvalidState(_) => "InvalidState",
            VisError::DimensionMismatch { .. } => "DimensionMismatch",
            VisError::Encoding(_) => "EncodingError",
            VisError::Decoding(_) => "DecodingError",
            VisError::Submission(_) => "SubmissionError",
            VisError::TransientPoll(_) => "TransientPollError",
            VisError::JobFailed(_) => "JobFailed",
            VisError::JobTimedOut { .. } => "JobTimedOut",
            VisError::Upload(_) => "UploadError",
            VisError::Fetch(_) => "FetchError",
            VisError::Config(_) => "ConfigError",
            VisError::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for VisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisError::InvalidState(m) => write!(f, "invalid state: {}", m),
            VisError::DimensionMismatch { expected, actual } => write!(
                f,
                "dimension mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            VisError::Encoding(e) => write!(f, "image encoding failed: {}", e),
            VisError::Decoding(e) => write!(f, "image decoding failed: {}", e),
            VisError::Submission(e) => write!(f, "job submission rejected: {}", e),
            VisError::TransientPoll(e) => write!(f, "job poll failed: {}", e),
            VisError::JobFailed(e) => write!(f, "job failed: {}", e),
            VisError::JobTimedOut { attempts } => {
                write!(f, "job timed out after {} polls", attempts)
            }
            VisError::Upload(e) => write!(f, "upload failed: {}", e),
            VisError::Fetch(e) => write!(f, "fetch failed: {}", e),
            VisError::Config(e) => write!(f, "configuration error: {}", e),
            VisError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for VisError {}

impl From<image::ImageError> for VisError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Encoding(_) => VisError::Encoding(e.to_string()),
            other => VisError::Decoding(other.to_string()),
        }
    }
}

// -- Pipeline stages ---------------------------------------------------------

/// Stage of a generation run, used to tag failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Detection,
    Compositing,
    Upload,
    TextureApplication,
    LightingRefinement,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Detection => "detection",
            Stage::Compositing => "compositing",
            Stage::Upload => "upload",
            Stage::TextureApplication => "texture-application",
            Stage::LightingRefinement => "lighting-refinement",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`VisError`] tagged with the stage it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineError {
    pub stage: Stage,
    pub error: VisError,
}

impl PipelineError {
    pub fn new(stage: Stage, error: VisError) -> Self {
        Self { stage, error }
    }

    /// User-facing message that separates "detection failed", "texture
    /// application failed" and "timed out".
    pub fn friendly_message(&self) -> String {
        match &self.error {
            VisError::JobTimedOut { .. } => {
                format!("The {} step timed out. Please try again.", self.stage)
            }
            VisError::Cancelled => "Generation was cancelled.".to_string(),
            VisError::JobFailed(msg) => format!("The {} step failed: {}", self.stage, msg),
            other => format!("The {} step could not run: {}", self.stage, other),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed ({}): {}", self.stage, self.error.kind(), self.error)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
