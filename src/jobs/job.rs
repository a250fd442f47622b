use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VisError;

/// What an external job does. The service maps each kind to a hosted model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Image → selection mask.
    Detection,
    /// Paint the reference material into the masked region.
    TextureApplication,
    /// Low-strength pass that adds lighting and shadows.
    LightingRefinement,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Detection => "detection",
            JobKind::TextureApplication => "texture-application",
            JobKind::LightingRefinement => "lighting-refinement",
        }
    }

    pub fn all() -> &'static [JobKind] {
        &[
            JobKind::Detection,
            JobKind::TextureApplication,
            JobKind::LightingRefinement,
        ]
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

/// One external unit of work, mutated only by the polling loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Result URL/handle once `Succeeded`.
    pub result: Option<String>,
    /// Service error message once `Failed`.
    pub error: Option<String>,
    /// Status requests issued so far (including failed ones).
    pub polls: u32,
}

impl Job {
    pub fn submitted(id: impl Into<String>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Submitted,
            result: None,
            error: None,
            polls: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Result reference of a succeeded job, or the error its terminal state maps to.
    pub fn into_result(self) -> Result<String, VisError> {
        match self.status {
            JobStatus::Succeeded => self.result.ok_or_else(|| {
                VisError::JobFailed(format!("job {} succeeded without a result", self.id))
            }),
            JobStatus::Failed => Err(VisError::JobFailed(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            JobStatus::TimedOut => Err(VisError::JobTimedOut {
                attempts: self.polls,
            }),
            JobStatus::Submitted | JobStatus::Running => Err(VisError::InvalidState(format!(
                "job {} is not finished",
                self.id
            ))),
        }
    }
}

/// One status report from the service.
#[derive(Clone, Debug, PartialEq)]
pub enum PollReport {
    Running,
    Succeeded { result: String },
    Failed { message: String },
}
