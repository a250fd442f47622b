use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::VisError;
use crate::log_info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Processing,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }
}

/// One visualization request as seen by the record store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub slab_name: Option<String>,
    pub slab_type: Option<String>,
    /// Uploaded base photograph.
    pub reference_image_url: Option<String>,
    pub status: ProjectStatus,
    pub result_image_url: Option<String>,
    /// Short description of the generation run (pipeline and prompt).
    pub prompt_used: Option<String>,
    pub error: Option<String>,
}

impl Project {
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        Self {
            id: Uuid::new_v4(),
            name: if name.is_empty() {
                "Untitled".to_string()
            } else {
                name.to_string()
            },
            slab_name: None,
            slab_type: None,
            reference_image_url: None,
            status: ProjectStatus::Processing,
            result_image_url: None,
            prompt_used: None,
            error: None,
        }
    }

    pub fn with_slab(mut self, slab_name: &str, slab_type: &str) -> Self {
        self.slab_name = Some(slab_name.to_string());
        self.slab_type = Some(slab_type.to_string());
        self
    }

    /// Fold a state change into the record.
    pub fn apply(&mut self, update: &ProjectUpdate) {
        self.status = update.status;
        if let Some(url) = &update.reference_image_url {
            self.reference_image_url = Some(url.clone());
        }
        if let Some(url) = &update.result_image_url {
            self.result_image_url = Some(url.clone());
        }
        if let Some(prompt) = &update.prompt_used {
            self.prompt_used = Some(prompt.clone());
        }
        self.error = update.error.clone();
    }
}

/// Fields changed by one pipeline transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectUpdate {
    pub fn processing() -> Self {
        Self {
            status: ProjectStatus::Processing,
            reference_image_url: None,
            result_image_url: None,
            prompt_used: None,
            error: None,
        }
    }

    pub fn completed(result_image_url: &str) -> Self {
        Self {
            status: ProjectStatus::Completed,
            result_image_url: Some(result_image_url.to_string()),
            ..Self::processing()
        }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            status: ProjectStatus::Failed,
            error: Some(error.to_string()),
            ..Self::processing()
        }
    }
}

/// Record store collaborator.
pub trait ProjectRecorder: Send + Sync {
    fn persist(&self, project: &Project, update: &ProjectUpdate) -> Result<(), VisError>;
}

/// Writes `<dir>/<project id>.json` with the latest record.
pub struct JsonFileRecorder {
    dir: PathBuf,
    // Serializes read-modify-write of the same record.
    lock: Mutex<()>,
}

impl JsonFileRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn record_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn load(&self, id: &Uuid) -> Result<Project, VisError> {
        read_record(&self.record_path(id))
    }
}

impl ProjectRecorder for JsonFileRecorder {
    fn persist(&self, project: &Project, update: &ProjectUpdate) -> Result<(), VisError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| VisError::InvalidState("recorder lock poisoned".to_string()))?;

        let path = self.record_path(&project.id);
        let mut record = read_record(&path).unwrap_or_else(|_| project.clone());
        record.apply(update);

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| VisError::Upload(format!("{}: {}", self.dir.display(), e)))?;
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| VisError::Encoding(e.to_string()))?;
        std::fs::write(&path, json)
            .map_err(|e| VisError::Upload(format!("{}: {}", path.display(), e)))?;
        log_info!(
            "Project {} ({}) -> {}",
            project.id,
            project.name,
            record.status.as_str()
        );
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<Project, VisError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| VisError::Fetch(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| VisError::Decoding(format!("{}: {}", path.display(), e)))
}
