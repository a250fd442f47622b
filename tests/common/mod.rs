//! In-memory collaborators for end-to-end pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use serde_json::Value;

use slabviz::error::VisError;
use slabviz::jobs::{JobKind, JobService, PollBudget, PollReport};
use slabviz::pipeline::GenerationOrchestrator;
use slabviz::project::{Project, ProjectRecorder, ProjectStatus, ProjectUpdate};
use slabviz::remote::{ImageFetcher, ImageStore};

// -- Job service ---------------------------------------------------------------

/// How a job of one kind behaves: `running` polls, then the outcome.
#[derive(Clone, Debug)]
pub struct Script {
    pub running: u32,
    pub outcome: Result<String, String>,
}

impl Script {
    pub fn succeed(running: u32, url: &str) -> Self {
        Self {
            running,
            outcome: Ok(url.to_string()),
        }
    }

    pub fn fail(running: u32, message: &str) -> Self {
        Self {
            running,
            outcome: Err(message.to_string()),
        }
    }
}

#[derive(Default)]
pub struct StubJobs {
    scripts: Mutex<HashMap<JobKind, Script>>,
    /// Submitted jobs in order, with their parameters.
    pub submitted: Mutex<Vec<(JobKind, Value)>>,
    live: Mutex<HashMap<String, (JobKind, u32)>>,
    pub polls: AtomicU32,
}

impl StubJobs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, kind: JobKind, script: Script) -> Arc<Self> {
        self.scripts.lock().unwrap().insert(kind, script);
        self.clone()
    }

    pub fn submitted_kinds(&self) -> Vec<JobKind> {
        self.submitted.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    pub fn params_for(&self, kind: JobKind) -> Option<Value> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.clone())
    }
}

impl JobService for StubJobs {
    fn submit_job(&self, kind: JobKind, params: &Value) -> Result<String, VisError> {
        if !self.scripts.lock().unwrap().contains_key(&kind) {
            return Err(VisError::Submission(format!("no model for {}", kind)));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((kind, params.clone()));
        let id = format!("{}-{}", kind, submitted.len());
        self.live.lock().unwrap().insert(id.clone(), (kind, 0));
        Ok(id)
    }

    fn poll_job(&self, id: &str) -> Result<PollReport, VisError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut live = self.live.lock().unwrap();
        let entry = live
            .get_mut(id)
            .ok_or_else(|| VisError::TransientPoll(format!("unknown job {}", id)))?;
        entry.1 += 1;
        let script = self.scripts.lock().unwrap()[&entry.0].clone();
        if entry.1 <= script.running {
            return Ok(PollReport::Running);
        }
        Ok(match script.outcome {
            Ok(result) => PollReport::Succeeded { result },
            Err(message) => PollReport::Failed { message },
        })
    }
}

// -- Storage ---------------------------------------------------------------------

/// Upload target that doubles as the fetcher's backing store.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub uploads: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, url: &str, bytes: Vec<u8>, content_type: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(url.to_string(), (bytes, content_type.to_string()));
    }

    pub fn get(&self, url: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(url).cloned()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

impl ImageStore for MemoryStore {
    fn upload_image(&self, bytes: &[u8], content_type: &str) -> Result<String, VisError> {
        let mut uploads = self.uploads.lock().unwrap();
        let ext = if content_type == "image/png" { "png" } else { "jpg" };
        let url = format!("mem://objects/{}.{}", uploads.len() + 1, ext);
        uploads.push(url.clone());
        drop(uploads);
        self.put(&url, bytes.to_vec(), content_type);
        Ok(url)
    }
}

impl ImageFetcher for MemoryStore {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, VisError> {
        self.get(url)
            .map(|(bytes, _)| bytes)
            .ok_or_else(|| VisError::Fetch(format!("{} returned 404 Not Found", url)))
    }
}

// -- Records -------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingRecorder {
    pub updates: Mutex<Vec<(Project, ProjectUpdate)>>,
}

impl RecordingRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<ProjectStatus> {
        self.updates.lock().unwrap().iter().map(|(_, u)| u.status).collect()
    }

    pub fn last(&self) -> Option<ProjectUpdate> {
        self.updates.lock().unwrap().last().map(|(_, u)| u.clone())
    }
}

impl ProjectRecorder for RecordingRecorder {
    fn persist(&self, project: &Project, update: &ProjectUpdate) -> Result<(), VisError> {
        self.updates
            .lock()
            .unwrap()
            .push((project.clone(), update.clone()));
        Ok(())
    }
}

// -- Fixtures ------------------------------------------------------------------

pub struct Harness {
    pub jobs: Arc<StubJobs>,
    pub store: Arc<MemoryStore>,
    pub records: Arc<RecordingRecorder>,
    pub orchestrator: GenerationOrchestrator,
}

pub fn harness(jobs: Arc<StubJobs>) -> Harness {
    harness_with_budget(jobs, 60)
}

pub fn harness_with_budget(jobs: Arc<StubJobs>, max_attempts: u32) -> Harness {
    let store = MemoryStore::new();
    let records = RecordingRecorder::new();
    let budget = PollBudget::new(Duration::ZERO, max_attempts);
    let orchestrator = GenerationOrchestrator::new(
        jobs.clone(),
        store.clone(),
        store.clone(),
        records.clone(),
    )
    .with_budgets(budget, budget);
    Harness {
        jobs,
        store,
        records,
        orchestrator,
    }
}

pub const GRAY: Rgba<u8> = Rgba([100, 110, 120, 255]);
pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

pub fn kitchen() -> RgbaImage {
    RgbaImage::from_pixel(900, 600, GRAY)
}

pub fn red_texture() -> RgbaImage {
    RgbaImage::from_pixel(64, 64, RED)
}
