// ============================================================================
// GENERATION ORCHESTRATOR: stage sequencing, progress, persistence
// ============================================================================
//
//   [detect] → composite → upload → job₁ → job₂ … → result URL
//
// Every stage runs only if the previous one succeeded. A failure is tagged
// with the stage it ended and reported to the record store as `failed`.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use super::params::{JobParams, StageInputs};
use super::{GenerationRequest, ImageSource, MaskSource, Progress, ResultImageReference};
use crate::canvas::{PixelGrid, SelectionMask};
use crate::error::{PipelineError, Stage, VisError};
use crate::io::{encode_jpeg, encode_mask_png, JPEG_CONTENT_TYPE, PNG_CONTENT_TYPE};
use crate::jobs::{CancelFlag, JobClient, JobKind, JobService, PollBudget};
use crate::ops::composite::{composite_with, CompositeOptions};
use crate::project::{JsonFileRecorder, Project, ProjectRecorder, ProjectUpdate};
use crate::remote::{http_client, HttpImageFetcher, HttpImageStore, ImageFetcher, ImageStore, ReplicateService};
use crate::settings::Settings;
use crate::{log_err, log_info, log_warn};

/// Drives one generation request at a time per call; cheap to clone and
/// share between concurrent runs.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    jobs: JobClient,
    store: Arc<dyn ImageStore>,
    fetcher: Arc<dyn ImageFetcher>,
    recorder: Arc<dyn ProjectRecorder>,
    params: JobParams,
    detection_budget: PollBudget,
    generation_budget: PollBudget,
    composite_options: CompositeOptions,
}

fn stage_for(kind: JobKind) -> Stage {
    match kind {
        JobKind::Detection => Stage::Detection,
        JobKind::TextureApplication => Stage::TextureApplication,
        JobKind::LightingRefinement => Stage::LightingRefinement,
    }
}

impl GenerationOrchestrator {
    pub fn new(
        service: Arc<dyn JobService>,
        store: Arc<dyn ImageStore>,
        fetcher: Arc<dyn ImageFetcher>,
        recorder: Arc<dyn ProjectRecorder>,
    ) -> Self {
        Self {
            jobs: JobClient::new(service),
            store,
            fetcher,
            recorder,
            params: JobParams::default(),
            detection_budget: PollBudget::detection(),
            generation_budget: PollBudget::generation(),
            composite_options: CompositeOptions::default(),
        }
    }

    /// Production wiring: one shared HTTP client for every collaborator.
    pub fn from_settings(settings: &Settings) -> Result<Self, VisError> {
        let http = http_client(settings.request_timeout())?;
        let service = ReplicateService::from_settings(settings, http.clone())?;
        let store = HttpImageStore::from_settings(settings, http.clone())?;
        let fetcher = HttpImageFetcher::new(http, settings.fetch_retries);
        let recorder = JsonFileRecorder::new(settings.records_path());
        Ok(Self::new(
            Arc::new(service),
            Arc::new(store),
            Arc::new(fetcher),
            Arc::new(recorder),
        )
        .with_params(JobParams::from_settings(settings))
        .with_budgets(settings.detection_budget(), settings.generation_budget())
        .with_composite_options(settings.composite_options()))
    }

    pub fn with_params(mut self, params: JobParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_budgets(mut self, detection: PollBudget, generation: PollBudget) -> Self {
        self.detection_budget = detection;
        self.generation_budget = generation;
        self
    }

    pub fn with_composite_options(mut self, options: CompositeOptions) -> Self {
        self.composite_options = options;
        self
    }

    /// Blocking run without progress reporting or cancellation.
    pub fn run(&self, request: GenerationRequest) -> Result<ResultImageReference, PipelineError> {
        self.run_with(request, &CancelFlag::new(), &mut |_| {})
    }

    /// Blocking run. `progress` sees every stage transition and exactly one
    /// final `Done`/`Failed` event.
    pub fn run_with(
        &self,
        request: GenerationRequest,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<ResultImageReference, PipelineError> {
        let mut project = Project::new(&request.project_name);
        project.slab_name = request.slab_name.clone();
        project.slab_type = request.slab_type.clone();
        project.reference_image_url = request.image.url().map(str::to_string);
        project.prompt_used = Some(self.params.summary(
            request.pipeline,
            request.slab_name.as_deref(),
            request.slab_type.as_deref(),
        ));
        log_info!(
            "Project {}: starting {} pipeline",
            project.id,
            request.pipeline.as_str()
        );
        self.persist(&project, &ProjectUpdate::processing());

        let outcome = self.execute(&request, &mut project, cancel, progress);
        let mut update = match &outcome {
            Ok(result) => {
                log_info!("Project {}: completed -> {}", project.id, result.url);
                ProjectUpdate::completed(&result.url)
            }
            Err(e) => {
                log_err!("Project {}: {}", project.id, e);
                ProjectUpdate::failed(&e.friendly_message())
            }
        };
        update.reference_image_url = project.reference_image_url.clone();
        self.persist(&project, &update);
        progress(match &outcome {
            Ok(result) => Progress::Done(result.clone()),
            Err(e) => Progress::Failed(e.clone()),
        });
        outcome
    }

    /// Run on a background thread.
    pub fn spawn(&self, request: GenerationRequest) -> GenerationHandle {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelFlag::new();
        let worker = self.clone();
        let flag = cancel.clone();

        // Long blocking network waits: a dedicated thread, not the rayon pool.
        let thread = std::thread::spawn(move || {
            let sender: Sender<Progress> = tx;
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                worker.run_with(request, &flag, &mut |event| {
                    let _ = sender.send(event);
                })
            }));
            outcome.unwrap_or_else(|_| {
                log_err!("Generation worker panicked");
                let err = PipelineError::new(
                    Stage::Compositing,
                    VisError::InvalidState("generation worker panicked".to_string()),
                );
                let _ = sender.send(Progress::Failed(err.clone()));
                Err(err)
            })
        });

        GenerationHandle {
            progress: rx,
            cancel,
            thread,
        }
    }

    fn execute(
        &self,
        request: &GenerationRequest,
        project: &mut Project,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<ResultImageReference, PipelineError> {
        // -- Inputs ----------------------------------------------------------
        let base = self.resolve_image(&request.image, Stage::Compositing)?;
        let (w, h) = base.dimensions();

        // -- Mask ------------------------------------------------------------
        let mask = match &request.mask {
            MaskSource::Painted(mask) => mask.clone(),
            MaskSource::AutoDetect => {
                progress(Progress::Detecting);
                let base_url = match request.image.url() {
                    Some(url) => url.to_string(),
                    None => {
                        let url = self.upload_jpeg(&base, Stage::Detection)?;
                        project.reference_image_url = Some(url.clone());
                        url
                    }
                };
                self.detect(&base_url, w, h, cancel)?
            }
        };
        if mask.is_empty() {
            return Err(PipelineError::new(
                Stage::Compositing,
                VisError::InvalidState("mask selects no pixels".to_string()),
            ));
        }
        check_cancel(cancel, Stage::Compositing)?;

        // -- Composite -------------------------------------------------------
        progress(Progress::Compositing);
        let texture = self.resolve_image(&request.texture, Stage::Compositing)?;
        let composite = composite_with(&base, &mask, &texture, self.composite_options)
            .map_err(|e| PipelineError::new(Stage::Compositing, e))?;
        check_cancel(cancel, Stage::Upload)?;

        // -- Upload ----------------------------------------------------------
        progress(Progress::Uploading);
        let composite_url = self
            .store
            .upload_image(&composite.encoded, JPEG_CONTENT_TYPE)
            .map_err(|e| PipelineError::new(Stage::Upload, e))?;
        if project.reference_image_url.is_none() {
            project.reference_image_url = Some(self.upload_jpeg(&base, Stage::Upload)?);
        }
        let (mask_url, texture_url) = if request.pipeline.needs_mask_upload() {
            let (cw, ch) = composite.dimensions();
            let sized = if mask.dimensions() == (cw, ch) {
                mask
            } else {
                mask.resized(cw, ch)
            };
            let png = encode_mask_png(&sized).map_err(|e| PipelineError::new(Stage::Upload, e))?;
            let mask_url = self
                .store
                .upload_image(&png, PNG_CONTENT_TYPE)
                .map_err(|e| PipelineError::new(Stage::Upload, e))?;
            let texture_url = match request.texture.url() {
                Some(url) => url.to_string(),
                None => self.upload_jpeg(&texture, Stage::Upload)?,
            };
            (Some(mask_url), Some(texture_url))
        } else {
            (None, None)
        };

        // -- Generation chain ------------------------------------------------
        let mut current = composite_url.clone();
        let mut jobs = Vec::with_capacity(request.pipeline.stages().len());
        for &kind in request.pipeline.stages() {
            let stage = stage_for(kind);
            check_cancel(cancel, stage)?;
            progress(Progress::Generating { kind });
            let params = self.params.build(
                kind,
                StageInputs {
                    image_url: &current,
                    mask_url: mask_url.as_deref(),
                    texture_url: texture_url.as_deref(),
                    slab_name: request.slab_name.as_deref(),
                    slab_type: request.slab_type.as_deref(),
                },
            );
            let job = self
                .jobs
                .run(kind, &params, self.generation_budget, cancel)
                .map_err(|e| PipelineError::new(stage, e))?;
            current = job
                .clone()
                .into_result()
                .map_err(|e| PipelineError::new(stage, e))?;
            jobs.push(job);
        }

        Ok(ResultImageReference {
            url: current,
            project_id: project.id,
            composite_url,
            mask_url,
            jobs,
        })
    }

    /// Detection job → mask image at the base image size.
    fn detect(&self, image_url: &str, w: u32, h: u32, cancel: &CancelFlag) -> Result<SelectionMask, PipelineError> {
        let tag = |e: VisError| PipelineError::new(Stage::Detection, e);
        let params = self.params.build(
            JobKind::Detection,
            StageInputs {
                image_url,
                ..Default::default()
            },
        );
        let job = self
            .jobs
            .run(JobKind::Detection, &params, self.detection_budget, cancel)
            .map_err(tag)?;
        let mask_url = job.into_result().map_err(tag)?;
        let detected = self.fetcher.fetch_mask(&mask_url).map_err(tag)?;
        if detected.dimensions() == (w, h) {
            Ok(detected)
        } else {
            log_info!(
                "Detected mask {}x{} resized to {}x{}",
                detected.width(),
                detected.height(),
                w,
                h
            );
            Ok(detected.resized(w, h))
        }
    }

    fn resolve_image(&self, source: &ImageSource, stage: Stage) -> Result<PixelGrid, PipelineError> {
        match source {
            ImageSource::Pixels(pixels) => Ok(pixels.clone()),
            ImageSource::Url(url) => self
                .fetcher
                .fetch_image(url)
                .map_err(|e| PipelineError::new(stage, e)),
        }
    }

    fn upload_jpeg(&self, image: &PixelGrid, stage: Stage) -> Result<String, PipelineError> {
        let bytes = encode_jpeg(image, self.composite_options.jpeg_quality)
            .map_err(|e| PipelineError::new(stage, e))?;
        self.store
            .upload_image(&bytes, JPEG_CONTENT_TYPE)
            .map_err(|e| PipelineError::new(stage, e))
    }

    /// Record-store failures never fail the run.
    fn persist(&self, project: &Project, update: &ProjectUpdate) {
        if let Err(e) = self.recorder.persist(project, update) {
            log_warn!("Project {}: could not record {}: {}", project.id, update.status.as_str(), e);
        }
    }
}

fn check_cancel(cancel: &CancelFlag, stage: Stage) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::new(stage, VisError::Cancelled))
    } else {
        Ok(())
    }
}

/// Non-blocking run: progress events, cancellation and the final result.
pub struct GenerationHandle {
    pub progress: Receiver<Progress>,
    cancel: CancelFlag,
    thread: JoinHandle<Result<ResultImageReference, PipelineError>>,
}

impl GenerationHandle {
    /// Stop at the next stage boundary or poll wait.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and return its result.
    pub fn join(self) -> Result<ResultImageReference, PipelineError> {
        self.thread.join().unwrap_or_else(|_| {
            Err(PipelineError::new(
                Stage::Compositing,
                VisError::InvalidState("generation worker panicked".to_string()),
            ))
        })
    }
}
