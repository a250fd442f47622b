mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use slabviz::canvas::SelectionMask;
use slabviz::error::{Stage, VisError};
use slabviz::io::{decode_rgba, encode_mask_png};
use slabviz::jobs::{JobKind, JobStatus, PollBudget};
use slabviz::ops::composite::composite;
use slabviz::pipeline::{GenerationRequest, ImageSource, MaskSource, PipelineKind, Progress};
use slabviz::project::ProjectStatus;

use common::*;

fn rect_mask() -> SelectionMask {
    let mut mask = SelectionMask::new(900, 600);
    mask.select_rect(300, 200, 200, 150);
    mask
}

fn painted(pipeline: PipelineKind) -> GenerationRequest {
    GenerationRequest::new(
        pipeline,
        ImageSource::Pixels(kitchen()),
        ImageSource::Pixels(red_texture()),
        MaskSource::Painted(rect_mask()),
    )
    .named("Kitchen remodel")
}

#[test]
fn rectangle_is_tiled_red_and_rest_is_untouched() {
    let out = composite(&kitchen(), &rect_mask(), &red_texture(), 1024).unwrap();
    assert_eq!(out.dimensions(), (900, 600));
    assert!(!out.downscaled);
    for (x, y, p) in out.pixels.enumerate_pixels() {
        let inside = (300..500).contains(&x) && (200..350).contains(&y);
        if inside {
            assert_eq!(*p, RED, "({}, {}) should be red", x, y);
        } else {
            assert_eq!(*p, GRAY, "({}, {}) should be unchanged", x, y);
        }
    }
    let decoded = decode_rgba(&out.encoded).unwrap();
    assert_eq!(decoded.dimensions(), (900, 600));
}

#[test]
fn apply_refine_chain_feeds_each_result_forward() {
    let jobs = StubJobs::new()
        .script(JobKind::TextureApplication, Script::succeed(2, "https://cdn/applied.png"))
        .script(JobKind::LightingRefinement, Script::succeed(1, "https://cdn/final.png"));
    let h = harness(jobs);

    let result = h
        .orchestrator
        .run(painted(PipelineKind::CompositeApplyRefine))
        .unwrap();

    assert_eq!(result.url, "https://cdn/final.png");
    assert_eq!(
        h.jobs.submitted_kinds(),
        vec![JobKind::TextureApplication, JobKind::LightingRefinement]
    );
    let texture = h.jobs.params_for(JobKind::TextureApplication).unwrap();
    assert_eq!(texture["image"], result.composite_url.as_str());
    assert_eq!(texture["mask"], result.mask_url.as_deref().unwrap());
    let refine = h.jobs.params_for(JobKind::LightingRefinement).unwrap();
    assert_eq!(refine["image"], "https://cdn/applied.png");

    // composite, reference photo, mask and texture
    assert_eq!(h.store.upload_count(), 4);
    let (composite_jpeg, content_type) = h.store.get(&result.composite_url).unwrap();
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(decode_rgba(&composite_jpeg).unwrap().dimensions(), (900, 600));

    assert_eq!(result.jobs.len(), 2);
    assert!(result.jobs.iter().all(|j| j.status == JobStatus::Succeeded));
    assert_eq!(result.jobs[0].polls, 3);
    assert_eq!(
        h.records.statuses(),
        vec![ProjectStatus::Processing, ProjectStatus::Completed]
    );
    assert_eq!(
        h.records.last().unwrap().result_image_url.as_deref(),
        Some("https://cdn/final.png")
    );
}

#[test]
fn painted_run_records_reference_photo_and_slab() {
    let jobs = StubJobs::new()
        .script(JobKind::TextureApplication, Script::succeed(0, "https://cdn/applied.png"))
        .script(JobKind::LightingRefinement, Script::succeed(0, "https://cdn/final.png"));
    let h = harness(jobs);

    let request = painted(PipelineKind::CompositeApplyRefine).with_slab("Calacatta Gold", "marble");
    let result = h.orchestrator.run(request).unwrap();

    let reference = h.records.last().unwrap().reference_image_url.unwrap();
    assert_ne!(reference, result.composite_url);
    let (bytes, content_type) = h.store.get(&reference).unwrap();
    assert_eq!(content_type, "image/jpeg");
    let photo = decode_rgba(&bytes).unwrap();
    assert_eq!(photo.dimensions(), (900, 600));
    // The untouched photo, not the composite.
    let centre = photo.get_pixel(400, 275);
    assert!((centre[0] as i32 - GRAY[0] as i32).abs() < 12, "{:?}", centre);

    for kind in [JobKind::TextureApplication, JobKind::LightingRefinement] {
        let params = h.jobs.params_for(kind).unwrap();
        let prompt = params["prompt"].as_str().unwrap();
        assert!(prompt.contains("Calacatta Gold marble"), "{:?}: {}", kind, prompt);
    }
    let updates = h.records.updates.lock().unwrap();
    let prompt_used = updates[0].0.prompt_used.clone().unwrap();
    assert!(prompt_used.contains("AI: Calacatta Gold"), "{}", prompt_used);
    assert_eq!(updates[0].0.slab_type.as_deref(), Some("marble"));
}

#[test]
fn texture_failure_on_third_poll_stops_before_refinement() {
    let jobs = StubJobs::new()
        .script(JobKind::TextureApplication, Script::fail(2, "GPU worker crashed"))
        .script(JobKind::LightingRefinement, Script::succeed(0, "https://cdn/never.png"));
    let h = harness(jobs);

    let err = h
        .orchestrator
        .run(painted(PipelineKind::CompositeApplyRefine))
        .unwrap_err();

    assert_eq!(err.stage, Stage::TextureApplication);
    assert_eq!(err.stage.as_str(), "texture-application");
    assert_eq!(err.error.kind(), "JobFailed");
    assert_eq!(err.error, VisError::JobFailed("GPU worker crashed".into()));
    assert_eq!(h.jobs.polls.load(Ordering::SeqCst), 3);
    assert_eq!(h.jobs.submitted_kinds(), vec![JobKind::TextureApplication]);
    assert_eq!(
        h.records.statuses(),
        vec![ProjectStatus::Processing, ProjectStatus::Failed]
    );
}

#[test]
fn exhausted_budget_is_reported_as_timeout() {
    let jobs = StubJobs::new().script(
        JobKind::LightingRefinement,
        Script::succeed(50, "https://cdn/late.png"),
    );
    let h = harness_with_budget(jobs, 5);

    let err = h
        .orchestrator
        .run(painted(PipelineKind::LocalCompositeRefine))
        .unwrap_err();
    assert_eq!(err.stage, Stage::LightingRefinement);
    assert_eq!(err.error, VisError::JobTimedOut { attempts: 5 });
    assert!(err.friendly_message().contains("timed out"));
}

#[test]
fn detected_mask_is_resized_and_composited() {
    let jobs = StubJobs::new()
        .script(JobKind::Detection, Script::succeed(1, "mem://detections/counter.png"))
        .script(JobKind::TextureApplication, Script::succeed(0, "https://cdn/tiled.png"));
    let h = harness(jobs);

    // Half-resolution detection output covering the same rectangle.
    let mut small = SelectionMask::new(450, 300);
    small.select_rect(150, 100, 100, 75);
    h.store.put(
        "mem://detections/counter.png",
        encode_mask_png(&small).unwrap(),
        "image/png",
    );

    let request = GenerationRequest::new(
        PipelineKind::DetectAndTile,
        ImageSource::Pixels(kitchen()),
        ImageSource::Pixels(red_texture()),
        MaskSource::AutoDetect,
    );
    let mut events = Vec::new();
    let result = h
        .orchestrator
        .run_with(request, &Default::default(), &mut |e| events.push(e))
        .unwrap();

    assert_eq!(result.url, "https://cdn/tiled.png");
    assert_eq!(
        h.jobs.submitted_kinds(),
        vec![JobKind::Detection, JobKind::TextureApplication]
    );
    let detection = h.jobs.params_for(JobKind::Detection).unwrap();
    assert_eq!(detection["image"], "mem://objects/1.jpg");

    let composite = decode_rgba(&h.store.get(&result.composite_url).unwrap().0).unwrap();
    let inside = composite.get_pixel(400, 275);
    let outside = composite.get_pixel(50, 50);
    assert!(inside[0] > 200 && inside[1] < 60, "inside {:?}", inside);
    assert!((outside[0] as i32 - 100).abs() < 12, "outside {:?}", outside);

    assert_eq!(events[0], Progress::Detecting);
    assert_eq!(events[1], Progress::Compositing);
    assert_eq!(events[2], Progress::Uploading);
    assert_eq!(
        events[3],
        Progress::Generating {
            kind: JobKind::TextureApplication
        }
    );
    assert!(matches!(events.last(), Some(Progress::Done(r)) if r.url == result.url));
}

#[test]
fn detection_failure_stops_before_compositing() {
    let jobs = StubJobs::new()
        .script(JobKind::Detection, Script::fail(0, "no countertop found"))
        .script(JobKind::TextureApplication, Script::succeed(0, "https://cdn/x.png"));
    let h = harness(jobs);

    let request = GenerationRequest::new(
        PipelineKind::DetectAndTile,
        ImageSource::Pixels(kitchen()),
        ImageSource::Pixels(red_texture()),
        MaskSource::AutoDetect,
    );
    let mut events = Vec::new();
    let err = h
        .orchestrator
        .run_with(request, &Default::default(), &mut |e| events.push(e))
        .unwrap_err();

    assert_eq!(err.stage, Stage::Detection);
    assert_eq!(err.error.kind(), "JobFailed");
    assert!(!events.contains(&Progress::Compositing));
    // Only the base image went up, for detection.
    assert_eq!(h.store.upload_count(), 1);
    assert_eq!(h.jobs.submitted_kinds(), vec![JobKind::Detection]);
}

#[test]
fn mismatched_painted_mask_fails_in_compositing() {
    let h = harness(StubJobs::new());
    let request = GenerationRequest::new(
        PipelineKind::LocalCompositeRefine,
        ImageSource::Pixels(kitchen()),
        ImageSource::Pixels(red_texture()),
        MaskSource::Painted({
            let mut m = SelectionMask::new(100, 100);
            m.select_rect(0, 0, 10, 10);
            m
        }),
    );
    let err = h.orchestrator.run(request).unwrap_err();
    assert_eq!(err.stage, Stage::Compositing);
    assert_eq!(err.error.kind(), "DimensionMismatch");
    assert_eq!(h.store.upload_count(), 0);
}

#[test]
fn rejected_submission_is_stage_tagged() {
    // No script for refinement: the stub rejects the submission.
    let h = harness(StubJobs::new());
    let err = h
        .orchestrator
        .run(painted(PipelineKind::LocalCompositeRefine))
        .unwrap_err();
    assert_eq!(err.stage, Stage::LightingRefinement);
    assert_eq!(err.error.kind(), "SubmissionError");
    assert_eq!(h.jobs.polls.load(Ordering::SeqCst), 0);
}

#[test]
fn spawned_run_reports_progress_and_joins() {
    let jobs = StubJobs::new()
        .script(JobKind::LightingRefinement, Script::succeed(3, "https://cdn/lit.png"));
    let h = harness(jobs);

    let handle = h.orchestrator.spawn(painted(PipelineKind::LocalCompositeRefine));
    let events: Vec<Progress> = handle.progress.iter().collect();
    let result = handle.join().unwrap();

    assert_eq!(result.url, "https://cdn/lit.png");
    assert_eq!(
        events.iter().map(Progress::label).collect::<Vec<_>>(),
        vec![
            "compositing",
            "uploading",
            "generating (lighting-refinement)",
            "done"
        ]
    );
}

#[test]
fn cancelled_spawn_stops_polling() {
    let jobs = StubJobs::new()
        .script(JobKind::LightingRefinement, Script::succeed(10_000, "https://cdn/never.png"));
    let h = harness(jobs.clone());
    let orchestrator = h
        .orchestrator
        .clone()
        .with_budgets(
            PollBudget::new(Duration::from_millis(20), 10_000),
            PollBudget::new(Duration::from_millis(20), 10_000),
        );

    let handle = orchestrator.spawn(painted(PipelineKind::LocalCompositeRefine));
    // Wait until the refinement job is being polled.
    for event in handle.progress.iter() {
        if matches!(event, Progress::Generating { .. }) {
            break;
        }
    }
    handle.cancel();
    let err = handle.join().unwrap_err();

    assert_eq!(err.error, VisError::Cancelled);
    assert_eq!(err.stage, Stage::LightingRefinement);
    let polls_after = jobs.polls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(jobs.polls.load(Ordering::SeqCst), polls_after);
    assert_eq!(h.records.last().unwrap().status, ProjectStatus::Failed);
}
