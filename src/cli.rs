// ============================================================================
// SlabViz CLI: masking, local compositing and full generation runs
// ============================================================================
//
// Usage examples:
//   slabviz mask --image kitchen.jpg --strokes strokes.json --output mask.png
//   slabviz composite -i kitchen.jpg -m mask.png -t calacatta.jpg -o preview.jpg
//   slabviz generate -i kitchen.jpg -t calacatta.jpg --mask mask.png
//   slabviz generate -i https://cdn/kitchen.jpg -t calacatta.jpg --detect --pipeline detect-and-tile
//
// Stroke files are JSON:
//   { "strokes": [ { "brush": "M", "points": [ {"x": 10, "y": 20}, ... ] },
//                  { "radius": 12.5, "points": [ ... ] } ] }

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use slabviz::canvas::{BrushSize, SelectionMask, StrokePoint};
use slabviz::error::VisError;
use slabviz::io::{encode_mask_png, load_image, load_mask, write_bytes};
use slabviz::jobs::CancelFlag;
use slabviz::ops::composite::{composite_with, CompositeOptions};
use slabviz::ops::mask::MaskSurface;
use slabviz::ops::transform::Interpolation;
use slabviz::pipeline::{
    GenerationOrchestrator, GenerationRequest, ImageSource, MaskSource, PipelineKind, Progress,
};
use slabviz::settings::Settings;
use slabviz::{log_err, log_info, logger};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SlabViz countertop visualizer.
#[derive(Parser, Debug)]
#[command(
    name = "slabviz",
    version,
    about = "Paint a countertop mask, tile a slab texture into it and run generation"
)]
pub struct CliArgs {
    /// Mirror log output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to the per-user config location).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rasterize a stroke file over an image and write the mask PNG.
    Mask {
        /// Image whose dimensions the mask covers.
        #[arg(short, long)]
        image: PathBuf,
        /// JSON stroke file.
        #[arg(short, long)]
        strokes: PathBuf,
        #[arg(short, long, value_name = "MASK.png")]
        output: PathBuf,
    },
    /// Tile a texture into the masked region and write a JPEG.
    Composite {
        #[arg(short, long)]
        image: PathBuf,
        /// Mask image; luma above 128 is replaced.
        #[arg(short, long)]
        mask: PathBuf,
        #[arg(short, long)]
        texture: PathBuf,
        #[arg(short, long, value_name = "OUT.jpg")]
        output: PathBuf,
        /// Long-edge limit in pixels (default from settings, 1024).
        #[arg(long)]
        max_dimension: Option<u32>,
        /// JPEG quality 1–100 (default from settings, 92).
        #[arg(short, long)]
        quality: Option<u8>,
        /// Downscale filter: Nearest, Bilinear, Bicubic or Lanczos3.
        #[arg(long, value_parser = parse_filter)]
        filter: Option<Interpolation>,
    },
    /// Full run against the configured generation and storage services.
    Generate {
        /// Base photograph: local path or http(s) URL.
        #[arg(short, long)]
        image: String,
        /// Slab texture: local path or http(s) URL.
        #[arg(short, long)]
        texture: String,
        /// Painted mask image.
        #[arg(short, long, conflicts_with = "detect", required_unless_present = "detect")]
        mask: Option<PathBuf>,
        /// Detect the countertop instead of using a painted mask.
        #[arg(long)]
        detect: bool,
        /// local-composite-refine, composite-apply-refine or detect-and-tile.
        #[arg(short, long, default_value = "local-composite-refine")]
        pipeline: String,
        #[arg(long, default_value = "")]
        project_name: String,
        #[arg(long)]
        slab_name: Option<String>,
        #[arg(long, requires = "slab_name")]
        slab_type: Option<String>,
    },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the selected subcommand and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    if args.verbose {
        logger::set_echo(true);
    }
    let settings = match &args.config {
        Some(path) => {
            let mut s = Settings::load_from(path);
            s.apply_env();
            s
        }
        None => Settings::load(),
    };

    let started = Instant::now();
    let result = match args.command {
        Command::Mask {
            image,
            strokes,
            output,
        } => run_mask(&image, &strokes, &output),
        Command::Composite {
            image,
            mask,
            texture,
            output,
            max_dimension,
            quality,
            filter,
        } => {
            let mut options = settings.composite_options();
            if let Some(max) = max_dimension.filter(|&m| m > 0) {
                options.max_dimension = max;
            }
            if let Some(q) = quality {
                options.jpeg_quality = q.clamp(1, 100);
            }
            if let Some(f) = filter {
                options.downscale_filter = f;
            }
            run_composite(&image, &mask, &texture, &output, options)
        }
        Command::Generate {
            image,
            texture,
            mask,
            detect,
            pipeline,
            project_name,
            slab_name,
            slab_type,
        } => {
            let Some(pipeline) = PipelineKind::from_name(&pipeline) else {
                eprintln!("error: unknown pipeline '{}'", pipeline);
                return ExitCode::FAILURE;
            };
            let mask = if detect { None } else { mask };
            run_generate(
                &settings,
                pipeline,
                &image,
                &texture,
                mask.as_deref(),
                &project_name,
                slab_name.as_deref().map(|n| (n, slab_type.as_deref().unwrap_or(""))),
            )
        }
    };

    match result {
        Ok(()) => {
            log_info!("Finished in {:.0}ms", started.elapsed().as_secs_f64() * 1000.0);
            ExitCode::SUCCESS
        }
        Err(msg) => {
            log_err!("{}", msg);
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_mask(image: &Path, strokes: &Path, output: &Path) -> Result<(), String> {
    let base = load_image(image).map_err(|e| e.to_string())?;
    let text = std::fs::read_to_string(strokes)
        .map_err(|e| format!("could not read '{}': {}", strokes.display(), e))?;
    let file: StrokeFile =
        serde_json::from_str(&text).map_err(|e| format!("invalid stroke file: {}", e))?;

    let mask = paint_strokes(base.width(), base.height(), &file).map_err(|e| e.to_string())?;
    let png = encode_mask_png(&mask).map_err(|e| e.to_string())?;
    write_bytes(output, &png).map_err(|e| e.to_string())?;
    println!(
        "{} ({} of {} pixels selected)",
        output.display(),
        mask.selected_count(),
        u64::from(mask.width()) * u64::from(mask.height())
    );
    Ok(())
}

fn parse_filter(name: &str) -> Result<Interpolation, String> {
    Interpolation::from_name(name).ok_or_else(|| {
        let names: Vec<&str> = Interpolation::ALL.iter().map(|f| f.label()).collect();
        format!("unknown filter '{}', expected one of {}", name, names.join(", "))
    })
}

fn run_composite(
    image: &Path,
    mask: &Path,
    texture: &Path,
    output: &Path,
    options: CompositeOptions,
) -> Result<(), String> {
    let base = load_image(image).map_err(|e| e.to_string())?;
    let mask = load_mask(mask).map_err(|e| e.to_string())?;
    let texture = load_image(texture).map_err(|e| e.to_string())?;

    let composite = composite_with(&base, &mask, &texture, options).map_err(|e| e.to_string())?;
    write_bytes(output, &composite.encoded).map_err(|e| e.to_string())?;
    let (w, h) = composite.dimensions();
    println!(
        "{} ({}x{}{})",
        output.display(),
        w,
        h,
        if composite.downscaled { ", downscaled" } else { "" }
    );
    Ok(())
}

fn run_generate(
    settings: &Settings,
    pipeline: PipelineKind,
    image: &str,
    texture: &str,
    mask: Option<&Path>,
    project_name: &str,
    slab: Option<(&str, &str)>,
) -> Result<(), String> {
    let orchestrator = GenerationOrchestrator::from_settings(settings).map_err(|e| e.to_string())?;
    let image = image_source(image).map_err(|e| e.to_string())?;
    let texture = image_source(texture).map_err(|e| e.to_string())?;
    let mask = match mask {
        Some(path) => MaskSource::Painted(load_mask(path).map_err(|e| e.to_string())?),
        None => MaskSource::AutoDetect,
    };

    let mut request = GenerationRequest::new(pipeline, image, texture, mask).named(project_name);
    if let Some((name, kind)) = slab {
        request = request.with_slab(name, kind);
    }

    let cancel = CancelFlag::new();
    let result = orchestrator.run_with(request, &cancel, &mut |event| {
        if !event.is_final() {
            println!("  {}...", event.label());
        }
        if let Progress::Failed(e) = &event {
            eprintln!("  {}", e.friendly_message());
        }
    });

    let reference = result.map_err(|e| e.to_string())?;
    println!("project {}", reference.project_id);
    println!("{}", reference.url);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Deserialize)]
struct StrokeFile {
    strokes: Vec<StrokeEntry>,
}

#[derive(Debug, Deserialize)]
struct StrokeEntry {
    /// Explicit brush radius in pixels; wins over `brush`.
    #[serde(default)]
    radius: Option<f32>,
    /// Preset label: S, M or L.
    #[serde(default)]
    brush: Option<String>,
    points: Vec<StrokePoint>,
}

impl StrokeEntry {
    fn radius(&self) -> Result<f32, VisError> {
        if let Some(r) = self.radius {
            return Ok(r);
        }
        match &self.brush {
            None => Ok(BrushSize::default().radius()),
            Some(label) => BrushSize::all()
                .iter()
                .find(|b| b.label().eq_ignore_ascii_case(label.trim()))
                .map(|b| b.radius())
                .ok_or_else(|| VisError::InvalidState(format!("unknown brush '{}'", label))),
        }
    }
}

/// Replay strokes the way a pointer would: press, drag, release.
fn paint_strokes(width: u32, height: u32, file: &StrokeFile) -> Result<SelectionMask, VisError> {
    let mut surface = MaskSurface::new();
    surface.load_image(width, height);
    for entry in &file.strokes {
        let Some((first, rest)) = entry.points.split_first() else {
            continue;
        };
        surface.begin_stroke(*first, entry.radius()?)?;
        for &point in rest {
            surface.extend_stroke(point)?;
        }
        surface.end_stroke();
    }
    Ok(surface.rasterize())
}

/// `http(s)://…` stays a URL; anything else is loaded from disk.
fn image_source(arg: &str) -> Result<ImageSource, VisError> {
    let trimmed = arg.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(ImageSource::Url(trimmed.to_string()))
    } else {
        load_image(Path::new(trimmed)).map(ImageSource::Pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroke_file_paints_mask() {
        let file: StrokeFile = serde_json::from_str(
            r#"{ "strokes": [
                { "brush": "s", "points": [ {"x": 10, "y": 10}, {"x": 60, "y": 10} ] },
                { "radius": 4, "points": [ {"x": 50, "y": 50} ] },
                { "points": [] }
            ] }"#,
        )
        .unwrap();
        let mask = paint_strokes(80, 80, &file).unwrap();
        assert!(mask.is_selected(10, 10));
        assert!(mask.is_selected(35, 10));
        assert!(mask.is_selected(60, 10));
        assert!(mask.is_selected(50, 50));
        assert!(!mask.is_selected(70, 70));
    }

    #[test]
    fn unknown_brush_is_rejected() {
        let file: StrokeFile = serde_json::from_str(
            r#"{ "strokes": [ { "brush": "XL", "points": [ {"x": 1, "y": 1} ] } ] }"#,
        )
        .unwrap();
        assert!(paint_strokes(10, 10, &file).is_err());
    }

    #[test]
    fn urls_are_not_loaded() {
        match image_source(" https://cdn.example/k.jpg ").unwrap() {
            ImageSource::Url(url) => assert_eq!(url, "https://cdn.example/k.jpg"),
            ImageSource::Pixels(_) => panic!("expected url"),
        }
    }

    #[test]
    fn composite_filter_is_parsed_by_name() {
        let args = CliArgs::try_parse_from([
            "slabviz", "composite", "-i", "a.jpg", "-m", "m.png", "-t", "t.jpg", "-o", "o.jpg",
            "--filter", "bicubic",
        ])
        .unwrap();
        match args.command {
            Command::Composite { filter, .. } => assert_eq!(filter, Some(Interpolation::Bicubic)),
            _ => panic!("expected composite"),
        }
        assert!(CliArgs::try_parse_from([
            "slabviz", "composite", "-i", "a.jpg", "-m", "m.png", "-t", "t.jpg", "-o", "o.jpg",
            "--filter", "sinc",
        ])
        .is_err());
    }

    #[test]
    fn generate_requires_mask_or_detect() {
        assert!(CliArgs::try_parse_from(["slabviz", "generate", "-i", "a.jpg", "-t", "b.jpg"]).is_err());
        let args = CliArgs::try_parse_from([
            "slabviz", "generate", "-i", "a.jpg", "-t", "b.jpg", "--detect", "-p", "detect-and-tile",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Generate { detect: true, .. }));
    }
}
