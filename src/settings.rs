// ============================================================================
// SETTINGS: `key=value` config file with environment overrides for secrets
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jobs::{JobKind, PollBudget};
use crate::ops::composite::CompositeOptions;
use crate::ops::transform::Interpolation;

/// Runtime configuration shared by the CLI and the HTTP collaborators.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    // Generation service
    pub api_base: String,
    /// Never written to disk by [`Settings::save_to`].
    pub api_token: String,
    pub detection_model: String,
    pub texture_model: String,
    pub refinement_model: String,
    pub detection_prompt: String,
    pub texture_prompt: String,
    pub refine_prompt: String,
    pub negative_prompt: String,
    /// Denoising strength of the lighting pass (0.0–1.0). Low keeps material colour.
    pub refine_strength: f32,

    // Object storage
    pub storage_url: String,
    pub storage_bucket: String,
    pub storage_key: String,

    // Polling
    pub poll_interval_ms: u64,
    pub detection_max_attempts: u32,
    pub generation_max_attempts: u32,

    // Compositing
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    /// Filter for the memory-bounding downscale.
    pub downscale_filter: Interpolation,

    // Transport
    pub fetch_retries: u32,
    pub request_timeout_secs: u64,

    /// Where project records are written. Empty = data directory default.
    pub records_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "https://api.replicate.com/v1".to_string(),
            api_token: String::new(),
            detection_model: "18cf84e062ec28b5b1b0a78f2a5e1d4e738acd8a9c7479c38e01237d5a21af63"
                .to_string(),
            texture_model: "435061a1b5a4c1e26740464bf786efdfa9cb3a3ac488595a2de23e143fdb0117"
                .to_string(),
            refinement_model: "stability-ai/sdxl".to_string(),
            detection_prompt: "countertop, kitchen counter, counter surface".to_string(),
            texture_prompt: "replace the masked horizontal countertop surface with polished \
                             {slab_name} {slab_type}, authentic {slab_type} veining and colour, \
                             accurate slab scale, realistic reflections and shadows from the \
                             existing scene lighting, photorealistic"
                .to_string(),
            refine_prompt: "same scene with a {slab_name} {slab_type} countertop, natural \
                            lighting, soft realistic shadows and reflections on the countertop, \
                            photorealistic"
                .to_string(),
            negative_prompt: "different texture, wrong colors, wrong patterns, artificial, \
                              plastic, blurry, low quality, distorted, cartoon, watermark, text, \
                              bad lighting, unrealistic"
                .to_string(),
            refine_strength: 0.25,
            storage_url: String::new(),
            storage_bucket: "project-images".to_string(),
            storage_key: String::new(),
            poll_interval_ms: 1000,
            detection_max_attempts: 60,
            generation_max_attempts: 120,
            max_dimension: 1024,
            jpeg_quality: 92,
            downscale_filter: Interpolation::Bilinear,
            fetch_retries: 2,
            request_timeout_secs: 30,
            records_dir: String::new(),
        }
    }
}

impl Settings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/slabviz/slabviz_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\SlabViz\slabviz_settings.cfg
    /// On macOS:   ~/Library/Application Support/SlabViz/slabviz_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("SlabViz").join("slabviz_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("SlabViz")
                    .join("slabviz_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("slabviz").join("slabviz_settings.cfg"))
        }
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Self {
        let mut s = match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        s.apply_env();
        s
    }

    /// Load from `path` (defaults if missing or unreadable). No env overrides.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines. Unknown keys and bad values keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "api_base" => s.api_base = val.trim_end_matches('/').to_string(),
                "api_token" => s.api_token = val.to_string(),
                "detection_model" => s.detection_model = val.to_string(),
                "texture_model" => s.texture_model = val.to_string(),
                "refinement_model" => s.refinement_model = val.to_string(),
                "detection_prompt" => s.detection_prompt = val.to_string(),
                "texture_prompt" => s.texture_prompt = val.to_string(),
                "refine_prompt" => s.refine_prompt = val.to_string(),
                "negative_prompt" => s.negative_prompt = val.to_string(),
                "refine_strength" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.refine_strength = v.clamp(0.0, 1.0);
                    }
                }
                "storage_url" => s.storage_url = val.trim_end_matches('/').to_string(),
                "storage_bucket" => s.storage_bucket = val.to_string(),
                "storage_key" => s.storage_key = val.to_string(),
                "poll_interval_ms" => {
                    s.poll_interval_ms = val.parse().unwrap_or(s.poll_interval_ms);
                }
                "detection_max_attempts" => {
                    s.detection_max_attempts = val.parse().unwrap_or(s.detection_max_attempts);
                }
                "generation_max_attempts" => {
                    s.generation_max_attempts = val.parse().unwrap_or(s.generation_max_attempts);
                }
                "max_dimension" => {
                    s.max_dimension = val.parse().ok().filter(|&v| v > 0).unwrap_or(s.max_dimension);
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val
                        .parse::<u8>()
                        .ok()
                        .filter(|q| (1..=100).contains(q))
                        .unwrap_or(s.jpeg_quality);
                }
                "downscale_filter" => {
                    s.downscale_filter = Interpolation::from_name(val).unwrap_or(s.downscale_filter);
                }
                "fetch_retries" => s.fetch_retries = val.parse().unwrap_or(s.fetch_retries),
                "request_timeout_secs" => {
                    s.request_timeout_secs = val.parse().unwrap_or(s.request_timeout_secs);
                }
                "records_dir" => s.records_dir = val.to_string(),
                _ => {}
            }
        }
        s
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env(&mut self) {
        if let Some(token) = non_empty_env("REPLICATE_API_TOKEN").or_else(|| non_empty_env("REPLICATE_API_KEY")) {
            self.api_token = token;
        }
        if let Some(key) = non_empty_env("SLABVIZ_STORAGE_KEY") {
            self.storage_key = key;
        }
        if let Some(url) = non_empty_env("SLABVIZ_STORAGE_URL") {
            self.storage_url = url.trim_end_matches('/').to_string();
        }
    }

    /// Serialize to the config format. Secrets are omitted.
    pub fn to_config_string(&self) -> String {
        format!(
            "api_base={}\n\
             detection_model={}\n\
             texture_model={}\n\
             refinement_model={}\n\
             detection_prompt={}\n\
             texture_prompt={}\n\
             refine_prompt={}\n\
             negative_prompt={}\n\
             refine_strength={}\n\
             storage_url={}\n\
             storage_bucket={}\n\
             poll_interval_ms={}\n\
             detection_max_attempts={}\n\
             generation_max_attempts={}\n\
             max_dimension={}\n\
             jpeg_quality={}\n\
             downscale_filter={}\n\
             fetch_retries={}\n\
             request_timeout_secs={}\n\
             records_dir={}\n",
            self.api_base,
            self.detection_model,
            self.texture_model,
            self.refinement_model,
            self.detection_prompt,
            self.texture_prompt,
            self.refine_prompt,
            self.negative_prompt,
            self.refine_strength,
            self.storage_url,
            self.storage_bucket,
            self.poll_interval_ms,
            self.detection_max_attempts,
            self.generation_max_attempts,
            self.max_dimension,
            self.jpeg_quality,
            self.downscale_filter.label(),
            self.fetch_retries,
            self.request_timeout_secs,
            self.records_dir,
        )
    }

    /// Save to the default location.
    pub fn save(&self) -> std::io::Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no config directory",
            )),
        }
    }

    /// Save to `path`, creating the directory.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Hosted model identifier for a job kind.
    pub fn model_for(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::Detection => &self.detection_model,
            JobKind::TextureApplication => &self.texture_model,
            JobKind::LightingRefinement => &self.refinement_model,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn detection_budget(&self) -> PollBudget {
        PollBudget::new(self.poll_interval(), self.detection_max_attempts)
    }

    pub fn generation_budget(&self) -> PollBudget {
        PollBudget::new(self.poll_interval(), self.generation_max_attempts)
    }

    pub fn composite_options(&self) -> CompositeOptions {
        CompositeOptions {
            max_dimension: self.max_dimension,
            jpeg_quality: self.jpeg_quality,
            downscale_filter: self.downscale_filter,
        }
    }

    /// Directory for project records.
    pub fn records_path(&self) -> PathBuf {
        if self.records_dir.is_empty() {
            crate::logger::app_data_dir().join("projects")
        } else {
            PathBuf::from(&self.records_dir)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
