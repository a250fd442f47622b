use serde_json::{json, Map, Value};

use super::PipelineKind;
use crate::jobs::JobKind;
use crate::settings::Settings;

/// Model inputs for each job kind.
#[derive(Clone, Debug, PartialEq)]
pub struct JobParams {
    pub detection_prompt: String,
    pub texture_prompt: String,
    pub refine_prompt: String,
    pub negative_prompt: String,

    // Detection
    pub box_threshold: f64,
    pub text_threshold: f64,

    // Texture application
    pub conditioning_scale: f64,
    pub inference_steps: u32,
    pub guidance_scale: f64,
    pub scheduler: String,
    pub seed: u64,

    // Lighting refinement
    pub refine_strength: f64,
}

impl Default for JobParams {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Placeholders accepted in the texture and refinement prompts.
pub const SLAB_NAME_PLACEHOLDER: &str = "{slab_name}";
pub const SLAB_TYPE_PLACEHOLDER: &str = "{slab_type}";

/// Used for `{slab_type}` when the request names no material type.
const FALLBACK_SLAB_TYPE: &str = "stone";

/// URLs and material details available to the job being built.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageInputs<'a> {
    /// Base image for detection, otherwise the previous stage's output.
    pub image_url: &'a str,
    pub mask_url: Option<&'a str>,
    pub texture_url: Option<&'a str>,
    pub slab_name: Option<&'a str>,
    pub slab_type: Option<&'a str>,
}

/// Fill the slab placeholders of `template` and collapse the whitespace
/// left behind by empty values.
pub fn render_prompt(template: &str, slab_name: Option<&str>, slab_type: Option<&str>) -> String {
    let present: fn(Option<&str>) -> Option<&str> = |v| v.map(str::trim).filter(|v| !v.is_empty());
    let filled = template
        .replace(SLAB_NAME_PLACEHOLDER, present(slab_name).unwrap_or(""))
        .replace(
            SLAB_TYPE_PLACEHOLDER,
            present(slab_type).unwrap_or(FALLBACK_SLAB_TYPE),
        );
    filled.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl JobParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            detection_prompt: settings.detection_prompt.clone(),
            texture_prompt: settings.texture_prompt.clone(),
            refine_prompt: settings.refine_prompt.clone(),
            negative_prompt: settings.negative_prompt.clone(),
            box_threshold: 0.3,
            text_threshold: 0.25,
            conditioning_scale: 0.8,
            inference_steps: 40,
            guidance_scale: 8.0,
            scheduler: "K_EULER".to_string(),
            seed: 42,
            refine_strength: f64::from(settings.refine_strength),
        }
    }

    pub fn build(&self, kind: JobKind, inputs: StageInputs<'_>) -> Value {
        let mut input = Map::new();
        input.insert("image".into(), json!(inputs.image_url));
        match kind {
            JobKind::Detection => {
                input.insert("prompt".into(), json!(self.detection_prompt));
                input.insert("box_threshold".into(), json!(self.box_threshold));
                input.insert("text_threshold".into(), json!(self.text_threshold));
            }
            JobKind::TextureApplication => {
                input.insert(
                    "prompt".into(),
                    json!(render_prompt(&self.texture_prompt, inputs.slab_name, inputs.slab_type)),
                );
                input.insert("negative_prompt".into(), json!(self.negative_prompt));
                if let Some(mask) = inputs.mask_url {
                    input.insert("mask".into(), json!(mask));
                }
                if let Some(texture) = inputs.texture_url {
                    input.insert("control_image".into(), json!(texture));
                }
                input.insert(
                    "controlnet_conditioning_scale".into(),
                    json!(self.conditioning_scale),
                );
                input.insert("num_inference_steps".into(), json!(self.inference_steps));
                input.insert("guidance_scale".into(), json!(self.guidance_scale));
                input.insert("scheduler".into(), json!(self.scheduler));
                input.insert("seed".into(), json!(self.seed));
            }
            JobKind::LightingRefinement => {
                input.insert(
                    "prompt".into(),
                    json!(render_prompt(&self.refine_prompt, inputs.slab_name, inputs.slab_type)),
                );
                input.insert("negative_prompt".into(), json!(self.negative_prompt));
                input.insert("prompt_strength".into(), json!(self.refine_strength));
                input.insert("num_inference_steps".into(), json!(self.inference_steps));
                input.insert("guidance_scale".into(), json!(self.guidance_scale));
                input.insert("seed".into(), json!(self.seed));
            }
        }
        Value::Object(input)
    }

    /// Stored with the project record as `prompt_used`.
    pub fn summary(
        &self,
        pipeline: PipelineKind,
        slab_name: Option<&str>,
        slab_type: Option<&str>,
    ) -> String {
        let template = match pipeline.stages().first() {
            Some(JobKind::TextureApplication) => &self.texture_prompt,
            _ => &self.refine_prompt,
        };
        let prompt = render_prompt(template, slab_name, slab_type);
        match slab_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("[{}] AI: {} | {}", pipeline.as_str(), name, prompt),
            None => format!("[{}] {}", pipeline.as_str(), prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_params_carry_thresholds() {
        let p = JobParams::default().build(
            JobKind::Detection,
            StageInputs {
                image_url: "https://store/base.jpg",
                ..Default::default()
            },
        );
        assert_eq!(p["image"], "https://store/base.jpg");
        assert_eq!(p["box_threshold"], 0.3);
        assert_eq!(p["text_threshold"], 0.25);
        assert!(p.get("mask").is_none());
    }

    #[test]
    fn texture_params_include_mask_and_control_image() {
        let p = JobParams::default().build(
            JobKind::TextureApplication,
            StageInputs {
                image_url: "c.jpg",
                mask_url: Some("m.png"),
                texture_url: Some("t.jpg"),
                ..Default::default()
            },
        );
        assert_eq!(p["mask"], "m.png");
        assert_eq!(p["control_image"], "t.jpg");
        assert_eq!(p["scheduler"], "K_EULER");
        assert_eq!(p["num_inference_steps"], 40);
        assert_eq!(p["seed"], 42);
    }

    #[test]
    fn refinement_uses_configured_strength() {
        let mut settings = Settings::default();
        settings.refine_strength = 0.5;
        let p = JobParams::from_settings(&settings).build(
            JobKind::LightingRefinement,
            StageInputs {
                image_url: "prev.png",
                ..Default::default()
            },
        );
        assert_eq!(p["prompt_strength"], 0.5);
        assert_eq!(p["image"], "prev.png");
    }

    #[test]
    fn slab_material_is_written_into_prompts() {
        let inputs = StageInputs {
            image_url: "c.jpg",
            slab_name: Some("Calacatta Gold"),
            slab_type: Some("marble"),
            ..Default::default()
        };
        let params = JobParams::default();
        let texture = params.build(JobKind::TextureApplication, inputs);
        let prompt = texture["prompt"].as_str().unwrap();
        assert!(prompt.contains("Calacatta Gold marble"), "{}", prompt);
        assert!(!prompt.contains('{'));

        let refine = params.build(JobKind::LightingRefinement, inputs);
        assert!(refine["prompt"].as_str().unwrap().contains("Calacatta Gold marble"));
    }

    #[test]
    fn missing_material_falls_back_to_stone() {
        let rendered = render_prompt("with {slab_name} {slab_type}, authentic {slab_type}", None, Some(" "));
        assert_eq!(rendered, "with stone, authentic stone");
        let rendered = render_prompt("{slab_name} {slab_type} top", Some("Nero"), None);
        assert_eq!(rendered, "Nero stone top");
    }

    #[test]
    fn summary_names_the_slab() {
        let params = JobParams::default();
        let named = params.summary(
            PipelineKind::CompositeApplyRefine,
            Some("Calacatta Gold"),
            Some("marble"),
        );
        assert!(named.starts_with("[composite-apply-refine] AI: Calacatta Gold | "), "{}", named);
        assert!(named.contains("Calacatta Gold marble"));

        let plain = params.summary(PipelineKind::LocalCompositeRefine, None, None);
        assert!(plain.starts_with("[local-composite-refine] "));
        assert!(!plain.contains("AI:"));
    }
}
