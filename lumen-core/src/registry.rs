use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Closed set of generation backends the proxy knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKey {
    StableDiffusion,
    Flux,
    Ideogram,
}

serde_plain::derive_display_from_serialize!(ModelKey);
serde_plain::derive_fromstr_from_deserialize!(ModelKey);

impl ModelKey {
    pub const ALL: [ModelKey; 3] = [ModelKey::StableDiffusion, ModelKey::Flux, ModelKey::Ideogram];

    /// Parse a model key as sent by a caller. Unknown or empty names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        name.trim().parse().ok()
    }
}

/// One generation backend: where to send jobs and what to send by default.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub key: ModelKey,
    pub external_model_id: String,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub default_parameters: Map<String, Value>,
}

impl ModelConfig {
    fn new(
        key: ModelKey,
        external_model_id: &str,
        name: &str,
        description: &str,
        defaults: Value,
    ) -> Self {
        let default_parameters = match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            key,
            external_model_id: external_model_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            default_parameters,
        }
    }

    fn builtin(key: ModelKey) -> Self {
        match key {
            ModelKey::StableDiffusion => Self::new(
                key,
                "stability-ai/stable-diffusion-3.5-large",
                "Stable Diffusion XL",
                "High-quality image generation with great composition",
                json!({
                    "prompt": "",
                    "negative_prompt": "",
                    "width": 1024,
                    "height": 1024,
                    "num_outputs": 1,
                    "scheduler": "dpm-plus-plus-2m-karras",
                    "num_inference_steps": 50,
                    "guidance_scale": 7.5,
                    "seed": null,
                    "refine": "no_refiner",
                    "high_noise_frac": 0.8,
                }),
            ),
            ModelKey::Flux => Self::new(
                key,
                "black-forest-labs/flux-1.1-pro-ultra",
                "Flux Pro 1.1",
                "Excellent image quality and prompt adherence",
                json!({
                    "prompt": "",
                    "aspect_ratio": "1:1",
                    "raw": false,
                    "safety_tolerance": 2,
                    "seed": null,
                    "output_format": "jpg",
                }),
            ),
            ModelKey::Ideogram => Self::new(
                key,
                "ideogram-ai/ideogram-v2",
                "Ideogram v2",
                "Excellent text rendering and prompt comprehension",
                json!({
                    "prompt": "",
                    "negative_prompt": "",
                    "aspect_ratio": "1:1",
                    "resolution": "1024x1024",
                    "style_type": "General",
                    "magic_prompt_option": "Auto",
                    "seed": null,
                }),
            ),
        }
    }
}

/// Immutable table of [`ModelConfig`]s, built once at startup.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: [ModelConfig; 3],
}

impl ModelRegistry {
    pub fn builtin() -> Self {
        Self {
            models: ModelKey::ALL.map(ModelConfig::builtin),
        }
    }

    pub fn get(&self, key: ModelKey) -> &ModelConfig {
        // slots follow the declaration order of ModelKey::ALL
        &self.models[key as usize]
    }

    /// Resolve a caller-supplied model name.
    pub fn lookup(&self, name: &str) -> Option<&ModelConfig> {
        ModelKey::from_name(name).map(|key| self.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
