use std::collections::BTreeMap;
use std::sync::Arc;

use muse_contracts::campaign::{AccessTier, ImageResolution};
use serde_json::{json, Map, Value};

use crate::error::BackendError;
use crate::transport::GeminiTransport;

/// One request to an image backend. The gateway fills it per path; backends
/// forward what they are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCall {
    pub model: String,
    pub access_tier: AccessTier,
    pub prompt: String,
    /// Forwarded verbatim.
    pub aspect_ratio: String,
    pub image_size: Option<ImageResolution>,
    pub sample_count: Option<u32>,
    pub output_mime_type: Option<String>,
}

/// Still-encoded image as returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: Option<String>,
}

pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, call: &ImageCall) -> Result<Vec<InlineImage>, BackendError>;
}

/// Image backends keyed by provider name.
#[derive(Default, Clone)]
pub struct ImageBackendRegistry {
    backends: BTreeMap<String, Arc<dyn ImageBackend>>,
}

impl ImageBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: ImageBackend + 'static>(&mut self, backend: B) {
        self.register_shared(Arc::new(backend));
    }

    pub fn register_shared(&mut self, backend: Arc<dyn ImageBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageBackend> {
        self.backends.get(name).map(|backend| backend.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

pub fn default_backend_registry(transport: &GeminiTransport) -> ImageBackendRegistry {
    let mut backends = ImageBackendRegistry::new();
    backends.register(GeminiImageBackend::new(transport.clone()));
    backends.register(ImagenBackend::new(transport.clone()));
    backends
}

/// `generateContent` with an image response modality. Serves both the Pro
/// model and the Standard default model.
pub struct GeminiImageBackend {
    transport: GeminiTransport,
}

impl GeminiImageBackend {
    pub fn new(transport: GeminiTransport) -> Self {
        Self { transport }
    }

    pub fn payload(call: &ImageCall) -> Value {
        let mut image_config = Map::new();
        image_config.insert(
            "aspectRatio".to_string(),
            Value::String(call.aspect_ratio.clone()),
        );
        if let Some(size) = call.image_size {
            image_config.insert(
                "imageSize".to_string(),
                Value::String(size.as_str().to_string()),
            );
        }
        let mut generation_config = Map::new();
        generation_config.insert(
            "responseModalities".to_string(),
            json!(["TEXT", "IMAGE"]),
        );
        if let Some(count) = call.sample_count {
            generation_config.insert("candidateCount".to_string(), json!(count));
        }
        generation_config.insert("imageConfig".to_string(), Value::Object(image_config));

        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": call.prompt }],
            }],
            "generationConfig": generation_config,
        })
    }

    pub fn extract_inline_images(response: &Value) -> Vec<InlineImage> {
        let candidates = response
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();

        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                out.push(InlineImage {
                    data: data.to_string(),
                    mime_type: inline
                        .get("mimeType")
                        .or_else(|| inline.get("mime_type"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
        }
        out
    }
}

impl ImageBackend for GeminiImageBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, call: &ImageCall) -> Result<Vec<InlineImage>, BackendError> {
        let endpoint = self.transport.endpoint(&call.model, "generateContent");
        let response =
            self.transport
                .post_json("gemini", &endpoint, call.access_tier, &Self::payload(call))?;
        Ok(Self::extract_inline_images(&response))
    }
}

/// Imagen `:predict`, the Standard-tier fallback.
pub struct ImagenBackend {
    transport: GeminiTransport,
}

impl ImagenBackend {
    pub fn new(transport: GeminiTransport) -> Self {
        Self { transport }
    }

    pub fn payload(call: &ImageCall) -> Value {
        let mut parameters = Map::new();
        parameters.insert(
            "sampleCount".to_string(),
            json!(call.sample_count.unwrap_or(1)),
        );
        parameters.insert(
            "aspectRatio".to_string(),
            Value::String(call.aspect_ratio.clone()),
        );
        if let Some(mime) = call.output_mime_type.as_deref() {
            parameters.insert("outputOptions".to_string(), json!({ "mimeType": mime }));
        }
        json!({
            "instances": [{ "prompt": call.prompt }],
            "parameters": parameters,
        })
    }

    /// Accepts both the REST `predictions[].bytesBase64Encoded` shape and the
    /// SDK-style `generatedImages[].image.imageBytes` shape.
    pub fn extract_predictions(response: &Value) -> Vec<InlineImage> {
        let rows = response
            .get("predictions")
            .or_else(|| response.get("generatedImages"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();
        for row in rows {
            let Some(obj) = row.as_object() else {
                continue;
            };
            let holder = obj
                .get("image")
                .and_then(Value::as_object)
                .unwrap_or(obj);
            let Some(encoded) = holder
                .get("bytesBase64Encoded")
                .or_else(|| holder.get("imageBytes"))
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
            else {
                continue;
            };
            out.push(InlineImage {
                data: encoded.to_string(),
                mime_type: holder
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        out
    }
}

impl ImageBackend for ImagenBackend {
    fn name(&self) -> &str {
        "imagen"
    }

    fn generate(&self, call: &ImageCall) -> Result<Vec<InlineImage>, BackendError> {
        let endpoint = self.transport.endpoint(&call.model, "predict");
        let response =
            self.transport
                .post_json("imagen", &endpoint, call.access_tier, &Self::payload(call))?;
        Ok(Self::extract_predictions(&response))
    }
}
