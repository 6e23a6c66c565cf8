use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use muse_contracts::campaign::{AccessTier, GeneratedImage, ImageRequestParams};
use muse_contracts::events::{payload, EventLog};
use muse_contracts::models::{ModelSelector, ModelSpec};
use serde_json::json;

use crate::error::{BackendError, ImageError};
use crate::image::{ImageBackend, ImageBackendRegistry, ImageCall, InlineImage};

pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";

/// Picks the image model for a tier, calls it, decodes the payload and runs
/// the single fallback hop. Holds no per-call state.
#[derive(Clone)]
pub struct ImageGateway {
    selector: ModelSelector,
    backends: ImageBackendRegistry,
    events: EventLog,
}

impl ImageGateway {
    pub fn new(selector: ModelSelector, backends: ImageBackendRegistry) -> Self {
        Self {
            selector,
            backends,
            events: EventLog::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn generate_image(&self, params: &ImageRequestParams) -> Result<GeneratedImage, ImageError> {
        if params.prompt.trim().is_empty() {
            return Err(ImageError::EmptyPrompt);
        }
        match params.access_tier {
            AccessTier::Pro => self.pro_path(params),
            AccessTier::Standard => self.standard_path(params),
        }
    }

    fn pro_path(&self, params: &ImageRequestParams) -> Result<GeneratedImage, ImageError> {
        let route = self.selector.image_route(AccessTier::Pro)?;
        let call = ImageCall {
            model: route.primary.name.clone(),
            access_tier: AccessTier::Pro,
            prompt: params.prompt.clone(),
            aspect_ratio: params.aspect_ratio.as_str().to_string(),
            image_size: Some(params.resolution),
            sample_count: None,
            output_mime_type: None,
        };
        let images = self
            .backend_for(&route.primary)?
            .generate(&call)
            .inspect_err(|err| {
                tracing::error!(model = %route.primary.name, error = %err, "pro image generation failed");
            })?;
        first_image(&route.primary, images, PNG_MIME)
    }

    fn standard_path(&self, params: &ImageRequestParams) -> Result<GeneratedImage, ImageError> {
        let route = self.selector.image_route(AccessTier::Standard)?;
        // Resolution is not forwarded on this tier.
        let call = ImageCall {
            model: route.primary.name.clone(),
            access_tier: AccessTier::Standard,
            prompt: params.prompt.clone(),
            aspect_ratio: params.aspect_ratio.as_str().to_string(),
            image_size: None,
            sample_count: None,
            output_mime_type: None,
        };
        let primary_err = match self.backend_for(&route.primary)?.generate(&call) {
            Ok(images) => return first_image(&route.primary, images, PNG_MIME),
            Err(err) => err,
        };

        let (Some(denial), Some(fallback)) = (primary_err.access_denial(), route.fallback) else {
            tracing::error!(model = %route.primary.name, error = %primary_err, "image generation failed");
            return Err(primary_err.into());
        };

        tracing::warn!(
            model = %route.primary.name,
            fallback = %fallback.name,
            reason = ?denial,
            "image model unavailable, falling back"
        );
        let outcome = self.fallback_path(&fallback, params);
        let event = json!({
            "from_model": route.primary.name,
            "to_model": fallback.name,
            "reason": format!("{denial:?}"),
            "ok": outcome.is_ok(),
        });
        if let Err(err) = self.events.emit("image_fallback", None, payload(event)) {
            tracing::warn!(error = %err, "failed to write event");
        }
        match outcome {
            Ok(image) => Ok(image),
            Err(fallback_err) => {
                tracing::error!(
                    model = %fallback.name,
                    error = %fallback_err,
                    "fallback image generation failed"
                );
                Err(ImageError::Backend(primary_err))
            }
        }
    }

    fn fallback_path(
        &self,
        fallback: &ModelSpec,
        params: &ImageRequestParams,
    ) -> Result<GeneratedImage, ImageError> {
        let call = ImageCall {
            model: fallback.name.clone(),
            access_tier: AccessTier::Standard,
            prompt: params.prompt.clone(),
            aspect_ratio: params.aspect_ratio.as_str().to_string(),
            image_size: None,
            sample_count: Some(1),
            output_mime_type: Some(JPEG_MIME.to_string()),
        };
        let images = self.backend_for(fallback)?.generate(&call)?;
        let Some(first) = images.into_iter().next() else {
            return Err(ImageError::FallbackEmpty {
                model: fallback.name.clone(),
            });
        };
        decode(fallback, &first, JPEG_MIME)
    }

    fn backend_for(&self, model: &ModelSpec) -> Result<&dyn ImageBackend, ImageError> {
        self.backends
            .get(&model.provider)
            .ok_or_else(|| ImageError::MissingBackend(model.provider.clone()))
    }
}

fn first_image(
    model: &ModelSpec,
    images: Vec<InlineImage>,
    mime_type: &str,
) -> Result<GeneratedImage, ImageError> {
    let Some(first) = images.into_iter().next() else {
        return Err(ImageError::NoImageData {
            model: model.name.clone(),
        });
    };
    decode(model, &first, mime_type)
}

fn decode(model: &ModelSpec, image: &InlineImage, mime_type: &str) -> Result<GeneratedImage, ImageError> {
    let bytes = BASE64
        .decode(image.data.trim().as_bytes())
        .map_err(|source| ImageError::Decode {
            model: model.name.clone(),
            source,
        })?;
    Ok(GeneratedImage::new(mime_type, bytes))
}

/// True when `err` came from a backend and was an access denial.
pub fn is_access_denial(err: &ImageError) -> bool {
    err.backend_error()
        .map(BackendError::is_access_denied)
        .unwrap_or(false)
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use muse_contracts::campaign::{AspectRatio, ImageResolution};

    use super::testing::{inline, ScriptedBackend};
    use super::*;

    struct Fixture {
        gemini: Arc<ScriptedBackend>,
        imagen: Arc<ScriptedBackend>,
        gateway: ImageGateway,
    }

    fn fixture() -> Fixture {
        let gemini = Arc::new(ScriptedBackend::new("gemini"));
        let imagen = Arc::new(ScriptedBackend::new("imagen"));
        let mut backends = ImageBackendRegistry::new();
        backends.register_shared(gemini.clone());
        backends.register_shared(imagen.clone());
        Fixture {
            gemini,
            imagen,
            gateway: ImageGateway::new(ModelSelector::new(None), backends),
        }
    }

    fn params(tier: AccessTier, resolution: ImageResolution) -> ImageRequestParams {
        ImageRequestParams {
            prompt: "city skyline at night".to_string(),
            aspect_ratio: AspectRatio::Landscape16x9,
            resolution,
            access_tier: tier,
        }
    }

    fn denied() -> BackendError {
        BackendError::status("gemini", 403, Some("PERMISSION_DENIED"), "model not allowed")
    }

    #[test]
    fn pro_forwards_resolution_and_never_touches_standard_model() {
        let fx = fixture();
        fx.gemini.push(Ok(vec![inline("AQID")]));

        let image = fx
            .gateway
            .generate_image(&params(AccessTier::Pro, ImageResolution::FourK))
            .unwrap();
        assert_eq!(image.mime_type, PNG_MIME);
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.data_uri(), "data:image/png;base64,AQID");

        let calls = fx.gemini.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gemini-3-pro-image-preview");
        assert_eq!(calls[0].image_size, Some(ImageResolution::FourK));
        assert_eq!(calls[0].aspect_ratio, "16:9");
        assert!(fx.imagen.calls().is_empty());
    }

    #[test]
    fn pro_without_image_data_fails_without_fallback() {
        let fx = fixture();
        let err = fx
            .gateway
            .generate_image(&params(AccessTier::Pro, ImageResolution::OneK))
            .unwrap_err();
        assert!(matches!(err, ImageError::NoImageData { ref model } if model == "gemini-3-pro-image-preview"));
        assert!(fx.imagen.calls().is_empty());
    }

    #[test]
    fn pro_denial_is_not_retried() {
        let fx = fixture();
        fx.gemini.push(Err(denied()));
        let err = fx
            .gateway
            .generate_image(&params(AccessTier::Pro, ImageResolution::TwoK))
            .unwrap_err();
        assert!(is_access_denial(&err));
        assert!(fx.imagen.calls().is_empty());
        assert_eq!(fx.gemini.calls().len(), 1);
    }

    #[test]
    fn standard_ignores_resolution() {
        let fx = fixture();
        fx.gemini.push(Ok(vec![inline("AQID")]));
        fx.gemini.push(Ok(vec![inline("AQID")]));

        fx.gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap();
        fx.gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::FourK))
            .unwrap();

        let calls = fx.gemini.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[0].model, "gemini-2.5-flash-image");
        assert_eq!(calls[0].image_size, None);
    }

    #[test]
    fn standard_denial_falls_back_once_to_jpeg() {
        let fx = fixture();
        fx.gemini.push(Err(denied()));
        fx.imagen.push(Ok(vec![inline("/9j/")]));

        let image = fx
            .gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::FourK))
            .unwrap();
        assert_eq!(image.mime_type, JPEG_MIME);
        assert!(image.data_uri().starts_with("data:image/jpeg;base64,"));

        let fallback_calls = fx.imagen.calls();
        assert_eq!(fallback_calls.len(), 1);
        assert_eq!(fallback_calls[0].model, "imagen-3.0-generate-001");
        assert_eq!(fallback_calls[0].sample_count, Some(1));
        assert_eq!(fallback_calls[0].output_mime_type.as_deref(), Some(JPEG_MIME));
        assert_eq!(fallback_calls[0].aspect_ratio, "16:9");
        assert_eq!(fallback_calls[0].image_size, None);
    }

    #[test]
    fn fallback_hop_is_recorded_in_event_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let fx = fixture();
        let gateway = fx.gateway.clone().with_events(EventLog::to_path(&path));
        fx.gemini.push(Err(denied()));
        fx.imagen.push(Ok(vec![inline("/9j/")]));

        gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let row: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(row["type"], "image_fallback");
        assert_eq!(row["from_model"], "gemini-2.5-flash-image");
        assert_eq!(row["to_model"], "imagen-3.0-generate-001");
        assert_eq!(row["reason"], "ApiStatus");
        assert_eq!(row["ok"], true);
    }

    #[test]
    fn failed_fallback_surfaces_original_error() {
        let fx = fixture();
        fx.gemini.push(Err(denied()));
        fx.imagen.push(Err(BackendError::status(
            "imagen",
            500,
            Some("INTERNAL"),
            "imagen exploded",
        )));

        let err = fx
            .gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap_err();
        match err.backend_error() {
            Some(BackendError::Status { status, message, .. }) => {
                assert_eq!(*status, 403);
                assert_eq!(message, "model not allowed");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fx.imagen.calls().len(), 1);
    }

    #[test]
    fn empty_fallback_surfaces_original_error() {
        let fx = fixture();
        fx.gemini
            .push(Err(BackendError::status("gemini", 404, None, "no such model")));
        fx.imagen.push(Ok(Vec::new()));

        let err = fx
            .gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap_err();
        assert_eq!(err.backend_error().and_then(BackendError::http_status), Some(404));
    }

    #[test]
    fn non_denial_errors_do_not_fall_back() {
        let fx = fixture();
        fx.gemini.push(Err(BackendError::status(
            "gemini",
            500,
            Some("INTERNAL"),
            "overloaded",
        )));
        let err = fx
            .gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap_err();
        assert_eq!(err.backend_error().and_then(BackendError::http_status), Some(500));
        assert!(fx.imagen.calls().is_empty());
    }

    #[test]
    fn standard_missing_image_data_does_not_fall_back() {
        let fx = fixture();
        fx.gemini.push(Ok(Vec::new()));
        let err = fx
            .gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap_err();
        assert!(matches!(err, ImageError::NoImageData { .. }));
        assert!(fx.imagen.calls().is_empty());
    }

    #[test]
    fn undecodable_payload_is_an_image_error() {
        let fx = fixture();
        fx.gemini.push(Ok(vec![inline("***not base64***")]));
        let err = fx
            .gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap_err();
        assert!(matches!(err, ImageError::Decode { .. }));
        assert!(fx.imagen.calls().is_empty());
    }

    #[test]
    fn blank_prompt_fails_before_any_backend_call() {
        let fx = fixture();
        let mut request = params(AccessTier::Pro, ImageResolution::OneK);
        request.prompt = "   ".to_string();
        let err = fx.gateway.generate_image(&request).unwrap_err();
        assert!(matches!(err, ImageError::EmptyPrompt));
        assert!(fx.gemini.calls().is_empty());
    }

    #[test]
    fn missing_backend_is_reported() {
        let gateway = ImageGateway::new(ModelSelector::new(None), ImageBackendRegistry::new());
        let err = gateway
            .generate_image(&params(AccessTier::Standard, ImageResolution::OneK))
            .unwrap_err();
        assert!(matches!(err, ImageError::MissingBackend(ref name) if name == "gemini"));
    }
}
