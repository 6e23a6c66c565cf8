use std::sync::Arc;
use std::thread::{self, JoinHandle};

use muse_contracts::campaign::{
    draft_warnings, AccessTier, CampaignId, GenerationRequest, ImageRequestParams, ImageResolution,
    Platform, Post,
};
use muse_contracts::events::{payload, EventLog};
use muse_contracts::models::ModelSelector;
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::{BackendError, ImageError, OrchestratorError, TextGenerationError};
use crate::gateway::{is_access_denial, ImageGateway};
use crate::image::default_backend_registry;
use crate::session::{AttemptKey, Campaign, CampaignSession, ImageEdits, PatchOutcome};
use crate::text::{
    parse_generation_result, response_schema, system_directive, GeminiTextBackend, TextBackend,
    TextCall,
};
use crate::transport::GeminiTransport;

/// Drives one session: text first, then one independent image request per
/// post.
#[derive(Clone)]
pub struct ContentOrchestrator {
    text: Arc<dyn TextBackend>,
    gateway: Arc<ImageGateway>,
    selector: ModelSelector,
    session: CampaignSession,
    events: EventLog,
}

/// Workers started by [`ContentOrchestrator::dispatch_image_requests`].
/// Dropping the handle detaches them; their results still land in the
/// session.
#[derive(Debug)]
pub struct DispatchHandle {
    campaign_id: CampaignId,
    workers: Vec<(Platform, JoinHandle<()>)>,
}

impl DispatchHandle {
    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.workers.iter().map(|(platform, _)| *platform).collect()
    }

    /// Blocks until every worker has patched its post.
    pub fn wait(self) {
        for (platform, worker) in self.workers {
            if worker.join().is_err() {
                tracing::error!(platform = %platform, "image worker panicked");
            }
        }
    }
}

impl ContentOrchestrator {
    pub fn new(
        text: Arc<dyn TextBackend>,
        gateway: Arc<ImageGateway>,
        selector: ModelSelector,
        session: CampaignSession,
    ) -> Self {
        Self {
            text,
            gateway,
            selector,
            session,
            events: EventLog::disabled(),
        }
    }

    /// Wires the Gemini text backend and the Gemini/Imagen image backends.
    pub fn from_config(config: &EngineConfig) -> Result<Self, BackendError> {
        let transport = GeminiTransport::new(config)?;
        let selector = config.model_selector();
        let gateway = ImageGateway::new(selector.clone(), default_backend_registry(&transport));
        Ok(Self::new(
            Arc::new(GeminiTextBackend::new(transport)),
            Arc::new(gateway),
            selector,
            CampaignSession::new(),
        ))
    }

    /// Shares `events` with the gateway so fallback hops land in the same log.
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.gateway = Arc::new(self.gateway.as_ref().clone().with_events(events.clone()));
        self.events = events;
        self
    }

    pub fn with_session(mut self, session: CampaignSession) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &CampaignSession {
        &self.session
    }

    pub fn gateway(&self) -> &ImageGateway {
        &self.gateway
    }

    /// One structured text call for all three platforms. On success the new
    /// campaign replaces the session's current one with every post pending;
    /// on failure the session is left untouched.
    pub fn generate_campaign(
        &self,
        request: &GenerationRequest,
    ) -> Result<Campaign, OrchestratorError> {
        let campaign_id = CampaignId::new();
        let model = self.selector.text_model(request.access_tier)?;
        self.emit(
            "campaign_started",
            Some(campaign_id),
            json!({
                "tone": request.tone,
                "tier": request.access_tier,
                "text_model": model.name,
            }),
        );

        let call = TextCall {
            model: model.name.clone(),
            access_tier: request.access_tier,
            system_instruction: system_directive(request.tone),
            contents: request.idea.clone(),
            response_schema: response_schema(),
        };
        let result = self
            .text
            .generate(&call)
            .map_err(TextGenerationError::from)
            .and_then(|raw| parse_generation_result(raw.as_deref()));
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(campaign_id = %campaign_id, model = %model.name, error = %err, "text generation failed");
                self.emit(
                    "text_failed",
                    Some(campaign_id),
                    json!({ "error": err.to_string() }),
                );
                return Err(err.into());
            }
        };

        let warnings = draft_warnings(&result);
        for warning in &warnings {
            tracing::warn!(campaign_id = %campaign_id, "{warning}");
        }
        let campaign = Campaign::new(
            campaign_id,
            result
                .into_drafts()
                .into_iter()
                .map(|(platform, draft)| Post::from_draft(platform, draft)),
        );
        self.session.replace(campaign.clone());
        tracing::info!(campaign_id = %campaign_id, model = %model.name, "campaign text ready");
        self.emit(
            "text_generated",
            Some(campaign_id),
            json!({ "platforms": Platform::ALL, "warnings": warnings }),
        );
        Ok(campaign)
    }

    /// Starts one worker thread per post. Each worker patches only its own
    /// post; a failed image marks that post failed and nothing else.
    pub fn dispatch_image_requests(
        &self,
        campaign: &Campaign,
        resolution: ImageResolution,
        tier: AccessTier,
    ) -> DispatchHandle {
        let mut workers = Vec::new();
        for post in campaign.posts() {
            let Some(key) = self.session.pending_key(campaign.id, post.platform) else {
                tracing::debug!(platform = %post.platform, "post not pending, skipping dispatch");
                continue;
            };
            let params = post.request_params(resolution, tier);
            let worker = self.clone();
            let spawned = thread::Builder::new()
                .name(format!("muse-image-{}", post.platform.as_str().to_ascii_lowercase()))
                .spawn(move || {
                    let (_, outcome) = worker.run_attempt(key, &params);
                    if outcome == PatchOutcome::Stale {
                        tracing::debug!(
                            platform = %key.platform,
                            attempt = key.attempt,
                            "image result arrived after its post moved on"
                        );
                    }
                });
            match spawned {
                Ok(handle) => workers.push((post.platform, handle)),
                Err(err) => {
                    tracing::error!(platform = %post.platform, error = %err, "failed to start image worker");
                    self.session.complete(key, None);
                }
            }
        }
        DispatchHandle {
            campaign_id: campaign.id,
            workers,
        }
    }

    /// Regenerates one post's image with caller edits, on the calling
    /// thread. Sibling posts and their in-flight requests are unaffected.
    pub fn regenerate_image(
        &self,
        campaign_id: CampaignId,
        platform: Platform,
        edits: &ImageEdits,
        resolution: ImageResolution,
        tier: AccessTier,
    ) -> Result<Post, OrchestratorError> {
        let (key, post) = self
            .session
            .begin_attempt(campaign_id, platform, edits)
            .ok_or(OrchestratorError::UnknownPost {
                campaign_id,
                platform,
            })?;
        self.emit(
            "image_regenerate",
            Some(campaign_id),
            json!({
                "platform": platform,
                "attempt": key.attempt,
                "aspect_ratio": post.aspect_ratio,
            }),
        );
        match self.run_attempt(key, &post.request_params(resolution, tier)) {
            (Ok(()), PatchOutcome::Applied(post)) => Ok(post),
            (Err(err), PatchOutcome::Applied(_)) => Err(err.into()),
            (_, PatchOutcome::Stale) => Err(OrchestratorError::Superseded { platform }),
        }
    }

    fn run_attempt(
        &self,
        key: AttemptKey,
        params: &ImageRequestParams,
    ) -> (Result<(), ImageError>, PatchOutcome) {
        match self.gateway.generate_image(params) {
            Ok(image) => {
                let bytes = image.bytes.len();
                let outcome = self.session.complete(key, Some(image));
                self.emit_image_outcome(key, &outcome, json!({ "status": "ready", "bytes": bytes }));
                (Ok(()), outcome)
            }
            Err(err) => {
                tracing::error!(platform = %key.platform, campaign_id = %key.campaign_id, error = %err, "error generating image");
                let outcome = self.session.complete(key, None);
                self.emit_image_outcome(
                    key,
                    &outcome,
                    json!({
                        "status": "failed",
                        "error": err.to_string(),
                        "access_denied": is_access_denial(&err),
                    }),
                );
                (Err(err), outcome)
            }
        }
    }

    fn emit_image_outcome(&self, key: AttemptKey, outcome: &PatchOutcome, detail: serde_json::Value) {
        let mut event = payload(detail);
        event.insert("platform".to_string(), json!(key.platform));
        event.insert("attempt".to_string(), json!(key.attempt));
        let event_type = match outcome {
            PatchOutcome::Applied(_) => "image_resolved",
            PatchOutcome::Stale => "image_stale",
        };
        if let Err(err) = self.events.emit(event_type, Some(key.campaign_id), event) {
            tracing::warn!(error = %err, "failed to write event");
        }
    }

    fn emit(&self, event_type: &str, campaign_id: Option<CampaignId>, detail: serde_json::Value) {
        if let Err(err) = self.events.emit(event_type, campaign_id, payload(detail)) {
            tracing::warn!(error = %err, "failed to write event");
        }
    }
}
