use muse_contracts::campaign::{CampaignId, Platform};
use muse_contracts::models::SelectionError;

/// Google API `error.status` values that mean "this key may not use this model".
const DENIAL_API_STATUSES: [&str; 2] = ["PERMISSION_DENIED", "NOT_FOUND"];
const DENIAL_HTTP_STATUSES: [u16; 2] = [403, 404];

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{backend} request failed ({status}): {message}")]
    Status {
        backend: String,
        status: u16,
        /// Structured `error.status` from the response body, when present.
        api_status: Option<String>,
        message: String,
    },

    #[error("{backend} request failed: {source}")]
    Transport {
        backend: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend} returned invalid JSON payload: {source}")]
    InvalidJson {
        backend: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("GEMINI_API_KEY, GOOGLE_API_KEY or API_KEY not set")]
    MissingApiKey,
}

/// Why a backend call counts as an access denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    /// Structured API status (`PERMISSION_DENIED` / `NOT_FOUND`).
    ApiStatus,
    /// HTTP 403 or 404 without a recognised API status.
    HttpStatus,
    /// The API message mentions "permission".
    Message,
}

impl BackendError {
    pub fn status(
        backend: &str,
        status: u16,
        api_status: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        BackendError::Status {
            backend: backend.to_string(),
            status,
            api_status: api_status.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            BackendError::Transport { source, .. } => source.status().map(|code| code.as_u16()),
            _ => None,
        }
    }

    /// Classifies permission / availability failures. The structured API
    /// status is consulted first; the message heuristic only runs when
    /// neither status source matched.
    pub fn access_denial(&self) -> Option<AccessDenial> {
        if let BackendError::Status {
            api_status: Some(api_status),
            ..
        } = self
        {
            if DENIAL_API_STATUSES.contains(&api_status.as_str()) {
                return Some(AccessDenial::ApiStatus);
            }
        }
        if let Some(code) = self.http_status() {
            if DENIAL_HTTP_STATUSES.contains(&code) {
                return Some(AccessDenial::HttpStatus);
            }
        }
        match self {
            BackendError::Status { message, .. } if message.contains("permission") => {
                Some(AccessDenial::Message)
            }
            _ => None,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        self.access_denial().is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextGenerationError {
    #[error("no text returned from the text model")]
    Empty,

    #[error("text model returned malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("text model response is missing {0}")]
    Incomplete(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("no image data found in {model} response")]
    NoImageData { model: String },

    #[error("no image returned from {model} fallback")]
    FallbackEmpty { model: String },

    #[error("{model} image payload could not be decoded: {source}")]
    Decode {
        model: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("image prompt is empty")]
    EmptyPrompt,

    #[error("no image backend registered for provider '{0}'")]
    MissingBackend(String),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ImageError {
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            ImageError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("failed to generate content: {0}")]
    Text(#[from] TextGenerationError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("campaign {campaign_id} has no {platform} post")]
    UnknownPost {
        campaign_id: CampaignId,
        platform: Platform,
    },

    #[error("{platform} image attempt was superseded before it finished")]
    Superseded { platform: Platform },
}
