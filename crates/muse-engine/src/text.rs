use muse_contracts::campaign::{
    AccessTier, ContentGenerationResult, Platform, PlatformDraft, Tone,
};
use serde_json::{json, Value};

use crate::error::{BackendError, TextGenerationError};
use crate::transport::GeminiTransport;

#[derive(Debug, Clone, PartialEq)]
pub struct TextCall {
    pub model: String,
    pub access_tier: AccessTier,
    pub system_instruction: String,
    pub contents: String,
    pub response_schema: Value,
}

/// A backend that answers one structured text request with its raw body.
/// `Ok(None)` means the call succeeded but carried no text.
pub trait TextBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, call: &TextCall) -> Result<Option<String>, BackendError>;
}

pub struct GeminiTextBackend {
    transport: GeminiTransport,
}

impl GeminiTextBackend {
    pub fn new(transport: GeminiTransport) -> Self {
        Self { transport }
    }

    pub fn payload(call: &TextCall) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": call.system_instruction }],
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": call.contents }],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": call.response_schema,
            },
        })
    }

    /// Concatenates the text parts of the first candidate.
    pub fn response_text(response: &Value) -> Option<String> {
        let parts = response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)?;
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl TextBackend for GeminiTextBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, call: &TextCall) -> Result<Option<String>, BackendError> {
        let endpoint = self.transport.endpoint(&call.model, "generateContent");
        let response =
            self.transport
                .post_json("gemini", &endpoint, call.access_tier, &Self::payload(call))?;
        Ok(Self::response_text(&response))
    }
}

/// Fixed instructions sent with every campaign. The tone changes the voice,
/// never the per-platform structure.
pub fn system_directive(tone: Tone) -> String {
    format!(
        "You are an expert social media manager.
Your task is to take a user's idea and generate optimized content for LinkedIn, Twitter (X), and Instagram.

- Tone: {tone}
- LinkedIn: Professional, long-form, engaging, structured (use paragraphs).
- Twitter: Short, punchy, under 280 chars, max 2 hashtags.
- Instagram: Visual-focused caption, engaging, include a list of 10-15 relevant hashtags.

ALSO, generate a detailed visual image prompt for each platform that matches the content's vibe.
The image prompt should be descriptive for an AI image generator."
    )
}

/// Response schema constraining the model to the three-platform shape.
pub fn response_schema() -> Value {
    let prompt = json!({
        "type": "STRING",
        "description": "Prompt for generating the accompanying image",
    });
    json!({
        "type": "OBJECT",
        "properties": {
            "linkedin": {
                "type": "OBJECT",
                "properties": {
                    "content": { "type": "STRING", "description": "The post text body" },
                    "imagePrompt": prompt,
                },
                "required": ["content", "imagePrompt"],
            },
            "twitter": {
                "type": "OBJECT",
                "properties": {
                    "content": { "type": "STRING", "description": "The tweet text" },
                    "imagePrompt": prompt,
                },
                "required": ["content", "imagePrompt"],
            },
            "instagram": {
                "type": "OBJECT",
                "properties": {
                    "content": { "type": "STRING", "description": "The caption text" },
                    "hashtags": {
                        "type": "ARRAY",
                        "items": { "type": "STRING" },
                        "description": "List of hashtags",
                    },
                    "imagePrompt": prompt,
                },
                "required": ["content", "imagePrompt", "hashtags"],
            },
        },
        "required": ["linkedin", "twitter", "instagram"],
    })
}

/// Parses and validates the raw text body.
///
/// A missing `imagePrompt` is accepted here as an empty prompt; the image
/// request for that one platform fails later instead of the whole campaign.
pub fn parse_generation_result(
    raw: Option<&str>,
) -> Result<ContentGenerationResult, TextGenerationError> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(TextGenerationError::Empty)?;
    let parsed: WireResult = serde_json::from_str(raw).map_err(TextGenerationError::Malformed)?;
    let result = ContentGenerationResult {
        linkedin: parsed.linkedin.into_draft(),
        twitter: parsed.twitter.into_draft(),
        instagram: parsed.instagram.into_draft(),
    };

    for platform in Platform::ALL {
        if result.draft(platform).content.trim().is_empty() {
            return Err(TextGenerationError::Incomplete(format!(
                "{}.content",
                wire_key(platform)
            )));
        }
    }
    let has_hashtags = result
        .instagram
        .hashtags
        .as_ref()
        .map(|tags| tags.iter().any(|tag| !tag.trim().is_empty()))
        .unwrap_or(false);
    if !has_hashtags {
        return Err(TextGenerationError::Incomplete(
            "instagram.hashtags".to_string(),
        ));
    }
    Ok(result)
}

fn wire_key(platform: Platform) -> &'static str {
    match platform {
        Platform::LinkedIn => "linkedin",
        Platform::Twitter => "twitter",
        Platform::Instagram => "instagram",
    }
}

#[derive(serde::Deserialize)]
struct WireResult {
    linkedin: WireDraft,
    twitter: WireDraft,
    instagram: WireDraft,
}

#[derive(serde::Deserialize)]
struct WireDraft {
    content: String,
    #[serde(rename = "imagePrompt", default)]
    image_prompt: String,
    #[serde(default)]
    hashtags: Option<Vec<String>>,
}

impl WireDraft {
    fn into_draft(self) -> PlatformDraft {
        PlatformDraft {
            content: self.content,
            image_prompt: self.image_prompt,
            hashtags: self.hashtags,
        }
    }
}
