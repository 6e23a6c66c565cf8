use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TWITTER_MAX_CHARS: usize = 280;
pub const TWITTER_MAX_HASHTAGS: usize = 2;
pub const INSTAGRAM_HASHTAG_RANGE: (usize, usize) = (10, 15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    LinkedIn,
    Twitter,
    Instagram,
}

impl Platform {
    /// Campaign order. Posts are always kept in this order.
    pub const ALL: [Platform; 3] = [Platform::LinkedIn, Platform::Twitter, Platform::Instagram];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::LinkedIn => "LinkedIn",
            Platform::Twitter => "Twitter",
            Platform::Instagram => "Instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            _ => Err(format!("unknown platform '{raw}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tone {
    #[default]
    Professional,
    Witty,
    Urgent,
    Friendly,
    Visionary,
}

impl Tone {
    pub const ALL: [Tone; 5] = [
        Tone::Professional,
        Tone::Witty,
        Tone::Urgent,
        Tone::Friendly,
        Tone::Visionary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Professional => "Professional",
            Tone::Witty => "Witty",
            Tone::Urgent => "Urgent",
            Tone::Friendly => "Friendly",
            Tone::Visionary => "Visionary",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Tone::ALL
            .into_iter()
            .find(|tone| tone.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown tone '{raw}'"))
    }
}

/// Access level. Passed explicitly into every orchestrator and gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessTier {
    #[default]
    Standard,
    Pro,
}

impl AccessTier {
    pub fn is_pro(self) -> bool {
        self == AccessTier::Pro
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessTier::Standard => "standard",
            AccessTier::Pro => "pro",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessTier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" | "free" => Ok(AccessTier::Standard),
            "pro" | "paid" => Ok(AccessTier::Pro),
            _ => Err(format!("unknown access tier '{raw}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "21:9")]
    Ultrawide21x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Square,
        AspectRatio::Portrait2x3,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
        AspectRatio::Ultrawide21x9,
    ];

    /// Fixed ratio a fresh Post gets for its platform.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::LinkedIn | Platform::Twitter => AspectRatio::Landscape16x9,
            Platform::Instagram => AspectRatio::Portrait3x4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Ultrawide21x9 => "21:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim().replace('/', ":");
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == value)
            .ok_or_else(|| format!("unsupported aspect ratio '{raw}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageResolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageResolution::OneK => "1K",
            ImageResolution::TwoK => "2K",
            ImageResolution::FourK => "4K",
        }
    }
}

impl fmt::Display for ImageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageResolution {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(ImageResolution::OneK),
            "2K" => Ok(ImageResolution::TwoK),
            "4K" => Ok(ImageResolution::FourK),
            _ => Err(format!("unsupported resolution '{raw}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(Uuid);

impl CampaignId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CampaignId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub idea: String,
    pub tone: Tone,
    pub access_tier: AccessTier,
}

impl GenerationRequest {
    pub fn new(idea: impl Into<String>, tone: Tone, access_tier: AccessTier) -> Self {
        Self {
            idea: idea.into(),
            tone,
            access_tier,
        }
    }

    /// Caller-side gate: the orchestrator does not re-check this.
    pub fn has_usable_idea(&self) -> bool {
        !self.idea.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDraft {
    pub content: String,
    #[serde(rename = "imagePrompt")]
    pub image_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
}

/// Wire shape of the structured text response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGenerationResult {
    pub linkedin: PlatformDraft,
    pub twitter: PlatformDraft,
    pub instagram: PlatformDraft,
}

impl ContentGenerationResult {
    pub fn draft(&self, platform: Platform) -> &PlatformDraft {
        match platform {
            Platform::LinkedIn => &self.linkedin,
            Platform::Twitter => &self.twitter,
            Platform::Instagram => &self.instagram,
        }
    }

    pub fn into_drafts(self) -> [(Platform, PlatformDraft); 3] {
        [
            (Platform::LinkedIn, self.linkedin),
            (Platform::Twitter, self.twitter),
            (Platform::Instagram, self.instagram),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageState {
    #[default]
    Pending,
    Ready,
    Failed,
}

/// Decoded image, ready to display or write to disk.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub platform: Platform,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
    pub image_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub image_state: ImageState,
    #[serde(skip)]
    pub image: Option<GeneratedImage>,
    /// Generation attempt the current `image_state` belongs to.
    #[serde(default)]
    pub attempt: u32,
}

impl Post {
    pub fn from_draft(platform: Platform, draft: PlatformDraft) -> Self {
        Self {
            platform,
            content: draft.content,
            hashtags: draft.hashtags,
            image_prompt: draft.image_prompt,
            aspect_ratio: AspectRatio::for_platform(platform),
            image_state: ImageState::Pending,
            image: None,
            attempt: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.image_state == ImageState::Pending
    }

    pub fn request_params(
        &self,
        resolution: ImageResolution,
        access_tier: AccessTier,
    ) -> ImageRequestParams {
        ImageRequestParams {
            prompt: self.image_prompt.clone(),
            aspect_ratio: self.aspect_ratio,
            resolution,
            access_tier,
        }
    }
}

/// Parameters for one gateway call. `resolution` only matters under Pro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequestParams {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: ImageResolution,
    pub access_tier: AccessTier,
}

/// Counts whitespace-separated `#tag` tokens.
pub fn hashtag_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.starts_with('#') && token.len() > 1)
        .count()
}

/// Soft checks of the per-platform structural constraints. The text model is
/// asked to honor them; violations are reported, not rejected.
pub fn draft_warnings(result: &ContentGenerationResult) -> Vec<String> {
    let mut warnings = Vec::new();
    let tweet = &result.twitter.content;
    let chars = tweet.chars().count();
    if chars > TWITTER_MAX_CHARS {
        warnings.push(format!(
            "Twitter content is {chars} characters (limit {TWITTER_MAX_CHARS})."
        ));
    }
    let tags = hashtag_count(tweet);
    if tags > TWITTER_MAX_HASHTAGS {
        warnings.push(format!(
            "Twitter content has {tags} hashtags (limit {TWITTER_MAX_HASHTAGS})."
        ));
    }
    let (min, max) = INSTAGRAM_HASHTAG_RANGE;
    let count = result
        .instagram
        .hashtags
        .as_ref()
        .map(Vec::len)
        .unwrap_or(0);
    if count < min || count > max {
        warnings.push(format!(
            "Instagram has {count} hashtags (expected {min}-{max})."
        ));
    }
    warnings
}
