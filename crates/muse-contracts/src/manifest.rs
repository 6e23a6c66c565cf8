use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::{AccessTier, CampaignId, ImageResolution, Platform, Post, Tone};

pub const MANIFEST_FILE_NAME: &str = "campaign.json";

/// On-disk record of one campaign: the posts plus where their images live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignManifest {
    pub campaign_id: CampaignId,
    pub idea: String,
    pub tone: Tone,
    pub access_tier: AccessTier,
    pub resolution: ImageResolution,
    pub created_at: String,
    pub updated_at: String,
    pub posts: Vec<ManifestPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPost {
    #[serde(flatten)]
    pub post: Post,
    #[serde(default)]
    pub image_file: Option<String>,
    #[serde(default)]
    pub image_mime: Option<String>,
}

impl CampaignManifest {
    pub fn new(
        campaign_id: CampaignId,
        idea: &str,
        tone: Tone,
        access_tier: AccessTier,
        resolution: ImageResolution,
    ) -> Self {
        let now = now_utc_iso();
        Self {
            campaign_id,
            idea: idea.to_string(),
            tone,
            access_tier,
            resolution,
            created_at: now.clone(),
            updated_at: now,
            posts: Vec::new(),
        }
    }

    pub fn post(&self, platform: Platform) -> Option<&ManifestPost> {
        self.posts.iter().find(|entry| entry.post.platform == platform)
    }

    /// Inserts or replaces the entry for `entry.post.platform`, keeping the
    /// position of an existing entry.
    pub fn upsert(&mut self, entry: ManifestPost) {
        match self
            .posts
            .iter_mut()
            .find(|existing| existing.post.platform == entry.post.platform)
        {
            Some(existing) => *existing = entry,
            None => self.posts.push(entry),
        }
        self.updated_at = now_utc_iso();
    }
}

pub fn write_manifest(path: &Path, manifest: &CampaignManifest) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(manifest)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_manifest(path: &Path) -> anyhow::Result<CampaignManifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid manifest {}", path.display()))
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
