use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::campaign::AccessTier;

pub const PROVIDER_GEMINI: &str = "gemini";
pub const PROVIDER_IMAGEN: &str = "imagen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Text,
    Image,
    ImageFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub role: ModelRole,
    pub tier: AccessTier,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, role: ModelRole, tier: AccessTier) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            role,
            tier,
        }
    }

    pub fn serves(&self, role: ModelRole, tier: AccessTier) -> bool {
        self.role == role && self.tier == tier
    }
}

/// One model per (role, tier) slot, in insertion order. The same model name
/// may fill several slots.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<(ModelRole, AccessTier), ModelSpec>,
}

impl ModelRegistry {
    /// Builds a registry from `models`; when two entries serve the same
    /// slot the first one is kept.
    pub fn new(models: Option<Vec<ModelSpec>>) -> Self {
        let mut slots = IndexMap::new();
        for model in models.unwrap_or_else(default_models) {
            slots.entry((model.role, model.tier)).or_insert(model);
        }
        Self { models: slots }
    }

    /// First slot filled by `name`.
    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.name == name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn find(&self, role: ModelRole, tier: AccessTier) -> Option<&ModelSpec> {
        self.models.get(&(role, tier))
    }

    /// Puts `name` in the `(role, tier)` slot, keeping the provider of the
    /// entry it replaces. Other slots are untouched even when they use the
    /// same model name.
    pub fn override_model(&mut self, role: ModelRole, tier: AccessTier, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let provider = self
            .find(role, tier)
            .map(|model| model.provider.clone())
            .unwrap_or_else(|| default_provider(role).to_string());
        self.models
            .insert((role, tier), ModelSpec::new(name, &provider, role, tier));
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_provider(role: ModelRole) -> &'static str {
    match role {
        ModelRole::Text | ModelRole::Image => PROVIDER_GEMINI,
        ModelRole::ImageFallback => PROVIDER_IMAGEN,
    }
}

fn default_models() -> Vec<ModelSpec> {
    let mut models = Vec::new();

    let mut insert = |name: &str, provider: &str, role: ModelRole, tier: AccessTier| {
        models.push(ModelSpec::new(name, provider, role, tier));
    };

    insert(
        "gemini-3-pro-preview",
        PROVIDER_GEMINI,
        ModelRole::Text,
        AccessTier::Pro,
    );
    insert(
        "gemini-3-flash-preview",
        PROVIDER_GEMINI,
        ModelRole::Text,
        AccessTier::Standard,
    );
    insert(
        "gemini-3-pro-image-preview",
        PROVIDER_GEMINI,
        ModelRole::Image,
        AccessTier::Pro,
    );
    insert(
        "gemini-2.5-flash-image",
        PROVIDER_GEMINI,
        ModelRole::Image,
        AccessTier::Standard,
    );
    insert(
        "imagen-3.0-generate-001",
        PROVIDER_IMAGEN,
        ModelRole::ImageFallback,
        AccessTier::Standard,
    );

    models
}
