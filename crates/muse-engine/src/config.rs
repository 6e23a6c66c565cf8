use std::env;

use muse_contracts::campaign::AccessTier;
use muse_contracts::models::{ModelRegistry, ModelRole, ModelSelector};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const PAID_API_KEY_ENV: &str = "GEMINI_PAID_API_KEY";

/// Environment variables that override the default model for one role/tier.
const MODEL_OVERRIDE_VARS: [(&str, ModelRole, AccessTier); 5] = [
    ("MUSE_TEXT_MODEL_PRO", ModelRole::Text, AccessTier::Pro),
    ("MUSE_TEXT_MODEL_STANDARD", ModelRole::Text, AccessTier::Standard),
    ("MUSE_IMAGE_MODEL_PRO", ModelRole::Image, AccessTier::Pro),
    ("MUSE_IMAGE_MODEL_STANDARD", ModelRole::Image, AccessTier::Standard),
    (
        "MUSE_IMAGE_MODEL_FALLBACK",
        ModelRole::ImageFallback,
        AccessTier::Standard,
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOverride {
    pub role: ModelRole,
    pub tier: AccessTier,
    pub model: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    /// Key selected for paid access; preferred for Pro calls.
    pub paid_api_key: Option<String>,
    pub api_base: String,
    pub model_overrides: Vec<ModelOverride>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("paid_api_key", &self.paid_api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model_overrides", &self.model_overrides)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            paid_api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model_overrides: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let api_key = non_empty("GEMINI_API_KEY")
            .or_else(|| non_empty("GOOGLE_API_KEY"))
            .or_else(|| non_empty("API_KEY"));
        let api_base = non_empty("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model_overrides = MODEL_OVERRIDE_VARS
            .iter()
            .filter_map(|(var, role, tier)| {
                non_empty(var).map(|model| ModelOverride {
                    role: *role,
                    tier: *tier,
                    model,
                })
            })
            .collect();

        Self {
            api_key,
            paid_api_key: non_empty(PAID_API_KEY_ENV),
            api_base,
            model_overrides,
        }
    }

    pub fn key_for(&self, tier: AccessTier) -> Option<&str> {
        let (first, second) = match tier {
            AccessTier::Pro => (&self.paid_api_key, &self.api_key),
            AccessTier::Standard => (&self.api_key, &self.paid_api_key),
        };
        first.as_deref().or(second.as_deref())
    }

    pub fn model_selector(&self) -> ModelSelector {
        let mut registry = ModelRegistry::default();
        for item in &self.model_overrides {
            registry.override_model(item.role, item.tier, &item.model);
        }
        ModelSelector::new(Some(registry))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]);
        assert_eq!(config, EngineConfig::default());
        assert!(config.key_for(AccessTier::Standard).is_none());
    }

    #[test]
    fn key_precedence_and_base_trimming() {
        let config = config_from(&[
            ("GOOGLE_API_KEY", "google"),
            ("API_KEY", "generic"),
            ("GEMINI_API_BASE", "http://localhost:9000/v1beta/"),
        ]);
        assert_eq!(config.api_key.as_deref(), Some("google"));
        assert_eq!(config.api_base, "http://localhost:9000/v1beta");
    }

    #[test]
    fn pro_prefers_paid_key_and_standard_prefers_free_key() {
        let config = config_from(&[("GEMINI_API_KEY", "free"), ("GEMINI_PAID_API_KEY", "paid")]);
        assert_eq!(config.key_for(AccessTier::Pro), Some("paid"));
        assert_eq!(config.key_for(AccessTier::Standard), Some("free"));

        let paid_only = config_from(&[("GEMINI_PAID_API_KEY", "paid")]);
        assert_eq!(paid_only.key_for(AccessTier::Standard), Some("paid"));
    }

    #[test]
    fn overrides_flow_into_selector() {
        let config = config_from(&[
            ("MUSE_TEXT_MODEL_STANDARD", "gemini-2.5-flash"),
            ("MUSE_IMAGE_MODEL_FALLBACK", "imagen-4.0-generate-001"),
            ("MUSE_IMAGE_MODEL_PRO", "   "),
        ]);
        assert_eq!(config.model_overrides.len(), 2);
        let selector = config.model_selector();
        assert_eq!(
            selector.text_model(AccessTier::Standard).unwrap().name,
            "gemini-2.5-flash"
        );
        let route = selector.image_route(AccessTier::Standard).unwrap();
        assert_eq!(
            route.fallback.map(|model| model.name),
            Some("imagen-4.0-generate-001".to_string())
        );
        assert_eq!(
            selector.image_route(AccessTier::Pro).unwrap().primary.name,
            "gemini-3-pro-image-preview"
        );
    }

    #[test]
    fn one_model_can_serve_both_text_tiers() {
        let config = config_from(&[("MUSE_TEXT_MODEL_STANDARD", "gemini-3-pro-preview")]);
        let selector = config.model_selector();
        assert_eq!(
            selector.text_model(AccessTier::Standard).unwrap().name,
            "gemini-3-pro-preview"
        );
        assert_eq!(
            selector.text_model(AccessTier::Pro).unwrap().name,
            "gemini-3-pro-preview"
        );

        let image = config_from(&[("MUSE_IMAGE_MODEL_PRO", "gemini-2.5-flash-image")]);
        let selector = image.model_selector();
        assert_eq!(
            selector.image_route(AccessTier::Pro).unwrap().primary.name,
            "gemini-2.5-flash-image"
        );
        assert_eq!(
            selector.image_route(AccessTier::Standard).unwrap().primary.name,
            "gemini-2.5-flash-image"
        );
    }

    #[test]
    fn debug_output_redacts_keys() {
        let config = config_from(&[("GEMINI_API_KEY", "secret-value")]);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
