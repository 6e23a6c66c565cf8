use super::registry::{ModelRegistry, ModelRole, ModelSpec};
use crate::campaign::AccessTier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionError {
    pub role: ModelRole,
    pub tier: AccessTier,
}

impl std::fmt::Display for SelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "No model registered for role '{:?}' at tier '{}'.",
            self.role, self.tier
        )
    }
}

impl std::error::Error for SelectionError {}

/// Image models to try for one tier, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRoute {
    pub primary: ModelSpec,
    pub fallback: Option<ModelSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    pub fn text_model(&self, tier: AccessTier) -> Result<ModelSpec, SelectionError> {
        self.require(ModelRole::Text, tier)
    }

    /// Pro never falls back; Standard may carry one fallback model.
    pub fn image_route(&self, tier: AccessTier) -> Result<ImageRoute, SelectionError> {
        let primary = self.require(ModelRole::Image, tier)?;
        let fallback = match tier {
            AccessTier::Pro => None,
            AccessTier::Standard => self
                .registry
                .find(ModelRole::ImageFallback, AccessTier::Standard)
                .cloned(),
        };
        Ok(ImageRoute { primary, fallback })
    }

    fn require(&self, role: ModelRole, tier: AccessTier) -> Result<ModelSpec, SelectionError> {
        self.registry
            .find(role, tier)
            .cloned()
            .ok_or(SelectionError { role, tier })
    }
}
