use anyhow::Result;
use muse_contracts::campaign::AccessTier;

use crate::config::PAID_API_KEY_ENV;

/// What the hosting environment can tell us about the caller's key.
pub trait HostCapabilities {
    fn has_selected_paid_key(&self) -> Result<bool>;
    fn open_key_selection(&self) -> Result<()>;
}

/// Pro only when a host is present and confirms a paid key. Probe errors
/// are logged and read as Standard.
pub fn resolve_access_tier(host: Option<&dyn HostCapabilities>) -> AccessTier {
    let Some(host) = host else {
        return AccessTier::Standard;
    };
    match host.has_selected_paid_key() {
        Ok(true) => AccessTier::Pro,
        Ok(false) => AccessTier::Standard,
        Err(err) => {
            tracing::warn!(error = %err, "paid key probe failed, using standard tier");
            AccessTier::Standard
        }
    }
}

/// Asks the host to select a paid key. The tier is optimistically Pro once
/// the selection flow returns, without re-probing.
pub fn request_upgrade(host: Option<&dyn HostCapabilities>) -> AccessTier {
    let Some(host) = host else {
        return AccessTier::Standard;
    };
    match host.open_key_selection() {
        Ok(()) => AccessTier::Pro,
        Err(err) => {
            tracing::warn!(error = %err, "key selection failed");
            AccessTier::Standard
        }
    }
}

/// Host backed by process environment: a non-blank `GEMINI_PAID_API_KEY`
/// counts as a selected paid key.
#[derive(Debug, Clone, Default)]
pub struct EnvHostCapabilities {
    paid_key: Option<String>,
}

impl EnvHostCapabilities {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            paid_key: lookup(PAID_API_KEY_ENV).filter(|value| !value.trim().is_empty()),
        }
    }
}

impl HostCapabilities for EnvHostCapabilities {
    fn has_selected_paid_key(&self) -> Result<bool> {
        Ok(self.paid_key.is_some())
    }

    fn open_key_selection(&self) -> Result<()> {
        if self.paid_key.is_some() {
            return Ok(());
        }
        anyhow::bail!("{PAID_API_KEY_ENV} not set; export a paid key to use the pro tier")
    }
}
