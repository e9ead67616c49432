//! Process-wide dispatch context
//!
//! Built once at startup and shared read-only by every dispatch task.

use crate::config::DispatchConfig;
use crate::error::Result;
use crate::registry::PeerRegistry;
use epistula_signature::SigningIdentity;
use std::sync::Arc;

/// Identity, registry and settings used by the coordinator.
#[derive(Clone)]
pub struct DispatchContext {
    identity: Arc<SigningIdentity>,
    registry: Arc<dyn PeerRegistry>,
    config: DispatchConfig,
}

impl DispatchContext {
    /// Create a context, validating `config`.
    pub fn new(
        identity: Arc<SigningIdentity>,
        registry: Arc<dyn PeerRegistry>,
        config: DispatchConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            identity,
            registry,
            config,
        })
    }

    /// Local signing identity
    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Peer registry
    pub fn registry(&self) -> &dyn PeerRegistry {
        self.registry.as_ref()
    }

    /// Dispatch settings
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
