//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use arcadia_control::Orchestrator;
use arcadia_download::DownloadManager;
use arcadia_pairing::{PairingCoordinator, SidecarClient};
use arcadia_store::Store;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<O, S, C>
where
    O: Orchestrator,
    S: Store,
    C: SidecarClient,
{
    /// Container sessions, installs, and maintenance.
    pub orchestrator: Arc<O>,
    /// Game file downloads.
    pub downloads: DownloadManager<S>,
    /// Streaming client pairing.
    pub pairing: Arc<PairingCoordinator<C, S>>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<O, S, C> GatewayState<O, S, C>
where
    O: Orchestrator,
    S: Store,
    C: SidecarClient,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        orchestrator: Arc<O>,
        downloads: DownloadManager<S>,
        pairing: Arc<PairingCoordinator<C, S>>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            orchestrator,
            downloads,
            pairing,
            config,
        }
    }
}

impl<O, S, C> Clone for GatewayState<O, S, C>
where
    O: Orchestrator,
    S: Store,
    C: SidecarClient,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            downloads: self.downloads.clone(),
            pairing: Arc::clone(&self.pairing),
            config: self.config.clone(),
        }
    }
}
