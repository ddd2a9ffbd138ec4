//! Shared daemon state: the three knowledge services plus the optional
//! pre-fetch orchestrator, assembled once in `main.rs` and handed to both
//! the HTTP router and the `/mcp` JSON-RPC dispatcher.

use crate::prefetch;
use crate::services::{CheckpointService, RemediationService, TroubleshootingService};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub checkpoint: Arc<CheckpointService>,
    pub remediation: Arc<RemediationService>,
    pub troubleshooting: Arc<TroubleshootingService>,
    /// `None` disables speculative pre-fetch entirely. The orchestrator
    /// itself is built fresh per request in [`crate::mcp::dispatch`], since
    /// its candidates close over the caller's tenant.
    pub prefetch_config: Option<prefetch::Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
