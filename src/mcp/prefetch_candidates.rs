//! [`PrefetchCandidate`] wrappers over the three speculative search
//! operations (§4.4 correctness rule: only `*_search`/`list_*` tools are
//! ever registered). Each candidate closes over the caller's tenant, since
//! the orchestrator itself carries none.

use crate::error::Result;
use crate::prefetch::{PrefetchCandidate, RequestContext};
use crate::services::checkpoint::{CheckpointService, SearchRequest as CheckpointSearchRequest};
use crate::services::remediation::{RemediationService, SearchRequest as RemediationSearchRequest};
use crate::services::troubleshooting::TroubleshootingService;
use crate::tenant::Tenant;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct CheckpointSearchCandidate {
    pub service: Arc<CheckpointService>,
    pub tenant: Tenant,
}

#[async_trait]
impl PrefetchCandidate for CheckpointSearchCandidate {
    fn name(&self) -> &str {
        "checkpoint_search"
    }

    async fn execute(&self, ctx: &RequestContext, max_results: usize) -> Result<Vec<serde_json::Value>> {
        let project_path = ctx.project_path.clone().unwrap_or_default();
        let query = ctx.task_description.clone().unwrap_or_default();
        let hits = self
            .service
            .search(CheckpointSearchRequest {
                tenant: self.tenant.clone(),
                query,
                project_path,
                limit: max_results,
            })
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                json!({
                    "checkpoint_id": hit.checkpoint.id,
                    "summary": hit.checkpoint.summary,
                    "score": hit.score,
                })
            })
            .collect())
    }
}

pub struct RemediationSearchCandidate {
    pub service: Arc<RemediationService>,
    pub tenant: Tenant,
}

#[async_trait]
impl PrefetchCandidate for RemediationSearchCandidate {
    fn name(&self) -> &str {
        "remediation_search"
    }

    async fn execute(&self, ctx: &RequestContext, max_results: usize) -> Result<Vec<serde_json::Value>> {
        let query = ctx
            .recent_errors
            .first()
            .cloned()
            .or_else(|| ctx.task_description.clone())
            .unwrap_or_default();
        let hits = self
            .service
            .search(RemediationSearchRequest {
                tenant: self.tenant.clone(),
                query,
                limit: max_results,
            })
            .await?;
        Ok(hits
            .into_iter()
            .map(|(remediation, score)| {
                json!({
                    "remediation_id": remediation.id,
                    "error_pattern": remediation.error_pattern,
                    "score": score,
                })
            })
            .collect())
    }
}

pub struct ListPatternsCandidate {
    pub service: Arc<TroubleshootingService>,
    pub tenant: Tenant,
}

#[async_trait]
impl PrefetchCandidate for ListPatternsCandidate {
    fn name(&self) -> &str {
        "list_patterns"
    }

    async fn execute(&self, ctx: &RequestContext, max_results: usize) -> Result<Vec<serde_json::Value>> {
        let patterns = self
            .service
            .list_patterns(&self.tenant, ctx.error_category.as_deref(), None, None, max_results)
            .await?;
        Ok(patterns
            .into_iter()
            .map(|pattern| {
                json!({
                    "pattern_id": pattern.id,
                    "error_pattern": pattern.error_pattern,
                    "success_rate": pattern.success_rate,
                })
            })
            .collect())
    }
}
