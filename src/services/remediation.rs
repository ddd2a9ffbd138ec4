//! The remediation service (§4.3.2): save/search/list/update error fixes.
//!
//! Shares the checkpoint service's CRUD shape but additionally fans out
//! reads across the tenant's `project -> team -> org` collection ladder
//! (§3.2) and merges the results, since a remediation saved at team scope
//! should still surface for a project-scoped search. `UpdateFeedback`
//! implements the running-mean success-rate law from §4.3.2 verbatim.

use super::{now_unix, tenant_scoped_filter};
use crate::error::{ContextdError, Result};
use crate::store::{sort_results, Document, Store};
use crate::tenant::{Kind, Router, Scope, Tenant};
use crate::value::DynValue;
use std::collections::HashMap;
use std::sync::Arc;

/// A stored error remediation.
#[derive(Debug, Clone, PartialEq)]
pub struct Remediation {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub tenant: Tenant,
    pub error_pattern: String,
    pub context: String,
    pub root_cause: String,
    pub solution: String,
    pub diagnostic_steps: String,
    pub success_rate: f32,
    pub usage_count: u64,
    pub last_used: Option<i64>,
    pub metadata: HashMap<String, String>,
}

impl Remediation {
    fn to_metadata(&self) -> HashMap<String, DynValue> {
        let mut m = HashMap::new();
        m.insert("id".into(), DynValue::from(self.id.clone()));
        m.insert("created_at".into(), DynValue::from(self.created_at));
        m.insert("updated_at".into(), DynValue::from(self.updated_at));
        m.insert("tenant_id".into(), DynValue::from(self.tenant.org_id.clone()));
        if let Some(team_id) = &self.tenant.team_id {
            m.insert("team_id".into(), DynValue::from(team_id.clone()));
        }
        if let Some(project_id) = &self.tenant.project_id {
            m.insert("project_id".into(), DynValue::from(project_id.clone()));
        }
        m.insert("error_pattern".into(), DynValue::from(self.error_pattern.clone()));
        m.insert("context".into(), DynValue::from(self.context.clone()));
        m.insert("root_cause".into(), DynValue::from(self.root_cause.clone()));
        m.insert("solution".into(), DynValue::from(self.solution.clone()));
        m.insert(
            "diagnostic_steps".into(),
            DynValue::from(self.diagnostic_steps.clone()),
        );
        m.insert("success_rate".into(), DynValue::from(self.success_rate as f64));
        m.insert("usage_count".into(), DynValue::from(self.usage_count as i64));
        if let Some(last_used) = self.last_used {
            m.insert("last_used".into(), DynValue::from(last_used));
        }
        m.insert(
            "metadata_json".into(),
            DynValue::from(serde_json::to_string(&self.metadata).unwrap_or_default()),
        );
        m
    }

    fn from_metadata(id: String, m: &HashMap<String, DynValue>) -> Result<Self> {
        let get_str = |k: &str| m.get(k).map(DynValue::as_display).unwrap_or_default();
        let get_int = |k: &str| -> i64 {
            match m.get(k) {
                Some(DynValue::Int(i)) => *i,
                Some(other) => other.as_display().parse().unwrap_or(0),
                None => 0,
            }
        };
        let get_float = |k: &str| -> f32 {
            match m.get(k) {
                Some(DynValue::Float(f)) => *f as f32,
                Some(DynValue::Int(i)) => *i as f32,
                Some(other) => other.as_display().parse().unwrap_or(0.0),
                None => 0.0,
            }
        };
        let tenant = Tenant {
            org_id: get_str("tenant_id"),
            team_id: m.get("team_id").map(DynValue::as_display),
            project_id: m.get("project_id").map(DynValue::as_display),
        };
        let metadata = m
            .get("metadata_json")
            .map(DynValue::as_display)
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Ok(Remediation {
            id,
            created_at: get_int("created_at"),
            updated_at: get_int("updated_at"),
            tenant,
            error_pattern: get_str("error_pattern"),
            context: get_str("context"),
            root_cause: get_str("root_cause"),
            solution: get_str("solution"),
            diagnostic_steps: get_str("diagnostic_steps"),
            success_rate: get_float("success_rate").clamp(0.0, 1.0),
            usage_count: get_int("usage_count").max(0) as u64,
            last_used: m.get("last_used").map(|_| get_int("last_used")),
            metadata,
        })
    }
}

/// Request to [`RemediationService::save`].
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub tenant: Tenant,
    pub error_pattern: String,
    pub context: String,
    pub root_cause: String,
    pub solution: String,
    pub diagnostic_steps: String,
    pub metadata: HashMap<String, String>,
}

/// Request to [`RemediationService::search`] / [`RemediationService::list`].
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub tenant: Tenant,
    pub query: String,
    pub limit: usize,
}

const KIND: Kind = Kind::Remediations;

/// The narrowest scope a tenant's fields support: `project` when both
/// `team_id`/`project_id` are present, `team` with only `team_id`, else
/// `org`. Writes target this scope; reads fan out from it down to `org`.
fn narrowest_scope(tenant: &Tenant) -> Scope {
    if tenant.team_id.is_some() && tenant.project_id.is_some() {
        Scope::Project
    } else if tenant.team_id.is_some() {
        Scope::Team
    } else {
        Scope::Org
    }
}

/// Save/search/list/update over error remediations.
pub struct RemediationService {
    store: Arc<dyn Store>,
    router: Router,
}

impl RemediationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            router: Router::new(),
        }
    }

    #[tracing::instrument(name = "remediation.save", skip(self, req), fields(tenant.org = %req.tenant.org_id))]
    pub async fn save(&self, req: SaveRequest) -> Result<Remediation> {
        let scope = narrowest_scope(&req.tenant);
        let collection = self.router.collection_name(scope, KIND, &req.tenant)?;
        self.store.create_collection(&collection, 0).await?;

        let now = now_unix();
        let remediation = Remediation {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant: req.tenant,
            error_pattern: req.error_pattern,
            context: req.context,
            root_cause: req.root_cause,
            solution: req.solution,
            diagnostic_steps: req.diagnostic_steps,
            success_rate: 0.0,
            usage_count: 0,
            last_used: None,
            metadata: req.metadata,
        };

        let document = Document {
            id: Some(remediation.id.clone()),
            content: remediation.error_pattern.clone(),
            metadata: remediation.to_metadata(),
            collection,
        };
        self.store.add_documents(vec![document]).await?;
        tracing::info!(monotonic_counter.remediation_saves_total = 1u64, "remediation saved");
        Ok(remediation)
    }

    /// Semantic search fanned out across the tenant's collection ladder,
    /// merged and re-sorted by score desc / id asc (§5 ordering guarantee).
    #[tracing::instrument(name = "remediation.search", skip(self, req), fields(tenant.org = %req.tenant.org_id))]
    pub async fn search(&self, req: SearchRequest) -> Result<Vec<(Remediation, f32)>> {
        let scope = narrowest_scope(&req.tenant);
        let collections = self.router.search_collections(scope, KIND, &req.tenant)?;
        let filter = tenant_scoped_filter(&req.tenant);
        let limit = if req.limit == 0 { 10 } else { req.limit };

        let mut results = Vec::new();
        for collection in &collections {
            let hits = self
                .store
                .search(collection, &req.query, limit, filter.clone())
                .await?;
            results.extend(hits);
        }
        sort_results(&mut results);
        results.truncate(limit);
        results
            .into_iter()
            .map(|r| Remediation::from_metadata(r.id, &r.metadata).map(|remediation| (remediation, r.score)))
            .collect()
    }

    #[tracing::instrument(name = "remediation.list", skip(self, tenant), fields(tenant.org = %tenant.org_id))]
    pub async fn list(&self, tenant: &Tenant, limit: usize) -> Result<Vec<Remediation>> {
        let scope = narrowest_scope(tenant);
        let collections = self.router.search_collections(scope, KIND, tenant)?;
        let filter = tenant_scoped_filter(tenant);
        let limit = if limit == 0 { 20 } else { limit };

        let mut results = Vec::new();
        for collection in &collections {
            let hits = self.store.search(collection, "", limit, filter.clone()).await?;
            results.extend(hits);
        }
        results.truncate(limit);
        results
            .into_iter()
            .map(|r| Remediation::from_metadata(r.id, &r.metadata))
            .collect()
    }

    #[tracing::instrument(name = "remediation.get", skip(self, tenant), fields(tenant.org = %tenant.org_id))]
    pub async fn get(&self, tenant: &Tenant, id: &str) -> Result<(Remediation, String)> {
        let scope = narrowest_scope(tenant);
        let collections = self.router.search_collections(scope, KIND, tenant)?;
        let filter = tenant_scoped_filter(tenant).with_must("id", id.to_string());
        for collection in &collections {
            let hits = self.store.search(collection, "", 1, filter.clone()).await?;
            if let Some(hit) = hits.into_iter().next() {
                return Remediation::from_metadata(hit.id, &hit.metadata).map(|r| (r, collection.clone()));
            }
        }
        Err(ContextdError::NotFound(format!("remediation '{id}' not found")))
    }

    /// `usage_count += 1`, `last_used = now`, and the running-mean
    /// success-rate update from §4.3.2:
    /// `success_rate' = clamp01((success_rate*usage_count + success) / (usage_count+1))`.
    #[tracing::instrument(name = "remediation.update_feedback", skip(self, tenant), fields(tenant.org = %tenant.org_id))]
    pub async fn update_feedback(&self, tenant: &Tenant, id: &str, success: bool) -> Result<Remediation> {
        let (mut remediation, collection) = self.get(tenant, id).await?;
        let success_term = if success { 1.0 } else { 0.0 };
        remediation.success_rate = ((remediation.success_rate * remediation.usage_count as f32 + success_term)
            / (remediation.usage_count as f32 + 1.0))
            .clamp(0.0, 1.0);
        remediation.usage_count += 1;
        remediation.last_used = Some(now_unix());
        remediation.updated_at = now_unix();

        self.store
            .delete_documents_from_collection(&collection, &[id.to_string()])
            .await?;
        let document = Document {
            id: Some(remediation.id.clone()),
            content: remediation.error_pattern.clone(),
            metadata: remediation.to_metadata(),
            collection,
        };
        self.store.add_documents(vec![document]).await?;
        Ok(remediation)
    }

    #[tracing::instrument(name = "remediation.delete", skip(self, tenant), fields(tenant.org = %tenant.org_id))]
    pub async fn delete(&self, tenant: &Tenant, id: &str) -> Result<()> {
        let (_, collection) = self.get(tenant, id).await?;
        self.store
            .delete_documents_from_collection(&collection, &[id.to_string()])
            .await
    }

    pub async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::store::InMemoryStore;

    fn service() -> RemediationService {
        RemediationService::new(Arc::new(InMemoryStore::new(Arc::new(HashEmbedder::new(32)))))
    }

    fn tenant() -> Tenant {
        Tenant {
            org_id: "acme".into(),
            team_id: Some("core".into()),
            project_id: Some("widget".into()),
        }
    }

    fn save_req() -> SaveRequest {
        SaveRequest {
            tenant: tenant(),
            error_pattern: "connection refused".into(),
            context: "db pool".into(),
            root_cause: "pool exhausted".into(),
            solution: "increase pool size".into(),
            diagnostic_steps: "check active connections".into(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let service = service();
        let saved = service.save(save_req()).await.unwrap();
        let (fetched, _) = service.get(&tenant(), &saved.id).await.unwrap();
        assert_eq!(fetched.error_pattern, "connection refused");
        assert_eq!(fetched.success_rate, 0.0);
        assert_eq!(fetched.usage_count, 0);
    }

    #[tokio::test]
    async fn update_feedback_running_mean_first_success() {
        let service = service();
        let saved = service.save(save_req()).await.unwrap();
        let updated = service.update_feedback(&tenant(), &saved.id, true).await.unwrap();
        assert_eq!(updated.usage_count, 1);
        assert_eq!(updated.success_rate, 1.0);
        assert!(updated.last_used.is_some());
    }

    #[tokio::test]
    async fn update_feedback_running_mean_mixed_outcomes() {
        let service = service();
        let saved = service.save(save_req()).await.unwrap();
        service.update_feedback(&tenant(), &saved.id, true).await.unwrap();
        let updated = service.update_feedback(&tenant(), &saved.id, false).await.unwrap();
        assert_eq!(updated.usage_count, 2);
        assert!((updated.success_rate - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn search_finds_saved_remediation() {
        let service = service();
        service.save(save_req()).await.unwrap();
        let hits = service
            .search(SearchRequest {
                tenant: tenant(),
                query: "connection refused".into(),
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.error_pattern, "connection refused");
    }

    #[tokio::test]
    async fn delete_removes_remediation() {
        let service = service();
        let saved = service.save(save_req()).await.unwrap();
        service.delete(&tenant(), &saved.id).await.unwrap();
        assert!(service.get(&tenant(), &saved.id).await.is_err());
    }
}
