//! The checkpoint service (§4.3.1): save/list/resume/get/delete session
//! checkpoints.
//!
//! Grounded on the ingest/search/delete handler shape in the teacher's
//! `api/handlers/rag.rs` and on `memory/mod.rs`'s `estimate_tokens`, reused
//! here (via [`super::approx_token_count`]) for the `len/4` token
//! approximation the spec's worked example expects.

use super::{approx_token_count, now_unix, tenant_scoped_filter};
use crate::error::{ContextdError, Result};
use crate::store::{Document, Filter, Store};
use crate::tenant::{Kind, Router, Scope, Tenant};
use crate::value::DynValue;
use std::collections::HashMap;
use std::sync::Arc;

/// A saved session checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub tenant: Tenant,
    pub session_id: String,
    pub project_path: String,
    pub name: String,
    pub summary: String,
    pub context: String,
    pub full_state: String,
    pub token_count: usize,
    pub threshold: Option<usize>,
    pub auto_created: bool,
    pub metadata: HashMap<String, String>,
}

impl Checkpoint {
    /// The text embedded for semantic search: `name + "\n\n" + summary`.
    /// Invariant: exactly one vector is ever derived per checkpoint.
    fn embed_content(&self) -> String {
        format!("{}\n\n{}", self.name, self.summary)
    }

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
        m.insert("session_id".into(), DynValue::from(self.session_id.clone()));
        m.insert("project_path".into(), DynValue::from(self.project_path.clone()));
        m.insert("name".into(), DynValue::from(self.name.clone()));
        m.insert("summary".into(), DynValue::from(self.summary.clone()));
        m.insert("context".into(), DynValue::from(self.context.clone()));
        m.insert("full_state".into(), DynValue::from(self.full_state.clone()));
        m.insert("token_count".into(), DynValue::from(self.token_count as i64));
        if let Some(threshold) = self.threshold {
            m.insert("threshold".into(), DynValue::from(threshold as i64));
        }
        m.insert("auto_created".into(), DynValue::from(self.auto_created));
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
        let auto_created = matches!(m.get("auto_created"), Some(DynValue::Bool(true)));
        Ok(Checkpoint {
            id,
            created_at: get_int("created_at"),
            updated_at: get_int("updated_at"),
            tenant,
            session_id: get_str("session_id"),
            project_path: get_str("project_path"),
            name: get_str("name"),
            summary: get_str("summary"),
            context: get_str("context"),
            full_state: get_str("full_state"),
            token_count: get_int("token_count") as usize,
            threshold: m.get("threshold").map(|_| get_int("threshold") as usize),
            auto_created,
            metadata,
        })
    }
}

/// Request to [`CheckpointService::save`].
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub tenant: Tenant,
    pub session_id: String,
    pub project_path: String,
    pub name: String,
    pub summary: String,
    pub context: String,
    pub full_state: String,
    pub threshold: Option<usize>,
    pub auto_created: bool,
    pub metadata: HashMap<String, String>,
}

/// Request to [`CheckpointService::list`].
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub tenant: Tenant,
    pub session_id: Option<String>,
    pub project_path: Option<String>,
    pub auto_only: bool,
    pub limit: usize,
}

/// The resume detail level (§4.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeLevel {
    Summary,
    Context,
    Full,
}

impl std::str::FromStr for ResumeLevel {
    type Err = ContextdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(ResumeLevel::Summary),
            "context" => Ok(ResumeLevel::Context),
            "full" => Ok(ResumeLevel::Full),
            other => Err(ContextdError::InvalidInput(format!(
                "unknown resume level '{other}'"
            ))),
        }
    }
}

/// Result of [`CheckpointService::resume`].
#[derive(Debug, Clone)]
pub struct ResumeResult {
    pub checkpoint: Checkpoint,
    pub content: String,
    pub token_count: usize,
}

/// Request to [`CheckpointService::search`].
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub tenant: Tenant,
    pub query: String,
    pub project_path: String,
    pub limit: usize,
}

/// One semantic search hit over `name + "\n\n" + summary`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub checkpoint: Checkpoint,
    pub score: f32,
}

/// Save/list/resume/get/delete over session checkpoints.
///
/// Checkpoint scope is currently `Scope::Org` per the spec's open question
/// (§9): `team_id`/`project_id` are not yet required fields, so every
/// checkpoint lives in one org-wide collection regardless of tenant team/
/// project. Switching to `Scope::Project` is a one-constant change once
/// those fields become mandatory.
pub struct CheckpointService {
    store: Arc<dyn Store>,
    router: Router,
}

const SCOPE: Scope = Scope::Org;
const KIND: Kind = Kind::Checkpoints;

impl CheckpointService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            router: Router::new(),
        }
    }

    fn collection(&self, tenant: &Tenant) -> Result<String> {
        self.router.collection_name(SCOPE, KIND, tenant)
    }

    #[tracing::instrument(name = "checkpoint.save", skip(self, req), fields(tenant.org = %req.tenant.org_id))]
    pub async fn save(&self, req: SaveRequest) -> Result<Checkpoint> {
        let collection = self.collection(&req.tenant)?;
        self.store.create_collection(&collection, 0).await?;

        let now = now_unix();
        let token_count = approx_token_count(&req.full_state);
        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant: req.tenant,
            session_id: req.session_id,
            project_path: req.project_path,
            name: req.name,
            summary: req.summary,
            context: req.context,
            full_state: req.full_state,
            token_count,
            threshold: req.threshold,
            auto_created: req.auto_created,
            metadata: req.metadata,
        };

        let document = Document {
            id: Some(checkpoint.id.clone()),
            content: checkpoint.embed_content(),
            metadata: checkpoint.to_metadata(),
            collection: collection.clone(),
        };
        self.store.add_documents(vec![document]).await?;
        tracing::info!(
            monotonic_counter.checkpoint_saves_total = 1u64,
            auto_created = checkpoint.auto_created,
            "checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// **Regression-sensitive**: `project_path`, when given, MUST filter
    /// results — omitting it would leak checkpoints across projects.
    #[tracing::instrument(name = "checkpoint.list", skip(self, req), fields(tenant.org = %req.tenant.org_id))]
    pub async fn list(&self, req: ListRequest) -> Result<Vec<Checkpoint>> {
        let collection = self.collection(&req.tenant)?;
        let mut filter = tenant_scoped_filter(&req.tenant);
        if let Some(session_id) = &req.session_id {
            filter = filter.with_must("session_id", session_id.clone());
        }
        if let Some(project_path) = &req.project_path {
            filter = filter.with_must("project_path", project_path.clone());
        }
        if req.auto_only {
            filter = filter.with_must("auto_created", true);
        }
        let limit = if req.limit == 0 { 20 } else { req.limit };
        let results = self.store.search(&collection, "", limit, filter).await?;
        results
            .into_iter()
            .map(|r| Checkpoint::from_metadata(r.id, &r.metadata))
            .collect()
    }

    /// Semantic search over `name + "\n\n" + summary`, scoped to
    /// `project_path` (§6.1 `checkpoint_search`).
    #[tracing::instrument(name = "checkpoint.search", skip(self, req), fields(tenant.org = %req.tenant.org_id))]
    pub async fn search(&self, req: SearchRequest) -> Result<Vec<SearchHit>> {
        let collection = self.collection(&req.tenant)?;
        let filter = tenant_scoped_filter(&req.tenant).with_must("project_path", req.project_path.clone());
        let limit = if req.limit == 0 { 10 } else { req.limit };
        let results = self.store.search(&collection, &req.query, limit, filter).await?;
        results
            .into_iter()
            .map(|r| {
                let score = r.score;
                Checkpoint::from_metadata(r.id, &r.metadata).map(|checkpoint| SearchHit { checkpoint, score })
            })
            .collect()
    }

    #[tracing::instrument(name = "checkpoint.get", skip(self, tenant), fields(tenant.org = %tenant.org_id))]
    pub async fn get(&self, tenant: &Tenant, id: &str) -> Result<Checkpoint> {
        let collection = self.collection(tenant)?;
        let filter = tenant_scoped_filter(tenant).with_must("id", id.to_string());
        let results = self.store.search(&collection, "", 1, filter).await?;
        let result = results
            .into_iter()
            .next()
            .ok_or_else(|| ContextdError::NotFound(format!("checkpoint '{id}' not found")))?;
        Checkpoint::from_metadata(result.id, &result.metadata)
    }

    #[tracing::instrument(name = "checkpoint.resume", skip(self, tenant), fields(tenant.org = %tenant.org_id))]
    pub async fn resume(&self, tenant: &Tenant, id: &str, level: ResumeLevel) -> Result<ResumeResult> {
        let checkpoint = self.get(tenant, id).await?;
        let content = match level {
            ResumeLevel::Summary => checkpoint.summary.clone(),
            ResumeLevel::Context => format!("{}\n---\n{}", checkpoint.summary, checkpoint.context),
            ResumeLevel::Full => checkpoint.full_state.clone(),
        };
        let token_count = match level {
            ResumeLevel::Full => checkpoint.token_count,
            _ => approx_token_count(&content),
        };
        Ok(ResumeResult {
            checkpoint,
            content,
            token_count,
        })
    }

    #[tracing::instrument(name = "checkpoint.delete", skip(self, tenant), fields(tenant.org = %tenant.org_id))]
    pub async fn delete(&self, tenant: &Tenant, id: &str) -> Result<()> {
        let collection = self.collection(tenant)?;
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

    fn service() -> CheckpointService {
        CheckpointService::new(Arc::new(InMemoryStore::new(Arc::new(HashEmbedder::new(32)))))
    }

    fn tenant() -> Tenant {
        Tenant {
            org_id: "acme".into(),
            team_id: None,
            project_id: None,
        }
    }

    fn save_req(project_path: &str) -> SaveRequest {
        SaveRequest {
            tenant: tenant(),
            session_id: "sess-1".into(),
            project_path: project_path.into(),
            name: "checkpoint".into(),
            summary: "Fixed auth bug".into(),
            context: "extra context".into(),
            full_state: "full dump of state".into(),
            threshold: Some(1000),
            auto_created: false,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn scenario_1_save_then_resume_summary() {
        let service = service();
        let mut req = save_req("/p/a");
        req.summary = "Fixed auth bug".into();
        let checkpoint = service.save(req).await.unwrap();

        let resumed = service
            .resume(&tenant(), &checkpoint.id, ResumeLevel::Summary)
            .await
            .unwrap();
        assert_eq!(resumed.content, "Fixed auth bug");
        assert_eq!(resumed.token_count, 3);
    }

    #[tokio::test]
    async fn scenario_2_project_isolation_in_list() {
        let service = service();
        let a = service.save(save_req("/p/a")).await.unwrap();
        let _b = service.save(save_req("/p/b")).await.unwrap();

        let results = service
            .list(ListRequest {
                tenant: tenant(),
                project_path: Some("/p/a".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, a.id);
    }

    #[tokio::test]
    async fn resume_full_then_summary_token_count_non_increasing() {
        let service = service();
        let checkpoint = service.save(save_req("/p/a")).await.unwrap();

        let full = service
            .resume(&tenant(), &checkpoint.id, ResumeLevel::Full)
            .await
            .unwrap();
        let summary = service
            .resume(&tenant(), &checkpoint.id, ResumeLevel::Summary)
            .await
            .unwrap();
        assert!(summary.token_count <= full.token_count);
    }

    #[tokio::test]
    async fn search_scopes_results_to_project_path() {
        let service = service();
        let a = service.save(save_req("/p/a")).await.unwrap();
        service.save(save_req("/p/b")).await.unwrap();

        let hits = service
            .search(SearchRequest {
                tenant: tenant(),
                query: "auth bug".into(),
                project_path: "/p/a".into(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].checkpoint.id, a.id);
    }

    #[tokio::test]
    async fn get_missing_checkpoint_is_not_found() {
        let service = service();
        let err = service.get(&tenant(), "nope").await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn delete_removes_checkpoint() {
        let service = service();
        let checkpoint = service.save(save_req("/p/a")).await.unwrap();
        service.delete(&tenant(), &checkpoint.id).await.unwrap();
        assert!(service.get(&tenant(), &checkpoint.id).await.is_err());
    }

    #[tokio::test]
    async fn list_auto_only_filters_manual_checkpoints() {
        let service = service();
        let mut auto_req = save_req("/p/a");
        auto_req.auto_created = true;
        service.save(auto_req).await.unwrap();
        service.save(save_req("/p/a")).await.unwrap();

        let results = service
            .list(ListRequest {
                tenant: tenant(),
                project_path: Some("/p/a".into()),
                auto_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].auto_created);
    }
}
