//! The troubleshooting service (§4.3.3): five-step diagnosis over a shared
//! bank of generic error→solution patterns.
//!
//! Grounded on the hybrid-score / fusion idiom in the teacher's
//! `rag/search.rs` (`RrfFusion`), generalized from reciprocal-rank fusion
//! into this spec's own `0.6*semantic + 0.3*success + 0.1*usage` weighting,
//! and on the ingest/search handler shape in `api/handlers/rag.rs`.

use super::{now_unix, tenant_scoped_filter};
use crate::error::{ContextdError, Result};
use crate::store::{Document, Store};
use crate::tenant::{Kind, Router, Scope, Tenant};
use crate::value::DynValue;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_ERROR_MESSAGE_LEN: usize = 10_000;
const MAX_STACK_TRACE_LEN: usize = 50_000;
const MAX_CONTEXT_ENTRIES: usize = 100;
const DEFAULT_TOP_K: usize = 5;
const MAX_TOP_K: usize = 50;

/// Destructive-action keywords (§4.3.3 step 5), matched case-insensitively
/// against the lowercased action text.
const DESTRUCTIVE_KEYWORDS: [&str; 10] = [
    "delete", "remove", "drop", "destroy", "restart", "kill", "terminate", "wipe", "format",
    "reset",
];

const SAFETY_NOTE: &str = "CAUTION: This action may cause service disruption. Confirm before proceeding.";

/// How urgently a pattern's underlying issue needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::str::FromStr for Severity {
    type Err = ContextdError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(ContextdError::InvalidInput(format!("unknown severity '{other}'"))),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Coarse error-pattern category; `Other` carries anything outside the
/// enumerated set so categorization never fails closed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Network,
    Database,
    FileSystem,
    Memory,
    Permission,
    Configuration,
    Dependency,
    Build,
    Runtime,
    Other(String),
}

impl Category {
    /// The lowercase wire/storage representation (`snake_case` for the
    /// enumerated variants, the original string for `Other`).
    pub fn as_str(&self) -> &str {
        match self {
            Category::Network => "network",
            Category::Database => "database",
            Category::FileSystem => "file_system",
            Category::Memory => "memory",
            Category::Permission => "permission",
            Category::Configuration => "configuration",
            Category::Dependency => "dependency",
            Category::Build => "build",
            Category::Runtime => "runtime",
            Category::Other(s) => s,
        }
    }

    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "network" => Category::Network,
            "database" => Category::Database,
            "file_system" | "filesystem" => Category::FileSystem,
            "memory" => Category::Memory,
            "permission" => Category::Permission,
            "configuration" | "config" => Category::Configuration,
            "dependency" => Category::Dependency,
            "build" => Category::Build,
            "runtime" => Category::Runtime,
            other => Category::Other(other.to_string()),
        }
    }
}

/// How confident a ranked hypothesis or search result is, by the thresholds
/// in §4.3.3 step 4 / invariant 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_probability(p: f32) -> Self {
        if p >= 0.8 {
            Confidence::High
        } else if p >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// The hybrid score combining semantic similarity, historical success, and
/// usage volume (§4.3.3, glossary). `usage_count = 0` contributes nothing,
/// leaving `0.6*semantic + 0.3*success`.
pub fn hybrid_score(semantic: f32, success_rate: f32, usage_count: u64) -> f32 {
    let usage = (usage_count as f32 / 100.0).min(1.0);
    0.6 * semantic + 0.3 * success_rate.clamp(0.0, 1.0) + 0.1 * usage
}

/// A stored generic troubleshooting pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub error_pattern: String,
    pub context: String,
    pub root_cause: String,
    pub solution: String,
    pub diagnostic_steps: String,
    pub success_rate: f32,
    pub severity: Severity,
    pub category: Category,
    pub tags: Vec<String>,
    pub usage_count: u64,
    pub last_used: Option<i64>,
}

impl Pattern {
    fn to_metadata(&self, tenant: &Tenant) -> HashMap<String, DynValue> {
        let mut m = HashMap::new();
        m.insert("id".into(), DynValue::from(self.id.clone()));
        m.insert("created_at".into(), DynValue::from(self.created_at));
        m.insert("updated_at".into(), DynValue::from(self.updated_at));
        m.insert("tenant_id".into(), DynValue::from(tenant.org_id.clone()));
        if let Some(team_id) = &tenant.team_id {
            m.insert("team_id".into(), DynValue::from(team_id.clone()));
        }
        if let Some(project_id) = &tenant.project_id {
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
        m.insert("severity".into(), DynValue::from(self.severity.to_string()));
        m.insert("category".into(), DynValue::from(self.category.as_str().to_string()));
        m.insert("tags".into(), DynValue::from(self.tags.join(",")));
        m.insert("usage_count".into(), DynValue::from(self.usage_count as i64));
        if let Some(last_used) = self.last_used {
            m.insert("last_used".into(), DynValue::from(last_used));
        }
        m
    }

    fn from_metadata(id: String, m: &HashMap<String, DynValue>) -> Self {
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
        let tags = get_str("tags");
        let tags = if tags.is_empty() {
            Vec::new()
        } else {
            tags.split(',').map(|s| s.to_string()).collect()
        };
        Pattern {
            id,
            created_at: get_int("created_at"),
            updated_at: get_int("updated_at"),
            error_pattern: get_str("error_pattern"),
            context: get_str("context"),
            root_cause: get_str("root_cause"),
            solution: get_str("solution"),
            diagnostic_steps: get_str("diagnostic_steps"),
            success_rate: get_float("success_rate").clamp(0.0, 1.0),
            severity: get_str("severity").parse().unwrap_or(Severity::Medium),
            category: Category::parse(&get_str("category")),
            tags,
            usage_count: get_int("usage_count").max(0) as u64,
            last_used: m.get("last_used").map(|_| get_int("last_used")),
        }
    }
}

/// A single diagnostic or remediation step, with destructive-action safety
/// detection (§4.3.3 step 5).
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub description: String,
    pub destructive: bool,
    pub safety_notes: Option<String>,
}

impl Action {
    fn new(description: String) -> Self {
        let destructive = {
            let lower = description.to_lowercase();
            DESTRUCTIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
        };
        Action {
            destructive,
            safety_notes: destructive.then(|| SAFETY_NOTE.to_string()),
            description,
        }
    }
}

/// A single ranked explanation for the observed error (§4.3.3 step 3-4).
#[derive(Debug, Clone)]
pub struct Hypothesis {
    pub description: String,
    pub probability: f32,
    pub evidence: Vec<String>,
    pub category: Category,
    pub verification_steps: Vec<String>,
}

/// Request to [`TroubleshootingService::diagnose`].
#[derive(Debug, Clone, Default)]
pub struct DiagnoseRequest {
    pub tenant: Tenant,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub context: HashMap<String, String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub top_k: usize,
}

/// A similar issue surfaced during pattern recognition, carrying the
/// hybrid-ranked match score and per-result confidence.
#[derive(Debug, Clone)]
pub struct SimilarIssue {
    pub pattern_id: String,
    pub error_pattern: String,
    pub match_score: f32,
    pub confidence: Confidence,
}

/// The outcome of a completed diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Resolved,
    Unresolved,
}

/// Full diagnosis result (§4.3.3).
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub status: &'static str,
    pub root_cause: Option<String>,
    pub confidence: Confidence,
    pub similar_issues: Vec<SimilarIssue>,
    pub recommended_steps: Vec<Action>,
    pub affected_resources: Option<Vec<String>>,
    pub timeline: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub outcome: Outcome,
}

const SCOPE: Scope = Scope::Org;
const KIND: Kind = Kind::TroubleshootingKnowledge;

/// The five-step diagnosis engine plus pattern bank CRUD.
pub struct TroubleshootingService {
    store: Arc<dyn Store>,
    router: Router,
}

impl TroubleshootingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            router: Router::new(),
        }
    }

    fn collection(&self, tenant: &Tenant) -> Result<String> {
        self.router.collection_name(SCOPE, KIND, tenant)
    }

    /// Save a new generic troubleshooting pattern into the shared bank.
    #[tracing::instrument(name = "troubleshooting.save_pattern", skip(self, tenant))]
    pub async fn save_pattern(
        &self,
        tenant: &Tenant,
        error_pattern: String,
        context: String,
        root_cause: String,
        solution: String,
        diagnostic_steps: String,
        severity: Severity,
        category: Category,
        tags: Vec<String>,
    ) -> Result<Pattern> {
        let collection = self.collection(tenant)?;
        self.store.create_collection(&collection, 0).await?;

        let now = now_unix();
        let pattern = Pattern {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            error_pattern,
            context,
            root_cause,
            solution,
            diagnostic_steps,
            success_rate: 0.0,
            severity,
            category,
            tags,
            usage_count: 0,
            last_used: None,
        };
        let document = Document {
            id: Some(pattern.id.clone()),
            content: pattern.error_pattern.clone(),
            metadata: pattern.to_metadata(tenant),
            collection,
        };
        self.store.add_documents(vec![document]).await?;
        Ok(pattern)
    }

    /// List stored patterns, optionally filtered by category/severity/
    /// minimum success rate, used by the `list_patterns` tool.
    #[tracing::instrument(name = "troubleshooting.list_patterns", skip(self, tenant))]
    pub async fn list_patterns(
        &self,
        tenant: &Tenant,
        category: Option<&str>,
        severity: Option<&str>,
        min_success_rate: Option<f32>,
        limit: usize,
    ) -> Result<Vec<Pattern>> {
        let collection = self.collection(tenant)?;
        let mut filter = tenant_scoped_filter(tenant);
        if let Some(category) = category {
            filter = filter.with_must("category", Category::parse(category).as_str().to_string());
        }
        if let Some(severity) = severity {
            filter = filter.with_must("severity", severity.to_lowercase());
        }
        let limit = if limit == 0 { 10 } else { limit };
        let hits = self.store.search(&collection, "", limit.max(50), filter).await?;
        let mut patterns: Vec<Pattern> = hits
            .into_iter()
            .map(|r| Pattern::from_metadata(r.id, &r.metadata))
            .filter(|p| min_success_rate.is_none_or(|min| p.success_rate >= min))
            .collect();
        patterns.truncate(limit);
        Ok(patterns)
    }

    /// Run the full five-step diagnosis (§4.3.3).
    #[tracing::instrument(name = "troubleshooting.diagnose", skip(self, req), fields(tenant.org = %req.tenant.org_id))]
    pub async fn diagnose(&self, req: DiagnoseRequest) -> Result<Session> {
        // Step 1: symptom collection.
        if req.error_message.is_empty() {
            return Err(ContextdError::InvalidInput("error_message must not be empty".into()));
        }
        if req.error_message.len() > MAX_ERROR_MESSAGE_LEN {
            return Err(ContextdError::InvalidInput(format!(
                "error_message exceeds {MAX_ERROR_MESSAGE_LEN} characters"
            )));
        }
        if let Some(stack_trace) = &req.stack_trace {
            if stack_trace.len() > MAX_STACK_TRACE_LEN {
                return Err(ContextdError::InvalidInput(format!(
                    "stack_trace exceeds {MAX_STACK_TRACE_LEN} characters"
                )));
            }
        }
        if req.context.len() > MAX_CONTEXT_ENTRIES {
            return Err(ContextdError::InvalidInput(format!(
                "context exceeds {MAX_CONTEXT_ENTRIES} entries"
            )));
        }
        let top_k = match req.top_k {
            0 => DEFAULT_TOP_K,
            k => k.min(MAX_TOP_K),
        };

        let started_at = now_unix();
        let session_id = uuid::Uuid::new_v4().to_string();

        // Step 2: pattern recognition.
        let collection = self.collection(&req.tenant)?;
        let mut filter = tenant_scoped_filter(&req.tenant);
        if let Some(category) = &req.category {
            filter = filter.with_must("category", Category::parse(category).as_str().to_string());
        }
        for tag in &req.tags {
            filter = filter.with_should("tags", tag.clone());
        }
        let candidates = self
            .store
            .search(&collection, &req.error_message, top_k * 2, filter)
            .await?;

        if candidates.is_empty() {
            return Ok(Session {
                id: session_id,
                status: "completed",
                root_cause: None,
                confidence: Confidence::Low,
                similar_issues: Vec::new(),
                recommended_steps: Vec::new(),
                affected_resources: None,
                timeline: None,
                started_at,
                completed_at: Some(now_unix()),
                outcome: Outcome::Unresolved,
            });
        }

        // Step 3: hypothesis formation, merging identical root causes.
        let mut hypotheses: Vec<Hypothesis> = Vec::new();
        let mut scored: Vec<(Pattern, f32)> = Vec::new();
        for hit in &candidates {
            let pattern = Pattern::from_metadata(hit.id.clone(), &hit.metadata);
            let semantic = 1.0 / (1.0 + (1.0 - hit.score).max(0.0));
            let score = hybrid_score(semantic, pattern.success_rate, pattern.usage_count);
            scored.push((pattern, score));
        }
        // Hybrid-rerank: take the best 2*top_k candidates down to top_k.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        for (pattern, match_score) in &scored {
            let probability = match_score * pattern.success_rate;
            if let Some(existing) = hypotheses.iter_mut().find(|h| h.description == pattern.root_cause) {
                existing.evidence.push(format!(
                    "{} (success_rate={:.2}, usage_count={})",
                    pattern.error_pattern, pattern.success_rate, pattern.usage_count
                ));
                existing.probability += probability;
            } else {
                hypotheses.push(Hypothesis {
                    description: pattern.root_cause.clone(),
                    probability,
                    evidence: vec![format!(
                        "{} (success_rate={:.2}, usage_count={})",
                        pattern.error_pattern, pattern.success_rate, pattern.usage_count
                    )],
                    category: pattern.category.clone(),
                    verification_steps: parse_steps(&pattern.diagnostic_steps),
                });
            }
        }

        // Step 4: ranking — normalize probabilities to sum to 1.
        let total: f32 = hypotheses.iter().map(|h| h.probability).sum();
        if total > 0.0 {
            for h in &mut hypotheses {
                h.probability /= total;
            }
        }
        hypotheses.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap_or(std::cmp::Ordering::Equal));

        let top = hypotheses.first();
        let confidence = Confidence::from_probability(top.map(|h| h.probability).unwrap_or(0.0));

        // Step 5: action & safety, from the top candidate's diagnostic
        // steps then its solution.
        let top_pattern = scored.first().map(|(p, _)| p.clone());
        let mut recommended_steps = Vec::new();
        if let Some(pattern) = &top_pattern {
            for step in parse_steps(&pattern.diagnostic_steps) {
                recommended_steps.push(Action::new(step));
            }
            for step in parse_steps(&pattern.solution) {
                recommended_steps.push(Action::new(step));
            }
        }

        let similar_issues: Vec<SimilarIssue> = scored
            .iter()
            .map(|(pattern, score)| SimilarIssue {
                pattern_id: pattern.id.clone(),
                error_pattern: pattern.error_pattern.clone(),
                match_score: *score,
                confidence: Confidence::from_probability(*score),
            })
            .collect();

        // Progressive disclosure: high includes affected_resources/
        // timeline, medium keeps verification steps, low drops both.
        let (affected_resources, timeline) = match confidence {
            Confidence::High => (
                Some(
                    req.context
                        .keys()
                        .cloned()
                        .chain(std::iter::once(req.tenant.org_id.clone()))
                        .collect(),
                ),
                Some("Estimated resolution: immediate, based on a high-confidence historical match.".to_string()),
            ),
            Confidence::Medium => (None, None),
            Confidence::Low => {
                recommended_steps.clear();
                (None, None)
            }
        };
        if confidence == Confidence::Low {
            recommended_steps.push(Action::new(
                "No high-confidence match found; recommend manual investigation.".to_string(),
            ));
        }

        Ok(Session {
            id: session_id,
            status: "completed",
            root_cause: top.map(|h| h.description.clone()),
            confidence,
            similar_issues,
            recommended_steps,
            affected_resources,
            timeline,
            started_at,
            completed_at: Some(now_unix()),
            outcome: Outcome::Pending,
        })
    }

    pub async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Split newline-separated steps, trimming whitespace and dropping blanks.
fn parse_steps(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::store::InMemoryStore;

    fn service() -> TroubleshootingService {
        TroubleshootingService::new(Arc::new(InMemoryStore::new(Arc::new(HashEmbedder::new(32)))))
    }

    fn tenant() -> Tenant {
        Tenant {
            org_id: "acme".into(),
            team_id: None,
            project_id: None,
        }
    }

    #[test]
    fn invariant_6_destructive_keyword_sets_safety_notes() {
        let action = Action::new("sudo rm -rf /var/cache && restart service".to_string());
        assert!(action.destructive);
        assert!(action.safety_notes.unwrap().starts_with("CAUTION"));
    }

    #[test]
    fn non_destructive_action_has_no_safety_notes() {
        let action = Action::new("check the logs for more detail".to_string());
        assert!(!action.destructive);
        assert!(action.safety_notes.is_none());
    }

    #[test]
    fn invariant_5_confidence_thresholds() {
        assert_eq!(Confidence::from_probability(0.8), Confidence::High);
        assert_eq!(Confidence::from_probability(0.5), Confidence::Medium);
        assert_eq!(Confidence::from_probability(0.49), Confidence::Low);
    }

    #[test]
    fn boundary_usage_count_zero_drops_usage_term() {
        let with_zero_usage = hybrid_score(1.0, 0.5, 0);
        assert!((with_zero_usage - (0.6 + 0.15)).abs() < 1e-6);
    }

    #[test]
    fn scenario_3_hybrid_ranking_prefers_higher_success_and_usage() {
        let a = hybrid_score(1.0, 0.5, 20);
        let b = hybrid_score(1.0, 0.95, 80);
        assert!(b > a);
        assert!((b - 0.965).abs() < 1e-3);
        assert!((a - 0.77).abs() < 1e-3);
    }

    #[tokio::test]
    async fn boundary_empty_error_message_is_invalid_input() {
        let service = service();
        let req = DiagnoseRequest {
            tenant: tenant(),
            error_message: String::new(),
            ..Default::default()
        };
        let err = service.diagnose(req).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[tokio::test]
    async fn boundary_top_k_clamped_to_fifty() {
        let service = service();
        let req = DiagnoseRequest {
            tenant: tenant(),
            error_message: "connection refused".into(),
            top_k: 1000,
            ..Default::default()
        };
        // No stored patterns: empty-candidate path short-circuits before
        // top_k would matter, but the request itself must not be rejected.
        let session = service.diagnose(req).await.unwrap();
        assert_eq!(session.outcome, Outcome::Unresolved);
    }

    #[tokio::test]
    async fn diagnose_with_no_patterns_is_unresolved_low_confidence() {
        let service = service();
        let req = DiagnoseRequest {
            tenant: tenant(),
            error_message: "connection refused".into(),
            ..Default::default()
        };
        let session = service.diagnose(req).await.unwrap();
        assert_eq!(session.confidence, Confidence::Low);
        assert_eq!(session.outcome, Outcome::Unresolved);
        assert!(session.root_cause.is_none());
    }

    #[tokio::test]
    async fn scenario_4_destructive_action_detected_end_to_end() {
        let service = service();
        service
            .save_pattern(
                &tenant(),
                "disk cache corruption".into(),
                "".into(),
                "stale cache entries".into(),
                "sudo rm -rf /var/cache && restart service".into(),
                "inspect /var/cache for stale files".into(),
                Severity::Medium,
                Category::FileSystem,
                vec![],
            )
            .await
            .unwrap();

        let req = DiagnoseRequest {
            tenant: tenant(),
            error_message: "disk cache corruption".into(),
            ..Default::default()
        };
        let session = service.diagnose(req).await.unwrap();
        assert!(session
            .recommended_steps
            .iter()
            .any(|a| a.destructive && a.safety_notes.as_deref().unwrap_or("").starts_with("CAUTION")));
    }

    #[test]
    fn parse_steps_splits_and_trims_newlines() {
        let steps = parse_steps("step one\n  step two  \n\nstep three\n");
        assert_eq!(steps, vec!["step one", "step two", "step three"]);
    }
}
