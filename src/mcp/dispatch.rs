//! Tool name + JSON params + authenticated tenant → service call → JSON
//! result, shared by the `/mcp` JSON-RPC handler and the REST mirror under
//! `/api/v1`/`/mcp` (§6.1/§6.2).

use super::args::*;
use super::prefetch_candidates::{CheckpointSearchCandidate, ListPatternsCandidate, RemediationSearchCandidate};
use crate::auth::middleware::AuthContext;
use crate::error::{ContextdError, Result};
use crate::prefetch::{Orchestrator, PrefetchCandidate, RequestContext};
use crate::services::checkpoint::{
    ListRequest as CheckpointListRequest, ResumeLevel, SaveRequest as CheckpointSaveRequest,
    SearchRequest as CheckpointSearchRequest,
};
use crate::services::remediation::{SaveRequest as RemediationSaveRequest, SearchRequest as RemediationSearchRequest};
use crate::services::troubleshooting::{Category, DiagnoseRequest, Severity};
use crate::state::AppState;
use crate::tenant::Tenant;
use serde_json::{json, Value};
use std::sync::Arc;

/// The result of one dispatched tool call: the text payload for the
/// envelope's `content[0].text` plus an optional `prefetch` block.
pub struct DispatchOutcome {
    pub content_text: String,
    pub prefetch: Option<Value>,
}

fn param<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| ContextdError::InvalidInput(format!("invalid params: {e}")))
}

/// Dispatches one tool call for the given authenticated context, running
/// the speculative pre-fetch pipeline alongside it when configured.
pub async fn dispatch(state: &AppState, auth: &AuthContext, tool: &str, params: Value) -> Result<DispatchOutcome> {
    let tenant = auth.tenant()?;
    let prefetch_ctx = build_request_context(&params);

    let result = match tool {
        "checkpoint_save" => checkpoint_save(state, &tenant, params).await,
        "checkpoint_search" => checkpoint_search(state, &tenant, params).await,
        "checkpoint_list" => checkpoint_list(state, &tenant, params).await,
        "checkpoint_resume" => checkpoint_resume(state, &tenant, params).await,
        "checkpoint_get" => checkpoint_get(state, &tenant, params).await,
        "checkpoint_delete" => checkpoint_delete(state, &tenant, params).await,
        "remediation_save" => remediation_save(state, &tenant, params).await,
        "remediation_search" => remediation_search(state, &tenant, params).await,
        "remediation_list" => remediation_list(state, &tenant, params).await,
        "remediation_get" => remediation_get(state, &tenant, params).await,
        "remediation_feedback" => remediation_feedback(state, &tenant, params).await,
        "remediation_delete" => remediation_delete(state, &tenant, params).await,
        "troubleshoot" => troubleshoot(state, &tenant, params).await,
        "save_pattern" => save_pattern(state, &tenant, params).await,
        "list_patterns" => list_patterns(state, &tenant, params).await,
        "status" => Ok(status(state)),
        other => Err(ContextdError::InvalidInput(format!("unknown tool '{other}'"))),
    }?;

    let prefetch = run_prefetch(state, &tenant, tool, prefetch_ctx).await;

    Ok(DispatchOutcome {
        content_text: result.to_string(),
        prefetch,
    })
}

/// Builds the pre-fetch orchestrator's input from whatever fields the
/// inbound params happen to carry. Unknown/absent fields just leave the
/// corresponding trigger at its default (non-matching) value.
fn build_request_context(params: &Value) -> RequestContext {
    let mut ctx = RequestContext::default();
    ctx.project_path = params
        .get("project_path")
        .and_then(Value::as_str)
        .map(str::to_string);
    ctx.session_continuation = params
        .get("session_id")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    if let Some(error_message) = params.get("error_message").and_then(Value::as_str) {
        ctx.recent_errors.push(error_message.to_string());
        ctx.keywords.extend(tokenize(error_message));
    }
    ctx.stack_trace_present = params
        .get("stack_trace")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    ctx.error_category = params.get("category").and_then(Value::as_str).map(str::to_string);
    if let Some(query) = params.get("query").and_then(Value::as_str) {
        ctx.keywords.extend(tokenize(query));
        ctx.task_description = Some(query.to_string());
    }
    ctx
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Builds candidates for the current tenant and runs the orchestrator,
/// skipping entirely when pre-fetch is disabled or the inbound call was
/// itself one of the speculative tools (no point pre-fetching what the
/// caller just asked for directly).
async fn run_prefetch(state: &AppState, tenant: &Tenant, tool: &str, ctx: RequestContext) -> Option<Value> {
    let config = state.prefetch_config.clone()?;
    let candidates: Vec<Arc<dyn PrefetchCandidate>> = vec![
        Arc::new(CheckpointSearchCandidate {
            service: state.checkpoint.clone(),
            tenant: tenant.clone(),
        }),
        Arc::new(RemediationSearchCandidate {
            service: state.remediation.clone(),
            tenant: tenant.clone(),
        }),
        Arc::new(ListPatternsCandidate {
            service: state.troubleshooting.clone(),
            tenant: tenant.clone(),
        }),
    ]
    .into_iter()
    .filter(|c: &Arc<dyn PrefetchCandidate>| c.name() != tool)
    .collect();

    let orchestrator = Orchestrator::new(config, candidates);
    let outcomes = orchestrator.run(ctx).await;
    if outcomes.is_empty() {
        return None;
    }
    let mut map = serde_json::Map::new();
    for (name, outcome) in outcomes {
        map.insert(
            name,
            json!({
                "results": outcome.results,
                "execution_time_ms": outcome.execution_time_ms,
                "confidence": outcome.confidence,
            }),
        );
    }
    Some(Value::Object(map))
}

async fn checkpoint_save(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: CheckpointSaveArgs = param(params)?;
    let checkpoint = state
        .checkpoint
        .save(CheckpointSaveRequest {
            tenant: tenant.clone(),
            session_id: args.session_id,
            project_path: args.project_path,
            name: args.name,
            summary: args.summary,
            context: args.context,
            full_state: args.full_state,
            threshold: args.threshold,
            auto_created: args.auto_created,
            metadata: args.metadata,
        })
        .await?;
    Ok(json!({ "checkpoint_id": checkpoint.id }))
}

async fn checkpoint_search(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: CheckpointSearchArgs = param(params)?;
    let hits = state
        .checkpoint
        .search(CheckpointSearchRequest {
            tenant: tenant.clone(),
            query: args.query,
            project_path: args.project_path,
            limit: args.limit,
        })
        .await?;
    let results: Vec<Value> = hits
        .into_iter()
        .map(|hit| {
            json!({
                "checkpoint_id": hit.checkpoint.id,
                "summary": hit.checkpoint.summary,
                "score": hit.score,
            })
        })
        .collect();
    Ok(json!({ "results": results }))
}

async fn checkpoint_list(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: CheckpointListArgs = param(params)?;
    let checkpoints = state
        .checkpoint
        .list(CheckpointListRequest {
            tenant: tenant.clone(),
            session_id: args.session_id,
            project_path: args.project_path,
            auto_only: args.auto_only,
            limit: args.limit,
        })
        .await?;
    let out: Vec<Value> = checkpoints.into_iter().map(|c| checkpoint_json(&c)).collect();
    Ok(json!({ "checkpoints": out }))
}

async fn checkpoint_resume(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: CheckpointResumeArgs = param(params)?;
    let level: ResumeLevel = args.level.parse()?;
    let resumed = state.checkpoint.resume(tenant, &args.id, level).await?;
    Ok(json!({
        "checkpoint_id": resumed.checkpoint.id,
        "content": resumed.content,
        "token_count": resumed.token_count,
    }))
}

async fn checkpoint_get(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: CheckpointGetArgs = param(params)?;
    let checkpoint = state.checkpoint.get(tenant, &args.id).await?;
    Ok(json!({ "checkpoint": checkpoint_json(&checkpoint) }))
}

async fn checkpoint_delete(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: CheckpointDeleteArgs = param(params)?;
    state.checkpoint.delete(tenant, &args.id).await?;
    Ok(json!({ "deleted": true }))
}

fn checkpoint_json(c: &crate::services::checkpoint::Checkpoint) -> Value {
    json!({
        "id": c.id,
        "created_at": c.created_at,
        "updated_at": c.updated_at,
        "session_id": c.session_id,
        "project_path": c.project_path,
        "name": c.name,
        "summary": c.summary,
        "context": c.context,
        "token_count": c.token_count,
        "threshold": c.threshold,
        "auto_created": c.auto_created,
        "metadata": c.metadata,
    })
}

async fn remediation_save(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: RemediationSaveArgs = param(params)?;
    let remediation = state
        .remediation
        .save(RemediationSaveRequest {
            tenant: tenant.clone(),
            error_pattern: args.error_pattern,
            context: args.context,
            root_cause: args.root_cause,
            solution: args.solution,
            diagnostic_steps: args.diagnostic_steps,
            metadata: args.metadata,
        })
        .await?;
    Ok(json!({ "remediation_id": remediation.id }))
}

async fn remediation_search(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: RemediationSearchArgs = param(params)?;
    let hits = state
        .remediation
        .search(RemediationSearchRequest {
            tenant: tenant.clone(),
            query: args.query,
            limit: args.limit,
        })
        .await?;
    let results: Vec<Value> = hits
        .into_iter()
        .map(|(remediation, score)| {
            json!({
                "remediation_id": remediation.id,
                "error_pattern": remediation.error_pattern,
                "score": score,
            })
        })
        .collect();
    Ok(json!({ "results": results }))
}

async fn remediation_list(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: RemediationListArgs = param(params)?;
    let remediations = state.remediation.list(tenant, args.limit).await?;
    let out: Vec<Value> = remediations.iter().map(remediation_json).collect();
    Ok(json!({ "remediations": out }))
}

async fn remediation_get(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: RemediationGetArgs = param(params)?;
    let (remediation, _) = state.remediation.get(tenant, &args.id).await?;
    Ok(json!({ "remediation": remediation_json(&remediation) }))
}

async fn remediation_feedback(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: RemediationFeedbackArgs = param(params)?;
    let remediation = state.remediation.update_feedback(tenant, &args.id, args.success).await?;
    Ok(json!({ "remediation": remediation_json(&remediation) }))
}

async fn remediation_delete(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: RemediationDeleteArgs = param(params)?;
    state.remediation.delete(tenant, &args.id).await?;
    Ok(json!({ "deleted": true }))
}

fn remediation_json(r: &crate::services::remediation::Remediation) -> Value {
    json!({
        "id": r.id,
        "error_pattern": r.error_pattern,
        "context": r.context,
        "root_cause": r.root_cause,
        "solution": r.solution,
        "diagnostic_steps": r.diagnostic_steps,
        "success_rate": r.success_rate,
        "usage_count": r.usage_count,
        "last_used": r.last_used,
    })
}

async fn troubleshoot(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: TroubleshootArgs = param(params)?;
    let session = state
        .troubleshooting
        .diagnose(DiagnoseRequest {
            tenant: tenant.clone(),
            error_message: args.error_message,
            stack_trace: args.stack_trace,
            context: args.context,
            category: args.category,
            tags: args.tags,
            top_k: args.top_k,
        })
        .await?;

    let similar_issues: Vec<Value> = session
        .similar_issues
        .iter()
        .map(|issue| {
            json!({
                "pattern_id": issue.pattern_id,
                "error_pattern": issue.error_pattern,
                "match_score": issue.match_score,
                "confidence": confidence_str(issue.confidence),
            })
        })
        .collect();
    let recommended_actions: Vec<Value> = session
        .recommended_steps
        .iter()
        .map(|action| {
            json!({
                "description": action.description,
                "destructive": action.destructive,
                "safety_notes": action.safety_notes,
            })
        })
        .collect();

    Ok(json!({
        "session_id": session.id,
        "status": session.status,
        "diagnosis": {
            "root_cause": session.root_cause,
            "confidence": confidence_str(session.confidence),
            "affected_resources": session.affected_resources,
            "timeline": session.timeline,
            "outcome": outcome_str(&session.outcome),
        },
        "similar_issues": similar_issues,
        "recommended_actions": recommended_actions,
    }))
}

fn confidence_str(c: crate::services::troubleshooting::Confidence) -> &'static str {
    use crate::services::troubleshooting::Confidence;
    match c {
        Confidence::High => "high",
        Confidence::Medium => "medium",
        Confidence::Low => "low",
    }
}

fn outcome_str(o: &crate::services::troubleshooting::Outcome) -> &'static str {
    use crate::services::troubleshooting::Outcome;
    match o {
        Outcome::Pending => "pending",
        Outcome::Resolved => "resolved",
        Outcome::Unresolved => "unresolved",
    }
}

async fn save_pattern(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: SavePatternArgs = param(params)?;
    let severity: Severity = args.severity.parse()?;
    let category = Category::parse(&args.category);
    let pattern = state
        .troubleshooting
        .save_pattern(
            tenant,
            args.error_pattern,
            args.context,
            args.root_cause,
            args.solution,
            args.diagnostic_steps,
            severity,
            category,
            args.tags,
        )
        .await?;
    Ok(json!({ "pattern_id": pattern.id }))
}

async fn list_patterns(state: &AppState, tenant: &Tenant, params: Value) -> Result<Value> {
    let args: ListPatternsArgs = param(params)?;
    let patterns = state
        .troubleshooting
        .list_patterns(
            tenant,
            args.category.as_deref(),
            args.severity.as_deref(),
            args.min_success_rate,
            args.limit,
        )
        .await?;
    let out: Vec<Value> = patterns
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "error_pattern": p.error_pattern,
                "root_cause": p.root_cause,
                "solution": p.solution,
                "severity": p.severity.to_string(),
                "category": p.category.as_str(),
                "tags": p.tags,
                "success_rate": p.success_rate,
                "usage_count": p.usage_count,
            })
        })
        .collect();
    Ok(json!({ "patterns": out }))
}

fn status(state: &AppState) -> Value {
    json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.uptime_seconds(),
    })
}
