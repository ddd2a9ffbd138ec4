//! Tool-call argument shapes for the §6.1 tool set. Each struct derives
//! `JsonSchema` so [`super::registry`] can hand its input schema to callers
//! without maintaining it by hand.

use schemars::JsonSchema;
use serde::Deserialize;

fn default_limit_10() -> usize {
    10
}

fn default_limit_20() -> usize {
    20
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckpointSaveArgs {
    pub session_id: String,
    pub project_path: String,
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub full_state: String,
    pub threshold: Option<usize>,
    #[serde(default)]
    pub auto_created: bool,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckpointSearchArgs {
    pub query: String,
    pub project_path: String,
    #[serde(default = "default_limit_10")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckpointListArgs {
    pub session_id: Option<String>,
    pub project_path: Option<String>,
    #[serde(default)]
    pub auto_only: bool,
    #[serde(default = "default_limit_20")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckpointResumeArgs {
    pub id: String,
    #[serde(default = "default_resume_level")]
    pub level: String,
}

fn default_resume_level() -> String {
    "summary".to_string()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckpointGetArgs {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckpointDeleteArgs {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemediationSaveArgs {
    pub error_pattern: String,
    #[serde(default)]
    pub context: String,
    pub root_cause: String,
    pub solution: String,
    #[serde(default)]
    pub diagnostic_steps: String,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemediationSearchArgs {
    pub query: String,
    #[serde(default = "default_limit_10")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemediationListArgs {
    #[serde(default = "default_limit_20")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemediationGetArgs {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemediationFeedbackArgs {
    pub id: String,
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemediationDeleteArgs {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TroubleshootArgs {
    pub error_message: String,
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub context: std::collections::HashMap<String, String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SavePatternArgs {
    pub error_pattern: String,
    #[serde(default)]
    pub context: String,
    pub root_cause: String,
    pub solution: String,
    #[serde(default)]
    pub diagnostic_steps: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_severity() -> String {
    "medium".to_string()
}

fn default_category() -> String {
    "other".to_string()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListPatternsArgs {
    pub category: Option<String>,
    pub severity: Option<String>,
    pub min_success_rate: Option<f32>,
    #[serde(default = "default_limit_10")]
    pub limit: usize,
}

/// `status` takes no arguments.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct StatusArgs {}
