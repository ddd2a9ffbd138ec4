//! Tool schema declarations for the §6.1 tool set.
//!
//! Grounded on `ToolDefinitions::create_tool` in the pack's
//! `mcb-server/tools/registry.rs`: each tool's JSON schema comes from
//! `schemars::schema_for!` over its args struct rather than being typed out
//! by hand, so the declared schema can never drift from what
//! [`super::dispatch`] actually deserializes.

use super::args::*;
use rmcp::model::Tool;
use rmcp::ErrorData as McpError;
use std::borrow::Cow;
use std::sync::Arc;

/// All tools this server advertises, in the order the `tools/list` response
/// returns them.
pub fn all_tools() -> Result<Vec<Tool>, McpError> {
    Ok(vec![
        create_tool(
            "checkpoint_save",
            "Save a session checkpoint capturing work-in-progress state for later resumption.",
            schemars::schema_for!(CheckpointSaveArgs),
        )?,
        create_tool(
            "checkpoint_search",
            "Semantically search saved checkpoints scoped to a project path.",
            schemars::schema_for!(CheckpointSearchArgs),
        )?,
        create_tool(
            "checkpoint_list",
            "List saved checkpoints, optionally filtered by session or project path.",
            schemars::schema_for!(CheckpointListArgs),
        )?,
        create_tool(
            "checkpoint_resume",
            "Resume a checkpoint at the summary, context, or full detail level.",
            schemars::schema_for!(CheckpointResumeArgs),
        )?,
        create_tool(
            "checkpoint_get",
            "Fetch a single checkpoint by id.",
            schemars::schema_for!(CheckpointGetArgs),
        )?,
        create_tool(
            "checkpoint_delete",
            "Delete a checkpoint by id.",
            schemars::schema_for!(CheckpointDeleteArgs),
        )?,
        create_tool(
            "remediation_save",
            "Save a known error pattern and its remediation.",
            schemars::schema_for!(RemediationSaveArgs),
        )?,
        create_tool(
            "remediation_search",
            "Semantically search saved remediations across the tenant's collection ladder.",
            schemars::schema_for!(RemediationSearchArgs),
        )?,
        create_tool(
            "remediation_list",
            "List saved remediations.",
            schemars::schema_for!(RemediationListArgs),
        )?,
        create_tool(
            "remediation_get",
            "Fetch a single remediation by id.",
            schemars::schema_for!(RemediationGetArgs),
        )?,
        create_tool(
            "remediation_feedback",
            "Record whether a remediation's solution succeeded, updating its running success rate.",
            schemars::schema_for!(RemediationFeedbackArgs),
        )?,
        create_tool(
            "remediation_delete",
            "Delete a remediation by id.",
            schemars::schema_for!(RemediationDeleteArgs),
        )?,
        create_tool(
            "troubleshoot",
            "Run the five-step diagnosis pipeline over an error message and optional stack trace.",
            schemars::schema_for!(TroubleshootArgs),
        )?,
        create_tool(
            "save_pattern",
            "Save a generic troubleshooting pattern into the shared knowledge bank.",
            schemars::schema_for!(SavePatternArgs),
        )?,
        create_tool(
            "list_patterns",
            "List stored troubleshooting patterns, optionally filtered by category, severity, or minimum success rate.",
            schemars::schema_for!(ListPatternsArgs),
        )?,
        create_tool(
            "status",
            "Report daemon health and uptime.",
            schemars::schema_for!(StatusArgs),
        )?,
    ])
}

fn create_tool(
    name: &'static str,
    description: &'static str,
    schema: schemars::Schema,
) -> Result<Tool, McpError> {
    let schema_value =
        serde_json::to_value(schema).map_err(|e| McpError::internal_error(e.to_string(), None))?;
    let input_schema = schema_value
        .as_object()
        .ok_or_else(|| McpError::internal_error(format!("schema for {name} is not an object"), None))?
        .clone();

    Ok(Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(input_schema),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: Default::default(),
    })
}
