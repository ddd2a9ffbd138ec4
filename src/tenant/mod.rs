//! Multi-tenant collection routing and fail-closed isolation.
//!
//! Every tenant-scoped operation resolves its collection name through this
//! router rather than building the name inline, so naming rules and
//! validation live in exactly one place. The router is pure and stateless:
//! it holds no connections and is safe to share across tasks.

use crate::error::{ContextdError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_IDENT_LEN: usize = 64;

/// The isolation slice a collection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Org,
    Team,
    Project,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Org => write!(f, "org"),
            Scope::Team => write!(f, "team"),
            Scope::Project => write!(f, "project"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = ContextdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "org" => Ok(Scope::Org),
            "team" => Ok(Scope::Team),
            "project" => Ok(Scope::Project),
            other => Err(ContextdError::InvalidInput(format!(
                "unknown scope '{other}'"
            ))),
        }
    }
}

/// The enumerated set of entity kinds a collection may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Memories,
    Remediations,
    Checkpoints,
    Policies,
    Skills,
    Agents,
    Sessions,
    Codebase,
    Standards,
    RepoStandards,
    AntiPatterns,
    Feedback,
    TroubleshootingKnowledge,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Memories => "memories",
            Kind::Remediations => "remediations",
            Kind::Checkpoints => "checkpoints",
            Kind::Policies => "policies",
            Kind::Skills => "skills",
            Kind::Agents => "agents",
            Kind::Sessions => "sessions",
            Kind::Codebase => "codebase",
            Kind::Standards => "standards",
            Kind::RepoStandards => "repo_standards",
            Kind::AntiPatterns => "anti_patterns",
            Kind::Feedback => "feedback",
            Kind::TroubleshootingKnowledge => "troubleshooting_knowledge",
        }
    }
}

/// The authenticated tenant triple. Every non-empty field is validated
/// against `[a-zA-Z0-9_-]+`, max 64 chars, lowercased for comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub org_id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn validate_ident(name: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(ContextdError::InvalidInput(format!("{name} must not be empty")));
    }
    if value.len() > MAX_IDENT_LEN {
        return Err(ContextdError::InvalidInput(format!(
            "{name} exceeds {MAX_IDENT_LEN} characters"
        )));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ContextdError::InvalidInput(format!(
            "{name} must match [a-zA-Z0-9_-]+"
        )));
    }
    Ok(value.to_lowercase())
}

/// Stateless router computing collection names and search fan-out from a
/// scope/kind/tenant triple. Safe for concurrent use; holds no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct Router;

impl Router {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the single collection name a write at `scope` targets.
    pub fn collection_name(
        &self,
        scope: Scope,
        kind: Kind,
        tenant: &Tenant,
    ) -> Result<String> {
        let kind = kind.as_str();
        match scope {
            Scope::Org => {
                validate_ident("org_id", &tenant.org_id)?;
                Ok(format!("org_{kind}"))
            }
            Scope::Team => {
                let team_id = tenant
                    .team_id
                    .as_deref()
                    .ok_or_else(|| ContextdError::InvalidInput("team_id is required for scope=team".into()))?;
                let team_id = validate_ident("team_id", team_id)?;
                Ok(format!("{team_id}_{kind}"))
            }
            Scope::Project => {
                let team_id = tenant
                    .team_id
                    .as_deref()
                    .ok_or_else(|| ContextdError::InvalidInput("team_id is required for scope=project".into()))?;
                let project_id = tenant
                    .project_id
                    .as_deref()
                    .ok_or_else(|| ContextdError::InvalidInput("project_id is required for scope=project".into()))?;
                let team_id = validate_ident("team_id", team_id)?;
                let project_id = validate_ident("project_id", project_id)?;
                Ok(format!("{team_id}_{project_id}_{kind}"))
            }
        }
    }

    /// Ordered set of collections a read at `scope` searches, most-specific
    /// first: `project -> team -> org`.
    pub fn search_collections(
        &self,
        scope: Scope,
        kind: Kind,
        tenant: &Tenant,
    ) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(3);
        if scope == Scope::Project {
            names.push(self.collection_name(Scope::Project, kind, tenant)?);
        }
        if scope == Scope::Project || scope == Scope::Team {
            if tenant.team_id.is_some() {
                names.push(self.collection_name(Scope::Team, kind, tenant)?);
            }
        }
        names.push(self.collection_name(Scope::Org, kind, tenant)?);
        Ok(names)
    }

    /// Confirm `collection` is one this tenant is entitled to read or write,
    /// i.e. it equals one of the names the tenant's own triple would
    /// resolve to at any scope. Used as a defence-in-depth check before
    /// trusting a caller-supplied collection name.
    pub fn validate_access(&self, tenant: &Tenant, collection: &str) -> Result<()> {
        for kind in ALL_KINDS {
            if self.collection_name(Scope::Org, kind, tenant).ok().as_deref() == Some(collection) {
                return Ok(());
            }
            if tenant.team_id.is_some()
                && self.collection_name(Scope::Team, kind, tenant).ok().as_deref() == Some(collection)
            {
                return Ok(());
            }
            if tenant.team_id.is_some()
                && tenant.project_id.is_some()
                && self.collection_name(Scope::Project, kind, tenant).ok().as_deref() == Some(collection)
            {
                return Ok(());
            }
        }
        Err(ContextdError::Forbidden(format!(
            "tenant is not entitled to collection '{collection}'"
        )))
    }
}

const ALL_KINDS: [Kind; 13] = [
    Kind::Memories,
    Kind::Remediations,
    Kind::Checkpoints,
    Kind::Policies,
    Kind::Skills,
    Kind::Agents,
    Kind::Sessions,
    Kind::Codebase,
    Kind::Standards,
    Kind::RepoStandards,
    Kind::AntiPatterns,
    Kind::Feedback,
    Kind::TroubleshootingKnowledge,
];

/// `(ownerID, collectionName)` parsed out of a
/// `collection://owner_<hex>/project_<hex>/<branch>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionUri {
    pub owner_id: String,
    pub collection_path: String,
}

const URI_SCHEME: &str = "collection://";

/// Parse a collection URI, rejecting malformed schemes, empty segments, or
/// a missing `owner_` prefix.
pub fn parse_collection_uri(uri: &str) -> Result<CollectionUri> {
    let rest = uri
        .strip_prefix(URI_SCHEME)
        .ok_or_else(|| ContextdError::InvalidInput(format!("malformed collection URI: {uri}")))?;

    let mut segments = rest.split('/');
    let owner_segment = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ContextdError::InvalidInput("collection URI missing owner segment".into()))?;

    let owner_id = owner_segment
        .strip_prefix("owner_")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ContextdError::InvalidInput("collection URI owner segment missing 'owner_' prefix".into())
        })?
        .to_string();

    let remainder: Vec<&str> = segments.collect();
    if remainder.is_empty() || remainder.iter().any(|s| s.is_empty()) {
        return Err(ContextdError::InvalidInput(
            "collection URI has empty path segments".into(),
        ));
    }

    Ok(CollectionUri {
        owner_id,
        collection_path: format!("{owner_segment}/{}", remainder.join("/")),
    })
}

/// Rebuild the URI form of a parsed `CollectionUri`. Round-trips with
/// `parse_collection_uri`.
pub fn build_collection_uri(parsed: &CollectionUri) -> String {
    format!("{URI_SCHEME}{}", parsed.collection_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(org: &str, team: Option<&str>, project: Option<&str>) -> Tenant {
        Tenant {
            org_id: org.to_string(),
            team_id: team.map(|s| s.to_string()),
            project_id: project.map(|s| s.to_string()),
        }
    }

    #[test]
    fn org_scope_name() {
        let r = Router::new();
        let t = tenant("acme", None, None);
        assert_eq!(
            r.collection_name(Scope::Org, Kind::Checkpoints, &t).unwrap(),
            "org_checkpoints"
        );
    }

    #[test]
    fn team_scope_requires_team_id() {
        let r = Router::new();
        let t = tenant("acme", None, None);
        assert!(r.collection_name(Scope::Team, Kind::Checkpoints, &t).is_err());
    }

    #[test]
    fn team_scope_name() {
        let r = Router::new();
        let t = tenant("acme", Some("core"), None);
        assert_eq!(
            r.collection_name(Scope::Team, Kind::Checkpoints, &t).unwrap(),
            "core_checkpoints"
        );
    }

    #[test]
    fn project_scope_requires_both_fields() {
        let r = Router::new();
        let t = tenant("acme", Some("core"), None);
        assert!(r
            .collection_name(Scope::Project, Kind::Checkpoints, &t)
            .is_err());
    }

    #[test]
    fn project_scope_name() {
        let r = Router::new();
        let t = tenant("acme", Some("core"), Some("widget"));
        assert_eq!(
            r.collection_name(Scope::Project, Kind::Checkpoints, &t)
                .unwrap(),
            "core_widget_checkpoints"
        );
    }

    #[test]
    fn unknown_scope_rejected() {
        assert!("galaxy".parse::<Scope>().is_err());
    }

    #[test]
    fn identifiers_are_lowercased() {
        let r = Router::new();
        let t = tenant("ACME", None, None);
        assert_eq!(
            r.collection_name(Scope::Org, Kind::Checkpoints, &t).unwrap(),
            "org_checkpoints"
        );
    }

    #[test]
    fn invariant_1_collection_name_round_trips_through_search_collections() {
        let r = Router::new();
        let t = tenant("acme", Some("core"), Some("widget"));
        let name = r
            .collection_name(Scope::Project, Kind::Checkpoints, &t)
            .unwrap();
        let searched = r
            .search_collections(Scope::Project, Kind::Checkpoints, &t)
            .unwrap();
        assert_eq!(searched[0], name);
    }

    #[test]
    fn search_collections_order_is_project_team_org() {
        let r = Router::new();
        let t = tenant("acme", Some("core"), Some("widget"));
        let names = r
            .search_collections(Scope::Project, Kind::Checkpoints, &t)
            .unwrap();
        assert_eq!(
            names,
            vec![
                "core_widget_checkpoints".to_string(),
                "core_checkpoints".to_string(),
                "org_checkpoints".to_string(),
            ]
        );
    }

    #[test]
    fn validate_access_accepts_own_collection() {
        let r = Router::new();
        let t = tenant("acme", Some("core"), Some("widget"));
        let name = r
            .collection_name(Scope::Project, Kind::Checkpoints, &t)
            .unwrap();
        assert!(r.validate_access(&t, &name).is_ok());
    }

    #[test]
    fn validate_access_rejects_foreign_collection() {
        let r = Router::new();
        let t = tenant("acme", Some("core"), Some("widget"));
        assert!(r.validate_access(&t, "someone_else_checkpoints").is_err());
    }

    #[test]
    fn collection_uri_round_trips() {
        let parsed = parse_collection_uri("collection://owner_abc123/project_def456/main").unwrap();
        assert_eq!(parsed.owner_id, "abc123");
        assert_eq!(parsed.collection_path, "owner_abc123/project_def456/main");
        assert_eq!(
            build_collection_uri(&parsed),
            "collection://owner_abc123/project_def456/main"
        );
    }

    #[test]
    fn collection_uri_rejects_bad_scheme() {
        assert!(parse_collection_uri("http://owner_abc/x").is_err());
    }

    #[test]
    fn collection_uri_rejects_missing_owner_prefix() {
        assert!(parse_collection_uri("collection://abc123/project_def456").is_err());
    }

    #[test]
    fn collection_uri_rejects_empty_segments() {
        assert!(parse_collection_uri("collection://owner_abc//main").is_err());
    }
}
