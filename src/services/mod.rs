//! The three knowledge services (§4.3): Checkpoint, Remediation,
//! Troubleshooting. Each is a CRUD+search state machine over [`Store`](crate::store::Store)
//! sharing the same `(Store, Router)` shape and the same tenant-filter
//! discipline: every write stamps the caller's tenant triple into document
//! metadata, and every read attaches it as a search filter, so isolation
//! holds even when a backend's own isolation mode is `none`.

pub mod checkpoint;
pub mod remediation;
pub mod troubleshooting;

pub use checkpoint::CheckpointService;
pub use remediation::RemediationService;
pub use troubleshooting::TroubleshootingService;

use crate::store::{Filter, FilterTerm};
use crate::tenant::Tenant;
use crate::value::DynValue;
use chrono::Utc;

/// Current unix timestamp in seconds, used for every `created_at`/
/// `updated_at`/`last_used` stamp.
pub(crate) fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// `len(text)/4`, the spec's approximation of token count when the real
/// count is unknown. Deliberately integer (floor) division: the spec's own
/// worked example (`"Fixed auth bug"`, 14 chars) expects `TokenCount == 3`,
/// not the ceiling.
pub(crate) fn approx_token_count(text: &str) -> usize {
    text.chars().count() / 4
}

/// The filter terms every tenant-scoped search and write attaches:
/// `tenant_id`, plus `team_id`/`project_id` when the tenant has them. This
/// is what makes `IsolationMode::Payload` (the production default)
/// actually isolate — the store enforces whatever filter it is given, and
/// this is the filter services are required to give it.
pub(crate) fn tenant_filter_terms(tenant: &Tenant) -> Vec<FilterTerm> {
    let mut terms = vec![FilterTerm {
        field: "tenant_id".to_string(),
        value: DynValue::from(tenant.org_id.clone()),
    }];
    if let Some(team_id) = &tenant.team_id {
        terms.push(FilterTerm {
            field: "team_id".to_string(),
            value: DynValue::from(team_id.clone()),
        });
    }
    if let Some(project_id) = &tenant.project_id {
        terms.push(FilterTerm {
            field: "project_id".to_string(),
            value: DynValue::from(project_id.clone()),
        });
    }
    terms
}

pub(crate) fn tenant_scoped_filter(tenant: &Tenant) -> Filter {
    Filter {
        must: tenant_filter_terms(tenant),
        should: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_token_count_matches_spec_worked_example() {
        assert_eq!(approx_token_count("Fixed auth bug"), 3);
    }

    #[test]
    fn tenant_filter_terms_includes_only_present_fields() {
        let tenant = Tenant {
            org_id: "acme".to_string(),
            team_id: None,
            project_id: None,
        };
        let terms = tenant_filter_terms(&tenant);
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].field, "tenant_id");
    }
}
