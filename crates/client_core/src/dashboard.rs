use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use indexmap::IndexMap;
use shared::domain::{Case, CaseId, CaseStatus, UserId, NOT_INFORMED};
use tracing::{info, warn};

use crate::{
    case_filter::CaseListFilter,
    error::{CoreError, CoreResult},
    CaseBackend,
};

pub const RECENT_CASES_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RecentCase {
    pub id: CaseId,
    pub case_number: String,
    pub title: String,
    pub status: CaseStatus,
    pub responsible_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub total: usize,
    pub by_status: BTreeMap<CaseStatus, usize>,
    pub by_type: IndexMap<String, usize>,
    pub by_responsible: IndexMap<String, usize>,
    pub recent: Vec<RecentCase>,
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    cases: CaseListFilter,
}

impl Dashboard {
    pub async fn load(backend: &dyn CaseBackend) -> CoreResult<Self> {
        let cases = backend.list_cases().await?;
        let names = resolve_responsible_names(backend, &cases).await;
        info!(cases = cases.len(), responsible = names.len(), "dashboard loaded");
        Ok(Self {
            cases: CaseListFilter::new(cases, names),
        })
    }

    pub fn cases(&self) -> &CaseListFilter {
        &self.cases
    }

    pub fn summary(&self) -> DashboardSummary {
        let recent = self
            .cases
            .recent_first(RECENT_CASES_LIMIT)
            .into_iter()
            .map(|case| RecentCase {
                id: case.id.clone(),
                case_number: case.case_number.clone(),
                title: case.title.clone(),
                status: case.status,
                responsible_name: self.cases.responsible_name(case).to_string(),
                created_at: case.created_at,
            })
            .collect();
        DashboardSummary {
            total: self.cases.len(),
            by_status: self.cases.count_by_status(),
            by_type: self.cases.count_by_type(),
            by_responsible: self.cases.count_by_responsible(),
            recent,
        }
    }
}

/// Looks up every distinct responsible id concurrently. A lookup that fails
/// maps to the "not informed" label instead of failing the whole screen.
pub async fn resolve_responsible_names(
    backend: &dyn CaseBackend,
    cases: &[Case],
) -> HashMap<UserId, String> {
    let mut seen = HashSet::new();
    let ids: Vec<&UserId> = cases
        .iter()
        .filter_map(|case| case.responsible.as_ref())
        .filter(|id| !id.as_str().is_empty() && seen.insert(*id))
        .collect();

    let lookups = ids.iter().map(|id| async move {
        let name = match backend.get_user(id).await {
            Ok(user) => user.username,
            Err(CoreError::NotFound(_)) => NOT_INFORMED.to_string(),
            Err(err) => {
                warn!(user_id = %id, error = %err, "responsible lookup failed");
                NOT_INFORMED.to_string()
            }
        };
        ((*id).clone(), name)
    });

    join_all(lookups).await.into_iter().collect()
}

#[cfg(test)]
#[path = "tests/dashboard_tests.rs"]
mod tests;
