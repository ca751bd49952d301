use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use shared::domain::{Case, CaseStatus, UnknownStatus, UserId, NOT_INFORMED};

/// Sentinel accepted by the list pickers for "no restriction".
pub const ALL_SENTINELS: [&str; 2] = ["all", "todos"];

fn is_all_sentinel(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || ALL_SENTINELS.iter().any(|s| raw.eq_ignore_ascii_case(s))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(CaseStatus),
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Result<Self, UnknownStatus> {
        if is_all_sentinel(raw) {
            return Ok(StatusFilter::All);
        }
        CaseStatus::parse(raw).map(StatusFilter::Only)
    }

    pub fn matches(&self, status: CaseStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Only(String),
}

impl TypeFilter {
    pub fn parse(raw: &str) -> Self {
        if is_all_sentinel(raw) {
            TypeFilter::All
        } else {
            TypeFilter::Only(raw.to_string())
        }
    }

    pub fn matches(&self, case_type: &str) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(wanted) => wanted == case_type,
        }
    }
}

/// Conjunction of the three list filters.
#[derive(Debug, Clone, Default)]
pub struct CaseQuery {
    needle: String,
    status: StatusFilter,
    case_type: TypeFilter,
}

impl CaseQuery {
    pub fn new(search: &str, status: StatusFilter, case_type: TypeFilter) -> Self {
        Self {
            needle: search.to_lowercase(),
            status,
            case_type,
        }
    }

    pub fn matches(&self, case: &Case) -> bool {
        let search_hit = self.needle.is_empty()
            || case.title.to_lowercase().contains(&self.needle)
            || case.case_number.to_lowercase().contains(&self.needle);
        search_hit && self.status.matches(case.status) && self.case_type.matches(case.case_type())
    }
}

/// Derived views over one immutable snapshot of cases.
#[derive(Debug, Clone, Default)]
pub struct CaseListFilter {
    cases: Vec<Case>,
    names: HashMap<UserId, String>,
}

impl CaseListFilter {
    pub fn new(cases: Vec<Case>, names: HashMap<UserId, String>) -> Self {
        Self { cases, names }
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Display name of the case's responsible party, or the
    /// "not informed" sentinel.
    pub fn responsible_name(&self, case: &Case) -> &str {
        case.responsible
            .as_ref()
            .and_then(|id| self.names.get(id))
            .map(String::as_str)
            .unwrap_or(NOT_INFORMED)
    }

    /// Lazily yields matching cases in snapshot order.
    pub fn filter(
        &self,
        search: &str,
        status: StatusFilter,
        case_type: TypeFilter,
    ) -> impl Iterator<Item = &Case> + '_ {
        let query = CaseQuery::new(search, status, case_type);
        self.cases.iter().filter(move |case| query.matches(case))
    }

    pub fn count_by_status(&self) -> BTreeMap<CaseStatus, usize> {
        count_by_status(&self.cases)
    }

    pub fn count_by_type(&self) -> IndexMap<String, usize> {
        count_by_type(&self.cases)
    }

    /// Keyed by display name in first-seen order.
    pub fn count_by_responsible(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for case in &self.cases {
            *counts
                .entry(self.responsible_name(case).to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    /// Newest `created_at` first; equal timestamps fall back to id order.
    pub fn recent_first(&self, limit: usize) -> Vec<&Case> {
        let mut sorted: Vec<&Case> = self.cases.iter().collect();
        sorted.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        sorted.truncate(limit);
        sorted
    }
}

/// Every status is present in the result, zero counts included.
pub fn count_by_status<'a>(cases: impl IntoIterator<Item = &'a Case>) -> BTreeMap<CaseStatus, usize> {
    let mut counts: BTreeMap<CaseStatus, usize> =
        CaseStatus::ALL.iter().map(|status| (*status, 0)).collect();
    for case in cases {
        *counts.entry(case.status).or_default() += 1;
    }
    counts
}

/// Keyed by case type in first-seen order.
pub fn count_by_type<'a>(cases: impl IntoIterator<Item = &'a Case>) -> IndexMap<String, usize> {
    let mut counts = IndexMap::new();
    for case in cases {
        *counts.entry(case.case_type().to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
#[path = "tests/case_filter_tests.rs"]
mod tests;
