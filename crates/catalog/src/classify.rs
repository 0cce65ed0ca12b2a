use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{name_sort_key, CatalogEntry};

const OPEN_LICENSE_MARKERS: &[&str] = &["site", "school", "enterprise", "unlimited"];
const ORG_WIDE_DEPARTMENTS: &[&str] = &["school operations", "school-wide"];
const ORG_WIDE_DIVISION_MARKERS: &[&str] = &["school-wide", "whole school"];

// ---------------------------------------------------------------------------
// Per-entry classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DivisionFlags {
    pub elementary: bool,
    pub middle: bool,
    pub high: bool,
}

impl DivisionFlags {
    /// Substring match over free-text division; several may hit at once.
    pub fn parse(division: &str) -> Self {
        let d = division.to_lowercase();
        Self {
            elementary: d.contains("elementary") || d.contains("early learning"),
            middle: d.contains("middle"),
            high: d.contains("high"),
        }
    }

    pub fn all(&self) -> bool {
        self.elementary && self.middle && self.high
    }

    pub fn count(&self) -> usize {
        [self.elementary, self.middle, self.high]
            .iter()
            .filter(|b| **b)
            .count()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.elementary {
            out.push("Elementary");
        }
        if self.middle {
            out.push("Middle");
        }
        if self.high {
            out.push("High");
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    OrgCore,
    OpenAccess,
    DepartmentSpecific,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub divisions: DivisionFlags,
    pub org_wide: bool,
    pub tier: Tier,
    /// Grouping key for department-specific entries; `None` when the
    /// department is blank or "N/A" and the entry is not shown.
    pub department: Option<String>,
}

impl Classification {
    /// Division context for display: "Organization-wide", "Elementary, Middle", or "Unassigned".
    pub fn context_label(&self) -> String {
        if self.org_wide {
            "Organization-wide".to_string()
        } else if self.divisions.count() == 0 {
            "Unassigned".to_string()
        } else {
            self.divisions.labels().join(", ")
        }
    }
}

fn has_open_license(entry: &CatalogEntry) -> bool {
    let lt = entry.license_type.to_lowercase();
    OPEN_LICENSE_MARKERS.iter().any(|m| lt.contains(m))
}

fn department_is(entry: &CatalogEntry, names: &[&str]) -> bool {
    let dept = entry.department.trim().to_lowercase();
    names.iter().any(|n| dept == *n)
}

/// Available to every division: open license, organization-level department,
/// organization-level division text, or listed in all three divisions.
pub fn is_org_wide(entry: &CatalogEntry) -> bool {
    let division = entry.division.to_lowercase();
    has_open_license(entry)
        || department_is(entry, ORG_WIDE_DEPARTMENTS)
        || ORG_WIDE_DIVISION_MARKERS.iter().any(|m| division.contains(m))
        || DivisionFlags::parse(&entry.division).all()
}

fn is_open_access(entry: &CatalogEntry) -> bool {
    has_open_license(entry) || department_is(entry, &["school-wide"])
}

fn department_key(entry: &CatalogEntry) -> Option<String> {
    let dept = entry.department.trim();
    if dept.is_empty() || dept.eq_ignore_ascii_case("n/a") {
        None
    } else {
        Some(dept.to_string())
    }
}

fn tier_for(entry: &CatalogEntry, org_bucket: bool) -> Tier {
    if org_bucket && entry.is_org_core {
        Tier::OrgCore
    } else if is_open_access(entry) && (org_bucket || !is_org_wide(entry)) {
        Tier::OpenAccess
    } else {
        Tier::DepartmentSpecific
    }
}

/// Pure, per-entry classification.
pub fn classify_entry(entry: &CatalogEntry) -> Classification {
    let org_wide = is_org_wide(entry);
    Classification {
        divisions: DivisionFlags::parse(&entry.division),
        org_wide,
        tier: tier_for(entry, org_wide),
        department: department_key(entry),
    }
}

// ---------------------------------------------------------------------------
// Bucketing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierView {
    pub core_apps: Vec<CatalogEntry>,
    pub open_access_apps: Vec<CatalogEntry>,
    pub by_department: BTreeMap<String, Vec<CatalogEntry>>,
}

impl TierView {
    pub fn len(&self) -> usize {
        self.core_apps.len()
            + self.open_access_apps.len()
            + self.by_department.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, product_name: &str) -> bool {
        self.core_apps
            .iter()
            .chain(&self.open_access_apps)
            .chain(self.by_department.values().flatten())
            .any(|e| e.product_name == product_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub org_wide: usize,
    pub elementary: usize,
    pub middle: usize,
    pub high: usize,
    pub multi_division: usize,
    /// Active, not organization-wide, and no division matched.
    pub unassigned: usize,
    /// Department-specific entries hidden for lack of a department.
    pub without_department: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedCatalog {
    pub org_wide: TierView,
    pub elementary: TierView,
    pub middle: TierView,
    pub high: TierView,
    pub stats: ClassifyStats,
}

/// Total, input-order-independent ordering: display key first, then
/// progressively finer tie-breakers.
fn entry_order(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    name_sort_key(&a.product_name)
        .cmp(&name_sort_key(&b.product_name))
        .then_with(|| a.product_name.cmp(&b.product_name))
        .then_with(|| a.stable_id.cmp(&b.stable_id))
        .then_with(|| format!("{a:?}").cmp(&format!("{b:?}")))
}

fn build_tier(members: &[&CatalogEntry], org_bucket: bool, stats: &mut ClassifyStats) -> TierView {
    let mut view = TierView::default();
    for entry in members {
        match tier_for(entry, org_bucket) {
            Tier::OrgCore => view.core_apps.push((*entry).clone()),
            Tier::OpenAccess => view.open_access_apps.push((*entry).clone()),
            Tier::DepartmentSpecific => match department_key(entry) {
                Some(dept) => view.by_department.entry(dept).or_default().push((*entry).clone()),
                None => stats.without_department += 1,
            },
        }
    }
    view.core_apps.sort_by(entry_order);
    view.open_access_apps.sort_by(entry_order);
    for list in view.by_department.values_mut() {
        list.sort_by(entry_order);
    }
    view
}

/// Build the presentation structure for a catalog snapshot.
///
/// Inactive entries are counted and dropped. Organization-wide entries land
/// only in `org_wide`; everything else in each division it names.
pub fn classify(entries: &[CatalogEntry]) -> ClassifiedCatalog {
    let mut stats = ClassifyStats {
        total: entries.len(),
        ..ClassifyStats::default()
    };

    let mut org = Vec::new();
    let mut elementary = Vec::new();
    let mut middle = Vec::new();
    let mut high = Vec::new();

    for entry in entries {
        if !entry.active {
            stats.inactive += 1;
            continue;
        }
        stats.active += 1;

        if is_org_wide(entry) {
            org.push(entry);
            continue;
        }

        let flags = DivisionFlags::parse(&entry.division);
        if flags.count() == 0 {
            stats.unassigned += 1;
        }
        if flags.count() > 1 {
            stats.multi_division += 1;
        }
        if flags.elementary {
            elementary.push(entry);
        }
        if flags.middle {
            middle.push(entry);
        }
        if flags.high {
            high.push(entry);
        }
    }

    stats.org_wide = org.len();
    stats.elementary = elementary.len();
    stats.middle = middle.len();
    stats.high = high.len();

    ClassifiedCatalog {
        org_wide: build_tier(&org, true, &mut stats),
        elementary: build_tier(&elementary, false, &mut stats),
        middle: build_tier(&middle, false, &mut stats),
        high: build_tier(&high, false, &mut stats),
        stats,
    }
}
