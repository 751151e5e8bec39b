//! Video statistics per scope.
//!
//! Everything here is a pure function of the records passed in. Stats are
//! computed from raw counts and parent scopes sum child counts, so a district
//! rolled up from its shops equals the district computed from the union of
//! their records.

use std::collections::{BTreeMap, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use shopvid_models::{AggregateStat, ScopeLevel, StatusCounts, VideoRecord, VideoStatus};

/// Scope key of the all-records stat.
pub const OVERALL_SCOPE: &str = "all";

/// Raw counts per scope key. Records whose key is `None` are skipped.
pub fn count_by_scope<F>(records: &[VideoRecord], scope_key: F) -> BTreeMap<String, StatusCounts>
where
    F: Fn(&VideoRecord) -> Option<String>,
{
    let mut counts: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for record in records {
        if let Some(key) = scope_key(record) {
            counts.entry(key).or_default().record(record.classify());
        }
    }
    counts
}

/// Stats per scope key.
pub fn compute_stats<F>(records: &[VideoRecord], scope_key: F) -> BTreeMap<String, AggregateStat>
where
    F: Fn(&VideoRecord) -> Option<String>,
{
    to_stats(count_by_scope(records, scope_key))
}

/// One stat over every record.
pub fn overall_stats(records: &[VideoRecord]) -> AggregateStat {
    let counts = StatusCounts::from_statuses(records.iter().map(VideoRecord::classify));
    AggregateStat::from_counts(OVERALL_SCOPE, counts)
}

/// Sum child-scope counts into their parents.
pub fn rollup<P>(
    children: &BTreeMap<String, StatusCounts>,
    parent_of: P,
) -> BTreeMap<String, StatusCounts>
where
    P: Fn(&str) -> Option<String>,
{
    let mut parents: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for (child, counts) in children {
        if let Some(parent) = parent_of(child) {
            parents.entry(parent).or_default().merge(counts);
        }
    }
    parents
}

pub fn to_stats(counts: BTreeMap<String, StatusCounts>) -> BTreeMap<String, AggregateStat> {
    counts
        .into_iter()
        .map(|(scope, c)| {
            let stat = AggregateStat::from_counts(scope.clone(), c);
            (scope, stat)
        })
        .collect()
}

/// Shop to district to brand membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeHierarchy {
    shop_district: HashMap<String, String>,
    district_brand: HashMap<String, String>,
}

impl ScopeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shop(mut self, shop_id: impl Into<String>, district_id: impl Into<String>) -> Self {
        self.shop_district.insert(shop_id.into(), district_id.into());
        self
    }

    pub fn with_district(
        mut self,
        district_id: impl Into<String>,
        brand_id: impl Into<String>,
    ) -> Self {
        self.district_brand
            .insert(district_id.into(), brand_id.into());
        self
    }

    pub fn district_of(&self, shop_id: &str) -> Option<&str> {
        self.shop_district.get(shop_id).map(String::as_str)
    }

    pub fn brand_of(&self, district_id: &str) -> Option<&str> {
        self.district_brand.get(district_id).map(String::as_str)
    }

    /// Key of a record at the given level.
    ///
    /// Districts and brands are resolved through the hierarchy only, so a
    /// record that no district claims is left out of the district and brand
    /// stats alike. The record's own `brand_id` is not consulted.
    pub fn scope_key(&self, level: ScopeLevel, record: &VideoRecord) -> Option<String> {
        let shop = record.shop_id.as_deref();
        let district = shop.and_then(|s| self.district_of(s));
        match level {
            ScopeLevel::Overall => Some(OVERALL_SCOPE.to_string()),
            ScopeLevel::Shop => shop.map(str::to_string),
            ScopeLevel::District => district.map(str::to_string),
            ScopeLevel::Brand => district.and_then(|d| self.brand_of(d)).map(str::to_string),
        }
    }

    pub fn counts_at(
        &self,
        level: ScopeLevel,
        records: &[VideoRecord],
    ) -> BTreeMap<String, StatusCounts> {
        count_by_scope(records, |r| self.scope_key(level, r))
    }

    /// District counts summed from shop counts.
    pub fn districts_from_shops(
        &self,
        shops: &BTreeMap<String, StatusCounts>,
    ) -> BTreeMap<String, StatusCounts> {
        rollup(shops, |shop| self.district_of(shop).map(str::to_string))
    }

    /// Brand counts summed from district counts.
    pub fn brands_from_districts(
        &self,
        districts: &BTreeMap<String, StatusCounts>,
    ) -> BTreeMap<String, StatusCounts> {
        rollup(districts, |district| self.brand_of(district).map(str::to_string))
    }
}

/// Everything the dashboard cards show, computed in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub overall: AggregateStat,
    pub shops: BTreeMap<String, AggregateStat>,
    pub districts: BTreeMap<String, AggregateStat>,
    pub brands: BTreeMap<String, AggregateStat>,
}

impl DashboardStats {
    pub fn compute(records: &[VideoRecord], hierarchy: &ScopeHierarchy) -> Self {
        let mut overall = StatusCounts::default();
        let mut shops: BTreeMap<String, StatusCounts> = BTreeMap::new();
        let mut districts: BTreeMap<String, StatusCounts> = BTreeMap::new();
        let mut brands: BTreeMap<String, StatusCounts> = BTreeMap::new();

        for record in records {
            let status = record.classify();
            overall.record(status);
            for (level, map) in [
                (ScopeLevel::Shop, &mut shops),
                (ScopeLevel::District, &mut districts),
                (ScopeLevel::Brand, &mut brands),
            ] {
                if let Some(key) = hierarchy.scope_key(level, record) {
                    map.entry(key).or_default().record(status);
                }
            }
        }

        Self {
            overall: AggregateStat::from_counts(OVERALL_SCOPE, overall),
            shops: to_stats(shops),
            districts: to_stats(districts),
            brands: to_stats(brands),
        }
    }
}

/// Newest first. Records without a timestamp go last. Records sharing a
/// timestamp come in no guaranteed order.
pub fn recent_videos(records: &[VideoRecord], limit: usize) -> Vec<&VideoRecord> {
    let mut sorted: Vec<&VideoRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(limit);
    sorted
}

/// Completed videos no operator has reviewed yet.
pub fn awaiting_review(records: &[VideoRecord]) -> Vec<&VideoRecord> {
    records
        .iter()
        .filter(|r| r.classify() == VideoStatus::Completed && !r.is_reviewed())
        .collect()
}
