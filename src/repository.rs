//! # Asset Repository
//!
//! Storage seam for asset records plus the listing model every backend must
//! honour. [`AssetQuery::matches`] and [`AssetQuery::sort`] are the reference
//! semantics; the D1 adapter compiles the same query to SQL.
//!
//! ## Visibility partition
//!
//! - Admin: every row
//! - Anyone else: rows they own, plus rows marked public
//!
//! ## Filters (combined with AND)
//!
//! - `search`: case-insensitive substring of the name
//! - `file_type`, `category`: exact match
//! - `is_public`: exact match
//! - `date_from` + `date_to`: inclusive creation range, only applied when both
//!   bounds parse
//! - `tags`: non-empty overlap with the asset's tags

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppResult;
use crate::models::{Asset, Caller};
use crate::normalizer::{coerce_bool, normalize_list, RawPayload, RawValue};
use crate::utils::{parse_date_bound, BoundKind};

#[async_trait(?Send)]
pub trait AssetRepository {
    async fn insert(&self, asset: &Asset) -> AppResult<()>;
    async fn update(&self, asset: &Asset) -> AppResult<()>;
    async fn delete(&self, id: &str) -> AppResult<()>;
    async fn get(&self, id: &str) -> AppResult<Option<Asset>>;
    async fn list(&self, query: &AssetQuery) -> AppResult<Vec<Asset>>;
}

/// Which rows a listing may draw from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Everything,
    OwnedOrPublic(String),
    OwnedBy(String),
    PublicOnly,
}

impl Scope {
    pub fn for_caller(caller: &Caller) -> Self {
        if caller.is_admin() {
            Scope::Everything
        } else {
            Scope::OwnedOrPublic(caller.id.clone())
        }
    }

    pub fn admits(&self, asset: &Asset) -> bool {
        let owned_by = |id: &str| asset.owner.as_deref() == Some(id);
        match self {
            Scope::Everything => true,
            Scope::OwnedOrPublic(id) => asset.is_public || owned_by(id),
            Scope::OwnedBy(id) => owned_by(id),
            Scope::PublicOnly => asset.is_public,
        }
    }
}

/// An instant range. The start is always inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub end_inclusive: bool,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start
            && if self.end_inclusive {
                instant <= self.end
            } else {
                instant < self.end
            }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    FileSize,
}

impl SortKey {
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::UpdatedAt => "updated_at",
            SortKey::Name => "name",
            SortKey::FileSize => "file_size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub key: SortKey,
    pub descending: bool,
}

impl Default for Ordering {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            descending: true,
        }
    }
}

impl Ordering {
    /// Parses `field` or `-field`; anything unknown yields newest-first.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (descending, field) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let key = match field {
            "created_at" => SortKey::CreatedAt,
            "updated_at" => SortKey::UpdatedAt,
            "name" => SortKey::Name,
            "file_size" => SortKey::FileSize,
            _ => return Self::default(),
        };
        Self { key, descending }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetFilters {
    pub search: Option<String>,
    pub file_type: Option<String>,
    pub category: Option<String>,
    pub is_public: Option<bool>,
    pub created: Option<DateRange>,
    pub tags: Vec<String>,
    pub ordering: Ordering,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl AssetFilters {
    /// Reads filters from query-string pairs. Malformed values are dropped
    /// rather than rejected.
    pub fn from_params(params: &[(String, String)]) -> Self {
        let last = |key: &str| {
            params
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let mut tag_payload = RawPayload::new();
        for (key, value) in params {
            if key == "tags" || key == "tags[]" {
                tag_payload.push(key.clone(), RawValue::Text(value.clone()));
            }
        }

        let created = match (
            last("date_from").and_then(|v| parse_date_bound(v, BoundKind::Start)),
            last("date_to").and_then(|v| parse_date_bound(v, BoundKind::End)),
        ) {
            (Some((start, _)), Some((end, end_inclusive))) => Some(DateRange {
                start,
                end,
                end_inclusive,
            }),
            _ => None,
        };

        Self {
            search: non_empty(last("search")),
            file_type: non_empty(last("file_type")),
            category: non_empty(last("category")),
            is_public: non_empty(last("is_public"))
                .map(|v| coerce_bool(Some(&RawValue::Text(v)), false)),
            created,
            tags: normalize_list(&tag_payload, "tags"),
            ordering: last("ordering").map(Ordering::parse).unwrap_or_default(),
        }
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        if let Some(search) = &self.search {
            if !asset.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        if let Some(file_type) = &self.file_type {
            if &asset.file_type != file_type {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if asset.category.as_ref() != Some(category) {
                return false;
            }
        }
        if let Some(is_public) = self.is_public {
            if asset.is_public != is_public {
                return false;
            }
        }
        if let Some(range) = &self.created {
            if !range.contains(asset.created_at) {
                return false;
            }
        }
        if !self.tags.is_empty() && !asset.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetQuery {
    pub scope: Scope,
    pub filters: AssetFilters,
}

impl AssetQuery {
    pub fn new(scope: Scope, filters: AssetFilters) -> Self {
        Self { scope, filters }
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        self.scope.admits(asset) && self.filters.matches(asset)
    }

    /// Orders `assets` in place. Ties fall back to newest first, then id.
    pub fn sort(&self, assets: &mut [Asset]) {
        let ordering = self.filters.ordering;
        assets.sort_by(|a, b| {
            let primary = match ordering.key {
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortKey::FileSize => a.file_size.cmp(&b.file_size),
            };
            let primary = if ordering.descending { primary.reverse() } else { primary };
            primary
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::testing::sample_asset;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn non_admin_partition_excludes_foreign_private_rows() {
        let viewer = Caller {
            id: "v".into(),
            username: "v".into(),
            role: Role::Viewer,
        };
        let scope = Scope::for_caller(&viewer);
        assert!(scope.admits(&sample_asset("1", Some("v"), false)));
        assert!(scope.admits(&sample_asset("2", Some("x"), true)));
        assert!(!scope.admits(&sample_asset("3", Some("x"), false)));
        assert!(!scope.admits(&sample_asset("4", None, false)));
    }

    #[test]
    fn admin_partition_sees_everything() {
        let admin = Caller {
            id: "a".into(),
            username: "a".into(),
            role: Role::Admin,
        };
        assert!(Scope::for_caller(&admin).admits(&sample_asset("3", Some("x"), false)));
    }

    #[test]
    fn malformed_date_from_drops_the_whole_range() {
        let filters = AssetFilters::from_params(&params(&[("date_from", "last tuesday"), ("date_to", "2024-05-01")]));
        assert_eq!(filters.created, None);
    }

    #[test]
    fn single_date_bound_is_ignored() {
        let filters = AssetFilters::from_params(&params(&[("date_to", "2024-05-01")]));
        assert_eq!(filters.created, None);
    }

    #[test]
    fn date_only_range_is_inclusive_of_whole_end_day() {
        let filters = AssetFilters::from_params(&params(&[("date_from", "2024-05-01"), ("date_to", "2024-05-02")]));
        let range = filters.created.unwrap();
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 5, 2, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 59).unwrap()));
    }

    #[test]
    fn tags_filter_matches_on_overlap() {
        let filters = AssetFilters::from_params(&params(&[("tags", "chair, wood")]));
        let mut asset = sample_asset("1", Some("o"), true);
        asset.tags = vec!["wood".into(), "oak".into()];
        assert!(filters.matches(&asset));
        asset.tags = vec!["metal".into()];
        assert!(!filters.matches(&asset));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let filters = AssetFilters::from_params(&params(&[("search", "CHAIR")]));
        let mut asset = sample_asset("1", Some("o"), true);
        asset.name = "Office chair v2".into();
        assert!(filters.matches(&asset));
        asset.name = "Table".into();
        assert!(!filters.matches(&asset));
    }

    #[test]
    fn default_ordering_is_newest_first() {
        let mut older = sample_asset("old", Some("o"), true);
        older.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newer = sample_asset("new", Some("o"), true);
        newer.created_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut rows = vec![older, newer];
        AssetQuery::new(Scope::Everything, AssetFilters::default()).sort(&mut rows);
        assert_eq!(rows[0].id, "new");
    }

    #[test]
    fn ordering_parses_direction_and_rejects_unknown_fields() {
        assert_eq!(Ordering::parse("name"), Ordering { key: SortKey::Name, descending: false });
        assert_eq!(Ordering::parse("-file_size"), Ordering { key: SortKey::FileSize, descending: true });
        assert_eq!(Ordering::parse("password"), Ordering::default());
    }
}
