use async_trait::async_trait;
use serde::Deserialize;

use super::{like_pattern, parse_stored_timestamp, DatabaseService, Statement};
use crate::errors::AppResult;
use crate::models::Asset;
use crate::repository::{AssetQuery, AssetRepository, Scope, SortKey};
use crate::utils::format_timestamp;

const ASSET_COLUMNS: &str = "id, owner, file, name, description, file_type, file_size, tags, keywords, \
     category, created_at, updated_at, thumbnail, is_public, preview_url, polygon_count, dimensions, version";

#[derive(Debug, Deserialize)]
struct AssetRow {
    id: String,
    owner: Option<String>,
    file: String,
    name: String,
    description: String,
    file_type: String,
    file_size: i64,
    tags: String,
    keywords: String,
    category: Option<String>,
    created_at: String,
    updated_at: String,
    thumbnail: Option<String>,
    is_public: i64,
    preview_url: Option<String>,
    polygon_count: Option<i64>,
    dimensions: Option<String>,
    version: i64,
}

impl TryFrom<AssetRow> for Asset {
    type Error = crate::errors::AppError;

    fn try_from(row: AssetRow) -> AppResult<Self> {
        let dimensions = match row.dimensions.as_deref() {
            Some(text) if !text.is_empty() => Some(serde_json::from_str(text)?),
            _ => None,
        };
        Ok(Asset {
            created_at: parse_stored_timestamp("created_at", &row.created_at)?,
            updated_at: parse_stored_timestamp("updated_at", &row.updated_at)?,
            tags: serde_json::from_str(&row.tags)?,
            dimensions,
            id: row.id,
            owner: row.owner,
            file: row.file,
            name: row.name,
            description: row.description,
            file_type: row.file_type,
            file_size: row.file_size.max(0) as u64,
            keywords: row.keywords,
            category: row.category,
            thumbnail: row.thumbnail,
            is_public: row.is_public != 0,
            preview_url: row.preview_url,
            polygon_count: row.polygon_count,
            version: row.version.max(1) as u32,
        })
    }
}

fn insert_statement(asset: &Asset) -> AppResult<Statement> {
    Ok(Statement::new(format!(
        "INSERT INTO assets ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        ASSET_COLUMNS
    ))
    .bind(asset.id.as_str())
    .bind(asset.owner.clone())
    .bind(asset.file.as_str())
    .bind(asset.name.as_str())
    .bind(asset.description.as_str())
    .bind(asset.file_type.as_str())
    .bind(asset.file_size as i64)
    .bind(serde_json::to_string(&asset.tags)?)
    .bind(asset.keywords.as_str())
    .bind(asset.category.clone())
    .bind(format_timestamp(&asset.created_at))
    .bind(format_timestamp(&asset.updated_at))
    .bind(asset.thumbnail.clone())
    .bind(asset.is_public)
    .bind(asset.preview_url.clone())
    .bind(asset.polygon_count)
    .bind(asset.dimensions.as_ref().map(|d| d.to_string()))
    .bind(i64::from(asset.version)))
}

/// Owner and creation time are fixed at insert and never rewritten.
fn update_statement(asset: &Asset) -> AppResult<Statement> {
    Ok(Statement::new(
        "UPDATE assets SET name = ?, description = ?, file = ?, file_type = ?, file_size = ?, tags = ?, \
         keywords = ?, category = ?, updated_at = ?, thumbnail = ?, is_public = ?, preview_url = ?, \
         polygon_count = ?, dimensions = ?, version = ? WHERE id = ?",
    )
    .bind(asset.name.as_str())
    .bind(asset.description.as_str())
    .bind(asset.file.as_str())
    .bind(asset.file_type.as_str())
    .bind(asset.file_size as i64)
    .bind(serde_json::to_string(&asset.tags)?)
    .bind(asset.keywords.as_str())
    .bind(asset.category.clone())
    .bind(format_timestamp(&asset.updated_at))
    .bind(asset.thumbnail.clone())
    .bind(asset.is_public)
    .bind(asset.preview_url.clone())
    .bind(asset.polygon_count)
    .bind(asset.dimensions.as_ref().map(|d| d.to_string()))
    .bind(i64::from(asset.version))
    .bind(asset.id.as_str()))
}

fn list_statement(query: &AssetQuery) -> Statement {
    let mut statement = Statement::new(format!("SELECT {} FROM assets WHERE 1 = 1", ASSET_COLUMNS));

    match &query.scope {
        Scope::Everything => {}
        Scope::OwnedOrPublic(owner) => {
            statement.push_sql(" AND (is_public = 1 OR owner = ?)");
            statement.push_param(owner.as_str());
        }
        Scope::OwnedBy(owner) => {
            statement.push_sql(" AND owner = ?");
            statement.push_param(owner.as_str());
        }
        Scope::PublicOnly => statement.push_sql(" AND is_public = 1"),
    }

    let filters = &query.filters;
    if let Some(search) = &filters.search {
        statement.push_sql(" AND LOWER(name) LIKE ? ESCAPE '\\'");
        statement.push_param(like_pattern(search));
    }
    if let Some(file_type) = &filters.file_type {
        statement.push_sql(" AND file_type = ?");
        statement.push_param(file_type.as_str());
    }
    if let Some(category) = &filters.category {
        statement.push_sql(" AND category = ?");
        statement.push_param(category.as_str());
    }
    if let Some(is_public) = filters.is_public {
        statement.push_sql(" AND is_public = ?");
        statement.push_param(is_public);
    }
    if let Some(range) = &filters.created {
        statement.push_sql(if range.end_inclusive {
            " AND created_at >= ? AND created_at <= ?"
        } else {
            " AND created_at >= ? AND created_at < ?"
        });
        statement.push_param(format_timestamp(&range.start));
        statement.push_param(format_timestamp(&range.end));
    }
    if !filters.tags.is_empty() {
        let placeholders = vec!["?"; filters.tags.len()].join(", ");
        statement.push_sql(&format!(
            " AND EXISTS (SELECT 1 FROM json_each(assets.tags) WHERE json_each.value IN ({}))",
            placeholders
        ));
        for tag in &filters.tags {
            statement.push_param(tag.as_str());
        }
    }

    let ordering = filters.ordering;
    let column = match ordering.key {
        SortKey::Name => "LOWER(name)",
        key => key.column(),
    };
    let direction = if ordering.descending { "DESC" } else { "ASC" };
    statement.push_sql(&format!(
        " ORDER BY {} {}, created_at DESC, id ASC",
        column, direction
    ));
    statement
}

#[async_trait(?Send)]
impl AssetRepository for DatabaseService {
    async fn insert(&self, asset: &Asset) -> AppResult<()> {
        self.execute(insert_statement(asset)?).await
    }

    async fn update(&self, asset: &Asset) -> AppResult<()> {
        self.execute(update_statement(asset)?).await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.execute(Statement::new("DELETE FROM assets WHERE id = ?").bind(id))
            .await
    }

    async fn get(&self, id: &str) -> AppResult<Option<Asset>> {
        let statement =
            Statement::new(format!("SELECT {} FROM assets WHERE id = ?", ASSET_COLUMNS)).bind(id);
        self.fetch_one::<AssetRow>(statement)
            .await?
            .map(Asset::try_from)
            .transpose()
    }

    async fn list(&self, query: &AssetQuery) -> AppResult<Vec<Asset>> {
        self.fetch_all::<AssetRow>(list_statement(query))
            .await?
            .into_iter()
            .map(Asset::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqlParam;
    use crate::repository::{AssetFilters, DateRange, Ordering};
    use crate::testing::sample_asset;
    use chrono::{TimeZone, Utc};

    fn text(value: &str) -> SqlParam {
        SqlParam::Text(value.to_string())
    }

    #[test]
    fn placeholder_count_matches_params() {
        let mut asset = sample_asset("a1", Some("u1"), false);
        asset.tags = vec!["rock".into()];
        for statement in [insert_statement(&asset).unwrap(), update_statement(&asset).unwrap()] {
            assert_eq!(statement.sql.matches('?').count(), statement.params.len());
        }
        let insert = insert_statement(&asset).unwrap();
        assert_eq!(insert.params[7], text("[\"rock\"]"));
        assert_eq!(insert.params[13], SqlParam::Int(0));
    }

    #[test]
    fn update_never_touches_owner_or_creation_time() {
        let statement = update_statement(&sample_asset("a1", Some("u1"), true)).unwrap();
        assert!(!statement.sql.contains("owner"));
        assert!(!statement.sql.contains("created_at"));
    }

    fn bound_value(statement: &Statement, column: &str) -> SqlParam {
        let assignments = statement
            .sql
            .split(" SET ")
            .nth(1)
            .and_then(|rest| rest.split(" WHERE ").next())
            .unwrap();
        let index = assignments
            .split(", ")
            .position(|assignment| assignment.trim() == format!("{} = ?", column))
            .unwrap_or_else(|| panic!("{} is not written", column));
        statement.params[index].clone()
    }

    #[test]
    fn update_writes_every_field_the_write_path_changes() {
        let mut asset = sample_asset("a1", Some("u1"), true);
        asset.file = "uploads/u1/20240305/image/abc-new.png".into();
        asset.file_size = 4096;
        asset.thumbnail = Some("thumbnails/u1/20240305/image/def-thumb.png".into());
        asset.version = 4;
        asset.updated_at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let statement = update_statement(&asset).unwrap();

        assert_eq!(bound_value(&statement, "file"), text("uploads/u1/20240305/image/abc-new.png"));
        assert_eq!(bound_value(&statement, "file_size"), SqlParam::Int(4096));
        assert_eq!(
            bound_value(&statement, "thumbnail"),
            text("thumbnails/u1/20240305/image/def-thumb.png")
        );
        assert_eq!(bound_value(&statement, "version"), SqlParam::Int(4));
        assert_eq!(
            bound_value(&statement, "updated_at"),
            text(&format_timestamp(&asset.updated_at))
        );
        assert_eq!(statement.params.last(), Some(&text("a1")));
    }

    #[test]
    fn non_admin_listing_is_scoped() {
        let query = AssetQuery::new(Scope::OwnedOrPublic("u1".into()), AssetFilters::default());
        let statement = list_statement(&query);
        assert!(statement.sql.contains("(is_public = 1 OR owner = ?)"));
        assert_eq!(statement.params, vec![text("u1")]);
        assert!(statement
            .sql
            .ends_with("ORDER BY created_at DESC, created_at DESC, id ASC"));
    }

    #[test]
    fn filters_compile_in_order() {
        let filters = AssetFilters {
            search: Some("Ro_ck".into()),
            file_type: Some("model".into()),
            is_public: Some(true),
            created: Some(DateRange {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
                end_inclusive: false,
            }),
            tags: vec!["a".into(), "b".into()],
            ordering: Ordering::parse("name"),
            ..Default::default()
        };
        let statement = list_statement(&AssetQuery::new(Scope::Everything, filters));
        assert_eq!(statement.sql.matches('?').count(), statement.params.len());
        assert_eq!(
            statement.params,
            vec![
                text("%ro\\_ck%"),
                text("model"),
                SqlParam::Int(1),
                text("2024-01-01T00:00:00.000Z"),
                text("2024-02-01T00:00:00.000Z"),
                text("a"),
                text("b"),
            ]
        );
        assert!(statement.sql.contains("created_at < ?"));
        assert!(statement.sql.contains("json_each.value IN (?, ?)"));
        assert!(statement.sql.contains("ORDER BY LOWER(name) ASC"));
    }

    #[test]
    fn row_maps_json_columns() {
        let row = AssetRow {
            id: "a1".into(),
            owner: None,
            file: "uploads/x".into(),
            name: "Rock".into(),
            description: String::new(),
            file_type: "model".into(),
            file_size: 42,
            tags: "[\"stone\",\"grey\"]".into(),
            keywords: String::new(),
            category: Some("props".into()),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-02T00:00:00.000Z".into(),
            thumbnail: None,
            is_public: 1,
            preview_url: None,
            polygon_count: Some(1200),
            dimensions: Some("{\"w\":2}".into()),
            version: 3,
        };
        let asset = Asset::try_from(row).unwrap();
        assert_eq!(asset.tags, vec!["stone", "grey"]);
        assert!(asset.is_public);
        assert_eq!(asset.dimensions, Some(serde_json::json!({"w": 2})));
        assert_eq!(asset.version, 3);
    }
}
