use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{like_pattern, parse_stored_timestamp, DatabaseService, Statement};
use crate::audit::{AuditLog, AuditPage, AuditQuery};
use crate::errors::{AppError, AppResult};
use crate::models::{AuditEntry, EntityRef, NewAuditEntry};
use crate::utils::{format_timestamp, generate_id};

const ACTIVITY_COLUMNS: &str =
    "id, actor_id, actor_name, action, description, origin_address, entity_kind, entity_id, created_at";

#[derive(Debug, Deserialize)]
struct ActivityRow {
    id: String,
    actor_id: String,
    actor_name: String,
    action: String,
    description: String,
    origin_address: Option<String>,
    entity_kind: Option<String>,
    entity_id: Option<String>,
    created_at: String,
}

impl TryFrom<ActivityRow> for AuditEntry {
    type Error = AppError;

    fn try_from(row: ActivityRow) -> AppResult<Self> {
        let entity = match (row.entity_kind, row.entity_id) {
            (Some(kind), Some(id)) => Some(EntityRef { kind, id }),
            _ => None,
        };
        Ok(AuditEntry {
            action: row.action.parse().map_err(AppError::internal)?,
            created_at: parse_stored_timestamp("created_at", &row.created_at)?,
            id: row.id,
            actor_id: row.actor_id,
            actor_name: row.actor_name,
            description: row.description,
            origin_address: row.origin_address,
            entity,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LatestRow {
    latest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

/// An actor's entries must never go backwards in time, even across clock skew
/// between isolates.
fn clamp_timestamp(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    latest.map_or(now, |latest| latest.max(now))
}

fn insert_statement(entry: &NewAuditEntry, id: &str, created_at: &DateTime<Utc>) -> Statement {
    Statement::new(format!(
        "INSERT INTO activity_log ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        ACTIVITY_COLUMNS
    ))
    .bind(id)
    .bind(entry.actor_id.as_str())
    .bind(entry.actor_name.as_str())
    .bind(entry.action.as_str())
    .bind(entry.description.as_str())
    .bind(entry.origin_address.clone())
    .bind(entry.entity.as_ref().map(|e| e.kind.clone()))
    .bind(entry.entity.as_ref().map(|e| e.id.clone()))
    .bind(format_timestamp(created_at))
}

/// WHERE clause shared by the count and the page query.
fn filter_clause(query: &AuditQuery) -> Statement {
    let mut clause = Statement::new(" WHERE 1 = 1");
    if let Some(action) = query.action {
        clause.push_sql(" AND action = ?");
        clause.push_param(action.as_str());
    }
    if let Some(actor) = &query.actor {
        clause.push_sql(" AND (actor_id = ? OR actor_name = ?)");
        clause.push_param(actor.as_str());
        clause.push_param(actor.as_str());
    }
    if let Some(start) = &query.start {
        clause.push_sql(" AND created_at >= ?");
        clause.push_param(format_timestamp(start));
    }
    if let Some(end) = &query.end {
        clause.push_sql(if query.end_inclusive {
            " AND created_at <= ?"
        } else {
            " AND created_at < ?"
        });
        clause.push_param(format_timestamp(end));
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        clause.push_sql(
            " AND (LOWER(description) LIKE ? ESCAPE '\\' OR LOWER(actor_name) LIKE ? ESCAPE '\\')",
        );
        clause.push_param(pattern.clone());
        clause.push_param(pattern);
    }
    clause
}

fn count_statement(query: &AuditQuery) -> Statement {
    let clause = filter_clause(query);
    Statement {
        sql: format!("SELECT COUNT(*) AS count FROM activity_log{}", clause.sql),
        params: clause.params,
    }
}

fn page_statement(query: &AuditQuery) -> Statement {
    let clause = filter_clause(query);
    let direction = if query.oldest_first { "ASC" } else { "DESC" };
    let mut statement = Statement {
        sql: format!(
            "SELECT {} FROM activity_log{} ORDER BY created_at {}, rowid {} LIMIT ? OFFSET ?",
            ACTIVITY_COLUMNS, clause.sql, direction, direction
        ),
        params: clause.params,
    };
    statement.push_param(i64::from(query.page_size));
    statement.push_param(query.offset() as i64);
    statement
}

#[async_trait(?Send)]
impl AuditLog for DatabaseService {
    async fn append(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        let latest = self
            .fetch_one::<LatestRow>(
                Statement::new("SELECT MAX(created_at) AS latest FROM activity_log WHERE actor_id = ?")
                    .bind(entry.actor_id.as_str()),
            )
            .await?
            .and_then(|row| row.latest)
            .map(|raw| parse_stored_timestamp("created_at", &raw))
            .transpose()?;

        let id = generate_id();
        let created_at = clamp_timestamp(Utc::now(), latest);
        self.execute(insert_statement(&entry, &id, &created_at)).await?;

        Ok(AuditEntry {
            id,
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            action: entry.action,
            description: entry.description,
            origin_address: entry.origin_address,
            entity: entry.entity,
            created_at,
        })
    }

    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        let count = self
            .fetch_one::<CountRow>(count_statement(query))
            .await?
            .map_or(0, |row| row.count.max(0) as u64);
        let results = self
            .fetch_all::<ActivityRow>(page_statement(query))
            .await?
            .into_iter()
            .map(AuditEntry::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(AuditPage {
            count,
            page: query.page,
            page_size: query.page_size,
            results,
        })
    }
}
