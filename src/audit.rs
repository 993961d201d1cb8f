//! # Audit Log
//!
//! Append-only record of user actions. The trait exposes no update or delete
//! operation; entries are write-once.
//!
//! Writes go through [`record`], which retries once and then reports the lost
//! entry to the operator log. An audit failure never fails the request that
//! triggered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppResult;
use crate::log_data;
use crate::logging::Logger;
use crate::models::{ActionKind, AuditEntry, NewAuditEntry};
use crate::utils::{parse_date_bound, BoundKind};

#[async_trait(?Send)]
pub trait AuditLog {
    /// Persists `entry`, assigning its id and creation timestamp.
    async fn append(&self, entry: NewAuditEntry) -> AppResult<AuditEntry>;

    /// Returns one page of matching entries plus the total match count.
    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub action: Option<ActionKind>,
    /// Matches the actor's id or display name exactly.
    pub actor: Option<String>,
    pub start: Option<DateTime<Utc>>,
    /// Exclusive when `end_inclusive` is false.
    pub end: Option<DateTime<Utc>>,
    pub end_inclusive: bool,
    /// Case-insensitive substring of the description or actor name.
    pub search: Option<String>,
    pub oldest_first: bool,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

impl AuditQuery {
    /// Reads a query from query-string pairs. Unknown action types and
    /// malformed dates are ignored, each date bound independently.
    pub fn from_params(params: &[(String, String)], page_size: impl Fn(Option<u32>) -> u32) -> Self {
        let last = |key: &str| {
            params
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
        };

        let end = last("end_date").and_then(|v| parse_date_bound(v, BoundKind::End));

        Self {
            action: last("action_type").and_then(|v| v.parse().ok()),
            actor: last("actor")
                .or_else(|| last("username"))
                .map(str::to_string),
            start: last("start_date")
                .and_then(|v| parse_date_bound(v, BoundKind::Start))
                .map(|(start, _)| start),
            end: end.map(|(end, _)| end),
            end_inclusive: end.map(|(_, inclusive)| inclusive).unwrap_or(true),
            search: last("search").map(str::to_string),
            oldest_first: last("ordering") == Some("timestamp"),
            page: last("page").and_then(|v| v.parse().ok()).filter(|p| *p > 0).unwrap_or(1),
            page_size: page_size(last("page_size").and_then(|v| v.parse().ok())),
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            if &entry.actor_id != actor && &entry.actor_name != actor {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            let within = if self.end_inclusive {
                entry.created_at <= end
            } else {
                entry.created_at < end
            };
            if !within {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !entry.description.to_lowercase().contains(&needle)
                && !entry.actor_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPage {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<AuditEntry>,
}

/// Appends `entry`, retrying once. On a second failure the entry is written
/// to the operator log at ERROR and `None` is returned.
pub async fn record(log: &dyn AuditLog, logger: &Logger, entry: NewAuditEntry) -> Option<AuditEntry> {
    let mut last_error = None;
    for attempt in 1..=2u8 {
        match log.append(entry.clone()).await {
            Ok(stored) => return Some(stored),
            Err(e) => {
                logger.warn(
                    "Audit log append failed",
                    log_data!("attempt" => attempt, "error" => e.to_string()),
                );
                last_error = Some(e);
            }
        }
    }

    logger.error(
        "Audit entry dropped",
        log_data!(
            "actor_id" => entry.actor_id,
            "action" => entry.action.as_str(),
            "description" => entry.description,
            "entity" => entry.entity,
            "error" => last_error.map(|e| e.to_string())
        ),
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Caller, Role};
    use crate::testing::{FailingAuditLog, MemoryAuditLog};
    use chrono::TimeZone;
    use futures::executor::block_on;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn admin() -> Caller {
        Caller {
            id: "u-admin".into(),
            username: "root".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn query_params_parse_independently() {
        let query = AuditQuery::from_params(
            &params(&[
                ("action_type", "DELETE"),
                ("start_date", "not-a-date"),
                ("end_date", "2024-02-01"),
                ("page", "3"),
                ("page_size", "50"),
            ]),
            |requested| requested.unwrap_or(20).min(100),
        );
        assert_eq!(query.action, Some(ActionKind::Delete));
        assert_eq!(query.start, None);
        assert_eq!(query.end, Some(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap()));
        assert!(!query.end_inclusive);
        assert!(!query.oldest_first);
        assert_eq!(query.offset(), 100);
    }

    #[test]
    fn unknown_action_type_is_ignored() {
        let query = AuditQuery::from_params(&params(&[("action_type", "purge")]), |_| 20);
        assert_eq!(query.action, None);
        assert_eq!(query.page, 1);
    }

    #[test]
    fn search_covers_description_and_actor_name() {
        let log = MemoryAuditLog::default();
        block_on(async {
            log.append(NewAuditEntry::new(&admin(), ActionKind::Upload, "Uploaded chair.glb"))
                .await
                .unwrap();
            log.append(NewAuditEntry::new(&admin(), ActionKind::Login, "Signed in"))
                .await
                .unwrap();

            let by_description = AuditQuery {
                search: Some("CHAIR".into()),
                page: 1,
                page_size: 20,
                ..Default::default()
            };
            assert_eq!(log.query(&by_description).await.unwrap().count, 1);

            let by_actor = AuditQuery {
                search: Some("roo".into()),
                page: 1,
                page_size: 20,
                ..Default::default()
            };
            assert_eq!(log.query(&by_actor).await.unwrap().count, 2);
        });
    }

    #[test]
    fn default_order_is_newest_first_and_reversible() {
        let log = MemoryAuditLog::default();
        block_on(async {
            for i in 0..3 {
                log.append(NewAuditEntry::new(&admin(), ActionKind::View, format!("entry {}", i)))
                    .await
                    .unwrap();
            }
            let mut query = AuditQuery {
                page: 1,
                page_size: 20,
                ..Default::default()
            };
            let newest = log.query(&query).await.unwrap();
            assert_eq!(newest.results[0].description, "entry 2");

            query.oldest_first = true;
            let oldest = log.query(&query).await.unwrap();
            assert_eq!(oldest.results[0].description, "entry 0");
        });
    }

    #[test]
    fn record_swallows_persistent_failures() {
        let log = FailingAuditLog::default();
        let logger = Logger::new("test".into());
        let stored = block_on(record(&log, &logger, NewAuditEntry::new(&admin(), ActionKind::Delete, "gone")));
        assert!(stored.is_none());
        assert_eq!(log.attempts(), 2);
    }

    #[test]
    fn record_retries_once_after_transient_failure() {
        let log = FailingAuditLog::failing_times(1);
        let logger = Logger::new("test".into());
        let stored = block_on(record(&log, &logger, NewAuditEntry::new(&admin(), ActionKind::Delete, "gone")));
        assert!(stored.is_some());
        assert_eq!(log.attempts(), 2);
    }
}
