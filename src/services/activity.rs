use crate::audit::{self, AuditLog, AuditPage, AuditQuery};
use crate::errors::AppResult;
use crate::models::ActionKind;
use crate::policy;
use crate::services::RequestContext;

/// Read side of the audit log.
pub struct ActivityService<'a> {
    audit: &'a dyn AuditLog,
}

impl<'a> ActivityService<'a> {
    pub fn new(audit: &'a dyn AuditLog) -> Self {
        Self { audit }
    }

    /// Admin-only. The read itself is recorded after the page is fetched, so
    /// it never appears in its own results.
    pub async fn list(&self, ctx: &RequestContext, query: AuditQuery) -> AppResult<AuditPage> {
        policy::require_admin(&ctx.caller, "view the activity log")?;
        let page = self.audit.query(&query).await?;
        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(
                ActionKind::View,
                format!("Viewed activity log page {} ({} matching entries)", page.page, page.count),
            ),
        )
        .await;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::logging::Logger;
    use crate::models::{Caller, NewAuditEntry, Role};
    use crate::testing::MemoryAuditLog;
    use futures::executor::block_on;

    fn caller(id: &str, role: Role) -> Caller {
        Caller {
            id: id.into(),
            username: id.into(),
            role,
        }
    }

    fn ctx(id: &str, role: Role) -> RequestContext {
        RequestContext::new(caller(id, role), None, Logger::new("test".into()))
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn seed(log: &MemoryAuditLog) {
        block_on(async {
            for (actor, action, desc) in [
                ("ana", ActionKind::Upload, "Uploaded asset 'rock.glb'"),
                ("ana", ActionKind::Update, "Updated asset 'rock.glb'"),
                ("bo", ActionKind::Login, "User 'bo' logged in"),
                ("bo", ActionKind::Delete, "Deleted asset 'tree.png'"),
            ] {
                log.append(NewAuditEntry::new(&caller(actor, Role::Editor), action, desc))
                    .await
                    .unwrap();
            }
        });
    }

    #[test]
    fn non_admins_cannot_read_the_log() {
        let log = MemoryAuditLog::default();
        seed(&log);
        let service = ActivityService::new(&log);
        let err = block_on(service.list(&ctx("ana", Role::Editor), AuditQuery::from_params(&[], |_| 20)))
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn filters_and_pagination_apply() {
        let log = MemoryAuditLog::default();
        seed(&log);
        let service = ActivityService::new(&log);
        let admin = ctx("root", Role::Admin);

        let page = block_on(service.list(
            &admin,
            AuditQuery::from_params(&params(&[("actor", "bo")]), |_| 20),
        ))
        .unwrap();
        assert_eq!(page.count, 2);
        assert!(page.results.iter().all(|e| e.actor_id == "bo"));

        let page = block_on(service.list(
            &admin,
            AuditQuery::from_params(&params(&[("search", "ROCK"), ("action_type", "update")]), |_| 20),
        ))
        .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].action, ActionKind::Update);

        let page = block_on(service.list(
            &admin,
            AuditQuery::from_params(&params(&[("page_size", "1"), ("page", "2"), ("actor", "ana")]), |r| {
                r.unwrap_or(20)
            }),
        ))
        .unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].action, ActionKind::Upload);
    }

    #[test]
    fn reading_the_log_is_itself_audited() {
        let log = MemoryAuditLog::default();
        seed(&log);
        let service = ActivityService::new(&log);
        let page = block_on(service.list(&ctx("root", Role::Admin), AuditQuery::from_params(&[], |_| 20)))
            .unwrap();
        assert_eq!(page.count, 4);
        assert_eq!(log.len(), 5);
        let last = log.entries().pop().unwrap();
        assert_eq!(last.action, ActionKind::View);
        assert_eq!(last.actor_id, "root");
    }
}
