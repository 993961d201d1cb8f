use worker::*;

use super::{authenticate, json_response, query_params, Backend};
use crate::audit::AuditQuery;
use crate::errors::AppResult;
use crate::logging::Logger;
use crate::services::ActivityService;

/// `GET /api/activity/logs/`, Admin only.
pub async fn list_activity(req: Request, backend: &Backend, logger: &Logger) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let query = AuditQuery::from_params(&query_params(&req)?, |requested| {
        backend.config.page_size(requested)
    });
    let page = ActivityService::new(&backend.db).list(&ctx, query).await?;
    json_response(&page, 200)
}
