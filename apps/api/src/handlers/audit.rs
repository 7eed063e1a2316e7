use axum::Json;
use axum::extract::{Query, State};
use taskgate_application::AuditLogQuery;

use super::{Caller, authenticated};
use crate::dto::{AuditLogQueryParams, AuditRecordResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_audit_records_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<AuditLogQueryParams>,
) -> ApiResult<Json<Vec<AuditRecordResponse>>> {
    let user = authenticated(caller)?;
    let query = AuditLogQuery::try_from(params)?;
    let records = state
        .audit_log_service
        .list_records(&user, query)
        .await?
        .into_iter()
        .map(AuditRecordResponse::from)
        .collect();

    Ok(Json(records))
}
