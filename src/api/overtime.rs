use crate::api::approval::{self, ApprovalView, DecisionPayload};
use crate::auth::auth::AuthUser;
use crate::domain::approval::{ApprovalKind, Decision};
use crate::error::ApiError;
use crate::model::overtime_request::OvertimeDetails;
use crate::repo::approval::{self as approval_repo, AwaitingDecision};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const KIND: ApprovalKind = ApprovalKind::Overtime;

#[derive(Deserialize, ToSchema)]
pub struct CreateOvertime {
    #[schema(example = "2026-02-14", format = "date", value_type = String)]
    pub work_date: NaiveDate,
    /// Hours worked beyond the regular shift
    #[schema(example = 2.5)]
    pub hours: f64,
    #[schema(example = "Release night", nullable = true)]
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct OvertimeResponse {
    pub overtime: OvertimeDetails,
    pub approval: ApprovalView,
}

fn validate(payload: &CreateOvertime) -> Result<(), ApiError> {
    if !payload.hours.is_finite() || payload.hours <= 0.0 || payload.hours > 24.0 {
        return Err(ApiError::BadRequest(
            "hours must be greater than 0 and at most 24".into(),
        ));
    }
    Ok(())
}

/// Submits an overtime request and opens its approval chain
#[utoipa::path(
    post,
    path = "/api/overtime",
    request_body(
        content = CreateOvertime,
        description = "Overtime request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Overtime request submitted", body = Object,
         example = json!({
            "message": "Overtime request submitted",
            "id": 5,
            "status": "pending"
         })
        ),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "No approval chain configured for overtime")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Overtime"
)]
pub async fn create_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateOvertime>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.require_employee()?;
    validate(&payload)?;

    let mut request = approval::start_chain(pool.get_ref(), KIND, employee_id).await?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        INSERT INTO overtime_requests
            (employee_id, work_date, hours, reason, status, current_level)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.work_date)
    .bind(payload.hours)
    .bind(&payload.reason)
    .bind(request.status.as_ref())
    .bind(request.current_level)
    .execute(&mut *tx)
    .await?;

    request.id = result.last_insert_id();
    approval_repo::insert_records(&mut tx, &request).await?;
    tx.commit().await?;

    info!(
        employee_id,
        request_id = request.id,
        hours = payload.hours,
        "Overtime request submitted"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Overtime request submitted",
        "id": request.id,
        "status": request.status,
    })))
}

/// Overtime request details with its approval progress
#[utoipa::path(
    get,
    path = "/api/overtime/{overtime_id}",
    params(
        ("overtime_id" = u64, Path, description = "ID of the overtime request to fetch")
    ),
    responses(
        (status = 200, description = "Overtime request found", body = OvertimeResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Overtime request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Overtime"
)]
pub async fn get_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let overtime_id = path.into_inner();

    let request = approval::load_or_404(pool.get_ref(), KIND, overtime_id).await?;
    approval::ensure_can_view(&auth, &request)?;

    let overtime = sqlx::query_as::<_, OvertimeDetails>(
        r#"
        SELECT id, employee_id, work_date, hours, reason
        FROM overtime_requests
        WHERE id = ?
        "#,
    )
    .bind(overtime_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(ApiError::NotFound(KIND.label()))?;

    Ok(HttpResponse::Ok().json(OvertimeResponse {
        overtime,
        approval: ApprovalView::from(&request),
    }))
}

/// Overtime requests waiting for the caller's decision
#[utoipa::path(
    get,
    path = "/api/overtime/awaiting",
    responses(
        (status = 200, description = "Requests whose current level is assigned to the caller", body = [AwaitingDecision]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Overtime"
)]
pub async fn awaiting_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    let rows = approval_repo::awaiting(pool.get_ref(), KIND, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Approves the current level of an overtime request
#[utoipa::path(
    put,
    path = "/api/overtime/{overtime_id}/approve",
    params(
        ("overtime_id" = u64, Path, description = "ID of the overtime request to approve")
    ),
    request_body = DecisionPayload,
    responses(
        (status = 200, description = "Decision recorded", body = ApprovalView),
        (status = 403, description = "Caller is not the approver of this level"),
        (status = 404, description = "Overtime request not found"),
        (status = 409, description = "Already finalized, wrong level, or decided concurrently"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Overtime"
)]
pub async fn approve_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<DecisionPayload>,
) -> Result<HttpResponse, ApiError> {
    let view = approval::decide(
        &auth,
        pool.get_ref(),
        KIND,
        path.into_inner(),
        Decision::Approved,
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Rejects an overtime request at its current level
#[utoipa::path(
    put,
    path = "/api/overtime/{overtime_id}/reject",
    params(
        ("overtime_id" = u64, Path, description = "ID of the overtime request to reject")
    ),
    request_body = DecisionPayload,
    responses(
        (status = 200, description = "Decision recorded", body = ApprovalView),
        (status = 403, description = "Caller is not the approver of this level"),
        (status = 404, description = "Overtime request not found"),
        (status = 409, description = "Already finalized, wrong level, or decided concurrently"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Overtime"
)]
pub async fn reject_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<DecisionPayload>,
) -> Result<HttpResponse, ApiError> {
    let view = approval::decide(
        &auth,
        pool.get_ref(),
        KIND,
        path.into_inner(),
        Decision::Rejected,
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Withdraws an overtime request before anyone has approved it
#[utoipa::path(
    put,
    path = "/api/overtime/{overtime_id}/cancel",
    params(
        ("overtime_id" = u64, Path, description = "ID of the overtime request to cancel")
    ),
    responses(
        (status = 200, description = "Request cancelled", body = ApprovalView),
        (status = 403, description = "Caller is not the requester"),
        (status = 404, description = "Overtime request not found"),
        (status = 409, description = "Approval already started or request finalized"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Overtime"
)]
pub async fn cancel_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let view = approval::cancel(&auth, pool.get_ref(), KIND, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}
