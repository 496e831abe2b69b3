use crate::api::approval::{self, ApprovalView, DecisionPayload};
use crate::auth::auth::AuthUser;
use crate::domain::approval::{ApprovalKind, Decision};
use crate::error::ApiError;
use crate::model::leave_request::{LeaveDetails, LeaveType};
use crate::repo::approval::{self as approval_repo, AwaitingDecision};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const KIND: ApprovalKind = ApprovalKind::Leave;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: chrono::NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: chrono::NaiveDate,
    #[schema(example = "sick")]
    pub leave_type: LeaveType, // enum ensures Swagger dropdown
    #[schema(example = "Flu", nullable = true)]
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveResponse {
    pub leave: LeaveDetails,
    pub approval: ApprovalView,
}

fn validate(payload: &CreateLeave) -> Result<(), ApiError> {
    if payload.start_date > payload.end_date {
        return Err(ApiError::BadRequest(
            "start_date cannot be after end_date".into(),
        ));
    }
    Ok(())
}

/* =========================
Create leave request
========================= */
/// Submits a leave request and opens its approval chain
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = Object,
         example = json!({
            "message": "Leave request submitted",
            "id": 12,
            "status": "pending"
         })
        ),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "No approval chain configured for leave")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.require_employee()?;
    validate(&payload)?;

    let mut request = approval::start_chain(pool.get_ref(), KIND, employee_id).await?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (employee_id, start_date, end_date, leave_type, reason, status, current_level)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.leave_type.as_str())
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
        levels = request.total_levels(),
        "Leave request submitted"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Leave request submitted",
        "id": request.id,
        "status": request.status,
    })))
}

/// Leave request details with its approval progress
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let leave_id = path.into_inner();

    let request = approval::load_or_404(pool.get_ref(), KIND, leave_id).await?;
    approval::ensure_can_view(&auth, &request)?;

    let leave = sqlx::query_as::<_, LeaveDetails>(
        r#"
        SELECT id, employee_id, start_date, end_date, leave_type, reason
        FROM leave_requests
        WHERE id = ?
        "#,
    )
    .bind(leave_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(ApiError::NotFound(KIND.label()))?;

    Ok(HttpResponse::Ok().json(LeaveResponse {
        leave,
        approval: ApprovalView::from(&request),
    }))
}

/// Leave requests waiting for the caller's decision
#[utoipa::path(
    get,
    path = "/api/leave/awaiting",
    responses(
        (status = 200, description = "Requests whose current level is assigned to the caller", body = [AwaitingDecision]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn awaiting_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    let rows = approval_repo::awaiting(pool.get_ref(), KIND, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/* =========================
Approve / reject a level
========================= */
/// Approves the current level of a leave request
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    request_body = DecisionPayload,
    responses(
        (status = 200, description = "Decision recorded", body = ApprovalView),
        (status = 403, description = "Caller is not the approver of this level"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Already finalized, wrong level, or decided concurrently", body = Object, example = json!({
            "message": "level 1 is not the current approval level (expected 2)"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
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

/// Rejects a leave request at its current level
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    request_body = DecisionPayload,
    responses(
        (status = 200, description = "Decision recorded", body = ApprovalView),
        (status = 403, description = "Caller is not the approver of this level"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Already finalized, wrong level, or decided concurrently"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
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

/// Withdraws a leave request before anyone has approved it
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/cancel",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to cancel")
    ),
    responses(
        (status = 200, description = "Request cancelled", body = ApprovalView),
        (status = 403, description = "Caller is not the requester"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Approval already started or request finalized"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let view = approval::cancel(&auth, pool.get_ref(), KIND, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn payload(start: (i32, u32, u32), end: (i32, u32, u32)) -> CreateLeave {
        CreateLeave {
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            leave_type: LeaveType::Annual,
            reason: None,
        }
    }

    #[test]
    fn end_before_start_is_rejected() {
        assert!(validate(&payload((2026, 3, 5), (2026, 3, 4))).is_err());
        assert!(validate(&payload((2026, 3, 5), (2026, 3, 5))).is_ok());
    }

    #[test]
    fn leave_type_deserializes_lowercase() {
        let body: CreateLeave = serde_json::from_value(serde_json::json!({
            "start_date": "2026-01-01",
            "end_date": "2026-01-02",
            "leave_type": "unpaid"
        }))
        .unwrap();
        assert_eq!(body.leave_type, LeaveType::Unpaid);
        assert!(body.reason.is_none());
    }
}
