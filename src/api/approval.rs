//! Handler logic shared by the leave and overtime endpoints. Both kinds run
//! the same state machine; only the table and permission slug differ.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::domain::approval::{
    ApprovalKind, ApprovalRecord, ApprovalRequest, ApproverAuthority, Decision, RequestStatus,
    cancel_request, compute_progress, describe_current_status, submit_approval,
};
use crate::error::ApiError;
use crate::repo::approval as repo;
use crate::utils::permission_cache;

#[derive(Deserialize, ToSchema)]
pub struct DecisionPayload {
    /// Level the approver is deciding, as shown to them
    #[schema(example = 1)]
    pub level: u32,
    #[schema(example = "Enjoy your holiday", nullable = true)]
    pub comment: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ApprovalView {
    pub kind: ApprovalKind,
    pub status: RequestStatus,
    #[schema(example = 2)]
    pub current_level: u32,
    #[schema(example = 3)]
    pub total_levels: u32,
    /// Approved levels in percent
    #[schema(example = 33)]
    pub progress: u8,
    #[schema(example = "Waiting for Jane Manager (level 2 of 3)")]
    pub status_text: String,
    #[schema(nullable = true)]
    pub rejection_reason: Option<String>,
    pub approvals: Vec<ApprovalRecord>,
}

impl From<&ApprovalRequest> for ApprovalView {
    fn from(request: &ApprovalRequest) -> Self {
        Self {
            kind: request.kind,
            status: request.status,
            current_level: request.current_level,
            total_levels: request.total_levels(),
            progress: compute_progress(&request.approvals),
            status_text: describe_current_status(request),
            rejection_reason: request.rejection_reason.clone(),
            approvals: request.approvals.clone(),
        }
    }
}

/// The assigned approver may always decide their level; holders of the
/// kind's `approve_any` permission may decide any level.
pub(crate) struct PermissionAuthority {
    pub may_decide_any: bool,
}

impl ApproverAuthority for PermissionAuthority {
    fn may_act_for(&self, acting_approver_id: u64, record: &ApprovalRecord) -> bool {
        self.may_decide_any || acting_approver_id == record.approver_id
    }
}

fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

pub(crate) async fn load_or_404(
    pool: &MySqlPool,
    kind: ApprovalKind,
    id: u64,
) -> Result<ApprovalRequest, ApiError> {
    repo::load(pool, kind, id)
        .await?
        .ok_or(ApiError::NotFound(kind.label()))
}

/// Requester, anyone in the chain, and HR/Admin may read a request.
pub(crate) fn ensure_can_view(auth: &AuthUser, request: &ApprovalRequest) -> Result<(), ApiError> {
    let is_requester = auth.employee_id == Some(request.requester_id);
    let in_chain = request
        .approvals
        .iter()
        .any(|r| r.approver_id == auth.user_id);

    if is_requester || in_chain || auth.is_hr_or_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not allowed to view this request"))
    }
}

/// A pending request of `kind` for `requester_id`, with the configured chain.
/// The caller inserts it and sets the id.
pub(crate) async fn start_chain(
    pool: &MySqlPool,
    kind: ApprovalKind,
    requester_id: u64,
) -> Result<ApprovalRequest, ApiError> {
    let approvers = repo::load_chain(pool, kind).await?;
    Ok(ApprovalRequest::new(0, requester_id, kind, approvers)?)
}

pub(crate) async fn decide(
    auth: &AuthUser,
    pool: &MySqlPool,
    kind: ApprovalKind,
    id: u64,
    decision: Decision,
    payload: DecisionPayload,
) -> Result<ApprovalView, ApiError> {
    let request = load_or_404(pool, kind, id).await?;

    let authority = PermissionAuthority {
        may_decide_any: permission_cache::has_permission(
            pool,
            auth.role.id(),
            kind.approve_any_permission(),
        )
        .await?,
    };

    let next = submit_approval(
        &request,
        payload.level,
        decision,
        normalize_comment(payload.comment),
        auth.user_id,
        &authority,
        Utc::now(),
    )
    .inspect_err(|e| {
        warn!(%kind, request_id = id, level = payload.level, user_id = auth.user_id, error = %e, "Approval decision refused");
    })?;

    repo::persist_transition(pool, &request, &next).await?;

    info!(
        %kind,
        request_id = id,
        level = payload.level,
        ?decision,
        user_id = auth.user_id,
        status = %next.status,
        "Approval decision recorded"
    );

    Ok(ApprovalView::from(&next))
}

pub(crate) async fn cancel(
    auth: &AuthUser,
    pool: &MySqlPool,
    kind: ApprovalKind,
    id: u64,
) -> Result<ApprovalView, ApiError> {
    let requester_id = auth.require_employee()?;
    let request = load_or_404(pool, kind, id).await?;

    let next = cancel_request(&request, requester_id)?;
    repo::persist_transition(pool, &request, &next).await?;

    info!(%kind, request_id = id, requester_id, "Request cancelled");
    Ok(ApprovalView::from(&next))
}
