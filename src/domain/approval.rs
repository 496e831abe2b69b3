//! Sequential multi-level approval shared by leave and overtime requests.
//!
//! Every function here is pure: it takes the request as loaded from the
//! database and returns the next version of it. Persisting the transition
//! (with a conditional update on `status`/`current_level`) is the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalKind {
    Leave,
    Overtime,
}

impl ApprovalKind {
    /// Table holding the request rows of this kind.
    pub fn table(self) -> &'static str {
        match self {
            ApprovalKind::Leave => "leave_requests",
            ApprovalKind::Overtime => "overtime_requests",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ApprovalKind::Leave => "Leave request",
            ApprovalKind::Overtime => "Overtime request",
        }
    }

    /// Permission letting a user decide a level assigned to someone else.
    pub fn approve_any_permission(self) -> &'static str {
        match self {
            ApprovalKind::Leave => "leave:approve_any",
            ApprovalKind::Overtime => "overtime:approve_any",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_final(self) -> bool {
        self != RequestStatus::Pending
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for RecordStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => RecordStatus::Approved,
            Decision::Rejected => RecordStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Approver {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApprovalRecord {
    /// 1-based position in the chain
    #[schema(example = 1)]
    pub level: u32,
    #[schema(example = 42)]
    pub approver_id: u64,
    #[schema(example = "Jane Manager")]
    pub approver_name: String,
    pub status: RecordStatus,
    #[schema(nullable = true)]
    pub comment: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: u64,
    pub requester_id: u64,
    pub kind: ApprovalKind,
    pub status: RequestStatus,
    pub current_level: u32,
    pub approvals: Vec<ApprovalRecord>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("request has already been finalized")]
    AlreadyFinalized,

    #[error("level {got} is not the current approval level (expected {expected})")]
    WrongLevel { expected: u32, got: u32 },

    #[error("user {acting} is not allowed to decide level {level}")]
    InvalidApprover { acting: u64, level: u32 },

    #[error("an approval chain needs at least one approver")]
    EmptyChain,

    #[error("only the requester can cancel this request")]
    NotRequester,

    #[error("approval has already started, the request can no longer be cancelled")]
    ApprovalStarted,

    #[error("inconsistent approval records: {0}")]
    Inconsistent(String),
}

/// Decides whether an acting user may record a decision on a level.
/// The real permission lookup lives outside this module.
pub trait ApproverAuthority {
    fn may_act_for(&self, acting_approver_id: u64, record: &ApprovalRecord) -> bool;
}

/// Only the approver assigned to the level may decide it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignedApproverOnly;

impl ApproverAuthority for AssignedApproverOnly {
    fn may_act_for(&self, acting_approver_id: u64, record: &ApprovalRecord) -> bool {
        acting_approver_id == record.approver_id
    }
}

impl ApprovalRequest {
    /// A fresh pending request with one pending record per approver, in chain order.
    pub fn new(
        id: u64,
        requester_id: u64,
        kind: ApprovalKind,
        approvers: Vec<Approver>,
    ) -> Result<Self, ApprovalError> {
        if approvers.is_empty() {
            return Err(ApprovalError::EmptyChain);
        }

        let approvals = approvers
            .into_iter()
            .zip(1u32..)
            .map(|(approver, level)| ApprovalRecord {
                level,
                approver_id: approver.id,
                approver_name: approver.name,
                status: RecordStatus::Pending,
                comment: None,
                decided_at: None,
            })
            .collect();

        Ok(Self {
            id,
            requester_id,
            kind,
            status: RequestStatus::Pending,
            current_level: 1,
            approvals,
            rejection_reason: None,
        })
    }

    pub fn total_levels(&self) -> u32 {
        self.approvals.len() as u32
    }

    fn record(&self, level: u32) -> Option<&ApprovalRecord> {
        self.approvals.iter().find(|r| r.level == level)
    }

    /// Verifies that a request loaded from storage satisfies the chain rules:
    /// contiguous levels, decided records forming a prefix, status and
    /// `current_level` matching what the records imply.
    pub fn check_invariants(&self) -> Result<(), ApprovalError> {
        let inconsistent = |msg: String| Err(ApprovalError::Inconsistent(msg));

        if self.approvals.is_empty() {
            return inconsistent(format!("request {} has no approval records", self.id));
        }

        for (expected, record) in (1u32..).zip(&self.approvals) {
            if record.level != expected {
                return inconsistent(format!(
                    "request {} has level {} where {} was expected",
                    self.id, record.level, expected
                ));
            }
        }

        let mut seen_open = false;
        for record in &self.approvals {
            match record.status {
                RecordStatus::Approved if seen_open => {
                    return inconsistent(format!(
                        "level {} approved after an undecided or rejected level",
                        record.level
                    ));
                }
                RecordStatus::Rejected if seen_open => {
                    return inconsistent(format!(
                        "level {} rejected after an undecided or rejected level",
                        record.level
                    ));
                }
                RecordStatus::Approved => {}
                RecordStatus::Rejected | RecordStatus::Pending => seen_open = true,
            }
        }

        let derived = derive_status(&self.approvals);
        match self.status {
            RequestStatus::Cancelled if derived != RequestStatus::Pending => {
                return inconsistent(format!(
                    "request {} is cancelled but its records say {}",
                    self.id, derived
                ));
            }
            RequestStatus::Cancelled => {
                if self
                    .approvals
                    .iter()
                    .any(|r| r.status == RecordStatus::Approved)
                {
                    return inconsistent(format!(
                        "request {} was cancelled after approval started",
                        self.id
                    ));
                }
            }
            status if status != derived => {
                return inconsistent(format!(
                    "request {} is {} but its records say {}",
                    self.id, status, derived
                ));
            }
            _ => {}
        }

        let expected_level = derive_current_level(&self.approvals);
        if self.current_level != expected_level {
            return inconsistent(format!(
                "request {} is at level {} but its records say {}",
                self.id, self.current_level, expected_level
            ));
        }

        Ok(())
    }
}

/// Overall status implied by the records alone. Cancellation is not
/// derivable from records and is stored separately.
pub fn derive_status(approvals: &[ApprovalRecord]) -> RequestStatus {
    if approvals.iter().any(|r| r.status == RecordStatus::Rejected) {
        RequestStatus::Rejected
    } else if !approvals.is_empty()
        && approvals.iter().all(|r| r.status == RecordStatus::Approved)
    {
        RequestStatus::Approved
    } else {
        RequestStatus::Pending
    }
}

/// Lowest level still pending, or one past the last level once none are.
pub fn derive_current_level(approvals: &[ApprovalRecord]) -> u32 {
    approvals
        .iter()
        .find(|r| r.status == RecordStatus::Pending)
        .map(|r| r.level)
        .unwrap_or(approvals.len() as u32 + 1)
}

/// Records `decision` on `level` and returns the advanced request.
///
/// `request` is left untouched, so a failed call changes nothing.
pub fn submit_approval(
    request: &ApprovalRequest,
    level: u32,
    decision: Decision,
    comment: Option<String>,
    acting_approver_id: u64,
    authority: &impl ApproverAuthority,
    decided_at: DateTime<Utc>,
) -> Result<ApprovalRequest, ApprovalError> {
    if request.status.is_final() {
        return Err(ApprovalError::AlreadyFinalized);
    }
    if level != request.current_level {
        return Err(ApprovalError::WrongLevel {
            expected: request.current_level,
            got: level,
        });
    }

    let record = request.record(level).ok_or_else(|| {
        ApprovalError::Inconsistent(format!("request {} has no level {}", request.id, level))
    })?;
    if !authority.may_act_for(acting_approver_id, record) {
        return Err(ApprovalError::InvalidApprover {
            acting: acting_approver_id,
            level,
        });
    }

    let mut next = request.clone();
    if let Some(record) = next.approvals.iter_mut().find(|r| r.level == level) {
        record.status = decision.into();
        record.comment = comment.clone();
        record.decided_at = Some(decided_at);
    }

    next.status = derive_status(&next.approvals);
    next.current_level = derive_current_level(&next.approvals);
    if decision == Decision::Rejected {
        next.rejection_reason = comment;
    }

    Ok(next)
}

/// Withdraws a request on behalf of its requester. Allowed only while no
/// level has been approved.
pub fn cancel_request(
    request: &ApprovalRequest,
    requester_id: u64,
) -> Result<ApprovalRequest, ApprovalError> {
    if request.status.is_final() {
        return Err(ApprovalError::AlreadyFinalized);
    }
    if request.requester_id != requester_id {
        return Err(ApprovalError::NotRequester);
    }
    if request
        .approvals
        .iter()
        .any(|r| r.status != RecordStatus::Pending)
    {
        return Err(ApprovalError::ApprovalStarted);
    }

    let mut next = request.clone();
    next.status = RequestStatus::Cancelled;
    Ok(next)
}

/// Share of approved levels as a whole percentage, for display.
pub fn compute_progress(approvals: &[ApprovalRecord]) -> u8 {
    if approvals.is_empty() {
        return 0;
    }
    let approved = approvals
        .iter()
        .filter(|r| r.status == RecordStatus::Approved)
        .count();

    ((approved as f64 / approvals.len() as f64) * 100.0).round() as u8
}

pub fn describe_current_status(request: &ApprovalRequest) -> String {
    match request.status {
        RequestStatus::Rejected => match request
            .approvals
            .iter()
            .find(|r| r.status == RecordStatus::Rejected)
        {
            Some(r) => format!("Rejected by {} at level {}", r.approver_name, r.level),
            None => "Rejected".to_string(),
        },
        RequestStatus::Approved => {
            format!("Approved, all {} levels completed", request.total_levels())
        }
        RequestStatus::Cancelled => "Cancelled by requester".to_string(),
        RequestStatus::Pending => match request.record(request.current_level) {
            Some(r) => format!(
                "Waiting for {} (level {} of {})",
                r.approver_name,
                r.level,
                request.total_levels()
            ),
            None => "Pending".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chain(n: u64) -> Vec<Approver> {
        (1..=n)
            .map(|i| Approver {
                id: 100 + i,
                name: format!("Approver {i}"),
            })
            .collect()
    }

    fn three_level() -> ApprovalRequest {
        ApprovalRequest::new(1, 7, ApprovalKind::Leave, chain(3)).unwrap()
    }

    fn approve(request: &ApprovalRequest, level: u32) -> Result<ApprovalRequest, ApprovalError> {
        submit_approval(
            request,
            level,
            Decision::Approved,
            Some("ok".into()),
            100 + level as u64,
            &AssignedApproverOnly,
            Utc::now(),
        )
    }

    #[test]
    fn new_request_is_pending_at_level_one() {
        let request = three_level();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.current_level, 1);
        assert_eq!(
            request.approvals.iter().map(|r| r.level).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(request.check_invariants().is_ok());
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert_eq!(
            ApprovalRequest::new(1, 7, ApprovalKind::Overtime, vec![]),
            Err(ApprovalError::EmptyChain)
        );
    }

    #[test]
    fn approving_level_one_advances() {
        let next = approve(&three_level(), 1).unwrap();
        assert_eq!(next.current_level, 2);
        assert_eq!(next.status, RequestStatus::Pending);
        assert_eq!(next.approvals[0].status, RecordStatus::Approved);
        assert_eq!(next.approvals[0].comment.as_deref(), Some("ok"));
        assert!(next.approvals[0].decided_at.is_some());
        assert!(next.check_invariants().is_ok());
    }

    #[test]
    fn rejection_finalizes_and_blocks_later_levels() {
        let after_one = approve(&three_level(), 1).unwrap();
        let rejected = submit_approval(
            &after_one,
            2,
            Decision::Rejected,
            Some("team is short-staffed".into()),
            102,
            &AssignedApproverOnly,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("team is short-staffed")
        );
        assert_eq!(rejected.approvals[2].status, RecordStatus::Pending);
        assert!(rejected.check_invariants().is_ok());

        assert_eq!(approve(&rejected, 3), Err(ApprovalError::AlreadyFinalized));
    }

    #[test]
    fn approving_final_level_completes() {
        let mut request = three_level();
        for level in 1..=3 {
            request = approve(&request, level).unwrap();
        }
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.current_level, 4);
        assert_eq!(compute_progress(&request.approvals), 100);
        assert!(request.check_invariants().is_ok());
        assert_eq!(approve(&request, 4), Err(ApprovalError::AlreadyFinalized));
    }

    #[test]
    fn wrong_level_fails_without_mutation() {
        let request = three_level();
        let before = request.clone();
        assert_eq!(
            approve(&request, 2),
            Err(ApprovalError::WrongLevel {
                expected: 1,
                got: 2
            })
        );
        assert_eq!(request, before);
    }

    #[test]
    fn unassigned_user_cannot_decide() {
        let request = three_level();
        let result = submit_approval(
            &request,
            1,
            Decision::Approved,
            None,
            999,
            &AssignedApproverOnly,
            Utc::now(),
        );
        assert_eq!(
            result,
            Err(ApprovalError::InvalidApprover {
                acting: 999,
                level: 1
            })
        );
    }

    #[test]
    fn delegated_authority_can_decide_for_others() {
        struct Everyone;
        impl ApproverAuthority for Everyone {
            fn may_act_for(&self, _: u64, _: &ApprovalRecord) -> bool {
                true
            }
        }

        let next = submit_approval(
            &three_level(),
            1,
            Decision::Approved,
            None,
            999,
            &Everyone,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(next.current_level, 2);
    }

    #[test]
    fn progress_rounds_to_whole_percent() {
        let request = three_level();
        assert_eq!(compute_progress(&request.approvals), 0);
        let one = approve(&request, 1).unwrap();
        assert_eq!(compute_progress(&one.approvals), 33);
        let two = approve(&one, 2).unwrap();
        assert_eq!(compute_progress(&two.approvals), 67);
        assert_eq!(compute_progress(&[]), 0);
    }

    #[test]
    fn cancel_only_before_any_decision() {
        let request = three_level();
        let cancelled = cancel_request(&request, 7).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(cancelled.check_invariants().is_ok());
        assert_eq!(approve(&cancelled, 1), Err(ApprovalError::AlreadyFinalized));

        assert_eq!(cancel_request(&request, 8), Err(ApprovalError::NotRequester));

        let started = approve(&request, 1).unwrap();
        assert_eq!(cancel_request(&started, 7), Err(ApprovalError::ApprovalStarted));

        assert_eq!(
            cancel_request(&cancelled, 7),
            Err(ApprovalError::AlreadyFinalized)
        );
    }

    #[test]
    fn status_text_follows_the_chain() {
        let request = three_level();
        assert_eq!(
            describe_current_status(&request),
            "Waiting for Approver 1 (level 1 of 3)"
        );

        let one = approve(&request, 1).unwrap();
        assert_eq!(
            describe_current_status(&one),
            "Waiting for Approver 2 (level 2 of 3)"
        );

        let rejected = submit_approval(
            &one,
            2,
            Decision::Rejected,
            None,
            102,
            &AssignedApproverOnly,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            describe_current_status(&rejected),
            "Rejected by Approver 2 at level 2"
        );

        let mut done = request.clone();
        for level in 1..=3 {
            done = approve(&done, level).unwrap();
        }
        assert_eq!(
            describe_current_status(&done),
            "Approved, all 3 levels completed"
        );

        let cancelled = cancel_request(&request, 7).unwrap();
        assert_eq!(describe_current_status(&cancelled), "Cancelled by requester");
    }

    #[test]
    fn invariant_checker_flags_broken_rows() {
        let mut gap = three_level();
        gap.approvals[1].level = 5;
        assert!(matches!(
            gap.check_invariants(),
            Err(ApprovalError::Inconsistent(_))
        ));

        let mut skipped = three_level();
        skipped.approvals[1].status = RecordStatus::Approved;
        assert!(skipped.check_invariants().is_err());

        let mut wrong_status = approve(&three_level(), 1).unwrap();
        wrong_status.status = RequestStatus::Approved;
        assert!(wrong_status.check_invariants().is_err());

        let mut wrong_level = approve(&three_level(), 1).unwrap();
        wrong_level.current_level = 1;
        assert!(wrong_level.check_invariants().is_err());
    }

    #[test]
    fn statuses_round_trip_through_their_column_text() {
        assert_eq!(RequestStatus::Cancelled.as_ref(), "cancelled");
        assert_eq!(
            "rejected".parse::<RecordStatus>().unwrap(),
            RecordStatus::Rejected
        );
        assert_eq!("overtime".parse::<ApprovalKind>().unwrap(), ApprovalKind::Overtime);
        assert!("maybe".parse::<RequestStatus>().is_err());
    }
}
