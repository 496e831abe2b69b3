use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, Transaction};

use crate::domain::approval::{ApprovalKind, ApprovalRecord, ApprovalRequest, Approver};
use crate::error::ApiError;

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: u64,
    employee_id: u64,
    status: String,
    current_level: u32,
    rejection_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    level: u32,
    approver_id: u64,
    approver_name: String,
    status: String,
    comment: Option<String>,
    decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecordRow> for ApprovalRecord {
    type Error = ApiError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| {
            ApiError::Corrupt(format!(
                "unknown record status '{}' at level {}",
                row.status, row.level
            ))
        })?;

        Ok(ApprovalRecord {
            level: row.level,
            approver_id: row.approver_id,
            approver_name: row.approver_name,
            status,
            comment: row.comment,
            decided_at: row.decided_at,
        })
    }
}

/// Approvers configured for new requests of `kind`, in level order.
pub async fn load_chain(pool: &MySqlPool, kind: ApprovalKind) -> Result<Vec<Approver>, ApiError> {
    let rows = sqlx::query_as::<_, (u64, String)>(
        r#"
        SELECT approver_id, approver_name
        FROM approval_chains
        WHERE kind = ?
        ORDER BY level
        "#,
    )
    .bind(kind.as_ref())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name)| Approver { id, name })
        .collect())
}

/// Loads a request with its records, checking the chain rules on the way.
pub async fn load(
    pool: &MySqlPool,
    kind: ApprovalKind,
    id: u64,
) -> Result<Option<ApprovalRequest>, ApiError> {
    let sql = format!(
        "SELECT id, employee_id, status, current_level, rejection_reason FROM {} WHERE id = ?",
        kind.table()
    );

    let Some(row) = sqlx::query_as::<_, RequestRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let records = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT level, approver_id, approver_name, status, comment, decided_at
        FROM approval_records
        WHERE kind = ? AND request_id = ?
        ORDER BY level
        "#,
    )
    .bind(kind.as_ref())
    .bind(id)
    .fetch_all(pool)
    .await?;

    let approvals = records
        .into_iter()
        .map(ApprovalRecord::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let status = row.status.parse().map_err(|_| {
        ApiError::Corrupt(format!("unknown {} status '{}'", kind, row.status))
    })?;

    let request = ApprovalRequest {
        id: row.id,
        requester_id: row.employee_id,
        kind,
        status,
        current_level: row.current_level,
        approvals,
        rejection_reason: row.rejection_reason,
    };

    request
        .check_invariants()
        .map_err(|e| ApiError::Corrupt(e.to_string()))?;

    Ok(Some(request))
}

/// Inserts the chain of a freshly created request.
pub async fn insert_records(
    tx: &mut Transaction<'_, MySql>,
    request: &ApprovalRequest,
) -> Result<(), sqlx::Error> {
    for record in &request.approvals {
        sqlx::query(
            r#"
            INSERT INTO approval_records
                (kind, request_id, level, approver_id, approver_name, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.kind.as_ref())
        .bind(request.id)
        .bind(record.level)
        .bind(record.approver_id)
        .bind(&record.approver_name)
        .bind(record.status.as_ref())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Row values the conditional update matches on: the request must still be
/// exactly as `before` was read.
#[derive(Debug, PartialEq, Eq)]
struct TransitionGuard<'a> {
    id: u64,
    status: &'a str,
    current_level: u32,
}

impl<'a> From<&'a ApprovalRequest> for TransitionGuard<'a> {
    fn from(before: &'a ApprovalRequest) -> Self {
        Self {
            id: before.id,
            status: before.status.as_ref(),
            current_level: before.current_level,
        }
    }
}

fn transition_sql(kind: ApprovalKind) -> String {
    format!(
        r#"
        UPDATE {}
        SET status = ?, current_level = ?, rejection_reason = ?
        WHERE id = ?
        AND status = ?
        AND current_level = ?
        "#,
        kind.table()
    )
}

/// Records whose decision differs between the two versions.
fn changed_records<'a>(
    before: &'a ApprovalRequest,
    after: &'a ApprovalRequest,
) -> impl Iterator<Item = &'a ApprovalRecord> {
    before
        .approvals
        .iter()
        .zip(&after.approvals)
        .filter(|(old, new)| old != new)
        .map(|(_, new)| new)
}

/// Writes `after` over `before`.
///
/// The request row is only updated while it still has the status and level
/// `before` was read with, so two approvers racing on the same level cannot
/// both commit. The loser gets [`ApiError::Conflict`].
pub async fn persist_transition(
    pool: &MySqlPool,
    before: &ApprovalRequest,
    after: &ApprovalRequest,
) -> Result<(), ApiError> {
    let guard = TransitionGuard::from(before);
    let mut tx = pool.begin().await?;

    let result = sqlx::query(&transition_sql(after.kind))
        .bind(after.status.as_ref())
        .bind(after.current_level)
        .bind(&after.rejection_reason)
        .bind(guard.id)
        .bind(guard.status)
        .bind(guard.current_level)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(ApiError::Conflict);
    }

    for record in changed_records(before, after) {
        sqlx::query(
            r#"
            UPDATE approval_records
            SET status = ?, comment = ?, decided_at = ?
            WHERE kind = ? AND request_id = ? AND level = ?
            "#,
        )
        .bind(record.status.as_ref())
        .bind(&record.comment)
        .bind(record.decided_at)
        .bind(after.kind.as_ref())
        .bind(after.id)
        .bind(record.level)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct AwaitingDecision {
    #[schema(example = 12)]
    pub request_id: u64,
    #[schema(example = 1000)]
    pub requester_id: u64,
    #[schema(example = 2)]
    pub level: u32,
}

/// Pending requests whose current level is assigned to `approver_id`.
pub async fn awaiting(
    pool: &MySqlPool,
    kind: ApprovalKind,
    approver_id: u64,
) -> Result<Vec<AwaitingDecision>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT r.id AS request_id, r.employee_id AS requester_id, a.level
        FROM {} r
        JOIN approval_records a
          ON a.kind = ? AND a.request_id = r.id AND a.level = r.current_level
        WHERE r.status = 'pending'
        AND a.status = 'pending'
        AND a.approver_id = ?
        ORDER BY r.id
        "#,
        kind.table()
    );

    sqlx::query_as::<_, AwaitingDecision>(&sql)
        .bind(kind.as_ref())
        .bind(approver_id)
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approval::{
        AssignedApproverOnly, Decision, RecordStatus, RequestStatus, submit_approval,
    };
    use pretty_assertions::assert_eq;

    fn approvers() -> Vec<Approver> {
        vec![
            Approver {
                id: 11,
                name: "Lead".into(),
            },
            Approver {
                id: 12,
                name: "HR".into(),
            },
        ]
    }

    fn decide(before: &ApprovalRequest, decision: Decision, comment: &str) -> ApprovalRequest {
        submit_approval(
            before,
            before.current_level,
            decision,
            Some(comment.into()),
            11,
            &AssignedApproverOnly,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn update_only_matches_the_state_it_was_read_in() {
        let sql = transition_sql(ApprovalKind::Overtime);
        assert!(sql.contains("UPDATE overtime_requests"));
        let predicate = &sql[sql.find("WHERE").unwrap()..];
        assert!(predicate.contains("id = ?"));
        assert!(predicate.contains("AND status = ?"));
        assert!(predicate.contains("AND current_level = ?"));
    }

    #[test]
    fn guard_binds_the_loaded_version_not_the_new_one() {
        let before = ApprovalRequest::new(8, 500, ApprovalKind::Leave, approvers()).unwrap();
        let after = decide(&before, Decision::Approved, "ok");
        assert_eq!(after.current_level, 2);

        assert_eq!(
            TransitionGuard::from(&before),
            TransitionGuard {
                id: 8,
                status: "pending",
                current_level: 1,
            }
        );
    }

    #[test]
    fn only_the_decided_record_is_rewritten() {
        let before = ApprovalRequest::new(8, 500, ApprovalKind::Leave, approvers()).unwrap();
        let after = decide(&before, Decision::Rejected, "overlaps audit week");

        let changed: Vec<u32> = changed_records(&before, &after).map(|r| r.level).collect();
        assert_eq!(changed, vec![1]);
    }

    /// Needs a MySQL database with `db/schema.sql` applied, named by
    /// `TEST_DATABASE_URL`. Skipped when the variable is unset.
    async fn test_pool() -> Option<MySqlPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(MySqlPool::connect(&url).await.expect("connect to TEST_DATABASE_URL"))
    }

    #[actix_web::test]
    async fn second_decision_from_the_same_snapshot_conflicts() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let employee_id = sqlx::query("INSERT INTO employees (name) VALUES ('Concurrent Tester')")
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();

        let mut request =
            ApprovalRequest::new(0, employee_id, ApprovalKind::Leave, approvers()).unwrap();
        let mut tx = pool.begin().await.unwrap();
        request.id = sqlx::query(
            r#"
            INSERT INTO leave_requests
                (employee_id, start_date, end_date, leave_type, status, current_level)
            VALUES (?, '2026-03-02', '2026-03-03', 'annual', ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(request.status.as_ref())
        .bind(request.current_level)
        .execute(&mut *tx)
        .await
        .unwrap()
        .last_insert_id();
        insert_records(&mut tx, &request).await.unwrap();
        tx.commit().await.unwrap();

        let before = load(&pool, ApprovalKind::Leave, request.id)
            .await
            .unwrap()
            .unwrap();
        let approve = decide(&before, Decision::Approved, "ok");
        let reject = decide(&before, Decision::Rejected, "no");

        persist_transition(&pool, &before, &approve).await.unwrap();
        let err = persist_transition(&pool, &before, &reject)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict));

        let stored = load(&pool, ApprovalKind::Leave, request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        assert_eq!(stored.current_level, 2);
        assert_eq!(stored.rejection_reason, None);
        assert_eq!(stored.approvals[0].status, RecordStatus::Approved);
        assert_eq!(stored.approvals[0].comment.as_deref(), Some("ok"));
        assert_eq!(stored.approvals[1].status, RecordStatus::Pending);
        assert_eq!(stored.approvals[1].decided_at, None);
    }
}
