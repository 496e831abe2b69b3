use sqlx::MySqlPool;

use crate::model::attendance::{Attendance, CheckInMethod};
use crate::model::department::{Department, DepartmentRow};

/// Departments an employee may check in at: their own plus any headquarters.
pub async fn departments_for_employee(
    pool: &MySqlPool,
    employee_id: u64,
) -> Result<Vec<Department>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DepartmentRow>(
        r#"
        SELECT d.id, d.name, d.latitude, d.longitude, d.radius_meters,
               d.gps_status, d.allowed_ips, d.disabled_at
        FROM departments d
        WHERE d.is_headquarters = 1
           OR d.id = (SELECT e.department_id FROM employees e WHERE e.id = ?)
        ORDER BY d.id
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Department::from).collect())
}

pub enum CheckInOutcome {
    Recorded,
    AlreadyCheckedIn,
}

pub async fn record_check_in(
    pool: &MySqlPool,
    employee_id: u64,
    method: CheckInMethod,
    check_in_point_id: u64,
    distance_meters: Option<u64>,
) -> Result<CheckInOutcome, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance
            (employee_id, date, check_in, method, check_in_point_id, distance_meters)
        VALUES (?, CURDATE(), CURTIME(), ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(method.as_ref())
    .bind(check_in_point_id)
    .bind(distance_meters)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(CheckInOutcome::Recorded),
        // Duplicate check-in for same day
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23000") => {
            Ok(CheckInOutcome::AlreadyCheckedIn)
        }
        Err(e) => Err(e),
    }
}

/// Returns false when there is no open check-in today.
pub async fn record_check_out(pool: &MySqlPool, employee_id: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE attendance
        SET check_out = CURTIME()
        WHERE employee_id = ?
        AND date = CURDATE()
        AND check_out IS NULL
        "#,
    )
    .bind(employee_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn today(pool: &MySqlPool, employee_id: u64) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(
        r#"
        SELECT id, employee_id, date, check_in, check_out, method,
               check_in_point_id, distance_meters
        FROM attendance
        WHERE employee_id = ? AND date = CURDATE()
        "#,
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await
}
