use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct OvertimeDetails {
    #[schema(example = 5)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-02-14", format = "date", value_type = String)]
    pub work_date: NaiveDate,
    #[schema(example = 2.5)]
    pub hours: f64,
    #[schema(nullable = true)]
    pub reason: Option<String>,
}
