use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// A recorded grade/level/salary change effective on `due_date`.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Promotion {
    pub id: u64,
    pub employee_id: u64,
    pub old_degree: Option<i32>,
    pub old_level: Option<i32>,
    pub old_salary: Option<f64>,
    pub new_degree: Option<i32>,
    pub new_level: Option<i32>,
    pub new_salary: Option<f64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
    pub note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
