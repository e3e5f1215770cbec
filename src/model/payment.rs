use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::payroll::PayComponents;

/// Monthly payroll record. `net_credits`, `net_debits` and `net_salary` are
/// written at save time but every read recomputes them from the inputs.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Payment {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub month: NaiveDate,
    pub degree: i32,
    pub level: i32,
    pub salary: f64,
    pub certificate_percentage: f64,
    pub risk_percentage: f64,
    pub manage_percentage: f64,
    pub retire_percentage: f64,
    pub trans_pay: f64,
    pub kids_pay: f64,
    pub marriage_pay: f64,
    pub net_credits: f64,
    pub net_debits: f64,
    pub net_salary: f64,
    pub note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn components(&self) -> PayComponents {
        PayComponents {
            salary: self.salary,
            certificate_percentage: self.certificate_percentage,
            risk_percentage: self.risk_percentage,
            manage_percentage: self.manage_percentage,
            retire_percentage: self.retire_percentage,
            trans_pay: self.trans_pay,
            kids_pay: self.kids_pay,
            marriage_pay: self.marriage_pay,
        }
    }
}

/// Column list matching [`Payment`], for `SELECT {PAYMENT_COLUMNS} FROM payments p`.
pub const PAYMENT_COLUMNS: &str = "p.id, p.employee_id, p.month, p.degree, p.level, p.salary, \
    p.certificate_percentage, p.risk_percentage, p.manage_percentage, p.retire_percentage, \
    p.trans_pay, p.kids_pay, p.marriage_pay, p.net_credits, p.net_debits, p.net_salary, \
    p.note, p.created_at, p.updated_at";
