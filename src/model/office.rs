use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 3,
        "parent_id": 1,
        "name": "مديرية التربية",
        "address": "بغداد",
        "email": "office@example.iq",
        "phone_number": "07700000000",
        "subscription_plan": "professional",
        "subscription_status": "active",
        "subscription_start": "2025-01-01T00:00:00Z",
        "subscription_end": "2025-02-01T00:00:00Z",
        "subscription_expires_at": "2025-02-01T00:00:00Z",
        "auto_renew": false,
        "created_at": "2025-01-01T00:00:00Z"
    })
)]
pub struct Office {
    pub id: u64,
    /// Parent office in the hierarchy
    pub parent_id: Option<u64>,
    pub name: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub subscription_plan: Option<String>,
    pub subscription_status: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub subscription_start: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub subscription_end: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct OfficeActivation {
    pub id: u64,
    pub office_id: u64,
    pub admin_id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub activated_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct OfficeSubscription {
    pub id: u64,
    pub office_id: u64,
    pub email: Option<String>,
    pub subscription_plan: String,
    #[schema(value_type = String, format = "date-time")]
    pub subscription_start: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub subscription_end: DateTime<Utc>,
    pub auto_renew: bool,
    pub created_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
