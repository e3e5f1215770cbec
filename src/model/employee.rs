use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "office_id": 3,
        "first_name": "علي",
        "last_name": "حسن",
        "id_number": "199012345678",
        "phone_no": "07701234567",
        "email": "ali@example.iq",
        "address": "بغداد",
        "certificate": "بكالوريوس",
        "job_title": "محاسب",
        "hire_date": "2015-03-01",
        "birthdate": "1990-06-15",
        "bank": "الرافدين",
        "bank_account": "IQ0000000000",
        "notes": null,
        "created_at": "2025-01-01T00:00:00Z"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 3)]
    pub office_id: u64,

    pub first_name: String,

    pub last_name: String,

    pub id_number: Option<String>,

    pub phone_no: Option<String>,

    pub email: Option<String>,

    pub address: Option<String>,

    pub certificate: Option<String>,

    pub job_title: Option<String>,

    #[schema(value_type = Option<String>, format = "date")]
    pub hire_date: Option<NaiveDate>,

    #[schema(value_type = Option<String>, format = "date")]
    pub birthdate: Option<NaiveDate>,

    pub bank: Option<String>,

    pub bank_account: Option<String>,

    pub notes: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
