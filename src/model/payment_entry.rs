use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::payroll::LedgerLine;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryType {
    Credit,
    Debit,
}

/// Row as stored; `entry_type` is kept as text in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentEntryRow {
    pub id: u64,
    pub payment_id: u64,
    pub entry_type: String,
    pub title: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentEntry {
    pub id: u64,
    pub payment_id: u64,
    pub entry_type: EntryType,
    pub title: String,
    pub amount: f64,
}

impl TryFrom<PaymentEntryRow> for PaymentEntry {
    type Error = ApiError;

    fn try_from(row: PaymentEntryRow) -> Result<Self, Self::Error> {
        let entry_type = row.entry_type.parse::<EntryType>().map_err(|_| {
            tracing::error!(entry_id = row.id, entry_type = %row.entry_type, "Unknown entry type");
            ApiError::Internal(format!("Payment entry {} has an unknown type", row.id))
        })?;

        Ok(PaymentEntry {
            id: row.id,
            payment_id: row.payment_id,
            entry_type,
            title: row.title,
            amount: row.amount,
        })
    }
}

impl PaymentEntry {
    pub fn ledger_line(&self) -> LedgerLine {
        LedgerLine {
            entry_type: self.entry_type,
            amount: self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(entry_type: &str) -> PaymentEntryRow {
        PaymentEntryRow {
            id: 7,
            payment_id: 3,
            entry_type: entry_type.to_string(),
            title: "ضريبة".to_string(),
            amount: 12.5,
        }
    }

    #[test]
    fn stored_type_is_parsed() {
        let entry = PaymentEntry::try_from(row("debit")).unwrap();
        assert_eq!(entry.entry_type, EntryType::Debit);
        assert_eq!(entry.ledger_line().amount, 12.5);
        assert_eq!(EntryType::Credit.as_ref(), "credit");
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(PaymentEntry::try_from(row("refund")).is_err());
    }
}
