use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::ApiError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionPlan {
    Basic,
    Professional,
    Enterprise,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanInfo {
    pub plan: SubscriptionPlan,
    pub title: String,
    /// Monthly price in Iraqi dinars
    pub monthly_price: u32,
    pub features: Vec<String>,
    pub popular: bool,
}

impl SubscriptionPlan {
    pub fn monthly_price(&self) -> u32 {
        match self {
            SubscriptionPlan::Basic => 0,
            SubscriptionPlan::Professional => 20_000,
            SubscriptionPlan::Enterprise => 30_000,
        }
    }

    pub fn info(&self) -> PlanInfo {
        let (title, features, popular) = match self {
            SubscriptionPlan::Basic => (
                "الخطة الأساسية",
                vec!["بحث عن راتب موظف", "بحث عن ترقية"],
                false,
            ),
            SubscriptionPlan::Professional => (
                "الخطة الاحترافية",
                vec!["إدارة الرواتب", "طباعة التقارير", "إدارة الترقيات"],
                true,
            ),
            SubscriptionPlan::Enterprise => (
                "الخطة المؤسسية",
                vec!["كل الميزات الاحترافية", "دعم فني", "إدارة متعددة المستخدمين"],
                false,
            ),
        };

        PlanInfo {
            plan: *self,
            title: title.to_string(),
            monthly_price: self.monthly_price(),
            features: features.into_iter().map(String::from).collect(),
            popular,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Inactive,
}

/// New expiry after adding `days`, counted from whichever is later of the
/// current expiry and `now`. The result is never earlier than `current`.
pub fn extend_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    days: i64,
) -> DateTime<Utc> {
    let base = match current {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    base + Duration::days(days)
}

pub fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ApiError> {
    if end <= start {
        return Err(ApiError::validation(
            "subscription_end must be after subscription_start",
        ));
    }
    Ok(())
}

/// A new subscription may not end before the office's current expiry.
pub fn ensure_not_shortened(
    current: Option<DateTime<Utc>>,
    new_end: DateTime<Utc>,
) -> Result<(), ApiError> {
    match current {
        Some(expiry) if new_end < expiry => Err(ApiError::Conflict(format!(
            "subscription_end must not be earlier than the current expiry {}",
            expiry.format("%Y-%m-%d")
        ))),
        _ => Ok(()),
    }
}

pub fn validate_duration(days: i64) -> Result<(), ApiError> {
    if days <= 0 {
        return Err(ApiError::validation("duration_in_days must be greater than 0"));
    }
    // Keeps chrono's Duration arithmetic well inside its range
    if days > 3650 {
        return Err(ApiError::validation("duration_in_days must not exceed 3650"));
    }
    Ok(())
}

/// Status and whole days left until `expires_at`.
pub fn status_at(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (SubscriptionStatus, i64) {
    match expires_at {
        None => (SubscriptionStatus::Inactive, 0),
        Some(expiry) if expiry > now => (SubscriptionStatus::Active, (expiry - now).num_days()),
        Some(_) => (SubscriptionStatus::Expired, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use strum::IntoEnumIterator;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn extends_from_now_when_expired_or_missing() {
        let now = at(2025, 5, 10);
        assert_eq!(extend_expiry(None, now, 30), at(2025, 6, 9));
        assert_eq!(extend_expiry(Some(at(2025, 1, 1)), now, 30), at(2025, 6, 9));
    }

    #[test]
    fn extends_from_future_expiry() {
        let now = at(2025, 5, 10);
        let current = at(2025, 5, 20);
        let extended = extend_expiry(Some(current), now, 30);
        assert_eq!(extended, at(2025, 6, 19));
        assert!(extended > current);
    }

    #[test]
    fn resubscribing_never_moves_expiry_back() {
        let current = Some(at(2025, 9, 1));
        assert!(matches!(
            ensure_not_shortened(current, at(2025, 8, 1)),
            Err(ApiError::Conflict(_))
        ));
        assert!(ensure_not_shortened(current, at(2025, 9, 1)).is_ok());
        assert!(ensure_not_shortened(current, at(2026, 1, 1)).is_ok());
        assert!(ensure_not_shortened(None, at(2020, 1, 1)).is_ok());
    }

    #[test]
    fn period_end_must_follow_start() {
        assert!(validate_period(at(2025, 1, 1), at(2025, 2, 1)).is_ok());
        assert!(validate_period(at(2025, 2, 1), at(2025, 2, 1)).is_err());
        assert!(validate_period(at(2025, 3, 1), at(2025, 2, 1)).is_err());
    }

    #[test]
    fn duration_must_be_positive() {
        assert!(validate_duration(0).is_err());
        assert!(validate_duration(-5).is_err());
        assert!(validate_duration(90).is_ok());
    }

    #[test]
    fn status_reports_remaining_days() {
        let now = at(2025, 5, 10);
        assert_eq!(status_at(None, now), (SubscriptionStatus::Inactive, 0));
        assert_eq!(status_at(Some(at(2025, 5, 1)), now), (SubscriptionStatus::Expired, 0));
        assert_eq!(status_at(Some(at(2025, 5, 20)), now), (SubscriptionStatus::Active, 10));
    }

    #[test]
    fn plans_parse_from_snake_case() {
        assert_eq!(
            "professional".parse::<SubscriptionPlan>().unwrap(),
            SubscriptionPlan::Professional
        );
        let prices: Vec<u32> = SubscriptionPlan::iter().map(|p| p.monthly_price()).collect();
        assert_eq!(prices, vec![0, 20_000, 30_000]);
        assert!(SubscriptionPlan::Professional.info().popular);
    }
}
