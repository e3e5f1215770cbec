use crate::{
    api::office::fetch_office,
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::office::OfficeActivation,
    subscription::{
        PlanInfo, SubscriptionPlan, SubscriptionStatus, ensure_not_shortened, extend_expiry,
        status_at, validate_duration, validate_period,
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, Transaction};
use strum::IntoEnumIterator;
use tracing::{error, info, warn};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ExtendOfficeReq {
    #[schema(example = 3)]
    pub office_id: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct ExtendSubscriptionReq {
    #[schema(example = 30)]
    pub duration_in_days: i64,
    /// Free-form origin of the request (e.g. "renewal-page")
    pub triggered_by: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SubscribeReq {
    pub plan: SubscriptionPlan,
    #[schema(value_type = String, format = "date-time")]
    pub subscription_start: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub subscription_end: DateTime<Utc>,
    #[schema(example = "billing@office.iq")]
    pub email: Option<String>,
    #[serde(default)]
    pub auto_renew: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ExtensionResponse {
    #[schema(example = "Subscription extended")]
    pub message: String,
    pub office_id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub subscription_expires_at: DateTime<Utc>,
    /// Set when the extension succeeded but the activation log write failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SubscriptionSummary {
    pub office_id: u64,
    pub plan: Option<String>,
    pub status: SubscriptionStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub subscription_start: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub subscription_expires_at: Option<DateTime<Utc>>,
    #[schema(example = 12)]
    pub days_remaining: i64,
    pub auto_renew: bool,
}

/// Pushes the office's expiry forward by `days` inside `tx`. The row is
/// locked so concurrent extensions stack instead of overwriting each other.
async fn push_expiry(
    tx: &mut Transaction<'_, MySql>,
    office_id: u64,
    days: i64,
    now: DateTime<Utc>,
) -> ApiResult<DateTime<Utc>> {
    let current = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT subscription_expires_at FROM offices WHERE id = ? FOR UPDATE",
    )
    .bind(office_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Office"))?;

    let expires_at = extend_expiry(current, now, days);

    sqlx::query(
        r#"
        UPDATE offices
        SET subscription_expires_at = ?,
            subscription_end = ?,
            subscription_start = COALESCE(subscription_start, ?),
            subscription_status = ?
        WHERE id = ?
        "#,
    )
    .bind(expires_at)
    .bind(expires_at)
    .bind(now)
    .bind(SubscriptionStatus::Active.as_ref())
    .bind(office_id)
    .execute(&mut **tx)
    .await?;

    Ok(expires_at)
}

/// Records who activated the office. Failures are reported, not propagated.
async fn log_activation(
    pool: &MySqlPool,
    office_id: u64,
    admin_id: u64,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Option<String> {
    let result = sqlx::query(
        r#"
        INSERT INTO office_activations (office_id, admin_id, activated_at, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(office_id)
    .bind(admin_id)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => None,
        Err(e) => {
            error!(error = %e, office_id, admin_id, "Failed to log office activation");
            Some("Subscription extended but the activation log could not be written".to_string())
        }
    }
}

#[utoipa::path(
    patch,
    path = "/api/offices/extend",
    request_body = ExtendOfficeReq,
    responses(
        (status = 200, description = "Expiry pushed forward", body = ExtensionResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Office not found")
    ),
    tag = "Subscription",
    security(("bearer_auth" = []))
)]
pub async fn extend_office(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<ExtendOfficeReq>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;

    let office_id = payload.office_id;
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    let expires_at = push_expiry(&mut tx, office_id, config.subscription_extension_days, now).await?;
    tx.commit().await?;

    info!(
        office_id,
        admin_id = auth.user_id,
        expires_at = %expires_at,
        "Office subscription extended"
    );

    let warning = log_activation(pool.get_ref(), office_id, auth.user_id, now, expires_at).await;

    Ok(HttpResponse::Ok().json(ExtensionResponse {
        message: "Subscription extended".to_string(),
        office_id,
        subscription_expires_at: expires_at,
        warning,
    }))
}

#[utoipa::path(
    post,
    path = "/api/offices/{office_id}/subscription/extend",
    params(("office_id", Path, description = "Office ID")),
    request_body = ExtendSubscriptionReq,
    responses(
        (status = 200, description = "Expiry pushed forward", body = ExtensionResponse),
        (status = 400, description = "Invalid duration"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Office not found")
    ),
    tag = "Subscription",
    security(("bearer_auth" = []))
)]
pub async fn extend_subscription(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ExtendSubscriptionReq>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;
    validate_duration(payload.duration_in_days)?;

    let office_id = path.into_inner();
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    let expires_at = push_expiry(&mut tx, office_id, payload.duration_in_days, now).await?;
    tx.commit().await?;

    info!(
        office_id,
        admin_id = auth.user_id,
        days = payload.duration_in_days,
        triggered_by = payload.triggered_by.as_deref().unwrap_or("api"),
        expires_at = %expires_at,
        "Office subscription extended"
    );

    let warning = log_activation(pool.get_ref(), office_id, auth.user_id, now, expires_at).await;

    Ok(HttpResponse::Ok().json(ExtensionResponse {
        message: format!("Subscription extended by {} days", payload.duration_in_days),
        office_id,
        subscription_expires_at: expires_at,
        warning,
    }))
}

#[utoipa::path(
    post,
    path = "/api/offices/{office_id}/subscribe",
    params(("office_id", Path, description = "Office ID")),
    request_body = SubscribeReq,
    responses(
        (status = 201, description = "Subscription recorded", body = SubscriptionSummary),
        (status = 400, description = "End is not after start"),
        (status = 404, description = "Office not found"),
        (status = 409, description = "End is earlier than the current expiry")
    ),
    tag = "Subscription",
    security(("bearer_auth" = []))
)]
pub async fn subscribe(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SubscribeReq>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;
    validate_period(payload.subscription_start, payload.subscription_end)?;

    let office_id = path.into_inner();
    let (status, days_remaining) = status_at(Some(payload.subscription_end), Utc::now());

    let mut tx = pool.begin().await?;

    let current = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT subscription_expires_at FROM offices WHERE id = ? FOR UPDATE",
    )
    .bind(office_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Office"))?;

    ensure_not_shortened(current, payload.subscription_end)?;

    sqlx::query(
        r#"
        UPDATE offices
        SET subscription_plan = ?,
            subscription_start = ?,
            subscription_end = ?,
            subscription_expires_at = ?,
            subscription_status = ?,
            auto_renew = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.plan.as_ref())
    .bind(payload.subscription_start)
    .bind(payload.subscription_end)
    .bind(payload.subscription_end)
    .bind(status.as_ref())
    .bind(payload.auto_renew)
    .bind(office_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO office_subscriptions
            (office_id, email, subscription_plan, subscription_start, subscription_end, auto_renew, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(office_id)
    .bind(&payload.email)
    .bind(payload.plan.as_ref())
    .bind(payload.subscription_start)
    .bind(payload.subscription_end)
    .bind(payload.auto_renew)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(office_id, plan = %payload.plan, admin_id = auth.user_id, "Office subscribed");

    Ok(HttpResponse::Created().json(SubscriptionSummary {
        office_id,
        plan: Some(payload.plan.to_string()),
        status,
        subscription_start: Some(payload.subscription_start),
        subscription_expires_at: Some(payload.subscription_end),
        days_remaining,
        auto_renew: payload.auto_renew,
    }))
}

#[utoipa::path(
    get,
    path = "/api/offices/{office_id}/subscription",
    params(("office_id", Path, description = "Office ID")),
    responses(
        (status = 200, description = "Subscription status", body = SubscriptionSummary),
        (status = 404, description = "Office not found")
    ),
    tag = "Subscription",
    security(("bearer_auth" = []))
)]
pub async fn subscription_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let office_id = path.into_inner();
    auth.ensure_office_access(office_id)?;

    let office = fetch_office(pool.get_ref(), office_id).await?;
    let (status, days_remaining) = status_at(office.subscription_expires_at, Utc::now());

    if status == SubscriptionStatus::Expired {
        warn!(office_id, "Office subscription has expired");
    }

    Ok(HttpResponse::Ok().json(SubscriptionSummary {
        office_id,
        plan: office.subscription_plan,
        status,
        subscription_start: office.subscription_start,
        subscription_expires_at: office.subscription_expires_at,
        days_remaining,
        auto_renew: office.auto_renew,
    }))
}

#[utoipa::path(
    get,
    path = "/api/offices/{office_id}/activations",
    params(("office_id", Path, description = "Office ID")),
    responses(
        (status = 200, description = "Activation log, newest first", body = [OfficeActivation])
    ),
    tag = "Subscription",
    security(("bearer_auth" = []))
)]
pub async fn list_activations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let office_id = path.into_inner();
    auth.ensure_office_access(office_id)?;

    let activations = sqlx::query_as::<_, OfficeActivation>(
        r#"
        SELECT id, office_id, admin_id, activated_at, expires_at
        FROM office_activations
        WHERE office_id = ?
        ORDER BY activated_at DESC, id DESC
        "#,
    )
    .bind(office_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(activations))
}

#[utoipa::path(
    get,
    path = "/api/plans",
    responses((status = 200, description = "Available subscription plans", body = [PlanInfo])),
    tag = "Subscription",
    security(("bearer_auth" = []))
)]
pub async fn list_plans(_auth: AuthUser) -> impl Responder {
    let plans: Vec<PlanInfo> = SubscriptionPlan::iter().map(|plan| plan.info()).collect();
    HttpResponse::Ok().json(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::bearer;
    use crate::db::lazy_pool;
    use crate::model::role::Role;
    use actix_web::{App, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service, read_body_json};
    use serde_json::json;

    macro_rules! app {
        () => {
            init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool()))
                    .app_data(web::Data::new(Config::for_tests()))
                    .route("/offices/extend", web::patch().to(extend_office))
                    .route("/offices/{id}/subscription/extend", web::post().to(extend_subscription))
                    .route("/offices/{id}/subscribe", web::post().to(subscribe))
                    .route("/plans", web::get().to(list_plans)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn extend_requires_admin() {
        let app = app!();
        let req = TestRequest::patch()
            .uri("/offices/extend")
            .insert_header(bearer(Role::OfficeAdmin, Some(3)))
            .set_json(json!({ "office_id": 3 }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn non_positive_duration_is_rejected() {
        let app = app!();
        for days in [0, -5] {
            let req = TestRequest::post()
                .uri("/offices/3/subscription/extend")
                .insert_header(bearer(Role::Admin, None))
                .set_json(json!({ "duration_in_days": days, "triggered_by": "test" }))
                .to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn subscription_end_must_follow_start() {
        let app = app!();
        let req = TestRequest::post()
            .uri("/offices/3/subscribe")
            .insert_header(bearer(Role::Admin, None))
            .set_json(json!({
                "plan": "professional",
                "subscription_start": "2025-03-01T00:00:00Z",
                "subscription_end": "2025-02-01T00:00:00Z"
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn plans_are_listed_in_order() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/plans")
            .insert_header(bearer(Role::Viewer, Some(1)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let plans: serde_json::Value = read_body_json(resp).await;
        assert_eq!(plans[0]["plan"], "basic");
        assert_eq!(plans[1]["monthly_price"], 20000);
        assert_eq!(plans[2]["plan"], "enterprise");
    }
}
