use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::employee::employee_office,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::promotion::Promotion,
    payroll::{calc::validate_non_negative, period::{month_bounds, parse_month}},
    utils::db_utils::{
        Column, Filter, Page, Paginated, SqlValue, build_update_sql, execute_update,
    },
};

const PROMOTION_COLUMNS: &str = "pr.id, pr.employee_id, pr.old_degree, pr.old_level, \
    pr.old_salary, pr.new_degree, pr.new_level, pr.new_salary, pr.due_date, pr.note, pr.created_at";

const UPDATABLE_COLUMNS: &[Column] = &[
    Column::int("old_degree").nullable(),
    Column::int("old_level").nullable(),
    Column::number("old_salary").nullable(),
    Column::int("new_degree").nullable(),
    Column::int("new_level").nullable(),
    Column::number("new_salary").nullable(),
    Column::date("due_date").nullable(),
    Column::text("note").nullable(),
];

#[derive(Deserialize, ToSchema)]
pub struct CreatePromotion {
    #[schema(example = 12)]
    pub employee_id: u64,
    #[schema(example = 6)]
    pub old_degree: Option<i32>,
    #[schema(example = 2)]
    pub old_level: Option<i32>,
    #[schema(example = 500000.0)]
    pub old_salary: Option<f64>,
    #[schema(example = 5)]
    pub new_degree: Option<i32>,
    #[schema(example = 1)]
    pub new_level: Option<i32>,
    #[schema(example = 560000.0)]
    pub new_salary: Option<f64>,
    #[schema(example = "2025-07-01", format = "date", value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
    pub note: Option<String>,
}

impl CreatePromotion {
    fn validate(&self) -> ApiResult<()> {
        validate_salaries(self.old_salary, self.new_salary)
    }
}

fn validate_salaries(old_salary: Option<f64>, new_salary: Option<f64>) -> ApiResult<()> {
    if let Some(old) = old_salary {
        validate_non_negative("old_salary", old)?;
    }
    if let Some(new) = new_salary {
        validate_non_negative("new_salary", new)?;
    }
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PromotionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// `YYYY-MM`; promotions falling due in that month
    pub due_month: Option<String>,
    /// Employee first or last name
    pub search: Option<String>,
    pub office_id: Option<u64>,
}

/// Promotion joined with the employee it belongs to.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct PromotionRow {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    pub office_id: u64,
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

async fn promotion_office(pool: &MySqlPool, promotion_id: u64) -> ApiResult<u64> {
    sqlx::query_scalar::<_, u64>(
        "SELECT e.office_id FROM promotions pr JOIN employees e ON e.id = pr.employee_id WHERE pr.id = ?",
    )
    .bind(promotion_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Promotion"))
}

#[utoipa::path(
    post,
    path = "/api/promotions",
    request_body = CreatePromotion,
    responses(
        (status = 201, description = "Promotion recorded", body = Object, example = json!({
            "message": "Promotion created successfully", "id": 8
        })),
        (status = 400, description = "Negative salary"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Promotion"
)]
pub async fn create_promotion(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePromotion>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    payload.validate()?;

    let office_id = employee_office(pool.get_ref(), payload.employee_id).await?;
    auth.ensure_office_access(office_id)?;

    let result = sqlx::query(
        r#"
        INSERT INTO promotions
        (employee_id, old_degree, old_level, old_salary, new_degree, new_level, new_salary, due_date, note)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.old_degree)
    .bind(payload.old_level)
    .bind(payload.old_salary)
    .bind(payload.new_degree)
    .bind(payload.new_level)
    .bind(payload.new_salary)
    .bind(payload.due_date)
    .bind(&payload.note)
    .execute(pool.get_ref())
    .await?;

    let id = result.last_insert_id();
    info!(promotion_id = id, employee_id = payload.employee_id, "Promotion created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Promotion created successfully",
        "id": id
    })))
}

#[utoipa::path(
    get,
    path = "/api/promotions",
    params(PromotionQuery),
    responses(
        (status = 200, description = "Paginated promotions", body = PromotionPage),
        (status = 400, description = "Invalid due month")
    ),
    security(("bearer_auth" = [])),
    tag = "Promotion"
)]
pub async fn list_promotions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PromotionQuery>,
) -> ApiResult<impl Responder> {
    let page = Page::new(query.page, query.per_page, 20);

    let mut filter = Filter::new();
    if let Some(raw) = &query.due_month {
        let (first, next) = month_bounds(parse_month(raw)?);
        filter
            .push("pr.due_date >= ?", SqlValue::Date(first))
            .push("pr.due_date < ?", SqlValue::Date(next));
    }
    if let Some(office_id) = auth.office_scope(query.office_id)? {
        filter.push("e.office_id = ?", SqlValue::U64(office_id));
    }
    if let Some(search) = &query.search {
        filter.search(&["e.first_name", "e.last_name"], search);
    }
    let where_clause = filter.where_clause();

    let count_sql = format!(
        "SELECT COUNT(*) FROM promotions pr JOIN employees e ON e.id = pr.employee_id {where_clause}"
    );
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        r#"
        SELECT pr.id, pr.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
               e.office_id, pr.old_degree, pr.old_level, pr.old_salary, pr.new_degree,
               pr.new_level, pr.new_salary, pr.due_date, pr.note, pr.created_at
        FROM promotions pr
        JOIN employees e ON e.id = pr.employee_id
        {where_clause}
        ORDER BY pr.due_date DESC, pr.id DESC
        LIMIT ? OFFSET ?
        "#
    );

    let rows = filter
        .bind_as(sqlx::query_as::<_, PromotionRow>(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(rows, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/promotions/{promotion_id}",
    params(("promotion_id", Path, description = "Promotion ID")),
    responses(
        (status = 200, body = Promotion),
        (status = 404, description = "Promotion not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Promotion"
)]
pub async fn get_promotion(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let promotion_id = path.into_inner();

    let office_id = promotion_office(pool.get_ref(), promotion_id).await?;
    auth.ensure_office_access(office_id)?;

    let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions pr WHERE pr.id = ?");
    let promotion = sqlx::query_as::<_, Promotion>(&sql)
        .bind(promotion_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Promotion"))?;

    Ok(HttpResponse::Ok().json(promotion))
}

#[utoipa::path(
    put,
    path = "/api/promotions/{promotion_id}",
    params(("promotion_id", Path, description = "Promotion ID")),
    request_body(content = Object, description = "Any of the promotion fields except employee_id"),
    responses(
        (status = 200, description = "Promotion updated"),
        (status = 400, description = "Unknown field or negative salary"),
        (status = 404, description = "Promotion not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Promotion"
)]
pub async fn update_promotion(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    let promotion_id = path.into_inner();

    let update = build_update_sql("promotions", &body, UPDATABLE_COLUMNS, "id", promotion_id)?;
    validate_salaries(
        body.get("old_salary").and_then(Value::as_f64),
        body.get("new_salary").and_then(Value::as_f64),
    )?;

    let office_id = promotion_office(pool.get_ref(), promotion_id).await?;
    auth.ensure_office_access(office_id)?;

    execute_update(pool.get_ref(), update).await?;
    info!(promotion_id, user_id = auth.user_id, "Promotion updated");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Promotion updated successfully"
    })))
}

#[utoipa::path(
    delete,
    path = "/api/promotions/{promotion_id}",
    params(("promotion_id", Path, description = "Promotion ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Promotion not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Promotion"
)]
pub async fn delete_promotion(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    let promotion_id = path.into_inner();

    let office_id = promotion_office(pool.get_ref(), promotion_id).await?;
    auth.ensure_office_access(office_id)?;

    sqlx::query("DELETE FROM promotions WHERE id = ?")
        .bind(promotion_id)
        .execute(pool.get_ref())
        .await?;

    info!(promotion_id, user_id = auth.user_id, "Promotion deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::bearer;
    use crate::config::Config;
    use crate::db::lazy_pool;
    use crate::model::role::Role;
    use actix_web::{App, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service};

    macro_rules! app {
        () => {
            init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool()))
                    .app_data(web::Data::new(Config::for_tests()))
                    .route("/promotions", web::post().to(create_promotion))
                    .route("/promotions", web::get().to(list_promotions))
                    .route("/promotions/{id}", web::put().to(update_promotion)),
            )
            .await
        };
    }

    #[test]
    fn salaries_must_not_be_negative() {
        assert!(validate_salaries(Some(100.0), None).is_ok());
        assert!(validate_salaries(None, Some(-1.0)).is_err());
        assert!(validate_salaries(Some(-0.5), Some(10.0)).is_err());
    }

    #[actix_web::test]
    async fn negative_new_salary_is_rejected() {
        let app = app!();
        let req = TestRequest::post()
            .uri("/promotions")
            .insert_header(bearer(Role::Accountant, Some(1)))
            .set_json(json!({ "employee_id": 1, "new_salary": -5.0 }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn bad_due_month_is_rejected() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/promotions?due_month=july")
            .insert_header(bearer(Role::Viewer, Some(1)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn employee_cannot_be_reassigned() {
        let app = app!();
        let req = TestRequest::put()
            .uri("/promotions/3")
            .insert_header(bearer(Role::OfficeAdmin, Some(1)))
            .set_json(json!({ "employee_id": 99 }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn salary_given_as_text_is_rejected_on_update() {
        let app = app!();
        let req = TestRequest::put()
            .uri("/promotions/3")
            .insert_header(bearer(Role::OfficeAdmin, Some(1)))
            .set_json(json!({ "new_salary": "-500" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn negative_salary_is_rejected_on_update() {
        let app = app!();
        let req = TestRequest::put()
            .uri("/promotions/3")
            .insert_header(bearer(Role::OfficeAdmin, Some(1)))
            .set_json(json!({ "old_salary": -1.5 }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
