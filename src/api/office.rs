use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::office::Office,
    utils::db_utils::{
        Column, Filter, Page, Paginated, SqlValue, build_update_sql, execute_update,
    },
};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const OFFICE_COLUMNS: &str = "o.id, o.parent_id, o.name, o.address, o.email, o.phone_number, \
    o.subscription_plan, o.subscription_status, o.subscription_start, o.subscription_end, \
    o.subscription_expires_at, o.auto_renew, o.created_at";

const UPDATABLE_COLUMNS: &[Column] = &[
    Column::text("name"),
    Column::id("parent_id").nullable(),
    Column::text("address").nullable(),
    Column::text("email").nullable(),
    Column::text("phone_number").nullable(),
];

// Guards against walking a corrupted parent chain forever
const MAX_HIERARCHY_DEPTH: usize = 64;

#[derive(Deserialize, ToSchema)]
pub struct CreateOffice {
    #[schema(example = "مديرية التربية")]
    pub name: String,
    #[schema(example = 1)]
    pub parent_id: Option<u64>,
    pub address: Option<String>,
    #[schema(example = "office@example.iq", format = "email")]
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OfficeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Matches office names containing the term
    pub search: Option<String>,
    pub parent_id: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct OfficeDetail {
    #[serde(flatten)]
    pub office: Office,
    #[schema(example = "وزارة التربية")]
    pub parent_name: Option<String>,
}

pub(crate) async fn fetch_office(pool: &MySqlPool, office_id: u64) -> ApiResult<Office> {
    let sql = format!("SELECT {OFFICE_COLUMNS} FROM offices o WHERE o.id = ?");
    sqlx::query_as::<_, Office>(&sql)
        .bind(office_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Office"))
}

async fn office_exists(pool: &MySqlPool, office_id: u64) -> ApiResult<bool> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM offices WHERE id = ?")
        .bind(office_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Walks up from `new_parent` and fails if `office_id` shows up on the way,
/// which would turn the hierarchy into a cycle.
async fn ensure_not_descendant(pool: &MySqlPool, office_id: u64, new_parent: u64) -> ApiResult<()> {
    let mut current = Some(new_parent);
    let mut depth = 0;

    while let Some(id) = current {
        if id == office_id {
            return Err(ApiError::validation(
                "An office cannot be moved under itself or one of its children",
            ));
        }

        depth += 1;
        if depth > MAX_HIERARCHY_DEPTH {
            return Err(ApiError::Internal("Office hierarchy is too deep".to_string()));
        }

        current = sqlx::query_scalar::<_, Option<u64>>("SELECT parent_id FROM offices WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Parent office"))?;
    }

    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/offices",
    request_body = CreateOffice,
    responses(
        (status = 201, description = "Office created", body = Object, example = json!({
            "message": "Office created successfully", "id": 4
        })),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Parent office not found")
    ),
    tag = "Office",
    security(("bearer_auth" = []))
)]
pub async fn create_office(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateOffice>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Office name is required"));
    }

    if let Some(parent_id) = payload.parent_id {
        if !office_exists(pool.get_ref(), parent_id).await? {
            return Err(ApiError::not_found("Parent office"));
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO offices (name, parent_id, address, email, phone_number)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(payload.parent_id)
    .bind(&payload.address)
    .bind(&payload.email)
    .bind(&payload.phone_number)
    .execute(pool.get_ref())
    .await?;

    let id = result.last_insert_id();
    info!(office_id = id, admin_id = auth.user_id, "Office created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Office created successfully",
        "id": id
    })))
}

#[utoipa::path(
    get,
    path = "/api/offices",
    params(OfficeQuery),
    responses(
        (status = 200, description = "Paginated office list", body = OfficePage)
    ),
    tag = "Office",
    security(("bearer_auth" = []))
)]
pub async fn list_offices(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OfficeQuery>,
) -> ApiResult<impl Responder> {
    let page = Page::new(query.page, query.per_page, 20);

    let mut filter = Filter::new();
    if let Some(own) = auth.office_scope(None)? {
        filter.push("o.id = ?", SqlValue::U64(own));
    }
    if let Some(parent_id) = query.parent_id {
        filter.push("o.parent_id = ?", SqlValue::U64(parent_id));
    }
    if let Some(search) = &query.search {
        filter.search(&["o.name"], search);
    }
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM offices o {where_clause}");
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {OFFICE_COLUMNS} FROM offices o {where_clause} ORDER BY o.name LIMIT ? OFFSET ?"
    );
    debug!(sql = %data_sql, page = page.page, per_page = page.per_page, "Fetching offices");

    let offices = filter
        .bind_as(sqlx::query_as::<_, Office>(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(offices, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/offices/{office_id}",
    params(("office_id", Path, description = "Office ID")),
    responses(
        (status = 200, description = "Office found", body = OfficeDetail),
        (status = 404, description = "Office not found")
    ),
    tag = "Office",
    security(("bearer_auth" = []))
)]
pub async fn get_office(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let office_id = path.into_inner();
    auth.ensure_office_access(office_id)?;

    let office = fetch_office(pool.get_ref(), office_id).await?;

    let parent_name = match office.parent_id {
        Some(parent_id) => {
            sqlx::query_scalar::<_, String>("SELECT name FROM offices WHERE id = ?")
                .bind(parent_id)
                .fetch_optional(pool.get_ref())
                .await?
        }
        None => None,
    };

    Ok(HttpResponse::Ok().json(OfficeDetail {
        office,
        parent_name,
    }))
}

#[utoipa::path(
    get,
    path = "/api/offices/{office_id}/children",
    params(("office_id", Path, description = "Office ID")),
    responses(
        (status = 200, description = "Direct children of the office", body = [Office]),
        (status = 404, description = "Office not found")
    ),
    tag = "Office",
    security(("bearer_auth" = []))
)]
pub async fn list_children(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let office_id = path.into_inner();
    auth.ensure_office_access(office_id)?;

    if !office_exists(pool.get_ref(), office_id).await? {
        return Err(ApiError::not_found("Office"));
    }

    let sql = format!("SELECT {OFFICE_COLUMNS} FROM offices o WHERE o.parent_id = ? ORDER BY o.name");
    let children = sqlx::query_as::<_, Office>(&sql)
        .bind(office_id)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(children))
}

/// Update Office
#[utoipa::path(
    put,
    path = "/api/offices/{office_id}",
    params(("office_id", Path, description = "Office ID")),
    request_body(content = Object, description = "Any of: name, parent_id, address, email, phone_number"),
    responses(
        (status = 200, description = "Office updated", body = Object, example = json!({
            "message": "Office updated successfully"
        })),
        (status = 400, description = "Unknown field or invalid hierarchy"),
        (status = 404, description = "Office not found")
    ),
    tag = "Office",
    security(("bearer_auth" = []))
)]
pub async fn update_office(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;
    let office_id = path.into_inner();

    let update = build_update_sql("offices", &body, UPDATABLE_COLUMNS, "id", office_id)?;

    if let Some(name) = body.get("name") {
        if name.as_str().map(str::trim).is_none_or(str::is_empty) {
            return Err(ApiError::validation("Office name is required"));
        }
    }

    let new_parent = body.get("parent_id").and_then(Value::as_u64);
    if new_parent == Some(office_id) {
        return Err(ApiError::validation("An office cannot be its own parent"));
    }

    if !office_exists(pool.get_ref(), office_id).await? {
        return Err(ApiError::not_found("Office"));
    }

    if let Some(parent) = new_parent {
        ensure_not_descendant(pool.get_ref(), office_id, parent).await?;
    }

    execute_update(pool.get_ref(), update).await?;
    info!(office_id, admin_id = auth.user_id, "Office updated");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Office updated successfully"
    })))
}

/// Delete Office
#[utoipa::path(
    delete,
    path = "/api/offices/{office_id}",
    params(("office_id", Path, description = "Office ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Office not found"),
        (status = 409, description = "Office still has children or employees")
    ),
    tag = "Office",
    security(("bearer_auth" = []))
)]
pub async fn delete_office(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;
    let office_id = path.into_inner();

    let (children, employees) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM offices WHERE parent_id = ?),
            (SELECT COUNT(*) FROM employees WHERE office_id = ?)
        "#,
    )
    .bind(office_id)
    .bind(office_id)
    .fetch_one(pool.get_ref())
    .await?;

    if children > 0 || employees > 0 {
        return Err(ApiError::Conflict(format!(
            "Office still has {children} child offices and {employees} employees"
        )));
    }

    let result = sqlx::query("DELETE FROM offices WHERE id = ?")
        .bind(office_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Office"));
    }

    info!(office_id, admin_id = auth.user_id, "Office deleted");

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
                    .route("/offices", web::post().to(create_office))
                    .route("/offices/{id}", web::get().to(get_office))
                    .route("/offices/{id}", web::put().to(update_office))
                    .route("/offices/{id}", web::delete().to(delete_office)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn anonymous_requests_are_rejected() {
        let app = app!();
        let req = TestRequest::get().uri("/offices/1").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn only_admins_create_offices() {
        let app = app!();
        let req = TestRequest::post()
            .uri("/offices")
            .insert_header(bearer(Role::OfficeAdmin, Some(2)))
            .set_json(json!({ "name": "فرع" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn blank_name_is_rejected() {
        let app = app!();
        let req = TestRequest::post()
            .uri("/offices")
            .insert_header(bearer(Role::Admin, None))
            .set_json(json!({ "name": "   " }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn update_rejects_subscription_columns() {
        let app = app!();
        let req = TestRequest::put()
            .uri("/offices/3")
            .insert_header(bearer(Role::Admin, None))
            .set_json(json!({ "subscription_expires_at": "2099-01-01" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn office_bound_users_cannot_open_other_offices() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/offices/9")
            .insert_header(bearer(Role::Viewer, Some(2)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn parent_id_must_be_numeric_on_update() {
        let app = app!();
        let req = TestRequest::put()
            .uri("/offices/2")
            .insert_header(bearer(Role::Admin, None))
            .set_json(json!({ "parent_id": "3" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn office_cannot_become_its_own_parent() {
        let app = app!();
        let req = TestRequest::put()
            .uri("/offices/2")
            .insert_header(bearer(Role::Admin, None))
            .set_json(json!({ "parent_id": 2 }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
