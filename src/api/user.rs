use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{role::Role, user::User},
    utils::{
        db_utils::{Column, Filter, Page, Paginated, SqlValue, build_update_sql, execute_update},
        email_cache, email_filter,
    },
};

const USER_COLUMNS: &str = "u.id, u.email, u.password, u.mobile, u.first_name, u.last_name, \
    u.id_number, u.role_id, u.office_id, u.is_active, u.last_login_at, u.created_at";

const UPDATABLE_COLUMNS: &[Column] = &[
    Column::id("role_id"),
    Column::id("office_id").nullable(),
    Column::text("first_name").nullable(),
    Column::text("last_name").nullable(),
    Column::text("mobile").nullable(),
    Column::boolean("is_active"),
];

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct UserProfile {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,
    #[sqlx(skip)]
    pub role: Option<Role>,
    #[schema(example = "مديرية التربية")]
    pub office_name: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Matches email, first or last name
    pub search: Option<String>,
    pub role_id: Option<u8>,
    pub office_id: Option<u64>,
}

/// Rejects role ids outside the known set and any change that would lock
/// the calling admin out of their own account.
fn validate_user_update(auth: &AuthUser, user_id: u64, body: &Value) -> ApiResult<()> {
    let role = match body.get("role_id") {
        None => None,
        Some(value) => {
            let role = value
                .as_u64()
                .and_then(|id| u8::try_from(id).ok())
                .and_then(Role::from_id)
                .ok_or_else(|| ApiError::validation("Unknown role"))?;
            Some(role)
        }
    };

    if user_id == auth.user_id {
        let demoted = role.is_some_and(|r| r != Role::Admin);
        let deactivated = body.get("is_active").and_then(Value::as_bool) == Some(false);
        if demoted || deactivated {
            return Err(ApiError::validation(
                "You cannot remove your own admin access",
            ));
        }
    }

    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Signed-in account", body = UserProfile),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<impl Responder> {
    let sql = format!(
        "SELECT {USER_COLUMNS}, o.name AS office_name FROM users u \
         LEFT JOIN offices o ON o.id = u.office_id WHERE u.id = ?"
    );

    let mut profile = sqlx::query_as::<_, UserProfile>(&sql)
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    profile.role = Role::from_id(profile.user.role_id);

    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated accounts", body = UserPage),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;
    let page = Page::new(query.page, query.per_page, 20);

    let mut filter = Filter::new();
    if let Some(role_id) = query.role_id {
        filter.push("u.role_id = ?", SqlValue::U64(role_id.into()));
    }
    if let Some(office_id) = query.office_id {
        filter.push("u.office_id = ?", SqlValue::U64(office_id));
    }
    if let Some(search) = &query.search {
        filter.search(&["u.email", "u.first_name", "u.last_name"], search);
    }
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM users u {where_clause}");
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql =
        format!("SELECT {USER_COLUMNS} FROM users u {where_clause} ORDER BY u.id DESC LIMIT ? OFFSET ?");
    let users = filter
        .bind_as(sqlx::query_as::<_, User>(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(users, page, total)))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    request_body(content = Object, description = "Any of: role_id, office_id, first_name, last_name, mobile, is_active"),
    responses(
        (status = 200, description = "Account updated"),
        (status = 400, description = "Unknown field or role"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    let update = build_update_sql("users", &body, UPDATABLE_COLUMNS, "id", user_id)?;
    validate_user_update(&auth, user_id, &body)?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool.get_ref())
        .await?;
    if exists == 0 {
        return Err(ApiError::not_found("User"));
    }

    execute_update(pool.get_ref(), update).await?;
    info!(user_id, admin_id = auth.user_id, "Account updated");

    Ok(HttpResponse::Ok().json(json!({
        "message": "User updated successfully"
    })))
}

#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 400, description = "Cannot delete your own account"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    if user_id == auth.user_id {
        return Err(ApiError::validation("You cannot delete your own account"));
    }

    let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    email_filter::remove(&email);
    email_cache::forget(&email).await;

    info!(user_id, admin_id = auth.user_id, "Account deleted");

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
    use actix_web::{App, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service};

    fn admin() -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "admin@office.iq".to_string(),
            role: Role::Admin,
            office_id: None,
        }
    }

    #[test]
    fn role_ids_are_checked() {
        assert!(validate_user_update(&admin(), 5, &json!({ "role_id": 3 })).is_ok());
        assert!(validate_user_update(&admin(), 5, &json!({ "role_id": 7 })).is_err());
        assert!(validate_user_update(&admin(), 5, &json!({ "role_id": 300 })).is_err());
        assert!(validate_user_update(&admin(), 5, &json!({ "role_id": "admin" })).is_err());
    }

    #[test]
    fn admins_cannot_lock_themselves_out() {
        assert!(validate_user_update(&admin(), 1, &json!({ "role_id": 4 })).is_err());
        assert!(validate_user_update(&admin(), 1, &json!({ "is_active": false })).is_err());
        assert!(validate_user_update(&admin(), 1, &json!({ "mobile": "0770" })).is_ok());
    }

    #[actix_web::test]
    async fn user_management_is_admin_only() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/users", web::get().to(list_users))
                .route("/users/{id}", web::delete().to(delete_user)),
        )
        .await;

        let req = TestRequest::get()
            .uri("/users")
            .insert_header(bearer(Role::OfficeAdmin, Some(1)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // test tokens are issued for user 1
        let req = TestRequest::delete()
            .uri("/users/1")
            .insert_header(bearer(Role::Admin, None))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn is_active_must_be_a_boolean() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/users/{id}", web::put().to(update_user)),
        )
        .await;

        for body in [json!({ "is_active": 0 }), json!({ "role_id": "4" })] {
            let req = TestRequest::put()
                .uri("/users/1")
                .insert_header(bearer(Role::Admin, None))
                .set_json(body)
                .to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let req = TestRequest::put()
            .uri("/users/1")
            .insert_header(bearer(Role::Admin, None))
            .set_json(json!({ "is_active": false }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
