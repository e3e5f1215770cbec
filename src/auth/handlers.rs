use crate::{
    auth::{
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::role::Role,
    models::{Claims, LoginReqDto, RegisterReq, TokenType, UserSql},
    utils::{email_cache, email_filter},
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> bool {
    let email = email_filter::normalize(email);

    // 1️⃣ Cuckoo filter: fast negative
    if !email_filter::might_exist(&email) {
        return true;
    }

    // 2️⃣ Moka cache: fast positive
    if email_cache::is_taken(&email).await {
        return false;
    }

    // 3️⃣ Database fallback
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(pool)
        .await
        .unwrap_or(1); // fail-safe

    if count > 0 {
        email_cache::mark_taken(&email).await;
        return false;
    }

    true
}

pub fn validate_registration(req: &RegisterReq) -> ApiResult<Role> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password must not be empty"));
    }

    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ApiError::validation("Email address is not valid"));
    }

    if req.password.chars().count() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }

    let role = match req.role_id {
        None => Role::Viewer,
        Some(id) => Role::from_id(id).ok_or_else(|| ApiError::validation("Unknown role"))?,
    };

    if role == Role::Admin {
        return Err(ApiError::Forbidden(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    if role != Role::Viewer && req.office_id.is_none() {
        return Err(ApiError::validation("office_id is required for this role"));
    }

    Ok(role)
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = Object, example = json!({
            "message": "User registered successfully"
        })),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Auth"
)]
pub async fn register(
    user: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let role = validate_registration(&user)?;
    let email = email_filter::normalize(&user.email);

    if !is_email_available(&email, pool.get_ref()).await {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let hashed = hash_password(&user.password)?;

    sqlx::query(
        r#"
        INSERT INTO users
            (email, password, mobile, first_name, last_name, id_number, role_id, office_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&email)
    .bind(&hashed)
    .bind(&user.mobile)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.id_number)
    .bind(role.id())
    .bind(user.office_id)
    .execute(pool.get_ref())
    .await?;

    // keep the fast paths in sync with the table
    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;

    info!(email = %email, role = %role, "Account registered");

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully"
    })))
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
}

async fn store_refresh_token(pool: &MySqlPool, claims: &Claims) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(pool)
    .await
    .map(|_| ())
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.email.trim().is_empty() || user.password.is_empty() {
        return Err(ApiError::validation("Email and password required"));
    }

    let email = email_filter::normalize(&user.email);

    // 2️⃣ Fetch account
    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, email, password, role_id, office_id, is_active
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: account not found");
        ApiError::Unauthorized("Invalid credentials".to_string())
    })?;

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account disabled");
        return Err(ApiError::Unauthorized("Account is disabled".to_string()));
    }

    // 3️⃣ Verify password
    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    // 4️⃣ Issue tokens
    let subject = TokenSubject::from(&db_user);

    let access_token =
        generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)?;

    // 5️⃣ Store refresh token
    debug!(user_id = db_user.id, jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool.get_ref(), &refresh_claims).await?;

    // 6️⃣ Update last_login_at (non-fatal)
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    email_cache::mark_taken(&email).await;
    info!("Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
    }))
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Identity for a rotated token pair. Missing or disabled accounts get none.
fn refresh_subject(account: Option<&UserSql>) -> ApiResult<TokenSubject> {
    match account {
        Some(user) if user.is_active => Ok(TokenSubject::from(user)),
        Some(_) => Err(ApiError::Unauthorized("Account is disabled".to_string())),
        None => Err(ApiError::Unauthorized("Account not found".to_string())),
    }
}

#[derive(sqlx::FromRow)]
struct RefreshRecord {
    id: u64,
    revoked: bool,
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated tokens", body = LoginResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let token =
        bearer_token(&req).ok_or_else(|| ApiError::Unauthorized("No token".to_string()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthorized("Refresh token required".to_string()));
    }

    let mut tx = pool.begin().await?;

    // 🔍 find refresh token in DB
    let record = sqlx::query_as::<_, RefreshRecord>(
        "SELECT id, revoked FROM refresh_tokens WHERE jti = ? FOR UPDATE",
    )
    .bind(&claims.jti)
    .fetch_optional(&mut *tx)
    .await?;

    let record = match record {
        Some(r) if !r.revoked => r,
        _ => return Err(ApiError::Unauthorized("Refresh token revoked".to_string())),
    };

    // 🔥 revoke old refresh token
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

    // 👤 role, office and status come from the account, not the old token
    let account = sqlx::query_as::<_, UserSql>(
        "SELECT id, email, password, role_id, office_id, is_active FROM users WHERE id = ?",
    )
    .bind(claims.user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let subject = match refresh_subject(account.as_ref()) {
        Ok(subject) => subject,
        Err(e) => {
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
                .bind(claims.user_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(user_id = claims.user_id, "Refresh refused: account missing or disabled");
            return Err(e);
        }
    };

    // 🔄 issue new pair
    let (new_refresh_token, new_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)?;

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(new_claims.user_id)
    .bind(&new_claims.jti)
    .bind(new_claims.exp as i64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let access_token =
        generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token: new_refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Signed out (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    // only refresh tokens can be revoked
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, jti = %claims.jti, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::lazy_pool;
    use actix_web::{App, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service};

    fn request(email: &str, password: &str, role_id: Option<u8>) -> RegisterReq {
        RegisterReq {
            email: email.to_string(),
            password: password.to_string(),
            first_name: None,
            last_name: None,
            id_number: None,
            mobile: None,
            role_id,
            office_id: None,
        }
    }

    #[test]
    fn registration_defaults_to_viewer() {
        let role = validate_registration(&request("a@office.iq", "long-enough", None)).unwrap();
        assert_eq!(role, Role::Viewer);
    }

    #[test]
    fn registration_rejects_bad_input() {
        assert!(validate_registration(&request("", "long-enough", None)).is_err());
        assert!(validate_registration(&request("no-at-sign", "long-enough", None)).is_err());
        assert!(validate_registration(&request("a@office.iq", "short", None)).is_err());
        assert!(validate_registration(&request("a@office.iq", "long-enough", Some(9))).is_err());
        assert!(matches!(
            validate_registration(&request("a@office.iq", "long-enough", Some(1))),
            Err(ApiError::Forbidden(_))
        ));
    }

    fn account(is_active: bool) -> UserSql {
        UserSql {
            id: 7,
            email: "clerk@office.iq".to_string(),
            password: String::new(),
            role_id: 4,
            office_id: Some(2),
            is_active,
        }
    }

    #[test]
    fn rotated_tokens_follow_the_account_row() {
        let subject = refresh_subject(Some(&account(true))).unwrap();
        assert_eq!(subject.user_id, 7);
        assert_eq!(subject.role, 4);
        assert_eq!(subject.office_id, Some(2));

        assert!(matches!(
            refresh_subject(Some(&account(false))),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(refresh_subject(None), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn office_roles_need_an_office() {
        let mut clerk = request("clerk@office.iq", "long-enough", Some(3));
        assert!(matches!(validate_registration(&clerk), Err(ApiError::Validation(_))));
        assert!(validate_registration(&request("m@office.iq", "long-enough", Some(2))).is_err());

        clerk.office_id = Some(4);
        assert_eq!(validate_registration(&clerk).unwrap(), Role::Accountant);
    }

    #[actix_web::test]
    async fn login_with_blank_fields_is_bad_request() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "email": " ", "password": "" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn refresh_with_access_token_is_rejected() {
        let config = Config::for_tests();
        let subject = TokenSubject {
            user_id: 1,
            email: "a@office.iq".to_string(),
            role: 3,
            office_id: None,
        };
        let access = generate_access_token(&subject, &config.jwt_secret, 60).unwrap();

        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config))
                .route("/auth/refresh", web::post().to(refresh_token)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn logout_without_token_is_no_content() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/logout", web::post().to(logout)),
        )
        .await;

        let req = TestRequest::post().uri("/auth/logout").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
