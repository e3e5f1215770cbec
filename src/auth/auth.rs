use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,

    /// Present only if the account is bound to an office
    pub office_id: Option<u64>,
}

impl TryFrom<Claims> for AuthUser {
    type Error = ApiError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized("Access token required".to_string()));
        }

        let role = Role::from_id(claims.role)
            .ok_or_else(|| ApiError::Unauthorized("Invalid role".to_string()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            role,
            office_id: claims.office_id,
        })
    }
}

fn authenticate(req: &HttpRequest) -> ApiResult<AuthUser> {
    // Set by auth_middleware on protected scopes
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_string()))?;

    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| ApiError::Internal("Config missing".to_string()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;

    AuthUser::try_from(claims)
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin only".to_string()))
        }
    }

    /// Admin, office admin or accountant
    pub fn require_editor(&self) -> ApiResult<()> {
        if self.role.can_edit() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Read-only account".to_string()))
        }
    }

    /// Office filter to apply for this caller. Admins may look at any office;
    /// everyone else is pinned to their own, and an account not yet bound to
    /// an office sees none.
    pub fn office_scope(&self, requested: Option<u64>) -> ApiResult<Option<u64>> {
        match (self.is_admin(), self.office_id) {
            (true, _) => Ok(requested),
            (false, None) => Err(ApiError::Forbidden(
                "Account is not assigned to an office".to_string(),
            )),
            (false, Some(own)) => match requested {
                Some(other) if other != own => {
                    Err(ApiError::Forbidden("Access to this office is not allowed".to_string()))
                }
                _ => Ok(Some(own)),
            },
        }
    }

    pub fn ensure_office_access(&self, office_id: u64) -> ApiResult<()> {
        self.office_scope(Some(office_id)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, office_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "u@office.iq".to_string(),
            role,
            office_id,
        }
    }

    #[test]
    fn admins_see_any_office() {
        let admin = user(Role::Admin, Some(1));
        assert_eq!(admin.office_scope(None).unwrap(), None);
        assert_eq!(admin.office_scope(Some(5)).unwrap(), Some(5));
    }

    #[test]
    fn office_bound_users_are_pinned() {
        let clerk = user(Role::Accountant, Some(3));
        assert_eq!(clerk.office_scope(None).unwrap(), Some(3));
        assert_eq!(clerk.office_scope(Some(3)).unwrap(), Some(3));
        assert!(matches!(clerk.office_scope(Some(4)), Err(ApiError::Forbidden(_))));
        assert!(clerk.ensure_office_access(4).is_err());
    }

    #[test]
    fn unbound_accounts_reach_no_office() {
        let clerk = user(Role::Accountant, None);
        assert!(matches!(clerk.office_scope(Some(42)), Err(ApiError::Forbidden(_))));
        assert!(matches!(clerk.office_scope(None), Err(ApiError::Forbidden(_))));
        assert!(clerk.ensure_office_access(42).is_err());
        assert!(user(Role::Viewer, None).office_scope(None).is_err());
    }

    #[test]
    fn viewers_are_read_only() {
        assert!(user(Role::Viewer, None).require_editor().is_err());
        assert!(user(Role::OfficeAdmin, None).require_editor().is_ok());
        assert!(user(Role::OfficeAdmin, None).require_admin().is_err());
    }

    #[test]
    fn refresh_claims_are_not_accepted_as_access() {
        let claims = Claims {
            user_id: 1,
            sub: "u@office.iq".to_string(),
            role: 1,
            exp: usize::MAX,
            jti: "x".to_string(),
            token_type: TokenType::Refresh,
            office_id: None,
        };
        assert!(AuthUser::try_from(claims).is_err());
    }
}
