pub mod employee;
pub mod office;
pub mod payment;
pub mod promotion;
pub mod report;
pub mod subscription;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::jwt::{TokenSubject, generate_access_token};
    use crate::config::Config;
    use crate::model::role::Role;

    /// `Authorization` header value for a freshly signed access token.
    pub fn bearer(role: Role, office_id: Option<u64>) -> (&'static str, String) {
        let subject = TokenSubject {
            user_id: 1,
            email: "tester@office.iq".to_string(),
            role: role.id(),
            office_id,
        };
        let token = generate_access_token(&subject, &Config::for_tests().jwt_secret, 300)
            .expect("token signs");
        ("Authorization", format!("Bearer {token}"))
    }
}
