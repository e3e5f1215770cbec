use crate::{
    api::{employee, office, payment, promotion, report, subscription, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(GovernorConfig::default);
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(web::resource("/me").route(web::get().to(user::me)))
            .service(web::resource("/plans").route(web::get().to(subscription::list_plans)))
            .service(
                web::scope("/offices")
                    // /offices
                    .service(
                        web::resource("")
                            .route(web::post().to(office::create_office))
                            .route(web::get().to(office::list_offices)),
                    )
                    // /offices/extend (before /{id})
                    .service(
                        web::resource("/extend")
                            .route(web::patch().to(subscription::extend_office)),
                    )
                    // /offices/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(office::get_office))
                            .route(web::put().to(office::update_office))
                            .route(web::delete().to(office::delete_office)),
                    )
                    .service(
                        web::resource("/{id}/children")
                            .route(web::get().to(office::list_children)),
                    )
                    .service(
                        web::resource("/{id}/subscription")
                            .route(web::get().to(subscription::subscription_status)),
                    )
                    .service(
                        web::resource("/{id}/subscription/extend")
                            .route(web::post().to(subscription::extend_subscription)),
                    )
                    .service(
                        web::resource("/{id}/subscribe")
                            .route(web::post().to(subscription::subscribe)),
                    )
                    .service(
                        web::resource("/{id}/activations")
                            .route(web::get().to(subscription::list_activations)),
                    ),
            )
            .service(
                web::scope("/employees")
                    // /employees
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    // /employees/report
                    .service(
                        web::resource("/report").route(web::get().to(employee::employee_report)),
                    )
                    // /employees/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee::update_employee))
                            .route(web::get().to(employee::get_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/payments")
                    // /payments
                    .service(
                        web::resource("")
                            .route(web::post().to(payment::create_payment))
                            .route(web::get().to(payment::list_payments)),
                    )
                    .service(web::resource("/lookup").route(web::get().to(payment::lookup_payment)))
                    .service(
                        web::resource("/history").route(web::get().to(payment::payment_history)),
                    )
                    .service(
                        web::resource("/copy-next-month")
                            .route(web::post().to(payment::copy_next_month)),
                    )
                    // /payments/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payment::get_payment))
                            .route(web::put().to(payment::update_payment))
                            .route(web::delete().to(payment::delete_payment)),
                    ),
            )
            .service(
                web::scope("/promotions")
                    .service(
                        web::resource("")
                            .route(web::post().to(promotion::create_promotion))
                            .route(web::get().to(promotion::list_promotions)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(promotion::get_promotion))
                            .route(web::put().to(promotion::update_promotion))
                            .route(web::delete().to(promotion::delete_promotion)),
                    ),
            )
            .service(
                web::scope("/reports")
                    .service(web::resource("/tax").route(web::get().to(report::tax_report)))
                    .service(web::resource("/retire").route(web::get().to(report::retire_report))),
            )
            .service(
                web::scope("/users")
                    .service(web::resource("").route(web::get().to(user::list_users)))
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(user::update_user))
                            .route(web::delete().to(user::delete_user)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token + rotated refresh_token

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::bearer;
    use crate::db::lazy_pool;
    use crate::model::role::Role;
    use actix_web::{App, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service};
    use serde_json::json;

    macro_rules! app {
        () => {{
            let config = Config::for_tests();
            init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool()))
                    .app_data(web::Data::new(config.clone()))
                    .configure(|cfg| configure(cfg, config.clone())),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn protected_scope_requires_a_token() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/api/plans")
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn plans_are_served_under_the_api_prefix() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/api/plans")
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .insert_header(bearer(Role::Viewer, Some(1)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn extend_is_not_shadowed_by_office_id_route() {
        let app = app!();
        let req = TestRequest::patch()
            .uri("/api/offices/extend")
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .insert_header(bearer(Role::Viewer, Some(1)))
            .set_json(json!({ "office_id": 1 }))
            .to_request();
        let resp = call_service(&app, req).await;
        // reaches the handler, which refuses non-admins
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
