use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    payroll::{
        calc::{percent_of, round2, validate_percentage},
        period::{format_month, parse_month},
    },
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaxReportQuery {
    /// Required for accounts not bound to an office
    pub office_id: Option<u64>,
    /// `YYYY-MM`
    pub month: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RetireReportQuery {
    pub office_id: Option<u64>,
    /// `YYYY-MM`
    pub month: String,
    /// Defaults to the configured retirement percentage
    pub percentage: Option<f64>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TaxRow {
    pub employee_id: u64,
    pub employee_name: String,
    pub amount: f64,
}

#[derive(Serialize, ToSchema)]
pub struct TaxReport {
    pub office_id: u64,
    #[schema(example = "2025-05")]
    pub month: String,
    pub rows: Vec<TaxRow>,
    pub count: usize,
    pub total: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct SalaryRow {
    employee_id: u64,
    employee_name: String,
    salary: f64,
}

#[derive(Serialize, ToSchema)]
pub struct RetireRow {
    pub employee_id: u64,
    pub employee_name: String,
    pub salary: f64,
    pub amount: f64,
}

#[derive(Serialize, ToSchema)]
pub struct RetireReport {
    pub office_id: u64,
    #[schema(example = "2025-05")]
    pub month: String,
    #[schema(example = 15.0)]
    pub percentage: f64,
    pub rows: Vec<RetireRow>,
    pub count: usize,
    pub total_salary: f64,
    pub total: f64,
}

fn report_office(auth: &AuthUser, requested: Option<u64>) -> ApiResult<u64> {
    auth.office_scope(requested)?
        .ok_or_else(|| ApiError::validation("office_id is required"))
}

impl RetireReport {
    fn build(office_id: u64, month: String, percentage: f64, salaries: Vec<SalaryRow>) -> Self {
        let rows: Vec<RetireRow> = salaries
            .into_iter()
            .map(|row| RetireRow {
                amount: percent_of(row.salary, percentage),
                employee_id: row.employee_id,
                employee_name: row.employee_name,
                salary: row.salary,
            })
            .collect();

        let total_salary: f64 = rows.iter().map(|r| r.salary).sum();
        let total: f64 = rows.iter().map(|r| r.amount).sum();

        Self {
            office_id,
            month,
            percentage,
            count: rows.len(),
            total_salary: round2(total_salary),
            total: round2(total),
            rows: rows
                .into_iter()
                .map(|r| RetireRow {
                    amount: round2(r.amount),
                    ..r
                })
                .collect(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/reports/tax",
    params(TaxReportQuery),
    responses(
        (status = 200, description = "Tax deductions of one office for one month", body = TaxReport),
        (status = 400, description = "Missing office or invalid month")
    ),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn tax_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<TaxReportQuery>,
) -> ApiResult<impl Responder> {
    let office_id = report_office(&auth, query.office_id)?;
    let month = parse_month(&query.month)?;

    debug!(office_id, month = %format_month(month), title = %config.tax_entry_title, "Building tax report");

    let rows = sqlx::query_as::<_, TaxRow>(
        r#"
        SELECT e.id AS employee_id,
               CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
               pe.amount
        FROM payment_entries pe
        JOIN payments p ON p.id = pe.payment_id
        JOIN employees e ON e.id = p.employee_id
        WHERE pe.entry_type = 'debit'
          AND pe.title = ?
          AND e.office_id = ?
          AND p.month = ?
        ORDER BY e.first_name, e.last_name
        "#,
    )
    .bind(&config.tax_entry_title)
    .bind(office_id)
    .bind(month)
    .fetch_all(pool.get_ref())
    .await?;

    let total = round2(rows.iter().map(|r| r.amount).sum());

    Ok(HttpResponse::Ok().json(TaxReport {
        office_id,
        month: format_month(month),
        count: rows.len(),
        total,
        rows,
    }))
}

#[utoipa::path(
    get,
    path = "/api/reports/retire",
    params(RetireReportQuery),
    responses(
        (status = 200, description = "Retirement contributions at the requested percentage", body = RetireReport),
        (status = 400, description = "Missing office, invalid month or percentage")
    ),
    security(("bearer_auth" = [])),
    tag = "Report"
)]
pub async fn retire_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<RetireReportQuery>,
) -> ApiResult<impl Responder> {
    let office_id = report_office(&auth, query.office_id)?;
    let month = parse_month(&query.month)?;
    let percentage = query.percentage.unwrap_or(config.default_retire_percentage);
    validate_percentage("percentage", percentage)?;

    let salaries = sqlx::query_as::<_, SalaryRow>(
        r#"
        SELECT e.id AS employee_id,
               CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
               p.salary
        FROM payments p
        JOIN employees e ON e.id = p.employee_id
        WHERE e.office_id = ? AND p.month = ?
        ORDER BY e.first_name, e.last_name
        "#,
    )
    .bind(office_id)
    .bind(month)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(RetireReport::build(
        office_id,
        format_month(month),
        percentage,
        salaries,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::bearer;
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
                    .route("/reports/tax", web::get().to(tax_report))
                    .route("/reports/retire", web::get().to(retire_report)),
            )
            .await
        };
    }

    fn salary(id: u64, salary: f64) -> SalaryRow {
        SalaryRow {
            employee_id: id,
            employee_name: format!("موظف {id}"),
            salary,
        }
    }

    #[test]
    fn retire_report_applies_percentage() {
        let report = RetireReport::build(
            3,
            "2025-05".to_string(),
            15.0,
            vec![salary(1, 1000.0), salary(2, 333.4)],
        );

        assert_eq!(report.count, 2);
        assert_eq!(report.rows[0].amount, 150.0);
        assert_eq!(report.rows[1].amount, 50.01);
        assert_eq!(report.total_salary, 1333.4);
        assert_eq!(report.total, 200.01);
    }

    #[actix_web::test]
    async fn admins_must_name_an_office() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/reports/tax?month=2025-05")
            .insert_header(bearer(Role::Admin, None))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn percentage_outside_range_is_rejected() {
        let app = app!();
        for pct in ["-1", "100.5"] {
            let req = TestRequest::get()
                .uri(&format!("/reports/retire?office_id=1&month=2025-05&percentage={pct}"))
                .insert_header(bearer(Role::Admin, None))
                .to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn office_bound_users_cannot_report_other_offices() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/reports/tax?office_id=4&month=2025-05")
            .insert_header(bearer(Role::Accountant, Some(1)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
