use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::employee::Employee,
    utils::db_utils::{
        Column, Filter, Page, Paginated, SqlValue, build_update_sql, execute_update,
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

const EMPLOYEE_COLUMNS: &str = "e.id, e.office_id, e.first_name, e.last_name, e.id_number, \
    e.phone_no, e.email, e.address, e.certificate, e.job_title, e.hire_date, e.birthdate, \
    e.bank, e.bank_account, e.notes, e.created_at";

const UPDATABLE_COLUMNS: &[Column] = &[
    Column::id("office_id"),
    Column::text("first_name"),
    Column::text("last_name"),
    Column::text("id_number").nullable(),
    Column::text("phone_no").nullable(),
    Column::text("email").nullable(),
    Column::text("address").nullable(),
    Column::text("certificate").nullable(),
    Column::text("job_title").nullable(),
    Column::date("hire_date").nullable(),
    Column::date("birthdate").nullable(),
    Column::text("bank").nullable(),
    Column::text("bank_account").nullable(),
    Column::text("notes").nullable(),
];

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = 3)]
    pub office_id: u64,
    #[schema(example = "علي")]
    pub first_name: String,
    #[schema(example = "حسن")]
    pub last_name: String,
    #[schema(example = "199012345678")]
    pub id_number: Option<String>,
    #[schema(example = "07701234567")]
    pub phone_no: Option<String>,
    #[schema(example = "ali@example.iq", format = "email")]
    pub email: Option<String>,
    pub address: Option<String>,
    #[schema(example = "بكالوريوس")]
    pub certificate: Option<String>,
    #[schema(example = "محاسب")]
    pub job_title: Option<String>,
    #[schema(example = "2015-03-01", format = "date", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    #[schema(example = "1990-06-15", format = "date", value_type = Option<String>)]
    pub birthdate: Option<NaiveDate>,
    pub bank: Option<String>,
    pub bank_account: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub office_id: Option<u64>,
    /// Exact job title, e.g. "محاسب"
    pub job_title: Option<String>,
    /// Search by first or last name
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeReportQuery {
    pub office_id: Option<u64>,
    pub job_title: Option<String>,
}

/// Roster line for the printable employee list.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct EmployeeReportRow {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub id_number: Option<String>,
    pub job_title: Option<String>,
    pub certificate: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub hire_date: Option<NaiveDate>,
    pub office_id: u64,
    pub office_name: String,
}

fn validate_names(first_name: &str, last_name: &str) -> ApiResult<()> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(ApiError::validation("first_name and last_name are required"));
    }
    Ok(())
}

fn validate_dates(birthdate: Option<NaiveDate>, hire_date: Option<NaiveDate>) -> ApiResult<()> {
    if let (Some(born), Some(hired)) = (birthdate, hire_date) {
        if hired <= born {
            return Err(ApiError::validation("hire_date must be after birthdate"));
        }
    }
    Ok(())
}

/// Conditions shared by the employee list and the roster report.
fn employee_filter(
    auth: &AuthUser,
    office_id: Option<u64>,
    job_title: Option<&str>,
) -> ApiResult<Filter> {
    let mut filter = Filter::new();
    if let Some(office_id) = auth.office_scope(office_id)? {
        filter.push("e.office_id = ?", SqlValue::U64(office_id));
    }
    if let Some(title) = job_title.map(str::trim).filter(|t| !t.is_empty()) {
        filter.push("e.job_title = ?", SqlValue::String(title.to_string()));
    }
    Ok(filter)
}

/// Office the employee belongs to, or 404.
pub(crate) async fn employee_office(pool: &MySqlPool, employee_id: u64) -> ApiResult<u64> {
    sqlx::query_scalar::<_, u64>("SELECT office_id FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee"))
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = Object, example = json!({
            "message": "Employee created successfully", "id": 12
        })),
        (status = 400, description = "Validation failed or office does not exist"),
        (status = 403, description = "Read-only account or foreign office")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    auth.ensure_office_access(payload.office_id)?;
    validate_names(&payload.first_name, &payload.last_name)?;
    validate_dates(payload.birthdate, payload.hire_date)?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (office_id, first_name, last_name, id_number, phone_no, email, address,
         certificate, job_title, hire_date, birthdate, bank, bank_account, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.office_id)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&payload.id_number)
    .bind(&payload.phone_no)
    .bind(&payload.email)
    .bind(&payload.address)
    .bind(&payload.certificate)
    .bind(&payload.job_title)
    .bind(payload.hire_date)
    .bind(payload.birthdate)
    .bind(&payload.bank)
    .bind(&payload.bank_account)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, office_id = payload.office_id, "Failed to create employee");
        ApiError::from(e)
    })?;

    let id = result.last_insert_id();
    info!(employee_id = id, office_id = payload.office_id, user_id = auth.user_id, "Employee created");

    Ok(HttpResponse::Created().json(json!({
        "message": "Employee created successfully",
        "id": id
    })))
}

// -------------------- Handler --------------------

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeePage)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> ApiResult<impl Responder> {
    let page = Page::new(query.page, query.per_page, 20);

    // ---------- build WHERE clause dynamically ----------
    let mut filter = employee_filter(&auth, query.office_id, query.job_title.as_deref())?;
    if let Some(search) = &query.search {
        filter.search(&["e.first_name", "e.last_name"], search);
    }
    let where_clause = filter.where_clause();

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM employees e {where_clause}");
    debug!(sql = %count_sql, bindings = ?filter.values(), "Counting employees");

    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees e {where_clause} ORDER BY e.id DESC LIMIT ? OFFSET ?"
    );
    debug!(sql = %data_sql, page = page.page, per_page = page.per_page, "Fetching employees");

    let employees = filter
        .bind_as(sqlx::query_as::<_, Employee>(&data_sql))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Paginated::new(employees, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/employees/report",
    params(EmployeeReportQuery),
    responses(
        (status = 200, description = "Employees ordered by first name with office names", body = [EmployeeReportRow])
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn employee_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeReportQuery>,
) -> ApiResult<impl Responder> {
    let filter = employee_filter(&auth, query.office_id, query.job_title.as_deref())?;

    let sql = format!(
        r#"
        SELECT e.id, e.first_name, e.last_name, e.id_number, e.job_title, e.certificate,
               e.hire_date, e.office_id, o.name AS office_name
        FROM employees e
        JOIN offices o ON o.id = e.office_id
        {}
        ORDER BY e.first_name, e.last_name
        "#,
        filter.where_clause()
    );

    let rows = filter
        .bind_as(sqlx::query_as::<_, EmployeeReportRow>(&sql))
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    request_body(content = Object, description = "Any subset of the employee fields"),
    responses(
        (status = 200, description = "Employee updated successfully", body = Object, example = json!({
            "message": "Employee updated successfully"
        })),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    let employee_id = path.into_inner();

    let update = build_update_sql("employees", &body, UPDATABLE_COLUMNS, "id", employee_id)?;

    for field in ["first_name", "last_name"] {
        if let Some(value) = body.get(field) {
            if value.as_str().map(str::trim).is_none_or(str::is_empty) {
                return Err(ApiError::validation(format!("{field} must not be empty")));
            }
        }
    }

    let current_office = employee_office(pool.get_ref(), employee_id).await?;
    auth.ensure_office_access(current_office)?;

    if let Some(new_office) = body.get("office_id").and_then(Value::as_u64) {
        auth.ensure_office_access(new_office)?;
    }

    execute_update(pool.get_ref(), update).await?;
    info!(employee_id, user_id = auth.user_id, "Employee updated");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Employee updated successfully"
    })))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee still has payments or promotions")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    let employee_id = path.into_inner();

    let office_id = employee_office(pool.get_ref(), employee_id).await?;
    auth.ensure_office_access(office_id)?;

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to delete employee");
            ApiError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee"));
    }

    info!(employee_id, user_id = auth.user_id, "Employee deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "error": "not_found", "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let employee_id = path.into_inner();

    let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees e WHERE e.id = ?");
    let employee = sqlx::query_as::<_, Employee>(&sql)
        .bind(employee_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Employee"))?;

    auth.ensure_office_access(employee.office_id)?;

    Ok(HttpResponse::Ok().json(employee))
}
