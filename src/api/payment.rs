use std::collections::HashMap;

use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::employee::employee_office,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        payment::{PAYMENT_COLUMNS, Payment},
        payment_entry::{EntryType, PaymentEntry, PaymentEntryRow},
    },
    payroll::{
        BreakdownTotals, LedgerLine, PayComponents, SalaryBreakdown,
        period::{format_month, next_month, parse_month},
    },
    utils::db_utils::{Filter, SqlValue},
};

// Keeps IN (...) lists well below the placeholder limit
const ENTRY_BATCH: usize = 500;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EntryInput {
    pub entry_type: EntryType,
    #[schema(example = "ضريبة")]
    pub title: String,
    #[schema(example = 25000.0)]
    pub amount: f64,
}

impl EntryInput {
    fn validate(&self) -> ApiResult<()> {
        if self.title.trim().is_empty() {
            return Err(ApiError::validation("Entry title must not be empty"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(ApiError::validation(format!(
                "Entry {:?} must have a non-negative amount",
                self.title
            )));
        }
        Ok(())
    }

    fn ledger_line(&self) -> LedgerLine {
        LedgerLine {
            entry_type: self.entry_type,
            amount: self.amount,
        }
    }
}

impl From<&PaymentEntry> for EntryInput {
    fn from(entry: &PaymentEntry) -> Self {
        EntryInput {
            entry_type: entry.entry_type,
            title: entry.title.clone(),
            amount: entry.amount,
        }
    }
}

fn validate_entries(entries: &[EntryInput]) -> ApiResult<()> {
    entries.iter().try_for_each(EntryInput::validate)
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePayment {
    #[schema(example = 12)]
    pub employee_id: u64,

    /// `YYYY-MM` or any date inside the month
    #[schema(example = "2025-05")]
    pub month: String,

    #[serde(default)]
    #[schema(example = 5)]
    pub degree: i32,

    #[serde(default)]
    #[schema(example = 3)]
    pub level: i32,

    #[serde(flatten)]
    pub components: PayComponents,

    pub note: Option<String>,

    #[serde(default)]
    pub entries: Vec<EntryInput>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePayment {
    pub degree: Option<i32>,
    pub level: Option<i32>,
    pub salary: Option<f64>,
    pub certificate_percentage: Option<f64>,
    pub risk_percentage: Option<f64>,
    pub manage_percentage: Option<f64>,
    pub retire_percentage: Option<f64>,
    pub trans_pay: Option<f64>,
    pub kids_pay: Option<f64>,
    pub marriage_pay: Option<f64>,
    pub note: Option<String>,
    /// Replaces every existing entry when present
    pub entries: Option<Vec<EntryInput>>,
}

impl UpdatePayment {
    fn merged(&self, current: PayComponents) -> PayComponents {
        PayComponents {
            salary: self.salary.unwrap_or(current.salary),
            certificate_percentage: self
                .certificate_percentage
                .unwrap_or(current.certificate_percentage),
            risk_percentage: self.risk_percentage.unwrap_or(current.risk_percentage),
            manage_percentage: self.manage_percentage.unwrap_or(current.manage_percentage),
            retire_percentage: self.retire_percentage.unwrap_or(current.retire_percentage),
            trans_pay: self.trans_pay.unwrap_or(current.trans_pay),
            kids_pay: self.kids_pay.unwrap_or(current.kids_pay),
            marriage_pay: self.marriage_pay.unwrap_or(current.marriage_pay),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaymentDetail {
    #[serde(flatten)]
    pub payment: Payment,
    pub entries: Vec<PaymentEntry>,
    /// Recomputed from the stored inputs on every read
    pub breakdown: SalaryBreakdown,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LookupQuery {
    pub employee_id: u64,
    /// `YYYY-MM`
    pub month: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaymentReportQuery {
    /// `YYYY-MM`
    pub month: Option<String>,
    pub office_id: Option<u64>,
    /// Employee first or last name
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    pub employee_id: Option<u64>,
    pub office_id: Option<u64>,
    /// Employee first or last name
    pub search: Option<String>,
    /// `YYYY` or `YYYY-MM`
    pub month: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CopyMonthReq {
    #[schema(example = "2025-05")]
    pub month: String,
    /// Restricts the copy to one office
    pub office_id: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentReportRow {
    #[serde(flatten)]
    pub payment: Payment,
    pub employee_name: String,
    pub office_id: u64,
    pub office_name: String,
    pub breakdown: SalaryBreakdown,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentReport {
    pub rows: Vec<PaymentReportRow>,
    pub totals: BreakdownTotals,
}

#[derive(sqlx::FromRow)]
struct PaymentWithOffice {
    #[sqlx(flatten)]
    payment: Payment,
    office_id: u64,
}

#[derive(sqlx::FromRow)]
struct PaymentReportSql {
    #[sqlx(flatten)]
    payment: Payment,
    first_name: String,
    last_name: String,
    office_id: u64,
    office_name: String,
}

struct NewPayment<'a> {
    employee_id: u64,
    month: NaiveDate,
    degree: i32,
    level: i32,
    components: &'a PayComponents,
    note: Option<&'a str>,
}

async fn insert_payment(
    conn: &mut MySqlConnection,
    new: &NewPayment<'_>,
    breakdown: &SalaryBreakdown,
) -> ApiResult<u64> {
    let c = new.components;
    let stored = breakdown.rounded();

    let result = sqlx::query(
        r#"
        INSERT INTO payments
        (employee_id, month, degree, level, salary, certificate_percentage, risk_percentage,
         manage_percentage, retire_percentage, trans_pay, kids_pay, marriage_pay,
         net_credits, net_debits, net_salary, note)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.employee_id)
    .bind(new.month)
    .bind(new.degree)
    .bind(new.level)
    .bind(c.salary)
    .bind(c.certificate_percentage)
    .bind(c.risk_percentage)
    .bind(c.manage_percentage)
    .bind(c.retire_percentage)
    .bind(c.trans_pay)
    .bind(c.kids_pay)
    .bind(c.marriage_pay)
    .bind(stored.total_credits)
    .bind(stored.total_debits)
    .bind(stored.net_salary)
    .bind(new.note)
    .execute(conn)
    .await?;

    Ok(result.last_insert_id())
}

async fn insert_entries(
    conn: &mut MySqlConnection,
    payment_id: u64,
    entries: &[EntryInput],
) -> ApiResult<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO payment_entries (payment_id, entry_type, title, amount)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(payment_id)
        .bind(entry.entry_type.as_ref())
        .bind(entry.title.trim())
        .bind(entry.amount)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_entries(conn: &mut MySqlConnection, payment_id: u64) -> ApiResult<Vec<PaymentEntry>> {
    sqlx::query_as::<_, PaymentEntryRow>(
        "SELECT id, payment_id, entry_type, title, amount FROM payment_entries WHERE payment_id = ? ORDER BY id",
    )
    .bind(payment_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(PaymentEntry::try_from)
    .collect()
}

/// Entries of many payments at once, keyed by payment id.
async fn entries_by_payment(
    conn: &mut MySqlConnection,
    payment_ids: &[u64],
) -> ApiResult<HashMap<u64, Vec<PaymentEntry>>> {
    let mut grouped: HashMap<u64, Vec<PaymentEntry>> = HashMap::new();

    for chunk in payment_ids.chunks(ENTRY_BATCH) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT id, payment_id, entry_type, title, amount FROM payment_entries \
             WHERE payment_id IN ({placeholders}) ORDER BY id"
        );

        let mut query = sqlx::query_as::<_, PaymentEntryRow>(&sql);
        for id in chunk {
            query = query.bind(*id);
        }

        for row in query.fetch_all(&mut *conn).await? {
            let entry = PaymentEntry::try_from(row)?;
            grouped.entry(entry.payment_id).or_default().push(entry);
        }
    }

    Ok(grouped)
}

fn breakdown_of(payment: &Payment, entries: &[PaymentEntry]) -> SalaryBreakdown {
    SalaryBreakdown::compute(
        &payment.components(),
        entries.iter().map(PaymentEntry::ledger_line),
    )
}

async fn load_detail(conn: &mut MySqlConnection, payment: Payment) -> ApiResult<PaymentDetail> {
    let entries = load_entries(&mut *conn, payment.id).await?;
    let breakdown = breakdown_of(&payment, &entries).rounded();
    Ok(PaymentDetail {
        payment,
        entries,
        breakdown,
    })
}

fn payment_with_office_sql(condition: &str, lock: bool) -> String {
    format!(
        "SELECT {PAYMENT_COLUMNS}, e.office_id FROM payments p \
         JOIN employees e ON e.id = p.employee_id WHERE {condition}{}",
        if lock { " FOR UPDATE" } else { "" }
    )
}

/// Accepts `YYYY` or `YYYY-MM` and returns the LIKE pattern for it.
fn month_prefix_pattern(raw: &str) -> ApiResult<String> {
    let raw = raw.trim();
    let valid = match raw.len() {
        4 => raw.chars().all(|c| c.is_ascii_digit()),
        7 => parse_month(raw).is_ok(),
        _ => false,
    };

    if !valid {
        return Err(ApiError::validation(format!(
            "Invalid month filter {raw:?}, expected YYYY or YYYY-MM"
        )));
    }
    Ok(format!("{raw}%"))
}

async fn fetch_report(pool: &MySqlPool, filter: &Filter, order_by: &str) -> ApiResult<PaymentReport> {
    let sql = format!(
        r#"
        SELECT {PAYMENT_COLUMNS}, e.first_name, e.last_name, e.office_id, o.name AS office_name
        FROM payments p
        JOIN employees e ON e.id = p.employee_id
        JOIN offices o ON o.id = e.office_id
        {}
        ORDER BY {order_by}
        "#,
        filter.where_clause()
    );
    debug!(sql = %sql, bindings = ?filter.values(), "Fetching payment report");

    let mut conn = pool.acquire().await?;

    let rows = filter
        .bind_as(sqlx::query_as::<_, PaymentReportSql>(&sql))
        .fetch_all(&mut *conn)
        .await?;

    let ids: Vec<u64> = rows.iter().map(|r| r.payment.id).collect();
    let mut entries = entries_by_payment(&mut conn, &ids).await?;

    let mut totals = BreakdownTotals::default();
    let report_rows = rows
        .into_iter()
        .map(|row| {
            let lines = entries.remove(&row.payment.id).unwrap_or_default();
            let breakdown = breakdown_of(&row.payment, &lines);
            totals.add(row.payment.salary, &breakdown);

            PaymentReportRow {
                employee_name: format!("{} {}", row.first_name, row.last_name),
                office_id: row.office_id,
                office_name: row.office_name,
                breakdown: breakdown.rounded(),
                payment: row.payment,
            }
        })
        .collect();

    Ok(PaymentReport {
        rows: report_rows,
        totals: totals.rounded(),
    })
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = CreatePayment,
    responses(
        (status = 201, description = "Payment created", body = PaymentDetail),
        (status = 400, description = "Invalid month, components or entries"),
        (status = 403, description = "Read-only account or foreign office"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee already has a payment for this month")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn create_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePayment>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;

    let month = parse_month(&payload.month)?;
    payload.components.validate()?;
    validate_entries(&payload.entries)?;

    let office_id = employee_office(pool.get_ref(), payload.employee_id).await?;
    auth.ensure_office_access(office_id)?;

    let breakdown = SalaryBreakdown::compute(
        &payload.components,
        payload.entries.iter().map(EntryInput::ledger_line),
    );

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payments WHERE employee_id = ? AND month = ?",
    )
    .bind(payload.employee_id)
    .bind(month)
    .fetch_one(&mut *tx)
    .await?;

    if existing > 0 {
        return Err(ApiError::Conflict(format!(
            "Employee {} already has a payment for {}",
            payload.employee_id,
            format_month(month)
        )));
    }

    let new = NewPayment {
        employee_id: payload.employee_id,
        month,
        degree: payload.degree,
        level: payload.level,
        components: &payload.components,
        note: payload.note.as_deref(),
    };
    let payment_id = insert_payment(&mut tx, &new, &breakdown).await?;
    insert_entries(&mut tx, payment_id, &payload.entries).await?;

    tx.commit().await?;

    info!(
        payment_id,
        employee_id = payload.employee_id,
        month = %format_month(month),
        net_salary = breakdown.rounded().net_salary,
        "Payment created"
    );

    let mut conn = pool.acquire().await?;
    let sql = payment_with_office_sql("p.id = ?", false);
    let created = sqlx::query_as::<_, PaymentWithOffice>(&sql)
        .bind(payment_id)
        .fetch_one(&mut *conn)
        .await?;
    let detail = load_detail(&mut conn, created.payment).await?;

    Ok(HttpResponse::Created().json(detail))
}

#[utoipa::path(
    get,
    path = "/api/payments/{payment_id}",
    params(("payment_id", Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment with entries and breakdown", body = PaymentDetail),
        (status = 404, description = "Payment not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn get_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    let payment_id = path.into_inner();
    let mut conn = pool.acquire().await?;

    let sql = payment_with_office_sql("p.id = ?", false);
    let found = sqlx::query_as::<_, PaymentWithOffice>(&sql)
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;

    auth.ensure_office_access(found.office_id)?;

    Ok(HttpResponse::Ok().json(load_detail(&mut conn, found.payment).await?))
}

#[utoipa::path(
    get,
    path = "/api/payments/lookup",
    params(LookupQuery),
    responses(
        (status = 200, description = "Payment of the employee for the month", body = PaymentDetail),
        (status = 400, description = "Invalid month"),
        (status = 404, description = "No payment for that employee and month")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn lookup_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LookupQuery>,
) -> ApiResult<impl Responder> {
    let month = parse_month(&query.month)?;
    let mut conn = pool.acquire().await?;

    let sql = payment_with_office_sql("p.employee_id = ? AND p.month = ?", false);
    let found = sqlx::query_as::<_, PaymentWithOffice>(&sql)
        .bind(query.employee_id)
        .bind(month)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;

    auth.ensure_office_access(found.office_id)?;

    Ok(HttpResponse::Ok().json(load_detail(&mut conn, found.payment).await?))
}

#[utoipa::path(
    put,
    path = "/api/payments/{payment_id}",
    request_body = UpdatePayment,
    params(("payment_id", Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment updated", body = PaymentDetail),
        (status = 400, description = "Invalid components or entries"),
        (status = 404, description = "Payment not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn update_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdatePayment>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    let payment_id = path.into_inner();

    if let Some(entries) = &body.entries {
        validate_entries(entries)?;
    }

    let mut tx = pool.begin().await?;

    let sql = payment_with_office_sql("p.id = ?", true);
    let current = sqlx::query_as::<_, PaymentWithOffice>(&sql)
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;

    auth.ensure_office_access(current.office_id)?;

    let components = body.merged(current.payment.components());
    components.validate()?;

    let lines: Vec<LedgerLine> = match &body.entries {
        Some(entries) => {
            sqlx::query("DELETE FROM payment_entries WHERE payment_id = ?")
                .bind(payment_id)
                .execute(&mut *tx)
                .await?;
            insert_entries(&mut tx, payment_id, entries).await?;
            entries.iter().map(EntryInput::ledger_line).collect()
        }
        None => load_entries(&mut tx, payment_id)
            .await?
            .iter()
            .map(PaymentEntry::ledger_line)
            .collect(),
    };

    let breakdown = SalaryBreakdown::compute(&components, lines).rounded();
    let note = body.note.as_deref().or(current.payment.note.as_deref());

    sqlx::query(
        r#"
        UPDATE payments
        SET degree = ?, level = ?, salary = ?, certificate_percentage = ?, risk_percentage = ?,
            manage_percentage = ?, retire_percentage = ?, trans_pay = ?, kids_pay = ?,
            marriage_pay = ?, net_credits = ?, net_debits = ?, net_salary = ?, note = ?
        WHERE id = ?
        "#,
    )
    .bind(body.degree.unwrap_or(current.payment.degree))
    .bind(body.level.unwrap_or(current.payment.level))
    .bind(components.salary)
    .bind(components.certificate_percentage)
    .bind(components.risk_percentage)
    .bind(components.manage_percentage)
    .bind(components.retire_percentage)
    .bind(components.trans_pay)
    .bind(components.kids_pay)
    .bind(components.marriage_pay)
    .bind(breakdown.total_credits)
    .bind(breakdown.total_debits)
    .bind(breakdown.net_salary)
    .bind(note)
    .bind(payment_id)
    .execute(&mut *tx)
    .await?;

    let updated = sqlx::query_as::<_, PaymentWithOffice>(&payment_with_office_sql("p.id = ?", false))
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;
    let detail = load_detail(&mut tx, updated.payment).await?;

    tx.commit().await?;

    info!(payment_id, user_id = auth.user_id, net_salary = breakdown.net_salary, "Payment updated");

    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    delete,
    path = "/api/payments/{payment_id}",
    params(("payment_id", Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Payment not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn delete_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;
    let payment_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let sql = payment_with_office_sql("p.id = ?", true);
    let current = sqlx::query_as::<_, PaymentWithOffice>(&sql)
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;

    auth.ensure_office_access(current.office_id)?;

    sqlx::query("DELETE FROM payment_entries WHERE payment_id = ?")
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM payments WHERE id = ?")
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(payment_id, user_id = auth.user_id, "Payment deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(PaymentReportQuery),
    responses(
        (status = 200, description = "Payroll rows with breakdowns and column totals", body = PaymentReport),
        (status = 400, description = "Invalid month")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn list_payments(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PaymentReportQuery>,
) -> ApiResult<impl Responder> {
    let mut filter = Filter::new();

    if let Some(raw) = &query.month {
        filter.push("p.month = ?", SqlValue::Date(parse_month(raw)?));
    }
    if let Some(office_id) = auth.office_scope(query.office_id)? {
        filter.push("e.office_id = ?", SqlValue::U64(office_id));
    }
    if let Some(search) = &query.search {
        filter.search(&["e.first_name", "e.last_name"], search);
    }

    let report = fetch_report(pool.get_ref(), &filter, "e.first_name, e.last_name, p.month DESC").await?;

    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/payments/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Payroll across months, newest first, with totals", body = PaymentReport),
        (status = 400, description = "Invalid month filter")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn payment_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<impl Responder> {
    let mut filter = Filter::new();

    if let Some(raw) = &query.month {
        filter.push(
            "DATE_FORMAT(p.month, '%Y-%m') LIKE ?",
            SqlValue::String(month_prefix_pattern(raw)?),
        );
    }
    if let Some(employee_id) = query.employee_id {
        filter.push("p.employee_id = ?", SqlValue::U64(employee_id));
    }
    if let Some(office_id) = auth.office_scope(query.office_id)? {
        filter.push("e.office_id = ?", SqlValue::U64(office_id));
    }
    if let Some(search) = &query.search {
        filter.search(&["e.first_name", "e.last_name"], search);
    }

    let report = fetch_report(pool.get_ref(), &filter, "p.month DESC, e.first_name, e.last_name").await?;

    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    post,
    path = "/api/payments/copy-next-month",
    request_body = CopyMonthReq,
    responses(
        (status = 201, description = "Payments copied", body = Object, example = json!({
            "message": "Payments copied", "copied": 42, "source_month": "2025-05", "target_month": "2025-06"
        })),
        (status = 400, description = "Invalid month"),
        (status = 404, description = "Source month has no payments"),
        (status = 409, description = "Target month already has payments")
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn copy_next_month(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CopyMonthReq>,
) -> ApiResult<impl Responder> {
    auth.require_editor()?;

    let source = parse_month(&payload.month)?;
    let target = next_month(source);
    let scope = auth.office_scope(payload.office_id)?;

    let scoped = |month: NaiveDate| {
        let mut filter = Filter::new();
        filter.push("p.month = ?", SqlValue::Date(month));
        if let Some(office_id) = scope {
            filter.push("e.office_id = ?", SqlValue::U64(office_id));
        }
        filter
    };

    let mut tx = pool.begin().await?;

    let target_filter = scoped(target);
    let count_sql = format!(
        "SELECT COUNT(*) FROM payments p JOIN employees e ON e.id = p.employee_id {}",
        target_filter.where_clause()
    );
    let existing = target_filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(&mut *tx)
        .await?;

    if existing > 0 {
        warn!(target_month = %format_month(target), existing, "Copy refused: target month has payments");
        return Err(ApiError::Conflict(format!(
            "{} already has {existing} payments",
            format_month(target)
        )));
    }

    let source_filter = scoped(source);
    let source_sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments p JOIN employees e ON e.id = p.employee_id {} ORDER BY p.id",
        source_filter.where_clause()
    );
    let payments = source_filter
        .bind_as(sqlx::query_as::<_, Payment>(&source_sql))
        .fetch_all(&mut *tx)
        .await?;

    if payments.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No payments found for {}",
            format_month(source)
        )));
    }

    let ids: Vec<u64> = payments.iter().map(|p| p.id).collect();
    let mut entries = entries_by_payment(&mut tx, &ids).await?;

    for payment in &payments {
        let copied_entries: Vec<EntryInput> = entries
            .remove(&payment.id)
            .unwrap_or_default()
            .iter()
            .map(EntryInput::from)
            .collect();

        let components = payment.components();
        let breakdown = SalaryBreakdown::compute(
            &components,
            copied_entries.iter().map(EntryInput::ledger_line),
        );

        let new = NewPayment {
            employee_id: payment.employee_id,
            month: target,
            degree: payment.degree,
            level: payment.level,
            components: &components,
            note: payment.note.as_deref(),
        };
        let new_id = insert_payment(&mut tx, &new, &breakdown).await?;
        insert_entries(&mut tx, new_id, &copied_entries).await?;
    }

    tx.commit().await?;

    info!(
        copied = payments.len(),
        source_month = %format_month(source),
        target_month = %format_month(target),
        office_id = ?scope,
        user_id = auth.user_id,
        "Payments copied to next month"
    );

    Ok(HttpResponse::Created().json(json!({
        "message": "Payments copied",
        "copied": payments.len(),
        "source_month": format_month(source),
        "target_month": format_month(target)
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
    use serde_json::Value;

    macro_rules! app {
        () => {
            init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool()))
                    .app_data(web::Data::new(Config::for_tests()))
                    .route("/payments", web::post().to(create_payment))
                    .route("/payments/history", web::get().to(payment_history))
                    .route("/payments/copy-next-month", web::post().to(copy_next_month))
                    .route("/payments/{id}", web::put().to(update_payment)),
            )
            .await
        };
    }

    fn payment_body() -> Value {
        json!({
            "employee_id": 1,
            "month": "2025-05",
            "salary": 1000.0,
            "certificate_percentage": 10.0,
            "risk_percentage": 5.0,
            "retire_percentage": 7.0,
            "trans_pay": 50.0,
            "entries": [{ "entry_type": "debit", "title": "ضريبة", "amount": 20.0 }]
        })
    }

    async fn status_of(req: TestRequest) -> StatusCode {
        let app = app!();
        call_service(&app, req.to_request()).await.status()
    }

    #[test]
    fn create_body_flattens_components() {
        let payload: CreatePayment = serde_json::from_value(payment_body()).unwrap();
        assert_eq!(payload.components.salary, 1000.0);
        assert_eq!(payload.components.manage_percentage, 0.0);
        assert_eq!(payload.degree, 0);
        assert_eq!(payload.entries.len(), 1);

        let breakdown = SalaryBreakdown::compute(
            &payload.components,
            payload.entries.iter().map(EntryInput::ledger_line),
        );
        assert_eq!(breakdown.net_salary, 1110.0);
    }

    #[test]
    fn update_merges_only_given_fields() {
        let body: UpdatePayment =
            serde_json::from_value(json!({ "salary": 1200.0, "risk_percentage": 0.0 })).unwrap();
        let current = PayComponents {
            salary: 1000.0,
            risk_percentage: 5.0,
            trans_pay: 50.0,
            ..Default::default()
        };
        let merged = body.merged(current);
        assert_eq!(merged.salary, 1200.0);
        assert_eq!(merged.risk_percentage, 0.0);
        assert_eq!(merged.trans_pay, 50.0);
    }

    #[test]
    fn entries_need_title_and_non_negative_amount() {
        let entry = |title: &str, amount: f64| EntryInput {
            entry_type: EntryType::Credit,
            title: title.to_string(),
            amount,
        };
        assert!(validate_entries(&[entry("مكافأة", 10.0), entry("x", 0.0)]).is_ok());
        assert!(validate_entries(&[entry(" ", 10.0)]).is_err());
        assert!(validate_entries(&[entry("خصم", -1.0)]).is_err());
        assert!(validate_entries(&[entry("خصم", f64::NAN)]).is_err());
    }

    #[test]
    fn month_prefix_accepts_year_or_month() {
        assert_eq!(month_prefix_pattern("2025").unwrap(), "2025%");
        assert_eq!(month_prefix_pattern("2025-05").unwrap(), "2025-05%");
        assert!(month_prefix_pattern("20%").is_err());
        assert!(month_prefix_pattern("2025-13").is_err());
    }

    #[actix_web::test]
    async fn viewers_cannot_create_payments() {
        let req = TestRequest::post()
            .uri("/payments")
            .insert_header(bearer(Role::Viewer, Some(1)))
            .set_json(payment_body());
        assert_eq!(status_of(req).await, StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn out_of_range_percentage_is_rejected() {
        let mut body = payment_body();
        body["retire_percentage"] = json!(120.0);
        let req = TestRequest::post()
            .uri("/payments")
            .insert_header(bearer(Role::Accountant, Some(1)))
            .set_json(body);
        assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn malformed_month_is_rejected() {
        let mut body = payment_body();
        body["month"] = json!("May 2025");
        let req = TestRequest::post()
            .uri("/payments")
            .insert_header(bearer(Role::Accountant, Some(1)))
            .set_json(body);
        assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);

        let req = TestRequest::post()
            .uri("/payments/copy-next-month")
            .insert_header(bearer(Role::Accountant, Some(1)))
            .set_json(json!({ "month": "2025-5-x" }));
        assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);

        let req = TestRequest::get()
            .uri("/payments/history?month=25")
            .insert_header(bearer(Role::Viewer, Some(1)));
        assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn update_validates_replacement_entries() {
        let req = TestRequest::put()
            .uri("/payments/9")
            .insert_header(bearer(Role::Accountant, Some(1)))
            .set_json(json!({ "entries": [{ "entry_type": "credit", "title": "", "amount": 5 }] }));
        assert_eq!(status_of(req).await, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn copy_into_foreign_office_is_forbidden() {
        let req = TestRequest::post()
            .uri("/payments/copy-next-month")
            .insert_header(bearer(Role::OfficeAdmin, Some(2)))
            .set_json(json!({ "month": "2025-05", "office_id": 3 }));
        assert_eq!(status_of(req).await, StatusCode::FORBIDDEN);
    }
}
