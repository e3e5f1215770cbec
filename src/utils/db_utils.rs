use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::{MySql, MySqlPool};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::api::promotion::PromotionRow;
use crate::model::{employee::Employee, office::Office, user::User};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// JSON type a writable column accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    /// Positive integer reference to another row
    Id,
    Int,
    Number,
    Bool,
    /// `YYYY-MM-DD` string
    Date,
}

/// A column that partial updates may write.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty, nullable: false }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub const fn id(name: &'static str) -> Self {
        Self::new(name, ColumnType::Id)
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, ColumnType::Int)
    }

    pub const fn number(name: &'static str) -> Self {
        Self::new(name, ColumnType::Number)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnType::Bool)
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, ColumnType::Date)
    }

    pub const fn nullable(self) -> Self {
        Self { nullable: true, ..self }
    }

    /// Converts `value` to a bindable value. The JSON type must match the
    /// column exactly; `"9"` is not an id and `0` is not a boolean.
    fn to_sql(&self, value: &Value) -> Result<SqlValue, ApiError> {
        if value.is_null() {
            return if self.nullable {
                Ok(SqlValue::Null)
            } else {
                Err(ApiError::validation(format!("{} cannot be null", self.name)))
            };
        }

        let converted = match self.ty {
            ColumnType::Text => value.as_str().map(|s| SqlValue::String(s.to_string())),
            ColumnType::Id => value.as_u64().filter(|id| *id > 0).map(SqlValue::U64),
            ColumnType::Int => value.as_i64().map(SqlValue::I64),
            ColumnType::Number => value.as_f64().filter(|n| n.is_finite()).map(SqlValue::F64),
            ColumnType::Bool => value.as_bool().map(SqlValue::Bool),
            ColumnType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(SqlValue::Date),
        };

        converted.ok_or_else(|| {
            let expected = match self.ty {
                ColumnType::Text => "a string",
                ColumnType::Id => "a positive integer id",
                ColumnType::Int => "an integer",
                ColumnType::Number => "a number",
                ColumnType::Bool => "true or false",
                ColumnType::Date => "a YYYY-MM-DD date",
            };
            ApiError::validation(format!("{} must be {expected}", self.name))
        })
    }
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed_columns` may appear in `payload`, and each
/// value must have the column's JSON type.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed_columns: &[Column],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("Payload must be a JSON object".to_string()))?;

    if obj.is_empty() {
        return Err(ApiError::BadRequest("No fields provided for update".to_string()));
    }

    let mut columns = Vec::with_capacity(obj.len());
    for key in obj.keys() {
        let column = allowed_columns
            .iter()
            .find(|c| c.name == key.as_str())
            .ok_or_else(|| ApiError::BadRequest(format!("Field {key:?} cannot be updated")))?;
        columns.push(column);
    }

    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values = Vec::with_capacity(obj.len() + 1);
    for (column, value) in columns.iter().zip(obj.values()) {
        values.push(column.to_sql(value)?);
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// ===============================
/// Dynamic WHERE clause
/// ===============================
#[derive(Debug, Default)]
pub struct Filter {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `condition` with one placeholder bound to `value`.
    pub fn push(&mut self, condition: &str, value: SqlValue) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.values.push(value);
        self
    }

    /// Adds a case-insensitive substring match on any of `columns`.
    pub fn search(&mut self, columns: &[&str], term: &str) -> &mut Self {
        let term = term.trim();
        if term.is_empty() || columns.is_empty() {
            return self;
        }

        let like = format!("%{}%", escape_like(term));
        let clause = columns
            .iter()
            .map(|c| format!("{c} LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");

        self.conditions.push(format!("({clause})"));
        for _ in columns {
            self.values.push(SqlValue::String(like.clone()));
        }
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn bind_as<'q, O>(
        &'q self,
        mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    ) -> QueryAs<'q, MySql, O, MySqlArguments> {
        for value in &self.values {
            query = match value {
                SqlValue::String(v) => query.bind(v.as_str()),
                SqlValue::I64(v) => query.bind(*v),
                SqlValue::U64(v) => query.bind(*v),
                SqlValue::F64(v) => query.bind(*v),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Date(v) => query.bind(*v),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }

    pub fn bind_scalar<'q, O>(
        &'q self,
        mut query: QueryScalar<'q, MySql, O, MySqlArguments>,
    ) -> QueryScalar<'q, MySql, O, MySqlArguments> {
        for value in &self.values {
            query = match value {
                SqlValue::String(v) => query.bind(v.as_str()),
                SqlValue::I64(v) => query.bind(*v),
                SqlValue::U64(v) => query.bind(*v),
                SqlValue::F64(v) => query.bind(*v),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Date(v) => query.bind(*v),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// ===============================
/// Pagination
/// ===============================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, 100),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[derive(Serialize, ToSchema)]
#[aliases(
    OfficePage = Paginated<Office>,
    EmployeePage = Paginated<Employee>,
    PromotionPage = Paginated<PromotionRow>,
    UserPage = Paginated<User>
)]
pub struct Paginated<T: Serialize> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 57)]
    pub total: i64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(data: Vec<T>, page: Page, total: i64) -> Self {
        Self {
            data,
            page: page.page,
            per_page: page.per_page,
            total,
        }
    }
}
