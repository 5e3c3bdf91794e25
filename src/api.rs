//! HTTP routes. Handlers check a connection out of the pool, call the
//! services and render JSON; [`FinanceError`] renders itself as a status
//! code plus `{ "error": ..., "field": ... }`.

use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::response::{self, Responder};
use rocket::serde::json::{self, json, Json, Value};
use rocket::{Build, Request, Rocket, State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analytics::{AnalyticsService, BudgetStatus, MonthlyTrend, SpendingBreakdown, Summary};
use crate::config::{AnalyticsConfig, Config};
use crate::db::DbPool;
use crate::error::{FinanceError, FinanceResult};
use crate::finance::FinanceService;
use crate::models::{
    Budget, BudgetPatch, Category, NewBudget, NewTransaction, Transaction, TransactionFilter,
    TransactionPatch, TransactionType, User,
};
use crate::period::{now_utc, Period};
use crate::validation;

type ApiResult<T> = Result<Json<T>, FinanceError>;
type Created<T> = Result<Custom<Json<T>>, FinanceError>;
type JsonBody<'r, T> = Result<Json<T>, json::Error<'r>>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

fn status_for(err: &FinanceError) -> Status {
    match err {
        FinanceError::Validation { .. } => Status::BadRequest,
        FinanceError::NotFound { .. } => Status::NotFound,
        FinanceError::Conflict { .. } => Status::Conflict,
        FinanceError::Storage(_) | FinanceError::Pool(_) => Status::InternalServerError,
    }
}

impl<'r> Responder<'r, 'static> for FinanceError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = status_for(&self);
        let error = if status == Status::InternalServerError {
            tracing::error!(error = %self, method = %request.method(), uri = %request.uri(), "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error,
            field: self.field(),
        };
        (status, Json(body)).respond_to(request)
    }
}

fn body<T>(data: JsonBody<'_, T>) -> FinanceResult<T> {
    data.map(Json::into_inner)
        .map_err(|err| FinanceError::Validation {
            field: None,
            message: format!("invalid request body: {err}"),
        })
}

fn created<T>(value: T) -> Custom<Json<T>> {
    Custom(Status::Created, Json(value))
}

fn optional_id(field: &'static str, value: Option<&str>) -> FinanceResult<Option<i64>> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| FinanceError::invalid(field, format!("{field} must be an integer")))
        })
        .transpose()
}

fn deleted(entity: &str) -> Json<Value> {
    Json(json!({ "message": format!("{entity} deleted successfully") }))
}

// Users

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
}

#[post("/users", data = "<data>")]
fn create_user(pool: &State<DbPool>, data: JsonBody<'_, CreateUserRequest>) -> Created<User> {
    let request = body(data)?;
    let conn = pool.get()?;
    let user = FinanceService::new(&conn).create_user(&request.name, &request.email)?;
    Ok(created(user))
}

#[get("/users")]
fn list_users(pool: &State<DbPool>) -> ApiResult<Vec<User>> {
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).list_users()?))
}

#[get("/users/<id>")]
fn get_user(pool: &State<DbPool>, id: i64) -> ApiResult<User> {
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).get_user(id)?))
}

// Categories

#[derive(Debug, Deserialize)]
struct CategoryRequest {
    name: String,
}

#[get("/categories")]
fn list_categories(pool: &State<DbPool>) -> ApiResult<Vec<Category>> {
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).list_categories()?))
}

#[post("/categories", data = "<data>")]
fn create_category(pool: &State<DbPool>, data: JsonBody<'_, CategoryRequest>) -> Created<Category> {
    let request = body(data)?;
    let conn = pool.get()?;
    let category = FinanceService::new(&conn).create_category(&request.name)?;
    Ok(created(category))
}

#[put("/categories/<id>", data = "<data>")]
fn rename_category(
    pool: &State<DbPool>,
    id: i64,
    data: JsonBody<'_, CategoryRequest>,
) -> ApiResult<Category> {
    let request = body(data)?;
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).rename_category(id, &request.name)?))
}

// Transactions

#[derive(Debug, Deserialize)]
struct CreateTransactionRequest {
    user_id: i64,
    category_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTransactionRequest {
    #[serde(default)]
    category_id: Option<i64>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, FromForm)]
struct TransactionQuery {
    user_id: Option<String>,
    category_id: Option<String>,
    #[field(name = "type")]
    kind: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl TransactionQuery {
    fn into_filter(self) -> FinanceResult<TransactionFilter> {
        let date_from = self.date_from.or(self.start_date);
        let date_to = self.date_to.or(self.end_date);
        Ok(TransactionFilter {
            user_id: optional_id("user_id", self.user_id.as_deref())?,
            category_id: optional_id("category_id", self.category_id.as_deref())?,
            kind: self.kind.as_deref().map(str::parse::<TransactionType>).transpose()?,
            date_from: date_from
                .as_deref()
                .map(|value| validation::parse_timestamp("date_from", value))
                .transpose()?,
            date_to: date_to
                .as_deref()
                .map(|value| validation::parse_range_end("date_to", value))
                .transpose()?,
        })
    }
}

#[post("/transactions", data = "<data>")]
fn create_transaction(
    pool: &State<DbPool>,
    data: JsonBody<'_, CreateTransactionRequest>,
) -> Created<Transaction> {
    let request = body(data)?;
    let input = NewTransaction {
        user_id: request.user_id,
        category_id: request.category_id,
        amount: request.amount,
        description: request.description.unwrap_or_default(),
        kind: request.kind.parse::<TransactionType>()?,
        date: match request.date.as_deref() {
            Some(value) => validation::parse_timestamp("date", value)?,
            None => now_utc(),
        },
    };
    let conn = pool.get()?;
    let transaction = FinanceService::new(&conn).create_transaction(input)?;
    Ok(created(transaction))
}

#[get("/transactions?<query..>")]
fn list_transactions(pool: &State<DbPool>, query: TransactionQuery) -> ApiResult<Vec<Transaction>> {
    let filter = query.into_filter()?;
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).list_transactions(&filter)?))
}

#[get("/transactions/<id>")]
fn get_transaction(pool: &State<DbPool>, id: i64) -> ApiResult<Transaction> {
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).get_transaction(id)?))
}

#[put("/transactions/<id>", data = "<data>")]
fn update_transaction(
    pool: &State<DbPool>,
    id: i64,
    data: JsonBody<'_, UpdateTransactionRequest>,
) -> ApiResult<Transaction> {
    let request = body(data)?;
    let patch = TransactionPatch {
        category_id: request.category_id,
        amount: request.amount,
        description: request.description,
        kind: request.kind.as_deref().map(str::parse::<TransactionType>).transpose()?,
        date: request
            .date
            .as_deref()
            .map(|value| validation::parse_timestamp("date", value))
            .transpose()?,
    };
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).update_transaction(id, patch)?))
}

#[delete("/transactions/<id>")]
fn delete_transaction(pool: &State<DbPool>, id: i64) -> ApiResult<Value> {
    let conn = pool.get()?;
    FinanceService::new(&conn).delete_transaction(id)?;
    Ok(deleted("Transaction"))
}

// Budgets

#[derive(Debug, Deserialize)]
struct CreateBudgetRequest {
    user_id: i64,
    category_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    #[serde(default)]
    period: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateBudgetRequest {
    #[serde(default)]
    category_id: Option<i64>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    period: Option<String>,
}

#[post("/budgets", data = "<data>")]
fn create_budget(pool: &State<DbPool>, data: JsonBody<'_, CreateBudgetRequest>) -> Created<Budget> {
    let request = body(data)?;
    let input = NewBudget {
        user_id: request.user_id,
        category_id: request.category_id,
        amount: request.amount,
        period: request
            .period
            .as_deref()
            .map(str::parse::<Period>)
            .transpose()?
            .unwrap_or_default(),
    };
    let conn = pool.get()?;
    let budget = FinanceService::new(&conn).create_budget(input)?;
    Ok(created(budget))
}

#[get("/budgets?<user_id>")]
fn list_budgets(pool: &State<DbPool>, user_id: Option<&str>) -> ApiResult<Vec<Budget>> {
    let user_id = optional_id("user_id", user_id)?;
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).list_budgets(user_id)?))
}

#[put("/budgets/<id>", data = "<data>")]
fn update_budget(
    pool: &State<DbPool>,
    id: i64,
    data: JsonBody<'_, UpdateBudgetRequest>,
) -> ApiResult<Budget> {
    let request = body(data)?;
    let patch = BudgetPatch {
        category_id: request.category_id,
        amount: request.amount,
        period: request.period.as_deref().map(str::parse::<Period>).transpose()?,
    };
    let conn = pool.get()?;
    Ok(Json(FinanceService::new(&conn).update_budget(id, patch)?))
}

#[delete("/budgets/<id>")]
fn delete_budget(pool: &State<DbPool>, id: i64) -> ApiResult<Value> {
    let conn = pool.get()?;
    FinanceService::new(&conn).delete_budget(id)?;
    Ok(deleted("Budget"))
}

// Analytics

#[get("/analytics/summary/<user_id>?<period>")]
fn summary(
    pool: &State<DbPool>,
    settings: &State<AnalyticsConfig>,
    user_id: i64,
    period: Option<&str>,
) -> ApiResult<Summary> {
    let period = Period::resolve_or_monthly(period);
    let conn = pool.get()?;
    Ok(Json(AnalyticsService::new(&conn, **settings).summary(user_id, period)?))
}

#[get("/analytics/spending-by-category/<user_id>?<period>")]
fn spending_by_category(
    pool: &State<DbPool>,
    settings: &State<AnalyticsConfig>,
    user_id: i64,
    period: Option<&str>,
) -> ApiResult<SpendingBreakdown> {
    let period = period.map(str::parse::<Period>).transpose()?;
    let conn = pool.get()?;
    Ok(Json(
        AnalyticsService::new(&conn, **settings).spending_by_category(user_id, period)?,
    ))
}

#[get("/analytics/monthly-trend/<user_id>?<months>")]
fn monthly_trend(
    pool: &State<DbPool>,
    settings: &State<AnalyticsConfig>,
    user_id: i64,
    months: Option<&str>,
) -> ApiResult<MonthlyTrend> {
    let months = months
        .map(|raw| {
            raw.trim()
                .parse::<u32>()
                .map_err(|_| FinanceError::invalid("months", "months must be a positive integer"))
        })
        .transpose()?;
    let conn = pool.get()?;
    Ok(Json(AnalyticsService::new(&conn, **settings).monthly_trend(user_id, months)?))
}

#[get("/analytics/budget-status/<user_id>")]
fn budget_status(
    pool: &State<DbPool>,
    settings: &State<AnalyticsConfig>,
    user_id: i64,
) -> ApiResult<Vec<BudgetStatus>> {
    let conn = pool.get()?;
    Ok(Json(AnalyticsService::new(&conn, **settings).budget_status(user_id)?))
}

#[get("/health")]
fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": now_utc(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request<'_>) -> Custom<Json<ErrorBody>> {
    let error = match status.code {
        404 => "resource not found".to_string(),
        422 => "request could not be processed".to_string(),
        _ => status.reason_lossy().to_lowercase(),
    };
    Custom(status, Json(ErrorBody { error, field: None }))
}

/// Assemble the application. Server address and port come from `config`;
/// Rocket's own logger stays off in favour of `tracing`.
pub fn build(config: &Config, pool: DbPool) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.server.address))
        .merge(("port", config.server.port))
        .merge(("log_level", "off"));

    rocket::custom(figment)
        .manage(pool)
        .manage(config.analytics)
        .mount(
            "/api",
            routes![
                create_user,
                list_users,
                get_user,
                list_categories,
                create_category,
                rename_category,
                create_transaction,
                list_transactions,
                get_transaction,
                update_transaction,
                delete_transaction,
                create_budget,
                list_budgets,
                update_budget,
                delete_budget,
                summary,
                spending_by_category,
                monthly_trend,
                budget_status,
                health
            ],
        )
        .register("/", catchers![default_catcher])
}
