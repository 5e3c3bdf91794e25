use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FinanceError;
use crate::period::Period;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(FinanceError::invalid(
                "type",
                format!("type must be 'income' or 'expense' (got '{other}')"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub category_name: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub date: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub category_name: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub period: Period,
    pub created_at: NaiveDateTime,
}

/// Validated input for a new transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub category_id: i64,
    pub amount: Decimal,
    pub description: String,
    pub kind: TransactionType,
    pub date: NaiveDateTime,
}

/// Partial update for a transaction. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub category_id: Option<i64>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub kind: Option<TransactionType>,
    pub date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewBudget {
    pub user_id: i64,
    pub category_id: i64,
    pub amount: Decimal,
    pub period: Period,
}

#[derive(Debug, Clone, Default)]
pub struct BudgetPatch {
    pub category_id: Option<i64>,
    pub amount: Option<Decimal>,
    pub period: Option<Period>,
}

/// Filters for listing transactions. Date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub user_id: Option<i64>,
    pub category_id: Option<i64>,
    pub kind: Option<TransactionType>,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn kind(mut self, kind: TransactionType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn date_range(mut self, from: NaiveDateTime, to: NaiveDateTime) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }
}

/// Income and expense totals for one window, in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TotalsRecord {
    pub income_cents: i64,
    pub expense_cents: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTotalRecord {
    pub category_id: i64,
    pub category_name: String,
    pub expense_cents: i64,
}

/// Per-month totals; `month` is formatted `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTotalsRecord {
    pub month: String,
    pub income_cents: i64,
    pub expense_cents: i64,
}
