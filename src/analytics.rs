//! Analytics service
//!
//! Read-only aggregates over a user's transactions and budgets. All windows
//! are computed relative to the service's `now`, which callers can pin.

use std::collections::HashMap;

use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::config::{AnalyticsConfig, MAX_TREND_MONTHS};
use crate::db;
use crate::error::{FinanceError, FinanceResult};
use crate::models::Budget;
use crate::money;
use crate::period::{now_utc, trailing_months, Period, TrailingMonths, Window};

/// Income, expense and net for one period window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub user_id: i64,
    pub period: Period,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_income: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_expense: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub net: Decimal,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpending {
    pub category_id: i64,
    pub category_name: String,
    pub amount: Decimal,
}

/// Expense totals per category, largest first. Serializes as a JSON object
/// `{ "<category name>": amount }` that keeps this order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpendingBreakdown {
    pub entries: Vec<CategorySpending>,
}

impl SpendingBreakdown {
    pub fn get(&self, category_name: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|entry| entry.category_name == category_name)
            .map(|entry| entry.amount)
    }

}

impl Serialize for SpendingBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.category_name, &entry.amount.to_f64().unwrap_or_default())?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTrend {
    pub month: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub income: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub expense: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub net: Decimal,
}

/// Trailing months in chronological order, produced on demand from totals
/// fetched once. Clone to iterate again.
#[derive(Debug, Clone)]
pub struct MonthlyTrend {
    months: TrailingMonths,
    totals: HashMap<String, (i64, i64)>,
}

impl Iterator for MonthlyTrend {
    type Item = MonthTrend;

    fn next(&mut self) -> Option<Self::Item> {
        let month = self.months.next()?.to_string();
        let (income_cents, expense_cents) = self.totals.get(&month).copied().unwrap_or_default();
        Some(MonthTrend {
            month,
            income: money::from_cents(income_cents),
            expense: money::from_cents(expense_cents),
            net: money::from_cents(income_cents - expense_cents),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.months.size_hint()
    }
}

impl ExactSizeIterator for MonthlyTrend {}

impl Serialize for MonthlyTrend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub budget: Budget,
    #[serde(with = "rust_decimal::serde::float")]
    pub spent: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining: Decimal,
    /// `spent / amount`; `None` when the budget amount is zero.
    #[serde(with = "rust_decimal::serde::float_option")]
    pub percent_used: Option<Decimal>,
    pub alert: bool,
    pub over_budget: bool,
}

impl BudgetStatus {
    pub fn evaluate(budget: Budget, spent_cents: i64, alert_threshold: Decimal) -> Self {
        let amount_cents = money::to_cents(budget.amount).unwrap_or_default();
        let percent_used = money::ratio(spent_cents, amount_cents);
        let alert = money::reaches(spent_cents, amount_cents, alert_threshold);
        Self {
            spent: money::from_cents(spent_cents),
            remaining: money::from_cents(amount_cents - spent_cents),
            percent_used,
            alert,
            over_budget: spent_cents > amount_cents,
            budget,
        }
    }
}

pub struct AnalyticsService<'a> {
    conn: &'a Connection,
    settings: AnalyticsConfig,
    now: NaiveDateTime,
}

impl<'a> AnalyticsService<'a> {
    pub fn new(conn: &'a Connection, settings: AnalyticsConfig) -> Self {
        Self {
            conn,
            settings,
            now: now_utc(),
        }
    }

    /// Evaluate windows relative to `now` instead of the wall clock.
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    fn ensure_user(&self, user_id: i64) -> FinanceResult<()> {
        if db::user_exists(self.conn, user_id)? {
            Ok(())
        } else {
            Err(FinanceError::user_not_found(user_id))
        }
    }

    pub fn summary(&self, user_id: i64, period: Period) -> FinanceResult<Summary> {
        self.ensure_user(user_id)?;
        let window = period.window(self.now);
        let totals = db::window_totals(self.conn, user_id, window)?;
        Ok(Summary {
            user_id,
            period,
            start: window.start,
            end: window.end,
            total_income: money::from_cents(totals.income_cents),
            total_expense: money::from_cents(totals.expense_cents),
            net: money::from_cents(totals.income_cents - totals.expense_cents),
            transaction_count: totals.count,
        })
    }

    /// Expense totals by category. Without a period the whole history counts.
    pub fn spending_by_category(
        &self,
        user_id: i64,
        period: Option<Period>,
    ) -> FinanceResult<SpendingBreakdown> {
        self.ensure_user(user_id)?;
        let window = period.map(|period| period.window(self.now));
        let entries = db::category_expense_totals(self.conn, user_id, window)?
            .into_iter()
            .map(|record| CategorySpending {
                category_id: record.category_id,
                category_name: record.category_name,
                amount: money::from_cents(record.expense_cents),
            })
            .collect();
        Ok(SpendingBreakdown { entries })
    }

    /// Trailing `months` (default from settings) ending with the current one.
    pub fn monthly_trend(&self, user_id: i64, months: Option<u32>) -> FinanceResult<MonthlyTrend> {
        let months = months.unwrap_or(self.settings.trend_months);
        if months == 0 || months > MAX_TREND_MONTHS {
            return Err(FinanceError::invalid(
                "months",
                format!("months must be between 1 and {MAX_TREND_MONTHS}"),
            ));
        }
        self.ensure_user(user_id)?;

        let months = trailing_months(self.now, months as usize);
        let first_day = months
            .clone()
            .next()
            .and_then(|month| month.first_day())
            .ok_or_else(|| FinanceError::invalid("months", "months reach outside the calendar"))?;
        let window = Window {
            start: first_day.and_time(NaiveTime::MIN),
            end: self.now,
        };

        let totals = db::month_totals(self.conn, user_id, window)?
            .into_iter()
            .map(|record| (record.month, (record.income_cents, record.expense_cents)))
            .collect();
        Ok(MonthlyTrend { months, totals })
    }

    pub fn budget_status(&self, user_id: i64) -> FinanceResult<Vec<BudgetStatus>> {
        self.ensure_user(user_id)?;
        let budgets = db::list_budgets(self.conn, Some(user_id))?;

        let mut statuses = Vec::with_capacity(budgets.len());
        for budget in budgets {
            let window = budget.period.window(self.now);
            let spent_cents =
                db::category_expense_in_window(self.conn, user_id, budget.category_id, window)?;
            let status = BudgetStatus::evaluate(budget, spent_cents, self.settings.alert_threshold);
            if status.alert {
                tracing::debug!(
                    budget_id = status.budget.id,
                    user_id,
                    spent = %status.spent,
                    "budget alert"
                );
            }
            statuses.push(status);
        }
        Ok(statuses)
    }
}
