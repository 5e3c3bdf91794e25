//! Finance service
//!
//! Validates and executes CRUD for users, categories, transactions and
//! budgets. The connection is borrowed from the caller, which owns its
//! lifecycle.

use chrono::SubsecRound;
use rusqlite::Connection;

use crate::db::{self, TransactionRow};
use crate::error::{FinanceError, FinanceResult};
use crate::models::{
    Budget, BudgetPatch, Category, NewBudget, NewTransaction, Transaction, TransactionFilter,
    TransactionPatch, User,
};
use crate::money;
use crate::period::now_utc;
use crate::validation::{self, MAX_CATEGORY_NAME_LEN, MAX_USER_NAME_LEN};

const MAX_DESCRIPTION_LEN: usize = 500;

pub struct FinanceService<'a> {
    conn: &'a Connection,
}

fn conflict(err: rusqlite::Error, entity: &'static str, message: impl Into<String>) -> FinanceError {
    if db::is_unique_violation(&err) {
        FinanceError::Conflict {
            entity,
            message: message.into(),
        }
    } else {
        FinanceError::Storage(err)
    }
}

fn description(value: &str) -> FinanceResult<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(FinanceError::invalid(
            "description",
            format!("description must be at most {MAX_DESCRIPTION_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

impl<'a> FinanceService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // Users

    pub fn create_user(&self, name: &str, email: &str) -> FinanceResult<User> {
        let name = validation::required_text("name", name, MAX_USER_NAME_LEN)?;
        let email = validation::normalize_email(email)?;

        let id = db::insert_user(self.conn, &name, &email, now_utc()).map_err(|err| {
            if db::is_unique_violation(&err) {
                FinanceError::invalid("email", format!("email already registered: {email}"))
            } else {
                FinanceError::Storage(err)
            }
        })?;
        tracing::info!(user_id = id, "user created");
        self.get_user(id)
    }

    pub fn list_users(&self) -> FinanceResult<Vec<User>> {
        Ok(db::list_users(self.conn)?)
    }

    pub fn get_user(&self, id: i64) -> FinanceResult<User> {
        db::get_user(self.conn, id)?.ok_or_else(|| FinanceError::user_not_found(id))
    }

    fn ensure_user(&self, id: i64) -> FinanceResult<()> {
        if db::user_exists(self.conn, id)? {
            Ok(())
        } else {
            Err(FinanceError::user_not_found(id))
        }
    }

    // Categories

    pub fn create_category(&self, name: &str) -> FinanceResult<Category> {
        let name = validation::required_text("name", name, MAX_CATEGORY_NAME_LEN)?;
        let id = db::insert_category(self.conn, &name, now_utc())
            .map_err(|err| conflict(err, "Category", name.clone()))?;
        tracing::info!(category_id = id, name = %name, "category created");
        self.get_category(id)
    }

    pub fn list_categories(&self) -> FinanceResult<Vec<Category>> {
        Ok(db::list_categories(self.conn)?)
    }

    pub fn get_category(&self, id: i64) -> FinanceResult<Category> {
        db::get_category(self.conn, id)?.ok_or_else(|| FinanceError::category_not_found(id))
    }

    pub fn rename_category(&self, id: i64, name: &str) -> FinanceResult<Category> {
        let name = validation::required_text("name", name, MAX_CATEGORY_NAME_LEN)?;
        let updated = db::rename_category(self.conn, id, &name)
            .map_err(|err| conflict(err, "Category", name.clone()))?;
        if updated == 0 {
            return Err(FinanceError::category_not_found(id));
        }
        tracing::info!(category_id = id, name = %name, "category renamed");
        self.get_category(id)
    }

    /// Insert any missing default categories. Returns how many were added.
    pub fn seed_default_categories(&self) -> FinanceResult<usize> {
        let created_at = now_utc();
        let mut added = 0;
        for name in db::DEFAULT_CATEGORIES {
            added += db::insert_category_if_missing(self.conn, name, created_at)?;
        }
        if added > 0 {
            tracing::info!(added, "seeded default categories");
        }
        Ok(added)
    }

    fn ensure_category(&self, id: i64) -> FinanceResult<()> {
        if db::category_exists(self.conn, id)? {
            Ok(())
        } else {
            Err(FinanceError::category_not_found(id))
        }
    }

    // Transactions

    pub fn create_transaction(&self, input: NewTransaction) -> FinanceResult<Transaction> {
        let amount_cents = validation::positive_cents("amount", input.amount)?;
        let description = description(&input.description)?;
        self.ensure_user(input.user_id)?;
        self.ensure_category(input.category_id)?;

        let row = TransactionRow {
            category_id: input.category_id,
            amount_cents,
            description: &description,
            kind: input.kind,
            occurred_at: input.date.trunc_subsecs(0),
        };
        let id = db::insert_transaction(self.conn, input.user_id, &row, now_utc())?;
        tracing::info!(
            transaction_id = id,
            user_id = input.user_id,
            kind = %input.kind,
            amount_cents,
            "transaction created"
        );
        self.get_transaction(id)
    }

    pub fn get_transaction(&self, id: i64) -> FinanceResult<Transaction> {
        db::get_transaction(self.conn, id)?.ok_or_else(|| FinanceError::transaction_not_found(id))
    }

    /// Transactions matching `filter`, newest first.
    pub fn list_transactions(&self, filter: &TransactionFilter) -> FinanceResult<Vec<Transaction>> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(FinanceError::invalid(
                    "date_from",
                    "date_from must not be after date_to",
                ));
            }
        }
        Ok(db::list_transactions(self.conn, filter)?)
    }

    pub fn update_transaction(&self, id: i64, patch: TransactionPatch) -> FinanceResult<Transaction> {
        let current = self.get_transaction(id)?;

        let amount_cents = match patch.amount {
            Some(amount) => validation::positive_cents("amount", amount)?,
            None => money::to_cents(current.amount).unwrap_or_default(),
        };
        let description = match patch.description {
            Some(value) => description(&value)?,
            None => current.description,
        };
        let category_id = match patch.category_id {
            Some(category_id) => {
                self.ensure_category(category_id)?;
                category_id
            }
            None => current.category_id,
        };
        let occurred_at = patch.date.unwrap_or(current.date).trunc_subsecs(0);

        let row = TransactionRow {
            category_id,
            amount_cents,
            description: &description,
            kind: patch.kind.unwrap_or(current.kind),
            occurred_at,
        };
        if db::update_transaction(self.conn, id, &row)? == 0 {
            return Err(FinanceError::transaction_not_found(id));
        }
        tracing::info!(transaction_id = id, "transaction updated");
        self.get_transaction(id)
    }

    pub fn delete_transaction(&self, id: i64) -> FinanceResult<()> {
        if db::delete_transaction(self.conn, id)? == 0 {
            return Err(FinanceError::transaction_not_found(id));
        }
        tracing::info!(transaction_id = id, "transaction deleted");
        Ok(())
    }

    // Budgets

    pub fn create_budget(&self, input: NewBudget) -> FinanceResult<Budget> {
        let amount_cents = validation::positive_cents("amount", input.amount)?;
        self.ensure_user(input.user_id)?;
        self.ensure_category(input.category_id)?;

        let id = db::insert_budget(
            self.conn,
            input.user_id,
            input.category_id,
            amount_cents,
            input.period,
            now_utc(),
        )
        .map_err(|err| {
            conflict(
                err,
                "Budget",
                format!("{} budget for category {}", input.period, input.category_id),
            )
        })?;
        tracing::info!(
            budget_id = id,
            user_id = input.user_id,
            period = %input.period,
            amount_cents,
            "budget created"
        );
        self.get_budget(id)
    }

    pub fn get_budget(&self, id: i64) -> FinanceResult<Budget> {
        db::get_budget(self.conn, id)?.ok_or_else(|| FinanceError::budget_not_found(id))
    }

    pub fn list_budgets(&self, user_id: Option<i64>) -> FinanceResult<Vec<Budget>> {
        Ok(db::list_budgets(self.conn, user_id)?)
    }

    pub fn update_budget(&self, id: i64, patch: BudgetPatch) -> FinanceResult<Budget> {
        let current = self.get_budget(id)?;

        let amount_cents = match patch.amount {
            Some(amount) => validation::positive_cents("amount", amount)?,
            None => money::to_cents(current.amount).unwrap_or_default(),
        };
        let category_id = match patch.category_id {
            Some(category_id) => {
                self.ensure_category(category_id)?;
                category_id
            }
            None => current.category_id,
        };
        let period = patch.period.unwrap_or(current.period);

        let updated = db::update_budget(self.conn, id, category_id, amount_cents, period)
            .map_err(|err| {
                conflict(
                    err,
                    "Budget",
                    format!("{period} budget for category {category_id}"),
                )
            })?;
        if updated == 0 {
            return Err(FinanceError::budget_not_found(id));
        }
        tracing::info!(budget_id = id, "budget updated");
        self.get_budget(id)
    }

    pub fn delete_budget(&self, id: i64) -> FinanceResult<()> {
        if db::delete_budget(self.conn, id)? == 0 {
            return Err(FinanceError::budget_not_found(id));
        }
        tracing::info!(budget_id = id, "budget deleted");
        Ok(())
    }
}
