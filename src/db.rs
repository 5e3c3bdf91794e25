use chrono::NaiveDateTime;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Result, Row, ToSql};

use crate::config::DatabaseConfig;
use crate::error::FinanceResult;
use crate::models::{
    Budget, Category, CategoryTotalRecord, MonthTotalsRecord, TotalsRecord, Transaction,
    TransactionFilter, TransactionType, User,
};
use crate::money;
use crate::period::{Period, Window};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Categories inserted on first start when seeding is enabled.
pub const DEFAULT_CATEGORIES: [&str; 12] = [
    "Food & Dining",
    "Transportation",
    "Shopping",
    "Entertainment",
    "Bills & Utilities",
    "Healthcare",
    "Education",
    "Travel",
    "Salary",
    "Freelance",
    "Investment",
    "Other",
];

/// Build the connection pool and bring the schema up to date.
///
/// An in-memory database exists once per connection, so `:memory:` forces a
/// single-connection pool.
pub fn init_pool(config: &DatabaseConfig) -> FinanceResult<DbPool> {
    let in_memory = config.path == ":memory:";
    let manager = if in_memory {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(&config.path)
    }
    .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

    // Each in-memory connection is its own database, so keep exactly one
    // and never recycle it.
    let builder = if in_memory {
        Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        Pool::builder().max_size(config.pool_size)
    };
    let pool = builder.build(manager)?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            amount_cents INTEGER NOT NULL CHECK(amount_cents > 0),
            description TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL CHECK(kind IN ('income', 'expense')),
            occurred_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES categories(id)
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_user_date
            ON transactions(user_id, occurred_at);

        CREATE TABLE IF NOT EXISTS budgets (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            amount_cents INTEGER NOT NULL CHECK(amount_cents >= 0),
            period TEXT NOT NULL CHECK(period IN ('weekly', 'monthly', 'yearly')),
            created_at TEXT NOT NULL,
            UNIQUE(user_id, category_id, period),
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES categories(id)
        );
        ",
    )
}

/// True when `err` is a UNIQUE constraint failure.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

impl ToSql for Period {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Period {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

fn collect<T>(rows: impl Iterator<Item = Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// Users

fn user_from_row(row: &Row<'_>) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn insert_user(conn: &Connection, name: &str, email: &str, created_at: NaiveDateTime) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
        params![name, email, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, name, email, created_at FROM users WHERE id = ?1",
        params![id],
        user_from_row,
    )
    .optional()
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, name, email, created_at FROM users ORDER BY id")?;
    let rows = stmt.query_map([], user_from_row)?;
    collect(rows)
}

pub fn user_exists(conn: &Connection, id: i64) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        params![id],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

// Categories

fn category_from_row(row: &Row<'_>) -> Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, name, created_at
        FROM categories
        ORDER BY name
        ",
    )?;
    let rows = stmt.query_map([], category_from_row)?;
    collect(rows)
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, name, created_at
        FROM categories
        WHERE id = ?1
        ",
    )?;
    let mut rows = stmt.query(params![id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(category_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn category_exists(conn: &Connection, id: i64) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        params![id],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

pub fn insert_category(conn: &Connection, name: &str, created_at: NaiveDateTime) -> Result<i64> {
    conn.execute(
        "INSERT INTO categories (name, created_at) VALUES (?1, ?2)",
        params![name, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert unless a category with the same name exists. Returns rows added.
pub fn insert_category_if_missing(conn: &Connection, name: &str, created_at: NaiveDateTime) -> Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO categories (name, created_at) VALUES (?1, ?2)",
        params![name, created_at],
    )
}

pub fn rename_category(conn: &Connection, id: i64, name: &str) -> Result<usize> {
    conn.execute(
        "UPDATE categories SET name = ?1 WHERE id = ?2",
        params![name, id],
    )
}

// Transactions

const TRANSACTION_SELECT: &str = "
    SELECT t.id, t.user_id, t.category_id, c.name, t.amount_cents, t.description,
           t.kind, t.occurred_at, t.created_at
    FROM transactions t
    LEFT JOIN categories c ON t.category_id = c.id
";

fn transaction_from_row(row: &Row<'_>) -> Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        category_name: row.get(3)?,
        amount: money::from_cents(row.get(4)?),
        description: row.get(5)?,
        kind: row.get(6)?,
        date: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Column values written by insert and update.
#[derive(Debug, Clone)]
pub struct TransactionRow<'a> {
    pub category_id: i64,
    pub amount_cents: i64,
    pub description: &'a str,
    pub kind: TransactionType,
    pub occurred_at: NaiveDateTime,
}

pub fn insert_transaction(
    conn: &Connection,
    user_id: i64,
    row: &TransactionRow<'_>,
    created_at: NaiveDateTime,
) -> Result<i64> {
    conn.execute(
        "
        INSERT INTO transactions
            (user_id, category_id, amount_cents, description, kind, occurred_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
        params![
            user_id,
            row.category_id,
            row.amount_cents,
            row.description,
            row.kind,
            row.occurred_at,
            created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    conn.query_row(
        &format!("{TRANSACTION_SELECT} WHERE t.id = ?1"),
        params![id],
        transaction_from_row,
    )
    .optional()
}

pub fn list_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "
        {TRANSACTION_SELECT}
        WHERE (?1 IS NULL OR t.user_id = ?1)
          AND (?2 IS NULL OR t.category_id = ?2)
          AND (?3 IS NULL OR t.kind = ?3)
          AND (?4 IS NULL OR t.occurred_at >= ?4)
          AND (?5 IS NULL OR t.occurred_at <= ?5)
        ORDER BY t.occurred_at DESC, t.id DESC
        "
    ))?;
    let rows = stmt.query_map(
        params![
            filter.user_id,
            filter.category_id,
            filter.kind,
            filter.date_from,
            filter.date_to
        ],
        transaction_from_row,
    )?;
    collect(rows)
}

pub fn update_transaction(conn: &Connection, id: i64, row: &TransactionRow<'_>) -> Result<usize> {
    conn.execute(
        "
        UPDATE transactions
        SET category_id = ?1, amount_cents = ?2, description = ?3, kind = ?4, occurred_at = ?5
        WHERE id = ?6
        ",
        params![
            row.category_id,
            row.amount_cents,
            row.description,
            row.kind,
            row.occurred_at,
            id
        ],
    )
}

pub fn delete_transaction(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute("DELETE FROM transactions WHERE id = ?1", params![id])
}

// Budgets

const BUDGET_SELECT: &str = "
    SELECT b.id, b.user_id, b.category_id, c.name, b.amount_cents, b.period, b.created_at
    FROM budgets b
    LEFT JOIN categories c ON b.category_id = c.id
";

fn budget_from_row(row: &Row<'_>) -> Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        category_name: row.get(3)?,
        amount: money::from_cents(row.get(4)?),
        period: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn insert_budget(
    conn: &Connection,
    user_id: i64,
    category_id: i64,
    amount_cents: i64,
    period: Period,
    created_at: NaiveDateTime,
) -> Result<i64> {
    conn.execute(
        "
        INSERT INTO budgets (user_id, category_id, amount_cents, period, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
        params![user_id, category_id, amount_cents, period, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_budget(conn: &Connection, id: i64) -> Result<Option<Budget>> {
    conn.query_row(
        &format!("{BUDGET_SELECT} WHERE b.id = ?1"),
        params![id],
        budget_from_row,
    )
    .optional()
}

pub fn list_budgets(conn: &Connection, user_id: Option<i64>) -> Result<Vec<Budget>> {
    let mut stmt = conn.prepare(&format!(
        "
        {BUDGET_SELECT}
        WHERE (?1 IS NULL OR b.user_id = ?1)
        ORDER BY c.name, b.period, b.id
        "
    ))?;
    let rows = stmt.query_map(params![user_id], budget_from_row)?;
    collect(rows)
}

pub fn update_budget(
    conn: &Connection,
    id: i64,
    category_id: i64,
    amount_cents: i64,
    period: Period,
) -> Result<usize> {
    conn.execute(
        "UPDATE budgets SET category_id = ?1, amount_cents = ?2, period = ?3 WHERE id = ?4",
        params![category_id, amount_cents, period, id],
    )
}

pub fn delete_budget(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute("DELETE FROM budgets WHERE id = ?1", params![id])
}

// Aggregates

pub fn window_totals(conn: &Connection, user_id: i64, window: Window) -> Result<TotalsRecord> {
    conn.query_row(
        "
        SELECT COALESCE(SUM(CASE WHEN kind = 'income' THEN amount_cents END), 0),
               COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount_cents END), 0),
               COUNT(*)
        FROM transactions
        WHERE user_id = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3
        ",
        params![user_id, window.start, window.end],
        |row| {
            Ok(TotalsRecord {
                income_cents: row.get(0)?,
                expense_cents: row.get(1)?,
                count: row.get(2)?,
            })
        },
    )
}

/// Expense totals per category, largest first. `None` covers all history.
pub fn category_expense_totals(
    conn: &Connection,
    user_id: i64,
    window: Option<Window>,
) -> Result<Vec<CategoryTotalRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT c.id, c.name, COALESCE(SUM(t.amount_cents), 0) AS expense_cents
        FROM transactions t
        JOIN categories c ON t.category_id = c.id
        WHERE t.user_id = ?1
          AND t.kind = 'expense'
          AND (?2 IS NULL OR t.occurred_at >= ?2)
          AND (?3 IS NULL OR t.occurred_at <= ?3)
        GROUP BY c.id, c.name
        ORDER BY expense_cents DESC, c.name
        ",
    )?;
    let rows = stmt.query_map(
        params![user_id, window.map(|w| w.start), window.map(|w| w.end)],
        |row| {
            Ok(CategoryTotalRecord {
                category_id: row.get(0)?,
                category_name: row.get(1)?,
                expense_cents: row.get(2)?,
            })
        },
    )?;
    collect(rows)
}

/// Income and expense per calendar month for activity in `window`.
pub fn month_totals(conn: &Connection, user_id: i64, window: Window) -> Result<Vec<MonthTotalsRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT substr(occurred_at, 1, 7) AS month,
               COALESCE(SUM(CASE WHEN kind = 'income' THEN amount_cents END), 0) AS income_cents,
               COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount_cents END), 0) AS expense_cents
        FROM transactions
        WHERE user_id = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3
        GROUP BY month
        ORDER BY month
        ",
    )?;
    let rows = stmt.query_map(params![user_id, window.start, window.end], |row| {
        Ok(MonthTotalsRecord {
            month: row.get(0)?,
            income_cents: row.get(1)?,
            expense_cents: row.get(2)?,
        })
    })?;
    collect(rows)
}

pub fn category_expense_in_window(
    conn: &Connection,
    user_id: i64,
    category_id: i64,
    window: Window,
) -> Result<i64> {
    conn.query_row(
        "
        SELECT COALESCE(SUM(amount_cents), 0)
        FROM transactions
        WHERE user_id = ?1
          AND category_id = ?2
          AND kind = 'expense'
          AND occurred_at >= ?3
          AND occurred_at <= ?4
        ",
        params![user_id, category_id, window.start, window.end],
        |row| row.get(0),
    )
}
