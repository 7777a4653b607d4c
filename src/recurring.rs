//! This file defines recurring transactions: definitions that spawn concrete
//! transactions on a schedule (rent, salary, subscriptions).
//!
//! The date arithmetic that drives the schedule lives in [crate::schedule].

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    AppConfig, Error,
    auth::Claims,
    category::DatabaseID,
    db::{CreateTable, MapRow},
    schedule::{self, RecurringDigest},
    user::UserID,
};

/// How often a recurring transaction repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Every two weeks.
    Biweekly,
    /// Every month, on the same day of month where possible.
    Monthly,
    /// Every year, on the same date.
    Yearly,
}

impl Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frequency = match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        };

        write!(f, "{frequency}")
    }
}

/// The error returned when a string could not be parsed as a [Frequency].
#[derive(Debug, Error, PartialEq)]
#[error("{0:?} is not a valid frequency")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            _ => Err(ParseFrequencyError(string.to_string())),
        }
    }
}

/// A definition that spawns transactions on a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTransaction {
    /// The recurring transaction's ID in the application database.
    pub id: DatabaseID,
    /// A short label, e.g. "Rent".
    pub name: String,
    /// The amount of each spawned transaction.
    pub amount: f64,
    /// The name of the category spawned transactions belong to.
    pub category: String,
    /// Whether spawned transactions are income.
    pub is_income: bool,
    /// How often the transaction repeats.
    pub frequency: Frequency,
    /// The date of the first occurrence.
    pub start_date: NaiveDate,
    /// The date after which no more occurrences happen, if any.
    pub end_date: Option<NaiveDate>,
    /// Whether the schedule is running. Inactive definitions spawn nothing.
    pub is_active: bool,
    /// The date of the most recently materialized occurrence. `None` until
    /// the first occurrence has been materialized.
    pub last_processed: Option<NaiveDate>,
    /// A free-form description, copied into spawned transactions.
    pub description: String,
}

impl CreateTable for RecurringTransaction {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE recurring_transaction (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                is_income INTEGER NOT NULL,
                frequency TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                is_active INTEGER NOT NULL,
                last_processed TEXT,
                description TEXT NOT NULL
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for RecurringTransaction {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, rusqlite::Error> {
        let raw_frequency: String = row.get(offset + 5)?;
        let frequency = Frequency::from_str(&raw_frequency).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                offset + 5,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;

        Ok(Self {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            amount: row.get(offset + 2)?,
            category: row.get(offset + 3)?,
            is_income: row.get(offset + 4)?,
            frequency,
            start_date: row.get(offset + 6)?,
            end_date: row.get(offset + 7)?,
            is_active: row.get(offset + 8)?,
            last_processed: row.get(offset + 9)?,
            description: row.get(offset + 10)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, name, amount, category, is_income, frequency, start_date, \
     end_date, is_active, last_processed, description";

/// The data submitted when creating or replacing a recurring transaction.
#[derive(Debug, Deserialize)]
pub struct RecurringForm {
    /// A short label, e.g. "Rent".
    pub name: String,
    /// The amount of each spawned transaction.
    pub amount: f64,
    /// The name of the category spawned transactions belong to.
    #[serde(default)]
    pub category: String,
    /// Whether spawned transactions are income, defaults to false.
    #[serde(default)]
    pub is_income: bool,
    /// How often the transaction repeats.
    pub frequency: Frequency,
    /// The date of the first occurrence, defaults to today when omitted.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// The date after which no more occurrences happen, if any.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Whether the schedule is running, defaults to true.
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    /// A free-form description, copied into spawned transactions.
    #[serde(default)]
    pub description: String,
}

fn default_is_active() -> bool {
    true
}

fn validate_date_range(start_date: NaiveDate, end_date: Option<NaiveDate>) -> Result<(), Error> {
    match end_date {
        Some(end) if end < start_date => Err(Error::EndDateBeforeStart {
            end,
            start: start_date,
        }),
        _ => Ok(()),
    }
}

/// Create a new recurring transaction for `user_id`.
///
/// # Errors
///
/// Returns [Error::EndDateBeforeStart] if the form's end date is before its
/// start date.
pub fn insert_recurring(
    connection: &Connection,
    user_id: UserID,
    form: &RecurringForm,
    today: NaiveDate,
) -> Result<RecurringTransaction, Error> {
    let start_date = form.start_date.unwrap_or(today);
    validate_date_range(start_date, form.end_date)?;

    let recurring = connection
        .prepare(&format!(
            "INSERT INTO recurring_transaction
                (user_id, name, amount, category, is_income, frequency, start_date, end_date,
                 is_active, last_processed, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10)
             RETURNING {SELECT_COLUMNS}"
        ))?
        .query_row(
            (
                user_id.as_i64(),
                &form.name,
                form.amount,
                &form.category,
                form.is_income,
                form.frequency.to_string(),
                start_date,
                form.end_date,
                form.is_active,
                &form.description,
            ),
            RecurringTransaction::map_row,
        )?;

    Ok(recurring)
}

/// Retrieve one of `user_id`'s recurring transactions by its `id`.
pub fn get_recurring(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
) -> Result<RecurringTransaction, Error> {
    let recurring = connection
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM recurring_transaction
             WHERE id = :id AND user_id = :user_id"
        ))?
        .query_row(
            &[(":id", &id), (":user_id", &user_id.as_i64())],
            RecurringTransaction::map_row,
        )?;

    Ok(recurring)
}

/// Retrieve all of `user_id`'s recurring transactions.
pub fn list_recurring(
    connection: &Connection,
    user_id: UserID,
) -> Result<Vec<RecurringTransaction>, Error> {
    let recurring = connection
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM recurring_transaction
             WHERE user_id = :user_id ORDER BY id"
        ))?
        .query_map(
            &[(":user_id", &user_id.as_i64())],
            RecurringTransaction::map_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(recurring)
}

/// Replace the recurring transaction `id` with the fields in `form`.
///
/// The stored `last_processed` date is kept so that editing a definition
/// never re-materializes occurrences that already happened.
///
/// # Errors
///
/// Returns [Error::NotFound] if `id` does not refer to one of `user_id`'s
/// recurring transactions.
pub fn update_recurring(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
    form: &RecurringForm,
    today: NaiveDate,
) -> Result<RecurringTransaction, Error> {
    let start_date = form.start_date.unwrap_or(today);
    validate_date_range(start_date, form.end_date)?;

    let rows_changed = connection.execute(
        "UPDATE recurring_transaction
         SET name = ?1, amount = ?2, category = ?3, is_income = ?4, frequency = ?5,
             start_date = ?6, end_date = ?7, is_active = ?8, description = ?9
         WHERE id = ?10 AND user_id = ?11",
        (
            &form.name,
            form.amount,
            &form.category,
            form.is_income,
            form.frequency.to_string(),
            start_date,
            form.end_date,
            form.is_active,
            &form.description,
            id,
            user_id.as_i64(),
        ),
    )?;

    if rows_changed == 0 {
        return Err(Error::NotFound);
    }

    get_recurring(connection, user_id, id)
}

/// Record that the occurrence on `date` has been materialized.
pub fn set_last_processed(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
    date: NaiveDate,
) -> Result<(), Error> {
    connection.execute(
        "UPDATE recurring_transaction SET last_processed = ?1 WHERE id = ?2 AND user_id = ?3",
        (date, id, user_id.as_i64()),
    )?;

    Ok(())
}

/// Delete the recurring transaction `id`.
///
/// Transactions already spawned from the definition are kept.
pub fn delete_recurring(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM recurring_transaction WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    Ok(())
}

/// A route handler for listing the user's recurring transactions.
pub async fn get_recurring_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Vec<RecurringTransaction>>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    list_recurring(&connection, claims.user_id()).map(Json)
}

/// A route handler for creating a new recurring transaction.
pub async fn create_recurring_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Json(form): Json<RecurringForm>,
) -> Result<(StatusCode, Json<RecurringTransaction>), Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let today = Utc::now().date_naive();
    let recurring = insert_recurring(&connection, claims.user_id(), &form, today)?;

    Ok((StatusCode::CREATED, Json(recurring)))
}

/// A route handler for replacing an existing recurring transaction.
pub async fn update_recurring_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(recurring_id): Path<DatabaseID>,
    Json(form): Json<RecurringForm>,
) -> Result<Json<RecurringTransaction>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let today = Utc::now().date_naive();
    update_recurring(&connection, claims.user_id(), recurring_id, &form, today).map(Json)
}

/// A route handler for deleting a recurring transaction.
pub async fn delete_recurring_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(recurring_id): Path<DatabaseID>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    delete_recurring(&connection, claims.user_id(), recurring_id)?;

    Ok(StatusCode::NO_CONTENT)
}

/// A route handler for the due/upcoming digest of recurring transactions.
///
/// Splits the user's active definitions into those due today or earlier and
/// those coming up within the next seven days.
pub async fn get_recurring_digest_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<RecurringDigest>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let recurring = list_recurring(&connection, claims.user_id())?;
    let today = Utc::now().date_naive();

    Ok(Json(schedule::split_due_upcoming(&recurring, today)))
}
