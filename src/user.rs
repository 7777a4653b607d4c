//! Code for creating the user table, fetching users from the database, and
//! registering new users.

use std::fmt::Display;

use axum::{Json, extract::State, http::StatusCode};
use email_address::EmailAddress;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{
    AppConfig, Error,
    category::insert_default_categories,
    db::{CreateTable, MapRow},
    password::{PasswordHash, ValidatedPassword},
    settings::ensure_default_settings,
};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's email address.
    pub email: EmailAddress,
    /// The user's password hash.
    pub password_hash: PasswordHash,
}

impl CreateTable for User {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE user (
                id INTEGER PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for User {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, rusqlite::Error> {
        let raw_id = row.get(offset)?;
        let raw_email: String = row.get(offset + 1)?;
        let raw_password_hash: String = row.get(offset + 2)?;

        Ok(Self {
            id: UserID::new(raw_id),
            email: EmailAddress::new_unchecked(raw_email),
            password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        })
    }
}

/// Create a new user in the database.
///
/// # Errors
///
/// This function will return [Error::DuplicateEmail] if `email` is already in
/// use, or [Error::SqlError] if there is some other SQL error.
pub fn insert_user(
    connection: &Connection,
    email: &EmailAddress,
    password_hash: PasswordHash,
) -> Result<User, Error> {
    connection.execute(
        "INSERT INTO user (email, password) VALUES (?1, ?2)",
        (email.to_string(), password_hash.to_string()),
    )?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        email: email.to_owned(),
        password_hash,
    })
}

/// Get the user that has the specified `email` address.
///
/// # Errors
///
/// Returns [Error::NotFound] if no such user exists.
pub fn get_user_by_email(connection: &Connection, email: &EmailAddress) -> Result<User, Error> {
    let user = connection
        .prepare("SELECT id, email, password FROM user WHERE email = :email")?
        .query_row(&[(":email", &email.to_string())], User::map_row)?;

    Ok(user)
}

/// Get the user that has the specified `id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no such user exists.
pub fn get_user_by_id(connection: &Connection, id: UserID) -> Result<User, Error> {
    let user = connection
        .prepare("SELECT id, email, password FROM user WHERE id = :id")?
        .query_row(&[(":id", &id.as_i64())], User::map_row)?;

    Ok(user)
}

/// The user fields that are safe to send to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's email address.
    pub email: EmailAddress,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

/// The data submitted when registering a new user.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    /// The email address to register with.
    pub email: EmailAddress,
    /// The plain text password to register with.
    pub password: String,
}

/// A route handler for registering a new user.
///
/// New users are seeded with the default categories and settings.
pub async fn register_endpoint(
    State(state): State<AppConfig>,
    Json(form): Json<RegisterForm>,
) -> Result<(StatusCode, Json<UserProfile>), Error> {
    let validated_password = ValidatedPassword::new(&form.password)?;
    let password_hash = PasswordHash::new(validated_password, PasswordHash::DEFAULT_COST)?;

    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let user = insert_user(&connection, &form.email, password_hash)?;
    insert_default_categories(&connection, user.id)?;
    ensure_default_settings(&connection, user.id)?;

    tracing::info!("registered new user {}", user.id);

    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}
