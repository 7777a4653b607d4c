//! Per-user settings. Currently these only control notifications.

use axum::{Json, extract::State};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{
    AppConfig, Error,
    auth::Claims,
    db::{CreateTable, MapRow},
    user::UserID,
};

/// A user's application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether recurring transaction notifications are generated at all.
    pub notifications_enabled: bool,
    /// How many days before an occurrence the user wants to be reminded.
    pub notifications_lead_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            notifications_lead_days: 3,
        }
    }
}

impl CreateTable for Settings {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE settings (
                user_id INTEGER PRIMARY KEY,
                notifications_enabled INTEGER NOT NULL,
                notifications_lead_days INTEGER NOT NULL
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Settings {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            notifications_enabled: row.get(offset)?,
            notifications_lead_days: row.get(offset + 1)?,
        })
    }
}

/// Insert the default settings for `user_id` if they have none yet.
pub fn ensure_default_settings(connection: &Connection, user_id: UserID) -> Result<(), Error> {
    let defaults = Settings::default();

    connection.execute(
        "INSERT OR IGNORE INTO settings (user_id, notifications_enabled, notifications_lead_days)
         VALUES (?1, ?2, ?3)",
        (
            user_id.as_i64(),
            defaults.notifications_enabled,
            defaults.notifications_lead_days,
        ),
    )?;

    Ok(())
}

/// Get `user_id`'s settings, falling back to the defaults if none are stored.
pub fn get_settings(connection: &Connection, user_id: UserID) -> Result<Settings, Error> {
    let result = connection
        .prepare(
            "SELECT notifications_enabled, notifications_lead_days
             FROM settings WHERE user_id = :user_id",
        )?
        .query_row(&[(":user_id", &user_id.as_i64())], Settings::map_row);

    match result {
        Ok(settings) => Ok(settings),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Settings::default()),
        Err(error) => Err(error.into()),
    }
}

/// A partial settings update. Omitted fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsPatch {
    /// Whether recurring transaction notifications are generated at all.
    #[serde(default)]
    pub notifications_enabled: Option<bool>,
    /// How many days before an occurrence the user wants to be reminded.
    #[serde(default)]
    pub notifications_lead_days: Option<i64>,
}

/// Merge `patch` into `user_id`'s stored settings and return the result.
///
/// Lead days are clamped to zero or more.
pub fn update_settings(
    connection: &Connection,
    user_id: UserID,
    patch: &SettingsPatch,
) -> Result<Settings, Error> {
    let current = get_settings(connection, user_id)?;

    let merged = Settings {
        notifications_enabled: patch
            .notifications_enabled
            .unwrap_or(current.notifications_enabled),
        notifications_lead_days: patch
            .notifications_lead_days
            .unwrap_or(current.notifications_lead_days)
            .max(0),
    };

    connection.execute(
        "INSERT INTO settings (user_id, notifications_enabled, notifications_lead_days)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO UPDATE SET
            notifications_enabled = ?2, notifications_lead_days = ?3",
        (
            user_id.as_i64(),
            merged.notifications_enabled,
            merged.notifications_lead_days,
        ),
    )?;

    Ok(merged)
}

/// A route handler for fetching the user's settings.
pub async fn get_settings_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Settings>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    get_settings(&connection, claims.user_id()).map(Json)
}

/// A route handler for partially updating the user's settings.
pub async fn update_settings_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    update_settings(&connection, claims.user_id(), &patch).map(Json)
}
