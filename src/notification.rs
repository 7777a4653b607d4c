//! In-app notifications, including the sync step that generates reminders for
//! recurring transactions coming up within the next week.
//!
//! Notifications are soft deleted: a deleted notification disappears from
//! listings but keeps blocking the sync step from recreating a reminder for
//! the same occurrence.

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    AppConfig, Error,
    auth::Claims,
    category::DatabaseID,
    db::{CreateTable, MapRow},
    recurring::list_recurring,
    schedule::{NOTIFICATION_HORIZON_DAYS, next_occurrence},
    settings::get_settings,
    user::UserID,
};

/// What kind of event a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// A free-form message, e.g. a test notification.
    Info,
    /// A reminder for an upcoming recurring transaction.
    Recurring,
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            NotificationKind::Info => "info",
            NotificationKind::Recurring => "recurring",
        };

        write!(f, "{kind}")
    }
}

/// The error returned when a string could not be parsed as a
/// [NotificationKind].
#[derive(Debug, Error, PartialEq)]
#[error("{0:?} is not a valid notification kind")]
pub struct ParseNotificationKindError(String);

impl FromStr for NotificationKind {
    type Err = ParseNotificationKindError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "info" => Ok(NotificationKind::Info),
            "recurring" => Ok(NotificationKind::Recurring),
            _ => Err(ParseNotificationKindError(string.to_string())),
        }
    }
}

/// Whether a notification is visible or has been soft deleted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotificationStatus {
    /// The notification shows up in listings.
    Active,
    /// The notification is hidden from listings but retained for dedup.
    Deleted {
        /// When the notification was deleted.
        at: DateTime<Utc>,
    },
}

impl NotificationStatus {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            NotificationStatus::Active => None,
            NotificationStatus::Deleted { at } => Some(*at),
        }
    }
}

impl From<Option<DateTime<Utc>>> for NotificationStatus {
    fn from(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            None => NotificationStatus::Active,
            Some(at) => NotificationStatus::Deleted { at },
        }
    }
}

/// Serializes a [NotificationStatus] as a nullable `deleted_at` timestamp.
mod deleted_at_repr {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::NotificationStatus;

    pub fn serialize<S: Serializer>(
        status: &NotificationStatus,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        status.deleted_at().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NotificationStatus, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer).map(NotificationStatus::from)
    }
}

/// An in-app notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// The notification's ID in the application database.
    pub id: DatabaseID,
    /// A short headline, e.g. "Rent due Tomorrow".
    pub title: String,
    /// The message body.
    pub body: String,
    /// What kind of event the notification describes.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// The recurring transaction the notification reminds about, if any.
    pub recurring_id: Option<DatabaseID>,
    /// The occurrence date the notification reminds about, if any.
    pub notification_date: Option<NaiveDate>,
    /// Whether the user has read the notification.
    #[serde(rename = "read")]
    pub is_read: bool,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
    /// Whether the notification is visible or soft deleted.
    #[serde(rename = "deleted_at", with = "deleted_at_repr")]
    pub status: NotificationStatus,
}

impl CreateTable for Notification {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE notification (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                kind TEXT NOT NULL,
                recurring_id INTEGER,
                notification_date TEXT,
                is_read INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                deleted_at TEXT
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Notification {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, rusqlite::Error> {
        let raw_kind: String = row.get(offset + 3)?;
        let kind = NotificationKind::from_str(&raw_kind).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                offset + 3,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;

        let deleted_at: Option<DateTime<Utc>> = row.get(offset + 8)?;

        Ok(Self {
            id: row.get(offset)?,
            title: row.get(offset + 1)?,
            body: row.get(offset + 2)?,
            kind,
            recurring_id: row.get(offset + 4)?,
            notification_date: row.get(offset + 5)?,
            is_read: row.get(offset + 6)?,
            created_at: row.get(offset + 7)?,
            status: NotificationStatus::from(deleted_at),
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, title, body, kind, recurring_id, notification_date, is_read, created_at, deleted_at";

/// The data needed to insert a notification record.
#[derive(Debug, Clone)]
pub struct NewNotification {
    /// A short headline.
    pub title: String,
    /// The message body.
    pub body: String,
    /// What kind of event the notification describes.
    pub kind: NotificationKind,
    /// The recurring transaction the notification reminds about, if any.
    pub recurring_id: Option<DatabaseID>,
    /// The occurrence date the notification reminds about, if any.
    pub notification_date: Option<NaiveDate>,
}

/// Create a new notification for `user_id`.
pub fn insert_notification(
    connection: &Connection,
    user_id: UserID,
    new_notification: &NewNotification,
) -> Result<Notification, Error> {
    let notification = connection
        .prepare(&format!(
            "INSERT INTO notification
                (user_id, title, body, kind, recurring_id, notification_date, is_read,
                 created_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, NULL)
             RETURNING {SELECT_COLUMNS}"
        ))?
        .query_row(
            (
                user_id.as_i64(),
                &new_notification.title,
                &new_notification.body,
                new_notification.kind.to_string(),
                new_notification.recurring_id,
                new_notification.notification_date,
                Utc::now(),
            ),
            Notification::map_row,
        )?;

    Ok(notification)
}

/// Retrieve `user_id`'s notifications that have not been soft deleted,
/// newest first.
pub fn list_active_notifications(
    connection: &Connection,
    user_id: UserID,
) -> Result<Vec<Notification>, Error> {
    let notifications = connection
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM notification
             WHERE user_id = :user_id AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC"
        ))?
        .query_map(&[(":user_id", &user_id.as_i64())], Notification::map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(notifications)
}

/// Mark the notification `id` as read.
///
/// # Errors
///
/// Returns [Error::NotFound] if `id` does not refer to one of `user_id`'s
/// notifications.
pub fn mark_notification_read(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
) -> Result<Notification, Error> {
    let notification = connection
        .prepare(&format!(
            "UPDATE notification SET is_read = 1
             WHERE id = :id AND user_id = :user_id
             RETURNING {SELECT_COLUMNS}"
        ))?
        .query_row(
            &[(":id", &id), (":user_id", &user_id.as_i64())],
            Notification::map_row,
        )?;

    Ok(notification)
}

/// Soft delete the notification `id`.
///
/// The row is kept so the sync step will not recreate a reminder for the
/// same occurrence.
///
/// # Errors
///
/// Returns [Error::NotFound] if `id` does not refer to one of `user_id`'s
/// notifications.
pub fn soft_delete_notification(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
) -> Result<(), Error> {
    let rows_changed = connection.execute(
        "UPDATE notification SET deleted_at = ?1 WHERE id = ?2 AND user_id = ?3",
        (Utc::now(), id, user_id.as_i64()),
    )?;

    if rows_changed == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Check whether a reminder already exists for the given occurrence of a
/// recurring transaction. Soft-deleted reminders count.
pub fn recurring_notification_exists(
    connection: &Connection,
    user_id: UserID,
    recurring_id: DatabaseID,
    notification_date: NaiveDate,
) -> Result<bool, Error> {
    let count: i64 = connection
        .prepare(
            "SELECT COUNT(*) FROM notification
             WHERE user_id = ?1 AND kind = 'recurring'
               AND recurring_id = ?2 AND notification_date = ?3",
        )?
        .query_row(
            (user_id.as_i64(), recurring_id, notification_date),
            |row| row.get(0),
        )?;

    Ok(count > 0)
}

fn time_text(days_until: i64) -> String {
    match days_until {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        days => format!("In {days} days"),
    }
}

/// Generate reminders for `user_id`'s active recurring transactions whose
/// next occurrence falls between `today` and the notification horizon.
///
/// At most one reminder exists per occurrence of a recurring transaction,
/// no matter how often this runs. Does nothing if the user has disabled
/// notifications.
pub fn sync_recurring_notifications(
    connection: &Connection,
    user_id: UserID,
    today: NaiveDate,
) -> Result<(), Error> {
    if !get_settings(connection, user_id)?.notifications_enabled {
        return Ok(());
    }

    let horizon = today + chrono::Duration::days(NOTIFICATION_HORIZON_DAYS);

    for recurring in list_recurring(connection, user_id)? {
        if !recurring.is_active {
            continue;
        }

        let Some(next) = next_occurrence(&recurring) else {
            continue;
        };

        if next < today || next > horizon {
            continue;
        }

        if recurring_notification_exists(connection, user_id, recurring.id, next)? {
            continue;
        }

        let amount_text = if recurring.is_income {
            format!("€{}", recurring.amount.abs())
        } else {
            format!("-€{}", recurring.amount.abs())
        };
        let days_until = (next - today).num_days();

        insert_notification(
            connection,
            user_id,
            &NewNotification {
                title: format!("{} due {}", recurring.name, time_text(days_until)),
                body: format!(
                    "{amount_text} • {} • {}",
                    recurring.category, recurring.frequency
                ),
                kind: NotificationKind::Recurring,
                recurring_id: Some(recurring.id),
                notification_date: Some(next),
            },
        )?;
    }

    Ok(())
}

/// A route handler for listing the user's notifications.
///
/// Syncs recurring reminders first. A failed sync is logged and ignored so
/// that existing notifications can still be listed.
pub async fn get_notifications_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Vec<Notification>>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let today = Utc::now().date_naive();
    if let Err(error) = sync_recurring_notifications(&connection, claims.user_id(), today) {
        tracing::warn!("Error syncing recurring notifications: {error:?}");
    }

    list_active_notifications(&connection, claims.user_id()).map(Json)
}

/// The optional body of a test notification request.
#[derive(Debug, Deserialize)]
pub struct TestNotificationForm {
    /// The headline, defaults to "Test Notification".
    pub title: Option<String>,
    /// The message body, defaults to a canned test message.
    pub body: Option<String>,
    /// The notification kind, defaults to info.
    #[serde(rename = "type")]
    pub kind: Option<NotificationKind>,
}

/// A route handler for creating a test notification.
pub async fn create_test_notification_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    form: Option<Json<TestNotificationForm>>,
) -> Result<(StatusCode, Json<Notification>), Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let form = form.map(|Json(form)| form);

    let notification = insert_notification(
        &connection,
        claims.user_id(),
        &NewNotification {
            title: form
                .as_ref()
                .and_then(|form| form.title.clone())
                .unwrap_or_else(|| "Test Notification".to_string()),
            body: form
                .as_ref()
                .and_then(|form| form.body.clone())
                .unwrap_or_else(|| "This is a test notification".to_string()),
            kind: form
                .as_ref()
                .and_then(|form| form.kind)
                .unwrap_or(NotificationKind::Info),
            recurring_id: None,
            notification_date: None,
        },
    )?;

    Ok((StatusCode::CREATED, Json(notification)))
}

/// A route handler for marking a notification as read.
pub async fn mark_notification_read_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(notification_id): Path<DatabaseID>,
) -> Result<Json<Notification>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    mark_notification_read(&connection, claims.user_id(), notification_id).map(Json)
}

/// A route handler for soft deleting a notification.
pub async fn delete_notification_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(notification_id): Path<DatabaseID>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    soft_delete_notification(&connection, claims.user_id(), notification_id)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod notification_record_tests {
    use rusqlite::Connection;

    use crate::{Error, db::initialize, user::UserID};

    use super::{
        NewNotification, NotificationKind, NotificationStatus, insert_notification,
        list_active_notifications, mark_notification_read, soft_delete_notification,
    };

    fn get_test_connection() -> Connection {
        let connection =
            Connection::open_in_memory().expect("Could not open database in memory.");
        initialize(&connection).expect("Could not initialize database.");

        connection
    }

    fn test_notification(title: &str) -> NewNotification {
        NewNotification {
            title: title.to_string(),
            body: "Body".to_string(),
            kind: NotificationKind::Info,
            recurring_id: None,
            notification_date: None,
        }
    }

    #[test]
    fn insert_creates_unread_active_notification() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        let inserted =
            insert_notification(&connection, user_id, &test_notification("Hello")).unwrap();

        assert!(!inserted.is_read);
        assert_eq!(inserted.status, NotificationStatus::Active);
        assert_eq!(
            list_active_notifications(&connection, user_id).unwrap(),
            vec![inserted]
        );
    }

    #[test]
    fn mark_read_sets_flag() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        let inserted =
            insert_notification(&connection, user_id, &test_notification("Hello")).unwrap();

        let updated = mark_notification_read(&connection, user_id, inserted.id).unwrap();

        assert!(updated.is_read);
    }

    #[test]
    fn mark_read_missing_notification_returns_not_found() {
        let connection = get_test_connection();

        assert_eq!(
            mark_notification_read(&connection, UserID::new(1), 999),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn soft_delete_hides_notification_from_listing() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        let inserted =
            insert_notification(&connection, user_id, &test_notification("Hello")).unwrap();

        soft_delete_notification(&connection, user_id, inserted.id).unwrap();

        assert!(list_active_notifications(&connection, user_id).unwrap().is_empty());
    }

    #[test]
    fn soft_delete_missing_notification_returns_not_found() {
        let connection = get_test_connection();

        assert_eq!(
            soft_delete_notification(&connection, UserID::new(1), 999),
            Err(Error::NotFound)
        );
    }
}
