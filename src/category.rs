//! This file defines the `Category` type, the default categories new users
//! are seeded with, and the category CRUD route handlers.

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{
    AppConfig, Error,
    auth::Claims,
    db::{CreateTable, MapRow},
    user::UserID,
};

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseID = i64;

/// Whether a category applies to expenses, income, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    /// The category only applies to expenses.
    Expense,
    /// The category only applies to income.
    Income,
    /// The category applies to both expenses and income.
    Both,
}

impl Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CategoryKind::Expense => "expense",
            CategoryKind::Income => "income",
            CategoryKind::Both => "both",
        };

        write!(f, "{text}")
    }
}

/// The error returned when a string could not be parsed as a [CategoryKind].
#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid category kind")]
pub struct ParseCategoryKindError(String);

impl FromStr for CategoryKind {
    type Err = ParseCategoryKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(CategoryKind::Expense),
            "income" => Ok(CategoryKind::Income),
            "both" => Ok(CategoryKind::Both),
            other => Err(ParseCategoryKindError(other.to_string())),
        }
    }
}

/// A category for expenses and income, e.g., 'Groceries', 'Salary'.
///
/// Transactions refer to categories by name rather than by ID, so deleting a
/// category does not affect existing transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The category's ID in the application database.
    pub id: DatabaseID,
    /// The category's display name.
    pub name: String,
    /// The name of the icon the client should display for the category.
    pub icon: String,
    /// Whether the category applies to expenses, income, or both.
    pub kind: CategoryKind,
}

impl CreateTable for Category {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE category (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                icon TEXT NOT NULL,
                kind TEXT NOT NULL
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Category {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, rusqlite::Error> {
        let raw_kind: String = row.get(offset + 3)?;
        let kind = CategoryKind::from_str(&raw_kind).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                offset + 3,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;

        Ok(Self {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            icon: row.get(offset + 2)?,
            kind,
        })
    }
}

/// The data needed to create or replace a category.
#[derive(Debug, Deserialize)]
pub struct CategoryForm {
    /// The category's display name.
    pub name: String,
    /// The icon name, defaults to "other".
    #[serde(default = "default_icon")]
    pub icon: String,
    /// Whether the category applies to expenses, income, or both.
    /// Defaults to both.
    #[serde(default = "default_kind")]
    pub kind: CategoryKind,
}

fn default_icon() -> String {
    "other".to_string()
}

fn default_kind() -> CategoryKind {
    CategoryKind::Both
}

/// The categories every new user starts with.
const DEFAULT_CATEGORIES: [(&str, &str, CategoryKind); 18] = [
    ("Food & Dining", "food", CategoryKind::Expense),
    ("Transportation", "transport", CategoryKind::Expense),
    ("Shopping", "shopping", CategoryKind::Expense),
    ("Bills & Utilities", "utilities", CategoryKind::Expense),
    ("Entertainment", "entertainment", CategoryKind::Expense),
    ("Health", "health", CategoryKind::Expense),
    ("Education", "education", CategoryKind::Expense),
    ("Travel", "travel", CategoryKind::Expense),
    ("Rent", "rent", CategoryKind::Expense),
    ("Insurance", "insurance", CategoryKind::Expense),
    ("Subscriptions", "subscriptions", CategoryKind::Expense),
    ("Clothing", "clothing", CategoryKind::Expense),
    ("Salary", "salary", CategoryKind::Income),
    ("Freelance", "freelance", CategoryKind::Income),
    ("Investment", "investment", CategoryKind::Income),
    ("Gift", "gift", CategoryKind::Income),
    ("Savings", "savings", CategoryKind::Income),
    ("Other", "other", CategoryKind::Both),
];

/// Insert the default categories for a newly registered user.
pub fn insert_default_categories(connection: &Connection, user_id: UserID) -> Result<(), Error> {
    let mut statement = connection
        .prepare("INSERT INTO category (user_id, name, icon, kind) VALUES (?1, ?2, ?3, ?4)")?;

    for (name, icon, kind) in DEFAULT_CATEGORIES {
        statement.execute((user_id.as_i64(), name, icon, kind.to_string()))?;
    }

    Ok(())
}

/// Create a new category for `user_id`.
///
/// # Errors
///
/// Returns [Error::EmptyCategoryName] if the name is an empty string.
pub fn insert_category(
    connection: &Connection,
    user_id: UserID,
    form: &CategoryForm,
) -> Result<Category, Error> {
    if form.name.is_empty() {
        return Err(Error::EmptyCategoryName);
    }

    let category = connection
        .prepare(
            "INSERT INTO category (user_id, name, icon, kind) VALUES (?1, ?2, ?3, ?4)
             RETURNING id, name, icon, kind",
        )?
        .query_row(
            (
                user_id.as_i64(),
                &form.name,
                &form.icon,
                form.kind.to_string(),
            ),
            Category::map_row,
        )?;

    Ok(category)
}

/// Retrieve all of `user_id`'s categories.
pub fn list_categories(connection: &Connection, user_id: UserID) -> Result<Vec<Category>, Error> {
    let categories = connection
        .prepare("SELECT id, name, icon, kind FROM category WHERE user_id = :user_id ORDER BY id")?
        .query_map(&[(":user_id", &user_id.as_i64())], Category::map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

/// Replace the category `id` with the fields in `form`.
///
/// # Errors
///
/// Returns [Error::NotFound] if `id` does not refer to one of `user_id`'s
/// categories.
pub fn update_category(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
    form: &CategoryForm,
) -> Result<Category, Error> {
    if form.name.is_empty() {
        return Err(Error::EmptyCategoryName);
    }

    let rows_changed = connection.execute(
        "UPDATE category SET name = ?1, icon = ?2, kind = ?3 WHERE id = ?4 AND user_id = ?5",
        (
            &form.name,
            &form.icon,
            form.kind.to_string(),
            id,
            user_id.as_i64(),
        ),
    )?;

    if rows_changed == 0 {
        return Err(Error::NotFound);
    }

    Ok(Category {
        id,
        name: form.name.clone(),
        icon: form.icon.clone(),
        kind: form.kind,
    })
}

/// Delete the category `id` if it belongs to `user_id`.
///
/// Deleting a category that does not exist is not an error: the end state is
/// the same.
pub fn delete_category(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM category WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    Ok(())
}

/// A route handler for listing the user's categories.
pub async fn get_categories_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Vec<Category>>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    list_categories(&connection, claims.user_id()).map(Json)
}

/// A route handler for creating a new category.
pub async fn create_category_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Json(form): Json<CategoryForm>,
) -> Result<(StatusCode, Json<Category>), Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let category = insert_category(&connection, claims.user_id(), &form)?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// A route handler for replacing an existing category.
pub async fn update_category_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(category_id): Path<DatabaseID>,
    Json(form): Json<CategoryForm>,
) -> Result<Json<Category>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    update_category(&connection, claims.user_id(), category_id, &form).map(Json)
}

/// A route handler for deleting a category.
pub async fn delete_category_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(category_id): Path<DatabaseID>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    delete_category(&connection, claims.user_id(), category_id)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod category_tests {
    use rusqlite::Connection;

    use crate::{
        Error,
        db::initialize,
        user::UserID,
    };

    use super::{
        CategoryForm, CategoryKind, delete_category, insert_category, insert_default_categories,
        list_categories, update_category,
    };

    fn get_test_connection() -> Connection {
        let connection =
            Connection::open_in_memory().expect("Could not open database in memory.");
        initialize(&connection).expect("Could not initialize database.");

        connection
    }

    #[test]
    fn default_categories_are_seeded_per_user() {
        let connection = get_test_connection();

        insert_default_categories(&connection, UserID::new(1)).unwrap();
        insert_default_categories(&connection, UserID::new(2)).unwrap();

        assert_eq!(list_categories(&connection, UserID::new(1)).unwrap().len(), 18);
        assert_eq!(list_categories(&connection, UserID::new(2)).unwrap().len(), 18);
    }

    #[test]
    fn insert_category_fails_on_empty_name() {
        let connection = get_test_connection();

        let result = insert_category(
            &connection,
            UserID::new(1),
            &CategoryForm {
                name: String::new(),
                icon: "other".to_string(),
                kind: CategoryKind::Both,
            },
        );

        assert_eq!(result, Err(Error::EmptyCategoryName));
    }

    #[test]
    fn update_category_replaces_fields() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        let category = insert_category(
            &connection,
            user_id,
            &CategoryForm {
                name: "Groceries".to_string(),
                icon: "food".to_string(),
                kind: CategoryKind::Expense,
            },
        )
        .unwrap();

        let updated = update_category(
            &connection,
            user_id,
            category.id,
            &CategoryForm {
                name: "Supermarket".to_string(),
                icon: "shopping".to_string(),
                kind: CategoryKind::Expense,
            },
        )
        .unwrap();

        assert_eq!(updated.name, "Supermarket");
        assert_eq!(list_categories(&connection, user_id).unwrap(), vec![updated]);
    }

    #[test]
    fn update_category_fails_for_other_user() {
        let connection = get_test_connection();

        let category = insert_category(
            &connection,
            UserID::new(1),
            &CategoryForm {
                name: "Groceries".to_string(),
                icon: "food".to_string(),
                kind: CategoryKind::Expense,
            },
        )
        .unwrap();

        let result = update_category(
            &connection,
            UserID::new(2),
            category.id,
            &CategoryForm {
                name: "Sneaky".to_string(),
                icon: "other".to_string(),
                kind: CategoryKind::Both,
            },
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_category_leaves_other_users_categories() {
        let connection = get_test_connection();

        let category = insert_category(
            &connection,
            UserID::new(1),
            &CategoryForm {
                name: "Groceries".to_string(),
                icon: "food".to_string(),
                kind: CategoryKind::Expense,
            },
        )
        .unwrap();

        delete_category(&connection, UserID::new(2), category.id).unwrap();
        assert_eq!(list_categories(&connection, UserID::new(1)).unwrap().len(), 1);

        delete_category(&connection, UserID::new(1), category.id).unwrap();
        assert!(list_categories(&connection, UserID::new(1)).unwrap().is_empty());
    }
}
