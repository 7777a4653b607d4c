//! This file defines the `Transaction` type, its table and record functions,
//! and the transaction CRUD route handlers.
//!
//! Listing transactions first materializes any recurring transactions that
//! have come due, so clients always see an up to date ledger.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{
    AppConfig, Error,
    auth::Claims,
    category::DatabaseID,
    db::{CreateTable, MapRow},
    item::{ItemForm, delete_items_for_transaction, replace_items_for_transaction},
    schedule,
    user::UserID,
};

/// An expense or income, i.e. an event where money was either spent or earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction's ID in the application database.
    pub id: DatabaseID,
    /// A short label, e.g. the merchant name.
    pub name: String,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// The name of the category the transaction belongs to.
    pub category: String,
    /// Whether the transaction is income (true) or an expense (false).
    pub is_income: bool,
    /// The date the transaction occurred.
    pub date: NaiveDate,
    /// A free-form description.
    pub description: String,
    /// The recurring transaction that generated this transaction, if any.
    pub recurring_id: Option<DatabaseID>,
}

impl CreateTable for Transaction {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE \"transaction\" (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                is_income INTEGER NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                recurring_id INTEGER
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Transaction {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            amount: row.get(offset + 2)?,
            category: row.get(offset + 3)?,
            is_income: row.get(offset + 4)?,
            date: row.get(offset + 5)?,
            description: row.get(offset + 6)?,
            recurring_id: row.get(offset + 7)?,
        })
    }
}

/// The data needed to insert a transaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// A short label, e.g. the merchant name.
    pub name: String,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// The name of the category the transaction belongs to.
    pub category: String,
    /// Whether the transaction is income.
    pub is_income: bool,
    /// The date the transaction occurred.
    pub date: NaiveDate,
    /// A free-form description.
    pub description: String,
    /// The recurring transaction that generated this transaction, if any.
    pub recurring_id: Option<DatabaseID>,
}

/// Create a new transaction record for `user_id`.
pub fn insert_transaction(
    connection: &Connection,
    user_id: UserID,
    new_transaction: &NewTransaction,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\"
                (user_id, name, amount, category, is_income, date, description, recurring_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id, name, amount, category, is_income, date, description, recurring_id",
        )?
        .query_row(
            (
                user_id.as_i64(),
                &new_transaction.name,
                new_transaction.amount,
                &new_transaction.category,
                new_transaction.is_income,
                new_transaction.date,
                &new_transaction.description,
                new_transaction.recurring_id,
            ),
            Transaction::map_row,
        )?;

    Ok(transaction)
}

/// Retrieve one of `user_id`'s transactions by its `id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if `id` does not refer to one of `user_id`'s
/// transactions, including when it refers to another user's transaction.
pub fn get_transaction(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "SELECT id, name, amount, category, is_income, date, description, recurring_id
             FROM \"transaction\" WHERE id = :id AND user_id = :user_id",
        )?
        .query_row(
            &[(":id", &id), (":user_id", &user_id.as_i64())],
            Transaction::map_row,
        )?;

    Ok(transaction)
}

/// Retrieve all of `user_id`'s transactions, newest first.
pub fn list_transactions(
    connection: &Connection,
    user_id: UserID,
) -> Result<Vec<Transaction>, Error> {
    let transactions = connection
        .prepare(
            "SELECT id, name, amount, category, is_income, date, description, recurring_id
             FROM \"transaction\" WHERE user_id = :user_id
             ORDER BY date DESC, id DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], Transaction::map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

/// Replace the transaction `id` with the fields in `new_transaction`.
///
/// # Errors
///
/// Returns [Error::NotFound] if `id` does not refer to one of `user_id`'s
/// transactions.
pub fn update_transaction(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
    new_transaction: &NewTransaction,
) -> Result<Transaction, Error> {
    let rows_changed = connection.execute(
        "UPDATE \"transaction\"
         SET name = ?1, amount = ?2, category = ?3, is_income = ?4, date = ?5,
             description = ?6, recurring_id = ?7
         WHERE id = ?8 AND user_id = ?9",
        (
            &new_transaction.name,
            new_transaction.amount,
            &new_transaction.category,
            new_transaction.is_income,
            new_transaction.date,
            &new_transaction.description,
            new_transaction.recurring_id,
            id,
            user_id.as_i64(),
        ),
    )?;

    if rows_changed == 0 {
        return Err(Error::NotFound);
    }

    Ok(Transaction {
        id,
        name: new_transaction.name.clone(),
        amount: new_transaction.amount,
        category: new_transaction.category.clone(),
        is_income: new_transaction.is_income,
        date: new_transaction.date,
        description: new_transaction.description.clone(),
        recurring_id: new_transaction.recurring_id,
    })
}

/// Delete the transaction `id` and its receipt items.
///
/// Deleting a transaction that does not exist is not an error: the end state
/// is the same.
pub fn delete_transaction(
    connection: &Connection,
    user_id: UserID,
    id: DatabaseID,
) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;
    delete_items_for_transaction(connection, user_id, id)?;

    Ok(())
}

/// The data submitted when creating or replacing a transaction.
#[derive(Debug, Deserialize)]
pub struct TransactionForm {
    /// A short label, e.g. the merchant name.
    pub name: String,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// The name of the category the transaction belongs to.
    #[serde(default)]
    pub category: String,
    /// Whether the transaction is income, defaults to false.
    #[serde(default)]
    pub is_income: bool,
    /// The date the transaction occurred, defaults to today.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// A free-form description.
    #[serde(default)]
    pub description: String,
    /// The recurring transaction that generated this transaction, if any.
    #[serde(default)]
    pub recurring_id: Option<DatabaseID>,
    /// Receipt line items. When present, the transaction's stored items are
    /// replaced wholesale.
    #[serde(default)]
    pub items: Option<Vec<ItemForm>>,
}

impl TransactionForm {
    fn into_new_transaction(self, today: NaiveDate) -> (NewTransaction, Option<Vec<ItemForm>>) {
        let TransactionForm {
            name,
            amount,
            category,
            is_income,
            date,
            description,
            recurring_id,
            items,
        } = self;

        (
            NewTransaction {
                name,
                amount,
                category,
                is_income,
                date: date.unwrap_or(today),
                description,
                recurring_id,
            },
            items,
        )
    }
}

/// A route handler for listing the user's transactions.
///
/// Materializes due recurring transactions before reading, so the listing
/// always includes occurrences up to today.
pub async fn get_transactions_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Vec<Transaction>>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let today = Utc::now().date_naive();
    schedule::materialize_due(&connection, claims.user_id(), today)?;

    list_transactions(&connection, claims.user_id()).map(Json)
}

/// A route handler for creating a new transaction.
pub async fn create_transaction_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Json(form): Json<TransactionForm>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let today = Utc::now().date_naive();
    let (new_transaction, items) = form.into_new_transaction(today);

    let transaction = insert_transaction(&connection, claims.user_id(), &new_transaction)?;

    if let Some(items) = items {
        replace_items_for_transaction(&connection, claims.user_id(), &transaction, &items)?;
    }

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for getting a transaction by its database ID.
pub async fn get_transaction_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(transaction_id): Path<DatabaseID>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    get_transaction(&connection, claims.user_id(), transaction_id).map(Json)
}

/// A route handler for replacing an existing transaction.
pub async fn update_transaction_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(transaction_id): Path<DatabaseID>,
    Json(form): Json<TransactionForm>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let today = Utc::now().date_naive();
    let (new_transaction, items) = form.into_new_transaction(today);

    let transaction =
        update_transaction(&connection, claims.user_id(), transaction_id, &new_transaction)?;

    if let Some(items) = items {
        replace_items_for_transaction(&connection, claims.user_id(), &transaction, &items)?;
    }

    Ok(Json(transaction))
}

/// A route handler for deleting a transaction and its receipt items.
pub async fn delete_transaction_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
    Path(transaction_id): Path<DatabaseID>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    delete_transaction(&connection, claims.user_id(), transaction_id)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod transaction_record_tests {
    use chrono::NaiveDate;
    use rusqlite::Connection;

    use crate::{Error, db::initialize, user::UserID};

    use super::{
        NewTransaction, delete_transaction, get_transaction, insert_transaction,
        list_transactions, update_transaction,
    };

    fn get_test_connection() -> Connection {
        let connection =
            Connection::open_in_memory().expect("Could not open database in memory.");
        initialize(&connection).expect("Could not initialize database.");

        connection
    }

    fn new_transaction(name: &str, date: NaiveDate) -> NewTransaction {
        NewTransaction {
            name: name.to_string(),
            amount: 12.5,
            category: "Food & Dining".to_string(),
            is_income: false,
            date,
            description: String::new(),
            recurring_id: None,
        }
    }

    #[test]
    fn insert_and_get_transaction() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);
        let date = NaiveDate::from_ymd_opt(2024, 8, 7).unwrap();

        let inserted =
            insert_transaction(&connection, user_id, &new_transaction("Lunch", date)).unwrap();

        assert_eq!(
            get_transaction(&connection, user_id, inserted.id).unwrap(),
            inserted
        );
    }

    #[test]
    fn get_transaction_fails_for_other_user() {
        let connection = get_test_connection();
        let date = NaiveDate::from_ymd_opt(2024, 8, 7).unwrap();

        let inserted =
            insert_transaction(&connection, UserID::new(1), &new_transaction("Lunch", date))
                .unwrap();

        assert_eq!(
            get_transaction(&connection, UserID::new(2), inserted.id),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn list_transactions_returns_newest_first() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        let older = insert_transaction(
            &connection,
            user_id,
            &new_transaction("Older", NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()),
        )
        .unwrap();
        let newer = insert_transaction(
            &connection,
            user_id,
            &new_transaction("Newer", NaiveDate::from_ymd_opt(2024, 8, 7).unwrap()),
        )
        .unwrap();

        assert_eq!(
            list_transactions(&connection, user_id).unwrap(),
            vec![newer, older]
        );
    }

    #[test]
    fn update_missing_transaction_returns_not_found() {
        let connection = get_test_connection();
        let date = NaiveDate::from_ymd_opt(2024, 8, 7).unwrap();

        let result = update_transaction(
            &connection,
            UserID::new(1),
            999,
            &new_transaction("Lunch", date),
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_transaction_removes_record() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);
        let date = NaiveDate::from_ymd_opt(2024, 8, 7).unwrap();

        let inserted =
            insert_transaction(&connection, user_id, &new_transaction("Lunch", date)).unwrap();

        delete_transaction(&connection, user_id, inserted.id).unwrap();

        assert_eq!(
            get_transaction(&connection, user_id, inserted.id),
            Err(Error::NotFound)
        );
    }
}

#[cfg(test)]
mod transaction_route_tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::Utc;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{
        AppConfig, auth::SignInResponse, build_router, db::initialize, endpoints,
    };

    use super::Transaction;

    fn get_test_app_config() -> AppConfig {
        let db_connection =
            Connection::open_in_memory().expect("Could not open database in memory.");
        initialize(&db_connection).expect("Could not initialize database.");

        AppConfig::new(db_connection, "42")
    }

    async fn create_server_with_user() -> (TestServer, String) {
        let server =
            TestServer::new(build_router(get_test_app_config())).expect("Could not create test server.");

        let credentials = json!({
            "email": "test@test.com",
            "password": "averysafeandsecurepassword",
        });

        server
            .post(endpoints::REGISTER)
            .content_type("application/json")
            .json(&credentials)
            .await
            .assert_status(StatusCode::CREATED);

        let token = server
            .post(endpoints::LOG_IN)
            .content_type("application/json")
            .json(&credentials)
            .await
            .json::<SignInResponse>()
            .token;

        (server, token)
    }

    #[tokio::test]
    async fn create_and_get_transaction() {
        let (server, token) = create_server_with_user().await;

        let date = Utc::now().date_naive();

        let response = server
            .post(endpoints::TRANSACTIONS)
            .authorization_bearer(&token)
            .content_type("application/json")
            .json(&json!({
                "name": "A thingymajig",
                "amount": -10.0,
                "category": "Shopping",
                "date": date,
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let created = response.json::<Transaction>();

        assert_eq!(created.name, "A thingymajig");
        assert_eq!(created.amount, -10.0);
        assert_eq!(created.date, date);

        let fetched = server
            .get(&format!("/api/transactions/{}", created.id))
            .authorization_bearer(&token)
            .await
            .json::<Transaction>();

        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn get_transaction_fails_on_wrong_user() {
        let (server, token) = create_server_with_user().await;

        let created = server
            .post(endpoints::TRANSACTIONS)
            .authorization_bearer(&token)
            .content_type("application/json")
            .json(&json!({
                "name": "A thingymajig",
                "amount": -10.0,
            }))
            .await
            .json::<Transaction>();

        let other_credentials = json!({
            "email": "test2@test.com",
            "password": "anothersafeandsecurepassword",
        });

        server
            .post(endpoints::REGISTER)
            .content_type("application/json")
            .json(&other_credentials)
            .await
            .assert_status(StatusCode::CREATED);

        let other_token = server
            .post(endpoints::LOG_IN)
            .content_type("application/json")
            .json(&other_credentials)
            .await
            .json::<SignInResponse>()
            .token;

        server
            .get(&format!("/api/transactions/{}", created.id))
            .authorization_bearer(other_token)
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn delete_transaction_returns_no_content() {
        let (server, token) = create_server_with_user().await;

        let created = server
            .post(endpoints::TRANSACTIONS)
            .authorization_bearer(&token)
            .content_type("application/json")
            .json(&json!({
                "name": "A thingymajig",
                "amount": -10.0,
            }))
            .await
            .json::<Transaction>();

        server
            .delete(&format!("/api/transactions/{}", created.id))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get(&format!("/api/transactions/{}", created.id))
            .authorization_bearer(&token)
            .await
            .assert_status_not_found();
    }
}
