//! Receipt line items: the item table, record functions, and the item listing
//! and purchase statistics route handlers.
//!
//! Items always belong to a transaction. They are replaced wholesale whenever
//! a transaction is created or updated with an `items` array, and removed when
//! their transaction is deleted.

use std::collections::HashMap;

use axum::{Json, extract::State};
use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{
    AppConfig, Error,
    auth::Claims,
    category::DatabaseID,
    db::{CreateTable, MapRow},
    transaction::Transaction,
    user::UserID,
};

/// A single line item from a receipt, e.g. "Milk x2 @ 3.50".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// The item's ID in the application database.
    pub id: DatabaseID,
    /// The transaction the item was purchased in.
    pub transaction_id: DatabaseID,
    /// The item's name, normalized to title case.
    pub name: String,
    /// How many units were purchased.
    pub quantity: f64,
    /// The unit price.
    pub price: f64,
    /// The store the item was purchased from, copied from the transaction name.
    pub store: String,
    /// The category of the owning transaction.
    pub category: String,
    /// The date of the owning transaction.
    pub date: NaiveDate,
}

impl CreateTable for Item {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE item (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                transaction_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                quantity REAL NOT NULL,
                price REAL NOT NULL,
                store TEXT NOT NULL,
                category TEXT NOT NULL,
                date TEXT NOT NULL
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for Item {
    type ReturnType = Self;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(offset)?,
            transaction_id: row.get(offset + 1)?,
            name: row.get(offset + 2)?,
            quantity: row.get(offset + 3)?,
            price: row.get(offset + 4)?,
            store: row.get(offset + 5)?,
            category: row.get(offset + 6)?,
            date: row.get(offset + 7)?,
        })
    }
}

/// A line item as submitted inside a transaction form.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemForm {
    /// The item's name, normalized to title case on insert.
    pub name: String,
    /// How many units were purchased, defaults to one.
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    /// The unit price, defaults to zero.
    #[serde(default)]
    pub price: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// Normalize an item name to title case so "milk", "Milk" and "MILK" are
/// stored and counted as the same item.
pub fn normalize_item_name(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace `transaction`'s stored line items with `items`.
///
/// Store, category and date are copied from the owning transaction.
pub fn replace_items_for_transaction(
    connection: &Connection,
    user_id: UserID,
    transaction: &Transaction,
    items: &[ItemForm],
) -> Result<(), Error> {
    delete_items_for_transaction(connection, user_id, transaction.id)?;

    let mut statement = connection.prepare(
        "INSERT INTO item (user_id, transaction_id, name, quantity, price, store, category, date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    for item in items {
        statement.execute((
            user_id.as_i64(),
            transaction.id,
            normalize_item_name(&item.name),
            item.quantity,
            item.price,
            &transaction.name,
            &transaction.category,
            transaction.date,
        ))?;
    }

    Ok(())
}

/// Delete all line items belonging to the transaction `transaction_id`.
pub fn delete_items_for_transaction(
    connection: &Connection,
    user_id: UserID,
    transaction_id: DatabaseID,
) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM item WHERE transaction_id = ?1 AND user_id = ?2",
        (transaction_id, user_id.as_i64()),
    )?;

    Ok(())
}

/// Retrieve all of `user_id`'s line items, newest first.
pub fn list_items(connection: &Connection, user_id: UserID) -> Result<Vec<Item>, Error> {
    let items = connection
        .prepare(
            "SELECT id, transaction_id, name, quantity, price, store, category, date
             FROM item WHERE user_id = :user_id
             ORDER BY date DESC, id DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], Item::map_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Aggregate purchase counts for a single item name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCount {
    /// The item's display name.
    pub name: String,
    /// How many line items mentioned this item.
    pub count: i64,
    /// The total quantity purchased across all line items.
    pub total_qty: f64,
    /// The total amount spent, i.e. the sum of price times quantity.
    pub total_spent: f64,
}

/// Aggregate purchase counts for a single store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreCount {
    /// The store's name.
    pub name: String,
    /// How many line items were purchased at this store.
    pub count: i64,
}

/// Purchase statistics across all of a user's line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    /// The total number of line items.
    pub total_items: i64,
    /// The number of distinct item names, case-insensitive.
    pub unique_items: i64,
    /// The 20 most purchased items by total quantity.
    pub top_items: Vec<ItemCount>,
    /// The 10 stores with the most line items.
    pub top_stores: Vec<StoreCount>,
}

/// Compute purchase statistics over `user_id`'s line items.
///
/// Item names are grouped case-insensitively so that historical records that
/// predate name normalization still count towards the same item.
pub fn compute_item_stats(connection: &Connection, user_id: UserID) -> Result<ItemStats, Error> {
    let items = list_items(connection, user_id)?;

    let mut item_counts: HashMap<String, ItemCount> = HashMap::new();
    let mut store_counts: HashMap<String, i64> = HashMap::new();

    for item in &items {
        let display_name = match normalize_item_name(&item.name) {
            name if name.is_empty() => "Unknown".to_string(),
            name => name,
        };
        let name_key = display_name.to_lowercase();

        let entry = item_counts.entry(name_key).or_insert_with(|| ItemCount {
            name: display_name,
            count: 0,
            total_qty: 0.0,
            total_spent: 0.0,
        });
        entry.count += 1;
        entry.total_qty += item.quantity;
        entry.total_spent += item.price * item.quantity;

        *store_counts.entry(item.store.clone()).or_insert(0) += 1;
    }

    let unique_items = item_counts.len() as i64;

    let mut top_items: Vec<ItemCount> = item_counts.into_values().collect();
    top_items.sort_by(|a, b| b.total_qty.total_cmp(&a.total_qty));
    top_items.truncate(20);

    let mut top_stores: Vec<StoreCount> = store_counts
        .into_iter()
        .map(|(name, count)| StoreCount { name, count })
        .collect();
    top_stores.sort_by(|a, b| b.count.cmp(&a.count));
    top_stores.truncate(10);

    Ok(ItemStats {
        total_items: items.len() as i64,
        unique_items,
        top_items,
        top_stores,
    })
}

/// A route handler for listing all of the user's receipt line items.
pub async fn get_items_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<Vec<Item>>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    list_items(&connection, claims.user_id()).map(Json)
}

/// A route handler for the purchase statistics summary.
pub async fn get_item_stats_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<ItemStats>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    compute_item_stats(&connection, claims.user_id()).map(Json)
}

#[cfg(test)]
mod item_tests {
    use chrono::NaiveDate;
    use rusqlite::Connection;

    use crate::{
        db::initialize,
        transaction::{NewTransaction, insert_transaction},
        user::UserID,
    };

    use super::{
        ItemForm, compute_item_stats, delete_items_for_transaction, list_items,
        normalize_item_name, replace_items_for_transaction,
    };

    fn get_test_connection() -> Connection {
        let connection =
            Connection::open_in_memory().expect("Could not open database in memory.");
        initialize(&connection).expect("Could not initialize database.");

        connection
    }

    fn insert_groceries(connection: &Connection, user_id: UserID, items: &[ItemForm]) {
        let transaction = insert_transaction(
            connection,
            user_id,
            &NewTransaction {
                name: "SuperMart".to_string(),
                amount: -42.0,
                category: "Groceries".to_string(),
                is_income: false,
                date: NaiveDate::from_ymd_opt(2024, 8, 7).unwrap(),
                description: String::new(),
                recurring_id: None,
            },
        )
        .unwrap();

        replace_items_for_transaction(connection, user_id, &transaction, items).unwrap();
    }

    fn item_form(name: &str, quantity: f64, price: f64) -> ItemForm {
        ItemForm {
            name: name.to_string(),
            quantity,
            price,
        }
    }

    #[test]
    fn normalize_item_name_title_cases() {
        assert_eq!(normalize_item_name("  milk  "), "Milk");
        assert_eq!(normalize_item_name("WHOLE GRAIN bread"), "Whole Grain Bread");
        assert_eq!(normalize_item_name(""), "");
    }

    #[test]
    fn replace_items_copies_transaction_fields() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        insert_groceries(&connection, user_id, &[item_form("milk", 2.0, 3.5)]);

        let items = list_items(&connection, user_id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Milk");
        assert_eq!(items[0].store, "SuperMart");
        assert_eq!(items[0].category, "Groceries");
    }

    #[test]
    fn delete_items_removes_all_for_transaction() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        insert_groceries(
            &connection,
            user_id,
            &[item_form("milk", 2.0, 3.5), item_form("bread", 1.0, 2.0)],
        );

        let transaction_id = list_items(&connection, user_id).unwrap()[0].transaction_id;
        delete_items_for_transaction(&connection, user_id, transaction_id).unwrap();

        assert!(list_items(&connection, user_id).unwrap().is_empty());
    }

    #[test]
    fn stats_group_items_case_insensitively() {
        let connection = get_test_connection();
        let user_id = UserID::new(1);

        insert_groceries(
            &connection,
            user_id,
            &[
                item_form("milk", 2.0, 3.5),
                item_form("MILK", 1.0, 3.5),
                item_form("bread", 1.0, 2.0),
            ],
        );

        let stats = compute_item_stats(&connection, user_id).unwrap();

        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.unique_items, 2);
        assert_eq!(stats.top_items[0].name, "Milk");
        assert_eq!(stats.top_items[0].total_qty, 3.0);
        assert_eq!(stats.top_items[0].total_spent, 10.5);
        assert_eq!(stats.top_stores[0].name, "SuperMart");
        assert_eq!(stats.top_stores[0].count, 3);
    }
}
