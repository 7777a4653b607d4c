/*! This module defines and implements traits for interacting with the application's database. */

use rusqlite::{Connection, Error, Row};

use crate::{
    category::Category, item::Item, notification::Notification, recurring::RecurringTransaction,
    settings::Settings, transaction::Transaction, user::User,
};

/// A trait for adding an object schema to a database.
pub trait CreateTable {
    /// Create a table for the model.
    ///
    /// # Errors
    /// Returns an error if the table already exists or if there is an SQL error.
    fn create_table(connection: &Connection) -> Result<(), Error>;
}

/// A trait for mapping from a `rusqlite::Row` from a SQLite database to a concrete rust type.
pub trait MapRow {
    /// The type the row is converted into.
    type ReturnType;

    /// Convert a row into a concrete type.
    ///
    /// **Note:** This function expects that the row object contains all the table columns in the order they were defined.
    ///
    /// # Errors
    /// Returns an error if a row item cannot be converted into the corresponding rust type, or if an invalid column index was used.
    fn map_row(row: &Row) -> Result<Self::ReturnType, Error> {
        Self::map_row_with_offset(row, 0)
    }

    /// Convert a row into a concrete type.
    ///
    /// The `offset` indicates which column the row should be read from.
    /// This is useful in cases where tables have been joined and you want to construct two different types from the one query.
    ///
    /// # Errors
    /// Returns an error if a row item cannot be converted into the corresponding rust type, or if an invalid column index was used.
    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self::ReturnType, Error>;
}

/// Create the tables for all of the application's models.
///
/// # Errors
/// Returns an error if a table already exists or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    User::create_table(connection)?;
    Category::create_table(connection)?;
    Transaction::create_table(connection)?;
    RecurringTransaction::create_table(connection)?;
    Notification::create_table(connection)?;
    Item::create_table(connection)?;
    Settings::create_table(connection)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn initialize_creates_all_tables() {
        let connection =
            Connection::open_in_memory().expect("Could not open database in memory.");

        initialize(&connection).expect("Could not initialize database.");

        let table_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                ('user', 'category', 'transaction', 'recurring_transaction', 'notification', 'item', 'settings')",
                (),
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(table_count, 7);
    }
}
