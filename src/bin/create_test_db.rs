use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;

use centsible::{
    PasswordHash, UserID, ValidatedPassword, ensure_default_settings, initialize_db,
    insert_default_categories,
};

/// A utility for creating a test database for the REST API server of centsible.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test user...");

    let password_hash = PasswordHash::new(
        ValidatedPassword::new_unchecked("test"),
        PasswordHash::DEFAULT_COST,
    )?;

    conn.execute(
        "INSERT INTO user (email, password) VALUES (?1, ?2)",
        ("test@test.com", password_hash.to_string()),
    )?;
    let user_id = UserID::new(conn.last_insert_rowid());

    insert_default_categories(&conn, user_id)?;
    ensure_default_settings(&conn, user_id)?;

    println!("Creating sample recurring transaction...");

    conn.execute(
        "INSERT INTO recurring_transaction
            (user_id, name, amount, category, is_income, frequency, start_date, end_date,
             is_active, last_processed, description)
         VALUES (?1, 'Rent', -1200.0, 'Housing', 0, 'monthly', date('now', 'start of month'),
                 NULL, 1, NULL, 'Monthly rent')",
        (user_id.as_i64(),),
    )?;

    println!("Success!");

    Ok(())
}
