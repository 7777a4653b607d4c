//! Centsible is a personal finance tracker for expenses, income, and
//! recurring transactions.
//!
//! This library provides the JSON REST API behind the app: bearer token
//! authentication, transaction and category CRUD, a recurring transaction
//! schedule that materializes due occurrences as real transactions, in-app
//! notifications for upcoming occurrences, and purchase statistics over
//! receipt line items.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

mod auth;
mod category;
mod config;
mod db;
mod endpoints;
mod error;
mod item;
mod notification;
mod password;
mod recurring;
mod routing;
mod schedule;
mod settings;
mod transaction;
mod user;

pub use auth::SignInResponse;
pub use category::insert_default_categories;
pub use config::AppConfig;
pub use db::initialize as initialize_db;
pub use error::Error;
pub use password::{PasswordHash, ValidatedPassword};
pub use routing::build_router;
pub use settings::ensure_default_settings;
pub use user::{User, UserID, get_user_by_id};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
