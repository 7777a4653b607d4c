//! Application router configuration.
//!
//! All `/api` routes except registration, sign-in, and coffee require a
//! bearer token, enforced by the [crate::auth::Claims] extractor in each
//! protected handler.

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};

use crate::{
    AppConfig,
    auth::{me_endpoint, sign_in_endpoint},
    category::{
        create_category_endpoint, delete_category_endpoint, get_categories_endpoint,
        update_category_endpoint,
    },
    endpoints,
    item::{get_item_stats_endpoint, get_items_endpoint},
    notification::{
        create_test_notification_endpoint, delete_notification_endpoint,
        get_notifications_endpoint, mark_notification_read_endpoint,
    },
    recurring::{
        create_recurring_endpoint, delete_recurring_endpoint, get_recurring_digest_endpoint,
        get_recurring_endpoint, update_recurring_endpoint,
    },
    settings::{get_settings_endpoint, update_settings_endpoint},
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transaction_endpoint,
        get_transactions_endpoint, update_transaction_endpoint,
    },
    user::register_endpoint,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppConfig) -> Router {
    Router::new()
        .route(endpoints::COFFEE, get(get_coffee))
        .route(endpoints::REGISTER, post(register_endpoint))
        .route(endpoints::LOG_IN, post(sign_in_endpoint))
        .route(endpoints::ME, get(me_endpoint))
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            get(get_transaction_endpoint)
                .put(update_transaction_endpoint)
                .delete(delete_transaction_endpoint),
        )
        .route(
            endpoints::RECURRING,
            get(get_recurring_endpoint).post(create_recurring_endpoint),
        )
        .route(endpoints::RECURRING_DIGEST, get(get_recurring_digest_endpoint))
        .route(
            endpoints::RECURRING_TRANSACTION,
            put(update_recurring_endpoint).delete(delete_recurring_endpoint),
        )
        .route(endpoints::NOTIFICATIONS, get(get_notifications_endpoint))
        .route(
            endpoints::NOTIFICATION_TEST,
            post(create_test_notification_endpoint),
        )
        .route(
            endpoints::NOTIFICATION_READ,
            put(mark_notification_read_endpoint),
        )
        .route(endpoints::NOTIFICATION, delete(delete_notification_endpoint))
        .route(
            endpoints::CATEGORIES,
            get(get_categories_endpoint).post(create_category_endpoint),
        )
        .route(
            endpoints::CATEGORY,
            put(update_category_endpoint).delete(delete_category_endpoint),
        )
        .route(endpoints::ITEMS, get(get_items_endpoint))
        .route(endpoints::ITEM_STATS, get(get_item_stats_endpoint))
        .route(
            endpoints::SETTINGS,
            get(get_settings_endpoint).put(update_settings_endpoint),
        )
        .with_state(state)
}

/// Attempt to get a cup of coffee from the server.
async fn get_coffee() -> Response {
    (StatusCode::IM_A_TEAPOT, "I'm a teapot").into_response()
}

#[cfg(test)]
mod routing_tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use rusqlite::Connection;

    use crate::{AppConfig, build_router, db::initialize, endpoints};

    fn get_test_server() -> TestServer {
        let db_connection =
            Connection::open_in_memory().expect("Could not open database in memory.");
        initialize(&db_connection).expect("Could not initialize database.");

        TestServer::new(build_router(AppConfig::new(db_connection, "42")))
            .expect("Could not create test server.")
    }

    #[tokio::test]
    async fn coffee_returns_teapot() {
        get_test_server()
            .get(endpoints::COFFEE)
            .await
            .assert_status(StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn protected_routes_require_authentication() {
        let server = get_test_server();

        for endpoint in [
            endpoints::TRANSACTIONS,
            endpoints::RECURRING,
            endpoints::RECURRING_DIGEST,
            endpoints::NOTIFICATIONS,
            endpoints::CATEGORIES,
            endpoints::ITEMS,
            endpoints::ITEM_STATS,
            endpoints::SETTINGS,
        ] {
            server
                .get(endpoint)
                .await
                .assert_status(StatusCode::UNAUTHORIZED);
        }
    }
}
