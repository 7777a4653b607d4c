//! The API endpoint URIs.

/// The route to request a cup of coffee (experimental).
pub const COFFEE: &str = "/api/coffee";
/// The route for registering a new user.
pub const REGISTER: &str = "/api/auth/register";
/// The route for signing in and receiving a bearer token.
pub const LOG_IN: &str = "/api/auth/login";
/// The route for fetching the signed-in user's profile.
pub const ME: &str = "/api/auth/me";
/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to get, replace, or delete a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The route to list and create recurring transactions.
pub const RECURRING: &str = "/api/recurring";
/// The route for the due/upcoming digest of recurring transactions.
pub const RECURRING_DIGEST: &str = "/api/recurring/notifications";
/// The route to replace or delete a single recurring transaction.
pub const RECURRING_TRANSACTION: &str = "/api/recurring/{recurring_id}";
/// The route to list notifications.
pub const NOTIFICATIONS: &str = "/api/notifications";
/// The route to create a test notification.
pub const NOTIFICATION_TEST: &str = "/api/notifications/test";
/// The route to mark a notification as read.
pub const NOTIFICATION_READ: &str = "/api/notifications/{notification_id}/read";
/// The route to soft delete a notification.
pub const NOTIFICATION: &str = "/api/notifications/{notification_id}";
/// The route to list and create categories.
pub const CATEGORIES: &str = "/api/categories";
/// The route to update or delete a single category.
pub const CATEGORY: &str = "/api/categories/{category_id}";
/// The route to list receipt line items.
pub const ITEMS: &str = "/api/items";
/// The route for purchase statistics.
pub const ITEM_STATS: &str = "/api/items/stats";
/// The route to get and update the user's settings.
pub const SETTINGS: &str = "/api/settings";
