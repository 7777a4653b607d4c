//! Bearer token authentication: signing in, token encoding/decoding, and the
//! [Claims] extractor used by protected route handlers.

use axum::{
    Json, RequestPartsExt,
    body::Body,
    extract::{FromRef, FromRequestParts, State},
    http::{Response, StatusCode, request::Parts},
    response::IntoResponse,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{Duration, Utc};
use email_address::EmailAddress;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppConfig, Error,
    user::{UserID, UserProfile, get_user_by_email, get_user_by_id},
};

/// How long a bearer token stays valid after being issued.
const TOKEN_DURATION_DAYS: i64 = 30;

/// The contents of a JSON Web Token.
#[derive(Serialize, Deserialize)]
pub struct Claims {
    /// The expiry time of the token.
    pub exp: usize,
    /// The time the token was issued.
    pub iat: usize,
    /// The ID of the user the token was issued to.
    pub user_id: UserID,
}

impl Claims {
    /// The ID of the user the token was issued to.
    pub fn user_id(&self) -> UserID {
        self.user_id
    }
}

impl<S> FromRequestParts<S> for Claims
where
    AppConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let app_config = parts
            .extract_with_state::<AppConfig, _>(state)
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let token_data = decode_jwt(bearer.token(), app_config.decoding_key())?;

        Ok(token_data.claims)
    }
}

/// The credentials submitted when signing in.
#[derive(Deserialize)]
pub struct Credentials {
    /// Email entered during sign-in.
    pub email: EmailAddress,
    /// Password entered during sign-in.
    pub password: String,
}

/// The errors that can occur while authenticating a request.
#[derive(Debug)]
pub enum AuthError {
    /// The email or password did not match a registered user.
    WrongCredentials,
    /// The token could not be created.
    TokenCreation,
    /// The bearer token was missing, malformed, or expired.
    InvalidToken,
    /// An unexpected error occurred in a third-party library.
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response<Body> {
        let (status, error_message) = match self {
            AuthError::WrongCredentials => (StatusCode::UNAUTHORIZED, "Wrong credentials"),
            AuthError::TokenCreation => (StatusCode::INTERNAL_SERVER_ERROR, "Token creation error"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// The response body for a successful sign-in.
#[derive(Serialize, Deserialize)]
pub struct SignInResponse {
    /// The bearer token to use in the `Authorization` header.
    pub token: String,
    /// The profile of the signed-in user.
    pub user: UserProfile,
}

/// Handler for sign-in requests.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - The email does not belong to a registered user.
/// - The password is not correct.
/// - An internal error occurred when verifying the password.
pub async fn sign_in_endpoint(
    State(state): State<AppConfig>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SignInResponse>, AuthError> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| AuthError::InternalError)?;

    let user = get_user_by_email(&connection, &credentials.email).map_err(|e| match e {
        Error::NotFound => AuthError::WrongCredentials,
        _ => {
            tracing::error!("Error matching user: {e:?}");
            AuthError::InternalError
        }
    })?;

    let password_is_correct = user
        .password_hash
        .verify(&credentials.password)
        .map_err(|e| {
            tracing::error!("Error verifying password: {}", e);
            AuthError::InternalError
        })?;

    if !password_is_correct {
        return Err(AuthError::WrongCredentials);
    }

    let token = encode_jwt(user.id, state.encoding_key())?;

    Ok(Json(SignInResponse {
        token,
        user: UserProfile::from(&user),
    }))
}

/// A route handler for fetching the profile of the signed-in user.
pub async fn me_endpoint(
    State(state): State<AppConfig>,
    claims: Claims,
) -> Result<Json<UserProfile>, Error> {
    let connection = state
        .db_connection()
        .lock()
        .map_err(|_| Error::DatabaseLock)?;

    let user = get_user_by_id(&connection, claims.user_id())?;

    Ok(Json(UserProfile::from(&user)))
}

fn encode_jwt(user_id: UserID, encoding_key: &EncodingKey) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = (now + Duration::days(TOKEN_DURATION_DAYS)).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims { exp, iat, user_id };

    encode(&Header::default(), &claims, encoding_key).map_err(|e| {
        tracing::error!("Error encoding JWT: {}", e);
        AuthError::TokenCreation
    })
}

fn decode_jwt(jwt_token: &str, decoding_key: &DecodingKey) -> Result<TokenData<Claims>, AuthError> {
    decode(jwt_token, decoding_key, &Validation::default()).map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use email_address::EmailAddress;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{
        AppConfig, auth, build_router, db::initialize, endpoints, password::PasswordHash,
        user::{UserID, insert_user},
    };

    use super::SignInResponse;

    fn get_test_app_config() -> AppConfig {
        let db_connection =
            Connection::open_in_memory().expect("Could not open database in memory.");
        initialize(&db_connection).expect("Could not initialize database.");

        AppConfig::new(db_connection, "foobar")
    }

    fn insert_test_user(app_config: &AppConfig, email: &str, password: &str) {
        let password_hash = PasswordHash::from_raw_password(password, 4).unwrap();
        insert_user(
            &app_config.db_connection().lock().unwrap(),
            &EmailAddress::new_unchecked(email),
            password_hash,
        )
        .unwrap();
    }

    #[test]
    fn decode_jwt_gives_correct_user_id() {
        let config = get_test_app_config();
        let user_id = UserID::new(37);

        let jwt = auth::encode_jwt(user_id, config.encoding_key()).unwrap();
        let claims = auth::decode_jwt(&jwt, config.decoding_key()).unwrap().claims;

        assert_eq!(claims.user_id, user_id);
    }

    #[tokio::test]
    async fn sign_in_succeeds_with_valid_credentials() {
        let app_config = get_test_app_config();
        insert_test_user(&app_config, "foo@bar.baz", "averysafeandsecurepassword");

        let server = TestServer::new(build_router(app_config)).unwrap();

        let response = server
            .post(endpoints::LOG_IN)
            .content_type("application/json")
            .json(&json!({
                "email": "foo@bar.baz",
                "password": "averysafeandsecurepassword",
            }))
            .await;

        response.assert_status_ok();

        let body = response.json::<SignInResponse>();
        assert_eq!(body.user.email.as_str(), "foo@bar.baz");
        assert!(!body.token.is_empty());
    }

    #[tokio::test]
    async fn sign_in_fails_with_invalid_credentials() {
        let app_config = get_test_app_config();
        insert_test_user(&app_config, "foo@bar.baz", "averysafeandsecurepassword");

        let server = TestServer::new(build_router(app_config)).unwrap();

        server
            .post(endpoints::LOG_IN)
            .content_type("application/json")
            .json(&json!({
                "email": "foo@bar.baz",
                "password": "definitelyNotTheCorrectPassword",
            }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn sign_in_fails_with_unknown_email() {
        let server = TestServer::new(build_router(get_test_app_config())).unwrap();

        server
            .post(endpoints::LOG_IN)
            .content_type("application/json")
            .json(&json!({
                "email": "wrongemail@gmail.com",
                "password": "definitelyNotTheCorrectPassword",
            }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_succeeds_with_valid_jwt() {
        let app_config = get_test_app_config();
        insert_test_user(&app_config, "foo@bar.baz", "averysafeandsecurepassword");

        let server = TestServer::new(build_router(app_config)).unwrap();

        let token = server
            .post(endpoints::LOG_IN)
            .content_type("application/json")
            .json(&json!({
                "email": "foo@bar.baz",
                "password": "averysafeandsecurepassword",
            }))
            .await
            .json::<SignInResponse>()
            .token;

        server
            .get(endpoints::ME)
            .authorization_bearer(token)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn protected_route_fails_with_missing_header() {
        let server = TestServer::new(build_router(get_test_app_config())).unwrap();

        server
            .get(endpoints::ME)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_fails_with_garbage_token() {
        let server = TestServer::new(build_router(get_test_app_config())).unwrap();

        server
            .get(endpoints::ME)
            .authorization_bearer("not.a.token")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
