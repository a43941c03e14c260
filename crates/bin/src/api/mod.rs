//! HTTP routes over a [`SessionService`].
//!
//! Every `/protected` and `/debug` route requires an `Authorization: Bearer`
//! header; the tenant a request reads from is always the one named in that
//! credential.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;

use switchboard::{
    DatabaseName, Error, ErrorKind, Principal, SessionService,
    clock::format_rfc3339,
    registry::{TenantRecord, UserProfile},
    session::SessionError,
    tenant::{ContactFilter, ContactRecord, TenantQuery, TenantRecords, TicketFilter},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SessionService>,
}

/// Build the router with every route mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/login", post(handle_login))
        .route("/verify-token", post(handle_verify_token))
        .route("/protected/profile", get(handle_profile))
        .route("/protected/contacts", get(handle_contacts))
        .route("/protected/contacts/active", get(handle_active_contacts))
        .route("/protected/contacts/search", get(handle_search_contacts))
        .route("/protected/tickets", get(handle_tickets))
        .route("/protected/refresh-token", post(handle_refresh))
        .route("/protected/logout", post(handle_logout))
        .route("/debug/tenants", get(handle_debug_tenants))
        .route("/debug/tables", get(handle_debug_tables))
        .route("/debug/users/{username}", get(handle_debug_user))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// A failed request rendered as `{"error": ...}` with a matching status.
#[derive(Debug)]
pub enum ApiError {
    /// The service rejected or failed the request
    Service(Error),
    /// The body or query string could not be decoded
    Malformed { status: StatusCode, message: String },
}

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError::Service(err.into())
    }
}

/// HTTP status for an error class.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn unauthorized() -> Self {
        SessionError::Unauthorized { source: None }.into()
    }

    fn malformed(status: StatusCode, message: String) -> Self {
        ApiError::Malformed { status, message }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => status_for(err.kind()),
            ApiError::Malformed { status, .. } => *status,
        }
    }

    /// Message safe to show a client.
    fn public_message(&self) -> String {
        let err = match self {
            ApiError::Service(err) => err,
            ApiError::Malformed { message, .. } => return message.clone(),
        };
        match err.kind() {
            ErrorKind::Unauthorized => match err {
                Error::Session(e) => e.to_string(),
                _ => "unauthorized".to_string(),
            },
            ErrorKind::Forbidden => "forbidden".to_string(),
            ErrorKind::Unavailable => "service unavailable".to_string(),
            ErrorKind::Internal => "internal server error".to_string(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Service(err) => match err.kind() {
                ErrorKind::Unavailable | ErrorKind::Internal => {
                    tracing::error!(module = err.module(), "Request failed: {err}");
                }
                _ => tracing::debug!(module = err.module(), "Request rejected: {err}"),
            },
            ApiError::Malformed { message, .. } => {
                tracing::debug!(%status, "Malformed request: {message}");
            }
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Authentication
// ============================================================================

/// The token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// A request carrying a valid credential.
pub struct Authenticated {
    pub token: String,
    pub principal: Principal,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(ApiError::unauthorized)?
            .to_string();
        let principal = state.service.authorize(&token)?;
        Ok(Authenticated { token, principal })
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// `Json` whose rejection is an [`ApiError`].
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::malformed(rejection.status(), rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// `Query` whose rejection is an [`ApiError`].
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::malformed(rejection.status(), rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

// ============================================================================
// Public handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handler for GET /health
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    access_token: String,
    token_type: &'static str,
    username: String,
    client_id: i64,
    database: DatabaseName,
    contacts: Vec<ContactRecord>,
    contact_count: usize,
    expires_in: u64,
    expires_at: String,
}

/// Handler for POST /login
async fn handle_login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let outcome = state
        .service
        .login(&request.username, &request.password)
        .await?;
    let contact_count = outcome.contact_count();
    let expires_in = outcome.credential.lifetime_secs();
    let expires_at = format_rfc3339(outcome.expires_at());
    Ok(Json(LoginResponse {
        success: true,
        access_token: outcome.credential.into_token(),
        token_type: "bearer",
        username: outcome.username,
        client_id: outcome.client_id,
        database: outcome.tenant,
        contacts: outcome.contacts,
        contact_count,
        expires_in,
        expires_at,
    }))
}

#[derive(Deserialize)]
struct TokenParam {
    token: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponse {
    valid: bool,
    username: String,
    database: DatabaseName,
    client_id: Option<i64>,
    expires_at: String,
    seconds_remaining: u64,
    minutes_remaining: u64,
}

/// Handler for POST /verify-token
///
/// Reads `?token=` first and falls back to the bearer header.
async fn handle_verify_token(
    State(state): State<AppState>,
    ApiQuery(param): ApiQuery<TokenParam>,
    headers: HeaderMap,
) -> ApiResult<VerifyResponse> {
    let token = param
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(ApiError::unauthorized)?;
    let status = state.service.verify(token)?;
    Ok(Json(VerifyResponse {
        valid: true,
        username: status.username,
        database: status.tenant,
        client_id: status.client_id,
        expires_at: format_rfc3339(status.valid_until),
        seconds_remaining: status.seconds_remaining,
        minutes_remaining: status.minutes_remaining,
    }))
}

// ============================================================================
// Protected handlers
// ============================================================================

/// Handler for GET /protected/profile
async fn handle_profile(auth: Authenticated) -> Json<Principal> {
    Json(auth.principal)
}

#[derive(Serialize)]
struct RecordsResponse {
    database: DatabaseName,
    count: usize,
    #[serde(flatten)]
    records: TenantRecords,
}

async fn fetch(
    state: &AppState,
    auth: Authenticated,
    query: TenantQuery,
) -> ApiResult<RecordsResponse> {
    let records = state
        .service
        .fetch_tenant_data(&auth.principal, &query)
        .await?;
    Ok(Json(RecordsResponse {
        database: auth.principal.tenant().clone(),
        count: records.len(),
        records,
    }))
}

/// Handler for GET /protected/contacts
async fn handle_contacts(
    State(state): State<AppState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<ContactFilter>,
) -> ApiResult<RecordsResponse> {
    fetch(&state, auth, TenantQuery::Contacts(filter)).await
}

/// Handler for GET /protected/contacts/active
async fn handle_active_contacts(
    State(state): State<AppState>,
    auth: Authenticated,
) -> ApiResult<RecordsResponse> {
    fetch(&state, auth, TenantQuery::active_contacts()).await
}

#[derive(Deserialize)]
struct SearchParam {
    name: String,
}

/// Handler for GET /protected/contacts/search
async fn handle_search_contacts(
    State(state): State<AppState>,
    auth: Authenticated,
    ApiQuery(param): ApiQuery<SearchParam>,
) -> ApiResult<RecordsResponse> {
    fetch(&state, auth, TenantQuery::search_contacts(param.name)).await
}

/// Handler for GET /protected/tickets
async fn handle_tickets(
    State(state): State<AppState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<TicketFilter>,
) -> ApiResult<RecordsResponse> {
    fetch(&state, auth, TenantQuery::Tickets(filter)).await
}

#[derive(Serialize)]
struct RefreshResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
    expires_at: String,
}

/// Handler for POST /protected/refresh-token
async fn handle_refresh(
    State(state): State<AppState>,
    auth: Authenticated,
) -> ApiResult<RefreshResponse> {
    let credential = state.service.refresh(&auth.principal)?;
    let expires_in = credential.lifetime_secs();
    let expires_at = format_rfc3339(credential.expires_at());
    Ok(Json(RefreshResponse {
        access_token: credential.into_token(),
        token_type: "bearer",
        expires_in,
        expires_at,
    }))
}

/// Handler for POST /protected/logout
async fn handle_logout(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service.logout(&auth.token)?;
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Debug handlers
// ============================================================================

/// Handler for GET /debug/tenants
async fn handle_debug_tenants(
    State(state): State<AppState>,
    auth: Authenticated,
) -> ApiResult<Vec<TenantRecord>> {
    Ok(Json(state.service.list_tenants(&auth.principal).await?))
}

#[derive(Deserialize)]
struct TablesParam {
    database: Option<String>,
}

#[derive(Serialize)]
struct TablesResponse {
    database: DatabaseName,
    tables: Vec<String>,
}

/// Handler for GET /debug/tables
///
/// Defaults to the caller's own tenant.
async fn handle_debug_tables(
    State(state): State<AppState>,
    auth: Authenticated,
    ApiQuery(param): ApiQuery<TablesParam>,
) -> ApiResult<TablesResponse> {
    let database = match param.database {
        Some(name) => DatabaseName::parse(name)?,
        None => auth.principal.tenant().clone(),
    };
    let tables = state
        .service
        .list_tables(&auth.principal, &database)
        .await?;
    Ok(Json(TablesResponse { database, tables }))
}

/// Handler for GET /debug/users/{username}
async fn handle_debug_user(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(username): Path<String>,
) -> ApiResult<UserProfile> {
    Ok(Json(
        state
            .service
            .user_record(&auth.principal, &username)
            .await?,
    ))
}
