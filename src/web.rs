//! HTTP surface: JSON API, webhook receiver, static pages.
//!
//! Every JSON response carries `success`. Handlers return `Result<_, AppError>`
//! and let `AppError`'s `IntoResponse` produce the error body.
use crate::consent::{self, ConsentEdit, ConsentFilter, ConsentPayload, ConsentRecord};
use crate::errors::AppError;
use crate::ingest;
use crate::rat::{self, RatPayload, RatSource};
use crate::report;
use crate::rights::{self, RightsQuery};
use crate::session::{self, AuthSession, SessionCookie};
use crate::settings::Settings;
use crate::storage::{self, Credentials, RecordStore};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Form, Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use miette::IntoDiagnostic;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;

const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: RecordStore,
}

impl AppState {
    pub fn new(settings: Settings, store: RecordStore) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
        }
    }

    fn page_size(&self) -> u64 {
        self.settings.database.page_size.max(1)
    }
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; form-action 'self'; frame-ancestors 'none'"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    // personal data must not linger in shared caches
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}

pub fn router(state: AppState) -> Router {
    let static_dir = state.settings.server.static_dir.clone();

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/login", get(login_page))
        .route("/dashboard", get(dashboard_page))
        // session
        .route("/api/login", post(api_login))
        .route("/api/logout", post(api_logout))
        .route("/api/session", get(api_session))
        // ingestion
        .route("/webhook", post(webhook))
        .route(
            "/api/upload",
            post(upload_spreadsheet).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        // RAT
        .route("/api/rat", get(list_rat).post(create_rat))
        .route(
            "/api/rat/{id}",
            get(get_rat).put(update_rat).delete(delete_rat),
        )
        // consents
        .route("/api/consents/validate", post(validate_consent))
        .route("/api/consents", get(list_consents).post(create_consent))
        .route("/api/consents/metrics", get(consent_metrics))
        .route(
            "/api/consents/{id}",
            get(get_consent).put(update_consent).delete(delete_consent),
        )
        .route("/api/consents/{id}/revoke", post(revoke_consent))
        .route("/api/consents/{id}/pdf", get(consent_pdf))
        // ARCO
        .route("/api/arco", get(list_arco))
        .route("/api/arco/metrics", get(arco_metrics))
        .route("/api/arco/{id}", get(get_arco))
        .route("/api/arco/{id}/status", post(transition_arco))
        // admin
        .route("/api/admin/diagnostics", get(diagnostics))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn serve(settings: Settings, store: RecordStore) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|_| miette::miette!("bad listen addr"))?;

    let state = AppState::new(settings, store);
    let app = router(state);

    tracing::info!(%addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

/// Unwrap a JSON body, turning malformed input and unknown fields into a 400.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "rejected JSON body");
            Err(AppError::BadRequest(format!(
                "Cuerpo JSON inválido: {}",
                rejection.body_text()
            )))
        }
    }
}

fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params.map(|Query(value)| value).map_err(|rejection| {
        AppError::BadRequest(format!("Parámetros inválidos: {}", rejection.body_text()))
    })
}

fn form_fields<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    form.map(|Form(value)| value).map_err(|rejection| {
        AppError::BadRequest(format!("Formulario inválido: {}", rejection.body_text()))
    })
}

fn path_id(id: Result<Path<String>, PathRejection>) -> Result<String, AppError> {
    id.map(|Path(value)| value).map_err(|rejection| {
        AppError::BadRequest(format!("Identificador inválido: {}", rejection.body_text()))
    })
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{what} no encontrado"))
}

// ============================================================================
// Pages
// ============================================================================

async fn root() -> &'static str {
    "Servidor de cumplimiento activo"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn static_page(state: &AppState, file: &str) -> Result<Html<String>, AppError> {
    let path = state.settings.server.static_dir.join(file);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "static page missing");
            Err(AppError::NotFound("Página no encontrada".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn login_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    static_page(&state, "login.html").await
}

async fn dashboard_page(
    _session: AuthSession,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    static_page(&state, "dashboard.html").await
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn api_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let form = json_body(body)?;

    let credentials =
        storage::verify_user_password(&state.store, &form.email, &form.password).await?;
    let user = match credentials {
        Credentials::Verified(user) => user,
        Credentials::Invalid => {
            tracing::info!(email = %form.email, "login rejected: bad credentials");
            return Err(AppError::Unauthorized(
                "Correo o contraseña incorrectos".to_string(),
            ));
        }
        Credentials::Inactive => {
            tracing::info!(email = %form.email, "login rejected: inactive account");
            return Err(AppError::Forbidden("La cuenta está desactivada".to_string()));
        }
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    let (token, _session) = storage::create_session(
        &state.store,
        &user.id,
        state.settings.session.ttl_secs,
        user_agent,
        &state.settings.session.secret,
    )
    .await?;
    tracing::info!(user_id = %user.id, "user signed in");

    let cookie = SessionCookie::new(token).to_cookie_header(&state.settings);
    let body = json!({
        "success": true,
        "user": {
            "id": user.id,
            "email": user.email,
            "display_name": user.display_name,
            "role": user.role,
        },
    });

    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn api_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(cookie) = SessionCookie::from_headers(&headers) {
        if let Err(e) =
            storage::delete_session(&state.store, &cookie.token, &state.settings.session.secret)
                .await
        {
            tracing::warn!(error = %e, "failed to delete session on logout");
        }
    }

    (
        [(header::SET_COOKIE, SessionCookie::delete_cookie_header())],
        Json(json!({ "success": true })),
    )
        .into_response()
}

async fn api_session(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let current = match session::current_session(&state, &headers).await {
        Ok(current) => current,
        Err(e) => {
            tracing::debug!(error = %e, "session check without a reachable store");
            None
        }
    };

    Json(json!({
        "success": true,
        "authenticated": current.is_some(),
        "user": current,
    }))
}

// ============================================================================
// Ingestion
// ============================================================================

async fn webhook(
    State(state): State<AppState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let form = form_fields(form)?;
    tracing::debug!(fields = ?form.keys().collect::<Vec<_>>(), "webhook received");

    let request = ingest::normalize_webhook(&form, Utc::now())?;
    storage::insert_rights_request(&state.store, &request).await?;
    tracing::info!(id = %request.id, origin = %request.origin, "rights request ingested");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "id": request.id,
            "msg": "Solicitud registrada",
        })),
    ))
}

async fn upload_spreadsheet(
    _session: AuthSession,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    let mut multipart = multipart.map_err(|rejection| {
        AppError::BadRequest(format!("Formulario inválido: {}", rejection.body_text()))
    })?;
    // fail fast when there is nowhere to put the rows
    state.store.connection().await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Formulario inválido: {e}")))?
    {
        if matches!(field.name(), Some("file") | Some("archivo")) {
            let filename = field.file_name().map(String::from);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("No se pudo leer el archivo: {e}")))?;
            upload = Some((filename, bytes.to_vec()));
            break;
        }
    }
    let (filename, bytes) = upload.ok_or_else(|| {
        AppError::BadRequest("Debe adjuntar una planilla en el campo 'file'".to_string())
    })?;

    let now = Utc::now();
    let report = tokio::task::spawn_blocking(move || ingest::import_rat_workbook(bytes, now))
        .await
        .map_err(|e| AppError::Other(format!("Spreadsheet import task failed: {e}")))??;

    for record in &report.records {
        storage::insert_rat(&state.store, record).await?;
    }
    tracing::info!(
        file = filename.as_deref().unwrap_or("-"),
        inserted = report.records.len(),
        rejected = report.errors.len(),
        "RAT spreadsheet imported"
    );

    Ok(Json(json!({
        "success": true,
        "inserted": report.records.len(),
        "skipped_empty": report.skipped_empty,
        "errors": report.errors,
        "records": report.records,
    })))
}

// ============================================================================
// RAT
// ============================================================================

async fn list_rat(
    _session: AuthSession,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let records = storage::list_rat(&state.store, state.page_size()).await?;
    Ok(Json(json!({
        "success": true,
        "total": records.len(),
        "records": records,
    })))
}

async fn create_rat(
    _session: AuthSession,
    State(state): State<AppState>,
    body: Result<Json<RatPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let payload = json_body(body)?;
    let record = rat::prepare(&payload, RatSource::Manual, Utc::now())?;
    storage::insert_rat(&state.store, &record).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "record": record })),
    ))
}

async fn get_rat(
    _session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let record = storage::get_rat(&state.store, &id)
        .await?
        .ok_or_else(|| not_found("Registro RAT"))?;
    Ok(Json(json!({ "success": true, "record": record })))
}

async fn update_rat(
    _session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<RatPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let payload = json_body(body)?;
    let existing = storage::get_rat(&state.store, &id)
        .await?
        .ok_or_else(|| not_found("Registro RAT"))?;

    let updated = rat::apply_update(&existing, &payload, Utc::now())?;
    storage::update_rat(&state.store, &updated).await?;
    Ok(Json(json!({ "success": true, "record": updated })))
}

async fn delete_rat(
    session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    session.require_admin()?;

    let existing = storage::get_rat(&state.store, &id)
        .await?
        .ok_or_else(|| not_found("Registro RAT"))?;
    if !storage::delete_rat(&state.store, &existing.id, existing.partition_key()).await? {
        return Err(not_found("Registro RAT"));
    }
    tracing::info!(id = %id, by = %session.user_id, "RAT record deleted");
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Consents
// ============================================================================

/// Load consents and expire the ones past their date, persisting each change.
async fn load_consents(state: &AppState) -> Result<Vec<ConsentRecord>, AppError> {
    let mut records = storage::list_consents(&state.store, state.page_size()).await?;
    refresh_and_persist(state, &mut records).await?;
    Ok(records)
}

async fn refresh_and_persist(
    state: &AppState,
    records: &mut [ConsentRecord],
) -> Result<(), AppError> {
    let now = Utc::now();
    let changed = consent::refresh_expirations(records, now.date_naive(), now);

    for record in changed {
        match storage::update_consent(&state.store, &record).await {
            Ok(saved) => {
                if let Some(slot) = records.iter_mut().find(|r| r.id == saved.id) {
                    *slot = saved;
                }
            }
            // someone else wrote it first; their version wins
            Err(AppError::Conflict(_)) => {
                tracing::warn!(id = %record.id, "skipped expiring a concurrently modified consent");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn load_consent(state: &AppState, id: &str) -> Result<ConsentRecord, AppError> {
    let record = storage::get_consent(&state.store, id)
        .await?
        .ok_or_else(|| not_found("Consentimiento"))?;
    let mut records = [record];
    refresh_and_persist(state, &mut records).await?;
    let [record] = records;
    Ok(record)
}

async fn validate_consent(
    _session: AuthSession,
    body: Result<Json<ConsentPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let payload = json_body(body)?;
    let validation = consent::validate(&payload);
    Ok(Json(json!({
        "success": true,
        "valid": validation.valid,
        "errors": validation.errors,
    })))
}

async fn list_consents(
    _session: AuthSession,
    State(state): State<AppState>,
    criteria: Result<Query<ConsentFilter>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let criteria = query_params(criteria)?;
    let records = load_consents(&state).await?;
    let matching = consent::filter(&records, &criteria)?;
    Ok(Json(json!({
        "success": true,
        "total": matching.len(),
        "consents": matching,
    })))
}

async fn create_consent(
    session: AuthSession,
    State(state): State<AppState>,
    body: Result<Json<ConsentPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let payload = json_body(body)?;
    let record = consent::prepare(&payload, Utc::now())?;
    let stored = storage::insert_consent(&state.store, &record).await?;
    tracing::info!(id = %stored.id, by = %session.user_id, "consent registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "consent": stored })),
    ))
}

async fn consent_metrics(
    _session: AuthSession,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let records = load_consents(&state).await?;
    Ok(Json(json!({
        "success": true,
        "metrics": consent::metrics(&records),
    })))
}

async fn get_consent(
    _session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let record = load_consent(&state, &id).await?;
    Ok(Json(json!({ "success": true, "consent": record })))
}

async fn update_consent(
    session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<ConsentEdit>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let edit = json_body(body)?;
    let record = load_consent(&state, &id).await?;

    if let Some(version) = edit.version {
        if version != record.version {
            return Err(AppError::Conflict(
                "El consentimiento fue modificado por otra persona; recargue e intente nuevamente"
                    .to_string(),
            ));
        }
    }

    let edited = consent::apply_edit(&record, &edit, Utc::now())?;
    let saved = storage::update_consent(&state.store, &edited).await?;
    tracing::info!(id = %saved.id, by = %session.user_id, "consent edited");
    Ok(Json(json!({ "success": true, "consent": saved })))
}

async fn delete_consent(
    session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    session.require_admin()?;

    let record = storage::get_consent(&state.store, &id)
        .await?
        .ok_or_else(|| not_found("Consentimiento"))?;
    if !storage::delete_consent(&state.store, &record.id, record.partition_key()).await? {
        return Err(not_found("Consentimiento"));
    }
    tracing::info!(id = %id, by = %session.user_id, "consent deleted");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RevokeRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn revoke_consent(
    session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let request = json_body(body)?;
    let record = load_consent(&state, &id).await?;

    let revoked = consent::revoke(
        &record,
        request.reason.as_deref().unwrap_or_default(),
        Utc::now(),
    )?;
    let saved = storage::update_consent(&state.store, &revoked).await?;
    tracing::info!(id = %saved.id, by = %session.user_id, "consent revoked");
    Ok(Json(json!({ "success": true, "consent": saved })))
}

async fn consent_pdf(
    _session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(id)?;
    let record = load_consent(&state, &id).await?;
    let filename = report::pdf_filename(&record);
    let bytes =
        tokio::task::spawn_blocking(move || report::render_consent_pdf(&record, Utc::now()))
            .await
            .map_err(|e| AppError::Other(format!("PDF task failed: {e}")))??;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ============================================================================
// Rights requests (ARCO)
// ============================================================================

async fn list_arco(
    _session: AuthSession,
    State(state): State<AppState>,
    query: Result<Query<RightsQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let query = query_params(query)?;
    let requests =
        storage::query_rights_requests(&state.store, &query, state.page_size()).await?;
    Ok(Json(json!({
        "success": true,
        "total": requests.len(),
        "requests": requests,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct ArcoMetricsQuery {
    new_within_minutes: Option<i64>,
}

async fn arco_metrics(
    _session: AuthSession,
    State(state): State<AppState>,
    params: Result<Query<ArcoMetricsQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let params = query_params(params)?;
    if params.new_within_minutes.is_some_and(|m| m < 0) {
        return Err(AppError::validation(
            "new_within_minutes no puede ser negativo",
        ));
    }

    let requests =
        storage::query_rights_requests(&state.store, &RightsQuery::default(), state.page_size())
            .await?;
    Ok(Json(json!({
        "success": true,
        "metrics": rights::metrics(&requests, Utc::now(), params.new_within_minutes),
    })))
}

async fn get_arco(
    _session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let request = storage::get_rights_request(&state.store, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Solicitud no encontrada".to_string()))?;
    let status = request.effective_status();
    Ok(Json(json!({
        "success": true,
        "request": request,
        "effective_status": status,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusChange {
    status: String,
    #[serde(default)]
    note: Option<String>,
}

async fn transition_arco(
    session: AuthSession,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<StatusChange>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let id = path_id(id)?;
    let change = json_body(body)?;
    let request = rights::transition_status(
        &state.store,
        &id,
        &change.status,
        change.note.as_deref(),
        Utc::now(),
    )
    .await?;
    tracing::debug!(id = %id, by = %session.user_id, "status change applied");
    Ok(Json(json!({ "success": true, "request": request })))
}

// ============================================================================
// Admin
// ============================================================================

async fn diagnostics(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    session.require_admin()?;

    let health = state.store.health_check().await;
    let counts = match storage::collection_counts(&state.store).await {
        Ok(counts) => Some(counts),
        Err(e) => {
            tracing::warn!(error = %e, "collection counts unavailable");
            None
        }
    };

    Ok(Json(json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
        "store": {
            "configured": state.store.is_configured(),
            "connected": state.store.is_connected(),
            "health": health,
        },
        "collections": counts,
        "page_size": state.page_size(),
    })))
}
