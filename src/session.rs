use crate::errors::AppError;
use crate::settings::Settings;
use crate::storage::{self, Role};
use crate::web::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use base64ct::Encoding;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

pub const SESSION_COOKIE_NAME: &str = "privacydesk_session";

/// Storage key for a raw session token: SHA-256 over the secret and token.
pub fn token_digest(secret: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(token.as_bytes());
    base64ct::Base64UrlUnpadded::encode_string(&hasher.finalize())
}

#[derive(Clone, Debug)]
pub struct SessionCookie {
    pub token: String,
}

impl SessionCookie {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;

        for cookie in cookie_header.split(';') {
            let cookie = cookie.trim();
            if let Some(value) = cookie
                .strip_prefix(SESSION_COOKIE_NAME)
                .and_then(|s| s.strip_prefix('='))
            {
                if value.is_empty() {
                    continue;
                }
                return Some(Self {
                    token: value.to_string(),
                });
            }
        }
        None
    }

    pub fn to_cookie_header(&self, settings: &Settings) -> String {
        format!(
            "{}={}; HttpOnly; {}SameSite=Lax; Path=/; Max-Age={}",
            SESSION_COOKIE_NAME,
            self.token,
            if settings.session.secure_cookie {
                "Secure; "
            } else {
                ""
            },
            settings.session.ttl_secs.max(0)
        )
    }

    pub fn delete_cookie_header() -> String {
        format!(
            "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
            SESSION_COOKIE_NAME
        )
    }
}

/// The signed-in staff member behind a request.
#[derive(Clone, Debug, Serialize)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub display_name: String,
}

impl AuthSession {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Se requiere rol de administrador".to_string(),
            ))
        }
    }
}

/// Resolve the session cookie to an active user, if any.
pub async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthSession>, AppError> {
    let Some(cookie) = SessionCookie::from_headers(headers) else {
        return Ok(None);
    };
    let secret = &state.settings.session.secret;

    let Some(session) = storage::get_session(&state.store, &cookie.token, secret).await? else {
        return Ok(None);
    };
    let Some(user) = storage::get_user_by_id(&state.store, &session.user_id).await? else {
        return Ok(None);
    };
    if !user.active {
        tracing::debug!(user_id = %user.id, "session belongs to a deactivated user");
        return Ok(None);
    }

    Ok(Some(AuthSession {
        user_id: user.id,
        email: user.email,
        role: user.role,
        display_name: user.display_name,
    }))
}

/// Why a request could not be tied to a session.
#[derive(Debug)]
pub enum AuthRejection {
    /// API callers get a JSON 401
    Unauthenticated,
    /// Page requests are sent to the login form, remembering where they were going
    LoginRedirect(String),
    Store(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "success": false,
                    "error": "Debe iniciar sesión",
                })),
            )
                .into_response(),
            AuthRejection::LoginRedirect(next) => {
                let location = format!("/login?next={}", urlencoding::encode(&next));
                Redirect::to(&location).into_response()
            }
            AuthRejection::Store(e) => e.into_response(),
        }
    }
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let is_api = path.starts_with("/api/");
        match current_session(state, &parts.headers).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) if is_api => Err(AuthRejection::Unauthenticated),
            Ok(None) => Err(AuthRejection::LoginRedirect(path)),
            Err(e) if is_api => Err(AuthRejection::Store(e)),
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed, redirecting to login");
                Err(AuthRejection::LoginRedirect(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; privacydesk_session=abc123; other=1"),
        );
        let cookie = SessionCookie::from_headers(&headers).unwrap();
        assert_eq!(cookie.token, "abc123");
    }

    #[test]
    fn test_cookie_missing_or_empty() {
        assert!(SessionCookie::from_headers(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("privacydesk_session="));
        assert!(SessionCookie::from_headers(&headers).is_none());
    }

    #[test]
    fn test_cookie_header_attributes() {
        let mut settings = Settings::default();
        settings.session.ttl_secs = 600;

        let header = SessionCookie::new("tok".to_string()).to_cookie_header(&settings);
        assert!(header.starts_with("privacydesk_session=tok;"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Max-Age=600"));
        assert!(!header.contains("Secure"));

        settings.session.secure_cookie = true;
        let header = SessionCookie::new("tok".to_string()).to_cookie_header(&settings);
        assert!(header.contains("Secure;"));

        assert!(SessionCookie::delete_cookie_header().contains("Max-Age=0"));
    }

    #[test]
    fn test_login_redirect_keeps_destination() {
        let response = AuthRejection::LoginRedirect("/dashboard".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login?next=%2Fdashboard"
        );
    }

    #[test]
    fn test_token_digest_is_keyed() {
        let a = token_digest("secret-a", "token");
        assert_eq!(a, token_digest("secret-a", "token"));
        assert_ne!(a, token_digest("secret-b", "token"));
        assert_ne!(a, "token");
    }

    #[test]
    fn test_require_admin() {
        let mut session = AuthSession {
            user_id: "u1".to_string(),
            email: "ana@example.com".to_string(),
            role: Role::Analyst,
            display_name: "Ana".to_string(),
        };
        assert!(matches!(
            session.require_admin(),
            Err(AppError::Forbidden(_))
        ));
        session.role = Role::Admin;
        assert!(session.require_admin().is_ok());
    }
}
