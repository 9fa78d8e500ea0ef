//! services/api/src/web/middleware.rs
//!
//! Cookie-session authentication. Signup and login set an opaque `session`
//! cookie backed by the `auth_sessions` table; this middleware resolves it to
//! a user id and makes the id available to handlers through request
//! extensions.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::AppState;

/// Pulls the session id out of a `Cookie` header value.
pub(crate) fn session_cookie_value(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .find_map(|part| part.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Guards the `/api` routes: resolves the session cookie against the database
/// and inserts the caller's `Uuid` into request extensions. Requests without
/// a valid, unexpired session answer 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            "Accesso non autorizzato.".to_string(),
        )
    };

    let session_id = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_cookie_value)
        .ok_or_else(unauthorized)?;

    let user_id = state
        .db
        .validate_auth_session(session_id)
        .await
        .map_err(|e| {
            debug!("Session validation rejected a request: {e}");
            unauthorized()
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_session_among_other_cookies() {
        let header = "theme=dark; session=abc-123; lang=it";
        assert_eq!(session_cookie_value(header), Some("abc-123"));
    }

    #[test]
    fn missing_or_empty_session_yields_none() {
        assert_eq!(session_cookie_value("theme=dark"), None);
        assert_eq!(session_cookie_value("session="), None);
        assert_eq!(session_cookie_value(""), None);
    }
}
