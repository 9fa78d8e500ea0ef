pub mod auth;
pub mod exam;
pub mod middleware;
pub mod process;
pub mod rest;
pub mod state;
pub mod stripe;
pub mod tasks;

use axum::http::StatusCode;
use state::AppState;
use studius_core::{domain::TutorSession, ports::PortError};
use uuid::Uuid;

pub use middleware::require_auth;

/// Fetches a session and checks it belongs to the caller. Sessions of other
/// users answer 404, not 403, so ids cannot be probed.
pub(crate) async fn owned_session(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<TutorSession, (StatusCode, String)> {
    let session = state
        .db
        .get_tutor_session(session_id)
        .await
        .map_err(port_error_response)?;
    if session.user_id != user_id {
        return Err((StatusCode::NOT_FOUND, "Sessione non trovata.".to_string()));
    }
    Ok(session)
}

/// Maps a port error onto the HTTP status and user-facing message the
/// frontend expects. Messages are in Italian like the rest of the product.
pub(crate) fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Risorsa non trovata.".to_string()),
        PortError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            "Accesso non autorizzato.".to_string(),
        ),
        PortError::InsufficientCredits {
            required,
            available,
        } => (
            StatusCode::PAYMENT_REQUIRED,
            format!("Crediti insufficienti: servono {required}, disponibili {available}."),
        ),
        PortError::Conflict(_) => (
            StatusCode::CONFLICT,
            "Operazione in conflitto con lo stato attuale.".to_string(),
        ),
        PortError::Unexpected(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Si è verificato un errore imprevisto.".to_string(),
        ),
    }
}
