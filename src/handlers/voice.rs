use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Current voice link state.
pub async fn voice_status(state: web::Data<AppState>) -> HttpResponse {
    let link = &state.voice_link;

    HttpResponse::Ok().json(json!({
        "state": link.state(),
        "session_id": link.session_id(),
        "resources": link.resources(),
        "stats": link.stats()
    }))
}

/// Add a text turn to the live conversation.
///
/// Accepted even when no session is active; the message is then dropped.
pub async fn send_voice_message(
    state: web::Data<AppState>,
    body: web::Json<MessageRequest>,
) -> Result<HttpResponse, AppError> {
    let text = body.into_inner().text;
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text must not be empty".to_string()));
    }

    let delivered = state.voice_link.send_message(text);

    Ok(HttpResponse::Accepted().json(json!({
        "status": "accepted",
        "delivered": delivered,
        "state": state.voice_link.state()
    })))
}

/// End the current voice session.
pub async fn disconnect_voice(state: web::Data<AppState>) -> HttpResponse {
    state.voice_link.disconnect();

    HttpResponse::Ok().json(json!({
        "status": "disconnected",
        "state": state.voice_link.state()
    }))
}
