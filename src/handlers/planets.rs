//! # Planet Endpoints
//!
//! - `GET /planets` - the catalog
//! - `POST /planets/{id}/select` - ask the agent for a one-sentence briefing
//! - `POST /planets/{id}/scan` - narrate over the voice link and render the deep scan
//!
//! Voice turns are only sent while a session is active; the response says
//! whether they were.

use crate::handlers::scan::run_scan;
use crate::planets::{find_planet, Planet, PLANETS};
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

fn planet_or_404(id: &str) -> Result<&'static Planet, AppError> {
    find_planet(id).ok_or_else(|| AppError::NotFound(format!("Unknown planet '{}'", id)))
}

/// List every selectable planet.
pub async fn list_planets() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "planets": PLANETS,
        "count": PLANETS.len()
    }))
}

/// Select a planet and request a briefing from the agent.
pub async fn select_planet(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let planet = planet_or_404(&path)?;
    let briefed = state.voice_link.send_message(planet.briefing_request());
    info!(planet = planet.id, briefed, "Planet selected");

    Ok(HttpResponse::Ok().json(json!({
        "planet": planet,
        "briefed": briefed
    })))
}

/// Deep scan of a catalog planet.
///
/// The narration turn goes out before the image request so the agent talks
/// while the image renders.
pub async fn scan_planet(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let planet = planet_or_404(&path)?;
    let narrated = state.voice_link.send_message(planet.scan_narration());

    let image_url = run_scan(&state, &planet.scan_subject()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "planet": planet,
        "narrated": narrated,
        "image": image_url,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
