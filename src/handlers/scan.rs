use crate::imaging::{planet_visual_prompt, png_data_url};
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Free-text description of the planet to render
    pub description: String,
}

/// Deep scan: render a cinematic orbital image of a planet.
///
/// Returns the image as a `data:image/png;base64,...` URL. No retry on
/// vendor failure.
pub async fn deep_scan(
    state: web::Data<AppState>,
    body: web::Json<ScanRequest>,
) -> Result<HttpResponse, AppError> {
    let description = body.into_inner().description;
    if description.trim().is_empty() {
        return Err(AppError::BadRequest("Description must not be empty".to_string()));
    }

    let image_url = run_scan(&state, &description).await?;

    Ok(HttpResponse::Ok().json(json!({
        "image": image_url,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Generate the scan image for `subject` and record the outcome.
pub(crate) async fn run_scan(state: &AppState, subject: &str) -> Result<String, AppError> {
    let prompt = planet_visual_prompt(subject);
    let started = std::time::Instant::now();

    match state.image_generator.generate_image(&prompt).await {
        Ok(image) => {
            state.record_scan(true);
            info!(bytes = image.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Deep scan complete");
            Ok(png_data_url(&image))
        }
        Err(err) => {
            state.record_scan(false);
            warn!(error = %err, "Deep scan failed");
            Err(err.into())
        }
    }
}
