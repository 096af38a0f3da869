use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Service health, voice link state and counters.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let scans = state.get_metrics_snapshot();
    let link = &state.voice_link;
    let link_state = link.state();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "voice_link": {
            "state": link_state,
            "session_id": link.session_id(),
            "resources": link.resources(),
            "stats": link.stats()
        },
        "scans": scans,
        "vendor": {
            "live_model": config.live.model,
            "image_model": config.imaging.model,
            "api_key_configured": !config.live.api_key.is_empty()
        },
        "memory": get_memory_info()
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let field = |name: &str| -> u64 {
                status
                    .lines()
                    .find(|line| line.starts_with(name))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map_or(0, |kb| kb * 1024)
            };

            return json!({
                "resident_memory_bytes": field("VmRSS:"),
                "virtual_memory_bytes": field("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}
