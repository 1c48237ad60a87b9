use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use shared_types::{unit_from_file_name, StatusResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const CALENDAR_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// GET / - service status plus the mappings as configured right now
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::running(
        state.settings.sync_interval_minutes,
        state.mappings.mappings(),
    ))
}

/// GET /:file - the last published calendar of one unit, e.g. `/FAMILY.ics`
pub async fn get_calendar(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> ApiResult<Response> {
    let unit = unit_from_file_name(&file_name)
        .filter(|unit| !unit.contains(|c: char| c == '/' || c == '\\'))
        .ok_or_else(|| ApiError::not_found(format!("{} not found", file_name)))?;

    if !state.mappings.mappings().iter().any(|m| m.name == unit) {
        return Err(ApiError::not_found(format!("Unknown unit: {}", unit)));
    }

    let path = state.settings.artifact_path(unit);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!(
                "Calendar for {} has not been synced yet",
                unit
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!("Serving {} ({} bytes)", path.display(), body.len());

    Ok(([(header::CONTENT_TYPE, CALENDAR_CONTENT_TYPE)], body).into_response())
}
