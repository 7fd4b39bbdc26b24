//! `GET /api/devices/{device_key}/readings` history endpoint.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hive_core::{DeviceKey, Reading};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::server::AppState;

/// Query string for the history endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Page size; defaults to 100, clamped to 1000.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Effective page size.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    device_key: String,
}

fn error_response(status: StatusCode, error: &'static str, device_key: String) -> Response {
    (status, Json(ErrorBody { error, device_key })).into_response()
}

/// Most recent readings for a device, newest first.
pub async fn recent_readings(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Ok(device_key) = DeviceKey::new(raw_key.as_str()) else {
        return error_response(StatusCode::NOT_FOUND, "device not found", raw_key);
    };

    match state.registry.exists(&device_key).await {
        Ok(true) => {}
        Ok(false) => return error_response(StatusCode::NOT_FOUND, "device not found", raw_key),
        Err(e) => {
            warn!(device_key = %device_key, error = %e, "device lookup failed");
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "registry unavailable", raw_key);
        }
    }

    match state.store.recent(&device_key, query.effective_limit()).await {
        Ok(readings) => Json::<Vec<Reading>>(readings).into_response(),
        Err(e) => {
            warn!(device_key = %device_key, error = %e, "history query failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store unavailable", raw_key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(HistoryQuery::default().effective_limit(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(HistoryQuery { limit: Some(5) }.effective_limit(), 5);
        assert_eq!(
            HistoryQuery { limit: Some(50_000) }.effective_limit(),
            MAX_HISTORY_LIMIT
        );
    }
}
