//! HTTP handlers for API endpoints.

use crate::error::{Result, ScaleError};
use crate::sampling::calibration::parse_float;
use crate::sampling::{Calibration, HistoryPoint, Measurement, SamplerStatus, ScaleService};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

impl IntoResponse for ScaleError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            warn!("Rejected request: {}", self);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": self.to_string() })),
            )
                .into_response()
        } else {
            error!("Request failed: {}", self);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response()
        }
    }
}

/// A number sent either as a JSON number or as a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
}

impl NumberInput {
    fn parse(&self, field: &str) -> Result<f64> {
        match self {
            NumberInput::Number(v) => Ok(*v),
            NumberInput::Text(raw) => parse_float(field, raw),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TareRequest {
    pub tare_voltage: Option<NumberInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScaleRequest {
    pub scale: Option<NumberInput>,
}

/// Parse an optional JSON body. An empty body yields the default request.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ScaleError::invalid_input(format!("Malformed JSON body: {}", e)))
}

/// Current voltage, weight and timestamp.
pub async fn get_current(State(service): State<Arc<ScaleService>>) -> Json<Measurement> {
    Json(service.current_measurement())
}

/// Full history, oldest first.
pub async fn get_history(State(service): State<Arc<ScaleService>>) -> Json<Vec<HistoryPoint>> {
    Json(service.history())
}

/// Current calibration.
pub async fn get_config(State(service): State<Arc<ScaleService>>) -> Json<Calibration> {
    Json(service.calibration())
}

/// Sampler diagnostics.
pub async fn get_status(State(service): State<Arc<ScaleService>>) -> Json<SamplerStatus> {
    Json(service.status())
}

/// Set the tare voltage, defaulting to the current reading.
pub async fn tare(
    State(service): State<Arc<ScaleService>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let request: TareRequest = parse_body(&body)?;
    let voltage = request
        .tare_voltage
        .map(|v| v.parse("tare_voltage"))
        .transpose()?;
    let tare_voltage = service.tare(voltage)?;
    Ok(Json(json!({ "success": true, "tare_voltage": tare_voltage })))
}

/// Set the scale factor.
pub async fn set_scale(
    State(service): State<Arc<ScaleService>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let request: ScaleRequest = parse_body(&body)?;
    let scale = request
        .scale
        .ok_or_else(|| ScaleError::invalid_input("scale is required"))?
        .parse("scale")?;
    let scale_factor = service.set_scale(scale)?;
    Ok(Json(json!({ "success": true, "scale_factor": scale_factor })))
}

/// Empty the history buffer.
pub async fn clear_history(State(service): State<Arc<ScaleService>>) -> Json<serde_json::Value> {
    let removed = service.clear_history();
    Json(json!({
        "success": true,
        "message": format!("History cleared ({} entries removed)", removed)
    }))
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "labjack-scale",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Built-in page served at `/` when no static directory is available.
pub async fn default_index() -> Html<&'static str> {
    Html(DEFAULT_INDEX_HTML)
}

const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>LabJack Scale</title>
    <style>
        body { font-family: sans-serif; margin: 2rem; }
        .value { font-size: 3rem; font-weight: bold; }
    </style>
</head>
<body>
    <h1>LabJack Scale</h1>
    <div class="value" id="weight">--</div>
    <div id="voltage">--</div>
    <script>
        async function refresh() {
            try {
                const res = await fetch('/api/labjack/ain1');
                const data = await res.json();
                document.getElementById('weight').textContent = data.weight.toFixed(2);
                document.getElementById('voltage').textContent = `${data.voltage.toFixed(4)} V`;
            } catch (e) {
                console.error('Failed to fetch reading:', e);
            }
        }
        refresh();
        setInterval(refresh, 1000);
    </script>
</body>
</html>"#;
