use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Handler for `GET /healthz`: liveness check.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Body returned by readiness probes.
#[derive(Debug, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub checks: Vec<ReadinessCheck>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub ok: bool,
}

/// Fold dependency probe results into a readiness response.
///
/// Any failing check turns the probe into a 503 so the instance is taken out of rotation.
pub fn readiness(checks: Vec<(&'static str, bool)>) -> (StatusCode, Json<Readiness>) {
    let checks: Vec<ReadinessCheck> = checks
        .into_iter()
        .map(|(name, ok)| ReadinessCheck { name, ok })
        .collect();
    let ready = checks.iter().all(|c| c.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(Readiness { ready, checks }))
}
