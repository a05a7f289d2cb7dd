use axum::{
    Router,
    routing::{delete, get, post},
};

use tessera_core::health::healthz;
use tessera_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    admin::{check as check_admin, elevate, revoke as revoke_elevation, status as elevation_status},
    devices::{list_devices, logout_device},
    health::readyz,
    passcode::{request_passcode, verify_passcode},
    session::{logout, logout_all, refresh_token, validate_session},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Passcode
        .route("/auth/passcode", post(request_passcode))
        .route("/auth/passcode/verify", post(verify_passcode))
        // Session
        .route("/auth/token/refresh", post(refresh_token))
        .route("/auth/session", get(validate_session))
        .route("/auth/logout", post(logout))
        .route("/auth/logout/all", post(logout_all))
        // Devices
        .route("/auth/devices", get(list_devices))
        .route("/auth/devices/{session_id}", delete(logout_device))
        // Admin elevation
        .route(
            "/auth/admin/elevation",
            get(elevation_status).post(elevate).delete(revoke_elevation),
        )
        .route("/auth/admin/check", get(check_admin))
        .layer(trace_layer())
        .layer(propagate_request_id_layer())
        .layer(request_id_layer())
        .with_state(state)
}
