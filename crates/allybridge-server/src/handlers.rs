use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;

use allybridge_client::AllyClient;
use allybridge_core::{Credentials, ProgressNoteInput};

use crate::error::ApiError;

/// Shared handler state: one portal client for the whole service.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<AllyClient>,
}

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "AllyBridge",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Readiness reports whether a portal session is currently held. The
/// service still answers requests without one (the first operation will
/// negotiate), so this is informational, not gating.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "ready",
        "authenticated": state.client.is_authenticated().await,
    });
    (StatusCode::OK, Json(body))
}

// No Debug derive: the body carries a raw password.
#[derive(Deserialize)]
pub struct CredentialsBody {
    pub username: String,
    pub password: String,
    /// Prove the pair with a login before returning instead of waiting
    /// for the first operation to need a session.
    #[serde(default = "default_validate")]
    pub validate: bool,
}

fn default_validate() -> bool {
    true
}

/// Stores a new credential pair, replacing any prior pair and its
/// session.
pub async fn submit_credentials(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = Credentials::new(body.username, body.password);
    if !credentials.is_usable() {
        return Err(ApiError::bad_request(
            "username and password must be non-empty",
        ));
    }
    state.client.set_credentials(credentials).await;
    if body.validate {
        state.client.authenticate().await?;
    }
    Ok(Json(json!({ "status": "accepted", "validated": body.validate })))
}

/// Destroys the stored credentials and any live session.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    state.client.logout().await;
    Json(json!({ "status": "logged_out" }))
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    /// Service date in the portal's `MM/DD/YYYY` form.
    pub date: String,
    pub office_id: String,
    pub provider_id: String,
}

pub async fn list_appointments(
    State(state): State<AppState>,
    Query(query): Query<AppointmentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let appointments = state
        .client
        .list_appointments(&query.date, &query.office_id, &query.provider_id)
        .await?;
    Ok(Json(json!({ "appointments": appointments })))
}

pub async fn fetch_patient_record(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.client.fetch_patient_record(&patient_id).await?;
    Ok(Json(record))
}

pub async fn list_progress_note_encounters(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let encounters = state
        .client
        .list_progress_note_encounters(&patient_id)
        .await?;
    Ok(Json(json!({ "encounters": encounters })))
}

pub async fn fetch_progress_note(
    State(state): State<AppState>,
    Path((patient_id, encounter_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state
        .client
        .fetch_progress_note(&patient_id, &encounter_id)
        .await?;
    Ok(Json(note))
}

pub async fn create_progress_note(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Json(input): Json<ProgressNoteInput>,
) -> Result<impl IntoResponse, ApiError> {
    if input.patient_id != patient_id {
        return Err(ApiError::bad_request(
            "patient id in the path and the note body disagree",
        ));
    }
    let created = state.client.create_progress_note(&input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
