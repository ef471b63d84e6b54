//! The public client facade.
//!
//! [`AllyClient`] holds the credentials and the current session behind a
//! mutex and runs every operation through a recovery wrapper: when the
//! portal silently drops the session mid-operation, the wrapper negotiates
//! a fresh one and replays the operation exactly once. Operations
//! serialize on a client-wide lock; the portal's session semantics are
//! not safe under concurrent use of one cookie jar.

use std::future::Future;

use tokio::sync::Mutex;

use allybridge_core::error::{AuthError, OperationError, RequestError};
use allybridge_core::{
    Appointment, CreatedEncounter, Credentials, EncounterSummary, PatientRecord, ProgressNote,
    ProgressNoteInput, ServiceDate, validate_platform_id,
};

use crate::config::{ClientConfig, ConfigError};
use crate::decode::{self, BridgeOutcome};
use crate::negotiate::SessionNegotiator;
use crate::orchestrate::RequestOrchestrator;
use crate::session::SessionHandle;

struct ClientState {
    credentials: Option<Credentials>,
    session: Option<SessionHandle>,
}

/// High-level client for the clinical-records portal.
///
/// All methods take `&self`; the client is intended to be shared (for
/// example behind an `Arc`) across tasks.
pub struct AllyClient {
    negotiator: SessionNegotiator,
    orchestrator: RequestOrchestrator,
    state: Mutex<ClientState>,
    /// Held for the full duration of every platform operation. State
    /// queries go through `state` instead and stay responsive while an
    /// operation is in flight.
    operation: Mutex<()>,
}

impl AllyClient {
    /// Builds a client from a validated configuration. Credentials are
    /// supplied separately via [`AllyClient::set_credentials`] or at
    /// construction with [`AllyClient::with_credentials`].
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let base = config.validate()?;
        Ok(Self {
            negotiator: SessionNegotiator::new(config.clone(), base.clone()),
            orchestrator: RequestOrchestrator::new(config, base),
            state: Mutex::new(ClientState {
                credentials: None,
                session: None,
            }),
            operation: Mutex::new(()),
        })
    }

    pub fn with_credentials(
        config: ClientConfig,
        credentials: Credentials,
    ) -> Result<Self, ConfigError> {
        let client = Self::new(config)?;
        client
            .state
            .try_lock()
            .expect("state lock is uncontended during construction")
            .credentials = Some(credentials);
        Ok(client)
    }

    /// Replaces the stored credentials. Any live session is discarded
    /// since it belongs to the previous identity.
    pub async fn set_credentials(&self, credentials: Credentials) {
        let mut state = self.state.lock().await;
        state.session = None;
        state.credentials = Some(credentials);
    }

    /// Negotiates a session now instead of waiting for the first
    /// operation to need one.
    pub async fn authenticate(&self) -> Result<(), OperationError> {
        const OP: &str = "authenticate";
        let _serialized = self.operation.lock().await;
        let mut state = self.state.lock().await;
        let credentials = state.credentials.clone().ok_or_else(|| {
            OperationError::auth(OP, AuthError::invalid_credentials("no credentials configured"))
        })?;
        let session = self
            .negotiator
            .authenticate(&credentials)
            .await
            .map_err(|e| OperationError::auth(OP, e))?;
        state.session = Some(session);
        Ok(())
    }

    /// Discards the stored credentials and the current session without
    /// contacting the portal. The portal expires server-side state on
    /// its own schedule.
    pub async fn logout(&self) {
        let mut state = self.state.lock().await;
        state.credentials = None;
        state.session = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Lists the appointments for one office, provider and service date.
    /// `date` uses the portal's `MM/DD/YYYY` form.
    ///
    /// Parameters are validated before any session is negotiated; bad
    /// input never generates traffic.
    pub async fn list_appointments(
        &self,
        date: &str,
        office_id: &str,
        provider_id: &str,
    ) -> Result<Vec<Appointment>, OperationError> {
        const OP: &str = "list_appointments";
        let date: ServiceDate = date.parse().map_err(|e| OperationError::request(OP, e))?;
        validate_platform_id("office id", office_id)
            .map_err(|e| OperationError::request(OP, e))?;
        validate_platform_id("provider id", provider_id)
            .map_err(|e| OperationError::request(OP, e))?;
        let html = self
            .run_with_reauth(OP, |session| async move {
                self.orchestrator
                    .appointments_page(&session, &date, office_id, provider_id)
                    .await
            })
            .await?;
        decode::decode_appointments(&html, &date, office_id, provider_id)
            .map_err(|e| OperationError::decode(OP, e))
    }

    /// Fetches a patient's demographic record from the chart summary.
    pub async fn fetch_patient_record(
        &self,
        patient_id: &str,
    ) -> Result<PatientRecord, OperationError> {
        const OP: &str = "fetch_patient_record";
        validate_platform_id("patient id", patient_id)
            .map_err(|e| OperationError::request(OP, e))?;
        let html = self
            .run_with_reauth(OP, |session| async move {
                self.orchestrator.patient_chart(&session, patient_id).await
            })
            .await?;
        decode::decode_patient_chart(&html).map_err(|e| OperationError::decode(OP, e))
    }

    /// Lists a patient's progress-note encounters, newest ordering as the
    /// portal reports it.
    pub async fn list_progress_note_encounters(
        &self,
        patient_id: &str,
    ) -> Result<Vec<EncounterSummary>, OperationError> {
        const OP: &str = "list_progress_note_encounters";
        validate_platform_id("patient id", patient_id)
            .map_err(|e| OperationError::request(OP, e))?;
        let html = self
            .run_with_reauth(OP, |session| async move {
                self.orchestrator
                    .progress_notes_page(&session, patient_id)
                    .await
            })
            .await?;
        decode::decode_encounter_list(&html).map_err(|e| OperationError::decode(OP, e))
    }

    /// Fetches one progress-note document. A well-formed bridge reply
    /// that reports a failure (a locked or missing record) surfaces as a
    /// platform rejection, not a decode error.
    pub async fn fetch_progress_note(
        &self,
        patient_id: &str,
        encounter_id: &str,
    ) -> Result<ProgressNote, OperationError> {
        const OP: &str = "fetch_progress_note";
        validate_platform_id("patient id", patient_id)
            .map_err(|e| OperationError::request(OP, e))?;
        validate_platform_id("encounter id", encounter_id)
            .map_err(|e| OperationError::request(OP, e))?;
        let body = self
            .run_with_reauth(OP, |session| async move {
                self.orchestrator
                    .progress_note_document(&session, patient_id, encounter_id)
                    .await
            })
            .await?;
        match decode::decode_bridge_envelope(&body).map_err(|e| OperationError::decode(OP, e))? {
            BridgeOutcome::Document(document) => Ok(ProgressNote {
                encounter_id: encounter_id.to_string(),
                patient_id: patient_id.to_string(),
                document,
            }),
            BridgeOutcome::Failed(message) => Err(OperationError::request(
                OP,
                RequestError::platform_rejected(message),
            )),
        }
    }

    /// Files a new progress note and returns the encounter the portal
    /// allocated for it.
    pub async fn create_progress_note(
        &self,
        input: &ProgressNoteInput,
    ) -> Result<CreatedEncounter, OperationError> {
        const OP: &str = "create_progress_note";
        input
            .validate()
            .map_err(|e| OperationError::request(OP, e))?;
        let encounter_id = self
            .run_with_reauth(OP, |session| async move {
                self.orchestrator.create_note(&session, input).await
            })
            .await?;
        Ok(CreatedEncounter::created(encounter_id))
    }

    /// Runs an operation against the current session, negotiating one
    /// first if none is held. Operations serialize on the client-wide
    /// lock. On a session-expired failure the session is renegotiated
    /// and the operation replayed once; a second expiry in the same call
    /// is reported as a persistent session failure.
    async fn run_with_reauth<T, F, Fut>(
        &self,
        operation: &'static str,
        run: F,
    ) -> Result<T, OperationError>
    where
        F: Fn(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let _serialized = self.operation.lock().await;
        let session = self
            .current_or_new_session()
            .await
            .map_err(|e| OperationError::auth(operation, e))?;
        match run(session.clone()).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_session_expired() => {
                tracing::info!(
                    operation,
                    session_age_s = session.age().whole_seconds(),
                    "session expired mid-operation, renegotiating"
                );
                let fresh = self
                    .renegotiate()
                    .await
                    .map_err(|e| OperationError::auth(operation, e))?;
                match run(fresh).await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_session_expired() => {
                        tracing::warn!(operation, "fresh session rejected as well");
                        Err(OperationError::persistent_session_failure(operation))
                    }
                    Err(err) => Err(OperationError::request(operation, err)),
                }
            }
            Err(err) => Err(OperationError::request(operation, err)),
        }
    }

    async fn current_or_new_session(&self) -> Result<SessionHandle, AuthError> {
        let mut state = self.state.lock().await;
        if let Some(session) = &state.session {
            return Ok(session.clone());
        }
        let credentials = state
            .credentials
            .clone()
            .ok_or_else(|| AuthError::invalid_credentials("no credentials configured"))?;
        let session = self.negotiator.authenticate(&credentials).await?;
        state.session = Some(session.clone());
        Ok(session)
    }

    /// Replaces a stale session with a freshly negotiated one.
    async fn renegotiate(&self) -> Result<SessionHandle, AuthError> {
        let mut state = self.state.lock().await;
        state.session = None;
        let credentials = state
            .credentials
            .clone()
            .ok_or_else(|| AuthError::invalid_credentials("no credentials configured"))?;
        let session = self.negotiator.authenticate(&credentials).await?;
        state.session = Some(session.clone());
        Ok(session)
    }
}
