//! Request orchestration for authenticated operations.
//!
//! This layer owns the portal's request grammar: page paths, header
//! profiles, postback sequencing, the session-expiry signature and status
//! classification. It hands raw response bodies to the decoders and never
//! interprets markup beyond what a request needs (form state, tokens).

use crate::config::ClientConfig;
use crate::decode;
use crate::forms;
use crate::session::SessionHandle;
use crate::transport::{Exchange, ExchangeBody, PlatformResponse, TransportError};
use allybridge_core::ProgressNoteInput;
use allybridge_core::ServiceDate;
use allybridge_core::error::RequestError;
use indexmap::IndexMap;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, REFERER};
use std::sync::LazyLock;
use url::Url;

const SCHEDULE_PATH: &str = "Appointments/ViewAppointments.aspx?Tab=A";
const CHART_PATH: &str = "PatientCharts/PatientChart_Summary.aspx";
const PROGRESS_NOTES_PATH: &str = "PatientCharts/PatientChart_ProgressNotes.aspx";
const EDIT_NOTE_PATH: &str = "PatientCharts/PatientChart_EditNote.aspx";
const BRIDGE_PATH: &str = "CommonUserControls/Ajax/WebAPI/Api.aspx";

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
     image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9";
const AJAX_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const LANGUAGE: &str = "en-US,en;q=0.9";
const FORM_URLENCODED_UTF8: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Substrings identifying the login flow in a URL or `Location` target.
/// Seeing one mid-operation means the portal silently dropped the session.
const LOGIN_MARKERS: [&str; 2] = ["login.aspx", "auth0bridge"];

static EID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]EID=([^&#]+)").unwrap());

pub(crate) fn is_login_marker(target: &str) -> bool {
    let target = target.to_ascii_lowercase();
    LOGIN_MARKERS.iter().any(|marker| target.contains(marker))
}

/// Joins a path-and-query onto the portal root. The root carries no
/// trailing slash; one is inserted so its last segment is kept.
pub(crate) fn portal_url(base: &Url, path_and_query: &str) -> Result<Url, url::ParseError> {
    let mut absolute = base.as_str().trim_end_matches('/').to_string();
    absolute.push('/');
    absolute.push_str(path_and_query);
    Url::parse(&absolute)
}

/// Browser-like headers for plain page navigation.
pub(crate) fn default_headers(referer: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGE));
    if let Some(referer) = referer
        && let Ok(value) = HeaderValue::from_str(referer)
    {
        headers.insert(REFERER, value);
    }
    headers
}

/// Headers for AJAX bridge calls: the XMLHttpRequest marker plus the
/// anti-forgery token the bridge validates.
fn ajax_headers(referer: Option<&str>, token: &str) -> Result<HeaderMap, RequestError> {
    let mut headers = default_headers(referer);
    headers.insert(ACCEPT, HeaderValue::from_static(AJAX_ACCEPT));
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    let token = HeaderValue::from_str(token).map_err(|_| {
        RequestError::platform_rejected("verification token is not a valid header value")
    })?;
    headers.insert(HeaderName::from_static("x-oa-auth-token"), token);
    Ok(headers)
}

fn form_body(fields: IndexMap<String, String>) -> ExchangeBody {
    ExchangeBody::Form(fields.into_iter().collect())
}

fn map_transport(e: TransportError) -> RequestError {
    match e {
        TransportError::TooManyRedirects { .. } => RequestError::platform_rejected(e.to_string()),
        other => RequestError::network_failure(other.to_string()),
    }
}

/// Applies the expiry signature and status classification to a finished
/// exchange: a login marker in any redirect hop, an unfollowed redirect's
/// `Location` or the final URL means the session is gone; any remaining
/// non-2xx status is a platform rejection.
fn classify(response: PlatformResponse) -> Result<PlatformResponse, RequestError> {
    for hop in &response.redirect_hops {
        if is_login_marker(hop) {
            tracing::debug!(target = %hop, "redirected into the login flow");
            return Err(RequestError::session_expired(hop.clone()));
        }
    }
    if response.status.is_redirection()
        && let Some(location) = &response.location
        && is_login_marker(location)
    {
        return Err(RequestError::session_expired(location.clone()));
    }
    if is_login_marker(response.final_url.as_str()) {
        return Err(RequestError::session_expired(response.final_url.to_string()));
    }
    if !response.status.is_success() {
        return Err(RequestError::platform_rejected_with_status(
            response.status.as_u16(),
            format!("portal returned status {}", response.status),
        ));
    }
    Ok(response)
}

/// Drives the per-operation request sequences against a live session.
pub(crate) struct RequestOrchestrator {
    config: ClientConfig,
    base: Url,
}

impl RequestOrchestrator {
    pub(crate) fn new(config: ClientConfig, base: Url) -> Self {
        Self { config, base }
    }

    fn url(&self, path_and_query: &str) -> Result<Url, RequestError> {
        portal_url(&self.base, path_and_query)
            .map_err(|e| RequestError::invalid_params(format!("unbuildable portal URL: {e}")))
    }

    async fn fetch_page(
        &self,
        session: &SessionHandle,
        path_and_query: &str,
        referer: Option<&str>,
    ) -> Result<PlatformResponse, RequestError> {
        let mut exchange = Exchange::get(self.url(path_and_query)?);
        exchange.headers = default_headers(referer);
        exchange.attempts = self.config.max_attempts;
        let response = session
            .transport()
            .execute(&exchange)
            .await
            .map_err(map_transport)?;
        classify(response)
    }

    /// Navigates the schedule to the requested date and returns the page
    /// for that day: GET the schedule, post back the date-change with the
    /// office and provider selections.
    ///
    /// Parameters are validated by the facade before a session is even
    /// negotiated; this layer trusts them.
    pub(crate) async fn appointments_page(
        &self,
        session: &SessionHandle,
        date: &ServiceDate,
        office_id: &str,
        provider_id: &str,
    ) -> Result<String, RequestError> {
        let schedule = self.fetch_page(session, SCHEDULE_PATH, None).await?;
        let payload = forms::schedule_postback(&schedule.body, date, office_id, provider_id);

        let mut postback = Exchange::post(self.url(SCHEDULE_PATH)?);
        postback.headers = default_headers(Some(schedule.final_url.as_str()));
        postback.body = Some(form_body(payload));
        postback.attempts = self.config.max_attempts;
        let response = session
            .transport()
            .execute(&postback)
            .await
            .map_err(map_transport)?;
        Ok(classify(response)?.body)
    }

    /// Fetches the chart summary page, rejecting the portal's inline
    /// "not found" and error renderings.
    pub(crate) async fn patient_chart(
        &self,
        session: &SessionHandle,
        patient_id: &str,
    ) -> Result<String, RequestError> {
        let path = format!("{CHART_PATH}?Tab=C&PageAction=Summary&PID={patient_id}");
        let page = self.fetch_page(session, &path, None).await?;

        let lowered = page.body.to_lowercase();
        if lowered.contains("patient could not be found") || lowered.contains("error has occurred")
        {
            return Err(RequestError::platform_rejected(format!(
                "patient {patient_id} not found or the chart page reported an error"
            )));
        }
        Ok(page.body)
    }

    /// Fetches the progress-notes tab listing a patient's encounters.
    pub(crate) async fn progress_notes_page(
        &self,
        session: &SessionHandle,
        patient_id: &str,
    ) -> Result<String, RequestError> {
        let path = format!(
            "{PROGRESS_NOTES_PATH}?PageAction=ProgressNotes%2CPatientCharts_ProgressNotes_Add\
             &Tab=C&PID={patient_id}&Scope=&Date1=&Date2="
        );
        let referer = self.url(&format!("{CHART_PATH}?PID={patient_id}"))?;
        let page = self
            .fetch_page(session, &path, Some(referer.as_str()))
            .await?;
        Ok(page.body)
    }

    /// Fetches one progress-note document through the AJAX bridge.
    ///
    /// The bridge insists on the patient's age in the query and a fresh
    /// anti-forgery token, both of which only the chart page provides, so
    /// the chart is fetched and read first.
    pub(crate) async fn progress_note_document(
        &self,
        session: &SessionHandle,
        patient_id: &str,
        encounter_id: &str,
    ) -> Result<String, RequestError> {
        let chart = self.patient_chart(session, patient_id).await?;
        let Some(token) = forms::verification_token(&chart) else {
            return Err(RequestError::platform_rejected(
                "chart page carries no verification token for the bridge call",
            ));
        };
        let record = decode::decode_patient_chart(&chart).map_err(|e| {
            RequestError::platform_rejected(format!("chart page unusable for the bridge call: {e}"))
        })?;
        let (age_years, age_months, age_days) =
            decode::parse_age_details(record.age_details.as_deref());

        let inner = format!(
            "v1/encounters/{encounter_id}/patients/{patient_id}/viewprogressnote\
             ?ageYears={age_years}&ageMonths={age_months}&ageDays={age_days}"
        );
        let referer = self.url(&format!("{CHART_PATH}?PID={patient_id}"))?;
        let bridge_url = self.url(&format!("{BRIDGE_PATH}?method=GET&url={inner}"))?;
        let mut bridge = Exchange::post(bridge_url);
        bridge.headers = ajax_headers(Some(referer.as_str()), &token)?;
        bridge.body = Some(ExchangeBody::Raw {
            content_type: FORM_URLENCODED_UTF8,
            payload: forms::bridge_read_envelope(&inner),
        });
        bridge.attempts = self.config.max_attempts;
        let response = session
            .transport()
            .execute(&bridge)
            .await
            .map_err(map_transport)?;
        Ok(classify(response)?.body)
    }

    /// Files a new progress note: open the editor, build the postback,
    /// run the pre-submission validation call, submit once.
    ///
    /// The submission POST is never retried and its redirect is left
    /// unfollowed; the new encounter id only exists in the `Location`
    /// header.
    pub(crate) async fn create_note(
        &self,
        session: &SessionHandle,
        input: &ProgressNoteInput,
    ) -> Result<String, RequestError> {
        let editor_path = format!(
            "{EDIT_NOTE_PATH}?PageAction=AddNote&SoapLayoutID={}&Tab=C&PID={}&Scope=&Date1=&Date2=",
            self.config.soap_layout_id, input.patient_id
        );
        let chart_referer = self.url(&format!("{CHART_PATH}?PID={}", input.patient_id))?;
        let editor = self
            .fetch_page(session, &editor_path, Some(chart_referer.as_str()))
            .await?;
        let editor_url = self.url(&editor_path)?;

        let (payload, token) = forms::note_postback(&editor.body, input)?;

        let precheck_inner = format!(
            "v1/patients/patientInformation/patientID/{}",
            input.patient_id
        );
        let mut precheck =
            Exchange::post(self.url(&format!("{BRIDGE_PATH}?method=POST&url={precheck_inner}"))?);
        precheck.headers = ajax_headers(Some(editor_url.as_str()), &token)?;
        precheck.body = Some(ExchangeBody::Form(forms::precheck_form(
            &precheck_inner,
            &input.diagnosis_codes,
            &input.procedure_codes,
        )));
        let response = session
            .transport()
            .execute(&precheck)
            .await
            .map_err(map_transport)?;
        classify(response)?;
        tracing::debug!(patient_id = %input.patient_id, "pre-submission validation passed");

        let pre_allocated = payload
            .get("ctl00$phFolderContent$ucSOAPNote$EncounterID")
            .cloned();
        let mut submit = Exchange::post(editor_url.clone());
        submit.headers = default_headers(Some(editor_url.as_str()));
        submit.body = Some(form_body(payload));
        submit.follow_redirects = false;
        let outcome = session
            .transport()
            .execute(&submit)
            .await
            .map_err(map_transport)?;

        if outcome.status.is_redirection()
            && let Some(location) = &outcome.location
        {
            if is_login_marker(location) {
                return Err(RequestError::session_expired(location.clone()));
            }
            if let Some(eid) = EID_RE.captures(location).map(|c| c[1].to_string()) {
                tracing::info!(encounter_id = %eid, "progress note accepted");
                return Ok(eid);
            }
            return Err(RequestError::platform_rejected(match pre_allocated {
                Some(id) if !id.is_empty() => format!(
                    "note submission redirected without an encounter id \
                     (editor had pre-allocated id {id}): {location}"
                ),
                _ => format!("note submission redirected without an encounter id: {location}"),
            }));
        }
        Err(RequestError::platform_rejected_with_status(
            outcome.status.as_u16(),
            "note submission did not produce the expected redirect",
        ))
    }
}
