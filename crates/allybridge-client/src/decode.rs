//! Decoders for portal responses.
//!
//! Markup shapes are part of the portal contract: a page that does not
//! match is an error, never a partially decoded record. Each decoder
//! first rejects login pages outright so that an expired session that
//! slipped past the orchestration layer cannot be misread as data.

use allybridge_core::error::DecodeError;
use allybridge_core::records::{EncounterSummary, PatientRecord, PatientRef};
use allybridge_core::{Appointment, ServiceDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Id prefix of the chart header spans carrying patient details.
const CHART_SPAN_PREFIX: &str = "ctl00_phFolderContent_myPatientHeader_lbl";

/// Separates date of birth from the age remainder in the chart header.
const AGE_MARKER: &str = " - Age: ";

static LOGIN_INPUT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name=\"txtPassword\"]").unwrap());
static APPT_TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div#divDaily table.tblAppts").unwrap());
static THEAD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("thead").unwrap());
static BODY_ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody > tr").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static CHART_SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[id^=\"ctl00_phFolderContent_myPatientHeader_lbl\"]").unwrap()
});
static NOTE_ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.tblNotes tr[data-eid]").unwrap());

static MINUTES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":(\d+)").unwrap());
static APPT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]ID=([^&#]+)").unwrap());
static STR_IDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var\s+strIDs\s*=\s*'([^']*)'").unwrap());
static AGE_YEARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*yrs").unwrap());
static AGE_MONTHS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*mos").unwrap());

/// Decodes the daily schedule table into appointment records.
///
/// The hour label only appears on the first row of each hour block and
/// carries forward. Rows without a patient link (schedule blocks, filler
/// rows) are skipped; rows with fewer than 15 cells are grid chrome.
pub(crate) fn decode_appointments(
    html: &str,
    date: &ServiceDate,
    office_id: &str,
    provider_id: &str,
) -> Result<Vec<Appointment>, DecodeError> {
    let doc = Html::parse_document(html);
    ensure_not_login_page(&doc, "schedule page")?;

    let Some(table) = doc.select(&APPT_TABLE_SEL).next() else {
        return Err(DecodeError::unexpected_response_shape(
            "appointment table not found on schedule page",
        ));
    };
    if table.select(&THEAD_SEL).next().is_none() {
        return Err(DecodeError::unexpected_response_shape(
            "appointment table has no header row",
        ));
    }

    let mut appointments = Vec::new();
    let mut current_hour = String::new();

    for row in table.select(&BODY_ROW_SEL) {
        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();
        if cells.len() < 15 {
            continue;
        }

        let hour_label = cell_text(&cells[0]);
        if !hour_label.is_empty() {
            current_hour = hour_label;
        }

        let Some(anchor) = cells[2]
            .select(&ANCHOR_SEL)
            .next()
            .filter(|a| !cell_text(a).is_empty())
        else {
            continue;
        };
        let patient_name = cell_text(&anchor);

        let appointment_id = anchor
            .value()
            .attr("href")
            .and_then(|href| APPT_ID_RE.captures(href))
            .map(|c| c[1].to_string())
            .ok_or_else(|| DecodeError::missing_field("appointment", "appointment_id"))?;

        if current_hour.is_empty() {
            return Err(DecodeError::missing_field("appointment", "time_slot"));
        }
        let minutes = MINUTES_RE
            .captures(&cell_text(&cells[1]))
            .map(|c| format!("{:0>2}", &c[1]))
            .unwrap_or_else(|| "00".to_string());
        let suffix = if cells[1].inner_html().to_lowercase().contains("<small>pm</small>") {
            "PM"
        } else {
            "AM"
        };
        let time_slot = format!("{current_hour:0>2}:{minutes} {suffix}");

        let patient_id = cell_text(&cells[3]);
        if patient_id.is_empty() {
            return Err(DecodeError::missing_field("appointment", "patient.id"));
        }

        appointments.push(Appointment {
            appointment_id,
            service_date: *date,
            office_id: office_id.to_string(),
            provider_id: provider_id.to_string(),
            patient: PatientRef {
                id: patient_id,
                name: patient_name,
            },
            time_slot,
            visit_length_minutes: cell_text(&cells[4]),
            date_of_birth: cell_text(&cells[5]),
            home_phone: cell_text(&cells[6]),
            provider_name: cell_text(&cells[7]),
            reason_for_visit: cell_text(&cells[8]),
            status: cell_text(&cells[9]),
        });
    }

    Ok(appointments)
}

/// Decodes the chart summary header spans into a patient record.
pub(crate) fn decode_patient_chart(html: &str) -> Result<PatientRecord, DecodeError> {
    let doc = Html::parse_document(html);
    ensure_not_login_page(&doc, "patient chart")?;

    let spans = chart_spans(&doc);
    let required = |suffix: &str, field: &'static str| -> Result<String, DecodeError> {
        spans
            .get(suffix)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| DecodeError::missing_field("patient record", field))
    };
    let optional = |suffix: &str| spans.get(suffix).filter(|v| !v.is_empty()).cloned();

    let dob_raw = required("DOB", "date_of_birth")?;
    let (date_of_birth, age_details) = match dob_raw.split_once(AGE_MARKER) {
        Some((dob, age)) => (dob.trim().to_string(), Some(age.trim().to_string())),
        None => (dob_raw, None),
    };
    if date_of_birth.is_empty() {
        return Err(DecodeError::missing_field("patient record", "date_of_birth"));
    }

    Ok(PatientRecord {
        patient_id: required("PatientID", "patient_id")?,
        first_name: required("FirstName", "first_name")?,
        last_name: required("LastName", "last_name")?,
        date_of_birth,
        sex: required("Gender", "sex")?,
        middle_name: optional("MiddleName"),
        age_details,
        race: optional("Race"),
        ethnicity: optional("Ethnicity"),
        preferred_language: optional("Language"),
        phone: optional("Phone"),
        insurance_name: optional("InsuranceName"),
        insurance_type: optional("InsuranceType"),
        primary_care_provider: optional("PrimaryCareProvider"),
        favorite_pharmacy: optional("FavoritePharmacy"),
        smoke_status: optional("Smoke"),
        alternate_patient_id: optional("AlternatePatientID"),
        patient_ally_id: optional("PatientAllyID"),
    })
}

/// Splits `45 yrs 7 mos` style age details into whole years, months and
/// days. The chart never shows days, so they are always zero.
pub(crate) fn parse_age_details(details: Option<&str>) -> (u32, u32, u32) {
    let Some(details) = details else {
        return (0, 0, 0);
    };
    let years = AGE_YEARS_RE
        .captures(details)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let months = AGE_MONTHS_RE
        .captures(details)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    (years, months, 0)
}

/// Decodes the progress-note tab into encounter summaries.
///
/// The page embeds the authoritative encounter order in a
/// `var strIDs = '...';` script; the visible rows carry the display
/// columns. Every scripted id must have its row.
pub(crate) fn decode_encounter_list(html: &str) -> Result<Vec<EncounterSummary>, DecodeError> {
    let doc = Html::parse_document(html);
    ensure_not_login_page(&doc, "progress-note list")?;

    let ids: Vec<&str> = STR_IDS_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map_or("", |m| m.as_str())
        .split(';')
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows = HashMap::new();
    for row in doc.select(&NOTE_ROW_SEL) {
        let Some(eid) = row.value().attr("data-eid") else {
            continue;
        };
        let cells: Vec<String> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .map(|el| cell_text(&el))
            .collect();
        let date = cells.first().cloned().unwrap_or_default();
        let note_type = cells.get(1).cloned().unwrap_or_default();
        rows.insert(eid.to_string(), (date, note_type));
    }

    ids.into_iter()
        .map(|id| {
            let (encounter_date, note_type) = rows.get(id).cloned().ok_or_else(|| {
                DecodeError::missing_field("encounter summary", format!("row for encounter '{id}'"))
            })?;
            Ok(EncounterSummary {
                encounter_id: id.to_string(),
                encounter_date,
                note_type,
            })
        })
        .collect()
}

/// What the AJAX bridge answered once its envelope is removed.
#[derive(Debug)]
pub(crate) enum BridgeOutcome {
    /// The nested document.
    Document(serde_json::Value),
    /// HTTP said 200 but the bridged API reported a failure.
    Failed(String),
}

/// Unwraps the bridge envelope: a JSON object whose `dt` field is a JSON
/// string carrying the actual document.
pub(crate) fn decode_bridge_envelope(body: &str) -> Result<BridgeOutcome, DecodeError> {
    let envelope: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        DecodeError::unexpected_response_shape(format!("bridge response is not JSON: {e}"))
    })?;
    let Some(dt) = envelope.get("dt").and_then(serde_json::Value::as_str) else {
        return Err(DecodeError::unexpected_response_shape(
            "bridge response carries no 'dt' payload",
        ));
    };
    let document: serde_json::Value = serde_json::from_str(dt).map_err(|e| {
        DecodeError::unexpected_response_shape(format!("bridge 'dt' payload is not JSON: {e}"))
    })?;

    if document.get("Message").and_then(serde_json::Value::as_str) == Some("Fail") {
        let reason = document
            .get("Error")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("bridged API reported a failure")
            .to_string();
        return Ok(BridgeOutcome::Failed(reason));
    }
    Ok(BridgeOutcome::Document(document))
}

fn ensure_not_login_page(doc: &Html, context: &str) -> Result<(), DecodeError> {
    if doc.select(&LOGIN_INPUT_SEL).next().is_some() {
        return Err(DecodeError::unexpected_response_shape(format!(
            "received the portal login page instead of the {context}"
        )));
    }
    Ok(())
}

fn chart_spans(doc: &Html) -> HashMap<String, String> {
    let mut spans = HashMap::new();
    for span in doc.select(&CHART_SPAN_SEL) {
        let Some(id) = span.value().id() else {
            continue;
        };
        let Some(suffix) = id.strip_prefix(CHART_SPAN_PREFIX) else {
            continue;
        };
        spans.insert(suffix.to_string(), cell_text(&span));
    }
    spans
}

/// Text of an element with whitespace runs (non-breaking spaces included)
/// collapsed to single spaces and the ends trimmed.
fn cell_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
