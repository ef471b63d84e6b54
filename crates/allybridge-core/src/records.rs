//! Typed records exchanged with the platform.
//!
//! Decoders produce these; the facade returns them. A record is either
//! complete or never built, so every struct here can be trusted not to
//! carry half-decoded state.

use crate::error::RequestError;
use crate::params::{ServiceDate, validate_platform_id};
use serde::{Deserialize, Serialize};

/// How many diagnosis / procedure slots the note form exposes.
pub const MAX_CODE_SLOTS: usize = 12;

/// Reference to the patient a schedule row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRef {
    pub id: String,
    pub name: String,
}

/// One decoded row of the daily appointment schedule.
///
/// `service_date`, `office_id` and `provider_id` are stamped from the
/// validated request parameters; the schedule page does not restate them
/// per row. `time_slot` is the normalized `HH:MM AM|PM` label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub appointment_id: String,
    pub service_date: ServiceDate,
    pub office_id: String,
    pub provider_id: String,
    pub patient: PatientRef,
    pub time_slot: String,
    pub status: String,
    pub visit_length_minutes: String,
    pub date_of_birth: String,
    pub home_phone: String,
    pub provider_name: String,
    pub reason_for_visit: String,
}

/// Decoded patient chart summary header.
///
/// The first five fields are required by the decoder; everything else is
/// present only when the chart displays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub sex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    /// The `Age: ...` remainder of the DOB span, e.g. `25 yrs 3 mos`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethnicity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_care_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_pharmacy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_ally_id: Option<String>,
}

/// One row of the progress-note encounter list, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterSummary {
    pub encounter_id: String,
    pub encounter_date: String,
    pub note_type: String,
}

/// A full progress-note document fetched through the AJAX bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNote {
    pub encounter_id: String,
    pub patient_id: String,
    /// The note document as the bridge returns it.
    pub document: serde_json::Value,
}

/// Confirmation that the platform accepted a note submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEncounter {
    pub encounter_id: String,
    pub status: String,
}

impl CreatedEncounter {
    /// Builds the confirmation for a freshly created encounter.
    #[must_use]
    pub fn created(encounter_id: impl Into<String>) -> Self {
        Self {
            encounter_id: encounter_id.into(),
            status: "created".to_string(),
        }
    }
}

/// Encounter metadata required to file a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterMeta {
    pub date: ServiceDate,
    pub treating_provider_id: String,
    pub office_id: String,
    /// Platform encounter-type list value, e.g. `1` for an office visit.
    pub encounter_type: String,
}

/// One diagnosis line (ICD-10) for the note form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisCode {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

/// One procedure line (CPT) for the note form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureCode {
    pub code: String,
    #[serde(default)]
    pub description: String,
    /// Place-of-service code.
    #[serde(default)]
    pub pos: String,
    #[serde(default)]
    pub fee: String,
    #[serde(default)]
    pub units: String,
}

/// Per-system review-of-systems entries, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewOfSystems {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constitutional: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neck: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ears: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mouth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardiovascular: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respiratory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gastrointestinal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genitourinary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub musculoskeletal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integumentary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neurological: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psychiatric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endocrine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hematologic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergic: Option<String>,
}

/// Per-system physical-exam entries, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicalExam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_ent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neck: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respiratory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardiovascular: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lungs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abdomen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genitourinary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lymphatic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub musculoskeletal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extremities: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neurological: Option<String>,
}

/// Objective test-result entries, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imaging: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
}

/// Free-text SOAP sections of a progress note; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SoapSections {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chief_complaint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_of_present_illness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onset_date: Option<ServiceDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surgical_history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_medications: Option<String>,
    pub ros: ReviewOfSystems,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    pub physical_exam: PhysicalExam,
    pub test_results: TestResults,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_notes_icd9: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedures: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub administered_medication: Option<String>,
}

macro_rules! visit_fields {
    ($f:expr, $( $name:literal => $field:expr ),+ $(,)?) => {
        $( if let Some(v) = $field.as_deref() { $f($name, v); } )+
    };
}

impl SoapSections {
    /// Visits every populated free-text section as a
    /// (logical name, value) pair. The onset date is not visited; it is a
    /// structured field the form builder splits itself.
    pub fn for_each_populated<'a>(&'a self, mut f: impl FnMut(&'static str, &'a str)) {
        visit_fields!(
            f,
            "chief_complaint" => self.chief_complaint,
            "history_of_present_illness" => self.history_of_present_illness,
            "medical_history" => self.medical_history,
            "surgical_history" => self.surgical_history,
            "family_history" => self.family_history,
            "social_history" => self.social_history,
            "allergies" => self.allergies,
            "current_medications" => self.current_medications,
            "ros_constitutional" => self.ros.constitutional,
            "ros_head" => self.ros.head,
            "ros_neck" => self.ros.neck,
            "ros_eyes" => self.ros.eyes,
            "ros_ears" => self.ros.ears,
            "ros_nose" => self.ros.nose,
            "ros_mouth" => self.ros.mouth,
            "ros_throat" => self.ros.throat,
            "ros_cardiovascular" => self.ros.cardiovascular,
            "ros_respiratory" => self.ros.respiratory,
            "ros_gastrointestinal" => self.ros.gastrointestinal,
            "ros_genitourinary" => self.ros.genitourinary,
            "ros_musculoskeletal" => self.ros.musculoskeletal,
            "ros_integumentary" => self.ros.integumentary,
            "ros_neurological" => self.ros.neurological,
            "ros_psychiatric" => self.ros.psychiatric,
            "ros_endocrine" => self.ros.endocrine,
            "ros_hematologic" => self.ros.hematologic,
            "ros_allergic" => self.ros.allergic,
            "objective" => self.objective,
            "pe_general" => self.physical_exam.general,
            "pe_head_ent" => self.physical_exam.head_ent,
            "pe_neck" => self.physical_exam.neck,
            "pe_respiratory" => self.physical_exam.respiratory,
            "pe_cardiovascular" => self.physical_exam.cardiovascular,
            "pe_lungs" => self.physical_exam.lungs,
            "pe_chest" => self.physical_exam.chest,
            "pe_heart" => self.physical_exam.heart,
            "pe_abdomen" => self.physical_exam.abdomen,
            "pe_genitourinary" => self.physical_exam.genitourinary,
            "pe_lymphatic" => self.physical_exam.lymphatic,
            "pe_musculoskeletal" => self.physical_exam.musculoskeletal,
            "pe_skin" => self.physical_exam.skin,
            "pe_extremities" => self.physical_exam.extremities,
            "pe_neurological" => self.physical_exam.neurological,
            "tr_ecg" => self.test_results.ecg,
            "tr_imaging" => self.test_results.imaging,
            "tr_lab" => self.test_results.lab,
            "assessment_notes" => self.assessment_notes,
            "assessment_notes_icd9" => self.assessment_notes_icd9,
            "plan_notes" => self.plan_notes,
            "patient_instructions" => self.patient_instructions,
            "procedures" => self.procedures,
            "administered_medication" => self.administered_medication,
        );
    }

    /// Returns `true` when no section carries any content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let mut any = false;
        self.for_each_populated(|_, _| any = true);
        !any && self.onset_date.is_none()
    }
}

/// Everything needed to file a new progress note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNoteInput {
    pub patient_id: String,
    pub encounter: EncounterMeta,
    #[serde(default)]
    pub soap: SoapSections,
    #[serde(default)]
    pub diagnosis_codes: Vec<DiagnosisCode>,
    #[serde(default)]
    pub procedure_codes: Vec<ProcedureCode>,
}

impl ProgressNoteInput {
    /// Checks the input against the note form's requirements. Runs
    /// before any network traffic.
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_platform_id("patient id", &self.patient_id)?;
        validate_platform_id("treating provider id", &self.encounter.treating_provider_id)?;
        validate_platform_id("office id", &self.encounter.office_id)?;
        validate_platform_id("encounter type", &self.encounter.encounter_type)?;
        if self.soap.is_empty() {
            return Err(RequestError::invalid_params(
                "at least one SOAP section must be populated",
            ));
        }
        if self.diagnosis_codes.len() > MAX_CODE_SLOTS {
            return Err(RequestError::invalid_params(format!(
                "the note form has {MAX_CODE_SLOTS} diagnosis slots, got {}",
                self.diagnosis_codes.len()
            )));
        }
        if self.procedure_codes.len() > MAX_CODE_SLOTS {
            return Err(RequestError::invalid_params(format!(
                "the note form has {MAX_CODE_SLOTS} procedure slots, got {}",
                self.procedure_codes.len()
            )));
        }
        Ok(())
    }
}
