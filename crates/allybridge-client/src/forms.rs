//! ASP.NET form scraping and postback payloads.
//!
//! Every mutating page on the portal is a WebForms postback: the page is
//! fetched, its form state is scraped wholesale, and the operation's own
//! fields are overlaid before posting back. Control names are part of the
//! portal contract and are reproduced here verbatim, portal misspellings
//! included.

use allybridge_core::error::RequestError;
use allybridge_core::records::MAX_CODE_SLOTS;
use allybridge_core::{DiagnosisCode, ProcedureCode, ProgressNoteInput, ServiceDate};
use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Id of the single WebForms form every portal page wraps its content in.
pub(crate) const ASP_FORM_ID: &str = "aspnetForm";

/// Anti-forgery token input present on authenticated pages.
pub(crate) const VERIFICATION_TOKEN_FIELD: &str = "__RequestVerificationToken";

const SOAP_PREFIX: &str = "ctl00$phFolderContent$ucSOAPNote$";
const DIAGNOSIS_PREFIX: &str = "ctl00$phFolderContent$ucSOAPNote$ucDiagnosisCodes$";
const CPT_PREFIX: &str = "ctl00$phFolderContent$ucSOAPNote$ucCPT$SoapNoteCPT$";
const SCHEDULE_PREFIX: &str = "ctl00$phFolderContent$Appointments$";

/// ViewState fields the portal refuses a postback without.
const CRITICAL_ASP_FIELDS: [&str; 4] = [
    "__VIEWSTATE",
    "__VIEWSTATEGENERATOR",
    "__EVENTVALIDATION",
    VERIFICATION_TOKEN_FIELD,
];

static FORM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static INPUT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input[name]").unwrap());
static SELECT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("select[name]").unwrap());
static TEXTAREA_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("textarea[name]").unwrap());
static OPTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").unwrap());
static TOKEN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name=\"__RequestVerificationToken\"]").unwrap());

/// Scrapes every named field of the given form the way a browser would
/// submit it: unchecked radios and checkboxes are dropped, checked
/// checkboxes without a value submit `on`, selects submit the selected
/// option (or the first one), textareas submit their content.
///
/// Returns an empty map when the form is not on the page.
pub(crate) fn form_fields(html: &str, form_id: &str) -> IndexMap<String, String> {
    let doc = Html::parse_document(html);
    let Some(form) = find_form(&doc, form_id) else {
        tracing::debug!(form = form_id, "form not found on page");
        return IndexMap::new();
    };
    collect_fields(form)
}

fn find_form<'a>(doc: &'a Html, form_id: &str) -> Option<ElementRef<'a>> {
    let mut by_name = None;
    for form in doc.select(&FORM_SEL) {
        if form.value().id() == Some(form_id) {
            return Some(form);
        }
        if by_name.is_none() && form.value().attr("name") == Some(form_id) {
            by_name = Some(form);
        }
    }
    by_name
}

fn collect_fields(form: ElementRef<'_>) -> IndexMap<String, String> {
    let mut fields = IndexMap::new();

    for input in form.select(&INPUT_SEL) {
        let Some(name) = input.value().attr("name") else {
            continue;
        };
        let value = input.value().attr("value").unwrap_or_default();
        match input.value().attr("type") {
            Some("radio") => {
                if input.value().attr("checked").is_some() {
                    fields.insert(name.to_string(), value.to_string());
                }
            }
            Some("checkbox") => {
                if input.value().attr("checked").is_some() {
                    let value = if value.is_empty() { "on" } else { value };
                    fields.insert(name.to_string(), value.to_string());
                }
            }
            _ => {
                fields.insert(name.to_string(), value.to_string());
            }
        }
    }

    for select in form.select(&SELECT_SEL) {
        let Some(name) = select.value().attr("name") else {
            continue;
        };
        let selected = select
            .select(&OPTION_SEL)
            .find(|o| o.value().attr("selected").is_some())
            .and_then(|o| o.value().attr("value"));
        let value = selected
            .or_else(|| {
                select
                    .select(&OPTION_SEL)
                    .next()
                    .and_then(|o| o.value().attr("value"))
            })
            .unwrap_or_default();
        fields.insert(name.to_string(), value.to_string());
    }

    for textarea in form.select(&TEXTAREA_SEL) {
        let Some(name) = textarea.value().attr("name") else {
            continue;
        };
        let content: String = textarea.text().collect();
        fields.insert(name.to_string(), content);
    }

    fields
}

/// Pulls the anti-forgery token from anywhere on the page, not just the
/// main form. Chart pages render it outside `aspnetForm`.
pub(crate) fn verification_token(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&TOKEN_SEL)
        .filter_map(|input| input.value().attr("value"))
        .find(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

/// Builds the date-change postback for the schedule page: the scraped form
/// state with the target date, office and provider overlaid.
pub(crate) fn schedule_postback(
    html: &str,
    date: &ServiceDate,
    office_id: &str,
    provider_id: &str,
) -> IndexMap<String, String> {
    let mut fields = form_fields(html, ASP_FORM_ID);

    for name in CRITICAL_ASP_FIELDS {
        if !fields.contains_key(name) {
            tracing::warn!(field = name, "schedule page is missing a ViewState field");
            fields.insert(name.to_string(), String::new());
        }
    }
    for name in ["__EVENTTARGET", "__EVENTARGUMENT", "__LASTFOCUS"] {
        fields.entry(name.to_string()).or_default();
    }

    fields.insert(
        format!("{SCHEDULE_PREFIX}GoToDate$Month"),
        date.month_field(),
    );
    fields.insert(format!("{SCHEDULE_PREFIX}GoToDate$Day"), date.day_field());
    fields.insert(format!("{SCHEDULE_PREFIX}GoToDate$Year"), date.year_field());
    fields.insert(format!("{SCHEDULE_PREFIX}hdnGoToDate"), date.to_string());
    // The trailing and leading spaces are part of the button's server-side
    // value and must survive.
    fields.insert(
        format!("{SCHEDULE_PREFIX}btnGotoDate"),
        " Go To Date ".to_string(),
    );
    fields.insert(
        format!("{SCHEDULE_PREFIX}lstOffice"),
        office_id.to_string(),
    );
    fields.insert(
        format!("{SCHEDULE_PREFIX}lstProvider"),
        provider_id.to_string(),
    );
    fields.insert("SelectedOffice".to_string(), office_id.to_string());
    fields.insert("SelectedProvider".to_string(), provider_id.to_string());

    fields
}

/// Builds the note-editor postback: scraped editor state plus the SOAP
/// sections, encounter details and code slots. Returns the payload and
/// the page's anti-forgery token.
pub(crate) fn note_postback(
    html: &str,
    input: &ProgressNoteInput,
) -> Result<(IndexMap<String, String>, String), RequestError> {
    let mut fields = form_fields(html, ASP_FORM_ID);

    if fields.get("__VIEWSTATE").is_none_or(String::is_empty) {
        return Err(RequestError::platform_rejected(
            "note editor page carried no __VIEWSTATE; the form cannot be posted back",
        ));
    }
    let token = match fields.get(VERIFICATION_TOKEN_FIELD) {
        Some(token) if !token.is_empty() => token.clone(),
        _ => {
            return Err(RequestError::platform_rejected(
                "note editor page carried no verification token",
            ));
        }
    };

    input.soap.for_each_populated(|name, value| {
        if let Some(suffix) = soap_control(name) {
            fields.insert(format!("{SOAP_PREFIX}{suffix}"), value.to_string());
        }
    });
    if let Some(onset) = &input.soap.onset_date {
        fields.insert(format!("{SOAP_PREFIX}OnsetDate$Month"), onset.month_field());
        fields.insert(format!("{SOAP_PREFIX}OnsetDate$Day"), onset.day_field());
        fields.insert(format!("{SOAP_PREFIX}OnsetDate$Year"), onset.year_field());
    }

    let encounter = &input.encounter;
    fields.insert(
        format!("{SOAP_PREFIX}EncounterDate$Month"),
        encounter.date.month_field(),
    );
    fields.insert(
        format!("{SOAP_PREFIX}EncounterDate$Day"),
        encounter.date.day_field(),
    );
    fields.insert(
        format!("{SOAP_PREFIX}EncounterDate$Year"),
        encounter.date.year_field(),
    );
    fields.insert(
        format!("{SOAP_PREFIX}lstProvider"),
        encounter.treating_provider_id.clone(),
    );
    fields.insert(
        format!("{SOAP_PREFIX}lstOffice"),
        encounter.office_id.clone(),
    );
    fields.insert(
        format!("{SOAP_PREFIX}lstEncounterType"),
        encounter.encounter_type.clone(),
    );

    // Diagnosis slots are 1-based. Only filled slots are overlaid; the
    // scraped form keeps whatever the page rendered for the rest.
    for (i, diagnosis) in input.diagnosis_codes.iter().enumerate() {
        fields.insert(
            format!("{DIAGNOSIS_PREFIX}dc_10_{}", i + 1),
            diagnosis.code.clone(),
        );
        fields.insert(
            format!("{DIAGNOSIS_PREFIX}dd_10_{}", i + 1),
            diagnosis.description.clone(),
        );
    }

    overlay_procedure_slots(&mut fields, &input.procedure_codes);

    Ok((fields, token))
}

/// Fills all twelve CPT slots (0-based) and the JSON mirror the editor's
/// script would have maintained. Submissions without the mirror lose
/// their procedure lines server-side.
fn overlay_procedure_slots(fields: &mut IndexMap<String, String>, procedures: &[ProcedureCode]) {
    let mut lines = Vec::new();

    for i in 0..MAX_CODE_SLOTS {
        match procedures.get(i) {
            Some(cpt) => {
                fields.insert(format!("{CPT_PREFIX}EncounterCPTCode{i}"), cpt.code.clone());
                fields.insert(
                    format!("{CPT_PREFIX}EncounterCPTDescription{i}"),
                    cpt.description.clone(),
                );
                fields.insert(format!("{CPT_PREFIX}EncounterCPTPOS{i}"), cpt.pos.clone());
                for modifier in ["A", "B", "C", "D"] {
                    fields.insert(
                        format!("{CPT_PREFIX}EncounterCPTModifier{modifier}{i}"),
                        String::new(),
                    );
                }
                fields.insert(format!("{CPT_PREFIX}EncounterCPTDiagPointer{i}"), String::new());
                fields.insert(format!("{CPT_PREFIX}EncounterCPTFee{i}"), cpt.fee.clone());
                fields.insert(format!("{CPT_PREFIX}EncounterCPTUnit{i}"), cpt.units.clone());
                fields.insert(format!("{CPT_PREFIX}EncounterCPTNdc{i}"), String::new());
                fields.insert(format!("{CPT_PREFIX}NationalDrugCodeId{i}"), String::new());

                lines.push(serde_json::json!({
                    "EncounterCPTLineNumber": (i + 1).to_string(),
                    "EncounterCPTCode": cpt.code,
                    "EncounterCPTDescription": cpt.description,
                    "EncounterCPTPOS": cpt.pos,
                    "EncounterCPTModifierA": "",
                    "EncounterCPTModifierB": "",
                    "EncounterCPTModifierC": "",
                    "EncounterCPTModifierD": "",
                    "EncounterCPTDiagPointer": "",
                    "EncounterCPTFee": cpt.fee,
                    "EncounterCPTUnit": cpt.units,
                    "EncounterCPTNdc": "",
                    "NationalDrugCodeId": 0,
                }));
            }
            None => {
                for field in [
                    "EncounterCPTCode",
                    "EncounterCPTDescription",
                    "EncounterCPTPOS",
                    "EncounterCPTModifierA",
                    "EncounterCPTModifierB",
                    "EncounterCPTModifierC",
                    "EncounterCPTModifierD",
                    "EncounterCPTDiagPointer",
                    "EncounterCPTFee",
                    "EncounterCPTUnit",
                    "EncounterCPTNdc",
                    "NationalDrugCodeId",
                ] {
                    fields.insert(format!("{CPT_PREFIX}{field}{i}"), String::new());
                }
            }
        }
    }

    if !procedures.is_empty() {
        fields.insert(format!("{SOAP_PREFIX}chkPrint_CPT"), "no".to_string());
    }
    fields.insert(
        format!("{SOAP_PREFIX}ucCPT$hdnJsonString"),
        serde_json::Value::Array(lines).to_string(),
    );
    fields.insert(format!("{SOAP_PREFIX}ucCPT$hdnLoadJsonString"), String::new());
    fields.insert(format!("{SOAP_PREFIX}hdnHasClicked"), "1".to_string());
}

/// Maps an API-level SOAP section name onto the editor control it fills.
/// `pe_abdomen` maps onto `O_PE_Adomen`; the misspelling is the portal's.
fn soap_control(name: &str) -> Option<&'static str> {
    let suffix = match name {
        "chief_complaint" => "S_ChiefComplaint",
        "history_of_present_illness" => "S_HOPI_Original",
        "medical_history" => "S_MedicalHistory",
        "surgical_history" => "S_SurgicalHistory",
        "family_history" => "S_FamilyHistory",
        "social_history" => "S_SocialHistory",
        "allergies" => "S_Allergies",
        "current_medications" => "S_Medications",
        "ros_constitutional" => "S_ROS_Constitutional",
        "ros_head" => "S_ROS_Head",
        "ros_neck" => "S_ROS_Neck",
        "ros_eyes" => "S_ROS_Eyes",
        "ros_ears" => "S_ROS_Ears",
        "ros_nose" => "S_ROS_Nose",
        "ros_mouth" => "S_ROS_Mouth",
        "ros_throat" => "S_ROS_Throat",
        "ros_cardiovascular" => "S_ROS_Cardiovascular",
        "ros_respiratory" => "S_ROS_Respiratory",
        "ros_gastrointestinal" => "S_ROS_Gastrointestinal",
        "ros_genitourinary" => "S_ROS_Genitourinary",
        "ros_musculoskeletal" => "S_ROS_Musculoskeletal",
        "ros_integumentary" => "S_ROS_Skin_Breast",
        "ros_neurological" => "S_ROS_Neurological",
        "ros_psychiatric" => "S_ROS_Psychiatric",
        "ros_endocrine" => "S_ROS_Endocrine",
        "ros_hematologic" => "S_ROS_Lymphatic",
        "ros_allergic" => "S_ROS_AllergicImmunologic",
        "objective" => "O_Objective",
        "pe_general" => "O_PE_General",
        "pe_head_ent" => "O_PE_HeadEyeEarNoseThroat",
        "pe_neck" => "O_PE_Neck",
        "pe_respiratory" => "O_PE_Respiratory",
        "pe_cardiovascular" => "O_PE_Cardiovascular",
        "pe_lungs" => "O_PE_Lung",
        "pe_chest" => "O_PE_Breast",
        "pe_heart" => "O_PE_Heart",
        "pe_abdomen" => "O_PE_Adomen",
        "pe_genitourinary" => "O_PE_Genitourinary",
        "pe_lymphatic" => "O_PE_Lymphatic",
        "pe_musculoskeletal" => "O_PE_Musculoskeletal",
        "pe_skin" => "O_PE_Skin",
        "pe_extremities" => "O_PE_Extremities",
        "pe_neurological" => "O_PE_Neurological",
        "tr_ecg" => "O_TR_ECG",
        "tr_imaging" => "O_TR_Imaging",
        "tr_lab" => "O_TR_Laboratory",
        "assessment_notes" => "ucDiagnosisCodes$A_A_10_0",
        "assessment_notes_icd9" => "ucDiagnosisCodes$A_A_09_0",
        "plan_notes" => "P_Plans",
        "patient_instructions" => "P_PatientInstructions",
        "procedures" => "P_Procedures",
        "administered_medication" => "AdminMedication",
        _ => return None,
    };
    Some(suffix)
}

/// JSON envelope the AJAX bridge expects for a read call. The body is
/// raw JSON text even though the request is sent under a form-urlencoded
/// content type; the bridge script does the same.
pub(crate) fn bridge_read_envelope(inner_url: &str) -> String {
    serde_json::json!({
        "url": inner_url,
        "urlparam": [],
        "data": [],
        "method": "GET",
        "contenttype": null,
        "headers": [],
        "type": 6,
        "usetoken": true,
    })
    .to_string()
}

/// Form-encoded envelope for the pre-submission validation call. The
/// `data` field is a JSON string whose own fields are JSON strings again;
/// the nesting is the bridge's, not ours.
pub(crate) fn precheck_form(
    inner_url: &str,
    diagnosis_codes: &[DiagnosisCode],
    procedure_codes: &[ProcedureCode],
) -> Vec<(String, String)> {
    let diagnosis: Vec<serde_json::Value> = diagnosis_codes
        .iter()
        .map(|d| {
            serde_json::json!({
                "Code": d.code,
                "Description": d.description,
            })
        })
        .collect();
    let procedures: Vec<serde_json::Value> = procedure_codes
        .iter()
        .map(|p| {
            serde_json::json!({
                "Code": p.code,
                "Description": p.description,
                "POS": p.pos,
                "Fee": p.fee,
                "Unit": p.units,
            })
        })
        .collect();
    let data = serde_json::json!({
        "DiagnosisCodes": serde_json::Value::Array(diagnosis).to_string(),
        "ProcedureCodes": serde_json::Value::Array(procedures).to_string(),
    });

    vec![
        ("url".to_string(), inner_url.to_string()),
        ("urlparam".to_string(), "[]".to_string()),
        ("data".to_string(), data.to_string()),
        ("method".to_string(), "POST".to_string()),
        ("contenttype".to_string(), String::new()),
        ("headers".to_string(), "[]".to_string()),
        ("type".to_string(), "1".to_string()),
        ("usetoken".to_string(), "true".to_string()),
    ]
}
