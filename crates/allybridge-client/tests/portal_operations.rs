//! Integration tests for the portal operations against a mock portal.
//!
//! Each test mounts the login handshake plus the pages one operation
//! touches, then drives the public client end to end: request grammar,
//! markup decoding and error classification all run for real.

use std::str::FromStr;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use allybridge_client::{AllyClient, ClientConfig};
use allybridge_core::{
    Credentials, DiagnosisCode, EncounterMeta, ErrorCategory, ProcedureCode, ProgressNoteInput,
    ServiceDate, SoapSections,
};

const LOGIN_PAGE: &str = r#"<html><body>
    <form id="aspnetForm" action="Login.aspx" method="post">
        <input type="hidden" name="__VIEWSTATE" value="vs-login" />
        <input type="hidden" name="__VIEWSTATEGENERATOR" value="gen-login" />
        <input type="hidden" name="__EVENTVALIDATION" value="ev-login" />
        <input type="text" name="txtUserName" />
        <input type="password" name="txtPassword" />
        <input type="submit" name="btnLogin" value="Log In" />
    </form></body></html>"#;

const LANDING_PAGE: &str = r#"<html><body>
    <form id="aspnetForm">
        <input type="hidden" name="__RequestVerificationToken" value="tok-session" />
        <input type="hidden" name="hdnCompanyID" value="9001" />
        <input type="hidden" name="hdnLoginUserName" value="Front Desk" />
    </form></body></html>"#;

const SCHEDULE_FORM_PAGE: &str = r#"<html><body>
    <form id="aspnetForm" action="ViewAppointments.aspx?Tab=A" method="post">
        <input type="hidden" name="__VIEWSTATE" value="vs-sched" />
        <input type="hidden" name="__VIEWSTATEGENERATOR" value="gen-sched" />
        <input type="hidden" name="__EVENTVALIDATION" value="ev-sched" />
        <input type="hidden" name="__RequestVerificationToken" value="tok-sched" />
        <select name="ctl00$phFolderContent$Appointments$lstOffice">
            <option value="11">Main St</option>
            <option value="12" selected="selected">Clinic North</option>
        </select>
        <select name="ctl00$phFolderContent$Appointments$lstProvider">
            <option value="7" selected="selected">Dr. Smith</option>
        </select>
    </form></body></html>"#;

const CHART_PAGE: &str = r#"<html><body>
    <form id="aspnetForm">
        <input type="hidden" name="__RequestVerificationToken" value="tok-chart" />
    </form>
    <span id="ctl00_phFolderContent_myPatientHeader_lblPatientID">555001</span>
    <span id="ctl00_phFolderContent_myPatientHeader_lblFirstName">Jane</span>
    <span id="ctl00_phFolderContent_myPatientHeader_lblLastName">Doe</span>
    <span id="ctl00_phFolderContent_myPatientHeader_lblDOB">01/02/1980 - Age: 45 yrs 7 mos</span>
    <span id="ctl00_phFolderContent_myPatientHeader_lblGender">Female</span>
    <span id="ctl00_phFolderContent_myPatientHeader_lblLanguage">English</span>
    </body></html>"#;

const NOTES_PAGE: &str = r#"<html><body>
    <script>var strIDs = '7702;7701';</script>
    <table class="tblNotes">
        <tr data-eid="7701"><td>01/05/2025</td><td>SOAP Note</td></tr>
        <tr data-eid="7702"><td>02/06/2025</td><td>SOAP Note</td></tr>
    </table></body></html>"#;

const EDITOR_PAGE: &str = r#"<html><body>
    <form id="aspnetForm" action="PatientChart_EditNote.aspx" method="post">
        <input type="hidden" name="__VIEWSTATE" value="vs-editor" />
        <input type="hidden" name="__VIEWSTATEGENERATOR" value="gen-editor" />
        <input type="hidden" name="__EVENTVALIDATION" value="ev-editor" />
        <input type="hidden" name="__RequestVerificationToken" value="tok-editor" />
        <input type="hidden" name="ctl00$phFolderContent$ucSOAPNote$EncounterID" value="987001" />
        <select name="ctl00$phFolderContent$ucSOAPNote$lstProvider">
            <option value="7">Dr. Smith</option>
        </select>
        <select name="ctl00$phFolderContent$ucSOAPNote$lstOffice">
            <option value="12">Clinic North</option>
        </select>
        <select name="ctl00$phFolderContent$ucSOAPNote$lstEncounterType">
            <option value="1">Office Visit</option>
        </select>
    </form></body></html>"#;

fn day_page() -> String {
    let filler = "<td></td>".repeat(5);
    format!(
        r#"<html><body><div id="divDaily"><table class="tblAppts">
        <thead><tr><td>Time</td><td></td><td>Patient</td></tr></thead>
        <tr>
            <td>9</td><td>:00</td>
            <td><a href="ViewAppointments.aspx?Tab=A&ID=98021">Doe, Jane</a></td>
            <td>555001</td><td>15</td><td>01/02/1980</td><td>(555) 010-2030</td>
            <td>Dr. Smith</td><td>Follow Up</td><td>Confirmed</td>{filler}
        </tr>
        <tr>
            <td>2</td><td>:15 <small>PM</small></td>
            <td><a href="ViewAppointments.aspx?Tab=A&ID=98022">Roe, Rick</a></td>
            <td>555002</td><td>30</td><td>03/04/1990</td><td></td>
            <td>Dr. Smith</td><td>New Patient</td><td>Checked In</td>{filler}
        </tr>
        <tr><td colspan="3">spacer</td></tr>
        </table></div></body></html>"#
    )
}

async fn mount_login_flow(server: &MockServer, expected_logins: u64) {
    Mock::given(method("GET"))
        .and(path("/emr/Login.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emr/Login.aspx"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/emr/Default.aspx"))
        .expect(expected_logins)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/emr/Default.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LANDING_PAGE))
        .mount(server)
        .await;
}

async fn mount_chart(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/emr/PatientCharts/PatientChart_Summary.aspx"))
        .and(query_param("PageAction", "Summary"))
        .and(query_param("PID", "555001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new()
        .with_base_url(format!("{}/emr", server.uri()))
        .with_retry_backoff(Duration::from_millis(5))
}

fn client_for(server: &MockServer) -> AllyClient {
    AllyClient::with_credentials(config_for(server), Credentials::new("frontdesk", "hunter2"))
        .unwrap()
}

fn note_input() -> ProgressNoteInput {
    ProgressNoteInput {
        patient_id: "555001".to_string(),
        encounter: EncounterMeta {
            date: ServiceDate::from_str("07/04/2025").unwrap(),
            treating_provider_id: "7".to_string(),
            office_id: "12".to_string(),
            encounter_type: "1".to_string(),
        },
        soap: SoapSections {
            chief_complaint: Some("Headache for three days".to_string()),
            plan_notes: Some("Rest and fluids".to_string()),
            ..SoapSections::default()
        },
        diagnosis_codes: vec![DiagnosisCode {
            code: "R51.9".to_string(),
            description: "Headache".to_string(),
        }],
        procedure_codes: vec![ProcedureCode {
            code: "99213".to_string(),
            description: "Office visit, established".to_string(),
            pos: "11".to_string(),
            fee: "125.00".to_string(),
            units: "1".to_string(),
        }],
    }
}

#[tokio::test]
async fn lists_appointments_for_the_requested_day() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/emr/Appointments/ViewAppointments.aspx"))
        .and(query_param("Tab", "A"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SCHEDULE_FORM_PAGE))
        .mount(&server)
        .await;
    // The date postback must carry the scraped view state and the
    // navigation overlays.
    Mock::given(method("POST"))
        .and(path("/emr/Appointments/ViewAppointments.aspx"))
        .and(body_string_contains("__VIEWSTATE=vs-sched"))
        .and(body_string_contains("hdnGoToDate=07%2F04%2F2025"))
        .and(body_string_contains("lstOffice=12"))
        .and(body_string_contains("lstProvider=7"))
        .respond_with(ResponseTemplate::new(200).set_body_string(day_page()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let appointments = client
        .list_appointments("07/04/2025", "12", "7")
        .await
        .unwrap();

    assert_eq!(appointments.len(), 2);

    let first = &appointments[0];
    assert_eq!(first.appointment_id, "98021");
    assert_eq!(first.time_slot, "09:00 AM");
    assert_eq!(first.patient.id, "555001");
    assert_eq!(first.patient.name, "Doe, Jane");
    assert_eq!(first.office_id, "12");
    assert_eq!(first.provider_id, "7");
    assert_eq!(first.service_date.to_string(), "07/04/2025");
    assert_eq!(first.status, "Confirmed");

    let second = &appointments[1];
    assert_eq!(second.appointment_id, "98022");
    assert_eq!(second.time_slot, "02:15 PM");
    assert_eq!(second.patient.id, "555002");
    assert_eq!(second.home_phone, "");
}

#[tokio::test]
async fn rejects_non_numeric_platform_ids_before_any_request() {
    let server = MockServer::start().await;
    // no mocks mounted: validation must fail before traffic

    let client = client_for(&server);
    let err = client
        .list_appointments("07/04/2025", "12; DROP", "7")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "invalid_params");
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn fetches_a_patient_record() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    mount_chart(&server, CHART_PAGE).await;

    let client = client_for(&server);
    let record = client.fetch_patient_record("555001").await.unwrap();

    assert_eq!(record.patient_id, "555001");
    assert_eq!(record.first_name, "Jane");
    assert_eq!(record.last_name, "Doe");
    assert_eq!(record.date_of_birth, "01/02/1980");
    assert_eq!(record.age_details.as_deref(), Some("45 yrs 7 mos"));
    assert_eq!(record.sex, "Female");
    assert_eq!(record.preferred_language.as_deref(), Some("English"));
}

#[tokio::test]
async fn incomplete_chart_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    let without_last_name = CHART_PAGE.replace(
        r#"<span id="ctl00_phFolderContent_myPatientHeader_lblLastName">Doe</span>"#,
        "",
    );
    mount_chart(&server, &without_last_name).await;

    let client = client_for(&server);
    let err = client.fetch_patient_record("555001").await.unwrap_err();

    assert_eq!(err.code(), "missing_field");
    assert_eq!(err.category(), ErrorCategory::Decode);
    assert_eq!(err.operation(), "fetch_patient_record");
    assert!(err.to_string().contains("last_name"));
}

#[tokio::test]
async fn unknown_patient_is_a_platform_rejection() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    mount_chart(
        &server,
        "<html><body><div>The patient could not be found.</div></body></html>",
    )
    .await;

    let client = client_for(&server);
    let err = client.fetch_patient_record("555001").await.unwrap_err();

    assert_eq!(err.code(), "platform_rejected");
    assert_eq!(err.category(), ErrorCategory::Platform);
}

#[tokio::test]
async fn lists_progress_note_encounters_in_script_order() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/emr/PatientCharts/PatientChart_ProgressNotes.aspx"))
        .and(query_param(
            "PageAction",
            "ProgressNotes,PatientCharts_ProgressNotes_Add",
        ))
        .and(query_param("PID", "555001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(NOTES_PAGE))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let encounters = client
        .list_progress_note_encounters("555001")
        .await
        .unwrap();

    let ids: Vec<&str> = encounters.iter().map(|e| e.encounter_id.as_str()).collect();
    assert_eq!(ids, vec!["7702", "7701"]);
    assert_eq!(encounters[0].encounter_date, "02/06/2025");
    assert_eq!(encounters[0].note_type, "SOAP Note");
}

#[tokio::test]
async fn fetches_a_progress_note_through_the_bridge() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    mount_chart(&server, CHART_PAGE).await;
    // The bridged read must carry the chart's token, the AJAX marker and
    // the patient's age split out of the chart header.
    Mock::given(method("POST"))
        .and(path("/emr/CommonUserControls/Ajax/WebAPI/Api.aspx"))
        .and(query_param("method", "GET"))
        .and(query_param(
            "url",
            "v1/encounters/7701/patients/555001/viewprogressnote?ageYears=45",
        ))
        .and(query_param("ageMonths", "7"))
        .and(query_param("ageDays", "0"))
        .and(header("x-oa-auth-token", "tok-chart"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(body_string_contains("viewprogressnote"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"dt": "{\"NoteID\": 42, \"Subjective\": \"Headache\"}"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let note = client.fetch_progress_note("555001", "7701").await.unwrap();

    assert_eq!(note.patient_id, "555001");
    assert_eq!(note.encounter_id, "7701");
    assert_eq!(note.document["NoteID"], 42);
    assert_eq!(note.document["Subjective"], "Headache");
}

#[tokio::test]
async fn locked_note_is_a_platform_rejection() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    mount_chart(&server, CHART_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/emr/CommonUserControls/Ajax/WebAPI/Api.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"dt": "{\"Message\": \"Fail\", \"Error\": \"Record is locked\"}"}"#,
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .fetch_progress_note("555001", "7701")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "platform_rejected");
    assert!(err.to_string().contains("Record is locked"));
}

#[tokio::test]
async fn creates_a_progress_note() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .and(query_param("PageAction", "AddNote"))
        .and(query_param("SoapLayoutID", "347185"))
        .and(query_param("PID", "555001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EDITOR_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emr/CommonUserControls/Ajax/WebAPI/Api.aspx"))
        .and(query_param("method", "POST"))
        .and(query_param("url", "v1/patients/patientInformation/patientID/555001"))
        .and(header("x-oa-auth-token", "tok-editor"))
        .and(body_string_contains("DiagnosisCodes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"d": null}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .and(body_string_contains("__VIEWSTATE=vs-editor"))
        .and(body_string_contains("__RequestVerificationToken=tok-editor"))
        .and(body_string_contains("hdnHasClicked=1"))
        .and(body_string_contains("chkPrint_CPT=no"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            "/emr/PatientCharts/PatientChart_EditNote.aspx?PageAction=EditNote&EID=E123&Tab=C&PID=555001",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let created = client.create_progress_note(&note_input()).await.unwrap();

    assert_eq!(created.encounter_id, "E123");
    assert_eq!(created.status, "created");
}

#[tokio::test]
async fn failed_precheck_aborts_before_submission() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EDITOR_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emr/CommonUserControls/Ajax/WebAPI/Api.aspx"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    // the editor postback must never be attempted
    Mock::given(method("POST"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .respond_with(ResponseTemplate::new(302))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.create_progress_note(&note_input()).await.unwrap_err();

    assert_eq!(err.code(), "platform_rejected");
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn submission_timeout_is_not_retried() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EDITOR_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emr/CommonUserControls/Ajax/WebAPI/Api.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"d": null}"#))
        .mount(&server)
        .await;
    // A submission that times out must surface as a network failure
    // without a second post: the portal may have filed the note.
    Mock::given(method("POST"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .respond_with(ResponseTemplate::new(302).set_delay(Duration::from_secs(5)))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server).with_request_timeout(Duration::from_millis(400));
    let client =
        AllyClient::with_credentials(config, Credentials::new("frontdesk", "hunter2")).unwrap();
    let err = client.create_progress_note(&note_input()).await.unwrap_err();

    assert_eq!(err.code(), "network_failure");
    assert_eq!(err.category(), ErrorCategory::Network);
}

#[tokio::test]
async fn submission_redirect_without_an_encounter_id_is_rejected() {
    let server = MockServer::start().await;
    mount_login_flow(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EDITOR_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emr/CommonUserControls/Ajax/WebAPI/Api.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"d": null}"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emr/PatientCharts/PatientChart_EditNote.aspx"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/emr/PatientCharts/PatientChart_Summary.aspx?Tab=C&PID=555001"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.create_progress_note(&note_input()).await.unwrap_err();

    assert_eq!(err.code(), "platform_rejected");
    assert!(err.to_string().contains("without an encounter id"));
    // the editor's pre-allocated id is named so the orphan can be found
    assert!(err.to_string().contains("987001"));
}
