pub mod credentials;
pub mod error;
pub mod params;
pub mod records;

pub use credentials::Credentials;
pub use error::{AuthError, DecodeError, ErrorCategory, OperationError, RequestError};
pub use params::{ServiceDate, validate_platform_id};
pub use records::{
    Appointment, CreatedEncounter, DiagnosisCode, EncounterMeta, EncounterSummary, MAX_CODE_SLOTS,
    PatientRecord, PatientRef, PhysicalExam, ProcedureCode, ProgressNote, ProgressNoteInput,
    ReviewOfSystems, SoapSections, TestResults,
};
