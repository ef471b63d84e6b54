//! Parameter validation for platform operations.
//!
//! Every operation parameter is checked here before any network traffic:
//! service dates must be real calendar dates in the platform's
//! `MM/DD/YYYY` form, and platform identifiers (office, provider,
//! patient, encounter) must be non-empty decimal strings.

use crate::error::RequestError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const MDY: &[BorrowedFormatItem<'static>] = format_description!("[month]/[day]/[year]");

/// A service date in the platform's `MM/DD/YYYY` form.
///
/// Parsing is strict: two-digit month and day, four-digit year, and the
/// combination must be a real calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceDate(pub Date);

impl ServiceDate {
    pub fn new(date: Date) -> Self {
        Self(date)
    }

    pub fn inner(&self) -> &Date {
        &self.0
    }

    /// Month number without zero padding, as the date-picker form fields
    /// want it (`7`, not `07`).
    #[must_use]
    pub fn month_field(&self) -> String {
        (self.0.month() as u8).to_string()
    }

    /// Day number without zero padding.
    #[must_use]
    pub fn day_field(&self) -> String {
        self.0.day().to_string()
    }

    /// Four-digit year.
    #[must_use]
    pub fn year_field(&self) -> String {
        self.0.year().to_string()
    }
}

impl fmt::Display for ServiceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(&MDY).map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for ServiceDate {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = Date::parse(s, &MDY).map_err(|e| {
            RequestError::invalid_params(format!(
                "date '{s}' is not a valid MM/DD/YYYY calendar date: {e}"
            ))
        })?;
        Ok(ServiceDate(date))
    }
}

impl Serialize for ServiceDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ServiceDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ServiceDate::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Validates a platform identifier: non-empty, decimal digits only.
///
/// `label` names the parameter in the error message
/// (`office id`, `patient id`, ...).
pub fn validate_platform_id(label: &str, value: &str) -> Result<(), RequestError> {
    if value.is_empty() {
        return Err(RequestError::invalid_params(format!("{label} is empty")));
    }
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(RequestError::invalid_params(format!(
            "{label} '{value}' is not a decimal identifier"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_service_date_parse() {
        let d = ServiceDate::from_str("07/04/2025").unwrap();
        assert_eq!(d.0, date!(2025 - 07 - 04));
    }

    #[test]
    fn test_service_date_display_roundtrip() {
        let d = ServiceDate::from_str("07/04/2025").unwrap();
        assert_eq!(d.to_string(), "07/04/2025");

        let d = ServiceDate::new(date!(2025 - 12 - 31));
        assert_eq!(d.to_string(), "12/31/2025");
    }

    #[test]
    fn test_service_date_form_fields() {
        let d = ServiceDate::from_str("07/04/2025").unwrap();
        assert_eq!(d.month_field(), "7");
        assert_eq!(d.day_field(), "4");
        assert_eq!(d.year_field(), "2025");

        let d = ServiceDate::from_str("11/20/2024").unwrap();
        assert_eq!(d.month_field(), "11");
        assert_eq!(d.day_field(), "20");
    }

    #[test]
    fn test_service_date_rejects_bad_input() {
        assert!(ServiceDate::from_str("2025-07-04").is_err());
        assert!(ServiceDate::from_str("7/4/2025").is_err());
        assert!(ServiceDate::from_str("13/01/2025").is_err());
        assert!(ServiceDate::from_str("02/30/2025").is_err());
        assert!(ServiceDate::from_str("07042025").is_err());
        assert!(ServiceDate::from_str("").is_err());
    }

    #[test]
    fn test_service_date_error_is_invalid_params() {
        let err = ServiceDate::from_str("not a date").unwrap_err();
        assert_eq!(err.code(), "invalid_params");
        assert!(err.to_string().contains("not a date"));
    }

    #[test]
    fn test_service_date_serde() {
        let d: ServiceDate = serde_json::from_str("\"07/04/2025\"").unwrap();
        assert_eq!(d.0, date!(2025 - 07 - 04));
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"07/04/2025\"");

        assert!(serde_json::from_str::<ServiceDate>("\"04-07-2025\"").is_err());
    }

    #[test]
    fn test_leap_day() {
        assert!(ServiceDate::from_str("02/29/2024").is_ok());
        assert!(ServiceDate::from_str("02/29/2025").is_err());
    }

    #[test]
    fn test_validate_platform_id() {
        assert!(validate_platform_id("office id", "12").is_ok());
        assert!(validate_platform_id("patient id", "57089800").is_ok());

        let err = validate_platform_id("office id", "").unwrap_err();
        assert!(err.to_string().contains("office id is empty"));

        let err = validate_platform_id("provider id", "7a").unwrap_err();
        assert_eq!(err.code(), "invalid_params");
        assert!(err.to_string().contains("7a"));

        assert!(validate_platform_id("patient id", " 12").is_err());
        assert!(validate_platform_id("patient id", "12.5").is_err());
        assert!(validate_platform_id("patient id", "-12").is_err());
    }
}
