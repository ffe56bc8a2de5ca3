//! Appointment book rows and their pattern validator.
//!
//! Rows label the patient either as `Name (file number)` or, in the legacy
//! layout, `Name (dd/mm/yyyy)`. Rows matching neither shape are kept but
//! tagged [`PatternValidity::Invalid`].

use super::demographics::DATE_RE;
use super::{select_named, Provenance};
use crate::errors::AutomationError;
use crate::registry::SystemProfile;
use crate::session::Session;
use crate::snapshot::{normalize_inline, visible_text, PageSnapshot};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

static FULL_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap());

const CONFIRMED_MARKERS: &[&str] = &["confirmed", "appointment-confirmed", "status-confirmed"];
const FIRST_VISIT_MARKERS: &[&str] = &["new-patient", "first-appointment", "first-visit"];
const FIRST_VISIT_TYPES: &[&str] = &["new patient", "initial", "first"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternValidity {
    /// `Name (file number)` with no date anywhere in the label
    NameId,
    /// Legacy `Name (dd/mm/yyyy)` with both parts present
    LegacyDob,
    Invalid,
}

/// Name and trailing parenthetical of an appointment label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientLabel {
    pub name: String,
    pub file_number: Option<String>,
    pub dob: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    pub name: String,
    /// Empty for legacy rows
    pub file_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    pub appointment_time: String,
    pub appointment_type: String,
    pub confirmed: bool,
    pub is_first_appointment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub pattern: PatternValidity,
    pub provenance: Provenance,
}

/// Parses `"Test Test (14524)"` or `"Mrs Jessica (Jess) Demicoli (07/08/1985)"`.
///
/// Only the last parenthetical is significant; earlier ones (nicknames)
/// stay part of the name.
pub fn parse_patient_label(label: &str) -> PatientLabel {
    let label = normalize_inline(label);
    let trailing = label
        .strip_suffix(')')
        .and_then(|body| body.rfind('(').map(|open| (&body[..open], body[open + 1..].trim())));

    match trailing {
        Some((name, inner)) if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) => {
            PatientLabel {
                name: name.trim().to_string(),
                file_number: Some(inner.to_string()),
                dob: None,
            }
        }
        Some((name, inner)) if FULL_DATE_RE.is_match(inner) => PatientLabel {
            name: name.trim().to_string(),
            file_number: None,
            dob: Some(inner.to_string()),
        },
        _ => PatientLabel {
            name: label.trim().to_string(),
            ..PatientLabel::default()
        },
    }
}

/// Classifies a record's shape. Never promotes a doubtful row to valid.
pub fn validate_pattern(name: &str, file_number: &str, dob: Option<&str>) -> PatternValidity {
    let name = name.trim();
    if name.is_empty() {
        return PatternValidity::Invalid;
    }
    let numeric_id = !file_number.is_empty() && file_number.chars().all(|c| c.is_ascii_digit());
    if numeric_id && !DATE_RE.is_match(name) {
        return PatternValidity::NameId;
    }
    if file_number.is_empty() && dob.is_some_and(|d| FULL_DATE_RE.is_match(d)) {
        return PatternValidity::LegacyDob;
    }
    PatternValidity::Invalid
}

/// Reads every row of the appointment book on the page.
#[instrument(level = "debug", skip(session))]
pub async fn extract_appointments(session: &Session) -> Result<Vec<AppointmentRecord>, AutomationError> {
    let profile = session.profile()?;
    let source = session.driver().snapshot().await?;
    Ok(parse_appointment_source(&source, &profile))
}

pub fn parse_appointment_source(source: &str, profile: &SystemProfile) -> Vec<AppointmentRecord> {
    parse_appointment_rows(&PageSnapshot::parse(source), profile)
}

pub fn parse_appointment_rows(snapshot: &PageSnapshot, profile: &SystemProfile) -> Vec<AppointmentRecord> {
    let rows: Vec<AppointmentRecord> = select_named(snapshot, profile, "appointmentRows", None)
        .into_iter()
        .filter(|row| !PageSnapshot::is_within_any(*row, &profile.non_target_containers))
        .filter_map(|row| parse_row(snapshot, profile, row))
        .collect();

    let invalid = rows
        .iter()
        .filter(|r| r.pattern == PatternValidity::Invalid)
        .count();
    if invalid > 0 {
        warn!(invalid, total = rows.len(), "Appointment rows with unrecognised label pattern");
    }
    debug!(rows = rows.len(), "Appointment rows parsed");
    rows
}

fn parse_row(snapshot: &PageSnapshot, profile: &SystemProfile, row: ElementRef<'_>) -> Option<AppointmentRecord> {
    let cell = |name: &str| {
        select_named(snapshot, profile, name, Some(row))
            .into_iter()
            .next()
    };
    let cell_text = |name: &str| {
        cell(name)
            .map(|el| normalize_inline(&visible_text(el)))
            .unwrap_or_default()
    };

    let patient = cell("appointmentPatient");
    let display = patient
        .map(|el| normalize_inline(&visible_text(el)))
        .unwrap_or_default();
    let aria = patient
        .and_then(|el| el.value().attr("aria-label").or_else(|| el.value().attr("title")))
        .or_else(|| row.value().attr("aria-label"))
        .map(normalize_inline)
        .unwrap_or_default();
    if display.is_empty() && aria.is_empty() {
        return None;
    }

    let from_display = parse_patient_label(&display);
    let (label, provenance) = if recognised(&from_display) || aria.is_empty() {
        (from_display, Provenance::DisplayText)
    } else {
        let from_aria = parse_patient_label(&aria);
        if recognised(&from_aria) || display.is_empty() {
            (from_aria, Provenance::AriaLabel)
        } else {
            (from_display, Provenance::DisplayText)
        }
    };

    let dob = label.dob.clone().or_else(|| {
        let text = cell_text("appointmentDob");
        DATE_RE.find(&text).map(|m| m.as_str().to_string())
    });
    let file_number = label.file_number.clone().unwrap_or_default();
    let appointment_type = cell_text("appointmentType");
    let notes = Some(cell_text("appointmentNotes")).filter(|n| !n.is_empty());
    let pattern = validate_pattern(&label.name, &file_number, label.dob.as_deref());

    Some(AppointmentRecord {
        name: label.name,
        file_number,
        dob,
        appointment_time: cell_text("appointmentTime"),
        confirmed: has_marker(row, CONFIRMED_MARKERS),
        is_first_appointment: has_marker(row, FIRST_VISIT_MARKERS)
            || FIRST_VISIT_TYPES
                .iter()
                .any(|t| appointment_type.to_lowercase().contains(t)),
        appointment_type,
        notes,
        pattern,
        provenance,
    })
}

fn recognised(label: &PatientLabel) -> bool {
    !label.name.is_empty() && (label.file_number.is_some() || label.dob.is_some())
}

/// Row-level status flags: a class or `data-status` on the row, or a
/// descendant carrying the class.
fn has_marker(row: ElementRef<'_>, markers: &[&str]) -> bool {
    let flagged = |el: ElementRef<'_>| {
        let value = el.value();
        value.classes().any(|c| markers.contains(&c.to_ascii_lowercase().as_str()))
            || value
                .attr("data-status")
                .is_some_and(|s| markers.contains(&s.to_ascii_lowercase().as_str()))
    };
    flagged(row) || row.descendants().filter_map(ElementRef::wrap).any(|el| flagged(el))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_id_label() {
        let label = parse_patient_label("Test Test (14524)");
        assert_eq!(label.name, "Test Test");
        assert_eq!(label.file_number.as_deref(), Some("14524"));
        assert_eq!(
            validate_pattern(&label.name, "14524", None),
            PatternValidity::NameId
        );
    }

    #[test]
    fn test_legacy_dob_label_keeps_nickname() {
        let label = parse_patient_label("Mrs Jessica (Jess) Demicoli (07/08/1985)");
        assert_eq!(label.name, "Mrs Jessica (Jess) Demicoli");
        assert_eq!(label.dob.as_deref(), Some("07/08/1985"));
        assert_eq!(label.file_number, None);
        assert_eq!(
            validate_pattern(&label.name, "", label.dob.as_deref()),
            PatternValidity::LegacyDob
        );
    }

    #[test]
    fn test_unrecognised_labels_are_invalid() {
        let label = parse_patient_label("Walk-in (pending)");
        assert_eq!(label.name, "Walk-in (pending)");
        assert_eq!(validate_pattern(&label.name, "", None), PatternValidity::Invalid);
        assert_eq!(
            validate_pattern("Born 01/01/1990 Smith", "123", None),
            PatternValidity::Invalid
        );
        assert_eq!(validate_pattern("", "123", None), PatternValidity::Invalid);
    }
}
