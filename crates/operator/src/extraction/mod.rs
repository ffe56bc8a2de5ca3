//! Extraction engine: structured records recovered from the rendered page.
//!
//! Every extractor is a cascade of independent strategies tried in a fixed
//! order. Running out of strategies is not an error: it yields `None` or an
//! empty value, since an empty clinical section is a valid page state.

pub mod appointments;
pub mod demographics;
pub mod fields;
pub mod investigations;
pub mod patient;

pub use appointments::{
    extract_appointments, parse_appointment_rows, parse_appointment_source, parse_patient_label,
    validate_pattern,
    AppointmentRecord, PatientLabel, PatternValidity,
};
pub use demographics::Demographics;
pub use fields::{extract_field, extract_fields, FieldText};
pub use investigations::{segment_investigations, InvestigationSummary};
pub use patient::{
    extract_patient, parse_patient, parse_patient_source, parse_title_name, PatientRecord,
};

use crate::registry::SystemProfile;
use crate::snapshot::{text_content, PageSnapshot};
use scraper::ElementRef;
use serde::{Deserialize, Serialize};

/// Which strategy of a cascade produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    HiddenInput,
    TitledContainer,
    SalutationScan,
    GlobalScan,
    StaticContent,
    ExpandedDialog,
    ExpandedSection,
    DisplayText,
    AriaLabel,
    Empty,
}

/// How a container title matched the wanted title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum TitleMatch {
    Exact,
    Prefix,
    Substring,
}

/// A titled content container ("box") on the page.
pub(crate) struct TitledBox<'a> {
    pub container: ElementRef<'a>,
    pub title: ElementRef<'a>,
    pub content: Option<ElementRef<'a>>,
    pub matched: TitleMatch,
}

/// Elements for a named workflow selector, using the first of its
/// strategies that matches anything.
pub(crate) fn select_named<'a>(
    snapshot: &'a PageSnapshot,
    profile: &SystemProfile,
    name: &str,
    scope: Option<ElementRef<'a>>,
) -> Vec<ElementRef<'a>> {
    let Some(strategies) = profile.workflow_selectors.get(name) else {
        return Vec::new();
    };
    strategies
        .iter()
        .map(|s| snapshot.matches(s, scope))
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

/// Finds the visible container whose title matches one of `titles`.
///
/// Exact matches beat prefix matches beat substring matches; within a tier
/// the order of `titles` and then document order decide. Containers inside
/// non-target scaffolding are ignored.
pub(crate) fn find_titled_box<'a>(
    snapshot: &'a PageSnapshot,
    profile: &SystemProfile,
    titles: &[String],
) -> Option<TitledBox<'a>> {
    let wanted: Vec<String> = titles
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let boxes: Vec<(ElementRef<'a>, ElementRef<'a>, String)> =
        select_named(snapshot, profile, "contentBox", None)
            .into_iter()
            .filter(|b| PageSnapshot::is_visible(*b))
            .filter(|b| !PageSnapshot::is_within_any(*b, &profile.non_target_containers))
            .filter_map(|b| {
                let title = select_named(snapshot, profile, "contentBoxTitle", Some(b))
                    .into_iter()
                    .next()?;
                Some((b, title, text_content(title).to_lowercase()))
            })
            .collect();

    for tier in [TitleMatch::Exact, TitleMatch::Prefix, TitleMatch::Substring] {
        for want in &wanted {
            let hit = boxes.iter().find(|(_, _, have)| match tier {
                TitleMatch::Exact => have == want,
                TitleMatch::Prefix => have.starts_with(want.as_str()),
                TitleMatch::Substring => have.contains(want.as_str()),
            });
            if let Some((container, title, _)) = hit {
                let content = select_named(snapshot, profile, "contentBoxContent", Some(*container))
                    .into_iter()
                    .next();
                return Some(TitledBox {
                    container: *container,
                    title: *title,
                    content,
                    matched: tier,
                });
            }
        }
    }
    None
}
