use super::demographics::Demographics;
use super::{find_titled_box, select_named, Provenance};
use crate::errors::AutomationError;
use crate::registry::SystemProfile;
use crate::session::Session;
use crate::snapshot::{visible_text, PageSnapshot};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

static TITLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(.+?)\s*\((\d+)\)\s*$").unwrap());
static SALUTATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:Mr|Mrs|Ms|Miss|Mstr|Master|Dr|Prof|Mx)\.?\s+[A-Z](?:[a-z]|'[A-Z])[A-Za-z'’-]*(?:\s+(?:\([A-Z][a-z][A-Za-z'’-]*\)|[A-Z](?:[a-z]|'[A-Z])[A-Za-z'’-]*)){0,4}",
    )
    .unwrap()
});
static NAME_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:full\s+|patient\s+)?name\s*:\s*(.+?)\s*$").unwrap());
static ID_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bID\s*:").unwrap());

const NAME_SEARCH_LINES_BEFORE: usize = 2;
const DETAIL_LINES_BEFORE: usize = 3;
const DETAIL_LINES_AFTER: usize = 8;

type PatientStrategy = fn(&PageSnapshot, &SystemProfile) -> Option<(String, Demographics)>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub name: String,
    #[serde(flatten)]
    pub details: Demographics,
    pub provenance: Provenance,
}

/// Splits a dialog title like `"Mr Adrian Test (17755)"` into name and id.
pub fn parse_title_name(value: &str) -> Option<(String, Option<String>)> {
    if let Some(caps) = TITLE_NAME_RE.captures(value) {
        let name = caps[1].trim().to_string();
        if !name.is_empty() {
            return Some((name, Some(caps[2].to_string())));
        }
    }
    let name = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then_some((name, None))
}

/// Reads the patient currently open on the page.
///
/// `None` when every strategy came up empty; a record without a name is
/// never returned.
#[instrument(level = "debug", skip(session))]
pub async fn extract_patient(session: &Session) -> Result<Option<PatientRecord>, AutomationError> {
    let profile = session.profile()?;
    let source = session.driver().snapshot().await?;
    Ok(parse_patient_source(&source, &profile))
}

pub fn parse_patient_source(source: &str, profile: &SystemProfile) -> Option<PatientRecord> {
    parse_patient(&PageSnapshot::parse(source), profile)
}

/// Runs the patient cascade over one snapshot: hidden title field, titled
/// container, salutation near an ID marker, then a scan of all visible text.
pub fn parse_patient(snapshot: &PageSnapshot, profile: &SystemProfile) -> Option<PatientRecord> {
    let cascade: [(Provenance, PatientStrategy); 4] = [
        (Provenance::HiddenInput, from_hidden_input),
        (Provenance::TitledContainer, from_titled_container),
        (Provenance::SalutationScan, from_salutation_near_id),
        (Provenance::GlobalScan, from_global_scan),
    ];

    for (provenance, strategy) in cascade {
        match strategy(snapshot, profile) {
            Some((name, details)) if !name.trim().is_empty() => {
                debug!(?provenance, "Patient found");
                return Some(PatientRecord {
                    name: name.trim().to_string(),
                    details,
                    provenance,
                });
            }
            _ => debug!(?provenance, "Patient strategy yielded nothing"),
        }
    }
    None
}

fn from_hidden_input(snapshot: &PageSnapshot, profile: &SystemProfile) -> Option<(String, Demographics)> {
    let (name, id) = select_named(snapshot, profile, "hiddenPatientName", None)
        .into_iter()
        .filter(|el| !PageSnapshot::is_within_any(*el, &profile.non_target_containers))
        .find_map(|el| parse_title_name(&PageSnapshot::value_of(el)))?;

    let banner = select_named(snapshot, profile, "patientBanner", None)
        .into_iter()
        .next()
        .map(visible_text)
        .map(|text| Demographics::scan(&text))
        .unwrap_or_default();
    let details = Demographics {
        id,
        ..Demographics::default()
    }
    .or(banner);
    Some((name, details))
}

fn from_titled_container(snapshot: &PageSnapshot, profile: &SystemProfile) -> Option<(String, Demographics)> {
    let found = find_titled_box(snapshot, profile, &profile.patient_titles)?;
    debug!(matched = ?found.matched, "Patient container found by title");
    let text = visible_text(found.content.unwrap_or(found.container));
    let name = name_in_block(&text)?;
    Some((name, Demographics::scan(&text)))
}

fn from_salutation_near_id(snapshot: &PageSnapshot, _profile: &SystemProfile) -> Option<(String, Demographics)> {
    let text = visible_text(snapshot.select_first("body", None)?);
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if !ID_MARKER_RE.is_match(line) {
            continue;
        }
        let from = i.saturating_sub(NAME_SEARCH_LINES_BEFORE);
        let name = lines[from..=i]
            .iter()
            .rev()
            .find_map(|l| SALUTATION_RE.find(l))
            .map(|m| m.as_str().to_string());
        if let Some(name) = name {
            let start = i.saturating_sub(DETAIL_LINES_BEFORE);
            let end = (i + DETAIL_LINES_AFTER).min(lines.len());
            return Some((name, Demographics::scan(&lines[start..end].join("\n"))));
        }
    }
    None
}

fn from_global_scan(snapshot: &PageSnapshot, _profile: &SystemProfile) -> Option<(String, Demographics)> {
    let text = visible_text(snapshot.select_first("body", None)?);
    let name = NAME_LABEL_RE
        .captures(&text)
        .map(|c| c[1].to_string())
        .or_else(|| SALUTATION_RE.find(&text).map(|m| m.as_str().to_string()))?;
    Some((name, Demographics::scan(&text)))
}

/// Name inside a demographics block: an explicit `Name:` line, a salutation,
/// or a leading line made of capitalised words.
fn name_in_block(text: &str) -> Option<String> {
    if let Some(caps) = NAME_LABEL_RE.captures(text) {
        return Some(caps[1].to_string());
    }
    if let Some(m) = SALUTATION_RE.find(text) {
        return Some(m.as_str().to_string());
    }
    let first = text.lines().next()?.trim();
    let words: Vec<&str> = first.split_whitespace().collect();
    let looks_like_name = words.len() >= 2
        && words.len() <= 5
        && words
            .iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase) && !w.contains(':'))
        && !first.chars().any(|c| c.is_ascii_digit());
    looks_like_name.then(|| first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn profile() -> std::sync::Arc<SystemProfile> {
        Registry::builtin().unwrap().get("xestro").unwrap()
    }

    #[test]
    fn test_title_name_with_id() {
        assert_eq!(
            parse_title_name("Mr Adrian Test (17755)"),
            Some(("Mr Adrian Test".to_string(), Some("17755".to_string())))
        );
        assert_eq!(
            parse_title_name("  Ms  Jo Bloggs "),
            Some(("Ms Jo Bloggs".to_string(), None))
        );
        assert_eq!(parse_title_name("   "), None);
    }

    #[test]
    fn test_titled_container_strategy() {
        let page = r#"<html><body>
            <div class="XestroBox"><div class="XestroBoxTitle">Patient Details</div>
              <div class="XestroBoxContent"><p>Name: Jane Citizen</p><p>DOB: 01/02/1970</p><p>Phone: 0400 111 222</p></div>
            </div></body></html>"#;
        let record = parse_patient(&PageSnapshot::parse(page), &profile()).unwrap();
        assert_eq!(record.name, "Jane Citizen");
        assert_eq!(record.provenance, Provenance::TitledContainer);
        assert_eq!(record.details.dob.as_deref(), Some("01/02/1970"));
        assert_eq!(record.details.phone.as_deref(), Some("0400 111 222"));
    }

    #[test]
    fn test_salutation_near_id_marker() {
        let page = r#"<html><body>
            <div>Welcome back</div>
            <div><span>Mrs Olive O'Neil</span><div>ID: 4411</div><div>olive@example.com</div></div>
        </body></html>"#;
        let record = parse_patient(&PageSnapshot::parse(page), &profile()).unwrap();
        assert_eq!(record.name, "Mrs Olive O'Neil");
        assert_eq!(record.provenance, Provenance::SalutationScan);
        assert_eq!(record.details.id.as_deref(), Some("4411"));
        assert_eq!(record.details.email.as_deref(), Some("olive@example.com"));
    }

    #[test]
    fn test_nothing_on_page_is_none() {
        let page = "<html><body><p>Appointment book</p></body></html>";
        assert!(parse_patient(&PageSnapshot::parse(page), &profile()).is_none());
    }
}
