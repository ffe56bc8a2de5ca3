//! Free-text clinical sections.
//!
//! Text already present in the document is read in place. Only when a
//! section holds nothing is it expanded by clicking its title, read, and
//! returned to its previous state: a dialog opened for reading is dismissed,
//! an inline expansion is collapsed again.

use super::{find_titled_box, Provenance};
use crate::errors::AutomationError;
use crate::locator::resolve_in_snapshot;
use crate::platforms::NodeId;
use crate::registry::SystemProfile;
use crate::session::Session;
use crate::snapshot::{rendered_text, visible_text, PageSnapshot};
use crate::wait::poll_until;
use crate::workflows::dismiss_dialog;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldText {
    pub field: String,
    pub text: String,
    pub provenance: Provenance,
}

impl FieldText {
    fn empty(field: &str) -> Self {
        Self {
            field: field.to_string(),
            text: String::new(),
            provenance: Provenance::Empty,
        }
    }
}

enum Probe {
    Missing,
    Static(String),
    Collapsed(NodeId),
}

enum Expanded {
    Dialog(NodeId),
    Inline(String),
}

/// Reads the text of the section titled `label`, or of the section a
/// registry field with that name lives in.
#[instrument(skip(session))]
pub async fn extract_field(session: &Session, label: &str) -> Result<FieldText, AutomationError> {
    let profile = session.profile()?;
    let title = profile
        .field(label)
        .and_then(|spec| spec.section.clone())
        .unwrap_or_else(|| label.to_string());

    let source = session.driver().snapshot().await?;
    let title_node = match probe_section(&source, &profile, &title) {
        Probe::Missing => {
            debug!(%title, "No section with this title");
            return Ok(FieldText::empty(label));
        }
        Probe::Static(text) => {
            return Ok(FieldText {
                field: label.to_string(),
                text,
                provenance: Provenance::StaticContent,
            });
        }
        Probe::Collapsed(node) => node,
    };

    info!(%title, "Section has no rendered text, expanding");
    let driver = session.driver();
    driver.click(title_node).await?;

    let dialog_input = profile.selectors("fieldDialogInput")?.to_vec();
    let excluded = profile.non_target_containers.clone();
    let timings = session.timings();
    let expanded = poll_until(timings.section_open_timeout, timings.poll_interval, || {
        let (profile, title, dialog_input, excluded) = (&profile, &title, &dialog_input, &excluded);
        async move {
            let source = driver.snapshot().await?;
            if let Some(input) = resolve_in_snapshot(&source, dialog_input, None, excluded)? {
                return Ok(Some(Expanded::Dialog(input.node)));
            }
            Ok(match probe_section(&source, profile, title) {
                Probe::Static(text) => Some(Expanded::Inline(text)),
                _ => None,
            })
        }
    })
    .await;
    let expanded = match expanded {
        Ok(expanded) => expanded,
        Err(e) => return close_field_dialog(session, &profile, Err(e)).await,
    };

    match expanded {
        Some(Expanded::Dialog(input)) => {
            let read = driver.read_value(input).await;
            let text = close_field_dialog(session, &profile, read).await?;
            Ok(FieldText {
                field: label.to_string(),
                text: text.trim().to_string(),
                provenance: Provenance::ExpandedDialog,
            })
        }
        Some(Expanded::Inline(text)) => {
            match driver.click(title_node).await {
                Ok(()) => {}
                Err(AutomationError::ElementDetached(_)) => {
                    warn!(%title, "Section title re-rendered, leaving section expanded")
                }
                Err(e) => return Err(e),
            }
            Ok(FieldText {
                field: label.to_string(),
                text,
                provenance: Provenance::ExpandedSection,
            })
        }
        None => {
            debug!(%title, "Section expanded to nothing");
            dismiss_dialog(session, &profile, "fieldDialog", "fieldDialogClose").await?;
            Ok(FieldText::empty(label))
        }
    }
}

/// Dismisses a field dialog opened for reading, whatever `outcome` was.
/// The outcome's own error wins over a failure to close.
async fn close_field_dialog<T>(
    session: &Session,
    profile: &SystemProfile,
    outcome: Result<T, AutomationError>,
) -> Result<T, AutomationError> {
    let closed = dismiss_dialog(session, profile, "fieldDialog", "fieldDialogClose").await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close)) => {
            warn!(error = %close, "Field dialog left open after failed read");
            Err(e)
        }
    }
}

/// Extracts several fields one after another.
pub async fn extract_fields(
    session: &Session,
    labels: &[String],
) -> Result<Vec<FieldText>, AutomationError> {
    let mut found = Vec::with_capacity(labels.len());
    for label in labels {
        found.push(extract_field(session, label).await?);
    }
    Ok(found)
}

fn probe_section(source: &str, profile: &SystemProfile, title: &str) -> Probe {
    let snapshot = PageSnapshot::parse(source);
    let Some(section) = find_titled_box(&snapshot, profile, &[title.to_string()]) else {
        return Probe::Missing;
    };

    if let Some(content) = section.content {
        let shown = visible_text(content);
        if !shown.is_empty() {
            return Probe::Static(shown);
        }
        let collapsed = rendered_text(content);
        if !collapsed.is_empty() {
            return Probe::Static(collapsed);
        }
    }
    match PageSnapshot::node_id(section.title) {
        Some(node) => Probe::Collapsed(node),
        None => Probe::Missing,
    }
}
