//! Appointment wrap-up.
//!
//! Wrapping up without a bound appointment hangs the external application,
//! so the appointment is established before anything is committed. When it
//! cannot be, a dialog opened while checking is closed again and the
//! workflow fails with `AmbiguousContext`.

use super::{dismiss_dialog, step};
use crate::errors::AutomationError;
use crate::interaction::{insert_value, InsertMode};
use crate::platforms::NodeId;
use crate::registry::SystemProfile;
use crate::session::Session;
use crate::snapshot::PageSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

const WORKFLOW: &str = "wrapUp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "camelCase")]
pub enum ContextSource {
    Window(String),
    HiddenField,
}

/// The appointment the page is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentContext {
    pub appointment_id: String,
    pub source: ContextSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WrapUpRequest {
    /// Appended to the wrap-up notes.
    pub notes: Option<String>,
    /// Press the dialog's finish button once everything is filled in.
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapUpOutcome {
    pub appointment: AppointmentContext,
    pub notes_written: bool,
    pub confirmed: bool,
}

/// Looks for the bound appointment: window-level state first, then the
/// hidden form fields carrying the identifier.
pub async fn appointment_context(
    session: &Session,
    profile: &SystemProfile,
) -> Result<Option<AppointmentContext>, AutomationError> {
    let driver = session.driver();
    for path in &profile.appointment_context_paths {
        if let Some(id) = driver.window_value(path).await?.as_ref().and_then(identifier) {
            debug!(%path, "Appointment bound in window state");
            return Ok(Some(AppointmentContext {
                appointment_id: id,
                source: ContextSource::Window(path.clone()),
            }));
        }
    }

    let source = driver.snapshot().await?;
    Ok(hidden_field_context(&source, profile))
}

fn hidden_field_context(source: &str, profile: &SystemProfile) -> Option<AppointmentContext> {
    let snapshot = PageSnapshot::parse(source);
    let appointment_id = profile
        .css_list("appointmentIdFields")
        .iter()
        .flat_map(|css| snapshot.select(css, None))
        .map(PageSnapshot::value_of)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty() && v != "0")?;
    Some(AppointmentContext {
        appointment_id,
        source: ContextSource::HiddenField,
    })
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() && s.trim() != "0" => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

#[instrument(skip(session, request))]
pub async fn wrap_up(session: &Session, request: &WrapUpRequest) -> Result<WrapUpOutcome, AutomationError> {
    let profile = session.profile()?;
    let driver = session.driver();
    let timings = session.timings();

    let bound = step(WORKFLOW, 0, "validate appointment context", appointment_context(session, &profile)).await?;

    let (appointment, dialog) = match bound {
        Some(context) => {
            let dialog = step(WORKFLOW, 1, "open wrap-up dialog", async {
                let button = session.workflow_locator(&profile, "wrapUpButton")?.wait(None).await?;
                driver.click(button.node).await?;
                session
                    .workflow_locator(&profile, "wrapUpDialog")?
                    .wait(Some(timings.dialog_settle))
                    .await
            })
            .await?;
            (context, dialog.node)
        }
        None => {
            warn!("No appointment bound, checking through the wrap-up dialog");
            step(WORKFLOW, 1, "revalidate in wrap-up dialog", revalidate(session, &profile)).await?
        }
    };

    let mut notes_written = false;
    if let Some(notes) = request.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        step(WORKFLOW, 2, "write wrap-up notes", async {
            let field = session
                .workflow_locator(&profile, "wrapUpNotes")?
                .within(dialog)
                .wait(None)
                .await?;
            insert_value(driver, &field, notes, InsertMode::AppendWithSeparator).await
        })
        .await?;
        notes_written = true;
    }

    if request.confirm {
        step(WORKFLOW, 3, "finish wrap-up", async {
            let finish = session
                .workflow_locator(&profile, "wrapUpConfirm")?
                .within(dialog)
                .wait(None)
                .await?;
            driver.click(finish.node).await?;
            let closed = session
                .workflow_locator(&profile, "wrapUpDialog")?
                .wait_gone(Some(timings.dialog_close_timeout))
                .await?;
            if closed {
                Ok(())
            } else {
                Err(AutomationError::Timeout("wrap-up dialog did not close".to_string()))
            }
        })
        .await?;
    }

    info!(appointment = %appointment.appointment_id, "Wrap-up done");
    Ok(WrapUpOutcome {
        appointment,
        notes_written,
        confirmed: request.confirm,
    })
}

/// Opens the dialog, probes again, and closes the dialog when there is
/// still no appointment. Never leaves a dialog behind on failure.
async fn revalidate(
    session: &Session,
    profile: &SystemProfile,
) -> Result<(AppointmentContext, NodeId), AutomationError> {
    let driver = session.driver();
    let timings = session.timings();

    let Some(button) = session.workflow_locator(profile, "wrapUpButton")?.find_now().await? else {
        return Err(AutomationError::AmbiguousContext(
            "no appointment is bound to this page".to_string(),
        ));
    };
    driver.click(button.node).await?;
    let opened = session
        .workflow_locator(profile, "wrapUpDialog")?
        .resolve(Some(timings.dialog_settle))
        .await?;

    match (appointment_context(session, profile).await?, opened) {
        (Some(context), Some(dialog)) => {
            info!(appointment = %context.appointment_id, "Appointment bound once dialog opened");
            Ok((context, dialog.node))
        }
        _ => {
            dismiss_dialog(session, profile, "wrapUpDialog", "wrapUpClose").await?;
            Err(AutomationError::AmbiguousContext(
                "no appointment is bound to this page; wrap-up dialog closed again".to_string(),
            ))
        }
    }
}
