//! Request dispatch.
//!
//! A request names an action and carries a JSON payload. Each action is one
//! entry of [`ACTIONS`]: its name, the payload it expects and its handler.
//! Requests run one at a time against a session.

use crate::capture::{CaptureKind, CaptureRequest, PresentationBundle};
use crate::errors::AutomationError;
use crate::extraction::{
    extract_appointments, extract_field, extract_fields, extract_patient, segment_investigations,
    FieldText, InvestigationSummary,
};
use crate::interaction::InsertMode;
use crate::registry::logical_key;
use crate::session::Session;
use crate::workflows::{
    create_task, insert_into_field, open_patient, open_section, order_test, run_steps, wrap_up,
    OrderRequest, WorkflowStep, WrapUpRequest,
};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

const INVESTIGATION_FIELD: &str = "investigation-summary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action_name: String,
    #[serde(default)]
    pub payload: Value,
}

impl ActionRequest {
    pub fn new(action_name: impl Into<String>, payload: Value) -> Self {
        Self {
            action_name: action_name.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: &AutomationError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

type Handler =
    for<'a> fn(&'a Session, Value) -> BoxFuture<'a, Result<Option<Value>, AutomationError>>;

/// One entry of the command table.
pub struct ActionSpec {
    pub name: &'static str,
    /// Payload shape, for listings.
    pub payload: &'static str,
    pub summary: &'static str,
    /// Whether the action reads or drives the page, and so needs a profile.
    pub needs_page: bool,
    handler: Handler,
}

pub static ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "insertText",
        payload: "{ fieldType, text, mode? }",
        summary: "Insert text into a registry field, opening its section first",
        needs_page: true,
        handler: insert_text,
    },
    ActionSpec {
        name: "openSection",
        payload: "{ title }",
        summary: "Expand a clinical section and focus its note input",
        needs_page: true,
        handler: open_section_action,
    },
    ActionSpec {
        name: "extractPatient",
        payload: "{}",
        summary: "Extract the open patient's demographics",
        needs_page: true,
        handler: extract_patient_action,
    },
    ActionSpec {
        name: "extractField",
        payload: "{ field }",
        summary: "Read the text of one clinical section",
        needs_page: true,
        handler: extract_field_action,
    },
    ActionSpec {
        name: "extractFields",
        payload: "{ fields: [..] }",
        summary: "Read several clinical sections",
        needs_page: true,
        handler: extract_fields_action,
    },
    ActionSpec {
        name: "extractAppointments",
        payload: "{}",
        summary: "Parse the appointment book",
        needs_page: true,
        handler: extract_appointments_action,
    },
    ActionSpec {
        name: "segmentInvestigations",
        payload: "{ text }",
        summary: "Split investigation text into echo, lab and other",
        needs_page: false,
        handler: segment_action,
    },
    ActionSpec {
        name: "orderTest",
        payload: "{ result, searchTerm? }",
        summary: "Order a catalog test and attach a result",
        needs_page: true,
        handler: order_test_action,
    },
    ActionSpec {
        name: "createTask",
        payload: "{ subject? }",
        summary: "Create a follow-up task",
        needs_page: true,
        handler: create_task_action,
    },
    ActionSpec {
        name: "wrapUp",
        payload: "{ notes?, confirm? }",
        summary: "Wrap up the bound appointment",
        needs_page: true,
        handler: wrap_up_action,
    },
    ActionSpec {
        name: "openPatient",
        payload: "{ fileNumber }",
        summary: "Open a patient by file number",
        needs_page: true,
        handler: open_patient_action,
    },
    ActionSpec {
        name: "runSteps",
        payload: "{ workflow?, steps: [..] }",
        summary: "Run an ad hoc list of workflow steps",
        needs_page: true,
        handler: run_steps_action,
    },
    ActionSpec {
        name: "capture",
        payload: "{ fieldType, kind: photo|audio }",
        summary: "Capture through the collaborator and insert the result",
        needs_page: true,
        handler: capture_action,
    },
    ActionSpec {
        name: "closeOverlay",
        payload: "{}",
        summary: "Remove the capture overlay",
        needs_page: false,
        handler: close_overlay_action,
    },
    ActionSpec {
        name: "setDarkMode",
        payload: "{ enabled }",
        summary: "Theme overlays dark or light",
        needs_page: false,
        handler: set_dark_mode_action,
    },
    ActionSpec {
        name: "exportPresentation",
        payload: "{ fields? }",
        summary: "Extract patient and sections and hand them to the presenter",
        needs_page: true,
        handler: export_presentation_action,
    },
    ActionSpec {
        name: "status",
        payload: "{}",
        summary: "Active profile, dark mode and overlay state",
        needs_page: false,
        handler: status_action,
    },
];

pub fn find_action(name: &str) -> Option<&'static ActionSpec> {
    ACTIONS.iter().find(|a| a.name == name)
}

/// Runs one request. Never fails: errors become `success: false` responses.
#[instrument(skip(session, request), fields(action = %request.action_name))]
pub async fn dispatch(session: &Session, request: ActionRequest) -> ActionResponse {
    let Some(action) = find_action(&request.action_name) else {
        let err = AutomationError::UnknownAction(request.action_name);
        warn!("{}", err);
        return ActionResponse::failure(&err);
    };

    let _gate = session.acquire().await;
    let result = async {
        if action.needs_page {
            session.sync_profile().await?;
        }
        (action.handler)(session, request.payload).await
    }
    .await;

    match result {
        Ok(data) => {
            info!("Action completed");
            ActionResponse::ok(data)
        }
        Err(e) => {
            warn!("Action failed: {}", e);
            ActionResponse::failure(&e)
        }
    }
}

fn args<T: DeserializeOwned>(payload: Value) -> Result<T, AutomationError> {
    let payload = match payload {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(payload)
        .map_err(|e| AutomationError::InvalidArgument(format!("Invalid payload: {e}")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertTextArgs {
    #[serde(alias = "field")]
    field_type: String,
    text: String,
    #[serde(default)]
    mode: InsertMode,
}

fn insert_text(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: InsertTextArgs = args(payload)?;
        let value = insert_into_field(session, &a.field_type, &a.text, a.mode).await?;
        Ok(Some(json!({ "field": a.field_type, "value": value })))
    }
    .boxed()
}

#[derive(Deserialize)]
struct OpenSectionArgs {
    title: String,
}

fn open_section_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: OpenSectionArgs = args(payload)?;
        open_section(session, &a.title).await?;
        Ok(None)
    }
    .boxed()
}

fn extract_patient_action(session: &Session, _: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let patient = extract_patient(session).await?;
        Ok(Some(serde_json::to_value(patient)?))
    }
    .boxed()
}

#[derive(Deserialize)]
struct ExtractFieldArgs {
    #[serde(alias = "label", alias = "fieldType")]
    field: String,
}

fn extract_field_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: ExtractFieldArgs = args(payload)?;
        let found = extract_field(session, &a.field).await?;
        Ok(Some(serde_json::to_value(found)?))
    }
    .boxed()
}

#[derive(Deserialize)]
struct ExtractFieldsArgs {
    fields: Vec<String>,
}

/// `{ fields: { name: text }, provenance: { name: strategy } }`
fn field_map(found: &[FieldText]) -> Result<Value, AutomationError> {
    let mut texts = Map::new();
    let mut provenance = Map::new();
    for f in found {
        texts.insert(f.field.clone(), Value::String(f.text.clone()));
        provenance.insert(f.field.clone(), serde_json::to_value(f.provenance)?);
    }
    Ok(json!({ "fields": texts, "provenance": provenance }))
}

fn extract_fields_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: ExtractFieldsArgs = args(payload)?;
        let found = extract_fields(session, &a.fields).await?;
        Ok(Some(field_map(&found)?))
    }
    .boxed()
}

fn extract_appointments_action(session: &Session, _: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let rows = extract_appointments(session).await?;
        Ok(Some(json!({ "appointments": rows })))
    }
    .boxed()
}

#[derive(Deserialize)]
struct SegmentArgs {
    text: String,
}

fn segment_action(_: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: SegmentArgs = args(payload)?;
        Ok(Some(serde_json::to_value(segment_investigations(&a.text))?))
    }
    .boxed()
}

fn order_test_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let request: OrderRequest = args(payload)?;
        let outcome = order_test(session, &request).await?;
        Ok(Some(serde_json::to_value(outcome)?))
    }
    .boxed()
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CreateTaskArgs {
    subject: Option<String>,
}

fn create_task_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: CreateTaskArgs = args(payload)?;
        create_task(session, a.subject.as_deref()).await?;
        Ok(None)
    }
    .boxed()
}

fn wrap_up_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let request: WrapUpRequest = args(payload)?;
        let outcome = wrap_up(session, &request).await?;
        Ok(Some(serde_json::to_value(outcome)?))
    }
    .boxed()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPatientArgs {
    file_number: Value,
}

fn open_patient_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: OpenPatientArgs = args(payload)?;
        let file_number = match a.file_number {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(AutomationError::InvalidArgument(format!(
                    "fileNumber must be a string or number, got {other}"
                )))
            }
        };
        let patient = open_patient(session, &file_number).await?;
        Ok(Some(serde_json::to_value(patient)?))
    }
    .boxed()
}

#[derive(Deserialize)]
struct RunStepsArgs {
    #[serde(default)]
    workflow: Option<String>,
    steps: Vec<WorkflowStep>,
}

fn run_steps_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: RunStepsArgs = args(payload)?;
        let workflow = a.workflow.unwrap_or_else(|| "runSteps".to_string());
        let reports = run_steps(session, &workflow, &a.steps).await?;
        Ok(Some(json!({ "steps": reports })))
    }
    .boxed()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureArgs {
    #[serde(alias = "field")]
    field_type: String,
    kind: CaptureKind,
}

fn capture_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: CaptureArgs = args(payload)?;
        session.profile()?.field_or_err(&a.field_type)?;
        let provider = session.capture_provider()?.clone();
        let driver = session.driver();

        session
            .overlay()
            .lock()
            .await
            .open(driver, a.kind, session.dark_mode())
            .await?;
        let request = CaptureRequest {
            kind: a.kind,
            field: a.field_type.clone(),
        };
        let captured = provider.capture(&request).await;
        session.overlay().lock().await.destroy(driver).await?;

        let payload = captured?;
        let value = insert_into_field(
            session,
            &a.field_type,
            &payload.content,
            InsertMode::AppendWithSeparator,
        )
        .await?;
        Ok(Some(json!({ "field": a.field_type, "value": value, "mime": payload.mime })))
    }
    .boxed()
}

fn close_overlay_action(session: &Session, _: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let closed = session.overlay().lock().await.destroy(session.driver()).await?;
        Ok(Some(json!({ "closed": closed })))
    }
    .boxed()
}

#[derive(Deserialize)]
struct DarkModeArgs {
    enabled: bool,
}

fn set_dark_mode_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: DarkModeArgs = args(payload)?;
        session.set_dark_mode(a.enabled);
        Ok(None)
    }
    .boxed()
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ExportArgs {
    fields: Option<Vec<String>>,
}

fn export_presentation_action(session: &Session, payload: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let a: ExportArgs = args(payload)?;
        let presenter = session.presentation_provider()?.clone();
        let profile = session.profile()?;

        let labels = a.fields.unwrap_or_else(|| {
            profile
                .fields
                .iter()
                .filter(|(_, spec)| spec.section.is_some())
                .map(|(name, _)| name.clone())
                .collect()
        });
        let patient = extract_patient(session).await?;
        let found = extract_fields(session, &labels).await?;

        let investigations = found
            .iter()
            .find(|f| logical_key(&f.field) == INVESTIGATION_FIELD)
            .map(|f| segment_investigations(&f.text))
            .unwrap_or_else(InvestigationSummary::default);
        let fields: BTreeMap<String, String> =
            found.into_iter().map(|f| (f.field, f.text)).collect();

        let bundle = PresentationBundle {
            patient,
            fields,
            investigations,
        };
        Ok(Some(presenter.present(&bundle).await?))
    }
    .boxed()
}

fn status_action(session: &Session, _: Value) -> BoxFuture<'_, Result<Option<Value>, AutomationError>> {
    async move {
        let overlay = session.overlay().lock().await;
        Ok(Some(json!({
            "profile": session.active_profile().map(|p| p.name.clone()),
            "darkMode": session.dark_mode(),
            "overlayOpen": overlay.is_open(),
            "overlayId": overlay.active().map(|o| o.element_id().to_string()),
            "overlayKind": overlay.active().map(|o| o.kind()),
        })))
    }
    .boxed()
}
