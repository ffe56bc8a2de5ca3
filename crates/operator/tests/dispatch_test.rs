mod common;

use common::{body, init_tracing, session_for};
use operator::capture::{
    CaptureKind, CapturePayload, CaptureProvider, CaptureRequest, PresentationBundle,
    PresentationProvider,
};
use operator::platforms::memory::EventKind;
use operator::{
    dispatch, ActionRequest, AutomationError, MemoryPage, Registry, Session, Timings, ACTIONS,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const RECORD: &str = r#"
    <input type="hidden" id="DialogTitleName" value="Mr Adrian Test (17755)">
    <textarea id="QuickNote">Seen in clinic</textarea>
    <div class="XestroBox"><div class="XestroBoxTitle">Investigation Summary</div>
      <div class="XestroBoxContent"><p>Echo: EF 55%</p><p>Creatinine 90</p></div>
    </div>
    <div class="XestroBox"><div class="XestroBoxTitle">Background</div>
      <div class="XestroBoxContent"><p>HTN</p></div>
    </div>
"#;

struct FixedCapture {
    seen: Mutex<Vec<CaptureRequest>>,
}

#[async_trait::async_trait]
impl CaptureProvider for FixedCapture {
    async fn capture(&self, request: &CaptureRequest) -> Result<CapturePayload, AutomationError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(CapturePayload {
            content: "Dictated: chest pain resolved".into(),
            mime: Some("text/plain".into()),
        })
    }
}

struct FailingCapture;

#[async_trait::async_trait]
impl CaptureProvider for FailingCapture {
    async fn capture(&self, _: &CaptureRequest) -> Result<CapturePayload, AutomationError> {
        Err(AutomationError::Collaborator("microphone unavailable".into()))
    }
}

struct EchoPresenter;

#[async_trait::async_trait]
impl PresentationProvider for EchoPresenter {
    async fn present(&self, bundle: &PresentationBundle) -> Result<Value, AutomationError> {
        Ok(serde_json::to_value(bundle)?)
    }
}

async fn run(session: &Session, action: &str, payload: Value) -> operator::ActionResponse {
    dispatch(session, ActionRequest::new(action, payload)).await
}

#[tokio::test]
async fn test_request_and_response_wire_shape() {
    let request: ActionRequest = serde_json::from_value(json!({
        "actionName": "insertText",
        "payload": { "fieldType": "quick-note", "text": "BP 130/85" }
    }))
    .unwrap();
    assert_eq!(request.action_name, "insertText");

    let (page, session) = session_for(&body(RECORD)).await;
    let response = dispatch(&session, request).await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(
        response.data,
        Some(json!({ "field": "quick-note", "value": "BP 130/85" }))
    );
    assert_eq!(page.value_of("#QuickNote").as_deref(), Some("BP 130/85"));
}

#[tokio::test]
async fn test_unknown_action_is_a_single_failure_branch() {
    let (page, session) = session_for(&body(RECORD)).await;
    let response = run(&session, "launchRocket", json!({})).await;
    assert!(!response.success);
    assert_eq!(response.data, None);
    assert_eq!(response.error.as_deref(), Some("Unknown action: launchRocket"));
    assert!(page.events().is_empty());
}

#[tokio::test]
async fn test_bad_payload_is_reported() {
    let (_page, session) = session_for(&body(RECORD)).await;
    let response = run(&session, "insertText", json!({ "text": 4 })).await;
    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("Invalid argument"));
}

#[tokio::test]
async fn test_read_actions_return_records() {
    let (_page, session) = session_for(&body(RECORD)).await;

    let patient = run(&session, "extractPatient", Value::Null).await;
    assert!(patient.success);
    let data = patient.data.unwrap();
    assert_eq!(data["name"], "Mr Adrian Test");
    assert_eq!(data["id"], "17755");
    assert_eq!(data["provenance"], "hidden-input");

    let fields = run(
        &session,
        "extractFields",
        json!({ "fields": ["investigation-summary", "background"] }),
    )
    .await;
    assert_eq!(
        fields.data,
        Some(json!({
            "fields": {
                "investigation-summary": "Echo: EF 55%\nCreatinine 90",
                "background": "HTN"
            },
            "provenance": {
                "investigation-summary": "static-content",
                "background": "static-content"
            }
        }))
    );
}

#[tokio::test]
async fn test_page_actions_need_a_matching_profile() {
    init_tracing();
    let page = Arc::new(MemoryPage::from_html("https://example.org/", &body(RECORD)));
    let session = Session::new(page, Registry::builtin().unwrap(), Timings::default());

    let response = run(&session, "extractPatient", json!({})).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("No system profile"));

    let segmented = run(
        &session,
        "segmentInvestigations",
        json!({ "text": "Echo: EF 55%\nCreatinine 90" }),
    )
    .await;
    assert!(segmented.success);
    assert_eq!(
        segmented.data,
        Some(json!({
            "echocardiography": "EF 55%",
            "laboratory": "Creatinine 90",
            "otherInvestigations": ""
        }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_workflow_failure_names_the_step() {
    let (_page, session) = session_for(&body(RECORD)).await;
    let response = run(&session, "createTask", json!({})).await;
    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.contains("createTask"), "{error}");
    assert!(error.contains("open actions menu"), "{error}");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_path_in_ad_hoc_steps_is_a_step_failure() {
    let (_page, session) = session_for(&body(RECORD)).await;
    let response = run(
        &session,
        "runSteps",
        json!({
            "steps": [{
                "label": "look",
                "action": { "type": "assertPresence" },
                "target": ["/html/body/p]x["],
                "timeout": 200
            }]
        }),
    )
    .await;
    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.contains("look"), "{error}");
}

#[tokio::test]
async fn test_capture_inserts_payload_and_removes_overlay() {
    let (page, session) = session_for(&body(RECORD)).await;
    let provider = Arc::new(FixedCapture {
        seen: Mutex::new(Vec::new()),
    });
    let session = session.with_capture(provider.clone());

    let response = run(
        &session,
        "capture",
        json!({ "fieldType": "quick-note", "kind": "audio" }),
    )
    .await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(
        page.value_of("#QuickNote").as_deref(),
        Some("Seen in clinic\nDictated: chest pain resolved")
    );

    let seen = provider.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, CaptureKind::Audio);
    assert_eq!(seen[0].field, "quick-note");

    let overlay_events: Vec<EventKind> = page
        .events()
        .into_iter()
        .map(|e| e.kind)
        .filter(|k| matches!(k, EventKind::OverlayMounted | EventKind::Removed))
        .collect();
    assert_eq!(overlay_events, vec![EventKind::OverlayMounted, EventKind::Removed]);
    assert!(!page.exists(".operator-overlay"));
}

#[tokio::test]
async fn test_failed_capture_still_removes_overlay() {
    let (page, session) = session_for(&body(RECORD)).await;
    let session = session.with_capture(Arc::new(FailingCapture));

    let response = run(
        &session,
        "capture",
        json!({ "fieldType": "quick-note", "kind": "photo" }),
    )
    .await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("microphone unavailable"));
    assert!(!page.exists(".operator-overlay"));
    assert_eq!(page.value_of("#QuickNote").as_deref(), Some("Seen in clinic"));
}

#[tokio::test]
async fn test_capture_without_provider_touches_nothing() {
    let (page, session) = session_for(&body(RECORD)).await;
    let response = run(
        &session,
        "capture",
        json!({ "fieldType": "quick-note", "kind": "photo" }),
    )
    .await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("no capture provider"));
    assert!(page.events().is_empty());
}

#[tokio::test]
async fn test_session_flags_and_overlay_status() {
    let (_page, session) = session_for(&body(RECORD)).await;

    let response = run(&session, "setDarkMode", json!({ "enabled": true })).await;
    assert!(response.success);
    assert_eq!(response.data, None);
    assert!(session.dark_mode());

    let closed = run(&session, "closeOverlay", json!({})).await;
    assert_eq!(closed.data, Some(json!({ "closed": false })));

    let status = run(&session, "status", json!({})).await.data.unwrap();
    assert_eq!(status["profile"], "xestro");
    assert_eq!(status["darkMode"], true);
    assert_eq!(status["overlayOpen"], false);
    assert_eq!(status["overlayKind"], Value::Null);
}

#[tokio::test]
async fn test_status_reports_open_overlay_until_closed() {
    let (page, session) = session_for(&body(RECORD)).await;
    session
        .overlay()
        .lock()
        .await
        .open(session.driver(), CaptureKind::Audio, false)
        .await
        .unwrap();

    let status = run(&session, "status", json!({})).await.data.unwrap();
    assert_eq!(status["overlayOpen"], true);
    assert_eq!(status["overlayKind"], "audio");

    let closed = run(&session, "closeOverlay", json!({})).await;
    assert_eq!(closed.data, Some(json!({ "closed": true })));
    assert!(!page.exists(".operator-overlay"));
}

#[tokio::test]
async fn test_export_hands_segmented_bundle_to_presenter() {
    let (_page, session) = session_for(&body(RECORD)).await;
    let session = session.with_presenter(Arc::new(EchoPresenter));

    let response = run(
        &session,
        "exportPresentation",
        json!({ "fields": ["investigation-summary", "background"] }),
    )
    .await;
    assert!(response.success, "{:?}", response.error);
    let bundle = response.data.unwrap();
    assert_eq!(bundle["patient"]["name"], "Mr Adrian Test");
    assert_eq!(bundle["fields"]["background"], "HTN");
    assert_eq!(bundle["investigations"]["echocardiography"], "EF 55%");
    assert_eq!(bundle["investigations"]["laboratory"], "Creatinine 90");
}

#[test]
fn test_command_table_covers_every_action() {
    let names: Vec<&str> = ACTIONS.iter().map(|a| a.name).collect();
    for expected in [
        "insertText",
        "openSection",
        "extractPatient",
        "extractField",
        "extractFields",
        "extractAppointments",
        "segmentInvestigations",
        "orderTest",
        "createTask",
        "wrapUp",
        "openPatient",
        "runSteps",
        "capture",
        "closeOverlay",
        "setDarkMode",
        "exportPresentation",
        "status",
    ] {
        assert!(names.contains(&expected), "missing {expected}");
    }
}
