mod common;

use common::{body, session_for};
use operator::platforms::memory::EventKind;
use operator::workflows::{
    create_task, insert_into_field, open_patient, open_section, order_test, wrap_up,
    ContextSource, OrderRequest, WrapUpRequest, DEFAULT_ORDER_TERM,
};
use operator::{run_steps, AutomationError, DomEvent, InsertMode, Key, WorkflowStep};
use serde_json::json;

const SECTIONS: &str = r#"
    <div class="XestroBox" id="bg">
      <div class="XestroBoxTitle">Background</div>
      <div class="XestroBoxContent" hidden><textarea id="AddNoteArea">HTN</textarea></div>
    </div>
    <div class="XestroBox" id="meds">
      <div class="XestroBoxTitle">Medications</div>
      <div class="XestroBoxContent"><p>Aspirin 100mg</p></div>
    </div>
"#;

fn expand_background_on_click(page: &operator::MemoryPage) {
    page.on_click("#bg .XestroBoxTitle", |dom| {
        dom.add_class("#bg", "open");
        dom.set_hidden("#bg .XestroBoxContent", false);
    });
}

#[tokio::test(start_paused = true)]
async fn test_open_section_focuses_note_input_at_end() {
    let (page, session) = session_for(&body(SECTIONS)).await;
    expand_background_on_click(&page);

    let input = open_section(&session, "Background").await.unwrap();
    assert_eq!(Some(input.node), page.node("#AddNoteArea"));
    assert_eq!(page.focused(), Some(input.node));
    assert_eq!(
        page.events_for(input.node),
        vec![EventKind::Focus, EventKind::CaretToEnd]
    );
}

#[tokio::test(start_paused = true)]
async fn test_open_section_names_the_failing_step() {
    let (_page, session) = session_for(&body(SECTIONS)).await;

    let err = open_section(&session, "Background").await.unwrap_err();
    assert_eq!(err.failed_step(), Some("wait for note input"));
    match err {
        AutomationError::WorkflowStep {
            workflow, index, source, ..
        } => {
            assert_eq!(workflow, "openSection");
            assert_eq!(index, 2);
            assert!(matches!(*source, AutomationError::ElementNotFound(_)));
        }
        other => panic!("expected a workflow step error, got {other:?}"),
    }

    let missing = open_section(&session, "Allergies").await.unwrap_err();
    assert_eq!(missing.failed_step(), Some("locate section title"));
}

#[tokio::test(start_paused = true)]
async fn test_insert_into_section_field_appends() {
    let (page, session) = session_for(&body(SECTIONS)).await;
    expand_background_on_click(&page);

    let value = insert_into_field(&session, "Background", "T2DM", InsertMode::AppendWithSeparator)
        .await
        .unwrap();
    assert_eq!(value, "HTN\nT2DM");
    assert_eq!(page.value_of("#AddNoteArea").as_deref(), Some("HTN\nT2DM"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_field_is_rejected_before_touching_the_page() {
    let (page, session) = session_for(&body(SECTIONS)).await;
    let err = insert_into_field(&session, "shoe-size", "44", InsertMode::Replace)
        .await
        .unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)));
    assert!(page.events().is_empty());
}

const ORDER_PAGE: &str = r#"
    <button id="OrderTestButton">Order</button>
    <div id="order-dialog" hidden>
      <input id="TestSearch" value="">
      <ul class="ui-autocomplete" style="display: none"><li class="ui-menu-item">Echocardiogram (TTE)</li></ul>
      <textarea id="TestResults"></textarea>
    </div>
"#;

#[tokio::test(start_paused = true)]
async fn test_order_test_keeps_setup_and_results_fields_apart() {
    let (page, session) = session_for(&body(ORDER_PAGE)).await;
    page.on_click("#OrderTestButton", |dom| dom.set_hidden("#order-dialog", false));
    page.on_input("#TestSearch", |dom| dom.set_hidden("ul.ui-autocomplete", false));

    let outcome = order_test(
        &session,
        &OrderRequest {
            search_term: None,
            result: "LVEF 60%, normal valves".into(),
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.search_term, DEFAULT_ORDER_TERM);
    assert!(outcome.autocomplete.menu_appeared);
    assert_ne!(outcome.setup_field, outcome.results_field);
    assert_eq!(page.value_of("#TestSearch").as_deref(), Some(DEFAULT_ORDER_TERM));
    assert_eq!(
        page.value_of("#TestResults").as_deref(),
        Some("LVEF 60%, normal valves")
    );

    let results_events = page.events_for(outcome.results_field);
    assert_eq!(results_events.last(), Some(&EventKind::Dom(DomEvent::Blur)));
    assert!(page
        .events_for(outcome.setup_field)
        .contains(&EventKind::KeyPress(Key::Enter)));
}

#[tokio::test(start_paused = true)]
async fn test_order_test_fails_at_trigger_when_absent() {
    let (page, session) = session_for(&body("<p>No order button</p>")).await;
    let err = order_test(
        &session,
        &OrderRequest {
            search_term: Some("Holter".into()),
            result: "Sinus rhythm".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.failed_step(), Some("open order dialog"));
    assert!(page.events().is_empty());
}

const TASK_PAGE: &str = r#"
    <button id="PatientActionsButton">Actions</button>
    <ul class="dropdown-menu" id="actions" hidden><li><a id="tasks">Tasks</a></li></ul>
    <ul class="dropdown-menu" id="task-menu" hidden><li><a id="create">Create Task</a></li></ul>
    <div id="task-dialog" hidden><input id="TaskSubject" value=""></div>
"#;

#[tokio::test(start_paused = true)]
async fn test_create_task_clicks_in_order_and_types_subject() {
    let (page, session) = session_for(&body(TASK_PAGE)).await;
    page.on_click("#PatientActionsButton", |dom| dom.set_hidden("#actions", false));
    page.on_click("#tasks", |dom| dom.set_hidden("#task-menu", false));
    page.on_click("#create", |dom| dom.set_hidden("#task-dialog", false));

    let reports = create_task(&session, Some("Follow up echo")).await.unwrap();
    assert_eq!(reports.len(), 4);

    let clicks: Vec<_> = page
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::Click)
        .map(|e| e.node)
        .collect();
    assert_eq!(
        clicks,
        vec![
            page.node("#PatientActionsButton").unwrap(),
            page.node("#tasks").unwrap(),
            page.node("#create").unwrap(),
        ]
    );
    assert_eq!(page.value_of("#TaskSubject").as_deref(), Some("Follow up echo"));
}

#[tokio::test(start_paused = true)]
async fn test_create_task_fails_fast_on_first_click() {
    let (page, session) = session_for(&body(
        r#"<ul class="dropdown-menu"><li><a id="tasks">Tasks</a></li><li><a id="create">Create Task</a></li></ul>"#,
    ))
    .await;

    let err = create_task(&session, None).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("open actions menu"));
    assert!(err.to_string().contains("createTask"));
    assert!(page.events().is_empty(), "later steps must not run");
}

const WRAP_UP_PAGE: &str = r#"
    <button id="WrapUpButton">Wrap Up</button>
    <div id="dialogs"></div>
"#;

const WRAP_UP_DIALOG: &str = r#"<div id="WrapUpDialog" class="ui-dialog">
    <button class="ui-dialog-titlebar-close">x</button>
    <textarea id="WrapUpNotes">Reviewed</textarea>
    <button id="finish">Finish</button>
</div>"#;

fn wrap_up_dialog_behaviour(page: &operator::MemoryPage) {
    page.on_click("#WrapUpButton", |dom| {
        dom.append_html("#dialogs", WRAP_UP_DIALOG);
    });
    page.on_click("#WrapUpDialog .ui-dialog-titlebar-close", |dom| dom.remove("#WrapUpDialog"));
    page.on_click("#finish", |dom| dom.remove("#WrapUpDialog"));
}

#[tokio::test(start_paused = true)]
async fn test_wrap_up_with_bound_appointment() {
    let (page, session) = session_for(&body(WRAP_UP_PAGE)).await;
    wrap_up_dialog_behaviour(&page);
    page.set_window_value("currentAppointmentId", json!(88412));

    let outcome = wrap_up(
        &session,
        &WrapUpRequest {
            notes: Some("Echo booked".into()),
            confirm: true,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.appointment.appointment_id, "88412");
    assert_eq!(
        outcome.appointment.source,
        ContextSource::Window("currentAppointmentId".into())
    );
    assert!(outcome.notes_written);
    assert!(outcome.confirmed);
    assert!(!page.exists("#WrapUpDialog"));
}

#[tokio::test(start_paused = true)]
async fn test_wrap_up_notes_go_into_the_open_dialog_only() {
    let stale = r#"<div class="ui-dialog inactive"><textarea id="WrapUpNotes">Old visit</textarea></div>"#;
    let (page, session) = session_for(&body(&format!("{stale}{WRAP_UP_PAGE}"))).await;
    wrap_up_dialog_behaviour(&page);
    page.set_window_value("currentAppointmentId", json!(88412));

    let outcome = wrap_up(
        &session,
        &WrapUpRequest {
            notes: Some("Echo booked".into()),
            confirm: false,
        },
    )
    .await
    .unwrap();

    assert!(outcome.notes_written);
    assert_eq!(
        page.value_of("#WrapUpDialog #WrapUpNotes").as_deref(),
        Some("Reviewed\nEcho booked")
    );
    assert_eq!(page.value_of(".inactive #WrapUpNotes").as_deref(), Some("Old visit"));
}

#[tokio::test(start_paused = true)]
async fn test_wrap_up_without_context_closes_the_dialog_it_opened() {
    let (page, session) = session_for(&body(WRAP_UP_PAGE)).await;
    wrap_up_dialog_behaviour(&page);

    let err = wrap_up(
        &session,
        &WrapUpRequest {
            notes: Some("Should never be written".into()),
            confirm: true,
        },
    )
    .await
    .unwrap_err();

    match &err {
        AutomationError::WorkflowStep { source, .. } => {
            assert!(matches!(**source, AutomationError::AmbiguousContext(_)))
        }
        other => panic!("expected a workflow step error, got {other:?}"),
    }
    assert_eq!(err.failed_step(), Some("revalidate in wrap-up dialog"));
    assert!(page.node("#WrapUpButton").is_some());
    assert!(!page.exists("#WrapUpDialog"), "dialog must not be left open");
}

#[tokio::test(start_paused = true)]
async fn test_wrap_up_abort_falls_back_to_escape() {
    let (page, session) = session_for(&body(WRAP_UP_PAGE)).await;
    page.on_click("#WrapUpButton", |dom| {
        dom.append_html("#dialogs", WRAP_UP_DIALOG);
    });
    page.on_key("#WrapUpDialog", Key::Escape, |dom| dom.remove("#WrapUpDialog"));

    let err = wrap_up(&session, &WrapUpRequest::default()).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("revalidate in wrap-up dialog"));
    assert!(!page.exists("#WrapUpDialog"));
}

#[tokio::test(start_paused = true)]
async fn test_wrap_up_proceeds_when_dialog_binds_appointment() {
    let (page, session) = session_for(&body(WRAP_UP_PAGE)).await;
    page.on_click("#WrapUpButton", |dom| {
        dom.append_html(
            "#dialogs",
            r#"<div id="WrapUpDialog"><input type="hidden" name="AppointmentId" value="5531"></div>"#,
        );
    });

    let outcome = wrap_up(&session, &WrapUpRequest::default()).await.unwrap();
    assert_eq!(outcome.appointment.appointment_id, "5531");
    assert_eq!(outcome.appointment.source, ContextSource::HiddenField);
    assert!(page.exists("#WrapUpDialog"));
}

#[tokio::test(start_paused = true)]
async fn test_open_patient_by_file_number() {
    let (page, session) = session_for(&body(
        r#"<input id="PatientSearch" value="">
           <ul class="ui-autocomplete" style="display: none"><li class="ui-menu-item">Test, Adrian (17755)</li></ul>
           <div id="record"></div>"#,
    ))
    .await;
    page.on_input("#PatientSearch", |dom| dom.set_hidden("ul.ui-autocomplete", false));
    page.on_key("#PatientSearch", Key::Enter, |dom| {
        dom.append_html(
            "#record",
            r#"<input type="hidden" id="DialogTitleName" value="Mr Adrian Test (17755)">
               <div id="PatientBanner">DOB: 02/03/1961 Ph: 0412 345 678</div>"#,
        );
    });

    let patient = open_patient(&session, "17755").await.unwrap().unwrap();
    assert_eq!(patient.name, "Mr Adrian Test");
    assert_eq!(patient.details.id.as_deref(), Some("17755"));
    assert_eq!(patient.details.dob.as_deref(), Some("02/03/1961"));

    let err = open_patient(&session, "17a55").await.unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)));
}

#[tokio::test(start_paused = true)]
async fn test_run_steps_from_json_reports_each_step() {
    let (page, session) = session_for(&body(TASK_PAGE)).await;
    page.on_click("#PatientActionsButton", |dom| dom.set_hidden("#actions", false));

    let steps: Vec<WorkflowStep> = serde_json::from_value(json!([
        { "label": "open menu", "action": { "type": "click" }, "target": ["#PatientActionsButton"], "settle": 300 },
        { "label": "pause", "action": { "type": "wait" }, "settle": "1s" },
        { "label": "menu shown", "action": { "type": "assertPresence" }, "target": ["text(.dropdown-menu a):Tasks"] },
        { "label": "missing", "action": { "type": "click" }, "target": ["#nope"], "timeout": 200 }
    ]))
    .unwrap();

    let err = run_steps(&session, "custom", &steps).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("missing"));
    assert!(matches!(err, AutomationError::WorkflowStep { index: 3, .. }));

    let reports = run_steps(&session, "custom", &steps[..3]).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].node, page.node("#PatientActionsButton"));
    assert_eq!(reports[1].node, None);
    assert_eq!(reports[2].node, page.node("#tasks"));
}
