mod common;

use common::{body, session_for};
use operator::interaction::type_and_accept;
use operator::platforms::memory::EventKind;
use operator::{
    accept_autocomplete_selection, insert_value, AutomationError, DomEvent, InsertMode, Key,
    PageDriver, Strategy,
};
use std::time::Duration;

const FORM: &str = r#"
    <input id="PatientSearch" value="">
    <textarea id="QuickNote"></textarea>
    <textarea id="Filled">Existing line</textarea>
    <div id="ClinicalNote"><div contenteditable="true" id="editor">Seen today</div></div>
    <ul class="ui-autocomplete" style="display: none"><li class="ui-menu-item">Echocardiogram</li></ul>
"#;

#[tokio::test(start_paused = true)]
async fn test_replace_twice_is_idempotent() {
    let (page, session) = session_for(&body(FORM)).await;
    let field = session
        .locator(vec![Strategy::css("#QuickNote")])
        .wait(None)
        .await
        .unwrap();

    for _ in 0..2 {
        let value = insert_value(session.driver(), &field, "Reviewed", InsertMode::Replace)
            .await
            .unwrap();
        assert_eq!(value, "Reviewed");
    }
    assert_eq!(page.value_of("#QuickNote").as_deref(), Some("Reviewed"));
}

#[tokio::test(start_paused = true)]
async fn test_replace_uses_native_setter_then_notifies() {
    let (page, session) = session_for(&body(FORM)).await;
    let field = session
        .locator(vec![Strategy::css("#PatientSearch")])
        .wait(None)
        .await
        .unwrap();
    insert_value(session.driver(), &field, "17755", InsertMode::Replace)
        .await
        .unwrap();

    assert_eq!(
        page.events_for(field.node),
        vec![
            EventKind::NativeSet("17755".into()),
            EventKind::Dom(DomEvent::Input),
            EventKind::Dom(DomEvent::Change),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_append_on_empty_field_has_no_leading_newline() {
    let (page, session) = session_for(&body(FORM)).await;
    let field = session
        .locator(vec![Strategy::css("#QuickNote")])
        .wait(None)
        .await
        .unwrap();
    let value = insert_value(
        session.driver(),
        &field,
        "BP 120/80",
        InsertMode::AppendWithSeparator,
    )
    .await
    .unwrap();
    assert_eq!(value, "BP 120/80");
    assert_eq!(page.focused(), Some(field.node));
}

#[tokio::test(start_paused = true)]
async fn test_append_on_filled_field_adds_one_separator() {
    let (page, session) = session_for(&body(FORM)).await;
    let field = session
        .locator(vec![Strategy::css("#Filled")])
        .wait(None)
        .await
        .unwrap();
    let value = insert_value(
        session.driver(),
        &field,
        "New line",
        InsertMode::AppendWithSeparator,
    )
    .await
    .unwrap();
    assert_eq!(value, "Existing line\nNew line");

    let events = page.events_for(field.node);
    assert_eq!(events.last(), Some(&EventKind::CaretToEnd));
    assert!(events.contains(&EventKind::Focus));
    assert_eq!(page.focused(), Some(field.node));
}

#[tokio::test(start_paused = true)]
async fn test_editable_region_append_and_replace() {
    let (page, session) = session_for(&body(FORM)).await;
    let editor = session
        .locator(vec![Strategy::css("#ClinicalNote [contenteditable=\"true\"]")])
        .wait(None)
        .await
        .unwrap();

    let appended = insert_value(
        session.driver(),
        &editor,
        "Plan: echo",
        InsertMode::AppendWithSeparator,
    )
    .await
    .unwrap();
    assert_eq!(appended, "Seen today\nPlan: echo");

    let replaced = insert_value(session.driver(), &editor, "Fresh note", InsertMode::Replace)
        .await
        .unwrap();
    assert_eq!(replaced, "Fresh note");
    assert_eq!(page.value_of("#editor").as_deref(), Some("Fresh note"));
}

#[tokio::test(start_paused = true)]
async fn test_cursor_insert_writes_at_the_caret() {
    let (page, session) = session_for(&body(FORM)).await;
    let field = session
        .locator(vec![Strategy::css("#Filled")])
        .wait(None)
        .await
        .unwrap();
    let value = insert_value(session.driver(), &field, " (checked)", InsertMode::CursorInsert)
        .await
        .unwrap();
    assert_eq!(value, "Existing line (checked)");
    assert!(page
        .events_for(field.node)
        .contains(&EventKind::InsertText(" (checked)".into())));
}

#[tokio::test(start_paused = true)]
async fn test_autocomplete_highlights_and_commits_when_menu_appears() {
    let (page, session) = session_for(&body(FORM)).await;
    page.on_input("#PatientSearch", |dom| {
        dom.set_hidden("ul.ui-autocomplete", false)
    });
    let profile = session.profile().unwrap();
    let field = session
        .locator(vec![Strategy::css("#PatientSearch")])
        .wait(None)
        .await
        .unwrap();

    let outcome = type_and_accept(
        session.driver(),
        &field,
        "Echo",
        profile.selectors("autocompleteItem").unwrap(),
        session.autocomplete_options(),
    )
    .await
    .unwrap();
    assert!(outcome.menu_appeared);
    assert!(outcome.highlighted);

    let keys: Vec<EventKind> = page
        .events_for(field.node)
        .into_iter()
        .filter(|e| matches!(e, EventKind::KeyPress(_)))
        .collect();
    assert_eq!(
        keys,
        vec![EventKind::KeyPress(Key::ArrowDown), EventKind::KeyPress(Key::Enter)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_autocomplete_without_menu_still_sends_enter() {
    let (page, session) = session_for(&body(FORM)).await;
    let profile = session.profile().unwrap();
    let field = session
        .locator(vec![Strategy::css("#PatientSearch")])
        .wait(None)
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let outcome = accept_autocomplete_selection(
        session.driver(),
        &field,
        profile.selectors("autocompleteItem").unwrap(),
        session.autocomplete_options(),
    )
    .await
    .unwrap();
    assert!(!outcome.menu_appeared);
    assert!(started.elapsed() >= Duration::from_millis(800));

    let events = page.events_for(field.node);
    assert_eq!(events.first(), Some(&EventKind::Focus));
    assert_eq!(events.get(1), Some(&EventKind::CaretToEnd));
    assert_eq!(events.last(), Some(&EventKind::KeyPress(Key::Enter)));
    assert!(!events.contains(&EventKind::KeyPress(Key::ArrowDown)));
}

#[tokio::test(start_paused = true)]
async fn test_detached_target_fails_the_primitive() {
    let (page, session) = session_for(&body(FORM)).await;
    let field = session
        .locator(vec![Strategy::css("#QuickNote")])
        .wait(None)
        .await
        .unwrap();
    page.remove_node(field.node).await.unwrap();

    let err = insert_value(session.driver(), &field, "late", InsertMode::Replace)
        .await
        .unwrap_err();
    assert!(matches!(err, AutomationError::ElementDetached(_)));
}
