//! Interaction primitives: value insertion and keyboard commit sequences.

use crate::element::ResolvedElement;
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::platforms::{DomEvent, Key, NodeId, PageDriver};
use crate::registry::ElementKind;
use crate::selector::Strategy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsertMode {
    #[default]
    Replace,
    /// Newline-separated append; no separator when the field is empty.
    AppendWithSeparator,
    /// Insert at the current caret position.
    CursorInsert,
}

/// Writes `value` into a resolved field and notifies the page's listeners.
///
/// Form controls are always written through the native value setter followed
/// by `input` and `change`, so frameworks that intercept `.value` still see
/// the change. Returns the field's value as read back afterwards.
#[instrument(level = "debug", skip(driver, element, value), fields(element = %element))]
pub async fn insert_value(
    driver: &Arc<dyn PageDriver>,
    element: &ResolvedElement,
    value: &str,
    mode: InsertMode,
) -> Result<String, AutomationError> {
    let node = element.node;
    match (element.insert_kind(), mode) {
        (ElementKind::EditableRegion, InsertMode::Replace) => {
            driver.set_editable_text(node, value).await?;
            notify_changed(driver, node).await?;
        }
        (ElementKind::EditableRegion, InsertMode::AppendWithSeparator) => {
            let existing = driver.read_value(node).await?;
            if has_content(&existing) {
                driver.move_caret_to_end(node).await?;
                driver.insert_at_caret(node, &format!("\n{value}")).await?;
            } else {
                driver.set_editable_text(node, value).await?;
            }
            notify_changed(driver, node).await?;
            keep_for_review(driver, node).await?;
        }
        (_, InsertMode::Replace) => {
            driver.set_native_value(node, value).await?;
            notify_changed(driver, node).await?;
        }
        (_, InsertMode::AppendWithSeparator) => {
            let existing = driver.read_value(node).await?;
            let combined = append_with_separator(&existing, value);
            driver.set_native_value(node, &combined).await?;
            notify_changed(driver, node).await?;
            keep_for_review(driver, node).await?;
        }
        (_, InsertMode::CursorInsert) => {
            driver.focus(node).await?;
            driver.insert_at_caret(node, value).await?;
            notify_changed(driver, node).await?;
        }
    }

    let result = driver.read_value(node).await?;
    debug!(mode = ?mode, chars = result.chars().count(), "Inserted value");
    Ok(result)
}

/// `existing + "\n" + value`, or just `value` when `existing` is blank.
pub fn append_with_separator(existing: &str, value: &str) -> String {
    if has_content(existing) {
        format!("{existing}\n{value}")
    } else {
        value.to_string()
    }
}

fn has_content(existing: &str) -> bool {
    !existing.trim().is_empty()
}

async fn notify_changed(driver: &Arc<dyn PageDriver>, node: NodeId) -> Result<(), AutomationError> {
    driver.dispatch(node, DomEvent::Input).await?;
    driver.dispatch(node, DomEvent::Change).await
}

/// Leaves the caret at the end of a focused field for the operator to review.
async fn keep_for_review(driver: &Arc<dyn PageDriver>, node: NodeId) -> Result<(), AutomationError> {
    driver.focus(node).await?;
    driver.move_caret_to_end(node).await
}

/// Fires the notifications a widget waits for before it persists its value.
pub async fn commit(driver: &Arc<dyn PageDriver>, node: NodeId) -> Result<(), AutomationError> {
    driver.dispatch(node, DomEvent::Input).await?;
    driver.dispatch(node, DomEvent::Change).await?;
    driver.dispatch(node, DomEvent::Blur).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutocompleteOptions {
    /// How long to wait for the suggestion menu.
    pub deadline: Duration,
    pub poll_interval: Duration,
    /// Send a down-arrow before Enter when the menu shows up.
    pub highlight_first: bool,
}

impl Default for AutocompleteOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(800),
            poll_interval: Duration::from_millis(100),
            highlight_first: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteOutcome {
    pub menu_appeared: bool,
    pub highlighted: bool,
}

/// Commits an autocomplete field with the keyboard.
///
/// Focuses the field and moves the caret to the end, waits up to the deadline
/// for a visible suggestion, optionally highlights the first one, and sends
/// Enter. Enter is sent even when no menu appeared, since some widgets accept
/// free text. Only a failure to reach the field itself is an error.
#[instrument(level = "debug", skip(driver, element, menu_items, options), fields(element = %element))]
pub async fn accept_autocomplete_selection(
    driver: &Arc<dyn PageDriver>,
    element: &ResolvedElement,
    menu_items: &[Strategy],
    options: AutocompleteOptions,
) -> Result<AutocompleteOutcome, AutomationError> {
    let node = element.node;
    driver.focus(node).await?;
    driver.move_caret_to_end(node).await?;

    let menu_appeared = if menu_items.is_empty() {
        false
    } else {
        Locator::new(driver.clone(), menu_items)
            .named("autocomplete menu")
            .poll_interval(options.poll_interval)
            .resolve(Some(options.deadline))
            .await?
            .is_some()
    };

    let mut outcome = AutocompleteOutcome {
        menu_appeared,
        highlighted: false,
    };
    if menu_appeared && options.highlight_first {
        driver.press_key(node, Key::ArrowDown).await?;
        outcome.highlighted = true;
    }
    if !menu_appeared {
        debug!("No suggestion menu within {:?}, committing keystroke only", options.deadline);
    }
    driver.press_key(node, Key::Enter).await?;
    Ok(outcome)
}

/// Replaces the field's text, then accepts the matching suggestion.
pub async fn type_and_accept(
    driver: &Arc<dyn PageDriver>,
    element: &ResolvedElement,
    value: &str,
    menu_items: &[Strategy],
    options: AutocompleteOptions,
) -> Result<AutocompleteOutcome, AutomationError> {
    insert_value(driver, element, value, InsertMode::Replace).await?;
    accept_autocomplete_selection(driver, element, menu_items, options).await
}
