//! Workflow orchestrator.
//!
//! A workflow is a short, strictly ordered list of [`WorkflowStep`]s. Each
//! step first resolves its target (its precondition), then acts, then waits
//! its settle time. The first failing step aborts the workflow with an error
//! naming that step; later steps never run.

mod order;
mod patient;
mod section;
mod task;
mod wrap_up;

pub use order::{order_test, OrderOutcome, OrderRequest, DEFAULT_ORDER_TERM};
pub use patient::open_patient;
pub use section::{insert_into_field, open_section};
pub use task::{create_task, create_task_steps};
pub use wrap_up::{appointment_context, wrap_up, AppointmentContext, ContextSource, WrapUpOutcome, WrapUpRequest};

use crate::element::ResolvedElement;
use crate::errors::AutomationError;
use crate::interaction::{accept_autocomplete_selection, insert_value, InsertMode};
use crate::platforms::{Key, NodeId};
use crate::registry::SystemProfile;
use crate::selector::Strategy;
use crate::session::Session;
use crate::wait::settle;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepAction {
    Click,
    Type {
        #[serde(default)]
        mode: InsertMode,
    },
    AcceptAutocomplete,
    Wait,
    AssertPresence,
    PressKey {
        key: Key,
    },
}

impl StepAction {
    fn needs_target(&self) -> bool {
        !matches!(self, StepAction::Wait)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub label: String,
    pub action: StepAction,
    #[serde(default)]
    pub target: Vec<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Wait after the action; for `Wait` steps, the wait itself.
    #[serde(default, with = "crate::duration::serde_ms")]
    pub settle: Duration,
    /// Resolve timeout; the session default when absent.
    #[serde(
        default,
        with = "crate::duration::serde_ms_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl WorkflowStep {
    fn new(label: &str, action: StepAction, target: &[Strategy]) -> Self {
        Self {
            label: label.to_string(),
            action,
            target: target.to_vec(),
            value: None,
            settle: Duration::ZERO,
            timeout: None,
        }
    }

    pub fn click(label: &str, target: &[Strategy]) -> Self {
        Self::new(label, StepAction::Click, target)
    }

    pub fn type_text(label: &str, target: &[Strategy], value: &str, mode: InsertMode) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::new(label, StepAction::Type { mode }, target)
        }
    }

    pub fn accept_autocomplete(label: &str, target: &[Strategy]) -> Self {
        Self::new(label, StepAction::AcceptAutocomplete, target)
    }

    pub fn wait(label: &str, duration: Duration) -> Self {
        Self {
            settle: duration,
            ..Self::new(label, StepAction::Wait, &[])
        }
    }

    pub fn assert_presence(label: &str, target: &[Strategy]) -> Self {
        Self::new(label, StepAction::AssertPresence, target)
    }

    pub fn press_key(label: &str, target: &[Strategy], key: Key) -> Self {
        Self::new(label, StepAction::PressKey { key }, target)
    }

    pub fn settle(mut self, duration: Duration) -> Self {
        self.settle = duration;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What a completed step acted on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

/// Runs `steps` in order. Fails at the first step whose target cannot be
/// resolved or whose action errors.
#[instrument(skip(session, steps), fields(steps = steps.len()))]
pub async fn run_steps(
    session: &Session,
    workflow: &str,
    steps: &[WorkflowStep],
) -> Result<Vec<StepReport>, AutomationError> {
    let mut reports = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        info!(workflow, index, step = %step.label, "Running step");
        let report = run_step(session, step)
            .await
            .map_err(|e| e.at_step(workflow, index, &step.label))?;
        reports.push(report);
    }
    info!(workflow, "Workflow complete");
    Ok(reports)
}

async fn run_step(session: &Session, step: &WorkflowStep) -> Result<StepReport, AutomationError> {
    let target = if step.action.needs_target() {
        Some(
            session
                .locator(step.target.clone())
                .named(step.label.clone())
                .wait(step.timeout)
                .await?,
        )
    } else {
        None
    };

    if let Some(element) = &target {
        act(session, step, element).await?;
    }
    settle(step.settle).await;

    Ok(StepReport {
        label: step.label.clone(),
        node: target.as_ref().map(|t| t.node),
        strategy: target.map(|t| t.strategy.to_string()),
    })
}

async fn act(
    session: &Session,
    step: &WorkflowStep,
    element: &ResolvedElement,
) -> Result<(), AutomationError> {
    let driver = session.driver();
    match &step.action {
        StepAction::Click => driver.click(element.node).await,
        StepAction::Type { mode } => {
            let value = step.value.as_deref().ok_or_else(|| {
                AutomationError::InvalidArgument(format!("Step '{}' has no value", step.label))
            })?;
            insert_value(driver, element, value, *mode).await.map(|_| ())
        }
        StepAction::AcceptAutocomplete => {
            let items = session
                .active_profile()
                .and_then(|p| p.workflow_selectors.get("autocompleteItem").cloned())
                .unwrap_or_default();
            accept_autocomplete_selection(driver, element, &items, session.autocomplete_options())
                .await
                .map(|_| ())
        }
        StepAction::PressKey { key } => driver.press_key(element.node, *key).await,
        StepAction::AssertPresence | StepAction::Wait => Ok(()),
    }
}

/// Runs one hand-written workflow step, tagging its failure with the step.
pub(crate) async fn step<T, F>(
    workflow: &str,
    index: usize,
    label: &str,
    action: F,
) -> Result<T, AutomationError>
where
    F: Future<Output = Result<T, AutomationError>>,
{
    info!(workflow, index, step = label, "Running step");
    action.await.map_err(|e| e.at_step(workflow, index, label))
}

/// Closes a dialog and verifies it is gone: the close control first, then
/// Escape. A dialog that stays open is an error.
pub(crate) async fn dismiss_dialog(
    session: &Session,
    profile: &SystemProfile,
    dialog: &str,
    close: &str,
) -> Result<(), AutomationError> {
    let driver = session.driver();
    let dialog_locator = session.workflow_locator(profile, dialog)?;
    let timeout = Some(session.timings().dialog_close_timeout);

    let Some(open) = dialog_locator.find_now().await? else {
        return Ok(());
    };

    if let Some(button) = session.workflow_locator(profile, close)?.find_now().await? {
        driver.click(button.node).await?;
        if dialog_locator.wait_gone(timeout).await? {
            return Ok(());
        }
        warn!(dialog, "Close control did not dismiss dialog, trying Escape");
    }

    match driver.press_key(open.node, Key::Escape).await {
        Ok(()) | Err(AutomationError::ElementDetached(_)) => {}
        Err(e) => return Err(e),
    }
    if dialog_locator.wait_gone(timeout).await? {
        Ok(())
    } else {
        Err(AutomationError::Timeout(format!(
            "{dialog} still open after {:?}",
            session.timings().dialog_close_timeout
        )))
    }
}
