use super::{run_steps, StepReport, WorkflowStep};
use crate::config::Timings;
use crate::errors::AutomationError;
use crate::interaction::InsertMode;
use crate::registry::SystemProfile;
use crate::session::Session;
use tracing::instrument;

/// Actions menu, then its task sub-menu, then "create task", each followed
/// by its settle wait. An optional subject is typed into the new task.
pub fn create_task_steps(
    profile: &SystemProfile,
    timings: &Timings,
    subject: Option<&str>,
) -> Result<Vec<WorkflowStep>, AutomationError> {
    let mut steps = vec![
        WorkflowStep::click("open actions menu", profile.selectors("actionsMenu")?)
            .settle(timings.menu_settle),
        WorkflowStep::click("open task sub-menu", profile.selectors("actionsSubmenu")?)
            .settle(timings.menu_settle),
        WorkflowStep::click("click create task", profile.selectors("createTask")?)
            .settle(timings.dialog_settle),
    ];
    if let Some(subject) = subject.filter(|s| !s.trim().is_empty()) {
        steps.push(
            WorkflowStep::type_text(
                "type task subject",
                profile.selectors("taskSubject")?,
                subject,
                InsertMode::Replace,
            )
            .timeout(timings.section_open_timeout),
        );
    }
    Ok(steps)
}

#[instrument(skip(session))]
pub async fn create_task(
    session: &Session,
    subject: Option<&str>,
) -> Result<Vec<StepReport>, AutomationError> {
    let profile = session.profile()?;
    let steps = create_task_steps(&profile, session.timings(), subject)?;
    run_steps(session, "createTask", &steps).await
}
