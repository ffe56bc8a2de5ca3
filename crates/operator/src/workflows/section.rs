use super::step;
use crate::element::ResolvedElement;
use crate::errors::AutomationError;
use crate::extraction::find_titled_box;
use crate::interaction::{insert_value, InsertMode};
use crate::platforms::NodeId;
use crate::registry::SystemProfile;
use crate::session::Session;
use crate::snapshot::PageSnapshot;
use crate::wait::poll_until;
use tracing::{debug, instrument};

const WORKFLOW: &str = "openSection";

/// Opens the collapsible section titled `title` and returns its note input,
/// focused with the caret at the end.
#[instrument(skip(session))]
pub async fn open_section(session: &Session, title: &str) -> Result<ResolvedElement, AutomationError> {
    let profile = session.profile()?;
    let driver = session.driver();
    let timings = session.timings();

    let header = step(WORKFLOW, 0, "locate section title", async {
        locate_title(session, &profile, title).await?.ok_or_else(|| {
            AutomationError::ElementNotFound(format!(
                "No section titled '{title}' within {:?}",
                timings.resolve_timeout
            ))
        })
    })
    .await?;

    step(WORKFLOW, 1, "click section title", driver.click(header)).await?;

    let input = step(WORKFLOW, 2, "wait for note input", async {
        session
            .workflow_locator(&profile, "noteInput")?
            .wait(Some(timings.section_open_timeout))
            .await
    })
    .await?;

    step(WORKFLOW, 3, "focus note input", async {
        driver.focus(input.node).await?;
        driver.move_caret_to_end(input.node).await
    })
    .await?;

    debug!(%input, "Section open");
    Ok(input)
}

/// Writes `text` into a registry field, opening its section first when the
/// field lives in one. Returns the field's value as read back.
#[instrument(skip(session, text))]
pub async fn insert_into_field(
    session: &Session,
    field: &str,
    text: &str,
    mode: InsertMode,
) -> Result<String, AutomationError> {
    let profile = session.profile()?;
    let spec = profile.field_or_err(field)?;

    let element = match &spec.section {
        Some(section) => {
            open_section(session, section).await?;
            session.field_locator(spec).wait(None).await?
        }
        None => session.field_locator(spec).wait(None).await?,
    };
    insert_value(session.driver(), &element, text, mode).await
}

async fn locate_title(
    session: &Session,
    profile: &SystemProfile,
    title: &str,
) -> Result<Option<NodeId>, AutomationError> {
    let timings = session.timings();
    let driver = session.driver();
    let wanted = [title.to_string()];
    poll_until(timings.resolve_timeout, timings.poll_interval, || {
        let wanted = &wanted;
        async move {
            let source = driver.snapshot().await?;
            let snapshot = PageSnapshot::parse(&source);
            Ok(find_titled_box(&snapshot, profile, wanted).and_then(|b| PageSnapshot::node_id(b.title)))
        }
    })
    .await
}
