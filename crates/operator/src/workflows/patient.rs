use super::step;
use crate::errors::AutomationError;
use crate::extraction::{extract_patient, PatientRecord};
use crate::interaction::type_and_accept;
use crate::session::Session;
use crate::wait::settle;
use tracing::{info, instrument};

const WORKFLOW: &str = "openPatient";

/// Opens a patient's record by file number through the patient search.
///
/// Returns the patient extracted from the opened record, if any.
#[instrument(skip(session))]
pub async fn open_patient(
    session: &Session,
    file_number: &str,
) -> Result<Option<PatientRecord>, AutomationError> {
    let file_number = file_number.trim();
    if file_number.is_empty() || !file_number.chars().all(|c| c.is_ascii_digit()) {
        return Err(AutomationError::InvalidArgument(format!(
            "file number must be numeric, got '{file_number}'"
        )));
    }
    let profile = session.profile()?;
    let driver = session.driver();
    let timings = session.timings();

    step(WORKFLOW, 0, "search patient", async {
        let search = session.workflow_locator(&profile, "patientSearch")?.wait(None).await?;
        let menu = profile.selectors("autocompleteItem")?;
        type_and_accept(driver, &search, file_number, menu, session.autocomplete_options()).await?;
        settle(timings.click_settle).await;
        Ok(())
    })
    .await?;

    step(WORKFLOW, 1, "wait for patient banner", async {
        session
            .workflow_locator(&profile, "patientBanner")?
            .wait(Some(timings.section_open_timeout))
            .await
    })
    .await?;

    let patient = extract_patient(session).await?;
    info!(found = patient.is_some(), "Patient opened");
    Ok(patient)
}
