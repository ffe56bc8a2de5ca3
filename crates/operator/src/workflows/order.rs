use super::step;
use crate::errors::AutomationError;
use crate::interaction::{
    accept_autocomplete_selection, commit, insert_value, AutocompleteOutcome, InsertMode,
};
use crate::platforms::NodeId;
use crate::session::Session;
use crate::wait::settle;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

const WORKFLOW: &str = "orderTest";

/// Catalog search term used when the request names none.
pub const DEFAULT_ORDER_TERM: &str = "Echocardiogram";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    /// Result text attached to the order.
    #[serde(alias = "text")]
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcome {
    pub search_term: String,
    pub autocomplete: AutocompleteOutcome,
    pub setup_field: NodeId,
    pub results_field: NodeId,
    pub result_value: String,
}

/// Orders a test from the catalog and attaches a result to it.
///
/// The setup (search) field and the results field are resolved separately
/// and must be different elements.
#[instrument(skip(session, request), fields(term = tracing::field::Empty))]
pub async fn order_test(session: &Session, request: &OrderRequest) -> Result<OrderOutcome, AutomationError> {
    let profile = session.profile()?;
    let driver = session.driver();
    let timings = session.timings();
    let term = request
        .search_term
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_ORDER_TERM)
        .to_string();
    tracing::Span::current().record("term", term.as_str());

    step(WORKFLOW, 0, "open order dialog", async {
        let trigger = session.workflow_locator(&profile, "orderTrigger")?.wait(None).await?;
        driver.click(trigger.node).await?;
        settle(timings.click_settle).await;
        Ok(())
    })
    .await?;

    let setup = step(WORKFLOW, 1, "type search term", async {
        let field = session.workflow_locator(&profile, "orderSetupField")?.wait(None).await?;
        insert_value(driver, &field, &term, InsertMode::Replace).await?;
        Ok(field)
    })
    .await?;

    let autocomplete = step(WORKFLOW, 2, "accept suggestion", async {
        let menu = profile.selectors("autocompleteItem")?;
        let outcome =
            accept_autocomplete_selection(driver, &setup, menu, session.autocomplete_options()).await?;
        settle(timings.autocomplete_settle).await;
        Ok(outcome)
    })
    .await?;

    let results = step(WORKFLOW, 3, "locate results field", async {
        let field = session.workflow_locator(&profile, "orderResultsField")?.wait(None).await?;
        if field.node == setup.node {
            return Err(AutomationError::AmbiguousContext(format!(
                "results field resolved to the setup field {}",
                setup.node
            )));
        }
        Ok(field)
    })
    .await?;

    let result_value = step(WORKFLOW, 4, "insert result", async {
        let value = insert_value(driver, &results, &request.result, InsertMode::Replace).await?;
        commit(driver, results.node).await?;
        Ok(value)
    })
    .await?;

    info!(setup = %setup.node, results = %results.node, "Test ordered");
    Ok(OrderOutcome {
        search_term: term,
        autocomplete,
        setup_field: setup.node,
        results_field: results.node,
        result_value,
    })
}
