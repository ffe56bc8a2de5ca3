use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The operation detected that the page lacks the context it needs
    /// (for example no bound appointment). Side effects have been reverted.
    #[error("Ambiguous context: {0}")]
    AmbiguousContext(String),

    #[error("Workflow '{workflow}' failed at step {index} ({step}): {source}")]
    WorkflowStep {
        workflow: String,
        step: String,
        index: usize,
        #[source]
        source: Box<AutomationError>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is detached from DOM: {0}")]
    ElementDetached(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("No system profile matches the current page: {0}")]
    InactivePage(String),

    #[error("Extension bridge error: {0}")]
    Bridge(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// Wraps an error as the failure of one named workflow step.
    pub fn at_step(self, workflow: &str, index: usize, step: &str) -> Self {
        AutomationError::WorkflowStep {
            workflow: workflow.to_string(),
            step: step.to_string(),
            index,
            source: Box::new(self),
        }
    }

    /// Name of the failed step when this is a workflow failure.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            AutomationError::WorkflowStep { step, .. } => Some(step),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_) | AutomationError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for AutomationError {
    fn from(e: serde_json::Error) -> Self {
        AutomationError::InvalidArgument(e.to_string())
    }
}

impl From<serde_yaml::Error> for AutomationError {
    fn from(e: serde_yaml::Error) -> Self {
        AutomationError::Config(e.to_string())
    }
}
