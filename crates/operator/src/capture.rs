//! External collaborators (capture/transcription, presentation export) and
//! the capture overlay shown on the page while a capture is in progress.

use crate::errors::AutomationError;
use crate::extraction::{InvestigationSummary, PatientRecord};
use crate::platforms::{NodeId, OverlaySpec, PageDriver};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Photo,
    Audio,
}

impl CaptureKind {
    pub fn title(&self) -> &'static str {
        match self {
            CaptureKind::Photo => "Photo capture",
            CaptureKind::Audio => "Dictation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub kind: CaptureKind,
    /// Logical field the result is destined for.
    pub field: String,
}

/// Opaque result of a capture. The engine inserts `content` verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// Produces text (a transcription, an image reference) for insertion.
#[async_trait::async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self, request: &CaptureRequest) -> Result<CapturePayload, AutomationError>;
}

/// Everything extracted for one presentation export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationBundle {
    pub patient: Option<PatientRecord>,
    pub fields: BTreeMap<String, String>,
    pub investigations: InvestigationSummary,
}

/// Renders a presentation from extracted data. Its output is returned to the
/// requester untouched.
#[async_trait::async_trait]
pub trait PresentationProvider: Send + Sync {
    async fn present(&self, bundle: &PresentationBundle) -> Result<Value, AutomationError>;
}

/// A mounted capture overlay. Owned by exactly one [`OverlaySlot`].
#[derive(Debug)]
pub struct Overlay {
    node: NodeId,
    element_id: String,
    kind: CaptureKind,
}

impl Overlay {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }
}

/// The single active-overlay slot of a page session.
///
/// `open` always tears down the previous overlay before mounting a new one;
/// `destroy` is the only other way an overlay leaves the page.
#[derive(Debug, Default)]
pub struct OverlaySlot {
    active: Option<Overlay>,
}

impl OverlaySlot {
    pub async fn open(
        &mut self,
        driver: &Arc<dyn PageDriver>,
        kind: CaptureKind,
        dark: bool,
    ) -> Result<&Overlay, AutomationError> {
        self.destroy(driver).await?;

        let spec = OverlaySpec {
            element_id: format!("operator-capture-{}", uuid::Uuid::new_v4().simple()),
            title: kind.title().to_string(),
            dark,
        };
        let node = driver.mount_overlay(&spec).await?;
        info!(%node, id = %spec.element_id, ?kind, "Capture overlay mounted");
        Ok(self.active.insert(Overlay {
            node,
            element_id: spec.element_id,
            kind,
        }))
    }

    /// Removes the active overlay, if any. Returns whether one was open.
    pub async fn destroy(&mut self, driver: &Arc<dyn PageDriver>) -> Result<bool, AutomationError> {
        let Some(overlay) = self.active.take() else {
            return Ok(false);
        };
        match driver.remove_node(overlay.node).await {
            Ok(()) => debug!(id = %overlay.element_id, "Capture overlay removed"),
            // The page may already have dropped it with a navigation.
            Err(AutomationError::ElementDetached(_)) => {
                warn!(id = %overlay.element_id, "Capture overlay was already gone")
            }
            Err(e) => return Err(e),
        }
        Ok(true)
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Overlay> {
        self.active.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MemoryPage;

    const PAGE: &str = "<html><body><div id=\"app\"></div></body></html>";

    #[tokio::test]
    async fn test_reopen_destroys_previous_overlay() {
        let page = Arc::new(MemoryPage::from_html("https://my.xestro.com/", PAGE));
        let driver: Arc<dyn PageDriver> = page.clone();
        let mut slot = OverlaySlot::default();

        let first = slot.open(&driver, CaptureKind::Photo, false).await.unwrap().node();
        let second = slot.open(&driver, CaptureKind::Audio, true).await.unwrap().node();
        assert_ne!(first, second);
        assert!(!page.mutate(|dom| dom.contains(first)));
        assert_eq!(page.mutate(|dom| dom.select(".operator-overlay")).len(), 1);
        assert!(page.exists(".operator-overlay.dark"));

        assert!(slot.destroy(&driver).await.unwrap());
        assert!(!slot.is_open());
        assert!(!page.exists(".operator-overlay"));
        assert!(!slot.destroy(&driver).await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_tolerates_overlay_removed_by_page() {
        let page = Arc::new(MemoryPage::from_html("https://my.xestro.com/", PAGE));
        let driver: Arc<dyn PageDriver> = page.clone();
        let mut slot = OverlaySlot::default();
        slot.open(&driver, CaptureKind::Photo, false).await.unwrap();
        page.mutate(|dom| dom.remove(".operator-overlay"));
        assert!(slot.destroy(&driver).await.unwrap());
    }
}
