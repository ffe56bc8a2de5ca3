use crate::AutomationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod bridge;
pub mod memory;

pub use bridge::BridgePage;
pub use memory::MemoryPage;

/// Attribute carrying the driver-assigned node id in every snapshot.
pub const NODE_ATTR: &str = "data-op-node";
/// Attribute carrying `1` when the element has a layout box, `0` otherwise.
pub const BOX_ATTR: &str = "data-op-box";

/// Stable handle of a live element for the lifetime of a page session.
///
/// A handle only names an element; it never caches anything read from it.
/// Operations on a handle whose element left the document fail with
/// [`AutomationError::ElementDetached`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications dispatched so framework-level listeners observe a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEvent {
    Input,
    Change,
    Blur,
}

impl DomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomEvent::Input => "input",
            DomEvent::Change => "change",
            DomEvent::Blur => "blur",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    ArrowDown,
    Enter,
    Escape,
    Tab,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::ArrowDown => "ArrowDown",
            Key::Enter => "Enter",
            Key::Escape => "Escape",
            Key::Tab => "Tab",
        }
    }

    pub fn key_code(&self) -> u32 {
        match self {
            Key::ArrowDown => 40,
            Key::Enter => 13,
            Key::Escape => 27,
            Key::Tab => 9,
        }
    }
}

/// Description of the capture overlay mounted on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlaySpec {
    pub element_id: String,
    pub title: String,
    pub dark: bool,
}

/// The seam to the live target page.
///
/// Implementations must read the page afresh on every call: the external
/// application can mutate its tree at any moment, so nothing read here may be
/// reused after the call returns.
#[async_trait::async_trait]
pub trait PageDriver: Send + Sync {
    /// Current address of the page
    async fn url(&self) -> Result<String, AutomationError>;

    /// Serialized document. Every element carries [`NODE_ATTR`] and
    /// [`BOX_ATTR`]; inputs carry their live value in `value`, textareas as
    /// text content.
    async fn snapshot(&self) -> Result<String, AutomationError>;

    async fn click(&self, node: NodeId) -> Result<(), AutomationError>;

    async fn focus(&self, node: NodeId) -> Result<(), AutomationError>;

    /// Sets the value through the element prototype's native setter,
    /// bypassing any property interceptor installed by a reactive framework.
    async fn set_native_value(&self, node: NodeId, value: &str) -> Result<(), AutomationError>;

    /// Replaces the text of an editable region.
    async fn set_editable_text(&self, node: NodeId, text: &str) -> Result<(), AutomationError>;

    /// Inserts text at the caret of an input or editable region.
    async fn insert_at_caret(&self, node: NodeId, text: &str) -> Result<(), AutomationError>;

    async fn move_caret_to_end(&self, node: NodeId) -> Result<(), AutomationError>;

    /// Live value of an input/textarea, or text of an editable region.
    async fn read_value(&self, node: NodeId) -> Result<String, AutomationError>;

    async fn dispatch(&self, node: NodeId, event: DomEvent) -> Result<(), AutomationError>;

    /// Sends a keydown/keypress/keyup sequence to the element.
    async fn press_key(&self, node: NodeId, key: Key) -> Result<(), AutomationError>;

    /// Reads window-level state by dotted path, e.g. `app.appointment.id`.
    async fn window_value(&self, path: &str) -> Result<Option<Value>, AutomationError>;

    async fn mount_overlay(&self, spec: &OverlaySpec) -> Result<NodeId, AutomationError>;

    async fn remove_node(&self, node: NodeId) -> Result<(), AutomationError>;
}
