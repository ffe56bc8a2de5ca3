//! UI automation and data extraction for a browser-hosted clinical records
//! application.
//!
//! The engine locates fields in a page it does not control, writes into them
//! the way the page's own widgets expect, drives short multi-step workflows
//! and reads structured records back out of the rendered document. It talks
//! to the page only through the [`PageDriver`] trait.

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod duration;
pub mod element;
pub mod errors;
pub mod extension_bridge;
pub mod extraction;
pub mod interaction;
pub mod locator;
pub mod platforms;
pub mod registry;
pub mod selector;
pub mod session;
pub mod snapshot;
pub mod wait;
pub mod workflows;

pub use capture::{
    CaptureKind, CapturePayload, CaptureProvider, CaptureRequest, Overlay, OverlaySlot,
    PresentationBundle, PresentationProvider,
};
pub use config::{EngineConfig, Timings};
pub use dispatch::{dispatch, ActionRequest, ActionResponse, ActionSpec, ACTIONS};
pub use element::ResolvedElement;
pub use errors::AutomationError;
pub use extension_bridge::ExtensionBridge;
pub use interaction::{accept_autocomplete_selection, insert_value, AutocompleteOptions, InsertMode};
pub use locator::Locator;
pub use platforms::{BridgePage, DomEvent, Key, MemoryPage, NodeId, PageDriver};
pub use registry::{ElementKind, FieldSpec, Registry, SystemProfile};
pub use selector::Strategy;
pub use session::Session;
pub use workflows::{run_steps, StepAction, StepReport, WorkflowStep};
