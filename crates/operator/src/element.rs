use crate::platforms::NodeId;
use crate::registry::ElementKind;
use crate::selector::Strategy;
use serde::Serialize;

/// A live element found by the resolver.
///
/// Only the handle and how it was found are kept. Values, text and
/// visibility must be re-read through the driver on every use; a
/// `ResolvedElement` is discarded when the request that produced it ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedElement {
    pub node: NodeId,
    /// Strategy that produced the match
    pub strategy: Strategy,
    /// Position of that strategy in the configured list
    pub strategy_index: usize,
    pub tag: String,
    pub kind: Option<ElementKind>,
    pub visible: bool,
    /// Whether the match sits inside a non-target container
    pub in_excluded_container: bool,
    /// Short text preview for logs
    pub label: String,
}

impl ResolvedElement {
    /// Kind used for value insertion; plain elements are treated as inputs.
    pub fn insert_kind(&self) -> ElementKind {
        self.kind.unwrap_or(ElementKind::Input)
    }
}

impl std::fmt::Display for ResolvedElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>{} via {}", self.tag, self.node, self.strategy)?;
        if !self.label.is_empty() {
            write!(f, " \"{}\"", self.label)?;
        }
        Ok(())
    }
}
