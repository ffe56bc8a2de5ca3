//! In-memory page used by tests and for offline extraction from saved pages.
//!
//! The document is imported once from HTML into an owned tree. Element
//! handles are assigned in document order and stay valid until the element
//! is removed. Page behaviour (menus opening on click, dialogs closing on
//! Escape) is scripted with reactions registered against CSS selectors.

use crate::platforms::{DomEvent, Key, NodeId, OverlaySpec, PageDriver, BOX_ATTR, NODE_ATTR};
use crate::snapshot::PageSnapshot;
use crate::AutomationError;
use scraper::{ElementRef, Html, Node};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const NON_RENDERED_TAGS: &[&str] = &["head", "script", "style", "template", "noscript", "title"];

#[derive(Debug, Clone)]
enum Child {
    Element(u64),
    Text(String),
}

#[derive(Debug, Clone)]
struct DomNode {
    tag: String,
    attrs: BTreeMap<String, String>,
    children: Vec<Child>,
    parent: Option<u64>,
    /// Live value of form controls
    value: Option<String>,
    caret: usize,
}

impl DomNode {
    fn is_form_control(&self) -> bool {
        self.value.is_some()
    }

    fn is_editable(&self) -> bool {
        self.attrs
            .get("contenteditable")
            .is_some_and(|v| !v.eq_ignore_ascii_case("false"))
    }

    fn hides_itself(&self) -> bool {
        if NON_RENDERED_TAGS.contains(&self.tag.as_str()) || self.attrs.contains_key("hidden") {
            return true;
        }
        if self
            .attrs
            .get("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
        {
            return true;
        }
        self.attrs.get("style").is_some_and(|style| {
            let style: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        })
    }
}

/// The owned document tree of a [`MemoryPage`], plus its window state.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: HashMap<u64, DomNode>,
    root: u64,
    next_id: u64,
    window: Value,
}

impl MemoryDom {
    pub fn from_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut dom = Self {
            nodes: HashMap::new(),
            root: 0,
            next_id: 1,
            window: Value::Object(Map::new()),
        };
        dom.root = dom.import(parsed.root_element(), None);
        dom
    }

    fn import(&mut self, el: ElementRef<'_>, parent: Option<u64>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let tag = el.value().name().to_ascii_lowercase();
        let mut attrs: BTreeMap<String, String> = el
            .value()
            .attrs()
            .filter(|(name, _)| *name != NODE_ATTR && *name != BOX_ATTR)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let value = match tag.as_str() {
            "input" => Some(attrs.remove("value").unwrap_or_default()),
            "textarea" => Some(el.text().collect::<String>()),
            _ => None,
        };
        let caret = value.as_ref().map_or(0, |v| v.chars().count());
        self.nodes.insert(
            id,
            DomNode {
                tag: tag.clone(),
                attrs,
                children: Vec::new(),
                parent,
                value,
                caret,
            },
        );

        if tag != "textarea" {
            let mut children = Vec::new();
            for child in el.children() {
                match child.value() {
                    Node::Text(text) => {
                        let text: &str = text;
                        children.push(Child::Text(text.to_string()));
                    }
                    Node::Element(_) => {
                        if let Some(child_el) = ElementRef::wrap(child) {
                            children.push(Child::Element(self.import(child_el, Some(id))));
                        }
                    }
                    _ => {}
                }
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children = children;
            }
        }
        id
    }

    /// Annotated serialization, the same shape a live driver produces.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str("<!DOCTYPE html>");
        self.write_node(self.root, false, &mut out);
        out
    }

    fn write_node(&self, id: u64, parent_hidden: bool, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let hidden = parent_hidden || node.hides_itself();

        let _ = write!(out, "<{}", node.tag);
        for (name, value) in &node.attrs {
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        if node.tag == "input" {
            let value = node.value.as_deref().unwrap_or_default();
            let _ = write!(out, " value=\"{}\"", escape_attr(value));
        }
        let _ = write!(
            out,
            " {NODE_ATTR}=\"{id}\" {BOX_ATTR}=\"{}\">",
            if hidden { 0 } else { 1 }
        );

        if VOID_TAGS.contains(&node.tag.as_str()) {
            return;
        }
        if node.tag == "textarea" {
            out.push_str(&escape_text(node.value.as_deref().unwrap_or_default()));
        } else {
            for child in &node.children {
                match child {
                    Child::Text(text) => out.push_str(&escape_text(text)),
                    Child::Element(child_id) => self.write_node(*child_id, hidden, out),
                }
            }
        }
        let _ = write!(out, "</{}>", node.tag);
    }

    /// Handles of all elements matching `css`, in document order.
    pub fn select(&self, css: &str) -> Vec<NodeId> {
        let snapshot = PageSnapshot::parse(&self.serialize());
        snapshot
            .select(css, None)
            .into_iter()
            .filter_map(PageSnapshot::node_id)
            .collect()
    }

    pub fn first(&self, css: &str) -> Option<NodeId> {
        self.select(css).into_iter().next()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node.0)
    }

    pub fn matches(&self, node: NodeId, css: &str) -> bool {
        self.select(css).contains(&node)
    }

    /// Toggles the `hidden` attribute; showing also drops an inline
    /// `display: none`.
    pub fn set_hidden(&mut self, css: &str, hidden: bool) {
        for id in self.select(css) {
            if let Some(node) = self.nodes.get_mut(&id.0) {
                if hidden {
                    node.attrs.insert("hidden".into(), String::new());
                } else {
                    node.attrs.remove("hidden");
                    if node
                        .attrs
                        .get("style")
                        .is_some_and(|s| s.replace(' ', "").contains("display:none"))
                    {
                        node.attrs.remove("style");
                    }
                }
            }
        }
    }

    pub fn remove(&mut self, css: &str) {
        for id in self.select(css) {
            self.remove_node(id);
        }
    }

    /// Detaches an element and forgets its whole subtree.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(removed) = self.nodes.remove(&node.0) else {
            return false;
        };
        if let Some(parent) = removed.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent
                .children
                .retain(|c| !matches!(c, Child::Element(id) if *id == node.0));
        }
        for child in removed.children {
            if let Child::Element(id) = child {
                self.remove_node(NodeId(id));
            }
        }
        true
    }

    /// Parses `html` and appends it under the first element matching
    /// `parent_css`. Returns the handles of the new top-level elements.
    pub fn append_html(&mut self, parent_css: &str, html: &str) -> Vec<NodeId> {
        let Some(parent) = self.first(parent_css) else {
            debug!("append_html: no parent matches '{}'", parent_css);
            return Vec::new();
        };
        self.append_html_to(parent, html)
    }

    fn append_html_to(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(html);
        let mut added = Vec::new();
        for child in fragment.root_element().children() {
            let new_child = match child.value() {
                Node::Text(text) => {
                    let text: &str = text;
                    Child::Text(text.to_string())
                }
                Node::Element(_) => match ElementRef::wrap(child) {
                    Some(el) => {
                        let id = self.import(el, Some(parent.0));
                        added.push(NodeId(id));
                        Child::Element(id)
                    }
                    None => continue,
                },
                _ => continue,
            };
            if let Some(node) = self.nodes.get_mut(&parent.0) {
                node.children.push(new_child);
            }
        }
        added
    }

    pub fn set_attr(&mut self, css: &str, name: &str, value: &str) {
        for id in self.select(css) {
            if let Some(node) = self.nodes.get_mut(&id.0) {
                node.attrs.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn add_class(&mut self, css: &str, class: &str) {
        for id in self.select(css) {
            if let Some(node) = self.nodes.get_mut(&id.0) {
                let classes = node.attrs.entry("class".into()).or_default();
                if !classes.split_whitespace().any(|c| c == class) {
                    if !classes.is_empty() {
                        classes.push(' ');
                    }
                    classes.push_str(class);
                }
            }
        }
    }

    pub fn remove_class(&mut self, css: &str, class: &str) {
        for id in self.select(css) {
            if let Some(classes) = self.nodes.get_mut(&id.0).and_then(|n| n.attrs.get_mut("class")) {
                *classes = classes
                    .split_whitespace()
                    .filter(|c| *c != class)
                    .collect::<Vec<_>>()
                    .join(" ");
            }
        }
    }

    /// Sets the live value of matching form controls.
    pub fn set_value(&mut self, css: &str, value: &str) {
        for id in self.select(css) {
            if let Some(node) = self.nodes.get_mut(&id.0) {
                if node.is_form_control() {
                    node.caret = value.chars().count();
                    node.value = Some(value.to_string());
                }
            }
        }
    }

    /// Live value of a form control or text of any other element.
    pub fn value(&self, node: NodeId) -> Option<String> {
        let dom_node = self.nodes.get(&node.0)?;
        match &dom_node.value {
            Some(value) => Some(value.clone()),
            None => Some(self.text(node)),
        }
    }

    pub fn text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node.0, &mut out);
        out
    }

    fn collect_text(&self, id: u64, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if let Some(value) = &node.value {
            if node.tag == "textarea" {
                out.push_str(value);
            }
            return;
        }
        for child in &node.children {
            match child {
                Child::Text(text) => out.push_str(text),
                Child::Element(child_id) => self.collect_text(*child_id, out),
            }
        }
    }

    fn replace_text(&mut self, node: NodeId, text: &str) {
        if let Some(dom_node) = self.nodes.get(&node.0) {
            let old: Vec<u64> = dom_node
                .children
                .iter()
                .filter_map(|c| match c {
                    Child::Element(id) => Some(*id),
                    Child::Text(_) => None,
                })
                .collect();
            for id in old {
                self.remove_node(NodeId(id));
            }
        }
        if let Some(dom_node) = self.nodes.get_mut(&node.0) {
            dom_node.children = vec![Child::Text(text.to_string())];
        }
    }

    /// Sets window-level state at a dotted path, creating objects on the way.
    pub fn set_window_value(&mut self, path: &str, value: Value) {
        let mut current = &mut self.window;
        let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };
        for part in parents {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let Some(map) = current.as_object_mut() else {
                return;
            };
            current = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        if let Some(map) = current.as_object_mut() {
            map.insert(last.to_string(), value);
        }
    }

    pub fn window_value(&self, path: &str) -> Option<Value> {
        let mut current = &self.window;
        for part in path.split('.').filter(|p| !p.is_empty()) {
            current = current.get(part)?;
        }
        (!current.is_null()).then(|| current.clone())
    }

    fn node(&self, node: NodeId) -> Result<&DomNode, AutomationError> {
        self.nodes
            .get(&node.0)
            .ok_or_else(|| AutomationError::ElementDetached(format!("{node} is not attached")))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut DomNode, AutomationError> {
        self.nodes
            .get_mut(&node.0)
            .ok_or_else(|| AutomationError::ElementDetached(format!("{node} is not attached")))
    }
}

/// What the page saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Click,
    Focus,
    NativeSet(String),
    EditableSet(String),
    InsertText(String),
    CaretToEnd,
    Dom(DomEvent),
    KeyPress(Key),
    OverlayMounted,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub node: NodeId,
    pub kind: EventKind,
}

type Reaction = Arc<dyn Fn(&mut MemoryDom) + Send + Sync>;

enum Trigger {
    Click(String),
    Key(String, Key),
    Input(String),
}

struct PageState {
    url: String,
    dom: MemoryDom,
    events: Vec<RecordedEvent>,
    focused: Option<NodeId>,
}

/// [`PageDriver`] over an in-memory document.
pub struct MemoryPage {
    state: Mutex<PageState>,
    reactions: Mutex<Vec<(Trigger, Reaction)>>,
}

impl MemoryPage {
    pub fn from_html(url: impl Into<String>, html: &str) -> Self {
        Self {
            state: Mutex::new(PageState {
                url: url.into(),
                dom: MemoryDom::from_html(html),
                events: Vec::new(),
                focused: None,
            }),
            reactions: Mutex::new(Vec::new()),
        }
    }

    /// Runs `f` whenever an element matching `css` is clicked.
    pub fn on_click<F>(&self, css: &str, f: F) -> &Self
    where
        F: Fn(&mut MemoryDom) + Send + Sync + 'static,
    {
        self.add_reaction(Trigger::Click(css.to_string()), Arc::new(f))
    }

    /// Runs `f` whenever `key` is pressed on an element matching `css`.
    pub fn on_key<F>(&self, css: &str, key: Key, f: F) -> &Self
    where
        F: Fn(&mut MemoryDom) + Send + Sync + 'static,
    {
        self.add_reaction(Trigger::Key(css.to_string(), key), Arc::new(f))
    }

    /// Runs `f` whenever an `input` event reaches an element matching `css`.
    pub fn on_input<F>(&self, css: &str, f: F) -> &Self
    where
        F: Fn(&mut MemoryDom) + Send + Sync + 'static,
    {
        self.add_reaction(Trigger::Input(css.to_string()), Arc::new(f))
    }

    fn add_reaction(&self, trigger: Trigger, reaction: Reaction) -> &Self {
        if let Ok(mut reactions) = self.reactions.lock() {
            reactions.push((trigger, reaction));
        }
        self
    }

    /// Direct access to the document, for test setup.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut MemoryDom) -> T) -> T {
        let mut state = self.lock_state();
        f(&mut state.dom)
    }

    pub fn set_url(&self, url: &str) {
        self.lock_state().url = url.to_string();
    }

    pub fn set_window_value(&self, path: &str, value: Value) {
        self.lock_state().dom.set_window_value(path, value);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock_state().events.clone()
    }

    pub fn events_for(&self, node: NodeId) -> Vec<EventKind> {
        self.lock_state()
            .events
            .iter()
            .filter(|e| e.node == node)
            .map(|e| e.kind.clone())
            .collect()
    }

    pub fn clear_events(&self) {
        self.lock_state().events.clear();
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.lock_state().focused
    }

    pub fn node(&self, css: &str) -> Option<NodeId> {
        self.lock_state().dom.first(css)
    }

    pub fn exists(&self, css: &str) -> bool {
        self.node(css).is_some()
    }

    /// Value of the first element matching `css`.
    pub fn value_of(&self, css: &str) -> Option<String> {
        let state = self.lock_state();
        let node = state.dom.first(css)?;
        state.dom.value(node)
    }

    /// Whether the first element matching `css` has a layout box.
    pub fn is_visible(&self, css: &str) -> bool {
        let source = self.lock_state().dom.serialize();
        let snapshot = PageSnapshot::parse(&source);
        snapshot
            .select_first(css, None)
            .is_some_and(PageSnapshot::is_visible)
    }

    pub fn html(&self) -> String {
        self.lock_state().dom.serialize()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PageState> {
        // A panicking reaction only poisons test state; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(state: &mut PageState, node: NodeId, kind: EventKind) {
        trace!(%node, ?kind, "memory page event");
        state.events.push(RecordedEvent { node, kind });
    }

    fn fire(&self, state: &mut PageState, node: NodeId, wanted: impl Fn(&Trigger) -> Option<&str>) {
        let matched: Vec<Reaction> = match self.reactions.lock() {
            Ok(reactions) => reactions
                .iter()
                .filter(|(trigger, _)| {
                    wanted(trigger).is_some_and(|css| state.dom.matches(node, css))
                })
                .map(|(_, reaction)| reaction.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        for reaction in matched {
            reaction(&mut state.dom);
        }
    }
}

#[async_trait::async_trait]
impl PageDriver for MemoryPage {
    async fn url(&self) -> Result<String, AutomationError> {
        Ok(self.lock_state().url.clone())
    }

    async fn snapshot(&self) -> Result<String, AutomationError> {
        Ok(self.lock_state().dom.serialize())
    }

    async fn click(&self, node: NodeId) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        state.dom.node(node)?;
        state.focused = Some(node);
        Self::record(&mut state, node, EventKind::Click);
        self.fire(&mut state, node, |t| match t {
            Trigger::Click(css) => Some(css.as_str()),
            _ => None,
        });
        Ok(())
    }

    async fn focus(&self, node: NodeId) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        state.dom.node(node)?;
        state.focused = Some(node);
        Self::record(&mut state, node, EventKind::Focus);
        Ok(())
    }

    async fn set_native_value(&self, node: NodeId, value: &str) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        let target = state.dom.node_mut(node)?;
        if !target.is_form_control() {
            return Err(AutomationError::InvalidArgument(format!(
                "<{}>{node} has no value property",
                target.tag
            )));
        }
        target.value = Some(value.to_string());
        target.caret = value.chars().count();
        Self::record(&mut state, node, EventKind::NativeSet(value.to_string()));
        Ok(())
    }

    async fn set_editable_text(&self, node: NodeId, text: &str) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        if !state.dom.node(node)?.is_editable() {
            return Err(AutomationError::InvalidArgument(format!(
                "{node} is not an editable region"
            )));
        }
        state.dom.replace_text(node, text);
        Self::record(&mut state, node, EventKind::EditableSet(text.to_string()));
        Ok(())
    }

    async fn insert_at_caret(&self, node: NodeId, text: &str) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        let target = state.dom.node_mut(node)?;
        let caret = target.caret;
        if let Some(value) = target.value.as_mut() {
            let byte_at = value
                .char_indices()
                .nth(caret)
                .map_or(value.len(), |(i, _)| i);
            value.insert_str(byte_at, text);
            target.caret = caret + text.chars().count();
        } else if target.is_editable() {
            target.children.push(Child::Text(text.to_string()));
        } else {
            return Err(AutomationError::InvalidArgument(format!(
                "{node} does not accept text"
            )));
        }
        Self::record(&mut state, node, EventKind::InsertText(text.to_string()));
        Ok(())
    }

    async fn move_caret_to_end(&self, node: NodeId) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        let target = state.dom.node_mut(node)?;
        target.caret = target.value.as_ref().map_or(0, |v| v.chars().count());
        Self::record(&mut state, node, EventKind::CaretToEnd);
        Ok(())
    }

    async fn read_value(&self, node: NodeId) -> Result<String, AutomationError> {
        let state = self.lock_state();
        state.dom.node(node)?;
        Ok(state.dom.value(node).unwrap_or_default())
    }

    async fn dispatch(&self, node: NodeId, event: DomEvent) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        state.dom.node(node)?;
        Self::record(&mut state, node, EventKind::Dom(event));
        if event == DomEvent::Input {
            self.fire(&mut state, node, |t| match t {
                Trigger::Input(css) => Some(css.as_str()),
                _ => None,
            });
        }
        Ok(())
    }

    async fn press_key(&self, node: NodeId, key: Key) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        state.dom.node(node)?;
        Self::record(&mut state, node, EventKind::KeyPress(key));
        self.fire(&mut state, node, |t| match t {
            Trigger::Key(css, k) if *k == key => Some(css.as_str()),
            _ => None,
        });
        Ok(())
    }

    async fn window_value(&self, path: &str) -> Result<Option<Value>, AutomationError> {
        Ok(self.lock_state().dom.window_value(path))
    }

    async fn mount_overlay(&self, spec: &OverlaySpec) -> Result<NodeId, AutomationError> {
        let mut state = self.lock_state();
        let body = state
            .dom
            .first("body")
            .ok_or_else(|| AutomationError::Internal("Document has no body".into()))?;
        let class = if spec.dark {
            "operator-overlay dark"
        } else {
            "operator-overlay"
        };
        let html = format!(
            "<div id=\"{}\" class=\"{class}\"><h2>{}</h2></div>",
            escape_attr(&spec.element_id),
            escape_text(&spec.title)
        );
        let node = state
            .dom
            .append_html_to(body, &html)
            .into_iter()
            .next()
            .ok_or_else(|| AutomationError::Internal("Overlay markup produced no element".into()))?;
        Self::record(&mut state, node, EventKind::OverlayMounted);
        Ok(node)
    }

    async fn remove_node(&self, node: NodeId) -> Result<(), AutomationError> {
        let mut state = self.lock_state();
        if !state.dom.remove_node(node) {
            return Err(AutomationError::ElementDetached(format!(
                "{node} is not attached"
            )));
        }
        if state.focused == Some(node) {
            state.focused = None;
        }
        Self::record(&mut state, node, EventKind::Removed);
        Ok(())
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <input id="name" value="Ann">
        <textarea id="note">line one</textarea>
        <div id="menu" hidden><span class="item">First</span></div>
        <button id="open">Open</button>
        <div id="editor" contenteditable="true">draft</div>
    </body></html>"#;

    #[tokio::test]
    async fn test_snapshot_carries_live_values_and_boxes() {
        let page = MemoryPage::from_html("https://my.xestro.com/", PAGE);
        let input = page.node("#name").unwrap();
        page.set_native_value(input, "Bob \"B\"").await.unwrap();

        let snapshot = PageSnapshot::parse(&page.snapshot().await.unwrap());
        let el = snapshot.select_first("#name", None).unwrap();
        assert_eq!(PageSnapshot::value_of(el), "Bob \"B\"");
        let item = snapshot.select_first(".item", None).unwrap();
        assert!(!PageSnapshot::is_visible(item));
        assert_eq!(page.value_of("#note").as_deref(), Some("line one"));
    }

    #[tokio::test]
    async fn test_click_reaction_updates_dom() {
        let page = MemoryPage::from_html("https://my.xestro.com/", PAGE);
        page.on_click("#open", |dom| dom.set_hidden("#menu", false));
        assert!(!page.is_visible(".item"));
        page.click(page.node("#open").unwrap()).await.unwrap();
        assert!(page.is_visible(".item"));
    }

    #[tokio::test]
    async fn test_removed_nodes_are_detached() {
        let page = MemoryPage::from_html("https://my.xestro.com/", PAGE);
        let menu = page.node("#menu").unwrap();
        let item = page.node(".item").unwrap();
        page.remove_node(menu).await.unwrap();
        assert!(matches!(
            page.click(item).await,
            Err(AutomationError::ElementDetached(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_at_caret_respects_caret() {
        let page = MemoryPage::from_html("https://my.xestro.com/", PAGE);
        let note = page.node("#note").unwrap();
        page.move_caret_to_end(note).await.unwrap();
        page.insert_at_caret(note, "\nline two").await.unwrap();
        assert_eq!(page.read_value(note).await.unwrap(), "line one\nline two");

        let editor = page.node("#editor").unwrap();
        page.set_editable_text(editor, "fresh").await.unwrap();
        assert_eq!(page.read_value(editor).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_window_paths() {
        let page = MemoryPage::from_html("https://my.xestro.com/", PAGE);
        page.set_window_value("Appointment.Id", Value::from(42));
        assert_eq!(
            page.window_value("Appointment.Id").await.unwrap(),
            Some(Value::from(42))
        );
        assert_eq!(page.window_value("Appointment.Missing").await.unwrap(), None);
    }
}
