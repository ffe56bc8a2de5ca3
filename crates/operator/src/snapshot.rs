//! Read-only view of one serialized page state.
//!
//! A [`PageSnapshot`] is parsed from [`PageDriver::snapshot`] output and used
//! synchronously for matching, visibility and text recovery. It is
//! deliberately not `Send`: it cannot be held across an `.await`, so nothing
//! read from the page survives an asynchronous gap.
//!
//! [`PageDriver::snapshot`]: crate::platforms::PageDriver::snapshot

use crate::platforms::{NodeId, BOX_ATTR, NODE_ATTR};
use crate::registry::ElementKind;
use crate::selector::Strategy;
use scraper::{ElementRef, Html, Node, Selector as CssSelector};
use tracing::warn;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "label", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td",
    "th", "thead", "tr", "ul",
];

const NON_RENDERED_TAGS: &[&str] = &["head", "script", "style", "template", "noscript", "title"];

pub struct PageSnapshot {
    html: Html,
}

impl PageSnapshot {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// CSS matches in document order, restricted to descendants of `scope`.
    pub fn select<'a>(&'a self, css: &str, scope: Option<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
        let Some(selector) = compile(css) else {
            return Vec::new();
        };
        match scope {
            Some(scope) => scope.select(&selector).collect(),
            None => self.html.select(&selector).collect(),
        }
    }

    pub fn select_first<'a>(&'a self, css: &str, scope: Option<ElementRef<'a>>) -> Option<ElementRef<'a>> {
        self.select(css, scope).into_iter().next()
    }

    /// All elements matched by one strategy, attached or not rendered alike.
    /// Visibility filtering is the caller's decision.
    pub fn matches<'a>(&'a self, strategy: &Strategy, scope: Option<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
        match strategy {
            Strategy::Css(css) => self.select(css, scope),
            Strategy::Text { within, text } => self.match_text(within.as_deref(), text, scope),
            Strategy::Path(path) => {
                let found = self.match_path(path);
                match scope {
                    Some(scope) => found
                        .into_iter()
                        .filter(|el| is_descendant(*el, scope))
                        .collect(),
                    None => found,
                }
            }
            Strategy::Invalid(reason) => {
                warn!("Skipping invalid selector strategy: {}", reason);
                Vec::new()
            }
        }
    }

    fn match_text<'a>(
        &'a self,
        within: Option<&str>,
        needle: &str,
        scope: Option<ElementRef<'a>>,
    ) -> Vec<ElementRef<'a>> {
        let needle = normalize_inline(needle).to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let contains = |el: &ElementRef<'_>| text_content(*el).to_lowercase().contains(&needle);

        match within {
            Some(css) => self.select(css, scope).into_iter().filter(contains).collect(),
            None => {
                let base = scope.unwrap_or_else(|| self.root());
                base.descendants()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| *el != base || scope.is_none())
                    .filter(contains)
                    // innermost: no child element also carries the label
                    .filter(|el| {
                        !el.children()
                            .filter_map(ElementRef::wrap)
                            .any(|child| contains(&child))
                    })
                    .collect()
            }
        }
    }

    fn match_path(&self, path: &str) -> Vec<ElementRef<'_>> {
        let steps: Vec<&str> = path
            .trim()
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let Some((first, rest)) = steps.split_first() else {
            return Vec::new();
        };

        let root = self.root();
        let Some((name, index)) = parse_path_step(first) else {
            warn!("Invalid address path step '{}' in '{}'", first, path);
            return Vec::new();
        };
        if !(name == "*" || root.value().name().eq_ignore_ascii_case(name)) || index.unwrap_or(1) != 1 {
            return Vec::new();
        }

        let mut current = vec![root];
        for step in rest {
            let Some((name, index)) = parse_path_step(step) else {
                warn!("Invalid address path step '{}' in '{}'", step, path);
                return Vec::new();
            };
            let mut next = Vec::new();
            for parent in &current {
                let same_name: Vec<ElementRef<'_>> = parent
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| name == "*" || c.value().name().eq_ignore_ascii_case(name))
                    .collect();
                match index {
                    Some(i) => next.extend(same_name.get(i.wrapping_sub(1)).copied()),
                    None => next.extend(same_name),
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    pub fn find_node(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.select_first(&format!("[{NODE_ATTR}=\"{}\"]", id.0), None)
    }

    pub fn node_id(el: ElementRef<'_>) -> Option<NodeId> {
        el.value()
            .attr(NODE_ATTR)
            .and_then(|v| v.parse::<u64>().ok())
            .map(NodeId)
    }

    /// Layout-box check. Annotated snapshots carry the driver's answer;
    /// saved pages without annotations fall back to markup hints.
    pub fn has_layout_box(el: ElementRef<'_>) -> bool {
        match el.value().attr(BOX_ATTR) {
            Some(flag) => flag != "0",
            None => !hidden_by_markup(el) && !Self::has_hidden_ancestor(el),
        }
    }

    /// True when any ancestor is currently hidden.
    pub fn has_hidden_ancestor(el: ElementRef<'_>) -> bool {
        el.ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().attr(BOX_ATTR) == Some("0") || hidden_by_markup(a))
    }

    pub fn is_visible(el: ElementRef<'_>) -> bool {
        Self::has_layout_box(el)
    }

    /// Whether `el` sits inside any container matched by `containers`.
    pub fn is_within_any(el: ElementRef<'_>, containers: &[String]) -> bool {
        let selectors: Vec<CssSelector> = containers.iter().filter_map(|c| compile(c)).collect();
        if selectors.is_empty() {
            return false;
        }
        el.ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| selectors.iter().any(|s| s.matches(&a)))
    }

    pub fn tag(el: ElementRef<'_>) -> String {
        el.value().name().to_ascii_lowercase()
    }

    pub fn kind_of(el: ElementRef<'_>) -> Option<ElementKind> {
        match Self::tag(el).as_str() {
            "input" => Some(ElementKind::Input),
            "textarea" => Some(ElementKind::Multiline),
            _ => match el.value().attr("contenteditable") {
                Some(v) if !v.eq_ignore_ascii_case("false") => Some(ElementKind::EditableRegion),
                _ => None,
            },
        }
    }

    /// Value shown by a form control, or the element's visible text.
    pub fn value_of(el: ElementRef<'_>) -> String {
        match Self::tag(el).as_str() {
            "input" | "select" => el.value().attr("value").unwrap_or_default().to_string(),
            "textarea" => el.text().collect::<String>(),
            _ => visible_text(el),
        }
    }
}

/// Whitespace-collapsed text of all descendants, visible or not.
pub fn text_content(el: ElementRef<'_>) -> String {
    normalize_inline(&el.text().collect::<Vec<_>>().join(" "))
}

/// Approximation of rendered text: hidden subtrees are skipped and block
/// elements start new lines. Lines are trimmed and empty lines dropped.
pub fn visible_text(el: ElementRef<'_>) -> String {
    line_text(el, true)
}

/// Line-structured text including hidden subtrees, for content that is in
/// the document but collapsed.
pub fn rendered_text(el: ElementRef<'_>) -> String {
    line_text(el, false)
}

fn line_text(el: ElementRef<'_>, skip_hidden: bool) -> String {
    let mut raw = String::new();
    collect_lines(el, skip_hidden, &mut raw);
    raw.lines()
        .map(normalize_inline)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_lines(el: ElementRef<'_>, skip_hidden: bool, out: &mut String) {
    let tag = PageSnapshot::tag(el);
    if NON_RENDERED_TAGS.contains(&tag.as_str()) {
        return;
    }
    if skip_hidden && (el.value().attr(BOX_ATTR) == Some("0") || hidden_by_markup(el)) {
        return;
    }
    if matches!(tag.as_str(), "input" | "select") {
        return;
    }
    let block = BLOCK_TAGS.contains(&tag.as_str());
    if block {
        out.push('\n');
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(child_el) if child_el.name().eq_ignore_ascii_case("br") => out.push('\n'),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_lines(child, skip_hidden, out);
                }
            }
            _ => {}
        }
    }
    if block {
        out.push('\n');
    }
}

fn hidden_by_markup(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if NON_RENDERED_TAGS.contains(&value.name().to_ascii_lowercase().as_str()) {
        return true;
    }
    if value.attr("hidden").is_some() || value.attr("aria-hidden") == Some("true") {
        return true;
    }
    if value.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
        return true;
    }
    value.attr("style").is_some_and(|style| {
        let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        let style = style.to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn is_descendant(el: ElementRef<'_>, scope: ElementRef<'_>) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(|a| a == scope)
}

fn parse_path_step(step: &str) -> Option<(&str, Option<usize>)> {
    match step.find('[') {
        None => Some((step, None)),
        Some(open) => {
            let close = step.rfind(']').filter(|&c| c > open && c + 1 == step.len())?;
            let index = step[open + 1..close].trim().parse::<usize>().ok()?;
            Some((&step[..open], Some(index)))
        }
    }
}

fn compile(css: &str) -> Option<CssSelector> {
    match CssSelector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Invalid CSS selector '{}': {:?}", css, e);
            None
        }
    }
}

pub fn normalize_inline(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div id="a" data-op-node="1" data-op-box="1">
            <button data-op-node="2" data-op-box="1">Save <span>note</span></button>
            <div data-op-node="3" data-op-box="0"><button data-op-node="4" data-op-box="0">Save note</button></div>
        </div>
        <section><p>First</p><p>Second<br>line</p><p hidden>Gone</p></section>
    </body></html>"#;

    #[test]
    fn test_text_strategy_prefers_innermost_match() {
        let snap = PageSnapshot::parse(PAGE);
        let found = snap.matches(&Strategy::text("Save note"), None);
        let ids: Vec<_> = found.into_iter().filter_map(PageSnapshot::node_id).collect();
        assert_eq!(ids, vec![NodeId(2), NodeId(4)]);
    }

    #[test]
    fn test_box_attribute_drives_visibility() {
        let snap = PageSnapshot::parse(PAGE);
        let hidden = snap.find_node(NodeId(4)).unwrap();
        assert!(!PageSnapshot::is_visible(hidden));
        assert!(PageSnapshot::has_hidden_ancestor(hidden));
        let shown = snap.find_node(NodeId(2)).unwrap();
        assert!(PageSnapshot::is_visible(shown));
    }

    #[test]
    fn test_path_lookup_with_indices() {
        let snap = PageSnapshot::parse(PAGE);
        let found = snap.matches(&Strategy::path("/html/body/section/p[2]"), None);
        assert_eq!(found.len(), 1);
        assert_eq!(text_content(found[0]), "Second line");
        assert!(snap.matches(&Strategy::path("/html/body/section/p[9]"), None).is_empty());
    }

    #[test]
    fn test_malformed_path_steps_match_nothing() {
        let snap = PageSnapshot::parse(PAGE);
        for path in [
            "/html/body/p]x[",
            "/html/body/section/p[",
            "/html/body/section/p[two]",
            "/html/body/section/p[2]x",
            "/html]/body",
        ] {
            assert!(snap.matches(&Strategy::path(path), None).is_empty(), "{path}");
        }
        assert_eq!(parse_path_step("p]x["), None);
        assert_eq!(parse_path_step("p[3]"), Some(("p", Some(3))));
    }

    #[test]
    fn test_visible_text_skips_hidden_and_breaks_lines() {
        let snap = PageSnapshot::parse(PAGE);
        let section = snap.select_first("section", None).unwrap();
        assert_eq!(visible_text(section), "First\nSecond\nline");
    }

    #[test]
    fn test_invalid_css_matches_nothing() {
        let snap = PageSnapshot::parse(PAGE);
        assert!(snap.matches(&Strategy::css("div[[["), None).is_empty());
    }
}
