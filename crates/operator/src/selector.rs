use serde::{Deserialize, Serialize};

/// One way of locating an element on the target page.
///
/// Strategies are tried in the order they are configured for a field; the
/// resolver never evaluates them all at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Strategy {
    /// Plain CSS selector
    Css(String),
    /// Element whose visible text contains `text`, optionally restricted to
    /// elements matching the `within` CSS selector (e.g. `button`)
    Text {
        within: Option<String>,
        text: String,
    },
    /// Absolute address path such as `/html/body/div[2]/span`, for pages
    /// without stable identifiers
    Path(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Strategy {
    pub fn css(selector: impl Into<String>) -> Self {
        Strategy::Css(selector.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Strategy::Text {
            within: None,
            text: text.into(),
        }
    }

    pub fn text_within(within: impl Into<String>, text: impl Into<String>) -> Self {
        Strategy::Text {
            within: Some(within.into()),
            text: text.into(),
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Strategy::Path(path.into())
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Strategy::Invalid(_))
    }

    /// Short tag used in logs and provenance.
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Css(_) => "css",
            Strategy::Text { .. } => "text",
            Strategy::Path(_) => "path",
            Strategy::Invalid(_) => "invalid",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Css(css) => write!(f, "css:{css}"),
            Strategy::Text { within: None, text } => write!(f, "text:{text}"),
            Strategy::Text {
                within: Some(within),
                text,
            } => write!(f, "text({within}):{text}"),
            Strategy::Path(path) => write!(f, "path:{path}"),
            Strategy::Invalid(reason) => write!(f, "invalid:{reason}"),
        }
    }
}

impl From<&str> for Strategy {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Strategy::Invalid("Empty selector".to_string());
        }

        match s {
            _ if s.starts_with("css:") => non_empty(&s[4..], Strategy::css),
            _ if s.starts_with("text(") => {
                let Some(close) = s.find("):") else {
                    return Strategy::Invalid(format!(
                        "Unterminated scope in text selector: \"{s}\". Use 'text(<css>):<label>'."
                    ));
                };
                let within = s[5..close].trim();
                let text = s[close + 2..].trim();
                if within.is_empty() || text.is_empty() {
                    return Strategy::Invalid(format!("Incomplete text selector: \"{s}\""));
                }
                Strategy::text_within(within, text)
            }
            _ if s.starts_with("text:") => non_empty(&s[5..], Strategy::text),
            _ if s.starts_with("path:") => non_empty(&s[5..], Strategy::path),
            _ if s.starts_with('/') => Strategy::Path(s.to_string()),
            _ => Strategy::Css(s.to_string()),
        }
    }
}

fn non_empty(rest: &str, build: fn(String) -> Strategy) -> Strategy {
    let rest = rest.trim();
    if rest.is_empty() {
        Strategy::Invalid("Selector prefix without a value".to_string())
    } else {
        build(rest.to_string())
    }
}

impl From<String> for Strategy {
    fn from(s: String) -> Self {
        Strategy::from(s.as_str())
    }
}

impl From<Strategy> for String {
    fn from(s: Strategy) -> Self {
        s.to_string()
    }
}

/// Parses a list of selector strings, keeping their order.
pub fn strategies<I, S>(items: I) -> Vec<Strategy>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| Strategy::from(s.as_ref()))
        .collect()
}
