use tracing::{debug, instrument, warn};

use crate::element::ResolvedElement;
use crate::errors::AutomationError;
use crate::platforms::{NodeId, PageDriver};
use crate::selector::Strategy;
use crate::snapshot::{text_content, PageSnapshot};
use crate::wait::{poll_condition, poll_until};
use scraper::ElementRef;
use std::sync::Arc;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LABEL_PREVIEW_CHARS: usize = 40;

/// The element resolver.
///
/// On every poll tick the page is read afresh and the strategies are tried
/// in the configured order; the first strategy with a visible match wins
/// that tick. Nothing from one tick is reused by the next.
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn PageDriver>,
    strategies: Vec<Strategy>,
    name: Option<String>,
    timeout: Duration,
    poll_interval: Duration,
    root: Option<NodeId>,
    excluded: Vec<String>,
}

impl Locator {
    pub fn new(driver: Arc<dyn PageDriver>, strategies: impl Into<Vec<Strategy>>) -> Self {
        let strategies: Vec<Strategy> = strategies.into();
        for strategy in strategies.iter().filter(|s| !s.is_valid()) {
            warn!("Ignoring invalid strategy {}", strategy);
        }
        Self {
            driver,
            strategies: strategies.into_iter().filter(Strategy::is_valid).collect(),
            name: None,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            root: None,
            excluded: Vec::new(),
        }
    }

    /// Logical name used in log lines and error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a default timeout for waiting operations on this locator instance.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Restrict matches to descendants of `root`.
    pub fn within(mut self, root: NodeId) -> Self {
        self.root = Some(root);
        self
    }

    /// Containers whose matches lose to matches elsewhere inside the root.
    pub fn excluding(mut self, containers: Vec<String>) -> Self {
        self.excluded = containers;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .strategies
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// Polls until a visible element matches, or the timeout elapses.
    ///
    /// Timing out is `Ok(None)`; callers decide whether that is fatal.
    #[instrument(level = "debug", skip(self, timeout), fields(target = %self.describe()))]
    pub async fn resolve(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<ResolvedElement>, AutomationError> {
        if self.strategies.is_empty() {
            return Err(AutomationError::InvalidSelector(format!(
                "No usable strategies for {}",
                self.describe()
            )));
        }
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let this = self;
        let found = poll_until(effective_timeout, self.poll_interval, move || async move {
            this.tick().await
        })
        .await?;

        match &found {
            Some(element) => debug!("Resolved {}", element),
            None => debug!("Nothing visible after {:?}", effective_timeout),
        }
        Ok(found)
    }

    /// Like [`Locator::resolve`] but a miss is an `ElementNotFound` error.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<ResolvedElement, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        self.resolve(Some(effective_timeout)).await?.ok_or_else(|| {
            AutomationError::ElementNotFound(format!(
                "{} not visible within {:?}",
                self.describe(),
                effective_timeout
            ))
        })
    }

    /// Single check without waiting.
    pub async fn find_now(&self) -> Result<Option<ResolvedElement>, AutomationError> {
        self.resolve(Some(Duration::ZERO)).await
    }

    /// Polls until no visible element matches. Returns false on timeout.
    pub async fn wait_gone(&self, timeout: Option<Duration>) -> Result<bool, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let this = self;
        poll_condition(effective_timeout, self.poll_interval, move || async move {
            Ok(this.tick().await?.is_none())
        })
        .await
    }

    async fn tick(&self) -> Result<Option<ResolvedElement>, AutomationError> {
        let source = self.driver.snapshot().await?;
        resolve_in_snapshot(&source, &self.strategies, self.root, &self.excluded)
    }
}

/// One resolver tick over a serialized page.
pub(crate) fn resolve_in_snapshot(
    source: &str,
    strategies: &[Strategy],
    root: Option<NodeId>,
    excluded: &[String],
) -> Result<Option<ResolvedElement>, AutomationError> {
    let snapshot = PageSnapshot::parse(source);
    let scope = match root {
        Some(id) => Some(snapshot.find_node(id).ok_or_else(|| {
            AutomationError::ElementDetached(format!("Scope root {id} left the document"))
        })?),
        None => None,
    };

    for (index, strategy) in strategies.iter().enumerate() {
        let visible: Vec<ElementRef<'_>> = snapshot
            .matches(strategy, scope)
            .into_iter()
            .filter(|el| is_candidate(strategy, *el))
            .collect();
        let Some(&first) = visible.first() else {
            continue;
        };

        let chosen = if scope.is_some() && !excluded.is_empty() {
            visible
                .iter()
                .copied()
                .find(|el| !PageSnapshot::is_within_any(*el, excluded))
                .unwrap_or(first)
        } else {
            first
        };
        if let Some(element) = describe_match(chosen, strategy, index, excluded) {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

fn is_candidate(strategy: &Strategy, el: ElementRef<'_>) -> bool {
    if PageSnapshot::node_id(el).is_none() || !PageSnapshot::is_visible(el) {
        return false;
    }
    match strategy {
        Strategy::Text { .. } => !PageSnapshot::has_hidden_ancestor(el),
        _ => true,
    }
}

fn describe_match(
    el: ElementRef<'_>,
    strategy: &Strategy,
    strategy_index: usize,
    excluded: &[String],
) -> Option<ResolvedElement> {
    let label: String = text_content(el).chars().take(LABEL_PREVIEW_CHARS).collect();
    Some(ResolvedElement {
        node: PageSnapshot::node_id(el)?,
        strategy: strategy.clone(),
        strategy_index,
        tag: PageSnapshot::tag(el),
        kind: PageSnapshot::kind_of(el),
        visible: PageSnapshot::is_visible(el),
        in_excluded_container: PageSnapshot::is_within_any(el, excluded),
        label,
    })
}
