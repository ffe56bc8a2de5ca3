use crate::capture::{CaptureProvider, OverlaySlot, PresentationProvider};
use crate::config::{EngineConfig, Timings};
use crate::errors::AutomationError;
use crate::interaction::AutocompleteOptions;
use crate::locator::Locator;
use crate::platforms::PageDriver;
use crate::registry::{FieldSpec, Registry, SystemProfile};
use crate::selector::Strategy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Context of one page session.
///
/// Holds everything the engine's components share for a page: the driver,
/// the profile selected for the page's address, the dark-mode flag and the
/// capture overlay slot. Lives as long as the page session and is passed
/// explicitly to every operation.
pub struct Session {
    driver: Arc<dyn PageDriver>,
    registry: Registry,
    timings: Timings,
    profile: RwLock<Option<Arc<SystemProfile>>>,
    dark_mode: AtomicBool,
    overlay: Mutex<OverlaySlot>,
    capture: Option<Arc<dyn CaptureProvider>>,
    presenter: Option<Arc<dyn PresentationProvider>>,
    gate: Mutex<()>,
}

impl Session {
    pub fn new(driver: Arc<dyn PageDriver>, registry: Registry, timings: Timings) -> Self {
        Self {
            driver,
            registry,
            timings,
            profile: RwLock::new(None),
            dark_mode: AtomicBool::new(false),
            overlay: Mutex::new(OverlaySlot::default()),
            capture: None,
            presenter: None,
            gate: Mutex::new(()),
        }
    }

    pub fn from_config(
        driver: Arc<dyn PageDriver>,
        config: &EngineConfig,
    ) -> Result<Self, AutomationError> {
        Ok(Self::new(driver, config.registry()?, config.timings.clone()))
    }

    pub fn with_capture(mut self, provider: Arc<dyn CaptureProvider>) -> Self {
        self.capture = Some(provider);
        self
    }

    pub fn with_presenter(mut self, provider: Arc<dyn PresentationProvider>) -> Self {
        self.presenter = Some(provider);
        self
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Re-selects the active profile from the page's current address.
    pub async fn sync_profile(&self) -> Result<Option<Arc<SystemProfile>>, AutomationError> {
        let url = self.driver.url().await?;
        let selected = self.registry.profile_for_url(&url);

        let mut slot = self.profile.write().unwrap_or_else(|p| p.into_inner());
        let previous = slot.as_ref().map(|p| p.name.clone());
        let current = selected.as_ref().map(|p| p.name.clone());
        if previous != current {
            match &current {
                Some(name) => info!(profile = %name, %url, "Profile activated"),
                None => info!(%url, "No profile matches page, engine inert"),
            }
        }
        *slot = selected.clone();
        Ok(selected)
    }

    pub fn active_profile(&self) -> Option<Arc<SystemProfile>> {
        self.profile
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// The active profile, or `InactivePage` when none matched.
    pub fn profile(&self) -> Result<Arc<SystemProfile>, AutomationError> {
        self.active_profile().ok_or_else(|| {
            AutomationError::InactivePage("no profile selected for this page".to_string())
        })
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode.load(Ordering::Relaxed)
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        debug!(enabled, "Dark mode");
        self.dark_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn overlay(&self) -> &Mutex<OverlaySlot> {
        &self.overlay
    }

    pub fn capture_provider(&self) -> Result<&Arc<dyn CaptureProvider>, AutomationError> {
        self.capture.as_ref().ok_or_else(|| {
            AutomationError::Collaborator("no capture provider configured".to_string())
        })
    }

    pub fn presentation_provider(&self) -> Result<&Arc<dyn PresentationProvider>, AutomationError> {
        self.presenter.as_ref().ok_or_else(|| {
            AutomationError::Collaborator("no presentation provider configured".to_string())
        })
    }

    /// Serializes requests against the page.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Resolver over `strategies` with the session's timings and the active
    /// profile's non-target containers.
    pub fn locator(&self, strategies: impl Into<Vec<Strategy>>) -> Locator {
        let excluded = self
            .active_profile()
            .map(|p| p.non_target_containers.clone())
            .unwrap_or_default();
        Locator::new(self.driver.clone(), strategies)
            .set_default_timeout(self.timings.resolve_timeout)
            .poll_interval(self.timings.poll_interval)
            .excluding(excluded)
    }

    /// Resolver for a named workflow element of `profile`.
    pub fn workflow_locator(
        &self,
        profile: &SystemProfile,
        name: &str,
    ) -> Result<Locator, AutomationError> {
        Ok(self.locator(profile.selectors(name)?).named(name))
    }

    /// Resolver for a registry field, honouring its wait hint.
    pub fn field_locator(&self, spec: &FieldSpec) -> Locator {
        let locator = self
            .locator(spec.candidate_selectors.clone())
            .named(spec.logical_name.clone());
        match spec.wait_hint {
            Some(hint) => locator.set_default_timeout(hint),
            None => locator,
        }
    }

    pub fn autocomplete_options(&self) -> AutocompleteOptions {
        AutocompleteOptions {
            deadline: self.timings.autocomplete_deadline,
            poll_interval: self.timings.poll_interval,
            highlight_first: true,
        }
    }
}
