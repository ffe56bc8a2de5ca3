//! Field registry: logical field names mapped to selector strategies, per
//! external system profile.
//!
//! Profiles are configuration. They are loaded once (built-in YAML plus any
//! user overrides) and never mutated afterwards; callers share them through
//! `Arc`.

use crate::selector::Strategy;
use crate::AutomationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const BUILTIN_PROFILES: &str = include_str!("../profiles/xestro.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Input,
    Multiline,
    EditableRegion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Filled from the map key when omitted in configuration.
    #[serde(default)]
    pub logical_name: String,
    pub candidate_selectors: Vec<Strategy>,
    pub element_kind: ElementKind,
    #[serde(
        default,
        with = "crate::duration::serde_ms_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub wait_hint: Option<Duration>,
    /// Title of the collapsible section that must be opened before the
    /// field's input region exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemProfile {
    pub name: String,
    pub base_url_pattern: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    #[serde(default)]
    pub workflow_selectors: BTreeMap<String, Vec<Strategy>>,
    /// Template/dialog scaffolding whose matches lose to matches elsewhere.
    #[serde(default)]
    pub non_target_containers: Vec<String>,
    /// Titles of the container holding patient demographics.
    #[serde(default)]
    pub patient_titles: Vec<String>,
    /// Window-level paths that may hold the bound appointment identifier.
    #[serde(default)]
    pub appointment_context_paths: Vec<String>,
}

impl SystemProfile {
    pub fn matches_url(&self, url: &str) -> bool {
        match Regex::new(&self.base_url_pattern) {
            Ok(re) => re.is_match(url),
            Err(e) => {
                warn!(profile = %self.name, "Invalid baseUrlPattern: {}", e);
                false
            }
        }
    }

    /// Looks a field up by logical name, accepting display-style names
    /// ("Investigation Summary") for kebab-case keys.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .get(name)
            .or_else(|| self.fields.get(&logical_key(name)))
    }

    pub fn field_or_err(&self, name: &str) -> Result<&FieldSpec, AutomationError> {
        self.field(name).ok_or_else(|| {
            AutomationError::InvalidArgument(format!(
                "Unknown field '{name}' for profile '{}'",
                self.name
            ))
        })
    }

    /// Strategies registered for a workflow element.
    pub fn selectors(&self, name: &str) -> Result<&[Strategy], AutomationError> {
        self.workflow_selectors
            .get(name)
            .map(Vec::as_slice)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AutomationError::Config(format!(
                    "Profile '{}' has no selectors for '{name}'",
                    self.name
                ))
            })
    }

    /// CSS-only view of a selector entry, for scans inside a snapshot.
    pub fn css_list(&self, name: &str) -> Vec<String> {
        self.workflow_selectors
            .get(name)
            .map(|list| {
                list.iter()
                    .filter_map(|s| match s {
                        Strategy::Css(css) => Some(css.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn normalize(mut self) -> Self {
        for (key, spec) in self.fields.iter_mut() {
            if spec.logical_name.is_empty() {
                spec.logical_name = key.clone();
            }
        }
        self
    }
}

/// "Investigation Summary" -> "investigation-summary"
pub fn logical_key(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    profiles: Vec<Arc<SystemProfile>>,
}

impl Registry {
    /// Registry holding the built-in profiles.
    pub fn builtin() -> Result<Self, AutomationError> {
        Self::from_yaml(BUILTIN_PROFILES)
    }

    /// Parses a YAML list of profiles.
    pub fn from_yaml(source: &str) -> Result<Self, AutomationError> {
        let profiles: Vec<SystemProfile> = serde_yaml::from_str(source)?;
        Ok(Self::from_profiles(profiles))
    }

    pub fn from_profiles(profiles: Vec<SystemProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| Arc::new(p.normalize()))
                .collect(),
        }
    }

    /// Profiles with a known name replace the existing entry; others are
    /// appended after the existing ones.
    pub fn merge(mut self, overrides: Vec<SystemProfile>) -> Self {
        for profile in overrides {
            let profile = Arc::new(profile.normalize());
            match self.profiles.iter_mut().find(|p| p.name == profile.name) {
                Some(slot) => {
                    debug!(profile = %profile.name, "Replacing built-in profile");
                    *slot = profile;
                }
                None => self.profiles.push(profile),
            }
        }
        self
    }

    /// The single profile active for a page address, if any.
    pub fn profile_for_url(&self, url: &str) -> Option<Arc<SystemProfile>> {
        self.profiles.iter().find(|p| p.matches_url(url)).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<SystemProfile>> {
        self.profiles.iter().find(|p| p.name == name).cloned()
    }

    pub fn profiles(&self) -> &[Arc<SystemProfile>] {
        &self.profiles
    }
}
