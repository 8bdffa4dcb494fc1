//! Router behaviour switches, loadable from JSON.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid router configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Policy flags and language settings for a [`Router`](super::Router).
///
/// Missing fields take their default, so a partial document works:
///
/// ```
/// use pathwise::router::RouterConfig;
///
/// let config = RouterConfig::from_json(r#"{
///     "redirect_fixed_path": false,
///     "supported_languages": ["en", "pt"],
///     "default_language": "en"
/// }"#).unwrap();
///
/// assert!(config.redirect_trailing_slash);
/// assert!(!config.redirect_fixed_path);
/// assert!(config.supports("pt"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Redirect `/foo/` to `/foo` (and back) when only the other form exists.
    pub redirect_trailing_slash: bool,
    /// Clean the path and retry case-insensitively before giving up.
    pub redirect_fixed_path: bool,
    /// Answer `405` with an `Allow` header instead of `404`.
    pub handle_method_not_allowed: bool,
    /// Answer `OPTIONS` requests automatically.
    pub handle_options: bool,
    pub supported_languages: BTreeSet<String>,
    /// Enables language prefixes and negotiation for localized routes. The
    /// default counts as supported even when `supported_languages` omits it.
    pub default_language: Option<String>,
    /// Deadline for handlers of routes without parameters.
    pub handler_timeout_ms: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            redirect_trailing_slash: true,
            redirect_fixed_path: true,
            handle_method_not_allowed: true,
            handle_options: true,
            supported_languages: BTreeSet::from(["en".to_owned()]),
            default_language: None,
            handler_timeout_ms: None,
        }
    }
}

impl RouterConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn supports(&self, language: &str) -> bool {
        self.supported_languages.contains(language) || self.default_language.as_deref() == Some(language)
    }

    /// Supported languages plus the default, in ascending order.
    pub fn languages(&self) -> BTreeSet<&str> {
        self.supported_languages
            .iter()
            .map(String::as_str)
            .chain(self.default_language.as_deref())
            .collect()
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}
