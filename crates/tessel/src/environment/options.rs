//! Environment configuration.
//!
//! [`EnvironmentOptions`] holds every recognized option with its default, and
//! can be read from YAML:
//!
//! ```yaml
//! debug: true
//! charset: utf-8          # normalized to UTF-8
//! strict_variables: false
//! autoescape: filename    # false | true | html | js | css | filename
//! cache: /var/cache/tessel  # or false
//! auto_reload: null       # null mirrors debug
//! optimizations: -1       # -1 all, 0 none
//! ```
//!
//! Missing keys keep their defaults.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::extension::optimizer::OPTIMIZE_ALL;

/// Base type every compiled unit extends, unless configured otherwise.
pub const DEFAULT_BASE_UNIT_TYPE: &str = "Unit";

/// Template file suffix stripped before guessing a strategy from the name.
pub const TEMPLATE_SUFFIX: &str = ".tsl";

/// Options recognized by [`Environment`](crate::Environment).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentOptions {
    pub debug: bool,
    pub charset: String,
    pub base_unit_type: String,
    pub strict_variables: bool,
    pub autoescape: Autoescape,
    #[serde(deserialize_with = "deserialize_cache")]
    pub cache: Option<PathBuf>,
    pub auto_reload: Option<bool>,
    pub optimizations: i32,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            debug: false,
            charset: "UTF-8".to_string(),
            base_unit_type: DEFAULT_BASE_UNIT_TYPE.to_string(),
            strict_variables: false,
            autoescape: Autoescape::default(),
            cache: None,
            auto_reload: None,
            optimizations: OPTIMIZE_ALL,
        }
    }
}

impl EnvironmentOptions {
    /// Parses options from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::Configuration(format!("invalid environment options: {}", e)))
    }
}

/// Strategy callback for [`Autoescape::Callback`].
pub type AutoescapeCallback = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Default escaping strategy for printed expressions.
#[derive(Clone, Deserialize)]
#[serde(try_from = "AutoescapeRaw")]
pub enum Autoescape {
    /// No automatic escaping.
    Disabled,
    /// A fixed strategy such as `html` or `js`.
    Strategy(String),
    /// Guess the strategy from the template name's extension.
    Filename,
    /// Ask a callback, given the template name.
    Callback(AutoescapeCallback),
}

impl Autoescape {
    /// Creates a callback-driven setting.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Autoescape::Callback(Arc::new(f))
    }

    /// The strategy for `template_name`, `None` when escaping is off.
    pub fn strategy_for(&self, template_name: &str) -> Option<String> {
        match self {
            Autoescape::Disabled => None,
            Autoescape::Strategy(strategy) => Some(strategy.clone()),
            Autoescape::Filename => guess_strategy(template_name).map(str::to_string),
            Autoescape::Callback(callback) => callback(template_name),
        }
    }
}

impl Default for Autoescape {
    fn default() -> Self {
        Autoescape::Strategy("html".to_string())
    }
}

impl fmt::Debug for Autoescape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Autoescape::Disabled => f.write_str("Disabled"),
            Autoescape::Strategy(s) => f.debug_tuple("Strategy").field(s).finish(),
            Autoescape::Filename => f.write_str("Filename"),
            Autoescape::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl PartialEq for Autoescape {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Autoescape::Disabled, Autoescape::Disabled) => true,
            (Autoescape::Strategy(a), Autoescape::Strategy(b)) => a == b,
            (Autoescape::Filename, Autoescape::Filename) => true,
            (Autoescape::Callback(a), Autoescape::Callback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AutoescapeRaw {
    Flag(bool),
    Name(String),
}

impl TryFrom<AutoescapeRaw> for Autoescape {
    type Error = String;

    fn try_from(raw: AutoescapeRaw) -> std::result::Result<Self, Self::Error> {
        match raw {
            AutoescapeRaw::Flag(false) => Ok(Autoescape::Disabled),
            AutoescapeRaw::Flag(true) => Ok(Autoescape::default()),
            AutoescapeRaw::Name(name) => match name.as_str() {
                "filename" | "name" => Ok(Autoescape::Filename),
                "" => Err("Invalid autoescape strategy: ''.".to_string()),
                _ => Ok(Autoescape::Strategy(name)),
            },
        }
    }
}

/// Guesses an escaping strategy from a template name.
///
/// | Extension | Strategy |
/// |-----------|----------|
/// | `js`, `json` | `js` |
/// | `css` | `css` |
/// | `txt` | none |
/// | anything else | `html` |
///
/// A trailing `.tsl` is ignored, so `app.js.tsl` is `js`.
pub fn guess_strategy(template_name: &str) -> Option<&'static str> {
    let name = template_name
        .strip_suffix(TEMPLATE_SUFFIX)
        .unwrap_or(template_name);
    let file = name.rsplit('/').next().unwrap_or(name);
    let extension = file.rsplit_once('.').map_or("", |(_, ext)| ext);
    match extension {
        "js" | "json" => Some("js"),
        "css" => Some("css"),
        "txt" => None,
        _ => Some("html"),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CacheRaw {
    Flag(bool),
    Path(PathBuf),
}

fn deserialize_cache<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<CacheRaw>::deserialize(deserializer)? {
        None | Some(CacheRaw::Flag(false)) => Ok(None),
        Some(CacheRaw::Flag(true)) => Err(serde::de::Error::custom(
            "cache must be a directory path or false",
        )),
        Some(CacheRaw::Path(path)) => Ok(Some(path)),
    }
}
