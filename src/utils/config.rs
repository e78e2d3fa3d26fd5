//! Crate config module.

use std::collections::HashMap;

/// Defaults applied whenever a key is missing from the store. Booleans are
/// stored as the strings `"True"` / `"False"`.
const DEFAULTS: &[(&str, &str, &str)] = &[
    ("gox", "currency", "USD"),
    ("gox", "use_ssl", "True"),
    ("gox", "use_plain_old_websocket", "False"),
    ("gox", "load_fulldepth", "True"),
    ("gox", "load_history", "True"),
    ("gox", "secret_key", ""),
    ("gox", "secret_secret", ""),
];

/// Sectioned key/value configuration consumed by the engine. Parsing a
/// config file (and decrypting the credential pair stored in it) happens
/// outside this crate; the engine only reads the already-populated map.
#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    /// An empty config; every lookup falls back to the defaults table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one value.
    pub fn set(&mut self, section: &str, option: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_owned())
            .or_default()
            .insert(option.to_owned(), value.into());
    }

    /// Get a string value without ever failing: stored value first, then the
    /// defaults table, then the empty string.
    #[must_use]
    pub fn get_string(&self, section: &str, option: &str) -> String {
        if let Some(value) = self
            .sections
            .get(section)
            .and_then(|options| options.get(option))
        {
            return value.clone();
        }

        DEFAULTS
            .iter()
            .find(|(dsect, dopt, _)| *dsect == section && *dopt == option)
            .map(|(_, _, default)| (*default).to_owned())
            .unwrap_or_default()
    }

    /// Get a boolean value from the config.
    #[must_use]
    pub fn get_bool(&self, section: &str, option: &str) -> bool {
        self.get_string(section, option) == "True"
    }
}
