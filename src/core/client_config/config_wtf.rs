// ─── Config.wtf ───
// Key/value client configuration: `SET key "value"` or `SET key value` per line.

use tracing::{debug, warn};

use crate::core::state::LauncherSettings;

/// Keys that pre-fill the account name on the client's login screen.
pub const AUTOFILL_KEYS: [&str; 2] = ["lastAccountName", "accountName"];

/// Keys that make the client show an account selection dropdown instead.
pub const DROPDOWN_KEYS: [&str; 2] = ["accountList", "savedAccountList"];

/// Parsed client config, preserving first-seen key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    entries: Vec<(String, String)>,
}

impl ClientConfig {
    /// Parse `SET` directives. Any other line is dropped, since the file is
    /// rewritten wholesale.
    pub fn parse(text: &str) -> Self {
        let mut config = ClientConfig::default();
        for line in text.lines() {
            let Some(rest) = line.strip_prefix("SET ") else {
                continue;
            };
            let Some((key, value)) = rest.trim().split_once(' ') else {
                warn!("Skipping malformed Config.wtf line: {:?}", line);
                continue;
            };
            config.set(key.trim(), value.trim().trim_matches('"'));
        }
        config
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite in place, or append when the key is new.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Insert only when the key is absent.
    pub fn set_default(&mut self, key: &str, value: impl Into<String>) {
        if !self.contains_key(key) {
            self.entries.push((key.to_string(), value.into()));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// One `SET` line per entry; numeric values stay unquoted.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            if is_numeric(value) {
                out.push_str(&format!("SET {key} {value}\n"));
            } else {
                out.push_str(&format!("SET {key} \"{value}\"\n"));
            }
        }
        out
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

/// Digits with optional dots, e.g. `1`, `0.5`. Empty is not numeric.
fn is_numeric(value: &str) -> bool {
    let mut digits = 0;
    for c in value.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => {}
            _ => return false,
        }
    }
    digits > 0
}

/// Defaults added only when the key is not already present.
fn client_defaults(realmlist: &str, locale: &str) -> Vec<(&'static str, String)> {
    vec![
        ("locale", locale.to_string()),
        ("readTOS", "1".into()),
        ("readEULA", "1".into()),
        ("readTerminationWithoutNotice", "1".into()),
        ("accounttype", "LK".into()),
        ("lastSelectedRealm", "1".into()),
        ("realmList", realmlist.to_string()),
        ("patchlist", format!("'{realmlist}'")),
        ("accountListType", "1".into()),
        ("autoSelect", "1".into()),
        ("autoConnect", "1".into()),
    ]
}

/// Merge account, graphics and default keys into `config`.
///
/// Precedence: account auto-fill, then graphics, then defaults for keys
/// still absent. Dropdown keys are always removed.
pub fn merge(
    mut config: ClientConfig,
    settings: &LauncherSettings,
    account_username: Option<&str>,
) -> ClientConfig {
    if let Some(username) = account_username.map(str::trim).filter(|u| !u.is_empty()) {
        let upper = username.to_uppercase();
        for key in AUTOFILL_KEYS {
            config.set(key, upper.clone());
        }
        debug!("Account auto-fill set for {}", upper);
    }
    for key in DROPDOWN_KEYS {
        config.remove(key);
    }

    let graphics = &settings.graphics;
    config.set("gxFixLag", "0");
    config.set("gxquality", graphics.quality.level().to_string());
    config.set("gxWindow", if graphics.windowed { "1" } else { "0" });
    config.set("gxResolution", graphics.resolution.clone());

    for (key, value) in client_defaults(&settings.game.realmlist, &settings.game.locale) {
        config.set_default(key, value);
    }
    config
}
