use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::fsutil;

const APP_DIR_NAME: &str = "RealmLauncher";
const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_REALMLIST: &str = "127.0.0.1";
pub const DEFAULT_RESOLUTION: &str = "1920x1080";
pub const DEFAULT_LOCALE: &str = "koKR";
pub const DEFAULT_RUNNER: &str = "wine";

/// Graphics quality preset, mapped to the client's numeric level.
///
/// Accepts the English names and the labels the settings dialog stores.
/// Anything unrecognised falls back to `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GraphicsQuality {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl GraphicsQuality {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "low" | "Low" | "낮음" => GraphicsQuality::Low,
            "medium" | "Medium" | "중간" => GraphicsQuality::Medium,
            "ultra" | "Ultra" | "울트라" => GraphicsQuality::Ultra,
            _ => GraphicsQuality::High,
        }
    }

    /// Value written to the client's quality key.
    pub fn level(self) -> u8 {
        match self {
            GraphicsQuality::Low => 0,
            GraphicsQuality::Medium => 1,
            GraphicsQuality::High => 2,
            GraphicsQuality::Ultra => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GraphicsQuality::Low => "low",
            GraphicsQuality::Medium => "medium",
            GraphicsQuality::High => "high",
            GraphicsQuality::Ultra => "ultra",
        }
    }
}

impl From<String> for GraphicsQuality {
    fn from(label: String) -> Self {
        GraphicsQuality::from_label(&label)
    }
}

impl From<GraphicsQuality> for String {
    fn from(quality: GraphicsQuality) -> Self {
        quality.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub path: PathBuf,
    pub realmlist: String,
    pub launch_options: String,
    /// Compatibility layer used on Linux (`wine`, `portproton`, `lutris`, `proton`, `crossover`).
    pub runner: String,
    pub wineprefix: Option<PathBuf>,
    pub locale: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            realmlist: DEFAULT_REALMLIST.into(),
            launch_options: String::new(),
            runner: DEFAULT_RUNNER.into(),
            wineprefix: None,
            locale: DEFAULT_LOCALE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsOptions {
    pub resolution: String,
    pub quality: GraphicsQuality,
    pub windowed: bool,
}

impl Default for GraphicsOptions {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION.into(),
            quality: GraphicsQuality::High,
            windowed: false,
        }
    }
}

impl GraphicsOptions {
    /// Width and height from a `WIDTHxHEIGHT` resolution string.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        parse_resolution(&self.resolution)
    }
}

pub fn parse_resolution(resolution: &str) -> Option<(u32, u32)> {
    let (w, h) = resolution.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthState {
    pub username: Option<String>,
    pub account_id: Option<u64>,
    pub auto_login: bool,
}

/// Snapshot of everything the user can configure.
///
/// Passed by value into each launch; never shared mutably.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub game: GameSettings,
    pub graphics: GraphicsOptions,
    pub auth: AuthState,
}

/// A single typed change to the settings.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingUpdate {
    GamePath(PathBuf),
    Realmlist(String),
    LaunchOptions(String),
    Runner(String),
    WinePrefix(Option<PathBuf>),
    Locale(String),
    Resolution(String),
    Quality(GraphicsQuality),
    Windowed(bool),
    AutoLogin(bool),
    Login { username: String, account_id: u64 },
    Logout,
}

impl SettingUpdate {
    /// Build an update from a `key value` pair as typed on the command line.
    pub fn parse(key: &str, value: &str) -> LauncherResult<Self> {
        let flag = |value: &str| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(LauncherError::Settings(format!("expected a boolean, got {other:?}"))),
        };
        let optional_path = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| PathBuf::from(value))
        };

        Ok(match key {
            "game-path" => SettingUpdate::GamePath(PathBuf::from(value.trim())),
            "realmlist" => SettingUpdate::Realmlist(value.to_string()),
            "launch-options" => SettingUpdate::LaunchOptions(value.to_string()),
            "runner" => SettingUpdate::Runner(value.to_string()),
            "wineprefix" => SettingUpdate::WinePrefix(optional_path(value)),
            "locale" => SettingUpdate::Locale(value.trim().to_string()),
            "resolution" => SettingUpdate::Resolution(value.trim().to_string()),
            "quality" => SettingUpdate::Quality(GraphicsQuality::from_label(value)),
            "windowed" => SettingUpdate::Windowed(flag(value)?),
            "auto-login" => SettingUpdate::AutoLogin(flag(value)?),
            other => return Err(LauncherError::Settings(format!("unknown setting {other:?}"))),
        })
    }
}

impl LauncherSettings {
    /// Apply `update`, returning the new snapshot. `self` is left untouched.
    pub fn with_update(&self, update: SettingUpdate) -> LauncherResult<LauncherSettings> {
        let mut next = self.clone();
        match update {
            SettingUpdate::GamePath(path) => next.game.path = path,
            SettingUpdate::Realmlist(address) => {
                let address = address.trim();
                if address.is_empty() || address.chars().any(char::is_whitespace) {
                    return Err(LauncherError::Settings(format!(
                        "invalid realmlist address {address:?}"
                    )));
                }
                next.game.realmlist = address.to_string();
            }
            SettingUpdate::LaunchOptions(options) => next.game.launch_options = options,
            SettingUpdate::Runner(runner) => next.game.runner = runner.trim().to_lowercase(),
            SettingUpdate::WinePrefix(prefix) => next.game.wineprefix = prefix,
            SettingUpdate::Locale(locale) => {
                if locale.len() != 4 || !locale.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(LauncherError::Settings(format!("invalid locale {locale:?}")));
                }
                next.game.locale = locale;
            }
            SettingUpdate::Resolution(resolution) => {
                if parse_resolution(&resolution).is_none() {
                    return Err(LauncherError::Settings(format!(
                        "resolution must look like WIDTHxHEIGHT, got {resolution:?}"
                    )));
                }
                next.graphics.resolution = resolution;
            }
            SettingUpdate::Quality(quality) => next.graphics.quality = quality,
            SettingUpdate::Windowed(windowed) => next.graphics.windowed = windowed,
            SettingUpdate::AutoLogin(auto_login) => next.auth.auto_login = auto_login,
            SettingUpdate::Login {
                username,
                account_id,
            } => {
                next.auth.username = Some(username);
                next.auth.account_id = Some(account_id);
            }
            SettingUpdate::Logout => {
                next.auth.username = None;
                next.auth.account_id = None;
                next.auth.auto_login = false;
            }
        }
        Ok(next)
    }
}

/// `<local data dir>/RealmLauncher`, or `./RealmLauncher` when the platform
/// has no such directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Persists settings as pretty JSON.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `settings.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored snapshot, falling back to defaults when the file is
    /// absent or unreadable.
    pub fn load(&self) -> LauncherSettings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => LauncherSettings::default(),
            Err(err) => {
                warn!("Ignoring unreadable settings {:?}: {}", self.path, err);
                LauncherSettings::default()
            }
        }
    }

    pub fn try_load(&self) -> LauncherResult<Option<LauncherSettings>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LauncherError::io(&self.path, source)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, settings: &LauncherSettings) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(settings)?;
        fsutil::write_atomic(&self.path, json.as_bytes())
            .map_err(|source| LauncherError::io(&self.path, source))
    }

    /// Apply and persist `update`, returning the new snapshot.
    pub fn update(
        &self,
        current: &LauncherSettings,
        update: SettingUpdate,
    ) -> LauncherResult<LauncherSettings> {
        let next = current.with_update(update)?;
        self.save(&next)?;
        info!("Settings saved to {:?}", self.path);
        Ok(next)
    }
}
