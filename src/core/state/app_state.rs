use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::auth::HttpAccessAuthorizer;
use crate::core::cancel::CancelFlag;
use crate::core::error::LauncherResult;
use crate::core::launch::{LaunchOrchestrator, OrchestratorConfig};
use crate::core::server::{ServerProbe, DEFAULT_AUTH_ADDR, DEFAULT_WORLD_ADDR};

use super::settings::{LauncherSettings, SettingUpdate, SettingsStore};

const MANIFEST_DIR: &str = "config";
const MANIFEST_FILE: &str = "manifest.json";

/// Everything a presentation layer keeps alive between calls.
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings_store: SettingsStore,
    /// Current snapshot. Replaced wholesale on every update.
    pub settings: LauncherSettings,
    pub orchestrator: Arc<LaunchOrchestrator>,
    pub probe: Arc<ServerProbe>,
    /// Cancel flag of the attempt currently running, if any.
    pub active_launch: Option<CancelFlag>,
}

impl AppState {
    pub fn new(data_dir: PathBuf) -> LauncherResult<Self> {
        let config = OrchestratorConfig::new(data_dir.join(MANIFEST_DIR).join(MANIFEST_FILE));
        let authorizer =
            HttpAccessAuthorizer::new(config.access_endpoint.clone(), config.authorization_timeout)?;
        let probe = ServerProbe::new(DEFAULT_AUTH_ADDR, DEFAULT_WORLD_ADDR, config.probe_timeout);
        let orchestrator = LaunchOrchestrator::new(config, Arc::new(authorizer));
        Ok(Self::with_orchestrator(data_dir, orchestrator, probe))
    }

    /// Assemble state around an already configured orchestrator.
    pub fn with_orchestrator(
        data_dir: PathBuf,
        orchestrator: LaunchOrchestrator,
        probe: ServerProbe,
    ) -> Self {
        let settings_store = SettingsStore::in_dir(&data_dir);
        let settings = settings_store.load();
        Self {
            data_dir,
            settings_store,
            settings,
            orchestrator: Arc::new(orchestrator),
            probe: Arc::new(probe),
            active_launch: None,
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.orchestrator.config().manifest_path
    }

    /// Persist `update` and swap in the resulting snapshot.
    pub fn apply(&mut self, update: SettingUpdate) -> LauncherResult<&LauncherSettings> {
        self.settings = self.settings_store.update(&self.settings, update)?;
        Ok(&self.settings)
    }
}
