// ─── Launch Orchestrator ───
// Idle → PathValidated → AccessAuthorized → FilesVerified → ConfigUpdated → Launched.
// Any step may fail; the first failure ends the attempt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::task::{build_launch_command, LaunchCommand, ProcessSpawner, SystemSpawner, TargetPlatform};
use super::validate::validate_game_path;
use crate::core::auth::{
    AccessAuthorizer, AuthenticatedUser, DEFAULT_ACCESS_ENDPOINT, DEFAULT_ACCESS_TIMEOUT,
};
use crate::core::cancel::CancelFlag;
use crate::core::client_config;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{verify, ContentHasher, ManifestStore, Sha256Hasher, VerifyProgress};
use crate::core::server::DEFAULT_PROBE_TIMEOUT;
use crate::core::state::LauncherSettings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchFailure {
    /// Short machine reason, e.g. `"invalid game path"`.
    pub reason: String,
    /// Human-readable message, offending paths kept verbatim.
    pub message: String,
    /// Relative data path for verification failures.
    pub path: Option<String>,
    pub retryable: bool,
}

impl From<&LauncherError> for LaunchFailure {
    fn from(err: &LauncherError) -> Self {
        Self {
            reason: err.reason().to_string(),
            message: err.to_string(),
            path: err.failing_path().map(str::to_string),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LaunchState {
    Idle,
    PathValidated,
    AccessAuthorized,
    FilesVerified,
    ConfigUpdated,
    Launched { pid: u32 },
    Failed(LaunchFailure),
}

impl LaunchState {
    fn rank(&self) -> u8 {
        match self {
            LaunchState::Idle => 0,
            LaunchState::PathValidated => 1,
            LaunchState::AccessAuthorized => 2,
            LaunchState::FilesVerified => 3,
            LaunchState::ConfigUpdated => 4,
            LaunchState::Launched { .. } => 5,
            LaunchState::Failed(_) => u8::MAX,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LaunchState::Launched { .. } | LaunchState::Failed(_))
    }

    pub fn failure(&self) -> Option<&LaunchFailure> {
        match self {
            LaunchState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Everything a presentation layer may want to render while a launch runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LaunchEvent {
    StateChanged(LaunchState),
    Verification(VerifyProgress),
}

/// Knobs that are not user settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub manifest_path: PathBuf,
    pub access_endpoint: String,
    pub authorization_timeout: Duration,
    pub probe_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            access_endpoint: DEFAULT_ACCESS_ENDPOINT.to_string(),
            authorization_timeout: DEFAULT_ACCESS_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Inputs for one attempt. Settings are a snapshot, never re-read mid-flight.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub settings: LauncherSettings,
    pub identity: Option<AuthenticatedUser>,
    pub cancel: CancelFlag,
}

impl LaunchRequest {
    pub fn new(settings: LauncherSettings, identity: Option<AuthenticatedUser>) -> Self {
        Self {
            settings,
            identity,
            cancel: CancelFlag::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchedClient {
    pub pid: u32,
    pub command: LaunchCommand,
}

/// Terminal result of one attempt plus every state it passed through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchOutcome {
    pub attempt_id: Uuid,
    pub history: Vec<LaunchState>,
    pub client: Option<LaunchedClient>,
}

impl LaunchOutcome {
    pub fn state(&self) -> &LaunchState {
        // History always holds at least `Idle`.
        self.history.last().unwrap_or(&LaunchState::Idle)
    }

    pub fn is_launched(&self) -> bool {
        matches!(self.state(), LaunchState::Launched { .. })
    }

    pub fn failure(&self) -> Option<&LaunchFailure> {
        self.state().failure()
    }
}

struct Attempt {
    history: Vec<LaunchState>,
    events: Option<UnboundedSender<LaunchEvent>>,
}

impl Attempt {
    fn new(events: Option<UnboundedSender<LaunchEvent>>) -> Self {
        let attempt = Self {
            history: vec![LaunchState::Idle],
            events,
        };
        attempt.emit(LaunchEvent::StateChanged(LaunchState::Idle));
        attempt
    }

    fn current(&self) -> &LaunchState {
        self.history.last().unwrap_or(&LaunchState::Idle)
    }

    /// Move strictly forward by one step.
    fn advance(&mut self, next: LaunchState) {
        debug_assert_eq!(next.rank(), self.current().rank() + 1, "launch step skipped");
        info!("Launch state: {:?}", next);
        self.history.push(next.clone());
        self.emit(LaunchEvent::StateChanged(next));
    }

    fn fail(&mut self, err: &LauncherError) {
        error!("Launch failed after {:?}: {}", self.current(), err);
        let state = LaunchState::Failed(LaunchFailure::from(err));
        self.history.push(state.clone());
        self.emit(LaunchEvent::StateChanged(state));
    }

    fn emit(&self, event: LaunchEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

/// Sequences validation, authorization, verification, config rewrite and
/// process spawn. At most one attempt runs at a time per orchestrator.
pub struct LaunchOrchestrator {
    config: OrchestratorConfig,
    authorizer: Arc<dyn AccessAuthorizer>,
    hasher: Arc<dyn ContentHasher>,
    spawner: Arc<dyn ProcessSpawner>,
    platform: TargetPlatform,
    active: Mutex<()>,
}

impl LaunchOrchestrator {
    pub fn new(config: OrchestratorConfig, authorizer: Arc<dyn AccessAuthorizer>) -> Self {
        Self {
            config,
            authorizer,
            hasher: Arc::new(Sha256Hasher),
            spawner: Arc::new(SystemSpawner),
            platform: TargetPlatform::current(),
            active: Mutex::new(()),
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one launch attempt from `Idle`. Never returns an error: failures
    /// end in a `Failed` state inside the outcome.
    pub async fn launch(
        &self,
        request: LaunchRequest,
        events: Option<UnboundedSender<LaunchEvent>>,
    ) -> LaunchOutcome {
        let attempt_id = Uuid::new_v4();
        let mut attempt = Attempt::new(events);

        let Ok(_guard) = self.active.try_lock() else {
            attempt.fail(&LauncherError::LaunchInProgress);
            return LaunchOutcome {
                attempt_id,
                history: attempt.history,
                client: None,
            };
        };

        let span = info_span!("launch", attempt = %attempt_id);
        let result = self.run(request, &mut attempt).instrument(span).await;

        let client = match result {
            Ok(client) => Some(client),
            Err(err) => {
                attempt.fail(&err);
                None
            }
        };
        LaunchOutcome {
            attempt_id,
            history: attempt.history,
            client,
        }
    }

    async fn run(
        &self,
        request: LaunchRequest,
        attempt: &mut Attempt,
    ) -> LauncherResult<LaunchedClient> {
        let LaunchRequest {
            settings,
            identity,
            cancel,
        } = request;
        let game_path = settings.game.path.clone();

        // Idle → PathValidated
        validate_game_path(&game_path)?;
        attempt.advance(LaunchState::PathValidated);

        // PathValidated → AccessAuthorized
        ensure_not_cancelled(&cancel)?;
        let identity = identity
            .or_else(|| AuthenticatedUser::restore(&settings.auth))
            .ok_or(LauncherError::LoginRequired)?;
        let timeout = self.config.authorization_timeout;
        tokio::time::timeout(timeout, self.authorizer.authorize(&identity.username))
            .await
            .map_err(|_| {
                LauncherError::NetworkUnavailable(format!(
                    "access request timed out after {}s",
                    timeout.as_secs_f32()
                ))
            })??;
        attempt.advance(LaunchState::AccessAuthorized);

        // AccessAuthorized → FilesVerified
        ensure_not_cancelled(&cancel)?;
        self.verify_files(&game_path, cancel.clone(), attempt.events.clone())
            .await?;
        attempt.advance(LaunchState::FilesVerified);

        // FilesVerified → ConfigUpdated
        ensure_not_cancelled(&cancel)?;
        client_config::update_realm_address(
            &game_path,
            &settings.game.locale,
            &settings.game.realmlist,
        )?;
        client_config::update_client_config(&game_path, &settings, Some(&identity.username))?;
        attempt.advance(LaunchState::ConfigUpdated);

        // ConfigUpdated → Launched
        ensure_not_cancelled(&cancel)?;
        let command = build_launch_command(&settings, self.platform)?;
        info!("Launching client: {}", command.display());
        let pid = self.spawner.spawn(&command)?;
        attempt.advance(LaunchState::Launched { pid });

        Ok(LaunchedClient { pid, command })
    }

    /// Load the manifest and verify `<game>/Data` on the blocking pool,
    /// forwarding progress as it happens.
    async fn verify_files(
        &self,
        game_path: &std::path::Path,
        cancel: CancelFlag,
        events: Option<UnboundedSender<LaunchEvent>>,
    ) -> LauncherResult<()> {
        let manifest_path = self.config.manifest_path.clone();
        let data_root = game_path.join("Data");
        let hasher = Arc::clone(&self.hasher);

        let report = tokio::task::spawn_blocking(move || -> LauncherResult<_> {
            let manifest = ManifestStore::load(&manifest_path)?;
            let report = verify(&manifest, &data_root, &*hasher)
                .with_cancel(cancel)
                .run(|progress| {
                    if let Some(tx) = &events {
                        let _ = tx.send(LaunchEvent::Verification(progress.clone()));
                    }
                });
            Ok(report)
        })
        .await
        .map_err(|e| LauncherError::Internal(format!("verification task failed: {e}")))??;

        report.into_result()
    }
}

fn ensure_not_cancelled(cancel: &CancelFlag) -> LauncherResult<()> {
    if cancel.is_cancelled() {
        return Err(LauncherError::Cancelled);
    }
    Ok(())
}
