// ─── Commands ───
// Presentation-facing entry points. A GUI host or the CLI holds one
// `SharedState` and calls these; every error crosses as `LauncherError`,
// which serializes to `{reason, message, path}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::auth::{AuthResult, AuthenticatedUser, Authenticator};
use crate::core::cancel::CancelFlag;
use crate::core::download::{
    drive_download, prepare_download_target, ClientDownloader, DownloadProgress,
    REQUIRED_CLIENT_SPACE,
};
use crate::core::error::LauncherError;
use crate::core::integrity::{self, ManifestStore, Sha256Hasher, VerificationReport, VerifyProgress};
use crate::core::launch::{LaunchEvent, LaunchOutcome, LaunchRequest};
use crate::core::server::ServerStatus;
use crate::core::state::{AppState, LauncherSettings, SettingUpdate};
use crate::core::system;

pub type SharedState = Arc<Mutex<AppState>>;

pub fn shared(state: AppState) -> SharedState {
    Arc::new(Mutex::new(state))
}

// ── Settings ────────────────────────────────────────────

pub async fn get_settings(state: &SharedState) -> LauncherSettings {
    state.lock().await.settings.clone()
}

pub async fn update_setting(
    state: &SharedState,
    update: SettingUpdate,
) -> Result<LauncherSettings, LauncherError> {
    let mut state = state.lock().await;
    state.apply(update).cloned()
}

// ── Integrity ───────────────────────────────────────────

/// Verify `<game>/Data` against the installed manifest without launching.
///
/// A failing file is reported inside the returned report; only a missing or
/// unparsable manifest is an `Err`.
pub async fn verify_installation(
    state: &SharedState,
    cancel: CancelFlag,
    progress: Option<UnboundedSender<VerifyProgress>>,
) -> Result<VerificationReport, LauncherError> {
    let (manifest_path, data_root) = {
        let state = state.lock().await;
        (
            state.manifest_path().to_path_buf(),
            state.settings.game.path.join("Data"),
        )
    };

    tokio::task::spawn_blocking(move || -> Result<VerificationReport, LauncherError> {
        let manifest = ManifestStore::load(&manifest_path)?;
        info!("Verifying {} files under {:?}", manifest.len(), data_root);
        Ok(integrity::verify(&manifest, &data_root, &Sha256Hasher)
            .with_cancel(cancel)
            .run(|p| {
                if let Some(tx) = &progress {
                    let _ = tx.send(p.clone());
                }
            }))
    })
    .await
    .map_err(|e| LauncherError::Internal(format!("verification task failed: {e}")))?
}

/// Hash every file under `data_root` and write the manifest to `output`.
/// Returns the number of entries written.
pub async fn generate_manifest(data_root: PathBuf, output: PathBuf) -> Result<usize, LauncherError> {
    tokio::task::spawn_blocking(move || -> Result<usize, LauncherError> {
        let manifest = integrity::generate_manifest(&data_root, &Sha256Hasher, |done, total, rel| {
            debug!("[{}/{}] {}", done, total, rel);
        })?;
        ManifestStore::save(&manifest, &output)?;
        info!("Manifest with {} entries written to {:?}", manifest.len(), output);
        Ok(manifest.len())
    })
    .await
    .map_err(|e| LauncherError::Internal(format!("manifest task failed: {e}")))?
}

// ── Launch ──────────────────────────────────────────────

/// Run one launch attempt with the current settings snapshot.
///
/// The state lock is released while the attempt runs so settings reads and
/// `cancel_launch` stay responsive.
pub async fn launch_game(
    state: &SharedState,
    identity: Option<AuthenticatedUser>,
    events: Option<UnboundedSender<LaunchEvent>>,
) -> LaunchOutcome {
    let (orchestrator, request, owns_flag) = {
        let mut state = state.lock().await;
        let request = LaunchRequest::new(state.settings.clone(), identity);
        let owns_flag = state.active_launch.is_none();
        if owns_flag {
            state.active_launch = Some(request.cancel.clone());
        }
        (Arc::clone(&state.orchestrator), request, owns_flag)
    };

    if client_already_running().await {
        warn!("A client process is already running; starting another one");
    }

    let outcome = orchestrator.launch(request, events).await;
    if owns_flag {
        state.lock().await.active_launch = None;
    }
    outcome
}

/// Process scan on the blocking pool; a failed scan counts as not running.
async fn client_already_running() -> bool {
    tokio::task::spawn_blocking(system::is_client_running)
        .await
        .unwrap_or(false)
}

/// Request cancellation of the running attempt. `false` when none is running.
pub async fn cancel_launch(state: &SharedState) -> bool {
    match &state.lock().await.active_launch {
        Some(flag) => {
            flag.cancel();
            true
        }
        None => false,
    }
}

pub async fn server_status(state: &SharedState) -> ServerStatus {
    let probe = Arc::clone(&state.lock().await.probe);
    probe.status().await
}

// ── Account ─────────────────────────────────────────────

/// Log in through `authenticator` and remember the account on success.
pub async fn login(
    state: &SharedState,
    authenticator: &dyn Authenticator,
    username: &str,
    password: &str,
) -> Result<AuthResult, LauncherError> {
    let result = authenticator.authenticate(username, password).await?;
    match AuthenticatedUser::from_result(&result) {
        Some(user) => {
            state.lock().await.apply(SettingUpdate::Login {
                username: user.username,
                account_id: user.account_id,
            })?;
        }
        None => warn!("Login for {} failed: {}", username, result.message),
    }
    Ok(result)
}

pub async fn logout(state: &SharedState) -> Result<LauncherSettings, LauncherError> {
    update_setting(state, SettingUpdate::Logout).await
}

// ── Download ────────────────────────────────────────────

/// Fetch a full client into `target` after checking it has room for one.
pub async fn download_client<F>(
    target: &Path,
    downloader: &dyn ClientDownloader,
    manifest_ref: &str,
    cancel: &CancelFlag,
    on_progress: F,
) -> Result<usize, LauncherError>
where
    F: FnMut(&DownloadProgress),
{
    prepare_download_target(target, REQUIRED_CLIENT_SPACE)?;
    drive_download(downloader, manifest_ref, cancel, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::integrity::VerificationStatus;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    fn state_in(dir: &Path) -> SharedState {
        shared(AppState::new(dir.to_path_buf()).unwrap())
    }

    fn install_game(root: &Path) -> PathBuf {
        let game = root.join("WoW");
        for (rel, body) in [
            ("Wow.exe", "exe"),
            ("Data/common.MPQ", "common"),
            ("Data/common-2.MPQ", "common two"),
        ] {
            let path = game.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        game
    }

    struct FixedAuthenticator(bool);

    #[async_trait]
    impl Authenticator for FixedAuthenticator {
        async fn authenticate(
            &self,
            username: &str,
            _password: &str,
        ) -> crate::core::error::LauncherResult<AuthResult> {
            Ok(AuthResult {
                success: self.0,
                message: if self.0 { "welcome" } else { "bad password" }.into(),
                account_id: self.0.then_some(17),
                username: Some(username.to_string()),
            })
        }
    }

    #[tokio::test]
    async fn generated_manifest_verifies_then_catches_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let game = install_game(dir.path());
        update_setting(&state, SettingUpdate::GamePath(game.clone()))
            .await
            .unwrap();
        let manifest_path = state.lock().await.manifest_path().to_path_buf();

        let written = generate_manifest(game.join("Data"), manifest_path).await.unwrap();
        assert_eq!(written, 2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = verify_installation(&state, CancelFlag::new(), Some(tx))
            .await
            .unwrap();
        assert_eq!(report.status, VerificationStatus::Pass);
        assert_eq!(rx.recv().await.unwrap().checked, 1);

        std::fs::write(game.join("Data/common.MPQ"), "tampered bytes").unwrap();
        let report = verify_installation(&state, CancelFlag::new(), None)
            .await
            .unwrap();
        assert_eq!(report.failing_path(), Some("common.MPQ"));
    }

    #[tokio::test]
    async fn verification_without_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let err = verify_installation(&state, CancelFlag::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "manifest missing");
    }

    #[tokio::test]
    async fn successful_login_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());

        let failed = login(&state, &FixedAuthenticator(false), "hero", "x").await.unwrap();
        assert!(!failed.success);
        assert_eq!(get_settings(&state).await.auth.username, None);

        login(&state, &FixedAuthenticator(true), "hero", "pw").await.unwrap();
        let settings = get_settings(&state).await;
        assert_eq!(settings.auth.username.as_deref(), Some("hero"));
        assert_eq!(settings.auth.account_id, Some(17));

        let settings = logout(&state).await.unwrap();
        assert_eq!(settings.auth.username, None);
    }

    #[tokio::test]
    async fn failed_launch_releases_the_cancel_slot() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());

        let outcome = launch_game(&state, None, None).await;

        assert_eq!(
            outcome.failure().map(|f| f.reason.as_str()),
            Some("invalid game path")
        );
        assert!(state.lock().await.active_launch.is_none());
        assert!(!cancel_launch(&state).await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn process_scan_lets_other_tasks_run() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        let _ = client_already_running().await;

        // Single-threaded runtime: the task only ran if the scan yielded.
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn invalid_setting_leaves_snapshot_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let before = get_settings(&state).await;

        let err = update_setting(&state, SettingUpdate::Resolution("huge".into()))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "settings error");
        assert_eq!(get_settings(&state).await, before);
    }
}
