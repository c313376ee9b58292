// ─── Download ───
// Client download seam. The transport lives outside the core; the core only
// drives the progress stream, honours cancellation and checks disk space.

use std::path::Path;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::cancel::CancelFlag;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::system;

/// Space a full client install needs before a download may start.
pub const REQUIRED_CLIENT_SPACE: u64 = 16 * 1024 * 1024 * 1024;

/// Payload reported for every downloaded chunk or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub file_name: String,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some(self.bytes_downloaded as f64 / total as f64 * 100.0),
            None => None,
        }
    }
}

#[async_trait]
pub trait ClientDownloader: Send + Sync {
    /// Start fetching the client described by `manifest_ref`.
    async fn download(
        &self,
        manifest_ref: &str,
    ) -> LauncherResult<BoxStream<'static, LauncherResult<DownloadProgress>>>;
}

/// Consume the download stream until it ends.
///
/// The cancel flag is checked before every item. Transport errors are
/// returned unchanged. Returns the number of progress items seen.
pub async fn drive_download<F>(
    downloader: &dyn ClientDownloader,
    manifest_ref: &str,
    cancel: &CancelFlag,
    mut on_progress: F,
) -> LauncherResult<usize>
where
    F: FnMut(&DownloadProgress),
{
    let mut stream = downloader.download(manifest_ref).await?;
    let mut seen = 0usize;
    loop {
        if cancel.is_cancelled() {
            warn!("Download of {} cancelled after {} updates", manifest_ref, seen);
            return Err(LauncherError::Cancelled);
        }
        let Some(item) = stream.next().await else {
            break;
        };
        let progress = item?;
        seen += 1;
        on_progress(&progress);
    }
    info!("Download of {} finished ({} updates)", manifest_ref, seen);
    Ok(seen)
}

/// Create `target` and make sure its disk has `required` bytes free.
pub fn prepare_download_target(target: &Path, required: u64) -> LauncherResult<()> {
    std::fs::create_dir_all(target).map_err(|source| LauncherError::io(target, source))?;
    if system::has_free_space(target, required) {
        return Ok(());
    }
    Err(LauncherError::InsufficientSpace {
        path: target.to_path_buf(),
        available: system::available_space(target).unwrap_or(0),
        required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::Mutex;

    struct ScriptedDownloader {
        items: Mutex<Option<Vec<LauncherResult<DownloadProgress>>>>,
    }

    impl ScriptedDownloader {
        fn new(items: Vec<LauncherResult<DownloadProgress>>) -> Self {
            Self {
                items: Mutex::new(Some(items)),
            }
        }
    }

    #[async_trait]
    impl ClientDownloader for ScriptedDownloader {
        async fn download(
            &self,
            _manifest_ref: &str,
        ) -> LauncherResult<BoxStream<'static, LauncherResult<DownloadProgress>>> {
            let items = self.items.lock().unwrap().take().unwrap_or_default();
            Ok(stream::iter(items).boxed())
        }
    }

    fn chunk(n: u64) -> LauncherResult<DownloadProgress> {
        Ok(DownloadProgress {
            file_name: "Data/common.MPQ".into(),
            bytes_downloaded: n,
            total_bytes: Some(30),
        })
    }

    #[tokio::test]
    async fn forwards_every_update() {
        let downloader = ScriptedDownloader::new(vec![chunk(10), chunk(20), chunk(30)]);
        let mut last = None;
        let seen = drive_download(&downloader, "client-3.3.5a", &CancelFlag::new(), |p| {
            last = p.percent()
        })
        .await
        .unwrap();
        assert_eq!(seen, 3);
        assert_eq!(last, Some(100.0));
    }

    #[tokio::test]
    async fn cancel_stops_between_items() {
        let downloader = ScriptedDownloader::new(vec![chunk(10), chunk(20), chunk(30)]);
        let cancel = CancelFlag::new();
        let mut seen = 0;
        let err = drive_download(&downloader, "client", &cancel, |_| {
            seen += 1;
            cancel.cancel();
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LauncherError::Cancelled));
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn transport_error_is_surfaced_unchanged() {
        let downloader = ScriptedDownloader::new(vec![
            chunk(10),
            Err(LauncherError::NetworkUnavailable("reset by peer".into())),
            chunk(30),
        ]);
        let err = drive_download(&downloader, "client", &CancelFlag::new(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Backend server unreachable: reset by peer");
    }

    #[test]
    fn target_is_created_and_space_checked() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("client");
        prepare_download_target(&target, 0).unwrap();
        assert!(target.is_dir());

        if system::available_space(&target).is_some() {
            let err = prepare_download_target(&target, u64::MAX).unwrap_err();
            assert_eq!(err.reason(), "insufficient space");
        }
    }
}
