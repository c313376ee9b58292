// ─── Client Config ───
// Rewrites the text files the game client reads at startup: the realm
// pointer (`Data/<locale>/realmlist.wtf`) and `WTF/Config.wtf`.
// Every write is a full atomic replace.

pub mod config_wtf;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::fsutil;
use crate::core::state::LauncherSettings;

pub use config_wtf::{merge, ClientConfig, AUTOFILL_KEYS, DROPDOWN_KEYS};

pub fn realmlist_path(game_path: &Path, locale: &str) -> PathBuf {
    game_path.join("Data").join(locale).join("realmlist.wtf")
}

pub fn config_wtf_path(game_path: &Path) -> PathBuf {
    game_path.join("WTF").join("Config.wtf")
}

/// Point the client at `address`. Same input, same bytes.
pub fn update_realm_address(game_path: &Path, locale: &str, address: &str) -> LauncherResult<PathBuf> {
    let path = realmlist_path(game_path, locale);
    let contents = format!("set realmlist {}\n", address.trim());
    fsutil::write_atomic(&path, contents.as_bytes()).map_err(|source| LauncherError::ConfigWrite {
        path: path.clone(),
        source,
    })?;
    info!("Realmlist {:?} -> {}", path, address.trim());
    Ok(path)
}

/// Merge derived keys into `WTF/Config.wtf` and rewrite it in full.
///
/// Account auto-fill keys are only written when `account_username` is given.
pub fn update_client_config(
    game_path: &Path,
    settings: &LauncherSettings,
    account_username: Option<&str>,
) -> LauncherResult<PathBuf> {
    let path = config_wtf_path(game_path);
    // Anything that is not a regular file is replaced, so there is nothing to read.
    let existing = if path.is_file() {
        existing_config(&path, std::fs::read(&path))?
    } else {
        ClientConfig::default()
    };

    let merged = merge(existing, settings, account_username);
    fsutil::write_atomic(&path, merged.render().as_bytes()).map_err(|source| {
        LauncherError::ConfigWrite {
            path: path.clone(),
            source,
        }
    })?;
    info!("Config.wtf rewritten with {} keys", merged.len());
    Ok(path)
}

fn existing_config(path: &Path, read: std::io::Result<Vec<u8>>) -> LauncherResult<ClientConfig> {
    match read {
        Ok(bytes) => Ok(ClientConfig::parse(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(LauncherError::io(path, source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::SettingUpdate;

    #[test]
    fn realmlist_is_written_under_locale_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = update_realm_address(dir.path(), "koKR", "logon.example.org").unwrap();
        let bytes = std::fs::read(&first).unwrap();
        let second = update_realm_address(dir.path(), "koKR", "logon.example.org").unwrap();

        assert_eq!(first, dir.path().join("Data").join("koKR").join("realmlist.wtf"));
        assert_eq!(bytes, b"set realmlist logon.example.org\n");
        assert_eq!(std::fs::read(second).unwrap(), bytes);
    }

    #[test]
    fn client_config_update_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let wtf = config_wtf_path(dir.path());
        std::fs::create_dir_all(wtf.parent().unwrap()).unwrap();
        std::fs::write(&wtf, "SET gxColorBits \"24\"\nSET accountList \"X\"\nSET SoundVolume 0.5\n").unwrap();
        let settings = LauncherSettings::default()
            .with_update(SettingUpdate::Realmlist("logon.example.org".into()))
            .unwrap();

        update_client_config(dir.path(), &settings, Some("hero")).unwrap();
        let once = std::fs::read(&wtf).unwrap();
        update_client_config(dir.path(), &settings, Some("hero")).unwrap();
        let twice = std::fs::read(&wtf).unwrap();

        assert_eq!(once, twice);
        let text = String::from_utf8(twice).unwrap();
        assert!(text.starts_with("SET gxColorBits 24\n"));
        assert!(text.contains("SET SoundVolume 0.5\n"));
        assert!(text.contains("SET realmList \"logon.example.org\"\n"));
        assert!(!text.contains("SET accountList "));
        assert!(text.contains("SET accountListType 1\n"));
        let config = ClientConfig::parse(&text);
        assert!(!config.contains_key("accountList"));
    }

    #[test]
    fn autofill_and_dropdown_keys_never_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let wtf = config_wtf_path(dir.path());
        std::fs::create_dir_all(wtf.parent().unwrap()).unwrap();

        for username in [Some("hero"), None, Some("alt")] {
            std::fs::write(&wtf, "SET savedAccountList \"HERO|ALT\"\nSET accountList \"HERO\"\n").unwrap();
            update_client_config(dir.path(), &LauncherSettings::default(), username).unwrap();
            let config = ClientConfig::parse(&std::fs::read_to_string(&wtf).unwrap());
            let has_autofill = AUTOFILL_KEYS.iter().any(|k| config.contains_key(k));
            let has_dropdown = DROPDOWN_KEYS.iter().any(|k| config.contains_key(k));
            assert!(!(has_autofill && has_dropdown));
            assert!(!has_dropdown);
        }
    }

    #[test]
    fn creates_missing_wtf_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = update_client_config(dir.path(), &LauncherSettings::default(), None).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("SET locale \"koKR\"\n"));
        assert!(!text.contains("accountName"));
    }

    #[test]
    fn write_failure_reports_path_and_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the WTF directory should be.
        std::fs::write(dir.path().join("WTF"), b"not a directory").unwrap();

        let err = update_client_config(dir.path(), &LauncherSettings::default(), None).unwrap_err();
        match err {
            LauncherError::ConfigWrite { path, .. } => assert_eq!(path, config_wtf_path(dir.path())),
            other => panic!("expected ConfigWrite, got {other:?}"),
        }
        assert_eq!(std::fs::read(dir.path().join("WTF")).unwrap(), b"not a directory");
    }

    #[test]
    fn read_failure_is_an_io_error_not_a_write_error() {
        let path = PathBuf::from("/games/wow/WTF/Config.wtf");
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);

        let err = existing_config(&path, Err(denied)).unwrap_err();

        assert_eq!(err.reason(), "io error");
        match err {
            LauncherError::Io { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("expected Io, got {other:?}"),
        }
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(existing_config(&path, Err(missing)).unwrap().is_empty());
    }
}
