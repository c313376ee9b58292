use std::path::Path;

use tracing::error;

use super::task::executable_path;
use crate::core::error::{LauncherError, LauncherResult};

/// Core archives a usable installation always has, relative to the game path.
pub const CORE_ARCHIVES: [&str; 2] = ["Data/common.MPQ", "Data/common-2.MPQ"];

/// Check that `game_path` holds the client executable and the core archives.
pub fn validate_game_path(game_path: &Path) -> LauncherResult<()> {
    if game_path.as_os_str().is_empty() {
        return Err(LauncherError::PathInvalid {
            path: game_path.to_path_buf(),
            detail: "no game path configured".into(),
        });
    }

    let exe = executable_path(game_path);
    let required = std::iter::once(exe).chain(
        CORE_ARCHIVES
            .iter()
            .map(|rel| rel.split('/').fold(game_path.to_path_buf(), |acc, s| acc.join(s))),
    );

    for path in required {
        if !path.is_file() {
            error!("Required file missing: {:?}", path);
            return Err(LauncherError::PathInvalid {
                path: game_path.to_path_buf(),
                detail: format!("required file missing: {}", path.display()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install(root: &Path, files: &[&str]) {
        for rel in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"x").unwrap();
        }
    }

    #[test]
    fn complete_install_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), &["Wow.exe", "Data/common.MPQ", "Data/common-2.MPQ"]);
        validate_game_path(dir.path()).unwrap();
    }

    #[test]
    fn missing_archive_or_exe_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), &["Wow.exe", "Data/common.MPQ"]);
        let err = validate_game_path(dir.path()).unwrap_err();
        assert_eq!(err.reason(), "invalid game path");
        assert!(err.to_string().contains("common-2.MPQ"));

        let other = tempfile::tempdir().unwrap();
        install(other.path(), &["Data/common.MPQ", "Data/common-2.MPQ"]);
        assert!(validate_game_path(other.path()).is_err());
    }

    #[test]
    fn empty_path_is_invalid() {
        assert!(validate_game_path(Path::new("")).is_err());
    }
}
