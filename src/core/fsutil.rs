use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replace `path` with `contents` without ever exposing a half-written file.
///
/// The bytes go to a sibling temp file which is synced and then renamed over
/// the target. Parent directories are created as needed. On failure the temp
/// file is removed and the previous target (if any) is left untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_sibling(path);
    let result = (|| {
        // Scoped so the handle is closed before the rename (Windows refuses otherwise).
        {
            let mut file = File::create(&temp)?;
            file.write_all(contents)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
