// ─── System ───
// Host queries: free disk space and whether the client is already running.

use std::ffi::OsStr;
use std::path::Path;

use tracing::debug;

use crate::core::launch::CLIENT_EXECUTABLE;

/// Bytes available on the disk holding `path`, by longest mount-point match.
/// `None` when no mounted disk contains the path.
pub fn available_space(path: &Path) -> Option<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    debug!("Free space at {:?}: {:?}", canonical, available);
    available
}

/// `true` when the disk holding `path` has at least `required` bytes free.
/// An unknown disk is treated as having room.
pub fn has_free_space(path: &Path, required: u64) -> bool {
    available_space(path).map_or(true, |bytes| bytes >= required)
}

/// Whether a process named like the client executable is alive.
pub fn is_client_running() -> bool {
    let mut system = sysinfo::System::new_all();
    system.refresh_all();
    system
        .processes()
        .values()
        .any(|process| is_client_process_name(OsStr::new(process.name())))
}

fn is_client_process_name(name: &OsStr) -> bool {
    name.to_string_lossy().eq_ignore_ascii_case(CLIENT_EXECUTABLE)
}
