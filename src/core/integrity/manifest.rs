use std::collections::{btree_map, BTreeMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::hasher::{ContentDigest, ContentHasher};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::fsutil;

/// File modification time as float seconds since the Unix epoch.
///
/// Computed as `secs + nanos * 1e-9` so values produced here and values read
/// back from a manifest compare bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifiedTime(pub f64);

impl ModifiedTime {
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as f64 + d.subsec_nanos() as f64 * 1e-9,
            Err(e) => {
                let d = e.duration();
                -(d.as_secs() as f64 + d.subsec_nanos() as f64 * 1e-9)
            }
        };
        Self(secs)
    }

    pub fn of_metadata(metadata: &std::fs::Metadata) -> std::io::Result<Self> {
        metadata.modified().map(Self::from_system_time)
    }
}

/// Expected state of a single data file.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub content_hash: ContentDigest,
    pub size_bytes: u64,
    pub modified_at: ModifiedTime,
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    hash: ContentDigest,
    size: u64,
    mtime: ModifiedTime,
}

/// Authoritative record of every file in a clean data root.
///
/// Immutable once loaded. Iteration is ordered by relative path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relative_path: &str) -> Option<&ManifestEntry> {
        self.entries.get(relative_path)
    }

    pub fn entries(&self) -> btree_map::Values<'_, String, ManifestEntry> {
        self.entries.values()
    }

    /// Build a manifest from entries, enforcing path normalization and uniqueness.
    pub fn from_entries<I>(entries: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = ManifestEntry>,
    {
        let mut map = BTreeMap::new();
        for entry in entries {
            validate_relative_path(&entry.relative_path)?;
            let key = entry.relative_path.clone();
            if map.insert(key.clone(), entry).is_some() {
                return Err(format!("duplicate manifest path {key:?}"));
            }
        }
        Ok(Self { entries: map })
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, entry) in &self.entries {
            map.serialize_entry(
                path,
                &WireEntry {
                    hash: entry.content_hash,
                    size: entry.size_bytes,
                    mtime: entry.modified_at,
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = Manifest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of relative path to {hash, size, mtime}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Manifest, A::Error> {
                let mut entries = BTreeMap::new();
                while let Some(path) = access.next_key::<String>()? {
                    validate_relative_path(&path).map_err(serde::de::Error::custom)?;
                    let wire: WireEntry = access.next_value()?;
                    let entry = ManifestEntry {
                        relative_path: path.clone(),
                        content_hash: wire.hash,
                        size_bytes: wire.size,
                        modified_at: wire.mtime,
                    };
                    if entries.insert(path.clone(), entry).is_some() {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate manifest path {path:?}"
                        )));
                    }
                }
                Ok(Manifest { entries })
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// Manifest paths are relative, forward-slash separated and never climb out
/// of the data root.
pub fn validate_relative_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty manifest path".into());
    }
    if path.contains('\\') {
        return Err(format!("manifest path {path:?} must use forward slashes"));
    }
    if path.starts_with('/') || Path::new(path).is_absolute() || path.contains(':') {
        return Err(format!("manifest path {path:?} must be relative"));
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err(format!("manifest path {path:?} has an empty segment")),
            "." | ".." => {
                return Err(format!("manifest path {path:?} is not normalized"))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Translate a forward-slash manifest path into a host path under `root`.
pub fn resolve_under(root: &Path, relative_path: &str) -> PathBuf {
    relative_path
        .split('/')
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Reads and writes the flat JSON manifest file.
pub struct ManifestStore;

impl ManifestStore {
    /// Load a manifest. Absence is a hard error, not a warning.
    pub fn load(path: &Path) -> LauncherResult<Manifest> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LauncherError::ManifestMissing(path.to_path_buf()))
            }
            Err(source) => return Err(LauncherError::io(path, source)),
        };

        let manifest: Manifest =
            serde_json::from_slice(&raw).map_err(|e| LauncherError::ManifestParse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        info!("Loaded manifest {:?} ({} entries)", path, manifest.len());
        Ok(manifest)
    }

    pub fn save(manifest: &Manifest, path: &Path) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        fsutil::write_atomic(path, json.as_bytes()).map_err(|source| LauncherError::io(path, source))?;
        info!("Saved manifest {:?} ({} entries)", path, manifest.len());
        Ok(())
    }
}

/// Hash every regular file under `data_root` into a fresh manifest.
///
/// Intended to run once against a known-clean reference installation.
/// `on_progress` receives `(done, total, relative_path)` per file.
pub fn generate_manifest<H, F>(
    data_root: &Path,
    hasher: &H,
    mut on_progress: F,
) -> LauncherResult<Manifest>
where
    H: ContentHasher + ?Sized,
    F: FnMut(usize, usize, &str),
{
    if !data_root.is_dir() {
        return Err(LauncherError::PathInvalid {
            path: data_root.to_path_buf(),
            detail: "data folder does not exist".into(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(data_root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_default();
            LauncherError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = relative_manifest_path(data_root, entry.path()) else {
            warn!("Skipping non UTF-8 path {:?}", entry.path());
            continue;
        };
        files.push((entry.into_path(), relative));
    }

    let total = files.len();
    let mut entries = Vec::with_capacity(total);
    for (done, (path, relative)) in files.into_iter().enumerate() {
        let metadata = std::fs::metadata(&path).map_err(|source| LauncherError::io(&path, source))?;
        let modified_at =
            ModifiedTime::of_metadata(&metadata).map_err(|source| LauncherError::io(&path, source))?;
        let content_hash = hasher.hash_file(&path)?;
        debug!("Hashed {} ({} bytes)", relative, metadata.len());
        on_progress(done + 1, total, &relative);
        entries.push(ManifestEntry {
            relative_path: relative,
            content_hash,
            size_bytes: metadata.len(),
            modified_at,
        });
    }

    Manifest::from_entries(entries).map_err(|detail| LauncherError::ManifestParse {
        path: data_root.to_path_buf(),
        detail,
    })
}

fn relative_manifest_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(segments?.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::integrity::Sha256Hasher;

    fn digest(byte: u8) -> ContentDigest {
        ContentDigest::from_bytes([byte; 32])
    }

    #[test]
    fn loads_flat_json_with_integer_and_float_mtimes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let json = format!(
            r#"{{
                "common.MPQ": {{"hash": "{}", "size": 100, "mtime": 1000}},
                "koKR/locale-koKR.MPQ": {{"hash": "{}", "size": 0, "mtime": 1700000000.123456}}
            }}"#,
            digest(1).to_hex(),
            digest(2).to_hex()
        );
        std::fs::write(&path, json).unwrap();

        let manifest = ManifestStore::load(&path).unwrap();
        assert_eq!(manifest.len(), 2);
        let common = manifest.get("common.MPQ").unwrap();
        assert_eq!(common.size_bytes, 100);
        assert_eq!(common.modified_at, ModifiedTime(1000.0));
        let locale = manifest.get("koKR/locale-koKR.MPQ").unwrap();
        assert_eq!(locale.modified_at, ModifiedTime(1700000000.123456));
        assert_eq!(locale.content_hash, digest(2));
    }

    #[test]
    fn missing_manifest_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestStore::load(&dir.path().join("manifest.json")).unwrap_err();
        assert!(matches!(err, LauncherError::ManifestMissing(_)));
    }

    #[test]
    fn malformed_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        for bad in [
            "not json",
            r#"{"a.MPQ": {"hash": "zz", "size": 1, "mtime": 1}}"#,
            r#"{"../escape.MPQ": {"hash": "00", "size": 1, "mtime": 1}}"#,
            r#"{"Data\\a.MPQ": {"hash": "00", "size": 1, "mtime": 1}}"#,
        ] {
            std::fs::write(&path, bad).unwrap();
            let err = ManifestStore::load(&path).unwrap_err();
            assert!(
                matches!(err, LauncherError::ManifestParse { .. }),
                "{bad} -> {err:?}"
            );
        }
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let json = format!(
            r#"{{"a.MPQ": {{"hash": "{h}", "size": 1, "mtime": 1}}, "a.MPQ": {{"hash": "{h}", "size": 2, "mtime": 2}}}}"#,
            h = digest(3).to_hex()
        );
        assert!(serde_json::from_str::<Manifest>(&json).is_err());
    }

    #[test]
    fn generated_manifest_round_trips_without_timestamp_loss() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("Data");
        std::fs::create_dir_all(data.join("koKR")).unwrap();
        std::fs::write(data.join("common.MPQ"), b"common archive").unwrap();
        std::fs::write(data.join("koKR").join("realmlist.wtf"), b"set realmlist x\n").unwrap();
        std::fs::write(data.join("empty.MPQ"), b"").unwrap();

        let mut seen = Vec::new();
        let manifest = generate_manifest(&data, &Sha256Hasher, |done, total, path| {
            seen.push((done, total, path.to_string()));
        })
        .unwrap();
        assert_eq!(manifest.len(), 3);
        assert_eq!(seen.last().unwrap().0, 3);
        assert!(manifest.get("koKR/realmlist.wtf").is_some());

        let out = dir.path().join("config").join("manifest.json");
        ManifestStore::save(&manifest, &out).unwrap();
        let reloaded = ManifestStore::load(&out).unwrap();
        assert_eq!(reloaded, manifest);
        for entry in manifest.entries() {
            let back = reloaded.get(&entry.relative_path).unwrap();
            assert_eq!(back.modified_at.0.to_bits(), entry.modified_at.0.to_bits());
        }
    }

    #[test]
    fn generation_requires_existing_data_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate_manifest(&dir.path().join("Data"), &Sha256Hasher, |_, _, _| {}).unwrap_err();
        assert_eq!(err.reason(), "invalid game path");
    }

    #[test]
    fn resolves_forward_slash_paths_on_host() {
        let root = Path::new("game").join("Data");
        let resolved = resolve_under(&root, "koKR/patch-koKR.MPQ");
        assert_eq!(resolved, root.join("koKR").join("patch-koKR.MPQ"));
    }
}
