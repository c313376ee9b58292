use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::core::error::{LauncherError, LauncherResult};

/// Chunk size used for streaming reads. Matches the manifest generation tool.
pub const HASH_CHUNK_SIZE: usize = 4096;

/// A SHA-256 content digest, serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| format!("invalid SHA-256 digest {s:?}: {e}"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Computes content digests of files on disk.
///
/// The verifier only reaches for this on the slow path, so implementations are
/// free to be expensive.
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> LauncherResult<ContentDigest>;
}

/// Streaming SHA-256 over fixed-size chunks. Never holds more than one chunk
/// of the file in memory and applies no line-ending or encoding normalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash_file(&self, path: &Path) -> LauncherResult<ContentDigest> {
        let mut file = File::open(path).map_err(|source| LauncherError::io(path, source))?;
        hash_reader(&mut file).map_err(|source| LauncherError::io(path, source))
    }
}

pub(crate) fn hash_reader<R: Read>(reader: &mut R) -> std::io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentDigest(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_file_has_well_defined_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let digest = Sha256Hasher.hash_file(&path).unwrap();
        assert_eq!(digest.to_hex(), EMPTY_SHA256);
    }

    #[test]
    fn multi_chunk_file_matches_one_shot_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..HASH_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let expected: [u8; 32] = Sha256::digest(&data).into();
        assert_eq!(
            Sha256Hasher.hash_file(&path).unwrap(),
            ContentDigest::from_bytes(expected)
        );
    }

    #[test]
    fn line_endings_are_not_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let unix = dir.path().join("unix.txt");
        let dos = dir.path().join("dos.txt");
        std::fs::write(&unix, b"a\nb\n").unwrap();
        std::fs::write(&dos, b"a\r\nb\r\n").unwrap();

        assert_ne!(
            Sha256Hasher.hash_file(&unix).unwrap(),
            Sha256Hasher.hash_file(&dos).unwrap()
        );
    }

    #[test]
    fn missing_file_reports_offending_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.MPQ");
        match Sha256Hasher.hash_file(&path) {
            Err(LauncherError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn digest_parses_uppercase_hex_and_rejects_short_input() {
        let upper = EMPTY_SHA256.to_uppercase();
        let parsed: ContentDigest = upper.parse().unwrap();
        assert_eq!(parsed.to_hex(), EMPTY_SHA256);
        assert!("abc123".parse::<ContentDigest>().is_err());
    }
}
