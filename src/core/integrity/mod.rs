pub mod hasher;
pub mod manifest;
pub mod verifier;

pub use hasher::{ContentDigest, ContentHasher, Sha256Hasher};
pub use manifest::{generate_manifest, Manifest, ManifestEntry, ManifestStore, ModifiedTime};
pub use verifier::{
    verify, Verification, VerificationReport, VerificationStatus, VerifyEvent, VerifyFailure,
    VerifyProgress,
};
