//! Evidence Vault Module
//!
//! ## Structure
//! - `types`: Evidence, custody chain, packages and export bundles
//! - `hashing`: Content digests and custody link hashing
//! - `blob`: Material storage (memory, filesystem)
//! - `vault`: Capture, verification, access, legal hold, retention

pub mod blob;
pub mod hashing;
pub mod types;
pub mod vault;

#[cfg(test)]
mod tests;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use hashing::HashAlgorithm;
pub use types::{
    BundleItem, CollectionMethod, CustodyAction, CustodyEntry, Evidence, EvidenceBundle, EvidencePackage,
    EvidenceType, MaterialEncoding, PurgeReport,
};
pub use vault::{CaptureRequest, EvidenceVault, VaultResult};
