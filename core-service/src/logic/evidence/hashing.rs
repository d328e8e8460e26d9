//! Content and custody hashing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use strum::{Display, EnumString};

use super::types::{CustodyAction, CustodyEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum HashAlgorithm {
    #[default]
    #[strum(to_string = "sha256", serialize = "sha-256")]
    Sha256,
    #[strum(to_string = "sha512", serialize = "sha-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Hex digest over the exact bytes
    pub fn digest(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

/// SHA-256 over the previous link and this entry's fields
pub fn custody_hash(
    previous_hash: &str,
    sequence: u32,
    actor: &str,
    action: CustodyAction,
    at: &chrono::DateTime<chrono::Utc>,
    note: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(sequence.to_be_bytes());
    hasher.update(actor.as_bytes());
    hasher.update([0u8]);
    hasher.update(action.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(at.to_rfc3339().as_bytes());
    hasher.update([0u8]);
    hasher.update(note.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// Check every link against its predecessor, anchored on the content hash.
/// Returns the first broken sequence number.
pub fn verify_chain(content_hash: &str, chain: &[CustodyEntry]) -> Result<(), u32> {
    let mut previous = content_hash.to_string();

    for (i, entry) in chain.iter().enumerate() {
        let expected = custody_hash(
            &entry.previous_hash,
            entry.sequence,
            &entry.actor,
            entry.action,
            &entry.at,
            entry.note.as_deref(),
        );
        if entry.sequence as usize != i || entry.previous_hash != previous || entry.entry_hash != expected {
            return Err(entry.sequence);
        }
        previous = entry.entry_hash.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            HashAlgorithm::Sha256.digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(HashAlgorithm::Sha512.digest(b"abc").len(), 128);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(HashAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!("SHA-512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
