//! Hashing used for dependency identities and build fingerprints.
//!
//! Both are SHA-256 over the JSON serialization of a value. Identities are
//! truncated so cache directory names stay readable; fingerprints keep the
//! full digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::IDENTITY_HASH_LEN;

pub type HashError = serde_json::Error;

/// A truncated, lowercase hex SHA-256 used to name cache entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShortHash(pub String);

impl std::fmt::Display for ShortHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A full 64-character SHA-256 used to compare build inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn short_hash(&self) -> Result<ShortHash, HashError> {
    let full = self.content_hash()?;
    Ok(ShortHash(full.0[..IDENTITY_HASH_LEN].to_string()))
  }

  fn content_hash(&self) -> Result<ContentHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(hash_bytes(serialized.as_bytes()))
  }
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
