//! Persistent record of what the objects in `build/` were compiled from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::BuildError;
use crate::deps::DependencyArtifacts;
use crate::toolchain::{Family, ToolchainHandle};
use crate::util::hash::{Hashable, hash_bytes};

pub const STAMP_FILENAME: &str = ".cxxnode-stamp.json";
const STAMP_VERSION: u32 = 1;

/// Per-object record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStamp {
  pub source_mtime: u128,
  pub flags_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
  pub version: u32,
  /// Hash of every build-wide input; see [`BuildFingerprint`].
  pub fingerprint: String,
  /// Hash of the last successful link command.
  pub link_fingerprint: Option<String>,
  /// Keyed by object file name.
  pub objects: BTreeMap<String, ObjectStamp>,
}

impl Stamp {
  pub fn new(fingerprint: String) -> Self {
    Self {
      version: STAMP_VERSION,
      fingerprint,
      link_fingerprint: None,
      objects: BTreeMap::new(),
    }
  }

  /// Read a stamp. A missing or unreadable stamp is treated as absent.
  pub fn load(path: &Path) -> Option<Self> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Stamp>(&content) {
      Ok(stamp) if stamp.version == STAMP_VERSION => Some(stamp),
      Ok(_) => None,
      Err(e) => {
        debug!(path = %path.display(), error = %e, "ignoring unreadable build stamp");
        None
      }
    }
  }

  pub fn save(&self, path: &Path) -> Result<(), BuildError> {
    let content = serde_json::to_string_pretty(self).map_err(BuildError::Fingerprint)?;
    std::fs::write(path, content).map_err(|source| BuildError::Io {
      path: path.to_path_buf(),
      source,
    })
  }

  /// An object can be reused only if it exists and was built from the same
  /// source modification time with the same flags.
  pub fn is_fresh(&self, object_name: &str, object_path: &Path, current: &ObjectStamp) -> bool {
    object_path.is_file() && self.objects.get(object_name) == Some(current)
  }
}

/// Every input that, when changed, invalidates all objects at once.
#[derive(Debug, Serialize)]
pub struct BuildFingerprint<'a> {
  pub family: Family,
  pub cxx: &'a PathBuf,
  pub cc: &'a PathBuf,
  pub version: &'a str,
  pub c_flags: &'a [String],
  pub cxx_flags: &'a [String],
  pub dependencies: &'a [DependencyArtifacts],
}

impl Hashable for BuildFingerprint<'_> {}

impl<'a> BuildFingerprint<'a> {
  pub fn new(
    toolchain: &'a ToolchainHandle,
    c_flags: &'a [String],
    cxx_flags: &'a [String],
    dependencies: &'a [DependencyArtifacts],
  ) -> Self {
    Self {
      family: toolchain.family,
      cxx: &toolchain.cxx,
      cc: &toolchain.cc,
      version: &toolchain.version,
      c_flags,
      cxx_flags,
      dependencies,
    }
  }
}

/// Hash of a flag list, order-sensitive.
pub fn flags_hash(flags: &[String]) -> String {
  hash_bytes(flags.join("\0").as_bytes()).0
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn object(mtime: u128) -> ObjectStamp {
    ObjectStamp {
      source_mtime: mtime,
      flags_hash: flags_hash(&["-O2".to_string()]),
    }
  }

  #[test]
  fn save_and_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(STAMP_FILENAME);
    let mut stamp = Stamp::new("abc".to_string());
    stamp.objects.insert("src_main.cc.o".to_string(), object(1_700_000_000_123_456_789));
    stamp.link_fingerprint = Some("link".to_string());

    stamp.save(&path).unwrap();

    assert_eq!(Stamp::load(&path), Some(stamp));
  }

  #[test]
  fn garbage_stamp_is_absent() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(STAMP_FILENAME);
    std::fs::write(&path, "not json").unwrap();

    assert_eq!(Stamp::load(&path), None);
    assert_eq!(Stamp::load(&temp.path().join("missing")), None);
  }

  #[test]
  fn freshness_needs_object_and_matching_record() {
    let temp = TempDir::new().unwrap();
    let obj = temp.path().join("a.o");
    let mut stamp = Stamp::new("fp".to_string());
    stamp.objects.insert("a.o".to_string(), object(10));

    assert!(!stamp.is_fresh("a.o", &obj, &object(10)));
    std::fs::write(&obj, "").unwrap();
    assert!(stamp.is_fresh("a.o", &obj, &object(10)));
    assert!(!stamp.is_fresh("a.o", &obj, &object(11)));
  }

  #[test]
  fn flag_order_matters() {
    let a = vec!["-Ia".to_string(), "-Ib".to_string()];
    let b = vec!["-Ib".to_string(), "-Ia".to_string()];
    assert_ne!(flags_hash(&a), flags_hash(&b));
  }
}
