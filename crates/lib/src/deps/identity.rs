//! Deterministic dependency identities.

use std::collections::BTreeMap;

use serde::Serialize;

use super::types::{BuildSystem, DependencyKind, DependencySpec, Revision};
use crate::config::Profile;
use crate::util::hash::{HashError, Hashable, ShortHash};

/// The cache key of a dependency and its directory label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyIdentity {
  pub hash: ShortHash,
  /// `<name>-<hash>`
  pub label: String,
}

#[derive(Serialize)]
struct IdentityKey<'a> {
  name: &'a str,
  kind: DependencyKind,
  location: String,
  revision: Option<&'a Revision>,
  subdir: Option<&'a str>,
  build_system: BuildSystem,
  /// Only set for build systems whose output depends on it.
  build_type: Option<&'static str>,
  options: &'a BTreeMap<String, String>,
  include_dirs: &'a [String],
  lib_dirs: &'a [String],
  libraries: &'a [String],
}

impl Hashable for IdentityKey<'_> {}

/// Compute the identity of `spec` built with `build_system` for `profile`.
///
/// Options live in a sorted map, so declaration order never changes the key.
/// The originating feature name is not part of the key: a shortcut and the
/// equivalent hand-written declaration share an entry.
pub fn identity(spec: &DependencySpec, build_system: BuildSystem, profile: Profile) -> Result<DependencyIdentity, HashError> {
  let key = IdentityKey {
    name: &spec.name,
    kind: spec.kind,
    location: canonical_location(spec),
    revision: spec.revision.as_ref(),
    subdir: spec.subdir.as_deref().map(|s| s.trim_matches('/')).filter(|s| !s.is_empty()),
    build_system,
    build_type: (build_system == BuildSystem::Cmake).then(|| profile.cmake_build_type()),
    options: &spec.options,
    include_dirs: &spec.include_dirs,
    lib_dirs: &spec.lib_dirs,
    libraries: &spec.libraries,
  };
  let hash = key.short_hash()?;
  Ok(DependencyIdentity {
    label: format!("{}-{}", sanitize(&spec.name), hash),
    hash,
  })
}

/// Normalised location string: URLs lose surrounding whitespace and a
/// trailing `/` or `.git`; local paths are canonicalised when they exist.
pub fn canonical_location(spec: &DependencySpec) -> String {
  match spec.kind {
    DependencyKind::Git => spec.url.as_deref().map(normalize_url).unwrap_or_default(),
    DependencyKind::Local => spec
      .path
      .as_ref()
      .map(|p| dunce::canonicalize(p).unwrap_or_else(|_| p.clone()).display().to_string())
      .unwrap_or_default(),
    DependencyKind::System => spec.pkg_config.clone().unwrap_or_default(),
  }
}

fn normalize_url(url: &str) -> String {
  let url = url.trim().trim_end_matches('/');
  url.strip_suffix(".git").unwrap_or(url).to_string()
}

fn sanitize(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect()
}
