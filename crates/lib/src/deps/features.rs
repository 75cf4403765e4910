//! Bundled dependency shortcuts.
//!
//! A `type = "feature"` entry names one of these and expands into an ordinary
//! [`DependencySpec`] before resolution.

use super::types::{BuildSystem, DependencySpec, Revision};

pub const ARROW_URL: &str = "https://github.com/apache/arrow.git";
pub const ARROW_TAG: &str = "apache-arrow-21.0.0";
pub const EIGEN_URL: &str = "https://gitlab.com/libeigen/eigen.git";
pub const EIGEN_TAG: &str = "3.4.0";

/// Names accepted as feature shortcuts.
pub const KNOWN_FEATURES: &[&str] = &["arrow", "eigen3"];

/// Expand `feature` into a spec named `name`, or `None` if unknown.
pub fn expand(name: &str, feature: &str) -> Option<DependencySpec> {
  let spec = match feature {
    "arrow" => arrow(name),
    "eigen3" | "eigen" => eigen3(name),
    _ => return None,
  };
  Some(spec)
}

fn arrow(name: &str) -> DependencySpec {
  let mut spec = DependencySpec::git(name, ARROW_URL, Some(Revision::Tag(ARROW_TAG.to_string())));
  spec.feature = Some("arrow".to_string());
  spec.subdir = Some("cpp".to_string());
  spec.build_system = Some(BuildSystem::Cmake.as_str().to_string());
  spec.libraries = vec!["arrow".to_string()];

  let on = [
    "ARROW_BUILD_SHARED",
    "ARROW_COMPUTE",
    "ARROW_CSV",
    "ARROW_FILESYSTEM",
    "ARROW_JSON",
  ];
  let off = [
    "ARROW_BUILD_STATIC",
    "ARROW_DATASET",
    "ARROW_FLIGHT",
    "ARROW_GANDIVA",
    "ARROW_HDFS",
    "ARROW_JEMALLOC",
    "ARROW_MIMALLOC",
    "ARROW_PARQUET",
    "ARROW_PYTHON",
    "ARROW_S3",
    "ARROW_WITH_BROTLI",
    "ARROW_WITH_BZ2",
    "ARROW_WITH_LZ4",
    "ARROW_WITH_SNAPPY",
    "ARROW_WITH_ZLIB",
    "ARROW_WITH_ZSTD",
    "ARROW_BUILD_TESTS",
    "ARROW_BUILD_BENCHMARKS",
    "ARROW_BUILD_EXAMPLES",
    "ARROW_BUILD_INTEGRATION",
    "ARROW_VERBOSE_THIRDPARTY_BUILD",
  ];
  for key in on {
    spec.options.insert(key.to_string(), "ON".to_string());
  }
  for key in off {
    spec.options.insert(key.to_string(), "OFF".to_string());
  }
  spec
    .options
    .insert("ARROW_DEPENDENCY_SOURCE".to_string(), "BUNDLED".to_string());
  spec
}

fn eigen3(name: &str) -> DependencySpec {
  let mut spec = DependencySpec::git(name, EIGEN_URL, Some(Revision::Tag(EIGEN_TAG.to_string())));
  spec.feature = Some("eigen3".to_string());
  spec.build_system = Some(BuildSystem::None.as_str().to_string());
  spec.include_dirs = vec!["Eigen".to_string(), "unsupported".to_string()];
  spec
}
