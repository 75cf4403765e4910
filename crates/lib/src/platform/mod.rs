//! Host facts the toolchain, link and cache layers depend on.

pub mod os;
pub mod paths;

use os::Os;

/// Host description such as `x86_64-linux` or `aarch64-darwin`.
///
/// Returns `None` on operating systems no toolchain family supports.
pub fn host_triple() -> Option<String> {
  Os::current().map(|os| format!("{}-{os}", std::env::consts::ARCH))
}
