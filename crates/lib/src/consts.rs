//! Names and limits shared across the engine.

pub const APP_NAME: &str = "cxxnode";

/// Configuration file names accepted in a project directory, in lookup order.
pub const CONFIG_FILENAMES: &[&str] = &["cxxnode.toml", ".cxxnode.toml"];

/// Environment variable that overrides automatic compiler selection.
pub const CXX_ENV: &str = "CXX";

/// Secondary spelling of [`CXX_ENV`], consulted only when `CXX` is unset.
pub const CXX_COMPILER_ENV: &str = "CXX_COMPILER";

/// Environment variable that relocates the shared dependency cache.
pub const CACHE_ENV: &str = "CXXNODE_CACHE";

/// Environment variable naming the dataflow runtime's build output directory.
pub const RUNTIME_DIR_ENV: &str = "CXXNODE_RUNTIME_DIR";

/// Length of the hex prefix used for dependency identities.
pub const IDENTITY_HASH_LEN: usize = 20;
