mod build;
mod cache;
mod toolchain;

pub use build::{BuildArgs, cmd_build};
pub use cache::{cmd_cache_clean, cmd_cache_info};
pub use toolchain::cmd_toolchain;
