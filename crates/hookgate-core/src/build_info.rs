//! Build-time metadata embedded by the build script.
//!
//! Reported by the `health` system action and `hookgate status`.

use serde::Serialize;

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("HOOKGATE_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("HOOKGATE_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("HOOKGATE_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// Build metadata in serializable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub profile: &'static str,
}

/// Build metadata of the running binary.
pub fn current() -> BuildInfo {
    BuildInfo {
        version: VERSION,
        git_hash: GIT_HASH,
        build_timestamp: BUILD_TIMESTAMP,
        profile: BUILD_PROFILE,
    }
}
