//! Values fixed at build time

/// Mirror revision used when `--image-mirror-revision` is not given
const FALLBACK_MIRROR_REVISION: u32 = 1;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Commit the binary was built from
pub fn git_commit() -> &'static str {
    option_env!("TASDEPLOY_GIT_COMMIT").unwrap_or("unknown")
}

/// Target triple approximation of the running binary
pub fn target() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

/// Mirror revision of the images shipped with this build
pub fn mirror_revision() -> u32 {
    option_env!("TASDEPLOY_MIRROR_REVISION")
        .and_then(|r| r.parse().ok())
        .unwrap_or(FALLBACK_MIRROR_REVISION)
}
