//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - cluster configuration checks failed
pub const VALIDATION_ERROR: i32 = 2;

/// Render error - manifests could not be rendered
pub const RENDER_ERROR: i32 = 3;

/// Cluster error - detection, create, delete or wait failed
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
