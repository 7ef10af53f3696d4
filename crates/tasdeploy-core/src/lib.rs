//! tasdeploy Core - shared types for the topology-aware scheduling deployer
//!
//! This crate provides the foundational types used throughout tasdeploy:
//! - `Platform` / `PlatformVersion`: the targeted cluster distribution and its version
//! - `Detection`: a discovered value together with where it came from
//! - Render options for each managed sub-system (API, updater, scheduler plugin)
//! - `Images`: the default component images and the mirror transform
//! - `args`: idempotent helpers for container command-line arguments

pub mod args;
pub mod error;
pub mod images;
pub mod options;
pub mod platform;
pub mod settings;

pub use error::{CoreError, Result};
pub use images::{Images, mirror};
pub use options::{
    ApiOptions, LeaderElectionResource, PullPolicy, ScoringStrategy, SchedulerOptions, UpdaterKind,
    UpdaterOptions,
};
pub use platform::{Detection, DetectionSource, Platform, PlatformOverride, PlatformVersion};
pub use settings::Settings;
