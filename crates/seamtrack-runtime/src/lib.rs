//! `seamtrack-runtime` – configuration, logging and the tracking supervisor.
//!
//! # Modules
//!
//! - [`config`] – [`TrackerConfig`][config::TrackerConfig]: TOML file with
//!   `SEAMTRACK_*` environment overrides.
//! - [`telemetry`] – global `tracing` subscriber setup.
//! - [`trajectory_file`] – offline `x y z` point files.
//! - [`tracker`] – [`SeamTracker`][tracker::SeamTracker]: pixel in,
//!   motion increments out.

pub mod config;
pub mod telemetry;
pub mod tracker;
pub mod trajectory_file;

pub use config::TrackerConfig;
pub use tracker::SeamTracker;
