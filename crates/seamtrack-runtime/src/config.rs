//! Tracker configuration – reads/writes a TOML file.
//!
//! Every field falls back to the calibrated cell's build-time value, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! [link]
//! controller_addr = "192.168.255.101:50240"
//! tool_number = 15
//!
//! [planner]
//! weld_speed = 15.0
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use seamtrack_hal::LinkConfig;
use seamtrack_perception::{CameraIntrinsics, HandEyeCalibration, LaserPlane, LaserToBase, LaserTriangulator};
use seamtrack_planner::{PlannerConfig, TrajectoryPlanner};
use seamtrack_types::SeamError;

/// Overrides `link.controller_addr`.
pub const ENV_CONTROLLER_ADDR: &str = "SEAMTRACK_CONTROLLER_ADDR";
/// Overrides `link.tool_number`.
pub const ENV_TOOL_NUMBER: &str = "SEAMTRACK_TOOL_NUMBER";
/// Overrides `planner.weld_speed`.
pub const ENV_WELD_SPEED: &str = "SEAMTRACK_WELD_SPEED";

/// Complete configuration of one tracking cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub camera: CameraIntrinsics,
    #[serde(default)]
    pub laser_plane: LaserPlane,
    #[serde(default)]
    pub hand_eye: HandEyeCalibration,
}

impl TrackerConfig {
    /// Parse a TOML document.  Environment overrides are not applied.
    pub fn parse(raw: &str) -> Result<Self, SeamError> {
        toml::from_str(raw).map_err(|e| SeamError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), SeamError> {
        if self.link.controller_addr.trim().is_empty() {
            return Err(SeamError::Config("link.controller_addr must not be empty".into()));
        }
        if self.link.queue_capacity <= 0 {
            return Err(SeamError::Config(format!(
                "link.queue_capacity must be positive, got {}",
                self.link.queue_capacity
            )));
        }
        self.planner.validate()
    }

    /// Planner built from the `[planner]` section.
    pub fn planner(&self) -> Result<TrajectoryPlanner, SeamError> {
        TrajectoryPlanner::new(self.planner)
    }

    /// Pixel-to-base chain built from the sensor and hand-eye sections.
    ///
    /// # Errors
    ///
    /// [`SeamError::Degenerate`] when the laser plane cannot be inverted.
    pub fn laser_to_base(&self) -> Result<LaserToBase, SeamError> {
        let triangulator = LaserTriangulator::new(self.camera, self.laser_plane)?;
        Ok(LaserToBase::new(triangulator, &self.hand_eye))
    }
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
///
/// Environment overrides are applied before validation.
pub fn load_from(path: &Path) -> Result<Option<TrackerConfig>, SeamError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| SeamError::Io(format!("Failed to read config at {}: {e}", path.display())))?;
    let mut cfg = TrackerConfig::parse(&raw)?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    debug!(path = %path.display(), "config loaded");
    Ok(Some(cfg))
}

/// Apply `SEAMTRACK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SEAMTRACK_CONTROLLER_ADDR` | `link.controller_addr` |
/// | `SEAMTRACK_TOOL_NUMBER` | `link.tool_number` |
/// | `SEAMTRACK_WELD_SPEED` | `planner.weld_speed` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut TrackerConfig) {
    if let Ok(v) = std::env::var(ENV_CONTROLLER_ADDR)
        && !v.trim().is_empty()
    {
        cfg.link.controller_addr = v;
    }
    if let Ok(v) = std::env::var(ENV_TOOL_NUMBER)
        && let Ok(tool) = v.trim().parse::<i32>()
    {
        cfg.link.tool_number = tool;
    }
    if let Ok(v) = std::env::var(ENV_WELD_SPEED)
        && let Ok(speed) = v.trim().parse::<f64>()
        && speed > 0.0
    {
        cfg.planner.weld_speed = speed;
    }
}

/// Save the config to `path`, creating parent directories if necessary.
pub fn save_to(cfg: &TrackerConfig, path: &Path) -> Result<(), SeamError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| SeamError::Io(format!("Failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| SeamError::Config(format!("Failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| SeamError::Io(format!("Failed to write config at {}: {e}", path.display())))
}
