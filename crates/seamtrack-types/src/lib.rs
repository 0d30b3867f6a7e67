//! `seamtrack-types` – data model shared by every seam-tracking crate.
//!
//! Holds the workspace error type, the fixed-point increment representation,
//! the decoded robot status and the two link-health enumerations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of increment entries carried by one outgoing wire frame.
pub const INCREMENT_BATCH: usize = 10;

/// Number of digital I/O ports addressable in a frame.
pub const IO_PORTS: usize = 8;

/// Width of every pose / pulse array on the wire.
pub const POSE_WORDS: usize = 8;

/// One motion increment: `[dx, dy, dz, drx, dry, drz]`.
///
/// Positions are in 0.001 mm, attitudes in 0.0001 degree.
pub type Increment = [i32; 6];

/// Global error type for geometry, planning, configuration and file failures.
///
/// Communication faults are not errors; they surface through [`CommStatus`]
/// and [`DataStatus`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeamError {
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Index ({row}, {col}) out of range for {rows}x{cols} matrix")]
    IndexOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Numerical degeneracy: {0}")]
    Degenerate(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SeamError {
    pub fn dimension(context: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context: context.to_string(),
            expected,
            actual,
        }
    }
}

/// Fail unless `values` has exactly `expected` components.
pub fn require_len(context: &str, values: &[f64], expected: usize) -> Result<(), SeamError> {
    if values.len() != expected {
        return Err(SeamError::dimension(context, expected, values.len()));
    }
    Ok(())
}

/// Fail unless `values` has at least `expected` components.
pub fn require_min_len(context: &str, values: &[f64], expected: usize) -> Result<(), SeamError> {
    if values.len() < expected {
        return Err(SeamError::dimension(context, expected, values.len()));
    }
    Ok(())
}

/// Connection health of the robot link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommStatus {
    /// The link has never been started.
    Uninitialized = 0,
    /// A connection attempt is in progress.
    Connecting = 1,
    /// The last connection attempt failed.
    NotConnected = 2,
    /// The last send did not complete within the send timeout.
    SendTimedOut = 3,
    /// The last send succeeded.
    Ok = 4,
}

impl CommStatus {
    /// Decode a value previously produced by `as u8`.  Unknown values map to
    /// [`CommStatus::Uninitialized`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::NotConnected,
            3 => Self::SendTimedOut,
            4 => Self::Ok,
            _ => Self::Uninitialized,
        }
    }
}

/// Health of the data most recently exchanged with the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataStatus {
    /// No reply yet, or the last reply timed out.
    NoData = 0,
    /// The last reply was valid and has been published.
    Ok = 1,
    /// The CRC recomputed over the reply did not match its CRC field.
    RecvCrcError = 2,
    /// The controller flagged our previous frame as CRC-corrupt.
    SenderCrcError = 3,
    /// The reply did not echo the serial number of the request.
    SerialMismatch = 4,
}

impl DataStatus {
    /// Decode a value previously produced by `as u8`.  Unknown values map to
    /// [`DataStatus::NoData`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ok,
            2 => Self::RecvCrcError,
            3 => Self::SenderCrcError,
            4 => Self::SerialMismatch,
            _ => Self::NoData,
        }
    }
}

/// Decoded controller state, in real units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    /// Raw joint encoder pulses.
    pub pulse_pos: [i32; POSE_WORDS],
    /// Tool-centre-point pose `[x, y, z, rx, ry, rz, ..]` (mm, degrees).
    pub tool_pos: [f64; POSE_WORDS],
    /// Flange pose `[x, y, z, rx, ry, rz, ..]` (mm, degrees).
    pub flange_pos: [f64; POSE_WORDS],
    /// Digital input values.
    pub input_io: [i32; IO_PORTS],
    /// Depth of the controller's internal motion queue.
    pub queue_count: i32,
    /// Time at which this status was published; `None` before the first
    /// valid reply.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RobotStatus {
    /// The six Cartesian components of the flange pose.
    pub fn flange_pose(&self) -> [f64; 6] {
        let mut pose = [0.0; 6];
        pose.copy_from_slice(&self.flange_pos[..6]);
        pose
    }

    /// The six Cartesian components of the tool pose.
    pub fn tool_pose(&self) -> [f64; 6] {
        let mut pose = [0.0; 6];
        pose.copy_from_slice(&self.tool_pos[..6]);
        pose
    }
}
