//! Offline seam point files.
//!
//! One point per line, three whitespace-separated numbers (`x y z`).  Lines
//! that do not hold exactly three numbers are skipped on read.  Values are
//! written as `{:07.2}` (two decimals, zero-padded to seven characters).

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use seamtrack_types::SeamError;

/// Read every well-formed point in `path`.
///
/// # Errors
///
/// [`SeamError::Io`] when the file cannot be read.
pub fn read_points(path: &Path) -> Result<Vec<[f64; 3]>, SeamError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| SeamError::Io(format!("Failed to read {}: {e}", path.display())))?;

    let mut points = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_point(line) {
            Some(point) => points.push(point),
            None => warn!(line = line_no + 1, content = line, "malformed point line skipped"),
        }
    }
    debug!(path = %path.display(), points = points.len(), "points read");
    Ok(points)
}

/// Write `points` to `path`, replacing any existing content.
pub fn write_points(path: &Path, points: &[[f64; 3]]) -> Result<(), SeamError> {
    let mut out = String::with_capacity(points.len() * 24);
    for point in points {
        out.push_str(&format_point(point));
        out.push('\n');
    }
    fs::write(path, out)
        .map_err(|e| SeamError::Io(format!("Failed to write {}: {e}", path.display())))?;
    debug!(path = %path.display(), points = points.len(), "points written");
    Ok(())
}

/// One output line without the terminator.
pub fn format_point(point: &[f64; 3]) -> String {
    point
        .iter()
        .map(|v| format!("{v:07.2}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_point(line: &str) -> Option<[f64; 3]> {
    let mut tokens = line.split_whitespace();
    let mut point = [0.0; 3];
    for slot in &mut point {
        *slot = tokens.next()?.parse().ok()?;
    }
    tokens.next().is_none().then_some(point)
}
