// ExifTool wrapper for embedded GPS tags

use std::path::Path;
use std::process::Command;
use std::time::Duration;
use crate::constants::EXIFTOOL_TIMEOUT_SECS;
use crate::error::{BrollError, Result};
use crate::metadata::GpsLocation;

/// Run exiftool (-j -n) and return the embedded GPS fix, if any.
/// iPhone footage stores it in QuickTime keys, DJI footage in XMP/UserData.
pub fn extract_gps(path: &Path) -> Result<Option<GpsLocation>> {
    let display = path.display().to_string();
    let mut cmd = Command::new(crate::tools::exiftool_path());
    cmd.args([
        "-j",
        "-n",
        "-GPSLatitude",
        "-GPSLongitude",
        "-GPSCoordinates",
        "-Keys:GPSCoordinates",
        "-UserData:GPSCoordinates",
        "-ItemList:GPSCoordinates",
    ])
    .arg(path);

    let output = crate::tools::output_with_timeout(cmd, Duration::from_secs(EXIFTOOL_TIMEOUT_SECS))
        .map_err(|e| BrollError::extraction(&display, "exiftool", format!("Failed to run exiftool: {}", e)))?;

    if !output.status.success() || output.stdout.is_empty() {
        return Ok(None);
    }

    let raw: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| BrollError::extraction(&display, "exiftool", format!("Failed to parse exiftool JSON: {}", e)))?;

    // exiftool returns an array; take the first element
    Ok(raw.as_array().and_then(|a| a.first()).and_then(parse_gps))
}

/// Pull a validated GPS fix out of one exiftool record.
pub fn parse_gps(dump: &serde_json::Value) -> Option<GpsLocation> {
    let lat = get_number(dump, "GPSLatitude");
    let lon = get_number(dump, "GPSLongitude");

    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        // Some devices store a combined "lat lon [alt]" string
        _ => parse_coordinates(dump.get("GPSCoordinates")?.as_str()?)?,
    };

    GpsLocation::new(lat, lon)
}

fn parse_coordinates(combined: &str) -> Option<(f64, f64)> {
    let cleaned = combined.replace(',', " ");
    let mut parts = cleaned.split_whitespace();
    let lat = parts.next()?.parse().ok()?;
    let lon = parts.next()?.parse().ok()?;
    Some((lat, lon))
}

/// Numeric tag; -n usually yields numbers but some writers emit strings.
fn get_number(dump: &serde_json::Value, tag: &str) -> Option<f64> {
    match dump.get(tag)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
