//! Coordinate mapping into absolute screen pixels.

use crate::error::DriverError;
use crate::geometry::{DisplayInfo, Point, RectMode, WindowGeometry};

/// Upper bound of the normalized window-relative range.
pub const REL_MAX: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coordinate {
    Absolute { x: i32, y: i32 },
    WindowRelative { rx: f64, ry: f64, mode: RectMode },
}

/// Resolve `coord` to a screen pixel.
///
/// Absolute points must lie on the measured screen. Relative points are
/// scaled over the window or client rect of `geometry` and clamped so the
/// result stays inside that rect (`right`/`bottom` are exclusive, so
/// `rx = 1000` lands on the last column).
pub fn map(
    coord: Coordinate,
    display: &DisplayInfo,
    geometry: Option<&WindowGeometry>,
) -> Result<Point, DriverError> {
    match coord {
        Coordinate::Absolute { x, y } => {
            let screen = display.screen_rect();
            let point = Point::new(x, y);
            if !screen.contains(point) {
                return Err(DriverError::OutOfBounds(format!(
                    "coordinate out of bounds: x={x}, y={y} (screen {}x{})",
                    display.screen_width, display.screen_height
                )));
            }
            Ok(point)
        }
        Coordinate::WindowRelative { rx, ry, mode } => {
            validate_rel("rel-x", rx)?;
            validate_rel("rel-y", ry)?;
            let geometry = geometry.ok_or_else(|| {
                DriverError::RegionUnresolvable(
                    "relative coordinates need a resolved window".to_string(),
                )
            })?;
            let rect = geometry.rect_for(mode);
            if rect.is_empty() {
                return Err(DriverError::RegionUnresolvable(format!(
                    "{mode} rect of {:?} is empty: {rect}",
                    geometry.title
                )));
            }
            let x = rect.left + (rx / REL_MAX * rect.width() as f64).round() as i32;
            let y = rect.top + (ry / REL_MAX * rect.height() as f64).round() as i32;
            Ok(Point::new(
                x.clamp(rect.left, rect.right - 1),
                y.clamp(rect.top, rect.bottom - 1),
            ))
        }
    }
}

fn validate_rel(name: &str, value: f64) -> Result<(), DriverError> {
    if !(0.0..=REL_MAX).contains(&value) {
        return Err(DriverError::InvalidRange(format!(
            "{name} out of range: {value} (0..{REL_MAX})"
        )));
    }
    Ok(())
}
