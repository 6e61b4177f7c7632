//! Screen and window capture, with the optional "about to capture" overlay.

use image::RgbaImage;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::DriverError;
use crate::geometry::{DisplayInfo, Rect, RectMode, WindowGeometry};
use crate::platform::Desktop;
use crate::window::{self, ResolvedWindow};

pub const OVERLAY_DEFAULT_TEXT: &str = "CAPTURE ACTIVE - PLEASE DON'T TOUCH";
pub const OVERLAY_HEIGHT: i32 = 36;
pub const OVERLAY_BACKGROUND: [u8; 3] = [255, 92, 0];
pub const OVERLAY_TEXT_COLOR: [u8; 3] = [255, 255, 255];
pub const OVERLAY_ALPHA: u8 = 220;
/// Floor for the overlay wait: roughly three frames at 60 Hz, enough for the
/// compositor to present the banner at least once.
pub const OVERLAY_MIN_WAIT: Duration = Duration::from_millis(50);

/// Banner shown across the top of the primary screen around a capture. The
/// appearance fields are only read by the Win32 backend.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(not(windows), allow(dead_code))]
pub struct OverlaySpec {
    pub text: String,
    pub duration: Duration,
    pub height: i32,
    pub background: [u8; 3],
    pub text_color: [u8; 3],
    pub alpha: u8,
}

impl OverlaySpec {
    pub fn new(text: Option<&str>, duration: Duration) -> Self {
        let text = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(OVERLAY_DEFAULT_TEXT);
        Self {
            text: text.to_string(),
            duration: duration.max(OVERLAY_MIN_WAIT),
            height: OVERLAY_HEIGHT,
            background: OVERLAY_BACKGROUND,
            text_color: OVERLAY_TEXT_COLOR,
            alpha: OVERLAY_ALPHA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OverlayReport {
    pub enabled: bool,
    /// Shown before the grab.
    pub shown: bool,
    /// Shown again once the pixels were taken.
    pub shown_after: bool,
    pub excluded_from_capture: bool,
}

#[derive(Debug, Clone)]
pub enum Region {
    FullScreen,
    Window {
        window: ResolvedWindow,
        mode: RectMode,
    },
}

#[derive(Debug)]
pub struct Capture {
    pub image: RgbaImage,
    /// Screen rect actually copied.
    pub rect: Rect,
    /// True when the requested rect extended past the screen.
    pub clipped: bool,
    pub display: DisplayInfo,
    /// Geometry read at capture time, for window regions.
    pub window: Option<WindowGeometry>,
    pub overlay: OverlayReport,
}

/// Capture `region`.
///
/// With an overlay the order is fixed: show, wait, hide, then read the target
/// rect and grab, then show, wait and hide once more. The rect is read after
/// the first flash so a window that moved in the meantime is captured where it
/// is now.
pub fn capture(
    desktop: &dyn Desktop,
    region: &Region,
    overlay: Option<&OverlaySpec>,
) -> Result<Capture, DriverError> {
    let mut report = match overlay {
        Some(spec) => flash_overlay(desktop, spec),
        None => OverlayReport::default(),
    };
    if report.shown && !report.excluded_from_capture {
        warn!("overlay capture exclusion unavailable; relying on hide-before-grab");
    }

    let display = desktop.display_info()?;
    let screen = display.screen_rect();

    let (target, geometry, label) = match region {
        Region::FullScreen => (screen, None, "screen".to_string()),
        Region::Window { window, mode } => {
            let geo = window::geometry(desktop, window).map_err(|err| {
                DriverError::RegionUnresolvable(format!(
                    "cannot capture window {:?}: {err}",
                    window.title
                ))
            })?;
            (geo.rect_for(*mode), Some(geo), format!("{mode} rect"))
        }
    };

    let rect = target.intersect(&screen).ok_or_else(|| {
        DriverError::RegionUnresolvable(format!("{label} {target} does not overlap the screen"))
    })?;
    let clipped = rect != target;
    if clipped {
        debug!(%target, %rect, "capture region clipped to screen");
    }

    let image = desktop.grab(rect)?;
    if image.dimensions() != (rect.width() as u32, rect.height() as u32) {
        return Err(DriverError::CaptureFailed(format!(
            "captured {}x{} pixels for a {}x{} region",
            image.width(),
            image.height(),
            rect.width(),
            rect.height()
        )));
    }

    if let Some(spec) = overlay {
        let after = flash_overlay(desktop, spec);
        report.shown_after = after.shown;
    }

    Ok(Capture {
        image,
        rect,
        clipped,
        display,
        window: geometry,
        overlay: report,
    })
}

/// Show the overlay, hold it for the configured time, and remove it. A failure
/// here never aborts the capture.
fn flash_overlay(desktop: &dyn Desktop, spec: &OverlaySpec) -> OverlayReport {
    match desktop.show_overlay(spec) {
        Ok(surface) => {
            desktop.wait(spec.duration);
            desktop.hide_overlay(surface);
            OverlayReport {
                enabled: true,
                shown: true,
                shown_after: false,
                excluded_from_capture: surface.excluded_from_capture,
            }
        }
        Err(err) => {
            warn!(%err, "overlay could not be shown; capturing without it");
            OverlayReport {
                enabled: true,
                shown: false,
                shown_after: false,
                excluded_from_capture: false,
            }
        }
    }
}
