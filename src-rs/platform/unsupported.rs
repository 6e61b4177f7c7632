use image::RgbaImage;
use std::time::Duration;

use super::{
    Desktop, OverlaySurface, ShowState, WindowFrames, WindowHandle, WindowMessage,
};
use crate::capture::OverlaySpec;
use crate::error::DriverError;
use crate::geometry::{DisplayInfo, Point, Rect};
use crate::window::Placement;

/// Stand-in for hosts without a Win32 desktop. Every query fails.
pub struct UnsupportedDesktop;

fn unsupported() -> DriverError {
    DriverError::PlatformUnsupported(std::env::consts::OS)
}

impl Desktop for UnsupportedDesktop {
    fn display_info(&self) -> Result<DisplayInfo, DriverError> {
        Err(unsupported())
    }

    fn top_level_windows(&self) -> Result<Vec<(WindowHandle, String)>, DriverError> {
        Err(unsupported())
    }

    fn is_window(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn window_frames(&self, _handle: WindowHandle) -> Result<WindowFrames, DriverError> {
        Err(unsupported())
    }

    fn is_maximized(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn is_minimized(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        None
    }

    fn show_window(&self, _handle: WindowHandle, _state: ShowState) {}

    fn request_foreground(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn move_window(&self, _handle: WindowHandle, _placement: &Placement) -> Result<(), DriverError> {
        Err(unsupported())
    }

    fn window_from_point(&self, _point: Point) -> Option<WindowHandle> {
        None
    }

    fn root_window(&self, handle: WindowHandle) -> WindowHandle {
        handle
    }

    fn focus_window_of(&self, _handle: WindowHandle) -> Option<WindowHandle> {
        None
    }

    fn screen_to_client(&self, _handle: WindowHandle, _point: Point) -> Option<Point> {
        None
    }

    fn post_message(
        &self,
        _handle: WindowHandle,
        _message: WindowMessage,
    ) -> Result<(), DriverError> {
        Err(unsupported())
    }

    fn show_overlay(&self, _spec: &OverlaySpec) -> Result<OverlaySurface, DriverError> {
        Err(unsupported())
    }

    fn hide_overlay(&self, _surface: OverlaySurface) {}

    fn wait(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn grab(&self, _rect: Rect) -> Result<RgbaImage, DriverError> {
        Err(unsupported())
    }
}
