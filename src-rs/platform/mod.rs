//! OS seam. Everything that touches the window system goes through
//! [`Desktop`], so the components above it stay pure and testable.

use image::RgbaImage;
use serde::Serialize;
use std::time::Duration;

use crate::capture::OverlaySpec;
use crate::error::DriverError;
use crate::geometry::{DisplayInfo, Point, Rect};
use crate::window::Placement;

#[cfg(test)]
pub mod fake;
#[cfg(not(windows))]
mod unsupported;
#[cfg(windows)]
mod win32;

/// Transient reference to a window. Only valid for the current invocation and
/// only until the window closes; re-check with [`Desktop::is_window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WindowHandle(pub isize);

/// The three rectangles the OS reports for one window, in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(windows), allow(dead_code))]
pub struct WindowFrames {
    /// Rect the move/resize call operates on, invisible resize borders included.
    pub outer: Rect,
    /// Visible frame (title bar and borders as drawn).
    pub frame: Rect,
    /// Drawable interior.
    pub client: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowState {
    /// Back to the normal (neither minimized nor maximized) placement.
    Restore,
    Maximize,
}

/// Messages the input synthesizer posts. Points are client coordinates of the
/// receiving window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMessage {
    MouseMove(Point),
    LeftButtonDown(Point),
    LeftButtonUp(Point),
    Char(u16),
}

/// A visible overlay window, returned by [`Desktop::show_overlay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(windows), allow(dead_code))]
pub struct OverlaySurface {
    pub handle: WindowHandle,
    pub excluded_from_capture: bool,
}

pub trait Desktop {
    fn display_info(&self) -> Result<DisplayInfo, DriverError>;

    /// Visible, uncloaked top-level windows with a non-empty title, in OS
    /// enumeration (z-) order.
    fn top_level_windows(&self) -> Result<Vec<(WindowHandle, String)>, DriverError>;

    fn is_window(&self, handle: WindowHandle) -> bool;

    fn window_frames(&self, handle: WindowHandle) -> Result<WindowFrames, DriverError>;

    fn is_maximized(&self, handle: WindowHandle) -> bool;

    fn is_minimized(&self, handle: WindowHandle) -> bool;

    fn foreground_window(&self) -> Option<WindowHandle>;

    fn show_window(&self, handle: WindowHandle, state: ShowState);

    /// Ask for activation. The OS may refuse; the return value is only the
    /// request's outcome, callers re-read the foreground window.
    fn request_foreground(&self, handle: WindowHandle) -> bool;

    fn move_window(&self, handle: WindowHandle, placement: &Placement) -> Result<(), DriverError>;

    /// Deepest visible window under a screen point.
    fn window_from_point(&self, point: Point) -> Option<WindowHandle>;

    fn root_window(&self, handle: WindowHandle) -> WindowHandle;

    /// Child holding keyboard focus on the window's UI thread, if any.
    fn focus_window_of(&self, handle: WindowHandle) -> Option<WindowHandle>;

    fn screen_to_client(&self, handle: WindowHandle, point: Point) -> Option<Point>;

    fn post_message(&self, handle: WindowHandle, message: WindowMessage)
        -> Result<(), DriverError>;

    fn show_overlay(&self, spec: &OverlaySpec) -> Result<OverlaySurface, DriverError>;

    fn hide_overlay(&self, surface: OverlaySurface);

    /// Block for `duration`, keeping any of our own windows painted.
    fn wait(&self, duration: Duration);

    /// Copy the screen pixels inside `rect`.
    fn grab(&self, rect: Rect) -> Result<RgbaImage, DriverError>;
}

/// The desktop of the machine we run on.
pub fn native() -> Box<dyn Desktop> {
    #[cfg(windows)]
    {
        Box::new(win32::Win32Desktop::new())
    }
    #[cfg(not(windows))]
    {
        Box::new(unsupported::UnsupportedDesktop)
    }
}
