//! Window resolution by title, activation and placement.

use tracing::{debug, warn};

use crate::error::DriverError;
use crate::geometry::{Point, Size, WindowGeometry};
use crate::platform::{Desktop, ShowState, WindowFrames, WindowHandle};

/// Arguments of one raw move/resize call. `None` leaves that part alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub position: Option<Point>,
    pub size: Option<(i32, i32)>,
}

impl Placement {
    pub fn is_noop(&self) -> bool {
        self.position.is_none() && self.size.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeTarget {
    Window(Size),
    Client(Size),
}

/// Requested geometry in the same space `window_rect` is reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryRequest {
    pub size: Option<SizeTarget>,
    pub position: Option<Point>,
}

impl GeometryRequest {
    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.position.is_none()
    }
}

/// A window matched by title. The handle is only a lookup key for this
/// invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub handle: WindowHandle,
    pub title: String,
}

/// First window whose title contains `needle` (case-sensitive).
pub fn first_match<'a>(
    windows: &'a [(WindowHandle, String)],
    needle: &str,
) -> Option<&'a (WindowHandle, String)> {
    windows.iter().find(|(_, title)| title.contains(needle))
}

pub fn find(desktop: &dyn Desktop, title: &str) -> Result<ResolvedWindow, DriverError> {
    if title.is_empty() {
        return Err(DriverError::InvalidArguments(
            "window title must not be empty".to_string(),
        ));
    }
    let windows = desktop.top_level_windows()?;
    let (handle, matched) = first_match(&windows, title).ok_or_else(|| {
        DriverError::WindowNotFound(format!("no visible window title contains: {title:?}"))
    })?;
    let matches = windows.iter().filter(|(_, t)| t.contains(title)).count();
    if matches > 1 {
        debug!(needle = title, matches, "title matched several windows; using the first");
    }
    debug!(handle = handle.0, title = %matched, "resolved window");
    Ok(ResolvedWindow {
        handle: *handle,
        title: matched.clone(),
    })
}

/// Fail with `WindowNotFound` if the window closed since it was resolved.
pub fn ensure_alive(desktop: &dyn Desktop, window: &ResolvedWindow) -> Result<(), DriverError> {
    if desktop.is_window(window.handle) {
        Ok(())
    } else {
        Err(DriverError::WindowNotFound(format!(
            "window {:?} closed after it was resolved",
            window.title
        )))
    }
}

/// Fresh geometry read. Nothing here is cached.
pub fn geometry(
    desktop: &dyn Desktop,
    window: &ResolvedWindow,
) -> Result<WindowGeometry, DriverError> {
    ensure_alive(desktop, window)?;
    let frames = desktop.window_frames(window.handle)?;
    Ok(WindowGeometry {
        title: window.title.clone(),
        window_rect: frames.frame,
        client_rect: frames.client,
        is_foreground: desktop.foreground_window() == Some(window.handle),
        is_maximized: desktop.is_maximized(window.handle),
    })
}

pub fn resolve(
    desktop: &dyn Desktop,
    title: &str,
) -> Result<(ResolvedWindow, WindowGeometry), DriverError> {
    let window = find(desktop, title)?;
    let geo = geometry(desktop, &window)?;
    Ok((window, geo))
}

/// Un-minimize, optionally maximize, and request activation. Returns the
/// geometry observed afterwards; `is_foreground` may be false when the OS
/// refused the activation.
pub fn bring_to_front(
    desktop: &dyn Desktop,
    window: &ResolvedWindow,
    maximize: bool,
) -> Result<WindowGeometry, DriverError> {
    ensure_alive(desktop, window)?;
    if maximize {
        desktop.show_window(window.handle, ShowState::Maximize);
    } else if desktop.is_minimized(window.handle) {
        desktop.show_window(window.handle, ShowState::Restore);
    }
    activate(desktop, window)
}

fn activate(
    desktop: &dyn Desktop,
    window: &ResolvedWindow,
) -> Result<WindowGeometry, DriverError> {
    let granted = desktop.request_foreground(window.handle);
    let geo = geometry(desktop, window)?;
    if !geo.is_foreground {
        warn!(
            title = %window.title,
            request_granted = granted,
            "window is not foreground after activation request"
        );
    }
    Ok(geo)
}

/// Translate a request in visible-frame space into raw move/resize
/// arguments.
///
/// The raw rect includes invisible resize borders, so positions are shifted
/// and window sizes grown by those margins. Client sizes add the current
/// outer-minus-client deltas. Results that leave the `i32` range are
/// rejected instead of wrapping.
pub fn plan_placement(
    frames: &WindowFrames,
    request: &GeometryRequest,
) -> Result<Placement, DriverError> {
    let left = (frames.frame.left - frames.outer.left).max(0);
    let top = (frames.frame.top - frames.outer.top).max(0);
    let right = (frames.outer.right - frames.frame.right).max(0);
    let bottom = (frames.outer.bottom - frames.frame.bottom).max(0);

    let position = match request.position {
        Some(p) => Some(Point::new(shift(p.x, -left)?, shift(p.y, -top)?)),
        None => None,
    };

    let size = match request.size {
        Some(SizeTarget::Window(s)) => Some((
            grow(s.width, left.saturating_add(right))?,
            grow(s.height, top.saturating_add(bottom))?,
        )),
        Some(SizeTarget::Client(s)) => Some((
            grow(s.width, frames.outer.width() - frames.client.width())?,
            grow(s.height, frames.outer.height() - frames.client.height())?,
        )),
        None => None,
    };

    Ok(Placement { position, size })
}

fn shift(value: i32, by: i32) -> Result<i32, DriverError> {
    value
        .checked_add(by)
        .ok_or_else(|| DriverError::InvalidArguments(format!("position {value} is out of range")))
}

fn grow(extent: u32, by: i32) -> Result<i32, DriverError> {
    i32::try_from(extent)
        .ok()
        .and_then(|e| e.checked_add(by))
        .ok_or_else(|| DriverError::InvalidArguments(format!("size {extent} is out of range")))
}

/// Move and/or resize with a single call, then activate and re-read.
///
/// There is no convergence loop: the OS may snap or clamp the request and the
/// returned geometry reports what it actually granted.
pub fn set_geometry(
    desktop: &dyn Desktop,
    window: &ResolvedWindow,
    request: &GeometryRequest,
) -> Result<WindowGeometry, DriverError> {
    ensure_alive(desktop, window)?;
    if desktop.is_minimized(window.handle) || desktop.is_maximized(window.handle) {
        desktop.show_window(window.handle, ShowState::Restore);
    }

    let frames = desktop.window_frames(window.handle)?;
    let placement = plan_placement(&frames, request)?;
    if !placement.is_noop() {
        debug!(?frames, ?placement, "moving window");
        desktop.move_window(window.handle, &placement)?;
    }

    activate(desktop, window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::platform::fake::{FakeDesktop, FakeWindow};

    fn frames() -> WindowFrames {
        WindowFrames {
            outer: Rect::new(93, 100, 1107, 807),
            frame: Rect::new(100, 100, 1100, 800),
            client: Rect::new(100, 131, 1100, 800),
        }
    }

    #[test]
    fn first_match_is_case_sensitive_and_ordered() {
        let windows = vec![
            (WindowHandle(1), "notepad - a.txt".to_string()),
            (WindowHandle(2), "Notepad - b.txt".to_string()),
            (WindowHandle(3), "Notepad - c.txt".to_string()),
        ];
        assert_eq!(first_match(&windows, "Notepad").unwrap().0, WindowHandle(2));
        assert_eq!(first_match(&windows, "notepad").unwrap().0, WindowHandle(1));
        assert!(first_match(&windows, "NOTEPAD").is_none());
    }

    #[test]
    fn find_rejects_empty_title() {
        let desktop = FakeDesktop::new();
        assert_eq!(find(&desktop, "").unwrap_err().kind(), "InvalidArguments");
    }

    #[test]
    fn find_skips_cloaked_windows() {
        let desktop = FakeDesktop::new();
        let mut hidden = FakeWindow::new(1, "Settings", Rect::new(0, 0, 800, 600));
        hidden.cloaked = true;
        desktop.add_window(hidden);
        desktop.add_window(FakeWindow::new(2, "Settings", Rect::new(100, 100, 900, 700)));
        assert_eq!(find(&desktop, "Settings").unwrap().handle, WindowHandle(2));
    }

    #[test]
    fn find_reports_missing_window() {
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::new(1, "Editor", Rect::new(0, 0, 800, 600)));
        assert_eq!(find(&desktop, "Browser").unwrap_err().kind(), "WindowNotFound");
    }

    #[test]
    fn geometry_reads_frames_and_flags() {
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::new(7, "App", Rect::new(10, 20, 810, 620)));
        desktop.set_foreground(Some(WindowHandle(7)));
        let (window, geo) = resolve(&desktop, "App").unwrap();
        assert_eq!(window.handle, WindowHandle(7));
        assert_eq!(geo.window_rect, Rect::new(10, 20, 810, 620));
        assert_eq!(geo.client_rect, Rect::new(10, 51, 810, 620));
        assert!(geo.is_foreground);
        assert!(!geo.is_maximized);
    }

    #[test]
    fn closed_window_is_rejected_before_use() {
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::new(7, "App", Rect::new(0, 0, 100, 100)));
        let window = find(&desktop, "App").unwrap();
        desktop.close_window(WindowHandle(7));
        assert_eq!(geometry(&desktop, &window).unwrap_err().kind(), "WindowNotFound");
    }

    #[test]
    fn bring_to_front_reports_observed_focus_when_denied() {
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::new(7, "App", Rect::new(0, 0, 100, 100)));
        desktop.deny_activation(true);
        let window = find(&desktop, "App").unwrap();
        let geo = bring_to_front(&desktop, &window, false).unwrap();
        assert!(!geo.is_foreground);
    }

    #[test]
    fn bring_to_front_can_maximize() {
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::new(7, "App", Rect::new(0, 0, 100, 100)));
        let window = find(&desktop, "App").unwrap();
        let geo = bring_to_front(&desktop, &window, true).unwrap();
        assert!(geo.is_foreground);
        assert!(geo.is_maximized);
    }

    #[test]
    fn placement_compensates_invisible_borders() {
        let request = GeometryRequest {
            size: Some(SizeTarget::Window(Size::new(1280, 720))),
            position: Some(Point::new(0, 0)),
        };
        let placement = plan_placement(&frames(), &request).unwrap();
        assert_eq!(placement.position, Some(Point::new(-7, 0)));
        assert_eq!(placement.size, Some((1294, 727)));
    }

    #[test]
    fn placement_back_solves_client_size() {
        let request = GeometryRequest {
            size: Some(SizeTarget::Client(Size::new(1280, 720))),
            position: None,
        };
        let placement = plan_placement(&frames(), &request).unwrap();
        assert_eq!(placement.position, None);
        // outer is 1014x707 around a 1000x669 client
        assert_eq!(placement.size, Some((1294, 758)));
    }

    #[test]
    fn empty_request_is_noop() {
        assert!(plan_placement(&frames(), &GeometryRequest::default())
            .unwrap()
            .is_noop());
    }

    #[test]
    fn placement_rejects_sizes_past_i32() {
        let overflowing = GeometryRequest {
            size: Some(SizeTarget::Window(Size {
                width: i32::MAX as u32,
                height: 720,
            })),
            position: None,
        };
        let err = plan_placement(&frames(), &overflowing).unwrap_err();
        assert_eq!(err.kind(), "InvalidArguments");

        let wrapping = GeometryRequest {
            size: Some(SizeTarget::Client(Size {
                width: 3_000_000_000,
                height: 720,
            })),
            position: None,
        };
        assert_eq!(plan_placement(&frames(), &wrapping).unwrap_err().kind(), "InvalidArguments");
    }

    #[test]
    fn placement_rejects_position_underflow() {
        let request = GeometryRequest {
            size: None,
            position: Some(Point::new(i32::MIN, 0)),
        };
        assert!(plan_placement(&frames(), &request).is_err());
    }

    #[test]
    fn set_geometry_round_trips_through_geometry() {
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::with_frames(9, "App", frames()));
        let window = find(&desktop, "App").unwrap();
        let request = GeometryRequest {
            size: Some(SizeTarget::Window(Size::new(1280, 720))),
            position: Some(Point::new(40, 30)),
        };
        let geo = set_geometry(&desktop, &window, &request).unwrap();
        assert_eq!(geo.window_rect, Rect::new(40, 30, 1320, 750));
        assert_eq!(geo.window_rect.width(), 1280);
        assert_eq!(geo.window_rect.height(), 720);
        assert!(geo.is_foreground);
    }

    #[test]
    fn set_geometry_client_size_round_trips() {
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::with_frames(9, "App", frames()));
        let window = find(&desktop, "App").unwrap();
        let request = GeometryRequest {
            size: Some(SizeTarget::Client(Size::new(1280, 720))),
            position: None,
        };
        let geo = set_geometry(&desktop, &window, &request).unwrap();
        assert_eq!(geo.client_rect.width(), 1280);
        assert_eq!(geo.client_rect.height(), 720);
    }

    #[test]
    fn set_geometry_restores_maximized_window_first() {
        let desktop = FakeDesktop::new();
        let mut win = FakeWindow::with_frames(9, "App", frames());
        win.maximized = true;
        desktop.add_window(win);
        let window = find(&desktop, "App").unwrap();
        let request = GeometryRequest {
            size: None,
            position: Some(Point::new(0, 0)),
        };
        let geo = set_geometry(&desktop, &window, &request).unwrap();
        assert!(!geo.is_maximized);
        assert_eq!(geo.window_rect.left, 0);
    }
}
