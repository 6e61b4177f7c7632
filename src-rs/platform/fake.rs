//! In-memory desktop for tests. Records every side effect in order.

use image::{Rgba, RgbaImage};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use super::{
    Desktop, OverlaySurface, ShowState, WindowFrames, WindowHandle, WindowMessage,
};
use crate::capture::OverlaySpec;
use crate::error::DriverError;
use crate::geometry::{DisplayInfo, Point, Rect};
use crate::window::Placement;

pub const OVERLAY_HANDLE: WindowHandle = WindowHandle(9_999);
const TITLE_BAR: i32 = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ShowOverlay(String),
    Wait(Duration),
    HideOverlay,
    Grab(Rect),
    Show(WindowHandle, ShowState),
    Move(WindowHandle, Placement),
    Post(WindowHandle, WindowMessage),
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: WindowHandle,
    pub title: String,
    pub frames: WindowFrames,
    pub maximized: bool,
    pub minimized: bool,
    /// Present but not drawn, like a window on another virtual desktop.
    pub cloaked: bool,
}

impl FakeWindow {
    /// Window without invisible borders and a 31 px title bar.
    pub fn new(id: isize, title: &str, rect: Rect) -> Self {
        let client = Rect::new(rect.left, rect.top + TITLE_BAR, rect.right, rect.bottom);
        Self::with_frames(
            id,
            title,
            WindowFrames {
                outer: rect,
                frame: rect,
                client,
            },
        )
    }

    pub fn with_frames(id: isize, title: &str, frames: WindowFrames) -> Self {
        Self {
            handle: WindowHandle(id),
            title: title.to_string(),
            frames,
            maximized: false,
            minimized: false,
            cloaked: false,
        }
    }
}

struct FakeChild {
    handle: WindowHandle,
    root: WindowHandle,
    rect: Rect,
}

pub struct FakeDesktop {
    display: Cell<DisplayInfo>,
    windows: RefCell<Vec<FakeWindow>>,
    children: RefCell<Vec<FakeChild>>,
    focus: RefCell<HashMap<WindowHandle, WindowHandle>>,
    foreground: Cell<Option<WindowHandle>>,
    deny_activation: Cell<bool>,
    overlay_fails: Cell<bool>,
    exclusion_supported: Cell<bool>,
    grab_fails: Cell<bool>,
    foreground_after_post: Cell<Option<WindowHandle>>,
    events: RefCell<Vec<Event>>,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self {
            display: Cell::new(DisplayInfo::from_dpi(1920, 1080, 96)),
            windows: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            focus: RefCell::new(HashMap::new()),
            foreground: Cell::new(None),
            deny_activation: Cell::new(false),
            overlay_fails: Cell::new(false),
            exclusion_supported: Cell::new(true),
            grab_fails: Cell::new(false),
            foreground_after_post: Cell::new(None),
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn set_display(&self, display: DisplayInfo) {
        self.display.set(display);
    }

    pub fn add_window(&self, window: FakeWindow) {
        self.windows.borrow_mut().push(window);
    }

    pub fn add_child(&self, id: isize, root: WindowHandle, rect: Rect) {
        self.children.borrow_mut().push(FakeChild {
            handle: WindowHandle(id),
            root,
            rect,
        });
    }

    pub fn set_focus_child(&self, root: WindowHandle, child: WindowHandle) {
        self.focus.borrow_mut().insert(root, child);
    }

    pub fn close_window(&self, handle: WindowHandle) {
        self.windows.borrow_mut().retain(|w| w.handle != handle);
    }

    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        self.foreground.set(handle);
    }

    pub fn deny_activation(&self, deny: bool) {
        self.deny_activation.set(deny);
    }

    pub fn fail_overlay(&self, fail: bool) {
        self.overlay_fails.set(fail);
    }

    pub fn support_exclusion(&self, supported: bool) {
        self.exclusion_supported.set(supported);
    }

    pub fn fail_grab(&self, fail: bool) {
        self.grab_fails.set(fail);
    }

    /// Simulate another actor taking focus right after our messages land.
    pub fn steal_foreground_after_post(&self, handle: Option<WindowHandle>) {
        self.foreground_after_post.set(handle);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn posted(&self) -> Vec<(WindowHandle, WindowMessage)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Post(h, m) => Some((*h, *m)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn with_window<T>(&self, handle: WindowHandle, f: impl FnOnce(&mut FakeWindow) -> T) -> Option<T> {
        self.windows
            .borrow_mut()
            .iter_mut()
            .find(|w| w.handle == handle)
            .map(f)
    }

    fn client_origin(&self, handle: WindowHandle) -> Option<Point> {
        if let Some(child) = self.children.borrow().iter().find(|c| c.handle == handle) {
            return Some(Point::new(child.rect.left, child.rect.top));
        }
        self.with_window(handle, |w| Point::new(w.frames.client.left, w.frames.client.top))
    }
}

impl Desktop for FakeDesktop {
    fn display_info(&self) -> Result<DisplayInfo, DriverError> {
        Ok(self.display.get())
    }

    fn top_level_windows(&self) -> Result<Vec<(WindowHandle, String)>, DriverError> {
        Ok(self
            .windows
            .borrow()
            .iter()
            .filter(|w| !w.cloaked)
            .map(|w| (w.handle, w.title.clone()))
            .collect())
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        self.windows.borrow().iter().any(|w| w.handle == handle)
            || self.children.borrow().iter().any(|c| c.handle == handle)
    }

    fn window_frames(&self, handle: WindowHandle) -> Result<WindowFrames, DriverError> {
        self.with_window(handle, |w| w.frames)
            .ok_or_else(|| DriverError::WindowNotFound(format!("no window {}", handle.0)))
    }

    fn is_maximized(&self, handle: WindowHandle) -> bool {
        self.with_window(handle, |w| w.maximized).unwrap_or(false)
    }

    fn is_minimized(&self, handle: WindowHandle) -> bool {
        self.with_window(handle, |w| w.minimized).unwrap_or(false)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.foreground.get()
    }

    fn show_window(&self, handle: WindowHandle, state: ShowState) {
        self.record(Event::Show(handle, state));
        self.with_window(handle, |w| match state {
            ShowState::Restore => {
                w.maximized = false;
                w.minimized = false;
            }
            ShowState::Maximize => {
                w.maximized = true;
                w.minimized = false;
            }
        });
    }

    fn request_foreground(&self, handle: WindowHandle) -> bool {
        if self.deny_activation.get() {
            return false;
        }
        self.foreground.set(Some(handle));
        true
    }

    fn move_window(&self, handle: WindowHandle, placement: &Placement) -> Result<(), DriverError> {
        self.record(Event::Move(handle, *placement));
        self.with_window(handle, |w| {
            let f = w.frames;
            let (x, y) = placement
                .position
                .map(|p| (p.x, p.y))
                .unwrap_or((f.outer.left, f.outer.top));
            let (width, height) = placement
                .size
                .unwrap_or((f.outer.width(), f.outer.height()));
            let outer = Rect::from_size(x, y, width, height);
            let inset = |inner: Rect| {
                Rect::new(
                    outer.left + (inner.left - f.outer.left),
                    outer.top + (inner.top - f.outer.top),
                    outer.right - (f.outer.right - inner.right),
                    outer.bottom - (f.outer.bottom - inner.bottom),
                )
            };
            w.frames = WindowFrames {
                outer,
                frame: inset(f.frame),
                client: inset(f.client),
            };
        })
        .ok_or_else(|| DriverError::WindowNotFound(format!("no window {}", handle.0)))
    }

    fn window_from_point(&self, point: Point) -> Option<WindowHandle> {
        if let Some(child) = self.children.borrow().iter().find(|c| c.rect.contains(point)) {
            return Some(child.handle);
        }
        self.windows
            .borrow()
            .iter()
            .find(|w| w.frames.frame.contains(point))
            .map(|w| w.handle)
    }

    fn root_window(&self, handle: WindowHandle) -> WindowHandle {
        self.children
            .borrow()
            .iter()
            .find(|c| c.handle == handle)
            .map(|c| c.root)
            .unwrap_or(handle)
    }

    fn focus_window_of(&self, handle: WindowHandle) -> Option<WindowHandle> {
        self.focus.borrow().get(&handle).copied()
    }

    fn screen_to_client(&self, handle: WindowHandle, point: Point) -> Option<Point> {
        self.client_origin(handle)
            .map(|origin| Point::new(point.x - origin.x, point.y - origin.y))
    }

    fn post_message(&self, handle: WindowHandle, message: WindowMessage) -> Result<(), DriverError> {
        if !self.is_window(handle) {
            return Err(DriverError::WindowNotFound(format!("no window {}", handle.0)));
        }
        self.record(Event::Post(handle, message));
        if let Some(thief) = self.foreground_after_post.get() {
            self.foreground.set(Some(thief));
        }
        Ok(())
    }

    fn show_overlay(&self, spec: &OverlaySpec) -> Result<OverlaySurface, DriverError> {
        if self.overlay_fails.get() {
            return Err(DriverError::CaptureFailed("overlay window refused".to_string()));
        }
        self.record(Event::ShowOverlay(spec.text.clone()));
        Ok(OverlaySurface {
            handle: OVERLAY_HANDLE,
            excluded_from_capture: self.exclusion_supported.get(),
        })
    }

    fn hide_overlay(&self, _surface: OverlaySurface) {
        self.record(Event::HideOverlay);
    }

    fn wait(&self, duration: Duration) {
        self.record(Event::Wait(duration));
    }

    /// Pixel (x, y) of the result encodes its screen position so tests can
    /// check which region was copied.
    fn grab(&self, rect: Rect) -> Result<RgbaImage, DriverError> {
        self.record(Event::Grab(rect));
        if self.grab_fails.get() {
            return Err(DriverError::CaptureFailed("BitBlt failed".to_string()));
        }
        Ok(RgbaImage::from_fn(
            rect.width() as u32,
            rect.height() as u32,
            |x, y| {
                let sx = rect.left + x as i32;
                let sy = rect.top + y as i32;
                Rgba([(sx % 256) as u8, (sy % 256) as u8, 0, 255])
            },
        ))
    }
}
