//! Plain value types shared by every component. No OS calls live here.

use clap::ValueEnum;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Screen-space rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Builds a rect, collapsing inverted edges so `right >= left` and
    /// `bottom >= top` always hold.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right: right.max(left),
            bottom: bottom.max(top),
        }
    }

    pub fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left + width.max(0), top + height.max(0))
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right, bottom))
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.width() as u32,
            height: self.height() as u32,
        }
    }
}

impl Serialize for Rect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Rect", 6)?;
        state.serialize_field("left", &self.left)?;
        state.serialize_field("top", &self.top)?;
        state.serialize_field("right", &self.right)?;
        state.serialize_field("bottom", &self.bottom)?;
        state.serialize_field("width", &self.width())?;
        state.serialize_field("height", &self.height())?;
        state.end()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{}) {}x{}",
            self.left,
            self.top,
            self.right,
            self.bottom,
            self.width(),
            self.height()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// `WxH` size as given on the command line (`1280x720`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    /// Largest extent accepted on the command line; Win32 window coordinates
    /// are 16-bit signed.
    pub const MAX_EXTENT: u32 = 32767;

    #[cfg(test)]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        let (w, h) = lowered
            .split_once('x')
            .ok_or_else(|| format!("invalid size format: {raw:?} (expected WxH)"))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid size width: {raw:?}"))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid size height: {raw:?}"))?;
        if width == 0 || height == 0 {
            return Err(format!("size must be positive: {raw:?}"));
        }
        if width > Size::MAX_EXTENT || height > Size::MAX_EXTENT {
            return Err(format!(
                "size must not exceed {max}x{max}: {raw:?}",
                max = Size::MAX_EXTENT
            ));
        }
        Ok(Size { width, height })
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which of a window's two rectangles a coordinate or capture refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RectMode {
    /// Outer frame including title bar and borders.
    #[default]
    Window,
    /// Drawable interior only.
    Client,
}

impl fmt::Display for RectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RectMode::Window => f.write_str("window"),
            RectMode::Client => f.write_str("client"),
        }
    }
}

/// Display facts, measured live on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    pub screen_width: i32,
    pub screen_height: i32,
    pub dpi: u32,
    pub scale_percent: f64,
}

impl DisplayInfo {
    pub const EXPECTED_WIDTH: i32 = 1920;
    pub const EXPECTED_HEIGHT: i32 = 1080;
    #[cfg(any(windows, test))]
    pub const BASE_DPI: u32 = 96;

    #[cfg(any(windows, test))]
    pub fn from_dpi(screen_width: i32, screen_height: i32, dpi: u32) -> Self {
        Self {
            screen_width,
            screen_height,
            dpi,
            scale_percent: dpi as f64 / Self::BASE_DPI as f64 * 100.0,
        }
    }

    pub fn screen_rect(&self) -> Rect {
        Rect::from_size(0, 0, self.screen_width, self.screen_height)
    }
}

/// Snapshot of one top-level window, both rects in screen space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowGeometry {
    pub title: String,
    #[serde(rename = "rect")]
    pub window_rect: Rect,
    pub client_rect: Rect,
    pub is_foreground: bool,
    pub is_maximized: bool,
}

impl WindowGeometry {
    pub fn rect_for(&self, mode: RectMode) -> Rect {
        match mode {
            RectMode::Window => self.window_rect,
            RectMode::Client => self.client_rect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rect_collapses_inverted_edges() {
        let rect = Rect::new(10, 20, 5, 10);
        assert_eq!(rect.width(), 0);
        assert_eq!(rect.height(), 0);
        assert!(rect.is_empty());
    }

    #[test]
    fn rect_serializes_with_derived_size() {
        let value = serde_json::to_value(Rect::new(0, 32, 1280, 720)).unwrap();
        assert_eq!(
            value,
            json!({"left": 0, "top": 32, "right": 1280, "bottom": 720, "width": 1280, "height": 688})
        );
    }

    #[test]
    fn intersect_clips_to_screen() {
        let screen = Rect::from_size(0, 0, 1920, 1080);
        let window = Rect::new(-8, -8, 1928, 1048);
        assert_eq!(screen.intersect(&window), Some(Rect::new(0, 0, 1920, 1048)));
        let offscreen = Rect::new(2000, 0, 2100, 100);
        assert_eq!(screen.intersect(&offscreen), None);
    }

    #[test]
    fn contains_is_right_bottom_exclusive() {
        let rect = Rect::new(0, 0, 10, 10);
        assert!(rect.contains(Point::new(9, 9)));
        assert!(!rect.contains(Point::new(10, 5)));
    }

    #[test]
    fn size_parses_wxh() {
        assert_eq!("1280x720".parse::<Size>(), Ok(Size::new(1280, 720)));
        assert_eq!(" 800X600 ".parse::<Size>(), Ok(Size::new(800, 600)));
        assert!("1280".parse::<Size>().is_err());
        assert!("0x720".parse::<Size>().is_err());
        assert!("axb".parse::<Size>().is_err());
        assert!("1x2x3".parse::<Size>().is_err());
        assert_eq!("32767x32767".parse::<Size>(), Ok(Size::new(32767, 32767)));
        assert!("32768x720".parse::<Size>().is_err());
        assert!("2147483647x720".parse::<Size>().is_err());
        assert!("3000000000x720".parse::<Size>().is_err());
    }

    #[test]
    fn scale_percent_follows_dpi() {
        assert_eq!(DisplayInfo::from_dpi(1920, 1080, 96).scale_percent, 100.0);
        assert_eq!(DisplayInfo::from_dpi(1920, 1080, 120).scale_percent, 125.0);
    }
}
