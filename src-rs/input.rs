//! Synthetic clicks and text, delivered as window messages. The system
//! pointer and keyboard state are never touched.

use serde::Serialize;
use tracing::debug;

use crate::error::DriverError;
use crate::geometry::Point;
use crate::platform::{Desktop, WindowHandle, WindowMessage};
use crate::window::{self, ResolvedWindow};

/// Pack client coordinates into a mouse-message `lParam`: y in the high word,
/// x in the low word, both truncated to 16 bits.
#[cfg(any(windows, test))]
pub fn make_lparam(point: Point) -> isize {
    let x = (point.x as u32) & 0xFFFF;
    let y = (point.y as u32) & 0xFFFF;
    ((y << 16) | x) as i32 as isize
}

/// UTF-16 units to post as character messages. Line breaks (`\n` or `\r\n`)
/// become a single carriage return, which is what Enter produces.
pub fn text_units(text: &str) -> Vec<u16> {
    let normalized = text.replace("\r\n", "\n");
    let mut units = Vec::with_capacity(normalized.len());
    for ch in normalized.chars() {
        if ch == '\n' {
            units.push(u16::from(b'\r'));
            continue;
        }
        let mut buf = [0u16; 2];
        units.extend_from_slice(ch.encode_utf16(&mut buf));
    }
    units
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClickOutcome {
    /// Window that received the messages.
    pub delivered_to: WindowHandle,
    /// Point in that window's client coordinates.
    pub client: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeOutcome {
    pub delivered_to: WindowHandle,
    pub units: usize,
}

/// Post move, button-down and button-up at screen point `point`.
///
/// With a target, the deepest window under the point receives the click if it
/// belongs to the target; otherwise the target itself does. Without one, the
/// window under the point does.
pub fn click(
    desktop: &dyn Desktop,
    point: Point,
    target: Option<&ResolvedWindow>,
    verify: bool,
) -> Result<ClickOutcome, DriverError> {
    let hit = desktop.window_from_point(point);
    let recipient = match target {
        Some(target) => {
            window::ensure_alive(desktop, target)?;
            match hit {
                Some(h) if desktop.root_window(h) == target.handle => h,
                Some(h) if verify => {
                    return Err(DriverError::WindowVerificationFailed(format!(
                        "point ({}, {}) lands on window {} outside {:?}",
                        point.x, point.y, h.0, target.title
                    )));
                }
                _ => target.handle,
            }
        }
        None => hit.ok_or_else(|| {
            DriverError::WindowNotFound(format!("no window at ({}, {})", point.x, point.y))
        })?,
    };

    let client = desktop.screen_to_client(recipient, point).ok_or_else(|| {
        DriverError::WindowNotFound(format!("window {} vanished before dispatch", recipient.0))
    })?;
    let foreground_before = desktop.foreground_window();

    debug!(handle = recipient.0, ?point, ?client, "posting click");
    desktop.post_message(recipient, WindowMessage::MouseMove(client))?;
    desktop.post_message(recipient, WindowMessage::LeftButtonDown(client))?;
    desktop.post_message(recipient, WindowMessage::LeftButtonUp(client))?;

    if verify {
        verify_unchanged(desktop, target, foreground_before)?;
    }
    Ok(ClickOutcome {
        delivered_to: recipient,
        client,
    })
}

/// Post `text` as character messages to the target (or the foreground
/// window), preferring whichever child holds keyboard focus.
pub fn type_text(
    desktop: &dyn Desktop,
    text: &str,
    target: Option<&ResolvedWindow>,
    verify: bool,
) -> Result<TypeOutcome, DriverError> {
    let top = match target {
        Some(target) => {
            window::ensure_alive(desktop, target)?;
            target.handle
        }
        None => desktop
            .foreground_window()
            .ok_or_else(|| DriverError::WindowNotFound("no foreground window".to_string()))?,
    };
    let recipient = desktop.focus_window_of(top).unwrap_or(top);
    let foreground_before = desktop.foreground_window();

    let units = text_units(text);
    debug!(handle = recipient.0, units = units.len(), "posting characters");
    for unit in &units {
        desktop.post_message(recipient, WindowMessage::Char(*unit))?;
    }

    if verify {
        verify_unchanged(desktop, target, foreground_before)?;
    }
    Ok(TypeOutcome {
        delivered_to: recipient,
        units: units.len(),
    })
}

/// Re-resolve the target by title and require the same handle, still alive,
/// with the foreground window as it was before dispatch.
fn verify_unchanged(
    desktop: &dyn Desktop,
    target: Option<&ResolvedWindow>,
    foreground_before: Option<WindowHandle>,
) -> Result<(), DriverError> {
    if let Some(target) = target {
        let again = window::find(desktop, &target.title).map_err(|err| {
            DriverError::WindowVerificationFailed(format!(
                "window {:?} could not be re-resolved: {err}",
                target.title
            ))
        })?;
        if again.handle != target.handle || !desktop.is_window(target.handle) {
            return Err(DriverError::WindowVerificationFailed(format!(
                "window {:?} changed identity during dispatch",
                target.title
            )));
        }
    }
    let foreground_after = desktop.foreground_window();
    if foreground_after != foreground_before {
        return Err(DriverError::WindowVerificationFailed(format!(
            "foreground changed during dispatch ({:?} -> {:?})",
            foreground_before.map(|h| h.0),
            foreground_after.map(|h| h.0)
        )));
    }
    Ok(())
}
