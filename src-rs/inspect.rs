//! Environment report and strict preflight validation.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::DriverError;
use crate::geometry::{DisplayInfo, Size, WindowGeometry};
use crate::platform::Desktop;
use crate::window;

/// Percent points a measured scale may differ from the expected one.
pub const SCALE_TOLERANCE: f64 = 0.5;

/// One failed preflight check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl Mismatch {
    fn new(field: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        Self {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectations {
    pub foreground: bool,
    pub maximized: bool,
    pub scale: Option<f64>,
    pub window_size: Option<Size>,
    pub client_size: Option<Size>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreenFacts {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DpiFacts {
    pub value: u32,
    pub scale_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub screen: ScreenFacts,
    pub dpi: DpiFacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowGeometry>,
}

impl Report {
    pub fn new(display: &DisplayInfo, window: Option<WindowGeometry>) -> Self {
        Self {
            screen: ScreenFacts {
                width: display.screen_width,
                height: display.screen_height,
            },
            dpi: DpiFacts {
                value: display.dpi,
                scale_percent: display.scale_percent,
            },
            window,
        }
    }
}

/// Run every check and collect all failures; never stops at the first one.
pub fn check(report: &Report, title: Option<&str>, expect: &Expectations) -> Vec<Mismatch> {
    let mut failures = Vec::new();

    let screen = (report.screen.width, report.screen.height);
    let wanted = (DisplayInfo::EXPECTED_WIDTH, DisplayInfo::EXPECTED_HEIGHT);
    if screen != wanted {
        failures.push(Mismatch::new(
            "screen",
            format!("{}x{}", wanted.0, wanted.1),
            format!("{}x{}", screen.0, screen.1),
        ));
    }

    if let Some(expected) = expect.scale {
        let actual = report.dpi.scale_percent;
        if (actual - expected).abs() > SCALE_TOLERANCE {
            failures.push(Mismatch::new("expect_scale", expected, actual));
        }
    }

    let window = report.window.as_ref();
    if let (Some(title), None) = (title, window) {
        failures.push(Mismatch::new("window", title, "not found"));
    }

    let needs_window = expect.foreground
        || expect.maximized
        || expect.window_size.is_some()
        || expect.client_size.is_some();
    let Some(window) = window else {
        if needs_window && title.is_none() {
            failures.push(Mismatch::new("window", "a --title to check against", "none given"));
        }
        return failures;
    };

    if expect.foreground && !window.is_foreground {
        failures.push(Mismatch::new("expect_foreground", true, false));
    }
    if expect.maximized && !window.is_maximized {
        failures.push(Mismatch::new("expect_maximized", true, false));
    }
    if let Some(expected) = expect.window_size {
        let actual = window.window_rect.size();
        if actual != expected {
            failures.push(Mismatch::new("expect_window_size", expected, actual));
        }
    }
    if let Some(expected) = expect.client_size {
        let actual = window.client_rect.size();
        if actual != expected {
            failures.push(Mismatch::new("expect_client_size", expected, actual));
        }
    }
    failures
}

/// Gather display and window facts. A window that cannot be found is left out
/// of the report. Under `strict`, validate the facts and fail with one
/// aggregated `PreflightMismatch`, where the missing window is one more entry.
pub fn inspect(
    desktop: &dyn Desktop,
    title: Option<&str>,
    strict: bool,
    expect: &Expectations,
) -> Result<Report, DriverError> {
    let display = desktop.display_info()?;
    let window = match title {
        Some(title) => match window::resolve(desktop, title) {
            Ok((_, geometry)) => Some(geometry),
            Err(DriverError::WindowNotFound(msg)) => {
                debug!(%msg, strict, "window missing during inspect");
                None
            }
            Err(err) => return Err(err),
        },
        None => None,
    };
    let report = Report::new(&display, window);

    if !strict && *expect != Expectations::default() {
        debug!("expectations given without strict mode; not checked");
    }
    if strict {
        let failures = check(&report, title, expect);
        if !failures.is_empty() {
            let facts = serde_json::to_value(&report).unwrap_or(Value::Null);
            return Err(DriverError::PreflightMismatch { failures, facts });
        }
    }
    Ok(report)
}
