use anyhow::{Context, Result};
use chrono::Utc;
use image::RgbaImage;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::capture::{self, OverlaySpec, Region};
use crate::config::Settings;
use crate::diff;
use crate::error::DriverError;
use crate::geometry::{RectMode, WindowGeometry};
use crate::input;
use crate::inspect::{self, Expectations};
use crate::mapper::{self, Coordinate};
use crate::platform::Desktop;
use crate::window::{self, GeometryRequest, ResolvedWindow, SizeTarget};
use crate::{ClickArgs, DiffArgs, FocusArgs, InspectArgs, ObserveArgs, TypeArgs};

pub fn command_observe(desktop: &dyn Desktop, settings: &Settings, args: ObserveArgs) -> Result<Value> {
    let region = match args.window_title.as_deref() {
        Some(title) => {
            let window = window::find(desktop, title)?;
            if args.activate {
                window::bring_to_front(desktop, &window, args.maximize)?;
            }
            Region::Window {
                window,
                mode: args.mode,
            }
        }
        None => Region::FullScreen,
    };

    let overlay = (args.overlay || settings.overlay_default).then(|| {
        let duration = args
            .overlay_ms
            .map(Duration::from_millis)
            .unwrap_or(settings.overlay_duration);
        OverlaySpec::new(args.overlay_text.as_deref(), duration)
    });

    let cap = capture::capture(desktop, &region, overlay.as_ref())?;
    let captured_at = timestamp_iso();

    let out = match args.out {
        Some(path) => path,
        None => {
            let slug = match &region {
                Region::FullScreen => "screen".to_string(),
                Region::Window { window, .. } => slugify(&window.title),
            };
            default_observe_path(&settings.out_root, &slug)
        }
    };
    save_png(&cap.image, &out)?;
    info!(file = %out.display(), rect = %cap.rect, "observation saved");

    let mut fields = json!({
        "file": abs_path(&out).to_string_lossy(),
        "captured_at": captured_at,
        "size": {"width": cap.image.width(), "height": cap.image.height()},
        "rect": cap.rect,
        "clipped": cap.clipped,
        "screen": {"width": cap.display.screen_width, "height": cap.display.screen_height},
        "overlay": cap.overlay,
    });
    if let (Some(geometry), Region::Window { mode, .. }) = (&cap.window, &region) {
        fields["window"] = window_json(geometry, Some(*mode));
    }
    Ok(ok_payload("observe", fields))
}

pub fn command_click(desktop: &dyn Desktop, args: ClickArgs) -> Result<Value> {
    let target = resolve_target(desktop, args.window_title.as_deref(), args.activate, args.maximize)?;

    let coord = match (args.x, args.y, args.rel_x, args.rel_y) {
        (Some(x), Some(y), None, None) => Coordinate::Absolute { x, y },
        (None, None, Some(rx), Some(ry)) => {
            if target.is_none() {
                return Err(DriverError::InvalidArguments(
                    "--window-title is required for relative coordinates".to_string(),
                )
                .into());
            }
            Coordinate::WindowRelative {
                rx,
                ry,
                mode: args.mode,
            }
        }
        _ => {
            return Err(DriverError::InvalidArguments(
                "give either --x and --y, or --rel-x and --rel-y".to_string(),
            )
            .into())
        }
    };

    let display = desktop.display_info()?;
    let geometry = match (&target, coord) {
        (Some(window), Coordinate::WindowRelative { .. }) => Some(window::geometry(desktop, window)?),
        _ => None,
    };
    let point = mapper::map(coord, &display, geometry.as_ref())?;
    debug!(?coord, ?point, "mapped click coordinate");

    let outcome = input::click(desktop, point, target.as_ref(), args.verify_window)?;

    let mut fields = json!({
        "x": point.x,
        "y": point.y,
        "client": outcome.client,
        "delivered_to": outcome.delivered_to,
        "verified": args.verify_window,
    });
    if let Some(geometry) = &geometry {
        fields["window"] = window_json(geometry, Some(args.mode));
    } else if let Some(window) = &target {
        fields["window"] = json!({"title": window.title});
    }
    Ok(ok_payload("click", fields))
}

pub fn command_type(desktop: &dyn Desktop, args: TypeArgs) -> Result<Value> {
    if args.text.is_empty() {
        return Err(DriverError::InvalidArguments("--text must not be empty".to_string()).into());
    }
    let target = resolve_target(desktop, args.window_title.as_deref(), args.activate, args.maximize)?;
    let outcome = input::type_text(desktop, &args.text, target.as_ref(), args.verify_window)?;

    let mut fields = json!({
        "chars": args.text.chars().count(),
        "units": outcome.units,
        "delivered_to": outcome.delivered_to,
        "verified": args.verify_window,
    });
    if let Some(window) = &target {
        fields["window"] = json!({"title": window.title});
    }
    Ok(ok_payload("type", fields))
}

pub fn command_inspect(desktop: &dyn Desktop, args: InspectArgs) -> Result<Value> {
    let expect = Expectations {
        foreground: args.expect_foreground,
        maximized: args.expect_maximized,
        scale: args.expect_scale,
        window_size: args.expect_window_size,
        client_size: args.expect_client_size,
    };
    let report = inspect::inspect(desktop, args.title.as_deref(), args.strict, &expect)?;

    let mut fields = serde_json::to_value(&report).context("failed to serialize inspect report")?;
    fields["strict"] = json!(args.strict);
    if args.title.is_some() {
        fields["window_found"] = json!(report.window.is_some());
    }
    Ok(ok_payload("inspect", fields))
}

pub fn command_focus(desktop: &dyn Desktop, args: FocusArgs) -> Result<Value> {
    let window = window::find(desktop, &args.title)?;
    let request = GeometryRequest {
        size: args
            .window_size
            .map(SizeTarget::Window)
            .or(args.client_size.map(SizeTarget::Client)),
        position: args.x.zip(args.y).map(|(x, y)| crate::geometry::Point::new(x, y)),
    };

    let geometry = if args.maximize || request.is_empty() {
        window::bring_to_front(desktop, &window, args.maximize)?
    } else {
        window::set_geometry(desktop, &window, &request)?
    };

    let mut requested = Map::new();
    if let Some(size) = args.window_size {
        requested.insert("window_size".to_string(), json!(size));
    }
    if let Some(size) = args.client_size {
        requested.insert("client_size".to_string(), json!(size));
    }
    if let Some(point) = request.position {
        requested.insert("position".to_string(), json!(point));
    }
    if args.maximize {
        requested.insert("maximize".to_string(), json!(true));
    }

    Ok(ok_payload(
        "focus",
        json!({
            "window": window_json(&geometry, None),
            "requested": requested,
        }),
    ))
}

pub fn command_diff(args: DiffArgs) -> Result<Value> {
    let a = load_rgba(&args.a)?;
    let b = load_rgba(&args.b)?;
    let result = diff::diff_images(&a, &b, args.threshold, args.alpha)?;
    save_png(&result.image, &args.out)?;
    debug!(diff_pixels = result.diff_pixels, out = %args.out.display(), "diff written");

    Ok(ok_payload(
        "diff",
        json!({
            "file": abs_path(&args.out).to_string_lossy(),
            "diff_pixels": result.diff_pixels,
            "diff_ratio": result.diff_ratio,
            "size": {"width": result.image.width(), "height": result.image.height()},
            "threshold": args.threshold,
            "alpha": round_to(args.alpha as f64, 3),
        }),
    ))
}

fn resolve_target(
    desktop: &dyn Desktop,
    title: Option<&str>,
    activate: bool,
    maximize: bool,
) -> Result<Option<ResolvedWindow>, DriverError> {
    let Some(title) = title else {
        return Ok(None);
    };
    let window = window::find(desktop, title)?;
    if activate {
        window::bring_to_front(desktop, &window, maximize)?;
    }
    Ok(Some(window))
}

/// `{"status":"ok","action":...}` followed by the command's own fields.
fn ok_payload(action: &str, fields: Value) -> Value {
    let mut payload = Map::new();
    payload.insert("status".to_string(), json!("ok"));
    payload.insert("action".to_string(), json!(action));
    if let Value::Object(extra) = fields {
        payload.extend(extra);
    }
    Value::Object(payload)
}

fn window_json(geometry: &WindowGeometry, mode: Option<RectMode>) -> Value {
    let mut value = json!(geometry);
    if let Some(mode) = mode {
        value["mode"] = json!(mode);
    }
    value
}

fn load_rgba(path: &Path) -> Result<RgbaImage, DriverError> {
    if !path.exists() {
        return Err(DriverError::InvalidArguments(format!(
            "image not found: {}",
            path.display()
        )));
    }
    let img = image::open(path).map_err(|err| {
        DriverError::InvalidArguments(format!("failed to decode {}: {err}", path.display()))
    })?;
    Ok(img.to_rgba8())
}

fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write PNG: {}", path.display()))?;
    Ok(())
}

fn default_observe_path(root: &Path, slug: &str) -> PathBuf {
    let run_id = format!(
        "{}-{}-{}",
        timestamp_compact(),
        std::process::id(),
        rand::thread_rng().gen_range(1000..9999)
    );
    root.join("observe").join(format!("{slug}-{run_id}.png"))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || matches!(lower, '.' | '_') {
            out.push(lower);
        } else if (lower == '-' || lower.is_ascii_whitespace()) && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "window".to_string()
    } else {
        trimmed.to_string()
    }
}

fn timestamp_compact() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

fn round_to(v: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (v * factor).round() / factor
}
