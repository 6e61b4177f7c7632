use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value;
use std::env;
use std::path::PathBuf;

mod capture;
mod commands;
mod config;
mod diff;
mod error;
mod geometry;
mod input;
mod inspect;
mod logging;
mod mapper;
mod platform;
mod window;

use config::Settings;
use error::{error_payload, DriverError};
use geometry::{RectMode, Size};

const VERBS: [&str; 6] = ["observe", "click", "type", "inspect", "focus", "diff"];

#[derive(Parser, Debug)]
#[command(
    name = "desktop-driver",
    version,
    about = "Single-shot Windows desktop driver: one action per call, one JSON object on stdout"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture the screen or one window to a PNG
    Observe(ObserveArgs),
    /// Post a left click at absolute or window-relative coordinates
    Click(ClickArgs),
    /// Post text as character messages
    Type(TypeArgs),
    /// Report screen, DPI and window geometry; validate it with --strict
    Inspect(InspectArgs),
    /// Activate, maximize, move or resize a window
    Focus(FocusArgs),
    /// Compare two images and write a highlighted diff PNG
    Diff(DiffArgs),
}

impl Commands {
    fn action(&self) -> &'static str {
        match self {
            Commands::Observe(_) => "observe",
            Commands::Click(_) => "click",
            Commands::Type(_) => "type",
            Commands::Inspect(_) => "inspect",
            Commands::Focus(_) => "focus",
            Commands::Diff(_) => "diff",
        }
    }
}

#[derive(Args, Debug)]
struct ObserveArgs {
    /// Output PNG path (default: <DDRV_OUT_DIR>/observe/<name>-<timestamp>.png)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Capture the first window whose title contains this text
    #[arg(long)]
    window_title: Option<String>,
    /// Window rect to capture: window (with frame) or client
    #[arg(long, value_enum, default_value_t = RectMode::Window)]
    mode: RectMode,
    /// Bring the window to the foreground first
    #[arg(long, action = ArgAction::SetTrue, requires = "window_title")]
    activate: bool,
    /// Maximize while activating
    #[arg(long, action = ArgAction::SetTrue, requires = "activate")]
    maximize: bool,
    /// Flash the capture banner before grabbing (also enabled by DDRV_OVERLAY)
    #[arg(long, action = ArgAction::SetTrue)]
    overlay: bool,
    /// Banner duration in milliseconds (default: DDRV_OVERLAY_MS or 600)
    #[arg(long)]
    overlay_ms: Option<u64>,
    /// Banner text
    #[arg(long)]
    overlay_text: Option<String>,
}

#[derive(Args, Debug)]
struct ClickArgs {
    /// Absolute screen x
    #[arg(long, allow_negative_numbers = true, requires = "y", conflicts_with_all = ["rel_x", "rel_y"])]
    x: Option<i32>,
    /// Absolute screen y
    #[arg(long, allow_negative_numbers = true, requires = "x")]
    y: Option<i32>,
    /// Window-relative x in 0..1000
    #[arg(long, allow_negative_numbers = true, requires_all = ["rel_y", "window_title"])]
    rel_x: Option<f64>,
    /// Window-relative y in 0..1000
    #[arg(long, allow_negative_numbers = true, requires = "rel_x")]
    rel_y: Option<f64>,
    /// Target window (first title containing this text)
    #[arg(long)]
    window_title: Option<String>,
    /// Rect relative coordinates refer to
    #[arg(long, value_enum, default_value_t = RectMode::Window)]
    mode: RectMode,
    /// Bring the window to the foreground first
    #[arg(long, action = ArgAction::SetTrue, requires = "window_title")]
    activate: bool,
    /// Maximize while activating
    #[arg(long, action = ArgAction::SetTrue, requires = "activate")]
    maximize: bool,
    /// Fail unless the click lands on the target and it is unchanged afterwards
    #[arg(long, action = ArgAction::SetTrue)]
    verify_window: bool,
}

#[derive(Args, Debug)]
struct TypeArgs {
    /// Text to send; newlines become Enter
    #[arg(long, allow_hyphen_values = true)]
    text: String,
    /// Target window (default: the foreground window)
    #[arg(long)]
    window_title: Option<String>,
    /// Bring the window to the foreground first
    #[arg(long, action = ArgAction::SetTrue, requires = "window_title")]
    activate: bool,
    /// Maximize while activating
    #[arg(long, action = ArgAction::SetTrue, requires = "activate")]
    maximize: bool,
    /// Fail if the target or the foreground window changed during typing
    #[arg(long, action = ArgAction::SetTrue)]
    verify_window: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Include the first window whose title contains this text
    #[arg(long)]
    title: Option<String>,
    /// Validate the environment; every failed check is reported at once.
    /// Without it the --expect-* flags are ignored
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    expect_foreground: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    expect_maximized: bool,
    /// Expected scale in percent (tolerance 0.5)
    #[arg(long)]
    expect_scale: Option<f64>,
    /// Expected window size, WxH
    #[arg(long)]
    expect_window_size: Option<Size>,
    /// Expected client size, WxH
    #[arg(long)]
    expect_client_size: Option<Size>,
}

#[derive(Args, Debug)]
struct FocusArgs {
    /// Window to focus (first title containing this text)
    #[arg(long)]
    title: String,
    #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["window_size", "client_size", "x", "y"])]
    maximize: bool,
    /// Outer window size, WxH
    #[arg(long, conflicts_with = "client_size")]
    window_size: Option<Size>,
    /// Client area size, WxH
    #[arg(long)]
    client_size: Option<Size>,
    /// Window left edge
    #[arg(long, allow_negative_numbers = true, requires = "y")]
    x: Option<i32>,
    /// Window top edge
    #[arg(long, allow_negative_numbers = true, requires = "x")]
    y: Option<i32>,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// First (before) image
    #[arg(long)]
    a: PathBuf,
    /// Second (after) image; the highlight is drawn over it
    #[arg(long)]
    b: PathBuf,
    /// Diff PNG to write
    #[arg(long)]
    out: PathBuf,
    /// Per-pixel luma delta above which a pixel counts as changed
    #[arg(long, default_value_t = diff::DEFAULT_THRESHOLD)]
    threshold: u8,
    /// Highlight opacity, 0..1
    #[arg(long, default_value_t = diff::DEFAULT_ALPHA)]
    alpha: f32,
}

fn main() {
    let (payload, code) = run();
    println!("{payload}");
    std::process::exit(code);
}

fn run() -> (Value, i32) {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => return usage_error(&err, env::args().nth(1)),
        },
    };

    let settings = Settings::from_env();
    logging::init(&settings.log_filter);

    let action = cli.command.action();
    match dispatch(cli.command, &settings) {
        Ok(payload) => (payload, 0),
        Err(err) => {
            tracing::debug!(action, error = %format!("{err:#}"), "command failed");
            error_payload(action, &err)
        }
    }
}

fn dispatch(command: Commands, settings: &Settings) -> Result<Value> {
    match command {
        Commands::Observe(args) => {
            commands::command_observe(platform::native().as_ref(), settings, args)
        }
        Commands::Click(args) => commands::command_click(platform::native().as_ref(), args),
        Commands::Type(args) => commands::command_type(platform::native().as_ref(), args),
        Commands::Inspect(args) => {
            commands::command_inspect(platform::native().as_ref(), args)
        }
        Commands::Focus(args) => commands::command_focus(platform::native().as_ref(), args),
        Commands::Diff(args) => commands::command_diff(args),
    }
}

/// clap parse failures still produce one JSON object and exit code 2.
fn usage_error(err: &clap::Error, verb: Option<String>) -> (Value, i32) {
    let rendered = err.render().to_string();
    let message = rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("invalid arguments")
        .trim_start_matches("error: ")
        .to_string();
    let action = verb
        .filter(|v| VERBS.contains(&v.as_str()))
        .unwrap_or_else(|| "unknown".to_string());
    error_payload(&action, &DriverError::InvalidArguments(message).into())
}
