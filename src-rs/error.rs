use serde_json::{json, Value};
use thiserror::Error;

use crate::inspect::Mismatch;

/// Terminal failure of one driver invocation.
///
/// Every variant maps to a stable kind string that callers match on; the
/// message is for humans only.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    WindowNotFound(String),

    #[error("{0}")]
    OutOfBounds(String),

    #[error("{0}")]
    InvalidRange(String),

    #[error("{0}")]
    RegionUnresolvable(String),

    #[error("{0}")]
    CaptureFailed(String),

    #[error("{0}")]
    WindowVerificationFailed(String),

    #[error("{} preflight check(s) failed: {}", .failures.len(), failed_fields(.failures))]
    PreflightMismatch { failures: Vec<Mismatch>, facts: Value },

    #[error("image size mismatch: {} vs {}", dims(.a), dims(.b))]
    DimensionMismatch { a: (u32, u32), b: (u32, u32) },

    #[error("{0}")]
    InvalidArguments(String),

    #[error("desktop operations require Windows (host os: {0})")]
    PlatformUnsupported(&'static str),
}

impl DriverError {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::WindowNotFound(_) => "WindowNotFound",
            DriverError::OutOfBounds(_) => "OutOfBounds",
            DriverError::InvalidRange(_) => "InvalidRange",
            DriverError::RegionUnresolvable(_) => "RegionUnresolvable",
            DriverError::CaptureFailed(_) => "CaptureFailed",
            DriverError::WindowVerificationFailed(_) => "WindowVerificationFailed",
            DriverError::PreflightMismatch { .. } => "PreflightMismatch",
            DriverError::DimensionMismatch { .. } => "DimensionMismatch",
            DriverError::InvalidArguments(_) => "InvalidArguments",
            DriverError::PlatformUnsupported(_) => "PlatformUnsupported",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::InvalidArguments(_) => 2,
            DriverError::PreflightMismatch { .. } => 3,
            _ => 1,
        }
    }

    /// Extra fields merged into the error object next to `error`/`message`.
    pub fn details(&self) -> Option<Value> {
        match self {
            DriverError::PreflightMismatch { failures, facts } => Some(json!({
                "failures": failures,
                "details": facts,
            })),
            DriverError::DimensionMismatch { a, b } => Some(json!({
                "details": {
                    "a": {"width": a.0, "height": a.1},
                    "b": {"width": b.0, "height": b.1},
                }
            })),
            _ => None,
        }
    }
}

fn failed_fields(failures: &[Mismatch]) -> String {
    failures
        .iter()
        .map(|f| f.field)
        .collect::<Vec<_>>()
        .join(", ")
}

fn dims(size: &(u32, u32)) -> String {
    format!("{}x{}", size.0, size.1)
}

/// Build the single JSON object printed for a failed invocation.
pub fn error_payload(action: &str, err: &anyhow::Error) -> (Value, i32) {
    let (kind, code, details) = match err.downcast_ref::<DriverError>() {
        Some(driver_err) => (driver_err.kind(), driver_err.exit_code(), driver_err.details()),
        None => ("InternalError", 1, None),
    };

    let mut payload = json!({
        "status": "error",
        "action": action,
        "error": kind,
        "message": format!("{err:#}"),
    });
    if let (Some(Value::Object(extra)), Some(obj)) = (details, payload.as_object_mut()) {
        for (key, value) in extra {
            obj.insert(key, value);
        }
    }
    (payload, code)
}
