use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OUT_DIR: &str = ".desktop-driver";
pub const DEFAULT_OVERLAY_MS: u64 = 600;
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Per-process settings read from the environment. Nothing is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub out_root: PathBuf,
    pub overlay_default: bool,
    pub overlay_duration: Duration,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            out_root: PathBuf::from(DEFAULT_OUT_DIR),
            overlay_default: false,
            overlay_duration: Duration::from_millis(DEFAULT_OVERLAY_MS),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let out_root = non_empty("DDRV_OUT_DIR")
            .or_else(|| non_empty("DDRV_TMP_DIR"))
            .map(PathBuf::from)
            .unwrap_or(defaults.out_root);

        let overlay_duration = non_empty("DDRV_OVERLAY_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.overlay_duration);

        let log_filter = non_empty("DDRV_LOG")
            .or_else(|| non_empty("RUST_LOG"))
            .unwrap_or(defaults.log_filter);

        Self {
            out_root,
            overlay_default: non_empty("DDRV_OVERLAY").is_some(),
            overlay_duration,
            log_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        assert_eq!(settings_from(&[]), Settings::default());
    }

    #[test]
    fn out_dir_prefers_primary_variable() {
        let s = settings_from(&[("DDRV_OUT_DIR", "/tmp/a"), ("DDRV_TMP_DIR", "/tmp/b")]);
        assert_eq!(s.out_root, PathBuf::from("/tmp/a"));
        let s = settings_from(&[("DDRV_OUT_DIR", "  "), ("DDRV_TMP_DIR", "/tmp/b")]);
        assert_eq!(s.out_root, PathBuf::from("/tmp/b"));
    }

    #[test]
    fn overlay_settings_parse() {
        let s = settings_from(&[("DDRV_OVERLAY", "1"), ("DDRV_OVERLAY_MS", "250")]);
        assert!(s.overlay_default);
        assert_eq!(s.overlay_duration, Duration::from_millis(250));

        let s = settings_from(&[("DDRV_OVERLAY_MS", "soon")]);
        assert!(!s.overlay_default);
        assert_eq!(s.overlay_duration, Duration::from_millis(DEFAULT_OVERLAY_MS));
    }

    #[test]
    fn log_filter_falls_back_to_rust_log() {
        let s = settings_from(&[("RUST_LOG", "debug")]);
        assert_eq!(s.log_filter, "debug");
        let s = settings_from(&[("RUST_LOG", "debug"), ("DDRV_LOG", "trace")]);
        assert_eq!(s.log_filter, "trace");
    }
}
