use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read from `DOCKSLOT_*` environment variables.
/// Missing or unparsable values fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub upload_root: PathBuf,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub utc_offset_minutes: i32,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            upload_root: PathBuf::from("."),
            webhook_url: None,
            webhook_timeout: Duration::from_millis(3000),
            utc_offset_minutes: 0,
            metrics_port: None,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("DOCKSLOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            upload_root: lookup("DOCKSLOT_UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_root),
            webhook_url: lookup("DOCKSLOT_WEBHOOK_URL").filter(|s| !s.trim().is_empty()),
            webhook_timeout: parse_var(&lookup, "DOCKSLOT_WEBHOOK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.webhook_timeout),
            utc_offset_minutes: parse_var(&lookup, "DOCKSLOT_UTC_OFFSET_MINUTES")
                .unwrap_or(defaults.utc_offset_minutes),
            metrics_port: parse_var(&lookup, "DOCKSLOT_METRICS_PORT"),
            compact_threshold: parse_var(&lookup, "DOCKSLOT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("dockslot.wal")
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
