use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Daemon settings, read from `HOSTELRES_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// WAL appends since the last compaction before the compactor rewrites the log.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// JSON array of room ids; `None` starts with an empty catalog.
    pub rooms_file: Option<PathBuf>,
    pub report_interval: Duration,
    /// Hostels opened at startup in addition to those found in `data_dir`.
    pub hostels: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            metrics_port: None,
            rooms_file: None,
            report_interval: Duration::from_secs(15),
            hostels: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            data_dir: lookup("HOSTELRES_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parse(lookup("HOSTELRES_COMPACT_THRESHOLD"))
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parse(lookup("HOSTELRES_METRICS_PORT")),
            rooms_file: lookup("HOSTELRES_ROOMS_FILE").map(PathBuf::from),
            report_interval: parse(lookup("HOSTELRES_REPORT_INTERVAL_SECS"))
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.report_interval),
            hostels: lookup("HOSTELRES_HOSTELS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn parse<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|s| s.trim().parse().ok())
}
