//! Service configuration read from the process environment.
//!
//! Two kinds of variables live side by side in the environment: a handful
//! of scalar settings (credentials, interval, port, ...) loaded once into
//! [`Settings`], and any number of user-defined mapping keys of the form
//! `NAME=timetreeId|googleCalendarId`, which are enumerated afresh every
//! time they are needed.

use anyhow::{bail, Context, Result};
use shared_types::{artifact_file_name, Mapping};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const MAPPING_SEPARATOR: char = '|';

pub const TIMETREE_EMAIL: &str = "TIMETREE_EMAIL";
pub const TIMETREE_PASSWORD: &str = "TIMETREE_PASSWORD";
pub const SYNC_INTERVAL_MINUTES: &str = "SYNC_INTERVAL_MINUTES";
pub const PORT: &str = "PORT";
pub const OUTPUT_FILE: &str = "OUTPUT_FILE";
pub const OUTPUT_DIR: &str = "OUTPUT_DIR";
pub const EXPORTER_BIN: &str = "EXPORTER_BIN";
pub const STATUS_ENDPOINT_ENABLED: &str = "STATUS_ENDPOINT_ENABLED";
pub const FILE_ENDPOINT_ENABLED: &str = "FILE_ENDPOINT_ENABLED";
/// Read by `timetree-sync-cli`, never by the service itself
pub const TIMETREE_SYNC_URL: &str = "TIMETREE_SYNC_URL";

/// Keys that are never treated as mappings, whatever their value.
pub const RESERVED_KEYS: &[&str] = &[
    TIMETREE_EMAIL,
    TIMETREE_PASSWORD,
    SYNC_INTERVAL_MINUTES,
    PORT,
    OUTPUT_FILE,
    OUTPUT_DIR,
    EXPORTER_BIN,
    STATUS_ENDPOINT_ENABLED,
    FILE_ENDPOINT_ENABLED,
    TIMETREE_SYNC_URL,
    "RUST_LOG",
];

const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_OUTPUT_DIR: &str = "/app/output";
const DEFAULT_EXPORTER_BIN: &str = "timetree-exporter";

/// Scalar settings, loaded once at startup and shared read-only.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub email: Option<String>,
    pub password: Option<String>,
    pub sync_interval_minutes: u64,
    pub port: u16,
    /// Directory holding one `<unit>.ics` per mapping
    pub output_dir: PathBuf,
    pub exporter_bin: String,
    pub status_endpoint_enabled: bool,
    pub file_endpoint_enabled: bool,
}

impl Settings {
    /// Load settings from the current process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(process_vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let sync_interval_minutes: u64 = get(SYNC_INTERVAL_MINUTES)
            .map(str::parse::<u64>)
            .transpose()
            .context("SYNC_INTERVAL_MINUTES must be a valid number")?
            .unwrap_or(DEFAULT_SYNC_INTERVAL_MINUTES);
        if sync_interval_minutes == 0 {
            bail!("SYNC_INTERVAL_MINUTES must be greater than zero");
        }

        let port: u16 = get(PORT)
            .map(str::parse::<u16>)
            .transpose()
            .context("PORT must be a valid number")?
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            email: get(TIMETREE_EMAIL).map(str::to_string),
            password: get(TIMETREE_PASSWORD).map(str::to_string),
            sync_interval_minutes,
            port,
            output_dir: PathBuf::from(get(OUTPUT_DIR).unwrap_or(DEFAULT_OUTPUT_DIR)),
            exporter_bin: get(EXPORTER_BIN)
                .unwrap_or(DEFAULT_EXPORTER_BIN)
                .to_string(),
            status_endpoint_enabled: parse_flag(
                STATUS_ENDPOINT_ENABLED,
                get(STATUS_ENDPOINT_ENABLED),
            )?,
            file_endpoint_enabled: parse_flag(FILE_ENDPOINT_ENABLED, get(FILE_ENDPOINT_ENABLED))?,
        })
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes.saturating_mul(60))
    }

    /// Where the published calendar for `unit` lives
    pub fn artifact_path(&self, unit: &str) -> PathBuf {
        self.output_dir.join(artifact_file_name(unit))
    }

    /// Where the exporter writes before the result is renamed into place
    pub fn staging_path(&self, unit: &str) -> PathBuf {
        self.output_dir.join(format!("{}.tmp", artifact_file_name(unit)))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("port", &self.port)
            .field("output_dir", &self.output_dir)
            .field("exporter_bin", &self.exporter_bin)
            .field("status_endpoint_enabled", &self.status_endpoint_enabled)
            .field("file_endpoint_enabled", &self.file_endpoint_enabled)
            .finish()
    }
}

fn parse_flag(key: &str, value: Option<&str>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(true);
    };

    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean, got '{}'", key, other),
    }
}

/// Snapshot of the process environment; entries that are not valid
/// Unicode are skipped.
pub fn process_vars() -> Vec<(String, String)> {
    utf8_vars(std::env::vars_os())
}

fn utf8_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Interpret one environment entry as a mapping.
///
/// Splits on the first separator only, so `a|b|c` yields `a` and `b|c`.
/// Reserved keys, values without a separator and values with an empty
/// side are not mappings.
pub fn parse_mapping(key: &str, value: &str) -> Option<Mapping> {
    if RESERVED_KEYS.contains(&key) {
        return None;
    }

    let (source_id, destination_id) = value.split_once(MAPPING_SEPARATOR)?;
    let (source_id, destination_id) = (source_id.trim(), destination_id.trim());
    if source_id.is_empty() || destination_id.is_empty() {
        return None;
    }

    Some(Mapping::new(key, source_id, destination_id))
}

/// Every mapping found in `vars`, ordered by name.
pub fn enumerate_mappings<I>(vars: I) -> Vec<Mapping>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut mappings: Vec<Mapping> = vars
        .into_iter()
        .filter_map(|(key, value)| parse_mapping(&key, &value))
        .collect();
    mappings.sort_by(|a, b| a.name.cmp(&b.name));
    mappings
}

/// Live view of the configured mappings.
///
/// Implementations must recompute on every call; callers rely on changes
/// becoming visible without a restart.
pub trait MappingSource: Send + Sync {
    fn mappings(&self) -> Vec<Mapping>;
}

/// Reads mappings from the process environment on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl MappingSource for ProcessEnv {
    fn mappings(&self) -> Vec<Mapping> {
        enumerate_mappings(process_vars())
    }
}

impl MappingSource for Vec<Mapping> {
    fn mappings(&self) -> Vec<Mapping> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mapping_fields_are_trimmed() {
        let mappings = enumerate_mappings(vars(&[("UNIT_A", " tt123 | gc456 ")]));
        assert_eq!(mappings, vec![Mapping::new("UNIT_A", "tt123", "gc456")]);
    }

    #[test]
    fn test_reserved_and_plain_keys_are_skipped() {
        let mappings = enumerate_mappings(vars(&[
            ("PORT", "8000"),
            ("TIMETREE_PASSWORD", "hunter2|with-pipe"),
            ("OUTPUT_FILE", "/tmp/a|b"),
            ("TIMETREE_SYNC_URL", "http://sync:8000/?a|b"),
            ("HOME", "/root"),
            ("FAMILY", "tt1|gc1"),
        ]));
        assert_eq!(mappings, vec![Mapping::new("FAMILY", "tt1", "gc1")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_entries_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let entries = vec![
            (OsString::from("FAMILY"), OsString::from("tt1|gc1")),
            (OsString::from_vec(vec![0xff]), OsString::from("tt2|gc2")),
            (OsString::from("WORK"), OsString::from_vec(vec![b't', b'|', 0xff])),
        ];

        assert_eq!(
            utf8_vars(entries),
            vec![("FAMILY".to_string(), "tt1|gc1".to_string())]
        );
    }

    #[test]
    fn test_split_on_first_separator_only() {
        let mapping = parse_mapping("UNIT", "a|b|c").unwrap();
        assert_eq!(mapping.source_id, "a");
        assert_eq!(mapping.destination_id, "b|c");
    }

    #[test]
    fn test_empty_side_is_not_a_mapping() {
        assert!(parse_mapping("UNIT", "|gc456").is_none());
        assert!(parse_mapping("UNIT", "tt123|  ").is_none());
        assert!(parse_mapping("UNIT", "").is_none());
    }

    #[test]
    fn test_mappings_sorted_by_name() {
        let mappings = enumerate_mappings(vars(&[("ZED", "z|1"), ("ALPHA", "a|2")]));
        let names: Vec<_> = mappings.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["ALPHA", "ZED"]);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_vars(Vec::<(String, String)>::new()).unwrap();

        assert_eq!(settings.email, None);
        assert_eq!(settings.password, None);
        assert_eq!(settings.sync_interval_minutes, 15);
        assert_eq!(settings.sync_interval(), Duration::from_secs(900));
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.output_dir, PathBuf::from("/app/output"));
        assert_eq!(settings.exporter_bin, "timetree-exporter");
        assert!(settings.status_endpoint_enabled);
        assert!(settings.file_endpoint_enabled);
    }

    #[test]
    fn test_settings_from_vars() {
        let settings = Settings::from_vars(vars(&[
            ("TIMETREE_EMAIL", "me@example.com"),
            ("TIMETREE_PASSWORD", "secret"),
            ("SYNC_INTERVAL_MINUTES", "5"),
            ("PORT", "9000"),
            ("OUTPUT_DIR", "/data"),
            ("EXPORTER_BIN", "/usr/local/bin/timetree-exporter"),
            ("FILE_ENDPOINT_ENABLED", "off"),
        ]))
        .unwrap();

        assert_eq!(settings.email.as_deref(), Some("me@example.com"));
        assert_eq!(settings.password.as_deref(), Some("secret"));
        assert_eq!(settings.sync_interval_minutes, 5);
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.artifact_path("FAMILY"), PathBuf::from("/data/FAMILY.ics"));
        assert_eq!(settings.staging_path("FAMILY"), PathBuf::from("/data/FAMILY.ics.tmp"));
        assert_eq!(settings.exporter_bin, "/usr/local/bin/timetree-exporter");
        assert!(settings.status_endpoint_enabled);
        assert!(!settings.file_endpoint_enabled);
    }

    #[test]
    fn test_blank_credentials_are_unset() {
        let settings = Settings::from_vars(vars(&[("TIMETREE_EMAIL", "  ")])).unwrap();
        assert_eq!(settings.email, None);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(Settings::from_vars(vars(&[("SYNC_INTERVAL_MINUTES", "soon")])).is_err());
        assert!(Settings::from_vars(vars(&[("SYNC_INTERVAL_MINUTES", "0")])).is_err());
        assert!(Settings::from_vars(vars(&[("PORT", "70000")])).is_err());
        assert!(Settings::from_vars(vars(&[("STATUS_ENDPOINT_ENABLED", "maybe")])).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = Settings::from_vars(vars(&[("TIMETREE_PASSWORD", "hunter2")])).unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
