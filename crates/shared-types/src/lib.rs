use serde::{Deserialize, Serialize};

/// Status marker reported by a live service.
pub const STATUS_RUNNING: &str = "running";

/// File extension of every published calendar artifact.
pub const ICS_EXTENSION: &str = "ics";

/// One TimeTree calendar exported on behalf of one Google calendar.
///
/// `name` is the environment key the mapping was read from and doubles as
/// the file stem of the published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub name: String,
    pub source_id: String,
    pub destination_id: String,
}

impl Mapping {
    pub fn new(
        name: impl Into<String>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
        }
    }

    /// File name the artifact for this unit is published under
    pub fn artifact_file_name(&self) -> String {
        artifact_file_name(&self.name)
    }
}

/// `UNIT_A` -> `UNIT_A.ics`
pub fn artifact_file_name(unit: &str) -> String {
    format!("{}.{}", unit, ICS_EXTENSION)
}

/// Inverse of [`artifact_file_name`]; `None` when the suffix is missing or
/// the stem is empty.
pub fn unit_from_file_name(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(ICS_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Body of `GET /`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub sync_interval_minutes: u64,
    pub units: Vec<Mapping>,
}

impl StatusResponse {
    pub fn running(sync_interval_minutes: u64, units: Vec<Mapping>) -> Self {
        Self {
            status: STATUS_RUNNING.to_string(),
            sync_interval_minutes,
            units,
        }
    }
}

/// API error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
