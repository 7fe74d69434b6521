use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Reference to a local file that accompanies a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// File name presented to the ingestion service.
    pub name: String,
    /// Location of the file on this device.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// The report body submitted to the ingestion service.
///
/// Report fields (title, description, coordinates, ...) are carried as an open
/// JSON object and never interpreted here. Only `attachments` is typed, because
/// the sync engine uploads them after the report itself is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ReportPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a payload from a JSON object. Returns `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
