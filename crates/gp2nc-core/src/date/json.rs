use serde::{Deserialize, Deserializer};

use super::{bucket_for_timestamp, Bucket};

/// The subset of a Google Photos JSON sidecar that matters for dating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarMetadata {
    /// File name of the media this sidecar describes (same directory)
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub photo_taken_time: TimeData,
    #[serde(default)]
    pub creation_time: TimeData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TimeData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub timestamp: String,
}

/// Takeout writes timestamps as strings, but some tools rewrite them as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

impl SidecarMetadata {
    pub fn parse(json_bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(json_bytes)
    }

    /// `photoTakenTime` if it parses, otherwise `creationTime`.
    pub fn bucket(&self) -> Option<Bucket> {
        bucket_for_timestamp(&self.photo_taken_time.timestamp)
            .or_else(|| bucket_for_timestamp(&self.creation_time.timestamp))
    }
}
