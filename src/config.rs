// Missing JSON fields keep their defaults.

use miniserde::{json, Deserialize, Serialize};
use simple_error::SimpleResult;

use crate::error::IntoSimpleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Header names stripped in addition to the fixed host-managed set.
    pub extra_stripped_headers: Vec<String>,
    /// Log a warning the first time a streaming request cannot be streamed.
    pub warn_on_streaming_fallback: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            extra_stripped_headers: Vec::new(),
            warn_on_streaming_fallback: true,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawConfig {
    extra_stripped_headers: Option<Vec<String>>,
    warn_on_streaming_fallback: Option<bool>,
}

impl TransportConfig {
    pub fn from_json(json: &str) -> SimpleResult<Self> {
        let raw: RawConfig = json::from_str(json).into_simple_error()?;
        let defaults = Self::default();
        Ok(Self {
            extra_stripped_headers: raw
                .extra_stripped_headers
                .unwrap_or(defaults.extra_stripped_headers)
                .into_iter()
                .map(|name| name.trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
            warn_on_streaming_fallback: raw
                .warn_on_streaming_fallback
                .unwrap_or(defaults.warn_on_streaming_fallback),
        })
    }

    pub fn to_json(&self) -> String {
        json::to_string(&RawConfig {
            extra_stripped_headers: Some(self.extra_stripped_headers.clone()),
            warn_on_streaming_fallback: Some(self.warn_on_streaming_fallback),
        })
    }

    pub fn with_stripped_header(mut self, name: impl Into<String>) -> Self {
        self.extra_stripped_headers
            .push(name.into().to_ascii_lowercase());
        self
    }
}
