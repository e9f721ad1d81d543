//! Error types for the ESI fragment core

use thiserror::Error;

/// Result type alias for ESI operations
pub type Result<T> = std::result::Result<T, EsiError>;

/// Error types that can occur while scanning, parsing, or querying ESI tags
#[derive(Error, Debug)]
pub enum EsiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scanner read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Imbalanced attributes in {0:?}")]
    ImbalancedAttributes(Vec<String>),

    #[error("Cannot parse duration in {attribute}: {value:?}: {reason}")]
    InvalidDuration {
        attribute: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unsupported attribute name {name:?} with value {value:?}")]
    UnsupportedAttribute { name: String, value: String },

    #[error("Missing src attribute in tag {raw_tag:?}: at least one resource is required")]
    EmptySrc { raw_tag: String },

    #[error("Failed to compile template {source_text:?}: {reason}")]
    TemplateCompile { source_text: String, reason: String },

    #[error("Resource fetch failed for {url:?}: {reason}")]
    ResourceFetch { url: String, reason: String },

    #[error("Resource fetch failed in tag {raw_tag:?}: {source}")]
    EntityFailed {
        raw_tag: String,
        #[source]
        source: Box<EsiError>,
    },

    #[error("Request scope canceled")]
    Canceled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EsiError {
    /// True when this error is a cancellation, either direct or wrapped
    /// inside an entity failure. The query engine drops these in favor of
    /// the first real failure.
    pub fn is_canceled(&self) -> bool {
        match self {
            EsiError::Canceled => true,
            EsiError::EntityFailed { source, .. } => source.is_canceled(),
            _ => false,
        }
    }

    /// True for errors produced while parsing a page, as opposed to errors
    /// from querying its resources. The host handler typically reacts to a
    /// parse error by passing the original HTML through untouched.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            EsiError::ImbalancedAttributes(_)
                | EsiError::InvalidDuration { .. }
                | EsiError::UnsupportedAttribute { .. }
                | EsiError::EmptySrc { .. }
                | EsiError::TemplateCompile { .. }
        )
    }

    /// Create a fetch error from an HTTP status code.
    pub fn from_http_status(url: impl Into<String>, status: u16) -> Self {
        EsiError::ResourceFetch {
            url: url.into(),
            reason: format!("unexpected status {}", status),
        }
    }
}
