//! Core data model: tags, resources, entities

use crate::attribute::{comma_list, split_attributes};
use crate::bufpool;
use crate::duration::parse_duration;
use crate::error::{EsiError, Result};
use crate::template::{is_templated, Condition, Template};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HOST};
use std::fmt::Write as _;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// A tag's byte range in the source stream, and the payload that replaces
/// it. `end` is exclusive and points one byte past the closing `/>`.
/// `data` stays empty until the query engine populates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub start: usize,
    pub end: usize,
    pub data: Bytes,
}

/// One backend candidate for an include. Candidates are tried in `index`
/// order until one succeeds.
///
/// A source containing `://` is a URL; with a `{{` marker it is compiled
/// into `url_template` and `url` is cleared. A non-URL source names a key
/// in the key-value backend and stays in `url` with `is_url == false`.
#[derive(Debug)]
pub struct Resource {
    pub index: usize,
    pub url: String,
    pub url_template: Option<Template>,
    pub is_url: bool,
}

impl Resource {
    fn parse(index: usize, value: &str) -> Result<Self> {
        let is_url = value.contains("://");
        if is_url && is_templated(value) {
            return Ok(Resource {
                index,
                url: String::new(),
                url_template: Some(Template::compile(value)?),
                is_url,
            });
        }
        Ok(Resource {
            index,
            url: value.to_string(),
            url_template: None,
            is_url,
        })
    }
}

/// One fully parsed `<esi:include …/>` occurrence.
#[derive(Debug, Default)]
pub struct Entity {
    /// Attribute payload as seen in the stream, without the `<esi:`
    /// envelope. Kept for diagnostics.
    pub raw_tag: Vec<u8>,
    pub tag: Tag,
    pub resources: Vec<Resource>,
    pub ttl: Option<Duration>,
    pub timeout: Option<Duration>,
    pub on_error: Option<String>,
    pub forward_headers: Vec<String>,
    pub forward_headers_all: bool,
    pub return_headers: Vec<String>,
    pub return_headers_all: bool,
    /// Key in the key-value backend. Cleared when the value carried a
    /// template marker; `key_template` is set instead.
    pub key: Option<String>,
    pub key_template: Option<Template>,
    pub condition: Option<Condition>,
}

impl Entity {
    /// Create an unparsed entity from a scanner record.
    pub fn new(raw_tag: Vec<u8>, start: usize, end: usize) -> Self {
        Entity {
            raw_tag,
            tag: Tag {
                start,
                end,
                data: Bytes::new(),
            },
            ..Entity::default()
        }
    }

    /// Parse the raw tag body and fill the remaining fields.
    pub fn parse_raw(&mut self) -> Result<()> {
        if self.raw_tag.is_empty() {
            return Ok(());
        }
        let raw = String::from_utf8_lossy(&self.raw_tag).into_owned();
        let matches = split_attributes(&raw)?;

        let mut src_count = 0;
        for pair in matches.chunks_exact(2) {
            let (attr, value) = (pair[0].as_str(), pair[1].as_str());
            match attr {
                "src" => {
                    self.resources.push(Resource::parse(src_count, value)?);
                    src_count += 1;
                }
                "key" => {
                    if is_templated(value) {
                        self.key_template = Some(Template::compile(value)?);
                        self.key = None;
                    } else {
                        self.key = Some(value.to_string());
                    }
                }
                "condition" => {
                    self.condition = Some(Condition::compile(value)?);
                }
                "onerror" => {
                    self.on_error = Some(value.to_string());
                }
                "timeout" => {
                    let timeout =
                        parse_duration(value).map_err(|e| EsiError::InvalidDuration {
                            attribute: "timeout",
                            value: value.to_string(),
                            reason: e.reason.to_string(),
                        })?;
                    if timeout.is_zero() {
                        return Err(EsiError::InvalidDuration {
                            attribute: "timeout",
                            value: value.to_string(),
                            reason: "must be positive".to_string(),
                        });
                    }
                    self.timeout = Some(timeout);
                }
                "ttl" => {
                    self.ttl =
                        Some(parse_duration(value).map_err(|e| EsiError::InvalidDuration {
                            attribute: "ttl",
                            value: value.to_string(),
                            reason: e.reason.to_string(),
                        })?);
                }
                "forwardheaders" => {
                    if value == "all" {
                        self.forward_headers_all = true;
                    } else {
                        self.forward_headers = comma_list(value);
                    }
                }
                "returnheaders" => {
                    if value == "all" {
                        self.return_headers_all = true;
                    } else {
                        self.return_headers = comma_list(value);
                    }
                }
                // attributes starting with x are disabled on purpose
                name if name.starts_with('x') => {}
                _ => {
                    return Err(EsiError::UnsupportedAttribute {
                        name: attr.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }

        if self.resources.is_empty() || src_count == 0 {
            return Err(EsiError::EmptySrc { raw_tag: raw });
        }
        Ok(())
    }

    /// The per-fetch timeout, falling back to the configured default.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    /// Select the request headers forwarded to this entity's backends.
    /// `Host` is never forwarded; the client owns the outgoing authority.
    pub fn forwarded_headers(&self, req_headers: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();
        if self.forward_headers_all {
            for (name, value) in req_headers.iter() {
                if name != &HOST {
                    out.append(name.clone(), value.clone());
                }
            }
            return out;
        }
        for name in &self.forward_headers {
            let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in req_headers.get_all(&header_name) {
                out.append(header_name.clone(), value.clone());
            }
        }
        out
    }

    /// The raw tag body as text, for diagnostics.
    pub fn raw_tag_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_tag).into_owned()
    }
}

/// The ordered list of entities found on one page. Constructed once per
/// HTML response, queried once, then discarded.
#[derive(Debug, Default)]
pub struct Entities(pub Vec<Entity>);

impl Deref for Entities {
    type Target = Vec<Entity>;

    fn deref(&self) -> &Vec<Entity> {
        &self.0
    }
}

impl DerefMut for Entities {
    fn deref_mut(&mut self) -> &mut Vec<Entity> {
        &mut self.0
    }
}

impl Entities {
    /// Parse every raw tag body.
    pub fn parse_raw(&mut self) -> Result<()> {
        for entity in self.0.iter_mut() {
            entity.parse_raw()?;
        }
        Ok(())
    }

    /// Render a multi-line summary of the parsed entities for log output.
    pub fn debug_report(&self) -> String {
        let mut buf = bufpool::get_string();
        for (i, e) in self.0.iter().enumerate() {
            let _ = writeln!(
                buf,
                "{}: [{}, {}) resources={} timeout={:?} ttl={:?} onerror={:?} key={:?}",
                i,
                e.tag.start,
                e.tag.end,
                e.resources.len(),
                e.timeout,
                e.ttl,
                e.on_error,
                e.key,
            );
            let _ = writeln!(buf, "{}: raw: {:?}", i, e.raw_tag_text());
        }
        buf.as_str().to_owned()
    }
}
