//! Streaming ESI tag scanner
//!
//! Locates every `<esi:…/>` range in a byte stream with exact absolute
//! offsets. The stream is consumed in fixed-size chunks through an
//! incremental state machine, so a tag straddling any number of chunk
//! boundaries is still matched once. NUL bytes inside a tag are data, not
//! terminators. An opening left unterminated at end of stream is dropped
//! without failing the page.

use crate::bufpool;
use crate::config::EsiConfig;
use crate::entity::{Entities, Entity};
use crate::error::Result;
use std::io::Read;
use tracing::debug;

const OPEN: &[u8] = b"<esi:";

/// One raw tag located in the stream. `body` is the bytes between the end
/// of `<esi:` and the start of `/>`; `start` points at the `<`, `end` one
/// past the `>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    pub body: Vec<u8>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
enum State {
    /// Between tags, `matched` bytes of the `<esi:` opening seen so far.
    Outside { matched: usize },
    /// Inside a tag body.
    Inside {
        start: usize,
        body: Vec<u8>,
        quote: Option<u8>,
        /// A `/` seen outside any quoted region; the next byte decides
        /// whether it begins the `/>` terminator.
        pending_slash: bool,
    },
}

/// Incremental tag locator. Feed it chunks in stream order; it emits
/// complete `RawTag` records as their terminators arrive.
#[derive(Debug)]
pub struct TagFinder {
    state: State,
    pos: usize,
    max_tag_size: usize,
}

impl TagFinder {
    pub fn new(max_tag_size: usize) -> Self {
        TagFinder {
            state: State::Outside { matched: 0 },
            pos: 0,
            max_tag_size,
        }
    }

    /// Absolute position of the next byte to be fed.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Consume one chunk, appending completed tags to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<RawTag>) {
        for &b in chunk {
            self.step(b, out);
            self.pos += 1;
        }
    }

    /// Finish the stream. An opening still unmatched here is discarded;
    /// malformed trailing tags never fail the page.
    pub fn finish(&mut self) {
        if let State::Inside { start, .. } = &self.state {
            debug!(start = *start, "dropping unterminated tag at end of stream");
        }
        self.state = State::Outside { matched: 0 };
    }

    fn step(&mut self, b: u8, out: &mut Vec<RawTag>) {
        match &mut self.state {
            State::Outside { matched } => {
                if b == OPEN[*matched] {
                    *matched += 1;
                    if *matched == OPEN.len() {
                        self.state = State::Inside {
                            start: self.pos + 1 - OPEN.len(),
                            body: Vec::new(),
                            quote: None,
                            pending_slash: false,
                        };
                    }
                } else if b == OPEN[0] {
                    *matched = 1;
                } else {
                    *matched = 0;
                }
            }
            State::Inside {
                start,
                body,
                quote,
                pending_slash,
            } => {
                if *pending_slash {
                    *pending_slash = false;
                    if b == b'>' {
                        out.push(RawTag {
                            body: std::mem::take(body),
                            start: *start,
                            end: self.pos + 1,
                        });
                        self.state = State::Outside { matched: 0 };
                        return;
                    }
                    body.push(b'/');
                }

                match *quote {
                    Some(q) => {
                        if b == q {
                            *quote = None;
                        }
                        body.push(b);
                    }
                    None => match b {
                        b'/' => {
                            *pending_slash = true;
                            return;
                        }
                        b'"' | b'\'' => {
                            *quote = Some(b);
                            body.push(b);
                        }
                        _ => body.push(b),
                    },
                }

                if body.len() > self.max_tag_size {
                    debug!(
                        start = *start,
                        max = self.max_tag_size,
                        "discarding tag exceeding max_tag_size"
                    );
                    self.state = State::Outside { matched: 0 };
                }
            }
        }
    }
}

/// Scan a stream for raw tags using the given chunk and tag size limits.
pub fn scan<R: Read>(mut input: R, config: &EsiConfig) -> Result<Vec<RawTag>> {
    let mut finder = TagFinder::new(config.max_tag_size);
    let mut tags = Vec::new();
    let mut buf = bufpool::get_buf(config.scan_buffer_size);

    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        finder.feed(&buf[..n], &mut tags);
    }
    finder.finish();
    Ok(tags)
}

/// Build entities from scanner records and parse every attribute set.
pub(crate) fn build_entities(raw_tags: Vec<RawTag>) -> Result<Entities> {
    let mut entities = Entities(
        raw_tags
            .into_iter()
            .map(|t| Entity::new(t.body, t.start, t.end))
            .collect(),
    );
    entities.parse_raw()?;
    Ok(entities)
}

/// Parse a stream into entities: scan for tags, then split and build each
/// attribute set. This is the composed entry point the host middleware
/// calls once per HTML response. [`crate::QueryEngine::parse`] is the
/// same composition with page counters recorded.
pub fn parse<R: Read>(input: R, config: &EsiConfig) -> Result<Entities> {
    build_entities(scan(input, config)?)
}
