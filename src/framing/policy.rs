//! Framing policies: the hook the tokenizer consults at every tag boundary.
//!
//! A policy never touches tokenizer state directly. It answers with a
//! [`PolicyAction`] and the tokenizer applies it, which keeps nesting
//! arithmetic in one place.

use tracing::debug;

use super::error::FramingError;
use super::events::StartTag;

/// Namespace bound to the stream prefix on the XMPP root element.
pub const STREAMS_NS: &str = "http://etherx.jabber.org/streams";

/// Largest in-progress stanza accepted by [`XmppPolicy::default`], in UTF-16
/// code units.
pub const DEFAULT_MAX_STANZA_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAction {
    /// Ordinary nesting arithmetic.
    Continue,
    /// Emit the unit buffer as a complete element right now and leave nesting at 0.
    FlushAsStandaloneUnit,
    /// Set nesting to 0 without emitting anything.
    ResetNestingToZero,
    /// Abort the stream.
    Fatal(FramingError),
}

pub trait FramingPolicy {
    /// Called once a start tag is fully read. `depth` is the nesting level the
    /// tag opens at (0 for a top-level element).
    fn on_start_tag(&mut self, _tag: &StartTag, _depth: usize) -> PolicyAction {
        PolicyAction::Continue
    }

    /// Called once an end tag (or the synthetic end of `<x/>`) is read, before
    /// depth is decremented.
    fn on_end_tag(&mut self, _qualified_name: &str, _depth: usize) -> PolicyAction {
        PolicyAction::Continue
    }

    /// Called whenever the unit buffer grows; `len` is its size in code units.
    fn on_unit_growth(&mut self, _len: usize) -> PolicyAction {
        PolicyAction::Continue
    }

    /// Forget per-stream state.
    fn reset(&mut self) {}
}

/// Plain XML framing: every top-level element is one unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericPolicy {
    max_unit_size: Option<usize>,
}

impl GenericPolicy {
    /// Abort once an in-progress unit exceeds `max_unit_size` code units.
    pub fn with_limit(max_unit_size: usize) -> Self {
        GenericPolicy {
            max_unit_size: Some(max_unit_size),
        }
    }

    pub fn max_unit_size(&self) -> Option<usize> {
        self.max_unit_size
    }
}

impl FramingPolicy for GenericPolicy {
    fn on_unit_growth(&mut self, len: usize) -> PolicyAction {
        size_guard(self.max_unit_size, len)
    }
}

fn size_guard(limit: Option<usize>, len: usize) -> PolicyAction {
    match limit {
        Some(limit) if len > limit => {
            debug!(buffered = len, limit, "Unit exceeded size limit");
            PolicyAction::Fatal(FramingError::SizeExceeded { limit, len })
        }
        _ => PolicyAction::Continue,
    }
}

/// XMPP framing: `<stream:stream>` and `</stream:stream>` are units of their
/// own, stanzas between them are top-level units.
#[derive(Debug, Clone)]
pub struct XmppPolicy {
    stream_name: Option<String>,
    max_stanza_size: usize,
}

impl Default for XmppPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STANZA_SIZE)
    }
}

impl XmppPolicy {
    pub fn new(max_stanza_size: usize) -> Self {
        XmppPolicy {
            stream_name: None,
            max_stanza_size,
        }
    }

    /// Qualified name of the open stream root, e.g. `stream:stream`.
    pub fn stream_name(&self) -> Option<&str> {
        self.stream_name.as_deref()
    }

    pub fn is_stream_open(&self) -> bool {
        self.stream_name.is_some()
    }

    pub fn max_stanza_size(&self) -> usize {
        self.max_stanza_size
    }

    fn is_stream_root(tag: &StartTag) -> bool {
        if tag.local_name != "stream" {
            return false;
        }
        let declared = if tag.prefix.is_empty() {
            tag.attribute("xmlns")
        } else {
            tag.attribute(&format!("xmlns:{}", tag.prefix))
        };
        declared == Some(STREAMS_NS)
    }
}

impl FramingPolicy for XmppPolicy {
    fn on_start_tag(&mut self, tag: &StartTag, depth: usize) -> PolicyAction {
        if depth != 0 || !Self::is_stream_root(tag) {
            return PolicyAction::Continue;
        }
        let name = tag.qualified_name();
        debug!(
            stream = %name,
            to = tag.attribute("to").unwrap_or(""),
            from = tag.attribute("from").unwrap_or(""),
            id = tag.attribute("id").unwrap_or(""),
            "XMPP stream opened"
        );
        self.stream_name = Some(name);
        PolicyAction::FlushAsStandaloneUnit
    }

    fn on_end_tag(&mut self, qualified_name: &str, depth: usize) -> PolicyAction {
        if depth == 0 && self.stream_name.as_deref() == Some(qualified_name) {
            debug!(stream = %qualified_name, "XMPP stream closed");
            self.stream_name = None;
            return PolicyAction::FlushAsStandaloneUnit;
        }
        PolicyAction::Continue
    }

    fn on_unit_growth(&mut self, len: usize) -> PolicyAction {
        size_guard(Some(self.max_stanza_size), len)
    }

    fn reset(&mut self) {
        self.stream_name = None;
    }
}
