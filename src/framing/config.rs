use serde::Deserialize;

use super::decoder::DEFAULT_BUFFER_CAPACITY;
use super::policy::DEFAULT_MAX_STANZA_SIZE;

/// Read size used by [`StanzaReader`](super::StanzaReader), matching the proxy's TLS read buffer.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8192;

/// Per-connection framing settings.
///
/// Every field is optional in JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FramerConfig {
    /// Initial capacity of the decode and unit buffers, in UTF-16 code units.
    pub initial_capacity: usize,
    /// Largest in-progress stanza accepted before the stream is aborted, in
    /// UTF-16 code units.
    pub max_stanza_size: usize,
    /// Bytes requested per read by the async reader.
    pub read_chunk_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        FramerConfig {
            initial_capacity: DEFAULT_BUFFER_CAPACITY,
            max_stanza_size: DEFAULT_MAX_STANZA_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl FramerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
