//! Async adapter: pulls bytes from a tokio reader and yields stanzas.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use super::config::FramerConfig;
use super::error::ReadError;
use super::events::StanzaHandler;
use super::policy::{FramingPolicy, XmppPolicy};
use super::StreamFramer;

impl StanzaHandler for VecDeque<String> {
    fn on_complete_element(&mut self, text: &str) {
        self.push_back(text.to_string());
    }
}

/// Reads an XMPP byte stream (TCP or TLS) and returns one stanza at a time.
///
/// The stream header and `</stream:stream>` are returned as stanzas of their own.
pub struct StanzaReader<R, P = XmppPolicy> {
    reader: R,
    framer: StreamFramer<P>,
    read_buf: Vec<u8>,
    ready: VecDeque<String>,
    /// Reported once `ready` has drained.
    failed: Option<ReadError>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> StanzaReader<R, XmppPolicy> {
    pub fn new(reader: R, config: &FramerConfig) -> Self {
        Self::with_framer(reader, StreamFramer::xmpp(config), config.read_chunk_size)
    }
}

impl<R: AsyncRead + Unpin, P: FramingPolicy> StanzaReader<R, P> {
    pub fn with_framer(reader: R, framer: StreamFramer<P>, read_chunk_size: usize) -> Self {
        StanzaReader {
            reader,
            framer,
            read_buf: vec![0; read_chunk_size.max(1)],
            ready: VecDeque::new(),
            failed: None,
            eof: false,
        }
    }

    /// Next complete stanza, or `None` once the peer closed the connection
    /// cleanly between stanzas.
    ///
    /// Stanzas completed before a framing or I/O error are still returned;
    /// the error follows them and is then repeated on every call.
    pub async fn next_stanza(&mut self) -> Result<Option<String>, ReadError> {
        loop {
            if let Some(stanza) = self.ready.pop_front() {
                return Ok(Some(stanza));
            }
            if let Some(err) = &self.failed {
                return Err(err.clone());
            }
            if self.eof {
                return Ok(None);
            }

            let n = match self.reader.read(&mut self.read_buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.failed = Some(ReadError::from(e));
                    continue;
                }
            };
            let result = if n == 0 {
                info!("Stream closed by peer");
                self.eof = true;
                self.framer.finish()
            } else {
                debug!(bytes = n, "Received from stream");
                self.framer.feed(&self.read_buf[..n], &mut self.ready)
            };
            if let Err(e) = result {
                self.failed = Some(ReadError::Framing(e));
            }
        }
    }

    pub fn framer(&self) -> &StreamFramer<P> {
        &self.framer
    }

    pub fn framer_mut(&mut self) -> &mut StreamFramer<P> {
        &mut self.framer
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
