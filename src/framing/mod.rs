mod config;
mod decoder;
mod error;
mod events;
mod policy;
mod reader;
mod tokenizer;

pub use config::{FramerConfig, DEFAULT_READ_CHUNK_SIZE};
pub use decoder::{Utf8Decoder, DEFAULT_BUFFER_CAPACITY};
pub use error::{FramingError, ReadError, Result};
pub use events::{split_qualified_name, Event, EventCollector, StanzaHandler, StartTag};
pub use policy::{
    FramingPolicy, GenericPolicy, PolicyAction, XmppPolicy, DEFAULT_MAX_STANZA_SIZE, STREAMS_NS,
};
pub use reader::StanzaReader;
pub use tokenizer::{ParserState, Tokenizer};

use std::io::IoSlice;

/// Decoder and tokenizer for one connection.
///
/// Bytes go in, complete elements come out through the handler passed to
/// each call. Errors are fatal: after one, every further call fails the same way.
pub struct StreamFramer<P> {
    decoder: Utf8Decoder,
    tokenizer: Tokenizer<P>,
}

impl StreamFramer<XmppPolicy> {
    pub fn xmpp(config: &FramerConfig) -> Self {
        Self::new(XmppPolicy::new(config.max_stanza_size), config)
    }
}

impl StreamFramer<GenericPolicy> {
    pub fn generic(config: &FramerConfig) -> Self {
        Self::new(GenericPolicy::with_limit(config.max_stanza_size), config)
    }
}

impl<P: FramingPolicy> StreamFramer<P> {
    pub fn new(policy: P, config: &FramerConfig) -> Self {
        StreamFramer {
            decoder: Utf8Decoder::with_capacity(config.initial_capacity),
            tokenizer: Tokenizer::with_capacity(policy, config.initial_capacity),
        }
    }

    pub fn feed<H: StanzaHandler>(&mut self, bytes: &[u8], handler: &mut H) -> Result<()> {
        self.decoder.feed(bytes, &mut self.tokenizer, handler)
    }

    pub fn feed_vectored<H: StanzaHandler>(&mut self, chunks: &[IoSlice<'_>], handler: &mut H) -> Result<()> {
        self.decoder.feed_vectored(chunks, &mut self.tokenizer, handler)
    }

    /// Declare end of input: no partial character, tag or element may remain.
    pub fn finish(&mut self) -> Result<()> {
        self.decoder.finish()?;
        self.tokenizer.finish()
    }

    /// Start over for a new stream on the same connection (after STARTTLS or
    /// SASL success the XMPP stream restarts from a fresh header).
    pub fn reset_stream(&mut self) {
        self.decoder.reset_buffer(self.decoder.capacity());
        self.tokenizer.reset();
    }

    pub fn tokenizer(&self) -> &Tokenizer<P> {
        &self.tokenizer
    }

    pub fn decoder_mut(&mut self) -> &mut Utf8Decoder {
        &mut self.decoder
    }

    pub fn policy(&self) -> &P {
        self.tokenizer.policy()
    }
}
