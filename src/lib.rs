//! Stanza framing for XMPP byte streams.
//!
//! A TCP (or TLS) XMPP connection carries one long XML document whose root,
//! `<stream:stream>`, stays open for the whole session. Before any stanza can
//! be parsed it has to be cut out of that stream, and reads arrive in arbitrary
//! chunks that may split tags, attribute values or even multi-byte characters.
//!
//! [`framing::StreamFramer`] does that cutting in a single pass: a UTF-8 decoder
//! resumes partial sequences across reads and feeds a resumable tokenizer,
//! which reports every top-level element with its exact literal text.
//!
//! ```
//! use fluux_framing::framing::{EventCollector, FramerConfig, StreamFramer};
//!
//! let mut framer = StreamFramer::xmpp(&FramerConfig::default());
//! let mut stanzas = EventCollector::new();
//! framer.feed(b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams'>", &mut stanzas)?;
//! framer.feed(b"<presence/><message><body>hi</bo", &mut stanzas)?;
//! framer.feed(b"dy></message>", &mut stanzas)?;
//! assert_eq!(stanzas.stanzas().len(), 3);
//! # Ok::<(), fluux_framing::framing::FramingError>(())
//! ```

pub mod framing;
