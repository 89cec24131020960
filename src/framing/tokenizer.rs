//! Resumable single-pass XML tokenizer.
//!
//! The tokenizer consumes UTF-16 code units one at a time and never looks
//! ahead, so feeding the same text in any chunking produces the same events.
//! It only understands as much XML as is needed to find element boundaries:
//! tags, quoted attribute values and `<?...?>` constructs. Every unit consumed
//! is also appended to the unit buffer, whose content is handed out verbatim
//! when nesting returns to zero.

use tracing::{trace, warn};

use super::error::{FramingError, Result};
use super::events::{StanzaHandler, StartTag};
use super::policy::{FramingPolicy, PolicyAction};

const LT: u16 = b'<' as u16;
const GT: u16 = b'>' as u16;
const SLASH: u16 = b'/' as u16;
const QUESTION: u16 = b'?' as u16;
const BANG: u16 = b'!' as u16;
const EQUALS: u16 = b'=' as u16;
const APOS: u16 = b'\'' as u16;
const QUOT: u16 = b'"' as u16;

fn is_whitespace(unit: u16) -> bool {
    matches!(unit, 0x20 | 0x09 | 0x0A | 0x0D)
}

/// Where the tokenizer is inside the markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Text content, or between top-level units.
    Start,
    /// Just read `<`.
    AfterOpenBracket,
    InTagName,
    /// Reading the name after `</`.
    InEndTag,
    /// Inside a start tag, between the name or an attribute and the next token.
    AfterStartName,
    /// Read the `/` of `<x/>`; only `>` may follow.
    InEmptyTag,
    InAttributeName,
    AfterAttributeEquals,
    InAttributeValue,
    /// Just read the closing quote; whitespace, `/` or `>` must follow.
    AfterAttributeValue,
    /// Inside `<?...`.
    InPiOrDecl,
    /// Inside a quoted pseudo-attribute of `<?...?>`.
    InPiOrDeclPseudoAttrValue,
    /// Read a `?` inside `<?...`; `>` completes the construct.
    InPiOrDeclQuestionMark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Apos,
    Quot,
}

impl Quote {
    fn from_unit(unit: u16) -> Option<Quote> {
        match unit {
            APOS => Some(Quote::Apos),
            QUOT => Some(Quote::Quot),
            _ => None,
        }
    }

    fn unit(self) -> u16 {
        match self {
            Quote::Apos => APOS,
            Quote::Quot => QUOT,
        }
    }
}

/// Character-driven tokenizer parameterized by a [`FramingPolicy`].
///
/// One instance belongs to one stream; it is not meant to be shared.
pub struct Tokenizer<P> {
    policy: P,
    state: ParserState,
    depth: usize,
    /// Name or attribute currently being read.
    token: Vec<u16>,
    /// Everything since the last flush.
    unit: Vec<u16>,
    /// Offset in `unit` of the `<` that opened the current construct.
    markup_start: usize,
    tag_name: String,
    attr_name: String,
    attributes: Vec<(String, String)>,
    quote: Quote,
    failed: Option<FramingError>,
}

impl<P: FramingPolicy> Tokenizer<P> {
    pub fn new(policy: P) -> Self {
        Self::with_capacity(policy, 0)
    }

    /// `capacity` is a hint for the unit buffer, in code units.
    pub fn with_capacity(policy: P, capacity: usize) -> Self {
        Tokenizer {
            policy,
            state: ParserState::Start,
            depth: 0,
            token: Vec::with_capacity(64),
            unit: Vec::with_capacity(capacity),
            markup_start: 0,
            tag_name: String::new(),
            attr_name: String::new(),
            attributes: Vec::new(),
            quote: Quote::Apos,
            failed: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Code units buffered for the unit in progress.
    pub fn buffered_len(&self) -> usize {
        self.unit.len()
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Feed UTF-16 code units.
    pub fn feed<H: StanzaHandler>(&mut self, units: &[u16], handler: &mut H) -> Result<()> {
        self.feed_units(units.iter().copied(), handler)
    }

    /// Feed text; it is tokenized exactly as its UTF-16 encoding would be.
    pub fn feed_str<H: StanzaHandler>(&mut self, text: &str, handler: &mut H) -> Result<()> {
        self.feed_units(text.encode_utf16(), handler)
    }

    fn feed_units<H, I>(&mut self, units: I, handler: &mut H) -> Result<()>
    where
        H: StanzaHandler,
        I: IntoIterator<Item = u16>,
    {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        for unit in units {
            self.step(unit, handler)?;
        }
        Ok(())
    }

    /// Declare end of input. Fails if a unit is still in progress.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.state != ParserState::Start {
            return Err(self.fail(FramingError::MalformedMarkup("input ended inside markup")));
        }
        if self.depth > 0 {
            return Err(self.fail(FramingError::MalformedMarkup("input ended inside an element")));
        }
        if self.unit.iter().any(|&u| !is_whitespace(u)) {
            return Err(self.fail(FramingError::MalformedMarkup("input ended inside an unfinished unit")));
        }
        self.unit.clear();
        Ok(())
    }

    /// Return to the initial state, keeping buffer capacity.
    pub fn reset(&mut self) {
        self.state = ParserState::Start;
        self.depth = 0;
        self.token.clear();
        self.unit.clear();
        self.markup_start = 0;
        self.tag_name.clear();
        self.attr_name.clear();
        self.attributes.clear();
        self.failed = None;
        self.policy.reset();
    }

    fn step<H: StanzaHandler>(&mut self, unit: u16, handler: &mut H) -> Result<()> {
        self.unit.push(unit);
        if let PolicyAction::Fatal(err) = self.policy.on_unit_growth(self.unit.len()) {
            return Err(self.fail(err));
        }

        match self.state {
            ParserState::Start => {
                if unit == LT {
                    self.markup_start = self.unit.len() - 1;
                    self.state = ParserState::AfterOpenBracket;
                }
            }
            ParserState::AfterOpenBracket => match unit {
                SLASH => {
                    self.token.clear();
                    self.state = ParserState::InEndTag;
                }
                QUESTION => self.state = ParserState::InPiOrDecl,
                BANG => {
                    return Err(self.fail(FramingError::UnsupportedConstruct(
                        "comments, CDATA sections and DTDs are not allowed",
                    )))
                }
                LT | GT => {
                    return Err(self.fail(FramingError::MalformedMarkup("expected element name after '<'")))
                }
                u if is_whitespace(u) => {
                    return Err(self.fail(FramingError::MalformedMarkup("expected element name after '<'")))
                }
                _ => {
                    self.token.clear();
                    self.token.push(unit);
                    self.state = ParserState::InTagName;
                }
            },
            ParserState::InTagName => match unit {
                SLASH => {
                    self.tag_name = self.take_token()?;
                    self.state = ParserState::InEmptyTag;
                }
                GT => {
                    self.tag_name = self.take_token()?;
                    self.state = ParserState::Start;
                    self.finish_start_tag(handler)?;
                }
                u if is_whitespace(u) => {
                    self.tag_name = self.take_token()?;
                    self.state = ParserState::AfterStartName;
                }
                _ => self.token.push(unit),
            },
            ParserState::AfterStartName => match unit {
                SLASH => self.state = ParserState::InEmptyTag,
                GT => {
                    self.state = ParserState::Start;
                    self.finish_start_tag(handler)?;
                }
                u if is_whitespace(u) => {}
                _ => {
                    self.token.clear();
                    self.token.push(unit);
                    self.state = ParserState::InAttributeName;
                }
            },
            ParserState::InAttributeName => match unit {
                EQUALS => {
                    let name = self.take_token()?;
                    let name = name.trim_end_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
                    if name.is_empty() {
                        return Err(self.fail(FramingError::MalformedMarkup("empty attribute name")));
                    }
                    if name.contains(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n')) {
                        return Err(self.fail(FramingError::MalformedMarkup("whitespace inside attribute name")));
                    }
                    self.attr_name = name.to_string();
                    self.state = ParserState::AfterAttributeEquals;
                }
                GT | SLASH | LT => {
                    return Err(self.fail(FramingError::MalformedMarkup("attribute without a value")))
                }
                _ => self.token.push(unit),
            },
            ParserState::AfterAttributeEquals => match Quote::from_unit(unit) {
                Some(quote) => {
                    self.quote = quote;
                    self.token.clear();
                    self.state = ParserState::InAttributeValue;
                }
                None if is_whitespace(unit) => {}
                None => {
                    return Err(self.fail(FramingError::MalformedMarkup("expected quote after '='")))
                }
            },
            ParserState::InAttributeValue => {
                if unit == self.quote.unit() {
                    let value = self.take_token()?;
                    let name = std::mem::take(&mut self.attr_name);
                    self.attributes.push((name, value));
                    self.state = ParserState::AfterAttributeValue;
                } else {
                    self.token.push(unit);
                }
            }
            ParserState::AfterAttributeValue => match unit {
                SLASH => self.state = ParserState::InEmptyTag,
                GT => {
                    self.state = ParserState::Start;
                    self.finish_start_tag(handler)?;
                }
                u if is_whitespace(u) => self.state = ParserState::AfterStartName,
                _ => {
                    return Err(self.fail(FramingError::MalformedMarkup(
                        "expected whitespace between attributes",
                    )))
                }
            },
            ParserState::InEndTag => {
                if unit == GT {
                    let name = self.take_token()?;
                    let name = name.trim_end_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
                    if name.is_empty() {
                        return Err(self.fail(FramingError::MalformedMarkup("empty end tag name")));
                    }
                    self.state = ParserState::Start;
                    self.finish_end_tag(name, handler)?;
                } else {
                    self.token.push(unit);
                }
            }
            ParserState::InEmptyTag => {
                if unit != GT {
                    return Err(self.fail(FramingError::MalformedMarkup("expected '>' after '/'")));
                }
                self.state = ParserState::Start;
                self.finish_start_tag(handler)?;
                let name = std::mem::take(&mut self.tag_name);
                self.finish_end_tag(&name, handler)?;
                self.tag_name = name;
            }
            ParserState::InPiOrDecl => {
                if unit == QUESTION {
                    self.state = ParserState::InPiOrDeclQuestionMark;
                } else if let Some(quote) = Quote::from_unit(unit) {
                    self.quote = quote;
                    self.state = ParserState::InPiOrDeclPseudoAttrValue;
                }
            }
            ParserState::InPiOrDeclPseudoAttrValue => {
                if unit == self.quote.unit() {
                    self.state = ParserState::InPiOrDecl;
                }
            }
            ParserState::InPiOrDeclQuestionMark => {
                if unit == GT {
                    self.state = ParserState::Start;
                    self.finish_pi(handler)?;
                } else if let Some(quote) = Quote::from_unit(unit) {
                    self.quote = quote;
                    self.state = ParserState::InPiOrDeclPseudoAttrValue;
                } else if unit != QUESTION {
                    self.state = ParserState::InPiOrDecl;
                }
            }
        }
        Ok(())
    }

    fn finish_start_tag<H: StanzaHandler>(&mut self, handler: &mut H) -> Result<()> {
        let attributes = std::mem::take(&mut self.attributes);
        let tag = StartTag::from_qualified(&self.tag_name, attributes);
        handler.on_start_tag(&tag);

        match self.policy.on_start_tag(&tag, self.depth) {
            PolicyAction::Continue => self.depth += 1,
            PolicyAction::FlushAsStandaloneUnit => {
                self.flush(handler)?;
                self.depth = 0;
            }
            PolicyAction::ResetNestingToZero => self.depth = 0,
            PolicyAction::Fatal(err) => return Err(self.fail(err)),
        }
        Ok(())
    }

    fn finish_end_tag<H: StanzaHandler>(&mut self, name: &str, handler: &mut H) -> Result<()> {
        match self.policy.on_end_tag(name, self.depth) {
            PolicyAction::Continue => {
                if self.depth == 0 {
                    return Err(self.fail(FramingError::MalformedMarkup(
                        "end tag without a matching start tag",
                    )));
                }
                self.depth -= 1;
                if self.depth == 0 {
                    self.flush(handler)?;
                }
            }
            PolicyAction::FlushAsStandaloneUnit => {
                self.flush(handler)?;
                self.depth = 0;
            }
            PolicyAction::ResetNestingToZero => self.depth = 0,
            PolicyAction::Fatal(err) => return Err(self.fail(err)),
        }
        handler.on_end_tag(name);
        Ok(())
    }

    fn finish_pi<H: StanzaHandler>(&mut self, handler: &mut H) -> Result<()> {
        let text = self.decode(self.markup_start)?;
        // `<?xml` followed by whitespace or `?`, so `<?xml-stylesheet ...?>` stays a PI.
        let is_declaration = text
            .strip_prefix("<?xml")
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| matches!(c, ' ' | '\t' | '\r' | '\n' | '?'));
        if is_declaration {
            handler.on_declaration(&text);
        } else {
            handler.on_processing_instruction(&text);
        }
        Ok(())
    }

    /// Hand the unit buffer out as one complete element and clear it.
    fn flush<H: StanzaHandler>(&mut self, handler: &mut H) -> Result<()> {
        if self.unit.is_empty() {
            return Ok(());
        }
        let text = self.decode(0)?;
        trace!(len = self.unit.len(), "Complete element");
        handler.on_complete_element(&text);
        self.unit.clear();
        Ok(())
    }

    fn decode(&mut self, from: usize) -> Result<String> {
        match String::from_utf16(&self.unit[from..]) {
            Ok(text) => Ok(text),
            Err(_) => Err(self.fail(FramingError::InvalidByteSequence("unpaired UTF-16 surrogate"))),
        }
    }

    fn take_token(&mut self) -> Result<String> {
        let token = String::from_utf16(&self.token);
        self.token.clear();
        token.map_err(|_| self.fail(FramingError::InvalidByteSequence("unpaired UTF-16 surrogate")))
    }

    fn fail(&mut self, err: FramingError) -> FramingError {
        warn!(
            kind = err.kind(),
            error = %err,
            state = ?self.state,
            depth = self.depth,
            "Framing failed, stream is unusable"
        );
        self.failed = Some(err.clone());
        err
    }
}
