//! Callback contracts between the tokenizer and its consumers.

/// A start tag as seen by the tokenizer, with its qualified name split on the
/// first `:`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartTag {
    /// Namespace prefix, empty when the name carries none.
    pub prefix: String,
    pub local_name: String,
    /// Attributes in document order, values verbatim (no entity expansion).
    pub attributes: Vec<(String, String)>,
}

impl StartTag {
    /// Build a tag from a qualified name such as `stream:stream`.
    pub fn from_qualified(name: &str, attributes: Vec<(String, String)>) -> Self {
        let (prefix, local_name) = split_qualified_name(name);
        StartTag {
            prefix: prefix.to_string(),
            local_name: local_name.to_string(),
            attributes,
        }
    }

    pub fn qualified_name(&self) -> String {
        if self.prefix.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_name)
        }
    }

    /// Value of the first attribute with exactly this name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Split `prefix:local` into its parts. A name without `:` has an empty prefix.
pub fn split_qualified_name(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", name),
    }
}

/// Receives events synchronously from within the `feed` call that produced them.
///
/// Only complete elements are mandatory; structural hooks are there for
/// observers such as pretty-printers or protocol tracers.
pub trait StanzaHandler {
    /// Exact literal text of one top-level unit.
    fn on_complete_element(&mut self, text: &str);

    fn on_start_tag(&mut self, _tag: &StartTag) {}

    fn on_end_tag(&mut self, _qualified_name: &str) {}

    /// `<?xml ...?>`
    fn on_declaration(&mut self, _text: &str) {}

    /// Any other `<?...?>`
    fn on_processing_instruction(&mut self, _text: &str) {}
}

/// Owned form of every callback, as recorded by [`EventCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CompleteElement(String),
    StartTag(StartTag),
    EndTag(String),
    Declaration(String),
    ProcessingInstruction(String),
}

/// Handler that records everything it is told.
#[derive(Debug, Default, Clone)]
pub struct EventCollector {
    events: Vec<Event>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Complete elements only, in arrival order.
    pub fn stanzas(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::CompleteElement(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Remove and return the recorded complete elements, dropping other events.
    pub fn take_stanzas(&mut self) -> Vec<String> {
        self.events
            .drain(..)
            .filter_map(|e| match e {
                Event::CompleteElement(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

impl StanzaHandler for EventCollector {
    fn on_complete_element(&mut self, text: &str) {
        self.events.push(Event::CompleteElement(text.to_string()));
    }

    fn on_start_tag(&mut self, tag: &StartTag) {
        self.events.push(Event::StartTag(tag.clone()));
    }

    fn on_end_tag(&mut self, qualified_name: &str) {
        self.events.push(Event::EndTag(qualified_name.to_string()));
    }

    fn on_declaration(&mut self, text: &str) {
        self.events.push(Event::Declaration(text.to_string()));
    }

    fn on_processing_instruction(&mut self, text: &str) {
        self.events.push(Event::ProcessingInstruction(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qualified_name() {
        assert_eq!(split_qualified_name("stream:stream"), ("stream", "stream"));
        assert_eq!(split_qualified_name("message"), ("", "message"));
        assert_eq!(split_qualified_name("a:b:c"), ("a", "b:c"));
    }

    #[test]
    fn test_start_tag_lookup() {
        let tag = StartTag::from_qualified(
            "stream:features",
            vec![("xmlns".into(), "jabber:client".into())],
        );
        assert_eq!(tag.prefix, "stream");
        assert_eq!(tag.local_name, "features");
        assert_eq!(tag.qualified_name(), "stream:features");
        assert_eq!(tag.attribute("xmlns"), Some("jabber:client"));
        assert_eq!(tag.attribute("to"), None);
    }

    #[test]
    fn test_collector_take_stanzas() {
        let mut collector = EventCollector::new();
        collector.on_start_tag(&StartTag::from_qualified("presence", Vec::new()));
        collector.on_end_tag("presence");
        collector.on_complete_element("<presence/>");
        assert_eq!(collector.stanzas(), vec!["<presence/>"]);
        assert_eq!(collector.take_stanzas(), vec!["<presence/>".to_string()]);
        assert!(collector.events().is_empty());
    }
}
