//! Property tests: framing must not depend on how the input is chunked.
//!
//! 1. Round-trip: the complete elements concatenate back to the input
//! 2. One complete element per generated top-level unit, none for children
//! 3. Events are identical for any split of the bytes or the characters
//! 4. Every Unicode scalar survives byte-at-a-time decoding

use fluux_framing::framing::{
    Event, EventCollector, FramerConfig, GenericPolicy, StreamFramer, Tokenizer,
};
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,5}(:[a-z]{1,4})?"
}

fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 \n\t>/=?\"'\u{e9}\u{20ac}\u{1F600}]{0,10}"
}

fn attributes() -> impl Strategy<Value = String> {
    let attribute = (
        "[a-z]{1,5}",
        "[a-zA-Z0-9 />=?<\u{e9}\u{1F600}]{0,8}",
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(key, value, use_apos, embed_other)| {
            let (quote, other) = if use_apos { ('\'', '"') } else { ('"', '\'') };
            let value = if embed_other { format!("{}{}", value, other) } else { value };
            format!(" {}={}{}{}", key, quote, value, quote)
        });
    prop::collection::vec(attribute, 0..3).prop_map(|attrs| attrs.concat())
}

fn element() -> impl Strategy<Value = String> {
    let leaf = (name(), attributes(), any::<bool>(), text()).prop_map(|(name, attrs, empty, text)| {
        if empty {
            format!("<{}{}/>", name, attrs)
        } else {
            format!("<{}{}>{}</{}>", name, attrs, text, name)
        }
    });
    leaf.prop_recursive(3, 24, 4, |inner| {
        (name(), attributes(), prop::collection::vec((inner, text()), 0..4)).prop_map(
            |(name, attrs, children)| {
                let mut element = format!("<{}{}>", name, attrs);
                for (child, text) in children {
                    element.push_str(&child);
                    element.push_str(&text);
                }
                element.push_str(&format!("</{}>", name));
                element
            },
        )
    })
}

/// Top-level units, each with the whitespace that precedes it.
fn units() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(("[ \n]{0,2}", element()), 1..5)
        .prop_map(|units| units.into_iter().map(|(ws, el)| ws + &el).collect())
}

fn frame_chunks(chunks: &[&[u8]]) -> Vec<Event> {
    let mut framer = StreamFramer::generic(&FramerConfig::default());
    let mut collector = EventCollector::new();
    for chunk in chunks {
        framer.feed(chunk, &mut collector).unwrap();
    }
    framer.finish().unwrap();
    collector.into_events()
}

fn split_at_offsets<'a>(bytes: &'a [u8], offsets: &[usize]) -> Vec<&'a [u8]> {
    let mut cuts: Vec<usize> = offsets.iter().map(|o| o % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(&bytes[start..cut]);
        start = cut;
    }
    chunks.push(&bytes[start..]);
    chunks
}

proptest! {
    #[test]
    fn complete_elements_reproduce_input(units in units()) {
        let input = units.concat();
        let events = frame_chunks(&[input.as_bytes()]);
        let stanzas: Vec<String> = events
            .into_iter()
            .filter_map(|e| match e {
                Event::CompleteElement(text) => Some(text),
                _ => None,
            })
            .collect();
        prop_assert_eq!(&stanzas, &units);
        prop_assert_eq!(stanzas.concat(), input);
    }

    #[test]
    fn byte_splits_do_not_change_events(
        units in units(),
        offsets in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let input = units.concat();
        let bytes = input.as_bytes();
        let whole = frame_chunks(&[bytes]);
        let split = frame_chunks(&split_at_offsets(bytes, &offsets));
        prop_assert_eq!(&whole, &split);

        let one_by_one: Vec<&[u8]> = bytes.chunks(1).collect();
        prop_assert_eq!(&whole, &frame_chunks(&one_by_one));
    }

    #[test]
    fn char_at_a_time_matches_whole_string(units in units()) {
        let input = units.concat();

        let mut tokenizer = Tokenizer::new(GenericPolicy::default());
        let mut whole = EventCollector::new();
        tokenizer.feed_str(&input, &mut whole).unwrap();

        let mut tokenizer = Tokenizer::new(GenericPolicy::default());
        let mut stepped = EventCollector::new();
        let mut buf = [0u8; 4];
        for c in input.chars() {
            tokenizer.feed_str(c.encode_utf8(&mut buf), &mut stepped).unwrap();
        }
        prop_assert_eq!(whole.events(), stepped.events());
        prop_assert_eq!(tokenizer.depth(), 0);
    }

    #[test]
    fn every_scalar_survives_byte_at_a_time(c in any::<char>().prop_filter("markup", |c| *c != '<')) {
        let input = format!("<a>{}</a>", c);
        let one_by_one: Vec<&[u8]> = input.as_bytes().chunks(1).collect();
        let events = frame_chunks(&one_by_one);
        prop_assert_eq!(events.iter().filter(|e| matches!(e, Event::CompleteElement(_))).count(), 1);
        prop_assert!(events.contains(&Event::CompleteElement(input.clone())));
    }
}
