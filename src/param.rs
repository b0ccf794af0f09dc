//! Event buffer with `{name}` placeholders resolved at replay time.
//!
//! Text is scanned while it is recorded: every `{name}` inside a
//! `Characters` run becomes a [`ParamItem::Parameter`]. Values are supplied
//! per replay through [`Parameters`], never at recording time.
//!
//! A placeholder split across two `characters` calls is reassembled. When a
//! non-text event arrives while a `{` is still open, the open fragment is
//! flushed as literal text first.

use std::rc::Rc;

use log::{debug, trace};

use crate::buffer::EventBuffer;
use crate::event::SaxEvent;
use crate::sink::EventSink;
use crate::xml::{ParseOptions, parse_xml_str};
use crate::{FastIndexMap, Result};

mod scanner;

use scanner::{Piece, PlaceholderScanner};

/// Value bound to a placeholder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Literal text, emitted as one `Characters` event.
    Text(Rc<str>),
    /// Recorded event stream, replayed in place of the placeholder.
    Fragment(EventBuffer),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(Rc::from(value))
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(Rc::from(value))
    }
}

impl From<EventBuffer> for ParamValue {
    fn from(value: EventBuffer) -> Self {
        Self::Fragment(value)
    }
}

/// Substitution context: placeholder name → value.
///
/// Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: FastIndexMap<String, ParamValue>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: literal text value.
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<Rc<str>>) -> Self {
        self.values.insert(name.into(), ParamValue::Text(value.into()));
        self
    }

    /// Builder: event fragment value.
    pub fn with_fragment(mut self, name: impl Into<String>, fragment: EventBuffer) -> Self {
        self.values.insert(name.into(), ParamValue::Fragment(fragment));
        self
    }

    /// Setzt einen Wert und gibt den vorherigen zurueck.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// One recorded item: an ordinary event or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamItem {
    Event(SaxEvent),
    Parameter(Rc<str>),
}

/// [`EventBuffer`] variant that recognises `{name}` placeholders in text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterizedEventBuffer {
    items: Vec<ParamItem>,
    scanner: PlaceholderScanner,
}

impl ParameterizedEventBuffer {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            scanner: PlaceholderScanner::new(),
        }
    }

    /// Parses an XML template and records it.
    pub fn from_xml_str(xml: &str, options: &ParseOptions) -> Result<Self> {
        let mut buffer = Self::new();
        parse_xml_str(xml, options, &mut buffer)?;
        Ok(buffer)
    }

    /// Records an existing event buffer, scanning its text for placeholders.
    pub fn from_buffer(buffer: &EventBuffer) -> Self {
        let mut this = Self::new();
        for event in buffer {
            this.record(event);
        }
        this
    }

    fn record(&mut self, event: &SaxEvent) {
        match event {
            SaxEvent::Characters(text) => {
                let items = &mut self.items;
                self.scanner.scan(text, |piece| match piece {
                    Piece::Text(t) => items.push(ParamItem::Event(SaxEvent::characters(t))),
                    Piece::Parameter(name) => items.push(ParamItem::Parameter(Rc::from(name))),
                });
            }
            other => {
                self.flush_pending();
                self.items.push(ParamItem::Event(other.clone()));
            }
        }
    }

    /// Turns an open `{...` fragment into literal text.
    pub fn flush_pending(&mut self) {
        if let Some(fragment) = self.scanner.take_pending() {
            trace!("flushing unterminated placeholder fragment {fragment:?} as text");
            self.items.push(ParamItem::Event(SaxEvent::characters(fragment)));
        }
    }

    /// Unterminiertes Fragment, das noch auf weiteren Text wartet.
    pub fn pending_fragment(&self) -> Option<&str> {
        self.scanner.pending()
    }

    pub fn items(&self) -> &[ParamItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.scanner.pending().is_none()
    }

    /// Placeholder names in recording order (duplicates included).
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            ParamItem::Parameter(name) => Some(&**name),
            ParamItem::Event(_) => None,
        })
    }

    /// Replays the recording into `sink`, resolving placeholders from `params`.
    ///
    /// Text values become `Characters`, fragments are replayed in place and
    /// unknown names produce nothing. An open fragment left at the end of the
    /// recording is emitted as trailing text.
    pub fn to_sink<S: EventSink + ?Sized>(&self, sink: &mut S, params: &Parameters) -> Result<()> {
        let lexical = sink.accepts_lexical();
        for item in &self.items {
            match item {
                ParamItem::Event(event) => {
                    if !lexical && event.is_lexical() {
                        continue;
                    }
                    sink.process(event)?;
                }
                ParamItem::Parameter(name) => match params.get(name) {
                    Some(ParamValue::Text(text)) => {
                        if !text.is_empty() {
                            sink.process(&SaxEvent::Characters(text.clone()))?;
                        }
                    }
                    Some(ParamValue::Fragment(fragment)) => fragment.to_sink(sink)?,
                    None => debug!("parameter '{name}' not supplied, rendering as empty"),
                },
            }
        }
        if let Some(rest) = self.scanner.pending() {
            sink.process(&SaxEvent::characters(rest))?;
        }
        Ok(())
    }

    /// Renders the recording as flat text.
    ///
    /// Only character content contributes; fragments contribute their text.
    pub fn to_text(&self, params: &Parameters) -> String {
        let mut out = String::new();
        for item in &self.items {
            match item {
                ParamItem::Event(event) => {
                    if let Some(text) = event.text() {
                        out.push_str(text);
                    }
                }
                ParamItem::Parameter(name) => match params.get(name) {
                    Some(ParamValue::Text(text)) => out.push_str(text),
                    Some(ParamValue::Fragment(fragment)) => out.push_str(&fragment.text()),
                    None => debug!("parameter '{name}' not supplied, rendering as empty"),
                },
            }
        }
        if let Some(rest) = self.scanner.pending() {
            out.push_str(rest);
        }
        out
    }

    /// Resolves all placeholders into a plain [`EventBuffer`].
    pub fn resolve(&self, params: &Parameters) -> Result<EventBuffer> {
        let mut out = EventBuffer::with_capacity(self.items.len());
        self.to_sink(&mut out, params)?;
        Ok(out)
    }
}

impl EventSink for ParameterizedEventBuffer {
    #[inline]
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        self.record(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::qname::QName;
    use crate::sink::TextCollector;

    fn record(events: &[SaxEvent]) -> ParameterizedEventBuffer {
        let mut buffer = ParameterizedEventBuffer::new();
        for ev in events {
            buffer.process(ev).unwrap();
        }
        buffer
    }

    fn p(name: &str) -> ParamItem {
        ParamItem::Parameter(name.into())
    }

    fn ch(text: &str) -> ParamItem {
        ParamItem::Event(SaxEvent::characters(text))
    }

    #[test]
    fn hello_world() {
        let buffer = record(&[SaxEvent::characters("Hello {name}!")]);
        let params = Parameters::new().with_text("name", "World");
        assert_eq!(buffer.to_text(&params), "Hello World!");

        let mut text = TextCollector::new();
        buffer.to_sink(&mut text, &params).unwrap();
        assert_eq!(text.as_str(), "Hello World!");
    }

    /// Fehlender Parameter wird still zu leerem Text.
    #[test]
    fn fehlender_parameter_ist_leer() {
        let buffer = record(&[SaxEvent::characters("Hi {missing}.")]);
        assert_eq!(buffer.to_text(&Parameters::new()), "Hi .");

        let mut events: Vec<SaxEvent> = Vec::new();
        buffer.to_sink(&mut events, &Parameters::new()).unwrap();
        assert_eq!(events, vec![SaxEvent::characters("Hi "), SaxEvent::characters(".")]);
    }

    #[test]
    fn geteilter_platzhalter_gleiche_struktur() {
        let split = record(&[SaxEvent::characters("Hel{na"), SaxEvent::characters("me}!")]);
        let whole = record(&[SaxEvent::characters("Hel{name}!")]);
        assert_eq!(split.items(), whole.items());
        assert_eq!(split.items(), &[ch("Hel"), p("name"), ch("!")]);
    }

    /// Nicht-Text-Event flusht das offene Fragment als Literal.
    #[test]
    fn offenes_fragment_vor_end_element() {
        let end = SaxEvent::end_element(QName::new("", "p"));
        let buffer = record(&[SaxEvent::characters("a {b"), end.clone(), SaxEvent::characters("c}")]);
        assert_eq!(
            buffer.items(),
            &[ch("a "), ch("{b"), ParamItem::Event(end), ch("c}")]
        );
        assert_eq!(buffer.parameter_names().count(), 0);
    }

    #[test]
    fn offenes_fragment_vor_whitespace_und_comment() {
        let buffer = record(&[
            SaxEvent::characters("{x"),
            SaxEvent::IgnorableWhitespace(" ".into()),
        ]);
        assert_eq!(
            buffer.items(),
            &[ch("{x"), ParamItem::Event(SaxEvent::IgnorableWhitespace(" ".into()))]
        );

        let buffer = record(&[SaxEvent::characters("{x"), SaxEvent::comment("c")]);
        assert_eq!(buffer.items()[0], ch("{x"));
    }

    /// Am Ende der Aufnahme offenes Fragment erscheint beim Replay als Text.
    #[test]
    fn offenes_fragment_am_ende() {
        let buffer = record(&[SaxEvent::characters("tail {open")]);
        assert_eq!(buffer.pending_fragment(), Some("{open"));
        assert_eq!(buffer.to_text(&Parameters::new()), "tail {open");

        let mut events: Vec<SaxEvent> = Vec::new();
        buffer.to_sink(&mut events, &Parameters::new()).unwrap();
        assert_eq!(
            events,
            vec![SaxEvent::characters("tail "), SaxEvent::characters("{open")]
        );
    }

    #[test]
    fn fragment_wird_eingespielt() {
        let fragment = EventBuffer::from_events([
            SaxEvent::start_element(QName::new("", "b")),
            SaxEvent::characters("bold"),
            SaxEvent::end_element(QName::new("", "b")),
        ]);
        let buffer = record(&[SaxEvent::characters("x{frag}y")]);
        let params = Parameters::new().with_fragment("frag", fragment.clone());

        let mut events: Vec<SaxEvent> = Vec::new();
        buffer.to_sink(&mut events, &params).unwrap();
        let mut expected = vec![SaxEvent::characters("x")];
        expected.extend(fragment.iter().cloned());
        expected.push(SaxEvent::characters("y"));
        assert_eq!(events, expected);

        assert_eq!(buffer.to_text(&params), "xboldy");
    }

    #[test]
    fn replay_veraendert_aufnahme_nicht() {
        let buffer = record(&[SaxEvent::characters("{a}-{b}")]);
        let params: Parameters = [("a", "1"), ("b", "2")].into_iter().collect();
        let first = buffer.resolve(&params).unwrap();
        let second = buffer.resolve(&params).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text(), "1-2");
    }

    #[test]
    fn parameter_namen_in_reihenfolge() {
        let buffer = record(&[
            SaxEvent::characters("{first} and {second}"),
            SaxEvent::comment("{not a param}"),
            SaxEvent::characters("{first}"),
        ]);
        let names: Vec<&str> = buffer.parameter_names().collect();
        assert_eq!(names, vec!["first", "second", "first"]);
    }

    /// Kommentare und Attribute werden nicht gescannt.
    #[test]
    fn nur_characters_werden_gescannt() {
        let se = SaxEvent::start_element_with(QName::new("", "a"), [(QName::new("", "href"), "{url}")]);
        let buffer = record(&[se.clone(), SaxEvent::comment("{c}")]);
        assert_eq!(
            buffer.items(),
            &[ParamItem::Event(se), ParamItem::Event(SaxEvent::comment("{c}"))]
        );
    }

    #[test]
    fn sink_fehler_propagiert() {
        struct Reject;
        impl EventSink for Reject {
            fn process(&mut self, _event: &SaxEvent) -> Result<()> {
                Err(Error::sink_failed("nope"))
            }
        }
        let buffer = record(&[SaxEvent::characters("{a}")]);
        let params = Parameters::new().with_text("a", "x");
        assert!(buffer.to_sink(&mut Reject, &params).is_err());
    }

    #[test]
    fn leerer_textwert_erzeugt_kein_event() {
        let buffer = record(&[SaxEvent::characters("{a}")]);
        let params = Parameters::new().with_text("a", "");
        let mut events: Vec<SaxEvent> = Vec::new();
        buffer.to_sink(&mut events, &params).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn from_buffer_scannt_text() {
        let plain = EventBuffer::from_events([SaxEvent::characters("v={v}")]);
        let buffer = ParameterizedEventBuffer::from_buffer(&plain);
        assert_eq!(buffer.items(), &[ch("v="), p("v")]);
    }

    #[test]
    fn parameters_einfuegereihenfolge() {
        let mut params = Parameters::new();
        params.insert("z", "1");
        params.insert("a", EventBuffer::new());
        assert!(params.insert("z", "2").is_some());
        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["z", "a"]);
        assert_eq!(params.get("z"), Some(&ParamValue::from("2")));
        assert!(params.contains("a"));
        assert_eq!(params.len(), 2);
    }
}
