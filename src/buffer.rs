//! Replayable recording of a SAX event stream.
//!
//! An [`EventBuffer`] is filled once (it is itself an [`EventSink`]) and
//! replayed any number of times. Replay never mutates the recording.

use std::io::Write;

use log::trace;

use crate::event::SaxEvent;
use crate::sink::EventSink;
use crate::xml::{ParseOptions, parse_xml_str};
use crate::Result;

/// Ordered, replayable list of events.
///
/// No well-formedness checks: unbalanced element events are recorded and
/// replayed as given. `Clone` copies the list structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBuffer {
    events: Vec<SaxEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Buffer aus einer fertigen Event-Liste.
    pub fn from_events(events: impl IntoIterator<Item = SaxEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Parses XML text and records the resulting events.
    pub fn from_xml_str(xml: &str, options: &ParseOptions) -> Result<Self> {
        let mut buffer = Self::new();
        parse_xml_str(xml, options, &mut buffer)?;
        Ok(buffer)
    }

    /// Appends one event.
    #[inline]
    pub fn push(&mut self, event: SaxEvent) {
        self.events.push(event);
    }

    /// Re-emits every recorded event, in order, to `sink`.
    ///
    /// Stops at the first event the sink rejects and returns that error.
    pub fn to_sink<S: EventSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        trace!("replaying {} buffered events", self.events.len());
        let lexical = sink.accepts_lexical();
        for event in &self.events {
            if !lexical && event.is_lexical() {
                continue;
            }
            sink.process(event)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SaxEvent> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[SaxEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Leert den Buffer fuer Wiederverwendung (Kapazitaet bleibt erhalten).
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn into_events(self) -> Vec<SaxEvent> {
        self.events
    }

    /// Concatenated character content (`Characters` and `IgnorableWhitespace`).
    pub fn text(&self) -> String {
        let mut out = String::new();
        for text in self.events.iter().filter_map(SaxEvent::text) {
            out.push_str(text);
        }
        out
    }

    /// Writes a human-readable listing, one event per line.
    pub fn dump(&self, mut writer: impl Write) -> Result<()> {
        for event in &self.events {
            write_dump_line(&mut writer, event)?;
        }
        Ok(())
    }
}

fn write_dump_line(w: &mut impl Write, event: &SaxEvent) -> std::io::Result<()> {
    let kind = event.kind();
    match event {
        SaxEvent::StartDocument
        | SaxEvent::EndDocument
        | SaxEvent::StartCdata
        | SaxEvent::EndCdata
        | SaxEvent::EndDtd => writeln!(w, "[{kind}]"),
        SaxEvent::StartElement(se) => {
            write!(w, "[{kind}] {:?}", se.name)?;
            for attr in se.attributes.iter() {
                write!(w, " {}={:?}", attr.name, &*attr.value)?;
            }
            writeln!(w)
        }
        SaxEvent::EndElement(name) => writeln!(w, "[{kind}] {name:?}"),
        SaxEvent::Characters(t) | SaxEvent::IgnorableWhitespace(t) | SaxEvent::Comment(t) => {
            writeln!(w, "[{kind}] {:?}", &**t)
        }
        SaxEvent::ProcessingInstruction(pi) => {
            writeln!(w, "[{kind}] {} {:?}", pi.target, &*pi.data)
        }
        SaxEvent::StartPrefixMapping(pm) => writeln!(w, "[{kind}] {}={}", pm.prefix, pm.uri),
        SaxEvent::EndPrefixMapping(name)
        | SaxEvent::StartEntity(name)
        | SaxEvent::EndEntity(name)
        | SaxEvent::SkippedEntity(name) => writeln!(w, "[{kind}] {name}"),
        SaxEvent::StartDtd(dtd) => writeln!(
            w,
            "[{kind}] {} public={:?} system={:?}",
            dtd.name, &*dtd.public_id, &*dtd.system_id
        ),
    }
}

impl EventSink for EventBuffer {
    #[inline]
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = &'a SaxEvent;
    type IntoIter = std::slice::Iter<'a, SaxEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl FromIterator<SaxEvent> for EventBuffer {
    fn from_iter<I: IntoIterator<Item = SaxEvent>>(iter: I) -> Self {
        Self::from_events(iter)
    }
}
