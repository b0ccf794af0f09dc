//! Structured-event consumer interface.
//!
//! Every component either implements [`EventSink`] (as a consumer), drives one
//! (as a producer), or both (pipeline stages).

use crate::event::SaxEvent;
use crate::Result;

/// Consumer of a SAX event stream.
///
/// Errors abort the producer synchronously; there is no retry.
pub trait EventSink {
    /// Handles one event.
    fn process(&mut self, event: &SaxEvent) -> Result<()>;

    /// Whether this consumer also acts as a lexical handler.
    ///
    /// Producers that honour the flag skip comments, entity, CDATA and DTD
    /// boundaries when it is `false`.
    fn accepts_lexical(&self) -> bool {
        true
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    #[inline]
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        (**self).process(event)
    }

    fn accepts_lexical(&self) -> bool {
        (**self).accepts_lexical()
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    #[inline]
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        (**self).process(event)
    }

    fn accepts_lexical(&self) -> bool {
        (**self).accepts_lexical()
    }
}

/// Sammelt Events unveraendert (einfachster Sink, v.a. fuer Tests).
impl EventSink for Vec<SaxEvent> {
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Concatenates the text of all `Characters` and `IgnorableWhitespace` events.
#[derive(Debug, Default, Clone)]
pub struct TextCollector {
    text: String,
}

impl TextCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl EventSink for TextCollector {
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        if let Some(text) = event.text() {
            self.text.push_str(text);
        }
        Ok(())
    }

    fn accepts_lexical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::QName;

    #[test]
    fn vec_sammelt_events() {
        let mut events: Vec<SaxEvent> = Vec::new();
        events.process(&SaxEvent::StartDocument).unwrap();
        events.process(&SaxEvent::characters("x")).unwrap();
        assert_eq!(events, vec![SaxEvent::StartDocument, SaxEvent::characters("x")]);
    }

    #[test]
    fn text_collector_ignoriert_markup() {
        let mut text = TextCollector::new();
        for ev in [
            SaxEvent::start_element(QName::new("", "p")),
            SaxEvent::characters("a"),
            SaxEvent::comment("nicht text"),
            SaxEvent::IgnorableWhitespace(" ".into()),
            SaxEvent::characters("b"),
            SaxEvent::end_element(QName::new("", "p")),
        ] {
            text.process(&ev).unwrap();
        }
        assert_eq!(text.into_string(), "a b");
    }

    /// `&mut S` und `Box<dyn EventSink>` leiten weiter, inkl. lexical-Flag.
    #[test]
    fn referenz_und_box_leiten_weiter() {
        let mut text = TextCollector::new();
        {
            let by_ref = &mut text;
            assert!(!by_ref.accepts_lexical());
            by_ref.process(&SaxEvent::characters("r")).unwrap();
        }
        let mut boxed: Box<dyn EventSink + '_> = Box::new(&mut text);
        boxed.process(&SaxEvent::characters("b")).unwrap();
        assert!(!boxed.accepts_lexical());
        drop(boxed);
        assert_eq!(text.as_str(), "rb");

        let events: Box<dyn EventSink> = Box::new(Vec::<SaxEvent>::new());
        assert!(events.accepts_lexical());
    }
}
