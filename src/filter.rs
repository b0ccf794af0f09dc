//! Pass-through stage for splicing one document into another.
//!
//! [`PassthroughFilter`] relays events unchanged to its downstream sink,
//! except for what [`FilterOptions`] asks it to drop: document boundaries,
//! the outermost element pair, and whitespace-only text. Comments inside a
//! DTD are always dropped.
//!
//! # Beispiel
//!
//! ```
//! use sarx::{EventSink, FilterOptions, PassthroughFilter, QName, SaxEvent};
//!
//! let opts = FilterOptions::default().with_suppress_root_element(true);
//! let mut filter = PassthroughFilter::new(Vec::<SaxEvent>::new(), opts);
//! for ev in [
//!     SaxEvent::StartDocument,
//!     SaxEvent::start_element(QName::new("", "root")),
//!     SaxEvent::characters("x"),
//!     SaxEvent::end_element(QName::new("", "root")),
//!     SaxEvent::EndDocument,
//! ] {
//!     filter.process(&ev).unwrap();
//! }
//! assert_eq!(filter.into_inner(), vec![SaxEvent::characters("x")]);
//! ```

use log::warn;

use crate::event::SaxEvent;
use crate::sink::EventSink;
use crate::Result;

/// Configuration of a [`PassthroughFilter`]. Fixed once the filter is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    /// Drop `StartDocument`/`EndDocument` (and the DTD, which belongs to the document prolog).
    pub suppress_document: bool,
    /// Drop the outermost `StartElement`/`EndElement` pair.
    pub suppress_root_element: bool,
    /// Drop text runs that are empty after trimming whitespace.
    pub suppress_empty_text: bool,
}

impl Default for FilterOptions {
    /// Include-Fall: Dokumentgrenzen weg, Root und Text bleiben.
    fn default() -> Self {
        Self {
            suppress_document: true,
            suppress_root_element: false,
            suppress_empty_text: false,
        }
    }
}

impl FilterOptions {
    /// Alles durchlassen (reiner Relay).
    pub fn transparent() -> Self {
        Self {
            suppress_document: false,
            suppress_root_element: false,
            suppress_empty_text: false,
        }
    }

    pub fn with_suppress_document(mut self, value: bool) -> Self {
        self.suppress_document = value;
        self
    }

    pub fn with_suppress_root_element(mut self, value: bool) -> Self {
        self.suppress_root_element = value;
        self
    }

    pub fn with_suppress_empty_text(mut self, value: bool) -> Self {
        self.suppress_empty_text = value;
        self
    }
}

/// Relays events to `downstream`, dropping what the options select.
pub struct PassthroughFilter<S> {
    downstream: S,
    options: FilterOptions,
    /// Aktuelle Element-Tiefe (0 = ausserhalb des Root-Elements).
    depth: usize,
    in_dtd: bool,
}

impl<S: EventSink> PassthroughFilter<S> {
    pub fn new(downstream: S, options: FilterOptions) -> Self {
        Self {
            downstream,
            options,
            depth: 0,
            in_dtd: false,
        }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn get_ref(&self) -> &S {
        &self.downstream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.downstream
    }

    pub fn into_inner(self) -> S {
        self.downstream
    }

    #[inline]
    fn forward_lexical(&mut self, event: &SaxEvent) -> Result<()> {
        if self.downstream.accepts_lexical() {
            self.downstream.process(event)?;
        }
        Ok(())
    }
}

impl<S: EventSink> EventSink for PassthroughFilter<S> {
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        match event {
            SaxEvent::StartDocument | SaxEvent::EndDocument => {
                if !self.options.suppress_document {
                    self.downstream.process(event)?;
                }
            }
            SaxEvent::StartElement(_) => {
                self.depth += 1;
                if !(self.options.suppress_root_element && self.depth == 1) {
                    self.downstream.process(event)?;
                }
            }
            SaxEvent::EndElement(name) => {
                if self.depth == 0 {
                    // Mehr End- als Start-Events: bei 0 klemmen, Event unveraendert weiter
                    warn!("end element '{name}' without matching start, depth stays at 0");
                    return self.downstream.process(event);
                }
                let outermost = self.depth == 1;
                self.depth -= 1;
                if !(self.options.suppress_root_element && outermost) {
                    self.downstream.process(event)?;
                }
            }
            SaxEvent::Characters(text) | SaxEvent::IgnorableWhitespace(text) => {
                if !(self.options.suppress_empty_text && text.trim().is_empty()) {
                    self.downstream.process(event)?;
                }
            }
            SaxEvent::Comment(_) => {
                if !self.in_dtd {
                    self.forward_lexical(event)?;
                }
            }
            SaxEvent::StartDtd(_) => {
                self.in_dtd = true;
                if !self.options.suppress_document {
                    self.forward_lexical(event)?;
                }
            }
            SaxEvent::EndDtd => {
                self.in_dtd = false;
                if !self.options.suppress_document {
                    self.forward_lexical(event)?;
                }
            }
            SaxEvent::StartEntity(_)
            | SaxEvent::EndEntity(_)
            | SaxEvent::StartCdata
            | SaxEvent::EndCdata => self.forward_lexical(event)?,
            SaxEvent::ProcessingInstruction(_)
            | SaxEvent::StartPrefixMapping(_)
            | SaxEvent::EndPrefixMapping(_)
            | SaxEvent::SkippedEntity(_) => self.downstream.process(event)?,
        }
        Ok(())
    }
}
