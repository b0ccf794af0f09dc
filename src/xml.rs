//! XML text → SAX events.
//!
//! Uses quick-xml to drive an [`EventSink`] with events in SAX order:
//! prefix mappings precede their element and are closed after it, CDATA
//! sections are bracketed by `StartCdata`/`EndCdata`, entities declared in
//! the internal DTD subset are expanded between `StartEntity`/`EndEntity`.

use std::io::Read;
use std::path::Path;

use crate::error::Error;
use crate::sink::EventSink;
use crate::Result;

mod dtd;
mod reader;

/// Handling of whitespace-only text between child elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhitespaceMode {
    /// Report as ordinary `Characters`.
    Characters,
    /// Report as `IgnorableWhitespace` (element content whitespace).
    #[default]
    Ignorable,
    /// Do not report at all.
    Strip,
}

/// Parsing-Optionen: welche Konstrukte als Events gemeldet werden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub comments: bool,
    pub processing_instructions: bool,
    /// DOCTYPE als `StartDtd`/`EndDtd` melden. Interne Entities werden immer expandiert.
    pub dtd: bool,
    pub whitespace: WhitespaceMode,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            comments: true,
            processing_instructions: true,
            dtd: true,
            whitespace: WhitespaceMode::default(),
        }
    }
}

impl ParseOptions {
    pub fn with_comments(mut self, value: bool) -> Self {
        self.comments = value;
        self
    }

    pub fn with_processing_instructions(mut self, value: bool) -> Self {
        self.processing_instructions = value;
        self
    }

    pub fn with_dtd(mut self, value: bool) -> Self {
        self.dtd = value;
        self
    }

    pub fn with_whitespace(mut self, mode: WhitespaceMode) -> Self {
        self.whitespace = mode;
        self
    }
}

/// Parse XML from a string and feed the events to `sink`.
pub fn parse_xml_str<S: EventSink + ?Sized>(xml: &str, options: &ParseOptions, sink: &mut S) -> Result<()> {
    reader::emit_events(xml.as_bytes(), options, sink)
}

/// Parse XML from any reader (buffered internally) and feed the events to `sink`.
pub fn parse_xml_reader<R: Read, S: EventSink + ?Sized>(
    xml_reader: R,
    options: &ParseOptions,
    sink: &mut S,
) -> Result<()> {
    reader::emit_events(xml_reader, options, sink)
}

/// Parse an XML file and feed the events to `sink`.
pub fn parse_xml_file<S: EventSink + ?Sized>(path: &Path, options: &ParseOptions, sink: &mut S) -> Result<()> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::XmlParseError(format!("read XML '{}': {e}", path.display())))?;
    reader::emit_events(file, options, sink)
}
