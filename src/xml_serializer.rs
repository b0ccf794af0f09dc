//! SAX events → XML bytes.
//!
//! [`XmlSerializer`] is an [`EventSink`] that streams markup straight into a
//! `W: Write`. Start tags are held back until the next event so that empty
//! elements can be written self-closing. Namespace declarations come from
//! `StartPrefixMapping` events preceding the element.
//!
//! Zwei APIs:
//! - `events_to_xml()`: gibt XML als String zurueck (Convenience).
//! - `XmlSerializer`: streamt direkt in `impl Write` (kein String im RAM).

use std::io::Write;
use std::rc::Rc;

use crate::buffer::EventBuffer;
use crate::error::Error;
use crate::event::{DtdContent, ElementStart, PrefixMapping, SaxEvent};
use crate::qname::QName;
use crate::sink::EventSink;
use crate::Result;

/// Serialisiert einen Event-Buffer als XML-String.
pub fn events_to_xml(events: &EventBuffer) -> Result<String> {
    let mut ser = XmlSerializer::new(Vec::new());
    events.to_sink(&mut ser)?;
    let buf = ser.finish()?;
    String::from_utf8(buf).map_err(|_| Error::IoError("XML output is not valid UTF-8".into()))
}

// ============================================================================
// Freie Hilfsfunktionen
// ============================================================================

/// Schreibt einen String als Bytes in den Writer.
#[inline]
fn w(writer: &mut impl Write, s: &str) -> Result<()> {
    Ok(writer.write_all(s.as_bytes())?)
}

/// XML-Escaping mit memchr3-SIMD: Sucht drei Zeichen gleichzeitig und ersetzt sie.
/// Grosse Bloecke ohne Escape-Zeichen werden in einem Stueck geschrieben.
fn write_escaped_memchr3(
    w: &mut dyn Write,
    s: &str,
    needle: [u8; 3],
    replacement: [&[u8]; 3],
) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        match memchr::memchr3(needle[0], needle[1], needle[2], &bytes[start..]) {
            Some(offset) => {
                let pos = start + offset;
                if start < pos {
                    w.write_all(&bytes[start..pos])?;
                }
                // memchr3 trifft immer eines der drei Needles
                let idx = if bytes[pos] == needle[0] {
                    0
                } else if bytes[pos] == needle[1] {
                    1
                } else {
                    2
                };
                w.write_all(replacement[idx])?;
                start = pos + 1;
            }
            None => {
                w.write_all(&bytes[start..])?;
                break;
            }
        }
    }
    Ok(())
}

/// Schreibt `s`, wobei `reserved` (falls gesetzt) als Zeichenreferenz erscheint.
fn write_escaped_with(
    writer: &mut impl Write,
    s: &str,
    reserved: Option<u8>,
    escape: fn(&mut dyn Write, &str) -> Result<()>,
) -> Result<()> {
    let Some(byte) = reserved else {
        return escape(&mut *writer, s);
    };
    let mut first = true;
    for chunk in s.split(byte as char) {
        if !first {
            write!(writer, "&#{byte};")?;
        }
        first = false;
        escape(&mut *writer, chunk)?;
    }
    Ok(())
}

/// XML-Escaping fuer Text-Inhalt: & < > → &amp; &lt; &gt;
fn escape_text(w: &mut dyn Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'>'], [b"&amp;", b"&lt;", b"&gt;"])
}

/// XML-Escaping fuer Attribut-Werte: & < " → &amp; &lt; &quot;
fn escape_attr(w: &mut dyn Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'"'], [b"&amp;", b"&lt;", b"&quot;"])
}

/// CDATA-Inhalt: `]]>` muss auf zwei Sektionen verteilt werden.
fn write_cdata_text(writer: &mut impl Write, s: &str) -> Result<()> {
    let mut rest = s;
    while let Some(pos) = rest.find("]]>") {
        w(writer, &rest[..pos + 2])?;
        w(writer, "]]><![CDATA[")?;
        rest = &rest[pos + 2..];
    }
    w(writer, rest)
}

/// Schreibt einen Kommentar, prueft auf XML-Restriktionen.
fn write_comment(writer: &mut impl Write, text: &str) -> Result<()> {
    if text.contains("--") || text.ends_with('-') {
        return Err(Error::invalid_markup(
            "Kommentar-Text enthaelt '--' oder endet mit '-' (XML 1.0 Section 2.5)",
        ));
    }
    w(writer, "<!--")?;
    w(writer, text)?;
    w(writer, "-->")
}

/// Schreibt eine Processing Instruction, prueft auf XML-Restriktionen.
fn write_pi(writer: &mut impl Write, target: &str, data: &str) -> Result<()> {
    if data.contains("?>") {
        return Err(Error::invalid_markup("PI-Data enthaelt '?>' (XML 1.0 Section 2.6)"));
    }
    w(writer, "<?")?;
    w(writer, target)?;
    if !data.is_empty() {
        w(writer, " ")?;
        w(writer, data)?;
    }
    w(writer, "?>")
}

/// Schreibt eine DOCTYPE-Deklaration (ohne internes Subset).
fn write_doctype(writer: &mut impl Write, dtd: &DtdContent) -> Result<()> {
    w(writer, "<!DOCTYPE ")?;
    w(writer, &dtd.name)?;
    if !dtd.public_id.is_empty() {
        w(writer, " PUBLIC \"")?;
        w(writer, &dtd.public_id)?;
        w(writer, "\" \"")?;
        w(writer, &dtd.system_id)?;
        w(writer, "\"")?;
    } else if !dtd.system_id.is_empty() {
        w(writer, " SYSTEM \"")?;
        w(writer, &dtd.system_id)?;
        w(writer, "\"")?;
    }
    w(writer, ">")
}

fn write_ns_decls(writer: &mut impl Write, ns_decls: &[PrefixMapping], reserved: Option<u8>) -> Result<()> {
    for ns in ns_decls {
        if ns.prefix.is_empty() {
            w(writer, " xmlns=\"")?;
        } else {
            w(writer, " xmlns:")?;
            w(writer, &ns.prefix)?;
            w(writer, "=\"")?;
        }
        write_escaped_with(writer, &ns.uri, reserved, escape_attr)?;
        w(writer, "\"")?;
    }
    Ok(())
}

// ============================================================================
// XmlSerializer
// ============================================================================

/// Bytes, die als Teil von Markup oder in XML-Namen vorkommen und daher
/// nicht reserviert werden koennen.
const MARKUP_BYTES: &[u8] = b"<>&\"'/=?!-[]:#;_.";

/// Streaming XML-Serializer, schreibt direkt in `W: Write`.
pub struct XmlSerializer<W: Write> {
    writer: W,
    element_stack: Vec<Rc<QName>>,
    pending_start: Option<ElementStart>,
    pending_ns: Vec<PrefixMapping>,
    in_cdata: bool,
    in_dtd: bool,
    declaration: bool,
    /// Byte, das nie literal im Text erscheinen darf (Token-Schutz).
    reserved: Option<u8>,
}

impl<W: Write> XmlSerializer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            element_stack: Vec::new(),
            pending_start: None,
            pending_ns: Vec::new(),
            in_cdata: false,
            in_dtd: false,
            declaration: false,
            reserved: None,
        }
    }

    /// Write `<?xml version="1.0" encoding="UTF-8"?>` on `StartDocument`.
    pub fn with_declaration(mut self, value: bool) -> Self {
        self.declaration = value;
        self
    }

    /// Never emit `byte` literally: text and attribute values get a character
    /// reference instead, markup that cannot be escaped is rejected.
    ///
    /// `byte` must be ASCII punctuation that is neither a markup delimiter
    /// nor an XML name character (`_`, `.`).
    ///
    /// Used when the output runs through a [`TokenSubstitutingSink`](crate::TokenSubstitutingSink).
    pub fn with_escaped_byte(mut self, byte: u8) -> Result<Self> {
        if !byte.is_ascii_punctuation() || MARKUP_BYTES.contains(&byte) {
            return Err(Error::InvalidToken(byte));
        }
        self.reserved = Some(byte);
        Ok(self)
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Current element nesting depth (open start tags).
    pub fn depth(&self) -> usize {
        self.element_stack.len() + usize::from(self.pending_start.is_some())
    }

    /// Schreibt einen offenen Start-Tag, flusht den Writer und gibt ihn zurueck.
    pub fn finish(mut self) -> Result<W> {
        self.flush_pending_start(false)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Writes bytes unescaped after closing any pending start tag.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.flush_pending_start(false)?;
        Ok(self.writer.write_all(bytes)?)
    }

    /// Prueft Markup, das nicht escaped werden kann, auf das reservierte Byte.
    fn check_unescapable(&self, what: &'static str, text: &str) -> Result<()> {
        match self.reserved {
            Some(byte) if text.as_bytes().contains(&byte) => Err(Error::invalid_markup(format!(
                "{what} contains reserved token byte '{}'",
                byte as char
            ))),
            _ => Ok(()),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        if self.in_cdata {
            if let Some(byte) = self.reserved {
                // Im CDATA keine Zeichenreferenzen: Sektion unterbrechen
                let mut first = true;
                for chunk in text.split(byte as char) {
                    if !first {
                        write!(self.writer, "]]>&#{byte};<![CDATA[")?;
                    }
                    first = false;
                    write_cdata_text(&mut self.writer, chunk)?;
                }
                return Ok(());
            }
            return write_cdata_text(&mut self.writer, text);
        }
        write_escaped_with(&mut self.writer, text, self.reserved, escape_text)
    }

    /// Schreibt den gepufferten Start-Tag und pusht das Element auf den Stack.
    fn flush_pending_start(&mut self, self_closing: bool) -> Result<()> {
        let Some(start) = self.pending_start.take() else {
            return Ok(());
        };
        let ns_decls = std::mem::take(&mut self.pending_ns);
        let name = start.name.qualified();
        self.check_unescapable("element name", &name)?;
        for ns in &ns_decls {
            self.check_unescapable("namespace prefix", &ns.prefix)?;
        }

        w(&mut self.writer, "<")?;
        w(&mut self.writer, &name)?;
        write_ns_decls(&mut self.writer, &ns_decls, self.reserved)?;
        for attr in start.attributes.iter() {
            let attr_name = attr.name.qualified();
            self.check_unescapable("attribute name", &attr_name)?;
            w(&mut self.writer, " ")?;
            w(&mut self.writer, &attr_name)?;
            w(&mut self.writer, "=\"")?;
            write_escaped_with(&mut self.writer, &attr.value, self.reserved, escape_attr)?;
            w(&mut self.writer, "\"")?;
        }

        if self_closing {
            w(&mut self.writer, "/>")
        } else {
            w(&mut self.writer, ">")?;
            self.element_stack.push(start.name);
            Ok(())
        }
    }
}

impl<W: Write> EventSink for XmlSerializer<W> {
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        // Innerhalb der DTD nur das Ende beachten
        if self.in_dtd && !matches!(event, SaxEvent::EndDtd) {
            return Ok(());
        }
        match event {
            SaxEvent::StartDocument => {
                if self.declaration {
                    w(&mut self.writer, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
                }
            }
            SaxEvent::EndDocument => {
                self.flush_pending_start(false)?;
                self.writer.flush()?;
            }
            SaxEvent::StartPrefixMapping(pm) => {
                self.flush_pending_start(false)?;
                self.pending_ns.push(pm.clone());
            }
            SaxEvent::EndPrefixMapping(_) => {}
            SaxEvent::StartElement(se) => {
                self.flush_pending_start(false)?;
                self.pending_start = Some(se.clone());
            }
            SaxEvent::EndElement(name) => {
                if self.pending_start.is_some() {
                    self.flush_pending_start(true)?;
                } else {
                    let open = self.element_stack.pop().ok_or_else(|| Error::UnbalancedEndElement {
                        name: name.qualified().into_owned().into(),
                    })?;
                    w(&mut self.writer, "</")?;
                    w(&mut self.writer, &open.qualified())?;
                    w(&mut self.writer, ">")?;
                }
            }
            SaxEvent::Characters(text) | SaxEvent::IgnorableWhitespace(text) => {
                if !text.is_empty() {
                    self.flush_pending_start(false)?;
                    self.write_text(text)?;
                }
            }
            SaxEvent::Comment(text) => {
                self.flush_pending_start(false)?;
                self.check_unescapable("comment", text)?;
                write_comment(&mut self.writer, text)?;
            }
            SaxEvent::ProcessingInstruction(pi) => {
                self.flush_pending_start(false)?;
                self.check_unescapable("processing instruction", &pi.target)?;
                self.check_unescapable("processing instruction", &pi.data)?;
                write_pi(&mut self.writer, &pi.target, &pi.data)?;
            }
            SaxEvent::StartCdata => {
                self.flush_pending_start(false)?;
                w(&mut self.writer, "<![CDATA[")?;
                self.in_cdata = true;
            }
            SaxEvent::EndCdata => {
                if self.in_cdata {
                    w(&mut self.writer, "]]>")?;
                    self.in_cdata = false;
                }
            }
            SaxEvent::StartDtd(dtd) => {
                self.check_unescapable("DOCTYPE", &dtd.name)?;
                self.check_unescapable("DOCTYPE", &dtd.public_id)?;
                self.check_unescapable("DOCTYPE", &dtd.system_id)?;
                write_doctype(&mut self.writer, dtd)?;
                self.in_dtd = true;
            }
            SaxEvent::EndDtd => self.in_dtd = false,
            // Entity-Inhalt kommt als Text; Grenzen selbst erzeugen kein Markup
            SaxEvent::StartEntity(_) | SaxEvent::EndEntity(_) => {}
            SaxEvent::SkippedEntity(name) => {
                self.flush_pending_start(false)?;
                self.check_unescapable("entity reference", name)?;
                w(&mut self.writer, "&")?;
                w(&mut self.writer, name)?;
                w(&mut self.writer, ";")?;
            }
        }
        Ok(())
    }
}
