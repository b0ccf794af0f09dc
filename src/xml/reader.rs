use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};
use std::rc::Rc;

use memchr::{memchr, memchr3};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use super::dtd::parse_doctype;
use super::{ParseOptions, WhitespaceMode};
use crate::error::Error;
use crate::event::{Attribute, ElementStart, PrefixMapping, SaxEvent};
use crate::qname::QName;
use crate::sink::EventSink;
use crate::{FastHashMap, Result};

/// Offenes Element: Name fuer das End-Event, Prefixe fuer EndPrefixMapping.
struct OpenElement {
    name: Rc<QName>,
    prefixes: Vec<Rc<str>>,
    /// Hat bereits ein Kind-Element gesehen (Whitespace danach ist ignorable).
    had_child: bool,
}

/// Zustand beim Umsetzen von quick-xml Events in SAX-Events.
struct Emitter<'a, S: EventSink + ?Sized> {
    sink: &'a mut S,
    options: &'a ParseOptions,
    /// CH-Coalescing: gepufferter Text wird vor jedem Nicht-CH-Event geflusht.
    pending_ch: Option<String>,
    open: Vec<OpenElement>,
    /// Interne Entities aus dem DOCTYPE.
    entities: FastHashMap<String, String>,
}

pub(super) fn emit_events<R: Read, S: EventSink + ?Sized>(
    xml_reader: R,
    options: &ParseOptions,
    sink: &mut S,
) -> Result<()> {
    let mut reader = NsReader::from_reader(BufReader::new(xml_reader));
    reader.config_mut().trim_text(false);

    let mut emitter = Emitter {
        sink,
        options,
        pending_ch: None,
        open: Vec::new(),
        entities: FastHashMap::default(),
    };
    let mut buf = Vec::new();

    emitter.sink.process(&SaxEvent::StartDocument)?;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => emitter.start_element(&reader, &e, false)?,
            Ok(Event::Empty(e)) => emitter.start_element(&reader, &e, true)?,
            Ok(Event::End(_)) => emitter.end_element()?,
            Ok(Event::Text(e)) => {
                let raw = decode(&e)?;
                if emitter.open.is_empty() {
                    if !raw.trim().is_empty() {
                        return Err(Error::XmlParseError(
                            "character data outside root element".to_string(),
                        ));
                    }
                } else if !raw.is_empty() {
                    emitter.coalesce(&normalize_line_endings(raw));
                }
            }
            Ok(Event::CData(e)) => {
                if emitter.open.is_empty() {
                    return Err(Error::XmlParseError(
                        "CDATA section outside root element".to_string(),
                    ));
                }
                emitter.flush_pending_ch(false)?;
                let text = normalize_line_endings(decode(&e)?).into_owned();
                emitter.sink.process(&SaxEvent::StartCdata)?;
                if !text.is_empty() {
                    emitter.sink.process(&SaxEvent::characters(text))?;
                }
                emitter.sink.process(&SaxEvent::EndCdata)?;
            }
            Ok(Event::Comment(e)) => {
                // comments=false: kein Flush, CH-Coalescing weiter aktiv
                if emitter.options.comments {
                    emitter.flush_pending_ch(false)?;
                    let text = normalize_line_endings(decode(&e)?).into_owned();
                    emitter.sink.process(&SaxEvent::comment(text))?;
                }
            }
            Ok(Event::PI(e)) => {
                if emitter.options.processing_instructions {
                    emitter.flush_pending_ch(false)?;
                    let target = decode(e.target())?.to_string();
                    // S zwischen Target und Daten ist Separator, nicht Teil der Daten
                    let data = normalize_line_endings(decode(e.content())?.trim_start()).into_owned();
                    emitter.sink.process(&SaxEvent::processing_instruction(target, data))?;
                }
            }
            Ok(Event::DocType(e)) => {
                let doctype = parse_doctype(decode(&e)?);
                emitter.entities.extend(doctype.entities);
                if emitter.options.dtd {
                    emitter.sink.process(&SaxEvent::StartDtd(doctype.content))?;
                    if emitter.options.comments {
                        for comment in doctype.comments {
                            emitter.sink.process(&SaxEvent::comment(comment))?;
                        }
                    }
                    emitter.sink.process(&SaxEvent::EndDtd)?;
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let name = decode(&e)?;
                emitter.reference(name)?;
            }
            Ok(Event::Decl(_)) => {
                // StartDocument ist schon gemeldet
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlParseError(format!(
                    "parse XML error at {:?}: {e}",
                    reader.buffer_position()
                )));
            }
        }
        buf.clear();
    }

    if let Some(open) = emitter.open.last() {
        return Err(Error::XmlParseError(format!(
            "unexpected end of input, element '{}' not closed",
            open.name
        )));
    }
    emitter.flush_pending_ch(false)?;
    emitter.sink.process(&SaxEvent::EndDocument)?;
    Ok(())
}

impl<S: EventSink + ?Sized> Emitter<'_, S> {
    /// Text an gepufferten CH-Wert anhaengen oder neuen starten.
    fn coalesce(&mut self, text: &str) {
        match &mut self.pending_ch {
            Some(existing) => existing.push_str(text),
            None => self.pending_ch = Some(text.to_string()),
        }
    }

    /// Flusht gepufferten Text. Reiner Whitespace neben Kind-Elementen wird
    /// gemaess `WhitespaceMode` gemeldet; `next_is_child` = naechstes Event ist ein Kind-Start.
    fn flush_pending_ch(&mut self, next_is_child: bool) -> Result<()> {
        let Some(text) = self.pending_ch.take() else {
            return Ok(());
        };
        let beside_child = next_is_child || self.open.last().is_some_and(|o| o.had_child);
        if beside_child && is_xml_whitespace(&text) {
            return match self.options.whitespace {
                WhitespaceMode::Characters => self.sink.process(&SaxEvent::characters(text)),
                WhitespaceMode::Ignorable => {
                    self.sink.process(&SaxEvent::IgnorableWhitespace(text.into()))
                }
                WhitespaceMode::Strip => Ok(()),
            };
        }
        self.sink.process(&SaxEvent::characters(text))
    }

    fn start_element(
        &mut self,
        reader: &NsReader<impl BufRead>,
        e: &BytesStart<'_>,
        is_empty: bool,
    ) -> Result<()> {
        self.flush_pending_ch(!self.open.is_empty())?;
        if let Some(parent) = self.open.last_mut() {
            parent.had_child = true;
        }

        let name = Rc::new(resolve_name(reader, e.name(), true)?);
        let mut mappings: Vec<PrefixMapping> = Vec::new();
        let mut attributes: Vec<Attribute> = Vec::with_capacity(4);

        for attr in e.attributes() {
            let attr = attr.map_err(|er| Error::XmlParseError(er.to_string()))?;
            let key = attr.key.as_ref();
            let raw = std::str::from_utf8(attr.value.as_ref())
                .map_err(|er| Error::XmlParseError(er.to_string()))?;
            let value = unescape_attr_value(&normalize_attr_whitespace(raw), &self.entities).into_owned();

            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                let prefix = key.get(6..).map(decode).transpose()?.unwrap_or("");
                mappings.push(PrefixMapping {
                    prefix: prefix.into(),
                    uri: value.into(),
                });
                continue;
            }
            attributes.push(Attribute {
                name: Rc::new(resolve_name(reader, attr.key, false)?),
                value: value.into(),
            });
        }

        for mapping in &mappings {
            self.sink.process(&SaxEvent::StartPrefixMapping(mapping.clone()))?;
        }
        self.sink.process(&SaxEvent::StartElement(ElementStart {
            name: Rc::clone(&name),
            attributes: attributes.into(),
        }))?;

        self.open.push(OpenElement {
            name,
            prefixes: mappings.into_iter().map(|m| m.prefix).collect(),
            had_child: false,
        });
        if is_empty {
            self.end_element()?;
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        self.flush_pending_ch(false)?;
        let open = self.open.pop().ok_or_else(|| {
            Error::XmlParseError("unerwartetes End-Element bei depth=0".to_string())
        })?;
        self.sink.process(&SaxEvent::EndElement(open.name))?;
        for prefix in open.prefixes {
            self.sink.process(&SaxEvent::EndPrefixMapping(prefix))?;
        }
        Ok(())
    }

    /// `&name;` im Inhalt: Zeichen- und vordefinierte Referenzen werden Text,
    /// interne Entities werden expandiert, unbekannte als SkippedEntity gemeldet.
    fn reference(&mut self, name: &str) -> Result<()> {
        if self.open.is_empty() {
            return Ok(());
        }
        if name.starts_with('#') {
            let ch = resolve_char_reference(name).ok_or_else(|| {
                Error::XmlParseError(format!("invalid character reference '&{name};'"))
            })?;
            let mut utf8 = [0u8; 4];
            self.coalesce(ch.encode_utf8(&mut utf8));
        } else if let Some(resolved) = resolve_predefined_entity(name) {
            self.coalesce(resolved);
        } else if let Some(value) = self.entities.get(name) {
            let text = unescape_attr_value(value, &FastHashMap::default()).into_owned();
            self.flush_pending_ch(false)?;
            let name: Rc<str> = name.into();
            self.sink.process(&SaxEvent::StartEntity(Rc::clone(&name)))?;
            if !text.is_empty() {
                self.sink.process(&SaxEvent::characters(text))?;
            }
            self.sink.process(&SaxEvent::EndEntity(name))?;
        } else {
            self.flush_pending_ch(false)?;
            self.sink.process(&SaxEvent::SkippedEntity(name.into()))?;
        }
        Ok(())
    }
}

/// Loest einen Element- oder Attributnamen gegen die aktuellen Namespace-Bindungen auf.
fn resolve_name(reader: &NsReader<impl BufRead>, name: XmlQName<'_>, element: bool) -> Result<QName> {
    let (ns, local) = if element {
        reader.resolver().resolve_element(name)
    } else {
        reader.resolver().resolve_attribute(name)
    };
    let uri = match ns {
        ResolveResult::Bound(ns) => decode(ns.0)?,
        ResolveResult::Unbound => "",
        ResolveResult::Unknown(prefix) => {
            return Err(Error::XmlParseError(format!(
                "unknown namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            )));
        }
    };
    let local_name = decode(local.as_ref())?;
    let prefix = match name.prefix() {
        Some(p) => decode(p.into_inner())?,
        None => "",
    };
    Ok(QName::with_prefix(uri, local_name, prefix))
}

fn decode(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::XmlParseError(format!("input is not UTF-8: {e}")))
}

fn is_xml_whitespace(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

/// XML 1.0 Sec. 2.11: \r\n -> \n, alleinstehende \r -> \n
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
}

/// XML 1.0 Sec. 3.3.3: Whitespace im Literal wird zu Leerzeichen (\r\n zaehlt als eins).
/// Zeichenreferenzen wie `&#10;` bleiben erhalten, da sie erst danach aufgeloest werden.
fn normalize_attr_whitespace(s: &str) -> Cow<'_, str> {
    if memchr3(b'\t', b'\r', b'\n', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace("\r\n", " ").replace(['\t', '\r', '\n'], " "))
}

/// Loest Zeichen-, vordefinierte und DTD-Referenzen in einem Wert auf.
/// Unbekannte Referenzen bleiben unveraendert.
fn unescape_attr_value<'a>(value: &'a str, entities: &FastHashMap<String, String>) -> Cow<'a, str> {
    let bytes = value.as_bytes();
    let Some(mut amp) = memchr(b'&', bytes) else {
        return Cow::Borrowed(value);
    };

    let mut out = String::with_capacity(value.len());
    let mut pos = 0;
    loop {
        out.push_str(&value[pos..amp]);
        let Some(rel_semi) = memchr(b';', &bytes[amp + 1..]) else {
            out.push_str(&value[amp..]);
            return Cow::Owned(out);
        };
        let semi = amp + 1 + rel_semi;
        let name = &value[amp + 1..semi];
        if name.starts_with('#') {
            match resolve_char_reference(name) {
                Some(ch) => out.push(ch),
                None => out.push_str(&value[amp..=semi]),
            }
        } else if let Some(predef) = resolve_predefined_entity(name) {
            out.push_str(predef);
        } else if let Some(repl) = entities.get(name) {
            out.push_str(repl);
        } else {
            out.push_str(&value[amp..=semi]);
        }
        pos = semi + 1;
        match memchr(b'&', &bytes[pos..]) {
            Some(rel) => amp = pos + rel,
            None => {
                out.push_str(&value[pos..]);
                return Cow::Owned(out);
            }
        }
    }
}

fn resolve_char_reference(ref_name: &str) -> Option<char> {
    let digits = ref_name.strip_prefix('#')?;
    let code_point = if let Some(hex) = digits.strip_prefix('x') {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code_point)
}
