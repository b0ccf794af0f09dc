//! Include splicing at byte level.
//!
//! [`IncludingSerializer`] serializes an event stream to XML. Every
//! `include` element in [`INCLUDE_NAMESPACE`] is replaced by a substitution
//! token in the byte stream while the resolved content is queued on the
//! [`TokenSubstitutingSink`] underneath. The content thus reaches the output
//! verbatim, without being parsed into events first.
//!
//! Declarations of [`INCLUDE_NAMESPACE`] are not written, so any other
//! element or attribute in that namespace is rejected.
//!
//! ```
//! use sarx::{EventBuffer, EventSink, FastHashMap, IncludingSerializer, ParseOptions};
//!
//! let page = EventBuffer::from_xml_str(
//!     r#"<p xmlns:i="urn:sarx:include">a <i:include src="x"/> b</p>"#,
//!     &ParseOptions::default(),
//! )
//! .unwrap();
//! let mut fragments = FastHashMap::default();
//! fragments.insert("x".to_string(), "<b>raw</b>".to_string());
//!
//! let mut ser = IncludingSerializer::new(Vec::new(), fragments).unwrap();
//! page.to_sink(&mut ser).unwrap();
//! assert_eq!(ser.finish().unwrap(), b"<p>a <b>raw</b> b</p>");
//! ```

use std::io::Write;
use std::rc::Rc;

use log::debug;

use crate::error::Error;
use crate::event::SaxEvent;
use crate::sink::EventSink;
use crate::token_sink::{DEFAULT_TOKEN, ReplacementList, TokenSubstitutingSink};
use crate::xml_serializer::XmlSerializer;
use crate::{FastHashMap, Result};

/// Namespace of the `include` element.
pub const INCLUDE_NAMESPACE: &str = "urn:sarx:include";

/// Lokaler Name des Include-Elements.
const INCLUDE_ELEMENT: &str = "include";

/// Attribut mit der Referenz auf den einzubindenden Inhalt.
const SRC_ATTRIBUTE: &str = "src";

/// Supplies the content for an include reference.
pub trait IncludeResolver {
    fn resolve(&mut self, src: &str) -> Result<String>;
}

impl IncludeResolver for FastHashMap<String, String> {
    fn resolve(&mut self, src: &str) -> Result<String> {
        self.get(src)
            .cloned()
            .ok_or_else(|| Error::IncludeNotFound(src.to_string()))
    }
}

impl<R: IncludeResolver + ?Sized> IncludeResolver for &mut R {
    fn resolve(&mut self, src: &str) -> Result<String> {
        (**self).resolve(src)
    }
}

/// Adapter, um eine Closure als [`IncludeResolver`] zu verwenden.
pub struct FnResolver<F>(pub F);

impl<F: FnMut(&str) -> Result<String>> IncludeResolver for FnResolver<F> {
    fn resolve(&mut self, src: &str) -> Result<String> {
        (self.0)(src)
    }
}

/// XML serializer that splices resolved includes into its byte output.
pub struct IncludingSerializer<W: Write, R> {
    serializer: XmlSerializer<TokenSubstitutingSink<W>>,
    resolver: R,
    token: u8,
    /// >0: innerhalb eines Include-Elements, Inhalt wird verworfen.
    skip_depth: usize,
    /// Prefixe, die an den Include-Namespace gebunden sind (nicht serialisiert).
    include_prefixes: Vec<Rc<str>>,
    included: usize,
}

impl<W: Write, R: IncludeResolver> IncludingSerializer<W, R> {
    pub fn new(writer: W, resolver: R) -> Result<Self> {
        Self::with_token(writer, DEFAULT_TOKEN, resolver)
    }

    /// Fails with [`Error::InvalidToken`] if `token` could appear in markup.
    pub fn with_token(writer: W, token: u8, resolver: R) -> Result<Self> {
        let sink = TokenSubstitutingSink::with_token(writer, token, ReplacementList::new());
        Ok(Self {
            serializer: XmlSerializer::new(sink).with_escaped_byte(token)?,
            resolver,
            token,
            skip_depth: 0,
            include_prefixes: Vec::new(),
            included: 0,
        })
    }

    pub fn with_declaration(mut self, value: bool) -> Self {
        self.serializer = self.serializer.with_declaration(value);
        self
    }

    /// Number of includes spliced so far.
    pub fn included(&self) -> usize {
        self.included
    }

    /// Closes the serializer and the token sink; returns the writer.
    pub fn finish(self) -> Result<W> {
        self.serializer.finish()?.finish()
    }

    fn include(&mut self, src: &str) -> Result<()> {
        let content = self.resolver.resolve(src)?;
        debug!("include '{src}': {} byte(s)", content.len());
        // Ersetzung muss vor dem Token in der Liste stehen
        self.serializer.get_mut().replacements_mut().push(content);
        self.serializer.write_raw(&[self.token, self.token])?;
        self.included += 1;
        Ok(())
    }
}

impl<W: Write, R: IncludeResolver> EventSink for IncludingSerializer<W, R> {
    fn process(&mut self, event: &SaxEvent) -> Result<()> {
        if self.skip_depth > 0 {
            match event {
                SaxEvent::StartElement(_) => self.skip_depth += 1,
                SaxEvent::EndElement(_) => self.skip_depth -= 1,
                _ => {}
            }
            return Ok(());
        }
        match event {
            SaxEvent::StartElement(start)
                if &*start.name.uri == INCLUDE_NAMESPACE
                    && &*start.name.local_name == INCLUDE_ELEMENT =>
            {
                let src = start.attribute(SRC_ATTRIBUTE).ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "<{}> without '{SRC_ATTRIBUTE}' attribute",
                        start.name.qualified()
                    ))
                })?;
                self.include(src)?;
                self.skip_depth = 1;
                Ok(())
            }
            // Include-Namespace wird nie deklariert: ausser `include` nichts darin erlaubt
            SaxEvent::StartElement(start) => {
                if &*start.name.uri == INCLUDE_NAMESPACE {
                    return Err(Error::invalid_markup(format!(
                        "<{}>: only '{INCLUDE_ELEMENT}' is allowed in {INCLUDE_NAMESPACE}",
                        start.name.qualified()
                    )));
                }
                if let Some(attr) = start
                    .attributes
                    .iter()
                    .find(|attr| &*attr.name.uri == INCLUDE_NAMESPACE)
                {
                    return Err(Error::invalid_markup(format!(
                        "attribute '{}' in {INCLUDE_NAMESPACE} on <{}>",
                        attr.name.qualified(),
                        start.name.qualified()
                    )));
                }
                self.serializer.process(event)
            }
            SaxEvent::StartPrefixMapping(pm) if &*pm.uri == INCLUDE_NAMESPACE => {
                self.include_prefixes.push(Rc::clone(&pm.prefix));
                Ok(())
            }
            SaxEvent::EndPrefixMapping(prefix) => {
                match self.include_prefixes.iter().rposition(|p| p == prefix) {
                    Some(pos) => {
                        self.include_prefixes.remove(pos);
                        Ok(())
                    }
                    None => self.serializer.process(event),
                }
            }
            _ => self.serializer.process(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::EventBuffer;
    use crate::xml::ParseOptions;

    fn fragments(entries: &[(&str, &str)]) -> FastHashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn render(xml: &str, resolver: impl IncludeResolver) -> Result<String> {
        let page = EventBuffer::from_xml_str(xml, &ParseOptions::default())?;
        let mut ser = IncludingSerializer::new(Vec::new(), resolver)?;
        page.to_sink(&mut ser)?;
        Ok(String::from_utf8(ser.finish()?).unwrap())
    }

    #[test]
    fn mehrere_includes_in_reihenfolge() {
        let out = render(
            r#"<html xmlns:i="urn:sarx:include"><body><i:include src="a"/><hr/><i:include src="b"/></body></html>"#,
            fragments(&[("a", "<div>A</div>"), ("b", "B~~")]),
        )
        .unwrap();
        assert_eq!(out, "<html><body><div>A</div><hr/>B~~</body></html>");
    }

    /// Literales Token-Byte im Text wird referenziert und nie als Token erkannt.
    #[test]
    fn literale_token_bytes_geschuetzt() {
        let out = render(
            r#"<p xmlns:i="urn:sarx:include" title="a~~b">x~~y<i:include src="a"/></p>"#,
            fragments(&[("a", "!")]),
        )
        .unwrap();
        assert_eq!(out, r#"<p title="a&#126;&#126;b">x&#126;&#126;y!</p>"#);
    }

    /// Inhalt des Include-Elements (Fallback) wird verworfen.
    #[test]
    fn inhalt_des_include_elements_verworfen() {
        let out = render(
            r#"<p xmlns:i="urn:sarx:include"><i:include src="a"><b>fallback</b></i:include>!</p>"#,
            fragments(&[("a", "A")]),
        )
        .unwrap();
        assert_eq!(out, "<p>A!</p>");
    }

    #[test]
    fn unbekannte_referenz() {
        let err = render(
            r#"<p xmlns:i="urn:sarx:include"><i:include src="zzz"/></p>"#,
            fragments(&[]),
        )
        .unwrap_err();
        assert_eq!(err, Error::IncludeNotFound("zzz".into()));
    }

    #[test]
    fn include_ohne_src() {
        let err = render(r#"<i:include xmlns:i="urn:sarx:include"/>"#, fragments(&[])).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn closure_als_resolver() {
        let mut calls = Vec::new();
        let out = render(
            r#"<r xmlns:i="urn:sarx:include"><i:include src="one"/><i:include src="two"/></r>"#,
            FnResolver(|src: &str| {
                calls.push(src.to_string());
                Ok(src.to_uppercase())
            }),
        )
        .unwrap();
        assert_eq!(out, "<r>ONETWO</r>");
        assert_eq!(calls, ["one", "two"]);
    }

    #[test]
    fn ungueltiges_token() {
        let res = IncludingSerializer::with_token(Vec::new(), b'<', fragments(&[]));
        assert!(matches!(res, Err(Error::InvalidToken(b'<'))));
    }

    #[test]
    fn andere_namespaces_bleiben() {
        let out = render(
            r#"<r xmlns:i="urn:sarx:include" xmlns:h="urn:h"><h:x/></r>"#,
            fragments(&[]),
        )
        .unwrap();
        assert_eq!(out, r#"<r xmlns:h="urn:h"><h:x/></r>"#);
    }

    /// Andere Elemente im Include-Namespace haetten keine Deklaration mehr.
    #[test]
    fn fremdes_element_im_include_namespace() {
        let err = render(
            r#"<r xmlns:i="urn:sarx:include"><i:other/></r>"#,
            fragments(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidMarkup(_)));

        let err = render(r#"<r xmlns="urn:sarx:include"/>"#, fragments(&[])).unwrap_err();
        assert!(matches!(err, Error::InvalidMarkup(_)));

        let err = render(
            r#"<r xmlns:i="urn:sarx:include"><p i:src="a"/></r>"#,
            fragments(&[("a", "A")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidMarkup(_)));
    }

    /// Include-Element im Default-Namespace.
    #[test]
    fn include_als_default_namespace() {
        let out = render(
            r#"<r><include xmlns="urn:sarx:include" src="a"/></r>"#,
            fragments(&[("a", "A")]),
        )
        .unwrap();
        assert_eq!(out, "<r>A</r>");
    }

    /// Namenszeichen als Token wuerden Tag-Namen zerreissen.
    #[test]
    fn namenszeichen_als_token_abgelehnt() {
        let res = IncludingSerializer::with_token(Vec::new(), b'_', fragments(&[("x", "X")]));
        assert!(matches!(res, Err(Error::InvalidToken(b'_'))));
    }
}
