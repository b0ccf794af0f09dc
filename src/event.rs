//! SAX event model.
//!
//! One [`SaxEvent`] per content-handler or lexical-handler callback. The set is
//! closed: every consumer matches exhaustively, so a new kind is a compile
//! error everywhere it is not handled.

use std::rc::Rc;

use crate::qname::QName;

/// One attribute of a start element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The qualified name of the attribute.
    pub name: Rc<QName>,
    /// The attribute value (already unescaped).
    pub value: Rc<str>,
}

/// Content for StartElement events: name + attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementStart {
    pub name: Rc<QName>,
    pub attributes: Rc<[Attribute]>,
}

impl ElementStart {
    /// Sucht ein Attribut ueber seinen lokalen Namen (ohne Namespace).
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.uri.is_empty() && &*a.name.local_name == local_name)
            .map(|a| &*a.value)
    }
}

/// Content for Processing Instruction events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiContent {
    /// The PI target name.
    pub target: Rc<str>,
    /// The PI data (may be empty).
    pub data: Rc<str>,
}

/// Content for StartDTD events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtdContent {
    /// The document type name.
    pub name: Rc<str>,
    /// The public identifier (empty if none).
    pub public_id: Rc<str>,
    /// The system identifier (empty if none).
    pub system_id: Rc<str>,
}

/// Content for StartPrefixMapping events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMapping {
    /// Bound prefix (empty string for the default namespace).
    pub prefix: Rc<str>,
    pub uri: Rc<str>,
}

/// A single structured-markup callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaxEvent {
    StartDocument,
    EndDocument,
    StartElement(ElementStart),
    EndElement(Rc<QName>),
    /// Character data.
    Characters(Rc<str>),
    /// Whitespace in element-only content. Never merged with `Characters`.
    IgnorableWhitespace(Rc<str>),
    Comment(Rc<str>),
    ProcessingInstruction(PiContent),
    StartPrefixMapping(PrefixMapping),
    /// End of a prefix scope; carries the prefix.
    EndPrefixMapping(Rc<str>),
    /// Beginning of an entity expansion; carries the entity name.
    StartEntity(Rc<str>),
    EndEntity(Rc<str>),
    StartCdata,
    EndCdata,
    StartDtd(DtdContent),
    EndDtd,
    /// Entity reference the producer did not expand.
    SkippedEntity(Rc<str>),
}

impl SaxEvent {
    /// Characters-Event aus einem String erzeugen.
    pub fn characters(text: impl Into<Rc<str>>) -> Self {
        Self::Characters(text.into())
    }

    /// StartElement ohne Attribute.
    pub fn start_element(name: QName) -> Self {
        Self::StartElement(ElementStart {
            name: Rc::new(name),
            attributes: Rc::from(Vec::new()),
        })
    }

    /// StartElement mit Attributen `(name, value)`.
    pub fn start_element_with<'a>(
        name: QName,
        attributes: impl IntoIterator<Item = (QName, &'a str)>,
    ) -> Self {
        let attributes: Vec<Attribute> = attributes
            .into_iter()
            .map(|(name, value)| Attribute {
                name: Rc::new(name),
                value: Rc::from(value),
            })
            .collect();
        Self::StartElement(ElementStart {
            name: Rc::new(name),
            attributes: Rc::from(attributes),
        })
    }

    pub fn end_element(name: QName) -> Self {
        Self::EndElement(Rc::new(name))
    }

    pub fn comment(text: impl Into<Rc<str>>) -> Self {
        Self::Comment(text.into())
    }

    pub fn processing_instruction(target: impl Into<Rc<str>>, data: impl Into<Rc<str>>) -> Self {
        Self::ProcessingInstruction(PiContent {
            target: target.into(),
            data: data.into(),
        })
    }

    /// True for `Characters` and `IgnorableWhitespace`.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Characters(_) | Self::IgnorableWhitespace(_))
    }

    /// True for events delivered through a SAX lexical handler.
    pub fn is_lexical(&self) -> bool {
        matches!(
            self,
            Self::Comment(_)
                | Self::StartEntity(_)
                | Self::EndEntity(_)
                | Self::StartCdata
                | Self::EndCdata
                | Self::StartDtd(_)
                | Self::EndDtd
        )
    }

    /// Text payload of a text event.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Characters(t) | Self::IgnorableWhitespace(t) => Some(t),
            _ => None,
        }
    }

    /// Kurzname fuer Log-Ausgaben.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartDocument => "startDocument",
            Self::EndDocument => "endDocument",
            Self::StartElement(_) => "startElement",
            Self::EndElement(_) => "endElement",
            Self::Characters(_) => "characters",
            Self::IgnorableWhitespace(_) => "ignorableWhitespace",
            Self::Comment(_) => "comment",
            Self::ProcessingInstruction(_) => "processingInstruction",
            Self::StartPrefixMapping(_) => "startPrefixMapping",
            Self::EndPrefixMapping(_) => "endPrefixMapping",
            Self::StartEntity(_) => "startEntity",
            Self::EndEntity(_) => "endEntity",
            Self::StartCdata => "startCDATA",
            Self::EndCdata => "endCDATA",
            Self::StartDtd(_) => "startDTD",
            Self::EndDtd => "endDTD",
            Self::SkippedEntity(_) => "skippedEntity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_element_with_attributen() {
        let ev = SaxEvent::start_element_with(
            QName::new("", "a"),
            [(QName::new("", "href"), "/x"), (QName::new("urn:x", "id"), "1")],
        );
        let SaxEvent::StartElement(se) = ev else {
            panic!("Expected StartElement");
        };
        assert_eq!(&*se.name.local_name, "a");
        assert_eq!(se.attributes.len(), 2);
        assert_eq!(se.attribute("href"), Some("/x"));
        // Namespaced Attribute werden ueber den lokalen Namen nicht gefunden
        assert_eq!(se.attribute("id"), None);
    }

    #[test]
    fn text_klassifikation() {
        assert!(SaxEvent::characters("x").is_text());
        assert!(SaxEvent::IgnorableWhitespace(" ".into()).is_text());
        assert!(!SaxEvent::comment("x").is_text());
        assert_eq!(SaxEvent::characters("abc").text(), Some("abc"));
        assert_eq!(SaxEvent::EndDtd.text(), None);
    }

    #[test]
    fn lexical_klassifikation() {
        let lexical = [
            SaxEvent::comment("c"),
            SaxEvent::StartEntity("e".into()),
            SaxEvent::EndEntity("e".into()),
            SaxEvent::StartCdata,
            SaxEvent::EndCdata,
            SaxEvent::StartDtd(DtdContent {
                name: "html".into(),
                public_id: "".into(),
                system_id: "".into(),
            }),
            SaxEvent::EndDtd,
        ];
        for ev in &lexical {
            assert!(ev.is_lexical(), "{}", ev.kind());
        }
        assert!(!SaxEvent::StartDocument.is_lexical());
        assert!(!SaxEvent::SkippedEntity("x".into()).is_lexical());
        assert!(!SaxEvent::processing_instruction("t", "d").is_lexical());
    }

    /// Whitespace und Characters sind unterschiedliche Events.
    #[test]
    fn whitespace_ungleich_characters() {
        assert_ne!(
            SaxEvent::characters(" "),
            SaxEvent::IgnorableWhitespace(" ".into())
        );
    }

    #[test]
    fn kind_namen() {
        assert_eq!(SaxEvent::StartCdata.kind(), "startCDATA");
        assert_eq!(SaxEvent::end_element(QName::new("", "a")).kind(), "endElement");
    }
}
