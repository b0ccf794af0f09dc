//! Central error types for event recording, replay and byte rewriting.

use core::fmt;
use std::borrow::Cow;

/// All errors raised by buffers, pipeline stages and byte sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// XML input could not be parsed into events.
    XmlParseError(String),
    /// An event cannot be written as well-formed XML (e.g. `--` inside a comment).
    InvalidMarkup(Cow<'static, str>),
    /// An end-element event arrived without a matching open element.
    UnbalancedEndElement {
        /// Qualified name of the offending end tag.
        name: Cow<'static, str>,
    },
    /// More substitution tokens were matched than replacement entries supplied.
    ReplacementListExhausted {
        /// Number of replacements already consumed when the list ran dry.
        consumed: usize,
    },
    /// The substitution token byte must be ASCII punctuation that is neither a markup delimiter nor an XML name character.
    InvalidToken(u8),
    /// A downstream consumer rejected an event.
    SinkFailed(Cow<'static, str>),
    /// The event stream ended while a stage was still buffering a document.
    UnterminatedDocument {
        /// Name of the first stage still waiting for EndDocument.
        stage: String,
    },
    /// An include reference could not be resolved.
    IncludeNotFound(String),
    /// A command-line or configuration parameter is malformed.
    InvalidParameter(String),
    /// Ein IO-Fehler beim Lesen oder Schreiben.
    IoError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::XmlParseError(msg) => write!(f, "XML parse error: {msg}"),
            Self::InvalidMarkup(msg) => write!(f, "cannot serialize event as XML: {msg}"),
            Self::UnbalancedEndElement { name } => {
                if name.is_empty() {
                    write!(f, "end element without open element")
                } else {
                    write!(f, "end element '{name}' without open element")
                }
            }
            Self::ReplacementListExhausted { consumed } => write!(
                f,
                "replacement list exhausted: token #{} matched but only {consumed} replacement(s) supplied",
                consumed + 1
            ),
            Self::InvalidToken(b) => write!(f, "invalid substitution token byte 0x{b:02X}"),
            Self::SinkFailed(msg) => {
                if msg.is_empty() {
                    write!(f, "downstream sink failed")
                } else {
                    write!(f, "downstream sink failed: {msg}")
                }
            }
            Self::UnterminatedDocument { stage } => {
                write!(f, "document not terminated: stage '{stage}' still buffering")
            }
            Self::IncludeNotFound(src) => write!(f, "include '{src}' could not be resolved"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    /// Holt einen in `io::Error` verpackten eigenen Fehler wieder heraus
    /// (z.B. `ReplacementListExhausted` aus dem Token-Sink).
    fn from(e: std::io::Error) -> Self {
        if let Some(inner) = e.get_ref().and_then(|inner| inner.downcast_ref::<Error>()) {
            return inner.clone();
        }
        Self::IoError(e.to_string())
    }
}

impl Error {
    /// Erstellt einen `SinkFailed` Fehler mit Nachricht.
    pub fn sink_failed(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::SinkFailed(msg.into())
    }

    /// Erstellt einen `InvalidMarkup` Fehler mit Nachricht.
    pub fn invalid_markup(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidMarkup(msg.into())
    }

    /// Verpackt den Fehler als `io::Error` (fuer `Write`-Implementierungen).
    pub(crate) fn into_io(self) -> std::io::Error {
        std::io::Error::other(self)
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_list_exhausted_display() {
        let msg = Error::ReplacementListExhausted { consumed: 2 }.to_string();
        assert!(msg.contains("exhausted"), "{msg}");
        assert!(msg.contains("#3"), "{msg}");
        assert!(msg.contains("only 2"), "{msg}");
    }

    #[test]
    fn unbalanced_end_element_display() {
        let e = Error::UnbalancedEndElement { name: "p".into() };
        assert_eq!(e.to_string(), "end element 'p' without open element");

        let e = Error::UnbalancedEndElement { name: "".into() };
        assert_eq!(e.to_string(), "end element without open element");
    }

    #[test]
    fn sink_failed_display() {
        assert_eq!(Error::sink_failed("").to_string(), "downstream sink failed");
        assert_eq!(
            Error::sink_failed("closed").to_string(),
            "downstream sink failed: closed"
        );
    }

    #[test]
    fn unterminated_document_display() {
        let e = Error::UnterminatedDocument { stage: "relay".into() };
        assert_eq!(e.to_string(), "document not terminated: stage 'relay' still buffering");
    }

    #[test]
    fn invalid_token_display_hex() {
        assert!(Error::InvalidToken(b'<').to_string().contains("0x3C"));
    }

    /// Eigene Fehler ueberleben den Umweg ueber `io::Error`.
    #[test]
    fn io_roundtrip_preserves_variant() {
        let io = Error::ReplacementListExhausted { consumed: 1 }.into_io();
        assert_eq!(io.kind(), std::io::ErrorKind::Other);
        assert_eq!(Error::from(io), Error::ReplacementListExhausted { consumed: 1 });
    }

    #[test]
    fn plain_io_error_becomes_io_variant() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let Error::IoError(msg) = Error::from(io) else {
            panic!("Expected IoError");
        };
        assert!(msg.contains("pipe closed"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
