//! Qualified names for elements and attributes.
//!
//! A SAX start/end element carries three name parts: namespace URI, local
//! name and the qualified (prefixed) name. [`QName`] stores URI, local name
//! and the optional prefix; the qualified form is derived on demand.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

/// Element- oder Attributname: URI + local-name + optionaler Prefix.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace URI (leer = kein Namespace).
    pub uri: Rc<str>,
    /// Lokaler Name ohne Prefix.
    pub local_name: Rc<str>,
    /// Prefix aus dem Quelldokument (None = unprefixed).
    pub prefix: Option<Rc<str>>,
}

impl QName {
    /// Erstellt einen QName ohne Prefix.
    pub fn new(uri: impl Into<Rc<str>>, local_name: impl Into<Rc<str>>) -> Self {
        Self {
            uri: uri.into(),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Erstellt einen QName mit Prefix. Ein leerer Prefix wird als `None` gespeichert.
    pub fn with_prefix(
        uri: impl Into<Rc<str>>,
        local_name: impl Into<Rc<str>>,
        prefix: impl Into<Rc<str>>,
    ) -> Self {
        let prefix: Rc<str> = prefix.into();
        Self {
            uri: uri.into(),
            local_name: local_name.into(),
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }

    /// Zerlegt einen qualifizierten Namen (`p:local`) und ordnet ihm die URI zu.
    pub fn from_qualified(uri: impl Into<Rc<str>>, qualified: &str) -> Self {
        match qualified.split_once(':') {
            Some((prefix, local)) => Self::with_prefix(uri, local, prefix),
            None => Self::new(uri, qualified),
        }
    }

    /// Qualified name as written in markup: `prefix:local` or just `local`.
    pub fn qualified(&self) -> Cow<'_, str> {
        match self.prefix.as_deref() {
            Some(pfx) => Cow::Owned(format!("{pfx}:{}", self.local_name)),
            None => Cow::Borrowed(&self.local_name),
        }
    }

    /// Vergleicht nur URI + local-name (Prefix ist fuer die Identitaet irrelevant).
    pub fn same_expanded_name(&self, other: &QName) -> bool {
        self.uri == other.uri && self.local_name == other.local_name
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            write!(f, "QName({})", self.qualified())
        } else {
            write!(f, "QName({{{}}}{})", self.uri, self.qualified())
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}
