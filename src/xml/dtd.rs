use crate::event::DtdContent;
use crate::FastHashMap;

/// Zerlegter DOCTYPE-Inhalt.
pub(super) struct Doctype {
    pub(super) content: DtdContent,
    /// Interne `<!ENTITY name "value">` Deklarationen.
    pub(super) entities: FastHashMap<String, String>,
    /// Kommentare aus dem internen Subset, in Dokumentreihenfolge.
    pub(super) comments: Vec<String>,
}

/// Parst den Inhalt eines DOCTYPE-Events.
///
/// quick-xml liefert den gesamten Inhalt zwischen `<!DOCTYPE ` und `>`.
/// Beispiele:
///   `html` → name="html"
///   `root SYSTEM "root.dtd"` → name="root", system="root.dtd"
///   `A [ <!ENTITY x "v"> ]` → name="A", entities={x: v}
pub(super) fn parse_doctype(raw: &str) -> Doctype {
    let trimmed = raw.trim();

    // Name: erstes Token (vor Whitespace oder '[')
    let name_end = trimmed
        .find(|c: char| c.is_whitespace() || c == '[')
        .unwrap_or(trimmed.len());
    let name = &trimmed[..name_end];
    let rest = trimmed[name_end..].trim_start();

    let mut public = String::new();
    let mut system = String::new();

    let rest = if let Some(after) = rest.strip_prefix("SYSTEM") {
        let (sys, remaining) = extract_quoted_string(after.trim_start());
        system = sys;
        remaining.trim_start()
    } else if let Some(after) = rest.strip_prefix("PUBLIC") {
        let (pub_id, remaining) = extract_quoted_string(after.trim_start());
        public = pub_id;
        let (sys, remaining) = extract_quoted_string(remaining.trim_start());
        system = sys;
        remaining.trim_start()
    } else {
        rest
    };

    let mut entities = FastHashMap::default();
    let mut comments = Vec::new();
    if let Some(open) = rest.find('[') {
        let after_bracket = &rest[open + 1..];
        if let Some(close) = after_bracket.rfind(']') {
            scan_internal_subset(&after_bracket[..close], &mut entities, &mut comments);
        }
    }

    Doctype {
        content: DtdContent {
            name: name.into(),
            public_id: public.into(),
            system_id: system.into(),
        },
        entities,
        comments,
    }
}

/// Extrahiert einen quoted String (einfache oder doppelte Anfuehrungszeichen).
fn extract_quoted_string(s: &str) -> (String, &str) {
    let Some(&quote) = s.as_bytes().first() else {
        return (String::new(), s);
    };
    if quote != b'"' && quote != b'\'' {
        return (String::new(), s);
    }
    match s[1..].find(quote as char) {
        Some(end) => (s[1..1 + end].to_string(), &s[1 + end + 1..]),
        None => (String::new(), s),
    }
}

/// Sammelt interne Entities und Kommentare aus dem Subset.
/// Externe Entities (SYSTEM/PUBLIC) und andere Deklarationen werden uebersprungen.
fn scan_internal_subset(
    subset: &str,
    entities: &mut FastHashMap<String, String>,
    comments: &mut Vec<String>,
) {
    let mut pos = 0;
    while pos < subset.len() {
        let rest = &subset[pos..];
        if let Some(body) = rest.strip_prefix("<!--") {
            let Some(end) = body.find("-->") else {
                break;
            };
            comments.push(body[..end].to_string());
            pos += 4 + end + 3;
            continue;
        }
        if let Some(decl) = rest.strip_prefix("<!ENTITY") {
            let Some(gt) = decl.find('>') else {
                break;
            };
            if let Some((name, value)) = parse_internal_entity(&decl[..gt]) {
                entities.insert(name.to_string(), value.to_string());
            }
            pos += "<!ENTITY".len() + gt + 1;
            continue;
        }
        match rest.chars().next() {
            Some(c) => pos += c.len_utf8(),
            None => break,
        }
    }
}

/// `name "value"` → (name, value); Parameter-Entities (`% name`) und externe werden ignoriert.
fn parse_internal_entity(decl: &str) -> Option<(&str, &str)> {
    let decl = decl.trim_start();
    if decl.starts_with('%') {
        return None;
    }
    let name_end = decl.find(char::is_whitespace)?;
    let name = &decl[..name_end];
    let after_name = decl[name_end..].trim_start();
    let quote = after_name.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value_end = after_name[1..].find(quote)?;
    Some((name, &after_name[1..1 + value_end]))
}
