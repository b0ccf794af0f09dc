//! `{name}` placeholder scanner for text runs.
//!
//! A text run is split into literal pieces and parameter names. An opening
//! brace without a closing one before the end of the run is kept as the
//! pending fragment and prefixed onto the next run. Nesting is not
//! recognised: the first `}` after a `{` ends the name.

use memchr::memchr;

/// Ein Stueck eines gescannten Text-Runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    Text(&'a str),
    Parameter(&'a str),
}

/// Scanner-Zustand zwischen zwei `characters`-Aufrufen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PlaceholderScanner {
    /// Unterminiertes Fragment inkl. fuehrendem `{`.
    pending: Option<String>,
}

impl PlaceholderScanner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Scannt `text` (mit vorangestelltem Pending-Fragment) und ruft `emit` pro Stueck auf.
    pub(crate) fn scan(&mut self, text: &str, mut emit: impl FnMut(Piece<'_>)) {
        let joined;
        let input: &str = match self.pending.take() {
            Some(mut head) => {
                head.push_str(text);
                joined = head;
                &joined
            }
            None => text,
        };

        let bytes = input.as_bytes();
        let mut start = 0;
        while let Some(rel) = memchr(b'{', &bytes[start..]) {
            let open = start + rel;
            if open > start {
                emit(Piece::Text(&input[start..open]));
            }
            let Some(rel_close) = memchr(b'}', &bytes[open + 1..]) else {
                // Run endet vor `}`: Rest fuer den naechsten Aufruf aufheben
                self.pending = Some(input[open..].to_owned());
                return;
            };
            let close = open + 1 + rel_close;
            emit(Piece::Parameter(&input[open + 1..close]));
            start = close + 1;
        }
        if start < input.len() {
            emit(Piece::Text(&input[start..]));
        }
    }

    pub(crate) fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub(crate) fn take_pending(&mut self) -> Option<String> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(scanner: &mut PlaceholderScanner, runs: &[&str]) -> Vec<(bool, String)> {
        let mut out = Vec::new();
        for run in runs {
            scanner.scan(run, |piece| match piece {
                Piece::Text(t) => out.push((false, t.to_owned())),
                Piece::Parameter(n) => out.push((true, n.to_owned())),
            });
        }
        out
    }

    fn text(s: &str) -> (bool, String) {
        (false, s.to_owned())
    }

    fn param(s: &str) -> (bool, String) {
        (true, s.to_owned())
    }

    #[test]
    fn ohne_klammern_ein_textstueck() {
        let mut sc = PlaceholderScanner::new();
        assert_eq!(scan_all(&mut sc, &["plain text"]), vec![text("plain text")]);
        assert_eq!(sc.pending(), None);
    }

    #[test]
    fn parameter_in_der_mitte() {
        let mut sc = PlaceholderScanner::new();
        assert_eq!(
            scan_all(&mut sc, &["Hello {name}!"]),
            vec![text("Hello "), param("name"), text("!")]
        );
    }

    #[test]
    fn mehrere_und_angrenzende_parameter() {
        let mut sc = PlaceholderScanner::new();
        assert_eq!(
            scan_all(&mut sc, &["{a}{b} {c}"]),
            vec![param("a"), param("b"), text(" "), param("c")]
        );
    }

    /// `{na` + `me}!` ergibt dieselbe Zerlegung wie der Gesamtstring.
    #[test]
    fn geteilter_platzhalter() {
        let mut split = PlaceholderScanner::new();
        let a = scan_all(&mut split, &["Hel{na", "me}!"]);
        let mut whole = PlaceholderScanner::new();
        let b = scan_all(&mut whole, &["Hel{name}!"]);
        assert_eq!(a, b);
        assert_eq!(a, vec![text("Hel"), param("name"), text("!")]);
    }

    #[test]
    fn pending_ueber_mehrere_runs() {
        let mut sc = PlaceholderScanner::new();
        let out = scan_all(&mut sc, &["x{", "ab", "c"]);
        assert_eq!(out, vec![text("x")]);
        assert_eq!(sc.pending(), Some("{abc"));
        assert_eq!(scan_all(&mut sc, &["}y"]), vec![param("abc"), text("y")]);
        assert_eq!(sc.pending(), None);
    }

    /// Verschachtelung wird nicht erkannt: das erste `}` beendet den Namen.
    #[test]
    fn keine_verschachtelung() {
        let mut sc = PlaceholderScanner::new();
        assert_eq!(
            scan_all(&mut sc, &["{a{b}c}"]),
            vec![param("a{b"), text("c}")]
        );
    }

    #[test]
    fn leerer_name() {
        let mut sc = PlaceholderScanner::new();
        assert_eq!(scan_all(&mut sc, &["a{}b"]), vec![text("a"), param(""), text("b")]);
    }

    #[test]
    fn schliessende_klammer_allein_ist_text() {
        let mut sc = PlaceholderScanner::new();
        assert_eq!(scan_all(&mut sc, &["a}b"]), vec![text("a}b")]);
    }

    #[test]
    fn take_pending_leert_zustand() {
        let mut sc = PlaceholderScanner::new();
        scan_all(&mut sc, &["{open"]);
        assert_eq!(sc.take_pending().as_deref(), Some("{open"));
        assert_eq!(sc.pending(), None);
    }

    #[test]
    fn multibyte_text_um_platzhalter() {
        let mut sc = PlaceholderScanner::new();
        assert_eq!(
            scan_all(&mut sc, &["Grüße {wer}ö"]),
            vec![text("Grüße "), param("wer"), text("ö")]
        );
    }
}
