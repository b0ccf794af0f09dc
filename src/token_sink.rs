//! Byte-level token substitution.
//!
//! [`TokenSubstitutingSink`] sits between a serializer and the final output.
//! Every occurrence of the doubled token byte (`~~` by default) is replaced
//! by the next entry of a [`ReplacementList`], strictly in stream order and
//! regardless of how the bytes are split across `write` calls.

use std::collections::VecDeque;
use std::io::{self, Write};

use log::{trace, warn};
use memchr::memchr;

use crate::error::Error;
use crate::Result;

/// Token byte used when none is configured. Two of them form one token.
pub const DEFAULT_TOKEN: u8 = b'~';

/// FIFO of replacement strings, consumed one per matched token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementList {
    entries: VecDeque<String>,
    consumed: usize,
}

impl ReplacementList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Haengt eine Ersetzung an (muss vor dem zugehoerigen Token geschrieben sein).
    pub fn push(&mut self, replacement: impl Into<String>) {
        self.entries.push_back(replacement.into());
    }

    /// Noch nicht verbrauchte Eintraege.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    /// Bereits verbrauchte Eintraege.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next(&mut self) -> Result<String> {
        let entry = self.entries.pop_front().ok_or(Error::ReplacementListExhausted {
            consumed: self.consumed,
        })?;
        self.consumed += 1;
        Ok(entry)
    }
}

impl<S: Into<String>> FromIterator<S> for ReplacementList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
            consumed: 0,
        }
    }
}

/// Writer decorator replacing doubled token bytes with list entries.
///
/// A token byte at the end of one `write` call is held back until the next
/// call (or [`finish`](Self::finish)) decides whether it starts a token.
///
/// The stream must be closed with [`finish`](Self::finish): it is the only
/// place that writes a held-back byte. `flush` keeps it back, and dropping
/// the sink loses it (logged as a warning).
///
/// ```
/// use std::io::Write;
/// use sarx::{ReplacementList, TokenSubstitutingSink};
///
/// let list: ReplacementList = ["1", "2"].into_iter().collect();
/// let mut sink = TokenSubstitutingSink::new(Vec::new(), list);
/// sink.write_all(b"A~").unwrap();
/// sink.write_all(b"~B~~C").unwrap();
/// assert_eq!(sink.finish().unwrap(), b"A1B2C");
/// ```
#[derive(Debug)]
pub struct TokenSubstitutingSink<W: Write> {
    inner: W,
    token: u8,
    replacements: ReplacementList,
    /// Letzter Aufruf endete mit einem einzelnen Token-Byte.
    pending: PendingToken,
}

/// Haengendes Token-Byte; warnt, wenn es ohne `finish` verworfen wird.
#[derive(Debug, Default)]
struct PendingToken(bool);

impl Drop for PendingToken {
    fn drop(&mut self) {
        if self.0 {
            warn!("token sink dropped without finish(): pending token byte lost");
        }
    }
}

impl<W: Write> TokenSubstitutingSink<W> {
    pub fn new(inner: W, replacements: ReplacementList) -> Self {
        Self::with_token(inner, DEFAULT_TOKEN, replacements)
    }

    pub fn with_token(inner: W, token: u8, replacements: ReplacementList) -> Self {
        Self {
            inner,
            token,
            replacements,
            pending: PendingToken::default(),
        }
    }

    pub fn token(&self) -> u8 {
        self.token
    }

    pub fn replacements(&self) -> &ReplacementList {
        &self.replacements
    }

    /// Zugriff fuer den Producer, der Eintraege vor dem Token nachschiebt.
    pub fn replacements_mut(&mut self) -> &mut ReplacementList {
        &mut self.replacements
    }

    /// Ein Token-Byte wartet auf seinen Partner.
    pub fn has_pending(&self) -> bool {
        self.pending.0
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Schliesst den Strom: ein haengendes Token-Byte wird literal geschrieben.
    pub fn finish(mut self) -> Result<W> {
        if self.pending.0 {
            self.pending.0 = false;
            self.inner.write_all(&[self.token])?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn substitute(&mut self) -> io::Result<()> {
        let replacement = self.replacements.next().map_err(Error::into_io)?;
        trace!(
            "token #{} replaced by {} byte(s)",
            self.replacements.consumed(),
            replacement.len()
        );
        self.inner.write_all(replacement.as_bytes())
    }
}

impl<W: Write> Write for TokenSubstitutingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut pos = 0;

        if self.pending.0 {
            self.pending.0 = false;
            if buf[0] == self.token {
                self.substitute()?;
                pos = 1;
            } else {
                self.inner.write_all(&[self.token])?;
            }
        }

        while let Some(rel) = memchr(self.token, &buf[pos..]) {
            let at = pos + rel;
            self.inner.write_all(&buf[pos..at])?;
            match buf.get(at + 1) {
                Some(&next) if next == self.token => {
                    self.substitute()?;
                    pos = at + 2;
                }
                Some(_) => {
                    // Einzelnes Token-Byte mitten im Puffer ist literal
                    self.inner.write_all(&buf[at..=at])?;
                    pos = at + 1;
                }
                None => {
                    self.pending.0 = true;
                    return Ok(buf.len());
                }
            }
        }

        self.inner.write_all(&buf[pos..])?;
        Ok(buf.len())
    }

    /// Flusht den inneren Writer; ein haengendes Token-Byte bleibt zurueckgehalten.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
