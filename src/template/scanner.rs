//! Splits a template into literal text runs and candidate code blocks.

use std::ops::Range;

/// One piece of a template, as byte ranges into the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Literal text (never empty)
    Text(Range<usize>),
    /// A `{{ ... }}` block: `outer` includes the delimiters, `inner` does not
    Block {
        outer: Range<usize>,
        inner: Range<usize>,
    },
}

/// Iterator over the [`Piece`]s of a template.
///
/// A `{{` with no matching `}}` ends scanning: it and everything after it
/// come out as one text piece.
pub struct Scanner<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    /// Find the `}}` closing a block whose contents start at `from`.
    /// A `}}` inside a double-quoted string literal does not count.
    fn find_close(&self, from: usize) -> Option<usize> {
        // Delimiters and quotes are ASCII, so byte scanning never splits a char.
        let bytes = self.source.as_bytes();
        let mut i = from;
        let mut in_string = false;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' if in_string => {
                    i += 2;
                    continue;
                }
                b'"' => in_string = !in_string,
                b'}' if !in_string && bytes.get(i + 1) == Some(&b'}') => return Some(i),
                _ => {}
            }
            i += 1;
        }

        None
    }
}

impl Iterator for Scanner<'_> {
    type Item = Piece;

    fn next(&mut self) -> Option<Piece> {
        let start = self.position;
        let len = self.source.len();
        if start >= len {
            return None;
        }

        let rest = &self.source[start..];
        let Some(found) = rest.find("{{") else {
            self.position = len;
            return Some(Piece::Text(start..len));
        };
        let open = start + found;

        if open > start {
            // Emit the text first; the block is picked up on the next call.
            // An unclosed block folds into this text instead.
            if self.find_close(open + 2).is_none() {
                self.position = len;
                return Some(Piece::Text(start..len));
            }
            self.position = open;
            return Some(Piece::Text(start..open));
        }

        match self.find_close(open + 2) {
            Some(close) => {
                self.position = close + 2;
                Some(Piece::Block {
                    outer: open..close + 2,
                    inner: open + 2..close,
                })
            }
            None => {
                self.position = len;
                Some(Piece::Text(start..len))
            }
        }
    }
}
