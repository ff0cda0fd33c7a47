//! Symbols: the identifiers of the language.
//!
//! A symbol is both a name (command heads, variable names, scope keys) and a
//! first-class value that evaluates to itself.  Two symbols are equal iff
//! their text is equal; cloning is a reference-count increment.

use std::borrow::Borrow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::InvalidSymbol;

/// The lexical grammar every symbol must match: a letter or one of the
/// punctuation characters, followed by letters, digits, punctuation or `$`.
const SYMBOL_GRAMMAR: &str =
    r"^[\p{Ll}\p{Lu}!?.\\\-+*&^%#@~][\p{Ll}\p{Lu}!?.\\\-+*&^%$#@~0-9]*$";

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| Regex::new(SYMBOL_GRAMMAR).expect("symbol grammar is a valid regex"))
}

/// Returns `true` if `text` is a well-formed symbol.
///
/// Text shaped like a numeric literal (`-1`, `-2.5`) matches the grammar but
/// is not a symbol: the reader would read it back as a number.
pub fn is_valid_symbol(text: &str) -> bool {
    grammar().is_match(text) && !is_number_text(text)
}

/// Shape of a numeric literal: `-?digits(.digits)?`.
pub(crate) fn is_number_text(word: &str) -> bool {
    let unsigned = word.strip_prefix('-').unwrap_or(word);
    let (int, frac) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.map_or(true, digits)
}

// ── Symbol ────────────────────────────────────────────────────────────────────

/// An identifier compared by content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Build a symbol, validating `text` against the symbol grammar.
    pub fn new(text: &str) -> Result<Self, InvalidSymbol> {
        if is_valid_symbol(text) {
            Ok(Symbol(Arc::from(text)))
        } else {
            Err(InvalidSymbol(text.to_owned()))
        }
    }

    /// Build a symbol from text known to be valid at compile time.
    ///
    /// Used for the runtime's own keywords (`let`, `true`, `stdout`, …).
    pub(crate) fn keyword(text: &'static str) -> Self {
        debug_assert!(is_valid_symbol(text), "bad keyword {text:?}");
        Symbol(Arc::from(text))
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", &self.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Symbol {
    type Error = InvalidSymbol;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Symbol::new(text)
    }
}

// ── Well-known symbols ────────────────────────────────────────────────────────

pub(crate) mod kw {
    use super::Symbol;

    pub fn true_() -> Symbol {
        Symbol::keyword("true")
    }
    pub fn false_() -> Symbol {
        Symbol::keyword("false")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
