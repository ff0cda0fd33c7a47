//! Source text reader.
//!
//! ```text
//! script   := block | commands
//! block    := '{' commands '}'
//! commands := (command (';' | '\n'))*     separator optional after a bare block
//! command  := block | word argument*
//! argument := word | number | '$' word | string | '[' argument* ']' | block
//! string   := '"' (escape | char)* '"' | '"""' raw '"""'
//! ```
//!
//! A block standing where a command is expected reads as `do { … }`.
//! Newlines are free inside lists and between commands; within a command
//! they end it.  Positions in [`ParseError`] are 1-based.

use super::{Argument, Command, Script, BLOCK_COMMAND};
use crate::arglist::ArgList;
use crate::error::ParseError;
use crate::symbol::{is_number_text, Symbol};

/// Parse `src` into a [`Script`].
///
/// A source that is a single `{ … }` block yields that block; anything else,
/// including a block followed by more commands, is read as a bare sequence
/// of commands.
pub fn parse(src: &str) -> Result<Script, ParseError> {
    let mut r = Reader::new(src);
    r.skip_blank();
    if r.peek() == Some('{') {
        let script = r.block()?;
        r.skip_separators();
        if r.at_end() {
            return Ok(script);
        }
        r = Reader::new(src);
    }
    r.commands(None)
}

// ── Reader ────────────────────────────────────────────────────────────────────

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ';' | '{' | '}' | '[' | ']' | '"')
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Reader {
    fn new(src: &str) -> Self {
        Reader { chars: src.chars().collect(), pos: 0, line: 1, column: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn starts_with(&self, pat: &str) -> bool {
        pat.chars().enumerate().all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError { line: self.line, column: self.column, message: message.into() }
    }

    fn expect(&mut self, want: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{want}', found '{c}'"))),
            None => Err(self.error(format!("expected '{want}', found end of input"))),
        }
    }

    /// Skip spaces and tabs, stopping at newlines.
    fn skip_inline(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() && c != '\n') {
            self.bump();
        }
    }

    /// Skip all whitespace, newlines included.
    fn skip_blank(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Skip whitespace and command separators.
    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() || c == ';') {
            self.bump();
        }
    }

    // ── Structure ─────────────────────────────────────────────────────────────

    fn block(&mut self) -> Result<Script, ParseError> {
        self.expect('{')?;
        let script = self.commands(Some('}'))?;
        self.expect('}')?;
        Ok(script)
    }

    /// Read commands up to `close` (left unconsumed) or end of input.
    fn commands(&mut self, close: Option<char>) -> Result<Script, ParseError> {
        let mut commands = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None if close.is_some() => return Err(self.error("unterminated block")),
                None => break,
                Some(c) if Some(c) == close => break,
                Some(_) => {}
            }
            let command = self.command(close)?;
            let ends_itself = command.is_bare_block();
            commands.push(command);
            match self.peek() {
                None | Some(';') | Some('\n') => {}
                Some(c) if Some(c) == close => {}
                // A closing brace also ends a bare block statement.
                Some(_) if ends_itself => {}
                Some(c) => return Err(self.error(format!("unexpected '{c}' after command"))),
            }
        }
        Ok(Script::new(commands))
    }

    fn command(&mut self, close: Option<char>) -> Result<Command, ParseError> {
        if self.peek() == Some('{') {
            let block = self.block()?;
            self.skip_inline();
            return Ok(Command::new(Symbol::keyword(BLOCK_COMMAND), vec![block.into()]));
        }
        let (line, column) = (self.line, self.column);
        let word = self.word()?;
        if is_number_text(&word) {
            return Err(ParseError {
                line,
                column,
                message: format!("command name expected, found number {word}"),
            });
        }
        let head = self.symbol(&word, line, column)?;
        let mut args = Vec::new();
        loop {
            self.skip_inline();
            match self.peek() {
                None | Some(';') | Some('\n') => break,
                Some(c) if Some(c) == close => break,
                Some(_) => args.push(self.argument()?),
            }
        }
        Ok(Command::new(head, args))
    }

    fn argument(&mut self) -> Result<Argument, ParseError> {
        match self.peek() {
            Some('{') => Ok(self.block()?.into()),
            Some('[') => self.list(),
            Some('"') => self.text().map(Argument::Text),
            Some('$') => {
                let (line, column) = (self.line, self.column);
                self.bump();
                let name = self.word()?;
                Ok(Argument::Variable(self.symbol(&name, line, column)?))
            }
            Some(c @ ('}' | ']')) => Err(self.error(format!("unexpected '{c}'"))),
            _ => {
                let (line, column) = (self.line, self.column);
                let word = self.word()?;
                if is_number_text(&word) {
                    word.parse::<f64>().map(Argument::Number).map_err(|e| ParseError {
                        line,
                        column,
                        message: format!("bad number {word}: {e}"),
                    })
                } else {
                    Ok(Argument::Symbol(self.symbol(&word, line, column)?))
                }
            }
        }
    }

    fn list(&mut self) -> Result<Argument, ParseError> {
        self.expect('[')?;
        let mut items = ArgList::nil();
        loop {
            self.skip_blank();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(Argument::List(items));
                }
                None => return Err(self.error("unterminated list")),
                Some(_) => items = items.push(self.argument()?),
            }
        }
    }

    // ── Tokens ────────────────────────────────────────────────────────────────

    fn word(&mut self) -> Result<String, ParseError> {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        if word.is_empty() {
            return Err(match self.peek() {
                Some(c) => self.error(format!("unexpected '{c}'")),
                None => self.error("unexpected end of input"),
            });
        }
        Ok(word)
    }

    fn symbol(&self, word: &str, line: usize, column: usize) -> Result<Symbol, ParseError> {
        Symbol::new(word).map_err(|e| ParseError { line, column, message: e.to_string() })
    }

    fn text(&mut self) -> Result<String, ParseError> {
        if self.starts_with("\"\"\"") {
            return self.raw_text();
        }
        let (line, column) = (self.line, self.column);
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ParseError { line, column, message: "unterminated string".into() })
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('"' | '\\')) => out.push(c),
                    Some(c) => return Err(self.error(format!("unknown escape '\\{c}'"))),
                    None => {
                        return Err(ParseError {
                            line,
                            column,
                            message: "unterminated string".into(),
                        })
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn raw_text(&mut self) -> Result<String, ParseError> {
        let (line, column) = (self.line, self.column);
        for _ in 0..3 {
            self.bump();
        }
        let mut out = String::new();
        while !self.starts_with("\"\"\"") {
            match self.bump() {
                Some(c) => out.push(c),
                None => {
                    return Err(ParseError {
                        line,
                        column,
                        message: "unterminated raw string".into(),
                    })
                }
            }
        }
        for _ in 0..3 {
            self.bump();
        }
        Ok(out)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
