//! Syntax tree consumed by the evaluator.
//!
//! The vocabulary is fixed: a [`Script`] is an ordered list of [`Command`]s,
//! a command is a head [`Symbol`] plus [`Argument`]s, and an argument is one
//! of symbol, number, text, variable, list or nested script.
//!
//! [`reader::parse`] turns source text into a tree; [`printer`] renders a
//! tree back into its canonical text (the `Display` impls below).

pub mod printer;
pub mod reader;

use std::fmt;
use std::sync::Arc;

use crate::arglist::ArgList;
use crate::symbol::Symbol;

pub use reader::parse;

/// Head of the command a bare `{ ... }` block in command position reads as.
pub(crate) const BLOCK_COMMAND: &str = "do";

/// One argument of a [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Symbol(Symbol),
    Number(f64),
    Text(String),
    /// `$name`; holds the name without the sigil.
    Variable(Symbol),
    List(ArgList<Argument>),
    Script(Arc<Script>),
}

impl Argument {
    /// Short kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Argument::Symbol(_) => "symbol",
            Argument::Number(_) => "number",
            Argument::Text(_) => "text",
            Argument::Variable(_) => "variable",
            Argument::List(_) => "list",
            Argument::Script(_) => "script",
        }
    }

    pub fn as_script(&self) -> Option<&Arc<Script>> {
        match self {
            Argument::Script(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Script> for Argument {
    fn from(script: Script) -> Self {
        Argument::Script(Arc::new(script))
    }
}

/// `head arg1 arg2 …`
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub head: Symbol,
    pub args: Vec<Argument>,
}

impl Command {
    pub fn new(head: Symbol, args: Vec<Argument>) -> Self {
        Command { head, args }
    }

    /// `true` for a `do { ... }` command, which prints as a bare block.
    pub(crate) fn is_bare_block(&self) -> bool {
        self.head.text() == BLOCK_COMMAND
            && matches!(self.args.as_slice(), [Argument::Script(_)])
    }
}

/// An ordered sequence of commands, `{ cmd; cmd }` in source form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub commands: Vec<Command>,
}

impl Script {
    pub fn new(commands: Vec<Command>) -> Self {
        Script { commands }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&printer::render_script(self))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&printer::render_command(self))
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&printer::render_argument(self))
    }
}
