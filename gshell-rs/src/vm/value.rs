//! Runtime values.
//!
//! Evaluating an [`Argument`] yields a [`Value`].  The data variants map
//! back onto arguments through [`Value::encode`]; host values (functions,
//! processes, mailboxes, modules) have no source form.

use std::fmt;
use std::sync::Arc;

use crate::arglist::ArgList;
use crate::error::VmError;
use crate::mailbox::Mailbox;
use crate::symbol::{kw, Symbol};
use crate::syntax::printer::{format_number, render_argument, render_script};
use crate::syntax::{Argument, Script};

use super::function::{Function, Module, Process};

/// A runtime value.
#[derive(Clone, Default)]
pub enum Value {
    /// Result of an empty script.
    #[default]
    Nothing,
    Symbol(Symbol),
    Number(f64),
    Text(String),
    List(ArgList<Argument>),
    Script(Arc<Script>),
    Function(Arc<Function>),
    Process(Arc<dyn Process>),
    Mailbox(Mailbox<Value>),
    Module(Arc<Module>),
}

impl Value {
    /// Name of the type, as used in cast and encoding errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Symbol(_) => "symbol",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Script(_) => "script",
            Value::Function(_) => "function",
            Value::Process(_) => "process",
            Value::Mailbox(_) => "mailbox",
            Value::Module(_) => "module",
        }
    }

    /// Re-encode as a syntax argument so the value can be stored in a list.
    pub fn encode(&self) -> Result<Argument, VmError> {
        match self {
            Value::Symbol(s) => Ok(Argument::Symbol(s.clone())),
            Value::Number(n) => Ok(Argument::Number(*n)),
            Value::Text(t) => Ok(Argument::Text(t.clone())),
            Value::List(l) => Ok(Argument::List(l.clone())),
            Value::Script(s) => Ok(Argument::Script(Arc::clone(s))),
            other => Err(VmError::UnencodableValue(other.type_name())),
        }
    }

    /// Only the `true` symbol is true; any other symbol is false.
    pub fn cast_bool(&self) -> Result<bool, VmError> {
        match self {
            Value::Symbol(s) => Ok(s.text() == "true"),
            other => Err(VmError::CastError { from: other.type_name(), to: "bool" }),
        }
    }

    pub fn cast_f64(&self) -> Result<f64, VmError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(VmError::CastError { from: other.type_name(), to: "number" }),
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_mailbox(&self) -> Option<&Mailbox<Value>> {
        match self {
            Value::Mailbox(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Symbol(if b { kw::true_() } else { kw::false_() })
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

// ── Formatting ────────────────────────────────────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => f.write_str("<nothing>"),
            Value::Symbol(s) => f.write_str(s.text()),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(t) => f.write_str(t),
            Value::List(l) => f.write_str(&render_argument(&Argument::List(l.clone()))),
            Value::Script(s) => f.write_str(&render_script(s)),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Process(p) => write!(f, "<process {}>", p.name()),
            Value::Mailbox(_) => f.write_str("<mailbox>"),
            Value::Module(m) => write!(f, "<module {}>", m.path()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => f.write_str("Nothing"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Text(t) => write!(f, "Text({t:?})"),
            Value::List(l) => write!(f, "List({l:?})"),
            Value::Script(s) => write!(f, "Script({s})"),
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::Process(p) => write!(f, "Process({})", p.name()),
            Value::Mailbox(m) => write!(f, "{m:?}"),
            Value::Module(m) => write!(f, "Module({})", m.path()),
        }
    }
}

/// Data variants compare structurally, host values by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Script(a), Value::Script(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Process(a), Value::Process(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Value::Mailbox(a), Value::Mailbox(b)) => a.same_mailbox(b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
