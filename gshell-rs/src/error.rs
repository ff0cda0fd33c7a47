//! Error types for every layer of the runtime.
//!
//! Evaluation failures are [`VmError`]s; the mailbox, the source reader and
//! module loaders each have their own enum which converts into `VmError`
//! transparently so builtins can use `?` throughout.

use std::io;

use thiserror::Error;

use crate::symbol::Symbol;

/// Text that does not match the symbol grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0:?} is not a valid symbol")]
pub struct InvalidSymbol(pub String);

// ── Mailbox ───────────────────────────────────────────────────────────────────

/// Completion error of a mailbox operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// The mailbox no longer accepts the operation (input closed or discarded).
    #[error("mailbox is not in a running state")]
    NotRunning,
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// A syntax error reported by [`crate::syntax::reader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}:{column} {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

// ── Module loading ────────────────────────────────────────────────────────────

/// Failure of a [`crate::vm::ModuleLoader`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module {0} not found")]
    NotFound(String),
    #[error("reading module {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

// ── Evaluation ────────────────────────────────────────────────────────────────

/// Any error raised while evaluating a script.
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    InvalidSymbol(#[from] InvalidSymbol),

    #[error("variable ${0} is not defined")]
    UnboundVariable(Symbol),

    #[error("command {0} not found")]
    CommandNotFound(Symbol),

    #[error("value {0} is not callable")]
    NotCallable(String),

    #[error("function {function} requires {expected} args got {got}")]
    ArityMismatch {
        function: Symbol,
        expected: usize,
        got: usize,
    },

    #[error("{0} is already defined")]
    AlreadyBound(Symbol),

    #[error("function {0} cannot be defined inside another function")]
    NestedFunctionDefinition(Symbol),

    #[error("unable to encode value of type {0} into an argument")]
    UnencodableValue(&'static str),

    #[error("cannot cast value of type {from} to {to}")]
    CastError { from: &'static str, to: &'static str },

    /// Malformed builtin invocation; carries the builtin's usage line.
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("error while loading {path} as {name}, cause: {cause}")]
    ModuleLoad {
        path: String,
        name: Symbol,
        #[source]
        cause: Box<VmError>,
    },

    #[error("there are no loaders configured for this VM")]
    NoLoader,

    #[error("channel {0} not found")]
    ChannelNotFound(Symbol),

    #[error("scope {0} is reserved for the runtime")]
    ReservedScope(Symbol),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
