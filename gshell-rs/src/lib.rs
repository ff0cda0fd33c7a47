//! gshell: an embeddable interpreter for a small command language.
//!
//! Programs are sequences of commands (`head arg arg…`) whose arguments are
//! symbols, numbers, text, `$variables`, `[lists]` and `{blocks}`.  A host
//! creates a [`Vm`], optionally gives it a module loader and native
//! processes, and runs source through it.  Output produced by `println` and
//! `eprintln` is delivered as [`Value`]s on bounded [`Mailbox`]es the host
//! drains at its own pace.
//!
//! ```no_run
//! # async fn demo() -> Result<(), gshell::VmError> {
//! let vm = gshell::Vm::new();
//! vm.run("let $who world; println hello $who").await?;
//! assert_eq!(vm.stdout().take().await?.to_string(), "hello world\n");
//! # Ok(())
//! # }
//! ```
//!
//! Layout:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`symbol`] | interned identifiers and their grammar |
//! | [`arglist`] | persistent vector used for list values |
//! | [`syntax`] | syntax tree, reader and printer |
//! | [`mailbox`] | bounded actor-backed queues and cancellation |
//! | [`vm`] | scopes, values, builtins and the evaluator |
//! | [`config`] | channel sizing loaded from `key = value` files |
//! | [`error`] | error enums for every layer |

pub mod arglist;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod symbol;
pub mod syntax;
pub mod vm;

pub use arglist::ArgList;
pub use config::{ConfigError, MailboxConfig, RuntimeConfig};
pub use error::{InvalidSymbol, LoadError, MailboxError, ParseError, VmError};
pub use mailbox::{CancelToken, Mailbox, MailboxReader, OverflowPolicy, QualifiedName};
pub use symbol::Symbol;
pub use syntax::{parse, Argument, Command, Script};
pub use vm::{Value, Vm};
