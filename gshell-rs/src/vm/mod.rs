//! The evaluator.
//!
//! A [`Vm`] owns everything one interpreter instance needs: the builtin
//! table, the root scope with the default channels, the module table and
//! the optional module loader.  Nothing is process-global, so any number of
//! VMs can coexist.
//!
//! ```text
//!   root context ── stdout / stderr / stdin mailboxes
//!     ├── <main.gshell> module context ── scripts given to Vm::run
//!     └── imported module contexts
//! ```
//!
//! Each command runs in a disposable child of the scope its script runs
//! in; see [`interp`] for the dispatch order.
//!
//! The default channels are spawned on construction, so a `Vm` must be
//! built inside a Tokio runtime.

mod builtins;
mod context;
mod function;
mod interp;
mod loader;
mod value;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::{MailboxConfig, RuntimeConfig};
use crate::error::VmError;
use crate::mailbox::{CancelToken, Mailbox, MailboxReader, QualifiedName};
use crate::symbol::Symbol;
use crate::syntax::{self, Script};

pub use builtins::Builtin;
pub use context::Context;
pub use function::{identity_process, process_fn, Function, Module, Process, ProcessCall};
pub use loader::{FsLoader, MemoryLoader, ModuleLoader, SOURCE_EXTENSION};
pub use value::Value;

/// Path of the module scripts passed to [`Vm::run`] belong to.
pub const MAIN_MODULE: &str = "<main.gshell>";

/// One interpreter instance.
pub struct Vm {
    builtins: HashMap<Symbol, Builtin>,
    root: Context,
    main: Arc<Module>,
    modules: Mutex<HashMap<String, Arc<Module>>>,
    loader: Option<Arc<dyn ModuleLoader>>,
    channels: Mutex<HashMap<QualifiedName, Mailbox<Value>>>,
    stdout: Mailbox<Value>,
    stderr: Mailbox<Value>,
    config: RuntimeConfig,
    cancel: CancelToken,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let root = Context::root();
        let mut channels = HashMap::new();
        let mut open = |id: &'static str, settings: &MailboxConfig| {
            let mailbox: Mailbox<Value> = settings.build(config.request_queue);
            let name = QualifiedName::local(id);
            debug!(channel = %name, capacity = settings.capacity, policy = ?settings.policy, "channel created");
            root.set(name.id.clone(), Value::Mailbox(mailbox.clone()));
            channels.insert(name, mailbox.clone());
            mailbox
        };
        let stdout = open("stdout", &config.stdout);
        let stderr = open("stderr", &config.stderr);
        open("stdin", &config.stdin);

        let main = Arc::new(Module::new(MAIN_MODULE, &root));
        let modules = HashMap::from([(MAIN_MODULE.to_owned(), Arc::clone(&main))]);

        Vm {
            builtins: builtins::table(),
            root,
            main,
            modules: Mutex::new(modules),
            loader: None,
            channels: Mutex::new(channels),
            stdout,
            stderr,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.set_loader(loader);
        self
    }

    pub fn set_loader(&mut self, loader: impl ModuleLoader + 'static) {
        self.loader = Some(Arc::new(loader));
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Scope holding the default channels; parent of every module scope.
    pub fn root_context(&self) -> &Context {
        &self.root
    }

    pub fn main_module(&self) -> &Arc<Module> {
        &self.main
    }

    pub fn module(&self, path: &str) -> Option<Arc<Module>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner).get(path).cloned()
    }

    /// Read side of the channel `println` writes to.
    pub fn stdout(&self) -> MailboxReader<Value> {
        self.stdout.reader()
    }

    /// Read side of the channel `eprintln` writes to.
    pub fn stderr(&self) -> MailboxReader<Value> {
        self.stderr.reader()
    }

    /// Token every blocking push made by a builtin observes.  Cancelling it
    /// fails those pushes with [`crate::MailboxError::Cancelled`].
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Bind a host process under `name` in the root scope.
    pub fn define_process(&self, name: &str, process: Arc<dyn Process>) -> Result<(), VmError> {
        let sym = Symbol::new(name)?;
        if !self.root.bind(sym.clone(), Value::Process(process)) {
            return Err(VmError::AlreadyBound(sym));
        }
        Ok(())
    }

    /// Get or create the user channel `scope:id`.
    pub fn open_channel(&self, scope: &str, id: &str) -> Result<Mailbox<Value>, VmError> {
        let name = QualifiedName::parse(scope, id)?;
        if QualifiedName::is_reserved_scope(&name.scope) {
            return Err(VmError::ReservedScope(name.scope));
        }
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let mailbox = channels.entry(name).or_insert_with_key(|name| {
            debug!(channel = %name, capacity = self.config.channel.capacity, "channel created");
            self.config.channel.build(self.config.request_queue)
        });
        Ok(mailbox.clone())
    }

    /// Stop accepting input on every channel; buffered values stay readable.
    pub fn shutdown(&self) {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(channels = channels.len(), "vm shutdown");
        for mailbox in channels.values() {
            mailbox.close_input();
        }
    }

    /// Parse `src` and run it in the main module.
    pub async fn run(&self, src: &str) -> Result<Value, VmError> {
        let script = syntax::parse(src)?;
        self.eval(&script).await
    }

    /// Run an already parsed script in the main module.
    pub async fn eval(&self, script: &Script) -> Result<Value, VmError> {
        self.eval_script(script, self.main.context(), &self.main).await
    }

    /// Load and run the module at `path` unless it is already loaded.
    pub(crate) async fn import_module(&self, path: &str) -> Result<Arc<Module>, VmError> {
        if let Some(module) = self.module(path) {
            return Ok(module);
        }
        let loader = self.loader.as_ref().ok_or(VmError::NoLoader)?;
        let script = loader.parse(path)?;

        let module = Arc::new(Module::new(path, &self.root));
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), Arc::clone(&module));
        debug!(path, commands = script.commands.len(), "loading module");

        if let Err(err) = self.eval_script(&script, module.context(), &module).await {
            self.modules.lock().unwrap_or_else(PoisonError::into_inner).remove(path);
            return Err(err);
        }
        Ok(module)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
