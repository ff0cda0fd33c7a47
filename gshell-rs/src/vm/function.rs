//! Functions, modules and host processes.
//!
//! A [`Function`] is immutable once defined: it records the module that owns
//! it, the scope it closes over, its parameter names and its body.  A
//! [`Module`] owns a definition table that only ever grows and a top-level
//! scope whose parent is the VM's root scope.
//!
//! Hosts extend the language with [`Process`]es: native callables that
//! receive already-evaluated arguments.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::VmError;
use crate::symbol::Symbol;
use crate::syntax::{Argument, Script};

use super::context::Context;
use super::value::Value;

// ── Function ──────────────────────────────────────────────────────────────────

/// A user-defined function.
#[derive(Debug)]
pub struct Function {
    pub name: Symbol,
    /// Path of the owning module.
    pub module: String,
    /// Scope captured at definition; parent of every invocation scope.
    pub closure: Context,
    pub params: Vec<Symbol>,
    pub body: Arc<Script>,
}

// ── Module ────────────────────────────────────────────────────────────────────

/// A loaded module: its function table and top-level scope.
pub struct Module {
    path: String,
    context: Context,
    functions: RwLock<HashMap<Symbol, Arc<Function>>>,
}

impl Module {
    pub(crate) fn new(path: impl Into<String>, root: &Context) -> Self {
        Module { path: path.into(), context: root.new_child(), functions: RwLock::default() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Top-level scope the module's source runs in.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Names of every defined function, sorted.
    pub fn function_names(&self) -> Vec<Symbol> {
        let mut names: Vec<Symbol> = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Register `func`; a name is defined at most once.
    pub(crate) fn define(&self, func: Arc<Function>) -> Result<(), VmError> {
        let mut table = self.functions.write().unwrap_or_else(PoisonError::into_inner);
        if table.contains_key(&func.name) {
            return Err(VmError::AlreadyBound(func.name.clone()));
        }
        debug!(module = %self.path, function = %func.name, params = func.params.len(), "function defined");
        table.insert(func.name.clone(), func);
        Ok(())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("functions", &self.function_names())
            .finish()
    }
}

// ── Host processes ────────────────────────────────────────────────────────────

/// Call record handed to a [`Process`].
#[derive(Debug, Default)]
pub struct ProcessCall {
    /// Arguments, evaluated in the caller's scope.
    pub args: Vec<Value>,
    pub return_value: Value,
    /// Set to abort the calling script with this error.
    pub fail_with: Option<VmError>,
}

impl ProcessCall {
    pub fn new(args: Vec<Value>) -> Self {
        ProcessCall { args, ..Self::default() }
    }

    pub fn ret(&mut self, value: impl Into<Value>) {
        self.return_value = value.into();
    }

    pub fn fail(&mut self, err: VmError) {
        self.fail_with = Some(err);
    }

    pub fn finish(self) -> Result<Value, VmError> {
        match self.fail_with {
            Some(err) => Err(err),
            None => Ok(self.return_value),
        }
    }
}

/// A native callable bound into a scope.
pub trait Process: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, call: &mut ProcessCall);
}

struct ProcessFn<F> {
    name: String,
    f: F,
}

impl<F> Process for ProcessFn<F>
where
    F: Fn(&mut ProcessCall) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, call: &mut ProcessCall) {
        (self.f)(call)
    }
}

/// Wrap a closure as a [`Process`].
pub fn process_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Process>
where
    F: Fn(&mut ProcessCall) + Send + Sync + 'static,
{
    Arc::new(ProcessFn { name: name.into(), f })
}

/// A process that ignores its arguments and returns `value`.
pub fn identity_process(name: impl Into<String>, value: Value) -> Arc<dyn Process> {
    process_fn(name, move |call| call.ret(value.clone()))
}

// ── Command call record ───────────────────────────────────────────────────────

/// State of one command invocation.
///
/// `context` is a disposable child of `caller` created for this command
/// alone; builtins pick which of the two each piece of work runs in.
pub(crate) struct CallStack<'a> {
    pub head: &'a Symbol,
    pub args: &'a [Argument],
    pub context: Context,
    pub caller: Context,
    pub module: Arc<Module>,
    pub return_value: Value,
    pub fail_with: Option<VmError>,
}

impl<'a> CallStack<'a> {
    pub fn new(head: &'a Symbol, args: &'a [Argument], caller: &Context, module: &Arc<Module>) -> Self {
        CallStack {
            head,
            args,
            context: caller.new_child(),
            caller: caller.clone(),
            module: Arc::clone(module),
            return_value: Value::Nothing,
            fail_with: None,
        }
    }

    /// Record the outcome of the handler that served this call.
    pub fn settle(&mut self, outcome: Result<Value, VmError>) {
        match outcome {
            Ok(v) => self.return_value = v,
            Err(e) => self.fail_with = Some(e),
        }
    }

    pub fn finish(self) -> Result<Value, VmError> {
        match self.fail_with {
            Some(err) => Err(err),
            None => Ok(self.return_value),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
