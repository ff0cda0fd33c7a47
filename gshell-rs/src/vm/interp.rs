//! Script evaluation and command dispatch.
//!
//! A command head is resolved in this order:
//!
//! 1. the builtin table,
//! 2. the calling scope and its ancestors (functions, processes, modules),
//! 3. the function table of the module the script belongs to.
//!
//! Evaluation is recursive through scripts, so the recursive entry points
//! return boxed futures.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::trace;

use crate::arglist::ArgList;
use crate::error::VmError;
use crate::syntax::{Argument, Command, Script};

use super::context::Context;
use super::function::{CallStack, Function, Module, ProcessCall};
use super::value::Value;
use super::Vm;

impl Vm {
    /// Run every command of `script` in `ctx`; the value of the last one is
    /// the script's value.
    pub(crate) fn eval_script<'a>(
        &'a self,
        script: &'a Script,
        ctx: &'a Context,
        module: &'a Arc<Module>,
    ) -> BoxFuture<'a, Result<Value, VmError>> {
        async move {
            let mut last = Value::Nothing;
            for command in &script.commands {
                last = self.eval_command(command, ctx, module).await?;
            }
            Ok(last)
        }
        .boxed()
    }

    fn eval_command<'a>(
        &'a self,
        command: &'a Command,
        caller: &'a Context,
        module: &'a Arc<Module>,
    ) -> BoxFuture<'a, Result<Value, VmError>> {
        async move {
            let head = &command.head;
            trace!(command = %head, args = command.args.len(), module = %module.path(), "dispatch");
            let mut call = CallStack::new(head, &command.args, caller, module);

            let outcome = if let Some(&builtin) = self.builtins.get(head) {
                self.run_builtin(builtin, &call).await
            } else if let Some(value) = call.context.get(head.text()) {
                self.call_value(value, &call).await
            } else if let Some(func) = module.function(head.text()) {
                self.invoke(&func, call.args, &call.context, module, module).await
            } else {
                Err(VmError::CommandNotFound(head.clone()))
            };

            call.settle(outcome);
            call.finish()
        }
        .boxed()
    }

    /// Evaluate one argument in `ctx`.
    pub(crate) fn eval_argument<'a>(
        &'a self,
        arg: &'a Argument,
        ctx: &'a Context,
        module: &'a Arc<Module>,
    ) -> BoxFuture<'a, Result<Value, VmError>> {
        async move {
            match arg {
                Argument::Symbol(s) => Ok(Value::Symbol(s.clone())),
                Argument::Number(n) => Ok(Value::Number(*n)),
                Argument::Text(t) => Ok(Value::Text(t.clone())),
                Argument::Variable(name) => {
                    ctx.get(name.text()).ok_or_else(|| VmError::UnboundVariable(name.clone()))
                }
                Argument::Script(script) => self.eval_script(script, &ctx.new_child(), module).await,
                Argument::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval_argument(item, ctx, module).await?.encode()?);
                    }
                    Ok(Value::List(ArgList::from(out)))
                }
            }
        }
        .boxed()
    }

    /// Evaluate `args` left to right, stopping at the first failure.
    pub(crate) async fn eval_all(
        &self,
        args: &[Argument],
        ctx: &Context,
        module: &Arc<Module>,
    ) -> Result<Vec<Value>, VmError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_argument(arg, ctx, module).await?);
        }
        Ok(values)
    }

    /// Invoke a value found in scope under the command's head.
    async fn call_value(&self, value: Value, call: &CallStack<'_>) -> Result<Value, VmError> {
        match value {
            Value::Function(func) => {
                self.invoke(&func, call.args, &call.context, &call.module, &call.module).await
            }
            Value::Process(process) => {
                let args = self.eval_all(call.args, &call.context, &call.module).await?;
                let mut pcall = ProcessCall::new(args);
                trace!(process = process.name(), args = pcall.args.len(), "process call");
                process.run(&mut pcall);
                pcall.finish()
            }
            Value::Module(target) => {
                let Some((Argument::Symbol(name), rest)) = call.args.split_first() else {
                    return Err(VmError::Usage("<module> <function> [args...]"));
                };
                let func = target
                    .function(name.text())
                    .ok_or_else(|| VmError::CommandNotFound(name.clone()))?;
                self.invoke(&func, rest, &call.context, &call.module, &target).await
            }
            other => Err(VmError::NotCallable(format!("{} ({})", call.head, other.type_name()))),
        }
    }

    /// Check arity, evaluate `args` in `ctx`, then run `func`.  No argument
    /// is evaluated when the count is wrong.
    async fn invoke(
        &self,
        func: &Function,
        args: &[Argument],
        ctx: &Context,
        module: &Arc<Module>,
        fallback: &Arc<Module>,
    ) -> Result<Value, VmError> {
        check_arity(func, args.len())?;
        let values = self.eval_all(args, ctx, module).await?;
        self.call_function(func, values, fallback).await
    }

    /// Run `func` with already evaluated `args`.
    ///
    /// The body runs in a fresh function scope under the function's closure,
    /// with its owning module current so its own helpers resolve.
    pub(crate) async fn call_function(
        &self,
        func: &Function,
        args: Vec<Value>,
        fallback: &Arc<Module>,
    ) -> Result<Value, VmError> {
        check_arity(func, args.len())?;
        let scope = func.closure.new_function_child();
        for (param, value) in func.params.iter().zip(args) {
            scope.set(param.clone(), value);
        }
        let owner = self.module(&func.module).unwrap_or_else(|| Arc::clone(fallback));
        trace!(function = %func.name, module = %owner.path(), "call");
        self.eval_script(&func.body, &scope, &owner).await
    }
}

fn check_arity(func: &Function, got: usize) -> Result<(), VmError> {
    if got != func.params.len() {
        return Err(VmError::ArityMismatch {
            function: func.name.clone(),
            expected: func.params.len(),
            got,
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MailboxReader;
    use crate::vm::{process_fn, MemoryLoader};

    async fn drain(out: &MailboxReader<Value>) -> Vec<String> {
        let mut lines = Vec::new();
        while out.depth() > 0 {
            lines.push(out.take().await.unwrap().to_string());
        }
        lines
    }

    fn first_number(call: &ProcessCall) -> Result<f64, VmError> {
        call.args.first().map_or(Err(VmError::Usage("<number>")), Value::cast_f64)
    }

    fn with_arith(vm: &Vm) {
        let dec = process_fn("dec", |call| {
            let n = first_number(call);
            match n {
                Ok(n) => call.ret(n - 1.0),
                Err(e) => call.fail(e),
            }
        });
        let positive = process_fn("positive", |call| {
            let n = first_number(call);
            call.ret(matches!(n, Ok(n) if n > 0.0));
        });
        vm.define_process("dec", dec).unwrap();
        vm.define_process("positive", positive).unwrap();
    }

    #[tokio::test]
    async fn script_value_is_last_command() {
        let vm = Vm::new();
        assert_eq!(vm.run("true; false").await.unwrap(), Value::from(false));
        assert_eq!(vm.run("").await.unwrap(), Value::Nothing);
    }

    #[tokio::test]
    async fn failure_stops_the_script() {
        let vm = Vm::new();
        let err = vm.run("println before; nope; println after").await.unwrap_err();
        assert!(matches!(err, VmError::CommandNotFound(ref s) if s.text() == "nope"));
        assert_eq!(drain(&vm.stdout()).await, ["before\n"]);
    }

    #[tokio::test]
    async fn unbound_variable() {
        let vm = Vm::new();
        let err = vm.run("println $ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "variable $ghost is not defined");
    }

    #[tokio::test]
    async fn lists_evaluate_their_elements() {
        let vm = Vm::new();
        let v = vm.run("let $x 2; let $l [ 1 $x { true } [ $x ] ]").await.unwrap();
        assert_eq!(v.to_string(), "[ 1 2 true [ 2 ] ]");
        let err = vm.run("let $bad [ {} ]").await.unwrap_err();
        assert!(matches!(err, VmError::UnencodableValue("nothing")));
    }

    #[tokio::test]
    async fn inner_scope_shadows_outer() {
        let vm = Vm::new();
        vm.run("let $a 1; do { let $a 2; println $a }; println $a").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["2\n", "1\n"]);
    }

    #[tokio::test]
    async fn functions_check_arity() {
        let vm = Vm::new();
        vm.run("func pair [$a $b] { println $a $b }; pair x y").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["x y\n"]);
        let err = vm.run("pair x").await.unwrap_err();
        assert!(matches!(
            err,
            VmError::ArityMismatch { ref function, expected: 2, got: 1 } if function.text() == "pair"
        ));
    }

    #[tokio::test]
    async fn arity_is_checked_before_arguments_run() {
        let mut loader = MemoryLoader::new();
        loader.add_source("lib/two", "func two [$a $b] { true }");
        let vm = Vm::new().with_loader(loader);
        vm.run("func two [$a $b] { true }; let $f { func other [$a $b] { true } }").await.unwrap();
        vm.run("import [[\"lib/two\" m]]").await.unwrap();

        let calls = [
            "two { println side-effect }",
            "f { println side-effect }",
            "m two { println side-effect }",
        ];
        for src in calls {
            let err = vm.run(src).await.unwrap_err();
            assert!(matches!(err, VmError::ArityMismatch { expected: 2, got: 1, .. }), "{src}: {err}");
        }
        assert_eq!(vm.stdout().depth(), 0);
    }

    #[tokio::test]
    async fn functions_close_over_their_scope() {
        let vm = Vm::new();
        vm.run("let $greeting hello; func greet [$who] { println $greeting $who }; do { let $greeting bye; greet you }")
            .await
            .unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["hello you\n"]);
    }

    #[tokio::test]
    async fn function_values_in_scope_are_callable() {
        let vm = Vm::new();
        vm.run("let $shout { func shout [$w] { println $w loud } }; shout hey").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["hey loud\n"]);
    }

    #[tokio::test]
    async fn recursion_through_the_module_table() {
        let vm = Vm::new();
        with_arith(&vm);
        vm.run("func count [$n] { println $n; if { positive { dec $n } } { count { dec $n } } }; count 3")
            .await
            .unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["3\n", "2\n", "1\n"]);
    }

    #[tokio::test]
    async fn data_values_are_not_callable() {
        let vm = Vm::new();
        let err = vm.run("let $n 4; n").await.unwrap_err();
        assert_eq!(err.to_string(), "value n (number) is not callable");
    }

    #[tokio::test]
    async fn module_values_dispatch_to_their_functions() {
        let mut loader = MemoryLoader::new();
        loader.add_source("lib/greet", "func hi [$who] { helper $who }\nfunc helper [$x] { println hi $x }");
        let vm = Vm::new().with_loader(loader);
        vm.run("import [[\"lib/greet\" g]]; g hi there").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["hi there\n"]);

        assert!(matches!(vm.run("g").await, Err(VmError::Usage(_))));
        assert!(matches!(vm.run("g missing").await, Err(VmError::CommandNotFound(_))));
        // Module functions are not visible to the importer without the prefix.
        assert!(matches!(vm.run("helper x").await, Err(VmError::CommandNotFound(_))));
    }
}
