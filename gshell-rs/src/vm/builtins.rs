//! Built-in commands.
//!
//! Builtins receive their arguments as raw syntax and decide for themselves
//! what to evaluate, which is what lets `if`, `switch`, `guard`, `loop`,
//! `func` and `let` treat blocks and variable names as syntax.  They are
//! looked up before anything else, so scripts cannot shadow them.
//!
//! | Builtin | Form |
//! |---------|------|
//! | `let` | `let $name value` |
//! | `if` | `if cond {then} [else {else}]` |
//! | `switch` | `switch { case {cond} {body} … [else {body}] }` |
//! | `guard` | `guard {cond} {body}` |
//! | `loop` | `loop var from X to Y {body}` |
//! | `func` | `func name [$a $b …] {body}` |
//! | `import` | `import [["path" name] …]` |
//! | `println` / `eprintln` | `println args…` |
//! | `do` | `do {block}` |
//! | `true` / `false` | return themselves |

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::arglist::ArgList;
use crate::error::VmError;
use crate::symbol::Symbol;
use crate::syntax::{Argument, Script};

use super::function::{CallStack, Function};
use super::value::Value;
use super::Vm;

/// Largest magnitude at which every integer is an exact `f64` (2^53).
const MAX_LOOP_BOUND: f64 = 9_007_199_254_740_992.0;

/// Native commands known to every VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Let,
    If,
    Switch,
    Guard,
    Loop,
    Func,
    Import,
    Println,
    Eprintln,
    Do,
    True,
    False,
}

impl Builtin {
    pub const ALL: [Builtin; 12] = [
        Builtin::Let,
        Builtin::If,
        Builtin::Switch,
        Builtin::Guard,
        Builtin::Loop,
        Builtin::Func,
        Builtin::Import,
        Builtin::Println,
        Builtin::Eprintln,
        Builtin::Do,
        Builtin::True,
        Builtin::False,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Let => "let",
            Builtin::If => "if",
            Builtin::Switch => "switch",
            Builtin::Guard => "guard",
            Builtin::Loop => "loop",
            Builtin::Func => "func",
            Builtin::Import => "import",
            Builtin::Println => "println",
            Builtin::Eprintln => "eprintln",
            Builtin::Do => "do",
            Builtin::True => "true",
            Builtin::False => "false",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Builtin::Let => "let <$variableName> <value>",
            Builtin::If => "if <condition> <{then}> [else <{else}>]",
            Builtin::Switch => {
                "switch { case <{guard-script}> <{action-script}> [case ...] [else <{action-script}>] }"
            }
            Builtin::Guard => "guard {... conditions} {... actions}",
            Builtin::Loop => "loop <variable-name> from <start-point> to <end-point> <{body}>",
            Builtin::Func => "func <name> [<$arg> ...] <{body}>",
            Builtin::Import => "import [ <[\"module/path\" local-name] ...> ]",
            Builtin::Println => "println <value> ...",
            Builtin::Eprintln => "eprintln <value> ...",
            Builtin::Do => "do <{block}>",
            Builtin::True => "true",
            Builtin::False => "false",
        }
    }
}

/// The builtin table a VM is constructed with.
pub(crate) fn table() -> HashMap<Symbol, Builtin> {
    Builtin::ALL.iter().map(|&b| (Symbol::keyword(b.name()), b)).collect()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

impl Vm {
    pub(crate) async fn run_builtin(
        &self,
        builtin: Builtin,
        call: &CallStack<'_>,
    ) -> Result<Value, VmError> {
        match builtin {
            Builtin::Let => self.builtin_let(call).await,
            Builtin::If => self.builtin_if(call).await,
            Builtin::Switch => self.builtin_switch(call).await,
            Builtin::Guard => self.builtin_guard(call).await,
            Builtin::Loop => self.builtin_loop(call).await,
            Builtin::Func => builtin_func(call),
            Builtin::Import => self.builtin_import(call).await,
            Builtin::Println => self.print_line(call, "stdout").await,
            Builtin::Eprintln => self.print_line(call, "stderr").await,
            Builtin::Do => self.builtin_do(call).await,
            Builtin::True => Ok(Value::from(true)),
            Builtin::False => Ok(Value::from(false)),
        }
    }

    async fn builtin_let(&self, call: &CallStack<'_>) -> Result<Value, VmError> {
        let [Argument::Variable(name), value] = call.args else {
            return Err(VmError::Usage(Builtin::Let.usage()));
        };
        if !call.caller.can_bind(name) {
            return Err(VmError::AlreadyBound(name.clone()));
        }
        let value = self.eval_argument(value, &call.context, &call.module).await?;
        if !call.caller.bind(name.clone(), value.clone()) {
            return Err(VmError::AlreadyBound(name.clone()));
        }
        Ok(value)
    }

    async fn builtin_if(&self, call: &CallStack<'_>) -> Result<Value, VmError> {
        let (cond, then, otherwise) = match call.args {
            [cond, Argument::Script(then)] => (cond, then, None),
            [cond, Argument::Script(then), Argument::Symbol(kw), Argument::Script(otherwise)]
                if kw.text() == "else" =>
            {
                (cond, then, Some(otherwise))
            }
            _ => return Err(VmError::Usage(Builtin::If.usage())),
        };
        let truth = self.eval_argument(cond, &call.context, &call.module).await?.cast_bool()?;
        let block = match (truth, otherwise) {
            (true, _) => then,
            (false, Some(otherwise)) => otherwise,
            (false, None) => return Ok(Value::from(false)),
        };
        self.eval_script(block, &call.caller.new_child(), &call.module).await
    }

    async fn builtin_switch(&self, call: &CallStack<'_>) -> Result<Value, VmError> {
        let usage = || VmError::Usage(Builtin::Switch.usage());
        let [Argument::Script(clauses)] = call.args else {
            return Err(usage());
        };

        // Validate every clause before running any of them.
        let mut cases: Vec<(Option<&Arc<Script>>, &Arc<Script>)> = Vec::new();
        for clause in &clauses.commands {
            match (clause.head.text(), clause.args.as_slice()) {
                ("case", [Argument::Script(cond), Argument::Script(body)]) => {
                    cases.push((Some(cond), body))
                }
                ("else", [Argument::Script(body)]) => cases.push((None, body)),
                _ => return Err(usage()),
            }
        }

        for (cond, body) in cases {
            let matched = match cond {
                Some(cond) => {
                    let scope = call.caller.new_child();
                    self.eval_script(cond, &scope, &call.module).await?.cast_bool()?
                }
                None => true,
            };
            if matched {
                return self.eval_script(body, &call.caller.new_child(), &call.module).await;
            }
        }
        Ok(Value::from(false))
    }

    async fn builtin_guard(&self, call: &CallStack<'_>) -> Result<Value, VmError> {
        let [Argument::Script(cond), Argument::Script(body)] = call.args else {
            return Err(VmError::Usage(Builtin::Guard.usage()));
        };
        let scope = call.caller.new_child();
        let allowed = self.eval_script(cond, &scope, &call.module).await?.cast_bool()?;
        if !allowed {
            return Ok(Value::from(false));
        }
        // The body shares the caller's scope so its bindings outlive the guard.
        self.eval_script(body, &call.caller, &call.module).await
    }

    async fn builtin_loop(&self, call: &CallStack<'_>) -> Result<Value, VmError> {
        let usage = || VmError::Usage(Builtin::Loop.usage());
        let [Argument::Symbol(var), Argument::Symbol(from), start, Argument::Symbol(to), end, Argument::Script(body)] =
            call.args
        else {
            return Err(usage());
        };
        if from.text() != "from" || to.text() != "to" {
            return Err(usage());
        }
        let start = self.eval_argument(start, &call.context, &call.module).await?.cast_f64()?;
        let end = self.eval_argument(end, &call.context, &call.module).await?.cast_f64()?;
        if !start.is_finite() || !end.is_finite() {
            return Err(VmError::CastError { from: "number", to: "finite number" });
        }
        if start.abs() > MAX_LOOP_BOUND || end.abs() > MAX_LOOP_BOUND {
            return Err(VmError::CastError { from: "number", to: "exact integer range" });
        }

        let step = if start <= end { 1.0 } else { -1.0 };
        // Inclusive step count, exact for bounds within 2^53.
        let iterations = (end - start).abs().floor() as u64 + 1;
        let mut results = ArgList::nil();
        for k in 0..iterations {
            let scope = call.caller.new_child();
            scope.set(var.clone(), Value::Number(start + step * k as f64));
            let value = self.eval_script(body, &scope, &call.module).await?;
            results = results.push(value.encode()?);
        }
        Ok(Value::List(results))
    }

    async fn builtin_import(&self, call: &CallStack<'_>) -> Result<Value, VmError> {
        let usage = || VmError::Usage(Builtin::Import.usage());
        let [Argument::List(entries)] = call.args else {
            return Err(usage());
        };

        let mut mappings = Vec::with_capacity(entries.len());
        for entry in entries {
            let Argument::List(pair) = entry else {
                return Err(usage());
            };
            match (pair.len(), pair.get(0), pair.get(1)) {
                (2, Some(Argument::Text(path)), Some(Argument::Symbol(name))) => {
                    mappings.push((path, name))
                }
                _ => return Err(usage()),
            }
        }

        for (path, name) in mappings {
            let wrap = |cause: VmError| VmError::ModuleLoad {
                path: path.clone(),
                name: name.clone(),
                cause: Box::new(cause),
            };
            if self.loader.is_none() {
                return Err(wrap(VmError::NoLoader));
            }
            if !call.caller.can_bind(name) {
                return Err(wrap(VmError::AlreadyBound(name.clone())));
            }
            let module = self.import_module(path).await.map_err(wrap)?;
            if !call.caller.bind(name.clone(), Value::Module(module)) {
                return Err(wrap(VmError::AlreadyBound(name.clone())));
            }
        }
        Ok(Value::from(true))
    }

    async fn print_line(&self, call: &CallStack<'_>, channel: &'static str) -> Result<Value, VmError> {
        let values = self.eval_all(call.args, &call.context, &call.module).await?;
        let mut line = values.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
        line.push('\n');

        let Some(Value::Mailbox(target)) = call.context.get(channel) else {
            return Err(VmError::ChannelNotFound(Symbol::keyword(channel)));
        };
        target.push_with(Value::Text(line), &self.cancel).await?;
        Ok(Value::from(true))
    }

    async fn builtin_do(&self, call: &CallStack<'_>) -> Result<Value, VmError> {
        let [Argument::Script(block)] = call.args else {
            return Err(VmError::Usage(Builtin::Do.usage()));
        };
        self.eval_script(block, &call.caller.new_child(), &call.module).await
    }
}

fn builtin_func(call: &CallStack<'_>) -> Result<Value, VmError> {
    let usage = || VmError::Usage(Builtin::Func.usage());
    let [Argument::Symbol(name), Argument::List(params), Argument::Script(body)] = call.args else {
        return Err(usage());
    };
    if call.caller.is_inside_function() {
        return Err(VmError::NestedFunctionDefinition(name.clone()));
    }
    let params = params
        .iter()
        .map(|p| match p {
            Argument::Variable(v) => Ok(v.clone()),
            _ => Err(usage()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let func = Arc::new(Function {
        name: name.clone(),
        module: call.module.path().to_owned(),
        closure: call.caller.clone(),
        params,
        body: Arc::clone(body),
    });
    call.module.define(Arc::clone(&func))?;
    debug!(function = %name, "func builtin");
    Ok(Value::Function(func))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MailboxReader;

    async fn drain(out: &MailboxReader<Value>) -> Vec<String> {
        let mut lines = Vec::new();
        while out.depth() > 0 {
            match out.take().await.unwrap() {
                Value::Text(t) => lines.push(t),
                other => panic!("unexpected {other:?}"),
            }
        }
        lines
    }

    #[test]
    fn table_covers_every_builtin() {
        let t = table();
        assert_eq!(t.len(), Builtin::ALL.len());
        for b in Builtin::ALL {
            assert_eq!(t.get(b.name()), Some(&b));
        }
    }

    #[tokio::test]
    async fn let_binds_in_enclosing_block() {
        let vm = Vm::new();
        vm.run("{ let $hello 123; println $hello; }").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["123\n"]);
    }

    #[tokio::test]
    async fn let_twice_fails() {
        let vm = Vm::new();
        let err = vm.run("let $a 1; let $a 2").await.unwrap_err();
        assert!(matches!(err, VmError::AlreadyBound(ref s) if s.text() == "a"), "{err}");
    }

    #[tokio::test]
    async fn let_usage() {
        let vm = Vm::new();
        assert!(matches!(vm.run("let a 1").await, Err(VmError::Usage(_))));
        assert!(matches!(vm.run("let $a").await, Err(VmError::Usage(_))));
    }

    #[tokio::test]
    async fn if_picks_one_branch() {
        let vm = Vm::new();
        vm.run("if true { println yes } else { println no }; if { false } { println yes } else { println no }; if false { println never }")
            .await
            .unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["yes\n", "no\n"]);
    }

    #[tokio::test]
    async fn if_rejects_non_symbols() {
        let vm = Vm::new();
        let err = vm.run("if 1 { println x }").await.unwrap_err();
        assert!(matches!(err, VmError::CastError { from: "number", to: "bool" }));
    }

    #[tokio::test]
    async fn switch_runs_first_match_only() {
        let vm = Vm::new();
        vm.run(
            "switch {\n case {true} {println 1}\n case {true} {println 2}\n}\n\
             switch {\n case { false; } { println case-false; }\n else { println else; }\n}",
        )
        .await
        .unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["1\n", "else\n"]);
    }

    #[tokio::test]
    async fn switch_rejects_unknown_clauses() {
        let vm = Vm::new();
        let err = vm.run("switch { when {true} {println 1} }").await.unwrap_err();
        assert!(matches!(err, VmError::Usage(u) if u.starts_with("switch")));
    }

    #[tokio::test]
    async fn guard_body_shares_caller_scope() {
        let vm = Vm::new();
        vm.run(
            "guard { false; } { println 0; }\n\
             guard { true; } { println 1; }\n\
             guard { true; } { let $a 10; }\n\
             println $a",
        )
        .await
        .unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["1\n", "10\n"]);
    }

    #[tokio::test]
    async fn guard_condition_bindings_are_discarded() {
        let vm = Vm::new();
        let err = vm.run("guard { let $c 1; true } { println ok }; println $c").await.unwrap_err();
        assert!(matches!(err, VmError::UnboundVariable(ref s) if s.text() == "c"));
        assert_eq!(drain(&vm.stdout()).await, ["ok\n"]);
    }

    #[tokio::test]
    async fn loop_counts_both_ways_and_collects() {
        let vm = Vm::new();
        let up = vm.run("loop i from 1 to 5 { println $i }").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["1\n", "2\n", "3\n", "4\n", "5\n"]);
        let Value::List(results) = up else { panic!("loop returns a list") };
        assert_eq!(results.len(), 5);

        let down = vm.run("loop k from 3 to 1 { do { println $k } }").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["3\n", "2\n", "1\n"]);
        assert!(matches!(down, Value::List(l) if l.len() == 3));
    }

    #[tokio::test]
    async fn loop_casts_both_bounds() {
        let vm = Vm::new();
        let out = vm.run("loop i from 2 to 3 { true }").await.unwrap();
        assert!(matches!(out, Value::List(l) if l.len() == 2));
        let err = vm.run("loop i from 1 to nope { true }").await.unwrap_err();
        assert!(matches!(err, VmError::CastError { from: "symbol", to: "number" }));
    }

    #[tokio::test]
    async fn loop_bounds_must_be_exact_integers() {
        let vm = Vm::new();
        for src in [
            "loop i from 1 to 10000000000000000 { println $i }",
            "loop i from -10000000000000000 to 1 { println $i }",
        ] {
            let err = vm.run(src).await.unwrap_err();
            assert!(matches!(err, VmError::CastError { from: "number", to: "exact integer range" }), "{src}");
        }
        assert_eq!(vm.stdout().depth(), 0);

        let edge = vm.run("loop i from 9007199254740990 to 9007199254740992 { true }").await.unwrap();
        assert!(matches!(edge, Value::List(l) if l.len() == 3));
        let fractional = vm.run("loop i from 0.5 to 2.9 { let $l [ $i ] }").await.unwrap();
        assert_eq!(fractional.to_string(), "[ [ 0.5 ] [ 1.5 ] [ 2.5 ] ]");
    }

    #[tokio::test]
    async fn empty_loop_body_is_unencodable() {
        let vm = Vm::new();
        let err = vm.run("loop i from 1 to 2 {}").await.unwrap_err();
        assert!(matches!(err, VmError::UnencodableValue("nothing")));
    }

    #[tokio::test]
    async fn func_defines_once_and_not_nested() {
        let vm = Vm::new();
        vm.run("func hi [] { println hi }").await.unwrap();
        assert!(matches!(
            vm.run("func hi [] { println again }").await,
            Err(VmError::AlreadyBound(_))
        ));
        let err = vm.run("func outer [] { func inner [] { true } }; outer").await.unwrap_err();
        assert!(matches!(err, VmError::NestedFunctionDefinition(ref s) if s.text() == "inner"));
        assert!(matches!(vm.run("func bad [x] { true }").await, Err(VmError::Usage(_))));
    }

    #[tokio::test]
    async fn eprintln_goes_to_stderr() {
        let vm = Vm::new();
        vm.run("eprintln oops 1.5").await.unwrap();
        assert_eq!(vm.stdout().depth(), 0);
        assert_eq!(drain(&vm.stderr()).await, ["oops 1.5\n"]);
    }

    #[tokio::test]
    async fn println_needs_a_mailbox() {
        let vm = Vm::new();
        let err = vm.run("do { let $stdout 1; println shadowed }").await.unwrap_err();
        assert!(matches!(err, VmError::ChannelNotFound(ref s) if s.text() == "stdout"));
    }

    #[tokio::test]
    async fn builtins_cannot_be_shadowed() {
        let vm = Vm::new();
        vm.run("let $println 1; println still-works").await.unwrap();
        assert_eq!(drain(&vm.stdout()).await, ["still-works\n"]);
    }
}
