//! Canonical text rendering of syntax trees.
//!
//! | Node | Rendering |
//! |------|-----------|
//! | empty script | `{}` |
//! | one-command script | `{ cmd arg1 arg2 }` |
//! | longer script | `{`, one tab-indented command per line, `}` |
//! | list | `[ a b c ]` |
//! | text | `"…"` with `\"`, `\\`, `\n`, `\t`, `\r` escapes |
//! | number | shortest decimal form, no exponent |
//!
//! Rendering then reading yields the same tree (see `reader`).

use super::{Argument, Command, Script};

pub fn render_script(script: &Script) -> String {
    let mut p = Printer::default();
    p.script(script);
    p.out
}

pub fn render_command(cmd: &Command) -> String {
    let mut p = Printer::default();
    p.command(cmd);
    p.out
}

pub fn render_argument(arg: &Argument) -> String {
    let mut p = Printer::default();
    p.argument(arg);
    p.out
}

/// Canonical number format: minimal digits, never an exponent.
pub fn format_number(n: f64) -> String {
    // f64's Display is already shortest-round-trip and exponent-free.
    format!("{n}")
}

/// Quote `text` so the reader yields it back unchanged.
pub fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ── Printer ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Printer {
    out: String,
    /// Indentation of the line currently being written.
    nesting: usize,
}

impl Printer {
    fn indent(&mut self) {
        for _ in 0..self.nesting {
            self.out.push('\t');
        }
    }

    fn script(&mut self, script: &Script) {
        match script.commands.as_slice() {
            [] => self.out.push_str("{}"),
            [only] => {
                self.out.push_str("{ ");
                self.command(only);
                self.out.push_str(" }");
            }
            commands => {
                self.out.push_str("{\n");
                self.nesting += 1;
                for cmd in commands {
                    self.indent();
                    self.command(cmd);
                    self.out.push('\n');
                }
                self.nesting -= 1;
                self.indent();
                self.out.push('}');
            }
        }
    }

    fn command(&mut self, cmd: &Command) {
        if cmd.is_bare_block() {
            if let Some(Argument::Script(block)) = cmd.args.first() {
                self.script(block);
                return;
            }
        }
        self.out.push_str(cmd.head.text());
        for arg in &cmd.args {
            self.out.push(' ');
            self.argument(arg);
        }
    }

    fn argument(&mut self, arg: &Argument) {
        match arg {
            Argument::Symbol(s) => self.out.push_str(s.text()),
            Argument::Number(n) => self.out.push_str(&format_number(*n)),
            Argument::Text(t) => self.out.push_str(&quote_text(t)),
            Argument::Variable(v) => {
                self.out.push('$');
                self.out.push_str(v.text());
            }
            Argument::List(items) => {
                self.out.push('[');
                for item in items {
                    self.out.push(' ');
                    self.argument(item);
                }
                self.out.push_str(" ]");
            }
            Argument::Script(s) => self.script(s),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
