use std::sync::Arc;

use proptest::prelude::*;

use gshell::{parse, ArgList, Argument, Command, Script, Symbol};

// ── ArgList against a Vec model ───────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Append(Vec<i32>),
    Set(usize, i32),
    Tail,
    Reverse,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<i32>().prop_map(Op::Push),
        2 => prop::collection::vec(any::<i32>(), 0..80).prop_map(Op::Append),
        2 => (0usize..200, any::<i32>()).prop_map(|(i, v)| Op::Set(i, v)),
        1 => Just(Op::Tail),
        1 => Just(Op::Reverse),
    ]
}

proptest! {
    /// Every operation leaves the list equal to the same operation applied
    /// to a Vec, and never changes the list it was called on.
    #[test]
    fn arglist_matches_vec_model(ops in prop::collection::vec(op(), 0..60)) {
        let mut list: ArgList<i32> = ArgList::nil();
        let mut model: Vec<i32> = Vec::new();

        for op in ops {
            let before = list.to_vec();
            let next = match op {
                Op::Push(v) => {
                    model.push(v);
                    list.push(v)
                }
                Op::Append(vs) => {
                    model.extend_from_slice(&vs);
                    list.append(vs)
                }
                Op::Set(i, v) => match list.set(i, v) {
                    Some(l) => {
                        model[i] = v;
                        l
                    }
                    None => {
                        prop_assert!(i >= model.len());
                        list.clone()
                    }
                },
                Op::Tail => {
                    if !model.is_empty() {
                        model.remove(0);
                    }
                    list.tail()
                }
                Op::Reverse => {
                    model.reverse();
                    list.reverse()
                }
            };
            prop_assert_eq!(list.to_vec(), before);
            list = next;

            prop_assert_eq!(list.len(), model.len());
            prop_assert_eq!(list.is_empty(), model.is_empty());
            prop_assert_eq!(list.iter().copied().collect::<Vec<_>>(), model.clone());
            for (i, v) in model.iter().enumerate() {
                prop_assert_eq!(list.get(i), Some(v));
            }
            prop_assert_eq!(list.get(model.len()), None);
        }
    }
}

// ── Printer / reader agreement ────────────────────────────────────────────────

/// Symbols with leading letters or punctuation; number-shaped candidates
/// such as `-1` are filtered out.
fn symbol() -> impl Strategy<Value = Symbol> {
    prop_oneof![
        "[a-z][a-z0-9.!?-]{0,6}",
        r"[!?.\\+*&^%#@~-][a-z0-9.!?$-]{0,4}",
    ]
    .prop_filter_map("not a symbol", |s| Symbol::new(&s).ok())
}

fn argument() -> impl Strategy<Value = Argument> {
    let leaf = prop_oneof![
        symbol().prop_map(Argument::Symbol),
        symbol().prop_map(Argument::Variable),
        (-1.0e6..1.0e6f64).prop_map(Argument::Number),
        (0u32..5000).prop_map(|n| Argument::Number(f64::from(n))),
        "[ -~\t\n]{0,10}".prop_map(Argument::Text),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4)
                .prop_map(|items| Argument::List(ArgList::from(items))),
            prop::collection::vec(command_with(inner), 0..3)
                .prop_map(|commands| Argument::Script(Arc::new(Script::new(commands)))),
        ]
    })
}

fn command_with(arg: impl Strategy<Value = Argument>) -> impl Strategy<Value = Command> {
    (symbol(), prop::collection::vec(arg, 0..4)).prop_map(|(head, args)| Command::new(head, args))
}

fn script() -> impl Strategy<Value = Script> {
    prop::collection::vec(command_with(argument()), 0..5).prop_map(Script::new)
}

proptest! {
    /// Rendering a tree and reading it back yields the same tree.
    #[test]
    fn rendered_scripts_read_back(tree in script()) {
        let src = tree.to_string();
        let back = parse(&src).map_err(|e| TestCaseError::fail(format!("{e}\n{src}")))?;
        prop_assert_eq!(&back, &tree, "source:\n{}", src);
        prop_assert_eq!(back.to_string(), src);
    }

    /// The reader returns an error rather than panicking on arbitrary input.
    #[test]
    fn reader_does_not_panic(s in "\\PC*") {
        let _ = parse(&s);
    }

    /// Mostly-valid input built from the language's own punctuation.
    #[test]
    fn reader_does_not_panic_on_punctuation(s in "[a-z$\"{}\\[\\] ;\n\\\\0-9.-]{0,40}") {
        let _ = parse(&s);
    }
}
