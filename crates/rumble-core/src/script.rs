//! Per-player logic scripts.
//!
//! Each fighter is driven by a sandboxed Rhai program exposing a single
//! `tick(frame, input)` entry point. Scripts act through a capability API:
//! `move(dx)` and `anim_play(name)` record commands which the simulation
//! step interprets afterward. Scripts get no clock, no randomness and no
//! I/O, so a tick is a pure function of the script, its accumulated scope
//! and the `(frame, input)` pair.

use std::cell::RefCell;
use std::rc::Rc;

use rhai::packages::{Package, StandardPackage};
use rhai::{Dynamic, Engine, Scope, AST};

/// Per-tick operations budget for a script.
const MAX_OPERATIONS: u64 = 50_000;

/// One command recorded by a script during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set the target horizontal direction; only the sign of `dx` matters.
    Move { dx: i64 },
    /// Switch the animation to the hash of `name`.
    Anim { name: String },
}

/// Contract the simulation relies on for determinism: the same source,
/// accumulated scope and `(frame, input)` must yield the same commands.
///
/// The rollback engine snapshots the VM's scope into every history slot
/// and restores it before replaying, so implementations must make
/// `snapshot`/`restore` capture everything a tick can observe.
pub trait ScriptVm {
    /// Snapshot of the VM's mutable scope.
    type Snapshot: Clone;

    /// Compile `src` and run its top-level statements once, so global
    /// init blocks execute before the first tick. Returns false on error;
    /// the message is retrievable via `take_last_error`. On failure the
    /// previously loaded program stays in place.
    fn load_source(&mut self, src: &str) -> bool;

    /// Drain the most recent compile or runtime error.
    fn take_last_error(&mut self) -> Option<String>;

    /// Execute one frame of logic. An absent or erroring script yields an
    /// empty list, which the simulation step treats as "fall back to
    /// direct input mapping".
    fn tick(&mut self, frame: u32, input_mask: u32) -> Vec<Command>;

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snap: &Self::Snapshot);

    /// Fresh VM seeded from the same source with a pristine scope. The two
    /// per-player instances are created this way from the global VM.
    fn instantiate(&self) -> Self;
}

/// Rhai-backed VM.
pub struct RhaiVm {
    engine: Engine,
    ast: Option<AST>,
    source: Option<String>,
    scope: Scope<'static>,
    sink: Rc<RefCell<Vec<Command>>>,
    last_error: Option<String>,
}

impl RhaiVm {
    pub fn new() -> Self {
        let sink: Rc<RefCell<Vec<Command>>> = Rc::new(RefCell::new(Vec::new()));

        // Start from a raw engine and add the standard package explicitly
        // to avoid pulling in extra host imports; this still provides
        // operators like '&' and helpers like 'is_def'.
        let mut engine = Engine::new_raw();
        engine.register_global_module(StandardPackage::new().as_shared_module());

        let move_sink = sink.clone();
        engine.register_fn("move", move |dx: i64| {
            move_sink.borrow_mut().push(Command::Move { dx });
        });
        let anim_sink = sink.clone();
        engine.register_fn("anim_play", move |name: &str| {
            anim_sink.borrow_mut().push(Command::Anim {
                name: name.to_string(),
            });
        });
        engine.set_max_operations(MAX_OPERATIONS);

        Self {
            engine,
            ast: None,
            source: None,
            scope: Scope::new(),
            sink,
            last_error: None,
        }
    }
}

impl Default for RhaiVm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptVm for RhaiVm {
    type Snapshot = Scope<'static>;

    fn load_source(&mut self, src: &str) -> bool {
        let ast = match self.engine.compile(src) {
            Ok(ast) => ast,
            Err(err) => {
                self.last_error = Some(err.to_string());
                return false;
            }
        };

        // Run top-level statements once against a fresh scope so init
        // blocks like `if !is_def(state) { ... }` execute before tick.
        let mut scope = Scope::new();
        match self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
        {
            Ok(_) => {
                self.sink.borrow_mut().clear();
                self.scope = scope;
                self.ast = Some(ast);
                self.source = Some(src.to_string());
                true
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                false
            }
        }
    }

    fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    fn tick(&mut self, frame: u32, input_mask: u32) -> Vec<Command> {
        let Some(ast) = self.ast.as_ref() else {
            return Vec::new();
        };

        let mut scope = self.scope.clone();
        scope.set_or_push("INPUT", i64::from(input_mask));
        let result = self.engine.call_fn::<Dynamic>(
            &mut scope,
            ast,
            "tick",
            (i64::from(frame), i64::from(input_mask)),
        );
        self.scope = scope;

        let commands = std::mem::take(&mut *self.sink.borrow_mut());
        match result {
            Ok(_) => commands,
            Err(err) => {
                let detail = err.to_string();
                tracing::warn!(frame, error = %detail, "script tick failed");
                self.last_error = Some(detail);
                Vec::new()
            }
        }
    }

    fn snapshot(&self) -> Scope<'static> {
        self.scope.clone()
    }

    fn restore(&mut self, snap: &Scope<'static>) {
        self.scope = snap.clone();
    }

    fn instantiate(&self) -> Self {
        let mut vm = RhaiVm::new();
        if let Some(src) = &self.source {
            vm.load_source(src);
        }
        vm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALKER: &str = r#"
        fn tick(frame, input) {
            if (input & 0x08) != 0 {
                move(1);
            } else if (input & 0x04) != 0 {
                move(-1);
            } else {
                move(0);
            }
        }
    "#;

    #[test]
    fn load_and_tick_records_commands() {
        let mut vm = RhaiVm::new();
        assert!(vm.load_source(WALKER));
        assert_eq!(vm.tick(1, 0x08), vec![Command::Move { dx: 1 }]);
        assert_eq!(vm.tick(2, 0x04), vec![Command::Move { dx: -1 }]);
        assert_eq!(vm.tick(3, 0), vec![Command::Move { dx: 0 }]);
    }

    #[test]
    fn anim_play_records_names() {
        let mut vm = RhaiVm::new();
        assert!(vm.load_source(
            r#"fn tick(frame, input) { anim_play("walk"); }"#
        ));
        assert_eq!(
            vm.tick(1, 0),
            vec![Command::Anim {
                name: "walk".to_string()
            }]
        );
    }

    #[test]
    fn compile_error_reports_and_keeps_vm_usable() {
        let mut vm = RhaiVm::new();
        assert!(vm.load_source(WALKER));
        assert!(!vm.load_source("fn tick(frame input) {"));
        assert!(vm.take_last_error().is_some());
        // The previous program survives a failed load.
        assert_eq!(vm.tick(1, 0x08), vec![Command::Move { dx: 1 }]);
    }

    #[test]
    fn tick_without_program_is_empty() {
        let mut vm = RhaiVm::new();
        assert!(vm.tick(1, 0xFF).is_empty());
    }

    #[test]
    fn runtime_error_yields_empty_commands() {
        let mut vm = RhaiVm::new();
        assert!(vm.load_source("fn tick(frame, input) { nonexistent(); }"));
        assert!(vm.tick(1, 0).is_empty());
        assert!(vm.take_last_error().is_some());
    }

    #[test]
    fn instantiate_produces_independent_vm() {
        let mut global = RhaiVm::new();
        assert!(global.load_source(WALKER));
        let mut a = global.instantiate();
        let mut b = global.instantiate();
        assert_eq!(a.tick(1, 0x08), vec![Command::Move { dx: 1 }]);
        assert_eq!(b.tick(1, 0x04), vec![Command::Move { dx: -1 }]);
    }
}
