use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{RunResult, RuntimeError};
use crate::interner::{Interner, Symbol};
use crate::scanner::Token;
use crate::value::Value;

/// One link of the lexical scope chain. The chain ends at the interpreter's
/// globals; closures keep their defining links alive through `Rc`.
///
/// A name lives in at most one of `values` / `uninitialized`: `var a;` puts
/// it in the uninitialized set, the first assignment moves it to `values`.
pub struct Environment {
    values: RefCell<FxHashMap<Symbol, Value>>,
    uninitialized: RefCell<FxHashSet<Symbol>>,
    enclosing: Option<Rc<Environment>>,
}

/// Result of reading a slot the resolver pinned to a known scope.
pub enum Slot {
    Value(Value),
    Uninitialized,
}

macro_rules! env_ancestor {
    ($init:expr, $distance:expr) => {{
        let mut env = $init;
        for _ in 0..$distance {
            env = env.enclosing.as_ref().unwrap();
        }
        env
    }};
}

impl Environment {
    pub fn new(enclosing: Option<Rc<Environment>>) -> Environment {
        Environment {
            values: RefCell::new(FxHashMap::default()),
            uninitialized: RefCell::new(FxHashSet::default()),
            enclosing,
        }
    }

    /// Binds `name` to `value` in this environment, shadowing or overwriting
    /// whatever was there.
    pub fn define(&self, name: Symbol, value: Value) {
        self.uninitialized.borrow_mut().remove(&name);
        self.values.borrow_mut().insert(name, value);
    }

    /// Binds `name` without a value. Reads error until an assignment lands.
    pub fn declare(&self, name: Symbol) {
        self.values.borrow_mut().remove(&name);
        self.uninitialized.borrow_mut().insert(name);
    }

    pub fn get(&self, interner: &Interner, name: &Token) -> RunResult<Value> {
        if let Some(value) = self.values.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }
        if self.uninitialized.borrow().contains(&name.lexeme) {
            return Err(RuntimeError::new(
                name,
                format!(
                    "Uninitialized variable '{}'.",
                    interner.resolve(name.lexeme)
                ),
            )
            .into());
        }
        match &self.enclosing {
            Some(enclosing) => enclosing.get(interner, name),
            None => Err(RuntimeError::new(
                name,
                format!("Undefined variable '{}'.", interner.resolve(name.lexeme)),
            )
            .into()),
        }
    }

    /// Writes to an existing binding, walking outward. Never creates one.
    pub fn assign(&self, interner: &Interner, name: &Token, value: Value) -> RunResult<()> {
        let declared_here = self.values.borrow().contains_key(&name.lexeme)
            || self.uninitialized.borrow().contains(&name.lexeme);
        if declared_here {
            self.define(name.lexeme, value);
            Ok(())
        } else {
            match &self.enclosing {
                Some(enclosing) => enclosing.assign(interner, name, value),
                None => Err(RuntimeError::new(
                    name,
                    format!("Undefined variable '{}'.", interner.resolve(name.lexeme)),
                )
                .into()),
            }
        }
    }

    /// Reads the slot exactly `distance` hops up. No fallback: the resolver's
    /// hop counts are trusted, a missing slot is a resolver bug.
    pub fn slot_at(environment: &Rc<Environment>, distance: usize, name: Symbol) -> Slot {
        let env = env_ancestor!(environment, distance);
        if let Some(value) = env.values.borrow().get(&name) {
            return Slot::Value(value.clone());
        }
        if env.uninitialized.borrow().contains(&name) {
            return Slot::Uninitialized;
        }
        panic!("resolved slot missing at distance {}", distance);
    }

    /// Like `slot_at` for slots the interpreter itself planted (`this`,
    /// `super`), which are always initialized.
    pub fn get_at(environment: &Rc<Environment>, distance: usize, name: Symbol) -> Value {
        match Environment::slot_at(environment, distance, name) {
            Slot::Value(value) => value,
            Slot::Uninitialized => panic!("internal slot read before initialization"),
        }
    }

    /// Writes the slot exactly `distance` hops up, initializing it if it was
    /// declared without a value.
    pub fn assign_at(environment: &Rc<Environment>, distance: usize, name: Symbol, value: Value) {
        env_ancestor!(environment, distance).define(name, value);
    }
}
