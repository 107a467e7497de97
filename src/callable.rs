use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::error::{RunResult, RuntimeError, Unwind};
use crate::interner::{Interner, Symbol};
use crate::interpreter::Interpreter;
use crate::output::OutputSink;
use crate::scanner::Token;
use crate::value::Value;

/// Everything invocable: native host functions, declared functions and
/// lambdas (a declaration plus its captured closure), and classes, whose
/// invocation constructs an instance.
pub enum Function {
    Native(usize, fn(&[Value]) -> RunResult<Value>),
    Declared(Rc<FunctionDecl>, Rc<Environment>, bool),
    Class(usize, Rc<Class>),
}

impl Function {
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        interner: &Interner,
        out: &mut dyn OutputSink,
        arguments: &[Value],
    ) -> RunResult<Value> {
        match self {
            Function::Native(_, native) => native(arguments),
            Function::Declared(declaration, closure, is_initializer) => {
                let environment = Environment::new(Some(Rc::clone(closure)));
                for (param, argument) in declaration.params.iter().zip(arguments) {
                    environment.define(param.lexeme, argument.clone());
                }

                let completion =
                    interpreter.execute_block(interner, out, &declaration.body, environment);

                // `return` unwinds to here and no further; runtime errors
                // keep going.
                let returned = match completion {
                    Ok(()) => Value::Nil,
                    Err(Unwind::Return(value)) => value,
                    Err(err) => return Err(err),
                };

                if *is_initializer {
                    // An initializer call yields the instance no matter how
                    // the body exited.
                    return Ok(Environment::get_at(closure, 0, interner.sym_this));
                }

                Ok(returned)
            }
            Function::Class(_, class) => {
                let instance = Rc::new(Instance::new(Rc::clone(class)));
                if let Some(Value::Callable(initializer)) = class.find_method(interner.sym_init) {
                    initializer.bind(interner, Rc::clone(&instance)).call(
                        interpreter,
                        interner,
                        out,
                        arguments,
                    )?;
                }
                Ok(Value::Instance(instance))
            }
        }
    }

    /// A copy of this method whose closure is extended with `this` bound to
    /// the given instance.
    pub fn bind(&self, interner: &Interner, instance: Rc<Instance>) -> Function {
        if let Function::Declared(declaration, closure, is_initializer) = self {
            let environment = Environment::new(Some(Rc::clone(closure)));
            environment.define(interner.sym_this, Value::Instance(instance));
            Function::Declared(
                Rc::clone(declaration),
                Rc::new(environment),
                *is_initializer,
            )
        } else {
            unreachable!("only declared functions are bound as methods")
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native(arity, _) => *arity,
            Function::Declared(declaration, _, _) => declaration.params.len(),
            Function::Class(arity, _) => *arity,
        }
    }
}

pub struct Class {
    pub name: Symbol,
    methods: FxHashMap<Symbol, Value>,
    superclass: Option<Rc<Class>>,
}

impl Class {
    pub fn new(
        name: Symbol,
        methods: FxHashMap<Symbol, Value>,
        superclass: Option<Rc<Class>>,
    ) -> Class {
        Class {
            name,
            methods,
            superclass,
        }
    }

    /// Method lookup falls through to the superclass chain.
    pub fn find_method(&self, name: Symbol) -> Option<Value> {
        self.methods.get(&name).cloned().or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name))
        })
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<FxHashMap<Symbol, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Instance {
        Instance {
            class,
            fields: RefCell::new(FxHashMap::default()),
        }
    }

    /// Fields spring into existence on first write.
    pub fn set(&self, name: Symbol, value: Value) {
        self.fields.borrow_mut().insert(name, value);
    }
}

/// Property reads need the `Rc` handle so a found method can capture `this`.
pub trait RcInstanceExt {
    fn get(&self, interner: &Interner, name: &Token) -> RunResult<Value>;
}

impl RcInstanceExt for Rc<Instance> {
    fn get(&self, interner: &Interner, name: &Token) -> RunResult<Value> {
        if let Some(value) = self.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }

        match self.class.find_method(name.lexeme) {
            Some(Value::Callable(method)) => Ok(Value::Callable(Rc::new(
                method.bind(interner, Rc::clone(self)),
            ))),
            Some(_) => unreachable!("method tables hold only callables"),
            None => Err(RuntimeError::new(
                name,
                format!("Undefined property '{}'.", interner.resolve(name.lexeme)),
            )
            .into()),
        }
    }
}
