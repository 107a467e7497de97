use std::rc::Rc;
use std::time;

use rustc_hash::FxHashMap;
use vec_map::VecMap;

use crate::ast::{Expr, ExprId, Stmt};
use crate::callable::{Class, Function, RcInstanceExt};
use crate::environment::{Environment, Slot};
use crate::error::{RunResult, RuntimeError, Unwind};
use crate::interner::Interner;
use crate::output::OutputSink;
use crate::scanner::{Token, TokenLiteral, TokenType};
use crate::value::{is_equal, stringify, Value};
use crate::Session;

/// Tree walker. Holds the global environment, the current environment while
/// walking, and the resolver's side-table of hop distances. One interpreter
/// lives for a whole interactive session, so globals and the side-table
/// accumulate across inputs.
pub struct Interpreter {
    globals: Rc<Environment>,
    environment: Rc<Environment>,
    locals: VecMap<usize>,
}

impl Interpreter {
    pub fn new(interner: &Interner) -> Interpreter {
        let globals = Rc::new(Environment::new(None));

        globals.define(
            interner.get_or_intern("clock"),
            Value::Callable(Rc::new(Function::Native(0, |_| {
                match time::SystemTime::now().duration_since(time::UNIX_EPOCH) {
                    Ok(elapsed) => Ok(Value::Number(elapsed.as_secs_f64())),
                    Err(_) => panic!("system clock predates the Unix epoch"),
                }
            }))),
        );

        let environment = Rc::clone(&globals);

        Interpreter {
            globals,
            environment,
            locals: VecMap::default(),
        }
    }

    /// Records a hop distance for an expression. Called by the resolver.
    pub(crate) fn resolve(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id.0, depth);
    }

    pub fn interpret(&mut self, session: &Session, out: &mut dyn OutputSink, statements: &[Stmt]) {
        for statement in statements {
            match self.execute(&session.interner, out, statement) {
                Ok(()) => {}
                Err(Unwind::Err(err)) => {
                    session.runtime_error(&err);
                    break;
                }
                Err(Unwind::Return(_)) => panic!("return escaped every call frame"),
            }
        }
    }

    /// Evaluates a bare expression input, reporting a runtime error through
    /// the session. `None` means the evaluation failed.
    pub fn interpret_expression(
        &mut self,
        session: &Session,
        out: &mut dyn OutputSink,
        expression: &Expr,
    ) -> Option<Value> {
        match self.evaluate(&session.interner, out, expression) {
            Ok(value) => Some(value),
            Err(Unwind::Err(err)) => {
                session.runtime_error(&err);
                None
            }
            Err(Unwind::Return(_)) => panic!("return escaped every call frame"),
        }
    }

    fn execute(
        &mut self,
        interner: &Interner,
        out: &mut dyn OutputSink,
        statement: &Stmt,
    ) -> RunResult<()> {
        match statement {
            Stmt::Expression(expr) => {
                self.evaluate(interner, out, expr)?;
            }
            Stmt::Print { expression } => {
                let value = self.evaluate(interner, out, expression)?;
                out.write_line(&stringify(interner, &value));
            }
            Stmt::Var { name, initializer } => match initializer {
                Some(expr) => {
                    let value = self.evaluate(interner, out, expr)?;
                    self.environment.define(name.lexeme, value);
                }
                None => self.environment.declare(name.lexeme),
            },
            Stmt::Block { statements } => {
                let environment = Environment::new(Some(Rc::clone(&self.environment)));
                self.execute_block(interner, out, statements, environment)?;
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(interner, out, condition)?.is_truthy() {
                    self.execute(interner, out, then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(interner, out, else_branch)?;
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(interner, out, condition)?.is_truthy() {
                    self.execute(interner, out, body)?;
                }
            }
            Stmt::Function(declaration) => {
                let name = declaration
                    .name
                    .as_ref()
                    .expect("function statements carry a name");
                let function = Value::Callable(Rc::new(Function::Declared(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    false,
                )));
                self.environment.define(name.lexeme, function);
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(interner, out, name, superclass.as_ref(), methods)?,
            Stmt::Return { value, .. } => {
                let returned = match value {
                    Some(expr) => self.evaluate(interner, out, expr)?,
                    None => Value::Nil,
                };
                return Err(Unwind::Return(returned));
            }
        }
        Ok(())
    }

    fn execute_class(
        &mut self,
        interner: &Interner,
        out: &mut dyn OutputSink,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<crate::ast::FunctionDecl>],
    ) -> RunResult<()> {
        // Bind the name first so methods may refer to the class itself.
        self.environment.define(name.lexeme, Value::Nil);

        let superclass_value = match superclass {
            Some(expr) => {
                let value = self.evaluate(interner, out, expr)?;
                if !value.is_class() {
                    let superclass_name = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => unreachable!("superclass clauses parse as variables"),
                    };
                    return Err(RuntimeError::new(
                        superclass_name,
                        "Superclass must be a class.",
                    )
                    .into());
                }
                Some(value)
            }
            None => None,
        };

        // Methods of a subclass close over an extra environment carrying
        // `super`.
        let environment = match &superclass_value {
            Some(superclass) => {
                let environment = Rc::new(Environment::new(Some(Rc::clone(&self.environment))));
                environment.define(interner.sym_super, superclass.clone());
                environment
            }
            None => Rc::clone(&self.environment),
        };

        let mut class_methods = FxHashMap::default();
        for method in methods {
            let method_name = method.name.as_ref().expect("methods carry a name");
            let is_initializer = method_name.lexeme == interner.sym_init;
            let function = Value::Callable(Rc::new(Function::Declared(
                Rc::clone(method),
                Rc::clone(&environment),
                is_initializer,
            )));
            class_methods.insert(method_name.lexeme, function);
        }

        let superclass_class = superclass_value.and_then(|value| value.to_class());
        let class = Rc::new(Class::new(name.lexeme, class_methods, superclass_class));

        // Constructing the class calls `init` if there is one, so the class
        // arity is the initializer's, walking the superclass chain.
        let arity = match class.find_method(interner.sym_init) {
            Some(Value::Callable(initializer)) => initializer.arity(),
            _ => 0,
        };

        self.environment.assign(
            interner,
            name,
            Value::Callable(Rc::new(Function::Class(arity, class))),
        )?;
        Ok(())
    }

    pub fn execute_block(
        &mut self,
        interner: &Interner,
        out: &mut dyn OutputSink,
        statements: &[Stmt],
        environment: Environment,
    ) -> RunResult<()> {
        let previous = std::mem::replace(&mut self.environment, Rc::new(environment));

        let mut ret = Ok(());
        for statement in statements {
            ret = self.execute(interner, out, statement);
            if ret.is_err() {
                break;
            }
        }

        self.environment = previous;

        ret
    }

    fn evaluate(
        &mut self,
        interner: &Interner,
        out: &mut dyn OutputSink,
        expr: &Expr,
    ) -> RunResult<Value> {
        match expr {
            Expr::Literal { value } => Ok(match value {
                TokenLiteral::String(sym) => Value::InternedString(*sym),
                TokenLiteral::Number(num) => Value::Number(*num),
                TokenLiteral::Bool(b) => Value::Bool(*b),
                TokenLiteral::Nil => Value::Nil,
            }),
            Expr::Grouping { expression } => self.evaluate(interner, out, expression),
            Expr::Unary { operator, right } => {
                let right = self.evaluate(interner, out, right)?;

                match operator.token_type {
                    TokenType::Bang => Ok(Value::Bool(!right.is_truthy())),
                    TokenType::Minus => match right {
                        Value::Number(num) => Ok(Value::Number(-num)),
                        _ => Err(RuntimeError::new(operator, "Operand must be a number.").into()),
                    },
                    _ => unreachable!("unary operators are ! and -"),
                }
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                // Both operands evaluate before any type check.
                let left = self.evaluate(interner, out, left)?;
                let right = self.evaluate(interner, out, right)?;
                self.binary_op(interner, operator, left, right)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(interner, out, left)?;

                // Short-circuit, yielding the deciding operand untouched.
                if operator.token_type == TokenType::Or {
                    if left.is_truthy() {
                        return Ok(left);
                    }
                } else if !left.is_truthy() {
                    return Ok(left);
                }

                self.evaluate(interner, out, right)
            }
            Expr::Variable { id, name } => self.look_up_variable(interner, name, *id),
            Expr::Assign { id, name, value } => {
                let value = self.evaluate(interner, out, value)?;
                match self.locals.get(id.0).copied() {
                    Some(distance) => Environment::assign_at(
                        &self.environment,
                        distance,
                        name.lexeme,
                        value.clone(),
                    ),
                    None => self.globals.assign(interner, name, value.clone())?,
                }
                Ok(value)
            }
            Expr::Lambda(declaration) => Ok(Value::Callable(Rc::new(Function::Declared(
                Rc::clone(declaration),
                Rc::clone(&self.environment),
                false,
            )))),
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(interner, out, callee)?;

                let mut argument_values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    argument_values.push(self.evaluate(interner, out, argument)?);
                }

                match callee {
                    Value::Callable(function) => {
                        if argument_values.len() != function.arity() {
                            let message = format!(
                                "Expected {} arguments but got {}.",
                                function.arity(),
                                argument_values.len()
                            );
                            return Err(RuntimeError::new(paren, message).into());
                        }
                        function.call(self, interner, out, &argument_values)
                    }
                    _ => {
                        Err(RuntimeError::new(paren, "Can only call functions and classes.").into())
                    }
                }
            }
            Expr::Get { object, name } => {
                let object = self.evaluate(interner, out, object)?;
                match object {
                    Value::Instance(instance) => instance.get(interner, name),
                    _ => Err(RuntimeError::new(name, "Only instances have properties.").into()),
                }
            }
            Expr::Set {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(interner, out, object)?;
                match object {
                    Value::Instance(instance) => {
                        let value = self.evaluate(interner, out, value)?;
                        instance.set(name.lexeme, value.clone());
                        Ok(value)
                    }
                    _ => Err(RuntimeError::new(name, "Only instances have fields.").into()),
                }
            }
            Expr::This { id, keyword } => self.look_up_variable(interner, keyword, *id),
            Expr::Super { id, method, .. } => {
                let distance = self
                    .locals
                    .get(id.0)
                    .copied()
                    .expect("'super' always resolves to a local slot");
                let superclass = Environment::get_at(&self.environment, distance, interner.sym_super)
                    .to_class()
                    .expect("the 'super' slot always holds a class");
                let object = Environment::get_at(&self.environment, distance - 1, interner.sym_this)
                    .to_instance()
                    .expect("the 'this' slot always holds an instance");

                match superclass.find_method(method.lexeme) {
                    Some(Value::Callable(function)) => {
                        Ok(Value::Callable(Rc::new(function.bind(interner, object))))
                    }
                    Some(_) => unreachable!("method tables hold only callables"),
                    None => Err(RuntimeError::new(
                        method,
                        format!("Undefined property '{}'.", interner.resolve(method.lexeme)),
                    )
                    .into()),
                }
            }
        }
    }

    fn binary_op(
        &mut self,
        interner: &Interner,
        operator: &Token,
        left: Value,
        right: Value,
    ) -> RunResult<Value> {
        match operator.token_type {
            TokenType::Plus => {
                if let (Value::Number(l), Value::Number(r)) = (&left, &right) {
                    Ok(Value::Number(l + r))
                } else if left.is_string() || right.is_string() {
                    // One string is enough: the other operand is stringified.
                    let mut joined = stringify(interner, &left);
                    joined.push_str(&stringify(interner, &right));
                    Ok(Value::String(Rc::new(joined)))
                } else {
                    Err(RuntimeError::new(
                        operator,
                        "Operands must be two numbers or either operands must be a string.",
                    )
                    .into())
                }
            }
            TokenType::Minus => {
                let (l, r) = check_number_operands(operator, &left, &right)?;
                Ok(Value::Number(l - r))
            }
            TokenType::Star => {
                let (l, r) = check_number_operands(operator, &left, &right)?;
                Ok(Value::Number(l * r))
            }
            TokenType::Slash => {
                let (l, r) = check_number_operands(operator, &left, &right)?;
                if r == 0.0 {
                    Err(RuntimeError::new(operator, "Cannot divide by zero.").into())
                } else {
                    Ok(Value::Number(l / r))
                }
            }
            TokenType::Greater => {
                let (l, r) = check_number_operands(operator, &left, &right)?;
                Ok(Value::Bool(l > r))
            }
            TokenType::GreaterEqual => {
                let (l, r) = check_number_operands(operator, &left, &right)?;
                Ok(Value::Bool(l >= r))
            }
            TokenType::Less => {
                let (l, r) = check_number_operands(operator, &left, &right)?;
                Ok(Value::Bool(l < r))
            }
            TokenType::LessEqual => {
                let (l, r) = check_number_operands(operator, &left, &right)?;
                Ok(Value::Bool(l <= r))
            }
            TokenType::EqualEqual => Ok(Value::Bool(is_equal(&left, &right, interner))),
            TokenType::BangEqual => Ok(Value::Bool(!is_equal(&left, &right, interner))),
            _ => unreachable!("not a binary operator"),
        }
    }

    fn look_up_variable(
        &mut self,
        interner: &Interner,
        name: &Token,
        id: ExprId,
    ) -> RunResult<Value> {
        match self.locals.get(id.0).copied() {
            Some(distance) => {
                match Environment::slot_at(&self.environment, distance, name.lexeme) {
                    Slot::Value(value) => Ok(value),
                    Slot::Uninitialized => Err(RuntimeError::new(
                        name,
                        format!(
                            "Uninitialized variable '{}'.",
                            interner.resolve(name.lexeme)
                        ),
                    )
                    .into()),
                }
            }
            None => self.globals.get(interner, name),
        }
    }
}

fn check_number_operands(
    operator: &Token,
    left: &Value,
    right: &Value,
) -> RunResult<(f64, f64)> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok((*l, *r)),
        _ => Err(RuntimeError::new(operator, "Operands must be numbers.").into()),
    }
}
