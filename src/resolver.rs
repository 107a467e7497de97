use rustc_hash::FxHashMap;

use crate::ast::{Expr, ExprId, FunctionDecl, Program, Stmt};
use crate::interner::Symbol;
use crate::interpreter::Interpreter;
use crate::scanner::Token;
use crate::Session;

/// Static pass between parsing and execution. Walks the tree once, tracking
/// a stack of lexical scopes, and records on the interpreter how many
/// environments each variable reference must hop at runtime. Also rejects
/// the handful of constructs that are only detectable with scope context
/// (self-inheritance, stray `this`/`super`/`return`, shadowing in place).
pub struct Resolver<'a> {
    session: &'a Session,
    interpreter: &'a mut Interpreter,
    scopes: Vec<FxHashMap<Symbol, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

impl Resolver<'_> {
    pub fn new<'a>(session: &'a Session, interpreter: &'a mut Interpreter) -> Resolver<'a> {
        Resolver {
            session,
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    pub fn resolve(&mut self, program: &Program) {
        match program {
            Program::Statements(statements) => self.resolve_statements(statements),
            Program::Expression(expression) => self.resolve_expr(expression),
        }
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement)
        }
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Block { statements } => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::Function(declaration) => {
                let name = declaration
                    .name
                    .as_ref()
                    .expect("function statements carry a name");
                self.declare(name);
                self.define(name);

                self.resolve_function(declaration, FunctionType::Function);
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(stmt) = else_branch.as_ref() {
                    self.resolve_stmt(stmt)
                }
            }
            Stmt::Print { expression } => self.resolve_expr(expression),
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.session
                        .error_token(keyword, "Can't return from top-level code.")
                }

                if let Some(expr) = value.as_ref() {
                    // An initializer may fall through or `return this;`, but
                    // never produce any other value.
                    if self.current_function == FunctionType::Initializer
                        && !matches!(expr, Expr::This { .. })
                    {
                        self.session.error_token(
                            keyword,
                            "Can't return a non-this value from an initializer.",
                        )
                    }

                    self.resolve_expr(expr)
                }
            }
            Stmt::Var { name, initializer } => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[std::rc::Rc<FunctionDecl>],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(superclass) = superclass {
            let superclass_name = match superclass {
                Expr::Variable { name, .. } => name,
                _ => unreachable!("superclass clauses parse as variables"),
            };
            if superclass_name.lexeme == name.lexeme {
                self.session
                    .error_token(name, "A class can't inherit from itself.");
            }

            self.current_class = ClassType::Subclass;

            self.resolve_expr(superclass);

            // Methods of a subclass see `super` one scope out from `this`.
            self.begin_scope();
            let last = self.scopes.len() - 1;
            self.scopes[last].insert(self.session.interner.sym_super, true);
        }

        self.begin_scope();
        let last = self.scopes.len() - 1;
        self.scopes[last].insert(self.session.interner.sym_this, true);

        for method in methods {
            let method_name = method.name.as_ref().expect("methods carry a name");
            let declaration = if method_name.lexeme == self.session.interner.sym_init {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, declaration);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, declaration: &FunctionDecl, function_type: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = function_type;

        self.begin_scope();
        for param in &declaration.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_statements(&declaration.body);
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Assign { id, name, value } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expr::Grouping { expression } => self.resolve_expr(expression),
            Expr::Lambda(declaration) => {
                self.resolve_function(declaration, FunctionType::Function)
            }
            Expr::Literal { .. } => {}
            Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Unary { right, .. } => self.resolve_expr(right),
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.session.error_token(
                            name,
                            "Can't read local variable in its own initializer.",
                        );
                    }
                }
                self.resolve_local(*id, name);
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.session
                        .error_token(keyword, "Can't use 'this' outside of a class.");
                } else {
                    self.resolve_local(*id, keyword);
                }
            }
            Expr::Super { id, keyword, .. } => {
                if self.current_class == ClassType::None {
                    self.session
                        .error_token(keyword, "Can't use 'super' outside of a class.");
                } else if self.current_class != ClassType::Subclass {
                    self.session
                        .error_token(keyword, "Can't use 'super' in a class with no superclass.");
                }
                self.resolve_local(*id, keyword);
            }
        }
    }

    /// Innermost scope containing the name wins; its distance from the use
    /// site goes into the side-table. No entry means the name is global.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for i in (0..self.scopes.len()).rev() {
            if self.scopes[i].contains_key(&name.lexeme) {
                self.interpreter.resolve(id, self.scopes.len() - 1 - i);
                return;
            }
        }
    }

    /// Marks the name as existing-but-unusable so its own initializer cannot
    /// read it. A no-op at global scope: global redefinition is legal.
    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                self.session
                    .error_token(name, "Already a variable with this name in this scope.")
            }
            scope.insert(name.lexeme, false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme, true);
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }
}

#[cfg(test)]
mod resolver_tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn resolve_source(source: &str) -> Session {
        let session = Session::new();
        let mut interpreter = Interpreter::new(&session.interner);
        let tokens = Scanner::new(&session, source.as_bytes()).scan_tokens();
        let program = Parser::new(&session, tokens).parse();
        assert!(!session.had_error(), "source failed to parse");
        Resolver::new(&session, &mut interpreter).resolve(&program);
        session
    }

    fn assert_rejected(source: &str) {
        assert!(
            resolve_source(source).had_error(),
            "expected a static error for {:?}",
            source
        );
    }

    fn assert_accepted(source: &str) {
        assert!(
            !resolve_source(source).had_error(),
            "expected no static error for {:?}",
            source
        );
    }

    #[test]
    fn reading_a_local_in_its_own_initializer() {
        assert_rejected("{ var a = 1; { var a = a; } }");
        // Global redefinition is legal, including self-reference.
        assert_accepted("var a = 1; var a = a;");
    }

    #[test]
    fn duplicate_declaration_in_one_scope() {
        assert_rejected("{ var a = 1; var a = 2; }");
        assert_rejected("fun f(a, a) {}");
        assert_accepted("var a = 1; var a = 2;");
        assert_accepted("{ var a = 1; { var a = 2; } }");
    }

    #[test]
    fn return_outside_a_function() {
        assert_rejected("return 1;");
        assert_accepted("fun f() { return 1; }");
    }

    #[test]
    fn initializers_may_only_return_this() {
        assert_rejected("class C { init() { return 1; } }");
        assert_accepted("class C { init() { return; } }");
        assert_accepted("class C { init() { return this; } }");
        assert_accepted("class C { other() { return 1; } }");
    }

    #[test]
    fn this_outside_a_class() {
        assert_rejected("print this;");
        assert_rejected("fun f() { return this; }");
        assert_accepted("class C { m() { return this; } }");
    }

    #[test]
    fn super_needs_a_subclass() {
        assert_rejected("print super.m;");
        assert_rejected("class C { m() { super.m(); } }");
        assert_accepted("class A {} class B < A { m() { super.m(); } }");
    }

    #[test]
    fn a_class_cannot_inherit_from_itself() {
        assert_rejected("class C < C {}");
    }

    #[test]
    fn lambdas_resolve_like_functions() {
        assert_accepted("var f = fun (x) { return x; };");
        // A return inside a lambda is inside a function.
        assert_accepted("var f = fun () { return 1; };");
        assert_rejected("var f = fun (a, a) { return a; };");
    }
}
