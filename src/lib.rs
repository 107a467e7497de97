pub mod ast;
pub mod callable;
pub mod environment;
pub mod error;
pub mod interner;
pub mod interpreter;
pub mod output;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod value;

use std::cell::{Cell, RefCell};

use log::debug;

use crate::ast::{ExprId, Program};
use crate::error::RuntimeError;
use crate::interner::Interner;
use crate::interpreter::Interpreter;
use crate::output::OutputSink;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::{Scanner, Token, TokenType};
use crate::value::stringify;

/// State shared by every input of one session: the interner, the error
/// flags, and the expression-id counter. An interactive session keeps one
/// `Session` and one `Interpreter` alive across lines and clears the error
/// flag in between; ids keep counting up so the accumulated side-table never
/// aliases expressions from different lines.
pub struct Session {
    pub interner: Interner,
    had_error: Cell<bool>,
    had_runtime_error: Cell<bool>,
    expr_ids: Cell<usize>,
    last_runtime_error: RefCell<Option<String>>,
}

impl Session {
    pub fn new() -> Session {
        Session {
            interner: Interner::new(),
            had_error: Cell::new(false),
            had_runtime_error: Cell::new(false),
            expr_ids: Cell::new(0),
            last_runtime_error: RefCell::new(None),
        }
    }

    /// One trip through the pipeline: scan, parse, resolve, interpret.
    /// Later stages are skipped as soon as an earlier one reported. In
    /// interactive mode a bare-expression input prints its value.
    pub fn run(
        &self,
        interpreter: &mut Interpreter,
        source: &str,
        out: &mut dyn OutputSink,
        interactive: bool,
    ) {
        let tokens = Scanner::new(self, source.as_bytes()).scan_tokens();
        debug!("scanned {} tokens", tokens.len());

        let program = Parser::new(self, tokens).parse();

        if self.had_error.get() {
            return;
        }

        Resolver::new(self, interpreter).resolve(&program);

        if self.had_error.get() {
            return;
        }

        match &program {
            Program::Statements(statements) => {
                debug!("executing {} statements", statements.len());
                interpreter.interpret(self, out, statements);
            }
            Program::Expression(expression) => {
                debug!("evaluating a bare expression");
                if let Some(value) = interpreter.interpret_expression(self, out, expression) {
                    if interactive {
                        out.write_line(&stringify(&self.interner, &value));
                    }
                }
            }
        }
    }

    pub fn error(&self, line: u64, message: &str) {
        self.report(line, "", message);
    }

    pub fn error_token(&self, token: &Token, message: &str) {
        if token.token_type == TokenType::Eof {
            self.report(token.line, " at end", message);
        } else {
            let lexeme = self.interner.resolve(token.lexeme);
            self.report(token.line, &format!(" at '{}'", lexeme), message);
        }
    }

    pub fn runtime_error(&self, error: &RuntimeError) {
        self.had_runtime_error.set(true);
        *self.last_runtime_error.borrow_mut() = Some(error.to_string());
        eprintln!("{}", error);
    }

    fn report(&self, line: u64, origin: &str, message: &str) {
        self.had_error.set(true);
        eprintln!("[line {}] Error{}: {}", line, origin, message);
    }

    pub fn had_error(&self) -> bool {
        self.had_error.get()
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error.get()
    }

    /// The interactive driver clears the static-error flag between lines.
    pub fn reset_error(&self) {
        self.had_error.set(false);
    }

    /// Last runtime diagnostic as it was written to stderr.
    pub fn last_runtime_error(&self) -> Option<String> {
        self.last_runtime_error.borrow().clone()
    }

    pub(crate) fn next_expr_id(&self) -> ExprId {
        let id = self.expr_ids.get();
        self.expr_ids.set(id + 1);
        ExprId(id)
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}
