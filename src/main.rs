use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use treelox::interpreter::Interpreter;
use treelox::output::StdoutSink;
use treelox::Session;

/// Tree-walking interpreter for the Lox scripting language.
#[derive(Parser, Debug)]
#[command(name = "treelox", version, about)]
struct Cli {
    /// Script to run; omit it to get an interactive prompt.
    script: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let session = Session::new();
    let mut interpreter = Interpreter::new(&session.interner);

    match cli.script.as_slice() {
        [] => run_prompt(&session, &mut interpreter),
        [path] => run_file(&session, &mut interpreter, path),
        _ => {
            eprintln!("Usage: treelox [script]");
            ExitCode::from(64)
        }
    }
}

fn run_file(session: &Session, interpreter: &mut Interpreter, path: &PathBuf) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Error: could not read {}: {}", path.display(), error);
            return ExitCode::from(66);
        }
    };

    let mut out = StdoutSink;
    session.run(interpreter, &source, &mut out, false);

    if session.had_error() {
        ExitCode::from(65)
    } else if session.had_runtime_error() {
        ExitCode::from(70)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_prompt(session: &Session, interpreter: &mut Interpreter) -> ExitCode {
    let stdin = io::stdin();
    let mut handle = stdin.lock();
    let mut out = StdoutSink;
    let mut line = String::with_capacity(1024);

    loop {
        print!("> ");
        io::stdout().flush().expect("could not flush stdout");

        line.clear();
        match handle.read_line(&mut line) {
            // EOF: the user is done.
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {
                if !line.trim().is_empty() {
                    session.run(interpreter, &line, &mut out, true);
                }
                session.reset_error();
            }
            Err(error) => {
                eprintln!("Error: {}", error);
                return ExitCode::from(70);
            }
        }
    }
}
