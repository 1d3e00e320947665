use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use bytelox::{InterpretError, Vm};

fn main() {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => run_repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: bytelox [path]");
            process::exit(64);
        }
    }
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read \"{}\": {}", path, err);
            process::exit(1);
        }
    };

    let mut vm = Vm::new();
    if let Err(err) = vm.interpret(&source) {
        report(&err);
        match err {
            InterpretError::Compile(_) => process::exit(65),
            InterpretError::Runtime(_) => process::exit(70),
        }
    }
}

fn report(err: &InterpretError) {
    match err {
        InterpretError::Compile(errors) => {
            for error in errors {
                eprintln!("{}", error);
            }
        }
        InterpretError::Runtime(error) => eprintln!("{}", error),
    }
}

fn run_repl() {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Failed to start line editor: {}", err);
            process::exit(1);
        }
    };

    let history_path = dirs::home_dir()
        .map(|home| home.join(".bytelox_history"))
        .unwrap_or_else(|| PathBuf::from(".bytelox_history"));
    if history_path.exists() {
        let _ = rl.load_history(&history_path);
    }

    // One VM for the whole session: globals and interned strings carry over
    // from line to line. Errors are reported and the loop keeps going.
    let mut vm = Vm::new();
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);
                if let Err(err) = vm.interpret(&line) {
                    report(&err);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
}
