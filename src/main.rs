use argh::FromArgs;
use muscheme::Error;
use muscheme::ast::Value;
use muscheme::evaluator::{self, Environment, Procedure};
use muscheme::repl::{load_file, run_source};
use muscheme::scheme::SchemeReader;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A small Scheme interpreter with dynamically scoped mu procedures
struct Args {
    /// source files to load, in order
    #[argh(positional)]
    files: Vec<String>,
    /// enter the interactive loop after loading files
    #[argh(switch, short = 'i')]
    interactive: bool,
}

fn main() {
    let args: Args = argh::from_env();

    let filter = EnvFilter::try_from_env("MUSCHEME_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| run(&args));

    match result {
        Ok(code) => process::exit(code),
        Err(panic_info) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }

            process::exit(1);
        }
    }
}

fn run(args: &Args) -> i32 {
    let env = evaluator::create_global_env();

    for file in &args.files {
        if let Err(e) = load_file(file, &env) {
            eprintln!("Error: {e}");
            return 1;
        }
    }

    if args.files.is_empty() || args.interactive {
        run_repl(&env);
    }
    0
}

/// True when `source` ends inside an unfinished datum
fn needs_more_input(source: &str) -> bool {
    SchemeReader::new(source)
        .last()
        .is_some_and(|form| matches!(form, Err(Error::ParseError(e)) if e.is_incomplete()))
}

fn run_repl(env: &Environment) {
    println!("muscheme interpreter");
    println!("Enter expressions like: (define (f x) (* x x))");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize line editor: {e}");
            return;
        }
    };

    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "scm> " } else { "...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }

                    // Special commands only at the start of an entry
                    match command {
                        ":help" => {
                            let _ = rl.add_history_entry(command);
                            print_help();
                            continue;
                        }
                        ":env" => {
                            let _ = rl.add_history_entry(command);
                            print_environment(env);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                buffer.push_str(&line);
                buffer.push('\n');

                if needs_more_input(&buffer) {
                    continue;
                }

                let _ = rl.add_history_entry(buffer.trim_end());
                run_source(&buffer, env);
                buffer.clear();
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("muscheme commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote if and or cond begin let lambda mu define");
    println!();
    println!("Procedures:");
    println!("  (lambda (x) body)  - sees the frame it was created in");
    println!("  (mu (x) body)      - sees the frame it is called from");
    println!("  (load \"file\")      - run a file in the global frame");
    println!();
    println!("Examples:");
    println!("  (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    println!("  (define (f) y) (define (g y) (f)) (g 3)");
    println!("  (define f (mu () y)) (define (g y) (f)) (g 3)");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate primitives from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Procedure(Procedure::Primitive(_)) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Primitives ({}):", builtins.len());
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
