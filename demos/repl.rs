use std::cell::RefCell;
use std::panic;
use std::process;
use std::rc::Rc;

use loopscheme::builtinops::install_builtins;
use loopscheme::desugar::desugar;
use loopscheme::evaluator::{self, Environment};
use loopscheme::scheme::{ParseConfig, parse_program_with_config};
use loopscheme::value::Value;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    // Only initialize if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn main() {
    init_tracing();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

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

fn run_repl() {
    println!("loopscheme: a small expression language with for loops");
    println!("Enter S-expressions like: (for (i 0) (< i 3) (i (+ i 1)) (print i))");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");

    // Unlike `run`, the session keeps one root environment so definitions persist
    let env = Environment::root();
    install_builtins(&env, Rc::new(RefCell::new(std::io::stdout())));

    let config = ParseConfig {
        handle_comments: true,
    };
    let mut show_expansion = false;

    loop {
        match rl.readline("loopscheme> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":expand" => {
                        show_expansion = !show_expansion;
                        let state = if show_expansion { "on" } else { "off" };
                        println!("Showing desugared programs: {state}");
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let result = parse_program_with_config(line, config).and_then(|expr| {
                    let expanded = desugar(&expr);
                    if show_expansion && expr.contains_sugar() {
                        println!("→ {expanded}");
                    }
                    evaluator::eval(&expanded, &env)
                });

                match result {
                    // `print` already wrote its output
                    Ok(Value::Unit) => {}
                    Ok(value) => println!("{value}"),
                    Err(e) => println!("Error: {e}"),
                }
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
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :expand    - Toggle display of desugared for loops (→)");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Forms:");
    println!("  Literals: 42, -5, #x1F, #t, #f, \"text\"");
    println!("  Operators: (+ a b) (- a b) (* a b) (/ a b) (> a b) (< a b) (= a b)");
    println!("  (define name expr)      (if cond then else)    (begin e1 e2 ...)");
    println!("  (lambda (x) body)       (f arg)                (quote datum) or 'datum");
    println!("  (letrec ((f (lambda (x) ...))) body)");
    println!("  (for (i start) cond (i update) body)   evaluates to 'done");
    println!("  (print expr)");
    println!();
    println!("Examples:");
    println!("  (define double (lambda (y) (* y 2)))");
    println!("  (double 21)");
    println!("  (for (i 0) (< i 5) (i (+ i 1)) (print i))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    let (builtins, user_defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::Native(_)));

    if !builtins.is_empty() {
        println!("  Built-in procedures:");
        for (name, _) in builtins {
            println!("    {name}");
        }
    }
    if !user_defined.is_empty() {
        println!("  User-defined:");
        for (name, value) in user_defined {
            println!("    {name} = {value}");
        }
    }
}
