//! One-call entry points: desugar, build a fresh root environment, evaluate.
//!
//! Every call is independent. Bindings, frames and generated loop names
//! never carry over from one run to the next.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tracing::debug;

use crate::Error;
use crate::ast::{Datum, Expr};
use crate::builtinops::install_builtins;
use crate::desugar::desugar;
use crate::evaluator::{Environment, eval};
use crate::value::Value;

/// Run a program with `print` writing to standard output
pub fn run(program: &Expr) -> Result<Value, Error> {
    run_with_output(program, Rc::new(RefCell::new(std::io::stdout())))
}

/// Run a program with `print` writing to `output`.
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use loopscheme::ast::{BinaryOperator, Expr};
/// use loopscheme::run_with_output;
///
/// let out = Rc::new(RefCell::new(Vec::new()));
/// let program = Expr::apply(
///     Expr::ident("print"),
///     Expr::binary(BinaryOperator::Add, Expr::Number(1), Expr::Number(2)),
/// );
/// run_with_output(&program, out.clone()).unwrap();
/// assert_eq!(out.borrow().as_slice(), b"3\n");
/// ```
pub fn run_with_output<W: Write + 'static>(
    program: &Expr,
    output: Rc<RefCell<W>>,
) -> Result<Value, Error> {
    let desugared = desugar(program);

    let root = Environment::root();
    install_builtins(&root, output);

    debug!(program = %desugared, "run");
    let result = eval(&desugared, &root);
    // Closures defined into their own scope would otherwise keep the whole
    // chain, and with it `output`, alive after the run.
    root.release_cycles();
    match &result {
        Ok(value) => debug!(%value, "run finished"),
        Err(err) => debug!(%err, "run failed"),
    }
    result
}

/// Convert an input tree into an expression and run it
pub fn run_datum(program: &Datum) -> Result<Value, Error> {
    run(&Expr::try_from(program)?)
}

/// Read a program from S-expression text and run it
#[cfg(feature = "scheme")]
pub fn run_scheme(source: &str) -> Result<Value, Error> {
    run(&crate::scheme::parse_program(source)?)
}
