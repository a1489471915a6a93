//! Built-in operations.
//!
//! ## Binary operators
//!
//! The seven operators of the language are syntax, not procedures: they
//! cannot be passed around or rebound, and the evaluator dispatches on
//! [`BinaryOperator`] directly.
//!
//! - **Type Safety**: `+ - * / > <` require two numbers; anything else is an
//!   [`Error::ArithmeticError`]. There is no coercion.
//! - **Overflow Detection**: arithmetic is checked `i64`; overflow is an error.
//! - **Division**: integer division truncating toward zero; dividing by zero
//!   is an error.
//! - **Equality**: `=` compares any two values by [`Value`] equality and never
//!   fails.
//!
//! ## Native procedures
//!
//! The root environment of every run holds exactly one native binding,
//! `print`, built by [`builtin_print`] around an injected output channel.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::Error;
use crate::ast::{BinaryOperator, NumberType, Symbol};
use crate::evaluator::Environment;
use crate::value::{NativeFunction, Value};

/// Shared output channel that `print` writes to
pub type Output = Rc<RefCell<dyn Write>>;

fn numeric_operands(
    op: BinaryOperator,
    lhs: Value,
    rhs: Value,
) -> Result<(NumberType, NumberType), Error> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        (a, b) => Err(Error::ArithmeticError(format!(
            "'{}' requires numeric operands, got {} and {}",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn overflow(op: BinaryOperator) -> Error {
    let what = match op {
        BinaryOperator::Add => "addition",
        BinaryOperator::Sub => "subtraction",
        BinaryOperator::Mul => "multiplication",
        _ => "division",
    };
    Error::ArithmeticError(format!("Integer overflow in {what}"))
}

/// Apply a binary operator to two already-evaluated operands
pub fn apply_binary_op(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value, Error> {
    if op == BinaryOperator::Eq {
        return Ok(Value::Bool(lhs == rhs));
    }

    let (a, b) = numeric_operands(op, lhs, rhs)?;
    let checked = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Sub => a.checked_sub(b),
        BinaryOperator::Mul => a.checked_mul(b),
        BinaryOperator::Div if b == 0 => {
            return Err(Error::ArithmeticError("division by zero".to_owned()));
        }
        // i64::MIN / -1 is the only overflowing quotient
        BinaryOperator::Div => a.checked_div(b),
        BinaryOperator::Gt => return Ok(Value::Bool(a > b)),
        BinaryOperator::Lt => return Ok(Value::Bool(a < b)),
        BinaryOperator::Eq => return Ok(Value::Bool(a == b)),
    };
    checked.map(Value::Number).ok_or_else(|| overflow(op))
}

/// External representation written by `print`: strings raw, everything
/// else as displayed.
pub fn printed_form(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The `print` capability: writes its argument and a newline to `output`,
/// returns [`Value::Unit`].
pub fn builtin_print(output: Output) -> NativeFunction {
    NativeFunction::new("print", move |value| {
        let mut out = output.borrow_mut();
        writeln!(out, "{}", printed_form(&value))
            .and_then(|()| out.flush())
            .map_err(|e| Error::EvalError(format!("print failed: {e}")))?;
        Ok(Value::Unit)
    })
}

/// Install every built-in into `env`
pub fn install_builtins(env: &Environment, output: Output) {
    env.define(Symbol::named("print"), Value::Native(builtin_print(output)));
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use BinaryOperator::*;

    #[test]
    fn test_binary_ops_data_driven() {
        let n = Value::Number;
        // (op, lhs, rhs, expected) where None means an ArithmeticError
        let test_cases = vec![
            (Add, n(1), n(2), Some(n(3))),
            (Add, n(-5), n(10), Some(n(5))),
            (Sub, n(10), n(3), Some(n(7))),
            (Mul, n(6), n(7), Some(n(42))),
            (Div, n(7), n(2), Some(n(3))),
            (Div, n(-7), n(2), Some(n(-3))),
            (Gt, n(5), n(3), Some(Value::Bool(true))),
            (Gt, n(3), n(3), Some(Value::Bool(false))),
            (Lt, n(-1), n(0), Some(Value::Bool(true))),
            (Eq, n(4), n(4), Some(Value::Bool(true))),
            (Eq, n(4), n(5), Some(Value::Bool(false))),
            (Eq, Value::from("a"), Value::from("a"), Some(Value::Bool(true))),
            (Eq, Value::Datum(sym("x")), Value::Datum(sym("x")), Some(Value::Bool(true))),
            (Eq, n(1), Value::from("1"), Some(Value::Bool(false))),
            // Overflow and division by zero
            (Add, n(NumberType::MAX), n(1), None),
            (Sub, n(NumberType::MIN), n(1), None),
            (Mul, n(NumberType::MAX), n(2), None),
            (Div, n(NumberType::MIN), n(-1), None),
            (Div, n(1), n(0), None),
            // Type mismatches
            (Add, n(1), Value::Bool(true), None),
            (Lt, Value::from("a"), Value::from("b"), None),
            (Mul, Value::Datum(val([1])), n(2), None),
        ];

        for (i, (op, lhs, rhs, expected)) in test_cases.into_iter().enumerate() {
            let result = apply_binary_op(op, lhs, rhs);
            match expected {
                Some(value) => assert_eq!(result.unwrap(), value, "case #{}", i + 1),
                None => assert!(
                    matches!(result, Err(Error::ArithmeticError(_))),
                    "case #{}: expected ArithmeticError, got {result:?}",
                    i + 1
                ),
            }
        }
    }

    #[test]
    fn test_error_messages() {
        let err = apply_binary_op(Div, Value::Number(1), Value::Number(0)).unwrap_err();
        assert_eq!(format!("{err}"), "ArithmeticError: division by zero");

        let err = apply_binary_op(Add, Value::Number(1), Value::from("x")).unwrap_err();
        assert_eq!(
            format!("{err}"),
            "ArithmeticError: '+' requires numeric operands, got number and string"
        );
    }

    #[test]
    fn test_print_writes_external_representation() {
        let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
        let print = builtin_print(buffer.clone());

        for value in [
            Value::Number(0),
            Value::from("plain text"),
            Value::Bool(true),
            Value::Datum(sym("done")),
        ] {
            assert_eq!(print.call(value).unwrap(), Value::Unit);
        }

        let written = String::from_utf8(buffer.borrow().clone()).unwrap();
        assert_eq!(written, "0\nplain text\n#t\ndone\n");
    }

    #[test]
    fn test_install_builtins() {
        let env = Environment::root();
        install_builtins(&env, Rc::new(RefCell::new(std::io::sink())));
        let print = env.lookup(&Symbol::named("print")).unwrap();
        assert!(print.is_procedure());
        assert_eq!(print.to_string(), "#<builtin:print>");
    }
}
