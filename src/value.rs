//! Runtime values produced by evaluation.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Datum, Expr, NumberType, Symbol, write_escaped};
use crate::evaluator::Environment;

/// Canonical signature of a native (Rust-implemented) procedure
pub type NativeFn = dyn Fn(Value) -> Result<Value, Error>;

/// A user-defined procedure: parameter, body and the environment chain that
/// was active where the `lambda` was evaluated.
pub struct Closure {
    pub param: Symbol,
    pub body: Rc<Expr>,
    pub env: Environment,
    /// Name the closure is bound to inside its own calls. Set for `letrec`
    /// procedures, which capture the scope *outside* the `letrec` and see
    /// themselves through each call frame instead.
    pub self_name: Option<Symbol>,
}

impl fmt::Debug for Closure {
    // The captured environment may contain this closure, so it is left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("param", &self.param)
            .field("body", &self.body)
            .field("self_name", &self.self_name)
            .finish_non_exhaustive()
    }
}

/// A procedure implemented in Rust, such as `print`.
/// Uses the id string for equality comparison instead of the function pointer
#[derive(Clone)]
pub struct NativeFunction {
    pub id: String,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        id: impl Into<String>,
        func: impl Fn(Value) -> Result<Value, Error> + 'static,
    ) -> Self {
        NativeFunction {
            id: id.into(),
            func: Rc::new(func),
        }
    }

    pub fn call(&self, arg: Value) -> Result<Value, Error> {
        (self.func)(arg)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.id)
    }
}

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Number(NumberType),
    Text(String),
    Bool(bool),
    Closure(Rc<Closure>),
    Native(NativeFunction),
    /// Quoted structure, returned verbatim by `quote`
    Datum(Datum),
    /// Result of side-effecting natives such as `print`
    Unit,
}

impl Value {
    /// Everything except `#f` counts as true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Native(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Closure(_) | Value::Native(_) => "procedure",
            Value::Datum(_) => "datum",
            Value::Unit => "unit",
        }
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Datum> for Value {
    fn from(datum: Datum) -> Self {
        Value::Datum(datum)
    }
}

impl TryFrom<Value> for NumberType {
    type Error = Error;

    fn try_from(value: Value) -> Result<NumberType, Error> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(Error::ArithmeticError(format!(
                "expected number, got {}: {other}",
                other.type_name()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Datum(a), Value::Datum(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a.id == b.id,
            (Value::Unit, Value::Unit) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write_escaped(f, s),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Closure(closure) => write!(f, "#<procedure:{}>", closure.param),
            Value::Native(native) => write!(f, "#<builtin:{}>", native.id),
            Value::Datum(datum) => write!(f, "{datum}"),
            Value::Unit => write!(f, "#<unit>"),
        }
    }
}
