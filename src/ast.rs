//! This module defines the syntax types of the interpreter. [`Datum`] is the
//! nested literal tree that programs arrive as (and that `quote` returns),
//! while [`Expr`] is the closed expression type every later stage works on.
//! The single conversion between the two, `Expr::try_from(&Datum)`, is the
//! only place that inspects list shapes; after it, the desugarer and the
//! evaluator match exhaustively on variants.
//!
//! Ergonomic helper functions such as [`val`], [`sym`], and [`nil`] are
//! provided for building data in code and tests, together with conversion
//! traits from common Rust literals.

use std::fmt;
use std::rc::Rc;

use crate::Error;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Allowed non-alphanumeric characters in symbol names
#[cfg_attr(not(feature = "scheme"), allow(dead_code))]
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
#[cfg_attr(not(feature = "scheme"), allow(dead_code))]
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// A binding name.
///
/// `Generated` names are allocated by the desugarer for bindings the user
/// never wrote. They live in a separate namespace, so no user identifier can
/// capture or shadow them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Named(String),
    Generated(usize),
}

impl Symbol {
    pub fn named(name: impl Into<String>) -> Self {
        Symbol::Named(name.into())
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::Named(name.to_owned())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Named(name) => write!(f, "{name}"),
            Symbol::Generated(id) => write!(f, "#:loop{id}"),
        }
    }
}

/// Nested literal data: the external program representation and the result
/// of `quote`.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Number(NumberType),
    Symbol(String),
    String(String),
    Bool(bool),
    List(Vec<Datum>),
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Datum {
            fn from(n: $int_type) -> Self {
                Datum::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(v: Vec<T>) -> Self {
        Datum::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Datum>, const N: usize> From<[T; N]> for Datum {
    fn from(arr: [T; N]) -> Self {
        Datum::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Datum {
    Datum::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating data from any convertible Rust value
pub fn val<T: Into<Datum>>(value: T) -> Datum {
    value.into()
}

/// Helper function for creating empty lists (nil)
pub fn nil() -> Datum {
    Datum::List(vec![])
}

pub(crate) fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Number(n) => write!(f, "{n}"),
            Datum::Symbol(s) => write!(f, "{s}"),
            Datum::String(s) => write_escaped(f, s),
            Datum::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Datum::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// The seven binary operators. All evaluate both operands eagerly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Eq,
}

impl BinaryOperator {
    pub fn from_symbol(name: &str) -> Option<Self> {
        let op = match name {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            ">" => BinaryOperator::Gt,
            "<" => BinaryOperator::Lt,
            "=" => BinaryOperator::Eq,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lt => "<",
            BinaryOperator::Eq => "=",
        }
    }
}

/// Core expression type.
///
/// `For` is surface sugar: [`crate::desugar`] removes every occurrence and
/// the evaluator rejects any that slip through.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(NumberType),
    String(String),
    Bool(bool),
    Identifier(Symbol),
    Define {
        name: Symbol,
        value: Box<Expr>,
    },
    LetRec {
        name: Symbol,
        binding: Box<Expr>,
        body: Box<Expr>,
    },
    Quote(Datum),
    BinaryOp {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Begin(Vec<Expr>),
    Lambda {
        param: Symbol,
        // Shared with every closure created from this lambda
        body: Rc<Expr>,
    },
    Apply {
        callee: Box<Expr>,
        arg: Box<Expr>,
    },
    For {
        loop_var: Symbol,
        start: Box<Expr>,
        cond: Box<Expr>,
        update_var: Symbol,
        update: Box<Expr>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: &str) -> Self {
        Expr::Identifier(Symbol::named(name))
    }

    pub fn define(name: &str, value: Expr) -> Self {
        Expr::Define {
            name: Symbol::named(name),
            value: Box::new(value),
        }
    }

    pub fn letrec(name: impl Into<Symbol>, binding: Expr, body: Expr) -> Self {
        Expr::LetRec {
            name: name.into(),
            binding: Box::new(binding),
            body: Box::new(body),
        }
    }

    pub fn binary(op: BinaryOperator, lhs: Expr, rhs: Expr) -> Self {
        Expr::BinaryOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn if_(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn lambda(param: impl Into<Symbol>, body: Expr) -> Self {
        Expr::Lambda {
            param: param.into(),
            body: Rc::new(body),
        }
    }

    pub fn apply(callee: Expr, arg: Expr) -> Self {
        Expr::Apply {
            callee: Box::new(callee),
            arg: Box::new(arg),
        }
    }

    /// Returns true if any `For` node remains in the tree
    pub fn contains_sugar(&self) -> bool {
        match self {
            Expr::For { .. } => true,
            Expr::Number(_)
            | Expr::String(_)
            | Expr::Bool(_)
            | Expr::Identifier(_)
            | Expr::Quote(_) => false,
            Expr::Define { value, .. } => value.contains_sugar(),
            Expr::LetRec { binding, body, .. } => {
                binding.contains_sugar() || body.contains_sugar()
            }
            Expr::BinaryOp { lhs, rhs, .. } => lhs.contains_sugar() || rhs.contains_sugar(),
            Expr::If {
                cond,
                then,
                otherwise,
            } => cond.contains_sugar() || then.contains_sugar() || otherwise.contains_sugar(),
            Expr::Begin(exprs) => exprs.iter().any(Expr::contains_sugar),
            Expr::Lambda { body, .. } => body.contains_sugar(),
            Expr::Apply { callee, arg } => callee.contains_sugar() || arg.contains_sugar(),
        }
    }
}

impl From<Symbol> for Expr {
    fn from(name: Symbol) -> Self {
        Expr::Identifier(name)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::String(s) => write_escaped(f, s),
            Expr::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Expr::Identifier(name) => write!(f, "{name}"),
            Expr::Define { name, value } => write!(f, "(define {name} {value})"),
            Expr::LetRec {
                name,
                binding,
                body,
            } => write!(f, "(letrec (({name} {binding})) {body})"),
            Expr::Quote(datum) => write!(f, "(quote {datum})"),
            Expr::BinaryOp { op, lhs, rhs } => write!(f, "({} {lhs} {rhs})", op.symbol()),
            Expr::If {
                cond,
                then,
                otherwise,
            } => write!(f, "(if {cond} {then} {otherwise})"),
            Expr::Begin(exprs) => {
                write!(f, "(begin")?;
                for expr in exprs {
                    write!(f, " {expr}")?;
                }
                write!(f, ")")
            }
            Expr::Lambda { param, body } => write!(f, "(lambda ({param}) {body})"),
            Expr::Apply { callee, arg } => write!(f, "({callee} {arg})"),
            Expr::For {
                loop_var,
                start,
                cond,
                update_var,
                update,
                body,
            } => write!(
                f,
                "(for ({loop_var} {start}) {cond} ({update_var} {update}) {body})"
            ),
        }
    }
}

//
// Boundary conversion: Datum -> Expr
//

fn invalid_syntax(message: impl fmt::Display) -> Error {
    Error::InvalidSyntax(format!("invalid syntax: {message}"))
}

fn convert(datum: &Datum) -> Result<Box<Expr>, Error> {
    Expr::try_from(datum).map(Box::new)
}

fn binder(datum: &Datum, form: &str) -> Result<Symbol, Error> {
    match datum {
        Datum::Symbol(name) if !is_reserved(name) => Ok(Symbol::named(name.as_str())),
        other => Err(invalid_syntax(format!(
            "{form} expects a non-keyword symbol, got {other}"
        ))),
    }
}

/// Names with a fixed meaning in operator position
pub(crate) fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "define" | "letrec" | "quote" | "if" | "begin" | "lambda" | "for"
    ) || BinaryOperator::from_symbol(name).is_some()
}

fn expect_args<'a, const N: usize>(
    args: &'a [Datum],
    form: &str,
) -> Result<&'a [Datum; N], Error> {
    args.try_into().map_err(|_| {
        invalid_syntax(format!(
            "{form} expects {N} operand(s), got {}",
            args.len()
        ))
    })
}

fn convert_define(args: &[Datum]) -> Result<Expr, Error> {
    let [name, value] = expect_args::<2>(args, "define")?;
    Ok(Expr::Define {
        name: binder(name, "define")?,
        value: convert(value)?,
    })
}

/// `(letrec ((name binding)) body)`
fn convert_letrec(args: &[Datum]) -> Result<Expr, Error> {
    let [bindings, body] = expect_args::<2>(args, "letrec")?;
    let Datum::List(bindings) = bindings else {
        return Err(invalid_syntax("letrec bindings must be a list"));
    };
    let [Datum::List(pair)] = bindings.as_slice() else {
        return Err(invalid_syntax("letrec expects exactly one binding"));
    };
    let [name, binding] = expect_args::<2>(pair, "letrec binding")?;
    Ok(Expr::LetRec {
        name: binder(name, "letrec")?,
        binding: convert(binding)?,
        body: convert(body)?,
    })
}

fn convert_if(args: &[Datum]) -> Result<Expr, Error> {
    let [cond, then, otherwise] = expect_args::<3>(args, "if")?;
    Ok(Expr::If {
        cond: convert(cond)?,
        then: convert(then)?,
        otherwise: convert(otherwise)?,
    })
}

fn convert_begin(args: &[Datum]) -> Result<Expr, Error> {
    if args.is_empty() {
        return Err(invalid_syntax("begin requires at least one expression"));
    }
    args.iter()
        .map(Expr::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(Expr::Begin)
}

/// `(lambda (param) body)`; exactly one parameter
fn convert_lambda(args: &[Datum]) -> Result<Expr, Error> {
    let [params, body] = expect_args::<2>(args, "lambda")?;
    let Datum::List(params) = params else {
        return Err(invalid_syntax("lambda parameters must be a list"));
    };
    let [param] = params.as_slice() else {
        return Err(invalid_syntax(format!(
            "lambda takes exactly one parameter, got {}",
            params.len()
        )));
    };
    Ok(Expr::Lambda {
        param: binder(param, "lambda")?,
        body: Rc::new(Expr::try_from(body)?),
    })
}

/// `(for (var start) cond (var update) body)`
fn convert_for(args: &[Datum]) -> Result<Expr, Error> {
    let [init, cond, step, body] = expect_args::<4>(args, "for")?;
    let (Datum::List(init), Datum::List(step)) = (init, step) else {
        return Err(invalid_syntax("for clauses must be (symbol expression) lists"));
    };
    let [loop_var, start] = expect_args::<2>(init, "for initializer")?;
    let [update_var, update] = expect_args::<2>(step, "for update")?;
    let loop_var = binder(loop_var, "for")?;
    let update_var = binder(update_var, "for")?;

    // The rewritten loop always rebinds the loop variable, so an update
    // clause naming anything else could never mean what it says.
    if update_var != loop_var {
        return Err(invalid_syntax(format!(
            "for update must assign loop variable {loop_var}, not {update_var}"
        )));
    }

    Ok(Expr::For {
        loop_var,
        start: convert(start)?,
        cond: convert(cond)?,
        update_var,
        update: convert(update)?,
        body: convert(body)?,
    })
}

fn convert_list(elements: &[Datum]) -> Result<Expr, Error> {
    let [head, args @ ..] = elements else {
        return Err(invalid_syntax("cannot evaluate empty list"));
    };

    if let Datum::Symbol(keyword) = head {
        if let Some(op) = BinaryOperator::from_symbol(keyword) {
            let [lhs, rhs] = expect_args::<2>(args, keyword)?;
            return Ok(Expr::BinaryOp {
                op,
                lhs: convert(lhs)?,
                rhs: convert(rhs)?,
            });
        }
        match keyword.as_str() {
            "define" => return convert_define(args),
            "letrec" => return convert_letrec(args),
            "quote" => {
                let [datum] = expect_args::<1>(args, "quote")?;
                return Ok(Expr::Quote(datum.clone()));
            }
            "if" => return convert_if(args),
            "begin" => return convert_begin(args),
            "lambda" => return convert_lambda(args),
            "for" => return convert_for(args),
            _ => {}
        }
    }

    match args {
        [arg] => Ok(Expr::Apply {
            callee: convert(head)?,
            arg: convert(arg)?,
        }),
        _ => Err(invalid_syntax(format!(
            "application takes exactly one argument, got {}",
            args.len()
        ))),
    }
}

impl TryFrom<&Datum> for Expr {
    type Error = Error;

    fn try_from(datum: &Datum) -> Result<Self, Error> {
        match datum {
            Datum::Number(n) => Ok(Expr::Number(*n)),
            Datum::String(s) => Ok(Expr::String(s.clone())),
            Datum::Bool(b) => Ok(Expr::Bool(*b)),
            Datum::Symbol(name) => Ok(Expr::Identifier(Symbol::named(name.as_str()))),
            Datum::List(elements) => convert_list(elements),
        }
    }
}
