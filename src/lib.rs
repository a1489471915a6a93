//! loopscheme - evaluator for a minimal single-parameter Scheme dialect
//!
//! This crate evaluates programs written in a deliberately small expression
//! language: literals, `define`, `letrec`, `quote`, binary arithmetic and
//! comparison, `if`, `begin`, one-parameter `lambda`, one-argument application,
//! and a `for` loop that exists only as surface sugar.
//!
//! ```scheme
//! (begin
//!   (define x 10)
//!   (if (> x 5) (+ x 2) (- x 2)))          ; => 12
//!
//! (for (i 0) (< i 5) (i (+ i 1)) (print i)) ; prints 0..4, => done
//! ```
//!
//! ## Pipeline
//!
//! Programs arrive as an already-structured [`ast::Datum`] tree (numbers,
//! symbols, strings, booleans and nested lists). A single boundary conversion
//! turns that tree into the closed [`ast::Expr`] type, after which every stage
//! matches exhaustively on variants instead of re-inspecting list shapes:
//!
//! 1. [`desugar`] rewrites every `for` into a self-applying `letrec` loop,
//!    using generated names that cannot collide with user identifiers.
//! 2. [`evaluator`] walks the tree over a chain of mutable frames. Closures
//!    capture the chain active where they were created, and tail calls run
//!    on a trampoline so desugared loops do not grow the host stack.
//! 3. [`runner`] glues the two together and installs the `print` capability
//!    in a fresh root environment for every run.
//!
//! ## Strict semantics
//!
//! - Numbers are `i64`; overflow and division by zero are errors.
//! - Functions take exactly one argument; n-ary calls must be curried.
//! - `if` treats every value other than `#f` as true.
//!
//! ## Modules
//!
//! - `ast`: symbols, input data, expressions and the boundary conversion
//! - `value`: runtime values, closures and native functions
//! - `desugar`: the `for` rewriting pass
//! - `evaluator`: environments and evaluation
//! - `builtinops`: operator semantics and the `print` built-in
//! - `runner`: one-call entry points
//! - `scheme`: S-expression reader (feature `scheme`)

use thiserror::Error;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested structures read from text
pub const MAX_PARSE_DEPTH: usize = 32;

/// Maximum evaluation depth for non-tail nesting.
/// Tail calls run on a trampoline and do not count against this limit, so
/// it only bounds genuinely nested work such as `(* n (fact (- n 1)))`.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // `error_offset` is a byte offset; back up to a char boundary
        let error_offset = error_offset.min(input.len());
        let mut context_start = error_offset.saturating_sub(20);
        while !input.is_char_boundary(context_start) {
            context_start -= 1;
        }
        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        let found = input
            .get(error_offset..)
            .and_then(|rest| rest.chars().next())
            .map(|c| c.to_string());

        Self::new(kind, message, Some(display_context), found)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
///
/// Every failure aborts the whole evaluation; nothing inside the crate
/// catches and retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(ParseError),
    /// A name was absent from every frame of the environment chain
    #[error("Unbound identifier: {0}")]
    UnboundIdentifier(String),
    /// Malformed expression shape, or application of a non-procedure
    #[error("InvalidSyntax: {0}")]
    InvalidSyntax(String),
    /// Non-numeric operand, integer overflow or division by zero
    #[error("ArithmeticError: {0}")]
    ArithmeticError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod desugar;
pub mod evaluator;
pub mod runner;
pub mod value;

#[cfg(feature = "scheme")]
pub mod scheme;

pub use runner::{run, run_datum, run_with_output};

#[cfg(feature = "scheme")]
pub use runner::run_scheme;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_context_uses_byte_offsets() {
        // 'x' sits at byte 60 but char 30
        let input = format!("{}xy", "é".repeat(30));
        let err = ParseError::with_context(ParseErrorKind::InvalidSyntax, "bad", &input, 60);
        assert_eq!(err.context, Some(format!("[...]{}xy", "é".repeat(10))));
        assert_eq!(err.found.as_deref(), Some("x"));

        // Twenty bytes back from 'y' lands inside an 'é'
        let err = ParseError::with_context(ParseErrorKind::InvalidSyntax, "bad", &input, 61);
        assert_eq!(err.context, Some(format!("[...]{}xy", "é".repeat(10))));
        assert_eq!(err.found.as_deref(), Some("y"));
    }

    #[test]
    fn test_parse_error_context_marks_truncation() {
        let input = "a".repeat(150);
        let err = ParseError::with_context(ParseErrorKind::TrailingContent, "bad", &input, 0);
        assert_eq!(err.context, Some(format!("{}[...]", "a".repeat(100))));

        let err = ParseError::with_context(ParseErrorKind::Incomplete, "eof", "(1", 2);
        assert_eq!(err.context.as_deref(), Some("(1"));
        assert_eq!(err.found, None);
    }
}
