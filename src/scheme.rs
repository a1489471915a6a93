//! S-expression reader.
//!
//! Reads program text into a [`Datum`] tree; [`parse_program`] additionally
//! performs the boundary conversion into [`Expr`]. The core pipeline never
//! depends on this module.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1, not_line_ending},
    combinator::{cut, opt, recognize, value},
    error::ErrorKind,
    multi::{many0, many0_count},
    sequence::{delimited, pair, preceded, terminated},
};

use crate::ast::{Datum, Expr, NumberType, SYMBOL_SPECIAL_CHARS, is_valid_symbol};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParseConfig {
    /// Treat `;` to end of line as a comment
    pub handle_comments: bool,
}

fn reject<T>(input: &str, code: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, code)))
}

fn fail<T>(input: &str, code: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, code)))
}

/// Convert nom parsing errors to structured parse errors
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                _ if e.input.trim().is_empty() => (
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input".to_owned(),
                ),
                ErrorKind::Char => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Expected character at position {position}"),
                ),
                _ => {
                    let remaining_chars: String = e.input.chars().take(10).collect();
                    (
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{remaining_chars}'"),
                    )
                }
            };
            ParseError::with_context(kind, message, input, position)
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Whitespace and, if enabled, line comments
fn skip_whitespace(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        let comment = recognize(pair(char(';'), not_line_ending));
        value((), many0_count(alt((multispace1, comment)))).parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

/// Atoms must be followed by whitespace, a bracket, a quote or end of input
fn delimiter(input: &str) -> IResult<&str, ()> {
    match input.chars().next() {
        None => Ok((input, ())),
        Some(c) if c.is_whitespace() || matches!(c, '(' | ')' | '\'' | ';') => Ok((input, ())),
        Some(_) => reject(input, ErrorKind::Verify),
    }
}

/// Parse a number (integer only, supports decimal and hexadecimal)
fn parse_number(input: &str) -> IResult<&str, Datum> {
    alt((parse_hexadecimal, parse_decimal)).parse(input)
}

fn parse_decimal(input: &str) -> IResult<&str, Datum> {
    let (rest, number_str) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((rest, Datum::Number(n))),
        // Out of range; symbol parsing rejects a leading digit anyway
        Err(_) => reject(input, ErrorKind::Digit),
    }
}

/// Parse a hexadecimal number (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> IResult<&str, Datum> {
    let (rest, _) = char('#').parse(input)?;
    let (rest, _) = alt((char('x'), char('X'))).parse(rest)?;
    let (rest, hex_digits) = take_while1(|c: char| c.is_ascii_hexdigit()).parse(rest)?;

    match NumberType::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((rest, Datum::Number(n))),
        Err(_) => reject(input, ErrorKind::HexDigit),
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Datum> {
    alt((
        value(Datum::Bool(true), tag("#t")),
        value(Datum::Bool(false), tag("#f")),
    ))
    .parse(input)
}

fn parse_symbol(input: &str) -> IResult<&str, Datum> {
    let (rest, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
            .parse(input)?;

    if is_valid_symbol(candidate) {
        Ok((rest, Datum::Symbol(candidate.to_owned())))
    } else {
        reject(input, ErrorKind::Alpha)
    }
}

/// Parse a string literal; once the opening quote is seen, errors are final
fn parse_string(input: &str) -> IResult<&str, Datum> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), Datum::String(text))),
            Some('\\') => {
                match chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    // Unknown or incomplete escape sequence
                    Some(_) | None => return fail(remaining, ErrorKind::Char),
                }
                remaining = chars.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = chars.as_str();
            }
            None => return fail(remaining, ErrorKind::Char),
        }
    }
}

fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Datum> {
    delimited(
        char('('),
        many0(|i| parse_sexpr(i, config, depth + 1)),
        // Past the opening bracket nothing else can match, so report the
        // missing `)` where the input actually stopped
        cut(preceded(|i| skip_whitespace(i, config), char(')'))),
    )
    .map(Datum::List)
    .parse(input)
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Datum> {
    let (input, _) = char('\'').parse(input)?;
    let (input, datum) = cut(|i| parse_sexpr(i, config, depth + 1)).parse(input)?;
    Ok((
        input,
        Datum::List(vec![Datum::Symbol("quote".to_owned()), datum]),
    ))
}

fn parse_sexpr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Datum> {
    if depth >= MAX_PARSE_DEPTH {
        return fail(input, ErrorKind::TooLarge);
    }
    let (input, ()) = skip_whitespace(input, config)?;
    alt((
        |i| parse_quote(i, config, depth),
        |i| parse_list(i, config, depth),
        terminated(parse_number, delimiter),
        terminated(parse_bool, delimiter),
        terminated(parse_string, delimiter),
        terminated(parse_symbol, delimiter),
    ))
    .parse(input)
}

/// Parse a complete S-expression from input.
pub fn parse_datum(input: &str) -> Result<Datum, Error> {
    parse_datum_with_config(input, ParseConfig::default())
}

pub fn parse_datum_with_config(input: &str, config: ParseConfig) -> Result<Datum, Error> {
    let parsed = parse_sexpr(input, config, 0).and_then(|(rest, datum)| {
        let (rest, ()) = skip_whitespace(rest, config)?;
        Ok((rest, datum))
    });

    match parsed {
        Ok(("", datum)) => Ok(datum),
        Ok((remaining, _)) => Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{remaining}'"),
            input,
            input.len() - remaining.len(),
        )
        .into()),
        Err(e) => Err(to_parse_error(input, e).into()),
    }
}

/// Read a program and convert it into an expression
pub fn parse_program(input: &str) -> Result<Expr, Error> {
    parse_program_with_config(input, ParseConfig::default())
}

pub fn parse_program_with_config(input: &str, config: ParseConfig) -> Result<Expr, Error> {
    let datum = parse_datum_with_config(input, config)?;
    Expr::try_from(&datum)
}
