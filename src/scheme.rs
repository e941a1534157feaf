use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1, not_line_ending, one_of},
    combinator::{opt, recognize, value},
    error::ErrorKind,
    multi::many0_count,
    sequence::{pair, preceded, terminated},
};

use crate::ast::{NumberType, SYMBOL_SPECIAL_CHARS, Value, is_valid_symbol, sym};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

type ParseResult<'a, T> = IResult<&'a str, T>;

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Treat `;` to end of line as whitespace
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

fn nom_error<T>(input: &str, code: ErrorKind) -> ParseResult<'_, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, code)))
}

/// Convert a nom error into a [`ParseError`], returning the byte offset in
/// `source` where it was detected
fn convert_error(source: &str, error: nom::Err<nom::error::Error<&str>>) -> (ParseError, usize) {
    let e = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => {
            return (
                ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input"),
                source.len(),
            );
        }
    };

    let offset = source.len().saturating_sub(e.input.len());
    let found = e.input.chars().next().map(|c| c.to_string());
    let (kind, message) = match e.code {
        ErrorKind::TooLarge => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        _ if e.input.is_empty() => (
            ParseErrorKind::Incomplete,
            "Unexpected end of input".to_owned(),
        ),
        _ if e.input.starts_with(')') => (
            ParseErrorKind::InvalidSyntax,
            "Unexpected ')'".to_owned(),
        ),
        _ => {
            let near: String = e.input.chars().take(10).collect();
            (
                ParseErrorKind::InvalidSyntax,
                format!("Invalid syntax near '{near}'"),
            )
        }
    };

    (
        ParseError::with_context_and_found(kind, message, source, offset, found),
        offset,
    )
}

/// Parse a `;` comment up to (not including) the line ending
fn comment(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(char(';'), not_line_ending)).parse(input)
}

/// Skip whitespace and, when enabled, comments
fn atmosphere(input: &str, config: ParseConfig) -> ParseResult<'_, ()> {
    if config.handle_comments {
        value((), many0_count(alt((multispace1, comment)))).parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

/// True if an atom may end here
fn at_delimiter(input: &str) -> bool {
    match input.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || "()\"';".contains(c),
    }
}

/// Succeeds without consuming input if an atom may end here
fn delimiter(input: &str) -> ParseResult<'_, ()> {
    if at_delimiter(input) {
        Ok((input, ()))
    } else {
        nom_error(input, ErrorKind::Verify)
    }
}

/// Parse a number (integer only, supports decimal and hexadecimal)
fn parse_number(input: &str) -> ParseResult<'_, Value> {
    alt((parse_hexadecimal, parse_decimal)).parse(input)
}

/// Parse a decimal number with optional sign
fn parse_decimal(input: &str) -> ParseResult<'_, Value> {
    let (remaining, number_str) = recognize(pair(
        opt(one_of("+-")),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((remaining, Value::Number(n))),
        // Out of range for NumberType
        Err(_) => nom_error(input, ErrorKind::Digit),
    }
}

/// Parse a hexadecimal number (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> ParseResult<'_, Value> {
    let (remaining, hex_digits) = preceded(
        pair(char('#'), one_of("xX")),
        take_while1(|c: char| c.is_ascii_hexdigit()),
    )
    .parse(input)?;

    match NumberType::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((remaining, Value::Number(n))),
        Err(_) => nom_error(input, ErrorKind::HexDigit),
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> ParseResult<'_, Value> {
    alt((
        value(Value::Bool(true), tag("#t")),
        value(Value::Bool(false), tag("#f")),
    ))
    .parse(input)
}

/// Parse a symbol (identifier)
fn parse_symbol(input: &str) -> ParseResult<'_, Value> {
    let (remaining, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
            .parse(input)?;

    if is_valid_symbol(candidate) {
        Ok((remaining, Value::Symbol(candidate.to_owned())))
    } else {
        nom_error(input, ErrorKind::Alpha)
    }
}

/// Parse a string literal
fn parse_string(input: &str) -> ParseResult<'_, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return nom_error(remaining, ErrorKind::Escaped),
                    // Backslash at end of input
                    None => return nom_error(char_iter.as_str(), ErrorKind::Escaped),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            // Reached end of input without finding closing quote
            None => return nom_error(remaining, ErrorKind::Char),
        }
    }
}

/// Parse an atom: number, boolean or symbol, which must end at a delimiter
fn parse_atom(input: &str) -> ParseResult<'_, Value> {
    terminated(alt((parse_number, parse_bool, parse_symbol)), delimiter).parse(input)
}

/// Parse a proper or dotted list after its opening parenthesis
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, ()) = atmosphere(input, config)?;

        if let Some(after) = rest.strip_prefix(')') {
            return Ok((after, Value::improper_list(items, Value::Nil)));
        }

        // A lone `.` introduces the final cdr
        if let Some(after_dot) = rest.strip_prefix('.')
            && at_delimiter(after_dot)
        {
            if items.is_empty() {
                return nom_error(rest, ErrorKind::Char);
            }
            let (after_tail, tail) = parse_datum(after_dot, config, depth + 1)?;
            let (after_tail, ()) = atmosphere(after_tail, config)?;
            return match after_tail.strip_prefix(')') {
                Some(after) => Ok((after, Value::improper_list(items, tail))),
                None => nom_error(after_tail, ErrorKind::Char),
            };
        }

        let (rest, item) = parse_datum(rest, config, depth + 1)?;
        items.push(item);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_datum(input, config, depth + 1)?;
    Ok((input, Value::from(vec![sym("quote"), expr])))
}

/// Parse one datum, skipping any leading whitespace and comments
fn parse_datum(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    let (input, ()) = atmosphere(input, config)?;
    match input.chars().next() {
        Some('(') => parse_list(input, config, depth),
        Some('\'') => parse_quote(input, config, depth),
        Some('"') => parse_string(input),
        None => nom_error(input, ErrorKind::Eof),
        Some(_) => parse_atom(input),
    }
}

/// Parse a complete S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    parse_scheme_with_config(input, ParseConfig::default())
}

/// Parse exactly one S-expression, rejecting anything but whitespace (and
/// comments, if enabled) after it.
pub fn parse_scheme_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let parsed = parse_datum(input, config, 0).and_then(|(rest, datum)| {
        let (rest, ()) = atmosphere(rest, config)?;
        Ok((rest, datum))
    });

    match parsed {
        Ok(("", datum)) => Ok(datum),
        Ok((remaining, _)) => {
            let offset = input.len() - remaining.len();
            let found = remaining.chars().next().map(|c| c.to_string());
            Err(Error::ParseError(ParseError::with_context_and_found(
                ParseErrorKind::TrailingContent,
                "Unexpected remaining input after expression",
                input,
                offset,
                found,
            )))
        }
        Err(e) => Err(Error::ParseError(convert_error(input, e).0)),
    }
}

/// Iterator over the successive top-level datums of a source text.
///
/// A syntax error is yielded as an `Err` item; reading then resumes at the
/// start of the line after the one where the error was detected.
///
/// ```
/// use muscheme::scheme::SchemeReader;
///
/// let forms: Vec<_> = SchemeReader::new("(define x 1) ; one\nx").collect();
/// assert_eq!(forms.len(), 2);
/// assert!(forms.iter().all(Result::is_ok));
/// ```
pub struct SchemeReader<'a> {
    source: &'a str,
    position: usize,
    config: ParseConfig,
}

impl<'a> SchemeReader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_config(source, ParseConfig::default())
    }

    pub fn with_config(source: &'a str, config: ParseConfig) -> Self {
        SchemeReader {
            source,
            position: 0,
            config,
        }
    }

    /// The unread part of the source
    pub fn remaining(&self) -> &'a str {
        &self.source[self.position..]
    }
}

impl Iterator for SchemeReader<'_> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.remaining();
        let start = match atmosphere(remaining, self.config) {
            Ok((rest, ())) => rest,
            Err(_) => remaining,
        };
        if start.is_empty() {
            self.position = self.source.len();
            return None;
        }

        match parse_datum(start, self.config, 0) {
            Ok((rest, datum)) => {
                self.position = self.source.len() - rest.len();
                Some(Ok(datum))
            }
            Err(e) => {
                let (error, offset) = convert_error(self.source, e);
                self.position = match self.source[offset..].find('\n') {
                    Some(newline) => offset + newline + 1,
                    None => self.source.len(),
                };
                Some(Err(Error::ParseError(error)))
            }
        }
    }
}

impl std::iter::FusedIterator for SchemeReader<'_> {}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, val};

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),              // Parsing should succeed with this value
        SpecificError(&'static str), // Parsing should fail with error containing this string
        Error,                       // Parsing should fail (any error)
    }
    use ParseTestResult::*;

    /// Helper for successful parse test cases
    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    fn quoted(value: Value) -> Value {
        val(vec![sym("quote"), value])
    }

    /// Run parse tests with round-trip validation of every successful result
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ('{input}')", i + 1);
            let result = parse_scheme(input);

            match (result, expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");

                    // display -> parse -> display should be identical
                    let displayed = format!("{actual}");
                    let reparsed = parse_scheme(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(
                        displayed,
                        format!("{reparsed}"),
                        "{test_id}: round-trip display mismatch"
                    );
                }
                (Err(_), Error) => {}
                (Err(err), SpecificError(expected_text)) => {
                    let error_msg = format!("{err}");
                    assert!(
                        error_msg.contains(expected_text),
                        "{test_id}: error should contain '{expected_text}', got '{error_msg}'"
                    );
                }
                (Ok(actual), Error) => {
                    panic!("{test_id}: expected error, got {actual:?}");
                }
                (Ok(actual), SpecificError(expected_text)) => {
                    panic!(
                        "{test_id}: expected error containing '{expected_text}', got {actual:?}"
                    );
                }
                (Err(err), Success(_)) => {
                    panic!("{test_id}: expected success, got error {err:?}");
                }
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_parser_comprehensive() {
        let test_cases = vec![
            // ===== NUMBER PARSING =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("+5", success(5)),
            ("0", success(0)),
            ("-0", success(0)),
            ("#x1A", success(26)),
            ("#X1a", success(26)),
            ("#xff", success(255)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            ("3.14", Error),
            ("#xG", Error),
            ("#x", Error),
            ("123abc", Error),
            ("99999999999999999999", Error),
            // ===== SYMBOL PARSING =====
            ("foo", success(sym("foo"))),
            ("+", success(sym("+"))),
            ("-", success(sym("-"))),
            (">=", success(sym(">="))),
            ("set-car!", success(sym("set-car!"))),
            ("null?", success(sym("null?"))),
            ("a.b", success(sym("a.b"))),
            ("...", success(sym("..."))),
            ("-abc", success(sym("-abc"))),
            ("123var", Error),
            ("-42name", Error),
            ("test@home", Error),
            ("test#tag", Error),
            (".", Error),
            // ===== BOOLEAN PARSING =====
            ("#t", success(true)),
            ("#f", success(false)),
            ("#T", Error),
            ("#true", Error),
            // ===== STRING PARSING =====
            ("\"hello world\"", success("hello world")),
            (r#""hello\nworld""#, success("hello\nworld")),
            (r#""tab\there""#, success("tab\there")),
            (r#""quote\"test""#, success("quote\"test")),
            (r#""backslash\\test""#, success("backslash\\test")),
            ("\"\"", success("")),
            ("\"a;b\"", success("a;b")),
            (r#""other\xchar""#, SpecificError("Invalid syntax")),
            (r#""unterminated"#, SpecificError("Unexpected end of input")),
            // ===== LISTS =====
            ("()", success(nil())),
            ("(   )", success(nil())),
            ("(42)", success([42])),
            (
                "(1 hello \"world\" #t)",
                success([val(1), sym("hello"), val("world"), val(true)]),
            ),
            ("((1 2) (3 4))", success([[1, 2], [3, 4]])),
            ("(((1)))", success([val([val([val(1)])])])),
            ("( 1   2\t\n3 )", success([1, 2, 3])),
            ("(a\"s\")", success(vec![sym("a"), val("s")])),
            ("(a(b))", success(vec![sym("a"), val(vec![sym("b")])])),
            // Dotted pairs
            ("(1 . 2)", Success(Value::cons(val(1), val(2)))),
            (
                "(1 2 . rest)",
                Success(Value::improper_list(vec![val(1), val(2)], sym("rest"))),
            ),
            ("(1 . (2 3))", success([1, 2, 3])),
            ("(a .b)", success(vec![sym("a"), sym(".b")])),
            ("(. 1)", Error),
            ("(1 . 2 3)", Error),
            ("(1 .)", Error),
            // ===== QUOTE =====
            ("'foo", Success(quoted(sym("foo")))),
            ("'(1 2 3)", Success(quoted(val([1, 2, 3])))),
            ("'()", Success(quoted(nil()))),
            ("''a", Success(quoted(quoted(sym("a"))))),
            ("(quote foo)", Success(quoted(sym("foo")))),
            ("'", SpecificError("Unexpected end of input")),
            // ===== WHITESPACE AND COMMENTS =====
            ("  42  ", success(42)),
            ("\t#t\n", success(true)),
            ("; leading comment\n42", success(42)),
            ("42 ; trailing comment", success(42)),
            ("(1 ; inside\n 2)", success([1, 2])),
            // ===== GENERAL ERROR CASES =====
            ("(1 2 3", SpecificError("Unexpected end of input")),
            ("((1 2)", Error),
            ("1 2 3)", SpecificError("Unexpected remaining input")),
            ("(1 2))", SpecificError("Unexpected remaining input")),
            (")", SpecificError("Unexpected ')'")),
            ("", Error),
            ("   ", Error),
            ("@invalid", SpecificError("Invalid syntax")),
            ("1 2", SpecificError("Unexpected remaining input")),
            ("(+ 1 2) (+ 3 4)", Error),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_error_kinds() {
        let kind_of = |input: &str| match parse_scheme(input) {
            Err(crate::Error::ParseError(e)) => e.kind,
            other => panic!("expected a parse error for '{input}', got {other:?}"),
        };

        assert_eq!(kind_of("(1 2"), ParseErrorKind::Incomplete);
        assert_eq!(kind_of("(define (f x)\n  (+ x"), ParseErrorKind::Incomplete);
        assert_eq!(kind_of("\"open"), ParseErrorKind::Incomplete);
        assert_eq!(kind_of("(1 ; comment"), ParseErrorKind::Incomplete);
        assert_eq!(kind_of("'"), ParseErrorKind::Incomplete);
        assert_eq!(kind_of(")"), ParseErrorKind::InvalidSyntax);
        assert_eq!(kind_of("(1 #q)"), ParseErrorKind::InvalidSyntax);
        assert_eq!(kind_of("1 2"), ParseErrorKind::TrailingContent);

        let Err(crate::Error::ParseError(e)) = parse_scheme("(a b @c)") else {
            panic!("expected a parse error");
        };
        assert_eq!(e.found.as_deref(), Some("@"));
        assert!(e.context.as_ref().unwrap().contains("(a b @c)"));
        assert!(!e.is_incomplete());
    }

    #[test]
    fn test_comment_configuration() {
        let no_comments = ParseConfig {
            handle_comments: false,
        };
        assert!(ParseConfig::default().handle_comments);
        assert_eq!(
            parse_scheme_with_config("(1 2) ; note", ParseConfig::default()).unwrap(),
            val([1, 2])
        );
        assert!(parse_scheme_with_config("(1 2) ; note", no_comments).is_err());
        assert!(parse_scheme_with_config("; note\n1", no_comments).is_err());
        assert_eq!(
            parse_scheme_with_config(" (1 2)\n", no_comments).unwrap(),
            val([1, 2])
        );
    }

    #[test]
    fn test_parser_depth_limits() {
        let parens_under_limit = format!(
            "{}unbound{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        let quotes_under_limit = format!("{}unbound", "'".repeat(MAX_PARSE_DEPTH - 1));
        let deep_parens_at_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH),
            ")".repeat(MAX_PARSE_DEPTH)
        );
        let deep_quotes_at_limit = format!("{}a", "'".repeat(MAX_PARSE_DEPTH));

        run_parse_tests(vec![
            (deep_parens_at_limit.as_str(), SpecificError("too deeply nested")),
            (deep_quotes_at_limit.as_str(), SpecificError("too deeply nested")),
        ]);

        assert!(
            parse_scheme(&parens_under_limit).is_ok(),
            "Parens just under depth limit should parse successfully"
        );
        assert!(
            parse_scheme(&quotes_under_limit).is_ok(),
            "Quotes just under depth limit should parse successfully"
        );

        // Long flat lists are not limited
        let long_list = format!("({})", "1 ".repeat(10_000));
        assert_eq!(parse_scheme(&long_list).unwrap().list_len(), Some(10_000));
    }

    #[test]
    fn test_reader_yields_successive_forms() {
        let source = "(define x 1)\n; comment line\n'sym \"str\" (a . b)\n";
        let forms: Vec<Value> = SchemeReader::new(source).map(Result::unwrap).collect();
        assert_eq!(
            forms,
            vec![
                val(vec![sym("define"), sym("x"), val(1)]),
                quoted(sym("sym")),
                val("str"),
                Value::cons(sym("a"), sym("b")),
            ]
        );
        assert_eq!(SchemeReader::new("  ; nothing\n").count(), 0);
    }

    #[test]
    fn test_reader_recovers_at_next_line() {
        let source = "1 )\n2 @bad 3\n(4\n5)";
        let items: Vec<Result<Value, crate::Error>> = SchemeReader::new(source).collect();

        // 1, error at ')', 2, error at '@' (rest of line skipped), (4 5)
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].as_ref().unwrap(), &val(1));
        assert!(items[1].is_err());
        assert_eq!(items[2].as_ref().unwrap(), &val(2));
        assert!(items[3].is_err());
        assert_eq!(items[4].as_ref().unwrap(), &val([4, 5]));

        let mut reader = SchemeReader::new("(unclosed");
        let err = reader.next().unwrap().unwrap_err();
        match err {
            crate::Error::ParseError(e) => assert!(e.is_incomplete()),
            other => panic!("expected a parse error, got {other:?}"),
        }
        assert!(reader.next().is_none());
        assert_eq!(reader.remaining(), "");
    }
}
