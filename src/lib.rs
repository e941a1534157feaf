//! muscheme - a tree-walking Scheme evaluator with proper tail calls
//!
//! This crate implements the eval/apply core of a small Lisp-family language:
//! an environment model built from chained frames, a fixed set of special forms,
//! and an evaluator that runs every tail position in a loop instead of recursing.
//!
//! ```scheme
//! (define (count-down n)
//!   (if (= n 0) 'done (count-down (- n 1))))
//! (count-down 1000000)   ; runs in constant native stack
//! ```
//!
//! ## Scoping
//!
//! Two kinds of user procedures are supported:
//! - `lambda` procedures capture the frame they are created in (lexical scope)
//! - `mu` procedures capture nothing; their free identifiers are looked up in
//!   the frame of whoever calls them (dynamic scope)
//!
//! ```scheme
//! (define y 1)
//! (define f (lambda () y))
//! (define g (mu () y))
//! (define (h y) (list (f) (g)))
//! (h 2)                  ; => (1 2)
//! ```
//!
//! ## Modules
//!
//! - `ast`: values and pair-based list structure
//! - `scheme`: S-expression reader
//! - `evaluator`: frames, procedures, special forms and the evaluation loop
//! - `builtinops`: the primitive procedure library
//! - `repl`: read-eval-print driver and file loader

use std::fmt;

pub use evaluator::Arity;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested structures read by the S-expression parser
pub const MAX_PARSE_DEPTH: usize = 128;

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
    /// Create a ParseError with all fields
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

    /// Create a ParseError with context and found token
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // Show some of the input before the error position
        let context_start = input[..error_offset.min(input.len())]
            .chars()
            .count()
            .saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }

    /// True when more input could complete the datum
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
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

/// Error type for the interpreter.
///
/// Every failure aborts the evaluation of the current top-level form only;
/// the driver reports it as `Error: <message>` and moves on.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    EvalError(String),
    TypeError(String),
    UnboundVariable(String),
    ArityError {
        expected: Arity,
        got: usize,
        /// Name of the procedure or form being applied, when known
        context: Option<String>,
    },
}

impl Error {
    /// Create an ArityError without context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            context: None,
        }
    }

    /// Create an ArityError naming the procedure that was applied
    pub fn arity_error_in(expected: Arity, got: usize, context: impl Into<String>) -> Self {
        Error::ArityError {
            expected,
            got,
            context: Some(context.into()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => write!(f, "ParseError: {e}"),
            Error::EvalError(msg) => write!(f, "{msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::UnboundVariable(var) => write!(f, "unknown identifier: {var}"),
            Error::ArityError {
                expected,
                got,
                context,
            } => match context {
                Some(name) => write!(
                    f,
                    "ArityError: {name}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: wrong number of arguments: expected {expected}, got {got}"
                ),
            },
        }
    }
}

impl std::error::Error for ParseError {}
impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::ParseError(e)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod repl;
pub mod scheme;
