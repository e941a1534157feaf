//! This module defines the core value type of the interpreter and the helpers used to
//! build and walk it. The main enum, [`Value`], covers atoms (numbers, booleans,
//! strings, symbols, the empty list), pairs chained into lists, and procedure values.
//! Lists are built from immutable [`Pair`] cells behind `Rc`, so sharing a tail is
//! cheap and cycles cannot be created. Ergonomic helper functions such as [`val`],
//! [`sym`] and [`nil`] are provided for convenient construction in code and tests,
//! and conversions from common Rust types make literals easy to write.

use crate::Error;
use crate::evaluator::Procedure;
use std::rc::Rc;

/// Type alias for number values in interpreter
pub(crate) type NumberType = i64;

/// Allowed non-alphanumeric characters in Scheme symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$%&:.~^";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, not a lone ".",
/// alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() || name == "." {
                return false;
            }

            if (first_char == '-' || first_char == '+')
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

/// A cons cell. Lists are chains of pairs ending in [`Value::Nil`].
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

impl Drop for Pair {
    // Unlink both car and cdr links through a worklist so dropping deeply
    // nested structure in either direction does not recurse
    fn drop(&mut self) {
        if !matches!(self.car, Value::Pair(_)) && !matches!(self.cdr, Value::Pair(_)) {
            return;
        }
        let mut pending = vec![
            std::mem::replace(&mut self.car, Value::Nil),
            std::mem::replace(&mut self.cdr, Value::Nil),
        ];
        while let Some(value) = pending.pop() {
            if let Value::Pair(rc) = value
                && let Ok(mut pair) = Rc::try_unwrap(rc)
            {
                pending.push(std::mem::replace(&mut pair.car, Value::Nil));
                pending.push(std::mem::replace(&mut pair.cdr, Value::Nil));
            }
        }
    }
}

/// Core value type in interpreter
///
/// Expressions and runtime values share this type: a parsed program is just a
/// `Value`, and `quote` hands that structure back unevaluated.
///
/// To build values, use the helper functions:
/// - `val(42)` for atoms, `sym("name")` for symbols, `nil()` for the empty list
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// Numbers (integers only)
    Number(NumberType),
    /// Boolean values
    Bool(bool),
    /// String literals
    String(String),
    /// Symbols (identifiers)
    Symbol(String),
    /// The empty list
    Nil,
    /// A cons cell; proper lists end in `Nil`
    Pair(Rc<Pair>),
    /// Primitive, lambda or mu procedures
    Procedure(Procedure),
    /// The "no value" result (e.g. `(if #f 1)`); the REPL never prints it.
    /// It never equals itself or any other value.
    Unspecified,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Nil => write!(f, "Nil"),
            Value::Pair(_) => write!(f, "List({self})"),
            Value::Procedure(p) => write!(f, "{p:?}"),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Procedure> for Value {
    fn from(p: Procedure) -> Self {
        Value::Procedure(p)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        v.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        arr.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        slice.iter().cloned().map(Into::into).collect()
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let items: Vec<Value> = iter.into_iter().collect();
        Value::improper_list(items, Value::Nil)
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating the empty list
pub fn nil() -> Value {
    Value::Nil
}

/// Iterator over the elements of a list, borrowing each `car`.
///
/// Iteration stops at the first non-pair tail, so an improper list yields
/// its leading elements only; use [`Value::is_list`] to reject those first.
pub struct ListIter<'a> {
    current: &'a Value,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current {
            Value::Pair(pair) => {
                self.current = &pair.cdr;
                Some(&pair.car)
            }
            _ => None,
        }
    }
}

impl std::iter::FusedIterator for ListIter<'_> {}

impl Value {
    /// Build a single cons cell
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Build a list from `items` whose final cdr is `tail`
    pub fn improper_list(items: Vec<Value>, tail: Value) -> Value {
        items
            .into_iter()
            .rev()
            .fold(tail, |rest, item| Value::cons(item, rest))
    }

    /// True for `()` and for pair chains that end in `()`
    pub fn is_list(&self) -> bool {
        let mut current = self;
        loop {
            match current {
                Value::Nil => return true,
                Value::Pair(pair) => current = &pair.cdr,
                _ => return false,
            }
        }
    }

    /// Check if a value represents nil (empty list)
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `#f` is false; everything else counts as true
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn car(&self) -> Option<&Value> {
        match self {
            Value::Pair(pair) => Some(&pair.car),
            _ => None,
        }
    }

    pub fn cdr(&self) -> Option<&Value> {
        match self {
            Value::Pair(pair) => Some(&pair.cdr),
            _ => None,
        }
    }

    pub fn iter(&self) -> ListIter<'_> {
        ListIter { current: self }
    }

    /// Number of elements of a proper list, or `None` for anything else
    pub fn list_len(&self) -> Option<usize> {
        self.is_list().then(|| self.iter().count())
    }

    /// Copy the elements of a proper list into a vector
    pub fn to_vec(&self) -> Result<Vec<Value>, Error> {
        if !self.is_list() {
            return Err(Error::EvalError(format!("malformed list: {self}")));
        }
        Ok(self.iter().cloned().collect())
    }

    /// Short type description used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Nil => "empty list",
            Value::Pair(_) => "pair",
            Value::Procedure(_) => "procedure",
            Value::Unspecified => "unspecified",
        }
    }

    /// Identity comparison used by `eq?`: atoms by value, pairs and
    /// procedures by reference
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Procedure(a), Value::Procedure(b)) => a.ptr_eq(b),
            (Value::Pair(_), _) | (_, Value::Pair(_)) => false,
            _ => self == other,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => {
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
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Nil => write!(f, "()"),
            Value::Pair(_) => {
                write!(f, "(")?;
                let mut current = self;
                let mut first = true;
                loop {
                    match current {
                        Value::Pair(pair) => {
                            if !first {
                                write!(f, " ")?;
                            }
                            write!(f, "{}", pair.car)?;
                            first = false;
                            current = &pair.cdr;
                        }
                        Value::Nil => break,
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Procedure(p) => write!(f, "{p}"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Pair(_), Value::Pair(_)) => {
                // Walk the spine iteratively; only the cars recurse
                let (mut a, mut b) = (self, other);
                loop {
                    match (a, b) {
                        (Value::Pair(pa), Value::Pair(pb)) => {
                            if Rc::ptr_eq(pa, pb) {
                                return true;
                            }
                            if pa.car != pb.car {
                                return false;
                            }
                            a = &pa.cdr;
                            b = &pb.cdr;
                        }
                        _ => return a == b,
                    }
                }
            }
            (Value::Procedure(a), Value::Procedure(b)) => a.ptr_eq(b),
            (Value::Unspecified, _) | (_, Value::Unspecified) => false, // Unspecified never equals anything
            _ => false, // Different variants are never equal
        }
    }
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        // (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Value::Number(42)),
            (val(-17), Value::Number(-17)),
            (val(4294967295u32), Value::Number(4294967295)),
            (val(-128i8), Value::Number(-128)),
            (val(NumberType::MAX), Value::Number(NumberType::MAX)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (sym("foo-bar?"), Value::Symbol("foo-bar?".to_owned())),
            (sym(String::from("test")), Value::Symbol("test".to_owned())),
            (nil(), Value::Nil),
            (
                val([1, 2]),
                Value::cons(Value::Number(1), Value::cons(Value::Number(2), Value::Nil)),
            ),
            (
                val(vec![sym("operation"), val(42), val("result")]),
                Value::cons(
                    sym("operation"),
                    Value::cons(val(42), Value::cons(val("result"), Value::Nil)),
                ),
            ),
            (val(Vec::<Value>::new()), Value::Nil),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert!(
                actual == expected,
                "Test case {} failed:\n  Expected: {:?}\n  Got: {:?}",
                i + 1,
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_display_forms() {
        let cases = vec![
            (val(42), "42"),
            (val(-7), "-7"),
            (val(true), "#t"),
            (val(false), "#f"),
            (val("a\"b\n"), "\"a\\\"b\\n\""),
            (sym("x"), "x"),
            (nil(), "()"),
            (val([1, 2, 3]), "(1 2 3)"),
            (val(vec![val([1]), val([2, 3])]), "((1) (2 3))"),
            (Value::cons(val(1), val(2)), "(1 . 2)"),
            (
                Value::improper_list(vec![val(1), val(2)], sym("rest")),
                "(1 2 . rest)",
            ),
            (val(vec![sym("quote"), sym("x")]), "(quote x)"),
        ];
        for (value, expected) in cases {
            assert_eq!(format!("{value}"), expected);
        }
    }

    #[test]
    fn test_list_helpers() {
        let list = val([1, 2, 3]);
        assert!(list.is_list());
        assert_eq!(list.list_len(), Some(3));
        assert_eq!(list.car(), Some(&val(1)));
        assert_eq!(list.cdr(), Some(&val([2, 3])));
        assert_eq!(list.to_vec(), Ok(vec![val(1), val(2), val(3)]));

        let dotted = Value::cons(val(1), val(2));
        assert!(!dotted.is_list());
        assert_eq!(dotted.list_len(), None);
        assert_eq!(dotted.iter().count(), 1);
        assert!(dotted.to_vec().is_err());

        assert!(nil().is_list());
        assert_eq!(nil().list_len(), Some(0));
        assert!(!val(5).is_list());
    }

    #[test]
    fn test_truthiness() {
        assert!(!val(false).is_true());
        for v in [val(true), val(0), val(""), nil(), sym("x"), val([1])] {
            assert!(v.is_true(), "{v:?} should be true");
        }
    }

    #[test]
    fn test_identity_vs_structural_equality() {
        let a = val([1, 2]);
        let b = val([1, 2]);
        assert_eq!(a, b);
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));
        assert!(sym("x").is_same(&sym("x")));
        assert!(val(3).is_same(&val(3)));
        assert!(nil().is_same(&nil()));
    }

    #[test]
    fn test_unspecified_values() {
        let unspec = Value::Unspecified;
        assert_ne!(unspec, unspec);
        assert_ne!(unspec, Value::Unspecified);
        assert_ne!(unspec, val(42));
    }

    #[test]
    fn test_long_list_drops_without_recursion() {
        let long: Value = (0..200_000).map(Value::Number).collect();
        assert_eq!(long.list_len(), Some(200_000));
        drop(long);
    }

    #[test]
    fn test_car_nested_structure_drops_without_recursion() {
        let mut nested = nil();
        for _ in 0..1_000_000 {
            nested = Value::cons(nested, nil());
        }
        // Mixed nesting through both links
        let mut mixed = nil();
        for i in 0..500_000 {
            mixed = if i % 2 == 0 {
                Value::cons(mixed, val(i))
            } else {
                Value::cons(val(i), mixed)
            };
        }
        drop(nested);
        drop(mixed);
    }

    #[test]
    fn test_symbol_validation() {
        for ok in ["foo", "+", "-", "...", "a.b", "set-car!", "x->y"] {
            assert!(is_valid_symbol(ok), "{ok} should be a valid symbol");
        }
        for bad in ["", ".", "-1a", "+2", "1+", "9lives", "a b", "a@b"] {
            assert!(!is_valid_symbol(bad), "{bad} should be rejected");
        }
    }
}
