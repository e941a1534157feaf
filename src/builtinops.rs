//! Built-in procedure registry.
//!
//! Every entry is a [`BuiltinOp`]: the identifier it is bound to in a fresh
//! global environment, the number of arguments it accepts, and its native
//! implementation. Arity is checked by the evaluator before the implementation
//! runs, so implementations may index their fixed arguments directly.
//!
//! ```scheme
//! (+ 1 2 3)              ; arithmetic on 64-bit integers, overflow is an error
//! (< 1 2 3)              ; comparisons chain over adjacent pairs
//! (append '(1) '(2 3))   ; list construction
//! (display "hi")         ; output goes to the session's output port
//! ```
//!
//! Special forms (`if`, `define`, ...) are syntax and live in the evaluator.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** as `fn(&[Value]) -> Result<Value, Error>`, or
//!    `fn(&[Value], &Environment) -> Result<Value, Error>` if it needs the
//!    calling frame
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::{Arity, Environment, PrimitiveFn};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Definition of a built-in procedure
#[derive(Clone, Copy)]
pub struct BuiltinOp {
    /// The identifier this procedure is bound to
    pub scheme_id: &'static str,
    /// Expected number of arguments
    pub arity: Arity,
    /// The implementation
    pub func: PrimitiveFn,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinOp({}, {:?})", self.scheme_id, self.arity)
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id
    }
}

//
// Argument helpers
//

fn expect_number(name: &str, value: &Value) -> Result<NumberType, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(Error::TypeError(format!(
            "{name}: expected number, got {} {other}",
            other.type_name()
        ))),
    }
}

fn numbers(name: &str, args: &[Value]) -> Result<Vec<NumberType>, Error> {
    args.iter().map(|arg| expect_number(name, arg)).collect()
}

fn overflow(operation: &str) -> Error {
    Error::EvalError(format!("Integer overflow in {operation}"))
}

fn division_by_zero(name: &str) -> Error {
    Error::EvalError(format!("{name}: division by zero"))
}

//
// Builtin Function Implementations
//

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let nums = numbers($op_str, args)?;
            Ok(Value::Bool(nums.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

numeric_comparison!(builtin_num_eq, ==, "=");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum: NumberType = 0;
    for n in numbers("+", args)? {
        sum = sum.checked_add(n).ok_or_else(|| overflow("addition"))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let nums = numbers("-", args)?;
    let (first, rest) = nums
        .split_first()
        .ok_or_else(|| Error::arity_error_in(Arity::AtLeast(1), 0, "-"))?;
    if rest.is_empty() {
        return first
            .checked_neg()
            .map(Value::Number)
            .ok_or_else(|| overflow("negation"));
    }
    let mut result = *first;
    for n in rest {
        result = result.checked_sub(*n).ok_or_else(|| overflow("subtraction"))?;
    }
    Ok(Value::Number(result))
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let mut product: NumberType = 1;
    for n in numbers("*", args)? {
        product = product
            .checked_mul(n)
            .ok_or_else(|| overflow("multiplication"))?;
    }
    Ok(Value::Number(product))
}

/// Integer division, truncating toward zero; `(/ n)` is `1 / n`
fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    let nums = numbers("/", args)?;
    let (first, rest) = match nums.as_slice() {
        [only] => (1, std::slice::from_ref(only)),
        [first, rest @ ..] => (*first, rest),
        [] => return Err(Error::arity_error_in(Arity::AtLeast(1), 0, "/")),
    };
    let mut result = first;
    for &divisor in rest {
        if divisor == 0 {
            return Err(division_by_zero("/"));
        }
        result = result
            .checked_div(divisor)
            .ok_or_else(|| overflow("division"))?;
    }
    Ok(Value::Number(result))
}

fn integer_division(
    name: &str,
    args: &[Value],
    op: fn(NumberType, NumberType) -> Option<NumberType>,
) -> Result<Value, Error> {
    let dividend = expect_number(name, &args[0])?;
    let divisor = expect_number(name, &args[1])?;
    if divisor == 0 {
        return Err(division_by_zero(name));
    }
    op(dividend, divisor)
        .map(Value::Number)
        .ok_or_else(|| overflow(name))
}

fn builtin_quotient(args: &[Value]) -> Result<Value, Error> {
    integer_division("quotient", args, NumberType::checked_div)
}

fn builtin_remainder(args: &[Value]) -> Result<Value, Error> {
    integer_division("remainder", args, NumberType::checked_rem)
}

/// Like `remainder`, but the result takes the sign of the divisor
fn builtin_modulo(args: &[Value]) -> Result<Value, Error> {
    integer_division("modulo", args, |a, b| {
        let r = a.checked_rem(b)?;
        if r != 0 && (r < 0) != (b < 0) {
            r.checked_add(b)
        } else {
            Some(r)
        }
    })
}

fn builtin_abs(args: &[Value]) -> Result<Value, Error> {
    expect_number("abs", &args[0])?
        .checked_abs()
        .map(Value::Number)
        .ok_or_else(|| overflow("abs"))
}

fn builtin_max(args: &[Value]) -> Result<Value, Error> {
    numbers("max", args)?
        .into_iter()
        .max()
        .map(Value::Number)
        .ok_or_else(|| Error::arity_error_in(Arity::AtLeast(1), 0, "max"))
}

fn builtin_min(args: &[Value]) -> Result<Value, Error> {
    numbers("min", args)?
        .into_iter()
        .min()
        .map(Value::Number)
        .ok_or_else(|| Error::arity_error_in(Arity::AtLeast(1), 0, "min"))
}

fn builtin_even(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(expect_number("even?", &args[0])? % 2 == 0))
}

fn builtin_odd(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(expect_number("odd?", &args[0])? % 2 != 0))
}

fn builtin_zero(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(expect_number("zero?", &args[0])? == 0))
}

// Macro to generate single-argument type predicates
macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            Ok(Value::Bool(matches!(&args[0], $pattern)))
        }
    };
}

type_predicate!(builtin_number, Value::Number(_));
type_predicate!(builtin_boolean, Value::Bool(_));
type_predicate!(builtin_symbol, Value::Symbol(_));
type_predicate!(builtin_string, Value::String(_));
type_predicate!(builtin_null, Value::Nil);
type_predicate!(builtin_pair, Value::Pair(_));
type_predicate!(builtin_procedure, Value::Procedure(_));

fn builtin_list_p(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0].is_list()))
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(!args[0].is_true()))
}

fn builtin_eq(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0].is_same(&args[1])))
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0] == args[1]))
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn pair_part<'a>(
    name: &str,
    value: &'a Value,
    part: fn(&Value) -> Option<&Value>,
) -> Result<&'a Value, Error> {
    part(value).ok_or_else(|| {
        Error::TypeError(format!(
            "{name}: expected pair, got {} {value}",
            value.type_name()
        ))
    })
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    pair_part("car", &args[0], Value::car).cloned()
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    pair_part("cdr", &args[0], Value::cdr).cloned()
}

fn builtin_cadr(args: &[Value]) -> Result<Value, Error> {
    let rest = pair_part("cadr", &args[0], Value::cdr)?;
    pair_part("cadr", rest, Value::car).cloned()
}

fn builtin_cddr(args: &[Value]) -> Result<Value, Error> {
    let rest = pair_part("cddr", &args[0], Value::cdr)?;
    pair_part("cddr", rest, Value::cdr).cloned()
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(args.iter().cloned().collect())
}

fn builtin_length(args: &[Value]) -> Result<Value, Error> {
    let len = args[0].list_len().ok_or_else(|| {
        Error::TypeError(format!("length: expected list, got {}", args[0]))
    })?;
    NumberType::try_from(len)
        .map(Value::Number)
        .map_err(|_| overflow("length"))
}

/// All arguments but the last must be lists; the last becomes the final tail
fn builtin_append(args: &[Value]) -> Result<Value, Error> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Value::Nil);
    };
    let mut items = Vec::new();
    for list in init {
        if !list.is_list() {
            return Err(Error::TypeError(format!(
                "append: expected list, got {list}"
            )));
        }
        items.extend(list.iter().cloned());
    }
    Ok(Value::improper_list(items, last.clone()))
}

fn builtin_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::String(s) => result.push_str(s),
            other => {
                return Err(Error::TypeError(format!(
                    "string-append: expected string, got {} {other}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::String(result))
}

/// Strings print without quotes; everything else as it reads back
fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("{other}"),
    }
}

fn builtin_display(args: &[Value], env: &Environment) -> Result<Value, Error> {
    env.write_output(&display_text(&args[0]))?;
    Ok(Value::Unspecified)
}

fn builtin_newline(_args: &[Value], env: &Environment) -> Result<Value, Error> {
    env.write_output("\n")?;
    Ok(Value::Unspecified)
}

fn builtin_print(args: &[Value], env: &Environment) -> Result<Value, Error> {
    env.write_output(&format!("{}\n", args[0]))?;
    Ok(Value::Unspecified)
}

fn builtin_error(args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args.iter().map(display_text).collect();

    let message = if parts.is_empty() {
        "Error".to_owned()
    } else {
        parts.join(" ")
    };

    Err(Error::EvalError(message))
}

/// Global registry of all built-in procedures.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    use PrimitiveFn::{Plain, WithEnv};

    let op = |scheme_id: &'static str, arity: Arity, func: PrimitiveFn| BuiltinOp {
        scheme_id,
        arity,
        func,
    };

    vec![
        // Arithmetic
        op("+", Arity::Any, Plain(builtin_add)),
        op("-", Arity::AtLeast(1), Plain(builtin_sub)),
        op("*", Arity::Any, Plain(builtin_mul)),
        op("/", Arity::AtLeast(1), Plain(builtin_div)),
        op("quotient", Arity::Exact(2), Plain(builtin_quotient)),
        op("remainder", Arity::Exact(2), Plain(builtin_remainder)),
        op("modulo", Arity::Exact(2), Plain(builtin_modulo)),
        op("abs", Arity::Exact(1), Plain(builtin_abs)),
        op("max", Arity::AtLeast(1), Plain(builtin_max)),
        op("min", Arity::AtLeast(1), Plain(builtin_min)),
        // Comparison
        op("=", Arity::AtLeast(1), Plain(builtin_num_eq)),
        op("<", Arity::AtLeast(1), Plain(builtin_lt)),
        op(">", Arity::AtLeast(1), Plain(builtin_gt)),
        op("<=", Arity::AtLeast(1), Plain(builtin_le)),
        op(">=", Arity::AtLeast(1), Plain(builtin_ge)),
        // Predicates
        op("even?", Arity::Exact(1), Plain(builtin_even)),
        op("odd?", Arity::Exact(1), Plain(builtin_odd)),
        op("zero?", Arity::Exact(1), Plain(builtin_zero)),
        op("number?", Arity::Exact(1), Plain(builtin_number)),
        op("integer?", Arity::Exact(1), Plain(builtin_number)),
        op("boolean?", Arity::Exact(1), Plain(builtin_boolean)),
        op("symbol?", Arity::Exact(1), Plain(builtin_symbol)),
        op("string?", Arity::Exact(1), Plain(builtin_string)),
        op("null?", Arity::Exact(1), Plain(builtin_null)),
        op("pair?", Arity::Exact(1), Plain(builtin_pair)),
        op("list?", Arity::Exact(1), Plain(builtin_list_p)),
        op("procedure?", Arity::Exact(1), Plain(builtin_procedure)),
        // Equivalence
        op("not", Arity::Exact(1), Plain(builtin_not)),
        op("eq?", Arity::Exact(2), Plain(builtin_eq)),
        op("eqv?", Arity::Exact(2), Plain(builtin_eq)),
        op("equal?", Arity::Exact(2), Plain(builtin_equal)),
        // Lists
        op("cons", Arity::Exact(2), Plain(builtin_cons)),
        op("car", Arity::Exact(1), Plain(builtin_car)),
        op("cdr", Arity::Exact(1), Plain(builtin_cdr)),
        op("cadr", Arity::Exact(1), Plain(builtin_cadr)),
        op("cddr", Arity::Exact(1), Plain(builtin_cddr)),
        op("list", Arity::Any, Plain(builtin_list)),
        op("length", Arity::Exact(1), Plain(builtin_length)),
        op("append", Arity::Any, Plain(builtin_append)),
        // Strings
        op("string-append", Arity::Any, Plain(builtin_string_append)),
        // Output
        op("display", Arity::Exact(1), WithEnv(builtin_display)),
        op("newline", Arity::Exact(0), WithEnv(builtin_newline)),
        op("print", Arity::Exact(1), WithEnv(builtin_print)),
        // Error handling
        op("error", Arity::Any, Plain(builtin_error)),
    ]
});

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}
