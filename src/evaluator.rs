//! The evaluator: expression evaluation and procedure application.
//!
//! [`eval`] is a loop over an `(expression, frame)` pair. Special forms and
//! procedure calls hand back the next expression to evaluate instead of
//! evaluating it themselves, so every tail position runs in constant native
//! stack. [`apply`] shares the same application step but evaluates the body of
//! a user procedure with a nested call to [`eval`].

use crate::Error;
use crate::ast::Value;
use crate::builtinops::get_builtin_ops;
use std::io::Write;
use tracing::trace;

mod environment;
mod procedure;
mod special_forms;

pub use environment::{Environment, OutputPort};
pub use procedure::{Arity, Formals, Lambda, Mu, Primitive, PrimitiveFn, Procedure};

use special_forms::{Tail, find_special_form};

/// Evaluate an expression in a frame
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    let mut expr = expr.clone();
    let mut env = env.clone();

    loop {
        let step = match &expr {
            Value::Unspecified => {
                return Err(Error::EvalError(
                    "Cannot evaluate an undefined expression".to_owned(),
                ));
            }
            Value::Symbol(name) => return env.lookup(name),
            Value::Pair(pair) => {
                if !expr.is_list() {
                    return Err(Error::EvalError(format!("malformed list: {expr}")));
                }
                // Keywords are recognised before any lookup
                let special_form = match &pair.car {
                    Value::Symbol(keyword) => find_special_form(keyword),
                    _ => None,
                };
                match special_form {
                    Some(form) => {
                        trace!(keyword = form.keyword, "special form");
                        form.apply(&pair.cdr, &env)?
                    }
                    None => {
                        let procedure = eval(&pair.car, &env)?;
                        let args = eval_operands(&pair.cdr, &env)?;
                        begin_application(&procedure, args, &env)?
                    }
                }
            }
            // Numbers, booleans, strings, the empty list and procedures
            _ => return Ok(expr.clone()),
        };

        match step {
            Tail::Value(value) => return Ok(value),
            Tail::Eval(next) => expr = next,
            Tail::EvalIn(next, frame) => {
                expr = next;
                env = frame;
            }
        }
    }
}

/// Evaluate operands left to right
fn eval_operands(operands: &Value, env: &Environment) -> Result<Vec<Value>, Error> {
    operands.iter().map(|operand| eval(operand, env)).collect()
}

/// Apply a procedure to already evaluated arguments.
///
/// The body of a lambda or mu procedure is evaluated to completion before
/// returning; results are the same as for a call evaluated by [`eval`].
pub fn apply(procedure: &Value, args: Vec<Value>, env: &Environment) -> Result<Value, Error> {
    match begin_application(procedure, args, env)? {
        Tail::Value(value) => Ok(value),
        Tail::Eval(body) => eval(&body, env),
        Tail::EvalIn(body, frame) => eval(&body, &frame),
    }
}

/// The application step shared by [`eval`] and [`apply`]: primitives run
/// immediately, user procedures produce their body and call frame.
fn begin_application(procedure: &Value, args: Vec<Value>, env: &Environment) -> Result<Tail, Error> {
    match procedure {
        Value::Procedure(Procedure::Primitive(primitive)) => {
            trace!(procedure = %primitive.name, args = args.len(), "apply primitive");
            primitive.call(&args, env).map(Tail::Value)
        }
        Value::Procedure(Procedure::Lambda(lambda)) => {
            trace!(formals = %lambda.formals, "apply lambda");
            let frame = lambda.env.extend(&lambda.formals, args)?;
            Ok(Tail::EvalIn(lambda.body.clone(), frame))
        }
        Value::Procedure(Procedure::Mu(mu)) => {
            trace!(formals = %mu.formals, "apply mu");
            let frame = env.extend(&mu.formals, args)?;
            Ok(Tail::EvalIn(mu.body.clone(), frame))
        }
        other => Err(Error::EvalError(format!("cannot call {other}"))),
    }
}

/// `(eval expr)` evaluates `expr` in the calling frame
fn builtin_eval(args: &[Value], env: &Environment) -> Result<Value, Error> {
    eval(&args[0], env)
}

/// `(apply proc args)` calls `proc` with the elements of the list `args`
fn builtin_apply(args: &[Value], env: &Environment) -> Result<Value, Error> {
    let arguments = args[1].to_vec().map_err(|_| {
        Error::TypeError(format!(
            "apply: argument 1 must be a list, got {}",
            args[1]
        ))
    })?;
    apply(&args[0], arguments, env)
}

fn install_globals(env: &Environment) {
    for op in get_builtin_ops() {
        env.register_primitive(op.scheme_id, op.arity, op.func);
    }
    env.register_primitive("eval", Arity::Exact(1), PrimitiveFn::WithEnv(builtin_eval));
    env.register_primitive("apply", Arity::Exact(2), PrimitiveFn::WithEnv(builtin_apply));
    env.register_primitive(
        "load",
        Arity::Exact(1),
        PrimitiveFn::WithEnv(crate::repl::builtin_load),
    );
}

/// Create a global environment with built-in procedures, printing to stdout
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    install_globals(&env);
    env
}

/// Create a global environment with built-in procedures, printing to `output`
pub fn create_global_env_with_output<W: Write + 'static>(output: W) -> Environment {
    let env = Environment::with_output(output);
    install_globals(&env);
    env
}
