//! Special forms: syntax that controls the evaluation of its own operands.
//!
//! Each handler receives its unevaluated operands and the current frame and
//! returns a [`Tail`]: either a finished value or the expression the evaluation
//! loop should continue with. Only sub-evaluations that are *not* in tail
//! position (tests, non-final operands, `let` binding expressions) recurse into
//! [`eval`].

use crate::Error;
use crate::ast::{Value, sym};
use crate::evaluator::environment::Environment;
use crate::evaluator::eval;
use crate::evaluator::procedure::{Arity, Formals, Lambda, Mu, Procedure};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;
use tracing::debug;

/// Outcome of one evaluation step
pub(crate) enum Tail {
    /// Evaluation is complete
    Value(Value),
    /// Continue with this expression in the same frame
    Eval(Value),
    /// Continue with this expression in another frame
    EvalIn(Value, Environment),
}

type Handler = fn(&[&Value], &Environment) -> Result<Tail, Error>;

/// A keyword together with the shape of its operand list
pub(crate) struct SpecialForm {
    pub keyword: &'static str,
    pub arity: Arity,
    handler: Handler,
}

impl SpecialForm {
    /// Validate the operand list, then run the handler
    pub(crate) fn apply(&self, operands: &Value, env: &Environment) -> Result<Tail, Error> {
        let operands = check_form(self.keyword, operands, self.arity)?;
        (self.handler)(&operands, env)
    }
}

static SPECIAL_FORMS: LazyLock<HashMap<&'static str, SpecialForm>> = LazyLock::new(|| {
    [
        SpecialForm {
            keyword: "if",
            arity: Arity::Range(2, 3),
            handler: do_if,
        },
        SpecialForm {
            keyword: "and",
            arity: Arity::Any,
            handler: do_and,
        },
        SpecialForm {
            keyword: "or",
            arity: Arity::Any,
            handler: do_or,
        },
        SpecialForm {
            keyword: "cond",
            arity: Arity::Any,
            handler: do_cond,
        },
        SpecialForm {
            keyword: "begin",
            arity: Arity::AtLeast(1),
            handler: do_begin,
        },
        SpecialForm {
            keyword: "let",
            arity: Arity::AtLeast(2),
            handler: do_let,
        },
        SpecialForm {
            keyword: "lambda",
            arity: Arity::AtLeast(2),
            handler: do_lambda,
        },
        SpecialForm {
            keyword: "mu",
            arity: Arity::AtLeast(2),
            handler: do_mu,
        },
        SpecialForm {
            keyword: "define",
            arity: Arity::AtLeast(2),
            handler: do_define,
        },
        SpecialForm {
            keyword: "quote",
            arity: Arity::Exact(1),
            handler: do_quote,
        },
    ]
    .into_iter()
    .map(|form| (form.keyword, form))
    .collect()
});

/// Look up the special form named by `keyword`
pub(crate) fn find_special_form(keyword: &str) -> Option<&'static SpecialForm> {
    SPECIAL_FORMS.get(keyword)
}

/// Check that `operands` is a proper list whose length `arity` accepts
pub(crate) fn check_form<'a>(
    keyword: &str,
    operands: &'a Value,
    arity: Arity,
) -> Result<Vec<&'a Value>, Error> {
    if !operands.is_list() {
        return Err(Error::EvalError(format!(
            "{keyword}: badly formed expression: {operands}"
        )));
    }
    let items: Vec<&Value> = operands.iter().collect();
    if items.len() < arity.min() {
        return Err(Error::EvalError(format!(
            "{keyword}: too few operands in form"
        )));
    }
    if let Some(max) = arity.max()
        && items.len() > max
    {
        return Err(Error::EvalError(format!(
            "{keyword}: too many operands in form"
        )));
    }
    Ok(items)
}

/// A procedure body: a single expression, or several wrapped in `begin`
fn procedure_body(body: &[&Value]) -> Value {
    match body {
        [single] => (*single).clone(),
        _ => Value::cons(sym("begin"), body.iter().map(|&e| e.clone()).collect()),
    }
}

fn do_if(operands: &[&Value], env: &Environment) -> Result<Tail, Error> {
    let test = eval(operands[0], env)?;
    if test.is_true() {
        Ok(Tail::Eval(operands[1].clone()))
    } else {
        match operands.get(2) {
            Some(alternative) => Ok(Tail::Eval((*alternative).clone())),
            None => Ok(Tail::Value(Value::Unspecified)),
        }
    }
}

fn do_and(operands: &[&Value], env: &Environment) -> Result<Tail, Error> {
    let Some((last, init)) = operands.split_last() else {
        return Ok(Tail::Value(Value::Bool(true)));
    };
    for operand in init {
        let value = eval(operand, env)?;
        if !value.is_true() {
            return Ok(Tail::Value(value));
        }
    }
    Ok(Tail::Eval((*last).clone()))
}

fn do_or(operands: &[&Value], env: &Environment) -> Result<Tail, Error> {
    let Some((last, init)) = operands.split_last() else {
        return Ok(Tail::Value(Value::Bool(false)));
    };
    for operand in init {
        let value = eval(operand, env)?;
        if value.is_true() {
            return Ok(Tail::Value(value));
        }
    }
    Ok(Tail::Eval((*last).clone()))
}

fn do_cond(clauses: &[&Value], env: &Environment) -> Result<Tail, Error> {
    let count = clauses.len();
    for (i, clause) in clauses.iter().enumerate() {
        let parts = check_form("cond", clause, Arity::AtLeast(1))?;
        let (test_expr, body) = (parts[0], &parts[1..]);

        let test = if matches!(test_expr, Value::Symbol(s) if s == "else") {
            if i + 1 < count {
                return Err(Error::EvalError("cond: else must be last".to_owned()));
            }
            if body.is_empty() {
                return Err(Error::EvalError(
                    "cond: badly formed else clause".to_owned(),
                ));
            }
            Value::Bool(true)
        } else {
            eval(test_expr, env)?
        };

        if test.is_true() {
            return Ok(if body.is_empty() {
                Tail::Value(test)
            } else {
                Tail::Eval(procedure_body(body))
            });
        }
    }
    Ok(Tail::Value(Value::Unspecified))
}

fn do_begin(operands: &[&Value], env: &Environment) -> Result<Tail, Error> {
    let (last, init) = operands
        .split_last()
        .ok_or_else(|| Error::EvalError("begin: too few operands in form".to_owned()))?;
    for operand in init {
        eval(operand, env)?;
    }
    Ok(Tail::Eval((*last).clone()))
}

fn do_let(operands: &[&Value], env: &Environment) -> Result<Tail, Error> {
    let bindings = operands[0];
    if !bindings.is_list() {
        return Err(Error::EvalError(format!(
            "bad bindings list in let form: {bindings}"
        )));
    }

    let mut names = Vec::new();
    let mut values = Vec::new();
    for binding in bindings.iter() {
        match binding.to_vec().as_deref() {
            Ok([Value::Symbol(name), expr]) => {
                names.push(name.clone());
                values.push(eval(expr, env)?);
            }
            _ => {
                return Err(Error::EvalError(format!(
                    "bad binding in let form: {binding}"
                )));
            }
        }
    }

    let frame = env.extend(&Formals::new(names)?, values)?;
    let (last, init) = operands[1..]
        .split_last()
        .ok_or_else(|| Error::EvalError("let: too few operands in form".to_owned()))?;
    for expr in init {
        eval(expr, &frame)?;
    }
    Ok(Tail::EvalIn((*last).clone(), frame))
}

fn do_lambda(operands: &[&Value], env: &Environment) -> Result<Tail, Error> {
    let lambda = Lambda {
        formals: Formals::parse(operands[0])?,
        body: procedure_body(&operands[1..]),
        env: env.clone(),
    };
    Ok(Tail::Value(Value::Procedure(Procedure::Lambda(Rc::new(
        lambda,
    )))))
}

fn do_mu(operands: &[&Value], _env: &Environment) -> Result<Tail, Error> {
    let mu = Mu {
        formals: Formals::parse(operands[0])?,
        body: procedure_body(&operands[1..]),
    };
    Ok(Tail::Value(Value::Procedure(Procedure::Mu(Rc::new(mu)))))
}

fn do_define(operands: &[&Value], env: &Environment) -> Result<Tail, Error> {
    match operands[0] {
        Value::Symbol(name) => {
            if operands.len() > 2 {
                return Err(Error::EvalError(
                    "define: too many operands in form".to_owned(),
                ));
            }
            let value = eval(operands[1], env)?;
            debug!(name = %name, "define");
            env.define(name.clone(), value);
            Ok(Tail::Value(Value::Symbol(name.clone())))
        }
        target @ Value::Pair(_) => {
            // (define (name formals...) body...) binds name to a lambda
            let signature = Formals::parse(target)?;
            let (name, params) = signature
                .names()
                .split_first()
                .ok_or_else(|| Error::EvalError(format!("bad argument to define: {target}")))?;
            let lambda = Lambda {
                formals: Formals::new(params.to_vec())?,
                body: procedure_body(&operands[1..]),
                env: env.clone(),
            };
            debug!(name = %name, formals = %lambda.formals, "define procedure");
            env.define(
                name.clone(),
                Value::Procedure(Procedure::Lambda(Rc::new(lambda))),
            );
            Ok(Tail::Value(Value::Symbol(name.clone())))
        }
        target => Err(Error::EvalError(format!(
            "bad argument to define: {target}"
        ))),
    }
}

fn do_quote(operands: &[&Value], _env: &Environment) -> Result<Tail, Error> {
    Ok(Tail::Value(operands[0].clone()))
}
