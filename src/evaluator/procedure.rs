use crate::Error;
use crate::ast::Value;
use crate::evaluator::Environment;
use std::fmt;
use std::rc::Rc;

/// Number of operands a primitive or special form accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(min) => count >= min,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }

    /// Smallest accepted count
    pub fn min(&self) -> usize {
        match *self {
            Arity::Exact(n) | Arity::AtLeast(n) | Arity::Range(n, _) => n,
            Arity::Any => 0,
        }
    }

    /// Largest accepted count, if bounded
    pub fn max(&self) -> Option<usize> {
        match *self {
            Arity::Exact(n) | Arity::Range(_, n) => Some(n),
            Arity::AtLeast(_) | Arity::Any => None,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// A validated parameter list: distinct symbols, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Formals(Vec<String>);

impl Formals {
    /// Validate a Scheme list of parameter symbols.
    pub fn parse(list: &Value) -> Result<Self, Error> {
        if !list.is_list() {
            return Err(Error::EvalError(format!(
                "malformed formal parameter list: {list}"
            )));
        }
        let mut names = Vec::new();
        for item in list.iter() {
            match item {
                Value::Symbol(name) => names.push(name.clone()),
                other => {
                    return Err(Error::EvalError(format!(
                        "formal parameters must be symbols, got {other}"
                    )));
                }
            }
        }
        Self::new(names)
    }

    /// Build from names, rejecting duplicates
    pub fn new(names: Vec<String>) -> Result<Self, Error> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::EvalError(format!(
                    "duplicate formal parameter: {name}"
                )));
            }
        }
        Ok(Formals(names))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Formals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(" "))
    }
}

/// Native callable behind a primitive procedure.
///
/// `WithEnv` primitives receive the calling frame in addition to their
/// arguments; this is how `eval`, `load` and the output procedures reach the
/// session they run in.
#[derive(Clone, Copy)]
pub enum PrimitiveFn {
    Plain(fn(&[Value]) -> Result<Value, Error>),
    WithEnv(fn(&[Value], &Environment) -> Result<Value, Error>),
}

pub struct Primitive {
    pub name: String,
    pub arity: Arity,
    pub func: PrimitiveFn,
}

impl Primitive {
    pub fn wants_env(&self) -> bool {
        matches!(self.func, PrimitiveFn::WithEnv(_))
    }

    /// Check arity, then invoke with the calling frame when requested
    pub fn call(&self, args: &[Value], env: &Environment) -> Result<Value, Error> {
        if !self.arity.accepts(args.len()) {
            return Err(Error::arity_error_in(self.arity, args.len(), &self.name));
        }
        match self.func {
            PrimitiveFn::Plain(f) => f(args),
            PrimitiveFn::WithEnv(f) => f(args, env),
        }
    }
}

/// A lexically scoped procedure: closes over its defining frame
pub struct Lambda {
    pub formals: Formals,
    pub body: Value,
    pub env: Environment,
}

/// A dynamically scoped procedure: its body runs in a child of the caller's frame
pub struct Mu {
    pub formals: Formals,
    pub body: Value,
}

#[derive(Clone)]
pub enum Procedure {
    Primitive(Rc<Primitive>),
    Lambda(Rc<Lambda>),
    Mu(Rc<Mu>),
}

impl Procedure {
    pub fn ptr_eq(&self, other: &Procedure) -> bool {
        match (self, other) {
            (Procedure::Primitive(a), Procedure::Primitive(b)) => Rc::ptr_eq(a, b),
            (Procedure::Lambda(a), Procedure::Lambda(b)) => Rc::ptr_eq(a, b),
            (Procedure::Mu(a), Procedure::Mu(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(p) => write!(f, "#[{}]", p.name),
            Procedure::Lambda(l) => write!(f, "(lambda {} {})", l.formals, l.body),
            Procedure::Mu(m) => write!(f, "(mu {} {})", m.formals, m.body),
        }
    }
}

// The closure frame is left out: it usually contains the procedure itself.
impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(p) => write!(f, "Primitive({})", p.name),
            Procedure::Lambda(l) => write!(f, "Lambda(formals={}, body={})", l.formals, l.body),
            Procedure::Mu(m) => write!(f, "Mu(formals={}, body={})", m.formals, m.body),
        }
    }
}
