//! Frames and the environment chain.
//!
//! An [`Environment`] is a cheap handle to one frame. Frames hold their local
//! bindings and a handle to their parent; the root (global) frame also owns the
//! output port the session prints to. Handles are reference counted so a frame
//! stays alive as long as any procedure that closed over it.

use crate::Error;
use crate::ast::Value;
use crate::evaluator::procedure::{Arity, Formals, Primitive, PrimitiveFn, Procedure};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

/// Shared sink for everything a session prints
pub type OutputPort = Rc<RefCell<dyn Write>>;

struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
    /// Set on the global frame only
    output: Option<OutputPort>,
}

impl Drop for Frame {
    // Chains of dynamically scoped call frames can be very long; release them in a loop
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(env) = next {
            match Rc::try_unwrap(env.frame) {
                Ok(mut frame) => next = frame.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// Handle to a frame of variable bindings
#[derive(Clone)]
pub struct Environment {
    frame: Rc<Frame>,
}

impl Environment {
    /// Create an empty global frame that prints to stdout
    pub fn new() -> Self {
        Self::with_output(std::io::stdout())
    }

    /// Create an empty global frame that prints to `output`
    pub fn with_output<W: Write + 'static>(output: W) -> Self {
        let port: OutputPort = Rc::new(RefCell::new(output));
        Environment {
            frame: Rc::new(Frame {
                bindings: RefCell::new(HashMap::new()),
                parent: None,
                output: Some(port),
            }),
        }
    }

    /// Create an empty frame whose parent is `self`
    pub fn child(&self) -> Self {
        Environment {
            frame: Rc::new(Frame {
                bindings: RefCell::new(HashMap::new()),
                parent: Some(self.clone()),
                output: None,
            }),
        }
    }

    /// Insert or overwrite a binding in this frame only
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.frame.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Find the innermost binding of `name`
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut current = self;
        loop {
            if let Some(value) = current.frame.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            current = current.frame.parent.as_ref()?;
        }
    }

    /// Like [`Environment::get`], failing for unbound identifiers
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.frame.parent.as_ref()
    }

    pub fn is_global(&self) -> bool {
        self.frame.parent.is_none()
    }

    /// The root of the parent chain
    pub fn global(&self) -> Environment {
        let mut current = self;
        while let Some(parent) = &current.frame.parent {
            current = parent;
        }
        current.clone()
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }

    /// Build a call frame from a Scheme list of parameter symbols.
    ///
    /// Fails with an arity error when the counts differ, and with a
    /// malformed-formals error for duplicates or non-symbol parameters.
    pub fn make_call_frame(&self, formals: &Value, args: Vec<Value>) -> Result<Environment, Error> {
        let Some(expected) = formals.list_len() else {
            return Err(Error::EvalError(format!(
                "malformed formal parameter list: {formals}"
            )));
        };
        if expected != args.len() {
            return Err(Error::arity_error(Arity::Exact(expected), args.len()));
        }
        let formals = Formals::parse(formals)?;
        self.extend(&formals, args)
    }

    /// Build a call frame from already validated formals
    pub fn extend(&self, formals: &Formals, args: Vec<Value>) -> Result<Environment, Error> {
        if formals.len() != args.len() {
            return Err(Error::arity_error(Arity::Exact(formals.len()), args.len()));
        }
        let frame = self.child();
        {
            let mut bindings = frame.frame.bindings.borrow_mut();
            for (name, value) in formals.names().iter().zip(args) {
                bindings.insert(name.clone(), value);
            }
        }
        Ok(frame)
    }

    /// Register a native procedure in this frame.
    ///
    /// # Example
    /// ```
    /// use muscheme::Arity;
    /// use muscheme::ast::Value;
    /// use muscheme::evaluator::{PrimitiveFn, create_global_env, eval};
    /// use muscheme::scheme::parse_scheme;
    ///
    /// fn answer(_args: &[Value]) -> Result<Value, muscheme::Error> {
    ///     Ok(Value::Number(42))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_primitive("answer", Arity::Exact(0), PrimitiveFn::Plain(answer));
    /// let expr = parse_scheme("(answer)").unwrap();
    /// assert_eq!(eval(&expr, &env).unwrap(), Value::Number(42));
    /// ```
    pub fn register_primitive(&self, name: &str, arity: Arity, func: PrimitiveFn) {
        let primitive = Primitive {
            name: name.to_owned(),
            arity,
            func,
        };
        self.define(name, Value::Procedure(Procedure::Primitive(Rc::new(primitive))));
    }

    /// Get all bindings visible from this frame
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = &self.frame.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.frame.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// The session output port, owned by the global frame
    pub fn output(&self) -> OutputPort {
        match &self.global().frame.output {
            Some(port) => port.clone(),
            // Only a global frame can be built without a parent, and it always has a port
            None => Rc::new(RefCell::new(std::io::sink())),
        }
    }

    /// Write text to the session output
    pub fn write_output(&self, text: &str) -> Result<(), Error> {
        let port = self.output();
        let mut out = port.borrow_mut();
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| Error::EvalError(format!("output error: {e}")))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.frame.parent {
            None => write!(f, "<Global Frame>"),
            Some(parent) => {
                let mut entries: Vec<String> = self
                    .frame
                    .bindings
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect();
                entries.sort();
                write!(f, "<{{{}}} -> {parent:?}>", entries.join(", "))
            }
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    #[test]
    fn test_closure_stored_in_its_own_frame_keeps_frame_alive() {
        use crate::evaluator::Lambda;

        let global = Environment::new();

        let plain = global.child();
        plain.define("n", val(1));
        let plain_frame = Rc::downgrade(&plain.frame);
        drop(plain);
        assert!(plain_frame.upgrade().is_none());

        // A lambda defined in a frame closes over that frame: the Rc cycle
        // is never broken, so the frame outlives every outside handle
        let looping = global.child();
        let helper = Lambda {
            formals: Formals::new(vec![]).unwrap(),
            body: sym("n"),
            env: looping.clone(),
        };
        looping.define("h", Value::Procedure(Procedure::Lambda(Rc::new(helper))));
        let looping_frame = Rc::downgrade(&looping.frame);
        drop(looping);
        assert!(looping_frame.upgrade().is_some());
    }

    #[test]
    fn test_frame_based_environment() {
        let global = Environment::new();
        global.define("global_var", val(42));
        global.define("local_var", val("local"));

        let extended = global.child();
        extended.define("extended_var", val(99));

        assert_eq!(extended.lookup("extended_var").unwrap(), val(99));
        assert_eq!(extended.lookup("global_var").unwrap(), val(42));
        assert_eq!(extended.lookup("local_var").unwrap(), val("local"));

        // The parent does not see the child's bindings
        assert!(global.get("extended_var").is_none());
        match global.lookup("extended_var") {
            Err(Error::UnboundVariable(name)) => assert_eq!(name, "extended_var"),
            other => panic!("expected UnboundVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_shadowing() {
        let global = Environment::new();
        global.define("s", val("ancestor"));
        let middle = global.child();
        middle.define("s", val("middle"));
        let inner = middle.child();
        let innermost = inner.child();

        assert_eq!(middle.lookup("s").unwrap(), val("middle"));
        assert_eq!(inner.lookup("s").unwrap(), val("middle"));
        assert_eq!(innermost.lookup("s").unwrap(), val("middle"));
        assert_eq!(global.lookup("s").unwrap(), val("ancestor"));

        // Redefining in a descendant shadows again without touching ancestors
        inner.define("s", val("inner"));
        assert_eq!(innermost.lookup("s").unwrap(), val("inner"));
        assert_eq!(middle.lookup("s").unwrap(), val("middle"));
    }

    #[test]
    fn test_define_overwrites_locally() {
        let global = Environment::new();
        global.define("x", val(1));
        global.define("x", val(2));
        assert_eq!(global.lookup("x").unwrap(), val(2));

        let local = global.child();
        local.define("x", val(3));
        assert_eq!(local.lookup("x").unwrap(), val(3));
        assert_eq!(global.lookup("x").unwrap(), val(2));
    }

    #[test]
    fn test_global_and_parent_links() {
        let global = Environment::new();
        let a = global.child();
        let b = a.child();

        assert!(global.is_global());
        assert!(!b.is_global());
        assert!(b.global().ptr_eq(&global));
        assert!(global.global().ptr_eq(&global));
        assert!(b.parent().unwrap().ptr_eq(&a));
        assert!(global.parent().is_none());
    }

    #[test]
    fn test_make_call_frame_binds_in_order() {
        let global = Environment::new();
        let formals = val(vec![sym("a"), sym("b"), sym("c")]);
        let frame = global
            .make_call_frame(&formals, vec![val(1), val(2), val(3)])
            .unwrap();

        assert!(frame.parent().unwrap().ptr_eq(&global));
        assert_eq!(frame.lookup("a").unwrap(), val(1));
        assert_eq!(frame.lookup("b").unwrap(), val(2));
        assert_eq!(frame.lookup("c").unwrap(), val(3));
        assert_eq!(format!("{frame:?}"), "<{a: 1, b: 2, c: 3} -> <Global Frame>>");
    }

    #[test]
    fn test_make_call_frame_arity_for_all_lengths() {
        let global = Environment::new();
        let names = ["a", "b", "c", "d"];
        for formal_count in 0..=4 {
            let formals: Value = names[..formal_count].iter().map(sym).collect();
            for arg_count in 0..=4 {
                let args: Vec<Value> = (0..arg_count).map(|i| val(i as i64)).collect();
                let result = global.make_call_frame(&formals, args);
                if formal_count == arg_count {
                    assert!(result.is_ok(), "{formal_count} formals, {arg_count} args");
                } else {
                    match result {
                        Err(Error::ArityError { expected, got, .. }) => {
                            assert_eq!(expected, Arity::Exact(formal_count));
                            assert_eq!(got, arg_count);
                        }
                        other => panic!(
                            "{formal_count} formals, {arg_count} args: expected ArityError, got {other:?}"
                        ),
                    }
                }
            }
        }
    }

    #[test]
    fn test_make_call_frame_rejects_malformed_formals() {
        let global = Environment::new();
        let duplicate = val(vec![sym("x"), sym("x")]);
        let err = global
            .make_call_frame(&duplicate, vec![val(1), val(2)])
            .unwrap_err();
        assert!(format!("{err}").contains("duplicate formal parameter"));

        let non_symbol = val(vec![sym("x"), val(3)]);
        let err = global
            .make_call_frame(&non_symbol, vec![val(1), val(2)])
            .unwrap_err();
        assert!(format!("{err}").contains("must be symbols"));

        let dotted = Value::cons(sym("x"), sym("y"));
        assert!(global.make_call_frame(&dotted, vec![val(1)]).is_err());
    }

    #[test]
    fn test_output_goes_to_global_port() {
        let buffer = crate::repl::OutputBuffer::new();
        let global = Environment::with_output(buffer.clone());
        let inner = global.child().child();
        inner.write_output("hello ").unwrap();
        global.write_output("world").unwrap();
        assert_eq!(buffer.contents(), "hello world");
    }

    #[test]
    fn test_get_all_bindings_prefers_inner() {
        let global = Environment::new();
        global.define("b", val(1));
        global.define("a", val(2));
        let local = global.child();
        local.define("b", val(3));

        let all = local.get_all_bindings();
        assert_eq!(all, vec![("a".to_owned(), val(2)), ("b".to_owned(), val(3))]);
    }
}
