//! Read-eval-print driver.
//!
//! [`run_source`] reads every top-level form of a text, evaluates it in a
//! frame and prints the result to the session output. An error only aborts
//! the form it occurred in; it is reported as `Error: <message>` and the next
//! form runs as usual.

use crate::Error;
use crate::ast::Value;
use crate::evaluator::{Environment, eval};
use crate::scheme::SchemeReader;
use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, warn};

/// Counts of top-level forms processed by [`run_source`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Forms that evaluated successfully
    pub evaluated: usize,
    /// Forms that failed to read or evaluate
    pub errors: usize,
}

fn report(env: &Environment, text: &str) {
    if let Err(e) = env.write_output(text) {
        warn!(error = %e, "failed to write session output");
    }
}

/// Evaluate every form in `source` against `env`, printing each result that
/// is not the "no value" result, and each error.
pub fn run_source(source: &str, env: &Environment) -> RunSummary {
    let mut summary = RunSummary::default();

    for form in SchemeReader::new(source) {
        match form.and_then(|expr| eval(&expr, env)) {
            Ok(value) => {
                summary.evaluated += 1;
                if !matches!(value, Value::Unspecified) {
                    report(env, &format!("{value}\n"));
                }
            }
            Err(e) => {
                summary.errors += 1;
                report(env, &format!("Error: {e}\n"));
            }
        }
    }

    summary
}

/// Read `name`, or `name.scm` if `name` cannot be opened
pub fn scheme_open(name: &str) -> Result<String, Error> {
    match std::fs::read_to_string(name) {
        Ok(text) => Ok(text),
        Err(e) if name.ends_with(".scm") => {
            Err(Error::EvalError(format!("cannot open {name}: {e}")))
        }
        Err(_) => {
            let with_extension = format!("{name}.scm");
            std::fs::read_to_string(&with_extension)
                .map_err(|e| Error::EvalError(format!("cannot open {with_extension}: {e}")))
        }
    }
}

/// Load a source file into the global frame of `env`
pub fn load_file(path: impl AsRef<Path>, env: &Environment) -> Result<RunSummary, Error> {
    let name = path.as_ref().to_string_lossy();
    let source = scheme_open(&name)?;
    debug!(file = %name, "loading");
    let summary = run_source(&source, &env.global());
    debug!(
        file = %name,
        evaluated = summary.evaluated,
        errors = summary.errors,
        "loaded"
    );
    Ok(summary)
}

/// `(load name)` runs a file in the global frame
pub(crate) fn builtin_load(args: &[Value], env: &Environment) -> Result<Value, Error> {
    let name = match &args[0] {
        Value::Symbol(s) | Value::String(s) => s,
        other => {
            return Err(Error::TypeError(format!(
                "load: expected symbol or string, got {} {other}",
                other.type_name()
            )));
        }
    };
    load_file(name, env)?;
    Ok(Value::Unspecified)
}

/// In-memory session output, shared between clones
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    /// Return everything written so far and clear the buffer
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
