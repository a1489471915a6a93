use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Expr, Symbol};
use crate::builtinops::apply_binary_op;
use crate::value::{Closure, Value};

/// Frames that hold a closure which captured the frame itself. Shared by
/// every frame of a chain so the owner of the root can break those cycles.
type CycleLog = Rc<RefCell<Vec<Weak<RefCell<Frame>>>>>;

/// One lexical scope level.
///
/// A binding is `None` between `letrec` reserving a name and the binding
/// expression producing its value.
#[derive(Default)]
struct Frame {
    bindings: HashMap<Symbol, Option<Value>>,
    parent: Option<Environment>,
    cycles: CycleLog,
    on_cycle: bool,
}

/// Environment for variable bindings
///
/// A handle to the innermost frame of a chain. Cloning the handle aliases the
/// same frame, which is how closures share (and observe later updates to)
/// the scope they were created in.
#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    /// A fresh chain with a single, empty frame
    pub fn root() -> Self {
        Environment::default()
    }

    /// A new empty frame in front of `self`
    pub fn extend(&self) -> Self {
        let cycles = Rc::clone(&self.0.borrow().cycles);
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(self.clone()),
            cycles,
            on_cycle: false,
        })))
    }

    /// Insert or overwrite `name` in the innermost frame only
    pub fn define(&self, name: Symbol, value: Value) {
        if let Value::Closure(closure) = &value
            && closure.env.reaches(self)
        {
            self.log_cycle();
        }
        self.bind(name, value);
    }

    /// [`Environment::define`] for values known not to capture this frame
    fn bind(&self, name: Symbol, value: Value) {
        self.0.borrow_mut().bindings.insert(name, Some(value));
    }

    /// Whether `target` is this frame or one of its ancestors
    fn reaches(&self, target: &Environment) -> bool {
        let mut current = Some(self.clone());
        while let Some(env) = current {
            if Rc::ptr_eq(&env.0, &target.0) {
                return true;
            }
            current = env.0.borrow().parent.clone();
        }
        false
    }

    fn log_cycle(&self) {
        let mut frame = self.0.borrow_mut();
        if !frame.on_cycle {
            frame.on_cycle = true;
            frame.cycles.borrow_mut().push(Rc::downgrade(&self.0));
        }
    }

    /// Clear every frame of this chain that a closure defined into it keeps
    /// alive, so the chain can be dropped. Closures that outlive this call
    /// no longer see the bindings of those frames.
    pub fn release_cycles(&self) {
        let logged = std::mem::take(&mut *self.0.borrow().cycles.borrow_mut());
        let released = logged.len();
        for frame in logged.iter().filter_map(Weak::upgrade) {
            let bindings = std::mem::take(&mut frame.borrow_mut().bindings);
            drop(bindings);
        }
        if released > 0 {
            trace!(released, "released closure cycles");
        }
    }

    /// Bind `name` in the innermost frame without a value yet
    pub(crate) fn reserve(&self, name: Symbol) {
        self.0.borrow_mut().bindings.insert(name, None);
    }

    /// Resolve `name`, searching from the innermost frame outwards
    pub fn lookup(&self, name: &Symbol) -> Result<Value, Error> {
        let mut current = self.clone();
        loop {
            let parent = {
                let frame = current.0.borrow();
                match frame.bindings.get(name) {
                    Some(Some(value)) => return Ok(value.clone()),
                    Some(None) => {
                        return Err(Error::EvalError(format!(
                            "{name} used before initialization"
                        )));
                    }
                    None => frame.parent.clone(),
                }
            };
            match parent {
                Some(parent) => current = parent,
                None => return Err(Error::UnboundIdentifier(name.to_string())),
            }
        }
    }

    /// Number of frames from this one to the root, inclusive
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut parent = self.0.borrow().parent.clone();
        while let Some(env) = parent {
            depth += 1;
            parent = env.0.borrow().parent.clone();
        }
        depth
    }

    /// Register a native procedure taking one argument.
    ///
    /// ```
    /// use loopscheme::evaluator::Environment;
    /// use loopscheme::value::Value;
    ///
    /// let env = Environment::root();
    /// env.register_native("double", |v| match v {
    ///     Value::Number(n) => Ok(Value::Number(n * 2)),
    ///     other => Ok(other),
    /// });
    /// ```
    pub fn register_native(
        &self,
        name: &str,
        func: impl Fn(Value) -> Result<Value, Error> + 'static,
    ) {
        let native = crate::value::NativeFunction::new(name, func);
        self.define(Symbol::named(name), Value::Native(native));
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name; reserved but
    /// unassigned names are skipped
    pub fn get_all_bindings(&self) -> Vec<(Symbol, Value)> {
        let mut bindings = HashMap::new();

        let frame = self.0.borrow();
        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = &frame.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in &frame.bindings {
            if let Some(value) = value {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Environment(depth={})", self.depth())
    }
}

/// Outcome of evaluating one expression: either a finished value, or a
/// closure body that must still run in a fresh frame. Returning the latter
/// instead of recursing is what keeps tail calls off the host stack.
enum Step {
    Done(Value),
    TailCall { body: Rc<Expr>, env: Environment },
}

/// Evaluate an expression (public API)
///
/// The expression must already be desugared; a remaining `for` fails with
/// [`Error::InvalidSyntax`].
pub fn eval(expr: &Expr, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate with depth tracking, running tail calls on a trampoline
fn eval_with_depth_tracking(
    expr: &Expr,
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    let mut step = eval_step(expr, env, depth)?;
    loop {
        match step {
            Step::Done(value) => return Ok(value),
            Step::TailCall { body, env } => {
                trace!(depth, frames = env.depth(), "tail call");
                step = eval_step(&body, &env, depth)?;
            }
        }
    }
}

/// Evaluate `expr` up to its next tail call
fn eval_step(expr: &Expr, env: &Environment, depth: usize) -> Result<Step, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }

    match expr {
        // Self-evaluating forms
        Expr::Number(n) => Ok(Step::Done(Value::Number(*n))),
        Expr::String(s) => Ok(Step::Done(Value::Text(s.clone()))),
        Expr::Bool(b) => Ok(Step::Done(Value::Bool(*b))),

        Expr::Identifier(name) => env.lookup(name).map(Step::Done),

        Expr::Define { name, value } => {
            let value = eval_with_depth_tracking(value, env, depth + 1)?;
            env.define(name.clone(), value.clone());
            Ok(Step::Done(value))
        }

        Expr::LetRec {
            name,
            binding,
            body,
        } => {
            let frame = env.extend();
            let value = match binding.as_ref() {
                // Captures `env` rather than `frame` and rebinds itself in
                // every call frame, so `frame` and the closure never form a
                // reference cycle.
                Expr::Lambda {
                    param,
                    body: lambda_body,
                } => Value::Closure(Rc::new(Closure {
                    param: param.clone(),
                    body: Rc::clone(lambda_body),
                    env: env.clone(),
                    self_name: Some(name.clone()),
                })),
                other => {
                    frame.reserve(name.clone());
                    eval_with_depth_tracking(other, &frame, depth + 1)?
                }
            };
            if !matches!(value, Value::Closure(_)) {
                return Err(Error::InvalidSyntax(format!(
                    "letrec binding must be a closure (lambda), got {value}"
                )));
            }
            // Overwrites the reservation; a closure built under it captured
            // `frame` and now sees itself under `name`.
            frame.define(name.clone(), value);
            eval_step(body, &frame, depth + 1)
        }

        Expr::Quote(datum) => Ok(Step::Done(Value::Datum(datum.clone()))),

        Expr::BinaryOp { op, lhs, rhs } => {
            let lhs = eval_with_depth_tracking(lhs, env, depth + 1)?;
            let rhs = eval_with_depth_tracking(rhs, env, depth + 1)?;
            apply_binary_op(*op, lhs, rhs).map(Step::Done)
        }

        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let condition = eval_with_depth_tracking(cond, env, depth + 1)?;
            if condition.is_truthy() {
                eval_step(then, env, depth + 1)
            } else {
                eval_step(otherwise, env, depth + 1)
            }
        }

        Expr::Begin(exprs) => {
            let Some((last, init)) = exprs.split_last() else {
                return Err(Error::InvalidSyntax(
                    "invalid syntax: begin requires at least one expression".to_owned(),
                ));
            };
            for expr in init {
                eval_with_depth_tracking(expr, env, depth + 1)?;
            }
            eval_step(last, env, depth + 1)
        }

        Expr::Lambda { param, body } => Ok(Step::Done(Value::Closure(Rc::new(Closure {
            param: param.clone(),
            body: Rc::clone(body),
            env: env.clone(),
            self_name: None,
        })))),

        Expr::Apply { callee, arg } => {
            let func = eval_with_depth_tracking(callee, env, depth + 1)?;
            let arg = eval_with_depth_tracking(arg, env, depth + 1)?;
            apply(func, arg)
        }

        Expr::For { .. } => Err(Error::InvalidSyntax(format!(
            "invalid syntax: for must be desugared before evaluation: {expr}"
        ))),
    }
}

/// Apply a procedure value to one argument
fn apply(func: Value, arg: Value) -> Result<Step, Error> {
    match func {
        Value::Closure(closure) => {
            // New frame off the *captured* chain, not the caller's
            let frame = closure.env.extend();
            if let Some(name) = &closure.self_name {
                frame.bind(name.clone(), Value::Closure(Rc::clone(&closure)));
            }
            // Bound second so a parameter spelled like the procedure shadows it
            frame.bind(closure.param.clone(), arg);
            Ok(Step::TailCall {
                body: Rc::clone(&closure.body),
                env: frame,
            })
        }
        Value::Native(native) => native.call(arg).map(Step::Done),
        other => Err(Error::InvalidSyntax(format!("not a procedure: {other}"))),
    }
}
