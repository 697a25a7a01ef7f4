//! Tree-walking evaluator for parsed scripts
//!
//! The interpreter polls an interrupt flag and a deadline on every loop
//! iteration and function call, so a runaway script stops shortly after the
//! host gives up on it.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::ast::*;
use super::builtins;
use super::value::{Budget, ScriptValue, SLOT_BYTES};
use super::{SandboxError, SandboxLimits};
use serde_json::Value;
use std::cell::RefCell;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

type EvalResult<T> = Result<T, SandboxError>;
type Env = Rc<RefCell<Scope>>;

/// Steps between interrupt polls
const POLL_INTERVAL: u64 = 1024;

#[derive(Default)]
struct Scope {
    bindings: HashMap<String, Binding>,
    parent: Option<Env>,
}

struct Binding {
    value: ScriptValue,
    mutable: bool,
}

impl Scope {
    fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            bindings: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }
}

/// An arrow function together with the scope it closes over
pub(crate) struct Closure {
    params: Vec<String>,
    body: Arc<ArrowBody>,
    env: Env,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure").field("params", &self.params).finish()
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(ScriptValue),
}

pub struct Interpreter {
    budget: Budget,
    interrupt: Arc<AtomicBool>,
    deadline: Instant,
    timeout_ms: u64,
    steps: u64,
    call_depth: usize,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(limits: &SandboxLimits, interrupt: Arc<AtomicBool>, deadline: Instant) -> Self {
        Self {
            budget: Budget::new(limits.memory_limit_bytes),
            interrupt,
            deadline,
            timeout_ms: limits.timeout.as_millis() as u64,
            steps: 0,
            call_depth: 0,
            max_call_depth: limits.max_nesting,
        }
    }

    /// Run `program` with `input` bound to `value` and `input`
    ///
    /// The result is the argument of the first top-level `return`, or the
    /// value of the last expression statement when there is none.
    pub fn run(mut self, program: &Program, input: Value) -> EvalResult<Value> {
        let root: Env = Rc::new(RefCell::new(Scope::default()));
        let imported = self.budget.import(&input)?;
        for name in ["value", "input"] {
            self.declare(&root, name, imported.clone(), true);
        }

        let mut completion = ScriptValue::Undefined;
        for stmt in &program.body {
            if let Stmt::Expr(expr) = stmt {
                completion = self.eval(expr, &root)?;
                continue;
            }
            match self.exec(stmt, &root)? {
                Flow::Return(value) => return value.to_json(),
                Flow::Normal => {}
                Flow::Break | Flow::Continue => {
                    return Err(SandboxError::Syntax {
                        message: "break or continue outside of a loop".to_string(),
                        position: 0,
                    });
                }
            }
        }
        completion.to_json()
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps % POLL_INTERVAL == 0
            && (self.interrupt.load(Ordering::Relaxed) || Instant::now() >= self.deadline)
        {
            return Err(SandboxError::Timeout {
                timeout_ms: self.timeout_ms,
            });
        }
        Ok(())
    }

    // Scopes

    fn declare(&mut self, env: &Env, name: &str, value: ScriptValue, mutable: bool) {
        env.borrow_mut()
            .bindings
            .insert(name.to_string(), Binding { value, mutable });
    }

    fn lookup(&self, env: &Env, name: &str) -> Option<ScriptValue> {
        let mut current = Some(Rc::clone(env));
        while let Some(scope) = current {
            let scope = scope.borrow();
            if let Some(binding) = scope.bindings.get(name) {
                return Some(binding.value.clone());
            }
            current = scope.parent.clone();
        }
        builtins::global(name)
    }

    fn assign_name(&mut self, env: &Env, name: &str, value: ScriptValue) -> EvalResult<()> {
        let mut current = Some(Rc::clone(env));
        while let Some(scope) = current {
            let mut scope = scope.borrow_mut();
            if let Some(binding) = scope.bindings.get_mut(name) {
                if !binding.mutable {
                    return Err(SandboxError::type_error(format!(
                        "Assignment to constant variable '{}'",
                        name
                    )));
                }
                binding.value = value;
                return Ok(());
            }
            current = scope.parent.clone();
        }
        Err(SandboxError::Reference {
            name: name.to_string(),
        })
    }

    // Statements

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> EvalResult<Flow> {
        let scope = Scope::child(env);
        for stmt in body {
            match self.exec(stmt, &scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> EvalResult<Flow> {
        match stmt {
            Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Declare {
                declarations,
                mutable,
            } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => ScriptValue::Undefined,
                    };
                    self.budget.charge(name.len() + SLOT_BYTES)?;
                    self.declare(env, name, value, *mutable);
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => self.exec_block(body, env),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    self.tick()?;
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let scope = Scope::child(env);
                if let Some(init) = init {
                    self.exec(init, &scope)?;
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        if !self.eval(test, &scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                binding,
                mutable,
                iterable,
                body,
            } => {
                let items: Vec<ScriptValue> = match self.eval(iterable, env)? {
                    ScriptValue::Array(items) => items.borrow().clone(),
                    ScriptValue::Str(s) => s.chars().map(|c| ScriptValue::string(c.to_string())).collect(),
                    other => {
                        return Err(SandboxError::type_error(format!(
                            "{} is not iterable",
                            other.type_of()
                        )));
                    }
                };
                for item in items {
                    self.tick()?;
                    let scope = Scope::child(env);
                    self.declare(&scope, binding, item, *mutable);
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return(argument) => {
                let value = match argument {
                    Some(expr) => self.eval(expr, env)?,
                    None => ScriptValue::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(expr) => {
                let thrown = self.eval(expr, env)?;
                Err(SandboxError::Thrown {
                    message: thrown_message(&thrown),
                })
            }
        }
    }

    // Expressions

    fn eval(&mut self, expr: &Expr, env: &Env) -> EvalResult<ScriptValue> {
        match expr {
            Expr::Number(n) => Ok(ScriptValue::Number(*n)),
            Expr::Str(s) => Ok(ScriptValue::string(s.as_str())),
            Expr::Bool(b) => Ok(ScriptValue::Bool(*b)),
            Expr::Null => Ok(ScriptValue::Null),
            Expr::Undefined => Ok(ScriptValue::Undefined),
            Expr::Ident(name) => self.lookup(env, name).ok_or_else(|| SandboxError::Reference {
                name: name.clone(),
            }),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.budget.alloc_array(values)
            }
            Expr::Object(entries) => {
                let mut values: Vec<(String, ScriptValue)> = Vec::with_capacity(entries.len());
                for (key, expr) in entries {
                    let value = self.eval(expr, env)?;
                    match values.iter_mut().find(|(k, _)| k == key) {
                        Some(slot) => slot.1 = value,
                        None => values.push((key.clone(), value)),
                    }
                }
                self.budget.alloc_object(values)
            }
            Expr::Member { object, property } => {
                let target = self.eval(object, env)?;
                get_property(&target, property)
            }
            Expr::Index { object, index } => {
                let target = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                get_indexed(&target, &key)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, env),
            Expr::Unary { op, operand } => {
                if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, operand.as_ref()) {
                    let type_name = self
                        .lookup(env, name)
                        .map_or("undefined", |v| v.type_of());
                    return Ok(ScriptValue::string(type_name));
                }
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => ScriptValue::Bool(!value.truthy()),
                    UnaryOp::Neg => ScriptValue::Number(-value.to_number()),
                    UnaryOp::Plus => ScriptValue::Number(value.to_number()),
                    UnaryOp::TypeOf => ScriptValue::string(value.type_of()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Assign { op, target, value } => {
                let value = match op {
                    None => self.eval(value, env)?,
                    Some(op) => {
                        let current = self.eval(target, env)?;
                        let operand = self.eval(value, env)?;
                        self.binary(*op, &current, &operand)?
                    }
                };
                self.assign(target, value.clone(), env)?;
                Ok(value)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target, env)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign(target, ScriptValue::Number(new), env)?;
                Ok(ScriptValue::Number(if *prefix { new } else { old }))
            }
            Expr::Arrow { params, body } => {
                self.budget.charge(SLOT_BYTES * (params.len() + 2))?;
                Ok(ScriptValue::Closure(Rc::new(Closure {
                    params: params.clone(),
                    body: Arc::clone(body),
                    env: Rc::clone(env),
                })))
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: ScriptValue, env: &Env) -> EvalResult<()> {
        match target {
            Expr::Ident(name) => self.assign_name(env, name, value),
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                self.set_property(&object, property, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                if let (ScriptValue::Array(_), Some(position)) = (&object, array_index(&key)) {
                    return self.set_element(&object, position, value);
                }
                self.set_property(&object, &key.to_display(), value)
            }
            _ => Err(SandboxError::type_error("invalid assignment target")),
        }
    }

    fn set_property(&mut self, object: &ScriptValue, key: &str, value: ScriptValue) -> EvalResult<()> {
        match object {
            ScriptValue::Object(entries) => {
                let mut entries = entries.borrow_mut();
                match entries.iter_mut().find(|(k, _)| k == key) {
                    Some(slot) => slot.1 = value,
                    None => {
                        self.budget.charge(key.len() + 2 * SLOT_BYTES)?;
                        entries.push((key.to_string(), value));
                    }
                }
                Ok(())
            }
            ScriptValue::Array(items) if key == "length" => {
                let len = array_index(&value)
                    .ok_or_else(|| SandboxError::type_error("invalid array length"))?;
                let mut items = items.borrow_mut();
                if len > items.len() {
                    self.budget.charge((len - items.len()) * SLOT_BYTES)?;
                }
                items.resize(len, ScriptValue::Undefined);
                Ok(())
            }
            ScriptValue::Array(_) => match key.parse::<usize>() {
                Ok(position) => self.set_element(object, position, value),
                Err(_) => Ok(()),
            },
            ScriptValue::Undefined | ScriptValue::Null => Err(SandboxError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                object.to_display(),
                key
            ))),
            // writes to primitives are silently dropped
            _ => Ok(()),
        }
    }

    fn set_element(&mut self, array: &ScriptValue, position: usize, value: ScriptValue) -> EvalResult<()> {
        let ScriptValue::Array(items) = array else {
            return Ok(());
        };
        let mut items = items.borrow_mut();
        if position >= items.len() {
            let growth = position + 1 - items.len();
            self.budget.charge(growth.saturating_mul(SLOT_BYTES))?;
            items.resize(position + 1, ScriptValue::Undefined);
        }
        items[position] = value;
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, left: &ScriptValue, right: &ScriptValue) -> EvalResult<ScriptValue> {
        let number = |f: fn(f64, f64) -> f64| ScriptValue::Number(f(left.to_number(), right.to_number()));
        Ok(match op {
            BinaryOp::Add => {
                let textual = |v: &ScriptValue| {
                    !matches!(
                        v,
                        ScriptValue::Undefined
                            | ScriptValue::Null
                            | ScriptValue::Bool(_)
                            | ScriptValue::Number(_)
                    )
                };
                if textual(left) || textual(right) {
                    let (l, r) = (left.to_display(), right.to_display());
                    self.budget.ensure(l.len() + r.len())?;
                    self.budget.alloc_string(l + &r)?
                } else {
                    number(|a, b| a + b)
                }
            }
            BinaryOp::Sub => number(|a, b| a - b),
            BinaryOp::Mul => number(|a, b| a * b),
            BinaryOp::Div => number(|a, b| a / b),
            BinaryOp::Rem => number(|a, b| a % b),
            BinaryOp::Eq => ScriptValue::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => ScriptValue::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => ScriptValue::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => ScriptValue::Bool(!left.strict_equals(right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare(left, right);
                ScriptValue::Bool(match (op, ordering) {
                    (_, None) => false,
                    (BinaryOp::Lt, Some(o)) => o == CmpOrdering::Less,
                    (BinaryOp::Le, Some(o)) => o != CmpOrdering::Greater,
                    (BinaryOp::Gt, Some(o)) => o == CmpOrdering::Greater,
                    (_, Some(o)) => o != CmpOrdering::Less,
                })
            }
        })
    }

    // Calls

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> EvalResult<ScriptValue> {
        let (receiver, method) = match callee {
            Expr::Member { object, property } => (self.eval(object, env)?, property.clone()),
            Expr::Index { object, index } => {
                let receiver = self.eval(object, env)?;
                let key = self.eval(index, env)?.to_display();
                (receiver, key)
            }
            other => {
                let function = self.eval(other, env)?;
                let args = self.eval_args(args, env)?;
                return self.call_value(&function, args, &describe(other));
            }
        };
        let args = self.eval_args(args, env)?;
        self.call_method(&receiver, &method, args)
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> EvalResult<Vec<ScriptValue>> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    fn call_method(&mut self, receiver: &ScriptValue, method: &str, args: Vec<ScriptValue>) -> EvalResult<ScriptValue> {
        match receiver {
            ScriptValue::Undefined | ScriptValue::Null => Err(SandboxError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                receiver.to_display(),
                method
            ))),
            ScriptValue::Object(_) => {
                let function = get_property(receiver, method)?;
                self.call_value(&function, args, method)
            }
            ScriptValue::Builtin(owner) => {
                let function = builtins::builtin_member(owner, method);
                self.call_value(&function, args, &format!("{}.{}", owner, method))
            }
            ScriptValue::Str(s) => builtins::call_string_method(s, method, &args, &mut self.budget),
            ScriptValue::Number(n) => builtins::call_number_method(*n, method, &args, &mut self.budget),
            ScriptValue::Bool(b) if method == "toString" => self.budget.alloc_string(b.to_string()),
            ScriptValue::Array(items) => match method {
                "map" | "filter" | "forEach" | "some" | "every" | "find" | "findIndex" | "reduce" | "sort" => {
                    self.call_iteration(receiver, method, args)
                }
                _ => builtins::call_array_method(items, method, &args, &mut self.budget),
            },
            _ => Err(SandboxError::type_error(format!("value.{} is not a function", method))),
        }
    }

    fn call_value(&mut self, function: &ScriptValue, args: Vec<ScriptValue>, label: &str) -> EvalResult<ScriptValue> {
        match function {
            ScriptValue::Builtin(name) => {
                self.tick()?;
                builtins::call_builtin(name, &args, &mut self.budget)
            }
            ScriptValue::Closure(closure) => self.call_closure(closure, args),
            _ => Err(SandboxError::type_error(format!("{} is not a function", label))),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<ScriptValue>) -> EvalResult<ScriptValue> {
        self.tick()?;
        if self.call_depth >= self.max_call_depth {
            return Err(SandboxError::type_error("Maximum call stack size exceeded"));
        }
        self.budget.charge(SLOT_BYTES * (closure.params.len() + 1))?;

        let scope = Scope::child(&closure.env);
        let mut args = args.into_iter();
        for param in &closure.params {
            let value = args.next().unwrap_or(ScriptValue::Undefined);
            self.declare(&scope, param, value, true);
        }

        self.call_depth += 1;
        let result = match closure.body.as_ref() {
            ArrowBody::Expr(expr) => self.eval(expr, &scope),
            ArrowBody::Block(body) => self.exec_block(body, &scope).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => ScriptValue::Undefined,
            }),
        };
        self.call_depth -= 1;
        result
    }

    /// Array methods that take a callback
    fn call_iteration(&mut self, receiver: &ScriptValue, method: &str, args: Vec<ScriptValue>) -> EvalResult<ScriptValue> {
        let ScriptValue::Array(items) = receiver else {
            return Err(SandboxError::type_error(format!("value.{} is not a function", method)));
        };
        let snapshot: Vec<ScriptValue> = items.borrow().clone();
        let mut args = args.into_iter();
        let callback = args.next().unwrap_or(ScriptValue::Undefined);

        if method == "sort" {
            return self.sort(items, snapshot, callback);
        }
        if !matches!(callback, ScriptValue::Closure(_) | ScriptValue::Builtin(_)) {
            return Err(SandboxError::type_error(format!(
                "{} is not a function",
                callback.to_display()
            )));
        }

        if method == "reduce" {
            let mut iter = snapshot.into_iter().enumerate();
            let mut accumulator = match args.next() {
                Some(initial) => initial,
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(SandboxError::type_error(
                            "Reduce of empty array with no initial value",
                        ));
                    }
                },
            };
            for (index, item) in iter {
                accumulator = self.call_value(
                    &callback,
                    vec![accumulator, item, ScriptValue::Number(index as f64)],
                    "callback",
                )?;
            }
            return Ok(accumulator);
        }

        let mut mapped = Vec::new();
        for (index, item) in snapshot.into_iter().enumerate() {
            let verdict = self.call_value(
                &callback,
                vec![item.clone(), ScriptValue::Number(index as f64), receiver.clone()],
                "callback",
            )?;
            match method {
                "map" => mapped.push(verdict),
                "filter" if verdict.truthy() => mapped.push(item),
                "some" if verdict.truthy() => return Ok(ScriptValue::Bool(true)),
                "every" if !verdict.truthy() => return Ok(ScriptValue::Bool(false)),
                "find" if verdict.truthy() => return Ok(item),
                "findIndex" if verdict.truthy() => return Ok(ScriptValue::Number(index as f64)),
                _ => {}
            }
        }
        match method {
            "map" | "filter" => self.budget.alloc_array(mapped),
            "some" => Ok(ScriptValue::Bool(false)),
            "every" => Ok(ScriptValue::Bool(true)),
            "findIndex" => Ok(ScriptValue::Number(-1.0)),
            _ => Ok(ScriptValue::Undefined),
        }
    }

    /// In-place sort; undefined sorts last and the default order is by text
    fn sort(
        &mut self,
        items: &Rc<RefCell<Vec<ScriptValue>>>,
        snapshot: Vec<ScriptValue>,
        comparator: ScriptValue,
    ) -> EvalResult<ScriptValue> {
        let (mut defined, undefined): (Vec<_>, Vec<_>) = snapshot
            .into_iter()
            .partition(|v| !matches!(v, ScriptValue::Undefined));

        let mut failure = None;
        match &comparator {
            ScriptValue::Undefined => defined.sort_by_key(ScriptValue::to_display),
            ScriptValue::Closure(_) => defined.sort_by(|a, b| {
                if failure.is_some() {
                    return CmpOrdering::Equal;
                }
                match self.call_value(&comparator, vec![a.clone(), b.clone()], "comparator") {
                    Ok(result) => result
                        .to_number()
                        .partial_cmp(&0.0)
                        .unwrap_or(CmpOrdering::Equal),
                    Err(e) => {
                        failure = Some(e);
                        CmpOrdering::Equal
                    }
                }
            }),
            other => {
                return Err(SandboxError::type_error(format!(
                    "{} is not a function",
                    other.to_display()
                )));
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        defined.extend(undefined);
        *items.borrow_mut() = defined;
        Ok(ScriptValue::Array(Rc::clone(items)))
    }
}

fn array_index(key: &ScriptValue) -> Option<usize> {
    match key {
        ScriptValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < u32::MAX as f64 => Some(*n as usize),
        ScriptValue::Str(s) => s.parse::<usize>().ok(),
        _ => None,
    }
}

fn get_property(target: &ScriptValue, property: &str) -> EvalResult<ScriptValue> {
    if let Some(value) = builtins::primitive_property(target, property) {
        return Ok(value);
    }
    Ok(match target {
        ScriptValue::Undefined | ScriptValue::Null => {
            return Err(SandboxError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                target.to_display(),
                property
            )));
        }
        ScriptValue::Object(entries) => entries
            .borrow()
            .iter()
            .find(|(k, _)| k == property)
            .map_or(ScriptValue::Undefined, |(_, v)| v.clone()),
        ScriptValue::Array(items) => property
            .parse::<usize>()
            .ok()
            .and_then(|i| items.borrow().get(i).cloned())
            .unwrap_or(ScriptValue::Undefined),
        ScriptValue::Str(s) => property
            .parse::<usize>()
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map_or(ScriptValue::Undefined, |c| ScriptValue::string(c.to_string())),
        ScriptValue::Builtin(owner) => builtins::builtin_member(owner, property),
        _ => ScriptValue::Undefined,
    })
}

fn get_indexed(target: &ScriptValue, key: &ScriptValue) -> EvalResult<ScriptValue> {
    match (target, array_index(key)) {
        (ScriptValue::Array(items), Some(position)) => {
            Ok(items.borrow().get(position).cloned().unwrap_or(ScriptValue::Undefined))
        }
        _ => get_property(target, &key.to_display()),
    }
}

fn compare(left: &ScriptValue, right: &ScriptValue) -> Option<CmpOrdering> {
    match (left, right) {
        (ScriptValue::Str(a), ScriptValue::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

/// Name used in "is not a function" messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member { object, property } => format!("{}.{}", describe(object), property),
        _ => "expression".to_string(),
    }
}

/// Message for an uncaught `throw`
fn thrown_message(value: &ScriptValue) -> String {
    if let ScriptValue::Object(entries) = value {
        let entries = entries.borrow();
        let field = |name: &str| entries.iter().find(|(k, _)| k == name).map(|(_, v)| v.to_display());
        if let Some(message) = field("message") {
            let name = field("name").unwrap_or_else(|| "Error".to_string());
            return if message.is_empty() {
                name
            } else {
                format!("{}: {}", name, message)
            };
        }
        drop(entries);
        return value
            .to_json()
            .ok()
            .and_then(|json| serde_json::to_string(&json).ok())
            .unwrap_or_else(|| value.to_display());
    }
    value.to_display()
}
