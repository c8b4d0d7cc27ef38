//! Tree-walking evaluator.
//!
//! Name resolution consults the local/enclosing scopes, then module
//! globals, then the injected [`Capabilities`]. Nothing else is reachable.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use tracing::trace;

use crate::lang::ast::*;
use crate::lang::builtins;
use crate::lang::fault::{Fault, FaultResult};
use crate::lang::format::{format_value, percent_format};
use crate::lang::methods;
use crate::lang::scope::{Globals, Scope};
use crate::lang::value::{
    bigint_to_f64, int_to_float, BoundMethod, Dict, Function, ListCell, Range, Value,
};
use crate::sandbox::allowlist::Capabilities;
use crate::sandbox::capture::OutputStream;

/// How often (in evaluation steps) the wall-clock deadline is consulted.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Largest integer, in bits, that `*`, `**` and `<<` may produce.
const MAX_INT_BITS: u64 = 1 << 24;

/// Largest sequence that `*` repetition may produce.
const MAX_REPEAT_LEN: usize = 1 << 28;

/// Execution budget applied to one run.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_recursion_depth: usize,
    pub timeout: Option<Duration>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 1000,
            timeout: None,
        }
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Position inside something being iterated. Lists are walked by index so
/// that appends made by the loop body are observed.
pub enum Cursor {
    Range(Range, usize),
    List(Rc<ListCell>, usize),
    Items(Vec<Value>, usize),
    Iterator(Rc<RefCell<crate::lang::value::IteratorState>>),
}

impl Cursor {
    fn next_item(&mut self) -> Option<Value> {
        match self {
            Cursor::Range(range, index) => {
                if *index >= range.len() {
                    return None;
                }
                let value = range.get(*index);
                *index += 1;
                Some(Value::int(value))
            }
            Cursor::List(items, index) => {
                let value = items.borrow().get(*index).cloned();
                *index += 1;
                value
            }
            Cursor::Items(items, index) => {
                let value = items.get(*index).cloned();
                *index += 1;
                value
            }
            Cursor::Iterator(state) => state.borrow_mut().items.pop_front(),
        }
    }
}

pub struct Interpreter<'a> {
    capabilities: &'a Capabilities,
    stdout: OutputStream,
    limits: Limits,
    deadline: Option<Instant>,
    globals: Globals,
    depth: usize,
    steps: u64,
    handling: Vec<Fault>,
    captured: Vec<Rc<Scope>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(capabilities: &'a Capabilities, stdout: OutputStream, limits: Limits) -> Self {
        let deadline = limits.timeout.map(|t| Instant::now() + t);
        Self {
            capabilities,
            stdout,
            limits,
            deadline,
            globals: Globals::default(),
            depth: 0,
            steps: 0,
            handling: Vec::new(),
            captured: Vec::new(),
        }
    }

    pub fn run(&mut self, program: &Program) -> FaultResult<()> {
        match self.exec_block(&program.body, None)? {
            Flow::Normal | Flow::Return(_) => Ok(()),
            // The parser rejects break/continue outside loops.
            Flow::Break | Flow::Continue => Ok(()),
        }
    }

    pub fn write_stdout(&self, text: &str) -> FaultResult<()> {
        self.stdout
            .write_str(text)
            .map_err(|e| Fault::runtime("OSError", e.to_string()))
    }

    fn tick(&mut self) -> FaultResult<()> {
        self.steps += 1;
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    let seconds = self.limits.timeout.map(|t| t.as_secs()).unwrap_or(0);
                    return Err(Fault::timeout(seconds));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn lookup(&self, name: &str, scope: Option<&Rc<Scope>>) -> FaultResult<Value> {
        let mut current = scope;
        let mut innermost = true;
        while let Some(frame) = current {
            if frame.def.is_some() {
                if frame.declares_global(name) {
                    break;
                }
                if !frame.declares_nonlocal(name) && frame.declares_local(name) {
                    return frame.get(name).ok_or_else(|| {
                        if innermost {
                            Fault::unbound_local(name)
                        } else {
                            Fault::resolution(
                                "NameError",
                                format!(
                                    "cannot access free variable '{}' where it is not associated with a value in enclosing scope",
                                    name
                                ),
                            )
                        }
                    });
                }
                innermost = false;
            } else if let Some(value) = frame.get(name) {
                return Ok(value);
            }
            current = frame.parent.as_ref();
        }

        if let Some(value) = self.globals.get(name) {
            return Ok(value);
        }
        if let Some(builtin) = self.capabilities.resolve(name) {
            return Ok(Value::Builtin(builtin));
        }
        Err(Fault::name_error(name))
    }

    fn store(&mut self, name: &str, value: Value, scope: Option<&Rc<Scope>>) -> FaultResult<()> {
        let Some(frame) = scope else {
            self.globals.set(name, value);
            return Ok(());
        };
        if frame.def.is_none() || (!frame.declares_global(name) && !frame.declares_nonlocal(name))
        {
            frame.set(name, value);
            return Ok(());
        }
        if frame.declares_global(name) {
            self.globals.set(name, value);
            return Ok(());
        }
        let owner = Self::nonlocal_owner(frame, name)?;
        owner.set(name, value);
        Ok(())
    }

    fn nonlocal_owner<'s>(frame: &'s Rc<Scope>, name: &str) -> FaultResult<&'s Rc<Scope>> {
        let mut current = frame.parent.as_ref();
        while let Some(parent) = current {
            if parent.def.is_some() && parent.declares_local(name) {
                return Ok(parent);
            }
            current = parent.parent.as_ref();
        }
        Err(Fault::resolution(
            "NameError",
            format!("no binding for nonlocal '{}' found", name),
        ))
    }

    fn delete_name(&mut self, name: &str, scope: Option<&Rc<Scope>>) -> FaultResult<()> {
        let removed = match scope {
            None => self.globals.remove(name),
            Some(frame) if frame.declares_global(name) => self.globals.remove(name),
            Some(frame) if frame.declares_nonlocal(name) => {
                Self::nonlocal_owner(frame, name)?.remove(name)
            }
            Some(frame) => frame.remove(name),
        };
        match removed {
            Some(_) => Ok(()),
            None if scope.is_some_and(|f| f.def.is_some() && f.declares_local(name)) => {
                Err(Fault::unbound_local(name))
            }
            None => Err(Fault::name_error(name)),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], scope: Option<&Rc<Scope>>) -> FaultResult<Flow> {
        for stmt in body {
            let flow = self
                .exec_stmt(stmt, scope)
                .map_err(|fault| fault.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: Option<&Rc<Scope>>) -> FaultResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign(targets, value) => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign(target, op, value) => self.aug_assign(target, *op, value, scope)?,
            StmtKind::If(test, body, orelse) => {
                let branch = if self.eval(test, scope)?.truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, scope);
            }
            StmtKind::While(test, body, orelse) => {
                loop {
                    self.tick()?;
                    if !self.eval(test, scope)?.truthy() {
                        return self.exec_block(orelse, scope);
                    }
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For(target, iter, body, orelse) => {
                let iterable = self.eval(iter, scope)?;
                let mut cursor = self.cursor(&iterable)?;
                loop {
                    self.tick()?;
                    let Some(item) = cursor.next_item() else {
                        return self.exec_block(orelse, scope);
                    };
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass | StmtKind::Global(_) | StmtKind::Nonlocal(_) => {}
            StmtKind::FunctionDef(def) => {
                let function = self.make_function(def, scope)?;
                self.store(&def.name, function, scope)?;
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Assert(test, message) => {
                if !self.eval(test, scope)?.truthy() {
                    let message = match message {
                        Some(expr) => self.eval(expr, scope)?.to_str()?,
                        None => String::new(),
                    };
                    return Err(Fault::runtime("AssertionError", message));
                }
            }
            StmtKind::Raise(None) => {
                return Err(self.handling.last().cloned().unwrap_or_else(|| {
                    Fault::runtime("RuntimeError", "No active exception to reraise")
                }));
            }
            StmtKind::Raise(Some(expr)) => {
                // No exception classes are reachable, so whatever the
                // expression produces is not raisable.
                self.eval(expr, scope)?;
                return Err(Fault::type_error(
                    "exceptions must derive from BaseException",
                ));
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, scope),
            StmtKind::Import(module) => {
                trace!(module = %module, "Blocked import");
                return Err(Fault::import_error("__import__ not found"));
            }
            StmtKind::ClassDef(_) => {
                return Err(Fault::resolution("NameError", "__build_class__ not found"));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        scope: Option<&Rc<Scope>>,
    ) -> FaultResult<Flow> {
        let mut outcome = match self.exec_block(body, scope) {
            Ok(Flow::Normal) => self.exec_block(orelse, scope),
            Ok(flow) => Ok(flow),
            Err(fault) if fault.is_catchable() && !handlers.is_empty() => {
                self.handle(fault, handlers, scope)
            }
            Err(fault) => Err(fault),
        };

        if !finalbody.is_empty() {
            // A timeout must not be swallowed by the finally clause either.
            if let Err(fault) = &outcome {
                if !fault.is_catchable() {
                    return outcome;
                }
            }
            match self.exec_block(finalbody, scope)? {
                Flow::Normal => {}
                flow => outcome = Ok(flow),
            }
        }
        outcome
    }

    /// Every handler either catches (bare `except:`) or faults while
    /// evaluating its class expression, so only the first one is consulted.
    fn handle(
        &mut self,
        fault: Fault,
        handlers: &[ExceptHandler],
        scope: Option<&Rc<Scope>>,
    ) -> FaultResult<Flow> {
        let Some(handler) = handlers.first() else {
            return Err(fault);
        };
        if let Some(kind) = &handler.kind {
            let kind = self
                .eval(kind, scope)
                .map_err(|f| f.at_line(handler.line))?;
            return Err(Fault::type_error(format!(
                "catching classes that do not inherit from BaseException is not allowed (got '{}')",
                kind.type_name()
            ))
            .at_line(handler.line));
        }
        self.handling.push(fault);
        let result = self.exec_block(&handler.body, scope);
        self.handling.pop();
        result
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>, scope: Option<&Rc<Scope>>) -> FaultResult<Value> {
        let mut defaults = Vec::new();
        for param in &def.params {
            if let Some(default) = &param.default {
                defaults.push(self.eval(default, scope)?);
            }
        }
        let closure = scope.cloned();
        if let Some(frame) = &closure {
            self.captured.push(frame.clone());
        }
        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            closure,
        })))
    }

    // ------------------------------------------------------------------
    // Assignment targets
    // ------------------------------------------------------------------

    fn assign(&mut self, target: &Expr, value: Value, scope: Option<&Rc<Scope>>) -> FaultResult<()> {
        match &target.kind {
            ExprKind::Name(name) => self.store(name, value, scope),
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                self.unpack(targets, value, scope)
            }
            ExprKind::Subscript(object, index) => {
                let object = self.eval(object, scope)?;
                if let ExprKind::Slice(lower, upper, step) = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, scope)?;
                    return self.set_slice(&object, bounds, value);
                }
                let index = self.eval(index, scope)?;
                self.set_item(&object, index, value)
            }
            ExprKind::Attribute(object, attr) => {
                let object = self.eval(object, scope)?;
                Err(Fault::attribute_error(object.type_name(), attr))
            }
            ExprKind::Starred(inner) => self.assign(inner, value, scope),
            _ => Err(Fault::syntax("cannot assign to expression", target.line)),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value, scope: Option<&Rc<Scope>>) -> FaultResult<()> {
        let items = self.iterate(&value).map_err(|fault| {
            if fault.exception == "TypeError" {
                Fault::type_error(format!(
                    "cannot unpack non-iterable {} object",
                    value.type_name()
                ))
            } else {
                fault
            }
        })?;

        let star = targets
            .iter()
            .position(|t| matches!(t.kind, ExprKind::Starred(_)));
        match star {
            None => {
                if items.len() > targets.len() {
                    return Err(Fault::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                if items.len() < targets.len() {
                    return Err(Fault::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
            }
            Some(star) => {
                let after = targets.len() - star - 1;
                if items.len() < targets.len() - 1 {
                    return Err(Fault::value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        targets.len() - 1,
                        items.len()
                    )));
                }
                let mut items = items;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(star);
                for (target, item) in targets[..star].iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
                self.assign(&targets[star], Value::list(middle), scope)?;
                for (target, item) in targets[star + 1..].iter().zip(tail) {
                    self.assign(target, item, scope)?;
                }
            }
        }
        Ok(())
    }

    fn aug_assign(
        &mut self,
        target: &Expr,
        op: BinOp,
        value: &Expr,
        scope: Option<&Rc<Scope>>,
    ) -> FaultResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                let current = self.lookup(name, scope)?;
                let rhs = self.eval(value, scope)?;
                let result = self.inplace_op(op, current, rhs)?;
                self.store(name, result, scope)
            }
            ExprKind::Subscript(object, index) => {
                let object = self.eval(object, scope)?;
                if matches!(index.kind, ExprKind::Slice(..)) {
                    return Err(Fault::type_error(
                        "augmented assignment to a slice is not supported",
                    ));
                }
                let index = self.eval(index, scope)?;
                let current = self.get_item(&object, &index)?;
                let rhs = self.eval(value, scope)?;
                let result = self.inplace_op(op, current, rhs)?;
                self.set_item(&object, index, result)
            }
            ExprKind::Attribute(object, attr) => {
                let object = self.eval(object, scope)?;
                Err(Fault::attribute_error(object.type_name(), attr))
            }
            _ => Err(Fault::syntax(
                "illegal expression for augmented assignment",
                target.line,
            )),
        }
    }

    /// `+=` on a list extends it in place; everything else rebinds.
    fn inplace_op(&mut self, op: BinOp, current: Value, rhs: Value) -> FaultResult<Value> {
        if let (BinOp::Add, Value::List(items)) = (op, &current) {
            let extra = self.iterate(&rhs)?;
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
        self.binary_op(op, &current, &rhs)
    }

    fn delete(&mut self, target: &Expr, scope: Option<&Rc<Scope>>) -> FaultResult<()> {
        match &target.kind {
            ExprKind::Name(name) => self.delete_name(name, scope),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                items.iter().try_for_each(|item| self.delete(item, scope))
            }
            ExprKind::Subscript(object, index) => {
                let object = self.eval(object, scope)?;
                if let ExprKind::Slice(lower, upper, step) = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, scope)?;
                    return self.delete_slice(&object, bounds);
                }
                let index = self.eval(index, scope)?;
                self.delete_item(&object, &index)
            }
            ExprKind::Attribute(object, attr) => {
                let object = self.eval(object, scope)?;
                Err(Fault::attribute_error(object.type_name(), attr))
            }
            _ => Err(Fault::syntax("cannot delete expression", target.line)),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr, scope: Option<&Rc<Scope>>) -> FaultResult<Value> {
        match &expr.kind {
            ExprKind::None => Ok(Value::None),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(i) => Ok(Value::Int(i.clone())),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::str(s)),
            ExprKind::FString(parts) => Ok(Value::str(self.fstring(parts, scope)?)),
            ExprKind::Name(name) => self.lookup(name, scope),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_items(items, scope)?)),
            ExprKind::List(items) => Ok(Value::list(self.eval_items(items, scope)?)),
            ExprKind::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            ExprKind::ListComp(element, generators) => {
                let frame = Scope::comprehension(scope.cloned());
                let mut out = Vec::new();
                self.comprehend(generators, &frame, &mut |interp, frame| {
                    out.push(interp.eval(element, Some(frame))?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            ExprKind::DictComp(key, value, generators) => {
                let frame = Scope::comprehension(scope.cloned());
                let mut dict = Dict::new();
                self.comprehend(generators, &frame, &mut |interp, frame| {
                    let k = interp.eval(key, Some(frame))?;
                    let v = interp.eval(value, Some(frame))?;
                    dict.insert(k, v)
                })?;
                Ok(Value::dict(dict))
            }
            ExprKind::Starred(_) => Err(Fault::syntax(
                "can't use starred expression here",
                expr.line,
            )),
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand, scope)?;
                unary_op(*op, &value)
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary_op(*op, &left, &right)
            }
            ExprKind::BoolAnd(left, right) => {
                let left = self.eval(left, scope)?;
                if !left.truthy() {
                    return Ok(left);
                }
                self.eval(right, scope)
            }
            ExprKind::BoolOr(left, right) => {
                let left = self.eval(left, scope)?;
                if left.truthy() {
                    return Ok(left);
                }
                self.eval(right, scope)
            }
            ExprKind::Compare(first, rest) => {
                let mut left = self.eval(first, scope)?;
                for (op, right) in rest {
                    let right = self.eval(right, scope)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            ExprKind::Call(func, args) => {
                let func = self.eval(func, scope)?;
                let mut positional = Vec::new();
                let mut keywords = Vec::new();
                for arg in args {
                    match arg {
                        Arg::Positional(expr) => positional.push(self.eval(expr, scope)?),
                        Arg::Starred(expr) => {
                            let value = self.eval(expr, scope)?;
                            positional.extend(self.iterate(&value)?);
                        }
                        Arg::Keyword(name, expr) => {
                            let value = self.eval(expr, scope)?;
                            if keywords.iter().any(|(n, _): &(String, Value)| n == name) {
                                return Err(Fault::syntax(
                                    format!("keyword argument repeated: {}", name),
                                    expr.line,
                                ));
                            }
                            keywords.push((name.clone(), value));
                        }
                    }
                }
                self.call_value(&func, positional, keywords)
            }
            ExprKind::Attribute(object, attr) => {
                let object = self.eval(object, scope)?;
                self.get_attribute(object, attr)
            }
            ExprKind::Subscript(object, index) => {
                let object = self.eval(object, scope)?;
                if let ExprKind::Slice(lower, upper, step) = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, scope)?;
                    return get_slice(&object, bounds);
                }
                let index = self.eval(index, scope)?;
                self.get_item(&object, &index)
            }
            ExprKind::Slice(..) => Err(Fault::syntax("invalid syntax", expr.line)),
            ExprKind::Lambda(def) => self.make_function(def, scope),
        }
    }

    fn eval_items(&mut self, items: &[Expr], scope: Option<&Rc<Scope>>) -> FaultResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let ExprKind::Starred(inner) = &item.kind {
                let value = self.eval(inner, scope)?;
                out.extend(self.iterate(&value)?);
            } else {
                out.push(self.eval(item, scope)?);
            }
        }
        Ok(out)
    }

    fn comprehend(
        &mut self,
        generators: &[Comprehension],
        frame: &Rc<Scope>,
        emit: &mut dyn FnMut(&mut Self, &Rc<Scope>) -> FaultResult<()>,
    ) -> FaultResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self, frame);
        };
        let iterable = self.eval(&first.iter, Some(frame))?;
        let mut cursor = self.cursor(&iterable)?;
        'items: while let Some(item) = cursor.next_item() {
            self.tick()?;
            self.assign(&first.target, item, Some(frame))?;
            for condition in &first.conditions {
                if !self.eval(condition, Some(frame))?.truthy() {
                    continue 'items;
                }
            }
            self.comprehend(rest, frame, emit)?;
        }
        Ok(())
    }

    fn fstring(&mut self, parts: &[FStringPart], scope: Option<&Rc<Scope>>) -> FaultResult<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field {
                    expr,
                    conversion,
                    spec,
                } => {
                    let mut value = self.eval(expr, scope)?;
                    match conversion {
                        Some('r') | Some('a') => value = Value::str(value.repr()?),
                        Some('s') => value = Value::str(value.to_str()?),
                        _ => {}
                    }
                    let spec = self.fstring(spec, scope)?;
                    out.push_str(&format_value(&value, &spec)?);
                }
            }
        }
        Ok(out)
    }

    fn get_attribute(&self, object: Value, attr: &str) -> FaultResult<Value> {
        match methods::lookup(&object, attr) {
            Some(name) => Ok(Value::Method(Rc::new(BoundMethod {
                receiver: object,
                name,
            }))),
            None => Err(Fault::attribute_error(object.type_name(), attr)),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn call_value(
        &mut self,
        func: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> FaultResult<Value> {
        match func {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(builtin) => builtins::call(self, *builtin, args, kwargs),
            Value::Method(method) => {
                methods::call(self, &method.receiver, method.name, args, kwargs)
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> FaultResult<Value> {
        self.tick()?;
        if self.depth >= self.limits.max_recursion_depth {
            return Err(Fault::recursion());
        }

        let def = function.def.clone();
        let frame = Scope::function(def.clone(), function.closure.clone());
        self.bind_arguments(function, &frame, args, kwargs)?;

        self.depth += 1;
        let result = self.exec_block(&def.body, Some(&frame));
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn bind_arguments(
        &self,
        function: &Function,
        frame: &Rc<Scope>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> FaultResult<()> {
        let def = &function.def;
        let params = &def.params;
        let name = &def.name;
        let mut bound: Vec<Option<Value>> = vec![None; params.len()];

        let mut args = args.into_iter();
        for slot in bound.iter_mut() {
            match args.next() {
                Some(value) => *slot = Some(value),
                None => break,
            }
        }
        let extra: Vec<Value> = args.collect();
        match &def.vararg {
            Some(vararg) => frame.set(vararg, Value::tuple(extra)),
            None if !extra.is_empty() => {
                let given = params.len() + extra.len();
                return Err(Fault::type_error(format!(
                    "{}() takes {} positional argument{} but {} were given",
                    name,
                    params.len(),
                    if params.len() == 1 { "" } else { "s" },
                    given
                )));
            }
            None => {}
        }

        for (key, value) in kwargs {
            let Some(index) = params.iter().position(|p| p.name == key) else {
                return Err(Fault::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                )));
            };
            if bound[index].is_some() {
                return Err(Fault::type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    name, key
                )));
            }
            bound[index] = Some(value);
        }

        let first_default = params.len() - function.defaults.len();
        let mut missing = Vec::new();
        for (index, (param, slot)) in params.iter().zip(bound).enumerate() {
            let value = match slot {
                Some(value) => value,
                None if index >= first_default => function.defaults[index - first_default].clone(),
                None => {
                    missing.push(format!("'{}'", param.name));
                    continue;
                }
            };
            frame.set(&param.name, value);
        }

        let count = missing.len();
        if let Some(last) = missing.pop() {
            let list = match missing.len() {
                0 => last,
                1 => format!("{} and {}", missing[0], last),
                _ => format!("{}, and {}", missing.join(", "), last),
            };
            return Err(Fault::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                name,
                count,
                if count == 1 { "" } else { "s" },
                list
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    pub fn cursor(&self, value: &Value) -> FaultResult<Cursor> {
        Ok(match value {
            Value::Range(range) => Cursor::Range(*range, 0),
            Value::List(items) => Cursor::List(items.clone(), 0),
            Value::Tuple(items) => Cursor::Items(items.to_vec(), 0),
            Value::Str(s) => Cursor::Items(s.chars().map(|c| Value::str(c.to_string())).collect(), 0),
            Value::Dict(dict) => Cursor::Items(dict.borrow().keys(), 0),
            Value::Iterator(state) => Cursor::Iterator(state.clone()),
            other => {
                return Err(Fault::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        })
    }

    /// Drains an iterable into a vector.
    pub fn iterate(&mut self, value: &Value) -> FaultResult<Vec<Value>> {
        if let Value::List(items) = value {
            return Ok(items.borrow().clone());
        }
        let mut cursor = self.cursor(value)?;
        let mut out = Vec::new();
        while let Some(item) = cursor.next_item() {
            self.tick()?;
            out.push(item);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    pub fn binary_op(&mut self, op: BinOp, left: &Value, right: &Value) -> FaultResult<Value> {
        if let (Some(a), Some(b)) = (left.as_bigint(), right.as_bigint()) {
            if let Some(result) = int_binary(op, &a, &b, left, right)? {
                return Ok(result);
            }
        }
        if left.is_number() && right.is_number() {
            if let Some(result) = float_binary(op, left, right)? {
                return Ok(result);
            }
        }

        match (op, left, right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                let mut out = String::with_capacity(a.len() + b.len());
                out.push_str(a);
                out.push_str(b);
                Ok(Value::str(out))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut out = a.borrow().clone();
                out.extend(b.borrow().iter().cloned());
                Ok(Value::list(out))
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                let mut out = a.to_vec();
                out.extend(b.iter().cloned());
                Ok(Value::tuple(out))
            }
            (BinOp::Add, Value::Str(_), other) => Err(Fault::type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            ))),
            (BinOp::Add, Value::List(_), other) => Err(Fault::type_error(format!(
                "can only concatenate list (not \"{}\") to list",
                other.type_name()
            ))),
            (BinOp::Add, Value::Tuple(_), other) => Err(Fault::type_error(format!(
                "can only concatenate tuple (not \"{}\") to tuple",
                other.type_name()
            ))),
            (BinOp::Mul, seq, n) | (BinOp::Mul, n, seq)
                if n.is_int() && matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
            {
                repeat(seq, n.as_int().unwrap_or(0))
            }
            (BinOp::Mod, Value::Str(format), args) => {
                let args = match args {
                    Value::Tuple(items) => items.to_vec(),
                    other => vec![other.clone()],
                };
                Ok(Value::str(percent_format(format, &args)?))
            }
            (op, a, b) => Err(Fault::type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> FaultResult<bool> {
        match op {
            CmpOp::Eq => left.equals(right),
            CmpOp::NotEq => Ok(!left.equals(right)?),
            CmpOp::Is => Ok(left.is(right)),
            CmpOp::IsNot => Ok(!left.is(right)),
            CmpOp::In => self.contains(right, left),
            CmpOp::NotIn => Ok(!self.contains(right, left)?),
            CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
                if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
                    if a.is_nan() || b.is_nan() {
                        return Ok(false);
                    }
                }
                let ordering = left.compare_op(right, op.symbol())?;
                Ok(match op {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::LtE => ordering.is_le(),
                    CmpOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }

    pub fn contains(&mut self, container: &Value, item: &Value) -> FaultResult<bool> {
        match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(&**needle)),
                other => Err(Fault::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::Dict(dict) => dict.borrow().contains(item),
            Value::Range(range) => {
                let n = match item {
                    Value::Float(f) if f.fract() == 0.0 => BigInt::from_f64(*f),
                    other => other.as_bigint(),
                };
                Ok(n.is_some_and(|n| range.contains(&n)))
            }
            Value::List(_) | Value::Tuple(_) | Value::Iterator(_) => {
                let mut cursor = self.cursor(container)?;
                while let Some(candidate) = cursor.next_item() {
                    self.tick()?;
                    if candidate.is(item) || candidate.equals(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(Fault::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Subscripts
    // ------------------------------------------------------------------

    pub fn get_item(&self, object: &Value, index: &Value) -> FaultResult<Value> {
        match object {
            Value::List(items) => {
                let items = items.borrow();
                let i = sequence_index(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = sequence_index(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = sequence_index(index, chars.len(), "string")?;
                Ok(Value::str(chars[i].to_string()))
            }
            Value::Range(range) => {
                let i = sequence_index(index, range.len(), "range object")?;
                Ok(Value::int(range.get(i)))
            }
            Value::Dict(dict) => match dict.borrow().get(index)? {
                Some(value) => Ok(value),
                None => Err(Fault::key_error(index.repr()?)),
            },
            other => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn set_item(&self, object: &Value, index: Value, value: Value) -> FaultResult<()> {
        match object {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let i = sequence_index(&index, len, "list assignment")?;
                items[i] = value;
                Ok(())
            }
            Value::Dict(dict) => dict.borrow_mut().insert(index, value),
            other => Err(Fault::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn delete_item(&self, object: &Value, index: &Value) -> FaultResult<()> {
        match object {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let i = sequence_index(index, len, "list assignment")?;
                items.remove(i);
                Ok(())
            }
            Value::Dict(dict) => match dict.borrow_mut().remove(index)? {
                Some(_) => Ok(()),
                None => Err(Fault::key_error(index.repr()?)),
            },
            other => Err(Fault::type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }

    fn slice_bounds(
        &mut self,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
        scope: Option<&Rc<Scope>>,
    ) -> FaultResult<SliceBounds> {
        let mut bound = |expr: &Option<Box<Expr>>| -> FaultResult<Option<i64>> {
            match expr {
                None => Ok(None),
                Some(expr) => match self.eval(expr, scope)? {
                    Value::None => Ok(None),
                    value => value.as_int().map(Some).ok_or_else(|| {
                        Fault::type_error(
                            "slice indices must be integers or None or have an __index__ method",
                        )
                    }),
                },
            }
        };
        let lower = bound(lower)?;
        let upper = bound(upper)?;
        let step = bound(step)?;
        if step == Some(0) {
            return Err(Fault::value_error("slice step cannot be zero"));
        }
        Ok(SliceBounds { lower, upper, step })
    }

    fn set_slice(&mut self, object: &Value, bounds: SliceBounds, value: Value) -> FaultResult<()> {
        let Value::List(items) = object else {
            return Err(Fault::type_error(format!(
                "'{}' object does not support item assignment",
                object.type_name()
            )));
        };
        let replacement = self.iterate(&value).map_err(|_| {
            Fault::type_error("must assign iterable to extended slice")
        })?;
        let mut items = items.borrow_mut();
        let indices = bounds.indices(items.len());

        if bounds.step.unwrap_or(1) == 1 {
            let start = indices.first().copied().unwrap_or_else(|| {
                bounds.resolve_start(items.len())
            });
            let end = start + indices.len();
            items.splice(start..end, replacement).for_each(drop);
            return Ok(());
        }

        if replacement.len() != indices.len() {
            return Err(Fault::value_error(format!(
                "attempt to assign sequence of size {} to extended slice of size {}",
                replacement.len(),
                indices.len()
            )));
        }
        for (i, value) in indices.into_iter().zip(replacement) {
            items[i] = value;
        }
        Ok(())
    }

    fn delete_slice(&self, object: &Value, bounds: SliceBounds) -> FaultResult<()> {
        let Value::List(items) = object else {
            return Err(Fault::type_error(format!(
                "'{}' object doesn't support item deletion",
                object.type_name()
            )));
        };
        let mut items = items.borrow_mut();
        let mut indices = bounds.indices(items.len());
        indices.sort_unstable();
        for i in indices.into_iter().rev() {
            items.remove(i);
        }
        Ok(())
    }
}

impl Drop for Interpreter<'_> {
    /// Closures hold their defining frame and frames hold the closures, so
    /// the cycles are cut explicitly.
    fn drop(&mut self) {
        for frame in self.captured.drain(..) {
            frame.clear();
        }
        self.globals.clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SliceBounds {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

impl SliceBounds {
    fn resolve_start(&self, len: usize) -> usize {
        let len = len as i64;
        match self.lower {
            None => 0,
            Some(i) if i < 0 => (i + len).max(0) as usize,
            Some(i) => i.min(len) as usize,
        }
    }

    /// Concrete element positions selected by the slice.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        let clamp = |value: Option<i64>, default: i64, low: i64, high: i64| match value {
            None => default,
            Some(i) if i < 0 => (i + len).max(low),
            Some(i) => i.min(high),
        };

        let mut out = Vec::new();
        if step > 0 {
            let start = clamp(self.lower, 0, 0, len);
            let stop = clamp(self.upper, len, 0, len);
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        } else {
            let start = clamp(self.lower, len - 1, -1, len - 1);
            let stop = clamp(self.upper, -1, -1, len - 1);
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        }
        out
    }
}

fn get_slice(object: &Value, bounds: SliceBounds) -> FaultResult<Value> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            let picked = bounds.indices(items.len()).into_iter().map(|i| items[i].clone());
            Ok(Value::list(picked.collect()))
        }
        Value::Tuple(items) => {
            let picked = bounds.indices(items.len()).into_iter().map(|i| items[i].clone());
            Ok(Value::tuple(picked.collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String = bounds.indices(chars.len()).into_iter().map(|i| chars[i]).collect();
            Ok(Value::str(picked))
        }
        Value::Range(range) => slice_range(range, bounds).map(Value::Range),
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Slices a range arithmetically, without visiting its elements.
fn slice_range(range: &Range, bounds: SliceBounds) -> FaultResult<Range> {
    let len = range.length() as i128;
    let step = bounds.step.unwrap_or(1) as i128;
    let adjust = |value: Option<i64>, default: i128| -> i128 {
        let (low, high) = if step > 0 { (0, len) } else { (-1, len - 1) };
        match value {
            None => default,
            Some(i) if i < 0 => (i as i128 + len).max(low),
            Some(i) => (i as i128).min(high),
        }
    };
    let (start, stop) = if step > 0 {
        (adjust(bounds.lower, 0), adjust(bounds.upper, len))
    } else {
        (adjust(bounds.lower, len - 1), adjust(bounds.upper, -1))
    };
    let fit = |n: i128| {
        i64::try_from(n).map_err(|_| Fault::overflow("Python int too large to convert to C ssize_t"))
    };
    Ok(Range {
        start: fit(range.start as i128 + start * range.step as i128)?,
        stop: fit(range.start as i128 + stop * range.step as i128)?,
        step: fit(range.step as i128 * step)?,
    })
}

fn sequence_index(index: &Value, len: usize, what: &str) -> FaultResult<usize> {
    let Some(i) = index.as_int() else {
        let noun = match what {
            "string" => "string indices must be integers".to_string(),
            "list assignment" => format!(
                "list indices must be integers or slices, not {}",
                index.type_name()
            ),
            other => format!(
                "{} indices must be integers or slices, not {}",
                other,
                index.type_name()
            ),
        };
        return Err(Fault::type_error(noun));
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Fault::index_error(format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

fn too_large() -> Fault {
    Fault::memory_error()
}

/// Floor division and modulo together; both round toward negative infinity.
fn floor_div_mod(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    let (mut q, mut r) = (a / b, a % b);
    if !r.is_zero() && r.is_negative() != b.is_negative() {
        q -= BigInt::from(1);
        r += b;
    }
    (q, r)
}

/// `int / int`, scaled so that operands beyond the float range still divide.
fn int_true_divide(a: &BigInt, b: &BigInt) -> FaultResult<f64> {
    if a.bits() <= 53 && b.bits() <= 53 {
        return Ok(bigint_to_f64(a) / bigint_to_f64(b));
    }
    let shift = a.bits() as i64 - b.bits() as i64 - 64;
    let scaled = if shift > 0 {
        a / (b << shift as usize)
    } else {
        (a << shift.unsigned_abs() as usize) / b
    };
    let half = (shift / 2) as i32;
    let value = bigint_to_f64(&scaled) * 2f64.powi(half) * 2f64.powi(shift as i32 - half);
    if value.is_infinite() {
        return Err(Fault::overflow("integer division result too large for a float"));
    }
    Ok(value)
}

/// Integer arithmetic with Python floor semantics. Results are unbounded
/// apart from the `MAX_INT_BITS` ceiling on growth operators.
fn int_binary(
    op: BinOp,
    a: &BigInt,
    b: &BigInt,
    left: &Value,
    right: &Value,
) -> FaultResult<Option<Value>> {
    let both_bool = matches!((left, right), (Value::Bool(_), Value::Bool(_)));
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => {
            if a.bits() + b.bits() > MAX_INT_BITS {
                return Err(too_large());
            }
            a * b
        }
        BinOp::Div => {
            if b.is_zero() {
                return Err(Fault::zero_division("division by zero"));
            }
            return int_true_divide(a, b).map(|f| Some(Value::Float(f)));
        }
        BinOp::FloorDiv => {
            if b.is_zero() {
                return Err(Fault::zero_division("integer division or modulo by zero"));
            }
            floor_div_mod(a, b).0
        }
        BinOp::Mod => {
            if b.is_zero() {
                return Err(Fault::zero_division("integer modulo by zero"));
            }
            floor_div_mod(a, b).1
        }
        BinOp::Pow => {
            if b.is_negative() {
                if a.is_zero() {
                    return Err(Fault::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                let base = int_to_float(a)?;
                return Ok(Some(Value::Float(base.powf(bigint_to_f64(b)))));
            }
            int_pow(a, b)?
        }
        BinOp::BitAnd if both_bool => return Ok(Some(Value::Bool(!(a & b).is_zero()))),
        BinOp::BitOr if both_bool => return Ok(Some(Value::Bool(!(a | b).is_zero()))),
        BinOp::BitXor if both_bool => return Ok(Some(Value::Bool(!(a ^ b).is_zero()))),
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::LShift => {
            if b.is_negative() {
                return Err(Fault::value_error("negative shift count"));
            }
            if a.is_zero() {
                BigInt::zero()
            } else {
                let count = b
                    .to_u64()
                    .filter(|n| a.bits().saturating_add(*n) <= MAX_INT_BITS)
                    .ok_or_else(too_large)?;
                a << count as usize
            }
        }
        BinOp::RShift => {
            if b.is_negative() {
                return Err(Fault::value_error("negative shift count"));
            }
            match b.to_u64().filter(|n| *n < a.bits()) {
                Some(count) => a >> count as usize,
                None if a.is_negative() => BigInt::from(-1),
                None => BigInt::zero(),
            }
        }
    };
    Ok(Some(Value::Int(result)))
}

fn int_pow(base: &BigInt, exponent: &BigInt) -> FaultResult<BigInt> {
    let one = BigInt::from(1);
    if exponent.is_zero() || *base == one {
        return Ok(one);
    }
    if base.is_zero() {
        return Ok(BigInt::zero());
    }
    if *base == -one.clone() {
        let even = (exponent % BigInt::from(2)).is_zero();
        return Ok(if even { one } else { -one });
    }
    let exponent = exponent
        .to_u32()
        .filter(|e| (base.bits() - 1).saturating_mul(u64::from(*e)) <= MAX_INT_BITS)
        .ok_or_else(too_large)?;
    Ok(base.pow(exponent))
}

fn float_binary(op: BinOp, left: &Value, right: &Value) -> FaultResult<Option<Value>> {
    let operand = |value: &Value| match value {
        Value::Int(i) => int_to_float(i).map(Some),
        other => Ok(other.as_float()),
    };
    let (Some(a), Some(b)) = (operand(left)?, operand(right)?) else {
        return Ok(None);
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Fault::zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(Fault::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Fault::zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(Fault::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(Fault::value_error("math domain error"));
            }
            let r = a.powf(b);
            if r.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(Fault::overflow("(34, 'Numerical result out of range')"));
            }
            r
        }
        _ => return Ok(None),
    };
    Ok(Some(Value::Float(result)))
}

fn unary_op(op: UnaryOp, value: &Value) -> FaultResult<Value> {
    let bad = || {
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not",
        };
        Fault::type_error(format!(
            "bad operand type for unary {}: '{}'",
            symbol,
            value.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
        UnaryOp::Neg => match value {
            Value::Float(f) => Ok(Value::Float(-f)),
            v => v.as_bigint().map(|i| Value::Int(-i)).ok_or_else(bad),
        },
        UnaryOp::Pos => match value {
            Value::Float(f) => Ok(Value::Float(*f)),
            v => v.as_bigint().map(Value::Int).ok_or_else(bad),
        },
        UnaryOp::Invert => value.as_bigint().map(|i| Value::Int(!i)).ok_or_else(bad),
    }
}

fn repeat(sequence: &Value, count: i64) -> FaultResult<Value> {
    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    let total = |len: usize| {
        len.checked_mul(count)
            .filter(|total| *total <= MAX_REPEAT_LEN)
            .ok_or_else(too_large)
    };
    let repeated = |items: &[Value], total: usize| {
        if items.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(total);
        for _ in 0..count {
            out.extend(items.iter().cloned());
        }
        out
    };
    match sequence {
        Value::Str(s) => {
            total(s.len())?;
            Ok(Value::str(s.repeat(count)))
        }
        Value::List(items) => {
            let items = items.borrow();
            let total = total(items.len())?;
            Ok(Value::list(repeated(items.as_slice(), total)))
        }
        Value::Tuple(items) => {
            let total = total(items.len())?;
            Ok(Value::tuple(repeated(items.as_slice(), total)))
        }
        _ => Ok(Value::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_indices() {
        let full = SliceBounds {
            lower: None,
            upper: None,
            step: None,
        };
        assert_eq!(full.indices(3), vec![0, 1, 2]);

        let reversed = SliceBounds {
            lower: None,
            upper: None,
            step: Some(-1),
        };
        assert_eq!(reversed.indices(3), vec![2, 1, 0]);

        let middle = SliceBounds {
            lower: Some(1),
            upper: Some(-1),
            step: None,
        };
        assert_eq!(middle.indices(4), vec![1, 2]);

        let clamped = SliceBounds {
            lower: Some(-10),
            upper: Some(10),
            step: Some(2),
        };
        assert_eq!(clamped.indices(5), vec![0, 2, 4]);
    }

    fn arith(op: BinOp, a: impl Into<BigInt>, b: impl Into<BigInt>) -> FaultResult<Value> {
        let (a, b) = (Value::int(a), Value::int(b));
        let (x, y) = (a.as_bigint().unwrap(), b.as_bigint().unwrap());
        int_binary(op, &x, &y, &a, &b).map(|v| v.unwrap())
    }

    #[test]
    fn test_floor_division_and_modulo_follow_floor_semantics() {
        assert_eq!(arith(BinOp::FloorDiv, -7, 2).unwrap().repr().unwrap(), "-4");
        assert_eq!(arith(BinOp::Mod, -7, 2).unwrap().repr().unwrap(), "1");
        assert_eq!(arith(BinOp::Mod, 7, -2).unwrap().repr().unwrap(), "-1");
        assert_eq!(arith(BinOp::FloorDiv, 6, 3).unwrap().repr().unwrap(), "2");
    }

    #[test]
    fn test_int_arithmetic_grows_past_machine_words() {
        let sum = arith(BinOp::Add, i64::MAX, 1).unwrap();
        assert_eq!(sum.repr().unwrap(), "9223372036854775808");
        let power = arith(BinOp::Pow, 2, 64).unwrap();
        assert_eq!(power.repr().unwrap(), "18446744073709551616");
        let shifted = arith(BinOp::LShift, 1, 70).unwrap();
        assert_eq!(shifted.repr().unwrap(), "1180591620717411303424");
        assert_eq!(arith(BinOp::RShift, -5, 1).unwrap().repr().unwrap(), "-3");
        assert_eq!(arith(BinOp::RShift, -5, 500).unwrap().repr().unwrap(), "-1");
        assert_eq!(arith(BinOp::Pow, -1, 7).unwrap().repr().unwrap(), "-1");
    }

    #[test]
    fn test_int_growth_is_capped() {
        assert_eq!(arith(BinOp::Pow, 10, 10_000_000).unwrap_err().exception, "MemoryError");
        assert_eq!(arith(BinOp::LShift, 1, 1u64 << 40).unwrap_err().exception, "MemoryError");
        assert_eq!(arith(BinOp::Pow, 1, 1u64 << 40).unwrap().repr().unwrap(), "1");
        assert_eq!(arith(BinOp::LShift, 1, -1).unwrap_err().exception, "ValueError");
    }

    #[test]
    fn test_true_division_of_big_ints() {
        let big = BigInt::from(10).pow(400);
        let triple = &big * BigInt::from(3);
        let (a, b) = (Value::Int(triple.clone()), Value::Int(big.clone()));
        let value = int_binary(BinOp::Div, &triple, &big, &a, &b).unwrap().unwrap();
        assert!(matches!(value, Value::Float(f) if f == 3.0));
        let err = float_binary(BinOp::Add, &Value::Int(big), &Value::Float(1.0)).unwrap_err();
        assert_eq!(err.exception, "OverflowError");
    }

    #[test]
    fn test_repeat_clones_elements() {
        let inner = Value::list(vec![Value::int(1)]);
        let repeated = repeat(&Value::list(vec![inner]), 3).unwrap();
        assert_eq!(repeated.repr().unwrap(), "[[1], [1], [1]]");
        assert_eq!(repeat(&Value::str("ab"), -2).unwrap().repr().unwrap(), "''");
        assert_eq!(
            repeat(&Value::tuple(vec![Value::None]), i64::MAX).unwrap_err().exception,
            "MemoryError"
        );
    }

    #[test]
    fn test_range_slice_stays_arithmetic() {
        let wide = Range {
            start: i64::MIN,
            stop: i64::MAX,
            step: 1,
        };
        let bounds = SliceBounds {
            lower: Some(1),
            upper: None,
            step: Some(2),
        };
        let sliced = slice_range(&wide, bounds).unwrap();
        assert_eq!((sliced.start, sliced.stop, sliced.step), (i64::MIN + 1, i64::MAX, 2));

        let small = Range {
            start: 0,
            stop: 10,
            step: 1,
        };
        let reversed = SliceBounds {
            lower: None,
            upper: None,
            step: Some(-3),
        };
        let back = slice_range(&small, reversed).unwrap();
        assert_eq!((back.start, back.stop, back.step), (9, -1, -3));
        assert_eq!(back.length(), 4);
    }

    #[test]
    fn test_unary_on_string_is_type_error() {
        let err = unary_op(UnaryOp::Neg, &Value::str("x")).unwrap_err();
        assert_eq!(err.message, "bad operand type for unary -: 'str'");
    }
}
