//! Runtime values of the sandbox dialect.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use crate::lang::ast::FunctionDef;
use crate::lang::builtins::Builtin;
use crate::lang::fault::{Fault, FaultResult};
use crate::lang::format::{float_repr, int_repr, string_repr};
use crate::lang::scope::Scope;

/// Rendering, comparison and hashing recurse through containers. Past this
/// depth they raise `RecursionError` instead of growing the native stack.
pub const MAX_NESTING: usize = 1000;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(Rc<str>),
    List(Rc<ListCell>),
    Tuple(Rc<TupleItems>),
    Dict(Rc<DictCell>),
    Range(Range),
    Iterator(Rc<RefCell<IteratorState>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
}

// ----------------------------------------------------------------------
// Container payloads
// ----------------------------------------------------------------------

/// Mutable storage behind a `list`.
///
/// Dropping the last reference hands the elements to [`release`], so a list
/// nested a million levels deep is torn down without recursion.
#[derive(Debug, Default)]
pub struct ListCell(RefCell<Vec<Value>>);

impl ListCell {
    pub fn new(items: Vec<Value>) -> Self {
        Self(RefCell::new(items))
    }
}

impl Deref for ListCell {
    type Target = RefCell<Vec<Value>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for ListCell {
    fn drop(&mut self) {
        release(std::mem::take(self.0.get_mut()));
    }
}

/// Immutable storage behind a `tuple`.
#[derive(Debug, Default)]
pub struct TupleItems(Vec<Value>);

impl Deref for TupleItems {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for TupleItems {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.0));
    }
}

#[derive(Debug, Default)]
pub struct DictCell(RefCell<Dict>);

impl DictCell {
    pub fn new(dict: Dict) -> Self {
        Self(RefCell::new(dict))
    }
}

impl Deref for DictCell {
    type Target = RefCell<Dict>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for DictCell {
    fn drop(&mut self) {
        release(self.0.get_mut().drain().collect());
    }
}

/// Drops values with an explicit worklist. Containers whose last reference
/// is being released give up their elements to the worklist instead of
/// dropping them in place.
fn release(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::List(cell) => {
                if let Ok(mut cell) = Rc::try_unwrap(cell) {
                    pending.append(cell.0.get_mut());
                }
            }
            Value::Tuple(items) => {
                if let Ok(mut items) = Rc::try_unwrap(items) {
                    pending.append(&mut items.0);
                }
            }
            Value::Dict(cell) => {
                if let Ok(mut cell) = Rc::try_unwrap(cell) {
                    pending.extend(cell.0.get_mut().drain());
                }
            }
            Value::Iterator(state) => {
                if let Ok(state) = Rc::try_unwrap(state) {
                    pending.extend(state.into_inner().items);
                }
            }
            Value::Method(method) => {
                if let Ok(method) = Rc::try_unwrap(method) {
                    pending.push(method.receiver);
                }
            }
            Value::Function(function) => {
                if let Ok(function) = Rc::try_unwrap(function) {
                    pending.extend(function.defaults);
                }
            }
            _ => {}
        }
    }
}

// ----------------------------------------------------------------------
// Range
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    /// Exact element count. It can exceed `i64::MAX` for ranges spanning
    /// the whole machine integer domain.
    pub fn length(&self) -> u64 {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let span = if step > 0 {
            (stop - start + step - 1) / step
        } else {
            (start - stop - step - 1) / -step
        };
        span.max(0) as u64
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.length()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Element at `index`. Callers keep `index < len()`, so the result
    /// lies between `start` and `stop` and fits in an `i64`.
    pub fn get(&self, index: usize) -> i64 {
        let value = self.start as i128 + self.step as i128 * index as i128;
        value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn contains(&self, n: &BigInt) -> bool {
        let Some(n) = n.to_i128() else {
            return false;
        };
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let in_bounds = if step > 0 {
            n >= start && n < stop
        } else {
            n <= start && n > stop
        };
        in_bounds && (n - start) % step == 0
    }
}

/// Materialized state of a one-shot iterator such as `enumerate(...)`.
#[derive(Debug)]
pub struct IteratorState {
    pub kind: &'static str,
    pub items: VecDeque<Value>,
}

#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub defaults: Vec<Value>,
    pub closure: Option<Rc<Scope>>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: &'static str,
}

// ----------------------------------------------------------------------
// Dict
// ----------------------------------------------------------------------

/// Insertion-ordered mapping keyed by the hashable projection of a value.
#[derive(Debug, Default, Clone)]
pub struct Dict {
    entries: IndexMap<DictKey, (Value, Value)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Int(BigInt),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<DictKey>),
    Builtin(Builtin),
    Identity(usize),
}

impl DictKey {
    pub fn from_value(value: &Value) -> FaultResult<Self> {
        Self::from_value_at(value, 0)
    }

    fn from_value_at(value: &Value, depth: usize) -> FaultResult<Self> {
        if depth > MAX_NESTING {
            return Err(Fault::recursion());
        }
        Ok(match value {
            Value::None => DictKey::None,
            Value::Bool(b) => DictKey::Int(BigInt::from(u8::from(*b))),
            Value::Int(i) => DictKey::Int(i.clone()),
            // Integral floats hash like the equal int.
            Value::Float(f) => match BigInt::from_f64(*f).filter(|_| f.fract() == 0.0) {
                Some(i) => DictKey::Int(i),
                None => DictKey::Float(f.to_bits()),
            },
            Value::Str(s) => DictKey::Str(s.clone()),
            Value::Tuple(items) => DictKey::Tuple(
                items
                    .iter()
                    .map(|item| DictKey::from_value_at(item, depth + 1))
                    .collect::<FaultResult<_>>()?,
            ),
            Value::Range(r) => DictKey::Tuple(vec![
                DictKey::Str("range".into()),
                DictKey::Int(r.start.into()),
                DictKey::Int(r.stop.into()),
                DictKey::Int(r.step.into()),
            ]),
            Value::Builtin(b) => DictKey::Builtin(*b),
            Value::Function(f) => DictKey::Identity(Rc::as_ptr(f) as *const u8 as usize),
            Value::Iterator(i) => DictKey::Identity(Rc::as_ptr(i) as *const u8 as usize),
            Value::Method(m) => DictKey::Identity(Rc::as_ptr(m) as *const u8 as usize),
            Value::List(_) | Value::Dict(_) => {
                return Err(Fault::type_error(format!(
                    "unhashable type: '{}'",
                    value.type_name()
                )))
            }
        })
    }
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> FaultResult<Option<Value>> {
        let key = DictKey::from_value(key)?;
        Ok(self.entries.get(&key).map(|(_, v)| v.clone()))
    }

    pub fn contains(&self, key: &Value) -> FaultResult<bool> {
        Ok(self.entries.contains_key(&DictKey::from_value(key)?))
    }

    /// Inserting an equal key keeps the original key object, as Python does.
    pub fn insert(&mut self, key: Value, value: Value) -> FaultResult<()> {
        let hashed = DictKey::from_value(&key)?;
        match self.entries.get_mut(&hashed) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(hashed, (key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> FaultResult<Option<Value>> {
        let hashed = DictKey::from_value(key)?;
        Ok(self.entries.shift_remove(&hashed).map(|(_, v)| v))
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        self.entries.pop().map(|(_, entry)| entry)
    }

    pub fn clear(&mut self) {
        release(self.drain().collect());
    }

    /// Empties the dict, yielding every key and value.
    fn drain(&mut self) -> impl Iterator<Item = Value> + '_ {
        self.entries.drain(..).flat_map(|(_, (k, v))| [k, v])
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.values().cloned().collect()
    }
}

// ----------------------------------------------------------------------
// Value
// ----------------------------------------------------------------------

impl Value {
    pub fn int(value: impl Into<BigInt>) -> Self {
        Value::Int(value.into())
    }

    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(ListCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(TupleItems(items)))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(DictCell::new(dict)))
    }

    pub fn iterator(kind: &'static str, items: Vec<Value>) -> Self {
        Value::Iterator(Rc::new(RefCell::new(IteratorState {
            kind,
            items: items.into(),
        })))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Iterator(it) => it.borrow().kind,
            Value::Function(_) => "function",
            Value::Builtin(_) | Value::Method(_) => "builtin_function_or_method",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Range(r) => !r.is_empty(),
            _ => true,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Bool(_))
    }

    /// Integer view used by arithmetic; bools participate as ints.
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Value::Bool(b) => Some(BigInt::from(u8::from(*b))),
            Value::Int(i) => Some(i.clone()),
            _ => None,
        }
    }

    /// Machine-sized view for indices, counts and slice bounds. Integers
    /// outside the `i64` domain saturate, which keeps them out of range of
    /// any real sequence.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(i.to_i64().unwrap_or(if i.is_negative() {
                i64::MIN
            } else {
                i64::MAX
            })),
            _ => None,
        }
    }

    /// Strict machine-sized view: integers outside `i64` are an
    /// `OverflowError`.
    pub fn to_i64(&self) -> Option<FaultResult<i64>> {
        match self {
            Value::Bool(b) => Some(Ok(i64::from(*b))),
            Value::Int(i) => Some(i.to_i64().ok_or_else(|| {
                Fault::overflow("Python int too large to convert to C ssize_t")
            })),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(i) => Some(bigint_to_f64(i)),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    /// Identity comparison backing `is`.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            _ => false,
        }
    }

    pub fn equals(&self, other: &Value) -> FaultResult<bool> {
        self.equals_at(other, 0)
    }

    fn equals_at(&self, other: &Value, depth: usize) -> FaultResult<bool> {
        if depth > MAX_NESTING {
            return Err(Fault::recursion_while("in comparison"));
        }
        Ok(match (self, other) {
            (a, b) if a.is_number() && b.is_number() => {
                numeric_cmp(a, b) == Some(Ordering::Equal)
            }
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                sequences_equal(&a, &b, depth)?
            }
            (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b, depth)?,
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in a.items() {
                    match b.get(&key)? {
                        Some(other) if value.equals_at(&other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Value::Range(a), Value::Range(b)) => {
                let (la, lb) = (a.length(), b.length());
                la == lb && (la == 0 || (a.start == b.start && (la == 1 || a.step == b.step)))
            }
            (a, b) => a.is(b),
        })
    }

    /// Ordering used by `<`, `sorted`, `min` and `max`.
    pub fn compare(&self, other: &Value) -> FaultResult<Ordering> {
        self.compare_at(other, 0, "<")
    }

    pub fn compare_op(&self, other: &Value, op: &str) -> FaultResult<Ordering> {
        self.compare_at(other, 0, op)
    }

    fn compare_at(&self, other: &Value, depth: usize, op: &str) -> FaultResult<Ordering> {
        if depth > MAX_NESTING {
            return Err(Fault::recursion_while("in comparison"));
        }
        match (self, other) {
            // NaN compares false both ways; callers treat Equal as "not
            // less" which matches Python for sorting purposes.
            (a, b) if a.is_number() && b.is_number() => {
                Ok(numeric_cmp(a, b).unwrap_or(Ordering::Equal))
            }
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                compare_sequences(&a, &b, depth, op)
            }
            (Value::Tuple(a), Value::Tuple(b)) => compare_sequences(a, b, depth, op),
            (a, b) => Err(Fault::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op,
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    /// `str(value)`.
    pub fn to_str(&self) -> FaultResult<String> {
        match self {
            Value::Str(s) => Ok(s.to_string()),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> FaultResult<String> {
        let mut out = String::new();
        let mut seen = Vec::new();
        self.write_repr(&mut out, &mut seen, 0)?;
        Ok(out)
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<usize>, depth: usize) -> FaultResult<()> {
        if depth > MAX_NESTING {
            return Err(Fault::recursion_while("while getting the repr of an object"));
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&int_repr(i)?),
            Value::Float(f) => out.push_str(&float_repr(*f)),
            Value::Str(s) => out.push_str(&string_repr(s)),
            Value::List(items) => {
                let id = Rc::as_ptr(items) as *const u8 as usize;
                if seen.contains(&id) {
                    out.push_str("[...]");
                    return Ok(());
                }
                seen.push(id);
                out.push('[');
                write_items(&items.borrow(), out, seen, depth)?;
                out.push(']');
                seen.pop();
            }
            Value::Tuple(items) => {
                out.push('(');
                write_items(items, out, seen, depth)?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(dict) => {
                let id = Rc::as_ptr(dict) as *const u8 as usize;
                if seen.contains(&id) {
                    out.push_str("{...}");
                    return Ok(());
                }
                seen.push(id);
                out.push('{');
                let items = dict.borrow().items();
                for (i, (key, value)) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, seen, depth + 1)?;
                    out.push_str(": ");
                    value.write_repr(out, seen, depth + 1)?;
                }
                out.push('}');
                seen.pop();
            }
            Value::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Value::Iterator(it) => out.push_str(&format!("<{} object>", it.borrow().kind)),
            Value::Function(f) => out.push_str(&format!("<function {}>", f.def.name)),
            Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name())),
            Value::Method(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
        }
        Ok(())
    }
}

/// Converts without an overflow check; out-of-range magnitudes become
/// infinities.
pub fn bigint_to_f64(i: &BigInt) -> f64 {
    match i.to_f64() {
        Some(f) => f,
        None if i.is_negative() => f64::NEG_INFINITY,
        None => f64::INFINITY,
    }
}

/// `float(int)`: magnitudes beyond the float range are an `OverflowError`.
pub fn int_to_float(i: &BigInt) -> FaultResult<f64> {
    let f = bigint_to_f64(i);
    if f.is_finite() {
        Ok(f)
    } else {
        Err(Fault::overflow("int too large to convert to float"))
    }
}

/// Exact ordering between numbers, including int against float. `None`
/// when a NaN is involved.
pub fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Float(x), other) => other
            .as_bigint()
            .and_then(|i| int_float_cmp(&i, *x))
            .map(Ordering::reverse),
        (other, Value::Float(y)) => other.as_bigint().and_then(|i| int_float_cmp(&i, *y)),
        (x, y) => Some(x.as_bigint()?.cmp(&y.as_bigint()?)),
    }
}

fn int_float_cmp(i: &BigInt, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f.is_infinite() {
        return Some(if f > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = BigInt::from_f64(f.floor())?;
    Some(match i.cmp(&floor) {
        Ordering::Equal if f.fract() != 0.0 => Ordering::Less,
        ordering => ordering,
    })
}

fn write_items(
    items: &[Value],
    out: &mut String,
    seen: &mut Vec<usize>,
    depth: usize,
) -> FaultResult<()> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, seen, depth + 1)?;
    }
    Ok(())
}

fn sequences_equal(a: &[Value], b: &[Value], depth: usize) -> FaultResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.equals_at(y, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_sequences(a: &[Value], b: &[Value], depth: usize, op: &str) -> FaultResult<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !x.equals_at(y, depth + 1)? {
            return x.compare_at(y, depth + 1, op);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_lists(depth: usize) -> Value {
        let mut value = Value::list(vec![]);
        for _ in 0..depth {
            value = Value::list(vec![value]);
        }
        value
    }

    #[test]
    fn test_repr_of_containers() {
        let list = Value::list(vec![Value::int(1), Value::str("a"), Value::None]);
        assert_eq!(list.repr().unwrap(), "[1, 'a', None]");
        assert_eq!(Value::tuple(vec![Value::int(1)]).repr().unwrap(), "(1,)");
        assert_eq!(Value::tuple(vec![]).repr().unwrap(), "()");

        let mut dict = Dict::new();
        dict.insert(Value::str("k"), Value::Bool(true)).unwrap();
        assert_eq!(Value::dict(dict).repr().unwrap(), "{'k': True}");
    }

    #[test]
    fn test_self_referencing_list_repr() {
        let list = Value::list(vec![Value::int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr().unwrap(), "[1, [...]]");
        if let Value::List(items) = &list {
            items.borrow_mut().clear();
        }
    }

    /// Runs `f` on a thread with the same stack the sandbox worker gets.
    fn on_worker_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_deep_nesting_repr_is_recursion_error() {
        assert_eq!(nested_lists(3).repr().unwrap(), "[[[[]]]]");

        let err = on_worker_stack(|| nested_lists(MAX_NESTING + 10).repr().unwrap_err());
        assert_eq!(err.exception, "RecursionError");
        assert_eq!(
            err.message,
            "maximum recursion depth exceeded while getting the repr of an object"
        );
    }

    #[test]
    fn test_deep_nesting_equality_is_recursion_error() {
        let err = on_worker_stack(|| {
            let a = nested_lists(MAX_NESTING + 10);
            let b = nested_lists(MAX_NESTING + 10);
            a.equals(&b).unwrap_err()
        });
        assert_eq!(err.exception, "RecursionError");
        assert!(nested_lists(20).equals(&nested_lists(20)).unwrap());
    }

    #[test]
    fn test_dropping_deeply_nested_containers() {
        // Far deeper than the default test thread stack could unwind
        // recursively.
        drop(nested_lists(1_000_000));

        let mut tuple = Value::tuple(vec![]);
        let mut dict = Value::dict(Dict::new());
        for _ in 0..1_000_000 {
            tuple = Value::tuple(vec![tuple]);
            let mut next = Dict::new();
            next.insert(Value::int(0), dict).unwrap();
            dict = Value::dict(next);
        }
        drop(tuple);
        drop(dict);
    }

    #[test]
    fn test_deep_tuple_key_is_recursion_error() {
        let err = on_worker_stack(|| {
            let mut key = Value::tuple(vec![]);
            for _ in 0..MAX_NESTING + 10 {
                key = Value::tuple(vec![key]);
            }
            DictKey::from_value(&key).unwrap_err()
        });
        assert_eq!(err.exception, "RecursionError");
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert!(Value::int(1).equals(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).equals(&Value::int(1)).unwrap());
        assert!(!Value::int(1).equals(&Value::str("1")).unwrap());

        // 2**53 + 1 is not representable as a float.
        let big = Value::int((1i64 << 53) + 1);
        assert!(!big.equals(&Value::Float((1u64 << 53) as f64)).unwrap());
        assert_eq!(
            big.compare(&Value::Float((1u64 << 53) as f64)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_dict_keys_unify_numeric_types() {
        let mut dict = Dict::new();
        dict.insert(Value::int(1), Value::str("int")).unwrap();
        dict.insert(Value::Float(1.0), Value::str("float")).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.keys()[0].repr().unwrap(), "1");
        assert_eq!(dict.values()[0].repr().unwrap(), "'float'");

        let huge = BigInt::from(10u8).pow(20);
        dict.insert(Value::Int(huge), Value::str("big")).unwrap();
        assert!(dict.contains(&Value::Float(1e20)).unwrap());
    }

    #[test]
    fn test_unhashable_key() {
        let err = DictKey::from_value(&Value::list(vec![])).unwrap_err();
        assert_eq!(err.message, "unhashable type: 'list'");
    }

    #[test]
    fn test_range_len() {
        assert_eq!(Range { start: 0, stop: 5, step: 1 }.len(), 5);
        assert_eq!(Range { start: 0, stop: 5, step: 2 }.len(), 3);
        assert_eq!(Range { start: 5, stop: 0, step: -1 }.len(), 5);
        assert_eq!(Range { start: 5, stop: 0, step: 1 }.len(), 0);
    }

    #[test]
    fn test_range_at_machine_integer_bounds() {
        let full = Range {
            start: i64::MIN,
            stop: i64::MAX,
            step: 1,
        };
        assert_eq!(full.length(), u64::MAX);

        let wide = Range {
            start: i64::MIN,
            stop: i64::MAX,
            step: i64::MAX,
        };
        assert_eq!(wide.length(), 3);
        assert_eq!(wide.get(0), i64::MIN);
        assert_eq!(wide.get(1), -1);
        assert_eq!(wide.get(2), i64::MAX - 1);
        assert!(wide.contains(&BigInt::from(-1)));
        assert!(!wide.contains(&BigInt::from(i64::MAX)));
    }

    #[test]
    fn test_mixed_comparison_is_type_error() {
        let err = Value::int(1).compare(&Value::str("a")).unwrap_err();
        assert_eq!(
            err.message,
            "'<' not supported between instances of 'int' and 'str'"
        );
    }
}
