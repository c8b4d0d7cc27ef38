//! The primitive functions a sandboxed program may call.
//!
//! Which of these are reachable is decided by the injected
//! [`Capabilities`](crate::sandbox::allowlist::Capabilities); this module
//! only knows how to run them.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, Zero};
use serde::Serialize;

use crate::lang::ast::BinOp;
use crate::lang::fault::{Fault, FaultResult};
use crate::lang::format::{round_float, string_repr, MAX_INT_DIGITS};
use crate::lang::interpreter::Interpreter;
use crate::lang::value::{int_to_float, Dict, Range, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Builtin {
    Print,
    Len,
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Range,
    Enumerate,
    Zip,
    Max,
    Min,
    Sum,
    Sorted,
    Abs,
    Round,
}

impl Builtin {
    pub const ALL: [Builtin; 17] = [
        Builtin::Print,
        Builtin::Len,
        Builtin::Str,
        Builtin::Int,
        Builtin::Float,
        Builtin::Bool,
        Builtin::List,
        Builtin::Dict,
        Builtin::Range,
        Builtin::Enumerate,
        Builtin::Zip,
        Builtin::Max,
        Builtin::Min,
        Builtin::Sum,
        Builtin::Sorted,
        Builtin::Abs,
        Builtin::Round,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::Range => "range",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Sum => "sum",
            Builtin::Sorted => "sorted",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
        }
    }

    /// Capability category, as listed by `pylet builtins`.
    pub fn category(self) -> &'static str {
        match self {
            Builtin::Print => "output",
            Builtin::Len => "length",
            Builtin::Str | Builtin::Int | Builtin::Float | Builtin::Bool => "conversion",
            Builtin::List | Builtin::Dict => "construction",
            Builtin::Range | Builtin::Enumerate | Builtin::Zip => "iteration",
            Builtin::Max | Builtin::Min | Builtin::Sum | Builtin::Sorted => "aggregation",
            Builtin::Abs | Builtin::Round => "numeric",
        }
    }
}

/// Positional and keyword arguments of a single call.
pub struct CallArgs {
    name: &'static str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(name: &'static str, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            name,
            positional,
            keywords,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Fails unless between `min` and `max` positional arguments were given.
    pub fn arity(&self, min: usize, max: usize) -> FaultResult<()> {
        check_arity(self.name, self.positional.len(), min, max)
    }

    /// Removes a keyword argument if present.
    pub fn keyword(&mut self, key: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(k, _)| k == key)?;
        Some(self.keywords.remove(index).1)
    }

    /// Fails if any keyword argument was not consumed.
    pub fn no_more_keywords(&self) -> FaultResult<()> {
        match self.keywords.first() {
            None => Ok(()),
            Some((key, _)) => Err(Fault::type_error(format!(
                "'{}' is an invalid keyword argument for {}()",
                key, self.name
            ))),
        }
    }

    pub fn take(self) -> Vec<Value> {
        self.positional
    }

    pub fn keywords(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.keywords)
    }
}

pub fn check_arity(name: &str, given: usize, min: usize, max: usize) -> FaultResult<()> {
    if given >= min && given <= max {
        return Ok(());
    }
    let message = if min == max {
        match min {
            0 => format!("{}() takes no arguments ({} given)", name, given),
            1 => format!("{}() takes exactly one argument ({} given)", name, given),
            n => format!("{}() takes exactly {} arguments ({} given)", name, n, given),
        }
    } else if given < min {
        format!(
            "{} expected at least {} argument{}, got {}",
            name,
            min,
            if min == 1 { "" } else { "s" },
            given
        )
    } else {
        format!(
            "{} expected at most {} argument{}, got {}",
            name,
            max,
            if max == 1 { "" } else { "s" },
            given
        )
    };
    Err(Fault::type_error(message))
}

pub fn call(
    interp: &mut Interpreter<'_>,
    builtin: Builtin,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
) -> FaultResult<Value> {
    let mut args = CallArgs::new(builtin.name(), positional, keywords);
    match builtin {
        Builtin::Print => print(interp, args),
        Builtin::Len => {
            args.no_more_keywords()?;
            args.arity(1, 1)?;
            len(&args.take()[0]).map(Value::int)
        }
        Builtin::Str => {
            args.no_more_keywords()?;
            args.arity(0, 1)?;
            Ok(match args.take().first() {
                Some(value) => Value::str(value.to_str()?),
                None => Value::str(""),
            })
        }
        Builtin::Int => int(args),
        Builtin::Float => {
            args.no_more_keywords()?;
            args.arity(0, 1)?;
            match args.take().first() {
                Some(value) => to_float(value).map(Value::Float),
                None => Ok(Value::Float(0.0)),
            }
        }
        Builtin::Bool => {
            args.no_more_keywords()?;
            args.arity(0, 1)?;
            Ok(Value::Bool(args.take().first().is_some_and(Value::truthy)))
        }
        Builtin::List => {
            args.no_more_keywords()?;
            args.arity(0, 1)?;
            match args.take().first() {
                Some(value) => Ok(Value::list(interp.iterate(value)?)),
                None => Ok(Value::list(Vec::new())),
            }
        }
        Builtin::Dict => dict(interp, args),
        Builtin::Range => range(args),
        Builtin::Enumerate => enumerate(interp, args),
        Builtin::Zip => zip(interp, args),
        Builtin::Max => extreme(interp, args, Ordering::Greater),
        Builtin::Min => extreme(interp, args, Ordering::Less),
        Builtin::Sum => sum(interp, args),
        Builtin::Sorted => {
            let key = args.keyword("key").filter(|k| !matches!(k, Value::None));
            let reverse = args.keyword("reverse").is_some_and(|r| r.truthy());
            args.no_more_keywords()?;
            args.arity(1, 1)?;
            let items = interp.iterate(&args.take()[0])?;
            sort_values(interp, items, key.as_ref(), reverse).map(Value::list)
        }
        Builtin::Abs => {
            args.no_more_keywords()?;
            args.arity(1, 1)?;
            abs(&args.take()[0])
        }
        Builtin::Round => round(args),
    }
}

fn print(interp: &mut Interpreter<'_>, mut args: CallArgs) -> FaultResult<Value> {
    let text_arg = |args: &mut CallArgs, key: &str, default: &str| -> FaultResult<String> {
        match args.keyword(key) {
            None | Some(Value::None) => Ok(default.to_string()),
            Some(Value::Str(s)) => Ok(s.to_string()),
            Some(other) => Err(Fault::type_error(format!(
                "{} must be None or a string, not {}",
                key,
                other.type_name()
            ))),
        }
    };
    let sep = text_arg(&mut args, "sep", " ")?;
    let end = text_arg(&mut args, "end", "\n")?;
    args.keyword("flush");
    args.no_more_keywords()?;

    let rendered = args
        .take()
        .iter()
        .map(Value::to_str)
        .collect::<FaultResult<Vec<String>>>()?;
    let mut line = rendered.join(&sep);
    line.push_str(&end);
    interp.write_stdout(&line)?;
    Ok(Value::None)
}

pub fn len(value: &Value) -> FaultResult<i64> {
    let n = match value {
        Value::Str(s) => s.chars().count() as u64,
        Value::List(items) => items.borrow().len() as u64,
        Value::Tuple(items) => items.len() as u64,
        Value::Dict(dict) => dict.borrow().len() as u64,
        Value::Range(range) => range.length(),
        other => {
            return Err(Fault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    i64::try_from(n).map_err(|_| Fault::overflow("Python int too large to convert to C ssize_t"))
}

fn int(mut args: CallArgs) -> FaultResult<Value> {
    let base_kw = args.keyword("base");
    args.no_more_keywords()?;
    args.arity(0, 2)?;
    let mut values = args.take().into_iter();
    let Some(value) = values.next() else {
        return Ok(Value::int(0));
    };
    let base = match values.next().or(base_kw) {
        Some(base) => Some(base.as_int().ok_or_else(|| {
            Fault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                base.type_name()
            ))
        })?),
        None => None,
    };

    match (&value, base) {
        (Value::Str(s), base) => parse_int(s, base.unwrap_or(10)).map(Value::Int),
        (_, Some(_)) => Err(Fault::type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Value::Int(_) | Value::Bool(_), None) => {
            Ok(Value::Int(value.as_bigint().unwrap_or_default()))
        }
        (Value::Float(f), None) => float_to_int(*f).map(Value::Int),
        (other, None) => Err(Fault::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

pub fn float_to_int(f: f64) -> FaultResult<BigInt> {
    if f.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    BigInt::from_f64(f.trunc())
        .ok_or_else(|| Fault::overflow("cannot convert float infinity to integer"))
}

fn parse_int(text: &str, base: i64) -> FaultResult<BigInt> {
    let invalid = || {
        Fault::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            string_repr(text)
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(Fault::value_error("int() base must be >= 2 and <= 36, or 0"));
    }

    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let lower = digits.to_ascii_lowercase();
    let (radix, body) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &digits[2..]),
        (0 | 8, Some("0o")) => (8, &digits[2..]),
        (0 | 2, Some("0b")) => (2, &digits[2..]),
        (0, _) => (10, digits),
        (b, _) => (b as u32, digits),
    };

    if body.is_empty()
        || body.starts_with('_')
        || body.ends_with('_')
        || body.contains("__")
    {
        return Err(invalid());
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    if !cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid());
    }
    if base == 0 && radix == 10 && cleaned.len() > 1 && cleaned.starts_with('0')
        && cleaned.chars().any(|c| c != '0')
    {
        return Err(invalid());
    }
    // Power-of-two bases convert in linear time and are not limited.
    if !radix.is_power_of_two() && cleaned.len() > MAX_INT_DIGITS {
        return Err(Fault::value_error(format!(
            "Exceeds the limit ({} digits) for integer string conversion: value has {} digits; use sys.set_int_max_str_digits() to increase the limit",
            MAX_INT_DIGITS,
            cleaned.len()
        )));
    }

    let magnitude = BigInt::parse_bytes(cleaned.as_bytes(), radix).ok_or_else(invalid)?;
    Ok(if negative { -magnitude } else { magnitude })
}

pub fn to_float(value: &Value) -> FaultResult<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => int_to_float(i),
        Value::Bool(b) => Ok(f64::from(u8::from(*b))),
        Value::Str(s) => parse_float(s).ok_or_else(|| {
            Fault::value_error(format!(
                "could not convert string to float: {}",
                string_repr(s)
            ))
        }),
        other => Err(Fault::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    match body.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => return Some(sign * f64::INFINITY),
        "nan" => return Some(f64::NAN),
        _ => {}
    }
    if body.is_empty()
        || body.starts_with('_')
        || body.ends_with('_')
        || body.contains("__")
        || !body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_'))
    {
        return None;
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f64>().ok().map(|f| sign * f)
}

fn dict(interp: &mut Interpreter<'_>, mut args: CallArgs) -> FaultResult<Value> {
    let keywords = args.keywords();
    args.arity(0, 1)?;
    let mut dict = Dict::new();
    if let Some(source) = args.take().first() {
        update_dict(interp, &mut dict, source)?;
    }
    for (key, value) in keywords {
        dict.insert(Value::str(key), value)?;
    }
    Ok(Value::dict(dict))
}

/// Merges a mapping or an iterable of pairs into `dict`.
pub fn update_dict(interp: &mut Interpreter<'_>, dict: &mut Dict, source: &Value) -> FaultResult<()> {
    if let Value::Dict(other) = source {
        let pairs = other.borrow().items();
        for (key, value) in pairs {
            dict.insert(key, value)?;
        }
        return Ok(());
    }
    for (index, item) in interp.iterate(source)?.into_iter().enumerate() {
        let pair = interp.iterate(&item).map_err(|_| {
            Fault::type_error(format!(
                "cannot convert dictionary update sequence element #{} to a sequence",
                index
            ))
        })?;
        let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
            Fault::value_error(format!(
                "dictionary update sequence element #{} has length {}; 2 is required",
                index,
                pair.len()
            ))
        })?;
        dict.insert(key, value)?;
    }
    Ok(())
}

fn range(args: CallArgs) -> FaultResult<Value> {
    args.no_more_keywords()?;
    args.arity(1, 3)?;
    let mut bounds = Vec::with_capacity(3);
    for value in args.take() {
        match value.to_i64() {
            Some(bound) => bounds.push(bound?),
            None => {
                return Err(Fault::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    value.type_name()
                )))
            }
        }
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Fault::type_error("range expected at most 3 arguments")),
    };
    if step == 0 {
        return Err(Fault::value_error("range() arg 3 must not be zero"));
    }
    Ok(Value::Range(Range { start, stop, step }))
}

fn enumerate(interp: &mut Interpreter<'_>, mut args: CallArgs) -> FaultResult<Value> {
    let start_kw = args.keyword("start");
    args.no_more_keywords()?;
    args.arity(1, 2)?;
    let mut values = args.take().into_iter();
    let iterable = values.next().unwrap_or(Value::None);
    let start = match values.next().or(start_kw) {
        Some(value) => value.as_bigint().ok_or_else(|| {
            Fault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ))
        })?,
        None => BigInt::zero(),
    };

    let items = interp.iterate(&iterable)?;
    let mut pairs = Vec::with_capacity(items.len());
    for (offset, item) in items.into_iter().enumerate() {
        let index = &start + BigInt::from(offset);
        pairs.push(Value::tuple(vec![Value::Int(index), item]));
    }
    Ok(Value::iterator("enumerate", pairs))
}

fn zip(interp: &mut Interpreter<'_>, args: CallArgs) -> FaultResult<Value> {
    args.no_more_keywords()?;
    let sources = args.take();
    if sources.is_empty() {
        return Ok(Value::iterator("zip", Vec::new()));
    }
    let mut columns = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let column = interp.iterate(source).map_err(|fault| {
            if fault.exception == "TypeError" {
                Fault::type_error(format!(
                    "zip argument #{} must support iteration",
                    index + 1
                ))
            } else {
                fault
            }
        })?;
        columns.push(column.into_iter());
    }

    let mut rows = Vec::new();
    'rows: loop {
        let mut row = Vec::with_capacity(columns.len());
        for column in columns.iter_mut() {
            match column.next() {
                Some(value) => row.push(value),
                None => break 'rows,
            }
        }
        rows.push(Value::tuple(row));
    }
    Ok(Value::iterator("zip", rows))
}

/// `max` when `want` is `Greater`, `min` when `Less`. The first of several
/// equal extremes wins.
fn extreme(interp: &mut Interpreter<'_>, mut args: CallArgs, want: Ordering) -> FaultResult<Value> {
    let name = if want == Ordering::Greater { "max" } else { "min" };
    let key = args.keyword("key").filter(|k| !matches!(k, Value::None));
    let default = args.keyword("default");
    args.no_more_keywords()?;

    let candidates = match args.len() {
        0 => {
            return Err(Fault::type_error(format!(
                "{} expected at least 1 argument, got 0",
                name
            )))
        }
        1 => {
            let items = interp.iterate(&args.take()[0])?;
            if items.is_empty() {
                return default.ok_or_else(|| {
                    Fault::value_error(format!("{}() iterable argument is empty", name))
                });
            }
            items
        }
        _ => {
            if default.is_some() {
                return Err(Fault::type_error(format!(
                    "Cannot specify a default for {}() with multiple positional arguments",
                    name
                )));
            }
            args.take()
        }
    };

    let mut best: Option<(Value, Value)> = None;
    for candidate in candidates {
        let rank = match &key {
            Some(key) => interp.call_value(key, vec![candidate.clone()], Vec::new())?,
            None => candidate.clone(),
        };
        best = match best {
            None => Some((candidate, rank)),
            Some((current, current_rank)) => {
                let symbol = if want == Ordering::Greater { ">" } else { "<" };
                if rank.compare_op(&current_rank, symbol)? == want {
                    Some((candidate, rank))
                } else {
                    Some((current, current_rank))
                }
            }
        };
    }
    Ok(best.map(|(value, _)| value).unwrap_or(Value::None))
}

fn sum(interp: &mut Interpreter<'_>, mut args: CallArgs) -> FaultResult<Value> {
    let start_kw = args.keyword("start");
    args.no_more_keywords()?;
    args.arity(1, 2)?;
    let mut values = args.take().into_iter();
    let iterable = values.next().unwrap_or(Value::None);
    let mut total = values.next().or(start_kw).unwrap_or_else(|| Value::int(0));
    if matches!(total, Value::Str(_)) {
        return Err(Fault::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    for item in interp.iterate(&iterable)? {
        total = interp.binary_op(BinOp::Add, &total, &item)?;
    }
    Ok(total)
}

/// Stable sort that surfaces the first comparison fault.
pub fn sort_values(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> FaultResult<Vec<Value>> {
    let mut decorated = Vec::with_capacity(items.len());
    for item in items {
        let rank = match key {
            Some(key) => interp.call_value(key, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        decorated.push((rank, item));
    }

    let mut fault = None;
    decorated.sort_by(|(a, _), (b, _)| {
        if fault.is_some() {
            return Ordering::Equal;
        }
        let (left, right) = if reverse { (b, a) } else { (a, b) };
        match left.compare_op(right, "<") {
            Ok(ordering) => ordering,
            Err(e) => {
                fault = Some(e);
                Ordering::Equal
            }
        }
    });
    match fault {
        Some(fault) => Err(fault),
        None => Ok(decorated.into_iter().map(|(_, item)| item).collect()),
    }
}

fn abs(value: &Value) -> FaultResult<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Bool(b) => Ok(Value::int(u8::from(*b))),
        other => Err(Fault::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn round(mut args: CallArgs) -> FaultResult<Value> {
    let ndigits_kw = args.keyword("ndigits");
    args.no_more_keywords()?;
    args.arity(1, 2)?;
    let mut values = args.take().into_iter();
    let number = values.next().unwrap_or(Value::None);
    let ndigits = match values.next().or(ndigits_kw) {
        None | Some(Value::None) => None,
        Some(value) => Some(value.as_int().ok_or_else(|| {
            Fault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ))
        })?),
    };

    match (&number, ndigits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(n)) => Ok(Value::Float(round_float(*f, n))),
        (Value::Int(_) | Value::Bool(_), None) => {
            Ok(Value::Int(number.as_bigint().unwrap_or_default()))
        }
        (Value::Int(_) | Value::Bool(_), Some(n)) => {
            let i = number.as_bigint().unwrap_or_default();
            if n >= 0 {
                return Ok(Value::Int(i));
            }
            // 10**k with more digits than `i` rounds everything to zero.
            let digits = i.bits() * 3 / 10 + 2;
            let exponent = match u32::try_from(n.unsigned_abs()) {
                Ok(e) if u64::from(e) <= digits => e,
                _ => return Ok(Value::int(0)),
            };
            let two = BigInt::from(2u8);
            let factor = BigInt::from(10u8).pow(exponent);
            let remainder = ((&i % &factor) + &factor) % &factor;
            let base = &i - &remainder;
            let half = &remainder * &two;
            let base_is_even = ((&base / &factor) % &two).is_zero();
            let rounded = match half.cmp(&factor) {
                Ordering::Less => base,
                Ordering::Greater => base + factor,
                Ordering::Equal if base_is_even => base,
                Ordering::Equal => base + factor,
            };
            Ok(Value::Int(rounded))
        }
        (other, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<&str> = Builtin::ALL.iter().map(|b| b.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Builtin::ALL.len());
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(" 42 ", 10).unwrap(), BigInt::from(42));
        assert_eq!(parse_int("-1_000", 10).unwrap(), BigInt::from(-1000));
        assert_eq!(parse_int("ff", 16).unwrap(), BigInt::from(255));
        assert_eq!(parse_int("0x1f", 0).unwrap(), BigInt::from(31));
        assert_eq!(parse_int("-9223372036854775808", 10).unwrap(), BigInt::from(i64::MIN));
        assert_eq!(
            parse_int("99999999999999999999", 10).unwrap().to_string(),
            "99999999999999999999"
        );

        let err = parse_int("abc", 10).unwrap_err();
        assert_eq!(err.message, "invalid literal for int() with base 10: 'abc'");
        assert!(parse_int("--5", 10).is_err());
        assert!(parse_int(&"9".repeat(5000), 10)
            .unwrap_err()
            .message
            .contains("value has 5000 digits"));
    }

    #[test]
    fn test_len_of_huge_range_overflows() {
        let range = Value::Range(Range {
            start: i64::MIN,
            stop: i64::MAX,
            step: 1,
        });
        let err = len(&range).unwrap_err();
        assert_eq!(err.exception, "OverflowError");
        assert_eq!(err.message, "Python int too large to convert to C ssize_t");
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("1.5"), Some(1.5));
        assert_eq!(parse_float(" -2e3 "), Some(-2000.0));
        assert_eq!(parse_float("inf"), Some(f64::INFINITY));
        assert_eq!(parse_float("1,5"), None);
        assert_eq!(parse_float(""), None);
    }

    #[test]
    fn test_round() {
        let round_of = |args: Vec<Value>| round(CallArgs::new("round", args, Vec::new())).unwrap();
        assert_eq!(round_of(vec![Value::Float(2.5)]).repr().unwrap(), "2");
        assert_eq!(round_of(vec![Value::Float(3.5)]).repr().unwrap(), "4");
        assert_eq!(round_of(vec![Value::Float(3.14159), Value::int(2)]).repr().unwrap(), "3.14");
        assert_eq!(round_of(vec![Value::int(1250), Value::int(-2)]).repr().unwrap(), "1200");
        assert_eq!(round_of(vec![Value::int(1350), Value::int(-2)]).repr().unwrap(), "1400");
    }

    #[test]
    fn test_arity_message() {
        let args = CallArgs::new("len", vec![Value::int(1), Value::int(2)], Vec::new());
        let err = args.arity(1, 1).unwrap_err();
        assert_eq!(err.message, "len() takes exactly one argument (2 given)");
    }
}
