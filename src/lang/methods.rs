//! Attribute access. Each value type exposes a fixed table of methods and
//! nothing else; there is no way to reach type objects or dunder hooks.

use std::rc::Rc;

use crate::lang::builtins::{self, CallArgs};
use crate::lang::fault::{Fault, FaultResult};
use crate::lang::format::{format_value, string_repr};
use crate::lang::interpreter::Interpreter;
use crate::lang::value::{DictCell, ListCell, Value};

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "title",
    "capitalize",
    "swapcase",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "rsplit",
    "splitlines",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "rfind",
    "index",
    "rindex",
    "count",
    "format",
    "partition",
    "isdigit",
    "isnumeric",
    "isalpha",
    "isalnum",
    "isspace",
    "isupper",
    "islower",
    "zfill",
    "center",
    "ljust",
    "rjust",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "clear",
    "copy",
];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "popitem",
    "setdefault",
    "update",
    "clear",
    "copy",
];

const TUPLE_METHODS: &[&str] = &["count", "index"];

/// Resolves `value.attr` to a method name from the receiver's table.
pub fn lookup(value: &Value, attr: &str) -> Option<&'static str> {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => return None,
    };
    table.iter().copied().find(|name| *name == attr)
}

pub fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &'static str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
) -> FaultResult<Value> {
    let args = CallArgs::new(name, positional, keywords);
    match receiver {
        Value::Str(s) => str_method(interp, s, name, args),
        Value::List(items) => list_method(interp, items, name, args),
        Value::Dict(dict) => dict_method(interp, receiver, dict, name, args),
        Value::Tuple(items) => sequence_method(items, name, "tuple", args),
        other => Err(Fault::attribute_error(other.type_name(), name)),
    }
}

fn expect_str<'v>(value: &'v Value, what: &str) -> FaultResult<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(Fault::type_error(format!(
            "{} must be str, not {}",
            what,
            other.type_name()
        ))),
    }
}

fn expect_int(value: &Value) -> FaultResult<i64> {
    match value {
        Value::Int(_) | Value::Bool(_) => Ok(value.as_int().unwrap_or(0)),
        other => Err(Fault::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

/// Resolves the optional `start`/`end` arguments of the search methods to a
/// char window, adjusting negatives the way slices do. `None` when the
/// window is empty because `start` lies past `end` or past the text.
fn char_window(
    start: Option<&Value>,
    end: Option<&Value>,
    len: usize,
) -> FaultResult<Option<(usize, usize)>> {
    let len = len as i64;
    let adjust = |value: Option<&Value>, default: i64| -> FaultResult<i64> {
        match value {
            None | Some(Value::None) => Ok(default),
            Some(value) => {
                let i = value.as_int().ok_or_else(|| {
                    Fault::type_error(
                        "slice indices must be integers or None or have an __index__ method",
                    )
                })?;
                Ok(if i < 0 { i.saturating_add(len).max(0) } else { i })
            }
        }
    };
    let start = adjust(start, 0)?;
    let end = adjust(end, len)?.min(len);
    if start > len || end < start {
        return Ok(None);
    }
    Ok(Some((start as usize, end as usize)))
}

fn fill_char(value: Option<&Value>) -> FaultResult<char> {
    match value {
        None => Ok(' '),
        Some(Value::Str(s)) if s.chars().count() == 1 => Ok(s.chars().next().unwrap_or(' ')),
        Some(_) => Err(Fault::type_error(
            "The fill character must be exactly one character long",
        )),
    }
}

/// Characters to strip, or `None` for whitespace.
fn strip_chars(value: Option<&Value>) -> FaultResult<Option<Vec<char>>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.chars().collect())),
        Some(other) => Err(Fault::type_error(format!(
            "strip arg must be None or str, not {}",
            other.type_name()
        ))),
    }
}

fn str_method(
    interp: &mut Interpreter<'_>,
    s: &Rc<str>,
    name: &str,
    mut args: CallArgs,
) -> FaultResult<Value> {
    let text: &str = s;
    match name {
        "format" => {
            let keywords = args.keywords();
            return str_format(text, &args.take(), &keywords).map(Value::str);
        }
        "split" | "rsplit" => {
            let sep_kw = args.keyword("sep");
            let max_kw = args.keyword("maxsplit");
            args.no_more_keywords()?;
            args.arity(0, 2)?;
            let mut values = args.take().into_iter();
            let sep = values.next().or(sep_kw);
            let maxsplit = match values.next().or(max_kw) {
                Some(v) => expect_int(&v)?,
                None => -1,
            };
            let parts = split(text, sep.as_ref(), maxsplit, name == "rsplit")?;
            return Ok(Value::list(parts.into_iter().map(Value::str).collect()));
        }
        _ => {}
    }

    args.no_more_keywords()?;
    let argc = args.len();
    let values = args.take();
    let arg = |i: usize| values.get(i);
    let arity = |min: usize, max: usize| builtins::check_arity(name, argc, min, max);

    let result = match name {
        "upper" => {
            arity(0, 0)?;
            Value::str(text.to_uppercase())
        }
        "lower" => {
            arity(0, 0)?;
            Value::str(text.to_lowercase())
        }
        "swapcase" => {
            arity(0, 0)?;
            Value::str(
                text.chars()
                    .flat_map(|c| {
                        if c.is_uppercase() {
                            c.to_lowercase().collect::<Vec<_>>()
                        } else {
                            c.to_uppercase().collect::<Vec<_>>()
                        }
                    })
                    .collect::<String>(),
            )
        }
        "title" => {
            arity(0, 0)?;
            let mut out = String::with_capacity(text.len());
            let mut previous_cased = false;
            for c in text.chars() {
                if previous_cased {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                previous_cased = c.is_alphabetic();
            }
            Value::str(out)
        }
        "capitalize" => {
            arity(0, 0)?;
            let mut chars = text.chars();
            let out: String = match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            };
            Value::str(out)
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(0, 1)?;
            let chars = strip_chars(arg(0))?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => text.trim_matches(matches),
                "lstrip" => text.trim_start_matches(matches),
                _ => text.trim_end_matches(matches),
            };
            Value::str(out)
        }
        "splitlines" => {
            arity(0, 1)?;
            let keep = arg(0).is_some_and(Value::truthy);
            let mut lines = Vec::new();
            let mut current = String::new();
            let mut chars = text.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\n' || c == '\r' {
                    if keep {
                        current.push(c);
                    }
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                        if keep {
                            current.push('\n');
                        }
                    }
                    lines.push(Value::str(std::mem::take(&mut current)));
                } else {
                    current.push(c);
                }
            }
            if !current.is_empty() {
                lines.push(Value::str(current));
            }
            Value::list(lines)
        }
        "join" => {
            arity(1, 1)?;
            let items = interp.iterate(&values[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(Fault::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            index,
                            other.type_name()
                        )))
                    }
                }
            }
            Value::str(parts.join(text))
        }
        "replace" => {
            arity(2, 3)?;
            let old = expect_str(&values[0], "replace() argument 1")?;
            let new = expect_str(&values[1], "replace() argument 2")?;
            let count = match arg(2) {
                Some(v) => expect_int(v)?,
                None => -1,
            };
            if count < 0 {
                Value::str(text.replace(old, new))
            } else {
                Value::str(text.replacen(old, new, count as usize))
            }
        }
        "startswith" | "endswith" => {
            arity(1, 3)?;
            let candidates = match &values[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            let chars: Vec<char> = text.chars().collect();
            let window = char_window(arg(1), arg(2), chars.len())?;
            let haystack: String = match window {
                Some((start, end)) => chars[start..end].iter().collect(),
                None => String::new(),
            };
            let mut found = false;
            for candidate in &candidates {
                let affix = expect_str(
                    candidate,
                    &format!("{} first arg", name),
                )?;
                found |= window.is_some()
                    && if name == "startswith" {
                        haystack.starts_with(affix)
                    } else {
                        haystack.ends_with(affix)
                    };
            }
            Value::Bool(found)
        }
        "find" | "rfind" | "index" | "rindex" | "count" => {
            arity(1, 3)?;
            let needle = match &values[0] {
                Value::Str(needle) => &**needle,
                other => {
                    return Err(Fault::type_error(format!(
                        "must be str, not {}",
                        other.type_name()
                    )))
                }
            };
            let chars: Vec<char> = text.chars().collect();
            let window = char_window(arg(1), arg(2), chars.len())?;
            let Some((start, end)) = window else {
                return match name {
                    "count" => Ok(Value::int(0)),
                    "index" | "rindex" => Err(Fault::value_error("substring not found")),
                    _ => Ok(Value::int(-1)),
                };
            };
            let haystack: String = chars[start..end].iter().collect();
            if name == "count" {
                let n = if needle.is_empty() {
                    end - start + 1
                } else {
                    haystack.matches(needle).count()
                };
                return Ok(Value::int(n));
            }
            let position = if matches!(name, "rfind" | "rindex") {
                haystack.rfind(needle)
            } else {
                haystack.find(needle)
            };
            match position {
                Some(byte) => Value::int(start + haystack[..byte].chars().count()),
                None if matches!(name, "index" | "rindex") => {
                    return Err(Fault::value_error("substring not found"))
                }
                None => Value::int(-1),
            }
        }
        "partition" => {
            arity(1, 1)?;
            let sep = expect_str(&values[0], "partition() argument")?;
            if sep.is_empty() {
                return Err(Fault::value_error("empty separator"));
            }
            let parts = match text.split_once(sep) {
                Some((head, tail)) => vec![head, sep, tail],
                None => vec![text, "", ""],
            };
            Value::tuple(parts.into_iter().map(Value::str).collect())
        }
        "isdigit" | "isnumeric" => {
            arity(0, 0)?;
            Value::Bool(!text.is_empty() && text.chars().all(|c| c.is_numeric()))
        }
        "isalpha" => {
            arity(0, 0)?;
            Value::Bool(!text.is_empty() && text.chars().all(char::is_alphabetic))
        }
        "isalnum" => {
            arity(0, 0)?;
            Value::Bool(!text.is_empty() && text.chars().all(char::is_alphanumeric))
        }
        "isspace" => {
            arity(0, 0)?;
            Value::Bool(!text.is_empty() && text.chars().all(char::is_whitespace))
        }
        "isupper" | "islower" => {
            arity(0, 0)?;
            let upper = name == "isupper";
            let mut cased = false;
            let mut ok = true;
            for c in text.chars() {
                if c.is_uppercase() || c.is_lowercase() {
                    cased = true;
                    ok &= if upper { c.is_uppercase() } else { c.is_lowercase() };
                }
            }
            Value::Bool(cased && ok)
        }
        "zfill" => {
            arity(1, 1)?;
            let width = expect_int(&values[0])?.max(0) as usize;
            let length = text.chars().count();
            if length >= width {
                Value::str(text)
            } else {
                let (sign, digits) = match text.chars().next() {
                    Some(c @ ('+' | '-')) => (c.to_string(), &text[1..]),
                    _ => (String::new(), text),
                };
                Value::str(format!("{}{}{}", sign, "0".repeat(width - length), digits))
            }
        }
        "center" | "ljust" | "rjust" => {
            arity(1, 2)?;
            let width = expect_int(&values[0])?.max(0) as usize;
            let fill = fill_char(arg(1))?;
            let length = text.chars().count();
            if length >= width {
                Value::str(text)
            } else {
                let padding = width - length;
                let (left, right) = match name {
                    "ljust" => (0, padding),
                    "rjust" => (padding, 0),
                    _ => {
                        let left = padding / 2 + (padding & width & 1);
                        (left, padding - left)
                    }
                };
                let pad = |n: usize| fill.to_string().repeat(n);
                Value::str(format!("{}{}{}", pad(left), text, pad(right)))
            }
        }
        other => return Err(Fault::attribute_error("str", other)),
    };
    Ok(result)
}

fn split(text: &str, sep: Option<&Value>, maxsplit: i64, from_right: bool) -> FaultResult<Vec<String>> {
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize };
    match sep {
        None | Some(Value::None) => {
            let words: Vec<&str> = text.split_whitespace().collect();
            if limit >= words.len() {
                return Ok(words.into_iter().map(str::to_string).collect());
            }
            // With a limit the remainder keeps its inner whitespace.
            let mut parts = Vec::new();
            if from_right {
                let mut rest = text.trim_end();
                while parts.len() < limit {
                    let Some(cut) = rest.rfind(char::is_whitespace) else {
                        break;
                    };
                    parts.push(rest[cut..].trim_start().to_string());
                    rest = rest[..cut].trim_end();
                }
                parts.push(rest.to_string());
                parts.reverse();
            } else {
                let mut rest = text.trim_start();
                while parts.len() < limit {
                    let Some(cut) = rest.find(char::is_whitespace) else {
                        break;
                    };
                    parts.push(rest[..cut].to_string());
                    rest = rest[cut..].trim_start();
                }
                parts.push(rest.to_string());
            }
            Ok(parts)
        }
        Some(Value::Str(sep)) => {
            if sep.is_empty() {
                return Err(Fault::value_error("empty separator"));
            }
            let parts: Vec<String> = if from_right {
                let mut parts: Vec<String> = text
                    .rsplitn(limit.saturating_add(1), &**sep)
                    .map(str::to_string)
                    .collect();
                parts.reverse();
                parts
            } else {
                text.splitn(limit.saturating_add(1), &**sep)
                    .map(str::to_string)
                    .collect()
            };
            Ok(parts)
        }
        Some(other) => Err(Fault::type_error(format!(
            "must be str or None, not {}",
            other.type_name()
        ))),
    }
}

/// `str.format` with automatic and explicit field numbering, keyword
/// fields, `!r`/`!s` conversions and format specs.
fn str_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> FaultResult<String> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut auto_index = 0usize;
    let mut used_auto = false;
    let mut used_manual = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '}' {
            if chars.get(i + 1) == Some(&'}') {
                out.push('}');
                i += 2;
                continue;
            }
            return Err(Fault::value_error(
                "Single '}' encountered in format string",
            ));
        }
        if c != '{' {
            out.push(c);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'{') {
            out.push('{');
            i += 2;
            continue;
        }

        let mut depth = 1;
        let mut j = i + 1;
        while j < chars.len() {
            match chars[j] {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if j >= chars.len() {
            return Err(Fault::value_error("Single '{' encountered in format string"));
        }
        let field: String = chars[i + 1..j].iter().collect();
        i = j + 1;

        let (head, spec) = match field.find(':') {
            Some(at) => (&field[..at], &field[at + 1..]),
            None => (field.as_str(), ""),
        };
        let (key, conversion) = match head.find('!') {
            Some(at) => (&head[..at], head[at + 1..].chars().next()),
            None => (head, None),
        };

        let mut value = if key.is_empty() {
            if used_manual {
                return Err(Fault::value_error(
                    "cannot switch from manual field specification to automatic field numbering",
                ));
            }
            used_auto = true;
            let value = args.get(auto_index).cloned().ok_or_else(|| {
                Fault::index_error(format!(
                    "Replacement index {} out of range for positional args tuple",
                    auto_index
                ))
            })?;
            auto_index += 1;
            value
        } else if let Ok(index) = key.parse::<usize>() {
            if used_auto {
                return Err(Fault::value_error(
                    "cannot switch from automatic field numbering to manual field specification",
                ));
            }
            used_manual = true;
            args.get(index).cloned().ok_or_else(|| {
                Fault::index_error(format!(
                    "Replacement index {} out of range for positional args tuple",
                    index
                ))
            })?
        } else {
            kwargs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Fault::key_error(string_repr(key)))?
        };

        match conversion {
            Some('r') | Some('a') => value = Value::str(value.repr()?),
            Some('s') => value = Value::str(value.to_str()?),
            None => {}
            Some(other) => {
                return Err(Fault::value_error(format!(
                    "Unknown conversion specifier {}",
                    other
                )))
            }
        }
        let spec = if spec.contains('{') {
            str_format(spec, args, kwargs)?
        } else {
            spec.to_string()
        };
        out.push_str(&format_value(&value, &spec)?);
    }
    Ok(out)
}

fn list_method(
    interp: &mut Interpreter<'_>,
    items: &Rc<ListCell>,
    name: &'static str,
    mut args: CallArgs,
) -> FaultResult<Value> {
    if name == "sort" {
        let key = args.keyword("key").filter(|k| !matches!(k, Value::None));
        let reverse = args.keyword("reverse").is_some_and(|r| r.truthy());
        args.no_more_keywords()?;
        args.arity(0, 0)?;
        let snapshot = std::mem::take(&mut *items.borrow_mut());
        let sorted = builtins::sort_values(interp, snapshot.clone(), key.as_ref(), reverse);
        match sorted {
            Ok(sorted) => *items.borrow_mut() = sorted,
            Err(fault) => {
                *items.borrow_mut() = snapshot;
                return Err(fault);
            }
        }
        return Ok(Value::None);
    }

    args.no_more_keywords()?;
    match name {
        "append" => {
            args.arity(1, 1)?;
            let value = args.take().remove(0);
            items.borrow_mut().push(value);
            Ok(Value::None)
        }
        "extend" => {
            args.arity(1, 1)?;
            let extra = interp.iterate(&args.take()[0])?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            args.arity(2, 2)?;
            let mut values = args.take();
            let value = values.pop().unwrap_or(Value::None);
            let index = expect_int(&values[0])?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, value);
            Ok(Value::None)
        }
        "pop" => {
            args.arity(0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(Fault::index_error("pop from empty list"));
            }
            let len = items.len() as i64;
            let index = match args.take().first() {
                Some(v) => expect_int(v)?,
                None => -1,
            };
            let at = if index < 0 { index + len } else { index };
            if at < 0 || at >= len {
                return Err(Fault::index_error("pop index out of range"));
            }
            Ok(items.remove(at as usize))
        }
        "remove" => {
            args.arity(1, 1)?;
            let target = args.take().remove(0);
            let position = position_of(&items.borrow(), &target)?;
            match position {
                Some(at) => {
                    items.borrow_mut().remove(at);
                    Ok(Value::None)
                }
                None => Err(Fault::value_error("list.remove(x): x not in list")),
            }
        }
        "reverse" => {
            args.arity(0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            args.arity(0, 0)?;
            let drained = std::mem::take(&mut *items.borrow_mut());
            drop(drained);
            Ok(Value::None)
        }
        "copy" => {
            args.arity(0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        _ => {
            let snapshot = items.borrow().clone();
            sequence_method(&snapshot, name, "list", args)
        }
    }
}

fn position_of(items: &[Value], target: &Value) -> FaultResult<Option<usize>> {
    for (at, item) in items.iter().enumerate() {
        if item.is(target) || item.equals(target)? {
            return Ok(Some(at));
        }
    }
    Ok(None)
}

/// `count` and `index`, shared by lists and tuples.
fn sequence_method(items: &[Value], name: &str, type_name: &str, args: CallArgs) -> FaultResult<Value> {
    args.no_more_keywords()?;
    match name {
        "count" => {
            args.arity(1, 1)?;
            let target = &args.take()[0];
            let mut n = 0usize;
            for item in items {
                if item.is(target) || item.equals(target)? {
                    n += 1;
                }
            }
            Ok(Value::int(n))
        }
        "index" => {
            args.arity(1, 1)?;
            let target = &args.take()[0];
            match position_of(items, target)? {
                Some(at) => Ok(Value::int(at)),
                None => Err(Fault::value_error(format!(
                    "{}.index(x): x not in {}",
                    type_name, type_name
                ))),
            }
        }
        other => Err(Fault::attribute_error(type_name, other)),
    }
}

fn dict_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    dict: &Rc<DictCell>,
    name: &str,
    mut args: CallArgs,
) -> FaultResult<Value> {
    if name == "update" {
        let keywords = args.keywords();
        args.arity(0, 1)?;
        if let Some(source) = args.take().first() {
            // Merging a dict into itself would hold two borrows at once.
            if !source.is(receiver) {
                let mut merged = dict.borrow().clone();
                builtins::update_dict(interp, &mut merged, source)?;
                *dict.borrow_mut() = merged;
            }
        }
        let mut dict = dict.borrow_mut();
        for (key, value) in keywords {
            dict.insert(Value::str(key), value)?;
        }
        return Ok(Value::None);
    }

    args.no_more_keywords()?;
    match name {
        "get" => {
            args.arity(1, 2)?;
            let mut values = args.take().into_iter();
            let key = values.next().unwrap_or(Value::None);
            let default = values.next().unwrap_or(Value::None);
            Ok(dict.borrow().get(&key)?.unwrap_or(default))
        }
        "keys" => {
            args.arity(0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            args.arity(0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            args.arity(0, 0)?;
            let pairs = dict
                .borrow()
                .items()
                .into_iter()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .collect();
            Ok(Value::list(pairs))
        }
        "pop" => {
            args.arity(1, 2)?;
            let mut values = args.take().into_iter();
            let key = values.next().unwrap_or(Value::None);
            let removed = dict.borrow_mut().remove(&key)?;
            match (removed, values.next()) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default),
                (None, None) => Err(Fault::key_error(key.repr()?)),
            }
        }
        "popitem" => {
            args.arity(0, 0)?;
            let last = dict.borrow_mut().pop_last();
            match last {
                Some((key, value)) => Ok(Value::tuple(vec![key, value])),
                None => Err(Fault::key_error("'popitem(): dictionary is empty'")),
            }
        }
        "setdefault" => {
            args.arity(1, 2)?;
            let mut values = args.take().into_iter();
            let key = values.next().unwrap_or(Value::None);
            let default = values.next().unwrap_or(Value::None);
            let existing = dict.borrow().get(&key)?;
            match existing {
                Some(value) => Ok(value),
                None => {
                    dict.borrow_mut().insert(key, default.clone())?;
                    Ok(default)
                }
            }
        }
        "clear" => {
            args.arity(0, 0)?;
            let drained = std::mem::take(&mut *dict.borrow_mut());
            drop(drained);
            Ok(Value::None)
        }
        "copy" => {
            args.arity(0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        other => Err(Fault::attribute_error("dict", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_table_driven() {
        assert_eq!(lookup(&Value::str("x"), "upper"), Some("upper"));
        assert_eq!(lookup(&Value::list(vec![]), "append"), Some("append"));
        assert_eq!(lookup(&Value::str("x"), "__class__"), None);
        assert_eq!(lookup(&Value::list(vec![]), "__dict__"), None);
        assert_eq!(lookup(&Value::int(1), "real"), None);
        assert_eq!(lookup(&Value::tuple(vec![]), "append"), None);
    }

    #[test]
    fn test_split() {
        let words = split("  a b  c ", None, -1, false).unwrap();
        assert_eq!(words, vec!["a", "b", "c"]);
        let limited = split("a b  c d", None, 1, false).unwrap();
        assert_eq!(limited, vec!["a", "b  c d"]);
        let right = split("a,b,c", Some(&Value::str(",")), 1, true).unwrap();
        assert_eq!(right, vec!["a,b", "c"]);
        let empty = split("", Some(&Value::str(",")), -1, false).unwrap();
        assert_eq!(empty, vec![""]);
    }

    #[test]
    fn test_search_window_adjusts_like_slices() {
        let n = |i: i64| Value::int(i);
        assert_eq!(char_window(None, None, 6).unwrap(), Some((0, 6)));
        assert_eq!(char_window(Some(&n(3)), None, 6).unwrap(), Some((3, 6)));
        assert_eq!(char_window(Some(&n(-2)), None, 6).unwrap(), Some((4, 6)));
        assert_eq!(char_window(Some(&n(1)), Some(&n(100)), 6).unwrap(), Some((1, 6)));
        assert_eq!(char_window(Some(&n(7)), None, 6).unwrap(), None);
        assert_eq!(char_window(Some(&n(4)), Some(&n(2)), 6).unwrap(), None);
        assert_eq!(char_window(Some(&n(6)), None, 6).unwrap(), Some((6, 6)));
        assert!(char_window(Some(&Value::str("1")), None, 6).is_err());
    }

    #[test]
    fn test_str_format() {
        let args = [Value::str("x"), Value::int(3)];
        let kwargs = [("n".to_string(), Value::Float(1.5))];
        assert_eq!(str_format("{} has {}", &args, &[]).unwrap(), "x has 3");
        assert_eq!(str_format("{1}{0}", &args, &[]).unwrap(), "3x");
        assert_eq!(str_format("{n:.2f} {{ok}}", &[], &kwargs).unwrap(), "1.50 {ok}");
        assert_eq!(str_format("{0!r:>5}", &args, &[]).unwrap(), "  'x'");
        assert!(str_format("{2}", &args, &[]).is_err());
    }
}
