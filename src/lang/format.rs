//! Number and string rendering: `repr` rules and the format-spec
//! mini-language used by f-strings, `str.format` and `round`.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive};

use crate::lang::fault::{Fault, FaultResult};
use crate::lang::value::{int_to_float, Value};

/// Longest decimal text an int may be converted to or from.
pub const MAX_INT_DIGITS: usize = 4300;

/// `repr(int)`. Conversions past [`MAX_INT_DIGITS`] are refused before the
/// quadratic base conversion runs.
pub fn int_repr(value: &BigInt) -> FaultResult<String> {
    // 14_290 bits already need more than 4300 decimal digits.
    if value.bits() > 14_290 {
        return Err(int_digits_exceeded());
    }
    let text = value.to_string();
    let digits = text.len() - usize::from(value.is_negative());
    if digits > MAX_INT_DIGITS {
        return Err(int_digits_exceeded());
    }
    Ok(text)
}

pub fn int_digits_exceeded() -> Fault {
    Fault::value_error(format!(
        "Exceeds the limit ({} digits) for integer string conversion; use sys.set_int_max_str_digits() to increase the limit",
        MAX_INT_DIGITS
    ))
}

/// Shortest round-tripping float text, switching to exponent notation
/// outside `1e-4 <= |x| < 1e16`.
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let (negative, digits, exponent) = decompose(&format!("{:e}", value));
    let mut out = String::new();
    if negative {
        out.push('-');
    }

    if !(-4..16).contains(&exponent) {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push_str(&exponent_suffix('e', exponent));
        return out;
    }

    out.push_str(&positional(&digits, exponent, true));
    out
}

/// Splits Rust's `{:e}` output into sign, significant digits and exponent.
fn decompose(text: &str) -> (bool, String, i32) {
    let (mantissa, exponent) = text.split_once('e').unwrap_or((text, "0"));
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let exponent = exponent.parse().unwrap_or(0);
    (negative, digits, exponent)
}

fn positional(digits: &str, exponent: i32, force_fraction: bool) -> String {
    let mut out = String::new();
    if exponent >= 0 {
        let int_len = exponent as usize + 1;
        if digits.len() <= int_len {
            out.push_str(digits);
            out.push_str(&"0".repeat(int_len - digits.len()));
            if force_fraction {
                out.push_str(".0");
            }
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    } else {
        out.push_str("0.");
        out.push_str(&"0".repeat((-exponent - 1) as usize));
        out.push_str(digits);
    }
    out
}

fn exponent_suffix(marker: char, exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{}{:02}", marker, sign, exponent.abs())
}

/// Python string repr: single quotes unless the text contains a single quote
/// and no double quote.
pub fn string_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[derive(Debug, Default, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> FaultResult<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = Some(chars[0]);
        parsed.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        parsed.align = Some(chars[0]);
        i = 1;
    }

    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
        parsed.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        parsed.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        parsed.zero = true;
        i += 1;
    }

    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        let text: String = chars[start..i].iter().collect();
        parsed.width = text.parse().map_err(|_| invalid_spec())?;
    }

    if let Some(&c @ (',' | '_')) = chars.get(i) {
        parsed.grouping = Some(c);
        i += 1;
    }

    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(Fault::value_error("Format specifier missing precision"));
        }
        let text: String = chars[start..i].iter().collect();
        parsed.precision = Some(text.parse().map_err(|_| invalid_spec())?);
    }

    if i < chars.len() {
        parsed.kind = Some(chars[i]);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid_spec());
    }
    Ok(parsed)
}

fn invalid_spec() -> Fault {
    Fault::value_error("Invalid format specifier")
}

/// `format(value, spec)`.
pub fn format_value(value: &Value, spec: &str) -> FaultResult<String> {
    if spec.is_empty() {
        return value.to_str();
    }
    let spec = parse_spec(spec)?;

    match value {
        Value::Str(s) => format_str(s, &spec),
        Value::Bool(b) if spec.kind.is_none() => {
            format_str(if *b { "True" } else { "False" }, &spec)
        }
        Value::Bool(_) | Value::Int(_) => {
            let int = value.as_bigint().unwrap_or_default();
            match spec.kind {
                None | Some('d') | Some('b') | Some('o') | Some('x') | Some('X') | Some('c')
                | Some('n') => format_int(&int, &spec),
                Some('e') | Some('E') | Some('f') | Some('F') | Some('g') | Some('G')
                | Some('%') => format_float(int_to_float(&int)?, &spec),
                Some(kind) => Err(unknown_code(kind, "int")),
            }
        }
        Value::Float(f) => match spec.kind {
            None | Some('e') | Some('E') | Some('f') | Some('F') | Some('g') | Some('G')
            | Some('%') | Some('n') => format_float(*f, &spec),
            Some(kind) => Err(unknown_code(kind, "float")),
        },
        other => Err(Fault::type_error(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        ))),
    }
}

fn unknown_code(kind: char, type_name: &str) -> Fault {
    Fault::value_error(format!(
        "Unknown format code '{}' for object of type '{}'",
        kind, type_name
    ))
}

fn format_str(text: &str, spec: &Spec) -> FaultResult<String> {
    if let Some(kind) = spec.kind {
        if kind != 's' {
            return Err(unknown_code(kind, "str"));
        }
    }
    if spec.sign.is_some() {
        return Err(Fault::value_error(
            "Sign not allowed in string format specifier",
        ));
    }
    if spec.align == Some('=') {
        return Err(Fault::value_error(
            "'=' alignment not allowed in string format specifier",
        ));
    }
    let body: String = match spec.precision {
        Some(p) => text.chars().take(p).collect(),
        None => text.to_string(),
    };
    Ok(pad(String::new(), body, spec, '<'))
}

fn format_int(value: &BigInt, spec: &Spec) -> FaultResult<String> {
    if spec.precision.is_some() {
        return Err(Fault::value_error(
            "Precision not allowed in integer format specifier",
        ));
    }
    let magnitude = value.magnitude();
    let (prefix, mut digits) = match spec.kind {
        Some('b') => ("0b", format!("{:b}", magnitude)),
        Some('o') => ("0o", format!("{:o}", magnitude)),
        Some('x') => ("0x", format!("{:x}", magnitude)),
        Some('X') => ("0X", format!("{:X}", magnitude)),
        Some('c') => {
            let c = value
                .to_u32()
                .and_then(char::from_u32)
                .ok_or_else(|| Fault::overflow("%c arg not in range(0x110000)"))?;
            return Ok(pad(String::new(), c.to_string(), spec, '<'));
        }
        _ => ("", int_repr(value)?.trim_start_matches('-').to_string()),
    };
    if let Some(sep) = spec.grouping {
        let group = if matches!(spec.kind, Some('b' | 'o' | 'x' | 'X')) { 4 } else { 3 };
        digits = group_digits(&digits, sep, group);
    }
    let mut sign = sign_text(value.is_negative(), spec);
    if spec.alternate {
        sign.push_str(prefix);
    }
    Ok(pad(sign, digits, spec, '>'))
}

fn format_float(value: f64, spec: &Spec) -> FaultResult<String> {
    if spec.kind.is_none() && spec.precision.is_none() {
        let text = float_repr(value.abs());
        return Ok(pad(
            sign_text(value.is_sign_negative() && !value.is_nan(), spec),
            apply_grouping(text, spec),
            spec,
            '>',
        ));
    }

    let negative = value.is_sign_negative() && !value.is_nan();
    let magnitude = value.abs();
    let upper = matches!(spec.kind, Some('E' | 'F' | 'G'));

    let body = if !magnitude.is_finite() {
        let text = if magnitude.is_nan() { "nan" } else { "inf" };
        let text = if upper { text.to_uppercase() } else { text.to_string() };
        if spec.kind == Some('%') {
            format!("{}%", text)
        } else {
            text
        }
    } else {
        match spec.kind {
            Some('f') | Some('F') => {
                let text = format!("{:.*}", spec.precision.unwrap_or(6), magnitude);
                with_alternate_point(text, spec)
            }
            Some('e') | Some('E') => {
                let text = scientific(magnitude, spec.precision.unwrap_or(6), spec.alternate);
                if upper {
                    text.to_uppercase()
                } else {
                    text
                }
            }
            Some('%') => {
                let text = format!("{:.*}", spec.precision.unwrap_or(6), magnitude * 100.0);
                format!("{}%", with_alternate_point(text, spec))
            }
            _ => {
                let mut text = general(magnitude, spec.precision.unwrap_or(6), spec.alternate);
                if spec.kind.is_none() && !text.contains(['.', 'e']) {
                    text.push_str(".0");
                }
                if upper {
                    text.to_uppercase()
                } else {
                    text
                }
            }
        }
    };

    Ok(pad(sign_text(negative, spec), apply_grouping(body, spec), spec, '>'))
}

fn with_alternate_point(text: String, spec: &Spec) -> String {
    if spec.alternate && !text.contains('.') {
        format!("{}.", text)
    } else {
        text
    }
}

fn scientific(value: f64, precision: usize, alternate: bool) -> String {
    let text = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let mut mantissa = mantissa.to_string();
    if alternate && !mantissa.contains('.') {
        mantissa.push('.');
    }
    format!("{}{}", mantissa, exponent_suffix('e', exponent))
}

/// The `g` presentation type.
fn general(value: f64, precision: usize, alternate: bool) -> String {
    let precision = precision.max(1);
    if value == 0.0 {
        return if alternate {
            format!("0.{}", "0".repeat(precision - 1))
        } else {
            "0".to_string()
        };
    }

    let scientific = format!("{:.*e}", precision - 1, value);
    let exponent: i32 = scientific
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    let text = if exponent >= -4 && exponent < precision as i32 {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, value)
    } else {
        let (mantissa, _) = scientific.split_once('e').unwrap_or((&scientific, ""));
        let mantissa = if alternate {
            mantissa.to_string()
        } else {
            strip_fraction_zeros(mantissa)
        };
        return format!("{}{}", mantissa, exponent_suffix('e', exponent));
    };

    if alternate {
        text
    } else {
        strip_fraction_zeros(&text)
    }
}

fn strip_fraction_zeros(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn apply_grouping(text: String, spec: &Spec) -> String {
    let Some(sep) = spec.grouping else {
        return text;
    };
    let int_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    format!("{}{}", group_digits(&text[..int_end], sep, 3), &text[int_end..])
}

fn group_digits(digits: &str, sep: char, group: usize) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / group);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % group == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn sign_text(negative: bool, spec: &Spec) -> String {
    if negative {
        return "-".to_string();
    }
    match spec.sign {
        Some('+') => "+".to_string(),
        Some(' ') => " ".to_string(),
        _ => String::new(),
    }
}

fn pad(sign: String, body: String, spec: &Spec, default_align: char) -> String {
    let (fill, align) = match (spec.fill, spec.align) {
        (fill, Some(align)) => (fill.unwrap_or(' '), align),
        (_, None) if spec.zero && default_align == '>' => ('0', '='),
        (_, None) => (' ', default_align),
    };

    let length = sign.chars().count() + body.chars().count();
    if length >= spec.width {
        return format!("{}{}", sign, body);
    }
    let padding = spec.width - length;
    let fill_text = |n: usize| fill.to_string().repeat(n);

    match align {
        '<' => format!("{}{}{}", sign, body, fill_text(padding)),
        '^' => {
            let left = padding / 2;
            format!("{}{}{}{}", fill_text(left), sign, body, fill_text(padding - left))
        }
        '=' => format!("{}{}{}", sign, fill_text(padding), body),
        _ => format!("{}{}{}", fill_text(padding), sign, body),
    }
}

/// printf-style `format % args`. Named `%(key)s` fields and `*` widths are
/// not supported.
pub fn percent_format(format: &str, args: &[Value]) -> FaultResult<String> {
    let chars: Vec<char> = format.chars().collect();
    let mut args = args.iter();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;

        let mut left = false;
        let mut zero = false;
        let mut sign = String::new();
        let mut alternate = false;
        while let Some(&c) = chars.get(i) {
            match c {
                '-' => left = true,
                '0' => zero = true,
                '+' => sign = "+".to_string(),
                ' ' if sign.is_empty() => sign = " ".to_string(),
                '#' => alternate = true,
                _ => break,
            }
            i += 1;
        }
        let mut width = String::new();
        while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
            width.push(*c);
            i += 1;
        }
        let mut precision = String::new();
        if chars.get(i) == Some(&'.') {
            precision.push('.');
            i += 1;
            while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
                precision.push(*c);
                i += 1;
            }
            if precision == "." {
                precision.push('0');
            }
        }

        let Some(&conversion) = chars.get(i) else {
            return Err(Fault::value_error("incomplete format"));
        };
        i += 1;
        if conversion == '%' {
            out.push('%');
            continue;
        }

        let arg = args
            .next()
            .ok_or_else(|| Fault::type_error("not enough arguments for format string"))?;
        let align = if left {
            "<".to_string()
        } else if zero && !matches!(conversion, 's' | 'r' | 'c') {
            "0=".to_string()
        } else {
            ">".to_string()
        };
        let flags = format!("{}{}", sign, if alternate { "#" } else { "" });

        let piece = match conversion {
            's' | 'r' | 'a' => {
                let text = if conversion == 's' {
                    arg.to_str()?
                } else {
                    arg.repr()?
                };
                format_value(&Value::str(text), &format!("{}{}{}", align, width, precision))?
            }
            'd' | 'i' | 'u' | 'x' | 'X' | 'o' | 'c' => {
                let number = match arg {
                    Value::Float(f) if conversion != 'c' => {
                        if !f.is_finite() {
                            return Err(Fault::overflow("cannot convert float infinity to integer"));
                        }
                        Value::Int(BigInt::from_f64(f.trunc()).unwrap_or_default())
                    }
                    Value::Int(_) | Value::Bool(_) => Value::Int(arg.as_bigint().unwrap_or_default()),
                    Value::Str(s) if conversion == 'c' && s.chars().count() == 1 => arg.clone(),
                    other => {
                        return Err(Fault::type_error(format!(
                            "%{} format: a real number is required, not {}",
                            conversion,
                            other.type_name()
                        )))
                    }
                };
                let kind = match conversion {
                    'i' | 'u' => 'd',
                    'c' if matches!(number, Value::Str(_)) => 's',
                    other => other,
                };
                format_value(&number, &format!("{}{}{}{}", align, flags, width, kind))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let value = arg.as_float().ok_or_else(|| {
                    Fault::type_error(format!(
                        "must be real number, not {}",
                        arg.type_name()
                    ))
                })?;
                let precision = if precision.is_empty() {
                    ".6".to_string()
                } else {
                    precision.clone()
                };
                format_value(
                    &Value::Float(value),
                    &format!("{}{}{}{}{}", align, flags, width, precision, conversion),
                )?
            }
            other => {
                return Err(Fault::value_error(format!(
                    "unsupported format character '{}' (0x{:x}) at index {}",
                    other,
                    other as u32,
                    i - 1
                )))
            }
        };
        out.push_str(&piece);
    }

    if args.next().is_some() {
        return Err(Fault::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

/// `round(x, ndigits)` for floats: round the exact binary value, ties to
/// even, exactly as decimal formatting does.
pub fn round_float(value: f64, ndigits: i64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    if ndigits >= 0 {
        let digits = ndigits.min(340) as usize;
        format!("{:.*}", digits, value).parse().unwrap_or(value)
    } else {
        let factor = 10f64.powi((-ndigits).min(308) as i32);
        let scaled = (value / factor).round_ties_even() * factor;
        if scaled.is_finite() {
            scaled
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(2.5), "2.5");
        assert_eq!(float_repr(-3.25), "-3.25");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(123456789.0), "123456789.0");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn test_string_repr_quoting() {
        assert_eq!(string_repr("hi"), "'hi'");
        assert_eq!(string_repr("it's"), "\"it's\"");
        assert_eq!(string_repr("a\nb"), "'a\\nb'");
        assert_eq!(string_repr("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn test_fixed_and_general_formats() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Float(7.0), ".1f").unwrap(), "7.0");
        assert_eq!(format_value(&Value::Float(1234567.0), "g").unwrap(), "1.23457e+06");
        assert_eq!(format_value(&Value::Float(0.5), ".0%").unwrap(), "50%");
        assert_eq!(format_value(&Value::Float(12345.678), ",.1f").unwrap(), "12,345.7");
        assert_eq!(format_value(&Value::Float(1500.0), ".2e").unwrap(), "1.50e+03");
    }

    #[test]
    fn test_int_formats() {
        assert_eq!(format_value(&Value::int(42), "5d").unwrap(), "   42");
        assert_eq!(format_value(&Value::int(42), "<5").unwrap(), "42   ");
        assert_eq!(format_value(&Value::int(-42), "05").unwrap(), "-0042");
        assert_eq!(format_value(&Value::int(255), "#x").unwrap(), "0xff");
        assert_eq!(format_value(&Value::int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::int(5), "+").unwrap(), "+5");
        assert_eq!(format_value(&Value::int(3), ".2f").unwrap(), "3.00");
    }

    #[test]
    fn test_big_int_formats() {
        let big = Value::int(BigInt::from(2u8).pow(64));
        assert_eq!(format_value(&big, ",").unwrap(), "18,446,744,073,709,551,616");
        assert_eq!(format_value(&big, "#x").unwrap(), "0x10000000000000000");
        assert_eq!(format_value(&big, ".1e").unwrap(), "1.8e+19");
    }

    #[test]
    fn test_int_text_conversion_is_limited() {
        let ten = BigInt::from(10u8);
        assert_eq!(int_repr(&ten.pow(4299)).unwrap().len(), 4300);
        let err = int_repr(&ten.pow(4300)).unwrap_err();
        assert_eq!(err.exception, "ValueError");
        assert!(err.message.starts_with("Exceeds the limit (4300 digits)"));
    }

    #[test]
    fn test_string_formats() {
        assert_eq!(format_value(&Value::str("ab"), "^6").unwrap(), "  ab  ");
        assert_eq!(format_value(&Value::str("ab"), "*>4").unwrap(), "**ab");
        assert_eq!(format_value(&Value::str("abcdef"), ".3").unwrap(), "abc");
        assert!(format_value(&Value::str("ab"), "d").is_err());
    }

    #[test]
    fn test_round_float() {
        assert_eq!(round_float(2.675, 2), 2.67);
        assert_eq!(round_float(3.14159, 3), 3.142);
        assert_eq!(round_float(1234.0, -2), 1200.0);
    }

    #[test]
    fn test_percent_format() {
        let args = [Value::str("x"), Value::int(7), Value::Float(2.5)];
        assert_eq!(
            percent_format("%s=%03d (%.2f) 100%%", &args).unwrap(),
            "x=007 (2.50) 100%"
        );
        assert_eq!(percent_format("%-4s|", &[Value::str("ab")]).unwrap(), "ab  |");
        assert_eq!(percent_format("%r", &[Value::str("q")]).unwrap(), "'q'");

        let err = percent_format("%d %d", &[Value::int(1)]).unwrap_err();
        assert_eq!(err.message, "not enough arguments for format string");
        let err = percent_format("%d", &[Value::int(1), Value::int(2)]).unwrap_err();
        assert_eq!(
            err.message,
            "not all arguments converted during string formatting"
        );
    }
}
