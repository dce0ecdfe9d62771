use std::cmp::Ordering;
use std::rc::Rc;

use regex::{Captures, RegexBuilder};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::error::ScriptError;
use super::interpreter::{check_string_len, declare, js_pow, Env, Interpreter};
use super::value::{
    format_number, join_values, same_value_zero, strict_equals, BoundMethod, HostFn, JsRegex,
    Value,
};

const MAX_ARRAY_LEN: usize = 1 << 24;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

const STRING_METHODS: &[&str] = &[
    "toLowerCase",
    "toUpperCase",
    "trim",
    "trimStart",
    "trimEnd",
    "split",
    "includes",
    "indexOf",
    "lastIndexOf",
    "startsWith",
    "endsWith",
    "charAt",
    "charCodeAt",
    "slice",
    "substring",
    "repeat",
    "replace",
    "replaceAll",
    "match",
    "padStart",
    "padEnd",
    "concat",
    "normalize",
    "localeCompare",
    "toString",
];

const ARRAY_METHODS: &[&str] = &[
    "push",
    "pop",
    "shift",
    "unshift",
    "join",
    "reverse",
    "includes",
    "indexOf",
    "lastIndexOf",
    "slice",
    "concat",
    "map",
    "filter",
    "reduce",
    "forEach",
    "some",
    "every",
    "find",
    "findIndex",
    "sort",
    "toString",
];

pub(crate) fn install_globals(globals: &Env) {
    let math = Value::object(vec![
        (Rc::from("abs"), Value::Host(HostFn::MathAbs)),
        (Rc::from("floor"), Value::Host(HostFn::MathFloor)),
        (Rc::from("ceil"), Value::Host(HostFn::MathCeil)),
        (Rc::from("round"), Value::Host(HostFn::MathRound)),
        (Rc::from("max"), Value::Host(HostFn::MathMax)),
        (Rc::from("min"), Value::Host(HostFn::MathMin)),
        (Rc::from("pow"), Value::Host(HostFn::MathPow)),
        (Rc::from("sqrt"), Value::Host(HostFn::MathSqrt)),
        (Rc::from("trunc"), Value::Host(HostFn::MathTrunc)),
        (Rc::from("sign"), Value::Host(HostFn::MathSign)),
        (Rc::from("PI"), Value::Number(std::f64::consts::PI)),
        (Rc::from("E"), Value::Number(std::f64::consts::E)),
    ]);
    let array = Value::object(vec![(Rc::from("isArray"), Value::Host(HostFn::ArrayIsArray))]);
    let object = Value::object(vec![
        (Rc::from("keys"), Value::Host(HostFn::ObjectKeys)),
        (Rc::from("values"), Value::Host(HostFn::ObjectValues)),
        (Rc::from("entries"), Value::Host(HostFn::ObjectEntries)),
    ]);

    declare(globals, "Math", math, true);
    declare(globals, "Array", array, true);
    declare(globals, "Object", object, true);
    declare(globals, "Number", Value::Host(HostFn::Number), true);
    declare(globals, "String", Value::Host(HostFn::String), true);
    declare(globals, "Boolean", Value::Host(HostFn::Boolean), true);
    declare(globals, "parseInt", Value::Host(HostFn::ParseInt), true);
    declare(globals, "parseFloat", Value::Host(HostFn::ParseFloat), true);
    declare(globals, "isNaN", Value::Host(HostFn::IsNaN), true);
    declare(globals, "NaN", Value::Number(f64::NAN), false);
    declare(globals, "Infinity", Value::Number(f64::INFINITY), false);
}

/// The capability object handed to scripts as `console`.
pub(crate) fn console_object() -> Value {
    Value::object(vec![
        (Rc::from("log"), Value::Host(HostFn::ConsoleLog)),
        (Rc::from("assert"), Value::Host(HostFn::ConsoleAssert)),
    ])
}

pub(crate) fn make_regex(pattern: &str, flags: &str) -> Result<Value, ScriptError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|err| {
            let reason = err.to_string();
            let reason = reason.lines().last().unwrap_or_default().trim().to_string();
            ScriptError::Syntax(format!(
                "Invalid regular expression: /{}/: {}",
                pattern, reason
            ))
        })?;
    Ok(Value::Regex(Rc::new(JsRegex {
        source: pattern.to_string(),
        flags: flags.to_string(),
        regex,
    })))
}

pub(crate) fn construct(name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let error_name = match name {
        "Error" => "Error",
        "TypeError" => "TypeError",
        "RangeError" => "RangeError",
        "SyntaxError" => "SyntaxError",
        "ReferenceError" => "ReferenceError",
        _ => {
            return Err(ScriptError::type_error(format!(
                "{} is not a constructor",
                name
            )))
        }
    };
    let message = match args.first() {
        None | Some(Value::Undefined) => String::new(),
        Some(value) => value.to_js_string(),
    };
    Ok(Value::error_object(error_name, message))
}

// ---- property access ---------------------------------------------------

fn bound(receiver: &Value, name: &str) -> Value {
    Value::Method(Rc::new(BoundMethod {
        receiver: receiver.clone(),
        name: Rc::from(name),
    }))
}

fn array_index(key: &str) -> Option<usize> {
    let index = key.parse::<usize>().ok()?;
    (index.to_string() == key).then_some(index)
}

pub(crate) fn check_array_len(len: usize) -> Result<(), ScriptError> {
    if len > MAX_ARRAY_LEN {
        return Err(ScriptError::Range("Invalid array length".to_string()));
    }
    Ok(())
}

/// String built from UTF-16 code units; unpaired surrogates become U+FFFD.
fn from_units(units: &[u16]) -> Value {
    Value::from(String::from_utf16_lossy(units))
}

fn index_key(index: usize) -> Rc<str> {
    Rc::from(index.to_string().as_str())
}

/// Values produced by spreading or destructuring `value`.
pub(crate) fn iterable_items(value: &Value) -> Result<Vec<Value>, ScriptError> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        // Strings iterate by code point, not by code unit.
        Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        other => Err(ScriptError::type_error(format!(
            "{} is not iterable",
            other.inspect()
        ))),
    }
}

/// Own enumerable properties: integer keys ascending, then the rest in insertion order.
pub(crate) fn own_entries(value: &Value) -> Vec<(Rc<str>, Value)> {
    match value {
        Value::Object(object) => {
            let object = object.borrow();
            let mut indexed: Vec<(usize, &(Rc<str>, Value))> = object
                .props
                .iter()
                .filter_map(|entry| array_index(&entry.0).map(|index| (index, entry)))
                .collect();
            indexed.sort_by_key(|(index, _)| *index);
            let entries: Vec<(Rc<str>, Value)> = indexed
                .into_iter()
                .map(|(_, entry)| entry.clone())
                .chain(
                    object
                        .props
                        .iter()
                        .filter(|entry| array_index(&entry.0).is_none())
                        .cloned(),
                )
                .collect();
            entries
        }
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(index, item)| (index_key(index), item.clone()))
            .collect(),
        Value::Str(s) => s
            .encode_utf16()
            .enumerate()
            .map(|(index, unit)| (index_key(index), from_units(&[unit])))
            .collect(),
        _ => Vec::new(),
    }
}

/// Keys visited by `for...in`.
pub(crate) fn own_keys(value: &Value) -> Vec<Value> {
    own_entries(value)
        .into_iter()
        .map(|(key, _)| Value::Str(key))
        .collect()
}

/// The `in` operator.
pub(crate) fn has_property(object: &Value, key: &str) -> Result<bool, ScriptError> {
    match object {
        Value::Object(props) => Ok(props.borrow().get(key).is_some()),
        Value::Array(items) => Ok(key == "length"
            || ARRAY_METHODS.contains(&key)
            || array_index(key).is_some_and(|index| index < items.borrow().len())),
        Value::Function(_) | Value::Host(_) | Value::Method(_) | Value::Regex(_) => {
            Ok(!matches!(get_property(object, key)?, Value::Undefined))
        }
        primitive => Err(ScriptError::type_error(format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            key,
            primitive.to_js_string()
        ))),
    }
}

pub(crate) fn get_property(object: &Value, key: &str) -> Result<Value, ScriptError> {
    let value = match object {
        Value::Undefined | Value::Null => {
            return Err(ScriptError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                object.to_js_string(),
                key
            )))
        }
        // Lengths and indices count UTF-16 code units.
        Value::Str(s) => {
            if key == "length" {
                Value::Number(s.encode_utf16().count() as f64)
            } else if let Some(index) = array_index(key) {
                s.encode_utf16()
                    .nth(index)
                    .map_or(Value::Undefined, |unit| from_units(&[unit]))
            } else if STRING_METHODS.contains(&key) {
                bound(object, key)
            } else {
                Value::Undefined
            }
        }
        Value::Array(items) => {
            if key == "length" {
                Value::Number(items.borrow().len() as f64)
            } else if let Some(index) = array_index(key) {
                items.borrow().get(index).cloned().unwrap_or(Value::Undefined)
            } else if ARRAY_METHODS.contains(&key) {
                bound(object, key)
            } else {
                Value::Undefined
            }
        }
        Value::Object(props) => props.borrow().get(key).cloned().unwrap_or(Value::Undefined),
        Value::Number(_) | Value::Bool(_) => match key {
            "toFixed" if matches!(object, Value::Number(_)) => bound(object, key),
            "toString" => bound(object, key),
            _ => Value::Undefined,
        },
        Value::Regex(re) => match key {
            "test" | "toString" => bound(object, key),
            "source" => Value::from(re.source.as_str()),
            "flags" => Value::from(re.flags.as_str()),
            "global" => Value::Bool(re.is_global()),
            _ => Value::Undefined,
        },
        Value::Host(host) => match (host, key) {
            (HostFn::Number, "isInteger") => Value::Host(HostFn::NumberIsInteger),
            (HostFn::Number, "isNaN") => Value::Host(HostFn::NumberIsNaN),
            (_, "name") => Value::from(host.name()),
            _ => Value::Undefined,
        },
        Value::Function(closure) => match key {
            "name" => Value::from(closure.def.name.as_deref().unwrap_or("")),
            "length" => Value::Number(
                closure
                    .def
                    .params
                    .iter()
                    .take_while(|param| param.default.is_none())
                    .count() as f64,
            ),
            _ => Value::Undefined,
        },
        Value::Method(_) => Value::Undefined,
    };
    Ok(value)
}

pub(crate) fn set_property(object: &Value, key: &str, value: Value) -> Result<(), ScriptError> {
    match object {
        Value::Undefined | Value::Null => Err(ScriptError::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            object.to_js_string(),
            key
        ))),
        Value::Array(items) => {
            if key == "length" {
                let len = value.to_number();
                if len < 0.0 || len.fract() != 0.0 || len > MAX_ARRAY_LEN as f64 {
                    return Err(ScriptError::Range("Invalid array length".to_string()));
                }
                items.borrow_mut().resize(len as usize, Value::Undefined);
            } else if let Some(index) = array_index(key) {
                check_array_len(index + 1)?;
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
            }
            Ok(())
        }
        Value::Object(props) => {
            props.borrow_mut().set(key, value);
            Ok(())
        }
        // Writes to primitives are silently dropped in sloppy mode.
        _ => Ok(()),
    }
}

// ---- argument helpers --------------------------------------------------

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn number_arg(args: &[Value], index: usize) -> f64 {
    arg(args, index).to_number()
}

/// ToIntegerOrInfinity.
fn integer_arg(args: &[Value], index: usize, default: f64) -> f64 {
    match args.get(index) {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() {
                0.0
            } else {
                n.trunc()
            }
        }
    }
}

/// Resolves a relative start/end index against `len`, the way `slice` does.
fn relative_index(n: f64, len: usize) -> usize {
    let len_f = len as f64;
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}

fn string_arg(args: &[Value], index: usize) -> String {
    arg(args, index).to_js_string()
}

// ---- host functions ----------------------------------------------------

pub(crate) fn call_host(
    interp: &mut Interpreter<'_>,
    host: HostFn,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let value = match host {
        HostFn::ConsoleLog => {
            interp.console.log(join_values(&args, " ", 0));
            Value::Undefined
        }
        HostFn::ConsoleAssert => {
            let condition = arg(&args, 0).truthy();
            let message = arg(&args, 1);
            let message = message.truthy().then(|| message.to_js_string());
            interp.console.assert(condition, message);
            Value::Undefined
        }
        HostFn::MathAbs => Value::Number(number_arg(&args, 0).abs()),
        HostFn::MathFloor => Value::Number(number_arg(&args, 0).floor()),
        HostFn::MathCeil => Value::Number(number_arg(&args, 0).ceil()),
        HostFn::MathRound => {
            let n = number_arg(&args, 0);
            // Halves round towards +Infinity.
            Value::Number(if n.fract() == -0.5 { n.ceil() } else { n.round() })
        }
        HostFn::MathMax => Value::Number(fold_numbers(&args, f64::NEG_INFINITY, f64::max)),
        HostFn::MathMin => Value::Number(fold_numbers(&args, f64::INFINITY, f64::min)),
        HostFn::MathPow => Value::Number(js_pow(number_arg(&args, 0), number_arg(&args, 1))),
        HostFn::MathSqrt => Value::Number(number_arg(&args, 0).sqrt()),
        HostFn::MathTrunc => Value::Number(number_arg(&args, 0).trunc()),
        HostFn::MathSign => {
            let n = number_arg(&args, 0);
            Value::Number(if n.is_nan() || n == 0.0 { n } else { n.signum() })
        }
        HostFn::Number => Value::Number(if args.is_empty() {
            0.0
        } else {
            number_arg(&args, 0)
        }),
        HostFn::NumberIsInteger => Value::Bool(
            matches!(args.first(), Some(Value::Number(n)) if n.is_finite() && n.trunc() == *n),
        ),
        HostFn::NumberIsNaN => {
            Value::Bool(matches!(args.first(), Some(Value::Number(n)) if n.is_nan()))
        }
        HostFn::String => Value::from(if args.is_empty() {
            String::new()
        } else {
            string_arg(&args, 0)
        }),
        HostFn::Boolean => Value::Bool(arg(&args, 0).truthy()),
        HostFn::ParseInt => {
            let radix = integer_arg(&args, 1, 0.0);
            Value::Number(parse_int(&string_arg(&args, 0), radix))
        }
        HostFn::ParseFloat => Value::Number(parse_float(&string_arg(&args, 0))),
        HostFn::IsNaN => Value::Bool(number_arg(&args, 0).is_nan()),
        HostFn::ArrayIsArray => Value::Bool(matches!(args.first(), Some(Value::Array(_)))),
        HostFn::ObjectKeys | HostFn::ObjectValues | HostFn::ObjectEntries => {
            let target = arg(&args, 0);
            if target.is_nullish() {
                return Err(ScriptError::type_error(
                    "Cannot convert undefined or null to object",
                ));
            }
            let items = own_entries(&target)
                .into_iter()
                .map(|(key, value)| match host {
                    HostFn::ObjectKeys => Value::Str(key),
                    HostFn::ObjectValues => value,
                    _ => Value::array(vec![Value::Str(key), value]),
                })
                .collect();
            Value::array(items)
        }
    };
    Ok(value)
}

fn fold_numbers(args: &[Value], initial: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut acc = initial;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = pick(acc, n);
    }
    acc
}

fn parse_int(input: &str, radix: f64) -> f64 {
    let mut s = input.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    let mut radix = radix as u32;
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = s.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .iter()
        .fold(0.0, |acc, digit| acc * f64::from(radix) + f64::from(*digit));
    sign * value
}

fn parse_float(input: &str) -> f64 {
    let s = input.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if s.starts_with(prefix) {
            return f64::INFINITY;
        }
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    // Longest prefix that parses as a decimal literal.
    let candidate: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        .collect();
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

// ---- methods -----------------------------------------------------------

pub(crate) fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match receiver {
        Value::Str(s) => string_method(interp, s, name, args),
        Value::Array(_) => array_method(interp, receiver, name, args),
        Value::Number(n) => number_method(*n, name, &args),
        Value::Regex(re) => match name {
            "test" => Ok(Value::Bool(re.regex.is_match(&string_arg(&args, 0)))),
            _ => Ok(Value::from(receiver.to_js_string())),
        },
        _ => Ok(Value::from(receiver.to_js_string())),
    }
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match name {
        "toFixed" => {
            let digits = integer_arg(args, 0, 0.0);
            if !(0.0..=100.0).contains(&digits) {
                return Err(ScriptError::Range(
                    "toFixed() digits argument must be between 0 and 100".to_string(),
                ));
            }
            Ok(Value::from(to_fixed(n, digits as usize)))
        }
        _ => {
            let radix = integer_arg(args, 0, 10.0);
            if !(2.0..=36.0).contains(&radix) {
                return Err(ScriptError::Range(
                    "toString() radix must be between 2 and 36".to_string(),
                ));
            }
            Ok(Value::from(to_radix_string(n, radix as u32)))
        }
    }
}

fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return format_number(n);
    }
    let scale = 10f64.powi(digits as i32);
    let scaled = n.abs() * scale;
    // Exact ties round away from zero, unlike Rust's formatter.
    if scaled.fract() == 0.5 && scaled < 2f64.powi(52) {
        let units = (scaled.floor() as u64 + 1).to_string();
        let padded = format!("{:0>width$}", units, width = digits + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - digits);
        let sign = if n < 0.0 { "-" } else { "" };
        return if digits == 0 {
            format!("{}{}", sign, int_part)
        } else {
            format!("{}{}.{}", sign, int_part, frac_part)
        };
    }
    format!("{:.*}", digits, n)
}

/// `Number.prototype.toString(radix)`: the shortest digits that read back
/// to the same double, fractional part included.
fn to_radix_string(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return format_number(n);
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let base = f64::from(radix);
    let value = n.abs();
    let mut integer = value.floor();
    let mut fraction = value - integer;
    // Half the gap to the next double bounds the digits worth printing.
    let next = f64::from_bits(value.to_bits() + 1);
    let mut delta = (0.5 * (next - value)).max(f64::from_bits(1));

    let mut fraction_digits: Vec<u32> = Vec::new();
    if fraction >= delta {
        loop {
            fraction *= base;
            delta *= base;
            let digit = fraction.floor() as u32;
            fraction_digits.push(digit);
            fraction -= f64::from(digit);
            let round_up = fraction > 0.5 || (fraction == 0.5 && digit % 2 == 1);
            if round_up && fraction + delta > 1.0 {
                // Carry into the previous digits, possibly up to the integer part.
                loop {
                    match fraction_digits.pop() {
                        Some(last) if last + 1 < radix => {
                            fraction_digits.push(last + 1);
                            break;
                        }
                        Some(_) => {}
                        None => {
                            integer += 1.0;
                            break;
                        }
                    }
                }
                break;
            }
            if fraction < delta {
                break;
            }
        }
    }

    // Digits below the precision of a double print as zeros.
    let mut integer_digits: Vec<u32> = Vec::new();
    while integer / base >= 2f64.powi(53) {
        integer /= base;
        integer_digits.push(0);
    }
    loop {
        let remainder = integer % base;
        integer_digits.push(remainder as u32);
        integer = (integer - remainder) / base;
        if integer <= 0.0 {
            break;
        }
    }

    let digit_char = |digit: &u32| std::char::from_digit(*digit, radix).unwrap_or('0');
    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    out.extend(integer_digits.iter().rev().map(digit_char));
    if !fraction_digits.is_empty() {
        out.push('.');
        out.extend(fraction_digits.iter().map(digit_char));
    }
    out
}

fn unit_index_of(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn normalize(s: &str, form: &str) -> Result<String, ScriptError> {
    let normalized = match form {
        "NFC" => s.nfc().collect(),
        "NFD" => s.nfd().collect(),
        "NFKC" => s.nfkc().collect(),
        "NFKD" => s.nfkd().collect(),
        _ => {
            return Err(ScriptError::Range(
                "The normalization form should be one of NFC, NFD, NFKC, NFKD.".to_string(),
            ))
        }
    };
    Ok(normalized)
}

/// Base letters decide first and accents second; lowercase sorts before uppercase.
fn locale_compare(a: &str, b: &str) -> Ordering {
    let base = |s: &str| -> String {
        s.nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect()
    };
    base(a)
        .cmp(&base(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| b.cmp(a))
}

fn string_method(
    interp: &mut Interpreter<'_>,
    s: &Rc<str>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len();
    let value = match name {
        "toLowerCase" => Value::from(s.to_lowercase()),
        "toUpperCase" => Value::from(s.to_uppercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "toString" => Value::Str(s.clone()),
        "charAt" => {
            let index = integer_arg(&args, 0, 0.0);
            match (index >= 0.0).then(|| units.get(index as usize)).flatten() {
                Some(unit) => from_units(std::slice::from_ref(unit)),
                None => Value::from(""),
            }
        }
        "charCodeAt" => {
            let index = integer_arg(&args, 0, 0.0);
            let code = (index >= 0.0)
                .then(|| units.get(index as usize))
                .flatten()
                .map_or(f64::NAN, |unit| f64::from(*unit));
            Value::Number(code)
        }
        "includes" | "indexOf" | "startsWith" => {
            let needle: Vec<u16> = string_arg(&args, 0).encode_utf16().collect();
            let from = relative_index(integer_arg(&args, 1, 0.0).max(0.0), len);
            match name {
                "includes" => Value::Bool(unit_index_of(&units, &needle, from).is_some()),
                "indexOf" => Value::Number(
                    unit_index_of(&units, &needle, from).map_or(-1.0, |i| i as f64),
                ),
                _ => Value::Bool(units[from..].starts_with(&needle)),
            }
        }
        "lastIndexOf" => {
            let needle: Vec<u16> = string_arg(&args, 0).encode_utf16().collect();
            let found = (needle.len() <= len)
                .then(|| {
                    (0..=len - needle.len())
                        .rev()
                        .find(|&i| units[i..i + needle.len()] == needle[..])
                })
                .flatten();
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "endsWith" => {
            let needle: Vec<u16> = string_arg(&args, 0).encode_utf16().collect();
            let end = relative_index(integer_arg(&args, 1, len as f64).max(0.0), len);
            Value::Bool(units[..end].ends_with(&needle))
        }
        "slice" => {
            let start = relative_index(integer_arg(&args, 0, 0.0), len);
            let end = relative_index(integer_arg(&args, 1, len as f64), len);
            from_units(&units[start..end.max(start)])
        }
        "substring" => {
            let clamp = |n: f64| n.clamp(0.0, len as f64) as usize;
            let a = clamp(integer_arg(&args, 0, 0.0));
            let b = clamp(integer_arg(&args, 1, len as f64));
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            from_units(&units[start..end])
        }
        "normalize" => {
            let form = match args.first() {
                None | Some(Value::Undefined) => "NFC".to_string(),
                Some(value) => value.to_js_string(),
            };
            Value::from(normalize(s, &form)?)
        }
        "localeCompare" => {
            let order = locale_compare(s, &string_arg(&args, 0));
            Value::Number(match order {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            })
        }
        "repeat" => {
            let count = integer_arg(&args, 0, 0.0);
            if count < 0.0 || count.is_infinite() {
                return Err(ScriptError::Range(format!(
                    "Invalid count value: {}",
                    format_number(count)
                )));
            }
            check_string_len((count as usize).saturating_mul(s.len()))?;
            Value::from(s.repeat(count as usize))
        }
        "padStart" | "padEnd" => {
            let target = integer_arg(&args, 0, 0.0).max(0.0) as usize;
            check_string_len(target)?;
            let filler = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(value) => value.to_js_string(),
            };
            if target <= len || filler.is_empty() {
                Value::Str(s.clone())
            } else {
                let filler: Vec<u16> = filler.encode_utf16().collect();
                let pad: Vec<u16> = filler.iter().copied().cycle().take(target - len).collect();
                let pad = String::from_utf16_lossy(&pad);
                if name == "padStart" {
                    Value::from(format!("{}{}", pad, s))
                } else {
                    Value::from(format!("{}{}", s, pad))
                }
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for value in &args {
                out.push_str(&value.to_js_string());
            }
            check_string_len(out.len())?;
            Value::from(out)
        }
        "split" => split(s, &args)?,
        "replace" | "replaceAll" => replace(interp, s, name == "replaceAll", &args)?,
        "match" => {
            let re = match arg(&args, 0) {
                Value::Regex(re) => re,
                other => match make_regex(&other.to_js_string(), "")? {
                    Value::Regex(re) => re,
                    _ => return Ok(Value::Null),
                },
            };
            match_regex(&re, s)
        }
        _ => {
            return Err(ScriptError::type_error(format!(
                "{} is not a function",
                name
            )))
        }
    };
    Ok(value)
}

fn split(s: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let limit = match args.get(1) {
        None | Some(Value::Undefined) => usize::MAX,
        Some(value) => value.to_number().max(0.0) as usize,
    };
    let parts: Vec<String> = match arg(args, 0) {
        Value::Undefined => vec![s.to_string()],
        Value::Regex(re) => re.regex.split(s).map(str::to_string).collect(),
        separator => {
            let separator = separator.to_js_string();
            if separator.is_empty() {
                s.encode_utf16()
                    .map(|unit| String::from_utf16_lossy(&[unit]))
                    .collect()
            } else {
                s.split(separator.as_str()).map(str::to_string).collect()
            }
        }
    };
    Ok(Value::array(
        parts.into_iter().take(limit).map(Value::from).collect(),
    ))
}

fn match_regex(re: &JsRegex, s: &str) -> Value {
    if re.is_global() {
        let found: Vec<Value> = re
            .regex
            .find_iter(s)
            .map(|m| Value::from(m.as_str()))
            .collect();
        if found.is_empty() {
            Value::Null
        } else {
            Value::array(found)
        }
    } else {
        match re.regex.captures(s) {
            Some(caps) => Value::array(
                caps.iter()
                    .map(|group| group.map_or(Value::Undefined, |m| Value::from(m.as_str())))
                    .collect(),
            ),
            None => Value::Null,
        }
    }
}

/// Expands `$$`, `$&` and `$n` in a replacement template.
fn expand_replacement(template: &str, whole: &str, groups: &[Option<&str>]) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                out.push_str(whole);
            }
            Some(d) if d.is_ascii_digit() && d != '0' => {
                chars.next();
                let index = d.to_digit(10).unwrap_or(0) as usize;
                if let Some(group) = groups.get(index - 1) {
                    out.push_str(group.unwrap_or(""));
                } else {
                    out.push('$');
                    out.push(d);
                }
            }
            _ => out.push('$'),
        }
    }
    out
}

fn replacement_for(
    interp: &mut Interpreter<'_>,
    replacement: &Value,
    whole: &str,
    groups: &[Option<&str>],
    offset: usize,
    input: &str,
) -> Result<String, ScriptError> {
    if replacement.is_callable() {
        let mut call_args = vec![Value::from(whole)];
        call_args.extend(
            groups
                .iter()
                .map(|g| g.map_or(Value::Undefined, Value::from)),
        );
        call_args.push(Value::Number(input[..offset].encode_utf16().count() as f64));
        call_args.push(Value::from(input));
        Ok(interp.call_value(replacement, call_args)?.to_js_string())
    } else {
        Ok(expand_replacement(&replacement.to_js_string(), whole, groups))
    }
}

fn replace(
    interp: &mut Interpreter<'_>,
    s: &str,
    all: bool,
    args: &[Value],
) -> Result<Value, ScriptError> {
    let replacement = arg(args, 1);
    let mut out = String::new();
    let mut last = 0usize;

    match arg(args, 0) {
        Value::Regex(re) => {
            if all && !re.is_global() {
                return Err(ScriptError::type_error(
                    "replaceAll must be called with a global RegExp",
                ));
            }
            let captures: Vec<Captures<'_>> = if re.is_global() {
                re.regex.captures_iter(s).collect()
            } else {
                re.regex.captures(s).into_iter().collect()
            };
            for caps in captures {
                let Some(whole) = caps.get(0) else { continue };
                let groups: Vec<Option<&str>> =
                    caps.iter().skip(1).map(|g| g.map(|m| m.as_str())).collect();
                out.push_str(&s[last..whole.start()]);
                out.push_str(&replacement_for(
                    interp,
                    &replacement,
                    whole.as_str(),
                    &groups,
                    whole.start(),
                    s,
                )?);
                last = whole.end();
                check_string_len(out.len())?;
            }
        }
        pattern => {
            let pattern = pattern.to_js_string();
            let positions: Vec<usize> = if all {
                if pattern.is_empty() {
                    s.char_indices()
                        .map(|(i, _)| i)
                        .chain(std::iter::once(s.len()))
                        .collect()
                } else {
                    s.match_indices(pattern.as_str()).map(|(i, _)| i).collect()
                }
            } else {
                s.find(pattern.as_str()).into_iter().collect()
            };
            for start in positions {
                out.push_str(&s[last..start]);
                out.push_str(&replacement_for(interp, &replacement, &pattern, &[], start, s)?);
                last = start + pattern.len();
                check_string_len(out.len())?;
            }
        }
    }
    out.push_str(&s[last..]);
    Ok(Value::from(out))
}

fn callback_arg(args: &[Value], method: &str) -> Result<Value, ScriptError> {
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Err(ScriptError::type_error(format!(
            "{} is not a function (in Array.{})",
            callback.inspect(),
            method
        )));
    }
    Ok(callback)
}

fn array_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let Value::Array(items) = receiver else {
        return Ok(Value::Undefined);
    };
    let len = items.borrow().len();
    // Element at `index`, read without holding the borrow across callbacks.
    let element = |index: usize| items.borrow().get(index).cloned().unwrap_or(Value::Undefined);

    let value = match name {
        "push" => {
            let mut items = items.borrow_mut();
            check_array_len(items.len() + args.len())?;
            items.extend(args);
            Value::Number(items.len() as f64)
        }
        "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
        "shift" => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        "unshift" => {
            let mut items = items.borrow_mut();
            check_array_len(items.len() + args.len())?;
            items.splice(0..0, args);
            Value::Number(items.len() as f64)
        }
        "join" | "toString" => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(value) if name == "join" => value.to_js_string(),
                Some(_) => ",".to_string(),
            };
            let joined = join_values(&items.borrow(), &separator, 1);
            check_string_len(joined.len())?;
            Value::from(joined)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            receiver.clone()
        }
        "includes" => {
            let needle = arg(&args, 0);
            Value::Bool(items.borrow().iter().any(|v| same_value_zero(v, &needle)))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            let from = relative_index(integer_arg(&args, 1, 0.0), len);
            let found = items
                .borrow()
                .iter()
                .skip(from)
                .position(|v| strict_equals(v, &needle))
                .map(|i| i + from);
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "lastIndexOf" => {
            let needle = arg(&args, 0);
            let found = items.borrow().iter().rposition(|v| strict_equals(v, &needle));
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "slice" => {
            let start = relative_index(integer_arg(&args, 0, 0.0), len);
            let end = relative_index(integer_arg(&args, 1, len as f64), len);
            let slice = items.borrow()[start..end.max(start)].to_vec();
            Value::array(slice)
        }
        "concat" => {
            let mut out = items.borrow().clone();
            for value in args {
                match value {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            check_array_len(out.len())?;
            Value::array(out)
        }
        "map" | "filter" | "forEach" | "some" | "every" | "find" | "findIndex" => {
            let callback = callback_arg(&args, name)?;
            let mut mapped = Vec::new();
            for index in 0..len {
                let item = element(index);
                let result = interp.call_value(
                    &callback,
                    vec![item.clone(), Value::Number(index as f64), receiver.clone()],
                )?;
                match name {
                    "map" => mapped.push(result),
                    "filter" if result.truthy() => mapped.push(item),
                    "some" if result.truthy() => return Ok(Value::Bool(true)),
                    "every" if !result.truthy() => return Ok(Value::Bool(false)),
                    "find" if result.truthy() => return Ok(item),
                    "findIndex" if result.truthy() => return Ok(Value::Number(index as f64)),
                    _ => {}
                }
            }
            match name {
                "map" | "filter" => Value::array(mapped),
                "some" => Value::Bool(false),
                "every" => Value::Bool(true),
                "findIndex" => Value::Number(-1.0),
                _ => Value::Undefined,
            }
        }
        "reduce" => {
            let callback = callback_arg(&args, name)?;
            let (mut acc, start) = match args.get(1) {
                Some(initial) => (initial.clone(), 0),
                None if len == 0 => {
                    return Err(ScriptError::type_error(
                        "Reduce of empty array with no initial value",
                    ))
                }
                None => (element(0), 1),
            };
            for index in start..len {
                acc = interp.call_value(
                    &callback,
                    vec![
                        acc,
                        element(index),
                        Value::Number(index as f64),
                        receiver.clone(),
                    ],
                )?;
            }
            acc
        }
        "sort" => {
            let comparator = match args.first() {
                None | Some(Value::Undefined) => None,
                Some(value) if value.is_callable() => Some(value.clone()),
                Some(_) => {
                    return Err(ScriptError::type_error(
                        "The comparison function must be either a function or undefined",
                    ))
                }
            };
            let snapshot = items.borrow().clone();
            let sorted = merge_sort(snapshot, &mut |a, b| compare_elements(interp, &comparator, a, b))?;
            *items.borrow_mut() = sorted;
            receiver.clone()
        }
        _ => {
            return Err(ScriptError::type_error(format!(
                "{} is not a function",
                name
            )))
        }
    };
    Ok(value)
}

fn compare_elements(
    interp: &mut Interpreter<'_>,
    comparator: &Option<Value>,
    a: &Value,
    b: &Value,
) -> Result<Ordering, ScriptError> {
    // Undefined always sorts last.
    match (a, b) {
        (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
        (Value::Undefined, _) => return Ok(Ordering::Greater),
        (_, Value::Undefined) => return Ok(Ordering::Less),
        _ => {}
    }
    match comparator {
        Some(comparator) => {
            let n = interp
                .call_value(comparator, vec![a.clone(), b.clone()])?
                .to_number();
            Ok(if n > 0.0 {
                Ordering::Greater
            } else if n < 0.0 {
                Ordering::Less
            } else {
                Ordering::Equal
            })
        }
        None => Ok(a.to_js_string().cmp(&b.to_js_string())),
    }
}

/// Stable merge sort with a fallible comparator.
fn merge_sort<F>(mut items: Vec<Value>, compare: &mut F) -> Result<Vec<Value>, ScriptError>
where
    F: FnMut(&Value, &Value) -> Result<Ordering, ScriptError>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare)?;
    let right = merge_sort(right, compare)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => compare(l, r)? == Ordering::Greater,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("  42px", 0.0), 42.0);
        assert_eq!(parse_int("-0x1f", 0.0), -31.0);
        assert_eq!(parse_int("101", 2.0), 5.0);
        assert!(parse_int("abc", 0.0).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("1e3"), 1000.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float("x1").is_nan());
    }

    #[test]
    fn test_to_fixed_rounds_ties_up() {
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(0.125, 2), "0.13");
        assert_eq!(to_fixed(98.6, 1), "98.6");
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(-1.5, 0), "-2");
    }

    #[test]
    fn test_radix_string() {
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(-5.0, 2), "-101");
        assert_eq!(to_radix_string(0.5, 2), "0.1");
        assert_eq!(to_radix_string(0.25, 2), "0.01");
        assert_eq!(to_radix_string(3.75, 16), "3.c");
        assert_eq!(to_radix_string(-0.5, 2), "-0.1");
        assert_eq!(to_radix_string(0.1, 10), "0.1");
        assert_eq!(to_radix_string(0.0, 2), "0");
    }

    #[test]
    fn test_own_entries_order_integer_keys_first() {
        let object = Value::object(vec![
            (Rc::from("b"), Value::Number(1.0)),
            (Rc::from("2"), Value::Number(2.0)),
            (Rc::from("a"), Value::Number(3.0)),
            (Rc::from("1"), Value::Number(4.0)),
        ]);
        let keys: Vec<String> = own_keys(&object).iter().map(Value::to_js_string).collect();
        assert_eq!(keys, vec!["1", "2", "b", "a"]);
        assert_eq!(own_keys(&Value::from("hé")).len(), 2);
        assert!(own_keys(&Value::Null).is_empty());
    }

    #[test]
    fn test_normalize_and_locale_compare() {
        let decomposed = normalize("ção", "NFD").unwrap();
        assert_eq!(decomposed.chars().count(), 5);
        assert_eq!(normalize(&decomposed, "NFC").unwrap(), "ção");
        assert!(matches!(normalize("x", "nfd"), Err(ScriptError::Range(_))));

        assert_eq!(locale_compare("a", "b"), Ordering::Less);
        assert_eq!(locale_compare("a", "B"), Ordering::Less);
        assert_eq!(locale_compare("é", "f"), Ordering::Less);
        assert_eq!(locale_compare("e", "é"), Ordering::Less);
        assert_eq!(locale_compare("a", "A"), Ordering::Less);
        assert_eq!(locale_compare("abc", "abc"), Ordering::Equal);
    }

    #[test]
    fn test_expand_replacement() {
        assert_eq!(
            expand_replacement("[$1|$&|$$]", "ab", &[Some("a")]),
            "[a|ab|$]"
        );
    }
}
