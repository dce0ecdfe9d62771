use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::ast::FunctionDef;
use super::interpreter::Env;

// Nested arrays deeper than this stringify as empty, which also breaks cycles.
const MAX_STRINGIFY_DEPTH: usize = 32;

/// A runtime value of the exercise language.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Closure>),
    Host(HostFn),
    /// A method looked up on a primitive, array or regex, bound to its receiver.
    Method(Rc<BoundMethod>),
    Regex(Rc<JsRegex>),
}

#[derive(Debug, Default)]
pub struct Object {
    pub props: Vec<(Rc<str>, Value)>,
    /// Set for objects built by `new Error(..)` and friends.
    pub error_name: Option<&'static str>,
}

impl Object {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props
            .iter()
            .find(|(name, _)| name.as_ref() == key)
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match self.props.iter_mut().find(|(name, _)| name.as_ref() == key) {
            Some((_, slot)) => *slot = value,
            None => self.props.push((Rc::from(key), value)),
        }
    }
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The captured environment may contain this closure.
        write!(f, "[Function {}]", self.def.name.as_deref().unwrap_or("(anonymous)"))
    }
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: Rc<str>,
}

#[derive(Debug)]
pub struct JsRegex {
    pub source: String,
    pub flags: String,
    pub regex: regex::Regex,
}

impl JsRegex {
    pub fn is_global(&self) -> bool {
        self.flags.contains('g')
    }
}

/// Functions provided by the host library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFn {
    ConsoleLog,
    ConsoleAssert,
    MathAbs,
    MathFloor,
    MathCeil,
    MathRound,
    MathMax,
    MathMin,
    MathPow,
    MathSqrt,
    MathTrunc,
    MathSign,
    Number,
    NumberIsInteger,
    NumberIsNaN,
    String,
    Boolean,
    ParseInt,
    ParseFloat,
    IsNaN,
    ArrayIsArray,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
}

impl HostFn {
    pub fn name(self) -> &'static str {
        match self {
            HostFn::ConsoleLog => "log",
            HostFn::ConsoleAssert => "assert",
            HostFn::MathAbs => "abs",
            HostFn::MathFloor => "floor",
            HostFn::MathCeil => "ceil",
            HostFn::MathRound => "round",
            HostFn::MathMax => "max",
            HostFn::MathMin => "min",
            HostFn::MathPow => "pow",
            HostFn::MathSqrt => "sqrt",
            HostFn::MathTrunc => "trunc",
            HostFn::MathSign => "sign",
            HostFn::Number => "Number",
            HostFn::NumberIsInteger => "isInteger",
            HostFn::NumberIsNaN => "isNaN",
            HostFn::String => "String",
            HostFn::Boolean => "Boolean",
            HostFn::ParseInt => "parseInt",
            HostFn::ParseFloat => "parseFloat",
            HostFn::IsNaN => "isNaN",
            HostFn::ArrayIsArray => "isArray",
            HostFn::ObjectKeys => "keys",
            HostFn::ObjectValues => "values",
            HostFn::ObjectEntries => "entries",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Function(closure) => write!(f, "{:?}", closure),
            other => f.write_str(&other.to_js_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: Vec<(Rc<str>, Value)>) -> Self {
        Value::Object(Rc::new(RefCell::new(Object {
            props,
            error_name: None,
        })))
    }

    pub fn error_object(name: &'static str, message: String) -> Self {
        Value::Object(Rc::new(RefCell::new(Object {
            props: vec![
                (Rc::from("name"), Value::from(name)),
                (Rc::from("message"), Value::from(message)),
            ],
            error_name: Some(name),
        })))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Host(_) | Value::Method(_)
        )
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(n.is_nan() || *n == 0.0),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Host(_) | Value::Method(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Regex(_) => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
            _ => f64::NAN,
        }
    }

    pub fn to_js_string(&self) -> String {
        self.stringify(0)
    }

    fn stringify(&self, depth: usize) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => {
                if depth >= MAX_STRINGIFY_DEPTH {
                    return String::new();
                }
                let items = items.borrow();
                join_values(&items, ",", depth + 1)
            }
            Value::Object(object) => {
                let object = object.borrow();
                match object.error_name {
                    Some(name) => {
                        let message = object
                            .get("message")
                            .map(|m| m.stringify(depth + 1))
                            .unwrap_or_default();
                        if message.is_empty() {
                            name.to_string()
                        } else {
                            format!("{}: {}", name, message)
                        }
                    }
                    None => "[object Object]".to_string(),
                }
            }
            Value::Function(closure) => format!(
                "function {}() {{ [code] }}",
                closure.def.name.as_deref().unwrap_or("")
            ),
            Value::Host(host) => format!("function {}() {{ [native code] }}", host.name()),
            Value::Method(method) => {
                format!("function {}() {{ [native code] }}", method.name)
            }
            Value::Regex(re) => format!("/{}/{}", re.source, re.flags),
        }
    }

    /// Short form used in error messages: strings quoted, objects opaque.
    pub fn inspect(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            Value::Object(_) => "#<Object>".to_string(),
            other => other.to_js_string(),
        }
    }

    /// Property key form of the value (`obj[key]`).
    pub fn to_property_key(&self) -> String {
        self.to_js_string()
    }
}

/// `Array.prototype.join` semantics: nullish elements become empty strings.
pub fn join_values(items: &[Value], separator: &str, depth: usize) -> String {
    items
        .iter()
        .map(|item| {
            if item.is_nullish() {
                String::new()
            } else {
                item.stringify(depth)
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Formats a number the way JavaScript's `String(n)` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{}", n);
    }
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

/// `Number(string)` conversion.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts "inf" and "nan"; JavaScript does not.
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Host(x), Value::Host(y)) => x == y,
        (Value::Method(x), Value::Method(y)) => Rc::ptr_eq(x, y),
        (Value::Regex(x), Value::Regex(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() || y.is_nullish() => x.is_nullish() && y.is_nullish(),
        (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_)) => {
            a.to_number() == b.to_number()
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(a.to_number()), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(b.to_number())),
        (Value::Array(_), Value::Number(_) | Value::Str(_)) => {
            loose_equals(&Value::from(a.to_js_string()), b)
        }
        (Value::Number(_) | Value::Str(_), Value::Array(_)) => {
            loose_equals(a, &Value::from(b.to_js_string()))
        }
        _ => strict_equals(a, b),
    }
}

/// Equality used by `includes`: like `===` but `NaN` equals itself.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(98.6), "98.6");
        assert_eq!(format_number(-40.0), "-40");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(123456789.0), "123456789");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
    }

    #[test]
    fn test_truthiness_and_typeof() {
        assert!(!Value::from("").truthy());
        assert!(Value::from("0").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::array(vec![]).truthy());
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Host(HostFn::MathAbs).type_of(), "function");
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(loose_equals(&Value::from("1"), &Value::Number(1.0)));
        assert!(loose_equals(&Value::Bool(true), &Value::from("1")));
        assert!(!strict_equals(&Value::from("1"), &Value::Number(1.0)));
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(same_value_zero(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn test_array_and_error_strings() {
        let nested = Value::array(vec![
            Value::Number(1.0),
            Value::Null,
            Value::array(vec![Value::from("a"), Value::Bool(true)]),
        ]);
        assert_eq!(nested.to_js_string(), "1,,a,true");
        let err = Value::error_object("TypeError", "bad".to_string());
        assert_eq!(err.to_js_string(), "TypeError: bad");
        assert_eq!(err.inspect(), "#<Object>");
        assert_eq!(Value::from("a").inspect(), "\"a\"");
        assert_eq!(Value::Number(5.0).inspect(), "5");
    }
}
