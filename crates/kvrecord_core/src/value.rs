//! Dynamic attribute values and per-kind coercion.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// The declared kind of a persistent attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Signed integer.
    Integer,
    /// Floating-point number.
    Float,
    /// Text string.
    String,
    /// Interned canonical token.
    Symbol,
    /// Boolean flag.
    Boolean,
    /// Calendar timestamp, persisted as Unix seconds.
    DateTime,
}

/// A dynamic attribute value.
///
/// Every attribute of a record holds one of these. Assignment always goes
/// through [`coerce`], so a value read back from an attribute is already in
/// the canonical shape for its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value. Saving a null over a previously set value deletes
    /// the stored field.
    Null,
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    Str(String),
    /// Symbol value (canonical token).
    Symbol(String),
    /// Boolean value.
    Bool(bool),
    /// Timestamp value.
    DateTime(OffsetDateTime),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is a string or symbol.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    pub fn as_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            Value::DateTime(t) => Some(*t),
            _ => None,
        }
    }

    /// Renders this value as a plain string.
    ///
    /// Null renders as the empty string; timestamps render as Unix seconds.
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) | Value::Symbol(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::DateTime(t) => t.unix_timestamp().to_string(),
        }
    }

    /// Encodes this value as a stored field string.
    ///
    /// Returns `None` for null: null attributes are never written, they
    /// delete the field instead.
    pub fn encode_field(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.stringify())
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(t: OffsetDateTime) -> Self {
        Value::DateTime(t)
    }
}

/// Coerces an input value to the canonical shape for a declared kind.
///
/// `bool_default` is the value a null input coerces to for boolean
/// attributes; all other kinds keep null as null so that saving can turn
/// it into a field deletion.
///
/// Coercion is lenient and idempotent; it never fails. Numeric kinds parse
/// the longest numeric prefix of string input and fall back to zero,
/// matching lenient numeric-string coercion.
pub fn coerce(kind: AttrKind, value: Value, bool_default: bool) -> Value {
    match kind {
        AttrKind::Integer => match value {
            Value::Null => Value::Null,
            Value::Int(n) => Value::Int(n),
            Value::Float(f) => Value::Int(f as i64),
            Value::Bool(b) => Value::Int(i64::from(b)),
            Value::DateTime(t) => Value::Int(t.unix_timestamp()),
            Value::Str(s) | Value::Symbol(s) => Value::Int(lenient_i64(&s)),
        },
        AttrKind::Float => match value {
            Value::Null => Value::Null,
            Value::Float(f) => Value::Float(f),
            Value::Int(n) => Value::Float(n as f64),
            Value::Bool(b) => Value::Float(f64::from(u8::from(b))),
            Value::DateTime(t) => Value::Float(t.unix_timestamp() as f64),
            Value::Str(s) | Value::Symbol(s) => Value::Float(lenient_f64(&s)),
        },
        AttrKind::String => match value {
            Value::Null => Value::Null,
            Value::Str(s) => Value::Str(s),
            other => Value::Str(other.stringify()),
        },
        AttrKind::Symbol => match value {
            Value::Null => Value::Null,
            Value::Symbol(s) => Value::Symbol(s),
            other => Value::Symbol(other.stringify()),
        },
        AttrKind::Boolean => coerce_boolean(value, bool_default),
        AttrKind::DateTime => coerce_datetime(value),
    }
}

fn coerce_boolean(value: Value, default: bool) -> Value {
    match value {
        Value::Null => Value::Bool(default),
        Value::Bool(b) => Value::Bool(b),
        Value::Int(n) => match n {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            _ => Value::Bool(true),
        },
        Value::Float(f) => Value::Bool(f != 0.0),
        Value::DateTime(_) => Value::Bool(true),
        Value::Str(s) | Value::Symbol(s) => {
            let lower = s.trim().to_ascii_lowercase();
            match lower.as_str() {
                "no" | "false" | "0" => Value::Bool(false),
                "yes" | "true" | "1" => Value::Bool(true),
                "" => Value::Bool(default),
                _ => Value::Bool(true),
            }
        }
    }
}

fn coerce_datetime(value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::DateTime(t) => Value::DateTime(t),
        Value::Int(n) => epoch_value(n),
        Value::Float(f) => epoch_value(f as i64),
        Value::Bool(_) => Value::Null,
        Value::Str(s) | Value::Symbol(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Value::Null;
            }
            // A pure integer is a Unix timestamp, anything else is a
            // calendar string.
            if let Ok(epoch) = trimmed.parse::<i64>() {
                return epoch_value(epoch);
            }
            parse_calendar(trimmed).map_or(Value::Null, Value::DateTime)
        }
    }
}

fn epoch_value(epoch: i64) -> Value {
    OffsetDateTime::from_unix_timestamp(epoch).map_or(Value::Null, Value::DateTime)
}

fn parse_calendar(input: &str) -> Option<OffsetDateTime> {
    if let Ok(t) = OffsetDateTime::parse(input, &Rfc3339) {
        return Some(t);
    }
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(t) = PrimitiveDateTime::parse(input, &format) {
        return Some(t.assume_utc());
    }
    let date_only = format_description!("[year]-[month]-[day]");
    if let Ok(date) = time::Date::parse(input, &date_only) {
        return Some(date.midnight().assume_utc());
    }
    None
}

/// Parses the longest integer prefix of a string, zero if there is none.
fn lenient_i64(input: &str) -> i64 {
    let trimmed = input.trim_start();
    let mut chars = trimmed.chars();
    let mut negative = false;
    let mut digits = String::new();

    if let Some(first) = chars.next() {
        match first {
            '-' => negative = true,
            '+' => {}
            c if c.is_ascii_digit() => digits.push(c),
            _ => return 0,
        }
    }
    for c in chars {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            break;
        }
    }
    if digits.is_empty() {
        return 0;
    }

    let mut result: i64 = 0;
    for d in digits.bytes() {
        result = result
            .saturating_mul(10)
            .saturating_add(i64::from(d - b'0'));
    }
    if negative {
        -result
    } else {
        result
    }
}

/// Parses the longest float prefix of a string, zero if there is none.
fn lenient_f64(input: &str) -> f64 {
    let trimmed = input.trim_start();
    // Restrict to numeric characters first so "inf"/"nan" don't sneak in.
    let candidate: &str = {
        let end = trimmed
            .char_indices()
            .find(|(_, c)| !matches!(c, '0'..='9' | '+' | '-' | '.' | 'e' | 'E'))
            .map_or(trimmed.len(), |(i, _)| i);
        &trimmed[..end]
    };

    let mut best = 0.0;
    for i in 1..=candidate.len() {
        if let Ok(v) = candidate[..i].parse::<f64>() {
            best = v;
        }
    }
    best
}
