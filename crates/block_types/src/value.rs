//! IEC value model
//!
//! Kind-tagged values that flow through data connections and live in block
//! port variables. Values are owned by the block instance that declares the
//! port; connections only copy them.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Value Kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Data kinds supported by the engine
///
/// The scalar kinds mirror the IEC elementary types; arrays carry a fixed
/// element kind and length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum ValueKind {
    /// Boolean
    Bool,
    /// 8-bit signed integer
    Sint,
    /// 16-bit signed integer
    Int,
    /// 32-bit signed integer
    Dint,
    /// 64-bit signed integer
    Lint,
    /// 8-bit unsigned integer
    Usint,
    /// 16-bit unsigned integer
    Uint,
    /// 32-bit unsigned integer
    Udint,
    /// 64-bit unsigned integer
    Ulint,
    /// 32-bit floating point
    Real,
    /// 64-bit floating point
    Lreal,
    /// UTF-8 string
    Str,
    /// Fixed-length array of a single element kind
    Array { element: Box<ValueKind>, len: usize },
}

impl ValueKind {
    /// The default value a port variable of this kind starts with
    pub fn default_value(&self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Sint => Value::Sint(0),
            ValueKind::Int => Value::Int(0),
            ValueKind::Dint => Value::Dint(0),
            ValueKind::Lint => Value::Lint(0),
            ValueKind::Usint => Value::Usint(0),
            ValueKind::Uint => Value::Uint(0),
            ValueKind::Udint => Value::Udint(0),
            ValueKind::Ulint => Value::Ulint(0),
            ValueKind::Real => Value::Real(0.0),
            ValueKind::Lreal => Value::Lreal(0.0),
            ValueKind::Str => Value::Str(String::new()),
            ValueKind::Array { element, len } => Value::Array {
                element: (**element).clone(),
                items: (0..*len).map(|_| element.default_value()).collect(),
            },
        }
    }

    /// Check if this kind defines an ordering
    pub fn is_ordered(&self) -> bool {
        !matches!(self, ValueKind::Array { .. })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "BOOL"),
            ValueKind::Sint => write!(f, "SINT"),
            ValueKind::Int => write!(f, "INT"),
            ValueKind::Dint => write!(f, "DINT"),
            ValueKind::Lint => write!(f, "LINT"),
            ValueKind::Usint => write!(f, "USINT"),
            ValueKind::Uint => write!(f, "UINT"),
            ValueKind::Udint => write!(f, "UDINT"),
            ValueKind::Ulint => write!(f, "ULINT"),
            ValueKind::Real => write!(f, "REAL"),
            ValueKind::Lreal => write!(f, "LREAL"),
            ValueKind::Str => write!(f, "STRING"),
            ValueKind::Array { element, len } => write!(f, "ARRAY[{}] OF {}", len, element),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from value operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("cannot parse {text:?} as {kind}")]
    ParseError { kind: ValueKind, text: String },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A kind-tagged value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    Bool(bool),
    Sint(i8),
    Int(i16),
    Dint(i32),
    Lint(i64),
    Usint(u8),
    Uint(u16),
    Udint(u32),
    Ulint(u64),
    Real(f32),
    Lreal(f64),
    Str(String),
    Array { element: ValueKind, items: Vec<Value> },
}

impl Value {
    /// The kind tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Sint(_) => ValueKind::Sint,
            Value::Int(_) => ValueKind::Int,
            Value::Dint(_) => ValueKind::Dint,
            Value::Lint(_) => ValueKind::Lint,
            Value::Usint(_) => ValueKind::Usint,
            Value::Uint(_) => ValueKind::Uint,
            Value::Udint(_) => ValueKind::Udint,
            Value::Ulint(_) => ValueKind::Ulint,
            Value::Real(_) => ValueKind::Real,
            Value::Lreal(_) => ValueKind::Lreal,
            Value::Str(_) => ValueKind::Str,
            Value::Array { element, items } => ValueKind::Array {
                element: Box::new(element.clone()),
                len: items.len(),
            },
        }
    }

    /// Assign from another value of the same kind
    ///
    /// There are no implicit cross-kind coercions; adapters that bridge
    /// foreign representations go through [`crate::ConvertMap`].
    pub fn assign(&mut self, other: &Value) -> Result<(), ValueError> {
        if self.kind() != other.kind() {
            return Err(ValueError::TypeMismatch {
                expected: self.kind(),
                actual: other.kind(),
            });
        }
        *self = other.clone();
        Ok(())
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 (widens from any signed integer kind)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Sint(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::Dint(v) => Some(*v as i64),
            Value::Lint(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as u64 (widens from any unsigned integer kind)
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Usint(v) => Some(*v as u64),
            Value::Uint(v) => Some(*v as u64),
            Value::Udint(v) => Some(*v as u64),
            Value::Ulint(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as f64 (widens from either float kind)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v as f64),
            Value::Lreal(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Bounds-checked array element access
    pub fn elem(&self, index: usize) -> Result<&Value, ValueError> {
        match self {
            Value::Array { items, .. } => items.get(index).ok_or(ValueError::IndexOutOfRange {
                index,
                len: items.len(),
            }),
            other => Err(ValueError::TypeMismatch {
                expected: ValueKind::Array {
                    element: Box::new(other.kind()),
                    len: 0,
                },
                actual: other.kind(),
            }),
        }
    }

    /// Bounds-checked array element assignment
    pub fn set_elem(&mut self, index: usize, value: Value) -> Result<(), ValueError> {
        match self {
            Value::Array { element, items } => {
                if value.kind() != *element {
                    return Err(ValueError::TypeMismatch {
                        expected: element.clone(),
                        actual: value.kind(),
                    });
                }
                let len = items.len();
                let slot = items
                    .get_mut(index)
                    .ok_or(ValueError::IndexOutOfRange { index, len })?;
                *slot = value;
                Ok(())
            }
            other => Err(ValueError::TypeMismatch {
                expected: ValueKind::Array {
                    element: Box::new(other.kind()),
                    len: 0,
                },
                actual: other.kind(),
            }),
        }
    }
}

// Values of the same kind compare; cross-kind comparison is undefined.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Sint(a), Value::Sint(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Dint(a), Value::Dint(b)) => a.partial_cmp(b),
            (Value::Lint(a), Value::Lint(b)) => a.partial_cmp(b),
            (Value::Usint(a), Value::Usint(b)) => a.partial_cmp(b),
            (Value::Uint(a), Value::Uint(b)) => a.partial_cmp(b),
            (Value::Udint(a), Value::Udint(b)) => a.partial_cmp(b),
            (Value::Ulint(a), Value::Ulint(b)) => a.partial_cmp(b),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Lreal(a), Value::Lreal(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Sint(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Dint(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Lint(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Usint(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Uint(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Udint(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Ulint(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Lreal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Text Conversion
// ─────────────────────────────────────────────────────────────────────────────

impl Value {
    /// Render as an IEC-flavoured text literal
    ///
    /// Booleans render as `TRUE`/`FALSE`, strings as `'...'` with `$$` and
    /// `$'` escapes, arrays as `[a, b, c]`.
    pub fn to_text(&self) -> String {
        match self {
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Sint(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Dint(v) => v.to_string(),
            Value::Lint(v) => v.to_string(),
            Value::Usint(v) => v.to_string(),
            Value::Uint(v) => v.to_string(),
            Value::Udint(v) => v.to_string(),
            Value::Ulint(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Lreal(v) => v.to_string(),
            Value::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '$' => out.push_str("$$"),
                        '\'' => out.push_str("$'"),
                        c => out.push(c),
                    }
                }
                out.push('\'');
                out
            }
            Value::Array { items, .. } => {
                let body: Vec<String> = items.iter().map(|v| v.to_text()).collect();
                format!("[{}]", body.join(", "))
            }
        }
    }

    /// Parse a text literal into a value of the given kind
    pub fn from_text(kind: &ValueKind, text: &str) -> Result<Value, ValueError> {
        let text = text.trim();
        let err = || ValueError::ParseError {
            kind: kind.clone(),
            text: text.to_string(),
        };

        match kind {
            ValueKind::Bool => match text.to_ascii_uppercase().as_str() {
                "TRUE" | "1" => Ok(Value::Bool(true)),
                "FALSE" | "0" => Ok(Value::Bool(false)),
                _ => Err(err()),
            },
            ValueKind::Sint => text.parse().map(Value::Sint).map_err(|_| err()),
            ValueKind::Int => text.parse().map(Value::Int).map_err(|_| err()),
            ValueKind::Dint => text.parse().map(Value::Dint).map_err(|_| err()),
            ValueKind::Lint => text.parse().map(Value::Lint).map_err(|_| err()),
            ValueKind::Usint => text.parse().map(Value::Usint).map_err(|_| err()),
            ValueKind::Uint => text.parse().map(Value::Uint).map_err(|_| err()),
            ValueKind::Udint => text.parse().map(Value::Udint).map_err(|_| err()),
            ValueKind::Ulint => text.parse().map(Value::Ulint).map_err(|_| err()),
            ValueKind::Real => text.parse().map(Value::Real).map_err(|_| err()),
            ValueKind::Lreal => text.parse().map(Value::Lreal).map_err(|_| err()),
            ValueKind::Str => parse_string_literal(text).ok_or_else(err).map(Value::Str),
            ValueKind::Array { element, len } => {
                let inner = text
                    .strip_prefix('[')
                    .and_then(|t| t.strip_suffix(']'))
                    .ok_or_else(err)?;
                let parts = split_top_level(inner);
                if parts.len() != *len && !(parts.is_empty() && *len == 0) {
                    return Err(err());
                }
                let items = parts
                    .iter()
                    .map(|p| Value::from_text(element, p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array {
                    element: (**element).clone(),
                    items,
                })
            }
        }
    }
}

/// Unescape a `'...'` string literal
fn parse_string_literal(text: &str) -> Option<String> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.next()? {
                '$' => out.push('$'),
                '\'' => out.push('\''),
                _ => return None,
            }
        } else if c == '\'' {
            // unescaped quote inside the literal
            return None;
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Split a bracketed array body at top-level commas
///
/// Respects nested brackets and quoted strings (including `$`-escapes).
fn split_top_level(body: &str) -> Vec<&str> {
    let body = body.trim();
    if body.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0usize;

    for (i, c) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '$' {
                escaped = true;
            } else if c == '\'' {
                in_string = false;
            }
            continue;
        }
        match c {
            '\'' => in_string = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
