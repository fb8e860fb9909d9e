//! Per-kind value conversion table
//!
//! Protocol adapters bridge engine values into a foreign address space (and
//! back) through converters looked up by kind tag. There is no dynamic
//! casting anywhere; an unregistered kind is a hard error the adapter sees.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{Value, ValueError, ValueKind};

// ─────────────────────────────────────────────────────────────────────────────
// Converter
// ─────────────────────────────────────────────────────────────────────────────

/// Convert an engine value into the adapter-facing JSON representation
pub type ToJson = Arc<dyn Fn(&Value) -> serde_json::Value + Send + Sync>;

/// Convert an adapter-facing JSON value back into an engine value
pub type FromJson = Arc<dyn Fn(&serde_json::Value) -> Result<Value, ValueError> + Send + Sync>;

/// A pair of conversion functions for one value kind
#[derive(Clone)]
pub struct Converter {
    pub to_json: ToJson,
    pub from_json: FromJson,
}

impl Converter {
    pub fn new(
        to_json: impl Fn(&Value) -> serde_json::Value + Send + Sync + 'static,
        from_json: impl Fn(&serde_json::Value) -> Result<Value, ValueError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            to_json: Arc::new(to_json),
            from_json: Arc::new(from_json),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Convert Map
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of converters keyed by value kind
///
/// `with_defaults` covers every scalar kind; arrays without an explicit
/// converter convert element-wise through the element kind's entry.
#[derive(Clone)]
pub struct ConvertMap {
    converters: HashMap<ValueKind, Converter>,
}

impl Default for ConvertMap {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConvertMap {
    /// An empty map with no registered kinds
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// A map covering all scalar kinds with the builtin JSON conversions
    pub fn with_defaults() -> Self {
        let mut map = Self::empty();
        for kind in [
            ValueKind::Bool,
            ValueKind::Sint,
            ValueKind::Int,
            ValueKind::Dint,
            ValueKind::Lint,
            ValueKind::Usint,
            ValueKind::Uint,
            ValueKind::Udint,
            ValueKind::Ulint,
            ValueKind::Real,
            ValueKind::Lreal,
            ValueKind::Str,
        ] {
            map.register(kind.clone(), builtin_converter(kind));
        }
        map
    }

    /// Register (or replace) the converter for a kind
    pub fn register(&mut self, kind: ValueKind, converter: Converter) {
        self.converters.insert(kind, converter);
    }

    /// Look up the converter registered for a kind
    pub fn get(&self, kind: &ValueKind) -> Option<&Converter> {
        self.converters.get(kind)
    }

    /// Convert a value through its kind's converter
    pub fn to_json(&self, value: &Value) -> Result<serde_json::Value, ValueError> {
        let kind = value.kind();
        if let Some(conv) = self.converters.get(&kind) {
            return Ok((conv.to_json)(value));
        }
        if let Value::Array { items, .. } = value {
            let out = items
                .iter()
                .map(|v| self.to_json(v))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(serde_json::Value::Array(out));
        }
        Err(unregistered(&kind))
    }

    /// Convert adapter JSON into a value of the given kind
    pub fn from_json(
        &self,
        kind: &ValueKind,
        json: &serde_json::Value,
    ) -> Result<Value, ValueError> {
        if let Some(conv) = self.converters.get(kind) {
            return (conv.from_json)(json);
        }
        if let ValueKind::Array { element, len } = kind {
            let items = json.as_array().ok_or_else(|| mismatch(kind, json))?;
            if items.len() != *len {
                return Err(mismatch(kind, json));
            }
            let items = items
                .iter()
                .map(|j| self.from_json(element, j))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::Array {
                element: (**element).clone(),
                items,
            });
        }
        Err(unregistered(kind))
    }
}

fn unregistered(kind: &ValueKind) -> ValueError {
    ValueError::ParseError {
        kind: kind.clone(),
        text: "<no converter registered>".to_string(),
    }
}

fn mismatch(kind: &ValueKind, json: &serde_json::Value) -> ValueError {
    ValueError::ParseError {
        kind: kind.clone(),
        text: json.to_string(),
    }
}

fn builtin_converter(kind: ValueKind) -> Converter {
    Converter::new(scalar_to_json, move |j| scalar_from_json(&kind, j))
}

fn scalar_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Sint(v) => serde_json::json!(*v),
        Value::Int(v) => serde_json::json!(*v),
        Value::Dint(v) => serde_json::json!(*v),
        Value::Lint(v) => serde_json::json!(*v),
        Value::Usint(v) => serde_json::json!(*v),
        Value::Uint(v) => serde_json::json!(*v),
        Value::Udint(v) => serde_json::json!(*v),
        Value::Ulint(v) => serde_json::json!(*v),
        Value::Real(v) => serde_json::Number::from_f64(*v as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Lreal(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Array { .. } => serde_json::Value::Null,
    }
}

fn scalar_from_json(kind: &ValueKind, json: &serde_json::Value) -> Result<Value, ValueError> {
    let err = || mismatch(kind, json);
    match kind {
        ValueKind::Bool => json.as_bool().map(Value::Bool).ok_or_else(err),
        ValueKind::Sint => json
            .as_i64()
            .and_then(|v| i8::try_from(v).ok())
            .map(Value::Sint)
            .ok_or_else(err),
        ValueKind::Int => json
            .as_i64()
            .and_then(|v| i16::try_from(v).ok())
            .map(Value::Int)
            .ok_or_else(err),
        ValueKind::Dint => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Dint)
            .ok_or_else(err),
        ValueKind::Lint => json.as_i64().map(Value::Lint).ok_or_else(err),
        ValueKind::Usint => json
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .map(Value::Usint)
            .ok_or_else(err),
        ValueKind::Uint => json
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .map(Value::Uint)
            .ok_or_else(err),
        ValueKind::Udint => json
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Value::Udint)
            .ok_or_else(err),
        ValueKind::Ulint => json.as_u64().map(Value::Ulint).ok_or_else(err),
        ValueKind::Real => json.as_f64().map(|v| Value::Real(v as f32)).ok_or_else(err),
        ValueKind::Lreal => json.as_f64().map(Value::Lreal).ok_or_else(err),
        ValueKind::Str => json
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(err),
        ValueKind::Array { .. } => Err(err()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let map = ConvertMap::with_defaults();
        let samples = vec![
            Value::Bool(true),
            Value::Dint(-42),
            Value::Ulint(9_000_000_000),
            Value::Lreal(2.5),
            Value::Str("zone-1".into()),
        ];
        for v in samples {
            let kind = v.kind();
            let json = map.to_json(&v).unwrap();
            let back = map.from_json(&kind, &json).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn test_array_element_wise() {
        let map = ConvertMap::with_defaults();
        let v = Value::Array {
            element: ValueKind::Dint,
            items: vec![Value::Dint(1), Value::Dint(2)],
        };
        let json = map.to_json(&v).unwrap();
        assert_eq!(json, serde_json::json!([1, 2]));

        let kind = v.kind();
        assert_eq!(map.from_json(&kind, &json).unwrap(), v);
    }

    #[test]
    fn test_range_checked() {
        let map = ConvertMap::with_defaults();
        let json = serde_json::json!(300);
        assert!(map.from_json(&ValueKind::Sint, &json).is_err());
        assert!(map.from_json(&ValueKind::Usint, &json).is_err());
        assert!(map.from_json(&ValueKind::Int, &json).is_ok());
    }

    #[test]
    fn test_unregistered_kind() {
        let map = ConvertMap::empty();
        assert!(map.to_json(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_custom_override() {
        let mut map = ConvertMap::with_defaults();
        // a protocol encoding booleans as 0/1 integers
        map.register(
            ValueKind::Bool,
            Converter::new(
                |v| serde_json::json!(v.as_bool().unwrap_or(false) as i64),
                |j| match j.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(ValueError::ParseError {
                        kind: ValueKind::Bool,
                        text: j.to_string(),
                    }),
                },
            ),
        );
        assert_eq!(map.to_json(&Value::Bool(true)).unwrap(), serde_json::json!(1));
        assert_eq!(
            map.from_json(&ValueKind::Bool, &serde_json::json!(0)).unwrap(),
            Value::Bool(false)
        );
    }
}
