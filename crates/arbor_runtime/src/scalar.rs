//! Scalar codecs.
//!
//! A codec converts between the internal representation produced by
//! resolvers and the wire representation sent to callers, and parses
//! caller-supplied input. Output failures are field failures; input
//! failures are user input errors.

use crate::error::ScalarCoercionError;
use serde_json::Value;
use std::sync::Arc;

/// Serialize/parse contract of a scalar type.
pub trait ScalarCodec: Send + Sync {
    /// Converts an internal value to its wire form.
    fn serialize(&self, value: &Value) -> Result<Value, ScalarCoercionError>;

    /// Converts a wire value supplied by a caller to its internal form.
    fn parse_input(&self, value: &Value) -> Result<Value, ScalarCoercionError>;
}

/// A shared scalar codec.
pub type SharedScalarCodec = Arc<dyn ScalarCodec>;

/// Returns the codecs of the built-in scalars.
pub fn builtin_scalars() -> Vec<(&'static str, SharedScalarCodec)> {
    vec![
        ("Int", Arc::new(IntScalar) as SharedScalarCodec),
        ("Float", Arc::new(FloatScalar)),
        ("String", Arc::new(StringScalar)),
        ("Boolean", Arc::new(BooleanScalar)),
        ("ID", Arc::new(IdScalar)),
    ]
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

fn as_i32(value: &Value) -> Option<i32> {
    if let Some(n) = value.as_i64() {
        return i32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f >= f64::from(i32::MIN) && f <= f64::from(i32::MAX) {
        #[allow(clippy::cast_possible_truncation)]
        return Some(f as i32);
    }
    None
}

/// 32-bit signed integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntScalar;

impl ScalarCodec for IntScalar {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        let coerced = match value {
            Value::Number(_) => as_i32(value),
            Value::Bool(b) => Some(i32::from(*b)),
            Value::String(s) => s.trim().parse::<i32>().ok(),
            _ => None,
        };
        coerced
            .map(Value::from)
            .ok_or_else(|| ScalarCoercionError::new("Int", describe(value)))
    }

    fn parse_input(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => as_i32(value)
                .map(Value::from)
                .ok_or_else(|| ScalarCoercionError::new("Int", "value out of 32-bit range")),
            _ => Err(ScalarCoercionError::new(
                "Int",
                format!("non-integer value {}", describe(value)),
            )),
        }
    }
}

/// Double-precision float.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatScalar;

impl ScalarCodec for FloatScalar {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        let coerced = match value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        };
        coerced
            .map(Value::from)
            .ok_or_else(|| ScalarCoercionError::new("Float", describe(value)))
    }

    fn parse_input(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        value.as_f64().map(Value::from).ok_or_else(|| {
            ScalarCoercionError::new("Float", format!("non-numeric value {}", describe(value)))
        })
    }
}

/// UTF-8 string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringScalar;

impl ScalarCodec for StringScalar {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(ScalarCoercionError::new("String", describe(value))),
        }
    }

    fn parse_input(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(ScalarCoercionError::new(
                "String",
                format!("non-string value {}", describe(value)),
            )),
        }
    }
}

/// Boolean.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanScalar;

impl ScalarCodec for BooleanScalar {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            _ => Err(ScalarCoercionError::new("Boolean", describe(value))),
        }
    }

    fn parse_input(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(ScalarCoercionError::new(
                "Boolean",
                format!("non-boolean value {}", describe(value)),
            )),
        }
    }
}

/// Opaque identifier, always serialized as a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdScalar;

impl ScalarCodec for IdScalar {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(ScalarCoercionError::new("ID", describe(value))),
        }
    }

    fn parse_input(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        self.serialize(value)
    }
}

/// A date carried as an integer epoch value.
///
/// Serializes integers (and integral floats) as integers and accepts only
/// integer literals as input.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateScalar;

impl ScalarCodec for DateScalar {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        if let Some(epoch) = value.as_i64() {
            return Ok(Value::from(epoch));
        }
        match value.as_f64() {
            #[allow(clippy::cast_possible_truncation)]
            Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::from(f as i64)),
            _ => Err(ScalarCoercionError::new(
                "Date",
                format!("expected an epoch integer, got {}", describe(value)),
            )),
        }
    }

    fn parse_input(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        value.as_i64().map(Value::from).ok_or_else(|| {
            ScalarCoercionError::new(
                "Date",
                format!("only integer literals are accepted, got {}", describe(value)),
            )
        })
    }
}
