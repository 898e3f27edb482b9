//! Dynamic message values.
//!
//! Decoded telemetry messages are open-ended: their shape comes from the
//! runtime schema, so values are represented as a small dynamic tree.
//! Field names are stored exactly as the schema spells them — downstream
//! handlers match payload field names verbatim.

use std::collections::HashMap;

use bytes::Bytes;

/// A single decoded field value.
#[derive(Clone, Debug, PartialEq)]
pub enum DynValue {
    /// Protobuf `bool`.
    Bool(bool),
    /// Signed integers and enum values.
    Int(i64),
    /// Unsigned integers.
    UInt(u64),
    /// `float` and `double`, widened to `f64`.
    Float(f64),
    /// Protobuf `string` (invalid UTF-8 replaced, never rejected).
    String(String),
    /// Protobuf `bytes`.
    Bytes(Bytes),
    /// A nested message.
    Message(DynMessage),
    /// A repeated field's accumulated values, in arrival order.
    List(Vec<DynValue>),
}

impl DynValue {
    /// The value as a bool, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a signed integer. Unsigned values coerce when they fit.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// The value as an unsigned integer. Signed values coerce when non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// The value as a float. Integer values coerce.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The value as raw bytes, if it is one.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a nested message, if it is one.
    pub fn as_message(&self) -> Option<&DynMessage> {
        match self {
            Self::Message(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a list. Scalars are not wrapped.
    pub fn as_list(&self) -> Option<&[DynValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

const EMPTY: &[DynValue] = &[];

/// A decoded message: type name plus field values keyed by field name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DynMessage {
    type_name: String,
    fields: HashMap<String, DynValue>,
}

impl DynMessage {
    /// Create an empty message of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: HashMap::new(),
        }
    }

    /// Fully-qualified type name this message was decoded as.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Set a field value, replacing any previous one.
    pub fn set(&mut self, name: impl Into<String>, value: DynValue) {
        let _ = self.fields.insert(name.into(), value);
    }

    /// Append to a repeated field, creating the list on first use.
    pub fn push(&mut self, name: &str, value: DynValue) {
        match self.fields.get_mut(name) {
            Some(DynValue::List(items)) => items.push(value),
            _ => {
                let _ = self
                    .fields
                    .insert(name.to_owned(), DynValue::List(vec![value]));
            }
        }
    }

    /// Look up a field by its exact (case-sensitive) name.
    pub fn get(&self, name: &str) -> Option<&DynValue> {
        self.fields.get(name)
    }

    /// Whether the message decoded no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over all present fields.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &DynValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    // ─── Typed accessors ─────────────────────────────────────────────────

    /// String field, or `None` if absent or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(DynValue::as_str)
    }

    /// Float field (integers coerce).
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(DynValue::as_f64)
    }

    /// Unsigned integer field.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(DynValue::as_u64)
    }

    /// Signed integer field.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(DynValue::as_i64)
    }

    /// Bool field.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(DynValue::as_bool)
    }

    /// Bytes field.
    pub fn get_bytes(&self, name: &str) -> Option<&Bytes> {
        self.get(name).and_then(DynValue::as_bytes)
    }

    /// Nested message field.
    pub fn get_message(&self, name: &str) -> Option<&DynMessage> {
        self.get(name).and_then(DynValue::as_message)
    }

    /// Repeated field values, empty when the field is absent.
    pub fn list(&self, name: &str) -> &[DynValue] {
        self.get(name).and_then(DynValue::as_list).unwrap_or(EMPTY)
    }
}
