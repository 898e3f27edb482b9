//! Message and enum descriptors produced from parsed schema text.

use std::collections::HashMap;

/// The schema-level type of a single field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit float, fixed64 wire encoding.
    Double,
    /// 32-bit float, fixed32 wire encoding.
    Float,
    /// Varint-encoded signed 32-bit integer.
    Int32,
    /// Varint-encoded signed 64-bit integer.
    Int64,
    /// Varint-encoded unsigned 32-bit integer.
    UInt32,
    /// Varint-encoded unsigned 64-bit integer.
    UInt64,
    /// Zigzag varint signed 32-bit integer.
    SInt32,
    /// Zigzag varint signed 64-bit integer.
    SInt64,
    /// Fixed-width unsigned 32-bit integer.
    Fixed32,
    /// Fixed-width unsigned 64-bit integer.
    Fixed64,
    /// Fixed-width signed 32-bit integer.
    SFixed32,
    /// Fixed-width signed 64-bit integer.
    SFixed64,
    /// Varint-encoded bool.
    Bool,
    /// Length-delimited UTF-8 text.
    String,
    /// Length-delimited raw bytes.
    Bytes,
    /// A nested message, by resolved fully-qualified name.
    Message(std::string::String),
    /// An enum, by resolved fully-qualified name. Decoded as its numeric value.
    Enum(std::string::String),
    /// A `map<K, V>` field, decoded as a list of `{key, value}` entries.
    Map(Box<FieldType>, Box<FieldType>),
    /// A named type the schema never defined. Decoded as raw bytes so the
    /// rest of the message still comes through.
    Unresolved(std::string::String),
}

impl FieldType {
    /// Map a scalar type keyword to its `FieldType`, if it is one.
    pub fn scalar(name: &str) -> Option<Self> {
        Some(match name {
            "double" => Self::Double,
            "float" => Self::Float,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::UInt32,
            "uint64" => Self::UInt64,
            "sint32" => Self::SInt32,
            "sint64" => Self::SInt64,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::SFixed32,
            "sfixed64" => Self::SFixed64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        })
    }

    /// Whether values of this type may be packed into one length-delimited
    /// run when repeated.
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            Self::String | Self::Bytes | Self::Message(_) | Self::Map(..) | Self::Unresolved(_)
        )
    }
}

/// One field of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, exactly as spelled in the schema.
    pub name: String,
    /// Wire field number.
    pub number: u32,
    /// Whether the field is `repeated` (or a map, which is always repeated).
    pub repeated: bool,
    /// The field's type.
    pub ty: FieldType,
}

/// A message type: named fields indexed by wire number.
#[derive(Clone, Debug, Default)]
pub struct MessageDescriptor {
    /// Fully-qualified name (package plus enclosing messages).
    pub full_name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    by_number: HashMap<u32, usize>,
}

impl MessageDescriptor {
    /// Build a descriptor, indexing fields by number.
    pub fn new(full_name: String, fields: Vec<FieldDescriptor>) -> Self {
        let by_number = fields
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.number, idx))
            .collect();
        Self {
            full_name,
            fields,
            by_number,
        }
    }

    /// Look up a field by its wire number.
    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|idx| &self.fields[*idx])
    }
}

/// An enum type. Values decode as plain integers; the descriptor exists so
/// field-type resolution can tell enums from messages.
#[derive(Clone, Debug, Default)]
pub struct EnumDescriptor {
    /// Fully-qualified name.
    pub full_name: String,
    /// Declared values, name to number.
    pub values: Vec<(String, i32)>,
}
