//! Schema registry — fully-qualified type names mapped to decoders.
//!
//! Built once per connection from the handshake schema document, immutable
//! afterward, discarded on disconnect. Decoding is interpretation: the wire
//! bytes are walked against the parsed descriptors, so no type needs to be
//! known at compile time.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tracing::debug;

use crate::descriptor::{EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor};
use crate::error::{DecodeError, SchemaError};
use crate::parse::{self, EnumNode, MessageNode, TypeRef};
use crate::value::{DynMessage, DynValue};
use crate::wire::{self, WIRE_FIXED32, WIRE_FIXED64, WIRE_LEN, WIRE_VARINT, WireReader};

/// Nesting limit for decoded messages. Telemetry types are a handful of
/// levels deep; anything past this is a malformed or adversarial payload.
const MAX_DEPTH: usize = 64;

/// The set of message types delivered by one handshake.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    messages: HashMap<String, MessageDescriptor>,
    enums: HashMap<String, EnumDescriptor>,
}

/// Decode handle for one message type, borrowed from the registry.
#[derive(Clone, Copy)]
pub struct MessageDecoder<'a> {
    registry: &'a SchemaRegistry,
    desc: &'a MessageDescriptor,
}

impl SchemaRegistry {
    /// Parse schema text and build the registry.
    ///
    /// Field type names are resolved protobuf-style: the enclosing message
    /// scope is searched first, then each outer scope up to the package
    /// root. Names that resolve to nothing decode as raw bytes rather than
    /// failing the whole registry.
    pub fn build(text: &str) -> Result<Self, SchemaError> {
        let ast = parse::parse_schema(text)?;
        let package = ast.package.clone().unwrap_or_default();

        // First pass: every declared type name, so field resolution can
        // distinguish messages from enums.
        let mut message_names = HashSet::new();
        let mut enum_names = HashSet::new();
        collect_names(&ast.messages, &ast.enums, &package, &mut message_names, &mut enum_names);

        let mut registry = Self::default();
        registry.register_all(&ast.messages, &ast.enums, &package, &message_names, &enum_names);

        debug!(
            messages = registry.messages.len(),
            enums = registry.enums.len(),
            "schema registry built"
        );
        Ok(registry)
    }

    /// Look up a decoder by type name.
    ///
    /// Exact fully-qualified match first; otherwise a unique suffix match
    /// (`Scene` finds `gz.msgs.Scene` when nothing else ends in `.Scene`).
    /// A miss here is a per-frame condition, never connection-fatal.
    pub fn decoder(&self, type_name: &str) -> Option<MessageDecoder<'_>> {
        let name = type_name.strip_prefix('.').unwrap_or(type_name);
        let desc = self.messages.get(name).or_else(|| {
            let suffix = format!(".{name}");
            let mut matches = self.messages.values().filter(|d| d.full_name.ends_with(&suffix));
            match (matches.next(), matches.next()) {
                (Some(desc), None) => Some(desc),
                _ => None,
            }
        })?;
        Some(MessageDecoder {
            registry: self,
            desc,
        })
    }

    /// Decode a payload as the named type.
    pub fn decode(&self, type_name: &str, payload: &[u8]) -> Result<DynMessage, DecodeError> {
        let decoder = self.decoder(type_name).ok_or_else(|| DecodeError::UnknownType {
            type_name: type_name.to_owned(),
        })?;
        decoder.decode(payload)
    }

    /// Whether a type is present (exact or unique-suffix).
    pub fn contains(&self, type_name: &str) -> bool {
        self.decoder(type_name).is_some()
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the registry holds no message types.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // ─── Build internals ─────────────────────────────────────────────────

    fn register_all(
        &mut self,
        messages: &[MessageNode],
        enums: &[EnumNode],
        scope: &str,
        message_names: &HashSet<String>,
        enum_names: &HashSet<String>,
    ) {
        for node in enums {
            let full_name = join(scope, &node.name);
            let _ = self.enums.insert(
                full_name.clone(),
                EnumDescriptor {
                    full_name,
                    values: node.values.clone(),
                },
            );
        }
        for node in messages {
            let full_name = join(scope, &node.name);
            let fields = node
                .fields
                .iter()
                .map(|f| {
                    let (ty, repeated) = match &f.ty {
                        TypeRef::Named(name) => (
                            resolve(name, &full_name, message_names, enum_names),
                            f.repeated,
                        ),
                        TypeRef::Map(key, value) => {
                            let key = resolve(key, &full_name, message_names, enum_names);
                            let value = resolve(value, &full_name, message_names, enum_names);
                            // Map fields are repeated entry messages on the wire.
                            (FieldType::Map(Box::new(key), Box::new(value)), true)
                        }
                    };
                    FieldDescriptor {
                        name: f.name.clone(),
                        number: f.number,
                        repeated,
                        ty,
                    }
                })
                .collect();
            let _ = self
                .messages
                .insert(full_name.clone(), MessageDescriptor::new(full_name.clone(), fields));

            self.register_all(&node.messages, &node.enums, &full_name, message_names, enum_names);
        }
    }
}

fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}.{name}")
    }
}

fn collect_names(
    messages: &[MessageNode],
    enums: &[EnumNode],
    scope: &str,
    message_names: &mut HashSet<String>,
    enum_names: &mut HashSet<String>,
) {
    for node in enums {
        let _ = enum_names.insert(join(scope, &node.name));
    }
    for node in messages {
        let full_name = join(scope, &node.name);
        collect_names(&node.messages, &node.enums, &full_name, message_names, enum_names);
        let _ = message_names.insert(full_name);
    }
}

/// Resolve a field's declared type name against the enclosing scope.
fn resolve(
    name: &str,
    scope: &str,
    message_names: &HashSet<String>,
    enum_names: &HashSet<String>,
) -> FieldType {
    if let Some(scalar) = FieldType::scalar(name) {
        return scalar;
    }

    // A leading dot makes the reference absolute.
    if let Some(absolute) = name.strip_prefix('.') {
        return lookup_named(absolute, message_names, enum_names)
            .unwrap_or_else(|| unresolved(name));
    }

    // Search the scope chain from innermost to the root.
    let mut scope = scope;
    loop {
        let candidate = join(scope, name);
        if let Some(found) = lookup_named(&candidate, message_names, enum_names) {
            return found;
        }
        match scope.rfind('.') {
            Some(idx) => scope = &scope[..idx],
            None if scope.is_empty() => break,
            None => scope = "",
        }
    }

    unresolved(name)
}

fn lookup_named(
    candidate: &str,
    message_names: &HashSet<String>,
    enum_names: &HashSet<String>,
) -> Option<FieldType> {
    if message_names.contains(candidate) {
        Some(FieldType::Message(candidate.to_owned()))
    } else if enum_names.contains(candidate) {
        Some(FieldType::Enum(candidate.to_owned()))
    } else {
        None
    }
}

fn unresolved(name: &str) -> FieldType {
    debug!(type_name = name, "field type not defined in schema, decoding as bytes");
    FieldType::Unresolved(name.to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

impl MessageDecoder<'_> {
    /// Fully-qualified name of the type this decoder produces.
    pub fn full_name(&self) -> &str {
        &self.desc.full_name
    }

    /// Decode a wire payload into a dynamic message.
    pub fn decode(&self, payload: &[u8]) -> Result<DynMessage, DecodeError> {
        decode_message(self.registry, self.desc, payload, 0)
    }
}

fn decode_message(
    registry: &SchemaRegistry,
    desc: &MessageDescriptor,
    payload: &[u8],
    depth: usize,
) -> Result<DynMessage, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::RecursionLimit { limit: MAX_DEPTH });
    }

    let mut msg = DynMessage::new(desc.full_name.clone());
    let mut reader = WireReader::new(payload);

    while reader.has_remaining() {
        let tag = reader.read_varint()?;
        #[allow(clippy::cast_possible_truncation)]
        let field_number = (tag >> 3) as u32;
        let wire_type = (tag & 0x7) as u8;

        let Some(field) = desc.field(field_number) else {
            reader.skip(wire_type)?;
            continue;
        };

        if field.repeated && field.ty.is_packable() && wire_type == WIRE_LEN {
            // Packed scalar run: one length-delimited block of values.
            let block = reader.read_len_delimited()?;
            let mut packed = WireReader::new(block);
            while packed.has_remaining() {
                let value = read_scalar(&field.ty, &mut packed)?;
                msg.push(&field.name, value);
            }
            continue;
        }

        let value = decode_field(registry, field, wire_type, &mut reader, depth)?;
        if field.repeated {
            msg.push(&field.name, value);
        } else {
            msg.set(field.name.clone(), value);
        }
    }

    Ok(msg)
}

fn decode_field(
    registry: &SchemaRegistry,
    field: &FieldDescriptor,
    wire_type: u8,
    reader: &mut WireReader<'_>,
    depth: usize,
) -> Result<DynValue, DecodeError> {
    let expected = expected_wire(&field.ty);
    if wire_type != expected {
        return Err(DecodeError::WireType {
            wire_type,
            field: field.name.clone(),
        });
    }

    match &field.ty {
        FieldType::String => {
            let bytes = reader.read_len_delimited()?;
            Ok(DynValue::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        FieldType::Bytes | FieldType::Unresolved(_) => {
            let bytes = reader.read_len_delimited()?;
            Ok(DynValue::Bytes(Bytes::copy_from_slice(bytes)))
        }
        FieldType::Message(type_name) => {
            let bytes = reader.read_len_delimited()?;
            let nested = registry.messages.get(type_name).ok_or_else(|| {
                DecodeError::UnknownType {
                    type_name: type_name.clone(),
                }
            })?;
            Ok(DynValue::Message(decode_message(registry, nested, bytes, depth + 1)?))
        }
        FieldType::Map(key_ty, value_ty) => {
            let bytes = reader.read_len_delimited()?;
            Ok(DynValue::Message(decode_map_entry(
                registry, key_ty, value_ty, bytes, depth,
            )?))
        }
        scalar => read_scalar(scalar, reader),
    }
}

/// Decode one `map<K, V>` entry as a `{key, value}` message.
fn decode_map_entry(
    registry: &SchemaRegistry,
    key_ty: &FieldType,
    value_ty: &FieldType,
    payload: &[u8],
    depth: usize,
) -> Result<DynMessage, DecodeError> {
    let entry_desc = MessageDescriptor::new(
        "map entry".to_owned(),
        vec![
            FieldDescriptor {
                name: "key".to_owned(),
                number: 1,
                repeated: false,
                ty: key_ty.clone(),
            },
            FieldDescriptor {
                name: "value".to_owned(),
                number: 2,
                repeated: false,
                ty: value_ty.clone(),
            },
        ],
    );
    decode_message(registry, &entry_desc, payload, depth + 1)
}

/// Read one scalar value using the type's native encoding.
#[allow(clippy::cast_possible_wrap)]
fn read_scalar(ty: &FieldType, reader: &mut WireReader<'_>) -> Result<DynValue, DecodeError> {
    Ok(match ty {
        FieldType::Double => DynValue::Float(f64::from_bits(reader.read_fixed64()?)),
        FieldType::Float => DynValue::Float(f64::from(f32::from_bits(reader.read_fixed32()?))),
        FieldType::Int32 | FieldType::Int64 => DynValue::Int(reader.read_varint()? as i64),
        FieldType::UInt32 | FieldType::UInt64 => DynValue::UInt(reader.read_varint()?),
        FieldType::SInt32 | FieldType::SInt64 => DynValue::Int(wire::zigzag(reader.read_varint()?)),
        FieldType::Fixed32 => DynValue::UInt(u64::from(reader.read_fixed32()?)),
        FieldType::Fixed64 => DynValue::UInt(reader.read_fixed64()?),
        FieldType::SFixed32 => DynValue::Int(i64::from(reader.read_fixed32()? as i32)),
        FieldType::SFixed64 => DynValue::Int(reader.read_fixed64()? as i64),
        FieldType::Bool => DynValue::Bool(reader.read_varint()? != 0),
        FieldType::Enum(_) => DynValue::Int(reader.read_varint()? as i64),
        // Length-delimited types never reach here.
        FieldType::String
        | FieldType::Bytes
        | FieldType::Message(_)
        | FieldType::Map(..)
        | FieldType::Unresolved(_) => {
            return Err(DecodeError::WireType {
                wire_type: WIRE_LEN,
                field: "scalar".to_owned(),
            });
        }
    })
}

fn expected_wire(ty: &FieldType) -> u8 {
    match ty {
        FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => WIRE_FIXED64,
        FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => WIRE_FIXED32,
        FieldType::Int32
        | FieldType::Int64
        | FieldType::UInt32
        | FieldType::UInt64
        | FieldType::SInt32
        | FieldType::SInt64
        | FieldType::Bool
        | FieldType::Enum(_) => WIRE_VARINT,
        FieldType::String
        | FieldType::Bytes
        | FieldType::Message(_)
        | FieldType::Map(..)
        | FieldType::Unresolved(_) => WIRE_LEN,
    }
}
