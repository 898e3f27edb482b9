//! # simwire-schema
//!
//! Runtime message-schema registry for the simwire telemetry client.
//!
//! The simulation server delivers its message schema as Protobuf schema text
//! during the connection handshake — the set of message types is not known at
//! compile time. This crate therefore models decoding as data: a parser turns
//! the schema text into descriptors, and a small interpreter walks the wire
//! format against those descriptors, producing dynamic values.
//!
//! - [`SchemaRegistry`]: built once per connection from the handshake
//!   document, immutable afterward
//! - [`MessageDecoder`]: per-type decode handle obtained via
//!   [`SchemaRegistry::decoder`]
//! - [`DynMessage`] / [`DynValue`]: decoded values with field names preserved
//!   verbatim (no case normalization)

#![deny(unsafe_code)]

pub mod descriptor;
pub mod error;
pub mod parse;
pub mod registry;
pub mod value;
mod wire;

pub use error::{DecodeError, SchemaError};
pub use registry::{MessageDecoder, SchemaRegistry};
pub use value::{DynMessage, DynValue};
