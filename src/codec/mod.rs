use crate::abi::{AbiRegistry, AbiType, NamedType};
use crate::error::{AppError, Result};
use bech32::{Bech32, Hrp};

pub const ADDRESS_BYTES: usize = 32;
const ADDRESS_HRP: &str = "erd";

/// A decoded ABI value. Decoding is deterministic and side-effect free; the
/// same bytes and type always yield the same value, whether they came from a
/// synchronous query result or an indexed log event.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Unsigned(u64),
    Address(String),
    Tuple(Vec<TypedValue>),
    Struct {
        name: String,
        fields: Vec<(String, TypedValue)>,
    },
    Enum {
        name: String,
        variant: String,
        discriminant: u8,
    },
}

impl TypedValue {
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            TypedValue::Unsigned(value) => Ok(*value),
            other => Err(AppError::Decode(format!(
                "expected unsigned value, got {other:?}"
            ))),
        }
    }

    pub fn as_address(&self) -> Result<&str> {
        match self {
            TypedValue::Address(addr) => Ok(addr),
            other => Err(AppError::Decode(format!(
                "expected address value, got {other:?}"
            ))),
        }
    }

    pub fn variant_name(&self) -> Result<&str> {
        match self {
            TypedValue::Enum { variant, .. } => Ok(variant),
            other => Err(AppError::Decode(format!(
                "expected enum value, got {other:?}"
            ))),
        }
    }

    pub fn field(&self, name: &str) -> Result<&TypedValue> {
        match self {
            TypedValue::Struct { fields, .. } => fields
                .iter()
                .find(|(field_name, _)| field_name == name)
                .map(|(_, value)| value)
                .ok_or_else(|| AppError::Decode(format!("struct has no field {name}"))),
            other => Err(AppError::Decode(format!(
                "expected struct value, got {other:?}"
            ))),
        }
    }

    pub fn items(&self) -> Result<&[TypedValue]> {
        match self {
            TypedValue::Tuple(items) => Ok(items),
            other => Err(AppError::Decode(format!(
                "expected tuple value, got {other:?}"
            ))),
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(AppError::Decode(format!(
                "buffer underflow: need {n} bytes at offset {}, have {}",
                self.pos,
                self.bytes.len() - self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

fn unsigned_width(ty: &AbiType) -> Option<usize> {
    match ty {
        AbiType::U8 => Some(1),
        AbiType::U16 => Some(2),
        AbiType::U32 => Some(4),
        AbiType::U64 => Some(8),
        _ => None,
    }
}

fn big_endian_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Decode a standalone payload: a query return value, an event topic or an
/// event data buffer. Unsigned integers use the variable-width top-level
/// encoding; composite types must consume the buffer exactly.
pub fn decode_top_level(bytes: &[u8], ty: &AbiType, registry: &AbiRegistry) -> Result<TypedValue> {
    match ty {
        AbiType::U8 | AbiType::U16 | AbiType::U32 | AbiType::U64 => {
            let width = unsigned_width(ty).unwrap_or(8);
            if bytes.len() > width {
                return Err(AppError::Decode(format!(
                    "unsigned payload of {} bytes exceeds {width}-byte type",
                    bytes.len()
                )));
            }
            Ok(TypedValue::Unsigned(big_endian_value(bytes)))
        }
        AbiType::Address => {
            if bytes.len() != ADDRESS_BYTES {
                return Err(AppError::Decode(format!(
                    "address payload must be {ADDRESS_BYTES} bytes, got {}",
                    bytes.len()
                )));
            }
            Ok(TypedValue::Address(render_address(bytes)?))
        }
        AbiType::Named(name) => {
            if let NamedType::Enum(def) = registry.named_type(name)? {
                // Top-level enum: empty buffer means the first variant.
                let discriminant = match bytes.len() {
                    0 => 0,
                    1 => bytes[0],
                    n => {
                        return Err(AppError::Decode(format!(
                            "enum {} payload must be 0 or 1 byte, got {n}",
                            def.name
                        )))
                    }
                };
                let variant = registry.variant_by_discriminant(name, discriminant)?;
                return Ok(TypedValue::Enum {
                    name: name.clone(),
                    variant: variant.name.clone(),
                    discriminant,
                });
            }
            decode_exact(bytes, ty, registry)
        }
        AbiType::Tuple(_) => decode_exact(bytes, ty, registry),
        AbiType::Variadic(_) => Err(AppError::Decode(
            "variadic values are decoded one item at a time".to_string(),
        )),
    }
}

fn decode_exact(bytes: &[u8], ty: &AbiType, registry: &AbiRegistry) -> Result<TypedValue> {
    let mut reader = Reader::new(bytes);
    let value = decode_nested(&mut reader, ty, registry)?;
    if reader.remaining() != 0 {
        return Err(AppError::Decode(format!(
            "{} trailing bytes after decoding {ty:?}",
            reader.remaining()
        )));
    }
    Ok(value)
}

fn decode_nested(reader: &mut Reader<'_>, ty: &AbiType, registry: &AbiRegistry) -> Result<TypedValue> {
    match ty {
        AbiType::U8 | AbiType::U16 | AbiType::U32 | AbiType::U64 => {
            let width = unsigned_width(ty).unwrap_or(8);
            let bytes = reader.take(width)?;
            Ok(TypedValue::Unsigned(big_endian_value(bytes)))
        }
        AbiType::Address => {
            let bytes = reader.take(ADDRESS_BYTES)?;
            Ok(TypedValue::Address(render_address(bytes)?))
        }
        AbiType::Tuple(items) => {
            let values = items
                .iter()
                .map(|item| decode_nested(reader, item, registry))
                .collect::<Result<Vec<_>>>()?;
            Ok(TypedValue::Tuple(values))
        }
        AbiType::Named(name) => match registry.named_type(name)? {
            NamedType::Struct(def) => {
                let mut fields = Vec::with_capacity(def.fields.len());
                for field in &def.fields {
                    let value = decode_nested(reader, &field.ty, registry)?;
                    fields.push((field.name.clone(), value));
                }
                Ok(TypedValue::Struct {
                    name: name.clone(),
                    fields,
                })
            }
            NamedType::Enum(_) => {
                let discriminant = reader.take(1)?[0];
                let variant = registry.variant_by_discriminant(name, discriminant)?;
                Ok(TypedValue::Enum {
                    name: name.clone(),
                    variant: variant.name.clone(),
                    discriminant,
                })
            }
        },
        AbiType::Variadic(_) => Err(AppError::Decode(
            "variadic values cannot be nested".to_string(),
        )),
    }
}

/// Top-level unsigned decode for scalar-returning endpoints.
pub fn decode_u64_top_level(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(AppError::Decode(format!(
            "unsigned payload of {} bytes exceeds u64",
            bytes.len()
        )));
    }
    Ok(big_endian_value(bytes))
}

/// Minimal big-endian encoding used for query arguments (zero encodes as an
/// empty buffer).
pub fn encode_u64_top_level(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

fn render_address(bytes: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(ADDRESS_HRP)
        .map_err(|e| AppError::Internal(format!("invalid address hrp: {e}")))?;
    bech32::encode::<Bech32>(hrp, bytes)
        .map_err(|e| AppError::Decode(format!("address rendering failed: {e}")))
}
