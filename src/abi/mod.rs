use crate::error::{AppError, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Type expression from the contract ABI. Named types are resolved against
/// the registry's struct and enum tables at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    U8,
    U16,
    U32,
    U64,
    Address,
    Tuple(Vec<AbiType>),
    Variadic(Box<AbiType>),
    Named(String),
}

impl AbiType {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            "u8" => return Ok(AbiType::U8),
            "u16" => return Ok(AbiType::U16),
            "u32" => return Ok(AbiType::U32),
            "u64" => return Ok(AbiType::U64),
            "Address" => return Ok(AbiType::Address),
            _ => {}
        }

        if let Some(inner) = strip_generic(raw, "variadic") {
            return Ok(AbiType::Variadic(Box::new(AbiType::parse(inner)?)));
        }
        if let Some(inner) = strip_generic(raw, "tuple") {
            let items = split_top_level(inner)
                .into_iter()
                .map(AbiType::parse)
                .collect::<Result<Vec<_>>>()?;
            if items.is_empty() {
                return Err(AppError::Configuration(format!(
                    "empty tuple type expression: {raw}"
                )));
            }
            return Ok(AbiType::Tuple(items));
        }

        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Configuration(format!(
                "unsupported ABI type expression: {raw}"
            )));
        }

        Ok(AbiType::Named(raw.to_string()))
    }
}

fn strip_generic<'a>(raw: &'a str, keyword: &str) -> Option<&'a str> {
    raw.strip_prefix(keyword)
        .and_then(|rest| rest.strip_prefix('<'))
        .and_then(|rest| rest.strip_suffix('>'))
}

/// Split `a,b,tuple<c,d>` into `["a", "b", "tuple<c,d>"]`.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in raw.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

#[derive(Debug, Clone)]
pub struct EndpointDef {
    pub name: String,
    pub mutability: String,
    pub inputs: Vec<ParamDef>,
    pub outputs: Vec<AbiType>,
}

#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub ty: AbiType,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<ParamDef>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<VariantDef>,
}

#[derive(Debug, Clone)]
pub struct VariantDef {
    pub name: String,
    pub discriminant: u8,
}

/// Either side of the named-type table.
pub enum NamedType<'a> {
    Struct(&'a StructDef),
    Enum(&'a EnumDef),
}

/// Immutable view of the contract interface, loaded once at startup and
/// shared by reference with the decoder and the query client.
pub struct AbiRegistry {
    name: String,
    endpoints: HashMap<String, EndpointDef>,
    structs: HashMap<String, StructDef>,
    enums: HashMap<String, EnumDef>,
}

#[derive(Deserialize)]
struct RawAbi {
    name: String,
    endpoints: Vec<RawEndpoint>,
    types: HashMap<String, RawTypeDef>,
}

#[derive(Deserialize)]
struct RawEndpoint {
    name: String,
    #[serde(default)]
    mutability: String,
    #[serde(default)]
    inputs: Vec<RawParam>,
    #[serde(default)]
    outputs: Vec<RawOutput>,
}

#[derive(Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Deserialize)]
struct RawOutput {
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawTypeDef {
    Struct { fields: Vec<RawParam> },
    Enum { variants: Vec<RawVariant> },
}

#[derive(Deserialize)]
struct RawVariant {
    name: String,
    discriminant: u8,
}

impl AbiRegistry {
    /// Load the registry from the ABI document shipped with the binary.
    pub fn from_embedded() -> Result<Self> {
        Self::from_json(include_str!("xplace.abi.json"))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let raw: RawAbi = serde_json::from_str(raw)
            .map_err(|e| AppError::Configuration(format!("invalid ABI document: {e}")))?;

        let mut structs = HashMap::new();
        let mut enums = HashMap::new();
        for (name, def) in raw.types {
            match def {
                RawTypeDef::Struct { fields } => {
                    let fields = fields
                        .into_iter()
                        .map(|f| {
                            Ok(ParamDef {
                                ty: AbiType::parse(&f.ty)?,
                                name: f.name,
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    structs.insert(
                        name.clone(),
                        StructDef {
                            name,
                            fields,
                        },
                    );
                }
                RawTypeDef::Enum { variants } => {
                    let variants = variants
                        .into_iter()
                        .map(|v| VariantDef {
                            name: v.name,
                            discriminant: v.discriminant,
                        })
                        .collect();
                    enums.insert(
                        name.clone(),
                        EnumDef {
                            name,
                            variants,
                        },
                    );
                }
            }
        }

        let mut endpoints = HashMap::new();
        for endpoint in raw.endpoints {
            let inputs = endpoint
                .inputs
                .into_iter()
                .map(|p| {
                    Ok(ParamDef {
                        ty: AbiType::parse(&p.ty)?,
                        name: p.name,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let outputs = endpoint
                .outputs
                .into_iter()
                .map(|o| AbiType::parse(&o.ty))
                .collect::<Result<Vec<_>>>()?;
            endpoints.insert(
                endpoint.name.clone(),
                EndpointDef {
                    name: endpoint.name,
                    mutability: endpoint.mutability,
                    inputs,
                    outputs,
                },
            );
        }

        let registry = Self {
            name: raw.name,
            endpoints,
            structs,
            enums,
        };
        registry.check_named_references()?;
        Ok(registry)
    }

    /// Every named type referenced by a field, input or output must exist.
    fn check_named_references(&self) -> Result<()> {
        let mut referenced: Vec<&AbiType> = Vec::new();
        for def in self.structs.values() {
            referenced.extend(def.fields.iter().map(|f| &f.ty));
        }
        for endpoint in self.endpoints.values() {
            referenced.extend(endpoint.inputs.iter().map(|p| &p.ty));
            referenced.extend(endpoint.outputs.iter());
        }

        while let Some(ty) = referenced.pop() {
            match ty {
                AbiType::Named(name) => {
                    if !self.structs.contains_key(name) && !self.enums.contains_key(name) {
                        return Err(AppError::Configuration(format!(
                            "ABI references undeclared type {name}"
                        )));
                    }
                }
                AbiType::Tuple(items) => referenced.extend(items.iter()),
                AbiType::Variadic(inner) => referenced.push(inner),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn contract_name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self, name: &str) -> Result<&EndpointDef> {
        self.endpoints
            .get(name)
            .ok_or_else(|| AppError::Configuration(format!("unknown ABI endpoint {name}")))
    }

    pub fn struct_def(&self, name: &str) -> Result<&StructDef> {
        self.structs
            .get(name)
            .ok_or_else(|| AppError::Configuration(format!("unknown ABI struct {name}")))
    }

    pub fn enum_def(&self, name: &str) -> Result<&EnumDef> {
        self.enums
            .get(name)
            .ok_or_else(|| AppError::Configuration(format!("unknown ABI enum {name}")))
    }

    pub fn named_type(&self, name: &str) -> Result<NamedType<'_>> {
        if let Some(def) = self.structs.get(name) {
            return Ok(NamedType::Struct(def));
        }
        if let Some(def) = self.enums.get(name) {
            return Ok(NamedType::Enum(def));
        }
        Err(AppError::Configuration(format!(
            "unknown ABI type {name}"
        )))
    }

    pub fn variant_by_discriminant(&self, enum_name: &str, discriminant: u8) -> Result<&VariantDef> {
        let def = self.enum_def(enum_name)?;
        def.variants
            .iter()
            .find(|v| v.discriminant == discriminant)
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "enum {enum_name} has no variant with discriminant {discriminant}"
                ))
            })
    }

    pub fn discriminant_of(&self, enum_name: &str, variant: &str) -> Result<u8> {
        let def = self.enum_def(enum_name)?;
        def.variants
            .iter()
            .find(|v| v.name == variant)
            .map(|v| v.discriminant)
            .ok_or_else(|| {
                AppError::Configuration(format!("enum {enum_name} has no variant {variant}"))
            })
    }
}
