//! Binary image format shared by compiled output and reference assemblies.
//!
//! An image is a four byte magic, a little-endian format version and a
//! bincode payload describing the types the assembly exports.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub mod cache;
pub mod runtime;

pub const IMAGE_MAGIC: [u8; 4] = *b"DCIM";
pub const IMAGE_VERSION: u16 = 1;
const HEADER_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image is too short")]
    Truncated,
    #[error("not a compiled image (bad magic)")]
    BadMagic,
    #[error("unsupported image version {0}")]
    UnsupportedVersion(u16),
    #[error("corrupted image payload: {0}")]
    Payload(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Internal,
    Protected,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    Field,
    Method,
    Property,
    Constructor,
    Event,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDef {
    pub name: String,
    pub kind: MemberKind,
    pub is_static: bool,
    /// Full name of the field, property or return type. `None` for `void` and constructors.
    pub type_name: Option<String>,
    /// Full names of the parameter types.
    pub parameters: Vec<String>,
}

impl MemberDef {
    fn new(name: &str, kind: MemberKind, is_static: bool, type_name: Option<&str>) -> Self {
        MemberDef {
            name: name.to_string(),
            kind,
            is_static,
            type_name: type_name.map(str::to_string),
            parameters: Vec::new(),
        }
    }

    pub fn method(name: &str, returns: Option<&str>) -> Self {
        Self::new(name, MemberKind::Method, false, returns)
    }

    pub fn static_method(name: &str, returns: Option<&str>) -> Self {
        Self::new(name, MemberKind::Method, true, returns)
    }

    pub fn property(name: &str, type_name: &str) -> Self {
        Self::new(name, MemberKind::Property, false, Some(type_name))
    }

    pub fn static_property(name: &str, type_name: &str) -> Self {
        Self::new(name, MemberKind::Property, true, Some(type_name))
    }

    pub fn field(name: &str, type_name: &str) -> Self {
        Self::new(name, MemberKind::Field, false, Some(type_name))
    }

    pub fn static_field(name: &str, type_name: &str) -> Self {
        Self::new(name, MemberKind::Field, true, Some(type_name))
    }

    pub fn event(name: &str, type_name: &str) -> Self {
        Self::new(name, MemberKind::Event, false, Some(type_name))
    }

    pub fn constructor() -> Self {
        Self::new(".ctor", MemberKind::Constructor, false, None)
    }

    pub fn with_parameters(mut self, parameters: &[&str]) -> Self {
        self.parameters = parameters.iter().map(|p| p.to_string()).collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub namespace: String,
    /// Simple name; generic types carry a `` `N `` arity suffix and nested
    /// types are qualified by their outer type (`Outer.Inner`).
    pub name: String,
    pub kind: TypeKind,
    pub visibility: Visibility,
    pub is_static: bool,
    pub base_types: Vec<String>,
    pub members: Vec<MemberDef>,
}

impl TypeDef {
    pub fn new(namespace: &str, name: &str, kind: TypeKind) -> Self {
        TypeDef {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            visibility: Visibility::Public,
            is_static: false,
            base_types: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn class(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, TypeKind::Class)
    }

    pub fn structure(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, TypeKind::Struct)
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base_types.push(base.to_string());
        self
    }

    pub fn with_member(mut self, member: MemberDef) -> Self {
        self.members.push(member);
        self
    }

    pub fn make_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn full_name(&self) -> String {
        qualify(&self.namespace, &self.name)
    }

    /// Name without the generic arity suffix.
    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }

    pub fn members_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MemberDef> + 'a {
        self.members.iter().filter(move |m| m.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    pub name: String,
    pub references: Vec<String>,
    pub types: Vec<TypeDef>,
}

impl Assembly {
    pub fn new(name: &str) -> Self {
        Assembly {
            name: name.to_string(),
            references: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, ty: TypeDef) -> Self {
        self.types.push(ty);
        self
    }

    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.full_name() == full_name)
    }

    /// Every namespace declared by a type, including the enclosing prefixes.
    pub fn namespaces(&self) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        for ty in &self.types {
            let mut prefix = String::new();
            for part in ty.namespace.split('.').filter(|p| !p.is_empty()) {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                result.insert(prefix.clone());
            }
        }
        result
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let payload = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ImageError::Payload(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&IMAGE_MAGIC);
        bytes.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn load(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < HEADER_LEN {
            return Err(ImageError::Truncated);
        }
        if bytes[..4] != IMAGE_MAGIC {
            return Err(ImageError::BadMagic);
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != IMAGE_VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let payload = &bytes[HEADER_LEN..];
        let (assembly, read): (Assembly, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| ImageError::Payload(e.to_string()))?;
        if read != payload.len() {
            return Err(ImageError::Payload(format!(
                "{} trailing bytes",
                payload.len() - read
            )));
        }
        Ok(assembly)
    }
}

pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

pub fn display_name(name: &str) -> &str {
    name.split('`').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Assembly {
        Assembly::new("Sample").with_type(
            TypeDef::class("Acme.Tools", "Hammer")
                .with_base("System.Object")
                .with_member(MemberDef::static_method("Create", Some("Acme.Tools.Hammer")))
                .with_member(MemberDef::property("Weight", "System.Int32")),
        )
    }

    #[test]
    fn test_load_written_image() {
        let assembly = sample();
        let bytes = assembly.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"DCIM");

        let loaded = Assembly::load(&bytes).unwrap();
        assert_eq!(loaded, assembly);
        let hammer = loaded.find_type("Acme.Tools.Hammer").unwrap();
        assert_eq!(hammer.members_named("Create").count(), 1);
    }

    #[test]
    fn test_load_rejects_foreign_bytes() {
        assert_eq!(Assembly::load(b"MZ"), Err(ImageError::Truncated));
        assert_eq!(Assembly::load(b"MZ\x90\x00\x03\x00\x00"), Err(ImageError::BadMagic));

        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = 9;
        assert_eq!(Assembly::load(&bytes), Err(ImageError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_load_rejects_truncated_payload() {
        let bytes = sample().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(Assembly::load(cut), Err(ImageError::Payload(_))));
    }

    #[test]
    fn test_namespaces_include_prefixes() {
        let namespaces = sample().namespaces();
        assert!(namespaces.contains("Acme"));
        assert!(namespaces.contains("Acme.Tools"));
        assert_eq!(namespaces.len(), 2);
    }

    #[test]
    fn test_display_name_strips_arity() {
        assert_eq!(display_name("List`1"), "List");
        assert_eq!(display_name("Process"), "Process");
    }
}
